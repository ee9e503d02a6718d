//! Engine option objects in the shape `mapboxgl.Map` expects.

use engine::{EngineOptions, EngineSignal};
use foundation::{CameraOptions, FitBoundsOptions, LngLatBounds};
use serde_json::{Map, Value, json};

pub fn map_options(container: &str, options: &EngineOptions) -> Value {
    let mut out = Map::new();
    out.insert("container".into(), json!(container));
    out.insert("accessToken".into(), json!(options.access_token));
    out.insert("style".into(), json!(options.style_url));
    out.insert("minZoom".into(), json!(options.zoom.min));
    out.insert("maxZoom".into(), json!(options.zoom.max));
    out.insert("interactive".into(), json!(options.interactive));
    out.insert("attributionControl".into(), json!(options.attribution_control));
    out.insert("logoPosition".into(), json!(options.logo_position.as_str()));
    if let Some(bounds) = &options.max_bounds {
        out.insert("maxBounds".into(), bounds_value(bounds));
    }
    if let Value::Object(camera) = camera_value(&options.camera) {
        out.extend(camera);
    }
    Value::Object(out)
}

/// Only the fields that are set; the engine keeps its current value for
/// the rest.
pub fn camera_value(camera: &CameraOptions) -> Value {
    let mut out = Map::new();
    if let Some(center) = camera.center {
        out.insert("center".into(), json!([center.lng, center.lat]));
    }
    if let Some(zoom) = camera.zoom {
        out.insert("zoom".into(), json!(zoom));
    }
    if let Some(pitch) = camera.pitch {
        out.insert("pitch".into(), json!(pitch));
    }
    if let Some(bearing) = camera.bearing {
        out.insert("bearing".into(), json!(bearing));
    }
    Value::Object(out)
}

pub fn bounds_value(bounds: &LngLatBounds) -> Value {
    json!([[bounds.sw.lng, bounds.sw.lat], [bounds.ne.lng, bounds.ne.lat]])
}

pub fn fit_value(options: &FitBoundsOptions) -> Value {
    json!({ "padding": options.padding_px, "duration": options.duration_ms })
}

/// Maps the payload of an engine `error` event. HTTP failures carry a
/// numeric status that becomes the error code.
pub fn error_signal(event: &Value) -> EngineSignal {
    let error = event.get("error").unwrap_or(event);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = error.get("status").and_then(|s| match s {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    });
    EngineSignal::Error { message, code }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{Corner, EngineConfig};
    use foundation::LngLat;
    use pretty_assertions::assert_eq;

    #[test]
    fn map_options_carry_camera_and_bounds() {
        let mut config = EngineConfig::new("pk.test");
        config.max_bounds = Some(LngLatBounds::new(
            LngLat::new(-180.0, -85.0),
            LngLat::new(180.0, 85.0),
        ));
        config.logo_position = Corner::BottomRight;
        let value = map_options("map", &config.engine_options());
        assert_eq!(value["container"], json!("map"));
        assert_eq!(value["style"], json!("mapbox://styles/mapbox/streets-v12"));
        assert_eq!(value["center"], json!([0.0, 20.0]));
        assert_eq!(value["zoom"], json!(1.5));
        assert_eq!(value["maxBounds"], json!([[-180.0, -85.0], [180.0, 85.0]]));
        assert_eq!(value["logoPosition"], json!("bottom-right"));
    }

    #[test]
    fn camera_value_skips_unset_fields() {
        let camera = CameraOptions {
            zoom: Some(4.0),
            ..Default::default()
        };
        assert_eq!(camera_value(&camera), json!({ "zoom": 4.0 }));
    }

    #[test]
    fn error_event_maps_status_to_code() {
        let signal = error_signal(&json!({ "error": { "message": "Not Found", "status": 404 } }));
        assert_eq!(
            signal,
            EngineSignal::Error {
                message: Some("Not Found".into()),
                code: Some("404".into()),
            }
        );
        assert_eq!(
            error_signal(&json!({})),
            EngineSignal::Error {
                message: None,
                code: None
            }
        );
    }
}
