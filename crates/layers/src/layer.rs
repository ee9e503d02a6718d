use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::Expression;
use crate::symbology::{VISIBILITY, Visibility};

/// Paint or layout properties, keyed by engine property name.
pub type PropertyMap = BTreeMap<String, Value>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayerType {
    Fill,
    Line,
    Symbol,
    Circle,
    Heatmap,
    FillExtrusion,
    Raster,
    Hillshade,
    Background,
}

/// A named draw rule over exactly one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub source: String,
    #[serde(
        rename = "source-layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<PropertyMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paint: Option<PropertyMap>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, layer_type: LayerType, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            layer_type,
            source: source.into(),
            source_layer: None,
            minzoom: None,
            maxzoom: None,
            filter: None,
            layout: None,
            paint: None,
        }
    }

    pub fn with_source_layer(mut self, source_layer: impl Into<String>) -> Self {
        self.source_layer = Some(source_layer.into());
        self
    }

    pub fn with_zoom_range(mut self, minzoom: Option<f64>, maxzoom: Option<f64>) -> Self {
        self.minzoom = minzoom;
        self.maxzoom = maxzoom;
        self
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_paint(mut self, name: impl Into<String>, value: Value) -> Self {
        self.paint
            .get_or_insert_with(PropertyMap::new)
            .insert(name.into(), value);
        self
    }

    pub fn with_layout(mut self, name: impl Into<String>, value: Value) -> Self {
        self.layout
            .get_or_insert_with(PropertyMap::new)
            .insert(name.into(), value);
        self
    }

    pub fn visibility(&self) -> Visibility {
        Visibility::from_layout_value(self.layout.as_ref().and_then(|l| l.get(VISIBILITY)))
    }

    /// The object handed to the engine's `addLayer(layer)`; optional fields that
    /// were never set are not present at all.
    pub fn engine_options(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerSpec, LayerType};
    use crate::expression::Expression;
    use crate::symbology::Visibility;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_wire_shape() {
        let layer: LayerSpec = serde_json::from_value(json!({
            "id": "trips-extrusion",
            "type": "fill-extrusion",
            "source": "trips",
            "source-layer": "buildings",
            "minzoom": 12,
            "filter": ["==", ["get", "kind"], "visited"],
            "paint": { "fill-extrusion-height": 20 }
        }))
        .unwrap();
        assert_eq!(layer.layer_type, LayerType::FillExtrusion);
        assert_eq!(layer.source_layer.as_deref(), Some("buildings"));
        assert_eq!(layer.minzoom, Some(12.0));
        assert_eq!(layer.maxzoom, None);
        assert!(layer.filter.is_some());
        assert!(layer.layout.is_none());
    }

    #[test]
    fn engine_options_only_carry_present_fields() {
        let layer = LayerSpec::new("pins", LayerType::Circle, "cities")
            .with_paint("circle-radius", json!(6));
        assert_eq!(
            layer.engine_options().unwrap(),
            json!({
                "id": "pins",
                "type": "circle",
                "source": "cities",
                "paint": { "circle-radius": 6 }
            })
        );
    }

    #[test]
    fn visibility_comes_from_layout() {
        let hidden = LayerSpec::new("l", LayerType::Line, "s").with_layout("visibility", json!("none"));
        assert_eq!(hidden.visibility(), Visibility::None);

        let filtered = LayerSpec::new("l", LayerType::Fill, "s")
            .with_filter(Expression::new(json!(["has", "name"])));
        assert_eq!(filtered.visibility(), Visibility::Visible);
    }
}
