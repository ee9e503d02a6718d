use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named data provider registered with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceKind {
    #[serde(rename = "geojson")]
    GeoJson {
        data: GeoJsonData,
        // Clustering fields are forwarded only when set so the engine keeps
        // its own defaults otherwise.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cluster: Option<bool>,
        #[serde(
            rename = "clusterMaxZoom",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        cluster_max_zoom: Option<f64>,
        #[serde(
            rename = "clusterRadius",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        cluster_radius: Option<f64>,
    },
    #[serde(rename = "vector")]
    Vector { url: String },
}

/// Inline GeoJSON or a URL the engine fetches itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeoJsonData {
    Url(String),
    Inline(Value),
}

impl SourceSpec {
    pub fn geojson(id: impl Into<String>, data: GeoJsonData) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::GeoJson {
                data,
                cluster: None,
                cluster_max_zoom: None,
                cluster_radius: None,
            },
        }
    }

    pub fn vector(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: SourceKind::Vector { url: url.into() },
        }
    }

    /// Enables clustering on a GeoJSON source; a no-op for other kinds.
    pub fn with_clustering(mut self, max_zoom: Option<f64>, radius: Option<f64>) -> Self {
        if let SourceKind::GeoJson {
            cluster,
            cluster_max_zoom,
            cluster_radius,
            ..
        } = &mut self.kind
        {
            *cluster = Some(true);
            *cluster_max_zoom = max_zoom;
            *cluster_radius = radius;
        }
        self
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SourceKind::GeoJson { .. } => "geojson",
            SourceKind::Vector { .. } => "vector",
        }
    }

    /// The object handed to the engine's `addSource(id, options)`: everything
    /// but the id, with absent optional fields left out entirely.
    pub fn engine_options(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::{GeoJsonData, SourceKind, SourceSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_wire_shape_with_inline_data() {
        let raw = json!({
            "id": "cities-source",
            "type": "geojson",
            "data": { "type": "FeatureCollection", "features": [] },
            "cluster": true,
            "clusterRadius": 40
        });
        let spec: SourceSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.id, "cities-source");
        match &spec.kind {
            SourceKind::GeoJson {
                data,
                cluster,
                cluster_max_zoom,
                cluster_radius,
            } => {
                assert!(matches!(data, GeoJsonData::Inline(_)));
                assert_eq!(*cluster, Some(true));
                assert_eq!(*cluster_max_zoom, None);
                assert_eq!(*cluster_radius, Some(40.0));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn url_data_stays_a_string() {
        let spec: SourceSpec = serde_json::from_value(json!({
            "id": "remote",
            "type": "geojson",
            "data": "https://example.com/trips.geojson"
        }))
        .unwrap();
        assert_eq!(
            spec.kind,
            SourceKind::GeoJson {
                data: GeoJsonData::Url("https://example.com/trips.geojson".to_string()),
                cluster: None,
                cluster_max_zoom: None,
                cluster_radius: None,
            }
        );
    }

    #[test]
    fn engine_options_omit_absent_fields() {
        let spec = SourceSpec::geojson("s", GeoJsonData::Url("u".into()));
        assert_eq!(
            spec.engine_options().unwrap(),
            json!({ "type": "geojson", "data": "u" })
        );

        let clustered = spec.with_clustering(Some(14.0), None);
        assert_eq!(
            clustered.engine_options().unwrap(),
            json!({ "type": "geojson", "data": "u", "cluster": true, "clusterMaxZoom": 14.0 })
        );
    }

    #[test]
    fn vector_source_options() {
        let spec = SourceSpec::vector("boundaries", "mapbox://mapbox.country-boundaries-v1");
        assert_eq!(spec.type_name(), "vector");
        assert_eq!(
            spec.engine_options().unwrap(),
            json!({ "type": "vector", "url": "mapbox://mapbox.country-boundaries-v1" })
        );
    }
}
