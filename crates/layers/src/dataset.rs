use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::layer::LayerSpec;
use crate::source::SourceSpec;

/// One source plus its dependent layers, managed as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: SourceSpec,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetConfigError {
    EmptyId,
    EmptySourceId,
    EmptyLayerId,
    /// A layer references a source other than the dataset's own.
    ForeignSource {
        layer: String,
        source: String,
        expected: String,
    },
    DuplicateLayer(String),
    InvertedZoomRange(String),
}

impl std::fmt::Display for DatasetConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetConfigError::EmptyId => write!(f, "dataset id is empty"),
            DatasetConfigError::EmptySourceId => write!(f, "source id is empty"),
            DatasetConfigError::EmptyLayerId => write!(f, "layer id is empty"),
            DatasetConfigError::ForeignSource {
                layer,
                source,
                expected,
            } => write!(
                f,
                "layer {layer} references source {source}, expected {expected}"
            ),
            DatasetConfigError::DuplicateLayer(id) => write!(f, "duplicate layer id: {id}"),
            DatasetConfigError::InvertedZoomRange(id) => {
                write!(f, "layer {id} has minzoom greater than maxzoom")
            }
        }
    }
}

impl std::error::Error for DatasetConfigError {}

impl DatasetConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: SourceSpec) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            source,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: LayerSpec) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|l| l.id.as_str())
    }

    /// Structural checks that need no engine: every layer draws from this
    /// dataset's source and layer ids are unique within the dataset.
    pub fn validate(&self) -> Result<(), DatasetConfigError> {
        if self.id.is_empty() {
            return Err(DatasetConfigError::EmptyId);
        }
        if self.source.id.is_empty() {
            return Err(DatasetConfigError::EmptySourceId);
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.id.is_empty() {
                return Err(DatasetConfigError::EmptyLayerId);
            }
            if layer.source != self.source.id {
                return Err(DatasetConfigError::ForeignSource {
                    layer: layer.id.clone(),
                    source: layer.source.clone(),
                    expected: self.source.id.clone(),
                });
            }
            if !seen.insert(layer.id.as_str()) {
                return Err(DatasetConfigError::DuplicateLayer(layer.id.clone()));
            }
            if let (Some(min), Some(max)) = (layer.minzoom, layer.maxzoom) {
                if min > max {
                    return Err(DatasetConfigError::InvertedZoomRange(layer.id.clone()));
                }
            }
        }
        Ok(())
    }
}
