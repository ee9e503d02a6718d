use foundation::{Timestamp, ViewportError};

pub const CODE_INVALID_CONFIG: &str = "INVALID_CONFIG";
pub const CODE_INIT_ERROR: &str = "INIT_ERROR";
pub const CODE_MAP_ERROR: &str = "MAP_ERROR";

/// Failure reported by a single engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    DuplicateSource(String),
    DuplicateLayer(String),
    UnknownSource(String),
    UnknownLayer(String),
    /// The engine refuses to delete a source while layers still draw from it.
    SourceInUse {
        source: String,
        layers: Vec<String>,
    },
    InvalidExpression {
        layer: String,
        message: String,
    },
    Destroyed,
    Backend(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            EngineError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            EngineError::UnknownSource(id) => write!(f, "no such source: {id}"),
            EngineError::UnknownLayer(id) => write!(f, "no such layer: {id}"),
            EngineError::SourceInUse { source, layers } => {
                write!(f, "source {source} is in use by layers {}", layers.join(", "))
            }
            EngineError::InvalidExpression { layer, message } => {
                write!(f, "invalid expression on layer {layer}: {message}")
            }
            EngineError::Destroyed => write!(f, "engine instance was destroyed"),
            EngineError::Backend(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Problems with an [`EngineConfig`](crate::EngineConfig) found before any
/// engine is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingAccessToken,
    InvalidZoomRange { min: f64, max: f64 },
    InvalidViewport(ViewportError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingAccessToken => write!(
                f,
                "map access token is not configured; set {}",
                crate::config::ACCESS_TOKEN_ENV
            ),
            ConfigError::InvalidZoomRange { min, max } => {
                write!(f, "invalid zoom range: min {min} is not below max {max}")
            }
            ConfigError::InvalidViewport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ViewportError> for ConfigError {
    fn from(e: ViewportError) -> Self {
        ConfigError::InvalidViewport(e)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MapErrorKind {
    /// Invalid viewport or missing credential; no engine was constructed.
    ConfigValidation,
    /// Constructing the engine instance failed.
    EngineInit,
    /// The engine reported an error after construction.
    EngineRuntime,
}

/// Structured error value held by the binding. Never thrown; callers read it
/// alongside the loading state.
#[derive(Debug, Clone, PartialEq)]
pub struct MapError {
    pub kind: MapErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub timestamp: Timestamp,
}

impl MapError {
    pub fn config_validation(err: &ConfigError) -> Self {
        Self {
            kind: MapErrorKind::ConfigValidation,
            message: err.to_string(),
            code: Some(CODE_INVALID_CONFIG.to_string()),
            timestamp: Timestamp::now(),
        }
    }

    pub fn engine_init(message: impl Into<String>) -> Self {
        Self {
            kind: MapErrorKind::EngineInit,
            message: message.into(),
            code: Some(CODE_INIT_ERROR.to_string()),
            timestamp: Timestamp::now(),
        }
    }

    pub fn engine_runtime(message: Option<String>, code: Option<String>) -> Self {
        Self {
            kind: MapErrorKind::EngineRuntime,
            message: message.unwrap_or_else(|| "map error occurred".to_string()),
            code: Some(code.unwrap_or_else(|| CODE_MAP_ERROR.to_string())),
            timestamp: Timestamp::now(),
        }
    }
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for MapError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, MapError, MapErrorKind};

    #[test]
    fn runtime_error_defaults() {
        let e = MapError::engine_runtime(None, None);
        assert_eq!(e.kind, MapErrorKind::EngineRuntime);
        assert_eq!(e.to_string(), "[MAP_ERROR] map error occurred");
    }

    #[test]
    fn config_error_carries_invalid_config_code() {
        let e = MapError::config_validation(&ConfigError::MissingAccessToken);
        assert_eq!(e.code.as_deref(), Some("INVALID_CONFIG"));
        assert!(e.message.contains("MAPBOX_ACCESS_TOKEN"));
    }
}
