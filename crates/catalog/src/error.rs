use engine::EngineError;
use layers::DatasetConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetError {
    /// No ready engine; the call was dropped.
    EngineNotReady,
    InvalidConfig(DatasetConfigError),
    Engine { dataset: String, error: EngineError },
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::EngineNotReady => {
                write!(f, "map is not loaded yet; wait for the engine to become ready")
            }
            DatasetError::InvalidConfig(e) => write!(f, "invalid dataset: {e}"),
            DatasetError::Engine { dataset, error } => {
                write!(f, "dataset {dataset} failed: {error}")
            }
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::InvalidConfig(e) => Some(e),
            DatasetError::Engine { error, .. } => Some(error),
            DatasetError::EngineNotReady => None,
        }
    }
}

impl From<DatasetConfigError> for DatasetError {
    fn from(e: DatasetConfigError) -> Self {
        DatasetError::InvalidConfig(e)
    }
}
