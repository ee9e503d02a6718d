use layers::DatasetConfig;

/// Dataset work deferred to a later tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTask {
    MountDataset(DatasetConfig),
    UnmountDataset(String),
}

/// A task tagged with the engine generation it was scheduled against. Tasks
/// from another generation are dropped when they come due.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Scheduled {
    pub generation: u64,
    pub task: SessionTask,
}

impl SessionTask {
    pub fn dataset_id(&self) -> &str {
        match self {
            SessionTask::MountDataset(config) => &config.id,
            SessionTask::UnmountDataset(id) => id,
        }
    }
}
