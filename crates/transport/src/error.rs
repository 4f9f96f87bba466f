//! Error of ddll_transport

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DDLL error: {0}")]
    Core(#[from] ddll_core::Error),

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("Node {0} already exists")]
    NodeAlreadyExists(String),

    #[error("Node {0} not found")]
    NodeNotFound(String),

    #[error("Node {0} crashed")]
    NodeCrashed(String),

    #[error("Node {node} finished with unexpected event {event}")]
    UnexpectedEvent { node: String, event: String },

    #[error("No position found for {0}")]
    ResolveFailed(String),

    #[error("Simulation did not settle after {0} steps")]
    NotIdle(u64),

    #[error("Ring is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Invalid logging level: {0}")]
    InvalidLoggingLevel(String),

    #[error("Failed on lock node state")]
    NodeSyncLockError,
}
