//! Error of ddll_core

use crate::ddll::DdllKey;
use crate::ddll::Mode;

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ddll-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Node {key} is in mode {actual:?}, expected {expected:?}")]
    InvalidMode {
        key: DdllKey,
        expected: Mode,
        actual: Mode,
    },

    #[error("Node {0} has a pending request in flight")]
    RequestInFlight(DdllKey),

    #[error("Future {0} timeout")]
    FutureTimeout(u64),

    #[error("Bincode serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Bincode deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),

    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IOError")]
    IOError(#[from] std::io::Error),
}
