use thiserror::Error;

/// Errors raised by the synchronization and fusion core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Mismatched lengths or rates, non-positive rate, or a signal too short
    /// or too flat for the requested operation.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    /// No usable alignment exists between two recordings.
    #[error("synchronization impossible: {0}")]
    SyncImpossible(String),
    /// A tunable is out of range or names an unknown method.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidSignal(msg.into())
    }

    pub(crate) fn sync_impossible(msg: impl Into<String>) -> Self {
        Error::SyncImpossible(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
