use crate::validation::ValidationErrors;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeinschmeckerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Knowledge store not ready: {0}")]
    NotReady(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plan compilation error: {0}")]
    Compile(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FeinschmeckerError {
    /// Environmental failures that are expected to clear up on a retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeinschmeckerError::Timeout(_)
                | FeinschmeckerError::Connection(_)
                | FeinschmeckerError::Io(_)
        )
    }

    /// Stable machine-readable name of the error kind, used in task records and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FeinschmeckerError::Validation(_) => "validation",
            FeinschmeckerError::NotReady(_) => "not_ready",
            FeinschmeckerError::Timeout(_) => "timeout",
            FeinschmeckerError::Connection(_) => "connection",
            FeinschmeckerError::Io(_) => "io",
            FeinschmeckerError::Compile(_) => "compile",
            FeinschmeckerError::DataIntegrity(_) => "data_integrity",
            FeinschmeckerError::Serialization(_) => "serialization",
            FeinschmeckerError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, FeinschmeckerError>;
