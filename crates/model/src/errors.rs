use docgate_core_types::DacError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error(transparent)]
    Policy(#[from] DacError),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("document has no _id")]
    MissingId,
    #[error("invalid update: {0}")]
    InvalidUpdate(String),
}

impl ModelError {
    /// The policy error that aborted the operation, if any.
    pub fn policy(&self) -> Option<&DacError> {
        match self {
            ModelError::Policy(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelError> for DacError {
    fn from(value: ModelError) -> Self {
        match value {
            ModelError::Policy(err) => err,
            other => DacError::new(other.to_string()),
        }
    }
}
