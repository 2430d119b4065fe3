use docgate_core_types::DacError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("enrichment context is not initialized")]
    UninitializedContext,
}

impl From<EnrichmentError> for DacError {
    fn from(value: EnrichmentError) -> Self {
        match value {
            EnrichmentError::UninitializedContext => DacError::UninitializedContext,
        }
    }
}
