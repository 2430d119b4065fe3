pub mod context;
pub mod errors;
pub mod service;

pub use context::{run_with, run_with_sync, ContextMap};
pub use errors::EnrichmentError;
pub use service::{EnrichmentService, EnrichmentSource, GLOBAL_NAMESPACE};
