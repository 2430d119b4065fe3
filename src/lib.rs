pub mod boundary;
pub mod cats;
pub mod cli;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod server;
pub mod telemetry;

pub use boundary::{enrichment_boundary, with_background_context, BoundaryState};
pub use cats::{cat_schema, CatsService, CreateCat};
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult};
pub use server::{build_router, AppState};
