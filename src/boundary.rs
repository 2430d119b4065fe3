//! Request boundary: every inbound request runs inside its own enrichment
//! context, seeded with an empty global namespace.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use docgate_enrichments::{run_with, ContextMap, EnrichmentService, GLOBAL_NAMESPACE};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::config::{SeedConfig, SeedSource};

/// Fresh context contents for one unit of work.
pub fn base_seed() -> ContextMap {
    let mut seed = ContextMap::new();
    seed.insert(GLOBAL_NAMESPACE.to_string(), Value::Object(Map::new()));
    seed
}

/// Run background work (jobs, scripts) inside a fresh seeded context.
pub async fn with_background_context<F>(work: F) -> F::Output
where
    F: Future,
{
    run_with(base_seed(), work).await
}

#[derive(Clone, Debug)]
pub struct BoundaryState {
    seeds: Arc<[SeedConfig]>,
    enrichments: EnrichmentService,
}

impl BoundaryState {
    pub fn new(seeds: Vec<SeedConfig>) -> Self {
        Self {
            seeds: seeds.into(),
            enrichments: EnrichmentService::new(),
        }
    }

    fn apply_seeds(&self, headers: &HeaderMap) {
        for seed in self.seeds.iter() {
            let Some(value) = extract(headers, &seed.from) else {
                continue;
            };
            trace!(key = %seed.key, "seeding global enrichment");
            if let Err(err) = self.enrichments.set_global_enrichment(&seed.key, value) {
                warn!(key = %seed.key, %err, "failed to seed enrichment");
            }
        }
    }
}

/// axum middleware, installed with `middleware::from_fn_with_state`.
pub async fn enrichment_boundary(
    State(state): State<BoundaryState>,
    request: Request,
    next: Next,
) -> Response {
    run_with(base_seed(), async move {
        state.apply_seeds(request.headers());
        next.run(request).await
    })
    .await
}

fn extract(headers: &HeaderMap, source: &SeedSource) -> Option<String> {
    match source {
        SeedSource::Header(name) => headers
            .get(name.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        SeedSource::Cookie(name) => headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name.as_str())
            .map(|(_, value)| value.to_string()),
    }
}
