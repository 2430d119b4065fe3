use docgate_core_types::is_truthy;
use serde_json::{Map, Value};
use tracing::trace;

use crate::context;
use crate::errors::EnrichmentError;

/// Reserved namespace consulted when a schema has no value of its own.
pub const GLOBAL_NAMESPACE: &str = "global";

/// Read side of the enrichment registry, as seen by rule accessors.
pub trait EnrichmentSource: Send + Sync {
    fn enrichment(&self, schema: &str, key: &str) -> Result<Option<Value>, EnrichmentError>;
}

/// Keyed view over the ambient context, namespaced by schema name plus the
/// reserved [`GLOBAL_NAMESPACE`].
#[derive(Clone, Debug, Default)]
pub struct EnrichmentService;

impl EnrichmentService {
    pub fn new() -> Self {
        Self
    }

    pub fn set_enrichment(
        &self,
        schema: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), EnrichmentError> {
        trace!(schema, key, "set enrichment");
        set_namespaced(schema, key, value.into())
    }

    pub fn set_global_enrichment(
        &self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), EnrichmentError> {
        trace!(key, "set global enrichment");
        set_namespaced(GLOBAL_NAMESPACE, key, value.into())
    }

    /// Schema-scoped value, or the global one when the schema-scoped value is
    /// absent or falsy. A falsy schema value (`0`, `""`, `false`) therefore
    /// never shadows the global namespace.
    pub fn get_enrichment(&self, schema: &str, key: &str) -> Result<Option<Value>, EnrichmentError> {
        context::update(|store| {
            let store: &Map<String, Value> = store;
            let scoped = lookup(store, schema, key).filter(|value| is_truthy(value));
            scoped
                .or_else(|| lookup(store, GLOBAL_NAMESPACE, key))
                .cloned()
        })
        .ok_or(EnrichmentError::UninitializedContext)
    }
}

impl EnrichmentSource for EnrichmentService {
    fn enrichment(&self, schema: &str, key: &str) -> Result<Option<Value>, EnrichmentError> {
        self.get_enrichment(schema, key)
    }
}

fn lookup<'a>(store: &'a Map<String, Value>, namespace: &str, key: &str) -> Option<&'a Value> {
    store.get(namespace)?.as_object()?.get(key)
}

fn set_namespaced(namespace: &str, key: &str, value: Value) -> Result<(), EnrichmentError> {
    context::update(|store| {
        let slot = store
            .entry(namespace.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(entries) = slot {
            entries.insert(key.to_string(), value);
        }
    })
    .ok_or(EnrichmentError::UninitializedContext)
}
