use std::sync::Arc;

use docgate_enrichments::{EnrichmentService, EnrichmentSource};
use docgate_model::{Schema, SchemaPlugin};

use crate::weave::weave;

/// Schema plugin that weaves access rules into every model built on a
/// connection.
#[derive(Clone)]
pub struct AccessControlPlugin {
    source: Arc<dyn EnrichmentSource>,
}

impl AccessControlPlugin {
    pub fn new(source: Arc<dyn EnrichmentSource>) -> Self {
        Self { source }
    }

    pub fn with_service(service: EnrichmentService) -> Self {
        Self::new(Arc::new(service))
    }
}

impl SchemaPlugin for AccessControlPlugin {
    fn apply(&self, schema: &mut Schema) {
        weave(schema, Arc::clone(&self.source));
    }
}
