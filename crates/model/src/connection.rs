use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::collection::MemoryDatabase;
use crate::model::Model;
use crate::schema::Schema;

/// Applied to every schema exactly once, when the schema is compiled into a
/// model on a connection.
pub trait SchemaPlugin: Send + Sync {
    fn apply(&self, schema: &mut Schema);
}

/// Provider token for a model, scoped by connection name when one is given.
pub fn model_token(model: &str, connection: Option<&str>) -> String {
    match connection {
        None => format!("{model}ModelDAC"),
        Some(connection) => format!("{connection}Connection/{model}ModelDAC"),
    }
}

/// Compiles schemas into models backed by one database.
pub struct Connection {
    name: Option<String>,
    database: Arc<MemoryDatabase>,
    plugins: Vec<Arc<dyn SchemaPlugin>>,
    models: DashMap<String, Model>,
}

impl Connection {
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self {
            name: None,
            database,
            plugins: Vec::new(),
            models: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDatabase::new()))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn SchemaPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn database(&self) -> Arc<MemoryDatabase> {
        Arc::clone(&self.database)
    }

    /// Compile `schema`. A model already compiled under the same name is
    /// returned as is, so plugins never run twice for one schema name.
    pub fn model(&self, schema: Schema) -> Model {
        self.models
            .entry(schema.name().to_string())
            .or_insert_with(|| {
                let mut schema = schema;
                for plugin in &self.plugins {
                    plugin.apply(&mut schema);
                }
                let collection = self.database.collection(&schema.collection());
                debug!(
                    model = schema.name(),
                    collection = %schema.collection(),
                    token = %model_token(schema.name(), self.name.as_deref()),
                    "compiled model"
                );
                Model::new(schema, collection)
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Model> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    pub fn token(&self, model: &str) -> String {
        model_token(model, self.name.as_deref())
    }
}
