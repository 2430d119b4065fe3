use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use docgate_core_types::DacError;

use crate::operation::{HookKind, HookScope, Operation};
use crate::pending::PendingOperation;

/// Interception point that runs before an operation executes. Returning
/// `Ok(())` lets the operation proceed; an error aborts it and is returned
/// to the caller unchanged.
#[async_trait]
pub trait PreHook: Send + Sync {
    async fn before(&self, pending: &mut PendingOperation) -> Result<(), DacError>;
}

struct RegisteredHook {
    operation: Operation,
    scope: HookScope,
    hook: Arc<dyn PreHook>,
}

/// Schema definition: a name, an ordered list of pre-hooks and typed static
/// metadata attached by plugins.
pub struct Schema {
    name: String,
    collection: Option<String>,
    hooks: Vec<RegisteredHook>,
    metadata: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            hooks: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing collection name; defaults to the lowercased schema name plus `s`.
    pub fn collection(&self) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()))
    }

    pub fn pre(&mut self, operation: Operation, scope: HookScope, hook: Arc<dyn PreHook>) {
        self.hooks.push(RegisteredHook {
            operation,
            scope,
            hook,
        });
    }

    /// Hooks for `operation` invoked as `kind`, in registration order.
    pub fn hooks_for(
        &self,
        operation: Operation,
        kind: HookKind,
    ) -> impl Iterator<Item = &Arc<dyn PreHook>> + '_ {
        self.hooks
            .iter()
            .filter(move |entry| entry.operation == operation && entry.scope.covers(kind))
            .map(|entry| &entry.hook)
    }

    pub fn hook_count(&self, operation: Operation) -> usize {
        self.hooks
            .iter()
            .filter(|entry| entry.operation == operation)
            .count()
    }

    pub fn insert_metadata<T>(&mut self, value: T)
    where
        T: Any + Send + Sync,
    {
        self.metadata.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn metadata<T>(&self) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.metadata
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn metadata_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Any + Send + Sync,
    {
        self.metadata
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("collection", &self.collection())
            .field("hooks", &self.hooks.len())
            .field("metadata", &self.metadata.len())
            .finish()
    }
}
