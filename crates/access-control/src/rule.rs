//! Rule definition API: named, family-tagged constraint resolvers stored on a
//! schema until the weaving pass turns them into hooks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use docgate_core_types::{is_truthy, DacError, FieldMap};
use docgate_enrichments::EnrichmentSource;
use docgate_model::Schema;
use serde_json::Value;
use tracing::debug;

use crate::family::{Families, OperationFamily};

/// Lookup handle passed to resolvers, bound to one schema name.
#[derive(Clone)]
pub struct EnrichmentAccessor {
    schema: Arc<str>,
    source: Arc<dyn EnrichmentSource>,
}

impl EnrichmentAccessor {
    pub fn new(schema: &str, source: Arc<dyn EnrichmentSource>) -> Self {
        Self {
            schema: Arc::from(schema),
            source,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Resolve `key` for the bound schema, falling back to the global
    /// namespace. Missing or falsy values fail with
    /// [`DacError::EnrichmentResolution`]; a call outside any request
    /// context fails with [`DacError::UninitializedContext`].
    pub fn get(&self, key: &str) -> Result<Value, DacError> {
        match self.source.enrichment(&self.schema, key)? {
            Some(value) if is_truthy(&value) => Ok(value),
            _ => Err(DacError::resolution(self.schema.as_ref(), key)),
        }
    }
}

impl fmt::Debug for EnrichmentAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentAccessor")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Produces the field constraints of one rule for the current request.
#[async_trait]
pub trait RuleResolver: Send + Sync {
    async fn resolve(&self, accessor: &EnrichmentAccessor) -> Result<FieldMap, DacError>;
}

#[async_trait]
impl<F> RuleResolver for F
where
    F: Fn(&EnrichmentAccessor) -> Result<FieldMap, DacError> + Send + Sync,
{
    async fn resolve(&self, accessor: &EnrichmentAccessor) -> Result<FieldMap, DacError> {
        (self)(accessor)
    }
}

/// Adapter for resolvers that need to await.
pub struct AsyncResolver<F>(F);

impl<F, Fut> AsyncResolver<F>
where
    F: Fn(EnrichmentAccessor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldMap, DacError>> + Send + 'static,
{
    pub fn new(resolver: F) -> Self {
        Self(resolver)
    }
}

#[async_trait]
impl<F, Fut> RuleResolver for AsyncResolver<F>
where
    F: Fn(EnrichmentAccessor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldMap, DacError>> + Send + 'static,
{
    async fn resolve(&self, accessor: &EnrichmentAccessor) -> Result<FieldMap, DacError> {
        (self.0)(accessor.clone()).await
    }
}

#[derive(Clone)]
pub struct AccessRule {
    families: Families,
    resolver: Arc<dyn RuleResolver>,
}

impl AccessRule {
    pub fn new(families: impl Into<Families>, resolver: impl RuleResolver + 'static) -> Self {
        Self {
            families: families.into(),
            resolver: Arc::new(resolver),
        }
    }

    /// Same as [`AccessRule::new`] but pins the closure signature so the
    /// argument type can be left to inference.
    pub fn from_fn<F>(families: impl Into<Families>, resolver: F) -> Self
    where
        F: Fn(&EnrichmentAccessor) -> Result<FieldMap, DacError> + Send + Sync + 'static,
    {
        Self::new(families, resolver)
    }

    pub fn from_async_fn<F, Fut>(families: impl Into<Families>, resolver: F) -> Self
    where
        F: Fn(EnrichmentAccessor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FieldMap, DacError>> + Send + 'static,
    {
        Self::new(families, AsyncResolver::new(resolver))
    }

    pub fn families(&self) -> &Families {
        &self.families
    }

    pub fn applies_to(&self, family: OperationFamily) -> bool {
        self.families.contains(family)
    }

    pub async fn resolve(&self, accessor: &EnrichmentAccessor) -> Result<FieldMap, DacError> {
        self.resolver.resolve(accessor).await
    }
}

impl fmt::Debug for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessRule")
            .field("families", &self.families)
            .finish_non_exhaustive()
    }
}

/// Rules attached to a schema, kept in first-definition order.
#[derive(Clone, Debug, Default)]
pub struct RuleBook {
    rules: Vec<(String, AccessRule)>,
}

impl RuleBook {
    /// Insert or replace. A redefined name keeps its original position and
    /// the previous rule is returned.
    pub fn insert(&mut self, name: impl Into<String>, rule: AccessRule) -> Option<AccessRule> {
        let name = name.into();
        match self.rules.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, rule)),
            None => {
                self.rules.push((name, rule));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&AccessRule> {
        self.rules
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, rule)| rule)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AccessRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Rules tagged with `family`, in definition order.
    pub fn for_family(&self, family: OperationFamily) -> Vec<(String, AccessRule)> {
        self.rules
            .iter()
            .filter(|(_, rule)| rule.applies_to(family))
            .cloned()
            .collect()
    }
}

/// Attach `rule` under `name` to the schema. Takes effect once the schema is
/// woven, which happens when its model is first built.
pub fn define_rule(schema: &mut Schema, name: impl Into<String>, rule: AccessRule) {
    if schema.metadata::<RuleBook>().is_none() {
        schema.insert_metadata(RuleBook::default());
    }
    let name = name.into();
    if let Some(book) = schema.metadata_mut::<RuleBook>() {
        if book.insert(name.clone(), rule).is_some() {
            debug!(rule = %name, "access rule redefined");
        }
    }
}

pub fn rules_of(schema: &Schema) -> Option<&RuleBook> {
    schema.metadata::<RuleBook>()
}
