//! Turns a schema's rule book into pre-hooks, one set per operation family.

use std::sync::Arc;

use async_trait::async_trait;
use docgate_core_types::{DacError, FieldMap};
use docgate_enrichments::EnrichmentSource;
use docgate_model::{HookScope, Operation, PendingOperation, PreHook, Schema};
use tracing::{debug, warn};

use crate::family::OperationFamily;
use crate::metrics;
use crate::rule::{rules_of, AccessRule, EnrichmentAccessor};

/// Rules of one family captured at weave time, in definition order.
#[derive(Clone)]
struct RuleGroup {
    family: OperationFamily,
    rules: Arc<[(String, AccessRule)]>,
}

impl RuleGroup {
    fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve every rule afresh and shallow-merge the results. Later rules
    /// overwrite fields set by earlier ones.
    async fn merged(&self, accessor: &EnrichmentAccessor) -> Result<FieldMap, DacError> {
        let mut fields = FieldMap::new();
        for (name, rule) in self.rules.iter() {
            match rule.resolve(accessor).await {
                Ok(partial) => fields.extend(partial),
                Err(err) => {
                    metrics::record_resolution_failure(accessor.schema());
                    warn!(
                        schema = accessor.schema(),
                        rule = %name,
                        family = %self.family,
                        %err,
                        "access rule resolution failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(fields)
    }
}

enum Intercept {
    /// Merge constraints into the query filter.
    FilterConstraint(RuleGroup),
    /// Force constraints into the update or replacement payload, optionally
    /// scoping the target filter with the query family first.
    UpdateConstraint {
        scope: Option<RuleGroup>,
        payload: RuleGroup,
    },
    /// Compare a loaded document against the constraints and refuse the
    /// delete on mismatch.
    DeleteGuard(RuleGroup),
    /// Merge constraints into every document about to be written.
    SaveConstraint(RuleGroup),
}

impl Intercept {
    fn family(&self) -> OperationFamily {
        match self {
            Intercept::FilterConstraint(group)
            | Intercept::DeleteGuard(group)
            | Intercept::SaveConstraint(group) => group.family,
            Intercept::UpdateConstraint { payload, .. } => payload.family,
        }
    }
}

struct AccessHook {
    accessor: EnrichmentAccessor,
    intercept: Intercept,
}

#[async_trait]
impl PreHook for AccessHook {
    async fn before(&self, pending: &mut PendingOperation) -> Result<(), DacError> {
        let accessor = &self.accessor;
        match &self.intercept {
            Intercept::FilterConstraint(group) => {
                let fields = group.merged(accessor).await?;
                pending.constrain_filter(&fields);
            }
            Intercept::UpdateConstraint { scope, payload } => {
                let scope_fields = match scope {
                    Some(group) => Some(group.merged(accessor).await?),
                    None => None,
                };
                let forced = payload.merged(accessor).await?;
                if let Some(fields) = scope_fields {
                    pending.constrain_filter(&fields);
                }
                if let Some(update) = pending.update_mut() {
                    update.force_fields(&forced);
                }
            }
            Intercept::DeleteGuard(group) => {
                let expected = group.merged(accessor).await?;
                for document in pending.loaded_documents() {
                    let mismatch = expected
                        .iter()
                        .find(|(field, value)| document.get(field.as_str()) != Some(*value));
                    if let Some((field, _)) = mismatch {
                        metrics::record_denied(accessor.schema());
                        warn!(
                            schema = accessor.schema(),
                            field = %field,
                            "delete refused, document does not satisfy access rules"
                        );
                        return Err(DacError::denied(accessor.schema(), field.as_str()));
                    }
                }
            }
            Intercept::SaveConstraint(group) => {
                let fields = group.merged(accessor).await?;
                for document in pending.documents_mut() {
                    document.extend(fields.clone());
                }
            }
        }
        metrics::record_hook_applied(self.intercept.family());
        debug!(
            schema = accessor.schema(),
            operation = %pending.operation(),
            family = %self.intercept.family(),
            "access constraints applied"
        );
        Ok(())
    }
}

/// Hooks installed by one weaving pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeaveSummary {
    pub installed: Vec<(Operation, OperationFamily)>,
}

impl WeaveSummary {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    pub fn covers(&self, operation: Operation) -> bool {
        self.installed.iter().any(|(op, _)| *op == operation)
    }
}

/// Install access hooks for every family that has at least one rule.
/// Families without rules get no hooks at all. Each hook re-resolves its
/// rules on every call, so constraints always reflect the current request.
pub fn weave(schema: &mut Schema, source: Arc<dyn EnrichmentSource>) -> WeaveSummary {
    let mut summary = WeaveSummary::default();
    let Some(book) = rules_of(schema) else {
        return summary;
    };
    if book.is_empty() {
        return summary;
    }

    let group = |family: OperationFamily| RuleGroup {
        family,
        rules: book.for_family(family).into(),
    };
    let groups: Vec<RuleGroup> = OperationFamily::ALL.into_iter().map(group).collect();
    let query = groups
        .iter()
        .find(|group| group.family == OperationFamily::Query)
        .filter(|group| !group.is_empty())
        .cloned();
    let accessor = EnrichmentAccessor::new(schema.name(), source);

    for group in groups.into_iter().filter(|group| !group.is_empty()) {
        for &operation in group.family.operations() {
            let (scope, intercept) = match group.family {
                OperationFamily::Query | OperationFamily::Count => {
                    (HookScope::QUERY, Intercept::FilterConstraint(group.clone()))
                }
                OperationFamily::Update => (
                    HookScope::QUERY,
                    Intercept::UpdateConstraint {
                        scope: query.clone(),
                        payload: group.clone(),
                    },
                ),
                OperationFamily::Delete => {
                    if operation == Operation::DeleteOne {
                        install(
                            schema,
                            &mut summary,
                            operation,
                            HookScope::DOCUMENT,
                            AccessHook {
                                accessor: accessor.clone(),
                                intercept: Intercept::DeleteGuard(group.clone()),
                            },
                        );
                    }
                    (HookScope::QUERY, Intercept::FilterConstraint(group.clone()))
                }
                OperationFamily::Save => (
                    HookScope::DOCUMENT,
                    Intercept::SaveConstraint(group.clone()),
                ),
            };
            install(
                schema,
                &mut summary,
                operation,
                scope,
                AccessHook {
                    accessor: accessor.clone(),
                    intercept,
                },
            );
        }
    }

    debug!(
        schema = schema.name(),
        hooks = summary.installed.len(),
        "woven access rules"
    );
    summary
}

fn install(
    schema: &mut Schema,
    summary: &mut WeaveSummary,
    operation: Operation,
    scope: HookScope,
    hook: AccessHook,
) {
    let family = hook.intercept.family();
    schema.pre(operation, scope, Arc::new(hook));
    summary.installed.push((operation, family));
}
