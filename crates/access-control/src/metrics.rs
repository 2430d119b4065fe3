use lazy_static::lazy_static;
use prometheus::{core::Collector, opts, IntCounterVec, Registry};
use tracing::error;

use crate::family::OperationFamily;

lazy_static! {
    static ref HOOKS_APPLIED: IntCounterVec = IntCounterVec::new(
        opts!(
            "docgate_access_hooks_applied_total",
            "Access constraints applied grouped by operation family"
        ),
        &["family"]
    )
    .unwrap();
    static ref ACCESS_DENIED: IntCounterVec = IntCounterVec::new(
        opts!(
            "docgate_access_denied_total",
            "Identity-checked deletes refused grouped by schema"
        ),
        &["schema"]
    )
    .unwrap();
    static ref RESOLUTION_FAILURES: IntCounterVec = IntCounterVec::new(
        opts!(
            "docgate_access_resolution_failures_total",
            "Rule resolvers that failed grouped by schema"
        ),
        &["schema"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register access control metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, HOOKS_APPLIED.clone());
    register(registry, ACCESS_DENIED.clone());
    register(registry, RESOLUTION_FAILURES.clone());
}

pub fn record_hook_applied(family: OperationFamily) {
    HOOKS_APPLIED.with_label_values(&[family.as_str()]).inc();
}

pub fn record_denied(schema: &str) {
    ACCESS_DENIED.with_label_values(&[schema]).inc();
}

pub fn record_resolution_failure(schema: &str) {
    RESOLUTION_FAILURES.with_label_values(&[schema]).inc();
}

pub fn hooks_applied(family: OperationFamily) -> u64 {
    HOOKS_APPLIED.with_label_values(&[family.as_str()]).get()
}

pub fn denied(schema: &str) -> u64 {
    ACCESS_DENIED.with_label_values(&[schema]).get()
}
