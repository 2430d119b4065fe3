pub mod family;
pub mod metrics;
pub mod plugin;
pub mod rule;
pub mod weave;

pub use family::{Families, OperationFamily, UnknownFamily};
pub use plugin::AccessControlPlugin;
pub use rule::{
    define_rule, rules_of, AccessRule, AsyncResolver, EnrichmentAccessor, RuleBook, RuleResolver,
};
pub use weave::{weave, WeaveSummary};
