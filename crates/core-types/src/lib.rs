use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// A partial set of field constraints produced by an access rule.
pub type FieldMap = Map<String, Value>;

/// Primary key field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// Shared error taxonomy surfaced by every docgate crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DacError {
    #[error("enrichment context is not initialized")]
    UninitializedContext,
    #[error("enrichment \"{key}\" could not be resolved for schema {schema}")]
    EnrichmentResolution { schema: String, key: String },
    #[error("access denied on {schema}: field {field} does not match the active policy")]
    AccessDenied { schema: String, field: String },
    #[error("rule {rule} failed: {message}")]
    Rule { rule: String, message: String },
    #[error("{message}")]
    Message { message: String },
}

impl DacError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn resolution(schema: impl Into<String>, key: impl Into<String>) -> Self {
        Self::EnrichmentResolution {
            schema: schema.into(),
            key: key.into(),
        }
    }

    pub fn denied(schema: impl Into<String>, field: impl Into<String>) -> Self {
        Self::AccessDenied {
            schema: schema.into(),
            field: field.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn of(document: &Document) -> Option<Self> {
        match document.get(ID_FIELD)? {
            Value::String(raw) => Some(Self(raw.clone())),
            other => Some(Self(other.to_string())),
        }
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::String(id.0)
    }
}

/// JavaScript-style truthiness. Enrichment fallback and rule accessors treat
/// `null`, `false`, `0`, `NaN` and `""` as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number
            .as_f64()
            .map(|n| n != 0.0 && !n.is_nan())
            .unwrap_or(true),
        Value::String(raw) => !raw.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
