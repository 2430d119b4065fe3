use docgate_core_types::{Document, FieldMap};
use serde_json::{Map, Value};

use crate::operation::{HookKind, Operation};

/// Write payload of an update-style operation.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdatePayload {
    /// Operator document (`$set`, `$unset`, `$inc`). Plain top-level fields
    /// are treated as `$set`.
    Modify(Document),
    /// Full replacement body; `_id` is preserved by the collection.
    Replace(Document),
}

impl UpdatePayload {
    /// Force `fields` onto every document the update touches. Forced fields
    /// override anything the caller supplied for the same field.
    pub fn force_fields(&mut self, fields: &FieldMap) {
        match self {
            UpdatePayload::Modify(update) => {
                let mut normalized = normalize_modify(std::mem::take(update));
                for (op, args) in normalized.iter_mut() {
                    if op == "$set" {
                        continue;
                    }
                    if let Value::Object(args) = args {
                        for field in fields.keys() {
                            args.remove(field);
                        }
                    }
                }
                let set = normalized
                    .entry("$set".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(set) = set {
                    for (field, value) in fields {
                        set.insert(field.clone(), value.clone());
                    }
                }
                *update = normalized;
            }
            UpdatePayload::Replace(replacement) => {
                for (field, value) in fields {
                    replacement.insert(field.clone(), value.clone());
                }
            }
        }
    }
}

/// Move plain top-level fields of an update document under `$set`.
pub(crate) fn normalize_modify(update: Document) -> Document {
    let mut normalized = Document::new();
    let mut plain = Map::new();
    for (key, value) in update {
        if key.starts_with('$') {
            normalized.insert(key, value);
        } else {
            plain.insert(key, value);
        }
    }
    if !plain.is_empty() {
        let set = normalized
            .entry("$set".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(set) = set {
            for (key, value) in plain {
                set.entry(key).or_insert(value);
            }
        }
    }
    normalized
}

/// An operation that has been requested but not yet executed. Pre-hooks
/// mutate it; the model executes whatever is left once every hook returns.
#[derive(Clone, Debug)]
pub struct PendingOperation {
    operation: Operation,
    schema: String,
    kind: HookKind,
    filter: Document,
    update: Option<UpdatePayload>,
    documents: Vec<Document>,
}

impl PendingOperation {
    pub fn query(operation: Operation, schema: &str, filter: Document) -> Self {
        Self {
            operation,
            schema: schema.to_string(),
            kind: HookKind::Query,
            filter,
            update: None,
            documents: Vec::new(),
        }
    }

    pub fn query_update(
        operation: Operation,
        schema: &str,
        filter: Document,
        update: UpdatePayload,
    ) -> Self {
        Self {
            update: Some(update),
            ..Self::query(operation, schema, filter)
        }
    }

    pub fn documents(operation: Operation, schema: &str, documents: Vec<Document>) -> Self {
        Self {
            operation,
            schema: schema.to_string(),
            kind: HookKind::Document,
            filter: Document::new(),
            update: None,
            documents,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut Document {
        &mut self.filter
    }

    /// AND `fields` into the filter. On a field collision the given value
    /// replaces the caller's condition.
    pub fn constrain_filter(&mut self, fields: &FieldMap) {
        for (field, value) in fields {
            self.filter.insert(field.clone(), value.clone());
        }
    }

    pub fn update(&self) -> Option<&UpdatePayload> {
        self.update.as_ref()
    }

    pub fn update_mut(&mut self) -> Option<&mut UpdatePayload> {
        self.update.as_mut()
    }

    /// Loaded or about-to-be-written documents of a document-level operation.
    pub fn loaded_documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [Document] {
        &mut self.documents
    }

    pub(crate) fn into_parts(self) -> (Document, Option<UpdatePayload>, Vec<Document>) {
        (self.filter, self.update, self.documents)
    }
}
