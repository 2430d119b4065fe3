use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use docgate_core_types::{Document, DocumentId, ID_FIELD};
use serde_json::Value;
use tracing::trace;

use crate::collection::{id_filter, Collection, DeleteResult, ReturnDocument, UpdateResult};
use crate::errors::ModelError;
use crate::operation::Operation;
use crate::pending::{PendingOperation, UpdatePayload};
use crate::schema::Schema;

/// A compiled schema bound to a collection. Every operation runs the
/// schema's pre-hooks before it reaches the collection.
#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    collection: Arc<dyn Collection>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("schema", &self.schema)
            .field("collection", &self.collection.name())
            .finish()
    }
}

impl Model {
    pub fn new(schema: Schema, collection: Arc<dyn Collection>) -> Self {
        Self {
            schema: Arc::new(schema),
            collection,
        }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn intercept(&self, mut pending: PendingOperation) -> Result<PendingOperation, ModelError> {
        let operation = pending.operation();
        for hook in self.schema.hooks_for(operation, pending.kind()) {
            trace!(schema = self.name(), %operation, "running pre-hook");
            hook.before(&mut pending).await?;
        }
        Ok(pending)
    }

    async fn intercept_filter(
        &self,
        operation: Operation,
        filter: Document,
    ) -> Result<Document, ModelError> {
        let pending = PendingOperation::query(operation, self.name(), filter);
        let (filter, _, _) = self.intercept(pending).await?.into_parts();
        Ok(filter)
    }

    async fn intercept_update(
        &self,
        operation: Operation,
        filter: Document,
        payload: UpdatePayload,
    ) -> Result<(Document, UpdatePayload), ModelError> {
        let pending = PendingOperation::query_update(operation, self.name(), filter, payload.clone());
        let (filter, update, _) = self.intercept(pending).await?.into_parts();
        Ok((filter, update.unwrap_or(payload)))
    }

    async fn intercept_documents(
        &self,
        operation: Operation,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>, ModelError> {
        let pending = PendingOperation::documents(operation, self.name(), documents);
        let (_, _, documents) = self.intercept(pending).await?.into_parts();
        Ok(documents)
    }

    pub async fn find(&self, filter: Document) -> Result<Vec<Document>, ModelError> {
        let filter = self.intercept_filter(Operation::Find, filter).await?;
        self.collection.find(&filter, None).await
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<Document>, ModelError> {
        let filter = self.intercept_filter(Operation::FindOne, filter).await?;
        Ok(self.collection.find(&filter, Some(1)).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, ModelError> {
        self.find_one(id_filter(id)).await
    }

    /// Unique values of `field` across matching documents, in first-seen order.
    pub async fn distinct(&self, field: &str, filter: Document) -> Result<Vec<Value>, ModelError> {
        let filter = self.intercept_filter(Operation::Distinct, filter).await?;
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for document in self.collection.find(&filter, None).await? {
            let candidates = match document.get(field) {
                Some(Value::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };
            for value in candidates {
                if seen.insert(value.to_string()) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    pub async fn count_documents(&self, filter: Document) -> Result<u64, ModelError> {
        let filter = self.intercept_filter(Operation::CountDocuments, filter).await?;
        self.collection.count(&filter).await
    }

    /// Count with no caller filter. Conditions added by pre-hooks are honored.
    pub async fn estimated_document_count(&self) -> Result<u64, ModelError> {
        let filter = self
            .intercept_filter(Operation::EstimatedDocumentCount, Document::new())
            .await?;
        self.collection.count(&filter).await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, ModelError> {
        let (filter, payload) = self
            .intercept_update(Operation::UpdateOne, filter, UpdatePayload::Modify(update))
            .await?;
        self.collection.update(&filter, &payload, false).await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, ModelError> {
        let (filter, payload) = self
            .intercept_update(Operation::UpdateMany, filter, UpdatePayload::Modify(update))
            .await?;
        self.collection.update(&filter, &payload, true).await
    }

    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> Result<Option<Document>, ModelError> {
        let (filter, payload) = self
            .intercept_update(
                Operation::FindOneAndUpdate,
                filter,
                UpdatePayload::Modify(update),
            )
            .await?;
        self.collection
            .find_one_and_update(&filter, &payload, returning)
            .await
    }

    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
    ) -> Result<UpdateResult, ModelError> {
        let (filter, payload) = self
            .intercept_update(
                Operation::ReplaceOne,
                filter,
                UpdatePayload::Replace(replacement),
            )
            .await?;
        self.collection.update(&filter, &payload, false).await
    }

    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        returning: ReturnDocument,
    ) -> Result<Option<Document>, ModelError> {
        let (filter, payload) = self
            .intercept_update(
                Operation::FindOneAndReplace,
                filter,
                UpdatePayload::Replace(replacement),
            )
            .await?;
        self.collection
            .find_one_and_update(&filter, &payload, returning)
            .await
    }

    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, ModelError> {
        let filter = self.intercept_filter(Operation::DeleteOne, filter).await?;
        self.collection.delete(&filter, false).await
    }

    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult, ModelError> {
        let filter = self.intercept_filter(Operation::DeleteMany, filter).await?;
        self.collection.delete(&filter, true).await
    }

    pub async fn find_one_and_delete(
        &self,
        filter: Document,
    ) -> Result<Option<Document>, ModelError> {
        let filter = self
            .intercept_filter(Operation::FindOneAndDelete, filter)
            .await?;
        self.collection.find_one_and_delete(&filter).await
    }

    /// Delete a document that was already loaded, addressed by its `_id`.
    /// Runs the document-level `deleteOne` hooks against the loaded values,
    /// then the query-level ones against the `_id` filter, so the stored
    /// document must still match when the delete executes.
    pub async fn delete_document(&self, document: &Document) -> Result<DeleteResult, ModelError> {
        let id = DocumentId::of(document).ok_or(ModelError::MissingId)?;
        self.intercept_documents(Operation::DeleteOne, vec![document.clone()])
            .await?;
        let filter = self
            .intercept_filter(Operation::DeleteOne, id_filter(&id))
            .await?;
        self.collection.delete(&filter, false).await
    }

    /// Create one document, generating an `_id` when it has none. An `_id`
    /// that is already stored fails with [`ModelError::DuplicateKey`].
    pub async fn save(&self, document: Document) -> Result<Document, ModelError> {
        let documents = self
            .intercept_documents(Operation::Save, vec![with_id(document)])
            .await?;
        let document = documents.into_iter().next().ok_or(ModelError::MissingId)?;
        self.collection.insert(vec![document.clone()]).await?;
        Ok(document)
    }

    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<Document>, ModelError> {
        let documents = documents.into_iter().map(with_id).collect();
        let documents = self
            .intercept_documents(Operation::InsertMany, documents)
            .await?;
        self.collection.insert(documents.clone()).await?;
        Ok(documents)
    }

    /// `$match`-style read straight from the collection. Aggregations are not
    /// intercepted, so no pre-hook constrains this filter.
    pub async fn aggregate_match(&self, filter: Document) -> Result<Vec<Document>, ModelError> {
        trace!(schema = self.name(), "aggregate bypasses pre-hooks");
        self.collection.find(&filter, None).await
    }
}

fn with_id(mut document: Document) -> Document {
    if !document.contains_key(ID_FIELD) {
        document.insert(ID_FIELD.to_string(), DocumentId::new().into());
    }
    document
}
