use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use docgate_core_types::{Document, DocumentId, ID_FIELD};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::filter::{apply_update, matches};
use crate::pending::UpdatePayload;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Which version of a document `find_one_and_*` returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

/// Storage driver seam. Filters and payloads reach the driver after every
/// pre-hook has run.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;
    async fn find(&self, filter: &Document, limit: Option<usize>)
        -> Result<Vec<Document>, ModelError>;
    async fn count(&self, filter: &Document) -> Result<u64, ModelError>;
    async fn insert(&self, documents: Vec<Document>) -> Result<(), ModelError>;
    async fn update(
        &self,
        filter: &Document,
        payload: &UpdatePayload,
        multi: bool,
    ) -> Result<UpdateResult, ModelError>;
    async fn find_one_and_update(
        &self,
        filter: &Document,
        payload: &UpdatePayload,
        returning: ReturnDocument,
    ) -> Result<Option<Document>, ModelError>;
    async fn delete(&self, filter: &Document, multi: bool) -> Result<DeleteResult, ModelError>;
    async fn find_one_and_delete(&self, filter: &Document) -> Result<Option<Document>, ModelError>;
}

/// Insertion-ordered in-memory collection.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored documents regardless of any policy.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Raw copy of every stored document, bypassing interception.
    pub fn snapshot(&self) -> Vec<Document> {
        self.documents.read().clone()
    }
}

fn require_id(document: &Document) -> Result<DocumentId, ModelError> {
    DocumentId::of(document).ok_or(ModelError::MissingId)
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, ModelError> {
        let guard = self.documents.read();
        Ok(guard
            .iter()
            .filter(|doc| matches(doc, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &Document) -> Result<u64, ModelError> {
        let guard = self.documents.read();
        Ok(guard.iter().filter(|doc| matches(doc, filter)).count() as u64)
    }

    async fn insert(&self, documents: Vec<Document>) -> Result<(), ModelError> {
        let mut guard = self.documents.write();
        let mut seen: HashSet<DocumentId> = guard.iter().filter_map(DocumentId::of).collect();
        for document in &documents {
            let id = require_id(document)?;
            if !seen.insert(id.clone()) {
                return Err(ModelError::DuplicateKey(id.0));
            }
        }
        guard.extend(documents);
        Ok(())
    }

    async fn update(
        &self,
        filter: &Document,
        payload: &UpdatePayload,
        multi: bool,
    ) -> Result<UpdateResult, ModelError> {
        let mut guard = self.documents.write();
        let mut result = UpdateResult::default();
        // Applied to copies and committed only once every match succeeded.
        let mut staged = Vec::new();
        for (index, document) in guard.iter().enumerate() {
            if !matches(document, filter) {
                continue;
            }
            result.matched_count += 1;
            let mut updated = document.clone();
            if apply_update(&mut updated, payload)? {
                result.modified_count += 1;
                staged.push((index, updated));
            }
            if !multi {
                break;
            }
        }
        for (index, updated) in staged {
            guard[index] = updated;
        }
        Ok(result)
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        payload: &UpdatePayload,
        returning: ReturnDocument,
    ) -> Result<Option<Document>, ModelError> {
        let mut guard = self.documents.write();
        let Some(document) = guard.iter_mut().find(|doc| matches(doc, filter)) else {
            return Ok(None);
        };
        let before = document.clone();
        apply_update(document, payload)?;
        Ok(Some(match returning {
            ReturnDocument::Before => before,
            ReturnDocument::After => document.clone(),
        }))
    }

    async fn delete(&self, filter: &Document, multi: bool) -> Result<DeleteResult, ModelError> {
        let mut guard = self.documents.write();
        let mut deleted = 0u64;
        guard.retain(|doc| {
            if (multi || deleted == 0) && matches(doc, filter) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(DeleteResult {
            deleted_count: deleted,
        })
    }

    async fn find_one_and_delete(&self, filter: &Document) -> Result<Option<Document>, ModelError> {
        let mut guard = self.documents.write();
        let position = guard.iter().position(|doc| matches(doc, filter));
        Ok(position.map(|index| guard.remove(index)))
    }
}

/// Named in-memory collections shared by a connection.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Build an `_id` equality filter.
pub fn id_filter(id: &DocumentId) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), id.clone().into());
    filter
}
