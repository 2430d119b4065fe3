//! Demo resource: cats owned by the principal named in the request.

use chrono::{SecondsFormat, Utc};
use docgate_access_control::{define_rule, AccessRule, OperationFamily};
use docgate_core_types::{Document, DocumentId, FieldMap, ID_FIELD};
use docgate_model::{
    id_filter, Connection, DeleteResult, Model, ModelError, ReturnDocument, Schema, UpdateResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CAT: &str = "Cat";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCat {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default)]
    pub kitten: Vec<String>,
}

impl CreateCat {
    fn into_document(self) -> Document {
        let mut document = Document::new();
        document.insert("name".into(), self.name.into());
        if let Some(age) = self.age {
            document.insert("age".into(), age.into());
        }
        if let Some(breed) = self.breed {
            document.insert("breed".into(), breed.into());
        }
        document.insert(
            "kitten".into(),
            Value::Array(self.kitten.into_iter().map(Value::from).collect()),
        );
        document.insert("createdAt".into(), now().into());
        document
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn cat_schema() -> Schema {
    use OperationFamily::{Count, Delete, Query, Save, Update};

    let mut schema = Schema::new(CAT);
    define_rule(
        &mut schema,
        "ownerValidation",
        AccessRule::from_fn([Save, Query, Update, Delete, Count], |get| {
            let mut fields = FieldMap::new();
            fields.insert("ownerId".into(), get.get("ownerId")?);
            Ok(fields)
        }),
    );
    define_rule(
        &mut schema,
        "updatedAt",
        AccessRule::from_fn([Save, Update], |_| {
            let mut fields = FieldMap::new();
            fields.insert("updatedAt".into(), now().into());
            Ok(fields)
        }),
    );
    schema
}

fn by_id(id: &str) -> Document {
    id_filter(&DocumentId(id.to_string()))
}

#[derive(Clone, Debug)]
pub struct CatsService {
    model: Model,
}

impl CatsService {
    pub fn new(connection: &Connection) -> Self {
        Self {
            model: connection.model(cat_schema()),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub async fn create(&self, cat: CreateCat) -> Result<Document, ModelError> {
        self.model.save(cat.into_document()).await
    }

    pub async fn find_all(&self, filter: Document) -> Result<Vec<Document>, ModelError> {
        self.model.find(filter).await
    }

    pub async fn find_one(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.model.find_by_id(&DocumentId(id.to_string())).await
    }

    pub async fn find_one_and_delete(&self, id: &str) -> Result<Option<Document>, ModelError> {
        self.model.find_one_and_delete(by_id(id)).await
    }

    pub async fn find_one_and_replace(
        &self,
        id: &str,
        replacement: Document,
    ) -> Result<Option<Document>, ModelError> {
        self.model
            .find_one_and_replace(by_id(id), without_id(replacement), ReturnDocument::After)
            .await
    }

    pub async fn find_one_and_update(
        &self,
        id: &str,
        update: Document,
    ) -> Result<Option<Document>, ModelError> {
        self.model
            .find_one_and_update(by_id(id), update, ReturnDocument::After)
            .await
    }

    /// Replace and read back through the access rules.
    pub async fn replace_one(
        &self,
        id: &str,
        replacement: Document,
    ) -> Result<Option<Document>, ModelError> {
        self.model
            .replace_one(by_id(id), without_id(replacement))
            .await?;
        self.find_one(id).await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, ModelError> {
        self.model.update_many(filter, update).await
    }

    pub async fn update_one(&self, id: &str, update: Document) -> Result<UpdateResult, ModelError> {
        self.model.update_one(by_id(id), update).await
    }

    pub async fn delete_one(&self, id: &str) -> Result<DeleteResult, ModelError> {
        self.model.delete_one(by_id(id)).await
    }

    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult, ModelError> {
        self.model.delete_many(filter).await
    }

    pub async fn count_documents(&self, filter: Document) -> Result<u64, ModelError> {
        self.model.count_documents(filter).await
    }

    pub async fn estimated_document_count(&self) -> Result<u64, ModelError> {
        self.model.estimated_document_count().await
    }

    pub async fn distinct(&self, field: &str) -> Result<Vec<Value>, ModelError> {
        self.model.distinct(field, Document::new()).await
    }
}

fn without_id(mut document: Document) -> Document {
    document.remove(ID_FIELD);
    document
}
