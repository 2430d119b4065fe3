use std::sync::Arc;
use std::time::Duration;

use docgate_access_control::{
    define_rule, metrics, rules_of, weave, AccessControlPlugin, AccessRule, Families,
    OperationFamily,
};
use docgate_core_types::{DacError, Document, DocumentId, FieldMap};
use docgate_enrichments::{run_with, ContextMap, EnrichmentService};
use docgate_model::{
    Collection, Connection, Model, ModelError, Operation, ReturnDocument, Schema,
};
use serde_json::{json, Value};

use OperationFamily::{Count, Delete, Query, Save, Update};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn seed() -> ContextMap {
    doc(json!({ "global": {} }))
}

fn owner_rule() -> AccessRule {
    AccessRule::from_fn([Save, Query, Update, Delete, Count], |get| {
        let mut fields = FieldMap::new();
        fields.insert("ownerId".into(), get.get("ownerId")?);
        Ok(fields)
    })
}

fn cat_schema() -> Schema {
    let mut schema = Schema::new("Cat");
    define_rule(&mut schema, "ownerValidation", owner_rule());
    schema
}

fn connection() -> Connection {
    Connection::in_memory().with_plugin(Arc::new(AccessControlPlugin::with_service(
        EnrichmentService::new(),
    )))
}

async fn seed_cats(connection: &Connection) {
    connection
        .database()
        .collection("cats")
        .insert(vec![
            doc(json!({ "_id": "a", "name": "Tom", "ownerId": "1" })),
            doc(json!({ "_id": "b", "name": "Felix", "ownerId": "2" })),
            doc(json!({ "_id": "c", "name": "Kitty", "ownerId": "1" })),
        ])
        .await
        .unwrap();
}

fn as_owner(owner: &str) {
    EnrichmentService::new()
        .set_global_enrichment("ownerId", owner)
        .unwrap();
}

fn names(documents: &[Document]) -> Vec<&str> {
    documents
        .iter()
        .filter_map(|doc| doc.get("name").and_then(Value::as_str))
        .collect()
}

#[tokio::test]
async fn save_forces_owner_over_caller_value() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    run_with(seed(), async {
        as_owner("1");
        let saved = cats
            .save(doc(json!({ "name": "Tom", "ownerId": "2" })))
            .await
            .unwrap();
        assert_eq!(saved["ownerId"], json!("1"));
        let stored = cats.aggregate_match(Document::new()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["ownerId"], json!("1"));

        let inserted = cats
            .insert_many(vec![
                doc(json!({ "name": "A" })),
                doc(json!({ "name": "B", "ownerId": "9" })),
            ])
            .await
            .unwrap();
        assert!(inserted.iter().all(|cat| cat["ownerId"] == json!("1")));
    })
    .await;
}

#[tokio::test]
async fn reads_and_counts_only_see_owned_documents() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        let found = cats.find(Document::new()).await.unwrap();
        assert_eq!(names(&found), vec!["Tom", "Kitty"]);

        // caller filter on the constrained field is overridden
        let spoofed = cats.find(doc(json!({ "ownerId": "2" }))).await.unwrap();
        assert_eq!(names(&spoofed), vec!["Tom", "Kitty"]);

        assert!(cats
            .find_one(doc(json!({ "name": "Felix" })))
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            cats.distinct("ownerId", Document::new()).await.unwrap(),
            vec![json!("1")]
        );
        assert_eq!(cats.count_documents(Document::new()).await.unwrap(), 2);
        assert_eq!(cats.estimated_document_count().await.unwrap(), 2);
    })
    .await;
}

#[tokio::test]
async fn updates_are_scoped_and_cannot_reassign_owner() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        let result = cats
            .update_many(
                Document::new(),
                doc(json!({ "breed": "tabby", "ownerId": "2" })),
            )
            .await
            .unwrap();
        assert_eq!(result.matched_count, 2);

        let felix = cats
            .update_one(doc(json!({ "_id": "b" })), doc(json!({ "$set": { "name": "Mine" } })))
            .await
            .unwrap();
        assert_eq!(felix.matched_count, 0);

        let updated = cats
            .find_one_and_update(
                doc(json!({ "_id": "a" })),
                doc(json!({ "$set": { "ownerId": "3" } })),
                ReturnDocument::After,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["ownerId"], json!("1"));

        cats.replace_one(doc(json!({ "_id": "c" })), doc(json!({ "name": "Replaced" })))
            .await
            .unwrap();
        let replaced = cats
            .find_one_and_replace(
                doc(json!({ "_id": "c" })),
                doc(json!({ "name": "Again", "ownerId": "2" })),
                ReturnDocument::After,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced["ownerId"], json!("1"));
        assert_eq!(replaced["name"], json!("Again"));
    })
    .await;

    let raw = connection.database().collection("cats").snapshot();
    let felix = raw.iter().find(|cat| cat["_id"] == json!("b")).unwrap();
    assert_eq!(felix["name"], json!("Felix"));
    assert_eq!(felix["ownerId"], json!("2"));
    assert!(raw
        .iter()
        .filter(|cat| cat["ownerId"] == json!("1"))
        .all(|cat| cat.get("breed").is_some() || cat["_id"] == json!("c")));
}

#[tokio::test]
async fn deletes_are_scoped_and_identity_delete_is_guarded() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    let foreign = connection.database().collection("cats").snapshot()[1].clone();
    let denied_before = metrics::denied("Cat");

    run_with(seed(), async {
        as_owner("1");
        let err = cats.delete_document(&foreign).await.unwrap_err();
        assert_eq!(err.policy(), Some(&DacError::denied("Cat", "ownerId")));

        assert_eq!(
            cats.delete_one(doc(json!({ "_id": "b" })))
                .await
                .unwrap()
                .deleted_count,
            0
        );
        assert!(cats
            .find_one_and_delete(doc(json!({ "_id": "b" })))
            .await
            .unwrap()
            .is_none());

        let own = cats.find_by_id(&DocumentId("a".into())).await.unwrap().unwrap();
        assert_eq!(cats.delete_document(&own).await.unwrap().deleted_count, 1);
        assert_eq!(cats.delete_many(Document::new()).await.unwrap().deleted_count, 1);
    })
    .await;

    assert!(metrics::denied("Cat") > denied_before);
    let raw = connection.database().collection("cats").snapshot();
    assert_eq!(names(&raw), vec!["Felix"]);
}

#[tokio::test]
async fn missing_enrichment_fails_closed() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        let err = cats
            .save(doc(json!({ "name": "Ghost" })))
            .await
            .unwrap_err();
        assert_eq!(err.policy(), Some(&DacError::resolution("Cat", "ownerId")));

        let err = cats.find(Document::new()).await.unwrap_err();
        assert!(matches!(
            err.policy(),
            Some(DacError::EnrichmentResolution { .. })
        ));

        // falsy values do not satisfy a rule
        as_owner("");
        assert!(cats.count_documents(Document::new()).await.is_err());
    })
    .await;
    assert_eq!(connection.database().collection("cats").len(), 3);
}

#[tokio::test]
async fn operations_outside_a_request_context_are_refused() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    let err = cats.find(Document::new()).await.unwrap_err();
    assert_eq!(err.policy(), Some(&DacError::UninitializedContext));
}

#[tokio::test]
async fn schema_scoped_enrichment_wins_over_global() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        let service = EnrichmentService::new();
        service.set_global_enrichment("ownerId", "1").unwrap();
        service.set_enrichment("Cat", "ownerId", "2").unwrap();
        assert_eq!(names(&cats.find(Document::new()).await.unwrap()), vec!["Felix"]);
    })
    .await;
}

#[tokio::test]
async fn constraints_are_resolved_fresh_on_every_call() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        assert_eq!(cats.count_documents(Document::new()).await.unwrap(), 2);
        as_owner("2");
        assert_eq!(cats.count_documents(Document::new()).await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn later_rules_override_earlier_fields() {
    let mut schema = cat_schema();
    define_rule(
        &mut schema,
        "pinned",
        AccessRule::from_fn(Query, |_| Ok(doc(json!({ "ownerId": "2" })))),
    );
    let connection = connection();
    let cats = connection.model(schema);
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        assert_eq!(names(&cats.find(Document::new()).await.unwrap()), vec!["Felix"]);
        // the save family only carries the owner rule
        let saved = cats.save(doc(json!({ "name": "New" }))).await.unwrap();
        assert_eq!(saved["ownerId"], json!("1"));
    })
    .await;
}

#[tokio::test]
async fn redefining_a_rule_replaces_it_in_place() {
    let mut schema = Schema::new("Dog");
    define_rule(&mut schema, "first", AccessRule::from_fn(Query, |_| Ok(FieldMap::new())));
    define_rule(&mut schema, "second", AccessRule::from_fn(Query, |_| Ok(FieldMap::new())));
    define_rule(&mut schema, "first", AccessRule::from_fn(Save, |_| Ok(FieldMap::new())));
    let book = rules_of(&schema).unwrap();
    assert_eq!(book.names(), vec!["first", "second"]);
    assert!(book.get("first").unwrap().applies_to(Save));
    assert!(!book.get("first").unwrap().applies_to(Query));
}

#[tokio::test]
async fn only_families_with_rules_get_hooks() {
    let mut schema = Schema::new("Bird");
    define_rule(
        &mut schema,
        "visible",
        AccessRule::from_fn(Query, |_| Ok(doc(json!({ "visible": true })))),
    );
    let summary = weave(&mut schema, Arc::new(EnrichmentService::new()));
    assert_eq!(summary.installed.len(), 3);
    assert!(summary.covers(Operation::Distinct));
    assert_eq!(schema.hook_count(Operation::Find), 1);
    assert_eq!(schema.hook_count(Operation::CountDocuments), 0);
    assert_eq!(schema.hook_count(Operation::Save), 0);
    assert_eq!(schema.hook_count(Operation::DeleteOne), 0);
    assert_eq!(schema.hook_count(Operation::Aggregate), 0);

    let mut guarded = cat_schema();
    weave(&mut guarded, Arc::new(EnrichmentService::new()));
    // query-scoped filter plus document-scoped identity check
    assert_eq!(guarded.hook_count(Operation::DeleteOne), 2);
    assert_eq!(guarded.hook_count(Operation::Aggregate), 0);
}

#[tokio::test]
async fn unknown_families_never_wire_a_rule() {
    let mut schema = Schema::new("Fish");
    define_rule(
        &mut schema,
        "bogus",
        AccessRule::from_fn(Families::from_names(["aggregate", "remove"]), |_| {
            Err(DacError::new("should never run"))
        }),
    );
    let summary = weave(&mut schema, Arc::new(EnrichmentService::new()));
    assert!(summary.is_empty());

    let mut bare = Schema::new("Plain");
    assert!(weave(&mut bare, Arc::new(EnrichmentService::new())).is_empty());
}

#[tokio::test]
async fn async_resolvers_are_awaited() {
    let mut schema = Schema::new("Cat");
    define_rule(
        &mut schema,
        "ownerValidation",
        AccessRule::from_async_fn([Query, Count], |get| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut fields = FieldMap::new();
            fields.insert("ownerId".into(), get.get("ownerId")?);
            Ok::<_, DacError>(fields)
        }),
    );
    let connection = connection();
    let cats = connection.model(schema);
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("2");
        assert_eq!(cats.count_documents(Document::new()).await.unwrap(), 1);
    })
    .await;
}

#[tokio::test]
async fn aggregate_bypasses_access_rules() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        assert_eq!(cats.aggregate_match(Document::new()).await.unwrap().len(), 3);
    })
    .await;
}

async fn owned_names(cats: Model, owner: &'static str) -> Vec<String> {
    run_with(seed(), async move {
        as_owner(owner);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let found = cats.find(Document::new()).await.unwrap();
        names(&found).into_iter().map(str::to_string).collect()
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_keep_their_own_owner() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;

    let first = tokio::spawn(owned_names(cats.clone(), "1"));
    let second = tokio::spawn(owned_names(cats.clone(), "2"));
    assert_eq!(first.await.unwrap(), vec!["Tom", "Kitty"]);
    assert_eq!(second.await.unwrap(), vec!["Felix"]);
}

#[tokio::test]
async fn applied_hooks_are_counted_per_family() {
    let before = metrics::hooks_applied(Count);
    let connection = connection();
    let cats = connection.model(cat_schema());
    run_with(seed(), async {
        as_owner("1");
        cats.count_documents(Document::new()).await.unwrap();
    })
    .await;
    assert!(metrics::hooks_applied(Count) > before);
}

#[tokio::test]
async fn save_cannot_take_over_a_foreign_id() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        let err = cats
            .save(doc(json!({ "_id": "b", "name": "Hijacked" })))
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateKey("b".into()));
    })
    .await;

    let raw = connection.database().collection("cats").snapshot();
    assert_eq!(raw[1], doc(json!({ "_id": "b", "name": "Felix", "ownerId": "2" })));
}

#[tokio::test]
async fn stale_copy_cannot_delete_a_reassigned_document() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    seed_cats(&connection).await;
    run_with(seed(), async {
        as_owner("1");
        // copy claims ownership the stored document no longer has
        let stale = doc(json!({ "_id": "b", "name": "Felix", "ownerId": "1" }));
        let result = cats.delete_document(&stale).await.unwrap();
        assert_eq!(result.deleted_count, 0);
    })
    .await;

    let raw = connection.database().collection("cats").snapshot();
    assert_eq!(names(&raw), vec!["Tom", "Felix", "Kitty"]);
}

#[tokio::test]
async fn identical_creates_get_identical_owner_fields() {
    let connection = connection();
    let cats = connection.model(cat_schema());
    run_with(seed(), async {
        as_owner("1");
        let first = cats.save(doc(json!({ "name": "Twin" }))).await.unwrap();
        let second = cats.save(doc(json!({ "name": "Twin" }))).await.unwrap();
        assert_eq!(first["ownerId"], second["ownerId"]);
        assert_eq!(first["name"], second["name"]);
        assert_ne!(first["_id"], second["_id"]);
    })
    .await;
}
