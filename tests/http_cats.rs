use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use docgate::config::{SeedConfig, SeedSource};
use docgate::{build_router, AppState, BoundaryState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router() -> Router {
    build_router(
        AppState::in_memory(),
        BoundaryState::new(vec![
            SeedConfig {
                key: "ownerId".into(),
                from: SeedSource::Cookie("ownerId".into()),
            },
            SeedConfig {
                key: "ownerId".into(),
                from: SeedSource::Header("x-owner-id".into()),
            },
        ]),
    )
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header(header::COOKIE, format!("theme=dark; ownerId={owner}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(router: &Router, owner: &str, name: &str) -> String {
    let (status, body) = call(
        router,
        "POST",
        "/cats",
        Some(owner),
        Some(json!({ "name": name, "breed": "Maine coon", "age": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ownerId"], json!(owner));
    body["_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn each_owner_lists_only_their_cats() {
    let router = router();
    create(&router, "1", "Nest").await;
    create(&router, "2", "Joe").await;

    let (status, first) = call(&router, "GET", "/cats", Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first.as_array().unwrap().len(), 1);
    assert_eq!(first[0]["name"], json!("Nest"));

    let (_, second) = call(&router, "GET", "/cats", Some("2"), None).await;
    assert_eq!(second.as_array().unwrap().len(), 1);
    assert_eq!(second[0]["name"], json!("Joe"));

    let (_, filtered) = call(&router, "GET", "/cats?name=Joe", Some("1"), None).await;
    assert_eq!(filtered, json!([]));
}

#[tokio::test]
async fn foreign_documents_look_missing() {
    let router = router();
    let id = create(&router, "1", "Nest").await;
    let uri = format!("/cats/one/{id}");

    let (status, _) = call(&router, "GET", &uri, Some("2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(
        &router,
        "POST",
        &format!("{uri}/update"),
        Some("2"),
        Some(json!({ "name": "Stolen" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&router, "DELETE", &uri, Some("2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cat) = call(&router, "GET", &uri, Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cat["name"], json!("Nest"));
}

#[tokio::test]
async fn updates_and_replacements_keep_the_owner() {
    let router = router();
    let id = create(&router, "1", "Nest").await;
    let uri = format!("/cats/one/{id}");

    let (status, updated) = call(
        &router,
        "POST",
        &format!("{uri}/update"),
        Some("1"),
        Some(json!({ "name": "Renamed", "ownerId": "2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], json!("Renamed"));
    assert_eq!(updated["ownerId"], json!("1"));

    let (_, result) = call(
        &router,
        "PATCH",
        &format!("{uri}/update"),
        Some("1"),
        Some(json!({ "age": 6 })),
    )
    .await;
    assert_eq!(result["matchedCount"], json!(1));

    let (status, replaced) = call(
        &router,
        "PATCH",
        &format!("{uri}/replace"),
        Some("1"),
        Some(json!({ "name": "Fresh", "ownerId": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["ownerId"], json!("1"));
    assert!(replaced.get("breed").is_none());

    let (status, read_back) = call(
        &router,
        "POST",
        &format!("{uri}/replace"),
        Some("1"),
        Some(json!({ "name": "Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read_back["name"], json!("Again"));

    let (_, many) = call(
        &router,
        "PATCH",
        "/cats/many",
        Some("1"),
        Some(json!({ "breed": "Golfer" })),
    )
    .await;
    assert_eq!(many["matchedCount"], json!(1));
}

#[tokio::test]
async fn counts_and_distinct_are_scoped() {
    let router = router();
    create(&router, "1", "Nest").await;
    create(&router, "1", "Kit").await;
    create(&router, "2", "Joe").await;

    let (_, count) = call(&router, "GET", "/cats/count", Some("1"), None).await;
    assert_eq!(count, json!({ "count": 2 }));
    let (_, estimated) = call(&router, "GET", "/cats/estimated-count", Some("2"), None).await;
    assert_eq!(estimated, json!(1));
    let (_, names) = call(&router, "GET", "/cats/distinct/name", Some("1"), None).await;
    assert_eq!(names, json!(["Nest", "Kit"]));

    let (_, deleted) = call(&router, "DELETE", "/cats/many", Some("1"), Some(json!({}))).await;
    assert_eq!(deleted, json!({ "deletedCount": 2 }));
    let (_, left) = call(&router, "GET", "/cats/count", Some("2"), None).await;
    assert_eq!(left, json!({ "count": 1 }));
}

#[tokio::test]
async fn requests_without_an_owner_are_unauthorized() {
    let router = router();
    let (status, body) = call(&router, "GET", "/cats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("unauthenticated"));

    let (status, _) = call(
        &router,
        "POST",
        "/cats",
        None,
        Some(json!({ "name": "Ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn header_seed_also_identifies_the_owner() {
    let router = router();
    create(&router, "5", "Nest").await;
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/cats/count")
                .header("x-owner-id", "5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["count"], json!(1));
}

#[tokio::test]
async fn health_and_metrics_are_served() {
    let router = router();
    let (status, body) = call(&router, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));

    create(&router, "1", "Nest").await;
    let response = router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("docgate_access_hooks_applied_total"));
}

#[tokio::test]
async fn query_parameters_match_numeric_fields() {
    let router = router();
    create(&router, "1", "Nest").await;

    let (status, found) = call(&router, "GET", "/cats?age=5", Some("1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["name"], json!("Nest"));

    let (_, both) = call(&router, "GET", "/cats?name=Nest&age=5", Some("1"), None).await;
    assert_eq!(both.as_array().unwrap().len(), 1);

    let (_, none) = call(&router, "GET", "/cats?age=6", Some("1"), None).await;
    assert_eq!(none, json!([]));
}
