use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{middleware, Json, Router};
use docgate_access_control::AccessControlPlugin;
use docgate_core_types::Document;
use docgate_enrichments::EnrichmentService;
use docgate_model::{Connection, DeleteResult, UpdateResult};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::boundary::{enrichment_boundary, BoundaryState};
use crate::cats::{CatsService, CreateCat};
use crate::config::AppConfig;
use crate::errors::{ApiError, ApiResult};
use crate::metrics::{metrics_handler, register_metrics};

#[derive(Clone)]
pub struct AppState {
    pub cats: CatsService,
}

impl AppState {
    /// In-memory connection with access control woven into every model.
    pub fn in_memory() -> Self {
        let plugin = AccessControlPlugin::with_service(EnrichmentService::new());
        let connection = Connection::in_memory().with_plugin(Arc::new(plugin));
        Self {
            cats: CatsService::new(&connection),
        }
    }
}

pub fn build_router(state: AppState, boundary: BoundaryState) -> Router {
    register_metrics();
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(cat_routes())
        .with_state(state)
        .layer(middleware::from_fn_with_state(boundary, enrichment_boundary))
        .layer(cors_layer())
}

fn cat_routes() -> Router<AppState> {
    Router::new()
        .route("/cats", post(create_cat).get(find_cats))
        .route("/cats/one/:id", get(find_cat).delete(find_and_delete_cat))
        .route(
            "/cats/one/:id/update",
            post(find_and_update_cat).patch(update_cat),
        )
        .route(
            "/cats/one/:id/replace",
            patch(find_and_replace_cat).post(replace_cat),
        )
        .route("/cats/many", patch(update_cats).delete(delete_cats))
        .route("/cats/count", get(count_cats))
        .route("/cats/estimated-count", get(estimated_count))
        .route("/cats/distinct/:field", get(distinct_values))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.addr))?;
    let router = build_router(
        AppState::in_memory(),
        BoundaryState::new(config.boundary.seeds.clone()),
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "docgate listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

/// Query values are read as JSON scalars. A value that parses to something
/// other than a string also matches its literal text, so `?age=5` finds a
/// numeric `5` and `?name=5` still finds the string `"5"`.
fn query_filter(params: BTreeMap<String, String>) -> Document {
    params
        .into_iter()
        .map(|(key, raw)| {
            let condition = match serde_json::from_str::<Value>(&raw) {
                Ok(parsed @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => {
                    json!({ "$in": [parsed, raw] })
                }
                _ => Value::String(raw),
            };
            (key, condition)
        })
        .collect()
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_cat(
    State(state): State<AppState>,
    Json(cat): Json<CreateCat>,
) -> ApiResult<impl IntoResponse> {
    let created = state.cats.create(cat).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn find_cats(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(state.cats.find_all(query_filter(params)).await?))
}

async fn find_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    let cat = state.cats.find_one(&id).await?;
    cat.map(Json).ok_or(ApiError::NotFound("cat"))
}

async fn find_and_delete_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    let cat = state.cats.find_one_and_delete(&id).await?;
    cat.map(Json).ok_or(ApiError::NotFound("cat"))
}

async fn find_and_replace_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(replacement): Json<Document>,
) -> ApiResult<Json<Document>> {
    let cat = state.cats.find_one_and_replace(&id, replacement).await?;
    cat.map(Json).ok_or(ApiError::NotFound("cat"))
}

async fn find_and_update_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<Document>,
) -> ApiResult<Json<Document>> {
    let cat = state.cats.find_one_and_update(&id, update).await?;
    cat.map(Json).ok_or(ApiError::NotFound("cat"))
}

async fn replace_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(replacement): Json<Document>,
) -> ApiResult<Json<Option<Document>>> {
    Ok(Json(state.cats.replace_one(&id, replacement).await?))
}

async fn update_cat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<Document>,
) -> ApiResult<Json<UpdateResult>> {
    Ok(Json(state.cats.update_one(&id, update).await?))
}

async fn update_cats(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
    Json(update): Json<Document>,
) -> ApiResult<Json<UpdateResult>> {
    Ok(Json(
        state.cats.update_many(query_filter(params), update).await?,
    ))
}

async fn delete_cats(
    State(state): State<AppState>,
    filter: Option<Json<Document>>,
) -> ApiResult<Json<DeleteResult>> {
    let filter = filter.map(|Json(filter)| filter).unwrap_or_default();
    Ok(Json(state.cats.delete_many(filter).await?))
}

async fn count_cats(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let count = state.cats.count_documents(query_filter(params)).await?;
    Ok(Json(json!({ "count": count })))
}

async fn estimated_count(State(state): State<AppState>) -> ApiResult<Json<u64>> {
    Ok(Json(state.cats.estimated_document_count().await?))
}

async fn distinct_values(
    State(state): State<AppState>,
    Path(field): Path<String>,
) -> ApiResult<Json<Vec<Value>>> {
    Ok(Json(state.cats.distinct(&field).await?))
}
