//! HTTP API server.
//!
//! Thin JSON surface over the ingestion, store, and QA components.
//! Authentication is an upstream concern: the server trusts the identity
//! injected by the gateway in the `x-user-id` / `x-user-role` headers and
//! only enforces ownership rules on top of it.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents` | Upload (multipart: file, title, tags) |
//! | `GET`  | `/documents` | Filtered, paginated listing |
//! | `GET`  | `/documents/{id}` | Document detail incl. extracted text |
//! | `PUT`  | `/documents/{id}` | Update title and/or replace tags |
//! | `DELETE` | `/documents/{id}` | Soft delete (204, idempotent) |
//! | `GET`  | `/search` | Substring search over title and text |
//! | `POST` | `/qa/{document_id}` | Ask a question about one document |
//! | `GET`  | `/admin/stats` | Store counters (admin role) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "..." } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `precondition_failed` (409), `answer_engine` (502),
//! `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::OpenAiEngine;
use crate::config::Config;
use crate::db;
use crate::error::DomainError;
use crate::ingest;
use crate::models::{Document, DocumentFilters, DocumentPage, FileKind, Tag};
use crate::qa::QaService;
use crate::store::{DocumentStore, ADMIN_ROLE};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
    store: Arc<DocumentStore>,
    qa: Arc<QaService>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;

    let engine = OpenAiEngine::from_env(&config.qa)?;
    if engine.is_none() {
        tracing::warn!("OPENAI_API_KEY not set; Q&A uses the keyword fallback");
    }
    let qa = QaService::new(
        pool.clone(),
        &config.qa,
        engine.map(|e| Box::new(e) as Box<dyn crate::answer::AnswerEngine>),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        pool: pool.clone(),
        store: Arc::new(DocumentStore::new(pool)),
        qa: Arc::new(qa),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom over the document limit for multipart framing, so the
    // size check fails with our error body instead of a bare 413
    let body_limit = state.config.storage.max_file_size_bytes() as usize + 1024 * 1024;

    let app = Router::new()
        .route("/documents", post(handle_upload).get(handle_list))
        .route(
            "/documents/{id}",
            get(handle_detail).put(handle_update).delete(handle_delete),
        )
        .route("/search", get(handle_search))
        .route("/qa/{document_id}", post(handle_ask))
        .route("/admin/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let (status, code) = match &err {
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            DomainError::Precondition(_) => (StatusCode::CONFLICT, "precondition_failed"),
            DomainError::AnswerEngine(_) => (StatusCode::BAD_GATEWAY, "answer_engine"),
            DomainError::Db(_) | DomainError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "internal error");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ Identity ============

/// Caller identity as injected by the upstream gateway.
struct Identity {
    user_id: String,
    role: String,
}

fn identity(headers: &HeaderMap) -> Result<Identity, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| unauthorized("missing x-user-id header"))?;

    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("user");

    Ok(Identity {
        user_id: user_id.to_string(),
        role: role.to_string(),
    })
}

// ============ Response shapes ============

/// Listing/upload response shape: metadata only, no body text or path.
#[derive(Serialize)]
struct DocumentSummary {
    id: String,
    title: String,
    file_kind: FileKind,
    file_size: i64,
    is_deleted: bool,
    owner_id: String,
    created_at: i64,
    updated_at: i64,
    tags: Vec<Tag>,
}

impl From<Document> for DocumentSummary {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            file_kind: doc.file_kind,
            file_size: doc.file_size,
            is_deleted: doc.is_deleted,
            owner_id: doc.owner_id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            tags: doc.tags,
        }
    }
}

#[derive(Serialize)]
struct ListResponse {
    items: Vec<DocumentSummary>,
    total: i64,
    page: i64,
    size: i64,
    pages: i64,
}

impl From<DocumentPage> for ListResponse {
    fn from(page: DocumentPage) -> Self {
        Self {
            items: page.items.into_iter().map(DocumentSummary::from).collect(),
            total: page.total,
            page: page.page,
            size: page.size,
            pages: page.pages,
        }
    }
}

// ============ POST /documents ============

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let caller = identity(&headers)?;

    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut title: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                filename = field.file_name().map(|n| n.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read file field: {e}")))?;
                bytes = Some(data.to_vec());
            }
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid title field: {e}")))?,
                );
            }
            "tags" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid tags field: {e}")))?;
                tags = raw
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| bad_request("missing file field"))?;
    let filename = filename.ok_or_else(|| bad_request("file field has no filename"))?;

    let outcome = ingest::upload(
        &state.config,
        &state.pool,
        &caller.user_id,
        &filename,
        title.as_deref(),
        &tags,
        bytes,
    )
    .await?;
    // Fire-and-forget: the response does not wait for extraction
    drop(outcome.extraction);

    Ok((
        StatusCode::CREATED,
        Json(DocumentSummary::from(outcome.document)),
    ))
}

// ============ GET /documents ============

#[derive(Deserialize)]
struct ListParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
    kind: Option<String>,
    tag: Option<String>,
    title: Option<String>,
    owner: Option<String>,
}

fn default_page() -> i64 {
    1
}
fn default_size() -> i64 {
    20
}

async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    identity(&headers)?;

    let file_kind = match &params.kind {
        Some(kind) => Some(
            FileKind::from_str_stored(kind)
                .ok_or_else(|| bad_request(format!("unknown file kind: {kind}")))?,
        ),
        None => None,
    };

    let filters = DocumentFilters {
        owner_id: params.owner,
        file_kind,
        tag: params.tag,
        title: params.title,
    };

    let page = state.store.list(&filters, params.page, params.size).await?;
    Ok(Json(page.into()))
}

// ============ GET /documents/{id} ============

async fn handle_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    identity(&headers)?;
    let doc = state.store.get(&id).await?;
    Ok(Json(doc))
}

// ============ PUT /documents/{id} ============

#[derive(Deserialize)]
struct UpdateBody {
    title: Option<String>,
    tags: Option<Vec<String>>,
}

async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<DocumentSummary>, AppError> {
    let caller = identity(&headers)?;
    let doc = state
        .store
        .update(&id, &caller.user_id, &caller.role, body.title, body.tags)
        .await?;
    Ok(Json(doc.into()))
}

// ============ DELETE /documents/{id} ============

async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let caller = identity(&headers)?;
    state
        .store
        .soft_delete(&id, &caller.user_id, &caller.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_size")]
    size: i64,
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<ListResponse>, AppError> {
    identity(&headers)?;

    if params.q.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let page = state
        .store
        .search(&params.q, params.page, params.size)
        .await?;
    Ok(Json(page.into()))
}

// ============ POST /qa/{document_id} ============

#[derive(Deserialize)]
struct AskBody {
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    Json(body): Json<AskBody>,
) -> Result<Json<crate::models::AskResponse>, AppError> {
    let caller = identity(&headers)?;

    if body.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let response = state
        .qa
        .ask(&document_id, &caller.user_id, &body.question)
        .await?;
    Ok(Json(response))
}

// ============ GET /admin/stats ============

async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<crate::models::StoreStats>, AppError> {
    let caller = identity(&headers)?;
    if caller.role != ADMIN_ROLE {
        return Err(DomainError::Forbidden("Admin role required".to_string()).into());
    }
    Ok(Json(state.store.stats().await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_user_header() {
        let headers = HeaderMap::new();
        assert!(identity(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "  ".parse().unwrap());
        assert!(identity(&headers).is_err());
    }

    #[test]
    fn identity_defaults_role_to_user() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u-1".parse().unwrap());
        let caller = identity(&headers).unwrap();
        assert_eq!(caller.user_id, "u-1");
        assert_eq!(caller.role, "user");

        headers.insert("x-user-role", ADMIN_ROLE.parse().unwrap());
        let caller = identity(&headers).unwrap();
        assert_eq!(caller.role, ADMIN_ROLE);
    }

    #[test]
    fn domain_errors_map_to_distinct_statuses() {
        let cases = [
            (DomainError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DomainError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (DomainError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (DomainError::Precondition("x".into()), StatusCode::CONFLICT),
            (DomainError::AnswerEngine("x".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
