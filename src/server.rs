//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness plus catalog and index sizes |
//! | `GET`  | `/documents` | Catalog in upload order |
//! | `POST` | `/upload` | Multipart field `file` holding a PDF |
//! | `GET`  | `/ask?query=..&use_rag=..` | Answer a question |
//! | `GET`  | `/clear-all` | Drop every document and indexed chunk |
//!
//! # Error Contract
//!
//! Every non-2xx response has the same body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Only PDF files are supported" } }
//! ```
//!
//! Error codes: `bad_request` (400), `payload_too_large` (413),
//! `extraction_failed` (500), `index_failed` (500), `internal` (500).
//! `/ask` reports backend failures in its 200 body (`success: false`).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::{App, AskResponse, Health};
use crate::config::Config;
use crate::error::RagError;
use crate::models::DocumentRecord;

/// Build the application and serve it on `[server].bind` until Ctrl-C.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = Arc::new(App::build(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "pdf-rag listening");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

/// All routes with CORS, request tracing and the upload body limit applied.
pub fn router(app: Arc<App>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = app.config().upload.max_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_documents))
        .route("/upload", post(handle_upload))
        .route("/ask", get(handle_ask))
        .route("/clear-all", get(handle_clear_all))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
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
                code: self.code,
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            RagError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Extraction(_) => (StatusCode::INTERNAL_SERVER_ERROR, "extraction_failed"),
            RagError::IndexWrite(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index_failed"),
            RagError::Answer(_)
            | RagError::CorruptCatalog { .. }
            | RagError::Io(_)
            | RagError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }
        AppError {
            status,
            code,
            message,
        }
    }
}

/// Body-limit overruns surface while streaming the multipart body.
fn multipart_error(err: MultipartError) -> AppError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError {
            status,
            code: "payload_too_large",
            message: err.body_text(),
        }
    } else if status.is_client_error() {
        bad_request(err.body_text())
    } else {
        internal(err.body_text())
    }
}

// ============ GET /health ============

async fn handle_health(State(app): State<Arc<App>>) -> Result<Json<Health>, AppError> {
    Ok(Json(app.health().await?))
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
    count: usize,
}

async fn handle_documents(State(app): State<Arc<App>>) -> Json<DocumentsResponse> {
    let documents = app.documents().await;
    Json(DocumentsResponse {
        count: documents.len(),
        documents,
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    document_id: String,
    filename: String,
    chunks: usize,
}

async fn handle_upload(
    State(app): State<Arc<App>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| bad_request(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let record = app.ingest_pdf(&filename, &bytes).await?;
        return Ok(Json(UploadResponse {
            status: "success",
            document_id: record.id,
            filename: record.filename,
            chunks: record.chunk_count,
        }));
    }

    Err(bad_request("No file provided"))
}

// ============ GET /ask ============

#[derive(Deserialize)]
struct AskParams {
    query: Option<String>,
    use_rag: Option<bool>,
}

async fn handle_ask(
    State(app): State<Arc<App>>,
    params: Result<Query<AskParams>, QueryRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let query = params
        .query
        .ok_or_else(|| bad_request("Missing required parameter: query"))?;
    Ok(Json(app.ask(&query, params.use_rag.unwrap_or(true)).await?))
}

// ============ GET /clear-all ============

#[derive(Serialize)]
struct ClearResponse {
    status: &'static str,
    message: String,
}

async fn handle_clear_all(State(app): State<Arc<App>>) -> Result<Json<ClearResponse>, AppError> {
    let removed = app.clear_all().await?;
    Ok(Json(ClearResponse {
        status: "cleared",
        message: format!("Removed {} documents and all indexed chunks", removed),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_errors_map_to_codes() {
        let cases = [
            (RagError::InvalidInput("x".into()), 400, "bad_request"),
            (RagError::Extraction("x".into()), 500, "extraction_failed"),
            (RagError::IndexWrite("x".into()), 500, "index_failed"),
            (RagError::Internal(anyhow::anyhow!("x")), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status.as_u16(), status);
            assert_eq!(app_err.code, code);
        }
    }
}
