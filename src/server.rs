//! HTTP server.
//!
//! Thin JSON surface over [`Assistant`].
//!
//! # Endpoints
//!
//! | Method | Path | Body | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/api/index` | `{ "url" }` | Build and cache a snapshot |
//! | `POST` | `/api/ask` | `{ "url", "question" }` | Answer a question, with trace |
//! | `POST` | `/api/status` | `{ "url" }` | Report cached state |
//! | `GET`  | `/health` | | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser chat client
//! can be served from anywhere.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::assistant::{AskOutcome, Assistant, IndexOutcome, StatusOutcome};
use crate::config::Config;
use crate::error::ScoutError;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(Assistant::from_config(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "repo-scout listening");
    axum::serve(listener, router(assistant)).await?;
    Ok(())
}

/// Build the router around an assistant. Exposed for embedding and tests.
pub fn router(assistant: Arc<Assistant>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/index", post(handle_index))
        .route("/api/ask", post(handle_ask))
        .route("/api/status", post(handle_status))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { assistant })
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

impl From<ScoutError> for AppError {
    fn from(err: ScoutError) -> Self {
        let message = err.user_message();
        match err {
            ScoutError::InvalidIdentifier(_) => bad_request(message),
            ScoutError::RepositoryUnavailable { .. } => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message,
            },
            ScoutError::Upstream(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream",
                message,
            },
            ScoutError::MissingCredential(_) | ScoutError::Config(_) | ScoutError::Store(_) => {
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct RepoRequest {
    url: String,
}

#[derive(Deserialize)]
struct AskRequest {
    url: String,
    question: String,
}

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

async fn handle_index(
    State(state): State<AppState>,
    Json(req): Json<RepoRequest>,
) -> Result<Json<IndexOutcome>, AppError> {
    let outcome = state.assistant.index(&req.url).await?;
    Ok(Json(outcome))
}

/// `POST /api/ask`. An unreachable repository is still a 200: the answer
/// carries the access-failure message and the trace shows where it stopped.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskOutcome>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let outcome = state.assistant.ask(&req.url, req.question.trim()).await?;
    Ok(Json(outcome))
}

async fn handle_status(
    State(state): State<AppState>,
    Json(req): Json<RepoRequest>,
) -> Result<Json<StatusOutcome>, AppError> {
    let outcome = state.assistant.status(&req.url).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_map_to_status_codes() {
        let cases = [
            (ScoutError::InvalidIdentifier("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (
                ScoutError::RepositoryUnavailable {
                    repo: "o/r".into(),
                    reason: "404".into(),
                },
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (ScoutError::Upstream("boom".into()), StatusCode::BAD_GATEWAY, "upstream"),
            (
                ScoutError::Config("Unknown llm provider: x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
            (
                ScoutError::MissingCredential("GITHUB_TOKEN".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, code) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }
}
