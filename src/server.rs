//! HTTP API for chat sessions.
//!
//! # Endpoints
//!
//! All paths are relative to `server.api_prefix` (default `/api/chatbot`).
//! `/health` is also served at the root.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sessions` | Create a session → 201 `{session_id}` |
//! | `POST` | `/sessions/{id}/message` | `{message}` → `{reply}` |
//! | `POST` | `/sessions/{id}/message/stream` | `{message}` → `text/event-stream` |
//! | `DELETE` | `/sessions/{id}` | Delete a session |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "session 'abc' not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Streaming
//!
//! The stream endpoint sends one `data:` event per reply fragment and a
//! final `event: end`. The exchange is recorded in the session once the
//! last fragment has been produced.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use jenkins_chatbot_core::{AnswerOrchestrator, ChatError};

use crate::chat::build_orchestrator;
use crate::config::{Config, ServerConfig};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnswerOrchestrator>,
    api_prefix: String,
}

impl AppState {
    pub fn new(orchestrator: Arc<AnswerOrchestrator>, api_prefix: &str) -> Self {
        Self {
            orchestrator,
            api_prefix: normalize_prefix(api_prefix),
        }
    }
}

/// `"/api/chatbot/"` → `"/api/chatbot"`; `"/"` → `""`.
fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_end_matches('/').to_string()
}

/// Build the application router for `state`, with CORS per `server`.
pub fn router(state: AppState, server: &ServerConfig) -> anyhow::Result<Router> {
    let api = Router::new()
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/sessions/{id}/message", post(handle_message))
        .route("/sessions/{id}/message/stream", post(handle_message_stream));

    let app = if state.api_prefix.is_empty() {
        api
    } else {
        Router::new()
            .nest(&state.api_prefix, api)
            .route(&format!("{}/health", state.api_prefix), get(handle_health))
    };

    Ok(app
        .route("/health", get(handle_health))
        .layer(cors_layer(&server.cors_allowed_origins)?)
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| anyhow::anyhow!("Invalid CORS origin in server.cors_allowed_origins: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// `chatbot serve`.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let state = AppState::new(orchestrator, &config.server.api_prefix);
    let app = router(state, &config.server)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        prefix = %config.server.api_prefix,
        "chat server listening"
    );
    println!("Chat server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "internal server error".to_string(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::SessionNotFound(_) => not_found(err.to_string()),
            ChatError::EmptyMessage => bad_request(err.to_string()),
            ChatError::Store(e) => internal(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionCreated {
    session_id: String,
}

async fn handle_create_session(State(state): State<AppState>) -> Result<Response, AppError> {
    let session_id = state
        .orchestrator
        .sessions()
        .create()
        .await
        .map_err(internal)?;
    let location = format!("{}/sessions/{}/message", state.api_prefix, session_id);
    info!(session_id = %session_id, "session created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(SessionCreated { session_id }),
    )
        .into_response())
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let deleted = state
        .orchestrator
        .sessions()
        .delete(&id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(ChatError::SessionNotFound(id).into());
    }
    info!(session_id = %id, "session deleted");
    Ok(Json(MessageResponse {
        message: format!("Session {} deleted.", id),
    }))
}

// ============ Messages ============

#[derive(Deserialize)]
struct MessageRequest {
    message: String,
}

#[derive(Serialize)]
struct ReplyResponse {
    reply: String,
}

async fn handle_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>, AppError> {
    let Json(request) = body?;
    let reply = state.orchestrator.answer(&id, &request.message).await?;
    Ok(Json(ReplyResponse { reply }))
}

async fn handle_message_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;
    let fragments = state
        .orchestrator
        .clone()
        .answer_stream(&id, &request.message)
        .await?;

    let events = fragments
        .map(|fragment| Ok::<_, Infallible>(Event::default().data(fragment)))
        .chain(stream::once(async {
            Ok::<_, Infallible>(Event::default().event("end").data(""))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api/chatbot/"), "/api/chatbot");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_cors_layer_rejects_bad_origin() {
        assert!(cors_layer(&[]).is_ok());
        assert!(cors_layer(&["https://www.jenkins.io".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_chat_error_mapping() {
        let e: AppError = ChatError::SessionNotFound("x".into()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        let e: AppError = ChatError::EmptyMessage.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        let e: AppError = ChatError::Store(anyhow::anyhow!("disk full")).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "internal server error");
    }
}
