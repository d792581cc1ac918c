//! HTTP server implementation
//!
//! Implements:
//! - Chat turns (POST /api/feedback/chat)
//! - Manual issue submission (POST /api/feedback/submit)
//! - Session inspection/delete (GET/DELETE /api/session/{id})
//! - Health check (GET /health)
//! - Permissive CORS with cached preflight on all feedback routes
//!
//! Every error leaves as a JSON envelope (`{"error": ...}`); stack
//! traces never reach the caller.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, TrustEntry, TrustTable};
use crate::config::Config;
use crate::conversation::{ChatError, IssueSubmissionRequested, Orchestrator};
use crate::issues::{
    auto_submit_request, GitHubTracker, IssuePipeline, RepoRef, ReporterInfo, SubmitError,
    SubmitRequest,
};
use crate::sessions::{ImageAttachment, SessionStore};
use crate::validation::{
    is_valid_session_id, validate_feedback_data, FeedbackData, ValidationError,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Domain -> API key trust table (immutable after startup)
    pub trust: Arc<TrustTable>,
    /// Conversation orchestrator (owns the session store)
    pub orchestrator: Arc<Orchestrator>,
    /// Issue submission pipeline, when a tracker token is configured
    pub pipeline: Option<Arc<IssuePipeline>>,
    /// Repository used when a request carries no X-GitHub-Repo header
    pub default_repository: Option<String>,
    /// Gateway start time (Unix timestamp)
    pub start_time: i64,
}

impl AppState {
    /// Assemble the full application state from configuration.
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(SessionStore::new());
        let completion = crate::agent::build_completion_client(config)?;
        let pipeline = match &config.github {
            Some(gh) => {
                let tracker = Arc::new(GitHubTracker::new(gh.token.clone())?);
                Some(Arc::new(IssuePipeline::new(tracker, gh.mention.clone())))
            }
            None => None,
        };

        Ok(AppState {
            trust: Arc::new(config.trust_table.clone()),
            orchestrator: Arc::new(Orchestrator::new(store, completion)),
            pipeline,
            default_repository: config
                .github
                .as_ref()
                .and_then(|gh| gh.default_repository.clone()),
            start_time: chrono::Utc::now().timestamp(),
        })
    }

    fn store(&self) -> &Arc<SessionStore> {
        self.orchestrator.store()
    }
}

/// Create the HTTP router with all endpoints and the CORS layer.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/feedback/chat",
            post(chat_handler).options(preflight_handler),
        )
        .route(
            "/api/feedback/submit",
            post(submit_handler).options(preflight_handler),
        )
        .route(
            "/api/session/:session_id",
            get(session_get_handler)
                .delete(session_delete_handler)
                .options(preflight_handler),
        )
        .with_state(state)
        .layer(middleware::from_fn(crate::server::cors::cors_middleware))
}

// ============================================================================
// Health Check
// ============================================================================

/// GET /health - Lightweight liveness probe.
async fn health_handler(State(state): State<AppState>) -> Response {
    let uptime = chrono::Utc::now().timestamp() - state.start_time;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSeconds": uptime,
        })),
    )
        .into_response()
}

// ============================================================================
// CORS preflight
// ============================================================================

/// OPTIONS on any feedback route: 200 with a 24h preflight cache.
/// The CORS layer adds the allow-* headers.
async fn preflight_handler() -> Response {
    (
        StatusCode::OK,
        [("access-control-max-age", crate::server::cors::MAX_AGE_SECS)],
    )
        .into_response()
}

// ============================================================================
// Chat turn
// ============================================================================

/// Request body for POST /api/feedback/chat
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

/// Response body for a successful chat turn
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub role: crate::sessions::MessageRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// POST /api/feedback/chat - one conversation turn.
async fn chat_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };
    let (Some(session_id), Some(message)) = (req.session_id, req.message) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "session_id and message are required",
        );
    };

    let entry = match check_widget_auth(&state.trust, &headers) {
        Ok(entry) => entry,
        Err(resp) => return resp,
    };
    debug!(domain = %entry.domain, session = %session_id, "chat turn accepted");

    let outcome = match state
        .orchestrator
        .process_turn(&session_id, &message, req.images)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return chat_error_response(e),
    };

    // Terminal-turn hand-off: drive the pipeline from the orchestrator's
    // event, after the closing reply is already part of the history.
    if let Some(request) = outcome.issue_request {
        drive_auto_submission(&state, &headers, request).await;
    }

    (
        StatusCode::OK,
        Json(ChatResponse {
            role: outcome.reply.role,
            content: outcome.reply.content,
            timestamp: outcome.reply.timestamp,
        }),
    )
        .into_response()
}

/// File the automatically-triggered issue for a completed conversation.
///
/// Failures are logged (with the tracker's verbatim status - this is a
/// data-loss risk) but never fail the chat response: the user already
/// got the closing reply.
async fn drive_auto_submission(
    state: &AppState,
    headers: &HeaderMap,
    request: IssueSubmissionRequested,
) {
    let Some(pipeline) = &state.pipeline else {
        warn!(session = %request.session_id, "issue tracker not configured, feedback not filed");
        return;
    };
    let repo = match resolve_repository(state, headers) {
        Ok(repo) => repo,
        Err(e) => {
            warn!(session = %request.session_id, %e, "no usable repository, feedback not filed");
            return;
        }
    };

    let submit = auto_submit_request(
        &request.session_id,
        request.history,
        reporter_from_headers(headers),
        repo,
    );
    match pipeline.submit(submit).await {
        Ok(created) => {
            info!(
                session = %request.session_id,
                issue = created.number,
                url = %created.url,
                "feedback issue created"
            );
        }
        Err(SubmitError::Tracker { status, message }) => {
            error!(
                session = %request.session_id,
                tracker_status = status,
                tracker_message = %message,
                "issue creation failed"
            );
        }
        Err(e) => {
            error!(session = %request.session_id, %e, "issue creation failed");
        }
    }
}

// ============================================================================
// Manual issue submission
// ============================================================================

/// POST /api/feedback/submit - widget-driven manual submission.
///
/// Accepts `{session_id, feedback_data: {...}}` or the flat legacy
/// shape with the feedback fields at the top level.
async fn submit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };

    let Some(session_id) = parsed.get("session_id").and_then(|v| v.as_str()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "session_id and feedback_data are required",
        );
    };
    if !is_valid_session_id(session_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid session ID format");
    }

    let feedback_value = parsed
        .get("feedback_data")
        .cloned()
        .unwrap_or_else(|| parsed.clone());
    let data: FeedbackData = match serde_json::from_value(feedback_value) {
        Ok(d) => d,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid feedback data structure"),
    };
    if let Err(e) = validate_feedback_data(&data) {
        return validation_error_response(e);
    }

    if let Err(resp) = check_widget_auth(&state.trust, &headers) {
        return resp;
    }

    let Some(pipeline) = &state.pipeline else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "GitHub token not configured",
        );
    };
    let repo = match resolve_repository(&state, &headers) {
        Ok(repo) => repo,
        Err(SubmitError::NotConfigured) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "GitHub repository must be specified in X-GitHub-Repo header",
            );
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let request = SubmitRequest {
        session_id: session_id.to_string(),
        history: state.store().messages(session_id),
        title: data.title,
        description: data.description,
        category: data.category.unwrap_or_else(|| "feature".to_string()),
        priority: data.priority.unwrap_or_else(|| "medium".to_string()),
        labels: data.labels.unwrap_or_default(),
        reporter: reporter_from_headers(&headers),
        repo,
    };

    match pipeline.submit(request).await {
        Ok(created) => (
            StatusCode::OK,
            Json(json!({
                "issue_url": created.url,
                "issue_number": created.number,
                "title": created.title,
                "notify_enabled": pipeline.notify_enabled(),
            })),
        )
            .into_response(),
        Err(SubmitError::Tracker { status, message }) => {
            // Verbatim tracker status/message: the operator needs to
            // see exactly what the tracker said.
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message, "status": status })),
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

// ============================================================================
// Session inspection
// ============================================================================

/// GET /api/session/{id} - inspect a session's history.
async fn session_get_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid session ID format");
    }
    let messages = state.store().messages(&session_id);
    let status = if messages.is_empty() { "empty" } else { "active" };
    (
        StatusCode::OK,
        Json(json!({
            "session_id": session_id,
            "messages": messages,
            "status": status,
        })),
    )
        .into_response()
}

/// DELETE /api/session/{id} - clear a session. Idempotent.
async fn session_delete_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if !is_valid_session_id(&session_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid session ID format");
    }
    state.store().delete(&session_id);
    (
        StatusCode::OK,
        Json(json!({ "message": "Session cleared successfully" })),
    )
        .into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Validate the X-API-Key / X-Origin-Domain pair against the trust
/// table. A missing trust table is the operator's fault (500); every
/// other failure is the caller's (401).
#[allow(clippy::result_large_err)]
fn check_widget_auth<'a>(
    trust: &'a TrustTable,
    headers: &HeaderMap,
) -> Result<&'a TrustEntry, Response> {
    let api_key = header_value(headers, "x-api-key");
    let domain = header_value(headers, "x-origin-domain");
    trust
        .validate(api_key.as_deref(), domain.as_deref())
        .map_err(|e| match e {
            AuthError::ConfigurationMissing => {
                error!("trust table not configured, rejecting authenticated request");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
            _ => error_response(StatusCode::UNAUTHORIZED, &e.to_string()),
        })
}

/// Repository from the X-GitHub-Repo header, falling back to the
/// configured default.
fn resolve_repository(state: &AppState, headers: &HeaderMap) -> Result<RepoRef, SubmitError> {
    let repository = header_value(headers, "x-github-repo")
        .or_else(|| state.default_repository.clone())
        .ok_or(SubmitError::NotConfigured)?;
    RepoRef::parse(&repository)
}

/// Optional end-user identity from the X-User-* headers.
fn reporter_from_headers(headers: &HeaderMap) -> ReporterInfo {
    ReporterInfo {
        name: header_value(headers, "x-user-name"),
        contact: header_value(headers, "x-user-contact"),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// JSON error envelope.
fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn validation_error_response(error: ValidationError) -> Response {
    error_response(StatusCode::BAD_REQUEST, &error.to_string())
}

fn chat_error_response(error: ChatError) -> Response {
    match error {
        ChatError::SessionIdInvalid => {
            error_response(StatusCode::BAD_REQUEST, "Invalid session ID format")
        }
        ChatError::MessageInvalid(e) => validation_error_response(e),
        ChatError::NoAiServiceConfigured => {
            error!("chat request rejected: no AI service configured");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "AI service not configured")
        }
    }
}
