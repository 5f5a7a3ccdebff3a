//! REST and server-sent-events API over the session controller.
//!
//! Debates are created with a POST and then observed through an SSE stream
//! that replays the transcript so far before following new messages. Each
//! event's data is one transport-form message, then `{"error": ...}` if the
//! run failed, then `[DONE]`.

use std::convert::Infallible;
use std::path::Path as FsPath;
use std::sync::Arc;

use autodebate_engine::export::{ExportFormat, render};
use autodebate_engine::profile::ProfileStore;
use autodebate_engine::session::SessionDetail;
use autodebate_engine::{Controller, DebateError, DebateRequest, SessionError};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

/// State shared by every handler.
pub struct AppState {
    pub controller: Controller,
    pub profile: ProfileStore,
}

// ── Errors ─────────────────────────────────────────────────────────────

/// Handler failure rendered as `{"detail": ...}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    Session(SessionError),
    BadRequest(String),
    Internal(String),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError::Session(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Session(e) => {
                let status = match &e {
                    SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                    SessionError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
                    SessionError::Debate(DebateError::Config(_)) => StatusCode::BAD_REQUEST,
                    SessionError::Debate(DebateError::Provider(_)) => StatusCode::BAD_GATEWAY,
                    SessionError::Debate(DebateError::JudgementFormat(_)) | SessionError::Store(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ── Axum router ────────────────────────────────────────────────────────

/// Build the axum router with the debate API and an optional static client.
pub fn router(state: Arc<AppState>, web_static_dir: Option<&FsPath>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(api_health))
        .route("/api/debates", get(api_list_debates).post(api_create_debate))
        .route("/api/debates/{id}", get(api_get_debate))
        .route("/api/debates/{id}/stream", get(api_stream_debate))
        .route("/api/debates/{id}/export", get(api_export_debate))
        .route("/api/profile", get(api_get_profile).put(api_put_profile))
        .layer({
            use axum::http::Method;
            use tower_http::cors::AllowOrigin;
            let origins = [
                "http://localhost:5173", // vite dev
                "http://127.0.0.1:5173",
                "http://localhost:3000",
            ];
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(
                    origins.iter().filter_map(|o| o.parse().ok()),
                ))
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        });

    if let Some(dir) = web_static_dir {
        if dir.exists() {
            tracing::info!("Serving web client from {}", dir.display());
            // SPA fallback: serve index.html for any path not matching a static file
            let serve = tower_http::services::ServeDir::new(dir)
                .append_index_html_on_directories(true)
                .fallback(tower_http::services::ServeFile::new(dir.join("index.html")));
            app = app.fallback_service(serve);
        } else {
            tracing::warn!("Web static dir not found: {}", dir.display());
        }
    }

    app.with_state(state)
}

// ── REST types ─────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct CreatedResponse {
    debate_id: String,
    mode: String,
    motion: String,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ProfileBody {
    #[serde(default)]
    content: String,
}

fn detail_json(detail: &SessionDetail) -> Value {
    json!({
        "meta": detail.meta,
        "status": detail.status,
        "error": detail.error,
        "messages": detail
            .messages
            .iter()
            .map(|m| m.to_transport_form())
            .collect::<Vec<_>>(),
    })
}

// ── REST handlers ──────────────────────────────────────────────────────

async fn api_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "live_sessions": state.controller.live_sessions(),
    }))
}

async fn api_create_debate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DebateRequest>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let mode = request.mode.to_string();
    let motion = request.motion.clone();
    let debate_id = state.controller.create(request)?;
    Ok(Json(CreatedResponse {
        debate_id,
        mode,
        motion,
    }))
}

async fn api_list_debates(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let sessions = state.controller.list().await?;
    Ok(Json(json!(sessions)))
}

async fn api_get_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.controller.get(&id).await?;
    Ok(Json(detail_json(&detail)))
}

async fn api_stream_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state.controller.stream(&id).await?;
    tracing::debug!(session_id = %id, "stream opened");
    let sse = events.map(|ev| Ok::<_, Infallible>(Event::default().data(ev.data())));
    Ok(Sse::new(sse).keep_alive(KeepAlive::default()))
}

async fn api_export_debate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let requested = query.format.as_deref().unwrap_or("json");
    let format = ExportFormat::parse(requested)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown export format: {requested}")))?;
    let detail = state.controller.get(&id).await?;
    let body = render(&detail.messages, format);
    let disposition = format!("attachment; filename=\"{id}.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn api_get_profile(State(state): State<Arc<AppState>>) -> Json<ProfileBody> {
    Json(ProfileBody {
        content: state.profile.load().unwrap_or_default(),
    })
}

async fn api_put_profile(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProfileBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = state.profile.clone();
    tokio::task::spawn_blocking(move || profile.save(&body.content))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("Failed to save profile: {e}")))?;
    Ok(Json(json!({ "status": "saved" })))
}
