//! HTTP state API for a widget front end.
//!
//! Exposes the transcript and the controller actions so a browser widget can
//! render the chat the same way the terminal does. Binds to localhost only.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::courses::CourseSource;
use crate::controller::ControllerHandle;
use crate::speech::SpeechOutput;
use crate::turn::Turn;
use crate::Error;

#[derive(Clone)]
pub struct ApiState {
    pub controller: ControllerHandle,
    pub courses: Arc<dyn CourseSource>,
    pub output: Arc<SpeechOutput>,
    pub voice_input: bool,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct AskRequest {
    text: String,
}

#[derive(Serialize)]
struct StatusResponse {
    pending_reply: bool,
    listening: bool,
    speaking: bool,
    turns: usize,
    voice_input: bool,
    voice_output: bool,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

type Reply = (StatusCode, Json<SimpleResponse>);

fn accepted(status: &str) -> Reply {
    (StatusCode::OK, Json(SimpleResponse::ok(status)))
}

fn rejected(e: Error) -> Reply {
    let code = match e {
        Error::EmptyInput => StatusCode::BAD_REQUEST,
        Error::Busy(_) => StatusCode::CONFLICT,
        Error::CapabilityUnavailable(_) | Error::ControllerStopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(SimpleResponse::err(e.to_string())))
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/turns", get(handle_turns))
        .route("/ask", post(handle_ask))
        .route("/listen", post(handle_listen))
        .route("/stop", post(handle_stop))
        .route("/cancel-speech", post(handle_cancel_speech))
        .route("/refresh-context", post(handle_refresh_context))
        .with_state(state)
}

/// Start the state API as a background tokio task.
pub async fn start_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind state API on {addr}: {e}");
            return;
        }
    };
    info!("State API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("State API server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.controller.state();
    Json(StatusResponse {
        pending_reply: snapshot.pending_reply,
        listening: snapshot.listening,
        speaking: state.output.is_speaking(),
        turns: snapshot.turns.len(),
        voice_input: state.voice_input,
        voice_output: state.output.is_available(),
    })
}

async fn handle_turns(State(state): State<ApiState>) -> Json<Vec<Turn>> {
    Json(state.controller.state().turns)
}

async fn handle_ask(State(state): State<ApiState>, Json(req): Json<AskRequest>) -> Reply {
    let preview: String = req.text.chars().take(80).collect();
    info!("HTTP /ask: \"{}\"", preview.replace('\n', " "));

    match state.controller.submit(req.text).await {
        Ok(()) => accepted("pending"),
        Err(e) => rejected(e),
    }
}

async fn handle_listen(State(state): State<ApiState>) -> Reply {
    match state.controller.start_listening().await {
        Ok(()) => accepted("listening"),
        Err(e) => rejected(e),
    }
}

async fn handle_stop(State(state): State<ApiState>) -> Reply {
    match state.controller.stop_listening().await {
        Ok(()) => accepted("stopped"),
        Err(e) => rejected(e),
    }
}

async fn handle_cancel_speech(State(state): State<ApiState>) -> Reply {
    match state.controller.cancel_speech().await {
        Ok(()) => accepted("cancelled"),
        Err(e) => rejected(e),
    }
}

async fn handle_refresh_context(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.courses.refresh();
    Json(SimpleResponse::ok("refreshed"))
}
