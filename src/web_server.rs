use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app_state::StateView;
use crate::controller::ActionController;
use crate::error::{ErrorKind, GenerationError};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    controller: Arc<ActionController>,
}

#[derive(Debug, Deserialize)]
pub struct GoalUpdate {
    pub goal: String,
}

#[derive(Deserialize)]
pub struct CredentialUpdate {
    pub credential: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub state: StateView,
    pub error_kind: Option<ErrorKind>,
    // Whether retrying can help; absent on success
    pub recoverable: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CopyResponse {
    pub copied: bool,
}

// Minijinja Environment setup
fn create_minijinja_env() -> AutoReloader {
    AutoReloader::new(|notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader("templates"));
        notifier.watch_path("templates", true);
        Ok(env)
    })
}

fn render_error(e: minijinja::Error) -> (StatusCode, Html<String>) {
    error!("Failed to get or render template: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Internal Server Error: {}", e)),
    )
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let view = state.controller.snapshot();
    let env = state.templates.acquire_env().map_err(render_error)?;
    let tmpl = env.get_template("index.html").map_err(render_error)?;
    let html = tmpl
        .render(minijinja::context! {
            title => "Efficiency AI",
            state => view,
        })
        .map_err(render_error)?;
    Ok(Html(html))
}

async fn state_handler(State(state): State<AppState>) -> Json<StateView> {
    Json(state.controller.snapshot())
}

async fn goal_handler(State(state): State<AppState>, Json(update): Json<GoalUpdate>) -> Json<StateView> {
    Json(state.controller.update_goal(update.goal))
}

async fn credential_handler(
    State(state): State<AppState>,
    Json(update): Json<CredentialUpdate>,
) -> Json<StateView> {
    Json(state.controller.update_credential(update.credential))
}

fn status_for(error: &GenerationError) -> StatusCode {
    match error {
        GenerationError::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        GenerationError::Busy => StatusCode::CONFLICT,
        GenerationError::Upstream(_)
        | GenerationError::Protocol
        | GenerationError::Transport(_)
        | GenerationError::Cancelled => StatusCode::BAD_GATEWAY,
    }
}

async fn generate_handler(State(state): State<AppState>) -> (StatusCode, Json<GenerateResponse>) {
    let outcome = state.controller.generate().await;
    let (status, error_kind, recoverable) = match &outcome {
        Ok(_) => (StatusCode::OK, None, None),
        Err(e) => (status_for(e), Some(e.kind()), Some(e.is_recoverable())),
    };
    (
        status,
        Json(GenerateResponse {
            state: state.controller.snapshot(),
            error_kind,
            recoverable,
        }),
    )
}

async fn cancel_handler(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.controller.cancel(),
    })
}

async fn copy_handler(State(state): State<AppState>) -> Json<CopyResponse> {
    Json(CopyResponse {
        copied: state.controller.copy_result(),
    })
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// Streams state snapshots to one client until it goes away
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut updates = state.controller.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let initial = state.controller.snapshot();
    match serde_json::to_string(&initial) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                warn!("Failed to send initial state to new WebSocket client");
                return;
            }
        }
        Err(e) => error!("Failed to serialize state snapshot: {}", e),
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Ok(view) => {
                        let Ok(json) = serde_json::to_string(&view) else {
                            error!("Failed to serialize state snapshot");
                            continue;
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            warn!("WebSocket client disconnected or send error. Closing connection.");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging behind state updates");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {
                        // The page drives the controller over the JSON routes.
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Builds the router for one session backed by `controller`.
pub fn router(controller: Arc<ActionController>) -> Router {
    let state = AppState {
        templates: Arc::new(create_minijinja_env()),
        controller,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/api/state", get(state_handler))
        .route("/api/goal", post(goal_handler))
        .route("/api/credential", post(credential_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/cancel", post(cancel_handler))
        .route("/api/copy", post(copy_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(port: u16, controller: Arc<ActionController>) -> Result<()> {
    let app = router(controller);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
