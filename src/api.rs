//! HTTP + WebSocket control surface for the dispatcher.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::dispatcher::DispatcherHandle;
use crate::error::DispatchError;
use crate::events::EventBus;
use crate::request::ReviewMode;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: DispatcherHandle,
    pub bus: EventBus,
}

/// Body of `POST /api/uploads/hotspot`.
#[derive(Debug, Deserialize)]
pub struct HotspotUpload {
    pub instances: Vec<i64>,
    pub port: u16,
    pub mode: ReviewMode,
}

/// Body of `POST /api/uploads/bluetooth`.
#[derive(Debug, Deserialize)]
pub struct BluetoothUpload {
    pub instances: Vec<i64>,
    pub mode: ReviewMode,
}

/// Build the router with upload REST routes and the event WebSocket.
pub fn upload_routes(dispatcher: DispatcherHandle, bus: EventBus) -> Router {
    let state = AppState { dispatcher, bus };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/uploads", get(upload_status))
        .route("/api/uploads/hotspot", post(start_hotspot_upload))
        .route("/api/uploads/bluetooth", post(start_bluetooth_upload))
        .route("/api/uploads/cancel", post(cancel_upload))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "share-sender"
    }))
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn upload_status(State(state): State<AppState>) -> Response {
    match state.dispatcher.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => unavailable(e),
    }
}

async fn start_hotspot_upload(
    State(state): State<AppState>,
    Json(body): Json<HotspotUpload>,
) -> Response {
    if body.instances.is_empty() {
        return no_instances();
    }

    info!(count = body.instances.len(), port = body.port, "Hotspot upload requested");
    match state
        .dispatcher
        .start_hotspot_upload(body.instances, body.port, body.mode)
        .await
    {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(e) => unavailable(e),
    }
}

async fn start_bluetooth_upload(
    State(state): State<AppState>,
    Json(body): Json<BluetoothUpload>,
) -> Response {
    if body.instances.is_empty() {
        return no_instances();
    }

    info!(count = body.instances.len(), "Bluetooth upload requested");
    match state
        .dispatcher
        .start_bluetooth_upload(body.instances, body.mode)
        .await
    {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(e) => unavailable(e),
    }
}

async fn cancel_upload(State(state): State<AppState>) -> Response {
    match state.dispatcher.cancel().await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => unavailable(e),
    }
}

fn no_instances() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "No instances to send"})),
    )
        .into_response()
}

fn unavailable(e: DispatchError) -> Response {
    warn!(error = %e, "Dispatcher unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Event stream client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Subscribe before the first frame so nothing between sync and stream is lost.
    let mut rx = state.bus.subscribe();

    if !send_status(&mut socket, &state.dispatcher).await {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let frame = serde_json::json!({ "type": "event", "event": event });
                        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Event stream client lagged behind");
                        if !send_status(&mut socket, &state.dispatcher).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Upload event bus closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Event stream client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Send a `{"type":"status",...}` frame. Returns false if the client is gone.
async fn send_status(socket: &mut WebSocket, dispatcher: &DispatcherHandle) -> bool {
    let status = match dispatcher.status().await {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "Cannot sync event stream client");
            return false;
        }
    };

    let frame = serde_json::json!({ "type": "status", "status": status });
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .is_ok()
}
