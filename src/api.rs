//! HTTP + WebSocket transport for the worker pool.
//!
//! The transport only translates: it never reports success for a task the
//! coordinator rejected.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::pool::{Coordinator, Task};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Build the Axum router with the task, results, stats, stop and event routes.
pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let state = AppState { coordinator };

    Router::new()
        .route("/health", get(health))
        .route("/task", post(submit_task))
        .route("/results", get(list_results))
        .route("/stats", get(worker_stats))
        .route("/stop", post(stop_pool))
        .route("/ws/events", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "task-dispatch",
        "workers": state.coordinator.num_workers(),
        "stopped": state.coordinator.is_stopped(),
    }))
}

// ── REST Endpoints ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SubmitRequest {
    id: i64,
    input: String,
}

async fn submit_task(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> impl IntoResponse {
    let task_id = body.id;

    match state
        .coordinator
        .submit(Task::new(task_id, body.input))
        .await
    {
        Ok(worker_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "accepted",
                "task_id": task_id,
                "worker_id": worker_id,
            })),
        ),
        Err(e) => {
            warn!(task_id, error = %e, "Task rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": e.to_string(), "kind": e.kind()})),
            )
        }
    }
}

async fn list_results(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.results().await)
}

async fn worker_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.worker_stats().await)
}

async fn stop_pool(State(state): State<AppState>) -> impl IntoResponse {
    state.coordinator.stop().await;
    info!("Pool stopped via API");
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "stopped"})),
    )
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Event stream client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.coordinator))
}

/// Current worker stats, sent on connect and after the client lags.
async fn stats_sync(coordinator: &Coordinator) -> Option<String> {
    let workers = coordinator.worker_stats().await;
    serde_json::to_string(&serde_json::json!({"type": "stats_sync", "workers": workers})).ok()
}

async fn handle_socket(mut socket: WebSocket, coordinator: Arc<Coordinator>) {
    // Subscribe before the sync so nothing falls between the two.
    let mut rx = coordinator.subscribe();

    if let Some(json) = stats_sync(&coordinator).await {
        if socket.send(Message::Text(json.into())).await.is_err() {
            warn!("Failed to send initial sync, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Event stream client lagged behind broadcast");
                        if let Some(json) = stats_sync(&coordinator).await {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed");
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
                    // The stream is one-way; anything else from the client is ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!("Event stream connection closed");
}
