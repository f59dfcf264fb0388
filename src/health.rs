use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Read-only view of the bot served on the health endpoint
#[derive(Clone)]
pub struct HealthState {
    pub running: Arc<AtomicBool>,
    pub leverage: u32,
    pub base_currency: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(index)
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "running": state.running.load(Ordering::SeqCst),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "leverage": state.leverage,
        "base_currency": state.base_currency,
    }))
}

async fn index() -> &'static str {
    "Futures Bot - Running"
}

/// Serve on an already bound listener until shutdown is signalled
pub async fn serve_on(
    listener: TcpListener,
    state: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

pub async fn serve(
    port: u16,
    state: HealthState,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("🌐 Health server listening on http://{}", addr);
    serve_on(listener, state, shutdown).await
}
