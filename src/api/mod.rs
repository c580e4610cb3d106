//! Webhook ingest HTTP endpoint
//!
//! Telegram requires fast webhook responses to avoid redelivery, so the
//! handler acknowledges with 200 immediately and forwards the event into the
//! daemon's queue in the background.

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::channels::telegram::{Update, UpdateDedup, update_to_event};
use crate::chat::ChatEvent;
use crate::{Error, Result};

/// Shared state for the webhook endpoint
pub struct ApiState {
    /// Queue into the daemon's dispatch loop
    pub events: mpsc::Sender<ChatEvent>,

    /// Dedup cache shared across deliveries
    pub dedup: Mutex<UpdateDedup>,
}

/// Webhook acknowledgement body
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Build the webhook router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_update))
        .with_state(state)
}

/// Bind and serve the webhook endpoint until the process exits
///
/// # Errors
///
/// Returns error if binding or serving fails
pub async fn serve(listen_addr: &str, state: Arc<ApiState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = listen_addr, "webhook listener started");

    axum::serve(listener, router(state)).await.map_err(Error::Io)
}

/// Handle one incoming Telegram update
async fn handle_update(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<Update>,
) -> (StatusCode, Json<WebhookResponse>) {
    let update_id = update.update_id;
    tracing::debug!(update_id, "received Telegram update");

    // Dedup check — Telegram redelivers on slow responses
    {
        let mut dedup = state.dedup.lock().unwrap_or_else(PoisonError::into_inner);
        if dedup.is_duplicate(update_id) {
            tracing::debug!(update_id, "duplicate Telegram update, skipping");
            return (StatusCode::OK, Json(WebhookResponse { ok: true }));
        }
    }

    let Some(event) = update_to_event(update) else {
        return (StatusCode::OK, Json(WebhookResponse { ok: true }));
    };

    // Forward in the background so the 200 goes out immediately
    let tx = state.events.clone();
    tokio::spawn(async move {
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, "failed to forward webhook event");
        }
    });

    (StatusCode::OK, Json(WebhookResponse { ok: true }))
}
