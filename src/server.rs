//! HTTP surface: the LINE webhook and a diagnostic GET.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::bot::handler::Bot;
use crate::bot::notifier::Notifier;
use crate::bot::signature::{self, SIGNATURE_HEADER, WebhookError};

pub struct AppState<N> {
    pub channel_secret: String,
    pub bot: Bot<N>,
}

pub fn router<N: Notifier + 'static>(state: Arc<AppState<N>>) -> Router {
    Router::new()
        .route("/callback", post(callback::<N>))
        .route("/get", get(diagnostic))
        .with_state(state)
}

/// POST /callback
///
/// 400 when the delivery can't be authenticated or decoded, otherwise 200
/// after every event has been handled, whether or not each one succeeded.
pub async fn callback<N: Notifier + 'static>(
    State(state): State<Arc<AppState<N>>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let batch = match signature::parse(&state.channel_secret, signature, &body) {
        Ok(batch) => batch,
        Err(e @ (WebhookError::MissingSignature | WebhookError::InvalidSignature)) => {
            info!("Rejected webhook ({e}). Please check your channel access token/channel secret.");
            return (StatusCode::BAD_REQUEST, "Bad Request");
        }
        Err(e) => {
            warn!("Rejected webhook: {e}");
            return (StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    info!(
        "Webhook for {}: {} bytes, {} event(s)",
        batch.destination,
        body.len(),
        batch.events.len()
    );
    let summary = state.bot.handle_batch(batch).await;
    if summary.failed > 0 {
        warn!("{} of {} event(s) failed", summary.failed, summary.handled + summary.failed);
    }

    (StatusCode::OK, "OK")
}

/// GET /get?param1=...
pub async fn diagnostic(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let param1 = params
        .get("param1")
        .cloned()
        .unwrap_or_else(|| "default_value".to_string());
    Json(json!({
        "message": "GET method received!",
        "param1": param1,
    }))
}
