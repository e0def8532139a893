pub mod signature;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{PrAgent, WebhookError};
use crate::request::IncomingMention;
use crate::slack::{EventEnvelope, SlackEvent};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared by every handler.
pub struct AppState {
    pub agent: Arc<PrAgent>,
    pub slack_signing_secret: Option<String>,
    pub github_webhook_secret: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .route("/github/events", post(github_events))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rejected(reason: impl std::fmt::Display) -> Response {
    warn!(reason = %reason, "rejected request");
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid signature"}))).into_response()
}

async fn slack_events(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.slack_signing_secret {
        if let Err(e) = signature::verify_slack(
            secret,
            header(&headers, "x-slack-request-timestamp"),
            header(&headers, "x-slack-signature"),
            &body,
            chrono::Utc::now().timestamp(),
        ) {
            return rejected(e);
        }
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparsable Slack event");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid payload"}))).into_response();
        }
    };

    let (event_id, event) = match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            return Json(json!({"challenge": challenge})).into_response();
        }
        EventEnvelope::EventCallback { event_id, event } => (event_id, event),
        EventEnvelope::Unsupported => return StatusCode::OK.into_response(),
    };

    if let Some(retry) = header(&headers, "x-slack-retry-num") {
        debug!(retry = %retry, event_id = ?event_id, "dropping Slack retry");
        return StatusCode::OK.into_response();
    }

    let SlackEvent::AppMention(mention) = event else {
        return StatusCode::OK.into_response();
    };
    if mention.is_from_bot() {
        debug!("ignoring bot-authored mention");
        return StatusCode::OK.into_response();
    }

    let incoming = IncomingMention {
        thread_timestamp: mention.reply_thread().to_string(),
        user_id: mention.user.clone().unwrap_or_default(),
        channel_id: mention.channel.clone(),
        text: mention.text.clone(),
    };
    info!(event_id = ?event_id, user = %incoming.user_id, "received mention");

    // Slack expects an answer within three seconds
    state.agent.spawn_mention(incoming);
    StatusCode::OK.into_response()
}

async fn github_events(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.github_webhook_secret {
        if let Err(e) = signature::verify_github(secret, header(&headers, "x-hub-signature-256"), &body) {
            return rejected(e);
        }
    }

    let event = header(&headers, "x-github-event").unwrap_or_default().to_string();
    info!(event = %event, "received GitHub webhook");

    let agent = state.agent.clone();
    let task = tokio::spawn(async move { agent.handle_github_event(&event, &body).await });

    match task.await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(WebhookError::InvalidPayload(e))) => {
            warn!(error = %e, "invalid GitHub payload");
            (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "webhook handling failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
        }
        Err(e) => {
            error!(error = %e, "webhook task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"}))).into_response()
        }
    }
}
