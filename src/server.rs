//! Webhook HTTP surface.
//!
//! One POST route per donation platform plus a manual `/test` route, all of
//! which end in a single MessagingService publish. The GET routes report
//! configuration and uptime for whoever is setting up the platform webhooks.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::donation::{format_rupiah, DonationRecord, SourceKind};
use crate::error::WebhookError;
use crate::extract::MESSAGE_FORMATS;
use crate::messaging::MessagingClient;
use crate::normalize::{normalize, text_value, Normalized};

pub const SERVICE_NAME: &str = "Siwa Donation Webhook";

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub messaging: MessagingClient,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, messaging: MessagingClient) -> Self {
        Self {
            config,
            messaging,
            started_at: Instant::now(),
        }
    }

    fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route(SourceKind::Saweria.webhook_path(), post(saweria_webhook))
        .route(SourceKind::SocialBuzz.webhook_path(), post(socialbuzz_webhook))
        .route("/test", post(test_donation))
        .route("/debug", get(debug_info))
        .route("/stats", get(stats))
        .fallback(not_found)
        .with_state(state)
}

// ── Webhooks ───────────────────────────────────────────────────────────────────

async fn saweria_webhook(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, WebhookError> {
    handle_webhook(&state, SourceKind::Saweria, payload).await
}

async fn socialbuzz_webhook(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, WebhookError> {
    handle_webhook(&state, SourceKind::SocialBuzz, payload).await
}

async fn handle_webhook(
    state: &AppState,
    kind: SourceKind,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, WebhookError> {
    info!("[{}] Webhook received", kind);

    let Json(body) = payload.map_err(|rejection| {
        error!("[{}] Payload missing or not valid JSON: {}", kind, rejection);
        WebhookError::InvalidPayload(rejection.body_text())
    })?;
    debug!("[{}] Raw payload: {}", kind, body);

    let record = match normalize(kind, &body)? {
        Normalized::Ignored { event_type } => {
            info!("[{}] Ignored: not a donation event (type: {:?})", kind, event_type);
            return Ok(Json(json!({
                "success": true,
                "message": "OK - Ignored non-donation event",
                "type": event_type,
            })));
        }
        Normalized::Donation(record) => record,
    };

    info!(
        "[{}] Donation from {} ({}), credited to {}",
        kind,
        record.display_name,
        format_rupiah(record.amount),
        record.username
    );

    let result = state.messaging.publish(&record).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} donation processed successfully", kind),
        "data": {
            "username": record.username,
            "amount": record.amount,
            "source": record.source,
        },
        "robloxResponse": result.body,
    })))
}

// ── Manual test ────────────────────────────────────────────────────────────────

const TEST_USERNAME: &str = "TestUser123";
const TEST_DISPLAY_NAME: &str = "Test Donator";
const TEST_AMOUNT: u64 = 25000;
const TEST_SOURCE: &str = "Test";
const TEST_MESSAGE: &str = "Test donation from webhook server";

/// Build the manual test record from an arbitrary JSON map. Fields that are
/// missing, blank, or not text-like fall back to the test defaults.
fn test_record(request: &Map<String, Value>, timestamp: i64) -> DonationRecord {
    let field = |key: &str, default: &str| {
        request
            .get(key)
            .and_then(text_value)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    DonationRecord {
        username: field("username", TEST_USERNAME),
        display_name: field("displayName", TEST_DISPLAY_NAME),
        amount: request
            .get("amount")
            .and_then(parse_test_amount)
            .unwrap_or(TEST_AMOUNT),
        timestamp,
        source: field("source", TEST_SOURCE),
        message: field("message", TEST_MESSAGE),
        email: String::new(),
    }
}

/// Positive whole amount from a number or numeric string; anything else
/// means "use the default".
fn parse_test_amount(value: &Value) -> Option<u64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (raw.is_finite() && raw >= 1.0).then(|| raw.trunc() as u64)
}

async fn test_donation(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    info!("[TEST] Test endpoint called");

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let reason = format!("expected a JSON object, got {other}");
                return WebhookError::InvalidPayload(reason).into_response();
            }
            Err(e) => return WebhookError::InvalidPayload(e.to_string()).into_response(),
        }
    };

    let record = test_record(&request, Utc::now().timestamp());
    debug!("[TEST] Payload to send: {:?}", record);

    match state.messaging.publish(&record).await {
        Ok(result) => Json(json!({
            "success": true,
            "message": "Test donation sent successfully",
            "status": result.status,
            "sentPayload": record,
            "robloxResponse": result.body,
        }))
        .into_response(),
        Err(err) => {
            error!("[TEST] Test failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Test failed",
                    "message": err.details(),
                    "sentPayload": record,
                })),
            )
                .into_response()
        }
    }
}

// ── Info endpoints ─────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<Value> {
    let base = public_base_url(&headers);
    let roblox = &state.config.roblox;

    let platforms: Vec<Value> = SourceKind::ALL
        .iter()
        .map(|kind| json!({ "name": kind.label(), "endpoint": kind.webhook_path() }))
        .collect();

    Json(json!({
        "status": "online",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-Platform Donation Webhook for Roblox",
        "platforms": platforms,
        "configuration": {
            "universeId": roblox.universe_id,
            "messagingTopic": roblox.topic,
            "hasApiKey": !roblox.api_key.is_empty(),
        },
        "endpoints": {
            "saweria": format!("{base}{}", SourceKind::Saweria.webhook_path()),
            "socialbuzz": format!("{base}{}", SourceKind::SocialBuzz.webhook_path()),
            "test": format!("{base}/test"),
            "debug": format!("{base}/debug"),
        },
        "usage": {
            "saweria": "Configure this URL in your Saweria webhook settings",
            "socialbuzz": "Configure this URL in your SocialBuzz webhook settings",
            "format": "Send donation message with format: [RobloxUsername] Your message here",
        },
    }))
}

async fn debug_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let roblox = &state.config.roblox;

    Json(json!({
        "server": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "configuration": {
            "universeId": roblox.universe_id,
            "messagingTopic": roblox.topic,
            "apiUrl": state.messaging.endpoint().as_str(),
            "hasApiKey": !roblox.api_key.is_empty(),
            "apiKeyPrefix": roblox.masked_api_key(),
        },
        "supportedPlatforms": SourceKind::ALL.iter().map(|k| k.label()).collect::<Vec<_>>(),
        "messageFormats": MESSAGE_FORMATS,
        "environment": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "uptime": state.uptime_secs(),
        },
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = state.uptime_secs();
    Json(json!({
        "uptime": uptime,
        "uptimeFormatted": format_uptime(uptime as u64),
        "platform": std::env::consts::OS,
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "availableEndpoints": {
                "root": "/",
                "saweria": SourceKind::Saweria.webhook_path(),
                "socialbuzz": SourceKind::SocialBuzz.webhook_path(),
                "test": "/test",
                "debug": "/debug",
                "stats": "/stats",
            },
        })),
    )
}

/// `HH:MM:SS`, wrapping at 24 hours.
fn format_uptime(secs: u64) -> String {
    let secs = secs % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Scheme and host as the caller addressed us, honouring a TLS-terminating proxy.
fn public_base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}
