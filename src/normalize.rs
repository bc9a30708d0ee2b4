use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::donation::{DonationRecord, SourceKind};
use crate::extract::extract_username;

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

/// Saweria sends every event type to the same URL; only this one is a donation.
const SAWERIA_DONATION_TYPE: &str = "donation";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Outcome of normalizing one webhook body.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Donation(DonationRecord),
    /// Valid body that is not a donation event; acknowledged but not forwarded.
    Ignored { event_type: Option<Value> },
}

/// Candidate keys per canonical field, tried in order.
struct FieldMap {
    display_name: &'static [&'static str],
    amount: &'static [&'static str],
    message: &'static [&'static str],
    email: &'static [&'static str],
}

const SAWERIA_FIELDS: FieldMap = FieldMap {
    display_name: &["donator_name"],
    amount: &["amount_raw"],
    message: &["message"],
    email: &["donator_email"],
};

const SOCIALBUZZ_FIELDS: FieldMap = FieldMap {
    display_name: &["supporter_name", "name", "donator_name"],
    amount: &["amount", "donation_amount", "amount_raw"],
    message: &["message", "supporter_message", "note"],
    email: &["supporter_email", "email"],
};

impl SourceKind {
    fn fields(self) -> &'static FieldMap {
        match self {
            SourceKind::Saweria => &SAWERIA_FIELDS,
            SourceKind::SocialBuzz => &SOCIALBUZZ_FIELDS,
        }
    }
}

/// Normalize a webhook body, stamping it with the current time.
pub fn normalize(kind: SourceKind, body: &Value) -> Result<Normalized, NormalizeError> {
    normalize_at(kind, body, Utc::now().timestamp())
}

/// Normalize a webhook body into a [`DonationRecord`] stamped with `timestamp`.
///
/// Fails only when the body is not a JSON object or reports a negative amount.
/// Missing fields fall back to their defaults.
pub fn normalize_at(
    kind: SourceKind,
    body: &Value,
    timestamp: i64,
) -> Result<Normalized, NormalizeError> {
    let payload = body.as_object().ok_or_else(|| NormalizeError::InvalidPayload {
        reason: format!("expected a JSON object, got {}", json_kind(body)),
    })?;

    if kind == SourceKind::Saweria
        && payload.get("type").and_then(Value::as_str) != Some(SAWERIA_DONATION_TYPE)
    {
        return Ok(Normalized::Ignored {
            event_type: payload.get("type").cloned(),
        });
    }

    let fields = kind.fields();
    let display_name = text_field(payload, fields.display_name)
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
    let amount_raw = amount_field(payload, fields.amount).unwrap_or(0.0);
    let message = text_field(payload, fields.message).unwrap_or_default();
    let email = text_field(payload, fields.email).unwrap_or_default();

    if amount_raw < 0.0 {
        return Err(NormalizeError::InvalidPayload {
            reason: format!("negative donation amount: {amount_raw}"),
        });
    }

    let username = extract_username(&message, &display_name);
    debug!(
        "Normalized {} donation: username={}, display_name={}, amount_raw={}",
        kind, username, display_name, amount_raw
    );

    Ok(Normalized::Donation(DonationRecord {
        username,
        display_name,
        // Saturating cast; amount_raw is finite and non-negative here.
        amount: amount_raw.floor() as u64,
        timestamp,
        source: kind.label().to_string(),
        message,
        email,
    }))
}

/// First key holding a non-empty string (or a number, rendered as text).
fn text_field(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text_value(payload.get(*key)?))
}

/// A non-empty string, or a number rendered as text. Anything else is absent.
pub(crate) fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First key holding a finite number or a numeric string.
fn amount_field(payload: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        let value = payload.get(*key)?;
        let parsed = match value {
            Value::Null => return None,
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed.filter(|v| v.is_finite()) {
            Some(v) => Some(v),
            None => {
                warn!("Ignoring non-numeric amount in field '{}': {}", key, value);
                None
            }
        }
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
