use serde::{Deserialize, Serialize};

/// Donation platforms that deliver webhooks to this relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Saweria,
    SocialBuzz,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Saweria, SourceKind::SocialBuzz];

    /// Value written to [`DonationRecord::source`].
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Saweria => "Saweria",
            SourceKind::SocialBuzz => "SocialBuzz",
        }
    }

    /// Route the platform posts its webhooks to.
    pub fn webhook_path(self) -> &'static str {
        match self {
            SourceKind::Saweria => "/saweria-webhook",
            SourceKind::SocialBuzz => "/socialbuzz-webhook",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Canonical donation, independent of the platform that reported it.
///
/// This is the exact shape the game server decodes from the MessagingService
/// payload, hence the camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    /// Roblox username the donation is credited to. Never empty.
    pub username: String,
    pub display_name: String,
    /// Whole currency units (IDR), floored from the platform value.
    pub amount: u64,
    /// Unix seconds when the relay processed the webhook.
    pub timestamp: i64,
    pub source: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub email: String,
}

/// Format an amount the way Indonesian donors read it, e.g. `Rp 25.000`.
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("Rp {grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DonationRecord {
        DonationRecord {
            username: "Builder_7".to_string(),
            display_name: "Budi".to_string(),
            amount: 15000,
            timestamp: 1_760_000_000,
            source: SourceKind::Saweria.label().to_string(),
            message: "[Builder_7] semangat!".to_string(),
            email: "budi@example.com".to_string(),
        }
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["displayName"], "Budi");
        assert_eq!(value["username"], "Builder_7");
        assert_eq!(value["amount"], 15000);
        assert_eq!(value["timestamp"], 1_760_000_000_i64);
        assert_eq!(value["source"], "Saweria");
        assert!(value.get("display_name").is_none());
    }

    #[test]
    fn test_missing_email_deserializes_empty() {
        let record: DonationRecord = serde_json::from_str(
            r#"{"username":"A","displayName":"A","amount":1,"timestamp":2,"source":"Test","message":"hi"}"#,
        )
        .unwrap();
        assert_eq!(record.email, "");
    }

    #[test]
    fn test_source_labels_and_paths() {
        assert_eq!(SourceKind::Saweria.label(), "Saweria");
        assert_eq!(SourceKind::SocialBuzz.label(), "SocialBuzz");
        assert_eq!(SourceKind::Saweria.webhook_path(), "/saweria-webhook");
        assert_eq!(SourceKind::SocialBuzz.webhook_path(), "/socialbuzz-webhook");
    }

    #[test]
    fn test_format_rupiah_groups_thousands() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(999), "Rp 999");
        assert_eq!(format_rupiah(25000), "Rp 25.000");
        assert_eq!(format_rupiah(1_234_567), "Rp 1.234.567");
    }
}
