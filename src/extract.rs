use regex::Regex;
use std::sync::LazyLock;

// `\w` in regex is Unicode-aware by default; Roblox usernames are ASCII only.
static BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([A-Za-z0-9_]+)\]").expect("bracket regex is valid"));
static AT_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@([A-Za-z0-9_]+)").expect("at-sign regex is valid"));
static COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_]+):").expect("colon regex is valid"));

/// Message formats recognised by [`extract_username`], in priority order.
pub const MESSAGE_FORMATS: [&str; 3] = [
    "[RobloxUsername] Your message",
    "@RobloxUsername Your message",
    "RobloxUsername: Your message",
];

/// Pull the target username out of a donation message.
///
/// Tries `[Name] ...`, then `@Name ...`, then `Name: ...`, each anchored at
/// the start of the message. Falls back to `fallback` (the donor's display
/// name) when none match or the message is empty.
pub fn extract_username(message: &str, fallback: &str) -> String {
    if message.is_empty() {
        return fallback.to_string();
    }

    [&*BRACKET, &*AT_SIGN, &*COLON]
        .into_iter()
        .find_map(|pattern| pattern.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|token| token.as_str().to_string())
        .unwrap_or_else(|| fallback.to_string())
}
