//! Text helpers shared by views and request handlers.

use std::sync::OnceLock;

use regex::Regex;

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Cut `text` to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn chat_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:@|(?:https?://)?(?:t|telegram)\.me/)([a-z][a-z0-9_]{3,31})\b")
            .expect("valid regex")
    })
}

/// Extract a public username from `@name` or a `t.me/name` link.
pub fn extract_username(text: &str) -> Option<String> {
    chat_reference_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Public link for a username.
pub fn public_link(username: &str) -> String {
    format!("https://t.me/{username}")
}
