use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});

/// Phrases that route an item straight to `blocked`. Substring match on
/// lowercased text.
const OFFENSIVE_KEYWORDS: &[&str] = &["kill yourself", "kys", "die in a fire"];

/// Check for offensive content. Returns the reason when a keyword matches.
pub fn check_offensive(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    OFFENSIVE_KEYWORDS
        .iter()
        .find(|kw| lower.contains(*kw))
        .map(|kw| format!("offensive keyword: {kw}"))
}

/// Replace emails and phone numbers with redaction markers.
pub fn redact_pii(text: &str) -> String {
    let redacted = EMAIL_RE.replace_all(text, "[EMAIL]");
    PHONE_RE.replace_all(&redacted, "[PHONE]").into_owned()
}
