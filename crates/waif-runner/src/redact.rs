//! Secret redaction for captured output.
//!
//! Rules run in a fixed order:
//!
//! 1. clip to the length limit with a `[TRUNCATED N chars]` marker
//! 2. `Bearer <token>`
//! 3. `key=value` / `key: "value"` where the key names a secret
//! 4. `sk-` prefixed keys
//! 5. long base64 runs (pure lowercase hex is left for the next rule)
//! 6. long hex runs
//! 7. long JSON `text`/`body`/`message`/`content` string values
//!
//! Placeholders are never matched by a later rule, so redacting already
//! redacted text leaves it unchanged.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::text::truncate_with_marker;

/// Default length limit, in characters.
pub const DEFAULT_MAX_LEN: usize = 1000;

/// Longest JSON text field value kept verbatim.
const JSON_FIELD_LIMIT: usize = 200;

const JSON_FIELD_MARKER: &str = "...[TRUNCATED]";

static TRUNCATED_TAIL_RE: OnceLock<Regex> = OnceLock::new();
static BEARER_RE: OnceLock<Regex> = OnceLock::new();
static KEY_VALUE_RE: OnceLock<Regex> = OnceLock::new();
static SK_RE: OnceLock<Regex> = OnceLock::new();
static BASE64_RE: OnceLock<Regex> = OnceLock::new();
static HEX_RE: OnceLock<Regex> = OnceLock::new();
static JSON_FIELD_RE: OnceLock<Regex> = OnceLock::new();

fn truncated_tail_re() -> &'static Regex {
    TRUNCATED_TAIL_RE.get_or_init(|| Regex::new(r"\n\[TRUNCATED \d+ chars\]\z").unwrap())
}

fn bearer_re() -> &'static Regex {
    BEARER_RE.get_or_init(|| Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9\-._~+/]+=*").unwrap())
}

fn key_value_re() -> &'static Regex {
    KEY_VALUE_RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(?P<key>[a-z0-9_\-]*?(?:api[_-]?key|secret|access[_-]?token|token|sk)\b)",
            r#"(?P<sep>["']?\s*[:=]\s*)"#,
            r#"(?:"(?P<dq>[A-Za-z0-9\-._~+/=]{8,})"|'(?P<sq>[A-Za-z0-9\-._~+/=]{8,})'|(?P<bare>[A-Za-z0-9\-._~+/=]{8,}))"#,
        ))
        .unwrap()
    })
}

fn sk_re() -> &'static Regex {
    SK_RE.get_or_init(|| Regex::new(r"\bsk-[A-Za-z0-9]{16,}\b").unwrap())
}

fn base64_re() -> &'static Regex {
    BASE64_RE.get_or_init(|| Regex::new(r"\b[A-Za-z0-9+/=]{40,}\b").unwrap())
}

fn hex_re() -> &'static Regex {
    HEX_RE.get_or_init(|| Regex::new(r"(?i)\b[a-f0-9]{32,}\b").unwrap())
}

fn json_field_re() -> &'static Regex {
    JSON_FIELD_RE.get_or_init(|| {
        Regex::new(r#"(?is)("(?:text|body|message|content)"\s*:\s*")(.*?)(")"#).unwrap()
    })
}

/// Redact `text` with the default length limit.
pub fn redact(text: &str) -> String {
    Redactor::default().redact(text)
}

/// Secret redactor.
#[derive(Debug, Clone, Copy)]
pub struct Redactor {
    max_len: usize,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

impl Redactor {
    /// Create a redactor that clips input to `max_len` characters.
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Redact `text`. Text with nothing to redact comes back unchanged.
    pub fn redact(&self, text: &str) -> String {
        let text = self.clip(text);
        let text = bearer_re().replace_all(&text, "Bearer [REDACTED]");
        let text = redact_key_values(&text);
        let text = sk_re().replace_all(&text, "sk-[REDACTED]");
        let text = redact_base64(&text);
        let text = hex_re().replace_all(&text, "[REDACTED_HEX]");
        truncate_json_fields(&text).into_owned()
    }

    /// Clip to `max_len`, leaving text that was already clipped alone.
    fn clip<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if let Some(tail) = truncated_tail_re().find(text) {
            if text[..tail.start()].chars().count() <= self.max_len {
                return Cow::Borrowed(text);
            }
        }
        truncate_with_marker(text, self.max_len)
    }
}

fn redact_key_values(text: &str) -> Cow<'_, str> {
    key_value_re().replace_all(text, |caps: &Captures| {
        let key = &caps["key"];
        let sep = &caps["sep"];
        if caps.name("dq").is_some() {
            format!("{}{}\"[REDACTED]\"", key, sep)
        } else if caps.name("sq").is_some() {
            format!("{}{}'[REDACTED]'", key, sep)
        } else {
            format!("{}{}[REDACTED]", key, sep)
        }
    })
}

fn redact_base64(text: &str) -> Cow<'_, str> {
    base64_re().replace_all(text, |caps: &Captures| {
        let run = &caps[0];
        if run.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            run.to_string()
        } else {
            "[REDACTED_BASE64]".to_string()
        }
    })
}

fn truncate_json_fields(text: &str) -> Cow<'_, str> {
    json_field_re().replace_all(text, |caps: &Captures| {
        let value = &caps[2];
        let chars = value.chars().count();
        let already_clipped = value.ends_with(JSON_FIELD_MARKER)
            && chars <= JSON_FIELD_LIMIT + JSON_FIELD_MARKER.len();

        if chars <= JSON_FIELD_LIMIT || already_clipped {
            return caps[0].to_string();
        }

        let head: String = value.chars().take(JSON_FIELD_LIMIT).collect();
        format!("{}{}{}{}", &caps[1], head, JSON_FIELD_MARKER, &caps[3])
    })
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
