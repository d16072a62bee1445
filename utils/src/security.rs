//! Redaction of credentials from text that reaches logs or the screen.
//!
//! Error bodies returned by the generation and sandbox endpoints may echo the
//! request, including the API key the user supplied. Everything surfaced to the
//! user passes through [`sanitize_stream_error`] first.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Shortest value treated as a secret by [`redact_known_secrets`].
const MIN_SECRET_LENGTH: usize = 8;

const REDACTED: &str = "[REDACTED]";

struct PatternRedactor {
    anthropic_key: Regex,
    openai_key: Regex,
    gemini_key: Regex,
    bearer: Regex,
}

impl PatternRedactor {
    fn new() -> Option<Self> {
        Some(Self {
            anthropic_key: Regex::new(r"\bsk-ant-[A-Za-z0-9_-]{8,}").ok()?,
            openai_key: Regex::new(r"\bsk-(?:proj-)?[A-Za-z0-9_-]{16,}").ok()?,
            gemini_key: Regex::new(r"\bAIza[0-9A-Za-z_-]{20,}").ok()?,
            bearer: Regex::new(r"(?i)\b(bearer)\s+[A-Za-z0-9._~+/=-]{8,}").ok()?,
        })
    }

    fn redact(&self, raw: &str) -> String {
        let out = self.anthropic_key.replace_all(raw, "sk-ant-***");
        let out = self.openai_key.replace_all(&out, "sk-***");
        let out = self.gemini_key.replace_all(&out, "AIza***");
        let out = self.bearer.replace_all(&out, format!("$1 {REDACTED}"));
        out.into_owned()
    }
}

static PATTERN_REDACTOR: OnceLock<Option<PatternRedactor>> = OnceLock::new();

/// Redact well-known API key shapes (`sk-*`, `sk-ant-*`, `AIza*`, bearer tokens).
#[must_use]
pub fn redact_api_keys(raw: &str) -> String {
    match PATTERN_REDACTOR.get_or_init(PatternRedactor::new) {
        Some(redactor) => redactor.redact(raw),
        None => raw.to_string(),
    }
}

/// Replace every occurrence of the given secret values.
///
/// Values shorter than a few characters are skipped to avoid mangling
/// ordinary words.
#[must_use]
pub fn redact_known_secrets<'a>(raw: &'a str, secrets: &[&str]) -> Cow<'a, str> {
    let mut out = Cow::Borrowed(raw);
    for secret in secrets {
        let secret = secret.trim();
        if secret.len() >= MIN_SECRET_LENGTH && out.contains(secret) {
            out = Cow::Owned(out.replace(secret, REDACTED));
        }
    }
    out
}

/// Trim, strip control characters, and redact key patterns.
#[must_use]
pub fn sanitize_stream_error(raw: &str) -> String {
    let printable: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    redact_api_keys(&printable)
}
