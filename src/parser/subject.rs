//! Subject grouping: strip reply/forward markers so a thread shares one key.

use once_cell::sync::Lazy;
use regex::Regex;

/// One or more leading markers such as `Re:`, `Fwd[3]:`, `[Ответ(2):`, each
/// optionally followed by a bare `[n]` / `(n)` counter.
static REPLY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^(?:\[?(?:fwd|fw|re|ответ|ha|rcpt)\s*(?:\[\s*\d+\s*\]|\(\s*\d+\s*\))?\s*:\s*(?:(?:\[\s*\d+\s*\]|\(\s*\d+\s*\))\s*)?)+",
    )
    .expect("valid reply prefix pattern")
});

static SPAM_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\[SPAM\]").expect("valid spam tag pattern"));

/// Canonical thread key for a subject.
///
/// `"Re: Re: [2] Hello"` → `"Hello"`, `"Fwd(3): RE: Offer"` → `"Offer"`.
/// Applying it to its own output changes nothing.
pub fn subject_group(subject: &str) -> String {
    let mut current = subject.to_string();
    loop {
        let trimmed = current.trim_matches(|c: char| c.is_whitespace() || c == ']');
        let stripped = REPLY_PREFIX.replace(trimmed, "");
        if stripped == current {
            break;
        }
        current = stripped.into_owned();
    }
    current.trim().to_string()
}

/// Subject marked by a spam filter: leading `[SPAM]` (any case) or `***Spam***` anywhere.
pub fn is_spam_subject(subject: &str) -> bool {
    SPAM_TAG.is_match(subject) || subject.contains("***Spam***")
}
