//! Header text decoding: RFC 2047 encoded words, folding and dates.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::parser::content::decode_base64;

/// Charset reported for text that was not inside an encoded word.
pub const DEFAULT_CHARSET: &str = "default";

/// One run of header text, tagged with the charset it was declared in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderWord {
    /// Declared charset, or [`DEFAULT_CHARSET`] for unencoded text.
    pub charset: String,
    /// Raw bytes after B/Q decoding, still in `charset`.
    pub text: Vec<u8>,
}

impl HeaderWord {
    fn plain(text: &str) -> Self {
        Self {
            charset: DEFAULT_CHARSET.to_string(),
            text: text.as_bytes().to_vec(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.charset == DEFAULT_CHARSET
    }
}

/// Decode a raw header value into UTF-8 text.
///
/// Encoded words are transcoded from their declared charset; invalid byte
/// sequences are dropped. A leading `UTF-8''<percent-encoded>.` run, as
/// produced by some clients for attachment names, is percent-decoded too.
pub fn decode_header(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for word in decode_words(input) {
        if word.is_default() {
            result.push_str(&String::from_utf8_lossy(&word.text));
        } else {
            result.push_str(&decode_charset_ignoring_errors(&word.charset, &word.text));
        }
    }
    fix_utf8_percent(&result)
}

/// Split a header value into charset-tagged runs, in original order.
///
/// Example: `"Re: =?UTF-8?B?SG9sYQ==?="` → `[("default", "Re: "), ("UTF-8", "Hola")]`.
/// Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2).
/// A token that looks like an encoded word but cannot be decoded stays as plain text.
pub fn decode_words(input: &str) -> Vec<HeaderWord> {
    let mut words: Vec<HeaderWord> = Vec::new();
    let mut plain = String::new();
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            plain.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match try_decode_one_word(after_start) {
            Some((word, consumed)) => {
                if !plain.is_empty() {
                    words.push(HeaderWord::plain(&plain));
                    plain.clear();
                }
                words.push(word);
                remaining = &after_start[consumed..];
                last_was_encoded = true;
            }
            None => {
                plain.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    plain.push_str(remaining);
    if !plain.is_empty() {
        words.push(HeaderWord::plain(&plain));
    }
    words
}

/// Parse `charset?encoding?text?=`; returns the word and the bytes consumed.
fn try_decode_one_word(s: &str) -> Option<(HeaderWord, usize)> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let consumed = first_q + 1 + second_q + 1 + end + 2;

    let text = match encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(encoded_text.as_bytes())?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "UTF-8*en"
    let charset = charset.split('*').next().unwrap_or(charset).to_string();

    Some((HeaderWord { charset, text }, consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match hex_pair(bytes[i + 1], bytes[i + 2]) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Decode bytes from a named charset, dropping invalid sequences.
fn decode_charset_ignoring_errors(charset: &str, bytes: &[u8]) -> String {
    let decoded = match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if !had_errors {
                return text.into_owned();
            }
            debug!(charset, "Dropping invalid sequences in encoded word");
            text.into_owned()
        }
        None => {
            warn!(charset, "Unknown charset in encoded word, reading as UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    };
    decoded.replace(char::REPLACEMENT_CHARACTER, "")
}

static UTF8_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^UTF-8''(.+?)\.").expect("valid UTF-8'' pattern"));

/// Percent-decode a leading `UTF-8''<text>.` run, keeping the period.
///
/// `"UTF-8''%D0%BE%D1%82%D1%87%D0%B5%D1%82.pdf"` → `"отчет.pdf"`.
/// Only this one malformed shape is handled; other RFC 2231 values are left alone.
pub fn fix_utf8_percent(input: &str) -> String {
    UTF8_PERCENT
        .replace(input, |caps: &Captures<'_>| {
            let plus_as_space = caps[1].replace('+', " ");
            format!("{}.", percent_decode_str(&plus_as_space).decode_utf8_lossy())
        })
        .into_owned()
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, IMAP `DD-MON-YYYY` and named time zones.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let no_dow = strip_day_of_week(trimmed);
    let imap_normalized = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];

    for candidate in [&no_dow, &imap_normalized] {
        let candidate = strip_zone_comment(candidate);
        let replaced = replace_named_tz(&candidate);
        for text in [&candidate, &replaced] {
            for fmt in &formats {
                if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
                    return Some(Utc.from_utc_datetime(&ndt));
                }
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let `mail-parser` read the value as a `Date:` header.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    if !s.contains('-') {
        return s.to_string();
    }
    let lower = s.to_lowercase();
    for month in MONTHS {
        let pattern = format!("-{}-", month.to_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }
    s.to_string()
}

/// Strip a leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.trim_start_matches(',');
            if rest.starts_with(' ') {
                return rest.trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Drop a trailing zone comment: `"... +0000 (UTC)"`.
fn strip_zone_comment(s: &str) -> String {
    match s.rfind(" (") {
        Some(pos) if s.ends_with(')') => s[..pos].trim_end().to_string(),
        _ => s.to_string(),
    }
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("MSK", "+0300"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
