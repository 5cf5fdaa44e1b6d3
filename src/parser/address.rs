//! Sender and recipient address extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::parser::header::decode_header;

/// Default cap on the length of an extracted address, in characters.
pub const MAX_ADDRESS_CHARS: usize = 64;

/// Decides whether an extracted address is worth keeping.
pub trait AddressValidator {
    fn is_valid(&self, address: &str) -> bool;
}

impl<F> AddressValidator for F
where
    F: Fn(&str) -> bool,
{
    fn is_valid(&self, address: &str) -> bool {
        self(address)
    }
}

/// Plain `local@domain.tld` syntax check.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxValidator;

static EMAIL_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~.-]+@[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*\.[a-z]{2,}$")
        .expect("valid address pattern")
});

impl AddressValidator for SyntaxValidator {
    fn is_valid(&self, address: &str) -> bool {
        EMAIL_SYNTAX.is_match(&address.to_lowercase())
    }
}

/// Extract one lower-cased address from a raw header value.
///
/// - `"John <JOHN@x.com>"` → `"john@x.com"`
/// - `"=?UTF-8?B?...?= <a@b.c>"` → `"a@b.c"`
/// - `"plain@x.com"` → `"plain@x.com"`
///
/// Without angle brackets the whole trimmed value is used. The result is cut
/// to `max_chars` characters.
pub fn parse_address(raw: &str, max_chars: usize) -> String {
    let decoded = decode_header(raw);
    let trimmed = decoded.trim();
    let inner = angle_address(trimmed).unwrap_or(trimmed);
    inner.chars().take(max_chars).collect::<String>().to_lowercase()
}

/// Text of the first `<…>` group with at least one character inside.
fn angle_address(s: &str) -> Option<&str> {
    let start = s.find('<')?;
    let rest = &s[start + 1..];
    let first = rest.chars().next()?.len_utf8();
    let end = rest[first..].find('>')? + first;
    Some(&rest[..end])
}

/// Split a comma-separated field and keep the addresses `validator` accepts.
///
/// Order is preserved; duplicates are kept.
pub fn parse_address_list(
    raw: &str,
    max_chars: usize,
    validator: &dyn AddressValidator,
) -> Vec<String> {
    raw.split(',')
        .filter_map(|token| {
            let address = parse_address(token, max_chars);
            if validator.is_valid(&address) {
                Some(address)
            } else {
                trace!(token, "Dropping invalid address");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_angle_address() {
        assert_eq!(parse_address("John <JOHN@X.com>", 64), "john@x.com");
        assert_eq!(parse_address("  <a@b.com>  ", 64), "a@b.com");
    }

    #[test]
    fn test_parse_bare_address() {
        assert_eq!(parse_address(" User@Example.COM ", 64), "user@example.com");
    }

    #[test]
    fn test_parse_encoded_display_name() {
        let raw = "=?UTF-8?B?SsO8cmdlbg==?= <j@example.de>";
        assert_eq!(parse_address(raw, 64), "j@example.de");
    }

    #[test]
    fn test_parse_truncates() {
        let long = format!("{}@x.com", "a".repeat(100));
        assert_eq!(parse_address(&long, 64).chars().count(), 64);
        assert_eq!(parse_address("abcdef", 3), "abc");
    }

    #[test]
    fn test_empty_brackets_fall_back_to_whole_value() {
        assert_eq!(parse_address("<>", 64), "<>");
    }

    #[test]
    fn test_list_with_rejecting_validator() {
        let validator = |a: &str| a.contains('@');
        let list = parse_address_list("John <john@x.com>, not-an-address", 64, &validator);
        assert_eq!(list, vec!["john@x.com"]);
    }

    #[test]
    fn test_list_keeps_order_and_duplicates() {
        let list = parse_address_list(
            "b@x.com, A <a@x.com>, b@x.com, ",
            64,
            &SyntaxValidator,
        );
        assert_eq!(list, vec!["b@x.com", "a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_syntax_validator() {
        assert!(SyntaxValidator.is_valid("john.doe+tag@mail.example.org"));
        assert!(!SyntaxValidator.is_valid("not-an-address"));
        assert!(!SyntaxValidator.is_valid("a@b"));
        assert!(!SyntaxValidator.is_valid(""));
        assert!(!SyntaxValidator.is_valid("a b@c.com"));
    }
}
