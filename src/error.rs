//! Centralized error types for mailnorm.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::normalize::Stage;

/// Failure reported by a [`MailStore`](crate::store::MailStore) implementation.
///
/// A mail store may report several diagnostics for a single call (an IMAP
/// connection accumulates them), so the error carries a list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .messages.join("; "))]
pub struct StoreError {
    pub messages: Vec<String>,
}

impl StoreError {
    /// Build an error from a single diagnostic.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// Build an error from several diagnostics.
    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }
}

/// All errors produced by the mailnorm library.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// A structural fetch failed at the mail-store boundary.
    #[error("{stage} failed for uid {uid}: {}", Messages(.messages))]
    Fetch {
        stage: Stage,
        uid: u32,
        messages: Vec<String>,
    },

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The message file could not be parsed at all.
    #[error("Cannot parse message: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, NormalizeError>`.
pub type Result<T> = std::result::Result<T, NormalizeError>;

impl NormalizeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Diagnostics carried by a fetch failure (empty for other variants).
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Fetch { messages, .. } => messages,
            _ => &[],
        }
    }
}

struct Messages<'a>(&'a [String]);

impl fmt::Display for Messages<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "no diagnostic from mail store")
        } else {
            write!(f, "{}", self.0.join("; "))
        }
    }
}

/// Drop benign diagnostics and duplicates, keeping first-seen order.
///
/// A diagnostic is benign when it contains one of `benign` (case-insensitive).
pub fn collapse_messages<I>(messages: I, benign: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let benign: Vec<String> = benign.iter().map(|b| b.to_lowercase()).collect();
    let mut collapsed: Vec<String> = Vec::new();
    for message in messages {
        let lower = message.to_lowercase();
        if benign.iter().any(|b| !b.is_empty() && lower.contains(b.as_str())) {
            continue;
        }
        if !collapsed.contains(&message) {
            collapsed.push(message);
        }
    }
    collapsed
}
