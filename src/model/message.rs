//! The normalized message record returned by
//! [`Normalizer::normalize`](crate::normalize::Normalizer::normalize).

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A part kept as an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedAttachment {
    /// Decoded filename, if the part declared one.
    pub name: Option<String>,
    /// Transfer-decoded (and, for parts with a charset, transcoded) bytes.
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
    /// Canonical MIME type (e.g. `"image/png"`).
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Message flags: the IMAP system flags plus three derived markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageFlags {
    pub flagged: bool,
    pub answered: bool,
    pub seen: bool,
    pub draft: bool,
    pub deleted: bool,
    pub recent: bool,
    /// `Auto-Submitted: auto-replied` present in the raw header block.
    pub autosubmitted: bool,
    /// Sender address starts with `mailer-daemon@`.
    pub mailerdaemon: bool,
    /// Subject tagged as spam by an upstream filter.
    pub spam: bool,
}

/// Flat, application-level view of one message.
///
/// Produced once per `normalize()` call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub uid: u32,
    pub msgno: u32,
    #[serde(flatten)]
    pub flags: MessageFlags,
    /// Lower-cased sender address.
    pub from: String,
    /// Validated To and Cc addresses, in header order.
    pub to: Vec<String>,
    #[serde(serialize_with = "serialize_date")]
    pub date: DateTime<Utc>,
    /// Lower-cased mailbox name without the server reference.
    pub mailbox: String,
    pub subject: String,
    /// Subject with reply/forward prefixes stripped, for thread grouping.
    pub subject_group: String,
    pub message_id: String,
    /// Inline body text; `None` for header-only records or when no part qualified.
    pub text: Option<String>,
    #[serde(rename = "file")]
    pub attachments: Vec<DecodedAttachment>,
}

impl NormalizedMessage {
    /// Date formatted as `YYYY-MM-DD HH:MM:SS`.
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn serialize_date<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&date.format(DATE_FORMAT))
}
