//! The mail-store collaborator: connection-level fetch primitives.
//!
//! Every call names the mailbox explicitly; implementations must not rely on
//! a previously selected mailbox.

pub mod eml;
pub mod memory;

use crate::error::StoreError;
use crate::model::part::RawPart;
use crate::parser::mime::SectionPath;

/// Header fields of one message as the store reports them.
///
/// Text fields are raw header values and may still contain RFC 2047
/// encoded words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverview {
    /// Message sequence number within the mailbox.
    pub msgno: u32,
    pub date: String,
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub flagged: bool,
    pub answered: bool,
    pub seen: bool,
    pub draft: bool,
    pub deleted: bool,
    pub recent: bool,
}

/// Fetch primitives consumed by [`Normalizer`](crate::normalize::Normalizer).
pub trait MailStore {
    /// Envelope-level header fields and flags.
    fn fetch_header_overview(&mut self, mailbox: &str, uid: u32)
        -> Result<HeaderOverview, StoreError>;

    /// The full raw header block.
    fn fetch_raw_header_block(&mut self, mailbox: &str, uid: u32) -> Result<String, StoreError>;

    /// The body structure tree.
    fn fetch_structure(&mut self, mailbox: &str, uid: u32) -> Result<RawPart, StoreError>;

    /// Raw, still transfer-encoded bytes of one section.
    fn fetch_body(
        &mut self,
        mailbox: &str,
        uid: u32,
        section: &SectionPath,
    ) -> Result<Vec<u8>, StoreError>;

    /// Diagnostics queued since the last call, without failing the fetch
    /// that produced them.
    fn drain_warnings(&mut self) -> Vec<String> {
        Vec::new()
    }
}
