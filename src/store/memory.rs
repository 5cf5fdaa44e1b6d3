//! In-memory mail store for tests and embedding.

use std::collections::{BTreeMap, HashMap};

use crate::error::StoreError;
use crate::model::part::RawPart;
use crate::parser::mime::SectionPath;
use crate::store::{HeaderOverview, MailStore};

/// The kinds of fetch a [`MailStore`] serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Overview,
    HeaderBlock,
    Structure,
    Body,
}

/// One recorded call, for asserting fetch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub kind: FetchKind,
    pub mailbox: String,
    pub uid: u32,
    pub section: Option<String>,
}

/// Everything the store knows about one message.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub overview: HeaderOverview,
    pub header_block: String,
    pub structure: RawPart,
    /// Raw section bytes keyed by dotted address.
    pub bodies: HashMap<String, Vec<u8>>,
}

impl StoredMessage {
    pub fn new(
        overview: HeaderOverview,
        header_block: impl Into<String>,
        structure: RawPart,
    ) -> Self {
        Self {
            overview,
            header_block: header_block.into(),
            structure,
            bodies: HashMap::new(),
        }
    }

    pub fn with_body(mut self, section: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(section.to_string(), bytes.into());
        self
    }
}

/// A mail store holding messages in memory.
///
/// Failures and warnings can be scripted per [`FetchKind`], and every call is
/// recorded in [`MemoryStore::fetch_log`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    mailboxes: HashMap<String, BTreeMap<u32, StoredMessage>>,
    failures: HashMap<FetchKind, Vec<String>>,
    warnings: HashMap<FetchKind, Vec<String>>,
    pending: Vec<String>,
    log: Vec<FetchRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mailbox: &str, uid: u32, message: StoredMessage) {
        self.mailboxes
            .entry(mailbox.to_string())
            .or_default()
            .insert(uid, message);
    }

    /// Make every fetch of `kind` fail with `messages`.
    pub fn fail_on<I, S>(&mut self, kind: FetchKind, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failures
            .insert(kind, messages.into_iter().map(Into::into).collect());
    }

    /// Queue `messages` as diagnostics after every fetch of `kind`.
    pub fn warn_on<I, S>(&mut self, kind: FetchKind, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warnings
            .insert(kind, messages.into_iter().map(Into::into).collect());
    }

    pub fn fetch_log(&self) -> &[FetchRecord] {
        &self.log
    }

    /// Forget recorded fetches. Stored messages and scripted outcomes stay.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Sections requested through `fetch_body`, in call order.
    pub fn fetched_sections(&self) -> Vec<String> {
        self.log
            .iter()
            .filter_map(|r| r.section.clone())
            .collect()
    }

    fn begin(
        &mut self,
        kind: FetchKind,
        mailbox: &str,
        uid: u32,
        section: Option<&SectionPath>,
    ) -> Result<&StoredMessage, StoreError> {
        self.log.push(FetchRecord {
            kind,
            mailbox: mailbox.to_string(),
            uid,
            section: section.map(ToString::to_string),
        });
        if let Some(queued) = self.warnings.get(&kind) {
            self.pending.extend(queued.iter().cloned());
        }
        if let Some(messages) = self.failures.get(&kind) {
            return Err(StoreError::from_messages(messages.iter().cloned()));
        }
        self.mailboxes
            .get(mailbox)
            .ok_or_else(|| StoreError::new(format!("Mailbox '{mailbox}' does not exist")))?
            .get(&uid)
            .ok_or_else(|| StoreError::new(format!("No message with UID {uid} in '{mailbox}'")))
    }
}

impl MailStore for MemoryStore {
    fn fetch_header_overview(
        &mut self,
        mailbox: &str,
        uid: u32,
    ) -> Result<HeaderOverview, StoreError> {
        Ok(self
            .begin(FetchKind::Overview, mailbox, uid, None)?
            .overview
            .clone())
    }

    fn fetch_raw_header_block(&mut self, mailbox: &str, uid: u32) -> Result<String, StoreError> {
        Ok(self
            .begin(FetchKind::HeaderBlock, mailbox, uid, None)?
            .header_block
            .clone())
    }

    fn fetch_structure(&mut self, mailbox: &str, uid: u32) -> Result<RawPart, StoreError> {
        Ok(self
            .begin(FetchKind::Structure, mailbox, uid, None)?
            .structure
            .clone())
    }

    fn fetch_body(
        &mut self,
        mailbox: &str,
        uid: u32,
        section: &SectionPath,
    ) -> Result<Vec<u8>, StoreError> {
        let key = section.to_string();
        self.begin(FetchKind::Body, mailbox, uid, Some(section))?
            .bodies
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::new(format!("No section {key} in UID {uid}")))
    }

    fn drain_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let structure = RawPart::from_codes(0, "plain", 0);
        store.insert(
            "INBOX",
            5,
            StoredMessage::new(HeaderOverview::default(), "Subject: x\r\n", structure)
                .with_body("1", "body"),
        );
        store
    }

    #[test]
    fn test_fetches_and_logs() {
        let mut store = store();
        let body = store
            .fetch_body("INBOX", 5, &SectionPath::root(1))
            .unwrap();
        assert_eq!(body, b"body");
        assert_eq!(store.fetched_sections(), vec!["1"]);
        assert_eq!(store.fetch_log()[0].kind, FetchKind::Body);
    }

    #[test]
    fn test_clear_log_keeps_messages() {
        let mut store = store();
        store.fetch_structure("INBOX", 5).unwrap();
        store.fetch_body("INBOX", 5, &SectionPath::root(1)).unwrap();
        assert_eq!(store.fetch_log().len(), 2);
        store.clear_log();
        assert!(store.fetch_log().is_empty());
        assert!(store.fetched_sections().is_empty());
        let body = store.fetch_body("INBOX", 5, &SectionPath::root(1)).unwrap();
        assert_eq!(body, b"body");
        assert_eq!(store.fetched_sections(), vec!["1"]);
    }

    #[test]
    fn test_mailbox_is_explicit() {
        let mut store = store();
        assert!(store.fetch_structure("Sent", 5).is_err());
        assert!(store.fetch_structure("INBOX", 6).is_err());
        assert!(store.fetch_structure("INBOX", 5).is_ok());
    }

    #[test]
    fn test_scripted_failure_and_warnings() {
        let mut store = store();
        store.fail_on(FetchKind::Structure, ["boom", "boom"]);
        store.warn_on(FetchKind::HeaderBlock, ["careful"]);
        let err = store.fetch_structure("INBOX", 5).unwrap_err();
        assert_eq!(err.messages, vec!["boom", "boom"]);
        assert!(store.drain_warnings().is_empty());
        store.fetch_raw_header_block("INBOX", 5).unwrap();
        assert_eq!(store.drain_warnings(), vec!["careful"]);
        assert!(store.drain_warnings().is_empty());
    }
}
