//! Message assembly: drives a [`MailStore`] through one message and builds
//! its [`NormalizedMessage`].
//!
//! The assembler moves through the [`Stage`]s in order and stops at the first
//! failed fetch. Everything below the fetch boundary degrades locally: bad
//! charsets keep their bytes, bad addresses are dropped, unknown types keep an
//! empty major type.

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::config::{Config, LimitsConfig};
use crate::error::{collapse_messages, NormalizeError, Result, StoreError};
use crate::model::message::{MessageFlags, NormalizedMessage};
use crate::model::part::RawPart;
use crate::parser::address::{parse_address, parse_address_list, AddressValidator, SyntaxValidator};
use crate::parser::classify::{classify_part, is_classifiable, Classification};
use crate::parser::content::decode_part;
use crate::parser::header::{decode_header, parse_date};
use crate::parser::mime::{flatten, SectionPath};
use crate::parser::subject::{is_spam_subject, subject_group};
use crate::store::{HeaderOverview, MailStore};

/// Steps of assembling one message.
///
/// A run ends either in [`Stage::Assembled`] or in failure. A failed run
/// returns [`NormalizeError::Fetch`] whose `stage` names the step that
/// failed; no partial record is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchHeaders,
    ParseHeaders,
    FetchStructure,
    Flatten,
    FetchBodies,
    Classify,
    Assembled,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

static AUTO_REPLIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Auto-Submitted:\s*auto-replied").expect("valid regex"));

static MAILER_DAEMON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^mailer-daemon@").expect("valid regex"));

/// Turns store messages into [`NormalizedMessage`] records.
///
/// Holds only configuration; no state is carried between messages, so one
/// normalizer can serve many stores.
pub struct Normalizer {
    limits: LimitsConfig,
    benign: Vec<String>,
    validator: Box<dyn AddressValidator + Send + Sync>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("limits", &self.limits)
            .field("benign", &self.benign)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(config: &Config) -> Self {
        Self {
            limits: config.limits.clone(),
            benign: config.store.benign_warnings.clone(),
            validator: Box::new(SyntaxValidator),
        }
    }

    /// Replace the validator applied to To/Cc addresses.
    pub fn with_validator(
        mut self,
        validator: impl AddressValidator + Send + Sync + 'static,
    ) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Build the record for `uid` in `mailbox`.
    ///
    /// With `headers_only`, no structure or body is fetched: `text` is `None`
    /// and `attachments` is empty.
    ///
    /// # Errors
    ///
    /// [`NormalizeError::Fetch`] when any store call fails or leaves a
    /// non-benign diagnostic behind.
    pub fn normalize(
        &self,
        store: &mut dyn MailStore,
        mailbox: &str,
        uid: u32,
        headers_only: bool,
    ) -> Result<NormalizedMessage> {
        debug!(uid, mailbox, stage = %Stage::FetchHeaders);
        let overview = store.fetch_header_overview(mailbox, uid);
        let overview = self.checked(store, Stage::FetchHeaders, uid, overview)?;
        let header_block = store.fetch_raw_header_block(mailbox, uid);
        let header_block = self.checked(store, Stage::FetchHeaders, uid, header_block)?;

        debug!(uid, stage = %Stage::ParseHeaders);
        let mut message = self.parse_headers(uid, mailbox, &overview, &header_block);
        if headers_only {
            debug!(uid, stage = %Stage::Assembled, "Headers only");
            return Ok(message);
        }

        debug!(uid, stage = %Stage::FetchStructure);
        let structure = store.fetch_structure(mailbox, uid);
        let structure = self.checked(store, Stage::FetchStructure, uid, structure)?;

        let flat = flatten(&structure);
        debug!(uid, stage = %Stage::Flatten, sections = flat.len());

        // Fetch order is section order; classification depends on it.
        let mut leaves: Vec<(&SectionPath, &RawPart, Vec<u8>)> = Vec::new();
        for leaf in flat.leaves().filter(|leaf| is_classifiable(leaf.part)) {
            debug!(uid, stage = %Stage::FetchBodies, section = %leaf.section);
            let raw = store.fetch_body(mailbox, uid, leaf.section);
            let raw = self.checked(store, Stage::FetchBodies, uid, raw)?;
            leaves.push((leaf.section, leaf.part, decode_part(leaf.part, &raw)));
        }

        debug!(uid, stage = %Stage::Classify, leaves = leaves.len());
        let classification = leaves
            .into_iter()
            .fold(Classification::default(), |acc, (_, part, content)| {
                classify_part(acc, part, content, &self.limits)
            });

        message.text = classification.body;
        message.attachments = classification.attachments;
        info!(
            uid,
            stage = %Stage::Assembled,
            has_text = message.text.is_some(),
            attachments = message.attachments.len(),
            "Message normalized"
        );
        Ok(message)
    }

    /// Header-derived part of the record.
    fn parse_headers(
        &self,
        uid: u32,
        mailbox: &str,
        overview: &HeaderOverview,
        header_block: &str,
    ) -> NormalizedMessage {
        let max_chars = self.limits.address_max_chars;
        let subject = decode_header(&overview.subject);
        let from = parse_address(&overview.from, max_chars);

        let recipients = match overview.cc.as_deref() {
            Some(cc) if !cc.trim().is_empty() => format!("{}, {}", overview.to, cc),
            _ => overview.to.clone(),
        };
        let to = parse_address_list(&recipients, max_chars, self.validator.as_ref());

        let date = parse_date(&overview.date).unwrap_or_else(|| {
            debug!(uid, date = %overview.date, "Unparsable date, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        });

        let flags = MessageFlags {
            flagged: overview.flagged,
            answered: overview.answered,
            seen: overview.seen,
            draft: overview.draft,
            deleted: overview.deleted,
            recent: overview.recent,
            autosubmitted: AUTO_REPLIED.is_match(header_block),
            mailerdaemon: MAILER_DAEMON.is_match(&from),
            spam: is_spam_subject(&subject),
        };

        NormalizedMessage {
            uid,
            msgno: overview.msgno,
            flags,
            from,
            to,
            date,
            mailbox: mailbox_name(mailbox),
            subject_group: subject_group(&subject),
            subject,
            message_id: overview.message_id.trim().to_string(),
            text: None,
            attachments: Vec::new(),
        }
    }

    /// Fold the store's queued diagnostics into the outcome of one fetch.
    fn checked<T>(
        &self,
        store: &mut dyn MailStore,
        stage: Stage,
        uid: u32,
        result: std::result::Result<T, StoreError>,
    ) -> Result<T> {
        let warnings = store.drain_warnings();
        match result {
            Ok(value) => {
                let messages = collapse_messages(warnings, &self.benign);
                if messages.is_empty() {
                    Ok(value)
                } else {
                    Err(NormalizeError::Fetch {
                        stage,
                        uid,
                        messages,
                    })
                }
            }
            Err(err) => Err(NormalizeError::Fetch {
                stage,
                uid,
                messages: collapse_messages(err.messages.into_iter().chain(warnings), &self.benign),
            }),
        }
    }
}

/// Mailbox name without any `{server}` reference, trimmed and lower-cased.
pub fn mailbox_name(mailbox: &str) -> String {
    let name = match mailbox.strip_prefix('{') {
        Some(rest) => rest.split_once('}').map_or(mailbox, |(_, name)| name),
        None => mailbox,
    };
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{FetchKind, MemoryStore, StoredMessage};

    fn overview() -> HeaderOverview {
        HeaderOverview {
            msgno: 3,
            date: "Tue, 15 Oct 2024 10:30:00 +0200".into(),
            message_id: "<abc@example.com>".into(),
            subject: "=?UTF-8?B?UmU6INCf0YDQuNCy0LXRgg==?=".into(),
            from: "Mailer-Daemon@mx.example.com".into(),
            to: "John <John@Example.com>, broken".into(),
            cc: Some("ann@example.org".into()),
            seen: true,
            ..HeaderOverview::default()
        }
    }

    fn store() -> MemoryStore {
        let structure = RawPart::from_codes(0, "plain", 0);
        let mut store = MemoryStore::new();
        store.insert(
            "INBOX",
            9,
            StoredMessage::new(
                overview(),
                "Subject: x\r\nAuto-Submitted: Auto-Replied\r\n",
                structure,
            )
            .with_body("1", "hello"),
        );
        store
    }

    #[test]
    fn test_headers_only() {
        let mut store = store();
        let msg = Normalizer::default()
            .normalize(&mut store, "INBOX", 9, true)
            .unwrap();
        assert_eq!(msg.uid, 9);
        assert_eq!(msg.msgno, 3);
        assert_eq!(msg.subject, "Re: Привет");
        assert_eq!(msg.subject_group, "Привет");
        assert_eq!(msg.from, "mailer-daemon@mx.example.com");
        assert_eq!(msg.to, vec!["john@example.com", "ann@example.org"]);
        assert_eq!(msg.date_string(), "2024-10-15 08:30:00");
        assert_eq!(msg.mailbox, "inbox");
        assert_eq!(msg.message_id, "<abc@example.com>");
        assert!(msg.flags.seen);
        assert!(msg.flags.autosubmitted);
        assert!(msg.flags.mailerdaemon);
        assert!(!msg.flags.spam);
        assert!(msg.text.is_none());
        assert!(msg.attachments.is_empty());
        assert!(store.fetched_sections().is_empty());
        assert!(store
            .fetch_log()
            .iter()
            .all(|r| r.kind != FetchKind::Structure));
    }

    #[test]
    fn test_full_fetch_single_part() {
        let mut store = store();
        let msg = Normalizer::default()
            .normalize(&mut store, "INBOX", 9, false)
            .unwrap();
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert_eq!(store.fetched_sections(), vec!["1"]);
    }

    #[test]
    fn test_unparsable_date_is_epoch() {
        let mut store = MemoryStore::new();
        let overview = HeaderOverview {
            date: "not a date".into(),
            ..HeaderOverview::default()
        };
        store.insert(
            "INBOX",
            1,
            StoredMessage::new(overview, "", RawPart::from_codes(0, "plain", 0)),
        );
        let msg = Normalizer::default()
            .normalize(&mut store, "INBOX", 1, true)
            .unwrap();
        assert_eq!(msg.date, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(msg.date_string(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_structure_failure_is_fatal_and_collapsed() {
        let mut store = store();
        store.fail_on(
            FetchKind::Structure,
            [
                "Mailbox is locked",
                "Unexpected characters at end of address: <>",
                "Mailbox is locked",
            ],
        );
        let err = Normalizer::default()
            .normalize(&mut store, "INBOX", 9, false)
            .unwrap_err();
        match err {
            NormalizeError::Fetch {
                stage,
                uid,
                messages,
            } => {
                assert_eq!(stage, Stage::FetchStructure);
                assert_eq!(uid, 9);
                assert_eq!(messages, vec!["Mailbox is locked"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_failure_reports_failing_stage() {
        let cases = [
            (FetchKind::Overview, Stage::FetchHeaders),
            (FetchKind::HeaderBlock, Stage::FetchHeaders),
            (FetchKind::Structure, Stage::FetchStructure),
            (FetchKind::Body, Stage::FetchBodies),
        ];
        for (kind, expected) in cases {
            let mut store = store();
            store.fail_on(kind, ["Connection lost"]);
            let err = Normalizer::default()
                .normalize(&mut store, "INBOX", 9, false)
                .unwrap_err();
            match err {
                NormalizeError::Fetch { stage, .. } => assert_eq!(stage, expected, "{kind:?}"),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_benign_warning_does_not_fail() {
        let mut store = store();
        store.warn_on(
            FetchKind::Overview,
            ["Unexpected characters at end of address: foo"],
        );
        assert!(Normalizer::default()
            .normalize(&mut store, "INBOX", 9, false)
            .is_ok());
    }

    #[test]
    fn test_surviving_warning_fails_fetch() {
        let mut store = store();
        store.warn_on(FetchKind::Body, ["Bad section"]);
        let err = Normalizer::default()
            .normalize(&mut store, "INBOX", 9, false)
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::Fetch {
                stage: Stage::FetchBodies,
                ..
            }
        ));
        assert_eq!(err.messages(), ["Bad section"]);
    }

    #[test]
    fn test_custom_validator() {
        let mut store = store();
        let normalizer =
            Normalizer::default().with_validator(|addr: &str| addr.ends_with(".org"));
        let msg = normalizer.normalize(&mut store, "INBOX", 9, true).unwrap();
        assert_eq!(msg.to, vec!["ann@example.org"]);
    }

    #[test]
    fn test_spam_subject_flag() {
        let mut store = MemoryStore::new();
        let overview = HeaderOverview {
            subject: "[SPAM] cheap".into(),
            ..HeaderOverview::default()
        };
        store.insert(
            "INBOX",
            1,
            StoredMessage::new(overview, "", RawPart::from_codes(0, "plain", 0)),
        );
        let msg = Normalizer::default()
            .normalize(&mut store, "INBOX", 1, true)
            .unwrap();
        assert!(msg.flags.spam);
    }

    #[test]
    fn test_mailbox_name() {
        assert_eq!(mailbox_name("{imap.example.com:993/ssl}INBOX"), "inbox");
        assert_eq!(mailbox_name("  Sent Items "), "sent items");
        assert_eq!(mailbox_name("{broken"), "{broken");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::FetchBodies.to_string(), "FetchBodies");
    }
}
