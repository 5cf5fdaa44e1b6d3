//! Mail store backed by RFC 5322 message files.
//!
//! Structure and section bytes come from `mail-parser`'s part graph, numbered
//! the IMAP way: children of a multipart are `N.1..N.k`, and the body of an
//! encapsulated message takes the message's own number as its prefix.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{NormalizeError, Result, StoreError};
use crate::model::part::{MajorType, Param, RawPart, TransferEncoding};
use crate::parser::header::{get_header, unfold_headers};
use crate::parser::mime::SectionPath;
use crate::store::{HeaderOverview, MailStore};

/// Nesting deeper than this is cut off when building the structure tree.
const MAX_NESTING: usize = 64;

/// Messages held as raw bytes, grouped by mailbox and ordered by UID.
#[derive(Debug, Default)]
pub struct EmlStore {
    mailboxes: HashMap<String, BTreeMap<u32, Vec<u8>>>,
}

impl EmlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a single file loaded as `uid` 1 of `mailbox`.
    pub fn open(mailbox: &str, path: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::new();
        store.load(mailbox, 1, path)?;
        Ok(store)
    }

    /// Read a message file into `mailbox` under `uid`.
    ///
    /// A leading mbox `From ` line is skipped.
    pub fn load(&mut self, mailbox: &str, uid: u32, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| NormalizeError::io(path, e))?;
        debug!(path = %path.display(), uid, bytes = data.len(), "Loaded message file");
        self.insert(mailbox, uid, data)
    }

    /// Add raw message bytes to `mailbox` under `uid`.
    pub fn insert(&mut self, mailbox: &str, uid: u32, raw: impl Into<Vec<u8>>) -> Result<()> {
        let raw = raw.into();
        let raw = skip_from_line(&raw).to_vec();
        if MessageParser::default().parse(raw.as_slice()).is_none() {
            return Err(NormalizeError::Parse(format!("uid {uid} is not an RFC 5322 message")));
        }
        self.mailboxes
            .entry(mailbox.to_string())
            .or_default()
            .insert(uid, raw);
        Ok(())
    }

    fn raw(&self, mailbox: &str, uid: u32) -> std::result::Result<(u32, &[u8]), StoreError> {
        let messages = self
            .mailboxes
            .get(mailbox)
            .ok_or_else(|| StoreError::new(format!("Mailbox '{mailbox}' does not exist")))?;
        messages
            .iter()
            .zip(1u32..)
            .find(|((id, _), _)| **id == uid)
            .map(|((_, raw), msgno)| (msgno, raw.as_slice()))
            .ok_or_else(|| StoreError::new(format!("No message with UID {uid} in '{mailbox}'")))
    }

    fn parsed(&self, mailbox: &str, uid: u32) -> std::result::Result<Message<'_>, StoreError> {
        let (_, raw) = self.raw(mailbox, uid)?;
        MessageParser::default()
            .parse(raw)
            .ok_or_else(|| StoreError::new(format!("Cannot parse message UID {uid}")))
    }
}

impl MailStore for EmlStore {
    fn fetch_header_overview(
        &mut self,
        mailbox: &str,
        uid: u32,
    ) -> std::result::Result<HeaderOverview, StoreError> {
        let (msgno, raw) = self.raw(mailbox, uid)?;
        let headers = unfold_headers(&header_block(raw));
        let field = |name: &str| get_header(&headers, name).unwrap_or_default();

        let status = field("Status");
        let x_status = field("X-Status");
        Ok(HeaderOverview {
            msgno,
            date: field("Date"),
            message_id: field("Message-ID"),
            subject: field("Subject"),
            from: field("From"),
            to: field("To"),
            cc: get_header(&headers, "Cc"),
            flagged: x_status.contains('F'),
            answered: x_status.contains('A'),
            seen: status.contains('R'),
            draft: x_status.contains('T'),
            deleted: x_status.contains('D'),
            recent: !status.contains('O'),
        })
    }

    fn fetch_raw_header_block(
        &mut self,
        mailbox: &str,
        uid: u32,
    ) -> std::result::Result<String, StoreError> {
        let (_, raw) = self.raw(mailbox, uid)?;
        Ok(header_block(raw))
    }

    fn fetch_structure(
        &mut self,
        mailbox: &str,
        uid: u32,
    ) -> std::result::Result<RawPart, StoreError> {
        let message = self.parsed(mailbox, uid)?;
        if message.parts.is_empty() {
            return Err(StoreError::new(format!("Message UID {uid} has no parts")));
        }
        Ok(convert_part(&message, 0, 0))
    }

    fn fetch_body(
        &mut self,
        mailbox: &str,
        uid: u32,
        section: &SectionPath,
    ) -> std::result::Result<Vec<u8>, StoreError> {
        let message = self.parsed(mailbox, uid)?;
        let (owner, part_id) = resolve_section(&message, section)
            .ok_or_else(|| StoreError::new(format!("No section {section} in UID {uid}")))?;
        let part = &owner.parts[part_id];
        owner
            .raw_message
            .get(part.offset_body..part.offset_end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                StoreError::new(format!("Section {section} of UID {uid} is out of range"))
            })
    }
}

/// Build the structure node for `parts[part_id]` of `message`.
fn convert_part(message: &Message<'_>, part_id: usize, depth: usize) -> RawPart {
    let part = &message.parts[part_id];

    let (default_major, default_subtype) = match &part.body {
        PartType::Text(_) => (MajorType::Text, "plain"),
        PartType::Html(_) => (MajorType::Text, "html"),
        PartType::Message(_) => (MajorType::Message, "rfc822"),
        PartType::Multipart(_) => (MajorType::Multipart, "mixed"),
        PartType::Binary(_) | PartType::InlineBinary(_) => (MajorType::Application, "octet-stream"),
    };

    let (major, subtype, parameters) = match part.content_type() {
        Some(ct) => (
            MajorType::from_name(ct.ctype()),
            ct.subtype().unwrap_or(default_subtype).to_string(),
            params(ct.attributes.as_deref()),
        ),
        None => (default_major, default_subtype.to_string(), Vec::new()),
    };
    let encoding = part
        .content_transfer_encoding()
        .map_or(TransferEncoding::SevenBit, TransferEncoding::from_name);

    let mut node = RawPart::new(major, subtype, encoding);
    node.parameters = parameters;
    node.disposition_parameters = part
        .content_disposition()
        .map(|cd| params(cd.attributes.as_deref()))
        .unwrap_or_default();

    if depth >= MAX_NESTING {
        warn!(depth, "MIME nesting too deep, dropping children");
        return node;
    }

    node.parts = match &part.body {
        PartType::Multipart(children) => children
            .iter()
            .map(|&child| convert_part(message, child, depth + 1))
            .collect(),
        PartType::Message(nested) if !nested.parts.is_empty() => {
            vec![convert_part(nested, 0, depth + 1)]
        }
        _ => Vec::new(),
    };
    node
}

fn params(attributes: Option<&[(Cow<'_, str>, Cow<'_, str>)]>) -> Vec<Param> {
    attributes
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| Param::new(name.as_ref(), value.as_ref()))
                .collect()
        })
        .unwrap_or_default()
}

/// Locate the part an IMAP section address names.
///
/// Returns the message that owns the part (an encapsulated one for addresses
/// below a `message/*` part) and the part's index in it.
fn resolve_section<'a, 'x>(
    message: &'a Message<'x>,
    section: &SectionPath,
) -> Option<(&'a Message<'x>, usize)> {
    let mut owner = message;
    let mut part_id = 0usize;

    for (depth, &index) in section.components().iter().enumerate() {
        if depth > 0 {
            if let PartType::Message(nested) = &owner.parts.get(part_id)?.body {
                owner = nested;
                part_id = 0;
            }
        }
        match &owner.parts.get(part_id)?.body {
            PartType::Multipart(children) => {
                part_id = *children.get(usize::try_from(index).ok()?.checked_sub(1)?)?;
            }
            // A single-part body is its own section 1.
            _ if index == 1 => {}
            _ => return None,
        }
    }
    Some((owner, part_id))
}

/// Header block of a raw message, up to and excluding the blank line.
fn header_block(raw: &[u8]) -> String {
    let end = find_header_end(raw).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Byte offset of the blank line that ends the headers.
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(2)
        .position(|w| w == b"\n\n")
        .into_iter()
        .chain(data.windows(4).position(|w| w == b"\r\n\r\n"))
        .min()
}

/// Skip a leading BOM and mbox `From ` separator line.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        match data.iter().position(|&b| b == b'\n') {
            Some(pos) => &data[pos + 1..],
            None => data,
        }
    } else {
        data
    }
}
