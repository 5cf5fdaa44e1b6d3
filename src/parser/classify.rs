//! Part classification: picks the inline body text and collects attachments.

use tracing::{debug, warn};

use crate::config::LimitsConfig;
use crate::model::message::DecodedAttachment;
use crate::model::part::RawPart;
use crate::parser::header::decode_header;

/// Parameters that may carry a filename, in either parameter list.
const NAME_PARAMS: [&str; 4] = ["name", "name*", "filename", "filename*"];

/// Running result of classifying a message's leaves in section order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Body text, once a part has been promoted.
    pub body: Option<String>,
    pub attachments: Vec<DecodedAttachment>,
}

impl Classification {
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Whether a flattened entry takes part in classification at all.
///
/// Containers and `multipart/*` / `message/*` leaves (the synthesized entry
/// of a childless embedded message) are skipped. Leaves with an unknown type
/// code are kept and end up as attachments typed `/subtype`.
pub fn is_classifiable(part: &RawPart) -> bool {
    !part.has_children() && !part.major.is_container()
}

/// Decoded filename of a part, if any.
///
/// Content-Type parameters are read first, then Content-Disposition ones;
/// the last match wins.
pub fn part_filename(part: &RawPart) -> Option<String> {
    part.parameters
        .iter()
        .chain(part.disposition_parameters.iter())
        .filter(|p| NAME_PARAMS.iter().any(|name| p.is(name)))
        .last()
        .map(|p| decode_header(&p.value))
        .filter(|name| !name.is_empty())
}

/// Fold one decoded leaf into the running classification.
///
/// - `text/plain` becomes the body if none is chosen yet and it fits
///   `limits.text_body_max_bytes`.
/// - `text/html` becomes the body (tags stripped) under the same condition
///   with `limits.html_body_max_bytes`; otherwise it is kept only when named.
/// - everything else is an attachment.
pub fn classify_part(
    mut acc: Classification,
    part: &RawPart,
    content: Vec<u8>,
    limits: &LimitsConfig,
) -> Classification {
    let content_type = part.canonical_type();
    let name = part_filename(part);

    match content_type.as_str() {
        "text/plain" if !acc.has_body() && content.len() <= limits.text_body_max_bytes => {
            debug!(len = content.len(), "Promoting text/plain part to body");
            acc.body = Some(String::from_utf8_lossy(&content).into_owned());
            return acc;
        }
        "text/html" => {
            if !acc.has_body() && content.len() <= limits.html_body_max_bytes {
                debug!(len = content.len(), "Promoting text/html part to body");
                acc.body = Some(strip_tags(&String::from_utf8_lossy(&content)));
                return acc;
            }
            if name.is_none() {
                warn!(
                    len = content.len(),
                    has_body = acc.has_body(),
                    "Dropping unnamed text/html part"
                );
                return acc;
            }
        }
        _ => {}
    }

    acc.attachments.push(DecodedAttachment {
        name,
        content,
        content_type,
    });
    acc
}

/// Remove markup tags and comments, keeping the text between them verbatim.
///
/// A `<` followed by whitespace (or at the end) is text, not a tag. Quoted
/// attribute values may contain `>`.
pub fn strip_tags(html: &str) -> String {
    enum State {
        Text,
        Tag,
        Quoted(char),
        Comment,
    }

    let mut result = String::with_capacity(html.len());
    let mut state = State::Text;
    let mut rest = html;

    while let Some(ch) = rest.chars().next() {
        let mut step = ch.len_utf8();
        state = match state {
            State::Text if ch == '<' => {
                let next = rest[1..].chars().next();
                if rest.starts_with("<!--") {
                    step = 4;
                    State::Comment
                } else if next.map_or(true, char::is_whitespace) {
                    result.push('<');
                    State::Text
                } else {
                    State::Tag
                }
            }
            State::Text => {
                result.push(ch);
                State::Text
            }
            State::Tag => match ch {
                '>' => State::Text,
                '"' | '\'' => State::Quoted(ch),
                _ => State::Tag,
            },
            State::Quoted(quote) if ch == quote => State::Tag,
            State::Quoted(quote) => State::Quoted(quote),
            State::Comment if rest.starts_with("-->") => {
                step = 3;
                State::Text
            }
            State::Comment => State::Comment,
        };
        rest = &rest[step..];
    }

    result
}
