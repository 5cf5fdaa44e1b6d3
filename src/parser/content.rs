//! Body content decoding: transfer encodings and charset transcoding.
//!
//! Nothing here fails. Undecodable input comes back unchanged so that one bad
//! part never costs the rest of the message.

use std::borrow::Cow;

use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::{alphabet, Engine};
use tracing::warn;

use crate::model::part::{RawPart, TransferEncoding};

/// Base64 engine that tolerates missing padding and stray trailing bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode a fetched section: transfer decoding, then charset transcoding.
pub fn decode_part(part: &RawPart, raw: &[u8]) -> Vec<u8> {
    let decoded = decode_content(part.encoding, raw);
    match part.charset() {
        Some(charset) => transcode(decoded, charset),
        None => decoded,
    }
}

/// Undo the transfer encoding. Everything except base64 and
/// quoted-printable passes through byte for byte.
pub fn decode_content(encoding: TransferEncoding, raw: &[u8]) -> Vec<u8> {
    match encoding {
        TransferEncoding::Base64 => decode_base64(raw).unwrap_or_else(|| {
            warn!(len = raw.len(), "Undecodable base64 body, keeping raw bytes");
            raw.to_vec()
        }),
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(raw, quoted_printable::ParseMode::Robust).unwrap_or_else(
                |e| {
                    warn!(error = %e, "Undecodable quoted-printable body, keeping raw bytes");
                    raw.to_vec()
                },
            )
        }
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Other => raw.to_vec(),
    }
}

/// Lenient base64: ignores line breaks, padding and any non-alphabet byte.
pub(crate) fn decode_base64(raw: &[u8]) -> Option<Vec<u8>> {
    let mut cleaned: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();
    // A lone trailing sextet cannot form a byte
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    LENIENT_BASE64.decode(&cleaned).ok()
}

/// Convert `bytes` from `charset` to UTF-8.
///
/// UTF-8 input is returned as is. An unknown label or a malformed byte
/// sequence leaves the bytes untouched.
pub fn transcode(bytes: Vec<u8>, charset: &str) -> Vec<u8> {
    let Some(encoding) = encoding_rs::Encoding::for_label(charset.trim().as_bytes()) else {
        warn!(charset, "Unknown charset, keeping undecoded bytes");
        return bytes;
    };
    if encoding == encoding_rs::UTF_8 {
        return bytes;
    }
    match encoding.decode_without_bom_handling_and_without_replacement(&bytes) {
        Some(Cow::Borrowed(text)) => text.as_bytes().to_vec(),
        Some(Cow::Owned(text)) => text.into_bytes(),
        None => {
            warn!(charset, "Malformed input for charset, keeping undecoded bytes");
            bytes
        }
    }
}
