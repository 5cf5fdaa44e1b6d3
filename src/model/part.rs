//! Body-structure nodes as reported by the mail store.
//!
//! IMAP libraries report a part's major type and transfer encoding as small
//! integers (the c-client `TYPE*` / `ENC*` constants). They are mapped to
//! closed enums here and never travel further as raw integers.

use std::fmt;

/// MIME major type (c-client type codes 0–7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MajorType {
    Text,
    Multipart,
    Message,
    Application,
    Audio,
    Image,
    Video,
    Other,
    /// Code outside 0–7. Renders as an empty string.
    Unknown,
}

impl MajorType {
    const TABLE: [MajorType; 8] = [
        MajorType::Text,
        MajorType::Multipart,
        MajorType::Message,
        MajorType::Application,
        MajorType::Audio,
        MajorType::Image,
        MajorType::Video,
        MajorType::Other,
    ];

    /// Map a numeric type code. Out-of-range codes become [`MajorType::Unknown`].
    pub fn from_code(code: i32) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::TABLE.get(idx).copied())
            .unwrap_or(MajorType::Unknown)
    }

    /// Numeric code for this type, `None` for [`MajorType::Unknown`].
    pub fn code(self) -> Option<i32> {
        Self::TABLE
            .iter()
            .position(|t| *t == self)
            .map(|idx| idx as i32)
    }

    /// Map a textual major type (`"image"`, `"TEXT"`…). Unlisted names become `Other`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "text" => MajorType::Text,
            "multipart" => MajorType::Multipart,
            "message" => MajorType::Message,
            "application" => MajorType::Application,
            "audio" => MajorType::Audio,
            "image" => MajorType::Image,
            "video" => MajorType::Video,
            _ => MajorType::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MajorType::Text => "text",
            MajorType::Multipart => "multipart",
            MajorType::Message => "message",
            MajorType::Application => "application",
            MajorType::Audio => "audio",
            MajorType::Image => "image",
            MajorType::Video => "video",
            MajorType::Other => "other",
            MajorType::Unknown => "",
        }
    }

    /// `true` for types that only ever wrap other parts.
    pub fn is_container(self) -> bool {
        matches!(self, MajorType::Multipart | MajorType::Message)
    }
}

impl fmt::Display for MajorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-Transfer-Encoding (c-client encoding codes 0–5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    /// Any other code, including unknown ones. Bytes pass through unchanged.
    Other,
}

impl TransferEncoding {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => TransferEncoding::SevenBit,
            1 => TransferEncoding::EightBit,
            2 => TransferEncoding::Binary,
            3 => TransferEncoding::Base64,
            4 => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Other,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            TransferEncoding::SevenBit => 0,
            TransferEncoding::EightBit => 1,
            TransferEncoding::Binary => 2,
            TransferEncoding::Base64 => 3,
            TransferEncoding::QuotedPrintable => 4,
            TransferEncoding::Other => 5,
        }
    }

    /// Map a `Content-Transfer-Encoding` header value.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            "binary" => TransferEncoding::Binary,
            "base64" => TransferEncoding::Base64,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Binary => "binary",
            TransferEncoding::Base64 => "base64",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Other => "x-other",
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `attribute=value` parameter of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub attribute: String,
    pub value: String,
}

impl Param {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive attribute comparison.
    pub fn is(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// One node of a message's body structure.
///
/// Supplied by the mail store and treated as immutable input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    pub major: MajorType,
    pub subtype: String,
    pub encoding: TransferEncoding,
    /// Content-Type parameters, in header order.
    pub parameters: Vec<Param>,
    /// Content-Disposition parameters, in header order.
    pub disposition_parameters: Vec<Param>,
    pub parts: Vec<RawPart>,
}

impl RawPart {
    /// Build a leaf from numeric type and encoding codes.
    pub fn from_codes(type_code: i32, subtype: impl Into<String>, encoding_code: i32) -> Self {
        Self::new(
            MajorType::from_code(type_code),
            subtype,
            TransferEncoding::from_code(encoding_code),
        )
    }

    pub fn new(major: MajorType, subtype: impl Into<String>, encoding: TransferEncoding) -> Self {
        Self {
            major,
            subtype: subtype.into(),
            encoding,
            parameters: Vec::new(),
            disposition_parameters: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Add a Content-Type parameter.
    pub fn with_param(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push(Param::new(attribute, value));
        self
    }

    /// Add a Content-Disposition parameter.
    pub fn with_disposition_param(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.disposition_parameters
            .push(Param::new(attribute, value));
        self
    }

    pub fn with_parts(mut self, parts: Vec<RawPart>) -> Self {
        self.parts = parts;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Lower-cased `major/subtype`, e.g. `"image/png"`.
    ///
    /// An unknown major type degrades to an empty string (`"/png"`).
    pub fn canonical_type(&self) -> String {
        format!("{}/{}", self.major.as_str(), self.subtype).to_lowercase()
    }

    /// Value of the first `charset` parameter, if any.
    pub fn charset(&self) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.is("charset"))
            .map(|p| p.value.as_str())
    }
}
