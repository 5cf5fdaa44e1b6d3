//! `mailnorm` turns IMAP-style MIME messages into flat, application-level
//! records.
//!
//! A [`normalize::Normalizer`] drives a [`store::MailStore`] through one
//! message: header fields are decoded, the body structure is flattened into
//! IMAP section addresses, leaves are fetched and decoded in section order,
//! and each leaf becomes either the inline body text or an attachment.

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod store;
