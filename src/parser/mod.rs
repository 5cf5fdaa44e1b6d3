//! Message parsing: header decoding, addresses, subjects, MIME flattening,
//! content decoding and part classification.

pub mod address;
pub mod classify;
pub mod content;
pub mod header;
pub mod mime;
pub mod subject;
