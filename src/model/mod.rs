//! Core data model: body-structure input and the normalized output record.

pub mod message;
pub mod part;
