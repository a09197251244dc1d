//! Core data model: source messages, recipients, and attachment records.

pub mod address;
pub mod attachment;
pub mod message;
