//! # msg2eml
//!
//! Converts Outlook `.msg` containers and MBOX archives into RFC 5322
//! `.eml` files.
//!
//! Single messages are rebuilt into a proper MIME tree: plain and HTML
//! bodies become `multipart/alternative`, images referenced from the HTML
//! are embedded through `cid:` links in `multipart/related`, and everything
//! else is attached in `multipart/mixed`. Archives are split into one file
//! per entry, with missing mandatory headers filled in.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod mime;
pub mod model;
pub mod parser;
