//! Output side: single-message conversion, archive splitting and batches.

pub mod batch;
pub mod eml;
pub mod mbox;

pub use batch::{CancelToken, ConversionReport, Converter, InputKind, Outcome, Progress};
