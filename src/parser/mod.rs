//! Input side: text and date normalization, MBOX reading, `.msg` container reading.

pub mod date;
pub mod mbox;
pub mod msg;
pub mod text;
