//! The source message handed over by a container reader.

use chrono::NaiveDateTime;

use super::address::Recipient;
use super::attachment::AttachmentRecord;

/// Body or header text whose encoding is not yet known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawText {
    /// Already decoded text.
    Text(String),
    /// Undecoded bytes in an unknown single-byte or UTF-8 encoding.
    Bytes(Vec<u8>),
}

impl From<&str> for RawText {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawText {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for RawText {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// The date shapes a container may produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DateValue {
    /// No date stored.
    #[default]
    Absent,
    /// A header-style date string, possibly RFC 2047 encoded and with comments.
    Text(String),
    /// Seconds since the Unix epoch.
    Epoch(i64),
    /// A calendar timestamp in local time. Years before 1970 are placeholders.
    Structured(NaiveDateTime),
}

impl DateValue {
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One logical message read from a binary container.
///
/// Every field may be empty or malformed; conversion never rejects a message
/// because of missing content.
#[derive(Debug, Clone, Default)]
pub struct SourceMessage {
    /// Sender as stored by the container (address or display name).
    pub sender: String,
    /// Recipients in container order.
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub plain_body: Option<RawText>,
    pub html_body: Option<RawText>,
    /// The message date proper.
    pub date: DateValue,
    /// Creation, last-modification and delivery times, in that order.
    /// Consulted only when [`date`](Self::date) is absent.
    pub fallback_dates: Vec<DateValue>,
    pub attachments: Vec<AttachmentRecord>,
}

impl SourceMessage {
    /// The date to resolve: the primary date, else the first present fallback.
    pub fn effective_date(&self) -> &DateValue {
        if !self.date.is_absent() {
            return &self.date;
        }
        self.fallback_dates
            .iter()
            .find(|d| !d.is_absent())
            .unwrap_or(&self.date)
    }
}
