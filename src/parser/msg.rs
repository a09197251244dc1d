//! Outlook `.msg` container reading.
//!
//! `.msg` files are OLE/CFB compound documents holding MAPI properties.
//! Parsing the container itself is delegated to the `msg_parser` crate; this
//! module maps its output onto [`SourceMessage`].

use std::path::Path;

use base64::Engine;
use msg_parser::Outlook;

use crate::error::{ConvertError, Result};
use crate::model::address::Recipient;
use crate::model::attachment::AttachmentRecord;
use crate::model::message::{DateValue, RawText, SourceMessage};
use crate::parser::text::hex_pair;

/// Anything that can turn a container file into a [`SourceMessage`].
pub trait ContainerReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<SourceMessage>;
}

/// Reads Outlook `.msg` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlookReader;

impl ContainerReader for OutlookReader {
    fn read(&self, path: &Path) -> Result<SourceMessage> {
        if !path.exists() {
            return Err(ConvertError::FileNotFound(path.to_path_buf()));
        }
        let outlook = Outlook::from_path(path).map_err(|e| ConvertError::Container {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(outlook_to_source(outlook))
    }
}

fn outlook_to_source(outlook: Outlook) -> SourceMessage {
    let sender = if outlook.sender.email.trim().is_empty() {
        outlook.sender.name.trim().to_string()
    } else {
        outlook.sender.email.trim().to_string()
    };

    let mut recipients: Vec<Recipient> = outlook
        .to
        .iter()
        .chain(outlook.cc.iter())
        .map(|person| Recipient::new(person.email.as_str(), person.name.as_str()))
        .collect();
    recipients.extend(Recipient::parse_list(&outlook.bcc));

    let plain_body = Some(outlook.body)
        .filter(|b| !b.is_empty())
        .map(RawText::Text);

    let date = if outlook.headers.date.trim().is_empty() {
        DateValue::Absent
    } else {
        DateValue::Text(outlook.headers.date)
    };

    let attachments = outlook
        .attachments
        .iter()
        .map(|att| AttachmentRecord {
            long_filename: Some(att.file_name.clone()).filter(|n| !n.trim().is_empty()),
            short_filename: Some(att.display_name.clone()).filter(|n| !n.trim().is_empty()),
            data: Some(decode_payload(&att.payload)).filter(|d| !d.is_empty()),
            content_id: None,
            mime_hint: Some(att.mime_tag.clone()).filter(|m| !m.trim().is_empty()),
            method: Default::default(),
        })
        .collect();

    SourceMessage {
        sender,
        recipients,
        subject: outlook.subject,
        plain_body,
        html_body: None,
        date,
        fallback_dates: Vec::new(),
        attachments,
    }
}

/// Decode an attachment payload as exposed by `msg_parser`.
///
/// Binary properties arrive as text: hex digits, or base64 in some builds.
/// Anything else is taken verbatim.
pub fn decode_payload(payload: &str) -> Vec<u8> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() % 2 == 0 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return trimmed
            .as_bytes()
            .chunks(2)
            .filter_map(hex_pair)
            .collect();
    }
    base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .unwrap_or_else(|_| payload.as_bytes().to_vec())
}
