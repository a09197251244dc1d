//! Attachment records as delivered by a source container.

/// How the container stored the attachment.
///
/// Only the distinction between ordinary file data and embedded objects
/// matters for conversion: embedded messages and OLE objects are never
/// treated as inline images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AttachMethod {
    /// Plain file data (`ATTACH_BY_VALUE` and anything unrecognized).
    #[default]
    ByValue,
    /// A complete message stored inside this one (`ATTACH_EMBEDDED_MSG`).
    EmbeddedMessage,
    /// An OLE object (`ATTACH_OLE`).
    Ole,
}

impl AttachMethod {
    /// Map a raw MAPI `PR_ATTACH_METHOD` value.
    pub fn from_raw(value: u32) -> Self {
        match value {
            5 => Self::EmbeddedMessage,
            6 => Self::Ole,
            _ => Self::ByValue,
        }
    }

    /// `true` for methods that wrap a whole object rather than file bytes.
    pub fn is_embedded(self) -> bool {
        matches!(self, Self::EmbeddedMessage | Self::Ole)
    }
}

/// One attachment of a [`SourceMessage`](super::message::SourceMessage).
///
/// The filename precedence (long name, then short 8.3 name) is resolved once
/// here instead of at every use site.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRecord {
    /// Long filename, preferred when present.
    pub long_filename: Option<String>,
    /// Short (8.3) filename.
    pub short_filename: Option<String>,
    /// Decoded payload. `None` means the container had no data for this record.
    pub data: Option<Vec<u8>>,
    /// Content-ID already assigned by the container, with or without `<>`.
    pub content_id: Option<String>,
    /// MIME type hint from the container, if any.
    pub mime_hint: Option<String>,
    pub method: AttachMethod,
}

impl AttachmentRecord {
    /// Convenience constructor for a by-value attachment with a long filename.
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            long_filename: Some(filename.into()),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Set the container-provided Content-ID.
    pub fn with_content_id(mut self, cid: impl Into<String>) -> Self {
        self.content_id = Some(cid.into());
        self
    }

    /// The effective filename: long name, else short name. Blank names count as absent.
    pub fn filename(&self) -> Option<&str> {
        [&self.long_filename, &self.short_filename]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    /// The container Content-ID without surrounding angle brackets.
    pub fn bare_content_id(&self) -> Option<&str> {
        self.content_id
            .as_deref()
            .map(|cid| cid.trim().trim_start_matches('<').trim_end_matches('>'))
            .filter(|cid| !cid.is_empty())
    }
}
