//! Split attachments into inline images and regular attachments.

use std::sync::LazyLock;

use regex::Regex;

use crate::mime::content_type;
use crate::model::attachment::AttachmentRecord;

/// Names Outlook generates for pasted images (`image001.png` and friends).
static GENERATED_IMAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^image\d+\.(png|jpg|jpeg|gif|bmp|webp)$").expect("valid image name regex")
});

/// Attachments partitioned by role, each side keeping source order.
#[derive(Debug, Default)]
pub struct Classified<'a> {
    pub inline: Vec<&'a AttachmentRecord>,
    pub regular: Vec<&'a AttachmentRecord>,
}

impl Classified<'_> {
    pub fn len(&self) -> usize {
        self.inline.len() + self.regular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `true` if the attachment should be embedded in the HTML body.
///
/// Requires an image extension and either a container Content-ID or a
/// generated `imageNNN.ext` name. Embedded objects never qualify.
pub fn is_inline(attachment: &AttachmentRecord) -> bool {
    if attachment.method.is_embedded() {
        return false;
    }
    let filename = attachment.filename().unwrap_or("");
    if !content_type::has_image_extension(filename) {
        return false;
    }
    attachment.bare_content_id().is_some() || GENERATED_IMAGE_NAME.is_match(filename)
}

/// Partition every attachment into exactly one of inline or regular.
pub fn classify(attachments: &[AttachmentRecord]) -> Classified<'_> {
    let mut out = Classified::default();
    for attachment in attachments {
        if is_inline(attachment) {
            out.inline.push(attachment);
        } else {
            out.regular.push(attachment);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::AttachMethod;

    #[test]
    fn test_content_id_image_is_inline() {
        let att = AttachmentRecord::new("logo.png", vec![1]).with_content_id("<logo@x>");
        assert!(is_inline(&att));
    }

    #[test]
    fn test_generated_name_is_inline() {
        assert!(is_inline(&AttachmentRecord::new("IMAGE001.JPG", vec![1])));
        assert!(!is_inline(&AttachmentRecord::new("photo.jpg", vec![1])));
    }

    #[test]
    fn test_non_image_with_cid_is_regular() {
        let att = AttachmentRecord::new("report.pdf", vec![1]).with_content_id("r1");
        assert!(!is_inline(&att));
    }

    #[test]
    fn test_embedded_message_never_inline() {
        let mut att = AttachmentRecord::new("image001.png", vec![1]).with_content_id("c");
        att.method = AttachMethod::EmbeddedMessage;
        assert!(!is_inline(&att));
    }

    #[test]
    fn test_short_filename_used() {
        let att = AttachmentRecord {
            short_filename: Some("image7.gif".into()),
            data: Some(vec![1]),
            ..Default::default()
        };
        assert!(is_inline(&att));
    }

    #[test]
    fn test_partition_preserves_count_and_order() {
        let atts = vec![
            AttachmentRecord::new("a.pdf", vec![1]),
            AttachmentRecord::new("image001.png", vec![1]),
            AttachmentRecord::default(),
            AttachmentRecord::new("b.png", vec![1]).with_content_id("b"),
        ];
        let classified = classify(&atts);
        assert_eq!(classified.len(), atts.len());
        assert_eq!(classified.inline.len(), 2);
        assert_eq!(classified.inline[0].filename(), Some("image001.png"));
        assert_eq!(classified.inline[1].filename(), Some("b.png"));
        assert_eq!(classified.regular.len(), 2);
    }
}
