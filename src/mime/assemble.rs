//! Build the MIME tree for one [`SourceMessage`] and serialize it.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, WithSource};
use crate::mime::classify::classify;
use crate::mime::content_type;
use crate::mime::html::{self, ContentIdMap};
use crate::mime::node::{filename_param, Headers, MimeNode, MultipartKind};
use crate::model::address::Recipient;
use crate::model::attachment::AttachmentRecord;
use crate::model::message::SourceMessage;
use crate::parser::date::{self, Clock};
use crate::parser::text;

/// Join recipients for a `To:` header: address, else display name, else
/// `"Unknown Recipient"`, separated by `", "`.
pub fn render_recipients(recipients: &[Recipient]) -> String {
    recipients
        .iter()
        .map(Recipient::rendered)
        .collect::<Vec<_>>()
        .join(", ")
}

/// First 32 hex digits of the SHA-256 of `seed`.
pub fn message_hash(seed: &[u8]) -> String {
    let digest = Sha256::digest(seed);
    let mut hex = String::with_capacity(32);
    for byte in &digest[..16] {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// `<hash@converted.local>`
pub fn message_id(hash: &str) -> String {
    format!("<{hash}@converted.local>")
}

/// A container Content-ID can be written as `<cid>` only when it is a short
/// run of printable ASCII without angle brackets.
fn is_usable_content_id(cid: &str) -> bool {
    cid.len() <= 250 && cid.bytes().all(|b| b.is_ascii_graphic() && b != b'<' && b != b'>')
}

/// Builds RFC 5322 messages from container data.
///
/// Structure depends only on which bodies are present and whether inline
/// images and regular attachments survive classification:
///
/// | plain | html | inline | root                                  |
/// |-------|------|--------|---------------------------------------|
/// | no    | no   | -      | empty `text/plain`                    |
/// | no    | yes  | no     | `text/html`                           |
/// | no    | yes  | yes    | `related[html, images...]`            |
/// | yes   | no   | -      | `text/plain`                          |
/// | yes   | yes  | no     | `alternative[plain, html]`            |
/// | yes   | yes  | yes    | `alternative[plain, related[...]]`    |
///
/// Regular attachments wrap the result in `mixed`. Without an HTML body
/// there is nothing to reference inline images, so they are attached as
/// regular attachments and an `InlineImageAttached` diagnostic is reported.
pub struct MimeAssembler<'a> {
    clock: &'a dyn Clock,
    diagnostics: &'a dyn Diagnostics,
    source: Option<&'a Path>,
}

impl<'a> MimeAssembler<'a> {
    pub fn new(clock: &'a dyn Clock, diagnostics: &'a dyn Diagnostics) -> Self {
        Self {
            clock,
            diagnostics,
            source: None,
        }
    }

    /// Attach the source path to every diagnostic.
    pub fn with_source(mut self, path: &'a Path) -> Self {
        self.source = Some(path);
        self
    }

    /// Assemble and serialize `message`. `seed` identifies the source (its
    /// path for containers) and determines Message-ID and boundaries.
    pub fn assemble(&self, message: &SourceMessage, seed: &[u8]) -> String {
        let hash = message_hash(seed);
        let tree = self.build(message, &hash);
        tree.render(&hash[..16])
    }

    /// Build the finished tree, mandatory headers included.
    pub fn build(&self, message: &SourceMessage, hash: &str) -> MimeNode {
        let plain = message
            .plain_body
            .as_ref()
            .map(text::normalize)
            .filter(|body| !body.is_empty());
        let html_source = message
            .html_body
            .as_ref()
            .map(text::normalize)
            .filter(|body| !body.is_empty());

        let classified = classify(&message.attachments);
        let (inline, regular) = if html_source.is_some() {
            (classified.inline, classified.regular)
        } else {
            for att in &classified.inline {
                self.report(
                    DiagnosticKind::InlineImageAttached,
                    format!(
                        "inline image '{}' has no HTML body, attached instead",
                        att.filename().unwrap_or("<unnamed>")
                    ),
                );
            }
            (Vec::new(), message.attachments.iter().collect())
        };

        let (html, cid_map) = match html_source {
            Some(source) => {
                let (rewritten, map) = html::rewrite(&source, &inline);
                (Some(rewritten), map)
            }
            None => (None, ContentIdMap::new()),
        };

        let inline_leaves: Vec<MimeNode> = inline
            .iter()
            .filter_map(|att| self.inline_leaf(att, &cid_map))
            .collect();
        let attachment_leaves: Vec<MimeNode> = regular
            .iter()
            .filter_map(|att| self.attachment_leaf(att))
            .collect();

        debug!(
            plain = plain.is_some(),
            html = html.is_some(),
            inline = inline_leaves.len(),
            attachments = attachment_leaves.len(),
            "assembling message"
        );

        let body = body_structure(plain.as_deref(), html.as_deref(), inline_leaves);
        let root = if attachment_leaves.is_empty() {
            body
        } else {
            wrap_mixed(body, attachment_leaves)
        };
        self.finalize(root, message, hash)
    }

    fn inline_leaf(&self, att: &AttachmentRecord, cid_map: &ContentIdMap) -> Option<MimeNode> {
        let (filename, data) = self.usable(att, "inline image")?;
        let cid = cid_map
            .get(filename)
            .map(str::to_string)
            .or_else(|| {
                att.bare_content_id()
                    .filter(|cid| is_usable_content_id(cid))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| html::generated_cid(filename));

        let mime = content_type::inline_image_type(filename, att.mime_hint.as_deref());
        let mut leaf = MimeNode::binary(&format!("{mime}; {}", filename_param("name", filename)), data);
        let headers = leaf.headers_mut();
        headers.set("Content-ID", format!("<{cid}>"));
        headers.set(
            "Content-Disposition",
            format!("inline; {}", filename_param("filename", filename)),
        );
        Some(leaf)
    }

    fn attachment_leaf(&self, att: &AttachmentRecord) -> Option<MimeNode> {
        let (filename, data) = self.usable(att, "attachment")?;
        let mime = content_type::attachment_type(filename, att.mime_hint.as_deref());
        let mut leaf = MimeNode::binary(&format!("{mime}; {}", filename_param("name", filename)), data);
        leaf.headers_mut().set(
            "Content-Disposition",
            format!("attachment; {}", filename_param("filename", filename)),
        );
        Some(leaf)
    }

    /// Filename and payload, or `None` (reported) when either is missing.
    fn usable<'r>(&self, att: &'r AttachmentRecord, role: &str) -> Option<(&'r str, &'r [u8])> {
        match (att.filename(), att.data.as_deref()) {
            (Some(name), Some(data)) => Some((name, data)),
            (name, _) => {
                let missing = if name.is_none() { "filename" } else { "payload" };
                self.report(
                    DiagnosticKind::AttachmentSkipped,
                    format!("{role} '{}' has no {missing}, skipped", name.unwrap_or("<unnamed>")),
                );
                None
            }
        }
    }

    fn finalize(&self, mut root: MimeNode, message: &SourceMessage, hash: &str) -> MimeNode {
        let stamped = WithSource::new(self.diagnostics, self.source);
        let diagnostics: &dyn Diagnostics = &stamped;
        let resolved = date::resolve(message.effective_date(), self.clock, diagnostics);
        let recipients = render_recipients(&message.recipients);

        let mut leading = Headers::new();
        leading.set_text("Subject", &text::decode_header(&message.subject, diagnostics));
        leading.set_addresses("From", &text::decode_header(&message.sender, diagnostics));
        leading.set_addresses("To", &text::decode_header(&recipients, diagnostics));
        leading.set("Date", date::format_date(&resolved, self.clock));
        leading.set("Message-ID", message_id(hash));
        leading.set("MIME-Version", "1.0");

        let existing = std::mem::take(root.headers_mut());
        *root.headers_mut() = existing.with_leading(leading);
        root
    }

    fn report(&self, kind: DiagnosticKind, message: String) {
        WithSource::new(self.diagnostics, self.source).report(Diagnostic::new(kind, message));
    }
}

fn body_structure(plain: Option<&str>, html: Option<&str>, inline: Vec<MimeNode>) -> MimeNode {
    match (plain, html) {
        (None, None) => MimeNode::text("plain", ""),
        (None, Some(html)) if inline.is_empty() => MimeNode::text("html", html),
        (None, Some(html)) => related(html, inline),
        (Some(plain), None) => MimeNode::text("plain", plain),
        (Some(plain), Some(html)) => {
            let html_part = if inline.is_empty() {
                MimeNode::text("html", html)
            } else {
                related(html, inline)
            };
            MimeNode::multipart(
                MultipartKind::Alternative,
                vec![MimeNode::text("plain", plain), html_part],
            )
        }
    }
}

fn related(html: &str, inline: Vec<MimeNode>) -> MimeNode {
    let mut children = Vec::with_capacity(inline.len() + 1);
    children.push(MimeNode::text("html", html));
    children.extend(inline);
    MimeNode::multipart(MultipartKind::Related, children)
}

/// Nest `inner` as the first child of a `mixed` root. Message-level headers
/// already on `inner` move to the new root.
fn wrap_mixed(mut inner: MimeNode, attachments: Vec<MimeNode>) -> MimeNode {
    let moved = inner.headers_mut().take_message_fields();
    let mut children = Vec::with_capacity(attachments.len() + 1);
    children.push(inner);
    children.extend(attachments);
    let mut mixed = MimeNode::multipart(MultipartKind::Mixed, children);
    *mixed.headers_mut() = moved;
    mixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::model::address::UNKNOWN_RECIPIENT;
    use crate::model::message::{DateValue, RawText};
    use crate::parser::date::FixedClock;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn build(message: &SourceMessage) -> (MimeNode, CollectingDiagnostics) {
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let node = MimeAssembler::new(&clock, &sink).build(message, "0123456789abcdef0123456789abcdef");
        (node, sink)
    }

    fn child_types(node: &MimeNode) -> Vec<String> {
        match node {
            MimeNode::Multipart(multi) => multi.children.iter().map(MimeNode::mime_type).collect(),
            MimeNode::Leaf(_) => Vec::new(),
        }
    }

    fn message(plain: Option<&str>, html: Option<&str>) -> SourceMessage {
        SourceMessage {
            sender: "a@x.com".into(),
            subject: "Hi".into(),
            plain_body: plain.map(RawText::from),
            html_body: html.map(RawText::from),
            date: DateValue::Text("Thu, 04 Jan 2024 10:00:00 +0000".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_recipients() {
        let list = vec![
            Recipient::new("a@x.com", "Alice"),
            Recipient::new("", "Bob"),
            Recipient::new("", ""),
        ];
        assert_eq!(render_recipients(&list), format!("a@x.com, Bob, {UNKNOWN_RECIPIENT}"));
        assert_eq!(render_recipients(&[]), "");
    }

    #[test]
    fn test_message_hash_is_stable_and_short() {
        let hash = message_hash(b"/tmp/mail.msg");
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, message_hash(b"/tmp/mail.msg"));
        assert_ne!(hash, message_hash(b"/tmp/other.msg"));
    }

    #[test]
    fn test_case_empty() {
        let (node, _) = build(&message(None, None));
        assert_eq!(node.mime_type(), "text/plain");
    }

    #[test]
    fn test_case_html_only() {
        let (node, _) = build(&message(None, Some("<p>x</p>")));
        assert_eq!(node.mime_type(), "text/html");
    }

    #[test]
    fn test_case_html_with_inline() {
        let mut msg = message(None, Some(r#"<img src="image001.png">"#));
        msg.attachments.push(AttachmentRecord::new("image001.png", PNG));
        let (node, _) = build(&msg);
        assert_eq!(node.mime_type(), "multipart/related");
        assert_eq!(child_types(&node), ["text/html", "image/png"]);
    }

    #[test]
    fn test_case_plain_only() {
        let (node, _) = build(&message(Some("hello"), None));
        assert_eq!(node.mime_type(), "text/plain");
    }

    #[test]
    fn test_case_both_plain_first() {
        let (node, _) = build(&message(Some("hello"), Some("<p>hello</p>")));
        assert_eq!(node.mime_type(), "multipart/alternative");
        assert_eq!(child_types(&node), ["text/plain", "text/html"]);
    }

    #[test]
    fn test_case_both_with_inline() {
        let mut msg = message(Some("hello"), Some(r#"<img src="pic.png">"#));
        msg.attachments
            .push(AttachmentRecord::new("pic.png", PNG).with_content_id("<orig@cid>"));
        let (node, _) = build(&msg);
        assert_eq!(child_types(&node), ["text/plain", "multipart/related"]);
    }

    #[test]
    fn test_regular_attachments_wrap_in_mixed() {
        let mut msg = message(Some("hello"), Some("<p>hello</p>"));
        msg.attachments.push(AttachmentRecord::new("report.pdf", b"%PDF".to_vec()));
        let (node, _) = build(&msg);
        assert_eq!(node.mime_type(), "multipart/mixed");
        assert_eq!(child_types(&node), ["multipart/alternative", "application/pdf"]);
        assert_eq!(node.headers().get("Subject"), Some("Hi"));
        let MimeNode::Multipart(mixed) = &node else { panic!("multipart") };
        assert!(mixed.children[0].headers().get("Subject").is_none());
    }

    #[test]
    fn test_inline_without_html_becomes_attachment() {
        let mut msg = message(Some("hello"), None);
        msg.attachments.push(AttachmentRecord::new("image001.png", PNG));
        msg.attachments.push(AttachmentRecord::new("notes.txt", b"n".to_vec()));
        let (node, sink) = build(&msg);
        assert_eq!(child_types(&node), ["text/plain", "image/png", "text/plain"]);
        let MimeNode::Multipart(mixed) = &node else { panic!("multipart") };
        let disposition = mixed.children[1].headers().get("Content-Disposition");
        assert!(disposition.is_some_and(|d| d.starts_with("attachment;")));
        assert_eq!(sink.count(DiagnosticKind::InlineImageAttached), 1);
    }

    #[test]
    fn test_missing_payload_skipped_with_warning() {
        let mut msg = message(Some("hello"), None);
        msg.attachments.push(AttachmentRecord {
            long_filename: Some("empty.bin".into()),
            ..Default::default()
        });
        msg.attachments.push(AttachmentRecord {
            data: Some(vec![1, 2, 3]),
            ..Default::default()
        });
        let (node, sink) = build(&msg);
        assert_eq!(node.mime_type(), "text/plain");
        assert_eq!(sink.count(DiagnosticKind::AttachmentSkipped), 2);
    }

    #[test]
    fn test_inline_content_id_matches_html() {
        let mut msg = message(None, Some(r#"<img src="pic.png">"#));
        msg.attachments
            .push(AttachmentRecord::new("pic.png", PNG).with_content_id("from-container"));
        let (node, _) = build(&msg);
        let cid = html::generated_cid("pic.png");
        let MimeNode::Multipart(related) = &node else { panic!("multipart") };
        assert_eq!(related.children[1].headers().get("Content-ID"), Some(format!("<{cid}>").as_str()));
    }

    #[test]
    fn test_unreferenced_inline_keeps_container_cid() {
        let mut msg = message(None, Some("<p>no images</p>"));
        msg.attachments
            .push(AttachmentRecord::new("logo.png", PNG).with_content_id("<logo@x>"));
        let (node, _) = build(&msg);
        let MimeNode::Multipart(related) = &node else { panic!("multipart") };
        assert_eq!(related.children[1].headers().get("Content-ID"), Some("<logo@x>"));
    }

    #[test]
    fn test_unusable_container_cid_is_replaced() {
        let mut msg = message(None, Some("<p>no images</p>"));
        msg.attachments
            .push(AttachmentRecord::new("image001.png", PNG).with_content_id("c1\nX-Injected: yes"));
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let text = MimeAssembler::new(&clock, &sink).assemble(&msg, b"/in/a.msg");

        let cid = html::generated_cid("image001.png");
        assert!(text.contains(&format!("Content-ID: <{cid}>\n")));
        assert!(!text.lines().any(|l| l.starts_with("X-Injected:")));
    }

    #[test]
    fn test_sender_line_break_cannot_inject_headers() {
        let mut msg = message(Some("hello"), None);
        msg.sender = "Bob <b@x.com\nBcc: victim@y.com>".into();
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let text = MimeAssembler::new(&clock, &sink).assemble(&msg, b"/in/a.msg");

        let (head, _) = text.split_once("\n\n").expect("header block");
        let names: Vec<&str> = head
            .lines()
            .filter(|l| !l.starts_with(' '))
            .filter_map(|l| l.split_once(':').map(|(n, _)| n))
            .collect();
        assert_eq!(
            names,
            ["Subject", "From", "To", "Date", "Message-ID", "MIME-Version", "Content-Type", "Content-Transfer-Encoding"]
        );
    }

    #[test]
    fn test_date_and_header_diagnostics_carry_source() {
        let mut msg = message(Some("hello"), None);
        msg.date = DateValue::Text("garbage date".into());
        msg.subject = "=?x-klingon?Q?abc?=".into();
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let source = Path::new("/in/a.msg");
        MimeAssembler::new(&clock, &sink)
            .with_source(source)
            .build(&msg, "0123456789abcdef0123456789abcdef");

        let items = sink.items();
        assert!(items.iter().any(|d| d.kind == DiagnosticKind::InvalidDate));
        assert!(items.iter().any(|d| d.kind == DiagnosticKind::HeaderDecode));
        assert!(items.iter().all(|d| d.source.as_deref() == Some(source)));
    }

    #[test]
    fn test_container_type_hint_is_used() {
        let mut msg = message(Some("hello"), Some(r#"<img src="image001.png">"#));
        let mut photo = AttachmentRecord::new("image001.png", PNG);
        photo.mime_hint = Some("image/jpeg".into());
        let mut blob = AttachmentRecord::new("payload", b"%PDF".to_vec());
        blob.mime_hint = Some("application/pdf".into());
        msg.attachments.push(photo);
        msg.attachments.push(blob);
        let (node, _) = build(&msg);

        assert_eq!(child_types(&node), ["multipart/alternative", "application/pdf"]);
        let MimeNode::Multipart(mixed) = &node else { panic!("multipart") };
        let MimeNode::Multipart(alternative) = &mixed.children[0] else { panic!("multipart") };
        assert_eq!(child_types(&alternative.children[1]), ["text/html", "image/jpeg"]);
    }

    #[test]
    fn test_mandatory_headers_order() {
        let (node, _) = build(&message(Some("hello"), None));
        let names: Vec<_> = node.headers().iter().map(|(n, _)| n).take(6).collect();
        assert_eq!(names, ["Subject", "From", "To", "Date", "Message-ID", "MIME-Version"]);
        assert_eq!(node.headers().get("Message-ID"), Some("<0123456789abcdef0123456789abcdef@converted.local>"));
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let mut msg = message(Some("hello"), Some(r#"<img src="pic.png">"#));
        msg.date = DateValue::Absent;
        msg.attachments.push(AttachmentRecord::new("pic.png", PNG).with_content_id("c"));
        msg.attachments.push(AttachmentRecord::new("a.zip", vec![0u8; 300]));
        let assembler = MimeAssembler::new(&clock, &sink);
        let first = assembler.assemble(&msg, b"/in/mail.msg");
        assert_eq!(first, assembler.assemble(&msg, b"/in/mail.msg"));
        assert!(!first.contains('\r'));
    }
}
