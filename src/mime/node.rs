//! MIME tree and its serialization.
//!
//! Output always uses `\n` line terminators. Multipart boundaries are derived
//! from a per-message seed and the node's position, so the same tree always
//! serializes to the same bytes.

use base64::Engine;

/// Longest line (in octets, excluding the terminator) allowed by RFC 5322.
const MAX_LINE_OCTETS: usize = 998;
/// Width of base64 body lines.
const BASE64_LINE: usize = 76;
/// Soft width used when folding header lines.
const FOLD_WIDTH: usize = 78;
/// Raw bytes per RFC 2047 encoded word (yields 60 base64 characters).
const ENCODED_WORD_BYTES: usize = 45;
/// Longest run without spaces written verbatim in a text or address header.
const LONG_TOKEN: usize = 900;

/// Multipart container subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartKind {
    Mixed,
    Alternative,
    Related,
}

impl MultipartKind {
    pub fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
            Self::Related => "related",
        }
    }
}

/// Content-Transfer-Encoding of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Base64,
}

impl TransferEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
        }
    }
}

/// Ordered header fields with wire-ready values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to an already-encoded value, replacing any existing field
    /// with the same name (case-insensitive) in place.
    ///
    /// Control characters other than tab become spaces, so a value can never
    /// start a new header line.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = strip_controls(value.into());
        match self.fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Set an unstructured text header, encoding non-ASCII as RFC 2047 words.
    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set(name, encode_words(value));
    }

    /// Set an address-list header, encoding only non-ASCII display names.
    pub fn set_addresses(&mut self, name: &str, value: &str) {
        self.set(name, encode_address_list(value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.fields.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.fields.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove and return every field that does not describe content
    /// (anything except `Content-*` and `MIME-Version`).
    pub fn take_message_fields(&mut self) -> Headers {
        let (content, message): (Vec<_>, Vec<_>) = std::mem::take(&mut self.fields)
            .into_iter()
            .partition(|(n, _)| is_content_field(n));
        self.fields = content;
        Headers { fields: message }
    }

    /// Put `leading` first in the given order, followed by the remaining
    /// fields whose names `leading` does not already carry.
    pub fn with_leading(self, leading: Headers) -> Headers {
        let mut fields = leading.fields;
        for (name, value) in self.fields {
            if !fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                fields.push((name, value));
            }
        }
        Headers { fields }
    }
}

fn strip_controls(value: String) -> String {
    if !value.chars().any(is_header_control) {
        return value;
    }
    value
        .chars()
        .map(|c| if is_header_control(c) { ' ' } else { c })
        .collect()
}

fn is_header_control(c: char) -> bool {
    c.is_control() && c != '\t'
}

fn is_content_field(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("content-") || lower == "mime-version"
}

/// A single-part body. `body` is already transfer-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub headers: Headers,
    pub body: String,
}

/// A multipart container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    pub kind: MultipartKind,
    pub headers: Headers,
    pub children: Vec<MimeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeNode {
    Leaf(Leaf),
    Multipart(Multipart),
}

impl MimeNode {
    /// A `text/<subtype>` leaf in UTF-8 with line endings normalized to `\n`.
    pub fn text(subtype: &str, text: &str) -> Self {
        let text = normalize_newlines(text);
        let encoding = text_encoding(&text);
        let body = match encoding {
            TransferEncoding::Base64 => wrap_base64(text.as_bytes()),
            _ => text,
        };
        let mut headers = Headers::new();
        headers.set("Content-Type", format!("text/{subtype}; charset=\"utf-8\""));
        headers.set("Content-Transfer-Encoding", encoding.as_str());
        MimeNode::Leaf(Leaf { headers, body })
    }

    /// A base64 leaf for binary content of the given MIME type.
    pub fn binary(content_type: &str, data: &[u8]) -> Self {
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type);
        headers.set("Content-Transfer-Encoding", TransferEncoding::Base64.as_str());
        MimeNode::Leaf(Leaf {
            headers,
            body: wrap_base64(data),
        })
    }

    pub fn multipart(kind: MultipartKind, children: Vec<MimeNode>) -> Self {
        MimeNode::Multipart(Multipart {
            kind,
            headers: Headers::new(),
            children,
        })
    }

    pub fn headers(&self) -> &Headers {
        match self {
            MimeNode::Leaf(leaf) => &leaf.headers,
            MimeNode::Multipart(multi) => &multi.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            MimeNode::Leaf(leaf) => &mut leaf.headers,
            MimeNode::Multipart(multi) => &mut multi.headers,
        }
    }

    /// Content type of this node without parameters.
    pub fn mime_type(&self) -> String {
        match self {
            MimeNode::Leaf(leaf) => leaf
                .headers
                .get("Content-Type")
                .and_then(|v| v.split(';').next())
                .unwrap_or("text/plain")
                .trim()
                .to_ascii_lowercase(),
            MimeNode::Multipart(multi) => format!("multipart/{}", multi.kind.subtype()),
        }
    }

    /// Serialize the tree as a complete message.
    ///
    /// `seed` feeds boundary generation; the same tree and seed always give
    /// the same text.
    pub fn render(&self, seed: &str) -> String {
        let mut counter = 0;
        let mut out = self.render_part(seed, &mut counter);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    fn render_part(&self, seed: &str, counter: &mut usize) -> String {
        match self {
            MimeNode::Leaf(leaf) => {
                let mut out = render_headers(&leaf.headers);
                out.push('\n');
                out.push_str(&leaf.body);
                out
            }
            MimeNode::Multipart(multi) => {
                let position = *counter;
                *counter += 1;
                let parts: Vec<String> = multi
                    .children
                    .iter()
                    .map(|child| child.render_part(seed, counter))
                    .collect();
                let boundary = pick_boundary(position, seed, &parts);

                let mut headers = multi.headers.clone();
                headers.set(
                    "Content-Type",
                    format!("multipart/{}; boundary=\"{boundary}\"", multi.kind.subtype()),
                );
                let mut out = render_headers(&headers);
                out.push('\n');
                for part in &parts {
                    out.push_str("--");
                    out.push_str(&boundary);
                    out.push('\n');
                    out.push_str(part);
                    out.push('\n');
                }
                out.push_str("--");
                out.push_str(&boundary);
                out.push_str("--\n");
                out
            }
        }
    }
}

/// `----=_Part_<position>_<seed>`, salted until it occurs in no child.
fn pick_boundary(position: usize, seed: &str, parts: &[String]) -> String {
    let base = format!("----=_Part_{position}_{seed}");
    let mut candidate = base.clone();
    let mut salt = 0u32;
    while parts.iter().any(|p| p.contains(&candidate)) {
        salt += 1;
        candidate = format!("{base}.{salt}");
    }
    candidate
}

fn render_headers(headers: &Headers) -> String {
    let mut out = String::new();
    for (name, value) in headers.iter() {
        out.push_str(&fold(name, value));
        out.push('\n');
    }
    out
}

/// Fold a header line at spaces so lines stay near [`FOLD_WIDTH`].
/// Tokens longer than the width go on their own line, and anything that
/// would still pass [`MAX_LINE_OCTETS`] is broken mid-token.
fn fold(name: &str, value: &str) -> String {
    let mut out = format!("{name}:");
    let mut line_len = out.len();
    for (i, token) in value.split(' ').enumerate() {
        let sep_fold = i > 0 && !token.is_empty() && line_len + 1 + token.len() > FOLD_WIDTH;
        if sep_fold {
            out.push_str("\n ");
            line_len = 1;
        } else {
            out.push(' ');
            line_len += 1;
        }
        let mut rest = token;
        while line_len + rest.len() > MAX_LINE_OCTETS {
            let mut cut = MAX_LINE_OCTETS.saturating_sub(line_len).min(rest.len());
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            out.push_str(&rest[..cut]);
            out.push_str("\n ");
            line_len = 1;
            rest = &rest[cut..];
        }
        out.push_str(rest);
        line_len += rest.len();
    }
    out
}

/// Replace `\r\n` and lone `\r` with `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn text_encoding(text: &str) -> TransferEncoding {
    if text.lines().any(|line| line.len() > MAX_LINE_OCTETS) {
        TransferEncoding::Base64
    } else if text.is_ascii() {
        TransferEncoding::SevenBit
    } else {
        TransferEncoding::EightBit
    }
}

/// Base64 with lines of [`BASE64_LINE`] characters joined by `\n`.
pub fn wrap_base64(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

fn needs_encoding(value: &str) -> bool {
    !value.is_ascii()
        || value.contains("=?")
        || value.chars().any(|c| c.is_control())
        || value.split(' ').any(|token| token.len() > LONG_TOKEN)
}

/// Encode `value` as RFC 2047 `B` words when it is not plain ASCII, holds
/// control characters, or has a run too long to fold.
pub fn encode_words(value: &str) -> String {
    if !needs_encoding(value) {
        return value.to_string();
    }
    encode_words_always(value)
}

fn encode_words_always(value: &str) -> String {
    let engine = &base64::engine::general_purpose::STANDARD;
    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in value.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_BYTES {
            words.push(format!("=?utf-8?B?{}?=", engine.encode(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?utf-8?B?{}?=", engine.encode(chunk.as_bytes())));
    }
    words.join(" ")
}

/// Encode a comma-separated address list. For `Name <addr>` entries only the
/// name is encoded; bare entries are encoded whole when needed. An angle
/// address that is not a single printable ASCII token is unusable, and its
/// whole mailbox is encoded instead.
pub fn encode_address_list(value: &str) -> String {
    crate::model::address::split_mailboxes(value)
        .into_iter()
        .map(str::trim)
        .map(|mailbox| match mailbox.rfind('<') {
            Some(lt) if mailbox.ends_with('>') && is_plain_angle_addr(&mailbox[lt..]) => {
                let name = mailbox[..lt].trim();
                let addr = &mailbox[lt..];
                if name.is_empty() {
                    addr.to_string()
                } else {
                    format!("{} {addr}", encode_words(name))
                }
            }
            Some(_) if mailbox.ends_with('>') => encode_words_always(mailbox),
            _ => encode_words(mailbox),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_plain_angle_addr(addr: &str) -> bool {
    addr.len() <= LONG_TOKEN && addr.bytes().all(|b| b.is_ascii_graphic())
}

/// `<param>="<value>"` for ASCII names, `<param>*=utf-8''<pct>` otherwise.
pub fn filename_param(param: &str, filename: &str) -> String {
    if filename.is_ascii() && !filename.chars().any(|c| c.is_control()) {
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{param}=\"{escaped}\"")
    } else {
        format!("{param}*=utf-8''{}", percent_encode(filename))
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for &b in value.as_bytes() {
        let plain = b.is_ascii_alphanumeric()
            || matches!(b, b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~');
        if plain {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_leaf_encodings() {
        let ascii = MimeNode::text("plain", "hello\r\nworld");
        assert_eq!(ascii.headers().get("Content-Transfer-Encoding"), Some("7bit"));
        let MimeNode::Leaf(leaf) = &ascii else { panic!("leaf") };
        assert_eq!(leaf.body, "hello\nworld");

        let utf8 = MimeNode::text("plain", "Привет");
        assert_eq!(utf8.headers().get("Content-Transfer-Encoding"), Some("8bit"));

        let long = MimeNode::text("html", &"x".repeat(MAX_LINE_OCTETS + 1));
        assert_eq!(long.headers().get("Content-Transfer-Encoding"), Some("base64"));
    }

    #[test]
    fn test_wrap_base64_line_width() {
        let wrapped = wrap_base64(&[0u8; 200]);
        assert!(wrapped.lines().all(|l| l.len() <= BASE64_LINE));
        assert!(!wrapped.contains('\r'));
    }

    #[test]
    fn test_encode_words() {
        assert_eq!(encode_words("Hello"), "Hello");
        assert_eq!(encode_words("Тест"), "=?utf-8?B?0KLQtdGB0YI=?=");
        let long = "ж".repeat(60);
        let encoded = encode_words(&long);
        assert!(encoded.split(' ').all(|w| w.starts_with("=?utf-8?B?") && w.len() <= 75));
    }

    #[test]
    fn test_encode_address_list() {
        assert_eq!(encode_address_list("a@x.com, b@y.org"), "a@x.com, b@y.org");
        assert_eq!(
            encode_address_list("Тест <t@x.com>"),
            "=?utf-8?B?0KLQtdGB0YI=?= <t@x.com>"
        );
    }

    #[test]
    fn test_address_with_line_break_cannot_add_headers() {
        let encoded = encode_address_list("Bob <b@x.com\nBcc: victim@y.com>");
        assert!(!encoded.contains('\n'));
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert_eq!(encode_address_list("<a@x.com\r>"), encode_words_always("<a@x.com\r>"));

        let mut headers = Headers::new();
        headers.set_addresses("From", "Bob <b@x.com\nBcc: victim@y.com>");
        headers.set("Content-ID", "<c1\nX-Injected: yes>");
        let rendered = render_headers(&headers);
        assert_eq!(rendered.lines().filter(|l| !l.starts_with(' ')).count(), 2);
        assert!(!rendered.lines().any(|l| l.starts_with("Bcc:") || l.starts_with("X-Injected:")));
    }

    #[test]
    fn test_set_keeps_tabs_replaces_other_controls() {
        let mut headers = Headers::new();
        headers.set("X-Test", "a\tb\rc\u{7}d");
        assert_eq!(headers.get("X-Test"), Some("a\tb c d"));
    }

    #[test]
    fn test_long_unbroken_subject_stays_within_line_limit() {
        let subject = "x".repeat(1500);
        let mut headers = Headers::new();
        headers.set_text("Subject", &subject);
        let rendered = render_headers(&headers);
        assert!(rendered.lines().count() > 10);
        assert!(rendered.lines().all(|l| l.len() < 100));
        assert!(headers.get("Subject").is_some_and(|v| v.starts_with("=?utf-8?B?")));
    }

    #[test]
    fn test_fold_breaks_oversized_token() {
        let folded = fold("Content-ID", &format!("<{}>", "a".repeat(2500)));
        assert!(folded.lines().all(|l| l.len() <= MAX_LINE_OCTETS));
        assert_eq!(folded.replace("\n ", "").len(), "Content-ID: ".len() + 2502);
    }

    #[test]
    fn test_filename_param() {
        assert_eq!(filename_param("filename", "a b.pdf"), "filename=\"a b.pdf\"");
        assert_eq!(
            filename_param("filename", "отчёт.pdf"),
            "filename*=utf-8''%D0%BE%D1%82%D1%87%D1%91%D1%82.pdf"
        );
    }

    #[test]
    fn test_headers_set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.set("Subject", "a");
        headers.set("X-Other", "1");
        headers.set("subject", "b");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.iter().next(), Some(("Subject", "b")));
    }

    #[test]
    fn test_take_message_fields() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        headers.set("Subject", "s");
        headers.set("MIME-Version", "1.0");
        let moved = headers.take_message_fields();
        assert_eq!(moved.get("Subject"), Some("s"));
        assert_eq!(headers.get("Subject"), None);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_with_leading_orders_and_overrides() {
        let mut rest = Headers::new();
        rest.set("Content-Type", "text/plain");
        rest.set("Subject", "old");
        let mut leading = Headers::new();
        leading.set("Subject", "new");
        leading.set("From", "a@x.com");
        let merged = rest.with_leading(leading);
        let names: Vec<_> = merged.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Subject", "From", "Content-Type"]);
        assert_eq!(merged.get("Subject"), Some("new"));
    }

    #[test]
    fn test_fold_long_header() {
        let value = vec!["someone@example.com,"; 10].join(" ");
        let folded = fold("To", &value);
        assert!(folded.lines().all(|l| l.len() <= FOLD_WIDTH));
        assert_eq!(folded.replace("\n ", " "), format!("To: {value}"));
    }

    #[test]
    fn test_render_multipart_is_deterministic() {
        let tree = MimeNode::multipart(
            MultipartKind::Alternative,
            vec![MimeNode::text("plain", "hi"), MimeNode::text("html", "<b>hi</b>")],
        );
        let first = tree.render("abc");
        assert_eq!(first, tree.render("abc"));
        assert!(first.starts_with("Content-Type: multipart/alternative; boundary=\"----=_Part_0_abc\"\n"));
        assert!(first.ends_with("------=_Part_0_abc--\n"));
        assert!(!first.contains('\r'));
    }

    #[test]
    fn test_boundary_avoids_collision() {
        let tree = MimeNode::multipart(
            MultipartKind::Mixed,
            vec![MimeNode::text("plain", "----=_Part_0_s appears here")],
        );
        let out = tree.render("s");
        assert!(out.contains("boundary=\"----=_Part_0_s.1\""));
    }
}
