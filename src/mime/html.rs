//! Point `<img src>` references at inline attachments via `cid:` URLs.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::attachment::AttachmentRecord;

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\ssrc\s*=\s*["']([^"']+)["'][^>]*>"#).expect("valid img regex")
});

/// Filename to Content-ID assignments for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentIdMap {
    ids: HashMap<String, String>,
}

impl ContentIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cid` for `filename` unless one is already assigned.
    /// Returns the id in effect for the filename.
    pub fn assign(&mut self, filename: &str, cid: String) -> &str {
        self.ids.entry(filename.to_string()).or_insert(cid)
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.ids.get(filename).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// `img_` followed by the first 8 hex digits of the filename's MD5.
pub fn generated_cid(filename: &str) -> String {
    let digest = format!("{:x}", md5::compute(filename.as_bytes()));
    format!("img_{}", &digest[..8])
}

/// Rewrite image sources that name an inline attachment to `cid:` references.
///
/// Only the `src` value is replaced; the rest of each tag is kept as is.
/// Sources that are already `cid:` URLs, and sources matching no
/// attachment, are left alone. The first attachment (in the given order)
/// whose filename occurs in the source wins.
pub fn rewrite(html: &str, inline: &[&AttachmentRecord]) -> (String, ContentIdMap) {
    let mut map = ContentIdMap::new();
    if html.is_empty() || inline.is_empty() {
        return (html.to_string(), map);
    }

    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for caps in IMG_SRC.captures_iter(html) {
        let Some(src) = caps.get(1) else { continue };
        let value = src.as_str();
        if value.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("cid:")) {
            continue;
        }
        let Some(filename) = inline
            .iter()
            .filter_map(|att| att.filename())
            .find(|name| value.contains(name))
        else {
            continue;
        };
        let cid = map.assign(filename, generated_cid(filename));
        out.push_str(&html[last..src.start()]);
        out.push_str("cid:");
        out.push_str(cid);
        last = src.end();
    }
    out.push_str(&html[last..]);
    (out, map)
}
