//! Split an MBOX archive into one `.eml` file per message.
//!
//! Entries are not restructured: headers are re-emitted as found (decoded
//! to UTF-8), missing mandatory headers are appended, and the body bytes are
//! copied through with only line endings normalized.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::error::Result;
use crate::export::eml::write_eml;
use crate::mime::assemble::{message_hash, message_id};
use crate::parser::date::{self, Clock};
use crate::parser::mbox::{strip_separator, MboxReader};
use crate::parser::text;

/// Outcome of splitting one archive.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SplitReport {
    /// Files written, in archive order.
    pub outputs: Vec<PathBuf>,
    /// 1-based indices of entries that could not be converted.
    pub skipped: Vec<usize>,
    /// Entries seen in the archive.
    pub entries: usize,
    pub bytes_written: u64,
}

impl SplitReport {
    /// The last file written, if any entry converted.
    pub fn output_path(&self) -> Option<&Path> {
        self.outputs.last().map(PathBuf::as_path)
    }
}

/// `<parent dir>_<base name>`, or the base name alone when the archive has
/// no named parent directory.
pub fn archive_prefix(path: &Path) -> String {
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(Path::file_name) {
        Some(parent) => format!("{}_{base}", parent.to_string_lossy()),
        None => base,
    }
}

/// `<prefix>_<NNNN>.eml`
pub fn entry_filename(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index:04}.eml")
}

/// Splits archives into the output directory.
///
/// Output files keep the entry's original position in the archive, so a
/// skipped entry leaves a gap in the numbering.
pub struct MboxSplitter<'a> {
    output_dir: &'a Path,
    clock: &'a dyn Clock,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> MboxSplitter<'a> {
    pub fn new(output_dir: &'a Path, clock: &'a dyn Clock, diagnostics: &'a dyn Diagnostics) -> Self {
        Self {
            output_dir,
            clock,
            diagnostics,
        }
    }

    /// Convert every entry of `archive`.
    ///
    /// Fails only if the archive cannot be opened or read. Entries that
    /// cannot be parsed or written are reported and skipped.
    pub fn split(&self, archive: &Path) -> Result<SplitReport> {
        let reader = MboxReader::new(archive)?;
        let prefix = archive_prefix(archive);
        let mut report = SplitReport::default();

        let entries = reader.for_each_entry(&mut |entry| {
            let target = self.output_dir.join(entry_filename(&prefix, entry.index));
            match self.convert_entry(entry.raw, &target) {
                Ok(size) => {
                    debug!(index = entry.index, output = %target.display(), "converted entry");
                    report.outputs.push(target);
                    report.bytes_written += size;
                }
                Err(reason) => {
                    self.diagnostics.report(
                        Diagnostic::new(
                            DiagnosticKind::ArchiveEntrySkipped,
                            format!("entry {} at offset {}: {reason}", entry.index, entry.offset),
                        )
                        .at(archive),
                    );
                    report.skipped.push(entry.index);
                }
            }
            true
        })?;
        report.entries = entries;

        if report.outputs.is_empty() {
            self.diagnostics.report(
                Diagnostic::new(
                    DiagnosticKind::EmptyArchive,
                    format!("no messages converted out of {} entries", report.entries),
                )
                .at(archive),
            );
        } else {
            info!(
                archive = %archive.display(),
                converted = report.outputs.len(),
                skipped = report.skipped.len(),
                "split archive"
            );
        }
        Ok(report)
    }

    fn convert_entry(&self, raw: &[u8], target: &Path) -> std::result::Result<u64, String> {
        let raw = strip_separator(raw);
        let mut entry = parse_entry(raw).ok_or("no header fields found")?;
        entry.ensure_mandatory_headers(raw, self.clock);
        let bytes = entry.render();
        write_eml(target, &bytes).map_err(|e| e.to_string())?;
        Ok(bytes.len() as u64)
    }
}

/// One header field: its name and the full field text (continuation lines
/// included, no trailing newline).
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderField {
    name: String,
    text: String,
}

/// An archive entry split into header fields and opaque body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryMessage {
    fields: Vec<HeaderField>,
    body: Vec<u8>,
}

impl EntryMessage {
    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn push(&mut self, name: &str, value: &str) {
        self.fields.push(HeaderField {
            name: name.to_string(),
            text: format!("{name}: {value}"),
        });
    }

    /// Append Message-ID, Date and MIME-Version when the entry lacks them.
    fn ensure_mandatory_headers(&mut self, raw: &[u8], clock: &dyn Clock) {
        if !self.has("Message-ID") {
            self.push("Message-ID", &message_id(&message_hash(raw)));
        }
        if !self.has("Date") {
            self.push("Date", &date::format_date(&clock.now(), clock));
        }
        if !self.has("MIME-Version") {
            self.push("MIME-Version", "1.0");
        }
    }

    fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 1024);
        for field in &self.fields {
            out.extend_from_slice(field.text.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }
}

/// Split raw entry bytes into header fields and body.
///
/// Reading stops at the blank separator line or at the first line that is
/// neither a field nor a continuation; that line starts the body. Returns
/// `None` if no field was found at all.
fn parse_entry(raw: &[u8]) -> Option<EntryMessage> {
    let data = normalize_line_endings(raw);
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut pos = 0;
    let mut body_start = data.len();

    while pos < data.len() {
        let end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| pos + i);
        let line = &data[pos..end];
        let next = (end + 1).min(data.len());

        if line.is_empty() {
            body_start = next;
            break;
        }
        if matches!(line[0], b' ' | b'\t') {
            if let Some(last) = fields.last_mut() {
                last.text.push('\n');
                last.text.push_str(&text::normalize_bytes(line));
                pos = next;
                continue;
            }
        }
        match field_name(line) {
            Some(name) => {
                fields.push(HeaderField {
                    name,
                    text: text::normalize_bytes(line),
                });
                pos = next;
            }
            None => {
                body_start = pos;
                break;
            }
        }
    }

    if fields.is_empty() {
        return None;
    }

    let mut body = data[body_start.min(data.len())..].to_vec();
    // The blank line before the next separator belongs to the archive.
    if body.ends_with(b"\n\n") {
        body.pop();
    }
    Some(EntryMessage { fields, body })
}

/// The field name if `line` is `name: value` with a printable-ASCII name.
fn field_name(line: &[u8]) -> Option<String> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|&b| (33..=126).contains(&b)) {
        return None;
    }
    Some(String::from_utf8_lossy(name).into_owned())
}

/// `\r\n` and lone `\r` become `\n`.
fn normalize_line_endings(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}
