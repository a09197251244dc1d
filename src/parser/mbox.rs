//! Streaming MBOX reader.
//!
//! Reads archives line-by-line through a 1 MB buffer and hands each entry's
//! raw bytes to a callback. Never loads the whole archive into memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ConvertError, Result};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// One entry as found in the archive.
#[derive(Debug)]
pub struct MboxEntry<'a> {
    /// 1-based position in the archive.
    pub index: usize,
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Entry bytes including the separator line.
    pub raw: &'a [u8],
}

/// Sequential MBOX reader.
///
/// Tolerates mixed `\n` / `\r\n` line endings, a UTF-8 BOM, `From ` lines not
/// preceded by a blank line (logged), and a truncated final entry. Text before
/// the first separator is ignored.
pub struct MboxReader {
    path: PathBuf,
}

impl MboxReader {
    /// Open a reader for the archive at `path`.
    ///
    /// Only checks that the file exists; content is validated while reading.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvertError::FileNotFound(path.clone())
            } else {
                ConvertError::io(&path, e)
            }
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk the archive, calling `on_entry` for every entry in file order.
    ///
    /// The callback returns `false` to stop early. Returns the number of
    /// entries delivered.
    pub fn for_each_entry(&self, on_entry: &mut dyn FnMut(MboxEntry<'_>) -> bool) -> Result<usize> {
        let file = File::open(&self.path).map_err(|e| ConvertError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count = 0usize;
        let mut offset: u64 = 0;
        let mut entry_start: u64 = 0;
        let mut entry_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut in_entry = false;
        let mut prev_line_blank = true;
        let mut line: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| ConvertError::io(&self.path, e))?;
            if read == 0 {
                break;
            }

            if is_separator(&line, offset == 0) {
                if in_entry && !prev_line_blank {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        "'From ' separator without preceding blank line"
                    );
                }
                if in_entry {
                    count += 1;
                    let entry = MboxEntry {
                        index: count,
                        offset: entry_start,
                        raw: &entry_buf,
                    };
                    if !on_entry(entry) {
                        return Ok(count);
                    }
                }
                entry_buf.clear();
                entry_start = offset;
                in_entry = true;
            }

            if in_entry {
                entry_buf.extend_from_slice(&line);
            }
            prev_line_blank = is_blank(&line);
            offset += read as u64;
        }

        if in_entry {
            count += 1;
            on_entry(MboxEntry {
                index: count,
                offset: entry_start,
                raw: &entry_buf,
            });
        }

        Ok(count)
    }
}

/// `true` for a `From ` separator line. A BOM is only accepted at file start.
fn is_separator(line: &[u8], at_file_start: bool) -> bool {
    let line = if at_file_start {
        line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line)
    } else {
        line
    };
    line.starts_with(b"From ")
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|&b| matches!(b, b'\n' | b'\r' | b' ' | b'\t'))
}

/// Strip the leading `From ` separator line (and a BOM) from an entry.
pub fn strip_separator(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(raw);
    if raw.starts_with(b"From ") {
        return match raw.iter().position(|&b| b == b'\n') {
            Some(pos) => &raw[pos + 1..],
            None => &[],
        };
    }
    raw
}
