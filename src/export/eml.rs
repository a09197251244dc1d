//! Convert one container message into an `.eml` file.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::diagnostics::Diagnostics;
use crate::error::{ConvertError, Result};
use crate::mime::MimeAssembler;
use crate::model::message::SourceMessage;
use crate::parser::date::Clock;

/// Base name used when sanitizing leaves nothing.
pub const FALLBACK_BASE_NAME: &str = "converted_file";

/// Sanitize the base name (without extension) of `path` for use as an
/// output filename.
///
/// Keeps alphanumerics, spaces, `-` and `_`, then trims surrounding spaces.
pub fn sanitize_base_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .filter(|&c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<output_dir>/<sanitized base name>.eml`
pub fn eml_path(source: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.eml", sanitize_base_name(source)))
}

/// Assemble `message` and write it next to the other outputs.
///
/// The source path seeds the Message-ID, so converting the same file twice
/// gives the same identifier. Returns the written path and its size.
pub fn convert_message(
    message: &SourceMessage,
    source: &Path,
    output_dir: &Path,
    clock: &dyn Clock,
    diagnostics: &dyn Diagnostics,
) -> Result<(PathBuf, u64)> {
    let text = MimeAssembler::new(clock, diagnostics)
        .with_source(source)
        .assemble(message, source.to_string_lossy().as_bytes());

    let path = eml_path(source, output_dir);
    write_eml(&path, text.as_bytes())?;
    info!(source = %source.display(), output = %path.display(), "converted message");
    Ok((path, text.len() as u64))
}

/// Write a finished message to disk.
pub(crate) fn write_eml(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|e| ConvertError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::model::message::RawText;
    use crate::parser::date::FixedClock;

    #[test]
    fn test_sanitize_base_name() {
        assert_eq!(sanitize_base_name(Path::new("/in/Re: Offer (1).msg")), "Re Offer 1");
        assert_eq!(sanitize_base_name(Path::new("Отчёт-2024_v2.msg")), "Отчёт-2024_v2");
        assert_eq!(sanitize_base_name(Path::new("  padded  .msg")), "padded");
        assert_eq!(sanitize_base_name(Path::new("/in/!!!.msg")), FALLBACK_BASE_NAME);
    }

    #[test]
    fn test_eml_path() {
        let path = eml_path(Path::new("/in/mail.msg"), Path::new("/out"));
        assert_eq!(path, PathBuf::from("/out/mail.eml"));
    }

    #[test]
    fn test_convert_message_writes_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let message = SourceMessage {
            sender: "a@x.com".into(),
            subject: "Hi".into(),
            plain_body: Some(RawText::from("hello")),
            ..Default::default()
        };
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let (path, size) =
            convert_message(&message, Path::new("/in/hi.msg"), dir.path(), &clock, &sink)
                .expect("convert");
        assert_eq!(path, dir.path().join("hi.eml"));
        let written = std::fs::read_to_string(&path).expect("read");
        assert_eq!(written.len() as u64, size);
        assert!(written.starts_with("Subject: Hi\nFrom: a@x.com\nTo: \nDate: "));
        assert!(written.ends_with("\n\nhello\n"));
    }

    #[test]
    fn test_unwritable_output_is_io_error() {
        let clock = FixedClock::at_epoch(1_700_000_000);
        let sink = CollectingDiagnostics::new();
        let result = convert_message(
            &SourceMessage::default(),
            Path::new("x.msg"),
            Path::new("/nonexistent/output/dir"),
            &clock,
            &sink,
        );
        assert!(matches!(result, Err(ConvertError::Io { .. })));
    }
}
