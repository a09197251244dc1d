//! Diagnostics sink for recoverable conversion problems.
//!
//! Every component receives a `&dyn Diagnostics` instead of logging through
//! a global, so tests can capture exactly what was reported for one call.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Category of a recoverable problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DiagnosticKind {
    /// A date could not be parsed or was out of range; the current time was used.
    InvalidDate,
    /// An encoded header word could not be decoded with its declared charset.
    HeaderDecode,
    /// An attachment was dropped from the output message.
    AttachmentSkipped,
    /// An inline image had no HTML body to reference it and was attached instead.
    InlineImageAttached,
    /// An archive entry could not be converted and was skipped.
    ArchiveEntrySkipped,
    /// An archive produced no output files at all.
    EmptyArchive,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Source file the problem belongs to, when known.
    pub source: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: None,
            message: message.into(),
        }
    }

    /// Attach the source path.
    pub fn at(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }
}

/// Receiver for recoverable problems. Implementations must be shareable
/// across batch workers.
pub trait Diagnostics: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match &diagnostic.source {
            Some(path) => tracing::warn!(
                kind = ?diagnostic.kind,
                path = %path.display(),
                "{}",
                diagnostic.message
            ),
            None => tracing::warn!(kind = ?diagnostic.kind, "{}", diagnostic.message),
        }
    }
}

/// Stamps a source path onto diagnostics that do not carry one, then
/// forwards them.
pub struct WithSource<'a> {
    inner: &'a dyn Diagnostics,
    source: Option<&'a Path>,
}

impl<'a> WithSource<'a> {
    pub fn new(inner: &'a dyn Diagnostics, source: Option<&'a Path>) -> Self {
        Self { inner, source }
    }
}

impl Diagnostics for WithSource<'_> {
    fn report(&self, diagnostic: Diagnostic) {
        match self.source {
            Some(path) if diagnostic.source.is_none() => self.inner.report(diagnostic.at(path)),
            _ => self.inner.report(diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    items: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn items(&self) -> Vec<Diagnostic> {
        match self.items.lock() {
            Ok(items) => items.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of diagnostics of the given kind.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.items().iter().filter(|d| d.kind == kind).count()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match self.items.lock() {
            Ok(mut items) => items.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
