//! Batch conversion of many input files.
//!
//! Each input is converted independently. A failure is reported for that
//! input only and never stops the rest of the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{ConversionFailure, ConvertError, Result};
use crate::export::eml::convert_message;
use crate::export::mbox::MboxSplitter;
use crate::parser::date::{Clock, SystemClock};
use crate::parser::msg::{ContainerReader, OutlookReader};

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Msg,
    Mbox,
}

impl InputKind {
    /// Detect the input kind from the extension (case-insensitive).
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "msg" => Some(Self::Msg),
            "mbox" => Some(Self::Mbox),
            _ => None,
        }
    }
}

/// Successful conversion of one input file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversionReport {
    pub source: PathBuf,
    pub kind: InputKind,
    /// Files written, in order.
    pub outputs: Vec<PathBuf>,
    /// Archive entries that could not be converted (always empty for `.msg`).
    pub skipped: Vec<usize>,
    pub bytes_written: u64,
}

impl ConversionReport {
    /// The representative output path: the `.eml` for a message, the last
    /// written entry for an archive, `None` when an archive produced nothing.
    pub fn output_path(&self) -> Option<&Path> {
        self.outputs.last().map(PathBuf::as_path)
    }
}

/// Result for one input of a batch.
pub type Outcome = std::result::Result<ConversionReport, ConversionFailure>;

/// Cooperative cancellation flag, checked before each file starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Count of finished files, shared between workers and an observer.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<AtomicUsize>);

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn advance(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Converts input files into `.eml` files under one output directory.
pub struct Converter {
    output_dir: PathBuf,
    reader: Box<dyn ContainerReader>,
    diagnostics: Arc<dyn Diagnostics>,
    clock: Arc<dyn Clock>,
}

impl Converter {
    /// A converter reading `.msg` files with [`OutlookReader`], reporting
    /// through `tracing` and using the system clock.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            reader: Box::new(OutlookReader),
            diagnostics: Arc::new(TracingDiagnostics),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_reader(mut self, reader: impl ContainerReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory. Safe to call repeatedly.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| ConvertError::io(&self.output_dir, e))
    }

    /// Convert one input file.
    pub fn convert(&self, path: &Path) -> Outcome {
        self.convert_inner(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "conversion failed");
            ConversionFailure::new(path, &e)
        })
    }

    fn convert_inner(&self, path: &Path) -> Result<ConversionReport> {
        let kind = InputKind::detect(path)
            .ok_or_else(|| ConvertError::UnsupportedInput(path.to_path_buf()))?;
        let clock = self.clock.as_ref();
        let diagnostics = self.diagnostics.as_ref();

        match kind {
            InputKind::Msg => {
                let message = self.reader.read(path)?;
                let (output, size) =
                    convert_message(&message, path, &self.output_dir, clock, diagnostics)?;
                Ok(ConversionReport {
                    source: path.to_path_buf(),
                    kind,
                    outputs: vec![output],
                    skipped: Vec::new(),
                    bytes_written: size,
                })
            }
            InputKind::Mbox => {
                let split = MboxSplitter::new(&self.output_dir, clock, diagnostics).split(path)?;
                Ok(ConversionReport {
                    source: path.to_path_buf(),
                    kind,
                    outputs: split.outputs,
                    skipped: split.skipped,
                    bytes_written: split.bytes_written,
                })
            }
        }
    }

    /// Convert every path on `workers` threads (0 = one per CPU).
    ///
    /// Returns one outcome per input, in input order. Files not yet started
    /// when `cancel` fires are reported as cancelled; files in progress run
    /// to completion. `progress` advances once per finished file.
    pub fn convert_all(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
        progress: &Progress,
        workers: usize,
    ) -> Vec<Outcome> {
        let run = || -> Vec<Outcome> {
            paths
                .par_iter()
                .map(|path| {
                    if cancel.is_cancelled() {
                        return Err(ConversionFailure::new(path, &ConvertError::Cancelled));
                    }
                    let outcome = self.convert(path);
                    progress.advance();
                    outcome
                })
                .collect()
        };

        let outcomes = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "could not build worker pool, using the global pool");
                run()
            }
        };

        let converted = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            total = paths.len(),
            converted,
            failed = paths.len() - converted,
            "batch finished"
        );
        outcomes
    }
}
