//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use crate::host::DocumentId;
use crate::processor::StageTimings;
use std::time::Instant;

/// Stages of one document's run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Exporting the isolated layer for hand-off
    Exporting,
    /// Waiting for the external segmenter
    Segmenting,
    /// Reinserting the cutout and applying the background policy
    Compositing,
    /// Squaring the canvas
    Squaring,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Exporting => "Exporting layer",
            ProcessingStage::Segmenting => "Running segmenter",
            ProcessingStage::Compositing => "Compositing cutout",
            ProcessingStage::Squaring => "Squaring canvas",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Exporting => 5,
            ProcessingStage::Segmenting => 15,
            ProcessingStage::Compositing => 85,
            ProcessingStage::Squaring => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub document: DocumentId,
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the document's run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(document: DocumentId, stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            document,
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during pipeline runs
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    fn report_completion(&self, document: DocumentId, timings: &StageTimings);

    fn report_error(&self, document: DocumentId, stage: ProcessingStage, error: &str);

    /// Called before each document of a batch; `index` is zero-based
    fn report_batch_item(&self, _index: usize, _total: usize, _document: DocumentId) {}
}

/// Progress reporter that discards all updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _document: DocumentId, _timings: &StageTimings) {}

    fn report_error(&self, _document: DocumentId, _stage: ProcessingStage, _error: &str) {}
}

/// Progress reporter that emits tracing events
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                document = %update.document,
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            tracing::info!(document = %update.document, "[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, document: DocumentId, timings: &StageTimings) {
        tracing::info!(document = %document, "✅ Background removed in {}ms", timings.total_ms);

        if self.verbose {
            tracing::info!("  • Export: {}ms", timings.export_ms);
            tracing::info!("  • Segmentation: {}ms", timings.segmentation_ms);
            tracing::info!("  • Compositing: {}ms", timings.compositing_ms);
            tracing::info!("  • Squaring: {}ms", timings.squaring_ms);
        }
    }

    fn report_error(&self, document: DocumentId, stage: ProcessingStage, error: &str) {
        tracing::error!(document = %document, "❌ Error during {}: {}", stage.description(), error);
    }

    fn report_batch_item(&self, index: usize, total: usize, document: DocumentId) {
        tracing::info!("Processing {} ({}/{})", document, index + 1, total);
    }
}
