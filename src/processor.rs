//! Background removal pipeline
//!
//! [`BackgroundRemovalPipeline`] sequences export, segmentation, compositing
//! and optional squaring for one document at a time. Each document's run is a
//! single undo group on the host, and its hand-off files never outlive the run.

use crate::{
    canvas::squarify,
    compositor::composite,
    config::PipelineConfig,
    error::{BestEffort, BgRemovalError, Result},
    export::export_isolated,
    handoff::HandoffFiles,
    host::{DocumentId, ImageHost, LayerId},
    segmenter::{RembgSegmenter, SegmentRequest, Segmenter},
    services::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate},
};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, instrument, span, warn, Instrument, Level};

/// Message returned when the single-drawable entry point gets zero or several drawables
pub const EXACTLY_ONE_DRAWABLE: &str = "This plug-in works with exactly one drawable.";

/// Wall-clock time spent in each stage of one document's run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub export_ms: u64,
    pub segmentation_ms: u64,
    pub compositing_ms: u64,
    pub squaring_ms: u64,
    pub total_ms: u64,
}

/// Result of a successful run on one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub document: DocumentId,
    /// Layer holding the cutout (merged with its background, if any)
    pub layer: LayerId,
    /// Whether the canvas was resized to a square
    pub squared: bool,
    pub timings: StageTimings,
}

/// What happened to one document of a batch
#[derive(Debug)]
pub enum DocumentOutcome {
    Completed(ProcessOutcome),
    /// The document had no layer to work on
    Skipped,
    Failed(BgRemovalError),
}

/// One line of a [`BatchReport`]
#[derive(Debug)]
pub struct BatchEntry {
    pub document: DocumentId,
    pub outcome: DocumentOutcome,
}

/// Per-document results of a run, in processing order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn single(outcome: ProcessOutcome) -> Self {
        Self {
            entries: vec![BatchEntry {
                document: outcome.document,
                outcome: DocumentOutcome::Completed(outcome),
            }],
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Completed(_)))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Skipped))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Fold every failure into a single `Batch` error
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(BgRemovalError::Batch(self.to_string()))
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} documents failed",
            self.failed(),
            self.entries.len()
        )?;
        for entry in &self.entries {
            if let DocumentOutcome::Failed(e) = &entry.outcome {
                write!(f, "; {}: {}", entry.document, e)?;
            }
        }
        Ok(())
    }
}

/// Runs export → segment → composite → square against an [`ImageHost`]
pub struct BackgroundRemovalPipeline<S: Segmenter> {
    config: PipelineConfig,
    segmenter: S,
    reporter: Box<dyn ProgressReporter>,
    scratch_dir: Option<PathBuf>,
}

impl BackgroundRemovalPipeline<RembgSegmenter> {
    /// Pipeline driving `rembg` with the executable and timeout from `config`
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let segmenter = RembgSegmenter::from_config(&config);
        Self::new(config, segmenter)
    }
}

impl<S: Segmenter> BackgroundRemovalPipeline<S> {
    /// Create a pipeline; `config` is validated first
    pub fn new(config: PipelineConfig, segmenter: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            segmenter,
            reporter: Box::new(NoOpProgressReporter),
            scratch_dir: None,
        })
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Create hand-off directories under `dir` instead of the system temp dir
    #[must_use]
    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn segmenter(&self) -> &S {
        &self.segmenter
    }

    /// Entry point mirroring the editor command.
    ///
    /// With `process_all_open` every open document is processed and `doc` and
    /// `drawables` are ignored. Otherwise exactly one drawable must be given.
    pub async fn run<H>(
        &self,
        host: &mut H,
        doc: DocumentId,
        drawables: &[LayerId],
    ) -> Result<BatchReport>
    where
        H: ImageHost + ?Sized,
    {
        if self.config.process_all_open {
            return Ok(self.run_all_open(host).await);
        }
        let [layer] = drawables else {
            return Err(BgRemovalError::invalid_config(EXACTLY_ONE_DRAWABLE));
        };
        let outcome = self.process_document(host, doc, *layer).await?;
        Ok(BatchReport::single(outcome))
    }

    /// Process every open document, continuing past failures
    pub async fn run_all_open<H>(&self, host: &mut H) -> BatchReport
    where
        H: ImageHost + ?Sized,
    {
        let documents = host.open_documents();
        let total = documents.len();
        info!(documents = total, "Processing all open documents");

        let mut report = BatchReport::default();
        for (index, doc) in documents.into_iter().enumerate() {
            self.reporter.report_batch_item(index, total, doc);

            let outcome = match pick_drawable(host, doc) {
                Ok(Some(layer)) => match self.process_document(host, doc, layer).await {
                    Ok(outcome) => DocumentOutcome::Completed(outcome),
                    Err(e) => {
                        warn!(document = %doc, error = %e, "Document failed, continuing with the next one");
                        DocumentOutcome::Failed(e)
                    },
                },
                Ok(None) => {
                    debug!(document = %doc, "No drawable, skipping");
                    DocumentOutcome::Skipped
                },
                Err(e) => DocumentOutcome::Failed(e),
            };
            report.entries.push(BatchEntry {
                document: doc,
                outcome,
            });
        }

        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch finished"
        );
        report
    }

    /// Remove the background of `layer` in `doc` as one undoable step
    #[instrument(skip(self, host), fields(model = %self.config.model))]
    pub async fn process_document<H>(
        &self,
        host: &mut H,
        doc: DocumentId,
        layer: LayerId,
    ) -> Result<ProcessOutcome>
    where
        H: ImageHost + ?Sized,
    {
        host.undo_group_start(doc)?;
        let result = self.process_in_group(host, doc, layer).await;
        let closed = host.undo_group_end(doc);

        match result {
            Ok(outcome) => {
                closed?;
                self.reporter.report_completion(doc, &outcome.timings);
                Ok(outcome)
            },
            Err(e) => {
                closed.best_effort("close undo group");
                Err(e)
            },
        }
    }

    async fn process_in_group<H>(
        &self,
        host: &mut H,
        doc: DocumentId,
        layer: LayerId,
    ) -> Result<ProcessOutcome>
    where
        H: ImageHost + ?Sized,
    {
        let mut files = match &self.scratch_dir {
            Some(dir) => HandoffFiles::new_in(dir)?,
            None => HandoffFiles::new()?,
        };
        let result = self.run_stages(host, doc, layer, &files).await;
        files.cleanup().best_effort("remove hand-off files");
        result
    }

    async fn run_stages<H>(
        &self,
        host: &mut H,
        doc: DocumentId,
        layer: LayerId,
        files: &HandoffFiles,
    ) -> Result<ProcessOutcome>
    where
        H: ImageHost + ?Sized,
    {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();
        info!(document = %doc, layer = %layer, "Removing background");

        let offset = host.offsets(doc, layer)?;

        self.report(doc, ProcessingStage::Exporting, total_start);
        let stage_start = Instant::now();
        {
            let _span = span!(Level::DEBUG, "export", document = %doc).entered();
            export_isolated(host, doc, layer, files.input_path())
                .map_err(|e| self.fail(doc, ProcessingStage::Exporting, e))?;
        }
        timings.export_ms = elapsed_ms(stage_start);

        self.report(doc, ProcessingStage::Segmenting, total_start);
        let stage_start = Instant::now();
        let request = SegmentRequest::from_config(&self.config, files.input_path(), files.output_path());
        self.segmenter
            .segment(&request)
            .instrument(span!(Level::INFO, "segmentation", model = %self.config.model))
            .await
            .map_err(|e| self.fail(doc, ProcessingStage::Segmenting, e))?;
        if !files.output_path().exists() {
            let e = BgRemovalError::OutputNotProduced(files.output_path().to_path_buf());
            return Err(self.fail(doc, ProcessingStage::Segmenting, e));
        }
        timings.segmentation_ms = elapsed_ms(stage_start);

        self.report(doc, ProcessingStage::Compositing, total_start);
        let stage_start = Instant::now();
        let result_layer = {
            let _span = span!(Level::DEBUG, "compositing", document = %doc).entered();
            composite(
                host,
                doc,
                files.output_path(),
                offset,
                self.config.as_mask,
                &self.config.background_spec(),
                layer,
            )
            .map_err(|e| self.fail(doc, ProcessingStage::Compositing, e))?
        };
        timings.compositing_ms = elapsed_ms(stage_start);

        let mut squared = false;
        if self.config.make_square {
            self.report(doc, ProcessingStage::Squaring, total_start);
            let stage_start = Instant::now();
            let _span = span!(Level::DEBUG, "squaring", document = %doc).entered();
            squared = squarify(host, doc).map_err(|e| self.fail(doc, ProcessingStage::Squaring, e))?;
            timings.squaring_ms = elapsed_ms(stage_start);
        }

        timings.total_ms = elapsed_ms(total_start);
        self.report(doc, ProcessingStage::Completed, total_start);

        Ok(ProcessOutcome {
            document: doc,
            layer: result_layer,
            squared,
            timings,
        })
    }

    fn report(&self, doc: DocumentId, stage: ProcessingStage, start: Instant) {
        self.reporter
            .report_progress(ProgressUpdate::new(doc, stage, start));
    }

    fn fail(&self, doc: DocumentId, stage: ProcessingStage, error: BgRemovalError) -> BgRemovalError {
        self.reporter.report_error(doc, stage, &error.to_string());
        error
    }
}

/// First selected layer, else the top layer; `None` for an empty document
fn pick_drawable<H>(host: &H, doc: DocumentId) -> Result<Option<LayerId>>
where
    H: ImageHost + ?Sized,
{
    if let Some(layer) = host.selected_layers(doc)?.first() {
        return Ok(Some(*layer));
    }
    Ok(host.layers(doc)?.first().copied())
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
