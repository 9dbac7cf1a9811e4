//! Layer background removal CLI tool
//!
//! Opens each input image as a document, runs the background removal pipeline
//! on it and writes the flattened result as PNG.

use super::config::CliConfigBuilder;
use crate::{
    config::PipelineConfig,
    host::{DocumentId, ImageHost, Workspace},
    processor::{BackgroundRemovalPipeline, BatchEntry, BatchReport, DocumentOutcome, StageTimings},
    segmenter::RembgSegmenter,
    services::{
        ConsoleProgressReporter, ImageIOService, ProcessingStage, ProgressReporter,
        ProgressUpdate,
    },
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Suffix appended to the input stem for default output names
const OUTPUT_SUFFIX: &str = "_nobg";

/// Remove the background of image layers with rembg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "layer-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Output file (single document) or directory (several documents)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Attach a layer mask to the cutout
    #[arg(long)]
    pub as_mask: bool,

    /// Segmentation model, by rembg name or index 0-7
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Refine edges with alpha matting
    #[arg(short, long)]
    pub alpha_matting: bool,

    /// Alpha matting erode size (1-100)
    #[arg(long, value_name = "SIZE")]
    pub matting_erode: Option<u32>,

    /// Background: transparent, white, black or custom (or index 0-3)
    #[arg(short, long, value_name = "MODE")]
    pub background: Option<String>,

    /// Hex color for the custom background (#rrggbb or #rrggbbaa)
    #[arg(long, value_name = "HEX")]
    pub background_color: Option<String>,

    /// Grow the canvas to a centered square after compositing
    #[arg(long)]
    pub make_square: bool,

    /// Process every opened document in one batch
    #[arg(long)]
    pub all: bool,

    /// Python interpreter with rembg installed
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Kill the segmenter after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// JSON configuration file; command line options take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
    /// Colored console output
    Console,
    /// Plain output for CI logs
    Compact,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting layer background removal");
    debug!(?config, "Resolved configuration");

    let session = spans::session(&session_id, config.model.rembg_name());
    let start_time = Instant::now();
    let summary = process_inputs(&cli, config).instrument(session).await?;

    info!(
        "Processed {} document(s) in {:.2}s",
        summary.completed,
        start_time.elapsed().as_secs_f64()
    );

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} document(s) failed",
            summary.failed,
            summary.total
        );
    }
    Ok(())
}

/// Counts reported at the end of a run
#[derive(Debug, Default, PartialEq, Eq)]
struct RunSummary {
    total: usize,
    completed: usize,
    skipped: usize,
    failed: usize,
}

/// Open, process and save every input
async fn process_inputs(cli: &Cli, config: PipelineConfig) -> Result<RunSummary> {
    let files = collect_input_files(&cli.input)?;
    if files.is_empty() {
        anyhow::bail!("No supported image files found in the provided inputs");
    }
    info!("Found {} image file(s) to process", files.len());

    let outputs = OutputPlan::new(cli.output.as_deref(), files.len())?;
    let targets = outputs.resolve(&files)?;

    let mut workspace = Workspace::new();
    let mut opened: Vec<OpenedInput> = Vec::new();
    let mut summary = RunSummary {
        total: files.len(),
        ..RunSummary::default()
    };

    for (file, output) in files.into_iter().zip(targets) {
        let _span = spans::file_processing(&file).entered();
        match workspace.open_image(&file) {
            Ok(document) => opened.push(OpenedInput {
                document,
                input: file,
                output,
            }),
            Err(e) => {
                error!("❌ Failed to open {}: {}", file.display(), e);
                summary.failed += 1;
            },
        }
    }

    let bar = if opened.len() > 1 {
        let bar = ProgressBar::new(opened.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("#>-"),
        );
        Some(bar)
    } else {
        None
    };

    let reporter: Box<dyn ProgressReporter> = match &bar {
        Some(bar) => Box::new(BarProgressReporter::new(bar.clone(), cli.verbose > 0)),
        None => Box::new(ConsoleProgressReporter::new(cli.verbose > 0)),
    };
    let pipeline = BackgroundRemovalPipeline::from_config(config)
        .context("Failed to create background removal pipeline")?
        .with_reporter(reporter);

    let report = run_pipeline(&pipeline, &mut workspace, &opened, bar.as_ref())
        .instrument(spans::batch_processing(opened.len()))
        .await;

    if let Some(bar) = &bar {
        bar.finish_with_message(format!(
            "Completed! Processed: {}, Failed: {}",
            report.completed(),
            report.failed()
        ));
    }

    summary.skipped = report.skipped();
    for entry in &report.entries {
        let Some(OpenedInput { input, output, .. }) =
            opened.iter().find(|o| o.document == entry.document)
        else {
            continue;
        };
        match &entry.outcome {
            DocumentOutcome::Completed(outcome) => {
                match workspace.export_png(outcome.document, output) {
                    Ok(()) => {
                        info!("✅ {} → {}", input.display(), output.display());
                        summary.completed += 1;
                    },
                    Err(e) => {
                        error!("❌ Failed to write {}: {}", output.display(), e);
                        summary.failed += 1;
                    },
                }
            },
            DocumentOutcome::Skipped => warn!("Skipped {}: no layer to process", input.display()),
            DocumentOutcome::Failed(e) => {
                error!("❌ Failed to process {}: {}", input.display(), e);
                summary.failed += 1;
            },
        }
    }

    if summary.total > 1 {
        info!("📊 Batch processing summary:");
        info!("  ├─ Documents processed: {}", summary.completed);
        info!("  ├─ Documents skipped: {}", summary.skipped);
        info!("  └─ Documents failed: {}", summary.failed);
    }

    Ok(summary)
}

/// An input file opened as a document, with its planned output path
struct OpenedInput {
    document: DocumentId,
    input: PathBuf,
    output: PathBuf,
}

/// Run the pipeline in batch mode or once per document
async fn run_pipeline<H>(
    pipeline: &BackgroundRemovalPipeline<RembgSegmenter>,
    host: &mut H,
    opened: &[OpenedInput],
    bar: Option<&ProgressBar>,
) -> BatchReport
where
    H: ImageHost,
{
    if pipeline.config().process_all_open {
        let first = opened.first().map_or(DocumentId(0), |o| o.document);
        return match pipeline.run(host, first, &[]).await {
            Ok(report) => report,
            Err(e) => {
                error!("❌ Batch run failed: {}", e);
                BatchReport::default()
            },
        };
    }

    let mut report = BatchReport::default();
    for (index, OpenedInput { document: doc, input, .. }) in opened.iter().enumerate() {
        if let Some(bar) = bar {
            bar.set_position(index as u64);
            bar.set_message(format!("Processing {}", input.display()));
        }

        let drawables = match host.selected_layers(*doc) {
            Ok(layers) => layers,
            Err(e) => {
                report.entries.push(BatchEntry {
                    document: *doc,
                    outcome: DocumentOutcome::Failed(e),
                });
                continue;
            },
        };

        match pipeline.run(host, *doc, &drawables).await {
            Ok(single) => report.entries.extend(single.entries),
            Err(e) => report.entries.push(BatchEntry {
                document: *doc,
                outcome: DocumentOutcome::Failed(e),
            }),
        }
    }
    report
}

/// Where results are written
#[derive(Debug, PartialEq, Eq)]
enum OutputPlan {
    /// Next to each input as `<stem>_nobg.png`
    BesideInput,
    /// Exactly this file
    File(PathBuf),
    /// `<stem>_nobg.png` inside this directory
    Directory(PathBuf),
}

impl OutputPlan {
    fn new(output: Option<&Path>, document_count: usize) -> Result<Self> {
        let Some(output) = output else {
            return Ok(Self::BesideInput);
        };

        if document_count <= 1 && !output.is_dir() {
            return Ok(Self::File(output.to_path_buf()));
        }

        if output.is_file() {
            anyhow::bail!(
                "Output path exists and is a file, not a directory: {}",
                output.display()
            );
        }
        std::fs::create_dir_all(output).with_context(|| {
            format!("Failed to create output directory: {}", output.display())
        })?;
        Ok(Self::Directory(output.to_path_buf()))
    }

    fn path_for(&self, input: &Path) -> PathBuf {
        self.path_named(input, &output_file_name(input))
    }

    fn path_named(&self, input: &Path, name: &str) -> PathBuf {
        match self {
            Self::BesideInput => {
                let dir = input.parent().unwrap_or(Path::new("."));
                dir.join(name)
            },
            Self::File(path) => path.clone(),
            Self::Directory(dir) => dir.join(name),
        }
    }

    /// Output path for every input, in input order
    ///
    /// Inputs sharing a stem keep their extension in the output name
    /// (`photo.jpg_nobg.png`). Paths that still clash are an error.
    fn resolve(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut stem_uses: HashMap<PathBuf, usize> = HashMap::new();
        for input in inputs {
            *stem_uses.entry(self.path_for(input)).or_default() += 1;
        }

        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        let mut paths = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut path = self.path_for(input);
            if stem_uses.get(&path).copied().unwrap_or_default() > 1 {
                path = self.path_named(input, &full_output_file_name(input));
            }
            if let Some(other) = claimed.insert(path.clone(), input) {
                anyhow::bail!(
                    "{} and {} would both be written to {}",
                    other.display(),
                    input.display(),
                    path.display()
                );
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

fn output_file_name(input: &Path) -> String {
    let stem = input.file_stem().unwrap_or_default();
    format!("{}{}.png", stem.to_string_lossy(), OUTPUT_SUFFIX)
}

fn full_output_file_name(input: &Path) -> String {
    let name = input.file_name().unwrap_or_default();
    format!("{}{}.png", name.to_string_lossy(), OUTPUT_SUFFIX)
}

/// Expand directories into their image files; the result is sorted
fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in inputs {
        if path.is_file() {
            if ImageIOService::is_supported_format(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in walkdir::WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file() && ImageIOService::is_supported_format(entry.path())
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    files.sort();
    Ok(files)
}

/// Console reporter that keeps an `indicatif` bar intact while logging
struct BarProgressReporter {
    bar: ProgressBar,
    inner: ConsoleProgressReporter,
}

impl BarProgressReporter {
    fn new(bar: ProgressBar, verbose: bool) -> Self {
        Self {
            bar,
            inner: ConsoleProgressReporter::new(verbose),
        }
    }
}

impl ProgressReporter for BarProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.suspend(|| self.inner.report_progress(update));
    }

    fn report_completion(&self, document: DocumentId, timings: &StageTimings) {
        self.bar
            .suspend(|| self.inner.report_completion(document, timings));
    }

    fn report_error(&self, document: DocumentId, stage: ProcessingStage, error: &str) {
        self.bar
            .suspend(|| self.inner.report_error(document, stage, error));
    }

    fn report_batch_item(&self, index: usize, _total: usize, document: DocumentId) {
        self.bar.set_position(index as u64);
        self.bar.set_message(format!("Processing {}", document));
    }
}
