#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Layer Background Removal Library
//!
//! Removes the background of one layer of a layered document by handing the
//! layer to the external `rembg` segmenter, then composites the returned
//! cutout back into the layer stack with an optional mask, background fill
//! and canvas squaring.
//!
//! ## Features
//!
//! - **Host Abstraction**: the pipeline only talks to an editor through [`ImageHost`];
//!   [`Workspace`] is a complete in-memory implementation
//! - **Background Policies**: transparent, white, black or any RGBA color
//! - **Eight rembg Models**: u2net family, silueta, isnet and sam
//! - **Undo Grouping**: every document's run is one undoable step
//! - **Batch Mode**: process all open documents, collecting per-document results
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layer_bgremove::{
//!     BackgroundMode, BackgroundRemovalPipeline, ImageHost, PipelineConfig, Workspace,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .background_mode(BackgroundMode::White)
//!     .make_square(true)
//!     .build()?;
//! let pipeline = BackgroundRemovalPipeline::from_config(config)?;
//!
//! let mut workspace = Workspace::new();
//! let doc = workspace.open_image("photo.jpg")?;
//! let drawables = workspace.selected_layers(doc)?;
//! pipeline.run(&mut workspace, doc, &drawables).await?;
//! workspace.export_png(doc, "photo_nobg.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and progress bar
//! - `webp-support`: WebP input support

pub mod canvas;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod handoff;
pub mod host;
pub mod models;
pub mod processor;
pub mod segmenter;
pub mod services;
pub mod tracing_config;
pub mod utils;

use std::path::Path;

// Public API exports
pub use canvas::{square_geometry, squarify};
pub use compositor::composite;
pub use config::{BackgroundMode, BackgroundSpec, PipelineConfig, PipelineConfigBuilder};
pub use error::{BestEffort, BgRemovalError, Result};
pub use export::export_isolated;
pub use handoff::HandoffFiles;
pub use host::{
    ColorMode, DocumentId, Fill, HostCapabilities, ImageHost, LayerId, MaskInit, MergePolicy,
    Workspace,
};
pub use models::SegmentationModel;
pub use processor::{
    BackgroundRemovalPipeline, BatchEntry, BatchReport, DocumentOutcome, ProcessOutcome,
    StageTimings,
};
pub use segmenter::{rembg_args, RembgSegmenter, SegmentRequest, Segmenter};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use tracing_config::{spans, TracingConfig, TracingFormat};
pub use utils::{ColorParser, Rgba};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

/// Remove the background of an image file and save the result as PNG
///
/// Opens `input` as a single-layer document, runs the pipeline configured by
/// `config` through `rembg` and writes the flattened document to `output`.
///
/// # Examples
///
/// ```rust,no_run
/// use layer_bgremove::{remove_background_from_file, PipelineConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let outcome =
///     remove_background_from_file("cat.jpg", "cat_nobg.png", &PipelineConfig::default()).await?;
/// println!("took {}ms", outcome.timings.total_ms);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_file<P, Q>(
    input: P,
    output: Q,
    config: &PipelineConfig,
) -> Result<ProcessOutcome>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let pipeline = BackgroundRemovalPipeline::from_config(config.clone())?;
    remove_background_with(&pipeline, input, output).await
}

/// Same as [`remove_background_from_file`] with a caller-supplied pipeline
pub async fn remove_background_with<S, P, Q>(
    pipeline: &BackgroundRemovalPipeline<S>,
    input: P,
    output: Q,
) -> Result<ProcessOutcome>
where
    S: Segmenter,
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut workspace = Workspace::new();
    let doc = workspace.open_image(input)?;
    let layer = workspace
        .selected_layers(doc)?
        .first()
        .copied()
        .ok_or_else(|| BgRemovalError::host(format!("{} has no layers", doc)))?;

    let outcome = pipeline.process_document(&mut workspace, doc, layer).await?;
    workspace.export_png(doc, output)?;
    Ok(outcome)
}
