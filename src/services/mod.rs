//! Services shared by the host and the pipeline

pub mod io;
pub mod progress;

pub use io::{ImageIOService, OutputFormat, JPEG_QUALITY};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
