//! External segmenter invocation
//!
//! The segmenter is a black box with a file-in/file-out contract: it reads the
//! exported layer and writes a cutout with an alpha channel. [`RembgSegmenter`]
//! drives the `rembg` command line through a Python interpreter.

use crate::config::PipelineConfig;
use crate::error::{BgRemovalError, Result};
use crate::models::SegmentationModel;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Message used when the segmenter fails without writing to stderr
pub const GENERIC_FAILURE_MESSAGE: &str = "rembg failed";

/// One segmentation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRequest {
    pub model: SegmentationModel,
    pub alpha_matting: bool,
    pub matting_erode: u32,
    /// Flat image to segment
    pub input: PathBuf,
    /// Where the cutout must be written
    pub output: PathBuf,
}

impl SegmentRequest {
    /// Build a request from the pipeline settings
    #[must_use]
    pub fn from_config(config: &PipelineConfig, input: &Path, output: &Path) -> Self {
        Self {
            model: config.model,
            alpha_matting: config.alpha_matting,
            matting_erode: config.matting_erode,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        }
    }
}

/// Produces a transparent-background cutout from a flat image
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Run one job to completion.
    ///
    /// Success means the tool reported success; whether the output file exists
    /// is checked by the caller.
    async fn segment(&self, request: &SegmentRequest) -> Result<()>;
}

/// Arguments passed to the interpreter for single-image inference
#[must_use]
pub fn rembg_args(request: &SegmentRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-m".into(),
        "rembg.cli".into(),
        "i".into(),
        "-m".into(),
        request.model.rembg_name().into(),
    ];
    if request.alpha_matting {
        args.push("-a".into());
        args.push("-ae".into());
        args.push(request.matting_erode.to_string().into());
    }
    args.push(request.input.clone().into_os_string());
    args.push(request.output.clone().into_os_string());
    args
}

/// Turn captured stderr into an error message, dropping undecodable bytes
#[must_use]
pub fn failure_message(stderr: &[u8]) -> String {
    let text: String = stderr.utf8_chunks().map(|chunk| chunk.valid()).collect();
    let text = text.trim();
    if text.is_empty() {
        GENERIC_FAILURE_MESSAGE.to_string()
    } else {
        text.to_string()
    }
}

/// `rembg` run as `<python> -m rembg.cli i ...`
#[derive(Debug, Clone)]
pub struct RembgSegmenter {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl RembgSegmenter {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
        }
    }

    /// Use the resolved executable and timeout of a pipeline configuration
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            executable: config.resolved_segmenter_executable(),
            timeout: config.segmenter_timeout(),
        }
    }

    /// Kill the child and fail when it runs longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl Segmenter for RembgSegmenter {
    #[instrument(skip(self, request), fields(model = %request.model, alpha_matting = request.alpha_matting))]
    async fn segment(&self, request: &SegmentRequest) -> Result<()> {
        if !self.executable.exists() {
            return Err(BgRemovalError::ExecutableNotFound(self.executable.clone()));
        }

        let args = rembg_args(request);
        debug!(executable = %self.executable.display(), ?args, "Spawning segmenter");

        let child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BgRemovalError::file_io_error("spawn", &self.executable, &e))?;

        // dropping the future on timeout drops the child, which kills it
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| BgRemovalError::SegmenterTimedOut(limit))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| BgRemovalError::file_io_error("wait for", &self.executable, &e))?;

        if !output.status.success() {
            debug!(status = %output.status, "Segmenter exited with failure");
            return Err(BgRemovalError::segmenter_failed(failure_message(&output.stderr)));
        }

        info!(output = %request.output.display(), "Segmenter finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(alpha_matting: bool) -> SegmentRequest {
        SegmentRequest {
            model: SegmentationModel::IsNetAnime,
            alpha_matting,
            matting_erode: 15,
            input: PathBuf::from("/tmp/in.jpg"),
            output: PathBuf::from("/tmp/out.png"),
        }
    }

    #[test]
    fn test_args_without_matting() {
        let args = rembg_args(&request(false));
        let expected: Vec<OsString> = ["-m", "rembg.cli", "i", "-m", "isnet-anime", "/tmp/in.jpg", "/tmp/out.png"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_args_with_matting() {
        let args = rembg_args(&request(true));
        let expected: Vec<OsString> = [
            "-m",
            "rembg.cli",
            "i",
            "-m",
            "isnet-anime",
            "-a",
            "-ae",
            "15",
            "/tmp/in.jpg",
            "/tmp/out.png",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_failure_message() {
        assert_eq!(failure_message(b"model not found\n"), "model not found");
        assert_eq!(failure_message(b""), GENERIC_FAILURE_MESSAGE);
        assert_eq!(failure_message(b"  \n"), GENERIC_FAILURE_MESSAGE);
        assert_eq!(failure_message(b"bad \xff\xfebyte"), "bad byte");
    }

    #[test]
    fn test_failure_message_keeps_encoded_replacement_char() {
        let stderr = "decode \u{FFFD} error".as_bytes();
        assert_eq!(failure_message(stderr), "decode \u{FFFD} error");

        let mut mixed = b"cut \xc3".to_vec();
        mixed.extend_from_slice("\u{FFFD} kept".as_bytes());
        assert_eq!(failure_message(&mixed), "cut \u{FFFD} kept");
    }

    #[test]
    fn test_from_config_resolves_executable() {
        let config = PipelineConfig::builder()
            .segmenter_executable("/opt/rembg/python")
            .segmenter_timeout_secs(Some(30))
            .build()
            .unwrap();
        let segmenter = RembgSegmenter::from_config(&config);
        assert_eq!(segmenter.executable(), Path::new("/opt/rembg/python"));
        assert_eq!(segmenter.timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_missing_executable_fails_before_spawn() {
        let segmenter = RembgSegmenter::new("/definitely/not/here/python");
        let err = segmenter.segment(&request(false)).await.unwrap_err();
        assert!(matches!(err, BgRemovalError::ExecutableNotFound(p) if p == Path::new("/definitely/not/here/python")));
    }
}
