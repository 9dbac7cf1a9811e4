//! Scratch files shared with the segmenter

use crate::error::{BgRemovalError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// File name of the exported layer
pub const EXPORT_FILE_NAME: &str = "Temp-bgremove-0000.jpg";

/// File name the segmenter writes its cutout to
pub const CUTOUT_FILE_NAME: &str = "Temp-bgremove-0000.png";

/// Per-run scratch directory holding the export and the cutout.
///
/// Everything is removed by [`HandoffFiles::cleanup`] or, failing that, on drop.
#[derive(Debug)]
pub struct HandoffFiles {
    dir: Option<TempDir>,
    input: PathBuf,
    output: PathBuf,
}

impl HandoffFiles {
    /// Create a fresh directory under the system temp dir
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("bgremove-")
            .tempdir()
            .map_err(|e| BgRemovalError::file_io_error("create", std::env::temp_dir(), &e))?;
        Ok(Self::from_dir(dir))
    }

    /// Create a fresh directory under `parent`
    pub fn new_in<P: AsRef<Path>>(parent: P) -> Result<Self> {
        let parent = parent.as_ref();
        let dir = tempfile::Builder::new()
            .prefix("bgremove-")
            .tempdir_in(parent)
            .map_err(|e| BgRemovalError::file_io_error("create", parent, &e))?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        let input = dir.path().join(EXPORT_FILE_NAME);
        let output = dir.path().join(CUTOUT_FILE_NAME);
        debug!(dir = %dir.path().display(), "Created hand-off directory");
        Self {
            dir: Some(dir),
            input,
            output,
        }
    }

    /// Where the exported layer is written
    #[must_use]
    pub fn input_path(&self) -> &Path {
        &self.input
    }

    /// Where the segmenter writes the cutout
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// The scratch directory itself
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Delete both files and the directory
    pub fn cleanup(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()
                    .map_err(|e| BgRemovalError::file_io_error("remove", &path, &e))?;
                debug!(dir = %path.display(), "Removed hand-off directory");
                Ok(())
            },
            None => Ok(()),
        }
    }
}

impl Drop for HandoffFiles {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Failed to clean up hand-off files: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_use_fixed_names() {
        let parent = tempdir().unwrap();
        let files = HandoffFiles::new_in(parent.path()).unwrap();
        assert_eq!(files.input_path().file_name().unwrap(), EXPORT_FILE_NAME);
        assert_eq!(files.output_path().file_name().unwrap(), CUTOUT_FILE_NAME);
        assert_eq!(files.input_path().parent(), files.dir());
    }

    #[test]
    fn test_cleanup_removes_files() {
        let parent = tempdir().unwrap();
        let mut files = HandoffFiles::new_in(parent.path()).unwrap();
        std::fs::write(files.input_path(), b"jpg").unwrap();
        std::fs::write(files.output_path(), b"png").unwrap();
        let dir = files.dir().unwrap().to_path_buf();

        files.cleanup().unwrap();
        assert!(!dir.exists());
        assert!(files.dir().is_none());
        files.cleanup().unwrap();
    }

    #[test]
    fn test_drop_removes_files() {
        let parent = tempdir().unwrap();
        let dir = {
            let files = HandoffFiles::new_in(parent.path()).unwrap();
            std::fs::write(files.output_path(), b"png").unwrap();
            files.dir().unwrap().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_runs_do_not_share_directories() {
        let a = HandoffFiles::new().unwrap();
        let b = HandoffFiles::new().unwrap();
        assert_ne!(a.input_path(), b.input_path());
    }
}
