//! Image I/O operations service
//!
//! This module separates file I/O operations from document logic,
//! making the host and pipeline easier to test.

use crate::error::{BgRemovalError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// JPEG quality used for hand-off exports
pub const JPEG_QUALITY: u8 = 90;

/// File formats the host can write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    Png,
    /// JPEG (no transparency)
    Jpeg,
    /// TIFF with alpha channel transparency
    Tiff,
}

impl OutputFormat {
    /// Pick a format from the file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(BgRemovalError::invalid_config(format!(
                "Unsupported output format for '{}': expected .png, .jpg/.jpeg or .tif/.tiff",
                path.display()
            ))),
        }
    }

    #[must_use]
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the data.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(BgRemovalError::from)
            },
        }
    }

    /// Save an image, creating the parent directory if needed
    ///
    /// JPEG output is encoded at [`JPEG_QUALITY`] and drops any alpha channel.
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        match format {
            OutputFormat::Png => image.save_with_format(path_ref, image::ImageFormat::Png)?,
            OutputFormat::Tiff => image.save_with_format(path_ref, image::ImageFormat::Tiff)?,
            OutputFormat::Jpeg => {
                let file = File::create(path_ref)
                    .map_err(|e| BgRemovalError::file_io_error("create", path_ref, &e))?;
                let mut writer = BufWriter::new(file);
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&rgb)?;
                writer
                    .flush()
                    .map_err(|e| BgRemovalError::file_io_error("write", path_ref, &e))?;
            },
        }

        debug!(path = %path_ref.display(), format = ?format, "Saved image");
        Ok(())
    }

    /// Check if a file path has a readable image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| {
                matches!(
                    ext.as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("test.jpg"));
        assert!(ImageIOService::is_supported_format("test.JPEG"));
        assert!(ImageIOService::is_supported_format("test.png"));
        assert!(ImageIOService::is_supported_format("test.tif"));

        assert!(!ImageIOService::is_supported_format("test.txt"));
        assert!(!ImageIOService::is_supported_format("test"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(OutputFormat::from_path("a/b.PNG").unwrap(), OutputFormat::Png);
        assert_eq!(OutputFormat::from_path("x.jpeg").unwrap(), OutputFormat::Jpeg);
        assert!(!OutputFormat::Jpeg.supports_alpha());
        assert!(OutputFormat::from_path("x.gif").is_err());
        assert!(OutputFormat::from_path("noext").is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ImageIOService::load_image("/nonexistent/image.png");
        assert!(matches!(result, Err(BgRemovalError::Io(_))));
    }

    #[test]
    fn test_png_keeps_alpha_and_jpeg_drops_it() {
        let dir = tempdir().unwrap();
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 40])));

        let png = dir.path().join("nested").join("out.png");
        ImageIOService::save_image(&image, &png, OutputFormat::Png).unwrap();
        let loaded = ImageIOService::load_image(&png).unwrap();
        assert!(loaded.color().has_alpha());
        assert_eq!(loaded.to_rgba8().get_pixel(2, 1).0, [10, 20, 30, 40]);

        let jpg = dir.path().join("out.jpg");
        ImageIOService::save_image(&image, &jpg, OutputFormat::Jpeg).unwrap();
        let loaded = ImageIOService::load_image(&jpg).unwrap();
        assert!(!loaded.color().has_alpha());
        assert_eq!((loaded.width(), loaded.height()), (3, 2));
    }

    #[test]
    fn test_content_sniffing_fallback() {
        let dir = tempdir().unwrap();
        let png = dir.path().join("real.png");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4])));
        ImageIOService::save_image(&image, &png, OutputFormat::Png).unwrap();

        let mislabeled = dir.path().join("mislabeled.jpg");
        std::fs::copy(&png, &mislabeled).unwrap();
        let loaded = ImageIOService::load_image(&mislabeled).unwrap();
        assert_eq!(loaded.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 4]);
    }
}
