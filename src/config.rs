//! Configuration types for layer background removal

use crate::error::{BgRemovalError, Result};
use crate::models::{NameOrIndex, SegmentationModel};
use crate::utils::{expand_user, ColorParser, Rgba};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Home-relative location of the Python interpreter that has rembg installed
pub const DEFAULT_SEGMENTER_EXECUTABLE: &str = "~/.rembg/bin/python";

/// Default erode size for alpha matting
pub const DEFAULT_MATTING_ERODE: u32 = 15;

/// Valid erode sizes for alpha matting
pub const MATTING_ERODE_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Default custom background color (fully transparent black)
pub const DEFAULT_BACKGROUND_COLOR: &str = "#00000000";

/// Background policy selected by `background-mode`, by name or index 0-3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "NameOrIndex")]
pub enum BackgroundMode {
    /// Keep the cutout's alpha, no background layer
    #[default]
    Transparent,
    White,
    Black,
    /// Fill with `background_color`
    Custom,
}

impl BackgroundMode {
    pub const ALL: [Self; 4] = [Self::Transparent, Self::White, Self::Black, Self::Custom];

    /// Look a mode up by its numeric option value (0..=3)
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            BgRemovalError::config_value_error("background mode", index, "0-3", Some(0))
        })
    }
}

impl TryFrom<NameOrIndex> for BackgroundMode {
    type Error = BgRemovalError;

    fn try_from(value: NameOrIndex) -> Result<Self> {
        match value {
            NameOrIndex::Index(index) => Self::from_index(index),
            NameOrIndex::Name(name) => name.parse(),
        }
    }
}

impl fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transparent => "transparent",
            Self::White => "white",
            Self::Black => "black",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl FromStr for BackgroundMode {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Unknown background mode '{}'. Available: transparent, white, black, custom",
                    s
                ))
            })
    }
}

/// Resolved background policy for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundSpec {
    Transparent,
    White,
    Black,
    Custom(Rgba),
}

impl BackgroundSpec {
    /// Combine a mode with its color string; the color is only parsed for `Custom`
    #[must_use]
    pub fn from_mode(mode: BackgroundMode, color: &str) -> Self {
        match mode {
            BackgroundMode::Transparent => Self::Transparent,
            BackgroundMode::White => Self::White,
            BackgroundMode::Black => Self::Black,
            BackgroundMode::Custom => Self::Custom(ColorParser::parse_rgba_hex(color)),
        }
    }
}

/// Configuration for one pipeline run (everything except the target drawable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PipelineConfig {
    /// Attach a mask to the cutout layer
    pub as_mask: bool,

    /// rembg model, also accepted as `model-index`
    #[serde(alias = "model-index")]
    pub model: SegmentationModel,

    /// Pass `-a` to rembg
    pub alpha_matting: bool,

    /// Erode size passed with `-ae` (1-100)
    pub matting_erode: u32,

    /// Background policy
    pub background_mode: BackgroundMode,

    /// `#RRGGBB` or `#RRGGBBAA`, used only with `BackgroundMode::Custom`
    pub background_color: String,

    /// Resize the canvas to a centered square afterwards
    pub make_square: bool,

    /// Run over every open document instead of the current one
    pub process_all_open: bool,

    /// Python interpreter with rembg installed
    #[serde(alias = "segmenter-executable-path")]
    pub segmenter_executable: PathBuf,

    /// Kill the segmenter after this many seconds (None = wait indefinitely)
    pub segmenter_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            as_mask: false,
            model: SegmentationModel::default(),
            alpha_matting: false,
            matting_erode: DEFAULT_MATTING_ERODE,
            background_mode: BackgroundMode::default(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            make_square: false,
            process_all_open: false,
            segmenter_executable: default_segmenter_executable(),
            segmenter_timeout_secs: None,
        }
    }
}

/// Default segmenter path with the home directory already expanded
#[must_use]
pub fn default_segmenter_executable() -> PathBuf {
    expand_user(DEFAULT_SEGMENTER_EXECUTABLE)
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use layer_bgremove::{BackgroundMode, PipelineConfig, SegmentationModel};
    ///
    /// let config = PipelineConfig::builder()
    ///     .model(SegmentationModel::IsNetGeneralUse)
    ///     .background_mode(BackgroundMode::Custom)
    ///     .background_color("#112233cc")
    ///     .make_square(true)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.make_square);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; absent keys keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges of numeric parameters
    pub fn validate(&self) -> Result<()> {
        if !MATTING_ERODE_RANGE.contains(&self.matting_erode) {
            return Err(BgRemovalError::config_value_error(
                "matting erode",
                self.matting_erode,
                "1-100",
                Some(DEFAULT_MATTING_ERODE),
            ));
        }

        if self.segmenter_timeout_secs == Some(0) {
            return Err(BgRemovalError::invalid_config(
                "segmenter timeout must be at least one second",
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn background_spec(&self) -> BackgroundSpec {
        BackgroundSpec::from_mode(self.background_mode, &self.background_color)
    }

    #[must_use]
    pub fn segmenter_timeout(&self) -> Option<Duration> {
        self.segmenter_timeout_secs.map(Duration::from_secs)
    }

    /// Segmenter path with an empty value replaced by the default and `~` expanded
    #[must_use]
    pub fn resolved_segmenter_executable(&self) -> PathBuf {
        if self.segmenter_executable.as_os_str().is_empty() {
            default_segmenter_executable()
        } else {
            expand_user(&self.segmenter_executable)
        }
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl From<PipelineConfig> for PipelineConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from a file
    fn from(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn as_mask(mut self, as_mask: bool) -> Self {
        self.config.as_mask = as_mask;
        self
    }

    #[must_use]
    pub fn model(mut self, model: SegmentationModel) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.config.alpha_matting = enabled;
        self
    }

    #[must_use]
    pub fn matting_erode(mut self, erode: u32) -> Self {
        self.config.matting_erode = erode;
        self
    }

    #[must_use]
    pub fn background_mode(mut self, mode: BackgroundMode) -> Self {
        self.config.background_mode = mode;
        self
    }

    #[must_use]
    pub fn background_color<S: Into<String>>(mut self, color: S) -> Self {
        self.config.background_color = color.into();
        self
    }

    #[must_use]
    pub fn make_square(mut self, make_square: bool) -> Self {
        self.config.make_square = make_square;
        self
    }

    #[must_use]
    pub fn process_all_open(mut self, all: bool) -> Self {
        self.config.process_all_open = all;
        self
    }

    #[must_use]
    pub fn segmenter_executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmenter_executable = path.into();
        self
    }

    #[must_use]
    pub fn segmenter_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.segmenter_timeout_secs = secs;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Erode size outside 1-100
    /// - Zero-second timeout
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
