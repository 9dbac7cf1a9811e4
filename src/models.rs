//! Segmentation models understood by rembg

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// rembg model selection, in the order of the `model-index` option
///
/// Deserializes from a rembg name or from its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "NameOrIndex")]
pub enum SegmentationModel {
    /// General purpose U²-Net
    #[default]
    #[serde(rename = "u2net")]
    U2Net,
    #[serde(rename = "u2net_human_seg")]
    U2NetHumanSeg,
    #[serde(rename = "u2net_cloth_seg")]
    U2NetClothSeg,
    /// Lightweight U²-Net
    #[serde(rename = "u2netp")]
    U2NetP,
    #[serde(rename = "silueta")]
    Silueta,
    #[serde(rename = "isnet-general-use")]
    IsNetGeneralUse,
    #[serde(rename = "isnet-anime")]
    IsNetAnime,
    /// Segment Anything
    #[serde(rename = "sam")]
    Sam,
}

impl SegmentationModel {
    /// All models in index order
    pub const ALL: [Self; 8] = [
        Self::U2Net,
        Self::U2NetHumanSeg,
        Self::U2NetClothSeg,
        Self::U2NetP,
        Self::Silueta,
        Self::IsNetGeneralUse,
        Self::IsNetAnime,
        Self::Sam,
    ];

    /// Look a model up by its `model-index` (0..=7)
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            BgRemovalError::config_value_error(
                "model index",
                index,
                &format!("0-{}", Self::ALL.len() - 1),
                Some(0),
            )
        })
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name passed to `rembg -m`
    #[must_use]
    pub fn rembg_name(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::U2NetClothSeg => "u2net_cloth_seg",
            Self::U2NetP => "u2netp",
            Self::Silueta => "silueta",
            Self::IsNetGeneralUse => "isnet-general-use",
            Self::IsNetAnime => "isnet-anime",
            Self::Sam => "sam",
        }
    }
}

/// Config value given either as a name or as a numeric index
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum NameOrIndex {
    Index(usize),
    Name(String),
}

impl TryFrom<NameOrIndex> for SegmentationModel {
    type Error = BgRemovalError;

    fn try_from(value: NameOrIndex) -> Result<Self> {
        match value {
            NameOrIndex::Index(index) => Self::from_index(index),
            NameOrIndex::Name(name) => name.parse(),
        }
    }
}

impl fmt::Display for SegmentationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rembg_name())
    }
}

impl FromStr for SegmentationModel {
    type Err = BgRemovalError;

    /// Accepts a rembg model name or a numeric index
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.rembg_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|m| m.rembg_name()).collect();
                BgRemovalError::invalid_config(format!(
                    "Unknown model '{}'. Available: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}
