//! # Quality Presets
//!
//! The three compression levels offered to the user. Each maps to an x264 CRF
//! value; a lower CRF keeps more quality and produces a larger file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named quality/size tradeoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Light,
    #[default]
    Medium,
    Strong,
}

impl QualityPreset {
    /// CRF value passed to the encoder
    pub fn crf(self) -> u8 {
        match self {
            Self::Light => 24,
            Self::Medium => 28,
            Self::Strong => 32,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::Medium => "Medium",
            Self::Strong => "Strong",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Light => "Slight compression, best quality",
            Self::Medium => "Balanced size vs. quality",
            Self::Strong => "Maximum compression, smaller file",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (CRF {})", self.label(), self.crf())
    }
}
