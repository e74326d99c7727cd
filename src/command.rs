//! # Encoder Command Template
//!
//! Builds the fixed argument list handed to the codec engine's `exec`. Only the
//! CRF value varies between runs; input and output names are the fixed entries
//! of the engine's private filesystem.

use crate::preset::QualityPreset;

/// Name under which the source bytes are staged
pub const INPUT_NAME: &str = "input.mp4";
/// Name the encoder writes its result to
pub const OUTPUT_NAME: &str = "output.mp4";
/// MIME type of the produced container
pub const OUTPUT_MIME: &str = "video/mp4";

/// Build a `Vec<String>` from mixed string-like and numeric items.
///
/// ```ignore
/// let crf = 28;
/// let args = argv!["-crf", crf, "-preset", "fast"];
/// ```
#[macro_export]
macro_rules! argv {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}

/// One encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    pub input: &'static str,
    pub output: &'static str,
    pub crf: u8,
}

impl TranscodeCommand {
    pub fn for_preset(preset: QualityPreset) -> Self {
        Self {
            input: INPUT_NAME,
            output: OUTPUT_NAME,
            crf: preset.crf(),
        }
    }

    /// H.264 at the preset's CRF, fast speed preset, moov atom moved to the front
    pub fn to_argv(&self) -> Vec<String> {
        argv![
            "-i", self.input,
            "-vcodec", "libx264",
            "-crf", self.crf,
            "-preset", "fast",
            "-movflags", "+faststart",
            self.output,
        ]
    }
}
