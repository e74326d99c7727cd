//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del compressore.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri del compressore
//! - Valida i parametri prima dell'avvio
//! - Carica/salva la configurazione da/verso file JSON
//! - Fornisce valori di default sensati
//!
//! ## Parametri di configurazione:
//! - `preset`: livello di compressione (light, medium, strong; default: medium)
//! - `ffmpeg_path`: percorso esplicito del binario FFmpeg (default: ricerca automatica)
//! - `output_dir`: dove salvare `compressed_<nome>` (default: accanto al file originale)
//! - `json_output`: messaggi JSON su stdout al posto della progress bar
//!
//! I flag da riga di comando sovrascrivono i valori letti dal file.
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     preset: QualityPreset::Strong,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::preset::QualityPreset;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the compressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compression level used when none is given on the command line
    pub preset: QualityPreset,
    /// Explicit ffmpeg executable
    pub ffmpeg_path: Option<PathBuf>,
    /// Directory for compressed files (None = next to the source)
    pub output_dir: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preset: QualityPreset::default(),
            ffmpeg_path: None,
            output_dir: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("video-compressor").join("config.json"))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if let Some(ref ffmpeg_path) = self.ffmpeg_path {
            if !ffmpeg_path.is_file() {
                return Err(anyhow::anyhow!("ffmpeg path does not exist: {}", ffmpeg_path.display()));
            }
        }

        if let Some(ref output_dir) = self.output_dir {
            if !output_dir.exists() {
                return Err(anyhow::anyhow!("Output path does not exist: {}", output_dir.display()));
            }
            if !output_dir.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_dir.display()));
            }
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Directory the compressed copy of `source` is written to
    pub fn output_dir_for(&self, source: &Path) -> PathBuf {
        match self.output_dir {
            Some(ref dir) => dir.clone(),
            None => source
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
