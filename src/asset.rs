//! # Source Asset Module
//!
//! Questo modulo rappresenta il file video scelto dall'utente.
//!
//! ## Responsabilità:
//! - Contiene nome, dimensione e byte del file selezionato
//! - Filtra i file non video (equivalente del file picker `video/*`)
//! - Carica il contenuto da disco in memoria con `tokio::fs`
//!
//! Un `SourceAsset` non viene mai modificato: una nuova selezione ne crea uno nuovo.
//!
//! ## Esempio:
//! ```ignore
//! let asset = SourceAsset::from_path(&path).await?;
//! controller.select_source(asset.clone());
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "webm", "wmv", "flv", "3gp", "mpeg", "mpg", "ogv", "ts",
];

/// A selected video file held in memory
#[derive(Debug, Clone)]
pub struct SourceAsset {
    name: String,
    bytes: Arc<[u8]>,
}

impl SourceAsset {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a video file from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        if !Self::is_video(path) {
            return Err(anyhow::anyhow!("Not a video file: {}", path.display()));
        }

        let name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .to_string();

        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Self::new(name, bytes))
    }

    /// Check if a file is a video
    pub fn is_video(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        } else {
            false
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
