//! # Local Video Compressor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `engine`: Contratto con il motore di codifica e implementazione FFmpeg nativa
//! - `lifecycle`: Caricamento pigro e condiviso del motore
//! - `session`: Controller di una sessione di compressione
//! - `state`: Snapshot di stato pubblicati verso la presentazione
//! - `resource`: Handle scaricabili dei risultati (equivalente degli object URL)
//! - `asset`: File sorgente selezionato
//! - `preset` / `command`: Livelli di qualità e template degli argomenti
//! - `config`, `error`, `format`, `progress`, `json_output`, `tool_resolver`
//!
//! ## Utilizzo:
//! ```ignore
//! use local_video_compressor::{EngineManager, FfmpegEngine, QualityPreset, SessionController, SourceAsset};
//!
//! let manager = Arc::new(EngineManager::new(Arc::new(FfmpegEngine::default())));
//! let controller = SessionController::new(manager);
//! controller.select_source(SourceAsset::from_path(&path).await?);
//! let result = controller.compress_selected(QualityPreset::Medium).await?;
//! ```

pub mod asset;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod json_output;
pub mod lifecycle;
pub mod preset;
pub mod progress;
pub mod resource;
pub mod session;
pub mod state;
pub mod tool_resolver;

pub use asset::SourceAsset;
pub use config::Config;
pub use engine::{CodecEngine, FfmpegEngine};
pub use error::CompressError;
pub use lifecycle::{EngineManager, Readiness};
pub use preset::QualityPreset;
pub use resource::{ObjectUrl, ObjectUrlRegistry};
pub use session::SessionController;
pub use state::{PrimaryAction, SessionState, TranscodeResult};
