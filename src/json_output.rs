//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico.
//!
//! ## Responsabilità:
//! - Converte gli snapshot di `SessionState` in messaggi JSON su stdout
//! - Una riga per messaggio, così un processo esterno può seguire la sessione
//! - `follow()`: task che inoltra gli snapshot finché la sessione è attiva
//!
//! ## Tipi di messaggi:
//! - `engine`: stato di caricamento del motore
//! - `idle` / `staging` / `progress`: avanzamento della sessione
//! - `complete`: dimensioni, riduzione e file salvato
//! - `error`: categoria e messaggio dell'errore

use crate::format;
use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Stato del motore
    #[serde(rename = "engine")]
    Engine { status: String, message: Option<String> },

    #[serde(rename = "idle")]
    Idle,

    /// Sorgente in scrittura nel motore
    #[serde(rename = "staging")]
    Staging,

    /// Avanzamento della codifica; `percent` assente finché il motore non riporta nulla
    #[serde(rename = "progress")]
    Progress { percent: Option<u8> },

    /// Sessione completata
    #[serde(rename = "complete")]
    Complete {
        source: String,
        preset: String,
        crf: u8,
        original_size: u64,
        compressed_size: u64,
        reduction_percent: Option<f64>,
        download_name: String,
        saved_to: Option<PathBuf>,
    },

    /// Errore
    #[serde(rename = "error")]
    Error { kind: String, message: String, details: String },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn engine(status: &str, message: Option<String>) -> Self {
        Self::Engine {
            status: status.to_string(),
            message,
        }
    }

    /// Snapshot di sessione → messaggio
    pub fn from_state(state: &SessionState) -> Self {
        match state {
            SessionState::Idle => Self::Idle,
            SessionState::Staging => Self::Staging,
            SessionState::Encoding { progress } => Self::Progress { percent: *progress },
            SessionState::Completed { result } => Self::Complete {
                source: result.source_name.clone(),
                preset: result.preset.label().to_lowercase(),
                crf: result.preset.crf(),
                original_size: result.original_size,
                compressed_size: result.compressed_size,
                reduction_percent: format::calculate_reduction(result.original_size, result.compressed_size),
                download_name: result.download_name(),
                saved_to: None,
            },
            SessionState::Failed { error } => Self::Error {
                kind: error.kind().to_string(),
                message: error.user_message().to_string(),
                details: error.to_string(),
            },
        }
    }

    /// Record where the result was written
    pub fn with_saved_path(mut self, path: PathBuf) -> Self {
        if let Self::Complete { ref mut saved_to, .. } = self {
            *saved_to = Some(path);
        }
        self
    }
}

/// Emit every active snapshot as a JSON line, in the background
pub fn follow(events: broadcast::Receiver<SessionState>) -> JoinHandle<()> {
    tokio::spawn(forward(events, |message| message.emit()))
}

/// Hand active snapshots to `sink` until the session leaves the active states
pub async fn forward(mut events: broadcast::Receiver<SessionState>, mut sink: impl FnMut(JsonMessage)) {
    loop {
        match events.recv().await {
            Ok(state) if state.is_active() => sink(JsonMessage::from_state(&state)),
            Ok(_) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(skipped)) => {
                debug!("JSON output skipped {} updates", skipped);
            }
        }
    }
}
