//! # Session State Module
//!
//! Questo modulo definisce gli snapshot di stato pubblicati dal controller.
//!
//! ## Strutture dati:
//! - `SessionState`: Idle | Staging | Encoding | Completed | Failed
//! - `TranscodeResult`: buffer compresso, dimensioni e handle scaricabile
//! - `StatePublisher`: pubblica gli snapshot a chi è in ascolto
//! - `PrimaryAction`: etichetta e abilitazione del pulsante principale
//!
//! ## Canali:
//! - `watch`: ultimo snapshot, per chi vuole solo lo stato corrente
//! - `broadcast`: ogni snapshot in ordine, per chi disegna l'avanzamento
//!
//! L'avanzamento è un `Option<u8>`: `None` significa "nessun progresso riportato
//! ancora", distinto da `Some(0)`.

use crate::error::CompressError;
use crate::format;
use crate::preset::QualityPreset;
use crate::resource::ObjectUrl;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Capacity of the snapshot stream before slow receivers start lagging
const EVENT_CAPACITY: usize = 256;

/// Output of a successful session
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub source_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub preset: QualityPreset,
    pub url: ObjectUrl,
    pub data: Arc<[u8]>,
}

impl TranscodeResult {
    /// File name offered for download
    pub fn download_name(&self) -> String {
        format!("compressed_{}", self.source_name)
    }

    pub fn compression_ratio(&self) -> String {
        format::compression_ratio(self.original_size, self.compressed_size)
    }
}

/// Snapshot of the session state machine
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Staging,
    Encoding { progress: Option<u8> },
    Completed { result: TranscodeResult },
    Failed { error: CompressError },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staging => "staging",
            Self::Encoding { .. } => "encoding",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// True while a session owns the engine
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Staging | Self::Encoding { .. })
    }

    /// Last progress reported by the engine, if any
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::Encoding { progress } => *progress,
            _ => None,
        }
    }

    /// Progress for a bar: 0 unless the engine reported something
    pub fn percent(&self) -> u8 {
        self.progress().unwrap_or(0)
    }

    /// Status line for the user; empty when there is nothing to say
    pub fn message(&self) -> String {
        match self {
            Self::Idle => String::new(),
            Self::Staging => "Starting compression...".to_string(),
            Self::Encoding { progress: None } => "Processing video...".to_string(),
            Self::Encoding { progress: Some(p) } => format!("Processing video... {}%", p),
            Self::Completed { .. } => "Compression completed!".to_string(),
            Self::Failed { error } => error.user_message().to_string(),
        }
    }
}

/// Fraction reported by the engine to a whole percentage
pub fn fraction_to_percent(fraction: f64) -> u8 {
    // NaN saturates to 0 in the cast
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Publishes session snapshots
pub struct StatePublisher {
    current: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionState>,
}

impl StatePublisher {
    pub fn new() -> Self {
        let (current, _) = watch::channel(SessionState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { current, events }
    }

    pub fn publish(&self, state: SessionState) {
        self.current.send_replace(state.clone());
        // No receivers is fine
        let _ = self.events.send(state);
    }

    /// Replace the progress of an encoding session; ignored in any other state
    pub fn update_progress(&self, percent: u8) {
        let mut changed = None;
        self.current.send_if_modified(|state| match state {
            SessionState::Encoding { progress } if *progress != Some(percent) => {
                *progress = Some(percent);
                changed = Some(state.clone());
                true
            }
            _ => false,
        });
        if let Some(state) = changed {
            let _ = self.events.send(state);
        }
    }

    pub fn current(&self) -> SessionState {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.current.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// What the primary button does right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Initialize,
    Compress,
    Compressing,
}

impl PrimaryAction {
    pub fn resolve(engine_ready: bool, session_active: bool) -> Self {
        if !engine_ready {
            Self::Initialize
        } else if session_active {
            Self::Compressing
        } else {
            Self::Compress
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Initialize => "Initialize Engine",
            Self::Compress => "Compress Video",
            Self::Compressing => "Compressing...",
        }
    }
}
