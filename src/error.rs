//! # Error Types Module
//!
//! Questo modulo definisce gli errori che il controller espone al livello di presentazione.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` con le tre categorie di errore di una sessione
//! - Traduce gli errori `anyhow` del motore in errori tipizzati al confine del controller
//! - Fornisce messaggi leggibili per l'utente finale
//!
//! ## Categorie di errori:
//! - `InvalidInput`: nessun file selezionato, file vuoto, sessione già attiva
//! - `EngineLoad`: il motore FFmpeg non si è inizializzato
//! - `Encoding`: scrittura, esecuzione o lettura nel motore fallita
//!
//! Gli errori sono `Clone` perché viaggiano dentro gli snapshot di `SessionState`.
//!
//! ## Esempio:
//! ```ignore
//! if asset.is_empty() {
//!     return Err(CompressError::InvalidInput("selected file is empty".to_string()));
//! }
//! ```

/// Errors surfaced by the engine lifecycle manager and the session controller
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Engine load error: {0}")]
    EngineLoad(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CompressError {
    /// Wrap an engine-boundary failure, keeping the whole context chain
    pub fn encoding(err: anyhow::Error) -> Self {
        Self::Encoding(format!("{:#}", err))
    }

    /// Short machine-readable name of the error category
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EngineLoad(_) => "engine_load",
            Self::Encoding(_) => "encoding",
        }
    }

    /// Message shown to the user in place of the raw cause
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Select a video file to compress.",
            Self::EngineLoad(_) => "Failed to load FFmpeg. Please try again.",
            Self::Encoding(_) => "Compression failed. Please try again.",
        }
    }
}
