//! # Progress Rendering Module
//!
//! Disegna sul terminale gli snapshot pubblicati dal controller.
//!
//! ## Componenti:
//! - `ProgressManager`: progress bar `indicatif` da 0 a 100
//! - `spinner()`: spinner per operazioni senza percentuale (caricamento motore)
//! - `follow()`: task che consuma gli snapshot finché la sessione non termina
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------]  61% Processing video... 61%
//! ```

use crate::state::SessionState;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

/// Manages the progress bar of one session
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Reflect a snapshot on the bar; returns true once the session is over
    pub fn apply(&self, state: &SessionState) -> bool {
        self.bar.set_position(state.percent() as u64);
        match state {
            SessionState::Completed { .. } => {
                self.bar.set_position(100);
                self.bar.finish_with_message(state.message());
                true
            }
            SessionState::Failed { .. } => {
                self.bar.abandon_with_message(state.message());
                true
            }
            _ => {
                self.bar.set_message(state.message());
                false
            }
        }
    }

    /// Consume snapshots in the background until the session finishes
    pub fn follow(self, mut events: broadcast::Receiver<SessionState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(state) => {
                        if self.apply(&state) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Progress display skipped {} updates", skipped);
                    }
                    Err(RecvError::Closed) => {
                        self.bar.abandon();
                        break;
                    }
                }
            }
        })
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}
