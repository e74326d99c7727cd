//! # Engine Lifecycle Module
//!
//! Questo modulo possiede l'unica istanza del motore di codifica e ne gestisce il caricamento.
//!
//! ## Responsabilità:
//! - Caricamento pigro del motore, al massimo una volta alla volta
//! - I chiamanti concorrenti attendono lo stesso caricamento in corso
//! - Registrazione dei sink di log e di progresso (una sola volta)
//! - Esposizione dello stato di prontezza al resto dell'applicazione
//!
//! ## Stati:
//! ```text
//! Uninitialized ──▶ Loading ──▶ Ready
//!                      │
//!                      └──────▶ Failed ──▶ (nuovo tentativo con ensure_ready)
//! ```
//!
//! Un fallimento non viene ritentato automaticamente: la chiamata successiva a
//! `ensure_ready()` avvia un nuovo tentativo.

use crate::engine::{Channel, CodecEngine, EngineEvent, Subscription};
use crate::error::CompressError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

type LoadFuture = Shared<BoxFuture<'static, Result<(), String>>>;

enum LoadState {
    Uninitialized,
    Loading(LoadFuture),
    Ready,
    Failed(String),
}

/// Public view of the engine's load state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Loading,
    Ready,
    Failed(String),
}

/// Owns the process-wide codec engine and its load state
pub struct EngineManager {
    engine: Arc<dyn CodecEngine>,
    state: Arc<Mutex<LoadState>>,
    sinks: Mutex<Vec<Subscription>>,
}

impl EngineManager {
    pub fn new(engine: Arc<dyn CodecEngine>) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(LoadState::Uninitialized)),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// The managed engine
    pub fn engine(&self) -> &Arc<dyn CodecEngine> {
        &self.engine
    }

    /// Make sure the engine is loaded, sharing any load already in flight
    pub async fn ensure_ready(&self) -> Result<(), CompressError> {
        let pending = {
            let mut state = self.state.lock().await;
            match &*state {
                LoadState::Ready => return Ok(()),
                LoadState::Loading(pending) => {
                    debug!("Engine load already in progress, waiting for it");
                    pending.clone()
                }
                LoadState::Uninitialized | LoadState::Failed(_) => {
                    self.register_sinks().await;
                    let pending = self.start_load();
                    *state = LoadState::Loading(pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(CompressError::EngineLoad)
    }

    fn start_load(&self) -> LoadFuture {
        info!("Loading codec engine...");
        let engine = self.engine.clone();
        let state = self.state.clone();

        async move {
            let outcome = engine.load().await.map_err(|e| format!("{:#}", e));
            let mut state = state.lock().await;
            match outcome {
                Ok(()) => {
                    info!("Codec engine loaded successfully");
                    *state = LoadState::Ready;
                    Ok(())
                }
                Err(message) => {
                    warn!("Failed to load codec engine: {}", message);
                    *state = LoadState::Failed(message.clone());
                    Err(message)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn register_sinks(&self) {
        let mut sinks = self.sinks.lock().await;
        if !sinks.is_empty() {
            return;
        }

        sinks.push(self.engine.on(
            Channel::Log,
            Arc::new(|event: &EngineEvent| {
                if let EngineEvent::Log(line) = event {
                    debug!(target: "ffmpeg", "{}", line);
                }
            }),
        ));
        sinks.push(self.engine.on(
            Channel::Progress,
            Arc::new(|event: &EngineEvent| {
                if let EngineEvent::Progress(fraction) = event {
                    trace!(target: "ffmpeg", "progress {:.3}", fraction);
                }
            }),
        ));
    }

    /// Current load state
    pub async fn readiness(&self) -> Readiness {
        match &*self.state.lock().await {
            LoadState::Uninitialized => Readiness::Uninitialized,
            LoadState::Loading(_) => Readiness::Loading,
            LoadState::Ready => Readiness::Ready,
            LoadState::Failed(message) => Readiness::Failed(message.clone()),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, LoadState::Ready)
    }

    /// Unregister the diagnostic sinks. The engine itself stays loaded.
    pub async fn dispose(&self) {
        for subscription in self.sinks.lock().await.drain(..) {
            self.engine.off(subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_ensure_ready_loads_once() {
        let engine = Arc::new(FakeEngine::new().with_load_delay(Duration::from_millis(20)));
        let manager = EngineManager::new(engine.clone());

        let (first, second) = tokio::join!(manager.ensure_ready(), manager.ensure_ready());

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.readiness().await, Readiness::Ready);

        // Already ready: no further loads
        manager.ensure_ready().await.unwrap();
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_load_delay(Duration::from_millis(20))
                .failing_loads(1),
        );
        let manager = EngineManager::new(engine.clone());

        let (first, second) = tokio::join!(manager.ensure_ready(), manager.ensure_ready());

        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(first, Err(CompressError::EngineLoad(_))));
        assert_eq!(first, second);
        assert!(!manager.is_ready().await);
        assert!(matches!(manager.readiness().await, Readiness::Failed(_)));
    }

    #[tokio::test]
    async fn test_retry_after_failure() {
        let engine = Arc::new(FakeEngine::new().failing_loads(1));
        let manager = EngineManager::new(engine.clone());

        tokio_test::assert_err!(manager.ensure_ready().await);
        tokio_test::assert_ok!(manager.ensure_ready().await);
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 2);
        assert!(manager.is_ready().await);
    }

    #[tokio::test]
    async fn test_sinks_registered_once_and_disposed() {
        let engine = Arc::new(FakeEngine::new().failing_loads(1));
        let manager = EngineManager::new(engine.clone());

        let _ = manager.ensure_ready().await;
        let _ = manager.ensure_ready().await;
        assert_eq!(engine.listeners.count(Channel::Log), 1);
        assert_eq!(engine.listeners.count(Channel::Progress), 1);

        manager.dispose().await;
        assert_eq!(engine.listeners.count(Channel::Log), 0);
        assert_eq!(engine.listeners.count(Channel::Progress), 0);
    }
}
