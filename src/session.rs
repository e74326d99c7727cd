//! # Transcode Session Controller
//!
//! Questo è il modulo che orchestra una singola compressione.
//!
//! ## Responsabilità:
//! - Garantisce una sola sessione attiva alla volta
//! - Assicura che il motore sia caricato (tramite `EngineManager`)
//! - Scrive il sorgente nel filesystem virtuale, esegue il job, legge il risultato
//! - Converte l'avanzamento frazionario del motore in percentuale
//! - Crea l'handle scaricabile del risultato e revoca quello precedente
//! - Pulisce file virtuali e osservatore di progresso su ogni percorso di uscita
//!
//! ## Flusso di una sessione:
//! 1. **Validazione**: asset non vuoto, nessuna sessione attiva
//! 2. **Motore**: `ensure_ready()`, altrimenti `Failed(EngineLoad)`
//! 3. **Staging**: `write_file("input.mp4")`
//! 4. **Encoding**: osservatore di progresso + `exec` con il template fisso
//! 5. **Risultato**: `read_file("output.mp4")` → `ObjectUrl` → `Completed`
//! 6. **Pulizia**: rimozione osservatore, `delete_file` di input e output
//!
//! ## Error handling:
//! - Ogni errore del motore viene tradotto in `CompressError`
//! - Dopo un errore la sessione può ripartire subito
//!
//! ## Esempio:
//! ```ignore
//! let controller = SessionController::new(Arc::new(EngineManager::new(engine)));
//! controller.select_source(asset);
//! let result = controller.compress_selected(QualityPreset::Medium).await?;
//! ```

use crate::asset::SourceAsset;
use crate::command::{TranscodeCommand, INPUT_NAME, OUTPUT_MIME, OUTPUT_NAME};
use crate::engine::{Channel, CodecEngine, EngineEvent, Subscription};
use crate::error::CompressError;
use crate::lifecycle::EngineManager;
use crate::preset::QualityPreset;
use crate::resource::ObjectUrlRegistry;
use crate::state::{fraction_to_percent, PrimaryAction, SessionState, StatePublisher, TranscodeResult};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Marks the controller busy for as long as it lives
struct ActiveSession<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ActiveSession<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Progress observer registration scoped to one session
struct ProgressObserver<'a> {
    engine: &'a dyn CodecEngine,
    subscription: Subscription,
}

impl<'a> ProgressObserver<'a> {
    fn register(engine: &'a dyn CodecEngine, publisher: Arc<StatePublisher>) -> Self {
        let subscription = engine.on(
            Channel::Progress,
            Arc::new(move |event: &EngineEvent| {
                if let EngineEvent::Progress(fraction) = event {
                    publisher.update_progress(fraction_to_percent(*fraction));
                }
            }),
        );
        Self { engine, subscription }
    }
}

impl Drop for ProgressObserver<'_> {
    fn drop(&mut self) {
        self.engine.off(self.subscription);
    }
}

/// Drives compression sessions against a shared engine
pub struct SessionController {
    engine: Arc<EngineManager>,
    urls: Arc<ObjectUrlRegistry>,
    publisher: Arc<StatePublisher>,
    active: AtomicBool,
    /// Bumped on every selection; a run whose selection moved on drops its result
    selection: AtomicU64,
    source: Mutex<Option<SourceAsset>>,
    result: Mutex<Option<TranscodeResult>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionController {
    pub fn new(engine: Arc<EngineManager>) -> Self {
        Self::with_registry(engine, Arc::new(ObjectUrlRegistry::new()))
    }

    pub fn with_registry(engine: Arc<EngineManager>, urls: Arc<ObjectUrlRegistry>) -> Self {
        Self {
            engine,
            urls,
            publisher: Arc::new(StatePublisher::new()),
            active: AtomicBool::new(false),
            selection: AtomicU64::new(0),
            source: Mutex::new(None),
            result: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ObjectUrlRegistry> {
        &self.urls
    }

    /// Latest published snapshot
    pub fn state(&self) -> SessionState {
        self.publisher.current()
    }

    /// Receiver of the latest snapshot only
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.publisher.watch()
    }

    /// Receiver of every snapshot published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.publisher.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Result of the last successful session, while its handle is live
    pub fn result(&self) -> Option<TranscodeResult> {
        lock(&self.result).clone()
    }

    pub fn selected_source(&self) -> Option<SourceAsset> {
        lock(&self.source).clone()
    }

    /// Replace the selected file, releasing the previous result first
    pub fn select_source(&self, asset: SourceAsset) {
        self.selection.fetch_add(1, Ordering::AcqRel);
        self.release_result();
        info!("Selected {} ({} bytes)", asset.name(), asset.len());
        *lock(&self.source) = Some(asset);
        if !self.is_active() {
            self.publisher.publish(SessionState::Idle);
        }
    }

    /// What the primary button does, and whether it is enabled
    pub async fn primary_action(&self) -> (PrimaryAction, bool) {
        let active = self.is_active();
        let action = PrimaryAction::resolve(self.engine.is_ready().await, active);
        let enabled = !active && lock(&self.source).is_some();
        (action, enabled)
    }

    /// Compress the currently selected file
    pub async fn compress_selected(&self, preset: QualityPreset) -> Result<TranscodeResult, CompressError> {
        let asset = self
            .selected_source()
            .ok_or_else(|| CompressError::InvalidInput("no file selected".to_string()))?;
        self.run_session(&asset, preset).await
    }

    /// Run one complete compression of `asset`
    ///
    /// When another file is selected while the run is in flight, the result is
    /// still returned but its handle is already revoked and the state goes back to `Idle`.
    pub async fn run_session(
        &self,
        asset: &SourceAsset,
        preset: QualityPreset,
    ) -> Result<TranscodeResult, CompressError> {
        if asset.is_empty() {
            return Err(CompressError::InvalidInput(format!("{} is empty", asset.name())));
        }
        let _active = ActiveSession::acquire(&self.active).ok_or_else(|| {
            CompressError::InvalidInput("a compression is already running".to_string())
        })?;
        let selection = self.selection.load(Ordering::Acquire);

        self.release_result();

        if let Err(err) = self.engine.ensure_ready().await {
            error!("Cannot start compression: {}", err);
            self.publisher.publish(SessionState::Failed { error: err.clone() });
            return Err(err);
        }

        info!("Compressing {} with {} preset", asset.name(), preset);
        let start_time = Instant::now();

        let outcome = self.transcode(asset, preset).await;
        self.release_workspace().await;

        match outcome {
            Ok(result) if self.selection.load(Ordering::Acquire) != selection => {
                info!("{} was deselected during compression, discarding its result", asset.name());
                self.urls.revoke(&result.url);
                self.publisher.publish(SessionState::Idle);
                Ok(result)
            }
            Ok(result) => {
                info!(
                    "Compression completed in {:.1}s: {} -> {} bytes ({})",
                    start_time.elapsed().as_secs_f64(),
                    result.original_size,
                    result.compressed_size,
                    result.compression_ratio()
                );
                *lock(&self.result) = Some(result.clone());
                self.publisher.publish(SessionState::Completed { result: result.clone() });
                Ok(result)
            }
            Err(err) => {
                let err = CompressError::encoding(err);
                error!("Compression failed after {:.1}s: {}", start_time.elapsed().as_secs_f64(), err);
                self.publisher.publish(SessionState::Failed { error: err.clone() });
                Err(err)
            }
        }
    }

    /// Stage, encode and collect. The progress observer lives exactly as long as this call.
    async fn transcode(&self, asset: &SourceAsset, preset: QualityPreset) -> anyhow::Result<TranscodeResult> {
        let engine: &dyn CodecEngine = &**self.engine.engine();

        self.publisher.publish(SessionState::Staging);
        engine
            .write_file(INPUT_NAME, asset.bytes())
            .await
            .context("failed to stage input")?;

        let _observer = ProgressObserver::register(engine, self.publisher.clone());

        self.publisher.publish(SessionState::Encoding { progress: None });
        let args = TranscodeCommand::for_preset(preset).to_argv();
        debug!("Engine command: {}", args.join(" "));
        engine.exec(&args).await.context("encoder run failed")?;

        let output = engine
            .read_file(OUTPUT_NAME)
            .await
            .context("failed to read encoder output")?;
        if output.is_empty() {
            return Err(anyhow::anyhow!("encoder produced an empty file"));
        }

        let data: Arc<[u8]> = Arc::from(output);
        let url = self.urls.create(data.clone(), OUTPUT_MIME);

        Ok(TranscodeResult {
            source_name: asset.name().to_string(),
            original_size: asset.len(),
            compressed_size: data.len() as u64,
            preset,
            url,
            data,
        })
    }

    /// Delete both virtual files, whatever happened before
    async fn release_workspace(&self) {
        let engine = self.engine.engine();
        for name in [INPUT_NAME, OUTPUT_NAME] {
            if let Err(e) = engine.delete_file(name).await {
                warn!("Could not delete engine file {}: {:#}", name, e);
            }
        }
    }

    /// Revoke the previous result's handle
    fn release_result(&self) {
        if let Some(previous) = lock(&self.result).take() {
            self.urls.revoke(&previous.url);
        }
    }

    /// Save the current result as `compressed_<name>` inside `dir`
    pub async fn download(&self, dir: &Path) -> Result<PathBuf, CompressError> {
        let result = self
            .result()
            .ok_or_else(|| CompressError::InvalidInput("no compressed video to download".to_string()))?;
        let data = self
            .urls
            .resolve(&result.url)
            .ok_or_else(|| CompressError::InvalidInput("download link has expired".to_string()))?;

        let path = dir.join(result.download_name());
        tokio::fs::write(&path, &data[..])
            .await
            .map_err(|e| CompressError::InvalidInput(format!("cannot write {}: {}", path.display(), e)))?;

        info!("Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn controller_for(engine: &Arc<FakeEngine>) -> SessionController {
        SessionController::new(Arc::new(EngineManager::new(engine.clone())))
    }

    fn drain(events: &mut broadcast::Receiver<SessionState>) -> Vec<SessionState> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    fn video(len: usize) -> SourceAsset {
        SourceAsset::new("holiday.mp4", vec![5u8; len])
    }

    #[tokio::test]
    async fn test_successful_session() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);
        let mut events = controller.subscribe();

        let result = controller
            .run_session(&video(10_000_000), QualityPreset::Medium)
            .await
            .unwrap();

        assert!(result.compressed_size > 0);
        assert_eq!(result.original_size, 10_000_000);
        assert_eq!(result.download_name(), "compressed_holiday.mp4");
        assert!(controller.registry().is_live(&result.url));
        assert!(matches!(controller.state(), SessionState::Completed { .. }));

        let states = drain(&mut events);
        assert!(matches!(states.first(), Some(SessionState::Staging)));
        assert!(matches!(states.last(), Some(SessionState::Completed { .. })));
        assert!(states.iter().any(|s| s.progress() == Some(100)));

        let args = engine.exec_args.lock().unwrap().clone();
        assert_eq!(args, vec![TranscodeCommand::for_preset(QualityPreset::Medium).to_argv()]);
        assert!(!engine.has_file(INPUT_NAME));
        assert!(!engine.has_file(OUTPUT_NAME));
    }

    #[tokio::test]
    async fn test_progress_is_republished_without_monotonicity() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);
        let mut events = controller.subscribe();

        controller.run_session(&video(300), QualityPreset::Light).await.unwrap();

        let progress: Vec<u8> = drain(&mut events).iter().filter_map(|s| s.progress()).collect();
        assert_eq!(progress, vec![0, 35, 30, 80, 100]);
    }

    #[tokio::test]
    async fn test_rejects_empty_asset() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);

        let err = controller
            .run_session(&SourceAsset::new("empty.mp4", Vec::new()), QualityPreset::Medium)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_input");
        assert!(matches!(controller.state(), SessionState::Idle));
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compress_without_selection() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);

        let err = controller.compress_selected(QualityPreset::Medium).await.unwrap_err();
        assert!(matches!(err, CompressError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_second_session_rejected_while_active() {
        let gate = Arc::new(Notify::new());
        let engine = Arc::new(FakeEngine::new().with_exec_gate(gate.clone()));
        let controller = controller_for(&engine);
        let asset = video(900);

        let (first, second) = tokio::join!(controller.run_session(&asset, QualityPreset::Strong), async {
            let mut state = controller.watch();
            state
                .wait_for(|s| s.progress() == Some(100))
                .await
                .unwrap();

            let rejected = controller.run_session(&asset, QualityPreset::Light).await;
            assert_eq!(controller.state().progress(), Some(100));
            assert!(controller.is_active());
            gate.notify_one();
            rejected
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(CompressError::InvalidInput(_))));
        assert_eq!(engine.exec_calls.load(Ordering::SeqCst), 1);
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_exec_failure_cleans_up() {
        let engine = Arc::new(FakeEngine::new().failing_exec());
        let controller = controller_for(&engine);

        let err = controller.run_session(&video(600), QualityPreset::Medium).await.unwrap_err();

        assert!(matches!(err, CompressError::Encoding(_)));
        assert!(matches!(controller.state(), SessionState::Failed { .. }));
        assert_eq!(controller.state().percent(), 0);
        assert_eq!(engine.deleted(), vec![INPUT_NAME.to_string(), OUTPUT_NAME.to_string()]);
        assert_eq!(engine.listeners.count(Channel::Progress), 1, "only the manager's sink remains");
        assert!(!engine.has_file(INPUT_NAME));
        assert_eq!(controller.registry().live_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_failure_is_accepted() {
        let engine = Arc::new(FakeEngine::new().failing_exec());
        let controller = controller_for(&engine);

        assert!(controller.run_session(&video(600), QualityPreset::Medium).await.is_err());

        engine.fail_exec.store(false, Ordering::SeqCst);
        let result = controller.run_session(&video(600), QualityPreset::Medium).await;

        assert!(result.is_ok());
        assert_eq!(engine.exec_calls.load(Ordering::SeqCst), 2);
        assert!(matches!(controller.state(), SessionState::Completed { .. }));
    }

    #[tokio::test]
    async fn test_engine_load_failure_skips_engine() {
        let engine = Arc::new(FakeEngine::new().failing_loads(1));
        let controller = controller_for(&engine);

        let err = controller.run_session(&video(600), QualityPreset::Medium).await.unwrap_err();

        assert!(matches!(err, CompressError::EngineLoad(_)));
        assert!(matches!(
            controller.state(),
            SessionState::Failed { error: CompressError::EngineLoad(_) }
        ));
        assert_eq!(engine.exec_calls.load(Ordering::SeqCst), 0);
        assert!(engine.deleted().is_empty());
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_new_selection_releases_previous_result() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);

        controller.select_source(video(900));
        let first = controller.compress_selected(QualityPreset::Medium).await.unwrap();
        assert_eq!(controller.registry().live_count(), 1);

        controller.select_source(SourceAsset::new("other.mov", vec![1u8; 300]));
        assert!(!controller.registry().is_live(&first.url));
        assert_eq!(controller.registry().live_count(), 0);
        assert!(controller.result().is_none());
        assert!(matches!(controller.state(), SessionState::Idle));

        let second = controller.compress_selected(QualityPreset::Strong).await.unwrap();
        assert_eq!(second.download_name(), "compressed_other.mov");
        assert_eq!(controller.registry().live_count(), 1);
    }

    #[tokio::test]
    async fn test_download_writes_prefixed_file() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);
        let temp_dir = TempDir::new().unwrap();

        assert!(controller.download(temp_dir.path()).await.is_err());

        let result = controller.run_session(&video(900), QualityPreset::Medium).await.unwrap();
        let path = controller.download(temp_dir.path()).await.unwrap();

        assert_eq!(path, temp_dir.path().join("compressed_holiday.mp4"));
        assert_eq!(std::fs::read(&path).unwrap().len() as u64, result.compressed_size);
    }

    #[tokio::test]
    async fn test_primary_action_follows_engine_and_selection() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);

        assert_eq!(controller.primary_action().await, (PrimaryAction::Initialize, false));

        controller.select_source(video(900));
        controller.engine().ensure_ready().await.unwrap();
        assert_eq!(controller.primary_action().await, (PrimaryAction::Compress, true));
    }

    fn assert_failed_and_cleaned(controller: &SessionController, engine: &FakeEngine, err: &CompressError) {
        assert!(matches!(err, CompressError::Encoding(_)));
        assert!(matches!(
            controller.state(),
            SessionState::Failed { error: CompressError::Encoding(_) }
        ));
        assert_eq!(controller.state().percent(), 0);
        assert_eq!(engine.deleted(), vec![INPUT_NAME.to_string(), OUTPUT_NAME.to_string()]);
        assert_eq!(engine.listeners.count(Channel::Progress), 1, "only the manager's sink remains");
        assert_eq!(controller.registry().live_count(), 0);
        assert!(controller.result().is_none());
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_staging_failure_cleans_up() {
        let engine = Arc::new(FakeEngine::new().failing_write());
        let controller = controller_for(&engine);

        let err = controller.run_session(&video(600), QualityPreset::Medium).await.unwrap_err();

        assert_failed_and_cleaned(&controller, &engine, &err);
        assert_eq!(engine.exec_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_failure_cleans_up() {
        let engine = Arc::new(FakeEngine::new().failing_read());
        let controller = controller_for(&engine);

        let err = controller.run_session(&video(600), QualityPreset::Medium).await.unwrap_err();

        assert_failed_and_cleaned(&controller, &engine, &err);
        assert_eq!(engine.exec_calls.load(Ordering::SeqCst), 1);
        assert!(!engine.has_file(OUTPUT_NAME));
    }

    #[tokio::test]
    async fn test_empty_output_is_an_encoding_error() {
        let engine = Arc::new(FakeEngine::new());
        let controller = controller_for(&engine);

        // The fake encoder keeps a third of the input, nothing for two bytes
        let err = controller.run_session(&video(2), QualityPreset::Medium).await.unwrap_err();

        assert_failed_and_cleaned(&controller, &engine, &err);
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_selection_during_run_discards_result() {
        let gate = Arc::new(Notify::new());
        let engine = Arc::new(FakeEngine::new().with_exec_gate(gate.clone()));
        let controller = controller_for(&engine);
        controller.select_source(SourceAsset::new("old.mp4", vec![3u8; 900]));

        let (outcome, ()) = tokio::join!(controller.compress_selected(QualityPreset::Medium), async {
            let mut state = controller.watch();
            state
                .wait_for(|s| s.progress() == Some(100))
                .await
                .unwrap();

            controller.select_source(SourceAsset::new("new.mp4", vec![4u8; 300]));
            // The running session keeps publishing its own snapshots
            assert_eq!(controller.state().progress(), Some(100));
            gate.notify_one();
        });

        let stale = outcome.unwrap();
        assert!(!controller.registry().is_live(&stale.url));
        assert_eq!(controller.registry().live_count(), 0);
        assert!(controller.result().is_none());
        assert!(matches!(controller.state(), SessionState::Idle));
        assert_eq!(controller.selected_source().map(|a| a.name().to_string()), Some("new.mp4".to_string()));
        assert!(!controller.is_active());
    }
}
