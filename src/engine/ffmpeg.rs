//! # Native FFmpeg Engine
//!
//! Implementazione di `CodecEngine` basata sul binario FFmpeg di sistema.
//!
//! ## Responsabilità:
//! - `load`: risolve il binario, verifica `ffmpeg -version`, crea la directory di lavoro
//! - Filesystem virtuale: una `TempDir` privata, rimossa quando il motore viene distrutto
//! - `exec`: lancia FFmpeg nella directory di lavoro e ne segue l'avanzamento
//!
//! ## Avanzamento:
//! FFmpeg scrive su stdout (`-progress pipe:1`) coppie `chiave=valore`; la frazione
//! completata è `out_time_us / durata`, dove la durata viene letta dalla riga
//! `Duration:` su stderr. `progress=end` produce sempre 1.0. Ogni riga di stderr
//! viene inoltrata sul canale `log`.

use super::{Channel, CodecEngine, EngineEvent, EventSink, Listeners, Subscription};
use crate::tool_resolver::ToolPathResolver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Flags prepended to every job so progress is machine readable
const PLUMBING_ARGS: &[&str] = &["-hide_banner", "-nostdin", "-y", "-nostats", "-progress", "pipe:1"];
/// Number of stderr lines kept for error reports
const STDERR_TAIL: usize = 8;

struct Runtime {
    binary: PathBuf,
    workspace: TempDir,
}

/// Codec engine backed by a native ffmpeg executable
pub struct FfmpegEngine {
    resolver: ToolPathResolver,
    runtime: Mutex<Option<Arc<Runtime>>>,
    listeners: Arc<Listeners>,
}

impl FfmpegEngine {
    pub fn new(ffmpeg_path: Option<PathBuf>) -> Self {
        Self {
            resolver: ToolPathResolver::new(ffmpeg_path),
            runtime: Mutex::new(None),
            listeners: Arc::new(Listeners::new()),
        }
    }

    async fn runtime(&self) -> Result<Arc<Runtime>> {
        self.runtime
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg engine is not loaded"))
    }

    async fn entry_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.runtime().await?.workspace.path().join(name))
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    async fn load(&self) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Ok(());
        }

        let binary = self
            .resolver
            .check_tool_with_instructions("ffmpeg")
            .map_err(|msg| anyhow::anyhow!(msg))?;

        let output = Command::new(&binary)
            .args(["-hide_banner", "-version"])
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", binary.display()))?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{} -version exited with {}",
                binary.display(),
                output.status
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        self.listeners.emit(&EngineEvent::Log(version.clone()));

        let workspace = tempfile::Builder::new()
            .prefix("video-compressor-")
            .tempdir()
            .context("Failed to create engine workspace")?;

        info!("Loaded {} ({})", binary.display(), version);
        debug!("Engine workspace: {}", workspace.path().display());

        *runtime = Some(Arc::new(Runtime { binary, workspace }));
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(name).await?;
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write {}", name))
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        let runtime = self.runtime().await?;

        let mut child = Command::new(&runtime.binary)
            .args(PLUMBING_ARGS)
            .args(args)
            .current_dir(runtime.workspace.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", runtime.binary.display()))?;

        let stdout = child.stdout.take().context("ffmpeg stdout not captured")?;
        let stderr = child.stderr.take().context("ffmpeg stderr not captured")?;

        let duration_us = Arc::new(AtomicU64::new(0));

        let stderr_task = {
            let listeners = self.listeners.clone();
            let duration_us = duration_us.clone();
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(total) = parse_duration_line(&line) {
                        // Only the first Duration line belongs to the input
                        let _ = duration_us.compare_exchange(0, total, Ordering::Relaxed, Ordering::Relaxed);
                    }
                    listeners.emit(&EngineEvent::Log(line.clone()));
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail
            })
        };

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read ffmpeg progress")? {
            match parse_progress_line(&line) {
                Some(ProgressField::OutTimeUs(out_time)) => {
                    if let Some(fraction) = progress_fraction(out_time, duration_us.load(Ordering::Relaxed)) {
                        self.listeners.emit(&EngineEvent::Progress(fraction));
                    }
                }
                Some(ProgressField::End) => self.listeners.emit(&EngineEvent::Progress(1.0)),
                None => {}
            }
        }

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        let tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let details: Vec<String> = tail.into_iter().collect();
            return Err(anyhow::anyhow!("ffmpeg exited with {}: {}", status, details.join(" | ")));
        }

        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(name).await?;
        fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", name))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.entry_path(name).await?;
        fs::remove_file(&path)
            .await
            .with_context(|| format!("Failed to delete {}", name))
    }

    fn on(&self, channel: Channel, sink: EventSink) -> Subscription {
        self.listeners.add(channel, sink)
    }

    fn off(&self, subscription: Subscription) {
        self.listeners.remove(subscription);
    }
}

/// Entries live flat in the workspace
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(anyhow::anyhow!("Invalid virtual file name: {:?}", name));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgressField {
    OutTimeUs(u64),
    End,
}

fn parse_progress_line(line: &str) -> Option<ProgressField> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is in microseconds as well
        "out_time_us" | "out_time_ms" => value.parse().ok().map(ProgressField::OutTimeUs),
        "progress" if value == "end" => Some(ProgressField::End),
        _ => None,
    }
}

/// Extract the input duration in microseconds from a stderr header line
fn parse_duration_line(line: &str) -> Option<u64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let timestamp = rest.split(',').next()?.trim();
    parse_timestamp(timestamp)
}

fn parse_timestamp(timestamp: &str) -> Option<u64> {
    let mut parts = timestamp.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours * 3_600_000_000 + minutes * 60_000_000 + (seconds * 1_000_000.0).round() as u64)
}

fn progress_fraction(out_time_us: u64, duration_us: u64) -> Option<f64> {
    if duration_us == 0 {
        return None;
    }
    Some((out_time_us as f64 / duration_us as f64).min(1.0))
}
