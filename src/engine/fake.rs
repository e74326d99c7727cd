//! Scripted in-memory engine used by the unit tests.

use super::{Channel, CodecEngine, EngineEvent, EventSink, Listeners, Subscription};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
pub(crate) struct FakeEngine {
    pub listeners: Listeners,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub load_calls: AtomicUsize,
    pub exec_calls: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    pub exec_args: Mutex<Vec<Vec<String>>>,
    /// Number of upcoming loads that fail
    pub failing_loads: AtomicUsize,
    pub fail_exec: AtomicBool,
    pub fail_write: AtomicBool,
    pub fail_read: AtomicBool,
    pub load_delay: Option<Duration>,
    /// When set, `exec` waits for a notification before finishing
    pub exec_gate: Option<Arc<Notify>>,
    /// Progress fractions reported during `exec`
    pub progress_script: Vec<f64>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            progress_script: vec![0.0, 0.35, 0.3, 0.8, 1.0],
            ..Self::default()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn with_exec_gate(mut self, gate: Arc<Notify>) -> Self {
        self.exec_gate = Some(gate);
        self
    }

    pub fn failing_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_exec(self) -> Self {
        self.fail_exec.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_write(self) -> Self {
        self.fail_write.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_read(self) -> Self {
        self.fail_read.store(true, Ordering::SeqCst);
        self
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodecEngine for FakeEngine {
    async fn load(&self) -> Result<()> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        self.listeners.emit(&EngineEvent::Log("fake engine loading".to_string()));

        let failing = self.failing_loads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_loads.store(failing - 1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("failed to fetch engine assets"));
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("out of memory writing {}", name));
        }
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        self.exec_args.lock().unwrap().push(args.to_vec());

        for fraction in &self.progress_script {
            self.listeners.emit(&EngineEvent::Progress(*fraction));
        }

        if let Some(ref gate) = self.exec_gate {
            gate.notified().await;
        }

        if self.fail_exec.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Conversion failed: invalid data found when processing input"));
        }

        let input = args
            .iter()
            .position(|arg| arg == "-i")
            .and_then(|index| args.get(index + 1))
            .ok_or_else(|| anyhow::anyhow!("missing input"))?;
        let output = args.last().ok_or_else(|| anyhow::anyhow!("missing output"))?;

        let mut files = self.files.lock().unwrap();
        let source = files
            .get(input)
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", input))?
            .clone();
        // Pretend the encoder shrank the stream to a third
        files.insert(output.clone(), source[..source.len() / 3].to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("read error on {}", name));
        }
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", name))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(name.to_string());
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", name))
    }

    fn on(&self, channel: Channel, sink: EventSink) -> Subscription {
        self.listeners.add(channel, sink)
    }

    fn off(&self, subscription: Subscription) {
        self.listeners.remove(subscription);
    }
}
