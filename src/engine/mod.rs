//! # Codec Engine Module
//!
//! Il contratto con il motore di codifica esterno, trattato come collaboratore opaco.
//!
//! ## Operazioni:
//! - `load`: prepara il motore, può fallire
//! - `write_file` / `read_file` / `delete_file`: filesystem virtuale privato del motore
//! - `exec`: esegue un job di codifica con una lista di argomenti
//! - `on` / `off`: sottoscrizioni agli eventi `progress` e `log`
//!
//! ## Implementazioni:
//! - `ffmpeg::FfmpegEngine`: binario FFmpeg nativo con una directory temporanea
//!   come filesystem virtuale
//!
//! Gli eventi arrivano in modo asincrono dal motore e sono notifiche
//! "fire-and-forget": i sink non devono bloccare.

pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod fake;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub use ffmpeg::FfmpegEngine;

/// Event channels an engine publishes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Progress,
    Log,
}

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fraction of the current job done, nominally 0.0..=1.0
    Progress(f64),
    /// One diagnostic line
    Log(String),
}

impl EngineEvent {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Progress(_) => Channel::Progress,
            Self::Log(_) => Channel::Log,
        }
    }
}

/// Callback receiving engine events
pub type EventSink = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Token returned by [`CodecEngine::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub channel: Channel,
    id: u64,
}

/// Capability contract of an external codec engine
#[async_trait]
pub trait CodecEngine: Send + Sync {
    async fn load(&self) -> Result<()>;
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;
    async fn exec(&self, args: &[String]) -> Result<()>;
    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;
    async fn delete_file(&self, name: &str) -> Result<()>;

    fn on(&self, channel: Channel, sink: EventSink) -> Subscription;
    fn off(&self, subscription: Subscription);
}

/// Subscriber list shared by engine implementations
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    sinks: Mutex<Vec<(Subscription, EventSink)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn sinks(&self) -> MutexGuard<'_, Vec<(Subscription, EventSink)>> {
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, channel: Channel, sink: EventSink) -> Subscription {
        let subscription = Subscription {
            channel,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.sinks().push((subscription, sink));
        subscription
    }

    /// Returns false when the subscription was not registered
    pub fn remove(&self, subscription: Subscription) -> bool {
        let mut sinks = self.sinks();
        let before = sinks.len();
        sinks.retain(|(existing, _)| *existing != subscription);
        sinks.len() != before
    }

    /// Deliver an event to every sink on its channel
    pub fn emit(&self, event: &EngineEvent) {
        // Snapshot first so a sink may subscribe or unsubscribe without deadlocking
        let targets: Vec<EventSink> = self
            .sinks()
            .iter()
            .filter(|(subscription, _)| subscription.channel == event.channel())
            .map(|(_, sink)| sink.clone())
            .collect();

        for sink in targets {
            sink(event);
        }
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.sinks()
            .iter()
            .filter(|(subscription, _)| subscription.channel == channel)
            .count()
    }
}
