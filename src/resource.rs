//! # Downloadable Resources
//!
//! In-memory equivalent of browser object URLs. The registry mints a handle for a
//! result buffer and keeps the buffer alive until the handle is revoked, so every
//! handle that is replaced must be revoked or the buffers pile up for the whole
//! process lifetime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Handle to a buffer registered in an [`ObjectUrlRegistry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUrl {
    id: u64,
    href: String,
    mime: &'static str,
    len: u64,
}

impl ObjectUrl {
    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Registry of live object URLs
#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a buffer and return its handle
    pub fn create(&self, data: Arc<[u8]>, mime: &'static str) -> ObjectUrl {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = ObjectUrl {
            id,
            href: format!("blob:local/{}", id),
            mime,
            len: data.len() as u64,
        };
        self.entries().insert(id, data);
        debug!("Created object URL {} ({} bytes)", url.href, url.len);
        url
    }

    /// Release the buffer behind a handle. Returns false if it was already revoked.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.entries().remove(&url.id).is_some();
        if removed {
            debug!("Revoked object URL {}", url.href);
        }
        removed
    }

    /// Bytes behind a live handle
    pub fn resolve(&self, url: &ObjectUrl) -> Option<Arc<[u8]>> {
        self.entries().get(&url.id).cloned()
    }

    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.entries().contains_key(&url.id)
    }

    /// Number of handles not yet revoked
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }
}
