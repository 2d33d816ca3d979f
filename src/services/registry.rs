//! Process-wide registry of fallback defaults layers.
//!
//! Append-only and copy-on-write: every `push` publishes a fresh snapshot, so
//! readers take an `Arc` and resolve without holding any lock.

use crate::defaults::ServiceDefaults;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

static GLOBAL_LAYER_REGISTRY: OnceLock<LayerRegistry> = OnceLock::new();

/// Ordered fallback layers shared across callers, most specific first.
pub struct LayerRegistry {
    layers: RwLock<Arc<[ServiceDefaults]>>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self {
            layers: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// The registry consulted by [`Config::layers_for`](crate::Config::layers_for).
    pub fn global() -> &'static LayerRegistry {
        GLOBAL_LAYER_REGISTRY.get_or_init(LayerRegistry::new)
    }

    /// Append a layer behind every layer already registered.
    ///
    /// Layers with no usable value are skipped.
    pub fn push(&self, layer: ServiceDefaults) {
        if layer.is_empty() {
            return;
        }
        let mut guard = self.layers.write();
        let mut next: Vec<ServiceDefaults> = guard.iter().cloned().collect();
        next.push(layer);
        *guard = Arc::from(next);
    }

    /// Current layers. Later pushes never alter a snapshot already taken.
    pub fn snapshot(&self) -> Arc<[ServiceDefaults]> {
        let guard = self.layers.read();
        Arc::clone(&*guard)
    }

    pub fn len(&self) -> usize {
        self.layers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every layer. Existing snapshots are unaffected.
    pub fn clear(&self) {
        *self.layers.write() = Arc::from(Vec::new());
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
