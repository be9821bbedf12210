use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use chanprov_net::EventHub;

/// Event-hub handles opened during a workflow, keyed by handle id.
#[derive(Default)]
pub struct EventHubRegistry {
    handles: Mutex<HashMap<String, Arc<dyn EventHub>>>,
}

impl EventHubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `handle` until the next [`cleanup_all`](Self::cleanup_all).
    /// A different handle already registered under the same id is
    /// disconnected and replaced.
    pub fn register_handle(&self, handle: Arc<dyn EventHub>) {
        debug!(hub = handle.id(), "registered event hub");
        let previous = self
            .lock()
            .insert(handle.id().to_string(), Arc::clone(&handle));
        if let Some(previous) = previous {
            let same = std::ptr::eq(
                Arc::as_ptr(&previous).cast::<()>(),
                Arc::as_ptr(&handle).cast::<()>(),
            );
            if !same && previous.is_connected() {
                debug!(hub = previous.id(), "disconnecting replaced event hub");
                previous.disconnect();
            }
        }
    }

    /// Disconnects every still-connected handle and empties the registry.
    /// Returns the number of handles disconnected.
    pub fn cleanup_all(&self) -> usize {
        let handles: Vec<_> = self.lock().drain().map(|(_, handle)| handle).collect();
        let mut disconnected = 0;
        for handle in handles {
            if handle.is_connected() {
                handle.disconnect();
                disconnected += 1;
            }
        }
        if disconnected > 0 {
            info!(disconnected, "closed event hubs");
        }
        disconnected
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking holder cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn EventHub>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs [`EventHubRegistry::cleanup_all`] when dropped, whether the owning
/// scope returns, fails, panics or is cancelled.
pub struct CleanupGuard {
    registry: Arc<EventHubRegistry>,
}

impl CleanupGuard {
    pub fn new(registry: Arc<EventHubRegistry>) -> Self {
        Self { registry }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.cleanup_all();
    }
}
