//! Exclusive wake resource with a hard timeout.
//!
//! The Hub keeps its host awake only while a task is executing. The
//! resource is a singleton: [`WakeGuard::acquire`] is a no-op while held,
//! every acquisition carries a timeout of at most two minutes, and the
//! returned [`WakeLease`] releases on drop, so early returns, `?`, panics
//! and task cancellation all give the resource back.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Longest a single acquisition may last.
pub const MAX_WAKE_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Platform hook that actually keeps the host awake.
pub trait WakeBackend: Send + Sync {
    /// Take the platform resource for at most `timeout`.
    fn acquire(&self, timeout: Duration);
    /// Give the platform resource back. Must tolerate being called when not held.
    fn release(&self);
}

/// Backend for hosts without a wake facility: tracks nothing, logs transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingWakeBackend;

impl WakeBackend for LoggingWakeBackend {
    fn acquire(&self, timeout: Duration) {
        debug!(timeout_ms = timeout.as_millis() as u64, "wake resource acquired");
    }

    fn release(&self) {
        debug!("wake resource released");
    }
}

#[derive(Default)]
struct WakeState {
    held: bool,
    generation: u64,
    expiry: Option<JoinHandle<()>>,
}

/// Handle to the singleton wake resource. Clones share the same resource.
#[derive(Clone)]
pub struct WakeGuard {
    state: Arc<Mutex<WakeState>>,
    backend: Arc<dyn WakeBackend>,
}

impl std::fmt::Debug for WakeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGuard")
            .field("held", &self.is_held())
            .finish()
    }
}

impl Default for WakeGuard {
    fn default() -> Self {
        Self::new(Arc::new(LoggingWakeBackend))
    }
}

impl WakeGuard {
    pub fn new(backend: Arc<dyn WakeBackend>) -> Self {
        Self {
            state: Arc::new(Mutex::new(WakeState::default())),
            backend,
        }
    }

    /// Take the resource for at most `timeout` (clamped to
    /// [`MAX_WAKE_TIMEOUT`]). If it is already held, the existing
    /// acquisition is left untouched and the returned lease refers to it.
    pub fn acquire(&self, timeout: Duration) -> WakeLease {
        let timeout = timeout.min(MAX_WAKE_TIMEOUT);
        let Ok(mut state) = self.state.lock() else {
            error!("wake state lock poisoned; continuing without wake resource");
            return WakeLease {
                guard: self.clone(),
                generation: u64::MAX,
            };
        };

        if state.held {
            debug!("wake resource already held");
            return WakeLease {
                guard: self.clone(),
                generation: state.generation,
            };
        }

        state.generation = state.generation.wrapping_add(1);
        state.held = true;
        let generation = state.generation;
        self.backend.acquire(timeout);

        // The timer enforces the hard limit even if the lease is leaked.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let guard = self.clone();
            state.expiry = Some(handle.spawn(async move {
                tokio::time::sleep(timeout).await;
                if guard.release_generation(generation) {
                    warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "wake resource expired before release"
                    );
                }
            }));
        }

        WakeLease {
            guard: self.clone(),
            generation,
        }
    }

    /// Release the resource if held. Idempotent.
    pub fn release(&self) {
        let generation = match self.state.lock() {
            Ok(state) => state.generation,
            Err(_) => return,
        };
        self.release_generation(generation);
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().map(|s| s.held).unwrap_or(false)
    }

    /// Release only if the current acquisition is `generation`. Returns
    /// whether anything was released.
    fn release_generation(&self, generation: u64) -> bool {
        let expiry = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            if !state.held || state.generation != generation {
                return false;
            }
            state.held = false;
            state.expiry.take()
        };

        if let Some(timer) = expiry {
            timer.abort();
        }
        let backend = Arc::clone(&self.backend);
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| backend.release())).is_err()
        {
            error!("wake backend panicked during release");
        }
        true
    }
}

/// Scope-bound wake acquisition. Dropping it releases the resource.
#[must_use = "dropping the lease releases the wake resource"]
pub struct WakeLease {
    guard: WakeGuard,
    generation: u64,
}

impl WakeLease {
    /// Whether this lease's acquisition is still in force.
    pub fn is_active(&self) -> bool {
        self.guard
            .state
            .lock()
            .map(|s| s.held && s.generation == self.generation)
            .unwrap_or(false)
    }

    /// Release now instead of at drop.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for WakeLease {
    fn drop(&mut self) {
        self.guard.release_generation(self.generation);
    }
}
