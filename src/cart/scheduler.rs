use futures::future::BoxFuture;
use metrics::counter;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::CartBackendError;

pub const DEFAULT_PERSIST_DELAY: Duration = Duration::from_millis(1500);

pub type PersistWrite = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CartBackendError>> + Send>;

struct PendingWrite {
    generation: u64,
    write: PersistWrite,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<PendingWrite>,
}

/// Trailing-edge debounce for cart writes.
///
/// Only the latest scheduled write runs, `delay` after it was scheduled.
/// Writes never overlap; a write that fires while another is in flight waits
/// for it. A pending write whose timer has not fired can be cancelled; one
/// already running is never interrupted.
#[derive(Clone)]
pub struct PersistScheduler {
    delay: Duration,
    state: Arc<Mutex<SchedulerState>>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for PersistScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistScheduler")
            .field("delay", &self.delay)
            .field("has_pending", &self.has_pending())
            .finish()
    }
}

impl Default for PersistScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PERSIST_DELAY)
    }
}

impl PersistScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replaces any pending write with `write` and restarts the timer
    pub fn schedule<F>(&self, write: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), CartBackendError>> + Send + 'static,
    {
        let mut state = self.lock_state();
        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.pending.take() {
            previous.timer.abort();
        }

        let this = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            if let Some(write) = this.take_if_current(generation) {
                this.run(write).await;
            }
        });

        state.pending = Some(PendingWrite {
            generation,
            write: Box::new(write),
            timer,
        });
        debug!(generation, "Cart persist scheduled");
    }

    /// Drops the pending write, if any. Returns whether one was dropped.
    pub fn cancel_pending(&self) -> bool {
        let mut state = self.lock_state();
        state.generation += 1;
        match state.pending.take() {
            Some(pending) => {
                pending.timer.abort();
                debug!(generation = pending.generation, "Cart persist cancelled");
                true
            }
            None => false,
        }
    }

    /// Runs the pending write now instead of waiting for its timer
    pub async fn flush(&self) {
        let pending = self.lock_state().pending.take();
        if let Some(pending) = pending {
            pending.timer.abort();
            self.run(pending.write).await;
        }
    }

    /// Waits for the write in flight, if any, to finish
    pub async fn wait_idle(&self) {
        let _guard = self.in_flight.lock().await;
    }

    pub fn has_pending(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    fn take_if_current(&self, generation: u64) -> Option<PersistWrite> {
        let mut state = self.lock_state();
        match &state.pending {
            Some(pending) if pending.generation == generation => {
                state.pending.take().map(|p| p.write)
            }
            _ => None,
        }
    }

    async fn run(&self, write: PersistWrite) {
        let _guard = self.in_flight.lock().await;
        match write().await {
            Ok(()) => {
                counter!("storefront.cart.persist_writes", 1);
                debug!("Cart persisted");
            }
            Err(e) => {
                counter!("storefront.cart.persist_failures", 1);
                warn!(error = %e, "Cart persist failed");
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
