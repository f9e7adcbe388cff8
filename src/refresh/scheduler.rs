use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::helpers::time::delay_until;

/// Opaque id of an armed refresh timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshHandle(u64);

impl fmt::Display for RefreshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refresh#{}", self.0)
    }
}

/// Permission to arm a timer, taken before an asynchronous round-trip.
///
/// `cancel` invalidates every lease handed out before it, so work that was
/// in flight during a cancel can never arm a new timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    epoch: u64,
}

struct PendingRefresh {
    handle: RefreshHandle,
    at: DateTime<Utc>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    epoch: u64,
    last_id: u64,
    pending: Option<PendingRefresh>,
}

/// Holds at most one pending refresh timer.
#[derive(Clone, Default)]
pub struct RefreshScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease(&self) -> Lease {
        Lease {
            epoch: self.state.lock().epoch,
        }
    }

    /// Replaces the pending timer with one firing at `at`, or as soon as
    /// possible if `at` already passed. Returns `None` and arms nothing when
    /// the lease predates a `cancel`.
    ///
    /// `on_fire` receives the lease taken when the timer claimed its slot; a
    /// `cancel` after that point invalidates it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, lease: Lease, at: DateTime<Utc>, on_fire: F) -> Option<RefreshHandle>
    where
        F: FnOnce(RefreshHandle, Lease) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.epoch != lease.epoch {
            debug!("refresh cancelled while in flight, not rearming");
            return None;
        }
        if let Some(previous) = state.pending.take() {
            previous.task.abort();
            debug!(handle = %previous.handle, "previous refresh replaced");
        }

        state.last_id += 1;
        let handle = RefreshHandle(state.last_id);
        let deadline = Instant::now() + delay_until(at);
        let shared = self.state.clone();
        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            // a replaced or cancelled timer may still wake up once
            let lease = {
                let mut state = shared.lock();
                let owned = state
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.handle == handle);
                owned.then(|| {
                    state.pending = None;
                    Lease { epoch: state.epoch }
                })
            };
            if let Some(lease) = lease {
                debug!(%handle, "refresh due");
                on_fire(handle, lease);
            }
        });

        state.pending = Some(PendingRefresh { handle, at, task });
        debug!(%handle, %at, "refresh scheduled");
        Some(handle)
    }

    /// Clears the pending timer, if any, and invalidates outstanding leases.
    /// Safe to call any number of times.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        if let Some(pending) = state.pending.take() {
            pending.task.abort();
            debug!(handle = %pending.handle, "refresh canceled");
        }
    }

    pub fn pending(&self) -> Option<RefreshHandle> {
        self.state.lock().pending.as_ref().map(|pending| pending.handle)
    }

    /// When the pending timer fires.
    pub fn pending_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().pending.as_ref().map(|pending| pending.at)
    }
}

impl fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
