//! Request scheduler: serializes outbound calls to one external provider with
//! a minimum spacing between dispatch starts, in FIFO order.
//!
//! A separate [`Scheduler`] instance is used per provider (block explorer,
//! market-data catalog, RPC) so that one provider's rate budget never throttles
//! another's.
//!
//! # Example
//!
//! ```no_run
//! use clp_ledger::scheduler::Scheduler;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let explorer_scheduler = Scheduler::new(Duration::from_millis(220));
//!
//! let result: u32 = explorer_scheduler
//!     .schedule(|| async { 42 })
//!     .await;
//! assert_eq!(result, 42);
//! # }
//! ```

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// FIFO, single-in-flight dispatcher enforcing a minimum gap between the
/// starts of successive tasks.
///
/// The scheduler itself never fails; a task's success or failure propagates
/// verbatim through [`Scheduler::schedule`].
pub struct Scheduler {
    min_spacing: Duration,
    last_dispatch: Mutex<Instant>,
}

impl Scheduler {
    /// Create a new scheduler with the given minimum spacing between
    /// dispatch starts.
    #[must_use]
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            // Back-dated so the very first call never waits.
            last_dispatch: Mutex::new(Instant::now() - min_spacing),
        }
    }

    /// Enqueue `task`. When the time since the last dispatch is at least
    /// `min_spacing`, dispatches immediately; otherwise waits out the
    /// remainder first. Holds the provider's single slot for the duration of
    /// `task`, so two tasks submitted to the same scheduler never run
    /// concurrently — this is what keeps a single process from exceeding the
    /// provider's rate budget even if callers race to submit.
    pub async fn schedule<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last = self.last_dispatch.lock().await;

        let elapsed = last.elapsed();
        if elapsed < self.min_spacing {
            let wait = self.min_spacing - elapsed;
            trace!(wait_ms = wait.as_millis() as u64, "scheduler waiting out min spacing");
            tokio::time::sleep(wait).await;
        }

        debug!("scheduler dispatching task");
        *last = Instant::now();
        task().await
    }

    /// The configured minimum spacing, for diagnostics and tests.
    #[must_use]
    pub const fn min_spacing(&self) -> Duration {
        self.min_spacing
    }
}
