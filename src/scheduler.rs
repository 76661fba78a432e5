use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

// =============================================================================
// Worker Scheduler
// =============================================================================

/// Admits at most `max_concurrency` walkers at once until a deadline passes.
///
/// Waiters are not served in any guaranteed order. Once the deadline elapses
/// `acquire` resolves to `None`; slots already handed out are left alone.
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    deadline: Instant,
    peak: AtomicUsize,
}

/// One unit of admission. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    /// Returns the slot; the permit is freed when `self` drops.
    pub fn release(self) {}
}

impl Scheduler {
    pub fn new(max_concurrency: usize, deadline: Instant) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            deadline,
            peak: AtomicUsize::new(0),
        }
    }

    /// Waits for a free slot, giving up when the deadline passes first.
    pub async fn acquire(&self) -> Option<Slot> {
        if self.is_expired() {
            return None;
        }

        let permit = tokio::select! {
            biased;
            _ = sleep_until(self.deadline) => return None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok()?,
        };

        self.peak.fetch_max(self.in_use(), Ordering::Relaxed);
        Some(Slot { _permit: permit })
    }

    pub fn in_use(&self) -> usize {
        self.max_concurrency - self.semaphore.available_permits()
    }

    /// Highest in-use count observed at any admission.
    pub fn peak_in_use(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
