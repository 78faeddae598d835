// src/batch/limiter.rs
// =============================================================================
// A counting concurrency limiter.
//
// Wraps a tokio Semaphore. Every probe holds a Slot while it runs; dropping
// the Slot frees it for the next queued probe. The limiter also keeps two
// counters so tests and logs can see how busy it is:
// - in_flight: slots currently held
// - peak: the highest in_flight ever observed
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Probes allowed in flight at once, across every batch.
pub const DEFAULT_CONCURRENCY: usize = 1000;

#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

// Held for the duration of one probe
#[derive(Debug)]
pub struct Slot {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    // A capacity of zero would deadlock every batch, so it is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for a free slot. Only fails if the semaphore was closed, which
    /// this crate never does.
    pub async fn acquire(&self) -> Result<Slot, AcquireError> {
        let permit = self.inner.semaphore.clone().acquire_owned().await?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Slot {
            inner: self.inner.clone(),
            _permit: permit,
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl Drop for Slot {
    // Runs before the permit field is dropped, so in_flight never
    // exceeds capacity
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
