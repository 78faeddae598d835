// src/batch/scheduler.rs
// =============================================================================
// This module fans batches of URLs out to the prober.
//
// How a batch runs:
// 1. submit() creates a running batch in the store and spawns run_batch()
// 2. run_batch() spawns one task per URL; each task waits for a slot from
//    the shared ConcurrencyLimiter, probes, and hands back its result
// 3. run_batch() is the batch's only writer: it folds every settled unit
//    into the batch as it arrives
// 4. after the last unit settles, the batch flips to ready
//
// A unit that panics is logged and settles without a result, so a single bad
// URL can never keep its batch from reaching ready.
//
// Rust concepts:
// - tokio::spawn: each probe is its own task, free to run on any worker
// - FuturesUnordered: yields units in completion order, not submit order
// - Arc<dyn Prober>: the scheduler does not care which prober it drives
// =============================================================================

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::limiter::{ConcurrencyLimiter, DEFAULT_CONCURRENCY};
use super::store::{Batch, BatchId, BatchSnapshot, BatchStatus, TaskStore};
use super::{SchedulerError, SchedulerResult};
use crate::checker::{ProbeResult, Prober};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Probes allowed in flight at once, across all batches
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Submits batches and answers questions about them.
///
/// Cheap to clone; clones share the store, the prober, and the limiter.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<TaskStore>,
    prober: Arc<dyn Prober>,
    limiter: ConcurrencyLimiter,
}

impl Scheduler {
    pub fn new(store: Arc<TaskStore>, prober: Arc<dyn Prober>, config: SchedulerConfig) -> Self {
        Self {
            store,
            prober,
            limiter: ConcurrencyLimiter::new(config.concurrency),
        }
    }

    /// Starts probing `urls` in the background and returns the new batch id
    /// straight away.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn submit(&self, urls: Vec<String>) -> SchedulerResult<BatchId> {
        if urls.is_empty() {
            return Err(SchedulerError::Validation(
                "urls must be a non-empty list".to_string(),
            ));
        }

        let batch = self.store.create(urls.len());
        let id = batch.id();
        info!(task = %id, urls = urls.len(), "task created");

        tokio::spawn(run_batch(
            batch,
            urls,
            self.prober.clone(),
            self.limiter.clone(),
        ));

        Ok(id)
    }

    /// The current, possibly partial, state of one batch.
    pub fn status(&self, id: &BatchId) -> SchedulerResult<BatchSnapshot> {
        self.store
            .get(id)
            .map(|batch| batch.snapshot())
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> BTreeMap<BatchId, BatchSnapshot> {
        self.store.snapshot_all()
    }

    /// Forgets a batch. Probes that have not started yet are skipped;
    /// results from probes already on the wire are thrown away.
    pub fn delete(&self, id: &BatchId) -> SchedulerResult<()> {
        let batch = self
            .store
            .remove(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        if batch.status() == BatchStatus::Running {
            warn!(task = %id, "task deleted while running");
        } else {
            debug!(task = %id, "task deleted");
        }
        Ok(())
    }

    /// Waits until the batch is ready and returns its final state.
    pub async fn wait_ready(&self, id: &BatchId) -> SchedulerResult<BatchSnapshot> {
        let batch = self
            .store
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        batch
            .wait_settled()
            .await
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    pub fn task_count(&self) -> usize {
        self.store.len()
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }
}

// Drives one batch from running to ready.
async fn run_batch(
    batch: Arc<Batch>,
    urls: Vec<String>,
    prober: Arc<dyn Prober>,
    limiter: ConcurrencyLimiter,
) {
    let id = batch.id();

    // Every URL gets its own task up front; the limiter decides when each
    // one actually probes
    let mut units: FuturesUnordered<_> = urls
        .into_iter()
        .map(|url| {
            let handle = tokio::spawn(probe_unit(
                batch.clone(),
                url.clone(),
                prober.clone(),
                limiter.clone(),
            ));
            async move { (url, handle.await) }
        })
        .collect();

    while let Some((url, joined)) = units.next().await {
        let still_listed = match joined {
            Ok(Some(result)) => batch.record(url, result),
            // Skipped because the batch was deleted
            Ok(None) => false,
            Err(e) => {
                error!(task = %id, url = %url, error = %e, "probe unit crashed");
                batch.settle_without_result()
            }
        };

        if !still_listed {
            debug!(task = %id, "task deleted, abandoning remaining probes");
            return;
        }
    }

    if batch.mark_ready() {
        info!(task = %id, peak_in_flight = limiter.peak(), "worker finished");
    }
}

// One URL: wait for a slot, probe, give the slot back
//
// Returns None without touching the network if the batch was deleted while
// this unit was queued.
async fn probe_unit(
    batch: Arc<Batch>,
    url: String,
    prober: Arc<dyn Prober>,
    limiter: ConcurrencyLimiter,
) -> Option<ProbeResult> {
    if batch.is_cancelled() {
        return None;
    }

    let _slot = match limiter.acquire().await {
        Ok(slot) => slot,
        Err(e) => {
            error!(task = %batch.id(), url = %url, error = %e, "concurrency limiter closed");
            return None;
        }
    };

    if batch.is_cancelled() {
        return None;
    }

    Some(prober.probe(&url).await)
}
