// src/batch/store.rs
// =============================================================================
// The task store: every batch this process knows about, keyed by id.
//
// The store is an ordinary value. main() builds one and hands it to the
// Scheduler, and tests build as many independent stores as they like.
//
// Locking:
// - the registry map sits behind a RwLock, touched only to insert, look
//   up, or remove a batch
// - each Batch has its own Mutex around its state; the scheduler's
//   aggregator is the only writer, readers clone a snapshot out
// Nothing is held across an .await.
// =============================================================================

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use uuid::Uuid;

use crate::checker::ProbeResult;

/// Opaque batch identifier (a random UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for BatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Running,
    Ready,
}

// What waiters on a batch can observe. Removed is never visible through a
// snapshot; it only wakes anyone blocked in wait_settled().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Ready,
    Removed,
}

/// A consistent copy of one batch's state at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub status: BatchStatus,
    #[serde(rename = "result")]
    pub results: BTreeMap<String, ProbeResult>,
    /// URLs submitted, duplicates included
    pub total: usize,
    /// Probe units not yet settled
    pub pending: usize,
    pub created_at: u64,
}

#[derive(Debug)]
struct BatchState {
    status: BatchStatus,
    results: BTreeMap<String, ProbeResult>,
    total: usize,
    pending: usize,
    created_at: u64,
}

/// One submitted batch.
///
/// Mutated only by the scheduler's aggregator: one call per settled probe
/// unit, then a single mark_ready(). Once the batch has been removed from
/// its store every mutation is a no-op.
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    state: Mutex<BatchState>,
    cancelled: AtomicBool,
    phase: watch::Sender<Phase>,
}

impl Batch {
    fn new(id: BatchId, total: usize) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            id,
            state: Mutex::new(BatchState {
                status: BatchStatus::Running,
                results: BTreeMap::new(),
                total,
                pending: total,
                created_at: unix_now(),
            }),
            cancelled: AtomicBool::new(false),
            phase,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.state.lock();
        BatchSnapshot {
            status: state.status,
            results: state.results.clone(),
            total: state.total,
            pending: state.pending,
            created_at: state.created_at,
        }
    }

    pub fn status(&self) -> BatchStatus {
        self.state.lock().status
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    // Folds one probe result in, keyed by the submitted url. Returns false
    // once the batch has been removed.
    pub(crate) fn record(&self, url: String, result: ProbeResult) -> bool {
        let mut state = self.state.lock();
        if self.is_cancelled() {
            return false;
        }
        state.results.insert(url, result);
        state.pending = state.pending.saturating_sub(1);
        true
    }

    // A unit that finished without a result (it crashed)
    pub(crate) fn settle_without_result(&self) -> bool {
        let mut state = self.state.lock();
        if self.is_cancelled() {
            return false;
        }
        state.pending = state.pending.saturating_sub(1);
        true
    }

    // Terminal transition. Idempotent; never moves a batch back to running.
    pub(crate) fn mark_ready(&self) -> bool {
        {
            let mut state = self.state.lock();
            if self.is_cancelled() {
                return false;
            }
            state.status = BatchStatus::Ready;
        }
        self.phase.send_replace(Phase::Ready);
        true
    }

    fn cancel(&self) {
        {
            // Taking the state lock orders the flag after any write in progress
            let _state = self.state.lock();
            self.cancelled.store(true, Ordering::SeqCst);
        }
        self.phase.send_replace(Phase::Removed);
    }

    /// Resolves with the final snapshot once the batch is ready, or None if
    /// the batch is removed first.
    pub async fn wait_settled(&self) -> Option<BatchSnapshot> {
        let mut phase = self.phase.subscribe();
        let settled = match phase.wait_for(|p| *p != Phase::Running).await {
            Ok(p) => *p,
            Err(_) => return None,
        };

        match settled {
            Phase::Ready => Some(self.snapshot()),
            Phase::Running | Phase::Removed => None,
        }
    }
}

/// Registry of batches, alive for the lifetime of the process.
#[derive(Debug, Default)]
pub struct TaskStore {
    batches: RwLock<HashMap<BatchId, Arc<Batch>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh running batch expecting `total` probe units.
    pub fn create(&self, total: usize) -> Arc<Batch> {
        let batch = Arc::new(Batch::new(BatchId::new(), total));
        self.batches.write().insert(batch.id(), batch.clone());
        batch
    }

    pub fn get(&self, id: &BatchId) -> Option<Arc<Batch>> {
        self.batches.read().get(id).cloned()
    }

    /// Unlinks a batch and cancels it so no later write lands in it.
    pub fn remove(&self, id: &BatchId) -> Option<Arc<Batch>> {
        let mut batches = self.batches.write();
        let batch = batches.remove(id)?;
        batch.cancel();
        Some(batch)
    }

    pub fn snapshot_all(&self) -> BTreeMap<BatchId, BatchSnapshot> {
        // Copy the Arcs out first so the registry lock is not held while
        // result maps are cloned
        let batches: Vec<Arc<Batch>> = self.batches.read().values().cloned().collect();

        batches
            .into_iter()
            .map(|batch| (batch.id(), batch.snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.batches.read().len()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
