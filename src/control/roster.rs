//! The worker roster kept by a `FittingControl`: WorkerEntry, WorkerRef,
//! and the small ordered sequence that holds them. A `Vec` is sufficient
//! — rosters are bounded by partition count, and an auxiliary
//! `worker_ref -> index` map would only pay for itself at large fan-out.

use std::fmt;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::ids::PartitionId;
use crate::vnode::VnodeHandle;

/// Opaque identity of a worker, used as a liveness-monitor target and as
/// the roster's de-duplication key. Bundles a handle to the vnode hosting
/// the worker so that a `FittingControl` — which only ever keeps three
/// fields per `WorkerEntry` — can still reach "this worker's owning
/// vnode" to deliver EOI.
#[derive(Clone)]
pub struct WorkerRef {
    id: u64,
    vnode: VnodeHandle,
    alive: watch::Receiver<()>,
}

impl WorkerRef {
    pub fn new(id: u64, vnode: VnodeHandle, alive: watch::Receiver<()>) -> Self {
        Self { id, vnode, alive }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vnode(&self) -> &VnodeHandle {
        &self.vnode
    }

    pub(crate) fn alive_watch(&self) -> watch::Receiver<()> {
        self.alive.clone()
    }
}

impl PartialEq for WorkerRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkerRef {}

impl std::hash::Hash for WorkerRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WorkerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerRef({})", self.id)
    }
}

/// One (partition, worker) pair currently doing work for a stage.
pub struct WorkerEntry {
    pub partition_id: PartitionId,
    pub worker_ref: WorkerRef,
    pub liveness_token: AbortHandle,
}

/// Invariants:
/// - R1: at most one entry per (partition_id, worker_ref) pair.
/// - R2: every entry is accompanied by an active liveness monitor until
///   explicitly removed (enforced by `FittingControl`, which always pairs
///   `insert` with a freshly spawned monitor and `remove_*` with
///   `liveness_token.abort()`).
/// - R3: mutated only by the owning `FittingControl` — this type is not
///   `Clone` and is never shared.
#[derive(Default)]
pub struct Roster(Vec<WorkerEntry>);

impl Roster {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, partition: PartitionId, worker: &WorkerRef) -> bool {
        self.0
            .iter()
            .any(|e| e.partition_id == partition && &e.worker_ref == worker)
    }

    pub fn insert(&mut self, entry: WorkerEntry) {
        debug_assert!(
            !self.contains(entry.partition_id, &entry.worker_ref),
            "R1 violation: duplicate (partition, worker) roster entry"
        );
        self.0.push(entry);
    }

    pub fn remove_by_worker(&mut self, worker: &WorkerRef) -> Option<WorkerEntry> {
        let pos = self.0.iter().position(|e| &e.worker_ref == worker)?;
        Some(self.0.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn partitions(&self) -> Vec<PartitionId> {
        self.0.iter().map(|e| e.partition_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerEntry> {
        self.0.iter()
    }
}
