//! # Vnode & Sink Collaborator Contracts
//!
//! The vnode subsystem (queues of pending work per partition, dispatch to
//! workers, cross-node handoff, output routing) and the sink are external
//! collaborators — out of scope to implement here, but the core calls
//! into them and is called by them, so their contracts live here as
//! traits. Production code supplies real implementations backed by
//! whatever transport the deployment uses; `testkit` supplies in-memory
//! ones for tests.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ids::PartitionId;
use crate::module::{Archive, Item};
use crate::spec::FittingHandle;

/// The four reply forms a vnode may give to a worker's `NextInput` pull.
#[derive(Debug, Clone)]
pub enum NextInputReply {
    /// An input to process.
    Input(Item),
    /// No further inputs will ever arrive on this partition.
    Done,
    /// A handoff archive replayed from a predecessor worker.
    Handoff(Archive),
    /// The vnode is relocating this worker; snapshot and reply via
    /// `reply_archive`.
    Archive,
}

/// The vnode side of the pull-based Vnode ↔ Worker protocol, plus the
/// `DeliverEOI` signal a `FittingControl` sends a vnode once it has
/// broadcast EOI to that vnode's worker.
///
/// One `Vnode` handle is shared by every worker it hosts; it is the
/// worker's sole channel for pulling input, replying to an archive
/// request, and emitting output downstream.
#[async_trait]
pub trait Vnode: Send + Sync {
    /// Request the next input for `(stage, partition)`. Blocks (from the
    /// worker's perspective) until the vnode has a reply.
    async fn next_input(
        &self,
        stage: FittingHandle,
        partition: PartitionId,
        worker: u64,
    ) -> NextInputReply;

    /// A worker's response to an `Archive` directive.
    async fn reply_archive(
        &self,
        stage: FittingHandle,
        partition: PartitionId,
        worker: u64,
        archive: Archive,
    );

    /// Emission primitive: enqueue `output` on `next`'s work queue at
    /// `partition`. Best-effort and non-blocking from the worker's
    /// perspective — backpressure policy is the vnode's concern.
    async fn queue_work(&self, next: FittingHandle, output: Item, partition: PartitionId);

    /// Told by a `FittingControl` that `stage` is drained: the vnode
    /// should deliver `{INPUT, DONE}` to this partition's worker once its
    /// existing queue empties.
    async fn deliver_eoi(&self, stage: FittingHandle, partition: PartitionId);
}

pub type VnodeHandle = Arc<dyn Vnode>;

/// The pipeline's terminal output recipient, external to the stage chain.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one final output, emitted by `stage` (whose own `partfun`
    /// is `SINK`).
    async fn deliver(&self, stage_name: String, stage: FittingHandle, output: Item);

    /// The pipeline's last stage has drained.
    async fn eoi(&self);
}

pub type SinkHandle = Arc<dyn Sink>;

/// Where a stage's outputs go: the next stage (by handle, so emission can
/// address its queue directly), or the sink.
#[derive(Clone)]
pub enum OutputTarget {
    Control(FittingHandle),
    Sink(SinkHandle),
}

impl OutputTarget {
    pub async fn forward_eoi(&self) {
        match self {
            OutputTarget::Control(next) => next.control.eoi().await,
            OutputTarget::Sink(sink) => sink.eoi().await,
        }
    }
}
