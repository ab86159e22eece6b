//! # Worker
//!
//! The single actor per (stage, partition) that hosts one instance of the
//! user-supplied fitting module, pulling inputs from its hosting vnode and
//! driving the module's callbacks. States `InitialInputRequest` (initial)
//! and `WaitForInput` (steady); terminal: normal termination.
//!
//! Unlike `FittingControl`, a Worker has no inbound mailbox of its own —
//! it only ever suspends awaiting the vnode's reply to `NextInput`, or
//! inside an opaque, possibly-blocking module callback. It is realized as
//! a plain async function rather than a message loop, with the two named
//! states kept explicit for testability.

pub mod emit;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::control::client::FittingControlClient;
use crate::control::roster::WorkerRef;
use crate::error::ControlError;
use crate::ids::PartitionId;
use crate::module::{Archive, FittingModule, ModuleState};
use crate::spec::FittingHandle;
use crate::vnode::{NextInputReply, VnodeHandle};
use emit::Emitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    InitialInputRequest,
    WaitForInput,
}

/// Why a worker ended without ever reaching steady state.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Ran to completion: drained its queue, called `done`, reported
    /// `WorkerDone`.
    Done,
    /// Relocated via `archive`/handoff and reported `WorkerDone`.
    Archived,
    /// The owning `FittingControl` was already `Gone` when this worker
    /// tried to register.
    ControlGone,
    /// The module's `init` callback failed.
    InitFailed,
}

pub struct Worker {
    id: u64,
    module: std::sync::Arc<dyn FittingModule>,
    control: FittingControlClient,
    vnode: VnodeHandle,
    partition: PartitionId,
    stage_handle: FittingHandle,
    stage_name: String,
    // Held only so its `Drop` fires (closing `alive_rx`) the instant this
    // worker's `run` ends, for any reason; never read directly.
    #[allow(dead_code)]
    alive_tx: watch::Sender<()>,
    alive_rx: watch::Receiver<()>,
}

impl Worker {
    pub fn new(
        id: u64,
        module: std::sync::Arc<dyn FittingModule>,
        control: FittingControlClient,
        vnode: VnodeHandle,
        partition: PartitionId,
        stage_handle: FittingHandle,
        stage_name: String,
    ) -> Self {
        let (alive_tx, alive_rx) = watch::channel(());
        Self {
            id,
            module,
            control,
            vnode,
            partition,
            stage_handle,
            stage_name,
            alive_tx,
            alive_rx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive this worker to completion. Consumes `self` so the
    /// `watch::Sender` backing its liveness monitor is dropped — whether
    /// this function returns normally or the task panics — the instant
    /// the worker is gone.
    #[instrument(skip(self), fields(stage = %self.stage_name, partition = %self.partition, worker = self.id))]
    pub async fn run(self) -> WorkerOutcome {
        let worker_ref = WorkerRef::new(self.id, self.vnode.clone(), self.alive_rx.clone());

        debug!(stage = %self.stage_name, partition = %self.partition, worker = self.id, "requesting details");
        let details = match self
            .control
            .get_details(self.partition, worker_ref.clone())
            .await
        {
            Ok(details) => details,
            Err(ControlError::Gone) => {
                warn!(stage = %self.stage_name, partition = %self.partition, "control gone before startup");
                return WorkerOutcome::ControlGone;
            }
        };

        let mut module_state = match self.module.init(self.partition, &details).await {
            Ok(state) => state,
            Err(failure) => {
                warn!(
                    stage = %self.stage_name, partition = %self.partition,
                    kind = ?failure.kind, info = %failure.info,
                    "worker init failed"
                );
                return WorkerOutcome::InitFailed;
            }
        };

        let emitter = Emitter::new(
            self.vnode.clone(),
            self.partition,
            details.name.clone(),
            self.stage_handle.clone(),
            details.output.clone(),
        );

        // `InitialInputRequest` -> zero-delay self-transition into
        // `WaitForInput`, breaking the synchronous deadlock that would
        // otherwise occur between worker creation and the first pull.
        let mut state = WorkerState::InitialInputRequest;
        tokio::task::yield_now().await;
        state = WorkerState::WaitForInput;
        debug_assert_eq!(state, WorkerState::WaitForInput);

        loop {
            debug_assert_eq!(state, WorkerState::WaitForInput);
            match self
                .vnode
                .next_input(self.stage_handle.clone(), self.partition, self.id)
                .await
            {
                NextInputReply::Input(payload) => {
                    module_state = self.module.process(payload, module_state, &emitter).await;
                }
                NextInputReply::Done => {
                    self.module.done(module_state).await;
                    self.control.worker_done(worker_ref).await;
                    info!(stage = %self.stage_name, partition = %self.partition, "worker done");
                    return WorkerOutcome::Done;
                }
                NextInputReply::Handoff(archive) => {
                    if self.module.supports_handoff() {
                        module_state = self.module.handoff(archive, module_state).await;
                    }
                    // else: discard the archive silently.
                }
                NextInputReply::Archive => {
                    let archive = if self.module.supports_archive() {
                        self.module.archive(&module_state).await
                    } else {
                        Archive::Undefined
                    };
                    self.vnode
                        .reply_archive(self.stage_handle.clone(), self.partition, self.id, archive)
                        .await;
                    self.control.worker_done(worker_ref).await;
                    info!(stage = %self.stage_name, partition = %self.partition, "worker archived");
                    return WorkerOutcome::Archived;
                }
            }
        }
    }
}
