//! # FittingControl
//!
//! The single actor per stage that holds the spec, owns the worker
//! roster, and coordinates end-of-inputs. Two states, `WaitUpstreamEOI`
//! (initial) and `WaitWorkersDone`; terminal: normal termination once EOI
//! has been forwarded downstream.
//!
//! Realized as an `mpsc::Receiver` drained in a loop, one `match` arm per
//! operation, `oneshot` replies, `tracing` spans around every transition
//! — the same generic-actor shape used elsewhere in this crate. Unlike a
//! resource actor generic over a single entity type, this actor is not
//! generic over the fitting module — a pipeline hosts many different
//! modules side by side, so the module is reached through
//! `Arc<dyn FittingModule>` instead (see DESIGN.md).

pub mod client;
mod liveness;
pub mod roster;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, instrument, warn};

use crate::error::ControlError;
use crate::ids::PartitionId;
use crate::spec::{FittingDetails, FittingHandle, FittingSpec, Options};
use crate::vnode::OutputTarget;

pub use client::FittingControlClient;
pub use roster::{Roster, WorkerEntry, WorkerRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    WaitUpstreamEoi,
    WaitWorkersDone,
}

pub enum ControlMsg {
    GetDetails {
        partition: PartitionId,
        worker: WorkerRef,
        reply: oneshot::Sender<Result<FittingDetails, ControlError>>,
    },
    Eoi,
    WorkerDone {
        worker: WorkerRef,
    },
    Workers {
        reply: oneshot::Sender<Result<Vec<PartitionId>, ControlError>>,
    },
    /// Internal: a liveness monitor fired. Not part of the actor's
    /// external interface — delivered by `liveness::spawn_monitor` back
    /// into this actor's own mailbox.
    WorkerDown {
        worker: WorkerRef,
    },
}

struct FittingControlActor {
    receiver: mpsc::Receiver<ControlMsg>,
    self_sender: mpsc::Sender<ControlMsg>,
    builder_alive: watch::Receiver<()>,
    spec: FittingSpec,
    self_handle: FittingHandle,
    details: FittingDetails,
    output: OutputTarget,
    roster: Roster,
    state: ControlState,
}

/// Spawn a `FittingControl` for `spec`, linking it to `builder_alive`
/// (dropping the paired `watch::Sender` terminates this control with
/// `BuilderExited`) and wiring its output to `output`.
///
/// Returns the stage's `FittingHandle` and the background task's
/// `JoinHandle`.
pub fn spawn(
    spec: FittingSpec,
    output: OutputTarget,
    options: Options,
    unique_id: u64,
    builder_alive: watch::Receiver<()>,
) -> (FittingHandle, tokio::task::JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(64);
    let control_client = FittingControlClient::new(sender.clone());
    let self_handle = FittingHandle {
        control: control_client,
        unique_id,
        partfun: spec.partfun.clone(),
    };
    let details = FittingDetails {
        name: spec.name.clone(),
        module: spec.module.clone(),
        arg: spec.arg.clone(),
        partfun: spec.partfun.clone(),
        output: output.clone(),
        options,
    };
    let actor = FittingControlActor {
        receiver,
        self_sender: sender,
        builder_alive,
        spec,
        self_handle: self_handle.clone(),
        details,
        output,
        roster: Roster::new(),
        state: ControlState::WaitUpstreamEoi,
    };
    let join = tokio::spawn(actor.run());
    (self_handle, join)
}

impl FittingControlActor {
    #[instrument(skip(self), fields(stage = %self.spec.name))]
    async fn run(mut self) {
        info!(stage = %self.spec.name, "fitting control started");
        loop {
            tokio::select! {
                biased;
                changed = self.builder_alive.changed() => {
                    if changed.is_err() {
                        warn!(stage = %self.spec.name, "builder exited; terminating (BuilderExited)");
                        return;
                    }
                }
                msg = self.receiver.recv() => {
                    match msg {
                        None => {
                            debug!(stage = %self.spec.name, "all clients dropped; terminating");
                            return;
                        }
                        Some(msg) => {
                            if self.handle(msg).await {
                                info!(stage = %self.spec.name, "fitting control terminated normally");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Returns `true` if the control should terminate after this message.
    async fn handle(&mut self, msg: ControlMsg) -> bool {
        match msg {
            ControlMsg::GetDetails {
                partition,
                worker,
                reply,
            } => {
                self.on_get_details(partition, worker, reply).await;
                false
            }
            ControlMsg::Eoi => self.on_eoi().await,
            ControlMsg::WorkerDone { worker } => self.on_worker_done(worker).await,
            ControlMsg::Workers { reply } => {
                let _ = reply.send(Ok(self.roster.partitions()));
                false
            }
            ControlMsg::WorkerDown { worker } => self.on_worker_down(worker).await,
        }
    }

    async fn on_get_details(
        &mut self,
        partition: PartitionId,
        worker: WorkerRef,
        reply: oneshot::Sender<Result<FittingDetails, ControlError>>,
    ) {
        let late_arrival = self.state == ControlState::WaitWorkersDone;
        if !self.roster.contains(partition, &worker) {
            let token = liveness::spawn_monitor(worker.clone(), self.self_sender.clone());
            self.roster.insert(WorkerEntry {
                partition_id: partition,
                worker_ref: worker.clone(),
                liveness_token: token,
            });
            debug!(stage = %self.spec.name, %partition, worker = ?worker, "worker registered");
        }
        let _ = reply.send(Ok(self.details.clone()));
        if late_arrival {
            info!(
                stage = %self.spec.name, %partition,
                "late arrival after EOI broadcast; draining immediately"
            );
            worker
                .vnode()
                .deliver_eoi(self.self_handle.clone(), partition)
                .await;
        }
    }

    /// Returns `true` if the control should terminate.
    async fn on_eoi(&mut self) -> bool {
        if self.roster.is_empty() {
            info!(stage = %self.spec.name, "EOI with empty roster; forwarding immediately");
            self.output.forward_eoi().await;
            return true;
        }
        info!(
            stage = %self.spec.name, workers = self.roster.len(),
            "EOI received; broadcasting to roster"
        );
        for entry in self.roster.iter() {
            entry
                .worker_ref
                .vnode()
                .deliver_eoi(self.self_handle.clone(), entry.partition_id)
                .await;
        }
        self.state = ControlState::WaitWorkersDone;
        false
    }

    /// Returns `true` if the control should terminate.
    async fn on_worker_done(&mut self, worker: WorkerRef) -> bool {
        if let Some(entry) = self.roster.remove_by_worker(&worker) {
            entry.liveness_token.abort();
        }
        if self.state == ControlState::WaitUpstreamEoi {
            // EOI has not been seen yet; this is a handoff-induced
            // termination on the worker's old partition. Do not check
            // for an empty roster.
            return false;
        }
        if self.roster.is_empty() {
            info!(stage = %self.spec.name, "last worker done; forwarding EOI downstream");
            self.output.forward_eoi().await;
            return true;
        }
        false
    }

    /// Returns `true` if the control should terminate.
    async fn on_worker_down(&mut self, worker: WorkerRef) -> bool {
        if let Some(entry) = self.roster.remove_by_worker(&worker) {
            entry.liveness_token.abort();
            warn!(stage = %self.spec.name, worker = ?entry.worker_ref, "worker vanished (WorkerVanished)");
        }
        if self.state == ControlState::WaitWorkersDone && self.roster.is_empty() {
            self.output.forward_eoi().await;
            return true;
        }
        false
    }
}
