//! The client half of a `FittingControl` — a cheap, cloneable handle any
//! worker (or test harness) can use to call `GetDetails`/`EOI`/
//! `WorkerDone`/`Workers`: hold only a sender, forward requests over an
//! mpsc channel, resolve replies via a oneshot.

use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use super::ControlMsg;
use super::roster::WorkerRef;
use crate::error::{ControlError, MailboxError};
use crate::ids::PartitionId;
use crate::spec::FittingDetails;

#[derive(Clone)]
pub struct FittingControlClient {
    sender: mpsc::Sender<ControlMsg>,
}

impl FittingControlClient {
    pub(crate) fn new(sender: mpsc::Sender<ControlMsg>) -> Self {
        Self { sender }
    }

    /// `GetDetails(partition, worker_ref)` — the caller asserts it is the
    /// worker at `partition`.
    #[instrument(skip(self, worker))]
    pub async fn get_details(
        &self,
        partition: PartitionId,
        worker: WorkerRef,
    ) -> Result<FittingDetails, ControlError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ControlMsg::GetDetails {
                partition,
                worker,
                reply,
            })
            .await
            .map_err(|_| MailboxError::Closed)?;
        response.await.map_err(|_| MailboxError::Dropped)?
    }

    /// `EOI()` — never errors; a control that has already terminated
    /// simply never processes it.
    #[instrument(skip(self))]
    pub async fn eoi(&self) {
        let _ = self.sender.send(ControlMsg::Eoi).await;
    }

    /// `WorkerDone(worker_ref)` — never errors, same reasoning as `eoi`.
    #[instrument(skip(self, worker))]
    pub async fn worker_done(&self, worker: WorkerRef) {
        let _ = self.sender.send(ControlMsg::WorkerDone { worker }).await;
    }

    /// `Workers()` — the partitions currently in the roster.
    #[instrument(skip(self))]
    pub async fn workers(&self) -> Result<Vec<PartitionId>, ControlError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ControlMsg::Workers { reply })
            .await
            .map_err(|_| MailboxError::Closed)?;
        response.await.map_err(|_| MailboxError::Dropped)?
    }
}
