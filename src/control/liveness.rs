//! Liveness monitoring: "monitor a peer, get a one-shot Down notification"
//! abstracted as a single operation returning an opaque, idempotently
//! cancellable token — per Design Notes §9.
//!
//! Realized with a `tokio::sync::watch` channel the worker holds the
//! sending half of for its whole lifetime (dropped on exit, for any
//! reason, normal or panic) and a small watcher task that turns "the
//! channel closed" into a `WorkerDown` message back to the control's own
//! mailbox. Cancelling the monitor is `AbortHandle::abort()` on the
//! watcher task, which tokio guarantees is safe to call more than once.

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::ControlMsg;
use super::roster::WorkerRef;

pub fn spawn_monitor(worker: WorkerRef, notify: mpsc::Sender<ControlMsg>) -> AbortHandle {
    let mut alive = worker.alive_watch();
    let watched = worker;
    let task = tokio::spawn(async move {
        // Resolves once the worker's `watch::Sender` is dropped.
        let _ = alive.changed().await;
        let _ = notify.send(ControlMsg::WorkerDown { worker: watched }).await;
    });
    task.abort_handle()
}
