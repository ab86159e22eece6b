//! # Pipeline Errors
//!
//! A small transport-level error for mailbox plumbing, plus the domain
//! taxonomy proper (`BadSpec`, `InitFailed`, `BuilderExited`, `Gone`,
//! `WorkerVanished`). The core never retries a failed callback — callers
//! decide what, if anything, to do about a failure.

use thiserror::Error;

/// Errors raised by the mailbox plumbing shared by `FittingControl` and
/// `Worker` clients — closed channels, dropped reply senders.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("actor mailbox closed")]
    Closed,
    #[error("actor dropped the reply channel")]
    Dropped,
}

/// A loadable module's `arg` failed validation, or its `partfun` was
/// structurally malformed. Raised at pipeline-construction time; never
/// retried.
#[derive(Debug, Error, Clone)]
#[error("bad fitting spec: {0}")]
pub struct BadSpec(pub String);

/// Classification of a worker's `init` failure, as returned or thrown by
/// the module's `init` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitFailureKind {
    /// The module rejected its `arg`/partition combination.
    Rejected,
    /// The module raised an unexpected error during setup.
    Unexpected,
}

#[derive(Debug, Error, Clone)]
#[error("worker init failed: {kind:?}: {info}")]
pub struct InitFailed {
    pub kind: InitFailureKind,
    pub info: String,
}

/// Errors a caller of `FittingControl`'s operations may observe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The addressed `FittingControl` has already terminated — normally
    /// or via `BuilderExited`. Callers must treat this as "the stage is
    /// done or failed" and unwind; it is never retried by the core.
    #[error("fitting control is gone")]
    Gone,
}

impl From<MailboxError> for ControlError {
    fn from(_: MailboxError) -> Self {
        ControlError::Gone
    }
}
