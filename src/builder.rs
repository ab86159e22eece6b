//! # Builder Contract
//!
//! The pipeline builder itself — constructing a whole pipeline, linking
//! stages, supplying initial wiring — is an external collaborator. What
//! lives here is the single entry point the builder uses to stand up one
//! stage's `FittingControl`: validate the spec, spawn the control, and
//! bind its liveness to the builder so that builder death propagates as
//! `BuilderExited`.

use tokio::sync::watch;

use crate::error::BadSpec;
use crate::ids::IdGenerator;
use crate::spec::{FittingHandle, FittingSpec, Options, validate_spec};
use crate::vnode::OutputTarget;

/// The builder's side of the liveness link to a `FittingControl`. Dropping
/// this (or calling `exit`) terminates every control built through it with
/// `BuilderExited`.
pub struct BuilderLink {
    alive: watch::Sender<()>,
}

impl BuilderLink {
    pub fn new() -> (Self, watch::Receiver<()>) {
        let (alive, rx) = watch::channel(());
        (Self { alive }, rx)
    }

    /// Explicitly signal builder death, e.g. on fatal construction error.
    pub fn exit(self) {
        drop(self);
    }

    fn subscribe(&self) -> watch::Receiver<()> {
        self.alive.subscribe()
    }
}

/// Validate `spec` and spawn its `FittingControl`, linked to `builder`.
///
/// Returns the stage's `FittingHandle` and the control's background task
/// handle, or `BadSpec` if validation fails — never retried.
pub async fn spawn_fitting(
    builder: &BuilderLink,
    spec: FittingSpec,
    output: OutputTarget,
    options: Options,
    ids: &IdGenerator,
) -> Result<(FittingHandle, tokio::task::JoinHandle<()>), BadSpec> {
    validate_spec(&spec).await?;
    let unique_id = ids.next();
    Ok(crate::control::spawn(
        spec,
        output,
        options,
        unique_id,
        builder.subscribe(),
    ))
}
