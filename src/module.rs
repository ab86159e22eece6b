//! # User-Supplied Fitting Modules
//!
//! The callback contract a fitting module must satisfy: required
//! `init`/`process`/`done`, optional `validate_arg`/`handoff`/`archive`.
//!
//! A dynamically loadable module has no Rust equivalent, so the module the
//! builder supplies at pipeline construction *is* the `Arc<dyn
//! FittingModule>` the stage drives for its whole lifetime; a module's
//! name survives purely as the printable label used in logs and
//! `BadSpec` messages.

use async_trait::async_trait;
use std::any::Any;
use std::fmt;

use crate::error::InitFailed;
use crate::ids::PartitionId;
use crate::spec::FittingDetails;
use crate::worker::emit::Emitter;

/// The opaque payload flowing between stages. Kept as JSON rather than a
/// generic type parameter because a single running pipeline hosts many
/// differently-typed fittings side by side; `FittingControl`/`Worker` are
/// not generic over it.
pub type Item = serde_json::Value;

/// An opaque value exchanged by a module's `archive`/`handoff` pair during
/// cross-node worker relocation. `Undefined` is the distinguished value a
/// worker replies with when its module does not export `archive`.
#[derive(Debug, Clone)]
pub enum Archive {
    Undefined,
    Value(serde_json::Value),
}

/// A module's private processing state, threaded opaquely through
/// `init`/`process`/`handoff`/`archive`/`done`. Type-erased because the
/// core never inspects it — only the module that produced it ever
/// downcasts it back.
pub struct ModuleState(Box<dyn Any + Send>);

impl ModuleState {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        ModuleState(Box::new(value))
    }

    /// Recover the concrete state a module previously stashed. Panics if
    /// called against a state the module itself didn't produce — a
    /// programming error in the module, not something the core can
    /// sensibly recover from.
    pub fn downcast<T: 'static>(self) -> T {
        *self
            .0
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("module_state downcast to wrong type"))
    }

    /// Read a copy of the stashed state without consuming it — for
    /// callbacks like `archive` that only ever borrow the state.
    pub fn peek<T: Clone + 'static>(&self) -> T {
        self.0
            .downcast_ref::<T>()
            .unwrap_or_else(|| panic!("module_state downcast to wrong type"))
            .clone()
    }
}

impl fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleState(..)")
    }
}

/// The callback contract a fitting module must implement.
///
/// `process` and `done` are infallible at this layer: there is no
/// process-failure error taxonomy, so a module that wants to fail
/// mid-stream panics, which the Worker FSM surfaces as an ordinary task
/// crash — exactly the `WorkerVanished` path an upstream liveness monitor
/// already handles.
#[async_trait]
pub trait FittingModule: Send + Sync {
    /// Printable label for this module, used in logs and error messages.
    fn name(&self) -> &str;

    /// Validate `arg` at pipeline-construction time. Default: always ok.
    async fn validate_arg(&self, _arg: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    /// Build this fitting's per-partition state. May fail — a failed
    /// `init` terminates the worker with that reason; the vnode decides
    /// whether to retry on the next input.
    async fn init(
        &self,
        partition: PartitionId,
        details: &FittingDetails,
    ) -> Result<ModuleState, InitFailed>;

    /// Process one input, emitting zero or more outputs via `emit`, and
    /// return the (possibly updated) module state.
    async fn process(&self, input: Item, state: ModuleState, emit: &Emitter) -> ModuleState;

    /// Called once, after the last input (or immediately, if the worker
    /// never receives any), before the worker terminates normally.
    async fn done(&self, state: ModuleState);

    /// Whether this module exports `handoff`. Default: no.
    fn supports_handoff(&self) -> bool {
        false
    }

    /// Adopt a replayed archive from a predecessor worker. Only invoked
    /// when `supports_handoff()` is true; the Worker FSM discards the
    /// archive silently otherwise.
    async fn handoff(&self, _archive: Archive, state: ModuleState) -> ModuleState {
        state
    }

    /// Whether this module exports `archive`. Default: no.
    fn supports_archive(&self) -> bool {
        false
    }

    /// Snapshot this worker's state for handoff to a successor. Only
    /// invoked when `supports_archive()` is true; the Worker FSM replies
    /// with `Archive::Undefined` otherwise.
    async fn archive(&self, _state: &ModuleState) -> Archive {
        Archive::Undefined
    }
}
