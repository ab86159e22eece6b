//! # Fitting Specification, Routing, and Pipeline Options
//!
//! `FittingSpec` (supplied by the builder at pipeline construction),
//! `FittingHandle` (the immutable reference to a running stage), and
//! `FittingDetails` (what a worker actually receives). Validation lives
//! alongside them.

use std::fmt;
use std::sync::Arc;

use crate::control::client::FittingControlClient;
use crate::error::BadSpec;
use crate::module::{FittingModule, Item};
use crate::vnode::OutputTarget;

/// Routing selector for a stage's outputs.
#[derive(Clone)]
pub enum PartFun {
    /// Route to the same partition as the sender.
    Follow,
    /// Deliver to the pipeline sink.
    Sink,
    /// A deterministic pure function from an output item to the
    /// partition it belongs on.
    Custom(Arc<dyn Fn(&Item) -> crate::ids::PartitionId + Send + Sync>),
}

impl fmt::Debug for PartFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartFun::Follow => f.write_str("Follow"),
            PartFun::Sink => f.write_str("Sink"),
            PartFun::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Pipeline-global options, threaded read-only through `FittingDetails`.
/// Constructed once by the (out-of-scope) builder; the core never
/// mutates it.
#[derive(Debug, Clone)]
pub struct Options {
    pub trace_level: TraceLevel,
    /// Soft cap a vnode implementation may honor for its downstream work
    /// queues. The core never reads this — it exists purely as a named
    /// hook for bounding emission backpressure; policy remains the
    /// vnode's concern.
    pub queue_soft_limit: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trace_level: TraceLevel::Info,
            queue_soft_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    Off,
    Info,
    Debug,
}

#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: Options::default(),
        }
    }

    pub fn trace_level(mut self, level: TraceLevel) -> Self {
        self.options.trace_level = level;
        self
    }

    pub fn queue_soft_limit(mut self, limit: usize) -> Self {
        self.options.queue_soft_limit = Some(limit);
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

/// Immutable, supplied at pipeline construction.
#[derive(Clone)]
pub struct FittingSpec {
    pub name: String,
    pub module: Arc<dyn FittingModule>,
    pub arg: serde_json::Value,
    pub partfun: PartFun,
}

impl fmt::Debug for FittingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittingSpec")
            .field("name", &self.name)
            .field("module", &self.module.name())
            .field("arg", &self.arg)
            .field("partfun", &self.partfun)
            .finish()
    }
}

/// Immutable once assigned. Cheap to clone and pass around — it carries
/// only a client handle, an id, and a cached routing function.
#[derive(Clone)]
pub struct FittingHandle {
    pub control: FittingControlClient,
    /// Freshly minted, distinguishes this handle across reincarnations of
    /// the same stage.
    pub unique_id: u64,
    pub partfun: PartFun,
}

impl fmt::Debug for FittingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittingHandle")
            .field("unique_id", &self.unique_id)
            .field("partfun", &self.partfun)
            .finish()
    }
}

/// Distributed to workers on demand via `GetDetails`. The spec fields
/// plus the next stage's handle (or the sink) and the pipeline's options.
#[derive(Clone)]
pub struct FittingDetails {
    pub name: String,
    pub module: Arc<dyn FittingModule>,
    pub arg: serde_json::Value,
    pub partfun: PartFun,
    pub output: OutputTarget,
    pub options: Options,
}

impl fmt::Debug for FittingDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittingDetails")
            .field("name", &self.name)
            .field("module", &self.module.name())
            .field("partfun", &self.partfun)
            .field("options", &self.options)
            .finish()
    }
}

/// Validate a `FittingSpec` before the pipeline is constructed. Never
/// retried on failure.
pub async fn validate_spec(spec: &FittingSpec) -> Result<(), BadSpec> {
    if spec.name.is_empty() {
        return Err(BadSpec("fitting name must not be empty".into()));
    }
    spec.module
        .validate_arg(&spec.arg)
        .await
        .map_err(|reason| BadSpec(format!("{}: {reason}", spec.name)))
}
