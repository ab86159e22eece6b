#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Fitting Pipeline
//!
//! > **A library for building and running fitting pipelines: chains of
//! > independently-scaled stages that stream items from partition to
//! > partition until they reach a sink.**
//!
//! A pipeline is a sequence of *fittings*. Each fitting is driven by one
//! `FittingControl` actor (one per stage) and a pool of `Worker` actors
//! (one per partition currently doing work on that stage). Items flow
//! forward through a vnode subsystem — not implemented here, since
//! partition placement and queueing are the hosting application's
//! concern — that the core treats as a pair of collaborator traits,
//! [`vnode::Vnode`] and [`vnode::Sink`].
//!
//! ## Core Concepts
//!
//! ### Two actors, one per stage and one per active partition
//! [`control::FittingControl`] (reached through
//! [`control::FittingControlClient`]) owns a stage's worker roster and
//! decides when the stage has truly drained. [`worker::Worker`] hosts one
//! running instance of the stage's [`module::FittingModule`] and pulls
//! its own inputs — it has no mailbox of its own.
//!
//! ### Type erasure instead of a generic actor
//! A single running pipeline hosts many differently-typed fittings side
//! by side, so neither actor is generic over its module the way a
//! single-entity actor would be. Module state crosses the boundary as an
//! opaque [`module::ModuleState`]; payloads and archives travel as
//! [`serde_json::Value`].
//!
//! ### Liveness via `watch`, not supervision
//! There is no process-linking primitive to borrow, so a worker's
//! liveness is modeled with a `tokio::sync::watch` channel it holds for
//! its own lifetime: the sender's `Drop` (on success, panic, or abort
//! alike) resolves a paired receiver in a small monitor task, which
//! reports `WorkerDown` back to the owning control.
//!
//! ## Module Tour
//!
//! - [`spec`] — `FittingSpec`, `FittingHandle`, `FittingDetails`,
//!   `PartFun`, pipeline-wide `Options`, and spec validation.
//! - [`module`] — the `FittingModule` callback contract and its opaque
//!   `Item`/`Archive`/`ModuleState` types.
//! - [`vnode`] — the `Vnode`/`Sink` collaborator traits and
//!   `OutputTarget`.
//! - [`control`] — `FittingControl`, its client, and the worker roster.
//! - [`worker`] — `Worker` and the `Emitter` its module callbacks use to
//!   route outputs.
//! - [`builder`] — the single entry point a pipeline builder uses to
//!   stand up one stage, linked to the builder's own liveness.
//! - [`ids`] — shared id generation and the `PartitionId` newtype.
//! - [`error`] — the crate's error taxonomy.
//! - [`tracing_init`] — structured logging setup.
//! - [`testkit`] — in-memory `Vnode`/`Sink` fakes and sample modules,
//!   used by this crate's own tests and available to downstream ones.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod builder;
pub mod control;
pub mod error;
pub mod ids;
pub mod module;
pub mod spec;
pub mod testkit;
pub mod tracing_init;
pub mod vnode;
pub mod worker;
