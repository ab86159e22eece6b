//! # Test Kit
//!
//! In-memory stand-ins for the vnode subsystem and the sink, plus a
//! handful of trivial fitting modules: let tests exercise real
//! `FittingControl`/`Worker` actors without a real distributed transport.
//!
//! `FakeVnode` is shared by every stage in a test pipeline (there is only
//! ever "one vnode" in these tests), keyed internally by
//! `(stage.unique_id, partition)`, so `emit`'s `queue_work` calls from one
//! stage's workers land directly in the next stage's input queue.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{InitFailed, InitFailureKind};
use crate::ids::PartitionId;
use crate::module::{Archive, FittingModule, Item, ModuleState};
use crate::spec::FittingDetails;
use crate::vnode::{NextInputReply, Sink, Vnode};
use crate::worker::emit::Emitter;

enum Directive {
    Archive,
    Handoff(Archive),
}

#[derive(Default)]
struct FakeVnodeInner {
    queues: HashMap<(u64, PartitionId), std::collections::VecDeque<Item>>,
    draining: HashSet<(u64, PartitionId)>,
    directives: HashMap<(u64, u64), Directive>,
    archive_waiters: HashMap<(u64, u64), oneshot::Sender<Archive>>,
}

/// A single in-memory vnode shared across every stage of a test pipeline.
pub struct FakeVnode {
    inner: Mutex<FakeVnodeInner>,
}

impl FakeVnode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(FakeVnodeInner::default()),
        })
    }

    pub fn push_input(&self, stage: &crate::spec::FittingHandle, partition: PartitionId, item: Item) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .queues
            .entry((stage.unique_id, partition))
            .or_default()
            .push_back(item);
    }

    /// Arrange for worker `worker_id` on `(stage, partition)`'s *next*
    /// `NextInput` pull to receive an `ARCHIVE` directive; resolves once
    /// the worker replies.
    pub fn request_archive(
        &self,
        stage: &crate::spec::FittingHandle,
        worker_id: u64,
    ) -> oneshot::Receiver<Archive> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        inner
            .directives
            .insert((stage.unique_id, worker_id), Directive::Archive);
        inner.archive_waiters.insert((stage.unique_id, worker_id), tx);
        rx
    }

    /// Arrange for worker `worker_id`'s *next* `NextInput` pull to replay
    /// `archive` via a `HANDOFF` reply — used to stand a successor worker
    /// up on the archive a predecessor just produced.
    pub fn push_handoff(&self, stage: &crate::spec::FittingHandle, worker_id: u64, archive: Archive) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .directives
            .insert((stage.unique_id, worker_id), Directive::Handoff(archive));
    }

    fn queue_len(&self, stage_id: u64, partition: PartitionId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .queues
            .get(&(stage_id, partition))
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Vnode for FakeVnode {
    async fn next_input(
        &self,
        stage: crate::spec::FittingHandle,
        partition: PartitionId,
        worker: u64,
    ) -> NextInputReply {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(directive) = inner.directives.remove(&(stage.unique_id, worker)) {
                    return match directive {
                        Directive::Archive => NextInputReply::Archive,
                        Directive::Handoff(archive) => NextInputReply::Handoff(archive),
                    };
                }
                let key = (stage.unique_id, partition);
                if let Some(item) = inner.queues.get_mut(&key).and_then(|q| q.pop_front()) {
                    return NextInputReply::Input(item);
                }
                if inner.draining.contains(&key) {
                    return NextInputReply::Done;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn reply_archive(
        &self,
        stage: crate::spec::FittingHandle,
        _partition: PartitionId,
        worker: u64,
        archive: Archive,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.archive_waiters.remove(&(stage.unique_id, worker)) {
            let _ = tx.send(archive);
        }
    }

    async fn queue_work(&self, next: crate::spec::FittingHandle, output: Item, partition: PartitionId) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .queues
            .entry((next.unique_id, partition))
            .or_default()
            .push_back(output);
    }

    async fn deliver_eoi(&self, stage: crate::spec::FittingHandle, partition: PartitionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.draining.insert((stage.unique_id, partition));
    }
}

// Exposed for tests that want to assert nothing was silently dropped.
impl FakeVnode {
    pub fn pending(&self, stage: &crate::spec::FittingHandle, partition: PartitionId) -> usize {
        self.queue_len(stage.unique_id, partition)
    }
}

/// An in-memory sink recording everything delivered to it.
pub struct FakeSink {
    received: Mutex<Vec<Item>>,
    eoi: Mutex<bool>,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            eoi: Mutex::new(false),
        })
    }

    pub fn received(&self) -> Vec<Item> {
        self.received.lock().unwrap().clone()
    }

    pub fn eoi_seen(&self) -> bool {
        *self.eoi.lock().unwrap()
    }
}

#[async_trait]
impl Sink for FakeSink {
    async fn deliver(&self, _stage_name: String, _stage: crate::spec::FittingHandle, output: Item) {
        self.received.lock().unwrap().push(output);
    }

    async fn eoi(&self) {
        *self.eoi.lock().unwrap() = true;
    }
}

/// Emits every input unchanged.
pub struct PassModule;

#[async_trait]
impl FittingModule for PassModule {
    fn name(&self) -> &str {
        "pass"
    }

    async fn init(&self, _partition: PartitionId, _details: &FittingDetails) -> Result<ModuleState, InitFailed> {
        Ok(ModuleState::new(()))
    }

    async fn process(&self, input: Item, state: ModuleState, emit: &Emitter) -> ModuleState {
        emit.emit(input).await;
        state
    }

    async fn done(&self, _state: ModuleState) {}
}

/// Applies an integer transform to each input and emits the result.
pub struct MapModule {
    name: String,
    f: Arc<dyn Fn(i64) -> i64 + Send + Sync>,
}

impl MapModule {
    pub fn new(name: impl Into<String>, f: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

#[async_trait]
impl FittingModule for MapModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, _partition: PartitionId, _details: &FittingDetails) -> Result<ModuleState, InitFailed> {
        Ok(ModuleState::new(()))
    }

    async fn process(&self, input: Item, state: ModuleState, emit: &Emitter) -> ModuleState {
        let n = input.as_i64().unwrap_or(0);
        emit.emit(serde_json::json!((self.f)(n))).await;
        state
    }

    async fn done(&self, _state: ModuleState) {}
}

/// Doubles each input and supports handoff: its module state is a running
/// count of items processed, archived/restored as plain JSON, so tests can
/// assert continuity across a handoff.
pub struct CountingDoubleModule;

#[async_trait]
impl FittingModule for CountingDoubleModule {
    fn name(&self) -> &str {
        "counting-double"
    }

    async fn init(&self, _partition: PartitionId, _details: &FittingDetails) -> Result<ModuleState, InitFailed> {
        Ok(ModuleState::new(0i64))
    }

    async fn process(&self, input: Item, state: ModuleState, emit: &Emitter) -> ModuleState {
        let n = input.as_i64().unwrap_or(0);
        emit.emit(serde_json::json!(n * 2)).await;
        let count: i64 = state.downcast();
        ModuleState::new(count + 1)
    }

    async fn done(&self, _state: ModuleState) {}

    fn supports_handoff(&self) -> bool {
        true
    }

    async fn handoff(&self, archive: Archive, _state: ModuleState) -> ModuleState {
        let count = match archive {
            Archive::Value(v) => v.as_i64().unwrap_or(0),
            Archive::Undefined => 0,
        };
        ModuleState::new(count)
    }

    fn supports_archive(&self) -> bool {
        true
    }

    async fn archive(&self, state: &ModuleState) -> Archive {
        Archive::Value(serde_json::json!(state.peek::<i64>()))
    }
}

/// A module whose `init` always fails, for exercising `InitFailed`.
pub struct AlwaysFailsInitModule;

#[async_trait]
impl FittingModule for AlwaysFailsInitModule {
    fn name(&self) -> &str {
        "always-fails-init"
    }

    async fn init(&self, _partition: PartitionId, _details: &FittingDetails) -> Result<ModuleState, InitFailed> {
        Err(InitFailed {
            kind: InitFailureKind::Rejected,
            info: "synthetic failure for testing".into(),
        })
    }

    async fn process(&self, _input: Item, state: ModuleState, _emit: &Emitter) -> ModuleState {
        state
    }

    async fn done(&self, _state: ModuleState) {}
}

/// A module whose `validate_arg` always rejects, for exercising `BadSpec`.
pub struct RejectsArgModule;

#[async_trait]
impl FittingModule for RejectsArgModule {
    fn name(&self) -> &str {
        "rejects-arg"
    }

    async fn validate_arg(&self, _arg: &serde_json::Value) -> Result<(), String> {
        Err("arg is never acceptable".into())
    }

    async fn init(&self, _partition: PartitionId, _details: &FittingDetails) -> Result<ModuleState, InitFailed> {
        Ok(ModuleState::new(()))
    }

    async fn process(&self, input: Item, state: ModuleState, emit: &Emitter) -> ModuleState {
        emit.emit(input).await;
        state
    }

    async fn done(&self, _state: ModuleState) {}
}
