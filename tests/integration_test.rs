//! End-to-end scenarios exercising the `FittingControl`/`Worker` EOI
//! synchronization protocol against the in-memory `testkit` collaborators.
//! Scenario labels (E1-E6) match spec.md §8.

use std::time::Duration;

use fitting_pipeline::builder::{self, BuilderLink};
use fitting_pipeline::control::FittingControlClient;
use fitting_pipeline::ids::{IdGenerator, PartitionId};
use fitting_pipeline::module::Archive;
use fitting_pipeline::spec::{FittingSpec, Options, PartFun};
use fitting_pipeline::testkit::{CountingDoubleModule, FakeSink, FakeVnode, MapModule, PassModule};
use fitting_pipeline::vnode::{OutputTarget, Vnode};
use fitting_pipeline::worker::Worker;
use std::sync::Arc;

fn p(n: u32) -> PartitionId {
    PartitionId(n)
}

/// Spawn a worker for `(stage, partition)` and return its background task.
fn spawn_worker(
    ids: &IdGenerator,
    module: Arc<dyn fitting_pipeline::module::FittingModule>,
    control: FittingControlClient,
    vnode: Arc<FakeVnode>,
    partition: PartitionId,
    stage_handle: fitting_pipeline::spec::FittingHandle,
    stage_name: &str,
) -> tokio::task::JoinHandle<fitting_pipeline::worker::WorkerOutcome> {
    let worker = Worker::new(
        ids.next(),
        module,
        control,
        vnode,
        partition,
        stage_handle,
        stage_name.to_string(),
    );
    tokio::spawn(worker.run())
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition never became true");
}

/// E1 — Pass-through: one stage, one partition, inputs [a, b, c] then EOI.
#[tokio::test]
async fn e1_pass_through_preserves_order() {
    let ids = IdGenerator::new();
    let (builder_link, _rx_unused) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "pass".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, _control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let worker_join = spawn_worker(
        &ids,
        Arc::new(PassModule),
        handle.control.clone(),
        vnode.clone(),
        p(0),
        handle.clone(),
        "pass",
    );

    vnode.push_input(&handle, p(0), serde_json::json!("a"));
    vnode.push_input(&handle, p(0), serde_json::json!("b"));
    vnode.push_input(&handle, p(0), serde_json::json!("c"));
    handle.control.eoi().await;

    worker_join.await.unwrap();
    wait_until(|| sink.eoi_seen()).await;

    assert_eq!(
        sink.received(),
        vec![
            serde_json::json!("a"),
            serde_json::json!("b"),
            serde_json::json!("c"),
        ]
    );
}

/// E2 — Empty pipeline: EOI with no workers ever registered forwards
/// immediately.
#[tokio::test]
async fn e2_empty_roster_forwards_eoi_immediately() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "pass".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    handle.control.eoi().await;
    control_join.await.unwrap();
    assert!(sink.eoi_seen());
}

/// E3 — Two stages, two partitions, FOLLOW routing: stage1 doubles,
/// stage2 adds one. Inputs 1 -> P0, 2 -> P1.
#[tokio::test]
async fn e3_two_stage_follow_routing() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec2 = FittingSpec {
        name: "add-one".into(),
        module: Arc::new(MapModule::new("add-one", |n| n + 1)),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle2, control2_join) = builder::spawn_fitting(
        &builder_link,
        spec2,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let spec1 = FittingSpec {
        name: "double".into(),
        module: Arc::new(MapModule::new("double", |n| n * 2)),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle1, control1_join) = builder::spawn_fitting(
        &builder_link,
        spec1,
        OutputTarget::Control(handle2.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let w1_p0 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("double", |n| n * 2)),
        handle1.control.clone(),
        vnode.clone(),
        p(0),
        handle1.clone(),
        "double",
    );
    let w1_p1 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("double", |n| n * 2)),
        handle1.control.clone(),
        vnode.clone(),
        p(1),
        handle1.clone(),
        "double",
    );
    let w2_p0 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("add-one", |n| n + 1)),
        handle2.control.clone(),
        vnode.clone(),
        p(0),
        handle2.clone(),
        "add-one",
    );
    let w2_p1 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("add-one", |n| n + 1)),
        handle2.control.clone(),
        vnode.clone(),
        p(1),
        handle2.clone(),
        "add-one",
    );

    vnode.push_input(&handle1, p(0), serde_json::json!(1));
    vnode.push_input(&handle1, p(1), serde_json::json!(2));
    handle1.control.eoi().await;

    w1_p0.await.unwrap();
    w1_p1.await.unwrap();
    control1_join.await.unwrap();
    w2_p0.await.unwrap();
    w2_p1.await.unwrap();
    control2_join.await.unwrap();

    let mut received: Vec<i64> = sink.received().iter().map(|v| v.as_i64().unwrap()).collect();
    received.sort();
    assert_eq!(received, vec![3, 5]);
    assert!(sink.eoi_seen());
}

/// E4 — Mid-stream handoff: a worker is archived after processing some
/// inputs; its archive is replayed to a successor worker on the same
/// partition, which processes the remaining inputs.
#[tokio::test]
async fn e4_mid_stream_handoff_preserves_continuity() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "counting-double".into(),
        module: Arc::new(CountingDoubleModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let predecessor_id = ids.next();
    let predecessor = Worker::new(
        predecessor_id,
        Arc::new(CountingDoubleModule),
        handle.control.clone(),
        vnode.clone(),
        p(0),
        handle.clone(),
        "counting-double".into(),
    );
    let predecessor_join = tokio::spawn(predecessor.run());

    vnode.push_input(&handle, p(0), serde_json::json!(1));
    vnode.push_input(&handle, p(0), serde_json::json!(2));

    // Wait for the predecessor to drain what's queued, then request its
    // archive.
    wait_until(|| vnode.pending(&handle, p(0)) == 0).await;
    let archive_rx = vnode.request_archive(&handle, predecessor_id);
    let outcome = predecessor_join.await.unwrap();
    assert!(matches!(outcome, fitting_pipeline::worker::WorkerOutcome::Archived));
    let archive = archive_rx.await.unwrap();
    assert!(matches!(archive, Archive::Value(_)));

    let successor_id = ids.next();
    vnode.push_handoff(&handle, successor_id, archive);
    let successor = Worker::new(
        successor_id,
        Arc::new(CountingDoubleModule),
        handle.control.clone(),
        vnode.clone(),
        p(0),
        handle.clone(),
        "counting-double".into(),
    );
    let successor_join = tokio::spawn(successor.run());

    vnode.push_input(&handle, p(0), serde_json::json!(3));
    vnode.push_input(&handle, p(0), serde_json::json!(4));
    handle.control.eoi().await;

    successor_join.await.unwrap();
    control_join.await.unwrap();

    let mut received: Vec<i64> = sink.received().iter().map(|v| v.as_i64().unwrap()).collect();
    received.sort();
    assert_eq!(received, vec![2, 4, 6, 8]);
}

/// E5 — Late worker: EOI reaches a stage's control while one partition
/// hasn't registered yet. That partition's worker must receive Details
/// and drain immediately, without a further EOI broadcast.
#[tokio::test]
async fn e5_late_worker_drains_after_eoi() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "pass".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    // P0 registers and finishes before EOI is sent at all.
    let w_p0 = spawn_worker(
        &ids,
        Arc::new(PassModule),
        handle.control.clone(),
        vnode.clone(),
        p(0),
        handle.clone(),
        "pass",
    );
    vnode.push_input(&handle, p(0), serde_json::json!("early"));

    // Give P0 a moment to register and drain its single input, then send
    // EOI while P1 has never requested details.
    wait_until(|| vnode.pending(&handle, p(0)) == 0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.control.eoi().await;
    w_p0.await.unwrap();

    // P1 arrives only now — after the control has moved to
    // WaitWorkersDone.
    vnode.push_input(&handle, p(1), serde_json::json!("late"));
    let w_p1 = spawn_worker(
        &ids,
        Arc::new(PassModule),
        handle.control.clone(),
        vnode.clone(),
        p(1),
        handle.clone(),
        "pass",
    );

    w_p1.await.unwrap();
    control_join.await.unwrap();

    let mut received: Vec<String> = sink
        .received()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    received.sort();
    assert_eq!(received, vec!["early".to_string(), "late".to_string()]);
    assert!(sink.eoi_seen());
}

/// E6 — Builder death: killing the builder link terminates the control
/// with `BuilderExited`; subsequent `GetDetails` calls observe `Gone`.
#[tokio::test]
async fn e6_builder_death_makes_control_gone() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "pass".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    builder_link.exit();
    control_join.await.unwrap();

    let worker_ref = fitting_pipeline::control::WorkerRef::new(
        ids.next(),
        vnode_for_gone_check(),
        tokio::sync::watch::channel(()).1,
    );
    let result = handle.control.get_details(p(0), worker_ref).await;
    assert!(matches!(
        result,
        Err(fitting_pipeline::error::ControlError::Gone)
    ));
}

fn vnode_for_gone_check() -> Arc<dyn Vnode> {
    FakeVnode::new()
}

/// Emission routing is governed by the *next* stage's `partfun`, not the
/// emitting stage's own — spec.md §4.2 ("if the next stage's partfun ==
/// SINK" / "if partfun == FOLLOW" / "otherwise compute partition =
/// partfun(output)" all refer to the downstream stage). Here stage1's own
/// `partfun` is `FOLLOW` (irrelevant to its own emission) while stage2's
/// is a custom odd/even splitter; each of stage2's two partitions applies
/// a distinguishable transform so a misrouted item is visible in the
/// output values, not just their multiset membership.
#[tokio::test]
async fn emission_routes_by_next_stages_partfun() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let splitter: Arc<dyn Fn(&serde_json::Value) -> PartitionId + Send + Sync> =
        Arc::new(|v: &serde_json::Value| {
            if v.as_i64().unwrap() % 2 == 0 {
                p(0)
            } else {
                p(1)
            }
        });
    let spec2 = FittingSpec {
        name: "splitter-target".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Custom(splitter),
    };
    let (handle2, control2_join) = builder::spawn_fitting(
        &builder_link,
        spec2,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let spec1 = FittingSpec {
        name: "source".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle1, control1_join) = builder::spawn_fitting(
        &builder_link,
        spec1,
        OutputTarget::Control(handle2.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let w1 = spawn_worker(
        &ids,
        Arc::new(PassModule),
        handle1.control.clone(),
        vnode.clone(),
        p(0),
        handle1.clone(),
        "source",
    );
    let w2_p0 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("p0", |n| n + 100)),
        handle2.control.clone(),
        vnode.clone(),
        p(0),
        handle2.clone(),
        "splitter-target",
    );
    let w2_p1 = spawn_worker(
        &ids,
        Arc::new(MapModule::new("p1", |n| n + 200)),
        handle2.control.clone(),
        vnode.clone(),
        p(1),
        handle2.clone(),
        "splitter-target",
    );

    for n in 0..4i64 {
        vnode.push_input(&handle1, p(0), serde_json::json!(n));
    }
    handle1.control.eoi().await;

    w1.await.unwrap();
    control1_join.await.unwrap();
    w2_p0.await.unwrap();
    w2_p1.await.unwrap();
    control2_join.await.unwrap();

    let mut received: Vec<i64> = sink.received().iter().map(|v| v.as_i64().unwrap()).collect();
    received.sort();
    assert_eq!(received, vec![100, 102, 201, 203]);
}

/// A spec with an empty name is rejected before any actor is spawned.
#[tokio::test]
async fn bad_spec_empty_name_is_rejected() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: String::new(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let result = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink),
        Options::default(),
        &ids,
    )
    .await;
    assert!(result.is_err());
}

/// A module whose `validate_arg` rejects its `arg` is reported as
/// `BadSpec` and never spawned.
#[tokio::test]
async fn bad_spec_rejecting_module_is_reported() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "rejects".into(),
        module: Arc::new(fitting_pipeline::testkit::RejectsArgModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let result = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink),
        Options::default(),
        &ids,
    )
    .await;
    assert!(result.is_err());
}

/// A worker whose `init` fails terminates without ever reporting `done`,
/// and does not block the stage's EOI barrier (it never registered).
#[tokio::test]
async fn init_failure_does_not_block_eoi() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "always-fails-init".into(),
        module: Arc::new(fitting_pipeline::testkit::AlwaysFailsInitModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let worker = Worker::new(
        ids.next(),
        Arc::new(fitting_pipeline::testkit::AlwaysFailsInitModule),
        handle.control.clone(),
        vnode.clone(),
        p(0),
        handle.clone(),
        "always-fails-init".into(),
    );
    let outcome = worker.run().await;
    assert!(matches!(
        outcome,
        fitting_pipeline::worker::WorkerOutcome::InitFailed
    ));

    // The stage never saw a registered worker, so EOI forwards immediately.
    handle.control.eoi().await;
    control_join.await.unwrap();
    assert!(sink.eoi_seen());
}

/// `Workers()` reports the roster's partitions, and re-sending
/// `GetDetails` for an already-registered (partition, worker) pair is a
/// no-op — the roster never grows a duplicate entry (R1).
#[tokio::test]
async fn workers_reports_roster_and_get_details_is_idempotent() {
    let ids = IdGenerator::new();
    let (builder_link, _rx) = BuilderLink::new();
    let vnode = FakeVnode::new();
    let sink = FakeSink::new();

    let spec = FittingSpec {
        name: "pass".into(),
        module: Arc::new(PassModule),
        arg: serde_json::Value::Null,
        partfun: PartFun::Follow,
    };
    let (handle, control_join) = builder::spawn_fitting(
        &builder_link,
        spec,
        OutputTarget::Sink(sink.clone()),
        Options::default(),
        &ids,
    )
    .await
    .expect("valid spec");

    let worker_id = ids.next();
    let worker_ref = fitting_pipeline::control::WorkerRef::new(
        worker_id,
        vnode.clone(),
        tokio::sync::watch::channel(()).1,
    );
    handle
        .control
        .get_details(p(0), worker_ref.clone())
        .await
        .expect("details");
    // A re-request for the same (partition, worker) pair must not grow
    // the roster past one entry.
    handle
        .control
        .get_details(p(0), worker_ref.clone())
        .await
        .expect("details");

    let workers = handle.control.workers().await.expect("roster");
    assert_eq!(workers, vec![p(0)]);

    // Simulate the registered worker reporting done, then upstream EOI —
    // with an empty roster, the control forwards immediately.
    handle.control.worker_done(worker_ref).await;
    handle.control.eoi().await;
    control_join.await.unwrap();
    assert!(sink.eoi_seen());
}

