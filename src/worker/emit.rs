//! The `emit(output)` primitive a module's `process` callback uses to
//! route its outputs.
//!
//! Routing is governed by the *next* stage's `partfun`, cached on the
//! `FittingHandle` the current stage's `FittingDetails` holds as
//! `output` — exactly the "so routers need not dereference control"
//! rationale spec.md §3 gives for caching it there. `SINK` delivers
//! directly to the sink, `FOLLOW` enqueues at the sender's own
//! partition, and a custom function computes the destination partition.
//! Emission is best-effort and non-blocking from the worker's point of
//! view — queue backpressure is the vnode's concern.

use crate::ids::PartitionId;
use crate::module::Item;
use crate::spec::{FittingHandle, PartFun};
use crate::vnode::{OutputTarget, VnodeHandle};

pub struct Emitter {
    vnode: VnodeHandle,
    from_partition: PartitionId,
    self_name: String,
    self_handle: FittingHandle,
    output: OutputTarget,
}

impl Emitter {
    pub(crate) fn new(
        vnode: VnodeHandle,
        from_partition: PartitionId,
        self_name: String,
        self_handle: FittingHandle,
        output: OutputTarget,
    ) -> Self {
        Self {
            vnode,
            from_partition,
            self_name,
            self_handle,
            output,
        }
    }

    pub async fn emit(&self, output: Item) {
        match &self.output {
            OutputTarget::Sink(sink) => {
                sink.deliver(self.self_name.clone(), self.self_handle.clone(), output)
                    .await;
            }
            OutputTarget::Control(next) => match &next.partfun {
                PartFun::Sink => {
                    unreachable!(
                        "next stage's partfun is SINK but its handle is not a sink output"
                    )
                }
                PartFun::Follow => {
                    self.vnode
                        .queue_work(next.clone(), output, self.from_partition)
                        .await;
                }
                PartFun::Custom(partfun) => {
                    let partition = partfun(&output);
                    self.vnode.queue_work(next.clone(), output, partition).await;
                }
            },
        }
    }
}
