//! Monotonic id generators.
//!
//! A small `Arc<AtomicU64>` wrapper kept here as a single shared helper
//! since every id in this crate (fitting handles, workers, partitions) is
//! minted the same way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A cheap, cloneable `u64` id generator starting at 1.
#[derive(Clone, Default)]
pub struct IdGenerator(Arc<AtomicU64>);

impl IdGenerator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Partition identifiers are caller-assigned (partition placement is out of
/// scope for this crate), not generated here — `PartitionId` is a plain
/// newtype around whatever the builder/vnode subsystem already uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionId(pub u32);

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}
