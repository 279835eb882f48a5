//! Host transaction boundary.
//!
//! Executors open a checkpoint before their first mutation and either commit
//! it or roll every collaborator back to it. On a real chain the transaction
//! itself is the boundary; the simulated market snapshots its state.

use crate::error::ChainResult;
use async_trait::async_trait;
use std::fmt::Debug;

/// Opaque checkpoint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checkpoint(pub u64);

/// All-or-nothing execution boundary.
#[async_trait]
pub trait AtomicHost: Send + Sync + Debug {
    /// Open a checkpoint; later mutations become visible only on commit.
    async fn checkpoint(&self) -> ChainResult<Checkpoint>;

    /// Keep every mutation since `checkpoint`.
    async fn commit(&self, checkpoint: Checkpoint) -> ChainResult<()>;

    /// Discard every mutation since `checkpoint`.
    async fn rollback(&self, checkpoint: Checkpoint) -> ChainResult<()>;
}
