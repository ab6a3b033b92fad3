//! Transposition-table seam.
//!
//! The search brackets every descent with a `sync` before and an `update`
//! after, keyed by the full state hash and komi. Table plumbing lives
//! outside this crate; the default implementation does nothing.

use crate::node::UctNode;

/// Hook pair called around each simulation step.
pub trait TransTable: Send + Sync {
    /// Pull shared statistics into `node` before descending.
    fn sync(&self, _hash: u64, _komi: f32, _node: &UctNode) {}

    /// Push `node`'s statistics back after the descent.
    fn update(&self, _hash: u64, _komi: f32, _node: &UctNode) {}
}

/// No-op transposition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTable;

impl TransTable for NullTable {}
