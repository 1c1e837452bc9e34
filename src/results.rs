//! Storage for intermediate operation results.
//!
//! One result slot per operation plus a validity bitmap. Caching saves work
//! when the same expression is evaluated over a sequence of bindings where
//! only some variables change: rebinding a variable invalidates exactly the
//! operations whose subtree contains it, via a precomputed AND mask over the
//! whole validity bitmap.

use crate::bitmap::Bitmap;
use crate::error::{EngineError, EngineResult};
use crate::ops::{Node, OpId};
use crate::value::Store;
use log::trace;

/// Operation result cache with per-variable invalidation maps.
#[derive(Debug)]
pub struct Results<S: Store> {
    /// Per-variable AND masks: a zero bit marks an operation to invalidate
    /// when that variable's substitution changes.
    invalidations: Vec<Bitmap>,

    /// When false, every read reports the result as out of date, so every
    /// evaluation recomputes.
    cache: bool,

    /// Operation result validity map.
    valid: Bitmap,

    /// Operation results, errors included.
    outcomes: Vec<EngineResult<S>>,

    /// Number of results stored since construction.
    computed: u64,

    not_ready: EngineResult<S>,
}

impl<S: Store> Results<S> {
    /// Construct a result cache for a validated operation list.
    pub fn new(nodes: &[Node], cache: bool) -> Self {
        Self {
            invalidations: invalidations(nodes, true),
            cache,
            valid: Bitmap::new(nodes.len(), false),
            outcomes: vec![Err(EngineError::NotReady); nodes.len()],
            computed: 0,
            not_ready: Err(EngineError::NotReady),
        }
    }

    /// Number of result slots.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Check if an operation result is up to date and can be reused.
    pub fn cached(&self, op: OpId) -> bool {
        self.cache && self.valid.test(op.0)
    }

    /// Read an operation result.
    ///
    /// While caching is enabled an invalid slot reads as the not-ready
    /// error, never as a stale value. With caching disabled the raw slot is
    /// returned.
    pub fn get(&self, op: OpId) -> &EngineResult<S> {
        if self.cache && !self.valid.test(op.0) {
            &self.not_ready
        } else {
            &self.outcomes[op.0]
        }
    }

    /// Store an operation result and mark the slot valid.
    pub fn store(&mut self, op: OpId, outcome: EngineResult<S>) {
        self.outcomes[op.0] = outcome;
        self.computed += 1;
        if self.cache {
            self.valid.set(op.0);
        }
    }

    /// Mark every operation that depends on a variable as out of date.
    /// Does nothing when caching is disabled.
    pub fn invalidate(&mut self, slot: usize) {
        if !self.cache || slot >= self.invalidations.len() {
            return;
        }

        trace!("invalidating results affected by substitution ${slot}");
        self.valid &= &self.invalidations[slot];
    }

    /// Number of results stored since construction; grows by one for every
    /// operation actually recomputed.
    pub fn computed(&self) -> u64 {
        self.computed
    }
}

/// Mark every operation whose subtree contains the variable node `var`.
///
/// Returns true if the subtree rooted at `op` contains the variable. The
/// ordering invariant bounds the recursion depth by the node count.
fn relations(
    nodes: &[Node],
    op: OpId,
    var: OpId,
    affected: &mut Bitmap,
    visited: &mut Bitmap,
) -> bool {
    if visited.test(op.0) {
        return affected.test(op.0);
    }
    visited.set(op.0);

    let hit = match &nodes[op.0] {
        Node::Var { .. } => op == var,
        Node::Const { .. } => false,
        node => {
            let mut any = false;
            node.refers(|operand| {
                if relations(nodes, operand, var, affected, visited) {
                    any = true;
                }
            });
            any
        }
    };

    if hit {
        affected.set(op.0);
    }

    hit
}

/// Construct invalidation maps for every variable in an operation list, in
/// slot order.
///
/// With `invert` set (the cache configuration), operations to keep are
/// marked with 1s so the map can be applied with a single AND; otherwise
/// the map marks the operations affected by the variable.
pub fn invalidations(nodes: &[Node], invert: bool) -> Vec<Bitmap> {
    let mut maps = Vec::new();
    if nodes.is_empty() {
        return maps;
    }

    let root = OpId(nodes.len() - 1);
    for (id, node) in nodes.iter().enumerate() {
        if let Node::Var { .. } = node {
            let mut affected = Bitmap::new(nodes.len(), false);
            let mut visited = Bitmap::new(nodes.len(), false);
            relations(nodes, root, OpId(id), &mut affected, &mut visited);

            maps.push(if invert { !&affected } else { affected });
        }
    }

    maps
}
