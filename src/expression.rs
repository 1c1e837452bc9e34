//! Immutable expressions and the recursive evaluator.
//!
//! An [`Expression`] owns a validated operation list, its constant pool and
//! a shared extension registry. It is immutable: one expression can serve
//! many [`Context`]s, concurrently on different threads, each holding its
//! own bindings and cache.

use crate::context::{Context, Substitution};
use crate::error::{EngineError, EngineResult};
use crate::extension::Registry;
use crate::ops::{Node, OpId};
use crate::results::Results;
use crate::value::{Store, Substitute};
use std::fmt;
use std::sync::Arc;

/// A validated, evaluatable expression.
///
/// The result of the last operation (the root) is the expression's result.
#[derive(Debug)]
pub struct Expression<S: Store> {
    nodes: Vec<Node>,
    consts: Vec<S>,
    registry: Arc<Registry<S>>,
}

impl<S: Store> Expression<S> {
    pub(crate) fn new(nodes: Vec<Node>, consts: Vec<S>, registry: Arc<Registry<S>>) -> Self {
        Self {
            nodes,
            consts,
            registry,
        }
    }

    /// The validated operation list.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The constant pool, indexed by `Node::Const` items.
    pub fn constants(&self) -> &[S] {
        &self.consts
    }

    /// The extension registry function calls dispatch to.
    pub fn registry(&self) -> &Arc<Registry<S>> {
        &self.registry
    }

    /// Identifier of the root operation.
    pub fn root(&self) -> OpId {
        OpId(self.nodes.len() - 1)
    }

    /// Create an evaluation context for this expression.
    ///
    /// With `cache` enabled the context reuses results of operations whose
    /// variables did not change between evaluations; disable it when every
    /// variable changes on every call.
    pub fn context<U: Substitute<S>>(&self, cache: bool) -> Context<'_, S, U> {
        Context::new(self, cache)
    }

    /// Evaluate the expression against a context created from it.
    pub fn evaluate<U: Substitute<S>>(&self, context: &mut Context<'_, S, U>) -> EngineResult<S> {
        debug_assert!(std::ptr::eq(self, context.expression()));

        let (substitutions, results) = context.bindings_mut();
        self.eval_root(substitutions, results)
    }

    pub(crate) fn eval_root<U: Substitute<S>>(
        &self,
        substitutions: &[Substitution<'_, U>],
        results: &mut Results<S>,
    ) -> EngineResult<S> {
        let root = self.root();
        self.eval(root, substitutions, results);
        results.get(root).clone()
    }

    /// Evaluate one operation into its result slot, reusing the slot when
    /// it is still valid.
    fn eval<U: Substitute<S>>(
        &self,
        id: OpId,
        substitutions: &[Substitution<'_, U>],
        results: &mut Results<S>,
    ) {
        if results.cached(id) {
            return;
        }

        let outcome = self.compute(id, substitutions, results);
        results.store(id, outcome);
    }

    fn compute<U: Substitute<S>>(
        &self,
        id: OpId,
        substitutions: &[Substitution<'_, U>],
        results: &mut Results<S>,
    ) -> EngineResult<S> {
        match &self.nodes[id.0] {
            Node::Const { item } => match self.consts.get(*item) {
                Some(value) => Ok(value.clone()),
                None => Err(EngineError::BadConstant {
                    id,
                    item: *item,
                    count: self.consts.len(),
                }),
            },

            Node::Var { slot, .. } => match substitutions.get(*slot) {
                Some(substitution) => substitution.eval(),
                None => Err(EngineError::BadVariable {
                    id,
                    slot: *slot,
                    count: substitutions.len(),
                }),
            },

            Node::Unary { op, arg } => {
                let value = self.operand(id, *arg, substitutions, results)?;
                S::unary(*op, &value)
            }

            Node::Binary { op, lhs, rhs } => {
                let left = self.operand(id, *lhs, substitutions, results)?;
                let right = self.operand(id, *rhs, substitutions, results)?;
                S::binary(*op, &left, &right)
            }

            Node::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let value = self.operand(id, *cond, substitutions, results)?;
                let taken = value.truth().ok_or_else(|| EngineError::BadCondition {
                    op: self.nodes[id.0].to_string(),
                    value: value.to_string(),
                })?;

                // Only the taken branch evaluates; its outcome, errors
                // included, becomes the branch result as-is.
                let branch = if taken { *then } else { *otherwise };
                self.eval(branch, substitutions, results);
                results.get(branch).clone()
            }

            Node::Fun { fun, args, .. } => self.registry.invoke(*fun, args, &mut |arg| {
                self.eval(arg, substitutions, results);
                results.get(arg).clone()
            }),
        }
    }

    /// Evaluate an operand and hand back its value, wrapping a failure as
    /// the consumer's bad-argument error.
    fn operand<U: Substitute<S>>(
        &self,
        consumer: OpId,
        operand: OpId,
        substitutions: &[Substitution<'_, U>],
        results: &mut Results<S>,
    ) -> EngineResult<S> {
        self.eval(operand, substitutions, results);
        match results.get(operand) {
            Ok(value) => Ok(value.clone()),
            Err(cause) => Err(EngineError::BadArgument {
                op: self.nodes[consumer.0].to_string(),
                operand,
                source: Box::new(cause.clone()),
            }),
        }
    }
}

impl<S: Store> fmt::Display for Expression<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Operations:")?;
        for (id, node) in self.nodes.iter().enumerate() {
            writeln!(f, "\t#{id}: {node}")?;
        }

        writeln!(f, "\nConstants:")?;
        for (item, value) in self.consts.iter().enumerate() {
            writeln!(f, "\t_{item}: {value}")?;
        }

        writeln!(f, "\nExtension functions:")?;
        for (name, fun) in self.registry.iter() {
            writeln!(f, "\t@{fun}: {name}")?;
        }

        Ok(())
    }
}
