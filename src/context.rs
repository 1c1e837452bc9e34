//! Evaluation contexts: per-session variable bindings plus the result cache.
//!
//! A context is created from an [`Expression`], mutated between evaluations
//! (typically once per row) and discarded with its session. Binding a
//! variable goes through the context so the cached results that depend on it
//! are invalidated in the same step.

use crate::error::{EngineError, EngineResult};
use crate::expression::Expression;
use crate::ops::{Node, OpId};
use crate::results::Results;
use crate::value::{Store, Substitute};
use std::collections::HashMap;
use std::fmt;

/// One named variable and the value currently bound to it, if any.
#[derive(Debug)]
pub struct Substitution<'e, U> {
    op: OpId,
    slot: usize,
    name: &'e str,
    value: Option<U>,
}

impl<'e, U> Substitution<'e, U> {
    /// Identifier of the variable's operation node.
    pub fn op(&self) -> OpId {
        self.op
    }

    /// Dense substitution slot of the variable.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Variable name.
    pub fn name(&self) -> &'e str {
        self.name
    }

    /// Check whether a value is currently bound.
    pub fn bound(&self) -> bool {
        self.value.is_some()
    }

    /// The bound value, if any.
    pub fn value(&self) -> Option<&U> {
        self.value.as_ref()
    }

    /// Produce the store representation of the bound value.
    pub(crate) fn eval<S: Store>(&self) -> EngineResult<S>
    where
        U: Substitute<S>,
    {
        match &self.value {
            Some(value) => Ok(value.resolve()),
            None => Err(EngineError::Unbound {
                name: self.name.to_string(),
            }),
        }
    }
}

/// Evaluation state for one expression: substitutions and cached results.
///
/// The context borrows its expression, so the expression always outlives it.
/// A context is not synchronized; share the expression across threads and
/// give each thread its own context.
#[derive(Debug)]
pub struct Context<'e, S: Store, U = S> {
    expr: &'e Expression<S>,
    substitutions: Vec<Substitution<'e, U>>,
    byname: HashMap<&'e str, usize>,
    results: Results<S>,
}

impl<'e, S: Store, U: Substitute<S>> Context<'e, S, U> {
    pub(crate) fn new(expr: &'e Expression<S>, cache: bool) -> Self {
        let mut substitutions = Vec::new();
        let mut byname = HashMap::new();

        for (index, node) in expr.nodes().iter().enumerate() {
            if let Node::Var { slot, name } = node {
                byname.insert(name.as_str(), *slot);
                substitutions.push(Substitution {
                    op: OpId(index),
                    slot: *slot,
                    name: name.as_str(),
                    value: None,
                });
            }
        }

        Self {
            expr,
            substitutions,
            byname,
            results: Results::new(expr.nodes(), cache),
        }
    }

    /// The expression this context was created from.
    pub fn expression(&self) -> &'e Expression<S> {
        self.expr
    }

    /// Number of variables in the expression.
    pub fn variables(&self) -> usize {
        self.substitutions.len()
    }

    /// Check whether every variable has a bound value.
    pub fn bound(&self) -> bool {
        self.substitutions.iter().all(Substitution::bound)
    }

    /// Iterate all variables in slot order.
    pub fn vars(&self) -> impl Iterator<Item = &Substitution<'e, U>> {
        self.substitutions.iter()
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Substitution<'e, U>> {
        self.byname
            .get(name)
            .and_then(|&slot| self.substitutions.get(slot))
    }

    /// Look up a variable by slot index.
    pub fn var_at(&self, slot: usize) -> Option<&Substitution<'e, U>> {
        self.substitutions.get(slot)
    }

    /// Bind a value to a variable slot, invalidating every cached result
    /// that depends on it.
    pub fn set(&mut self, slot: usize, value: impl Into<U>) -> EngineResult<()> {
        let count = self.substitutions.len();
        let substitution = self
            .substitutions
            .get_mut(slot)
            .ok_or(EngineError::UnknownSlot { slot, count })?;

        substitution.value = Some(value.into());
        self.results.invalidate(slot);
        Ok(())
    }

    /// Remove the binding of a variable slot, invalidating every cached
    /// result that depends on it.
    pub fn unset(&mut self, slot: usize) -> EngineResult<()> {
        let count = self.substitutions.len();
        let substitution = self
            .substitutions
            .get_mut(slot)
            .ok_or(EngineError::UnknownSlot { slot, count })?;

        substitution.value = None;
        self.results.invalidate(slot);
        Ok(())
    }

    /// Bind a value to a variable by name.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<U>) -> EngineResult<()> {
        let slot = *self
            .byname
            .get(name)
            .ok_or_else(|| EngineError::UnknownVariable {
                name: name.to_string(),
            })?;
        self.set(slot, value)
    }

    /// Evaluate the expression against the current bindings.
    pub fn evaluate(&mut self) -> EngineResult<S> {
        let Self {
            expr,
            substitutions,
            results,
            ..
        } = self;
        expr.eval_root(substitutions, results)
    }

    /// Read one operation's cached result. Invalid slots read as the
    /// not-ready error while caching is enabled.
    pub fn result(&self, op: OpId) -> Option<&EngineResult<S>> {
        (op.0 < self.results.len()).then(|| self.results.get(op))
    }

    /// Number of operation evaluations performed by this context so far.
    /// Cache hits do not count.
    pub fn recomputations(&self) -> u64 {
        self.results.computed()
    }

    pub(crate) fn bindings_mut(&mut self) -> (&[Substitution<'e, U>], &mut Results<S>) {
        (&self.substitutions, &mut self.results)
    }
}

impl<'e, S: Store, U: fmt::Display> fmt::Display for Context<'e, S, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Substitutions:")?;
        for substitution in &self.substitutions {
            match &substitution.value {
                Some(value) => writeln!(f, "\t${}: {value}", substitution.name)?,
                None => writeln!(f, "\t${}: <empty>", substitution.name)?,
            }
        }

        writeln!(f, "\nEvaluations:")?;
        for id in 0..self.results.len() {
            match self.results.get(OpId(id)) {
                Ok(value) => writeln!(f, "\t#{id}: ok({value})")?,
                Err(error) => writeln!(f, "\t#{id}: err({error})")?,
            }
        }

        Ok(())
    }
}
