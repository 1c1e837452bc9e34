//! Extension function registry.
//!
//! Extension functions are named, externally supplied operations invokable
//! from an expression with any number of argument references. Arguments are
//! fetched on demand through a closure, so a function may stop early without
//! forcing later arguments to be resolvable.

use crate::error::{EngineError, EngineResult};
use crate::ops::{FunId, OpId};
use crate::value::Store;
use std::collections::HashMap;
use std::fmt;

/// One extension function.
///
/// `fetch` evaluates an argument node and returns its result; calling it is
/// what pulls the argument's subtree into the evaluation, so skipping an
/// argument skips its whole subtree.
pub trait Function<S: Store>: Send + Sync {
    /// Unique function name, used to resolve calls at build time.
    fn name(&self) -> &'static str;

    /// Invoke the function over the given argument references.
    fn eval(
        &self,
        args: &[OpId],
        fetch: &mut dyn FnMut(OpId) -> EngineResult<S>,
    ) -> EngineResult<S>;
}

/// Fixed collection of extension functions with dense identifiers.
///
/// Registering a second function under an existing name rebinds the name to
/// the new function.
pub struct Registry<S: Store> {
    functions: Vec<Box<dyn Function<S>>>,
    byname: HashMap<&'static str, FunId>,
}

impl<S: Store> Registry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            byname: HashMap::new(),
        }
    }

    /// Create a registry preloaded with the builtin functions.
    pub fn builtin() -> Self {
        Self::new().with(Avail)
    }

    /// Add a function to the registry.
    pub fn with<F: Function<S> + 'static>(mut self, function: F) -> Self {
        let fun = FunId(self.functions.len());
        self.byname.insert(function.name(), fun);
        self.functions.push(Box::new(function));
        self
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Resolve a function name to its identifier.
    pub fn resolve(&self, name: &str) -> EngineResult<FunId> {
        self.byname
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownFunction {
                name: name.to_string(),
            })
    }

    /// Invoke a function by identifier.
    pub fn invoke(
        &self,
        fun: FunId,
        args: &[OpId],
        fetch: &mut dyn FnMut(OpId) -> EngineResult<S>,
    ) -> EngineResult<S> {
        match self.functions.get(fun.0) {
            Some(function) => function.eval(args, fetch),
            None => Err(EngineError::UnknownFunctionId {
                fun,
                count: self.functions.len(),
            }),
        }
    }

    /// Iterate registered functions as (name, identifier) pairs, in
    /// identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FunId)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .map(|(id, function)| (function.name(), FunId(id)))
    }
}

impl<S: Store> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.functions.iter().map(|function| function.name()))
            .finish()
    }
}

/// Builtin function that evaluates to its first non-null argument, or null
/// if every argument is null. Arguments after the first match are never
/// fetched.
pub struct Avail;

impl<S: Store> Function<S> for Avail {
    fn name(&self) -> &'static str {
        "avail"
    }

    fn eval(
        &self,
        args: &[OpId],
        fetch: &mut dyn FnMut(OpId) -> EngineResult<S>,
    ) -> EngineResult<S> {
        for &arg in args {
            let value = fetch(arg)?;
            if !value.is_null() {
                return Ok(value);
            }
        }

        Ok(S::null())
    }
}
