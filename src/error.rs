//! Engine error types.

use crate::ops::{FunId, OpId};
use thiserror::Error;

/// Errors that can occur while building or evaluating an expression.
///
/// Every failure in the engine is returned as one of these variants; nothing
/// panics and nothing is used for ordinary control flow. Evaluation errors
/// that originate in an operand carry the operand's error as a nested cause.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The builder was finalized without any operations.
    #[error("nothing to calculate: the expression is empty")]
    EmptyExpression,

    /// An operation was given an operand id that has not been added yet.
    #[error("operation {op} refers to an unknown operand #{operand} (have {count} operations); ops:\n{ops}")]
    UnknownOperand {
        op: String,
        operand: OpId,
        count: usize,
        ops: String,
    },

    /// An operation refers to an operand at or above its own position.
    #[error("operation #{id}: {op} refers to operand #{operand} up the expression tree; ops:\n{ops}")]
    ForwardReference {
        op: String,
        id: OpId,
        operand: OpId,
        ops: String,
    },

    /// A node is not reachable from the root.
    #[error("operation #{id} is dangling; ops:\n{ops}")]
    Dangling { id: OpId, ops: String },

    /// A constant node points outside the constant pool.
    #[error("constant #{id} refers to item _{item} outside the constant pool (size {count})")]
    BadConstant { id: OpId, item: usize, count: usize },

    /// A variable node points outside the substitution table.
    #[error("variable #{id} refers to substitution ${slot} outside the binding table (size {count})")]
    BadVariable { id: OpId, slot: usize, count: usize },

    /// A variable name was declared twice.
    #[error("variable name '{name}' is already taken by substitution ${slot}")]
    DuplicateVariable { name: String, slot: usize },

    /// A function name could not be resolved against the registry.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// An operand of an operation failed to evaluate.
    #[error("operation {op} failed to get argument #{operand}: {source}")]
    BadArgument {
        op: String,
        operand: OpId,
        #[source]
        source: Box<EngineError>,
    },

    /// The value type cannot apply the operator to these operand types.
    #[error("operation {op} cannot be applied to arguments of types: {operands}")]
    IncompatibleTypes { op: String, operands: String },

    /// A variable was read before any value was bound to its slot.
    #[error("variable ${name} has no substitution")]
    Unbound { name: String },

    /// A cached result slot was read while invalid.
    #[error("result is not ready")]
    NotReady,

    /// A function id points outside the registry.
    #[error("function id @{fun} is outside the registry (size {count})")]
    UnknownFunctionId { fun: FunId, count: usize },

    /// A branch condition evaluated to a value with no truth value.
    #[error("condition of {op} evaluated to non-boolean value {value}")]
    BadCondition { op: String, value: String },

    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A variable name was looked up in a context that does not define it.
    #[error("variable ${name} not found in the expression context")]
    UnknownVariable { name: String },

    /// A substitution slot was addressed outside the context's binding table.
    #[error("substitution slot ${slot} is outside the binding table (size {count})")]
    UnknownSlot { slot: usize, count: usize },
}

/// Result type for all engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
