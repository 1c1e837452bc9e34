//! Value contracts and the bundled nullable value type.
//!
//! The engine is generic over the type that holds constants and evaluation
//! results ([`Store`]) and the type bound to variables ([`Substitute`]).
//! Type checking is deferred to evaluation: the engine asks the store type
//! to apply an operator and maps refusal to an incompatible-types error.
//!
//! [`Value`] is the bundled implementation of both contracts.

use crate::error::{EngineError, EngineResult};
use crate::ops::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Contract for a nullable container of constants and evaluation results.
pub trait Store: Clone + fmt::Debug + fmt::Display {
    /// Construct the null value.
    fn null() -> Self;

    /// Check whether the stored value is null.
    fn is_null(&self) -> bool;

    /// Name of the stored type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Truth value of the stored value, or `None` if it has no boolean
    /// interpretation. Drives branch conditions and logical operators.
    fn truth(&self) -> Option<bool>;

    /// Apply a unary operator, or report that the stored type cannot
    /// support it.
    fn unary(op: UnaryOp, value: &Self) -> EngineResult<Self>;

    /// Apply a binary operator, or report that the stored type combination
    /// cannot support it.
    fn binary(op: BinaryOp, lhs: &Self, rhs: &Self) -> EngineResult<Self>;
}

/// Contract for a value bound to a variable slot for one session.
///
/// Every [`Store`] type doubles as its own substitute; a separate
/// implementation lets an embedder bind borrowed or lazily-converted row
/// data without copying it into the store representation up front.
pub trait Substitute<S> {
    /// Produce the store representation of the bound value.
    fn resolve(&self) -> S;
}

impl<S: Store> Substitute<S> for S {
    fn resolve(&self) -> S {
        self.clone()
    }
}

/// Nullable value covering the types the engine is typically embedded with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    String(String),
}

impl Value {
    fn incompatible_unary(op: UnaryOp, value: &Value) -> EngineError {
        EngineError::IncompatibleTypes {
            op: op.name().to_string(),
            operands: value.type_name().to_string(),
        }
    }

    fn incompatible(op: BinaryOp, lhs: &Value, rhs: &Value) -> EngineError {
        EngineError::IncompatibleTypes {
            op: op.name().to_string(),
            operands: format!("{}, {}", lhs.type_name(), rhs.type_name()),
        }
    }

    /// Total order used by comparison operators: null equals only null and
    /// precedes every concrete value; concrete values compare within their
    /// own type only.
    fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> EngineResult<Ordering> {
        match (lhs, rhs) {
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Less),
            (_, Value::Null) => Ok(Ordering::Greater),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Int32(a), Value::Int32(b)) => Ok(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            _ => Err(Self::incompatible(op, lhs, rhs)),
        }
    }

    fn logical(op: BinaryOp, lhs: &Value, rhs: &Value) -> EngineResult<Value> {
        match (lhs.truth(), rhs.truth()) {
            (Some(a), Some(b)) => Ok(Value::Boolean(match op {
                BinaryOp::And => a && b,
                _ => a || b,
            })),
            _ => Err(Self::incompatible(op, lhs, rhs)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Store for Value {
    fn null() -> Self {
        Value::Null
    }

    fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Int32(_) => "int",
            Value::String(_) => "string",
        }
    }

    fn truth(&self) -> Option<bool> {
        match self {
            Value::Null => Some(false),
            Value::Boolean(value) => Some(*value),
            Value::Int32(value) => Some(*value != 0),
            Value::String(_) => None,
        }
    }

    fn unary(op: UnaryOp, value: &Value) -> EngineResult<Value> {
        match op {
            UnaryOp::Neg => match value {
                Value::Null => Ok(Value::Null),
                Value::Int32(v) => Ok(Value::Int32(v.wrapping_neg())),
                _ => Err(Self::incompatible_unary(op, value)),
            },

            UnaryOp::Not => match value.truth() {
                Some(truth) => Ok(Value::Boolean(!truth)),
                None => Err(Self::incompatible_unary(op, value)),
            },

            UnaryOp::BitNot => match value {
                Value::Null => Ok(Value::Null),
                Value::Int32(v) => Ok(Value::Int32(!v)),
                _ => Err(Self::incompatible_unary(op, value)),
            },
        }
    }

    fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> EngineResult<Value> {
        match op {
            BinaryOp::Add => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a.wrapping_add(*b))),
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::Sub => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a.wrapping_sub(*b))),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::Mul => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a.wrapping_mul(*b))),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::Div => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(_), Value::Int32(0)) => Err(EngineError::DivisionByZero),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a.wrapping_div(*b))),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::Rem => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(_), Value::Int32(0)) => Err(EngineError::DivisionByZero),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a.wrapping_rem(*b))),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::Eq => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_eq())),
            BinaryOp::Ne => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_ne())),
            BinaryOp::Gt => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_gt())),
            BinaryOp::Lt => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_lt())),
            BinaryOp::Ge => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_ge())),
            BinaryOp::Le => Self::compare(op, lhs, rhs).map(|ord| Value::Boolean(ord.is_le())),

            BinaryOp::And | BinaryOp::Or => Self::logical(op, lhs, rhs),

            BinaryOp::BitAnd => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a & b)),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::BitOr => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a | b)),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },

            BinaryOp::BitXor => match (lhs, rhs) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Int32(a), Value::Int32(b)) => Ok(Value::Int32(a ^ b)),
                _ => Err(Self::incompatible(op, lhs, rhs)),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Boolean(value) => write!(f, "bool({value})"),
            Value::Int32(value) => write!(f, "int({value})"),
            Value::String(value) => write!(f, "string({value})"),
        }
    }
}
