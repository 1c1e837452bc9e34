//! Embeddable typed expression engine.
//!
//! Expressions are built step by step into a flat, validated, deduplicated
//! operation list and evaluated against per-session variable bindings. Key
//! components:
//!
//! - **Builder**: appends constants, variables, operators, branches and
//!   function calls, then validates the graph into an `Expression`
//! - **Expression**: immutable operation list + constant pool + extension
//!   registry, shareable across threads
//! - **Context**: per-session variable bindings and the result cache
//! - **Results**/**Bitmap**: one result slot per operation with
//!   bitmap-driven per-variable invalidation
//! - **Store**/**Substitute**: pluggable nullable value contracts, with
//!   `Value` as the bundled implementation
//!
//! The engine is single-threaded and synchronous; callers own all
//! concurrency. Every failure is returned as a structured [`EngineError`].

pub mod bitmap;
pub mod builder;
pub mod context;
pub mod error;
pub mod expression;
pub mod extension;
pub mod ops;
pub mod results;
pub mod value;

pub use bitmap::Bitmap;
pub use builder::Builder;
pub use context::{Context, Substitution};
pub use error::{EngineError, EngineResult};
pub use expression::Expression;
pub use extension::{Avail, Function, Registry};
pub use ops::{BinaryOp, FunId, Node, OpId, UnaryOp};
pub use results::Results;
pub use value::{Store, Substitute, Value};
