//! Expression construction and validation.
//!
//! The builder appends operations one at a time, deduplicating structurally
//! identical nodes, and finally validates the whole graph before handing
//! ownership to an immutable [`Expression`]. Operand references are checked
//! on every append, so a node can only ever point at operations added
//! before it.

use crate::error::{EngineError, EngineResult};
use crate::expression::Expression;
use crate::extension::Registry;
use crate::ops::{dump, BinaryOp, Node, OpId, UnaryOp};
use crate::value::Store;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds and validates one [`Expression`].
///
/// A builder is single-use: `build` consumes it. On error the buffered
/// operations are simply discarded.
#[derive(Debug)]
pub struct Builder<S: Store> {
    nodes: Vec<Node>,
    consts: Vec<S>,
    registry: Arc<Registry<S>>,
    dedup: HashMap<Node, OpId>,
    names: HashMap<String, usize>,
    slots: usize,
}

impl<S: Store> Builder<S> {
    /// Create a builder with no extension functions.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a builder that resolves function calls against `registry`.
    pub fn with_registry(registry: Arc<Registry<S>>) -> Self {
        Self {
            nodes: Vec::new(),
            consts: Vec::new(),
            registry,
            dedup: HashMap::new(),
            names: HashMap::new(),
            slots: 0,
        }
    }

    /// Reconstruct a builder from an externally supplied operation list and
    /// constant pool (e.g. after deserialization).
    ///
    /// Runs a linear pass over the input: operand references must point
    /// strictly backwards, constant items must stay within the pool,
    /// variable slots must be dense and in order, names must be unique and
    /// function ids must exist in the registry. The full reachability
    /// validation still runs when `build` is called.
    pub fn from_parts(
        nodes: Vec<Node>,
        consts: Vec<S>,
        registry: Arc<Registry<S>>,
    ) -> EngineResult<Self> {
        let mut names: HashMap<String, usize> = HashMap::new();
        let mut slots = 0;

        for (index, node) in nodes.iter().enumerate() {
            let id = OpId(index);
            match node {
                Node::Const { item } => {
                    if *item >= consts.len() {
                        return Err(EngineError::BadConstant {
                            id,
                            item: *item,
                            count: consts.len(),
                        });
                    }
                }

                Node::Var { slot, name } => {
                    if *slot != slots {
                        return Err(EngineError::BadVariable {
                            id,
                            slot: *slot,
                            count: slots,
                        });
                    }
                    if let Some(&taken) = names.get(name) {
                        return Err(EngineError::DuplicateVariable {
                            name: name.clone(),
                            slot: taken,
                        });
                    }
                    names.insert(name.clone(), *slot);
                    slots += 1;
                }

                node => {
                    let mut forward = None;
                    node.refers(|operand| {
                        if forward.is_none() && operand >= id {
                            forward = Some(operand);
                        }
                    });
                    if let Some(operand) = forward {
                        return Err(EngineError::ForwardReference {
                            op: node.to_string(),
                            id,
                            operand,
                            ops: dump(&nodes),
                        });
                    }

                    if let Node::Fun { fun, .. } = node {
                        if fun.0 >= registry.len() {
                            return Err(EngineError::UnknownFunctionId {
                                fun: *fun,
                                count: registry.len(),
                            });
                        }
                    }
                }
            }
        }

        let dedup = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.clone(), OpId(index)))
            .collect();

        Ok(Self {
            nodes,
            consts,
            registry,
            dedup,
            names,
            slots,
        })
    }

    /// Number of operations added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a constant value.
    pub fn constant(&mut self, value: impl Into<S>) -> EngineResult<OpId> {
        let (id, appended) = self.append(Node::Const {
            item: self.consts.len(),
        });
        if appended {
            self.consts.push(value.into());
        }

        Ok(id)
    }

    /// Add a variable. Names must be unique within one expression.
    pub fn var(&mut self, name: impl Into<String>) -> EngineResult<OpId> {
        let name = name.into();
        if let Some(&slot) = self.names.get(&name) {
            return Err(EngineError::DuplicateVariable { name, slot });
        }

        let (id, appended) = self.append(Node::Var {
            slot: self.slots,
            name: name.clone(),
        });
        if appended {
            self.names.insert(name, self.slots);
            self.slots += 1;
        }

        Ok(id)
    }

    /// Add a unary operation.
    pub fn unary(&mut self, op: UnaryOp, arg: OpId) -> EngineResult<OpId> {
        self.check(op.name(), arg)?;
        Ok(self.append(Node::Unary { op, arg }).0)
    }

    /// Add a binary operation.
    pub fn binary(&mut self, op: BinaryOp, lhs: OpId, rhs: OpId) -> EngineResult<OpId> {
        self.check(op.name(), lhs)?;
        self.check(op.name(), rhs)?;
        Ok(self.append(Node::Binary { op, lhs, rhs }).0)
    }

    /// Add an `if-else` branch. The condition must evaluate to a value with
    /// a truth value; only the taken branch is ever evaluated.
    pub fn branch(&mut self, cond: OpId, then: OpId, otherwise: OpId) -> EngineResult<OpId> {
        self.check("if", cond)?;
        self.check("if", then)?;
        self.check("if", otherwise)?;
        Ok(self
            .append(Node::Ternary {
                cond,
                then,
                otherwise,
            })
            .0)
    }

    /// Add an extension function call. The name must resolve against the
    /// builder's registry.
    pub fn fun(&mut self, name: impl Into<String>, args: Vec<OpId>) -> EngineResult<OpId> {
        let name = name.into();
        for &arg in &args {
            self.check(&name, arg)?;
        }

        let fun = self.registry.resolve(&name)?;
        Ok(self.append(Node::Fun { name, fun, args }).0)
    }

    /// Validate the graph and build an immutable [`Expression`].
    pub fn build(self) -> EngineResult<Expression<S>> {
        if self.nodes.is_empty() {
            return Err(EngineError::EmptyExpression);
        }

        let mut visited = vec![false; self.nodes.len()];
        self.visit(OpId(self.nodes.len() - 1), &mut visited)?;

        if let Some(id) = visited.iter().position(|&seen| !seen) {
            return Err(EngineError::Dangling {
                id: OpId(id),
                ops: dump(&self.nodes),
            });
        }

        debug!(
            "validated expression: {} operations, {} constants, {} variables",
            self.nodes.len(),
            self.consts.len(),
            self.slots
        );

        Ok(Expression::new(self.nodes, self.consts, self.registry))
    }

    /// Append an operation, or reuse the id of a structurally identical one.
    fn append(&mut self, node: Node) -> (OpId, bool) {
        if let Some(&id) = self.dedup.get(&node) {
            return (id, false);
        }

        let id = OpId(self.nodes.len());
        self.dedup.insert(node.clone(), id);
        self.nodes.push(node);
        (id, true)
    }

    /// Check that an operand reference points at an existing operation.
    fn check(&self, op: &str, operand: OpId) -> EngineResult<()> {
        if operand.0 >= self.nodes.len() {
            return Err(EngineError::UnknownOperand {
                op: op.to_string(),
                operand,
                count: self.nodes.len(),
                ops: dump(&self.nodes),
            });
        }

        Ok(())
    }

    /// Depth-first validation from the root: marks reachable operations,
    /// rejects forward references and checks pool/slot cross-references
    /// against their final sizes.
    fn visit(&self, id: OpId, visited: &mut [bool]) -> EngineResult<()> {
        visited[id.0] = true;

        match &self.nodes[id.0] {
            Node::Const { item } => {
                if *item >= self.consts.len() {
                    return Err(EngineError::BadConstant {
                        id,
                        item: *item,
                        count: self.consts.len(),
                    });
                }
                Ok(())
            }

            Node::Var { slot, .. } => {
                if *slot >= self.slots {
                    return Err(EngineError::BadVariable {
                        id,
                        slot: *slot,
                        count: self.slots,
                    });
                }
                Ok(())
            }

            node => {
                let mut operands = Vec::new();
                node.refers(|operand| operands.push(operand));

                for operand in operands {
                    if operand >= id {
                        return Err(EngineError::ForwardReference {
                            op: node.to_string(),
                            id,
                            operand,
                            ops: dump(&self.nodes),
                        });
                    }
                    if !visited[operand.0] {
                        self.visit(operand, visited)?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl<S: Store> Default for Builder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::FunId;
    use crate::value::Value;

    fn builtin() -> Arc<Registry<Value>> {
        Arc::new(Registry::builtin())
    }

    #[test]
    fn test_identical_operations_deduplicate() {
        let mut builder: Builder<Value> = Builder::new();
        let a = builder.var("a").unwrap();
        let b = builder.var("b").unwrap();

        let first = builder.binary(BinaryOp::Add, a, b).unwrap();
        let len = builder.len();
        let second = builder.binary(BinaryOp::Add, a, b).unwrap();

        assert_eq!(first, second);
        assert_eq!(builder.len(), len);

        // Operand order matters for identity.
        let swapped = builder.binary(BinaryOp::Add, b, a).unwrap();
        assert_ne!(first, swapped);
    }

    #[test]
    fn test_equal_constants_stay_distinct() {
        let mut builder: Builder<Value> = Builder::new();
        let first = builder.constant(42).unwrap();
        let second = builder.constant(42).unwrap();

        // Each call appends a fresh pool item, so the nodes differ.
        assert_ne!(first, second);
    }

    #[test]
    fn test_duplicate_variable_name_fails() {
        let mut builder: Builder<Value> = Builder::new();
        builder.var("a").unwrap();
        assert_eq!(
            builder.var("a"),
            Err(EngineError::DuplicateVariable {
                name: "a".to_string(),
                slot: 0,
            })
        );
    }

    #[test]
    fn test_unknown_operand() {
        let mut builder: Builder<Value> = Builder::new();
        let result = builder.unary(UnaryOp::Neg, OpId(3));
        assert!(matches!(
            result,
            Err(EngineError::UnknownOperand {
                operand: OpId(3),
                count: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_function() {
        let mut builder: Builder<Value> = Builder::new();
        let a = builder.var("a").unwrap();
        assert_eq!(
            builder.fun("missing", vec![a]),
            Err(EngineError::UnknownFunction {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_build_empty_fails() {
        let builder: Builder<Value> = Builder::new();
        assert!(matches!(builder.build(), Err(EngineError::EmptyExpression)));
    }

    #[test]
    fn test_build_dangling_fails() {
        let mut builder: Builder<Value> = Builder::new();
        let a = builder.var("a").unwrap();
        let b = builder.var("b").unwrap();
        builder.binary(BinaryOp::Add, a, b).unwrap();
        // A trailing constant becomes the root, leaving the sum unreachable.
        builder.constant(1).unwrap();

        match builder.build() {
            Err(EngineError::Dangling { id, .. }) => assert_eq!(id, OpId(0)),
            other => panic!("expected dangling error, got {other:?}"),
        }
    }

    #[test]
    fn test_build_valid_expression() {
        let mut builder: Builder<Value> = Builder::new();
        let a = builder.var("a").unwrap();
        let b = builder.var("b").unwrap();
        let sum = builder.binary(BinaryOp::Add, a, b).unwrap();
        let c42 = builder.constant(42).unwrap();
        builder.binary(BinaryOp::Sub, sum, c42).unwrap();

        let expr = builder.build().unwrap();
        assert_eq!(expr.nodes().len(), 5);
        assert_eq!(expr.constants().len(), 1);
    }

    #[test]
    fn test_from_parts_self_reference_fails() {
        let nodes = vec![Node::Unary {
            op: UnaryOp::Neg,
            arg: OpId(0),
        }];
        let result = Builder::<Value>::from_parts(nodes, vec![], builtin());
        assert!(matches!(
            result,
            Err(EngineError::ForwardReference {
                id: OpId(0),
                operand: OpId(0),
                ..
            })
        ));
    }

    #[test]
    fn test_from_parts_forward_reference_fails() {
        let nodes = vec![
            Node::Var {
                slot: 0,
                name: "a".to_string(),
            },
            Node::Binary {
                op: BinaryOp::Add,
                lhs: OpId(0),
                rhs: OpId(2),
            },
            Node::Const { item: 0 },
        ];
        let result = Builder::<Value>::from_parts(nodes, vec![Value::Int32(1)], builtin());
        assert!(matches!(
            result,
            Err(EngineError::ForwardReference {
                id: OpId(1),
                operand: OpId(2),
                ..
            })
        ));
    }

    #[test]
    fn test_from_parts_bad_constant_fails() {
        let nodes = vec![Node::Const { item: 1 }];
        let result = Builder::<Value>::from_parts(nodes, vec![Value::Int32(1)], builtin());
        assert_eq!(
            result.err(),
            Some(EngineError::BadConstant {
                id: OpId(0),
                item: 1,
                count: 1,
            })
        );
    }

    #[test]
    fn test_from_parts_sparse_slot_fails() {
        let nodes = vec![Node::Var {
            slot: 1,
            name: "a".to_string(),
        }];
        let result = Builder::<Value>::from_parts(nodes, vec![], builtin());
        assert_eq!(
            result.err(),
            Some(EngineError::BadVariable {
                id: OpId(0),
                slot: 1,
                count: 0,
            })
        );
    }

    #[test]
    fn test_from_parts_unknown_function_id_fails() {
        let nodes = vec![
            Node::Const { item: 0 },
            Node::Fun {
                name: "avail".to_string(),
                fun: FunId(7),
                args: vec![OpId(0)],
            },
        ];
        let result = Builder::<Value>::from_parts(nodes, vec![Value::Int32(1)], builtin());
        assert_eq!(
            result.err(),
            Some(EngineError::UnknownFunctionId {
                fun: FunId(7),
                count: 1,
            })
        );
    }

    #[test]
    fn test_from_parts_dangling_caught_at_build() {
        // The linear intake pass accepts an unreachable node; finalization
        // still rejects it.
        let nodes = vec![
            Node::Var {
                slot: 0,
                name: "a".to_string(),
            },
            Node::Const { item: 0 },
        ];
        let builder = Builder::<Value>::from_parts(nodes, vec![Value::Int32(1)], builtin()).unwrap();
        match builder.build() {
            Err(EngineError::Dangling { id, .. }) => assert_eq!(id, OpId(0)),
            other => panic!("expected dangling error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_parts_continues_deduplicating() {
        let nodes = vec![
            Node::Var {
                slot: 0,
                name: "a".to_string(),
            },
            Node::Unary {
                op: UnaryOp::Neg,
                arg: OpId(0),
            },
        ];
        let mut builder = Builder::<Value>::from_parts(nodes, vec![], builtin()).unwrap();

        // Re-adding an existing operation reuses its id.
        assert_eq!(builder.unary(UnaryOp::Neg, OpId(0)), Ok(OpId(1)));
        assert_eq!(builder.len(), 2);
        // And the variable name is still taken.
        assert!(matches!(
            builder.var("a"),
            Err(EngineError::DuplicateVariable { .. })
        ));
    }
}
