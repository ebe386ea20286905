//! # Differentiable nodes
//!
//! The node-level contract of the graph: [`Variable`] values, the
//! [`Function`] trait every node variant implements, and [`FunctionNode`],
//! which binds a function to its inputs, validates them, records what must
//! be retained and enforces the backward protocol.
//!
//! There is no graph executor here. A caller (or a test) walks the graph by
//! calling [`FunctionNode::backward`] on the creator of each value; since
//! gradients are themselves variables with creators, the same walk works
//! for gradients of gradients.

pub mod function;
pub mod grad_check;
pub mod node;
pub mod variable;

#[cfg(test)]
mod node_test;

pub use function::{BackwardContext, ForwardContext, Function, NodeKind, TensorMeta};
pub use grad_check::{check_node_grad, GradCheckError};
pub use node::FunctionNode;
pub use variable::Variable;
