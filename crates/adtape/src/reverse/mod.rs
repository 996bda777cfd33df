//! Tape-based reverse-mode automatic differentiation.
//!
//! Operators on [`Var`] compute values eagerly and record, on the result
//! node, one edge per node operand carrying the local partial derivative.
//! Gradients are computed lazily: the first query on a root runs a backward
//! pass and caches the resulting [`Jacobian`] on that root.
//!
//! # Architecture
//!
//! ```text
//! Var<'t> (Copy handle) ──indexes──►  Tape (arena, RefCell<Vec<TapeNode>>)
//!                                          │
//!                                          ▼
//!                               TapeNode { primal, name, edges,
//!                                          accumulator, jacobian }
//!                                          │
//!                                          ▼
//!                                Edge { child: NodeId, weight: Weight }
//! ```
//!
//! # Backward pass
//!
//! 1. Zero every accumulator reachable from the root.
//! 2. Seed the root's accumulator with ones.
//! 3. Order the reachable nodes topologically (reversed DFS post-order).
//! 4. Walk that order: a named leaf reports its accumulator, and every edge
//!    adds `weight * accumulator` into its child.
//!
//! A node referenced twice (`x * x`) gets one contribution per edge.
//!
//! # Example
//!
//! ```
//! use adtape::Tape;
//!
//! let tape = Tape::new();
//! let x = tape.variable(2.0, "x").unwrap();
//! let y = x.pow(2.0).unwrap();
//!
//! assert_eq!(y.value(), vec![4.0]);
//! assert_eq!(y.grad("x").unwrap(), vec![4.0]);
//! ```

mod backward;
mod tape;
mod traversal;
mod var;

pub use tape::{Edge, Jacobian, JacobianState, NodeId, Tape, TapeNode, Weight};
pub use traversal::{reset_accumulators, topological_order};
pub use var::{Var, VarVector};
