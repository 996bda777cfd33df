//! adtape - forward- and reverse-mode automatic differentiation
//!
//! This crate differentiates scalar and small vector-valued functions built
//! from arithmetic and elementary transcendental operators, with respect to
//! named input variables.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Mode facade (mode module)
//!     → AdContext, Expr: one API, mode chosen by AdConfig
//!
//! Level 2: Differentiation strategies
//!     → forward: DualExpr carries a gradient per variable, eagerly
//!     → reverse: Var records edges on a Tape, backward pass on demand
//!
//! Level 3: Values (primal module)
//!     → Primal: id + flat value vector, value-only operator formulas
//! ```
//!
//! # Example
//!
//! ```
//! use adtape::{DualExpr, Tape};
//!
//! // Forward mode: derivatives are available immediately.
//! let x = DualExpr::variable(2.0, "x").unwrap();
//! let y = x.pow(2.0).unwrap();
//! assert_eq!(y.value(), &[4.0]);
//! assert_eq!(y.grad("x").unwrap(), &[4.0]);
//!
//! // Reverse mode: the first gradient query runs the backward pass.
//! let tape = Tape::new();
//! let x = tape.variable(2.0, "x").unwrap();
//! let y = tape.variable(1.0, "y").unwrap();
//! let z = x.add(&y).unwrap();
//! assert_eq!(z.value(), vec![3.0]);
//! assert_eq!(z.grad("x").unwrap(), vec![1.0]);
//! assert_eq!(z.grad("y").unwrap(), vec![1.0]);
//! ```

pub mod error;
pub mod forward;
pub mod mode;
pub mod operand;
pub mod primal;
pub mod reverse;

pub use error::{AdError, Result};
pub use forward::{DualExpr, GradientMap};
pub use mode::{AdConfig, AdContext, Expr, Mode, StackedExpr};
pub use operand::Operand;
pub use primal::{ExprId, IntoPrimal, Primal, ScalarElement};
pub use reverse::{Edge, Jacobian, NodeId, Tape, Var, VarVector, Weight};
