//! Tagged operands for expression operators.

use std::fmt;

/// Right-hand side of an operator: a plain number or a borrowed expression.
///
/// Every binary operator in the crate takes an `Operand` so that the
/// "scalar or node" decision is a single exhaustive match instead of a
/// runtime type inspection. `N` is the node kind (`DualExpr`, `Var`, `Expr`)
/// or `[f64]` for the value-only formulas in [`crate::primal`].
///
/// # Example
///
/// ```
/// use adtape::{DualExpr, Operand};
///
/// let x = DualExpr::variable(2.0, "x").unwrap();
/// let y = DualExpr::variable(3.0, "y").unwrap();
///
/// // Both conversions are implicit at the call site.
/// let a = x.mul(&y).unwrap();
/// let b = x.mul(3.0).unwrap();
/// assert_eq!(a.value(), b.value());
///
/// let explicit: Operand<'_, DualExpr> = Operand::Scalar(1.0);
/// assert!(explicit.is_scalar());
/// ```
pub enum Operand<'a, N: ?Sized> {
    /// A constant that carries no derivative information.
    Scalar(f64),
    /// An expression of the same kind as the receiver.
    Node(&'a N),
}

impl<N: ?Sized> Operand<'_, N> {
    /// Check if this operand is a plain number.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Operand::Scalar(_))
    }

    /// Get the node, if this operand is one.
    pub fn node(&self) -> Option<&N> {
        match self {
            Operand::Scalar(_) => None,
            Operand::Node(node) => Some(node),
        }
    }
}

impl<N: ?Sized> Clone for Operand<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: ?Sized> Copy for Operand<'_, N> {}

impl<N: ?Sized + fmt::Debug> fmt::Debug for Operand<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Scalar(c) => f.debug_tuple("Scalar").field(c).finish(),
            Operand::Node(node) => f.debug_tuple("Node").field(node).finish(),
        }
    }
}

impl<N: ?Sized> From<f64> for Operand<'_, N> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl<'a, N: ?Sized> From<&'a N> for Operand<'a, N> {
    fn from(node: &'a N) -> Self {
        Operand::Node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scalar() {
        let op: Operand<'_, [f64]> = 2.5f64.into();
        assert!(op.is_scalar());
        assert!(op.node().is_none());
    }

    #[test]
    fn test_from_node() {
        let values = [1.0, 2.0];
        let op: Operand<'_, [f64]> = Operand::from(&values[..]);
        assert!(!op.is_scalar());
        assert_eq!(op.node(), Some(&values[..]));
    }

    #[test]
    fn test_copy_and_debug() {
        let values = [4.0];
        let op: Operand<'_, [f64]> = Operand::Node(&values);
        let copied = op;
        assert_eq!(format!("{:?}", copied), "Node([4.0])");
        assert_eq!(format!("{:?}", op), "Node([4.0])");
    }
}
