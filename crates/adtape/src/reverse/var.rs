//! Var - handle to a tape node with gradient tracking.

use super::tape::{Edge, Jacobian, NodeId, Tape, Weight};
use crate::error::{AdError, Result};
use crate::operand::Operand;
use crate::primal::{Primal, ScalarElement};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::rc::Rc;

/// A reverse-mode expression: a lightweight, copyable handle into a [`Tape`].
///
/// Operators compute the value immediately and record one edge per node
/// operand, weighted by the local partial derivative. Gradients are only
/// computed when first queried.
///
/// # Example
///
/// ```
/// use adtape::Tape;
///
/// let tape = Tape::new();
/// let x = tape.variable(2.0, "x").unwrap();
/// let y = tape.variable(3.0, "y").unwrap();
/// let f = x.mul(&y).unwrap().add(&x.sin()).unwrap();
///
/// assert_eq!(f.grad("y").unwrap(), vec![2.0]);
/// assert_eq!(f.grad("x").unwrap(), vec![3.0 + 2f64.cos()]);
/// ```
#[derive(Clone, Copy)]
pub struct Var<'t> {
    tape: &'t Tape,
    id: NodeId,
}

impl<'t> Var<'t> {
    pub(crate) fn new(tape: &'t Tape, id: NodeId) -> Self {
        Self { tape, id }
    }

    /// Get the node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the tape this node lives on.
    pub fn tape(&self) -> &'t Tape {
        self.tape
    }

    /// Get the value vector.
    pub fn value(&self) -> Vec<f64> {
        self.tape.node_ref(self.id).primal().value().to_vec()
    }

    /// Get one element of the value.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        self.tape.node_ref(self.id).primal().get(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.tape.node_ref(self.id).primal().len()
    }

    /// Always false; an expression holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.tape.node_ref(self.id).primal().is_empty()
    }

    /// Get the variable name, if declared as a variable.
    pub fn name(&self) -> Option<String> {
        self.tape.node_ref(self.id).name().map(str::to_string)
    }

    /// Get the sensitivity accumulated by the latest backward pass through
    /// this node.
    pub fn accumulator(&self) -> Vec<f64> {
        self.tape.node_ref(self.id).accumulator().to_vec()
    }

    /// Gradients of this node with respect to every named leaf it reaches.
    ///
    /// Runs the backward pass on first call and returns the cache afterwards.
    pub fn backward(&self) -> Rc<Jacobian> {
        self.tape.backward(self.id)
    }

    /// Get the derivative with respect to `name`.
    pub fn grad(&self, name: &str) -> Result<Vec<f64>> {
        self.backward()
            .get(name)
            .cloned()
            .ok_or_else(|| AdError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Get the derivative of element `index` with respect to `name`.
    pub fn grad_at(&self, index: usize, name: &str) -> Result<f64> {
        let grad = self.grad(name)?;
        grad.get(index).copied().ok_or(AdError::IndexOutOfBounds {
            index,
            len: grad.len(),
        })
    }

    fn check_same_tape(&self, other: &Var<'_>) -> Result<()> {
        if !std::ptr::eq(self.tape, other.tape) {
            return Err(AdError::TapeMismatch);
        }
        Ok(())
    }

    // Binary operator recording. `value` computes the result from the base
    // formulas; `lhs_weight` and `rhs_weight` get (u, rhs) and (u, v).
    fn binary(
        &self,
        rhs: Operand<'_, Var<'t>>,
        value: impl FnOnce(&Primal, Operand<'_, [f64]>) -> Result<Primal>,
        lhs_weight: impl FnOnce(&[f64], Operand<'_, [f64]>) -> Weight,
        rhs_weight: impl FnOnce(&[f64], &[f64]) -> Weight,
    ) -> Result<Var<'t>> {
        if let Operand::Node(other) = rhs {
            self.check_same_tape(other)?;
        }

        let (primal, edges) = {
            let nodes = self.tape.nodes();
            let lhs = nodes[self.id.index()].primal();
            let rhs_values = match rhs {
                Operand::Scalar(c) => Operand::Scalar(c),
                Operand::Node(other) => Operand::Node(nodes[other.id.index()].primal().value()),
            };
            let primal = value(lhs, rhs_values)?;

            let mut edges: SmallVec<[Edge; 2]> =
                smallvec![Edge::new(self.id, lhs_weight(lhs.value(), rhs_values))];
            if let (Operand::Node(other), Operand::Node(v)) = (rhs, rhs_values) {
                edges.push(Edge::new(other.id, rhs_weight(lhs.value(), v)));
            }
            (primal, edges)
        };

        Ok(Var::new(self.tape, self.tape.push(primal, None, edges)))
    }

    // Unary operator recording with a single edge back to `self`.
    fn unary(
        &self,
        value: impl FnOnce(&Primal) -> Result<Primal>,
        weight: impl FnOnce(&[f64]) -> Weight,
    ) -> Result<Var<'t>> {
        let (primal, weight) = {
            let nodes = self.tape.nodes();
            let u = nodes[self.id.index()].primal();
            (value(u)?, weight(u.value()))
        };
        Ok(self.record_unary(primal, weight))
    }

    fn unary_map(&self, value: impl FnOnce(&Primal) -> Primal, d: impl Fn(f64) -> f64) -> Var<'t> {
        let (primal, weight) = {
            let nodes = self.tape.nodes();
            let u = nodes[self.id.index()].primal();
            (value(u), Weight::map(u.value(), d))
        };
        self.record_unary(primal, weight)
    }

    fn record_unary(&self, primal: Primal, weight: Weight) -> Var<'t> {
        let id = self
            .tape
            .push(primal, None, smallvec![Edge::new(self.id, weight)]);
        Var::new(self.tape, id)
    }

    /// `self + rhs`.
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            rhs.into(),
            |u, rhs| u.add(rhs),
            |_, _| Weight::Uniform(1.0),
            |_, _| Weight::Uniform(1.0),
        )
    }

    /// `self - rhs`.
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            rhs.into(),
            |u, rhs| u.sub(rhs),
            |_, _| Weight::Uniform(1.0),
            |_, _| Weight::Uniform(-1.0),
        )
    }

    /// `c - self`.
    pub fn rsub(&self, c: f64) -> Var<'t> {
        let primal = self.tape.node_ref(self.id).primal().rsub(c);
        self.record_unary(primal, Weight::Uniform(-1.0))
    }

    /// `self * rhs`.
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            rhs.into(),
            |u, rhs| u.mul(rhs),
            |_, rhs| match rhs {
                Operand::Scalar(c) => Weight::Uniform(c),
                Operand::Node(v) => Weight::Elementwise(v.to_vec()),
            },
            |u, _| Weight::Elementwise(u.to_vec()),
        )
    }

    /// `self / rhs`.
    ///
    /// Fails with [`AdError::DivisionByZero`] if the divisor is or contains zero.
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            rhs.into(),
            |u, rhs| u.div(rhs),
            |_, rhs| match rhs {
                Operand::Scalar(c) => Weight::Uniform(1.0 / c),
                Operand::Node(v) => Weight::map(v, |v| 1.0 / v),
            },
            |u, v| Weight::zip(u, v, |u, v| -u / v.powi(2)),
        )
    }

    /// `c / self`.
    pub fn rdiv(&self, c: f64) -> Result<Var<'t>> {
        self.unary(|u| u.rdiv(c), |u| Weight::map(u, |u| -c / u.powi(2)))
    }

    /// `self ** rhs`.
    pub fn pow<'a>(&self, rhs: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            rhs.into(),
            |u, rhs| u.pow(rhs),
            |u, rhs| match rhs {
                Operand::Scalar(c) => Weight::map(u, |u| c * u.powf(c - 1.0)),
                Operand::Node(v) => Weight::zip(u, v, |u, v| v * u.powf(v - 1.0)),
            },
            |u, v| Weight::zip(u, v, |u, v| u.powf(v) * u.ln()),
        )
    }

    /// `-self`.
    pub fn neg(&self) -> Var<'t> {
        let primal = self.tape.node_ref(self.id).primal().neg();
        self.record_unary(primal, Weight::Uniform(-1.0))
    }

    /// `e ** self`.
    pub fn exp(&self) -> Var<'t> {
        self.unary_map(Primal::exp, f64::exp)
    }

    /// `base ** self`, with `self` as the exponent.
    pub fn exp_base<'a>(&self, base: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            base.into(),
            |u, base| u.exp_base(base),
            |u, base| match base {
                Operand::Scalar(b) => Weight::map(u, |u| b.powf(u) * b.ln()),
                Operand::Node(b) => Weight::zip(u, b, |u, b| b.powf(u) * b.ln()),
            },
            |u, b| Weight::zip(u, b, |u, b| u * b.powf(u - 1.0)),
        )
    }

    pub fn sin(&self) -> Var<'t> {
        self.unary_map(Primal::sin, f64::cos)
    }

    pub fn cos(&self) -> Var<'t> {
        self.unary_map(Primal::cos, |u| -u.sin())
    }

    pub fn tan(&self) -> Var<'t> {
        self.unary_map(Primal::tan, |u| 1.0 / u.cos().powi(2))
    }

    /// Inverse sine; fails with [`AdError::OutOfDomain`] for `|x| >= 1`.
    pub fn arcsin(&self) -> Result<Var<'t>> {
        self.unary(Primal::arcsin, |u| {
            Weight::map(u, |u| 1.0 / (1.0 - u.powi(2)).sqrt())
        })
    }

    /// Inverse cosine; fails with [`AdError::OutOfDomain`] for `|x| >= 1`.
    pub fn arccos(&self) -> Result<Var<'t>> {
        self.unary(Primal::arccos, |u| {
            Weight::map(u, |u| -1.0 / (1.0 - u.powi(2)).sqrt())
        })
    }

    pub fn arctan(&self) -> Var<'t> {
        self.unary_map(Primal::arctan, |u| 1.0 / (1.0 + u.powi(2)))
    }

    pub fn sinh(&self) -> Var<'t> {
        self.unary_map(Primal::sinh, f64::cosh)
    }

    pub fn cosh(&self) -> Var<'t> {
        self.unary_map(Primal::cosh, f64::sinh)
    }

    pub fn tanh(&self) -> Var<'t> {
        self.unary_map(Primal::tanh, |u| 1.0 / u.cosh().powi(2))
    }

    /// Logistic function; derivative written as `e^-x / (e^-x + 1)^2`.
    pub fn sigmoid(&self) -> Var<'t> {
        self.unary_map(Primal::sigmoid, |u| (-u).exp() / ((-u).exp() + 1.0).powi(2))
    }

    /// Natural logarithm.
    pub fn log(&self) -> Var<'t> {
        self.unary_map(Primal::log, |u| 1.0 / u)
    }

    /// Logarithm of `self` in `base`.
    pub fn log_base<'a>(&self, base: impl Into<Operand<'a, Var<'t>>>) -> Result<Var<'t>>
    where
        't: 'a,
    {
        self.binary(
            base.into(),
            |u, base| u.log_base(base),
            |u, base| match base {
                Operand::Scalar(b) => Weight::map(u, |u| 1.0 / (u * b.ln())),
                Operand::Node(b) => Weight::zip(u, b, |u, b| 1.0 / (u * b.ln())),
            },
            |u, b| Weight::zip(u, b, |u, b| -u.ln() / (b * b.ln().powi(2))),
        )
    }

    /// `self ** 0.5`.
    pub fn sqrt(&self) -> Var<'t> {
        self.unary_map(Primal::sqrt, |u| 0.5 * u.powf(0.5 - 1.0))
    }
}

impl ScalarElement for Var<'_> {
    fn scalar_element(&self) -> Result<f64> {
        match self.value().as_slice() {
            [single] => Ok(*single),
            values => Err(AdError::InvalidNesting { len: values.len() }),
        }
    }
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.tape.node_ref(self.id);
        f.debug_struct("Var")
            .field("id", &self.id)
            .field("name", &node.name())
            .field("value", &node.primal().value())
            .field("edges", &node.edges().len())
            .finish()
    }
}

/// Prints the variable name (or node id for intermediates), the value and
/// the number of recorded edges. Never runs a backward pass.
impl fmt::Display for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.tape.node_ref(self.id);
        match node.name() {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "{}", self.id)?,
        }
        write!(f, " = {:?}, {} edges", node.primal().value(), node.edges().len())
    }
}

/// Several independent scalar roots forming a vector-valued function.
///
/// Each root keeps its own backward pass and cache; querying one function's
/// gradient never runs the pass for the others.
///
/// # Example
///
/// ```
/// use adtape::Tape;
///
/// let tape = Tape::new();
/// let x = tape.variable(2.0, "x").unwrap();
/// let y = tape.variable(3.0, "y").unwrap();
/// let f = tape.vec(&[x.mul(&y).unwrap(), x.add(&y).unwrap()]).unwrap();
///
/// assert_eq!(f.value(), vec![6.0, 5.0]);
/// assert_eq!(f.grad_at(0, "x").unwrap(), 3.0);
/// assert_eq!(f.grad_at(1, "x").unwrap(), 1.0);
/// assert_eq!(tape.backward_passes(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct VarVector<'t> {
    roots: Vec<Var<'t>>,
}

impl<'t> VarVector<'t> {
    /// Get the roots.
    pub fn roots(&self) -> &[Var<'t>] {
        &self.roots
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Always false; a vector function holds at least one root.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Get the root of function `index`.
    pub fn get(&self, index: usize) -> Result<Var<'t>> {
        self.roots
            .get(index)
            .copied()
            .ok_or(AdError::IndexOutOfBounds {
                index,
                len: self.roots.len(),
            })
    }

    /// Values of every function, in order.
    pub fn value(&self) -> Vec<f64> {
        self.roots.iter().flat_map(|root| root.value()).collect()
    }

    /// Value of function `index`.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        self.get(index)?.value_at(0)
    }

    /// Derivative of every function with respect to `name`.
    ///
    /// Runs (or reuses) the backward pass of every root. A function that does
    /// not depend on `name` contributes zero; fails with
    /// [`AdError::UnknownVariable`] only if no function does.
    pub fn grad(&self, name: &str) -> Result<Vec<f64>> {
        let mut known = false;
        let grad = self
            .roots
            .iter()
            .map(|root| match root.backward().get(name) {
                Some(g) => {
                    known = true;
                    g[0]
                }
                None => 0.0,
            })
            .collect();
        if !known {
            return Err(AdError::UnknownVariable {
                name: name.to_string(),
            });
        }
        Ok(grad)
    }

    /// Derivative of function `index` with respect to `name`.
    ///
    /// Only that function's backward pass runs. Zero if it does not depend
    /// on `name`.
    pub fn grad_at(&self, index: usize, name: &str) -> Result<f64> {
        let root = self.get(index)?;
        Ok(root.backward().get(name).map_or(0.0, |g| g[0]))
    }
}

impl Tape {
    /// Group single-element roots into a vector-valued function.
    ///
    /// Fails with [`AdError::InvalidNesting`] if a root holds more than one
    /// element, [`AdError::TapeMismatch`] if a root lives on another tape,
    /// and [`AdError::EmptyValue`] if `roots` is empty.
    pub fn vec<'t>(&'t self, roots: &[Var<'t>]) -> Result<VarVector<'t>> {
        if roots.is_empty() {
            return Err(AdError::EmptyValue);
        }
        for root in roots {
            if !std::ptr::eq(self, root.tape) {
                return Err(AdError::TapeMismatch);
            }
            root.scalar_element()?;
        }
        Ok(VarVector {
            roots: roots.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_leaf_grad() {
        let tape = Tape::new();
        let x = tape.variable(1.0, "x").unwrap();
        assert_eq!(x.grad("x").unwrap(), vec![1.0]);
        assert_eq!(x.name().as_deref(), Some("x"));
    }

    #[test]
    fn test_display_does_not_run_backward() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();
        let y = x.mul(&x).unwrap();
        assert_eq!(x.to_string(), "x = [2.0], 0 edges");
        assert_eq!(y.to_string(), format!("{} = [4.0], 2 edges", y.id()));
        assert_eq!(tape.backward_passes(), 0);
    }

    #[test]
    fn test_scalar_operands_record_one_edge() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();

        let e = x.add(-1.0).unwrap();
        assert_eq!(e.value(), vec![1.0]);
        assert_eq!(tape.node_ref(e.id()).edges().len(), 1);
        assert_eq!(e.grad("x").unwrap(), vec![1.0]);

        let m = x.mul(3.0).unwrap();
        assert_eq!(
            tape.node_ref(m.id()).edges()[0].weight(),
            &Weight::Uniform(3.0)
        );
        assert_eq!(m.grad("x").unwrap(), vec![3.0]);
    }

    #[test]
    fn test_binary_edge_weights() {
        let tape = Tape::new();
        let u = tape.variable(6.0, "u").unwrap();
        let v = tape.variable(3.0, "v").unwrap();

        fn weights(tape: &Tape, var: Var<'_>) -> Vec<Weight> {
            tape.node_ref(var.id())
                .edges()
                .iter()
                .map(|e| e.weight().clone())
                .collect()
        }

        assert_eq!(
            weights(&tape, u.sub(&v).unwrap()),
            vec![Weight::Uniform(1.0), Weight::Uniform(-1.0)]
        );
        assert_eq!(
            weights(&tape, u.mul(&v).unwrap()),
            vec![Weight::Elementwise(vec![3.0]), Weight::Elementwise(vec![6.0])]
        );
        assert_eq!(
            weights(&tape, u.div(&v).unwrap()),
            vec![
                Weight::Elementwise(vec![1.0 / 3.0]),
                Weight::Elementwise(vec![-6.0 / 9.0])
            ]
        );
    }

    #[test]
    fn test_sub_rsub_neg() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();
        let y = tape.variable(1.0, "y").unwrap();

        let d = x.sub(&y).unwrap();
        assert_eq!(d.value(), vec![1.0]);
        assert_eq!(d.grad("y").unwrap(), vec![-1.0]);

        let zero = d.sub(&d).unwrap();
        assert_eq!(zero.value(), vec![0.0]);
        assert_eq!(zero.grad("x").unwrap(), vec![0.0]);

        let r = x.rsub(1.0);
        assert_eq!(r.value(), vec![-1.0]);
        assert_eq!(r.grad("x").unwrap(), vec![-1.0]);

        let n = x.neg();
        assert_eq!(n.value(), vec![-2.0]);
        assert_eq!(n.grad("x").unwrap(), vec![-1.0]);
    }

    #[test]
    fn test_div_and_rdiv() {
        let tape = Tape::new();
        let x = tape.variable(6.0, "x").unwrap();
        let y = tape.variable(3.0, "y").unwrap();

        assert_eq!(x.div(3.0).unwrap().grad("x").unwrap(), vec![1.0 / 3.0]);
        let q = x.div(&y).unwrap();
        assert_eq!(q.value(), vec![2.0]);
        assert_relative_eq!(q.grad("x").unwrap()[0], 1.0 / 3.0);

        let r = x.rdiv(3.0).unwrap();
        assert_eq!(r.value(), vec![0.5]);
        assert_relative_eq!(r.grad("x").unwrap()[0], -1.0 / 12.0);

        let zero = tape.variable(0.0, "z").unwrap();
        assert_eq!(x.div(0.0).unwrap_err(), AdError::DivisionByZero);
        assert_eq!(x.div(&zero).unwrap_err(), AdError::DivisionByZero);
        assert_eq!(zero.rdiv(3.0).unwrap_err(), AdError::DivisionByZero);
    }

    #[test]
    fn test_failed_operator_records_nothing() {
        let tape = Tape::new();
        let x = tape.variable(1.0, "x").unwrap();
        let before = tape.len();
        assert!(x.div(0.0).is_err());
        assert!(x.arcsin().is_err());
        assert_eq!(tape.len(), before);
    }

    #[test]
    fn test_pow_and_sqrt() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();
        let y = tape.variable(1.0, "y").unwrap();

        let p = x.pow(&y).unwrap();
        assert_eq!(p.value(), vec![2.0]);
        assert_eq!(p.grad("x").unwrap(), vec![1.0]);
        assert_relative_eq!(p.grad("y").unwrap()[0], 2.0 * 2f64.ln());

        let s = x.pow(2.0).unwrap();
        assert_eq!(s.value(), vec![4.0]);
        assert_eq!(s.grad("x").unwrap(), vec![4.0]);

        let four = tape.variable(4.0, "x").unwrap();
        let r = four.sqrt();
        assert_relative_eq!(r.value()[0], 2.0);
        assert_relative_eq!(r.grad("x").unwrap()[0], 0.25);
    }

    #[test]
    fn test_exp_and_log_bases() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();

        assert_relative_eq!(x.exp().grad("x").unwrap()[0], 2f64.exp());
        let t = x.exp_base(10.0).unwrap();
        assert_relative_eq!(t.value()[0], 100.0);
        assert_relative_eq!(t.grad("x").unwrap()[0], 100.0 * 10f64.ln());

        let b = tape.variable(3.0, "b").unwrap();
        let n = x.exp_base(&b).unwrap();
        assert_relative_eq!(n.grad("b").unwrap()[0], 6.0);

        let l = x.log_base(10.0).unwrap();
        assert_relative_eq!(l.grad("x").unwrap()[0], 1.0 / (2.0 * 10f64.ln()));
        let four = tape.variable(4.0, "b").unwrap();
        let ln = x.log_base(&four).unwrap();
        assert_relative_eq!(ln.value()[0], 0.5);
        assert_relative_eq!(
            ln.grad("b").unwrap()[0],
            -(2f64.ln()) / (4.0 * 4f64.ln().powi(2))
        );
        assert_relative_eq!(x.log().grad("x").unwrap()[0], 0.5);
    }

    #[test]
    fn test_elementwise_vector_node() {
        let tape = Tape::new();
        let v = tape.variable(vec![1.0, 2.0, 3.0], "v").unwrap();
        let sq = v.mul(&v).unwrap();
        assert_eq!(sq.value(), vec![1.0, 4.0, 9.0]);
        assert_eq!(sq.grad("v").unwrap(), vec![2.0, 4.0, 6.0]);
        assert_eq!(sq.grad_at(2, "v").unwrap(), 6.0);

        let w = tape.variable(vec![1.0, 2.0], "w").unwrap();
        assert!(matches!(v.add(&w), Err(AdError::LengthMismatch { .. })));
    }

    #[test]
    fn test_tape_mismatch() {
        let a = Tape::new();
        let b = Tape::new();
        let x = a.variable(1.0, "x").unwrap();
        let y = b.variable(1.0, "y").unwrap();
        assert_eq!(x.add(&y).unwrap_err(), AdError::TapeMismatch);
        assert_eq!(a.vec(&[y]).unwrap_err(), AdError::TapeMismatch);
    }

    #[test]
    fn test_unknown_variable() {
        let tape = Tape::new();
        let x = tape.variable(1.0, "x").unwrap();
        assert!(matches!(
            x.sin().grad("y"),
            Err(AdError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_vec_rejects_multi_element_roots() {
        let tape = Tape::new();
        let v = tape.variable(vec![1.0, 2.0], "v").unwrap();
        assert_eq!(
            tape.vec(&[v]).unwrap_err(),
            AdError::InvalidNesting { len: 2 }
        );
        assert_eq!(tape.vec(&[]).unwrap_err(), AdError::EmptyValue);
    }

    #[test]
    fn test_vec_runs_only_requested_root() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();
        let y = tape.variable(3.0, "y").unwrap();
        let f = tape
            .vec(&[x.mul(&y).unwrap(), x.add(&y).unwrap()])
            .unwrap();

        assert_eq!(f.grad_at(1, "y").unwrap(), 1.0);
        assert_eq!(tape.backward_passes(), 1);
        assert_eq!(f.grad("x").unwrap(), vec![3.0, 1.0]);
        assert_eq!(tape.backward_passes(), 2);
        assert_eq!(f.value_at(0).unwrap(), 6.0);
        assert!(f.grad_at(2, "x").is_err());
    }

    #[test]
    fn test_vec_pads_independent_roots_with_zero() {
        let tape = Tape::new();
        let x = tape.variable(2.0, "x").unwrap();
        let y = tape.variable(3.0, "y").unwrap();
        let f = tape.vec(&[x.sin(), y.cos()]).unwrap();

        assert_eq!(f.grad_at(0, "y").unwrap(), 0.0);
        assert_eq!(f.grad("x").unwrap(), vec![2f64.cos(), 0.0]);
        assert!(matches!(
            f.grad("z"),
            Err(AdError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_debug_output() {
        let tape = Tape::new();
        let x = tape.variable(1.0, "x").unwrap();
        let s = format!("{:?}", x);
        assert!(s.contains("\"x\""));
        assert!(s.contains("edges: 0"));
    }
}
