//! Value container shared by forward- and reverse-mode expressions.
//!
//! A [`Primal`] is the numeric half of every expression: a unique identifier
//! plus a flat, non-empty vector of `f64`. All operator *values* are computed
//! here, once. [`crate::DualExpr`] and [`crate::Var`] call these functions and
//! only add their own derivative bookkeeping, so a value and its derivative are
//! always derived from the same formula.

use crate::error::{AdError, Result};
use crate::operand::Operand;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique, monotonically increasing expression identifier.
///
/// Identifiers are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u64);

impl ExprId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw counter value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Expression kinds that can contribute one element to a composite value.
pub trait ScalarElement {
    /// The single value this expression represents.
    ///
    /// Fails with [`AdError::InvalidNesting`] when the expression holds more
    /// than one element.
    fn scalar_element(&self) -> Result<f64>;
}

/// Conversion into a [`Primal`].
///
/// Implemented for a single `f64`, vectors, slices, arrays, and `Primal`
/// itself, so constructors accept whichever is convenient.
pub trait IntoPrimal {
    /// Build the value container.
    fn into_primal(self) -> Result<Primal>;
}

impl IntoPrimal for Primal {
    fn into_primal(self) -> Result<Primal> {
        Ok(self)
    }
}

impl IntoPrimal for f64 {
    fn into_primal(self) -> Result<Primal> {
        Ok(Primal::scalar(self))
    }
}

impl IntoPrimal for Vec<f64> {
    fn into_primal(self) -> Result<Primal> {
        Primal::from_vec(self)
    }
}

impl IntoPrimal for &[f64] {
    fn into_primal(self) -> Result<Primal> {
        Primal::from_slice(self)
    }
}

impl<const N: usize> IntoPrimal for [f64; N] {
    fn into_primal(self) -> Result<Primal> {
        Primal::from_slice(&self)
    }
}

/// Identifier plus flat value vector.
///
/// # Example
///
/// ```
/// use adtape::Primal;
///
/// let p = Primal::from_slice(&[1.0, 4.0, 9.0]).unwrap();
/// let q = p.sqrt();
/// assert_eq!(q.value(), &[1.0, 2.0, 3.0]);
/// assert!(q.id() > p.id());
/// ```
///
/// Cloning copies the identifier: a clone stands for the same value, and
/// only constructors and operators draw fresh ids.
#[derive(Debug, Clone)]
pub struct Primal {
    id: ExprId,
    value: Vec<f64>,
}

impl Primal {
    /// Create a single-element value.
    pub fn scalar(value: f64) -> Self {
        Self {
            id: ExprId::next(),
            value: vec![value],
        }
    }

    /// Create from an owned vector.
    ///
    /// Fails with [`AdError::EmptyValue`] if `value` is empty.
    pub fn from_vec(value: Vec<f64>) -> Result<Self> {
        if value.is_empty() {
            return Err(AdError::EmptyValue);
        }
        Ok(Self {
            id: ExprId::next(),
            value,
        })
    }

    /// Create from a slice of scalars.
    pub fn from_slice(value: &[f64]) -> Result<Self> {
        Self::from_vec(value.to_vec())
    }

    /// Create from a mix of scalars and single-element expressions.
    ///
    /// Every node must itself represent exactly one scalar; a multi-element
    /// node fails with [`AdError::InvalidNesting`].
    ///
    /// # Example
    ///
    /// ```
    /// use adtape::{DualExpr, Operand, Primal};
    ///
    /// let x = DualExpr::variable(2.0, "x").unwrap();
    /// let p = Primal::from_elements(&[Operand::Scalar(1.0), Operand::Node(&x)]).unwrap();
    /// assert_eq!(p.value(), &[1.0, 2.0]);
    ///
    /// let v = DualExpr::variable(vec![1.0, 2.0], "v").unwrap();
    /// assert!(Primal::from_elements(&[Operand::Node(&v)]).is_err());
    /// ```
    pub fn from_elements<N: ScalarElement>(elements: &[Operand<'_, N>]) -> Result<Self> {
        let value = elements
            .iter()
            .map(|element| match element {
                Operand::Scalar(c) => Ok(*c),
                Operand::Node(node) => node.scalar_element(),
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::from_vec(value)
    }

    /// Get the identifier.
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// Get the value vector.
    pub fn value(&self) -> &[f64] {
        &self.value
    }

    /// Get the element at `index`.
    pub fn get(&self, index: usize) -> Result<f64> {
        self.value
            .get(index)
            .copied()
            .ok_or(AdError::IndexOutOfBounds {
                index,
                len: self.value.len(),
            })
    }

    /// Number of elements (always at least one).
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Consume and return the value vector.
    pub fn into_value(self) -> Vec<f64> {
        self.value
    }

    pub(crate) fn check_len(&self, other: usize) -> Result<()> {
        if self.len() != other {
            return Err(AdError::LengthMismatch {
                expected: self.len(),
                actual: other,
            });
        }
        Ok(())
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Primal {
        Primal {
            id: ExprId::next(),
            value: self.value.iter().map(|&u| f(u)).collect(),
        }
    }

    fn zip_with(&self, rhs: Operand<'_, [f64]>, f: impl Fn(f64, f64) -> f64) -> Result<Primal> {
        match rhs {
            Operand::Scalar(c) => Ok(self.map(|u| f(u, c))),
            Operand::Node(other) => {
                self.check_len(other.len())?;
                Ok(Primal {
                    id: ExprId::next(),
                    value: self
                        .value
                        .iter()
                        .zip(other)
                        .map(|(&u, &v)| f(u, v))
                        .collect(),
                })
            }
        }
    }

    /// `self + rhs`.
    pub fn add(&self, rhs: Operand<'_, [f64]>) -> Result<Primal> {
        self.zip_with(rhs, |u, v| u + v)
    }

    /// `self - rhs`.
    pub fn sub(&self, rhs: Operand<'_, [f64]>) -> Result<Primal> {
        self.zip_with(rhs, |u, v| u - v)
    }

    /// `c - self`.
    pub fn rsub(&self, c: f64) -> Primal {
        self.map(|u| c - u)
    }

    /// `self * rhs`.
    pub fn mul(&self, rhs: Operand<'_, [f64]>) -> Result<Primal> {
        self.zip_with(rhs, |u, v| u * v)
    }

    /// `self / rhs`.
    ///
    /// Fails with [`AdError::DivisionByZero`] before dividing if the divisor
    /// is, or contains, zero.
    pub fn div(&self, rhs: Operand<'_, [f64]>) -> Result<Primal> {
        check_nonzero(rhs)?;
        self.zip_with(rhs, |u, v| u / v)
    }

    /// `c / self`.
    pub fn rdiv(&self, c: f64) -> Result<Primal> {
        check_nonzero(Operand::Node(&self.value))?;
        Ok(self.map(|u| c / u))
    }

    /// `self ** rhs`.
    pub fn pow(&self, rhs: Operand<'_, [f64]>) -> Result<Primal> {
        self.zip_with(rhs, f64::powf)
    }

    /// `-self`.
    pub fn neg(&self) -> Primal {
        self.map(|u| u * -1.0)
    }

    /// `e ** self`.
    pub fn exp(&self) -> Primal {
        self.map(f64::exp)
    }

    /// `base ** self`.
    pub fn exp_base(&self, base: Operand<'_, [f64]>) -> Result<Primal> {
        self.zip_with(base, |u, b| b.powf(u))
    }

    pub fn sin(&self) -> Primal {
        self.map(f64::sin)
    }

    pub fn cos(&self) -> Primal {
        self.map(f64::cos)
    }

    pub fn tan(&self) -> Primal {
        self.map(f64::tan)
    }

    /// Inverse sine.
    ///
    /// Fails with [`AdError::OutOfDomain`] if any element has `|x| >= 1`, where
    /// the derivative `1/sqrt(1 - x^2)` is infinite or undefined.
    pub fn arcsin(&self) -> Result<Primal> {
        self.check_open_unit_interval("arcsin")?;
        Ok(self.map(f64::asin))
    }

    /// Inverse cosine. Same domain rule as [`Primal::arcsin`].
    pub fn arccos(&self) -> Result<Primal> {
        self.check_open_unit_interval("arccos")?;
        Ok(self.map(f64::acos))
    }

    pub fn arctan(&self) -> Primal {
        self.map(f64::atan)
    }

    pub fn sinh(&self) -> Primal {
        self.map(f64::sinh)
    }

    pub fn cosh(&self) -> Primal {
        self.map(f64::cosh)
    }

    pub fn tanh(&self) -> Primal {
        self.map(f64::tanh)
    }

    /// Logistic function `1 / (1 + e^-x)`.
    pub fn sigmoid(&self) -> Primal {
        self.map(|u| 1.0 / (1.0 + (-u).exp()))
    }

    /// Natural logarithm.
    pub fn log(&self) -> Primal {
        self.map(f64::ln)
    }

    /// Logarithm in `base`: `ln(self) / ln(base)`.
    ///
    /// A base of exactly 1 has `ln(base) == 0` and fails with
    /// [`AdError::DivisionByZero`].
    pub fn log_base(&self, base: Operand<'_, [f64]>) -> Result<Primal> {
        match base {
            Operand::Scalar(b) => check_nonzero(Operand::Scalar(b.ln()))?,
            Operand::Node(b) => {
                let ln_b: Vec<f64> = b.iter().map(|v| v.ln()).collect();
                check_nonzero(Operand::Node(&ln_b))?;
            }
        }
        self.zip_with(base, |u, b| u.ln() / b.ln())
    }

    /// `self ** 0.5`.
    pub fn sqrt(&self) -> Primal {
        self.map(|u| u.powf(0.5))
    }

    fn check_open_unit_interval(&self, op: &'static str) -> Result<()> {
        match self.value.iter().find(|u| !(u.abs() < 1.0)) {
            Some(&value) => Err(AdError::OutOfDomain { op, value }),
            None => Ok(()),
        }
    }
}

fn check_nonzero(divisor: Operand<'_, [f64]>) -> Result<()> {
    let has_zero = match divisor {
        Operand::Scalar(c) => c == 0.0,
        Operand::Node(values) => values.contains(&0.0),
    };
    if has_zero {
        return Err(AdError::DivisionByZero);
    }
    Ok(())
}
