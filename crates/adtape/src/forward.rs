//! DualExpr - expression with a gradient dictionary for forward-mode AD.
//!
//! Forward-mode AD carries, next to every value, the derivative of that value
//! with respect to each named input variable. Every operator combines the
//! operands' gradient dictionaries with the chain rule immediately, so there
//! is no deferred pass: a gradient query only reads what is already stored.
//!
//! # Example
//!
//! ```
//! use adtape::DualExpr;
//!
//! let x = DualExpr::variable(2.0, "x").unwrap();
//! let y = DualExpr::variable(3.0, "y").unwrap();
//!
//! // f(x, y) = x * y + sin(x)
//! let f = x.mul(&y).unwrap().add(&x.sin()).unwrap();
//!
//! assert_eq!(f.grad("y").unwrap(), &[2.0]);
//! assert_eq!(f.grad("x").unwrap(), &[3.0 + 2f64.cos()]);
//! ```

use crate::error::{AdError, Result};
use crate::operand::Operand;
use crate::primal::{ExprId, IntoPrimal, Primal, ScalarElement};
use std::collections::HashMap;
use std::fmt;

/// Mapping from variable name to a derivative vector of the value's length.
pub type GradientMap = HashMap<String, Vec<f64>>;

/// A value together with its derivatives for forward-mode AD.
///
/// Every gradient vector has the same length as the value. A key that is
/// absent means the derivative with respect to that variable is zero.
/// A clone is the same expression and keeps its [`ExprId`].
#[derive(Debug, Clone)]
pub struct DualExpr {
    primal: Primal,
    gradients: GradientMap,
    /// Set only on declared variables.
    name: Option<String>,
}

impl DualExpr {
    /// Create a variable seeded with unit sensitivity to itself.
    ///
    /// # Example
    ///
    /// ```
    /// use adtape::DualExpr;
    ///
    /// let v = DualExpr::variable(vec![1.0, 2.0], "v").unwrap();
    /// assert_eq!(v.grad("v").unwrap(), &[1.0, 1.0]);
    /// assert_eq!(v.name(), Some("v"));
    /// ```
    pub fn variable(value: impl IntoPrimal, name: impl Into<String>) -> Result<Self> {
        let primal = value.into_primal()?;
        let name = name.into();
        let mut gradients = GradientMap::new();
        gradients.insert(name.clone(), vec![1.0; primal.len()]);
        Ok(Self {
            primal,
            gradients,
            name: Some(name),
        })
    }

    /// Create an expression that depends on no variable.
    pub fn constant(value: impl IntoPrimal) -> Result<Self> {
        Ok(Self::from_parts(value.into_primal()?, GradientMap::new()))
    }

    /// Create from a value and an explicit gradient dictionary, used verbatim.
    ///
    /// Fails with [`AdError::LengthMismatch`] if any gradient vector does not
    /// match the value length.
    pub fn with_gradients(value: impl IntoPrimal, gradients: GradientMap) -> Result<Self> {
        let primal = value.into_primal()?;
        for grad in gradients.values() {
            primal.check_len(grad.len())?;
        }
        Ok(Self::from_parts(primal, gradients))
    }

    fn from_parts(primal: Primal, gradients: GradientMap) -> Self {
        Self {
            primal,
            gradients,
            name: None,
        }
    }

    /// Get the identifier.
    pub fn id(&self) -> ExprId {
        self.primal.id()
    }

    /// Get the variable name, if this expression was declared as a variable.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the value container.
    pub fn primal(&self) -> &Primal {
        &self.primal
    }

    /// Get the value vector.
    pub fn value(&self) -> &[f64] {
        self.primal.value()
    }

    /// Get one element of the value.
    pub fn value_at(&self, index: usize) -> Result<f64> {
        self.primal.get(index)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.primal.len()
    }

    /// Always false; an expression holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.primal.is_empty()
    }

    /// Get the full gradient dictionary.
    pub fn gradients(&self) -> &GradientMap {
        &self.gradients
    }

    /// Iterate over the variable names this expression depends on.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.gradients.keys().map(String::as_str)
    }

    /// Get the derivative vector with respect to `name`.
    pub fn grad(&self, name: &str) -> Result<&[f64]> {
        self.gradients
            .get(name)
            .map(Vec::as_slice)
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

    // Applies `d(u, du)` to every gradient entry of a unary result.
    fn unary(&self, primal: Primal, d: impl Fn(f64, f64) -> f64) -> DualExpr {
        let u = self.value();
        let gradients = self
            .gradients
            .iter()
            .map(|(key, du)| {
                let grad = u.iter().zip(du).map(|(&u, &du)| d(u, du)).collect();
                (key.clone(), grad)
            })
            .collect();
        Self::from_parts(primal, gradients)
    }

    // Chain rule over the union of both key sets. `both`, `lhs_only` and
    // `rhs_only` receive (u, v, du, dv) with the missing derivative set to 0.
    fn combine(
        &self,
        other: &DualExpr,
        primal: Primal,
        both: impl Fn(f64, f64, f64, f64) -> f64,
        lhs_only: impl Fn(f64, f64, f64) -> f64,
        rhs_only: impl Fn(f64, f64, f64) -> f64,
    ) -> DualExpr {
        let (u, v) = (self.value(), other.value());
        let mut gradients = GradientMap::new();
        for (key, du) in &self.gradients {
            let grad = match other.gradients.get(key) {
                Some(dv) => (0..u.len()).map(|i| both(u[i], v[i], du[i], dv[i])).collect(),
                None => (0..u.len()).map(|i| lhs_only(u[i], v[i], du[i])).collect(),
            };
            gradients.insert(key.clone(), grad);
        }
        for (key, dv) in &other.gradients {
            if !self.gradients.contains_key(key) {
                let grad = (0..u.len()).map(|i| rhs_only(u[i], v[i], dv[i])).collect();
                gradients.insert(key.clone(), grad);
            }
        }
        Self::from_parts(primal, gradients)
    }

    /// `self + rhs`.
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match rhs.into() {
            Operand::Scalar(c) => Ok(Self::from_parts(
                self.primal.add(Operand::Scalar(c))?,
                self.gradients.clone(),
            )),
            Operand::Node(other) => {
                let primal = self.primal.add(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |_, _, du, dv| du + dv,
                    |_, _, du| du,
                    |_, _, dv| dv,
                ))
            }
        }
    }

    /// `self - rhs`.
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match rhs.into() {
            Operand::Scalar(c) => Ok(Self::from_parts(
                self.primal.sub(Operand::Scalar(c))?,
                self.gradients.clone(),
            )),
            Operand::Node(other) => {
                let primal = self.primal.sub(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |_, _, du, dv| du - dv,
                    |_, _, du| du,
                    |_, _, dv| -dv,
                ))
            }
        }
    }

    /// `c - self`.
    pub fn rsub(&self, c: f64) -> DualExpr {
        self.unary(self.primal.rsub(c), |_, du| -du)
    }

    /// `self * rhs`.
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match rhs.into() {
            Operand::Scalar(c) => {
                let primal = self.primal.mul(Operand::Scalar(c))?;
                Ok(self.unary(primal, |_, du| du * c))
            }
            Operand::Node(other) => {
                let primal = self.primal.mul(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |u, v, du, dv| u * dv + v * du,
                    |_, v, du| v * du,
                    |u, _, dv| u * dv,
                ))
            }
        }
    }

    /// `self / rhs`.
    ///
    /// Fails with [`AdError::DivisionByZero`] if the divisor is or contains zero.
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match rhs.into() {
            Operand::Scalar(c) => {
                let primal = self.primal.div(Operand::Scalar(c))?;
                Ok(self.unary(primal, |_, du| du / c))
            }
            Operand::Node(other) => {
                let primal = self.primal.div(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |u, v, du, dv| (du * v - dv * u) / (v * v),
                    |_, v, du| du * v / (v * v),
                    |u, v, dv| -(dv * u) / (v * v),
                ))
            }
        }
    }

    /// `c / self`.
    pub fn rdiv(&self, c: f64) -> Result<DualExpr> {
        let primal = self.primal.rdiv(c)?;
        Ok(self.unary(primal, |u, du| -(c * du) / (u * u)))
    }

    /// `self ** rhs`.
    ///
    /// # Example
    ///
    /// ```
    /// use adtape::DualExpr;
    ///
    /// let x = DualExpr::variable(2.0, "x").unwrap();
    /// let y = x.pow(2.0).unwrap();
    /// assert_eq!(y.value(), &[4.0]);
    /// assert_eq!(y.grad("x").unwrap(), &[4.0]);
    /// ```
    pub fn pow<'a>(&self, rhs: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match rhs.into() {
            Operand::Scalar(c) => {
                let primal = self.primal.pow(Operand::Scalar(c))?;
                Ok(self.unary(primal, |u, du| du * (c * u.powf(c - 1.0))))
            }
            Operand::Node(other) => {
                let primal = self.primal.pow(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |u, v, du, dv| v * u.powf(v - 1.0) * du + u.powf(v) * u.ln() * dv,
                    |u, v, du| v * u.powf(v - 1.0) * du,
                    |u, v, dv| u.powf(v) * u.ln() * dv,
                ))
            }
        }
    }

    /// `-self`.
    pub fn neg(&self) -> DualExpr {
        self.unary(self.primal.neg(), |_, du| du * -1.0)
    }

    /// `e ** self`.
    pub fn exp(&self) -> DualExpr {
        self.unary(self.primal.exp(), |u, du| u.exp() * du)
    }

    /// `base ** self`, with `self` as the exponent.
    pub fn exp_base<'a>(&self, base: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match base.into() {
            Operand::Scalar(b) => {
                let primal = self.primal.exp_base(Operand::Scalar(b))?;
                Ok(self.unary(primal, |u, du| b.powf(u) * du * b.ln()))
            }
            Operand::Node(other) => {
                let primal = self.primal.exp_base(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |u, b, du, db| b.powf(u) * b.ln() * du + u * b.powf(u - 1.0) * db,
                    |u, b, du| b.powf(u) * b.ln() * du,
                    |u, b, db| u * b.powf(u - 1.0) * db,
                ))
            }
        }
    }

    pub fn sin(&self) -> DualExpr {
        self.unary(self.primal.sin(), |u, du| u.cos() * du)
    }

    pub fn cos(&self) -> DualExpr {
        self.unary(self.primal.cos(), |u, du| -u.sin() * du)
    }

    pub fn tan(&self) -> DualExpr {
        self.unary(self.primal.tan(), |u, du| du / (u.cos() * u.cos()))
    }

    /// Inverse sine; fails with [`AdError::OutOfDomain`] for `|x| >= 1`.
    pub fn arcsin(&self) -> Result<DualExpr> {
        let primal = self.primal.arcsin()?;
        Ok(self.unary(primal, |u, du| 1.0 / (1.0 - u.powi(2)).sqrt() * du))
    }

    /// Inverse cosine; fails with [`AdError::OutOfDomain`] for `|x| >= 1`.
    pub fn arccos(&self) -> Result<DualExpr> {
        let primal = self.primal.arccos()?;
        Ok(self.unary(primal, |u, du| -1.0 / (1.0 - u.powi(2)).sqrt() * du))
    }

    pub fn arctan(&self) -> DualExpr {
        self.unary(self.primal.arctan(), |u, du| 1.0 / (1.0 + u.powi(2)) * du)
    }

    pub fn sinh(&self) -> DualExpr {
        self.unary(self.primal.sinh(), |u, du| u.cosh() * du)
    }

    pub fn cosh(&self) -> DualExpr {
        self.unary(self.primal.cosh(), |u, du| u.sinh() * du)
    }

    pub fn tanh(&self) -> DualExpr {
        self.unary(self.primal.tanh(), |u, du| 1.0 / u.cosh().powi(2) * du)
    }

    /// Logistic function; derivative written as `e^x / (e^x + 1)^2`.
    pub fn sigmoid(&self) -> DualExpr {
        self.unary(self.primal.sigmoid(), |u, du| {
            u.exp() / (u.exp() + 1.0).powi(2) * du
        })
    }

    /// Natural logarithm.
    pub fn log(&self) -> DualExpr {
        self.unary(self.primal.log(), |u, du| du / u)
    }

    /// Logarithm of `self` in `base`.
    pub fn log_base<'a>(&self, base: impl Into<Operand<'a, DualExpr>>) -> Result<DualExpr> {
        match base.into() {
            Operand::Scalar(b) => {
                let primal = self.primal.log_base(Operand::Scalar(b))?;
                Ok(self.unary(primal, |u, du| du / u * (1.0 / b.ln())))
            }
            Operand::Node(other) => {
                let primal = self.primal.log_base(Operand::Node(other.value()))?;
                Ok(self.combine(
                    other,
                    primal,
                    |u, b, du, db| du / (u * b.ln()) - u.ln() * db / (b * b.ln().powi(2)),
                    |u, b, du| du / (u * b.ln()),
                    |u, b, db| -(u.ln() * db) / (b * b.ln().powi(2)),
                ))
            }
        }
    }

    /// `self ** 0.5`.
    pub fn sqrt(&self) -> DualExpr {
        self.unary(self.primal.sqrt(), |u, du| du * (0.5 * u.powf(0.5 - 1.0)))
    }

    /// Concatenate several expressions into one vector-valued expression.
    ///
    /// Values are concatenated in order. Gradient dictionaries are merged
    /// positionally: a variable that an item does not depend on contributes
    /// zeros over that item's span, so every gradient vector stays aligned
    /// with the concatenated value.
    ///
    /// # Example
    ///
    /// ```
    /// use adtape::{DualExpr, Operand};
    ///
    /// let x = DualExpr::variable(2.0, "x").unwrap();
    /// let y = DualExpr::variable(3.0, "y").unwrap();
    /// let xy = x.mul(&y).unwrap();
    /// let x_plus_y = x.add(&y).unwrap();
    ///
    /// let f = DualExpr::stack(&[Operand::Node(&xy), Operand::Node(&x_plus_y)]).unwrap();
    /// assert_eq!(f.value(), &[6.0, 5.0]);
    /// assert_eq!(f.grad_at(0, "x").unwrap(), 3.0);
    /// assert_eq!(f.grad_at(1, "x").unwrap(), 1.0);
    /// ```
    pub fn stack(items: &[Operand<'_, DualExpr>]) -> Result<DualExpr> {
        let mut value = Vec::new();
        let mut gradients = GradientMap::new();
        for item in items {
            let offset = value.len();
            match item {
                Operand::Scalar(c) => value.push(*c),
                Operand::Node(expr) => {
                    for (key, grad) in &expr.gradients {
                        let entry = gradients.entry(key.clone()).or_default();
                        entry.resize(offset, 0.0);
                        entry.extend_from_slice(grad);
                    }
                    value.extend_from_slice(expr.value());
                }
            }
            for grad in gradients.values_mut() {
                grad.resize(value.len(), 0.0);
            }
        }
        Ok(Self::from_parts(Primal::from_vec(value)?, gradients))
    }
}

impl ScalarElement for DualExpr {
    fn scalar_element(&self) -> Result<f64> {
        match self.value() {
            [single] => Ok(*single),
            values => Err(AdError::InvalidNesting { len: values.len() }),
        }
    }
}

/// Prints the value and the gradients sorted by variable name.
impl fmt::Display for DualExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.gradients.keys().collect();
        names.sort();
        write!(f, "value {:?}, grad {{", self.value())?;
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {:?}", self.gradients[name])?;
        }
        f.write_str("}")
    }
}
