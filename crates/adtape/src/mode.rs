//! Mode selection facade.
//!
//! [`AdContext`] owns an explicit [`AdConfig`] and the reverse-mode [`Tape`].
//! Expressions created through it are [`Expr`] values that dispatch every
//! operator to the forward or reverse implementation, so the same code path
//! can be differentiated either way.
//!
//! # Example
//!
//! ```
//! use adtape::{AdConfig, AdContext, Mode};
//!
//! for mode in [Mode::Forward, Mode::Reverse] {
//!     let ctx = AdContext::new(AdConfig::new(mode));
//!     let x = ctx.variable(2.0, "x").unwrap();
//!     let y = ctx.variable(3.0, "y").unwrap();
//!     let f = x.mul(&y).unwrap().add(&x.sin()).unwrap();
//!
//!     let grads = ctx.gradient(&f, &[&x, &y]).unwrap();
//!     assert_eq!(grads[0], vec![3.0 + 2f64.cos()]);
//!     assert_eq!(grads[1], vec![2.0]);
//! }
//! ```

use crate::error::{AdError, Result};
use crate::forward::DualExpr;
use crate::operand::Operand;
use crate::primal::IntoPrimal;
use crate::reverse::{Tape, Var, VarVector};
use log::warn;
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

/// Differentiation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Mode {
    /// Derivatives propagated eagerly next to every value.
    #[default]
    Forward,
    /// Operations recorded on a tape, gradients computed by a backward pass.
    Reverse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Forward => "forward",
            Mode::Reverse => "reverse",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = AdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "forward" => Ok(Mode::Forward),
            "reverse" => Ok(Mode::Reverse),
            _ => Err(AdError::UnknownMode(s.to_string())),
        }
    }
}

/// Configuration for an [`AdContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AdConfig {
    /// Mode used by newly created expressions.
    pub mode: Mode,
}

impl AdConfig {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }
}

/// Entry point that creates expressions in the configured mode.
///
/// The context owns the tape reverse-mode expressions live on, so every
/// [`Expr`] it hands out borrows it.
pub struct AdContext {
    mode: Cell<Mode>,
    tape: Tape,
    forward_created: Cell<usize>,
}

impl AdContext {
    pub fn new(config: AdConfig) -> Self {
        Self {
            mode: Cell::new(config.mode),
            tape: Tape::new(),
            forward_created: Cell::new(0),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> AdConfig {
        AdConfig::new(self.mode.get())
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Switch the mode used by expressions created from now on.
    ///
    /// Existing expressions keep their mode; combining them with new ones
    /// fails with [`AdError::UnsupportedType`]. Switching while expressions
    /// of the old mode exist is allowed but logged as a warning.
    pub fn set_mode(&self, mode: Mode) {
        let current = self.mode.get();
        if current == mode {
            return;
        }
        let created = match current {
            Mode::Forward => self.forward_created.get(),
            Mode::Reverse => self.tape.len(),
        };
        if created > 0 {
            warn!(
                "switching differentiation mode from {current} to {mode} \
                 with {created} {current} expressions created"
            );
        }
        self.mode.set(mode);
    }

    /// The tape reverse-mode expressions are recorded on.
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Create a constant expression: it carries no gradient entries.
    pub fn create_expression(&self, value: impl IntoPrimal) -> Result<Expr<'_>> {
        match self.mode.get() {
            Mode::Forward => {
                let expr = DualExpr::constant(value)?;
                self.count_forward();
                Ok(Expr::Forward(expr))
            }
            Mode::Reverse => Ok(Expr::Reverse(self.tape.constant(value)?)),
        }
    }

    /// Create a named input variable.
    pub fn variable(&self, value: impl IntoPrimal, name: impl Into<String>) -> Result<Expr<'_>> {
        match self.mode.get() {
            Mode::Forward => {
                let expr = DualExpr::variable(value, name)?;
                self.count_forward();
                Ok(Expr::Forward(expr))
            }
            Mode::Reverse => Ok(Expr::Reverse(self.tape.variable(value, name)?)),
        }
    }

    fn count_forward(&self) {
        self.forward_created.set(self.forward_created.get() + 1);
    }

    /// Derivatives of `output` with respect to each of `variables`.
    ///
    /// Every variable must be a named input, else
    /// [`AdError::UnknownVariable`]. A variable `output` does not depend on
    /// gets a zero vector. In reverse mode the backward pass runs once for
    /// `output` and is cached.
    pub fn gradient(&self, output: &Expr<'_>, variables: &[&Expr<'_>]) -> Result<Vec<Vec<f64>>> {
        variables
            .iter()
            .map(|variable| {
                let name = variable.name().ok_or_else(|| AdError::UnknownVariable {
                    name: variable.label(),
                })?;
                let zeros = || vec![0.0; output.len()];
                match (output, variable) {
                    (Expr::Forward(out), Expr::Forward(_)) => Ok(out
                        .gradients()
                        .get(&name)
                        .cloned()
                        .unwrap_or_else(zeros)),
                    (Expr::Reverse(out), Expr::Reverse(var)) => {
                        if !std::ptr::eq(out.tape(), var.tape()) {
                            return Err(AdError::TapeMismatch);
                        }
                        Ok(out.backward().get(&name).cloned().unwrap_or_else(zeros))
                    }
                    (out, var) => Err(AdError::UnsupportedType {
                        op: "gradient",
                        expected: out.kind(),
                        found: var.kind(),
                    }),
                }
            })
            .collect()
    }

    /// Group scalars and single-element expressions into a vector function.
    ///
    /// The mode comes from the first expression among `items`, so
    /// expressions created before a [`set_mode`](Self::set_mode) still
    /// stack. Only an all-scalar list uses the current mode. Forward mode
    /// concatenates values and gradients; reverse mode keeps one root per
    /// function so each gets its own backward pass.
    pub fn stack<'t>(&'t self, items: &[Operand<'_, Expr<'t>>]) -> Result<StackedExpr<'t>> {
        let mode = items
            .iter()
            .find_map(|item| match item {
                Operand::Node(e) => Some(e.mode()),
                Operand::Scalar(_) => None,
            })
            .unwrap_or_else(|| self.mode.get());
        match mode {
            Mode::Forward => {
                let operands = items
                    .iter()
                    .map(|item| match item {
                        Operand::Scalar(c) => Ok(Operand::Scalar(*c)),
                        Operand::Node(Expr::Forward(e)) => Ok(Operand::Node(e)),
                        Operand::Node(other) => Err(mismatch("stack", mode, other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let stacked = DualExpr::stack(&operands)?;
                self.count_forward();
                Ok(StackedExpr::Forward(stacked))
            }
            Mode::Reverse => {
                let roots = items
                    .iter()
                    .map(|item| match item {
                        Operand::Scalar(c) => self.tape.constant(*c),
                        Operand::Node(Expr::Reverse(v)) => Ok(*v),
                        Operand::Node(other) => Err(mismatch("stack", mode, other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(StackedExpr::Reverse(self.tape.vec(&roots)?))
            }
        }
    }
}

impl Default for AdContext {
    fn default() -> Self {
        Self::new(AdConfig::default())
    }
}

impl fmt::Debug for AdContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdContext")
            .field("mode", &self.mode.get())
            .field("tape", &self.tape)
            .finish()
    }
}

fn mismatch(op: &'static str, mode: Mode, found: &Expr<'_>) -> AdError {
    AdError::UnsupportedType {
        op,
        expected: kind_of(mode),
        found: found.kind(),
    }
}

fn kind_of(mode: Mode) -> &'static str {
    match mode {
        Mode::Forward => "forward expression",
        Mode::Reverse => "reverse expression",
    }
}

/// An expression in either mode.
#[derive(Debug, Clone)]
pub enum Expr<'t> {
    Forward(DualExpr),
    Reverse(Var<'t>),
}

macro_rules! unary_ops {
    ($($(#[$attr:meta])* $name:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(&self) -> Self {
                match self {
                    Expr::Forward(e) => Expr::Forward(e.$name()),
                    Expr::Reverse(v) => Expr::Reverse(v.$name()),
                }
            }
        )*
    };
}

impl<'t> Expr<'t> {
    pub fn mode(&self) -> Mode {
        match self {
            Expr::Forward(_) => Mode::Forward,
            Expr::Reverse(_) => Mode::Reverse,
        }
    }

    fn kind(&self) -> &'static str {
        kind_of(self.mode())
    }

    // Identifier used in error messages for unnamed expressions.
    fn label(&self) -> String {
        match self {
            Expr::Forward(e) => e.id().to_string(),
            Expr::Reverse(v) => v.id().to_string(),
        }
    }

    pub fn value(&self) -> Vec<f64> {
        match self {
            Expr::Forward(e) => e.value().to_vec(),
            Expr::Reverse(v) => v.value(),
        }
    }

    pub fn value_at(&self, index: usize) -> Result<f64> {
        match self {
            Expr::Forward(e) => e.value_at(index),
            Expr::Reverse(v) => v.value_at(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Expr::Forward(e) => e.len(),
            Expr::Reverse(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Variable name, set only on declared variables.
    pub fn name(&self) -> Option<String> {
        match self {
            Expr::Forward(e) => e.name().map(str::to_string),
            Expr::Reverse(v) => v.name(),
        }
    }

    /// Derivative with respect to `name`; fails with
    /// [`AdError::UnknownVariable`] if the expression does not depend on it.
    pub fn grad(&self, name: &str) -> Result<Vec<f64>> {
        match self {
            Expr::Forward(e) => e.grad(name).map(<[f64]>::to_vec),
            Expr::Reverse(v) => v.grad(name),
        }
    }

    pub fn grad_at(&self, index: usize, name: &str) -> Result<f64> {
        match self {
            Expr::Forward(e) => e.grad_at(index, name),
            Expr::Reverse(v) => v.grad_at(index, name),
        }
    }

    fn binary<'a>(
        &self,
        op: &'static str,
        rhs: Operand<'a, Expr<'t>>,
        forward: impl FnOnce(&DualExpr, Operand<'a, DualExpr>) -> Result<DualExpr>,
        reverse: impl FnOnce(&Var<'t>, Operand<'a, Var<'t>>) -> Result<Var<'t>>,
    ) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        match (self, rhs) {
            (Expr::Forward(u), Operand::Scalar(c)) => {
                forward(u, Operand::Scalar(c)).map(Expr::Forward)
            }
            (Expr::Forward(u), Operand::Node(Expr::Forward(v))) => {
                forward(u, Operand::Node(v)).map(Expr::Forward)
            }
            (Expr::Reverse(u), Operand::Scalar(c)) => {
                reverse(u, Operand::Scalar(c)).map(Expr::Reverse)
            }
            (Expr::Reverse(u), Operand::Node(Expr::Reverse(v))) => {
                reverse(u, Operand::Node(v)).map(Expr::Reverse)
            }
            (lhs, Operand::Node(other)) => Err(mismatch(op, lhs.mode(), other)),
        }
    }

    /// `self + rhs`.
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("add", rhs.into(), |u, v| u.add(v), |u, v| u.add(v))
    }

    /// `self - rhs`.
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("sub", rhs.into(), |u, v| u.sub(v), |u, v| u.sub(v))
    }

    /// `self * rhs`.
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("mul", rhs.into(), |u, v| u.mul(v), |u, v| u.mul(v))
    }

    /// `self / rhs`; fails with [`AdError::DivisionByZero`] on a zero divisor.
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("div", rhs.into(), |u, v| u.div(v), |u, v| u.div(v))
    }

    /// `self ** rhs`.
    pub fn pow<'a>(&self, rhs: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("pow", rhs.into(), |u, v| u.pow(v), |u, v| u.pow(v))
    }

    /// `base ** self`.
    pub fn exp_base<'a>(&self, base: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("exp_base", base.into(), |u, v| u.exp_base(v), |u, v| u.exp_base(v))
    }

    /// Logarithm of `self` in `base`.
    pub fn log_base<'a>(&self, base: impl Into<Operand<'a, Expr<'t>>>) -> Result<Expr<'t>>
    where
        't: 'a,
    {
        self.binary("log_base", base.into(), |u, v| u.log_base(v), |u, v| u.log_base(v))
    }

    unary_ops! {
        neg;
        exp;
        sin;
        cos;
        tan;
        arctan;
        sinh;
        cosh;
        tanh;
        sigmoid;
        /// Natural logarithm.
        log;
        sqrt;
    }

    /// `c - self`.
    pub fn rsub(&self, c: f64) -> Expr<'t> {
        match self {
            Expr::Forward(e) => Expr::Forward(e.rsub(c)),
            Expr::Reverse(v) => Expr::Reverse(v.rsub(c)),
        }
    }

    /// `c / self`.
    pub fn rdiv(&self, c: f64) -> Result<Expr<'t>> {
        match self {
            Expr::Forward(e) => e.rdiv(c).map(Expr::Forward),
            Expr::Reverse(v) => v.rdiv(c).map(Expr::Reverse),
        }
    }

    pub fn arcsin(&self) -> Result<Expr<'t>> {
        match self {
            Expr::Forward(e) => e.arcsin().map(Expr::Forward),
            Expr::Reverse(v) => v.arcsin().map(Expr::Reverse),
        }
    }

    pub fn arccos(&self) -> Result<Expr<'t>> {
        match self {
            Expr::Forward(e) => e.arccos().map(Expr::Forward),
            Expr::Reverse(v) => v.arccos().map(Expr::Reverse),
        }
    }
}

impl fmt::Display for Expr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Forward(e) => write!(f, "forward({e})"),
            Expr::Reverse(v) => write!(f, "reverse({v})"),
        }
    }
}

impl From<DualExpr> for Expr<'_> {
    fn from(expr: DualExpr) -> Self {
        Expr::Forward(expr)
    }
}

impl<'t> From<Var<'t>> for Expr<'t> {
    fn from(var: Var<'t>) -> Self {
        Expr::Reverse(var)
    }
}

/// A vector-valued function built by [`AdContext::stack`].
#[derive(Debug, Clone)]
pub enum StackedExpr<'t> {
    Forward(DualExpr),
    Reverse(VarVector<'t>),
}

impl StackedExpr<'_> {
    pub fn value(&self) -> Vec<f64> {
        match self {
            StackedExpr::Forward(e) => e.value().to_vec(),
            StackedExpr::Reverse(v) => v.value(),
        }
    }

    pub fn value_at(&self, index: usize) -> Result<f64> {
        match self {
            StackedExpr::Forward(e) => e.value_at(index),
            StackedExpr::Reverse(v) => v.value_at(index),
        }
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        match self {
            StackedExpr::Forward(e) => e.len(),
            StackedExpr::Reverse(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derivative of every function with respect to `name`.
    pub fn grad(&self, name: &str) -> Result<Vec<f64>> {
        match self {
            StackedExpr::Forward(e) => e.grad(name).map(<[f64]>::to_vec),
            StackedExpr::Reverse(v) => v.grad(name),
        }
    }

    /// Derivative of function `index` with respect to `name`.
    pub fn grad_at(&self, index: usize, name: &str) -> Result<f64> {
        match self {
            StackedExpr::Forward(e) => e.grad_at(index, name),
            StackedExpr::Reverse(v) => v.grad_at(index, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn contexts() -> [AdContext; 2] {
        [
            AdContext::new(AdConfig::new(Mode::Forward)),
            AdContext::new(AdConfig::new(Mode::Reverse)),
        ]
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("forward".parse::<Mode>().unwrap(), Mode::Forward);
        assert_eq!("reverse".parse::<Mode>().unwrap(), Mode::Reverse);
        assert_eq!(
            "sideways".parse::<Mode>().unwrap_err(),
            AdError::UnknownMode("sideways".to_string())
        );
        assert!("Reverse".parse::<Mode>().is_err());
        assert!("FORWARD".parse::<Mode>().is_err());
        assert_eq!(Mode::Reverse.to_string(), "reverse");
        assert_eq!(AdConfig::default().mode, Mode::Forward);
    }

    #[test]
    fn test_expressions_follow_configured_mode() {
        for ctx in contexts() {
            let x = ctx.variable(1.0, "x").unwrap();
            let c = ctx.create_expression(2.0).unwrap();
            assert_eq!(x.mode(), ctx.mode());
            assert_eq!(c.mode(), ctx.mode());
            assert_eq!(c.name(), None);
        }
    }

    #[test]
    fn test_square_gradient() {
        for ctx in contexts() {
            let x = ctx.variable(2.0, "x").unwrap();
            let y = x.pow(2.0).unwrap();
            assert_eq!(y.value(), vec![4.0]);
            assert_eq!(ctx.gradient(&y, &[&x]).unwrap(), vec![vec![4.0]]);
        }
    }

    #[test]
    fn test_gradient_of_independent_variable_is_zero() {
        for ctx in contexts() {
            let x = ctx.variable(vec![1.0, 2.0], "x").unwrap();
            let y = ctx.variable(3.0, "y").unwrap();
            let f = x.sin();
            assert_eq!(ctx.gradient(&f, &[&y]).unwrap(), vec![vec![0.0, 0.0]]);
            assert!(matches!(f.grad("y"), Err(AdError::UnknownVariable { .. })));
        }
    }

    #[test]
    fn test_gradient_requires_named_variable() {
        for ctx in contexts() {
            let x = ctx.variable(2.0, "x").unwrap();
            let y = x.exp();
            assert!(matches!(
                ctx.gradient(&y, &[&y]),
                Err(AdError::UnknownVariable { .. })
            ));
        }
    }

    #[test]
    fn test_mixed_modes_rejected() {
        let ctx = AdContext::default();
        let x = ctx.variable(1.0, "x").unwrap();
        ctx.set_mode(Mode::Reverse);
        let y = ctx.variable(1.0, "y").unwrap();

        assert_eq!(
            x.add(&y).unwrap_err(),
            AdError::UnsupportedType {
                op: "add",
                expected: "forward expression",
                found: "reverse expression",
            }
        );
        assert!(matches!(
            ctx.gradient(&y, &[&x]),
            Err(AdError::UnsupportedType { op: "gradient", .. })
        ));
        // Scalars combine with either mode.
        assert_eq!(x.mul(3.0).unwrap().value(), vec![3.0]);
        assert_eq!(y.mul(3.0).unwrap().value(), vec![3.0]);
    }

    #[test]
    fn test_set_mode_keeps_existing_expressions() {
        let ctx = AdContext::new(AdConfig::new(Mode::Reverse));
        let x = ctx.variable(2.0, "x").unwrap();
        ctx.set_mode(Mode::Forward);
        assert_eq!(ctx.config(), AdConfig::new(Mode::Forward));

        let y = x.mul(&x).unwrap();
        assert_eq!(y.mode(), Mode::Reverse);
        assert_eq!(y.grad("x").unwrap(), vec![4.0]);
    }

    #[test]
    fn test_stack_after_set_mode() {
        let ctx = AdContext::new(AdConfig::new(Mode::Reverse));
        let x = ctx.variable(2.0, "x").unwrap();
        let y = ctx.variable(3.0, "y").unwrap();
        let xy = x.mul(&y).unwrap();
        let sum = x.add(&y).unwrap();
        ctx.set_mode(Mode::Forward);

        let f = ctx
            .stack(&[Operand::Scalar(1.0), Operand::Node(&xy), Operand::Node(&sum)])
            .unwrap();
        assert!(matches!(f, StackedExpr::Reverse(_)));
        assert_eq!(f.value(), vec![1.0, 6.0, 5.0]);
        assert_eq!(f.grad("x").unwrap(), vec![0.0, 3.0, 1.0]);

        // Scalars alone follow the current mode.
        let c = ctx.stack(&[Operand::Scalar(4.0)]).unwrap();
        assert!(matches!(c, StackedExpr::Forward(_)));
    }

    #[test]
    fn test_display_names_mode() {
        let [fwd, rev] = contexts();
        let x = fwd.variable(2.0, "x").unwrap();
        assert_eq!(x.to_string(), "forward(value [2.0], grad {x: [1.0]})");
        let y = rev.variable(2.0, "y").unwrap();
        assert_eq!(y.to_string(), "reverse(y = [2.0], 0 edges)");
    }

    #[test]
    fn test_all_operators_dispatch() {
        for ctx in contexts() {
            let x = ctx.variable(0.5, "x").unwrap();
            let b = ctx.variable(2.0, "b").unwrap();
            let results = [
                x.add(&b).unwrap(),
                x.sub(1.0).unwrap(),
                x.rsub(1.0),
                x.div(&b).unwrap(),
                x.rdiv(1.0).unwrap(),
                x.exp_base(&b).unwrap(),
                x.log_base(&b).unwrap(),
                x.neg(),
                x.tan(),
                x.arcsin().unwrap(),
                x.arccos().unwrap(),
                x.sigmoid(),
                x.sqrt(),
            ];
            for expr in &results {
                assert_eq!(expr.mode(), ctx.mode());
                assert!(expr.grad_at(0, "x").unwrap().is_finite());
            }
            assert_relative_eq!(results[4].value_at(0).unwrap(), 2.0);
            assert!(x.div(0.0).is_err());
        }
    }

    #[test]
    fn test_stack_in_both_modes() {
        for ctx in contexts() {
            let x = ctx.variable(2.0, "x").unwrap();
            let y = ctx.variable(3.0, "y").unwrap();
            let xy = x.mul(&y).unwrap();
            let sum = x.add(&y).unwrap();
            let f = ctx
                .stack(&[Operand::Node(&xy), Operand::Node(&sum), Operand::Scalar(7.0)])
                .unwrap();

            assert_eq!(f.len(), 3);
            assert_eq!(f.value(), vec![6.0, 5.0, 7.0]);
            assert_eq!(f.grad_at(0, "x").unwrap(), 3.0);
            assert_eq!(f.grad_at(1, "x").unwrap(), 1.0);
            assert_eq!(f.grad("y").unwrap(), vec![2.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn test_stack_rejects_mixed_modes() {
        let ctx = AdContext::default();
        let x = ctx.variable(1.0, "x").unwrap();
        ctx.set_mode(Mode::Reverse);
        let y = ctx.variable(1.0, "y").unwrap();
        assert_eq!(
            ctx.stack(&[Operand::Node(&x), Operand::Node(&y)]).unwrap_err(),
            AdError::UnsupportedType {
                op: "stack",
                expected: "forward expression",
                found: "reverse expression",
            }
        );
    }

    mod logging {
        use super::*;
        use log::{Level, LevelFilter, Log, Metadata, Record};
        use std::cell::RefCell;
        use std::sync::Once;

        thread_local! {
            static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct CaptureLogger;

        impl Log for CaptureLogger {
            fn enabled(&self, _: &Metadata<'_>) -> bool {
                true
            }

            fn log(&self, record: &Record<'_>) {
                RECORDS.with(|r| r.borrow_mut().push((record.level(), record.args().to_string())));
            }

            fn flush(&self) {}
        }

        static LOGGER: CaptureLogger = CaptureLogger;
        static INIT: Once = Once::new();

        // Records are kept per thread, so parallel tests do not see each other.
        fn capture(f: impl FnOnce()) -> Vec<(Level, String)> {
            INIT.call_once(|| {
                if log::set_logger(&LOGGER).is_ok() {
                    log::set_max_level(LevelFilter::Trace);
                }
            });
            RECORDS.with(|r| r.borrow_mut().clear());
            f();
            RECORDS.with(|r| r.take())
        }

        fn warnings(records: &[(Level, String)]) -> Vec<&str> {
            records
                .iter()
                .filter(|(level, _)| *level == Level::Warn)
                .map(|(_, msg)| msg.as_str())
                .collect()
        }

        #[test]
        fn test_set_mode_warns_with_created_expressions() {
            for (from, to) in [(Mode::Forward, Mode::Reverse), (Mode::Reverse, Mode::Forward)] {
                let ctx = AdContext::new(AdConfig::new(from));
                let records = capture(|| {
                    let _x = ctx.variable(1.0, "x").unwrap();
                    ctx.set_mode(to);
                });
                let warned = warnings(&records);
                assert_eq!(warned.len(), 1);
                assert!(warned[0].contains(&format!("from {from} to {to}")));
                assert!(warned[0].contains(&format!("with 1 {from} expressions created")));
            }
        }

        #[test]
        fn test_set_mode_is_silent_without_expressions() {
            let ctx = AdContext::default();
            let records = capture(|| {
                ctx.set_mode(Mode::Reverse);
                ctx.set_mode(Mode::Forward);
            });
            assert!(warnings(&records).is_empty());

            let _x = ctx.variable(1.0, "x").unwrap();
            let records = capture(|| ctx.set_mode(Mode::Forward));
            assert!(warnings(&records).is_empty());
        }
    }
}
