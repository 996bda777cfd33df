//! Tape arena for reverse-mode automatic differentiation.

use super::var::Var;
use crate::error::{AdError, Result};
use crate::primal::{IntoPrimal, Primal};
use smallvec::SmallVec;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::rc::Rc;

/// Index of a node in its [`Tape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Create a NodeId for testing purposes.
    #[cfg(test)]
    pub(crate) fn new_for_test(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Local partial derivative stored on an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Weight {
    /// The same derivative for every element.
    Uniform(f64),
    /// One derivative per element.
    Elementwise(Vec<f64>),
}

impl Weight {
    /// Compute an elementwise weight from the operand's values.
    pub fn map(values: &[f64], f: impl Fn(f64) -> f64) -> Self {
        Weight::Elementwise(values.iter().map(|&u| f(u)).collect())
    }

    /// Compute an elementwise weight from two equally long value vectors.
    pub fn zip(u: &[f64], v: &[f64], f: impl Fn(f64, f64) -> f64) -> Self {
        Weight::Elementwise(u.iter().zip(v).map(|(&u, &v)| f(u, v)).collect())
    }

    /// Weight applied to element `index`.
    pub fn at(&self, index: usize) -> f64 {
        match self {
            Weight::Uniform(w) => *w,
            Weight::Elementwise(w) => w[index],
        }
    }
}

/// A recorded `(child, local derivative)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    child: NodeId,
    weight: Weight,
}

impl Edge {
    /// Create an edge to an already-recorded node.
    pub fn new(child: NodeId, weight: Weight) -> Self {
        Self { child, weight }
    }

    /// Get the child node.
    pub fn child(&self) -> NodeId {
        self.child
    }

    /// Get the local derivative.
    pub fn weight(&self) -> &Weight {
        &self.weight
    }
}

/// Gradients of one root, keyed by leaf variable name.
pub type Jacobian = HashMap<String, Vec<f64>>;

/// Per-node cache of the backward pass result.
#[derive(Debug, Clone, Default)]
pub enum JacobianState {
    /// No backward pass has been run from this node.
    #[default]
    Uncomputed,
    /// Result of the first backward pass from this node.
    Computed(Rc<Jacobian>),
}

/// A node in the tape.
#[derive(Debug)]
pub struct TapeNode {
    primal: Primal,
    /// Set only on declared variables.
    name: Option<String>,
    /// Operators record at most two operands.
    edges: SmallVec<[Edge; 2]>,
    accumulator: Vec<f64>,
    jacobian: JacobianState,
}

impl TapeNode {
    fn new(primal: Primal, name: Option<String>, edges: SmallVec<[Edge; 2]>) -> Self {
        let accumulator = vec![0.0; primal.len()];
        Self {
            primal,
            name,
            edges,
            accumulator,
            jacobian: JacobianState::Uncomputed,
        }
    }

    /// Get the value container.
    pub fn primal(&self) -> &Primal {
        &self.primal
    }

    /// Get the variable name, if declared as a variable.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the outgoing edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Check if this node has no outgoing edges.
    pub fn is_leaf(&self) -> bool {
        self.edges.is_empty()
    }

    /// Get the sensitivity accumulated by the latest backward pass.
    pub fn accumulator(&self) -> &[f64] {
        &self.accumulator
    }

    pub(crate) fn accumulator_mut(&mut self) -> &mut [f64] {
        &mut self.accumulator
    }

    /// Get the cached backward result.
    pub fn jacobian(&self) -> &JacobianState {
        &self.jacobian
    }

    pub(crate) fn set_jacobian(&mut self, jacobian: Rc<Jacobian>) {
        self.jacobian = JacobianState::Computed(jacobian);
    }
}

/// Arena that owns every reverse-mode node.
///
/// Nodes are appended in construction order and never removed, so edges can
/// only point to nodes that already exist: the recorded graph is acyclic.
/// Handles ([`Var`]) borrow the tape and cannot outlive it.
///
/// The tape uses `RefCell` and is therefore not `Sync`; a backward pass
/// mutates node accumulators.
///
/// # Example
///
/// ```
/// use adtape::Tape;
///
/// let tape = Tape::new();
/// let x = tape.variable(2.0, "x").unwrap();
/// let y = tape.variable(1.0, "y").unwrap();
/// let z = x.add(&y).unwrap();
///
/// assert_eq!(z.value(), vec![3.0]);
/// assert_eq!(z.grad("x").unwrap(), vec![1.0]);
/// assert_eq!(z.grad("y").unwrap(), vec![1.0]);
/// ```
pub struct Tape {
    nodes: RefCell<Vec<TapeNode>>,
    backward_passes: Cell<usize>,
}

impl Tape {
    /// Create a new empty tape.
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            backward_passes: Cell::new(0),
        }
    }

    /// Record a named leaf variable.
    pub fn variable(&self, value: impl IntoPrimal, name: impl Into<String>) -> Result<Var<'_>> {
        let id = self.push(value.into_primal()?, Some(name.into()), SmallVec::new());
        Ok(Var::new(self, id))
    }

    /// Record an unnamed leaf. Constants never appear in a jacobian.
    pub fn constant(&self, value: impl IntoPrimal) -> Result<Var<'_>> {
        let id = self.push(value.into_primal()?, None, SmallVec::new());
        Ok(Var::new(self, id))
    }

    /// Record a node with explicit edges.
    ///
    /// Every child must already be on this tape and have the same length as
    /// `value`; elementwise weights must match that length too.
    pub fn node(
        &self,
        value: impl IntoPrimal,
        name: Option<&str>,
        edges: Vec<Edge>,
    ) -> Result<Var<'_>> {
        let primal = value.into_primal()?;
        {
            let nodes = self.nodes.borrow();
            for edge in &edges {
                let child = nodes
                    .get(edge.child.index())
                    .ok_or(AdError::IndexOutOfBounds {
                        index: edge.child.index(),
                        len: nodes.len(),
                    })?;
                primal.check_len(child.primal.len())?;
                if let Weight::Elementwise(w) = &edge.weight {
                    primal.check_len(w.len())?;
                }
            }
        }
        let id = self.push(primal, name.map(str::to_string), edges.into_iter().collect());
        Ok(Var::new(self, id))
    }

    pub(crate) fn push(
        &self,
        primal: Primal,
        name: Option<String>,
        edges: SmallVec<[Edge; 2]>,
    ) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());
        nodes.push(TapeNode::new(primal, name, edges));
        id
    }

    /// Get a handle to an existing node.
    pub fn var(&self, id: NodeId) -> Result<Var<'_>> {
        let len = self.len();
        if id.index() >= len {
            return Err(AdError::IndexOutOfBounds {
                index: id.index(),
                len,
            });
        }
        Ok(Var::new(self, id))
    }

    /// Borrow all nodes.
    pub fn nodes(&self) -> Ref<'_, [TapeNode]> {
        Ref::map(self.nodes.borrow(), Vec::as_slice)
    }

    pub(crate) fn nodes_mut(&self) -> RefMut<'_, [TapeNode]> {
        RefMut::map(self.nodes.borrow_mut(), Vec::as_mut_slice)
    }

    /// Borrow one node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this tape.
    pub fn node_ref(&self, id: NodeId) -> Ref<'_, TapeNode> {
        Ref::map(self.nodes.borrow(), |nodes| &nodes[id.index()])
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Check if no node has been recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Number of backward passes actually executed (cache hits excluded).
    pub fn backward_passes(&self) -> usize {
        self.backward_passes.get()
    }

    pub(crate) fn count_backward_pass(&self) {
        self.backward_passes.set(self.backward_passes.get() + 1);
    }
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Tape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("num_nodes", &self.len())
            .field("backward_passes", &self.backward_passes.get())
            .finish()
    }
}
