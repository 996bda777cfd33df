//! Backward pass execution for reverse-mode automatic differentiation.

use super::tape::{Jacobian, JacobianState, NodeId, Tape};
use super::traversal::{reset_accumulators, topological_order};
use log::debug;
use smallvec::SmallVec;
use std::rc::Rc;

impl Tape {
    /// Gradients of `root` with respect to every named leaf it reaches.
    ///
    /// The first call runs the pass and caches the result on the root node;
    /// later calls return the cached jacobian without touching the tape.
    ///
    /// # Panics
    ///
    /// Panics if `root` was not issued by this tape.
    ///
    /// # Example
    ///
    /// ```
    /// use adtape::Tape;
    ///
    /// let tape = Tape::new();
    /// let x = tape.variable(3.0, "x").unwrap();
    /// let y = x.mul(&x).unwrap();
    ///
    /// let jacobian = tape.backward(y.id());
    /// assert_eq!(jacobian["x"], vec![6.0]);
    ///
    /// tape.backward(y.id());
    /// assert_eq!(tape.backward_passes(), 1);
    /// ```
    pub fn backward(&self, root: NodeId) -> Rc<Jacobian> {
        if let JacobianState::Computed(jacobian) = self.node_ref(root).jacobian() {
            debug!("jacobian cache hit for node {root}");
            return Rc::clone(jacobian);
        }

        let jacobian = Rc::new(self.run_backward(root));
        self.nodes_mut()[root.index()].set_jacobian(Rc::clone(&jacobian));
        jacobian
    }

    // Zero the reachable accumulators, seed the root with ones, then walk
    // the topological order pushing `weight * upstream` into each child.
    // A node is only read after every parent has written to it.
    fn run_backward(&self, root: NodeId) -> Jacobian {
        let mut nodes = self.nodes_mut();
        reset_accumulators(&mut nodes, root);
        nodes[root.index()].accumulator_mut().fill(1.0);

        let order = topological_order(&nodes, root);
        debug!(
            "backward pass from node {root}: {} reachable nodes",
            order.len()
        );

        let mut jacobian = Jacobian::new();
        for id in order {
            let node = &nodes[id.index()];
            let upstream = node.accumulator();

            if node.is_leaf() {
                if let Some(name) = node.name() {
                    match jacobian.get_mut(name) {
                        // Two leaves declared under one name act as one variable.
                        Some(total) => {
                            for (t, g) in total.iter_mut().zip(upstream) {
                                *t += g;
                            }
                        }
                        None => {
                            jacobian.insert(name.to_string(), upstream.to_vec());
                        }
                    }
                }
            }

            let contributions: SmallVec<[(NodeId, Vec<f64>); 2]> = node
                .edges()
                .iter()
                .map(|edge| {
                    let delta = upstream
                        .iter()
                        .enumerate()
                        .map(|(i, &g)| edge.weight().at(i) * g)
                        .collect();
                    (edge.child(), delta)
                })
                .collect();

            for (child, delta) in contributions {
                for (acc, d) in nodes[child.index()].accumulator_mut().iter_mut().zip(delta) {
                    *acc += d;
                }
            }
        }

        self.count_backward_pass();
        jacobian
    }
}
