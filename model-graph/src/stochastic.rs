//! Stochastic operators and the driver-facing evaluation surface.
//!
//! A stochastic node keeps two mutually consistent representations of its
//! value: the constrained one in the distribution's natural support, and an
//! unconstrained one for gradient-based samplers. Which side is current is
//! tracked by an explicit [`SyncState`]; [`synchronize`] is total — on
//! success the node is always left in sync, whichever side was stale.

use rand::Rng;

use crate::common::{debug, Mat, Result};
use crate::errors::GraphError;
use crate::node::{parent0, NodeArena, NodeId, NodeKind};
use crate::operator::{self, Operator};
use crate::transform::Transform;
use crate::value::{NodeValue, ValueType};

/// Which of the two value representations is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    InSync,
    /// The unconstrained side was written; the constrained value is stale.
    StaleConstrained,
    /// The constrained side was written; the unconstrained value is stale.
    StaleUnconstrained,
}

/// Per-node state of a stochastic operator.
#[derive(Debug, Clone)]
pub struct StochasticState {
    /// The value expressed in unconstrained space; equal to the constrained
    /// value verbatim when no transform is installed.
    pub unconstrained_value: NodeValue,
    pub transform: Option<Transform>,
    pub sync: SyncState,
}

impl StochasticState {
    pub fn new(value: NodeValue) -> Self {
        Self {
            unconstrained_value: value,
            transform: None,
            sync: SyncState::InSync,
        }
    }
}

/// Bring both representations up to date. Total: on success the state is
/// InSync regardless of which side was stale.
pub(crate) fn synchronize(
    value: &mut NodeValue,
    state: &mut StochasticState,
    node: usize,
) -> Result<()> {
    match state.sync {
        SyncState::InSync => {}
        SyncState::StaleConstrained => {
            debug!("node {}: refreshing constrained value from unconstrained", node);
            *value = match &state.transform {
                Some(t) => t.to_constrained(&state.unconstrained_value, node)?,
                None => state.unconstrained_value.clone(),
            };
        }
        SyncState::StaleUnconstrained => {
            debug!("node {}: refreshing unconstrained value from constrained", node);
            state.unconstrained_value = match &state.transform {
                Some(t) => t.to_unconstrained(value, node)?,
                None => value.clone(),
            };
        }
    }
    state.sync = SyncState::InSync;
    Ok(())
}

fn not_stochastic(node: usize, what: &str) -> GraphError {
    GraphError::InvalidArgument(format!(
        "node {}: {} is only defined for stochastic operators",
        node, what
    ))
}

/// Rebuild an elementary sample value from one matrix entry of an iid node.
fn elementary_value(ty: ValueType, entry: f64) -> NodeValue {
    match ty {
        ValueType::Boolean => NodeValue::Boolean(entry != 0.0),
        ValueType::Probability => NodeValue::Probability(entry),
        _ => NodeValue::Real(entry),
    }
}

fn draw_to_scalar(draw: &NodeValue, node: usize) -> Result<f64> {
    match draw {
        NodeValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        NodeValue::Real(x) | NodeValue::Probability(x) => Ok(*x),
        other => Err(GraphError::InvalidArgument(format!(
            "node {}: iid draws must be scalar-valued, got {}",
            node,
            other.value_type()
        ))),
    }
}

impl NodeArena {
    /// Forward evaluation of one node: deterministic operators recompute
    /// from parents, stochastic operators draw from their distribution
    /// parent. Constants and distribution nodes are left untouched.
    ///
    /// A fresh draw lands on the constrained side only; the unconstrained
    /// representation is refreshed on the next synchronized read.
    pub fn eval<R: Rng + ?Sized>(&mut self, id: NodeId, rng: &mut R) -> Result<()> {
        let new_value = {
            let node = self.get(id)?;
            match &node.kind {
                NodeKind::Constant | NodeKind::Distribution(_) => None,
                NodeKind::Operator(Operator::Multiply) => Some(operator::multiply(self, node)?),
                NodeKind::Operator(Operator::Add) => Some(operator::add(self, node)?),
                NodeKind::Operator(Operator::Sample(_)) => {
                    let (dist, dist_node) = self.distribution(parent0(node)?)?;
                    Some(dist.sample(self, dist_node, rng)?)
                }
                NodeKind::Operator(Operator::IidSample(_)) => {
                    let n = node.value.as_matrix().map(|m| m.nrows()).unwrap_or(1);
                    let (dist, dist_node) = self.distribution(parent0(node)?)?;
                    let mut draws = Mat::zeros(n, 1);
                    for i in 0..n {
                        let draw = dist.sample(self, dist_node, rng)?;
                        draws[(i, 0)] = draw_to_scalar(&draw, id.0)?;
                    }
                    Some(NodeValue::Matrix(draws))
                }
            }
        };
        if let Some(value) = new_value {
            let node = self.get_mut(id)?;
            node.value = value;
            if let Some(state) = node.stochastic_state_mut() {
                state.sync = SyncState::StaleUnconstrained;
            }
        }
        Ok(())
    }

    /// Log-density of a stochastic node's current value under its
    /// distribution parent; iid nodes sum over their draws.
    pub fn log_prob(&self, id: NodeId) -> Result<f64> {
        let node = self.get(id)?;
        match &node.kind {
            NodeKind::Operator(Operator::Sample(_)) => {
                let (dist, dist_node) = self.distribution(parent0(node)?)?;
                dist.log_prob(self, dist_node, &node.value)
            }
            NodeKind::Operator(Operator::IidSample(_)) => {
                let (dist, dist_node) = self.distribution(parent0(node)?)?;
                let m = node.value.as_matrix().ok_or_else(|| GraphError::TypeMismatch {
                    node: id.0,
                    expected: ValueType::Matrix,
                    found: node.value.value_type(),
                })?;
                let mut total = 0.0;
                for &entry in m.iter() {
                    let v = elementary_value(dist.sample_type(), entry);
                    total += dist.log_prob(self, dist_node, &v)?;
                }
                Ok(total)
            }
            _ => Err(not_stochastic(id.0, "log_prob")),
        }
    }

    /// First/second derivative of this node's log-density contribution with
    /// respect to `target`'s value.
    ///
    /// `target == id`: the distribution's value-gradient, pushed through the
    /// installed transform's derivative terms (chain rule plus d log|J|).
    /// `target` an ancestor: the distribution's parameter-gradient, which
    /// chain-rules with the parameter parent's `grad1`/`grad2` factors as
    /// populated by the driver's dependency-chain walk.
    pub fn gradient_log_prob(
        &self,
        id: NodeId,
        target: NodeId,
        first_grad: &mut f64,
        second_grad: &mut f64,
    ) -> Result<()> {
        let node = self.get(id)?;
        let state = node
            .stochastic_state()
            .ok_or_else(|| not_stochastic(id.0, "gradient_log_prob"))?;
        let (dist, dist_node) = self.distribution(parent0(node)?)?;
        if target == id {
            let mut g1 = 0.0;
            let mut g2 = 0.0;
            dist.gradient_log_prob_value(self, dist_node, &node.value, &mut g1, &mut g2)?;
            if let Some(t) = state.transform {
                let x = match &node.value {
                    NodeValue::Real(x) | NodeValue::Probability(x) => *x,
                    other => {
                        return Err(GraphError::TypeMismatch {
                            node: id.0,
                            expected: ValueType::Real,
                            found: other.value_type(),
                        })
                    }
                };
                let (a1, a2) = t.value_gradients(g1, g2, x);
                g1 = a1;
                g2 = a2;
            }
            *first_grad += g1;
            *second_grad += g2;
            Ok(())
        } else {
            dist.gradient_log_prob_param(self, dist_node, &node.value, first_grad, second_grad)
        }
    }

    /// Propagate chain factors through a deterministic operator; a no-op for
    /// every other node kind (stochastic accumulation goes through
    /// `gradient_log_prob` and `backward` instead).
    pub fn compute_gradients(&mut self, id: NodeId) -> Result<()> {
        let grads = {
            let node = self.get(id)?;
            match &node.kind {
                NodeKind::Operator(Operator::Multiply) | NodeKind::Operator(Operator::Add) => {
                    Some(operator::compute_gradients(self, node)?)
                }
                _ => None,
            }
        };
        if let Some((g1, g2)) = grads {
            let node = self.get_mut(id)?;
            node.grad1 = g1;
            node.grad2 = g2;
        }
        Ok(())
    }

    /// `backward` with observed values held fixed: an observation
    /// contributes as conditioning upstream but receives no gradient of its
    /// own.
    pub fn backward(&mut self, id: NodeId) -> Result<()> {
        self.backward_impl(id, true)
    }

    pub(crate) fn backward_impl(&mut self, id: NodeId, skip_observed: bool) -> Result<()> {
        enum Arity {
            Single,
            Iid,
        }
        let (arity, observed, value, dist_id) = {
            let node = self.get(id)?;
            let arity = match &node.kind {
                NodeKind::Operator(Operator::Sample(_)) => Arity::Single,
                NodeKind::Operator(Operator::IidSample(_)) => Arity::Iid,
                _ => return Err(not_stochastic(id.0, "backward")),
            };
            (arity, node.observed, node.value.clone(), parent0(node)?)
        };
        let (own_grads, param_adjoint, theta_id) = {
            let (dist, dist_node) = self.distribution(dist_id)?;
            let theta_id = parent0(dist_node)?;
            match arity {
                Arity::Single => {
                    let mut g1 = 0.0;
                    let mut g2 = 0.0;
                    dist.gradient_log_prob_value(self, dist_node, &value, &mut g1, &mut g2)?;
                    let mut adjoint = 0.0;
                    dist.backward_param(self, dist_node, &value, &mut adjoint)?;
                    (vec![g1], adjoint, theta_id)
                }
                Arity::Iid => {
                    let m = value.as_matrix().ok_or_else(|| GraphError::TypeMismatch {
                        node: id.0,
                        expected: ValueType::Matrix,
                        found: value.value_type(),
                    })?;
                    let mut per_draw = Vec::with_capacity(m.nrows());
                    let mut adjoint = 0.0;
                    for &entry in m.iter() {
                        let v = elementary_value(dist.sample_type(), entry);
                        let mut g1 = 0.0;
                        let mut g2 = 0.0;
                        dist.gradient_log_prob_value(self, dist_node, &v, &mut g1, &mut g2)?;
                        dist.backward_param(self, dist_node, &v, &mut adjoint)?;
                        per_draw.push(g1);
                    }
                    (per_draw, adjoint, theta_id)
                }
            }
        };
        if !(observed && skip_observed) {
            let node = self.get_mut(id)?;
            for (i, g) in own_grads.iter().enumerate() {
                node.back_grad1[(i, 0)] += g;
            }
        }
        self.get_mut(theta_id)?.back_grad1[(0, 0)] += param_adjoint;
        Ok(())
    }

    /// The constrained value, synchronized first if the unconstrained side
    /// was written more recently.
    pub fn get_original_value(&mut self, id: NodeId) -> Result<&NodeValue> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let (value, _, state) = node
            .stochastic_parts_mut()
            .ok_or_else(|| not_stochastic(idx, "get_original_value"))?;
        synchronize(value, state, idx)?;
        Ok(&*value)
    }

    /// The unconstrained value, synchronized first if the constrained side
    /// was written more recently.
    pub fn get_unconstrained_value(&mut self, id: NodeId) -> Result<&NodeValue> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let (value, _, state) = node
            .stochastic_parts_mut()
            .ok_or_else(|| not_stochastic(idx, "get_unconstrained_value"))?;
        synchronize(value, state, idx)?;
        Ok(&state.unconstrained_value)
    }

    /// Overwrite the constrained value (tag-checked against the node's
    /// declared type); stochastic nodes are marked stale on the
    /// unconstrained side.
    pub fn set_value(&mut self, id: NodeId, value: NodeValue) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.value.value_type() != value.value_type() {
            return Err(GraphError::TypeMismatch {
                node: id.0,
                expected: node.value.value_type(),
                found: value.value_type(),
            });
        }
        node.value = value;
        if let Some(state) = node.stochastic_state_mut() {
            state.sync = SyncState::StaleUnconstrained;
        }
        Ok(())
    }

    /// Fix a node's value as an external observation.
    pub fn observe(&mut self, id: NodeId, value: NodeValue) -> Result<()> {
        self.set_value(id, value)?;
        self.get_mut(id)?.observed = true;
        Ok(())
    }

    /// Overwrite the unconstrained value (a sampler's move in unconstrained
    /// space); the constrained side becomes stale.
    pub fn set_unconstrained_value(&mut self, id: NodeId, value: NodeValue) -> Result<()> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let (current, _, state) = node
            .stochastic_parts_mut()
            .ok_or_else(|| not_stochastic(idx, "set_unconstrained_value"))?;
        synchronize(current, state, idx)?;
        if state.unconstrained_value.value_type() != value.value_type() {
            return Err(GraphError::TypeMismatch {
                node: idx,
                expected: state.unconstrained_value.value_type(),
                found: value.value_type(),
            });
        }
        state.unconstrained_value = value;
        state.sync = SyncState::StaleConstrained;
        Ok(())
    }

    /// Install a change-of-variables transform on a stochastic node. The
    /// unconstrained side is recomputed lazily on the next read.
    pub fn install_transform(&mut self, id: NodeId, transform: Transform) -> Result<()> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let value_type = node.value.value_type();
        let state = node
            .stochastic_state_mut()
            .ok_or_else(|| not_stochastic(idx, "install_transform"))?;
        let compatible = match transform {
            Transform::Log => matches!(value_type, ValueType::Real | ValueType::Matrix),
            Transform::Logit => {
                matches!(value_type, ValueType::Probability | ValueType::Matrix)
            }
        };
        if !compatible {
            return Err(GraphError::InvalidArgument(format!(
                "node {}: {:?} transform does not apply to {} values",
                idx, transform, value_type
            )));
        }
        state.transform = Some(transform);
        state.sync = SyncState::StaleUnconstrained;
        Ok(())
    }

    /// log|det(Jacobian)| of the installed transform at the current value
    /// pair; 0 when no transform is installed.
    pub fn log_abs_jacobian_determinant(&mut self, id: NodeId) -> Result<f64> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let (value, _, state) = node
            .stochastic_parts_mut()
            .ok_or_else(|| not_stochastic(idx, "log_abs_jacobian_determinant"))?;
        synchronize(value, state, idx)?;
        match &state.transform {
            None => Ok(0.0),
            Some(t) => t.log_abs_jacobian_determinant(value, idx),
        }
    }

    /// The log-density gradient with respect to the unconstrained
    /// representation, including the Jacobian correction — the quantity
    /// gradient-based samplers step along. Non-destructive: `back_grad1`
    /// itself is left untouched.
    pub fn get_unconstrained_gradient(&mut self, id: NodeId) -> Result<Mat> {
        let node = self.get_mut(id)?;
        let idx = node.id.0;
        let (value, back_grad1, state) = node
            .stochastic_parts_mut()
            .ok_or_else(|| not_stochastic(idx, "get_unconstrained_gradient"))?;
        synchronize(value, state, idx)?;
        match &state.transform {
            None => Ok(back_grad1.clone()),
            Some(t) => t.unconstrained_gradient(back_grad1, value, idx),
        }
    }
}
