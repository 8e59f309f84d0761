//! Bernoulli distribution over a single boolean.
//!
//! One parent, real- or probability-valued, giving P(true). A constant
//! parent is range-checked once at construction; a derived parent is checked
//! lazily at every sample or score request.

use rand::Rng;
use rand_distr::Distribution as _;

use crate::common::Result;
use crate::errors::GraphError;
use crate::node::{Node, NodeArena, NodeId};
use crate::value::{NodeValue, ValueType};

#[derive(Debug, Clone)]
pub struct Bernoulli {
    pub(crate) sample_type: ValueType,
}

/// Read the probability parameter off a parent node. The parameter slot
/// accepts either tag, so both are matched explicitly rather than widened.
pub(crate) fn param_value(parent: &Node) -> Result<f64> {
    match &parent.value {
        NodeValue::Real(x) => Ok(*x),
        NodeValue::Probability(p) => Ok(*p),
        other => Err(GraphError::TypeMismatch {
            node: parent.id.0,
            expected: ValueType::Probability,
            found: other.value_type(),
        }),
    }
}

/// Raw first/second derivatives of ln P(v | p) with respect to p.
pub(crate) fn param_gradients(p: f64, v: bool) -> (f64, f64) {
    if v {
        (1.0 / p, -1.0 / (p * p))
    } else {
        let q = 1.0 - p;
        (-1.0 / q, -1.0 / (q * q))
    }
}

pub(crate) fn validate(
    arena: &NodeArena,
    sample_type: ValueType,
    parents: &[NodeId],
) -> Result<()> {
    if sample_type != ValueType::Boolean {
        return Err(GraphError::InvalidArgument(
            "Bernoulli produces boolean valued samples".into(),
        ));
    }
    if parents.len() != 1 {
        return Err(GraphError::InvalidArgument(
            "Bernoulli distribution must have exactly one parent".into(),
        ));
    }
    let parent = arena.get(parents[0])?;
    let ty = parent.value.value_type();
    if ty != ValueType::Real && ty != ValueType::Probability {
        return Err(GraphError::InvalidArgument(
            "Bernoulli parent must be probability- or real-valued".into(),
        ));
    }
    // a constant parent can be checked right here; derived parents are
    // checked lazily at the point of use
    if parent.is_constant() {
        let p = param_value(parent)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(GraphError::InvalidArgument(
                "Bernoulli probability must be between 0 and 1".into(),
            ));
        }
    }
    Ok(())
}

impl Bernoulli {
    /// Current parameter value, with the lazy range check.
    fn probability(&self, arena: &NodeArena, node: &Node) -> Result<f64> {
        let parent = arena.get(node.parents[0])?;
        let p = param_value(parent)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(GraphError::OutOfRange {
                node: node.id.0,
                value: p,
            });
        }
        Ok(p)
    }

    fn boolean_value(&self, node: &Node, value: &NodeValue) -> Result<bool> {
        value.as_bool().ok_or_else(|| GraphError::TypeMismatch {
            node: node.id.0,
            expected: ValueType::Boolean,
            found: value.value_type(),
        })
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        arena: &NodeArena,
        node: &Node,
        rng: &mut R,
    ) -> Result<NodeValue> {
        let p = self.probability(arena, node)?;
        let draw = rand_distr::Bernoulli::new(p).map_err(|_| GraphError::OutOfRange {
            node: node.id.0,
            value: p,
        })?;
        Ok(NodeValue::Boolean(draw.sample(rng)))
    }

    pub fn log_prob(&self, arena: &NodeArena, node: &Node, value: &NodeValue) -> Result<f64> {
        let p = self.probability(arena, node)?;
        let v = self.boolean_value(node, value)?;
        Ok(if v { p.ln() } else { (1.0 - p).ln() })
    }

    /// d ln P / d value over the 0/1 relaxation of the boolean:
    /// ln P = v ln p + (1 - v) ln(1 - p), so the first derivative is
    /// logit(p) and the second is zero.
    pub fn gradient_log_prob_value(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        grad1: &mut f64,
        _grad2: &mut f64,
    ) -> Result<()> {
        let p = self.probability(arena, node)?;
        self.boolean_value(node, value)?;
        *grad1 += p.ln() - (1.0 - p).ln();
        Ok(())
    }

    /// d ln P / d parameter, chained with the parameter parent's
    /// `grad1`/`grad2` factors.
    pub fn gradient_log_prob_param(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        grad1: &mut f64,
        grad2: &mut f64,
    ) -> Result<()> {
        let p = self.probability(arena, node)?;
        let v = self.boolean_value(node, value)?;
        let (d1, d2) = param_gradients(p, v);
        let parent = arena.get(node.parents[0])?;
        *grad1 += d1 * parent.grad1;
        *grad2 += d2 * parent.grad1 * parent.grad1 + d1 * parent.grad2;
        Ok(())
    }

    pub(crate) fn backward_param(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        adjoint: &mut f64,
    ) -> Result<()> {
        let p = self.probability(arena, node)?;
        let v = self.boolean_value(node, value)?;
        let (d1, _) = param_gradients(p, v);
        *adjoint += d1;
        Ok(())
    }
}
