//! The distribution capability set.
//!
//! A distribution node never holds a sampled value of its own; it exposes
//! sampling and scoring given its parameter parents. The set of families is
//! closed: adding one means adding a variant here and its module next to
//! [`bernoulli`](crate::bernoulli) and [`tabular`](crate::tabular).

use rand::Rng;

use crate::bernoulli::Bernoulli;
use crate::common::Result;
use crate::node::{Node, NodeArena};
use crate::tabular::Tabular;
use crate::value::{NodeValue, ValueType};

/// A parameterized family supporting sampling and log-density scoring.
#[derive(Debug, Clone)]
pub enum Distribution {
    Bernoulli(Bernoulli),
    Tabular(Tabular),
}

impl Distribution {
    /// The type tag `sample` and `log_prob` operate on.
    pub fn sample_type(&self) -> ValueType {
        match self {
            Distribution::Bernoulli(d) => d.sample_type,
            Distribution::Tabular(d) => d.sample_type,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Bernoulli(_) => "Bernoulli",
            Distribution::Tabular(_) => "Tabular",
        }
    }

    /// Draw a value of the declared sample type from current parent values.
    /// Parents are not mutated; `rng` is the caller-owned source, so a fixed
    /// seed and a fixed evaluation order reproduce the same draws.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        arena: &NodeArena,
        node: &Node,
        rng: &mut R,
    ) -> Result<NodeValue> {
        match self {
            Distribution::Bernoulli(d) => d.sample(arena, node, rng),
            Distribution::Tabular(d) => d.sample(arena, node, rng),
        }
    }

    /// Exact log-density / log-mass at `value`.
    pub fn log_prob(&self, arena: &NodeArena, node: &Node, value: &NodeValue) -> Result<f64> {
        match self {
            Distribution::Bernoulli(d) => d.log_prob(arena, node, value),
            Distribution::Tabular(d) => d.log_prob(arena, node, value),
        }
    }

    /// First and second derivative of `log_prob` with respect to `value`,
    /// accumulated into the output references.
    pub fn gradient_log_prob_value(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        grad1: &mut f64,
        grad2: &mut f64,
    ) -> Result<()> {
        match self {
            Distribution::Bernoulli(d) => d.gradient_log_prob_value(arena, node, value, grad1, grad2),
            Distribution::Tabular(d) => d.gradient_log_prob_value(),
        }
    }

    /// First and second derivative of `log_prob` with respect to one
    /// parameter parent, chain-ruled with that parent's `grad1`/`grad2`
    /// factors. The caller iterates parents and combines.
    pub fn gradient_log_prob_param(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        grad1: &mut f64,
        grad2: &mut f64,
    ) -> Result<()> {
        match self {
            Distribution::Bernoulli(d) => d.gradient_log_prob_param(arena, node, value, grad1, grad2),
            Distribution::Tabular(d) => d.gradient_log_prob_param(),
        }
    }

    /// Raw (unchained) d log_prob / d parameter, for backward-mode
    /// accumulation into the parameter parent's gradient buffer.
    pub(crate) fn backward_param(
        &self,
        arena: &NodeArena,
        node: &Node,
        value: &NodeValue,
        adjoint: &mut f64,
    ) -> Result<()> {
        match self {
            Distribution::Bernoulli(d) => d.backward_param(arena, node, value, adjoint),
            Distribution::Tabular(d) => d.gradient_log_prob_param(),
        }
    }
}
