//! Tabular distribution: booleans conditioned on boolean parents through an
//! explicit conditional probability table.
//!
//! The first parent is a constant row-simplex matrix with two columns and
//! `2^k` rows for `k` boolean parents; column 1 holds P(true). The row index
//! is the binary encoding of the parent booleans with bit `j` set by the
//! `j`-th parent counting from the LAST parent inward. That ordering is a
//! data-format contract with however the table was authored upstream; it is
//! preserved exactly, not re-derived.

use rand::Rng;
use rand_distr::Distribution as _;

use crate::common::{warn, Result};
use crate::errors::GraphError;
use crate::node::{Node, NodeArena, NodeId};
use crate::value::{NodeValue, ValueType};

#[derive(Debug, Clone)]
pub struct Tabular {
    pub(crate) sample_type: ValueType,
}

pub(crate) fn validate(
    arena: &NodeArena,
    sample_type: ValueType,
    parents: &[NodeId],
) -> Result<()> {
    if sample_type != ValueType::Boolean {
        return Err(GraphError::InvalidArgument(
            "Tabular supports only boolean valued samples".into(),
        ));
    }
    let table = match parents.first() {
        Some(&id) => arena.get(id)?,
        None => {
            return Err(GraphError::InvalidArgument(
                "Tabular distribution's first arg must be a constant row-simplex matrix".into(),
            ))
        }
    };
    let matrix = match (table.is_constant(), table.value.as_simplex()) {
        (true, Some(m)) => m,
        _ => {
            return Err(GraphError::InvalidArgument(
                "Tabular distribution's first arg must be a constant row-simplex matrix".into(),
            ))
        }
    };
    // two columns, since the sample type is boolean
    if matrix.ncols() != 2 {
        return Err(GraphError::InvalidArgument(
            "Tabular distribution's first arg must have two columns".into(),
        ));
    }
    let expected_rows = 1usize << (parents.len() - 1);
    if matrix.nrows() != expected_rows {
        return Err(GraphError::InvalidArgument(format!(
            "Tabular distribution's first arg expected {} rows, got {}",
            expected_rows,
            matrix.nrows()
        )));
    }
    for &pid in &parents[1..] {
        let parent = arena.get(pid)?;
        if parent.value.value_type() != ValueType::Boolean {
            return Err(GraphError::InvalidArgument(
                "Tabular distribution only supports boolean parents".into(),
            ));
        }
    }
    Ok(())
}

impl Tabular {
    /// Look up P(true) for the current parent values. The row index is
    /// recomputed on every call; entries are range-checked here, not at
    /// construction.
    pub fn get_probability(&self, arena: &NodeArena, node: &Node) -> Result<f64> {
        let mut row_id = 0usize;
        // map parent values to a row index, starting from the last parent
        for (j, &pid) in node.parents[1..].iter().rev().enumerate() {
            let parent = arena.get(pid)?;
            let b = parent.value.as_bool().ok_or_else(|| GraphError::TypeMismatch {
                node: node.id.0,
                expected: ValueType::Boolean,
                found: parent.value.value_type(),
            })?;
            if b {
                row_id += 1 << j;
            }
        }
        let table = arena.get(node.parents[0])?;
        let matrix = table.value.as_simplex().ok_or_else(|| GraphError::TypeMismatch {
            node: node.id.0,
            expected: ValueType::Simplex,
            found: table.value.value_type(),
        })?;
        let prob = matrix[(row_id, 1)];
        if !(0.0..=1.0).contains(&prob) {
            return Err(GraphError::OutOfRange {
                node: node.id.0,
                value: prob,
            });
        }
        if prob == 0.0 || prob == 1.0 {
            warn!(
                "node {}: degenerate table entry {} at row {}; log_prob of the losing side is -inf",
                node.id.0, prob, row_id
            );
        }
        Ok(prob)
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        arena: &NodeArena,
        node: &Node,
        rng: &mut R,
    ) -> Result<NodeValue> {
        let prob_true = self.get_probability(arena, node)?;
        let draw = rand_distr::Bernoulli::new(prob_true).map_err(|_| GraphError::OutOfRange {
            node: node.id.0,
            value: prob_true,
        })?;
        Ok(NodeValue::Boolean(draw.sample(rng)))
    }

    pub fn log_prob(&self, arena: &NodeArena, node: &Node, value: &NodeValue) -> Result<f64> {
        let prob_true = self.get_probability(arena, node)?;
        let v = value.as_bool().ok_or_else(|| GraphError::TypeMismatch {
            node: node.id.0,
            expected: ValueType::Boolean,
            found: value.value_type(),
        })?;
        Ok(if v { prob_true.ln() } else { (1.0 - prob_true).ln() })
    }

    /// Discrete conditional table, no smooth parameterization.
    pub fn gradient_log_prob_value(&self) -> Result<()> {
        Err(GraphError::Unsupported {
            what: "gradient_log_prob_value",
            distribution: "Tabular",
        })
    }

    /// Discrete conditional table, no smooth parameterization.
    pub fn gradient_log_prob_param(&self) -> Result<()> {
        Err(GraphError::Unsupported {
            what: "gradient_log_prob_param",
            distribution: "Tabular",
        })
    }
}
