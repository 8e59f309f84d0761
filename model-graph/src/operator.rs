//! Operator node kinds.
//!
//! Deterministic operators recompute their value as a pure function of
//! current parent values, elementwise and in parent order. Stochastic
//! operators carry a [`StochasticState`] and are evaluated through the
//! arena's sampling path.

use crate::common::{Mat, Result};
use crate::errors::GraphError;
use crate::node::{Node, NodeArena, NodeId};
use crate::stochastic::StochasticState;
use crate::value::{NodeValue, ValueType};

/// Closed set of operator kinds.
#[derive(Debug, Clone)]
pub enum Operator {
    /// Elementwise product of all parents.
    Multiply,
    /// Elementwise sum of all parents.
    Add,
    /// A single draw from a distribution parent.
    Sample(StochasticState),
    /// A matrix of iid draws from a distribution parent.
    IidSample(StochasticState),
}

enum Operand<'a> {
    Scalar(f64),
    Matrix(&'a Mat),
}

fn operand(parent: &Node) -> Result<Operand<'_>> {
    match &parent.value {
        NodeValue::Real(x) => Ok(Operand::Scalar(*x)),
        NodeValue::Probability(p) => Ok(Operand::Scalar(*p)),
        NodeValue::Matrix(m) => Ok(Operand::Matrix(m)),
        other => Err(GraphError::TypeMismatch {
            node: parent.id.0,
            expected: ValueType::Real,
            found: other.value_type(),
        }),
    }
}

pub(crate) fn validate_deterministic(
    arena: &NodeArena,
    what: &str,
    parents: &[NodeId],
) -> Result<NodeValue> {
    if parents.len() < 2 {
        return Err(GraphError::InvalidArgument(format!(
            "{} operator requires at least two parents",
            what
        )));
    }
    let mut dims: Option<(usize, usize)> = None;
    let mut scalars = 0usize;
    for &pid in parents {
        match operand(arena.get(pid)?)? {
            Operand::Scalar(_) => scalars += 1,
            Operand::Matrix(m) => match dims {
                None => dims = Some((m.nrows(), m.ncols())),
                Some(d) if d == (m.nrows(), m.ncols()) => {}
                Some(d) => {
                    return Err(GraphError::InvalidArgument(format!(
                        "{} operator parents disagree on shape: {}x{} vs {}x{}",
                        what,
                        d.0,
                        d.1,
                        m.nrows(),
                        m.ncols()
                    )))
                }
            },
        }
    }
    match (scalars, dims) {
        (_, None) => Ok(NodeValue::Real(0.0)),
        (0, Some((r, c))) => Ok(NodeValue::Matrix(Mat::zeros(r, c))),
        _ => Err(GraphError::InvalidArgument(format!(
            "{} operator cannot mix scalar and matrix parents",
            what
        ))),
    }
}

fn fold(arena: &NodeArena, node: &Node, f: impl Fn(f64, f64) -> f64) -> Result<NodeValue> {
    let mut scalar_acc: Option<f64> = None;
    let mut matrix_acc: Option<Mat> = None;
    for &pid in &node.parents {
        match operand(arena.get(pid)?)? {
            Operand::Scalar(x) => {
                scalar_acc = Some(match scalar_acc {
                    None => x,
                    Some(acc) => f(acc, x),
                });
            }
            Operand::Matrix(m) => {
                matrix_acc = match matrix_acc {
                    None => Some(m.clone()),
                    Some(acc) => {
                        if acc.shape() != m.shape() {
                            return Err(GraphError::InvalidArgument(format!(
                                "node {}: parents disagree on shape",
                                node.id.0
                            )));
                        }
                        Some(acc.zip_map(m, &f))
                    }
                };
            }
        }
    }
    match (scalar_acc, matrix_acc) {
        (Some(s), None) => Ok(NodeValue::Real(s)),
        (None, Some(m)) => Ok(NodeValue::Matrix(m)),
        _ => Err(GraphError::InvalidArgument(format!(
            "node {}: cannot mix scalar and matrix parents",
            node.id.0
        ))),
    }
}

/// Elementwise product of the parents, in parent order.
pub(crate) fn multiply(arena: &NodeArena, node: &Node) -> Result<NodeValue> {
    fold(arena, node, |a, b| a * b)
}

/// Elementwise sum of the parents, in parent order.
pub(crate) fn add(arena: &NodeArena, node: &Node) -> Result<NodeValue> {
    fold(arena, node, |a, b| a + b)
}

/// Propagate first/second chain factors from the parents through this
/// operator: sum rule for add, product rule (with second-order cross terms)
/// for multiply. Scalar operands only.
pub(crate) fn compute_gradients(arena: &NodeArena, node: &Node) -> Result<(f64, f64)> {
    let mut xs = Vec::with_capacity(node.parents.len());
    let mut g1 = Vec::with_capacity(node.parents.len());
    let mut g2 = Vec::with_capacity(node.parents.len());
    for &pid in &node.parents {
        let parent = arena.get(pid)?;
        match operand(parent)? {
            Operand::Scalar(x) => {
                xs.push(x);
                g1.push(parent.grad1);
                g2.push(parent.grad2);
            }
            Operand::Matrix(_) => {
                return Err(GraphError::InvalidArgument(format!(
                    "node {}: gradient propagation requires scalar operands",
                    node.id.0
                )))
            }
        }
    }
    match &node.kind {
        crate::node::NodeKind::Operator(Operator::Add) => {
            Ok((g1.iter().sum(), g2.iter().sum()))
        }
        crate::node::NodeKind::Operator(Operator::Multiply) => {
            let n = xs.len();
            let prod_except = |skip: usize| -> f64 {
                xs.iter()
                    .enumerate()
                    .filter(|(k, _)| *k != skip)
                    .map(|(_, v)| *v)
                    .product()
            };
            let prod_except2 = |a: usize, b: usize| -> f64 {
                xs.iter()
                    .enumerate()
                    .filter(|(k, _)| *k != a && *k != b)
                    .map(|(_, v)| *v)
                    .product()
            };
            let mut first = 0.0;
            let mut second = 0.0;
            for i in 0..n {
                first += g1[i] * prod_except(i);
                second += g2[i] * prod_except(i);
                for j in 0..n {
                    if i != j {
                        second += g1[i] * g1[j] * prod_except2(i, j);
                    }
                }
            }
            Ok((first, second))
        }
        _ => Ok((0.0, 0.0)),
    }
}
