//! Error types for graph construction and evaluation.

use thiserror::Error;

use crate::value::ValueType;

/// Errors raised while building or evaluating a model graph.
///
/// Construction errors leave the graph unconstructed; evaluation errors are
/// fatal to the current operation and carry the offending node's id. None of
/// these are recoverable conditions: the driver must treat them as a
/// malformed model or a numerical breakdown, not a transient fault.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {
    /// Wrong arity, wrong parent type, or malformed table shape at
    /// construction time.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A value was read under the wrong type tag.
    #[error("node {node}: expected {expected} value, found {found}")]
    TypeMismatch {
        node: usize,
        expected: ValueType,
        found: ValueType,
    },

    /// A probability discovered outside [0, 1] at sampling or scoring time.
    #[error("node {node}: probability {value} is outside [0, 1]")]
    OutOfRange { node: usize, value: f64 },

    /// A gradient capability invoked on a distribution without a
    /// differentiable parameterization.
    #[error("{what} not implemented for {distribution}")]
    Unsupported {
        what: &'static str,
        distribution: &'static str,
    },
}
