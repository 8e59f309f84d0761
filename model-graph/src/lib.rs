//! Computation-graph core for probabilistic graphical models.
//!
//! Nodes are deterministic operators or stochastic variables drawn from
//! distribution nodes; the engine supports forward evaluation (sampling,
//! likelihood scoring) and backward evaluation (first/second-order gradients
//! of log-density with respect to ancestor values), including an invertible
//! change of variables to unconstrained space for gradient-based samplers.
//!
//! The graph driver — topological traversal, inference kernels — lives
//! outside this crate; it owns the [`node::NodeArena`] and the random
//! generator and calls the evaluation surface node by node.

pub mod bernoulli;
pub mod common;
pub mod distribution;
pub mod errors;
pub mod node;
pub mod operator;
pub mod stochastic;
pub mod tabular;
pub mod transform;
pub mod value;

pub use common::Mat;
pub use distribution::Distribution;
pub use errors::GraphError;
pub use node::{Node, NodeArena, NodeId, NodeKind};
pub use operator::Operator;
pub use stochastic::{StochasticState, SyncState};
pub use transform::Transform;
pub use value::{NodeValue, ValueType};
