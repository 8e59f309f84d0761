//! Nodes and the arena that owns them.
//!
//! The graph driver owns a [`NodeArena`]; every node refers to its parents
//! by [`NodeId`] index into that arena, so there are no lifetime ties between
//! nodes. Builders validate arity and parent types at construction; a failed
//! build leaves the arena without the new node.

use crate::bernoulli::{self, Bernoulli};
use crate::common::{Mat, Result};
use crate::distribution::Distribution;
use crate::errors::GraphError;
use crate::operator::{self, Operator};
use crate::stochastic::StochasticState;
use crate::tabular::{self, Tabular};
use crate::value::{NodeValue, ValueType};

/// Index of a node in the arena. Stable for the arena's lifetime; also the
/// integer used to identify nodes in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Closed set of node kinds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Fixed value baked into the graph.
    Constant,
    /// Never sampled itself; exposes sampling/scoring given its parents.
    Distribution(Distribution),
    Operator(Operator),
}

/// A single node of the computation graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Ordered parent references into the owning arena.
    pub parents: Vec<NodeId>,
    pub value: NodeValue,
    /// Externally fixed observation; see `backward`.
    pub observed: bool,
    /// First/second chain factors d(value)/d(target), populated by the
    /// driver walking `compute_gradients` down the dependency chain.
    pub grad1: f64,
    pub grad2: f64,
    /// Backward-mode log-density gradient accumulator (1x1 for scalar
    /// nodes, one row per draw for iid nodes).
    pub back_grad1: Mat,
}

impl Node {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    pub fn is_stochastic(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Operator(Operator::Sample(_)) | NodeKind::Operator(Operator::IidSample(_))
        )
    }

    pub fn stochastic_state(&self) -> Option<&StochasticState> {
        match &self.kind {
            NodeKind::Operator(Operator::Sample(state))
            | NodeKind::Operator(Operator::IidSample(state)) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn stochastic_state_mut(&mut self) -> Option<&mut StochasticState> {
        match &mut self.kind {
            NodeKind::Operator(Operator::Sample(state))
            | NodeKind::Operator(Operator::IidSample(state)) => Some(state),
            _ => None,
        }
    }

    /// Split borrows for in-place synchronization of the two value
    /// representations.
    pub(crate) fn stochastic_parts_mut(
        &mut self,
    ) -> Option<(&mut NodeValue, &mut Mat, &mut StochasticState)> {
        match &mut self.kind {
            NodeKind::Operator(Operator::Sample(state))
            | NodeKind::Operator(Operator::IidSample(state)) => {
                Some((&mut self.value, &mut self.back_grad1, state))
            }
            _ => None,
        }
    }
}

/// Contiguous store of all nodes of a model graph.
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or_else(|| {
            GraphError::InvalidArgument(format!("node id {} out of range", id.0))
        })
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or_else(|| {
            GraphError::InvalidArgument(format!("node id {} out of range", id.0))
        })
    }

    /// The distribution behind `id`, or an invalid-argument error.
    pub(crate) fn distribution(&self, id: NodeId) -> Result<(&Distribution, &Node)> {
        let node = self.get(id)?;
        match &node.kind {
            NodeKind::Distribution(dist) => Ok((dist, node)),
            _ => Err(GraphError::InvalidArgument(format!(
                "node {} is not a distribution",
                id.0
            ))),
        }
    }

    fn push_node(&mut self, kind: NodeKind, parents: Vec<NodeId>, value: NodeValue) -> NodeId {
        let id = NodeId(self.nodes.len());
        let rows = value.len().max(1);
        self.nodes.push(Node {
            id,
            kind,
            parents,
            observed: false,
            grad1: 0.0,
            grad2: 0.0,
            back_grad1: Mat::zeros(rows, 1),
            value,
        });
        id
    }

    pub fn add_constant(&mut self, value: NodeValue) -> NodeId {
        self.push_node(NodeKind::Constant, vec![], value)
    }

    pub fn add_multiply(&mut self, parents: Vec<NodeId>) -> Result<NodeId> {
        let value = operator::validate_deterministic(self, "multiply", &parents)?;
        Ok(self.push_node(NodeKind::Operator(Operator::Multiply), parents, value))
    }

    pub fn add_add(&mut self, parents: Vec<NodeId>) -> Result<NodeId> {
        let value = operator::validate_deterministic(self, "add", &parents)?;
        Ok(self.push_node(NodeKind::Operator(Operator::Add), parents, value))
    }

    pub fn add_bernoulli(
        &mut self,
        sample_type: ValueType,
        parents: Vec<NodeId>,
    ) -> Result<NodeId> {
        bernoulli::validate(self, sample_type, &parents)?;
        let kind = NodeKind::Distribution(Distribution::Bernoulli(Bernoulli { sample_type }));
        Ok(self.push_node(kind, parents, NodeValue::default_of(sample_type)))
    }

    pub fn add_tabular(
        &mut self,
        sample_type: ValueType,
        parents: Vec<NodeId>,
    ) -> Result<NodeId> {
        tabular::validate(self, sample_type, &parents)?;
        let kind = NodeKind::Distribution(Distribution::Tabular(Tabular { sample_type }));
        Ok(self.push_node(kind, parents, NodeValue::default_of(sample_type)))
    }

    /// A single stochastic draw from a distribution parent.
    pub fn add_sample(&mut self, parents: Vec<NodeId>) -> Result<NodeId> {
        if parents.len() != 1 {
            return Err(GraphError::InvalidArgument(
                "sample operator requires exactly one parent".into(),
            ));
        }
        let (dist, _) = self.distribution(parents[0])?;
        let value = NodeValue::default_of(dist.sample_type());
        let state = StochasticState::new(value.clone());
        Ok(self.push_node(NodeKind::Operator(Operator::Sample(state)), parents, value))
    }

    /// `n_draws` independent identically distributed draws from a
    /// distribution parent, stored as an `n_draws x 1` matrix.
    pub fn add_iid_sample(&mut self, parents: Vec<NodeId>, n_draws: usize) -> Result<NodeId> {
        if parents.len() != 1 {
            return Err(GraphError::InvalidArgument(
                "iid sample operator requires exactly one parent".into(),
            ));
        }
        if n_draws == 0 {
            return Err(GraphError::InvalidArgument(
                "iid sample operator requires at least one draw".into(),
            ));
        }
        self.distribution(parents[0])?;
        let value = NodeValue::Matrix(Mat::zeros(n_draws, 1));
        let state = StochasticState::new(value.clone());
        Ok(self.push_node(NodeKind::Operator(Operator::IidSample(state)), parents, value))
    }

    /// Zero every gradient buffer in the arena.
    pub fn reset_gradients(&mut self) {
        for node in &mut self.nodes {
            node.grad1 = 0.0;
            node.grad2 = 0.0;
            node.back_grad1.fill(0.0);
        }
    }
}

pub(crate) fn parent0(node: &Node) -> Result<NodeId> {
    node.parents.first().copied().ok_or_else(|| {
        GraphError::InvalidArgument(format!("node {} has no parents", node.id.0))
    })
}
