use std::fmt;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::schedule::{self, Schedule};
use crate::shape::Shape;
use crate::tensor::Tensor;

// Graph — The layered node/edge description handed over by the host
//
// A Graph is an acyclic set of vector-valued Nodes joined by weighted Edges.
// It is immutable once built: compiled kernels address nodes and edges by
// their integer ids, so any topology change means building a new Graph and
// compiling again.
//
//   let mut g = GraphBuilder::new();
//   let x = g.add_node(NodeSpec::new("x", 2));
//   let y = g.add_node(NodeSpec::new("y", 3).activation(Activation::logistic()).output());
//   g.add_edge(x, y, Tensor::zeros((2, 3)));
//   let graph = g.build()?;
//
// Each node's incoming edges are kept in ascending edge-id order. That order
// is the positional afferent numbering every compiled kernel uses.

/// Stable index of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Stable index of an edge within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Per-node activation function.
///
/// This is a closed set: the compilers resolve each variant to a concrete
/// kernel once, at compile time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// `slope * x + intercept`
    Linear { slope: f64, intercept: f64 },
    /// `1 / (1 + exp(-gain * (x - bias) + offset))`
    Logistic { gain: f64, bias: f64, offset: f64 },
    /// `gain * max(x - bias, 0) + leak * min(x - bias, 0)`
    ReLU { gain: f64, bias: f64, leak: f64 },
    /// `exp(gain * x_i) / sum_j exp(gain * x_j)` over the whole vector.
    /// Forward only: there is no derivative kernel for it.
    SoftMax { gain: f64 },
}

impl Activation {
    /// Identity: Linear with slope 1 and intercept 0.
    pub fn identity() -> Self {
        Activation::Linear {
            slope: 1.0,
            intercept: 0.0,
        }
    }

    /// Standard logistic sigmoid (gain 1, bias 0, offset 0).
    pub fn logistic() -> Self {
        Activation::Logistic {
            gain: 1.0,
            bias: 0.0,
            offset: 0.0,
        }
    }

    /// Standard rectifier (gain 1, bias 0, leak 0).
    pub fn relu() -> Self {
        Activation::ReLU {
            gain: 1.0,
            bias: 0.0,
            leak: 0.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Linear { .. } => "Linear",
            Activation::Logistic { .. } => "Logistic",
            Activation::ReLU { .. } => "ReLU",
            Activation::SoftMax { .. } => "SoftMax",
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::identity()
    }
}

/// A vector-valued computation unit.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub width: usize,
    pub activation: Activation,
    pub is_output: bool,
    pub bias: Option<Tensor>,
}

/// A weighted linear map `src.value x weight` feeding `dst`.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub src: NodeId,
    pub dst: NodeId,
    /// Row-major `[src.width x dst.width]`.
    pub weight: Tensor,
}

impl Edge {
    /// The weight shape this edge must have given its endpoint widths.
    pub fn expected_shape(&self, graph: &Graph) -> Shape {
        Shape::from((graph.node(self.src).width, graph.node(self.dst).width))
    }
}

/// Description of a node to add to a [`GraphBuilder`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    name: String,
    width: usize,
    activation: Activation,
    is_output: bool,
    bias: Option<Tensor>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            activation: Activation::identity(),
            is_output: false,
            bias: None,
        }
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Mark this node as an output (it receives a target during training).
    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    pub fn bias(mut self, bias: Tensor) -> Self {
        self.bias = Some(bias);
        self
    }
}

/// Incrementally assembles a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: spec.name,
            width: spec.width,
            activation: spec.activation,
            is_output: spec.is_output,
            bias: spec.bias,
        });
        id
    }

    pub fn add_edge(&mut self, src: NodeId, dst: NodeId, weight: Tensor) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            id,
            src,
            dst,
            weight,
        });
        id
    }

    /// Check widths and references and build adjacency. Cycles are
    /// reported later, by the scheduler; tensor shapes are checked by the
    /// layout compiler.
    pub fn build(self) -> Result<Graph> {
        if self.nodes.is_empty() {
            return Err(Error::msg("graph has no nodes"));
        }
        if let Some(node) = self.nodes.iter().find(|n| n.width == 0) {
            return Err(Error::ZeroWidthNode {
                node: node.id,
                name: node.name.clone(),
            });
        }
        let n = self.nodes.len();
        let mut afferents: Vec<Vec<EdgeId>> = vec![Vec::new(); n];
        let mut efferents: Vec<Vec<EdgeId>> = vec![Vec::new(); n];

        for edge in &self.edges {
            for node in [edge.src, edge.dst] {
                if node.0 >= n {
                    return Err(Error::DanglingEdge {
                        edge: edge.id,
                        node,
                    });
                }
            }
            if let Some(&first) = afferents[edge.dst.0]
                .iter()
                .find(|&&e| self.edges[e.0].src == edge.src)
            {
                return Err(Error::DuplicateEdge {
                    first,
                    second: edge.id,
                    src: edge.src,
                    dst: edge.dst,
                });
            }
            // Edges are visited in id order, so both lists stay sorted.
            afferents[edge.dst.0].push(edge.id);
            efferents[edge.src.0].push(edge.id);
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            afferents,
            efferents,
            schedule: OnceLock::new(),
        })
    }
}

/// An immutable, validated node/edge graph.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    afferents: Vec<Vec<EdgeId>>,
    efferents: Vec<Vec<EdgeId>>,
    schedule: OnceLock<Schedule>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Incoming edges of `node` in positional (ascending edge id) order.
    pub fn afferents(&self, node: NodeId) -> &[EdgeId] {
        &self.afferents[node.0]
    }

    /// Outgoing edges of `node` in ascending edge id order.
    pub fn efferents(&self, node: NodeId) -> &[EdgeId] {
        &self.efferents[node.0]
    }

    pub fn is_source(&self, node: NodeId) -> bool {
        self.afferents[node.0].is_empty()
    }

    pub fn output_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_output)
    }

    /// The execution sets of this graph, computed once and cached.
    pub fn schedule(&self) -> Result<&Schedule> {
        if let Some(schedule) = self.schedule.get() {
            return Ok(schedule);
        }
        let computed = schedule::schedule(self)?;
        Ok(self.schedule.get_or_init(|| computed))
    }
}
