use crate::graph::{EdgeId, NodeId};
use crate::shape::Shape;

/// All errors that can occur within Strata.
///
/// Every variant is raised while building, compiling, or preparing a graph
/// for execution. Once a kernel has been compiled and its batch validated,
/// running it cannot fail except on a poisoned host tensor lock.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Topology ──
    /// Scheduling could not make progress: the graph contains a cycle.
    #[error("graph contains a cycle through node {node}")]
    CyclicGraph { node: NodeId },

    /// An edge refers to a node that does not exist.
    #[error("edge {edge} refers to unknown node {node}")]
    DanglingEdge { edge: EdgeId, node: NodeId },

    /// Two edges connect the same ordered pair of nodes.
    #[error("edges {first} and {second} both connect {src} -> {dst}")]
    DuplicateEdge {
        first: EdgeId,
        second: EdgeId,
        src: NodeId,
        dst: NodeId,
    },

    /// A node with no outgoing edges that is not marked as an output.
    #[error("node {node} ('{name}') has no outgoing edges and is not an output")]
    DeadNode { node: NodeId, name: String },

    /// A node id that is not part of the graph.
    #[error("unknown node {node}")]
    UnknownNode { node: NodeId },

    // ── Shapes ──
    /// A node declared with width 0.
    #[error("node {node} ('{name}') has width 0")]
    ZeroWidthNode { node: NodeId, name: String },

    /// Edge weight shape does not match [source width x destination width].
    #[error("edge {edge}: weight shape {got} does not match expected {expected}")]
    EdgeShapeMismatch {
        edge: EdgeId,
        expected: Shape,
        got: Shape,
    },

    /// Bias length does not match the node width (or bias on a source node).
    #[error("node {node}: bias shape {got} does not match expected {expected}")]
    BiasShapeMismatch {
        node: NodeId,
        expected: Shape,
        got: Shape,
    },

    /// An input or target vector has the wrong length.
    #[error("node {node}: expected a vector of width {expected}, got {got}")]
    InputWidthMismatch {
        node: NodeId,
        expected: usize,
        got: usize,
    },

    /// Element count mismatch when creating a tensor from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    // ── Functions ──
    /// An activation or loss with no kernel for the requested use.
    #[error("unsupported function '{function}' on node {node}: {reason}")]
    UnsupportedFunction {
        node: NodeId,
        function: String,
        reason: String,
    },

    // ── Configuration ──
    /// An output node has no target in a training sample.
    #[error("sample {sample}: missing target for output node {node}")]
    MissingTarget { sample: usize, node: NodeId },

    /// A target was supplied for a node that is not an output.
    #[error("sample {sample}: target supplied for non-output node {node}")]
    UnexpectedTarget { sample: usize, node: NodeId },

    /// A source node has no input.
    #[error("missing input for source node {node}")]
    MissingInput { node: NodeId },

    /// An input was supplied for a node that is not a source node.
    #[error("input supplied for non-source node {node}")]
    UnexpectedInput { node: NodeId },

    /// An optimizer hyperparameter is outside its valid range.
    #[error("invalid hyperparameter {name} = {value}: {reason}")]
    InvalidHyperparameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// A training call received no samples.
    #[error("training batch is empty")]
    EmptyBatch,

    /// Host tensor storage lock was poisoned by a panicking writer.
    #[error("tensor storage lock poisoned")]
    LockPoisoned,

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Whether this error stems from the graph's topology.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            Error::CyclicGraph { .. }
                | Error::DanglingEdge { .. }
                | Error::DuplicateEdge { .. }
                | Error::DeadNode { .. }
                | Error::UnknownNode { .. }
        )
    }

    /// Whether this error is a configuration error (bad data or hyperparameters).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingTarget { .. }
                | Error::UnexpectedTarget { .. }
                | Error::MissingInput { .. }
                | Error::UnexpectedInput { .. }
                | Error::InvalidHyperparameter { .. }
                | Error::EmptyBatch
        )
    }
}

/// Convenience Result type used throughout Strata.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
