//! # Strata
//!
//! Compile layered computation graphs into native forward and training
//! kernels.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use strata::prelude::*;
//!
//! # fn main() -> strata::Result<()> {
//! let mut g = GraphBuilder::new();
//! let x = g.add_node(NodeSpec::new("x", 2));
//! let y = g.add_node(NodeSpec::new("y", 1).activation(Activation::logistic()).output());
//! g.add_edge(x, y, Tensor::from_vec(vec![0.5, -0.5], (2, 1))?);
//! let graph = g.build()?;
//!
//! let options = CompileOptions::default().with_optimizer(OptimizerConfig::sgd(0.5));
//! let mut compiled = CompiledGraph::compile_training(&graph, &options)?;
//! let sample = Sample::new().input(x, vec![1.0, 0.0]).target(y, vec![1.0]);
//! let before = compiled.train_step(&[sample.clone()])?;
//! let after = compiled.train_step(&[sample])?;
//! assert!(after < before);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `strata-core` | Graph, Tensor, Shape, schedule, memory layout, primitive kernels, Error |
//! | `strata-nn` | Activation and loss kernels, initializers |
//! | `strata-optim` | Optimizers (SGD, Adam) over the flat parameter layout |
//!
//! ## Modules
//!
//! - [`exec`] — forward/backward compilers, compiled graphs, trainer

/// Re-export core types.
pub use strata_core::{
    bail, compile_layout, Activation, Edge, EdgeId, Error, Graph, GraphBuilder, MemoryLayout,
    Node, NodeId, NodeSpec, ParamOwner, ParamSlot, Result, Schedule, Shape, Tensor,
    WeightOwnership,
};

/// Re-export activation, loss and initialization kernels.
pub mod nn {
    pub use strata_nn::*;
}

/// Re-export optimizers.
pub mod optim {
    pub use strata_optim::*;
}

/// Graph compilation and execution.
pub mod exec;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::exec::{
        CompileOptions, CompileStats, CompiledGraph, EpochLog, ForwardResult, Sample, TrainConfig,
        TrainResult, Trainer,
    };
    pub use crate::nn::{init, Loss};
    pub use crate::optim::{AdamConfig, OptimizerConfig};
    pub use crate::{
        Activation, EdgeId, Error, Graph, GraphBuilder, NodeId, NodeSpec, Result, Shape, Tensor,
        WeightOwnership,
    };
}
