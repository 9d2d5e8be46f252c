// =============================================================================
// Exec — Compile graphs into tapes and run them
// =============================================================================
//
// This module turns a `Graph` into executable kernels and runs them:
//
//   Graph → schedule → layout → forward / backward tapes → **execute**
//
// The forward compiler emits the evaluation tape, the backward compiler the
// per-sample reverse pass. The engine owns the regions of one compiled graph
// and drives the tapes; the trainer loops epochs and batches over it.
//
// USAGE:
//   let graph = builder.build()?;
//   let options = CompileOptions::default().with_optimizer(OptimizerConfig::sgd(0.5));
//   let mut compiled = CompiledGraph::compile_training(&graph, &options)?;
//   let loss = compiled.train_step(&batch)?;
//   let result = compiled.forward(&sample)?;

mod backward;
mod engine;
mod forward;
pub mod program;
mod train;

pub use backward::compile_backward;
pub use engine::{CompileOptions, CompiledGraph, ForwardResult, Sample};
pub use forward::{compile_forward, ForwardMode};
pub use program::{CompileStats, Instruction, PreAct};
pub use train::{EpochLog, TrainConfig, TrainResult, Trainer};
