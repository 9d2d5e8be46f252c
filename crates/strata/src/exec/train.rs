// Trainer — epochs × batches over a compiled training kernel
//
//   1. Compile the graph for training (layout, tapes, optimizer state)
//   2. For each epoch:
//      a. Split the data into batches of `batch_size`
//      b. One training call per batch (accumulate, one optimizer step)
//      c. Log the epoch's mean batch loss
//
// After every training call the host tensors hold the updated parameters,
// whichever ownership mode was compiled.

use std::fmt;

use tracing::{info, trace};

use strata_core::error::{Error, Result};
use strata_core::graph::Graph;
use strata_core::layout::WeightOwnership;
use strata_nn::Loss;
use strata_optim::OptimizerConfig;

use super::engine::{CompileOptions, CompiledGraph, Sample};

// Training result types

/// Summary of a full training run.
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Per-epoch logs.
    pub epochs: Vec<EpochLog>,
    /// Loss of the last epoch (NaN if no epoch ran).
    pub final_loss: f64,
}

/// Log for a single training epoch.
#[derive(Debug, Clone)]
pub struct EpochLog {
    /// Epoch number (0-indexed).
    pub epoch: usize,
    /// Mean batch loss for this epoch.
    pub loss: f64,
    /// Number of training calls made.
    pub batches: usize,
}

impl fmt::Display for TrainResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training complete: {} epochs", self.epochs.len())?;
        for log in &self.epochs {
            writeln!(
                f,
                "  epoch {}: loss = {:.6} ({} batches)",
                log.epoch, log.loss, log.batches
            )?;
        }
        write!(f, "  final loss: {:.6}", self.final_loss)
    }
}

// Configuration

/// Training configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Samples per training call; the last batch of an epoch may be smaller.
    pub batch_size: usize,
    pub loss: Loss,
    pub optimizer: OptimizerConfig,
    pub ownership: WeightOwnership,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 1,
            loss: Loss::default(),
            optimizer: OptimizerConfig::default(),
            ownership: WeightOwnership::default(),
        }
    }
}

impl TrainConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_ownership(mut self, ownership: WeightOwnership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidHyperparameter {
                name: "batch_size",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        self.optimizer.validate()
    }

    fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
            .with_ownership(self.ownership)
            .with_loss(self.loss)
            .with_optimizer(self.optimizer)
    }
}

// Trainer

/// Runs a training loop over a compiled graph.
#[derive(Debug)]
pub struct Trainer {
    compiled: CompiledGraph,
    config: TrainConfig,
}

impl Trainer {
    /// Validate `config` and compile `graph` for training.
    pub fn new(graph: &Graph, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let compiled = CompiledGraph::compile_training(graph, &config.compile_options())?;
        Ok(Self { compiled, config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    pub fn compiled_mut(&mut self) -> &mut CompiledGraph {
        &mut self.compiled
    }

    pub fn into_compiled(self) -> CompiledGraph {
        self.compiled
    }

    /// Train for the configured number of epochs on `data`.
    pub fn train(&mut self, data: &[Sample]) -> Result<TrainResult> {
        if data.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut epochs = Vec::with_capacity(self.config.epochs);
        for epoch in 0..self.config.epochs {
            let mut total = 0.0;
            let mut batches = 0usize;
            for batch in data.chunks(self.config.batch_size) {
                let loss = self.compiled.train_step(batch)?;
                trace!(epoch, batch = batches, loss, "training call");
                total += loss;
                batches += 1;
            }
            let loss = total / batches as f64;
            info!(epoch, loss, batches, "epoch complete");
            epochs.push(EpochLog {
                epoch,
                loss,
                batches,
            });
        }

        let final_loss = epochs.last().map_or(f64::NAN, |log| log.loss);
        Ok(TrainResult { epochs, final_loss })
    }
}
