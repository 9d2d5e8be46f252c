// Engine — Compiled graphs and the regions they run on
//
// `CompiledGraph` owns everything one compiled graph needs at run time:
//
//   layout          offsets of every node, edge and parameter
//   state region    the ParamStore (copied or shared parameters)
//   input/target    packed per-sample vectors
//   data region     value / z / error banks plus scratch
//   gradient        one accumulator per parameter element
//   optimizer       OptimizerState (aux region + step counter)
//   tapes           inference forward, training forward, backward
//
// USAGE:
//   let mut compiled = CompiledGraph::compile_training(&graph, &options)?;
//   let loss = compiled.train_step(&[Sample::new().input(x, vec![..]).target(y, vec![..])])?;
//   let out = compiled.forward(&Sample::new().input(x, vec![..]))?;
//
// Everything that can fail (shapes, missing or unexpected data,
// hyperparameters, unsupported functions) fails before a tape runs. A
// training call validates and packs its whole batch before touching any
// parameter, so a bad sample never leaves a partial update behind.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace};

use strata_core::error::{Error, Result};
use strata_core::graph::{EdgeId, Graph, NodeId};
use strata_core::layout::{
    compile_layout, placement_for, MemoryLayout, ParamOwner, ParamSlot, ParamStore,
    WeightOwnership,
};
use strata_nn::{Loss, LossKernel};
use strata_optim::{OptimizerConfig, OptimizerState};

use super::backward::compile_backward;
use super::forward::{compile_forward, ForwardMode};
use super::program::{execute, CompileStats, DataRegion, Frame, Instruction};

// Compile options

/// Options for compiling a graph.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// How compiled kernels hold the parameters (default: copy).
    pub ownership: WeightOwnership,
    /// Loss used by the training kernel (default: MSE).
    pub loss: Loss,
    /// Optimizer used by the training kernel (default: SGD, lr 0.01).
    pub optimizer: OptimizerConfig,
}

impl CompileOptions {
    pub fn with_ownership(mut self, ownership: WeightOwnership) -> Self {
        self.ownership = ownership;
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
}

// Samples and results

/// One sample: an input vector per source node and, for training, a target
/// vector per output node.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    inputs: Vec<(NodeId, Vec<f64>)>,
    targets: Vec<(NodeId, Vec<f64>)>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the input for a source node.
    pub fn input(mut self, node: NodeId, values: impl Into<Vec<f64>>) -> Self {
        self.inputs.push((node, values.into()));
        self
    }

    /// Add the target for an output node.
    pub fn target(mut self, node: NodeId, values: impl Into<Vec<f64>>) -> Self {
        self.targets.push((node, values.into()));
        self
    }

    pub fn inputs(&self) -> &[(NodeId, Vec<f64>)] {
        &self.inputs
    }

    pub fn targets(&self) -> &[(NodeId, Vec<f64>)] {
        &self.targets
    }
}

/// Output values of one forward evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResult {
    /// Output node values, keyed by node name.
    pub outputs: HashMap<String, Vec<f64>>,
}

impl ForwardResult {
    /// Get an output by node name.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.outputs.get(name).map(Vec::as_slice)
    }

    /// The only output, if there is exactly one.
    pub fn output(&self) -> Option<&[f64]> {
        if self.outputs.len() == 1 {
            self.outputs.values().next().map(Vec::as_slice)
        } else {
            None
        }
    }
}

// Training kernel

#[derive(Debug)]
struct TrainingKernel {
    forward: Vec<Instruction>,
    backward: Vec<Instruction>,
    slots: Vec<ParamSlot>,
    grads: Vec<f64>,
    optimizer: OptimizerState,
    /// Packed targets of the current batch.
    targets: Vec<f64>,
    /// Packed inputs of the current batch.
    inputs: Vec<f64>,
}

// CompiledGraph

/// A graph compiled into a forward kernel and, optionally, a training kernel.
#[derive(Debug)]
pub struct CompiledGraph {
    layout: MemoryLayout,
    store: ParamStore,
    forward: Vec<Instruction>,
    training: Option<TrainingKernel>,
    input: Vec<f64>,
    data: DataRegion,
    names: Vec<String>,
    outputs: Vec<NodeId>,
    stats: CompileStats,
}

impl CompiledGraph {
    /// Compile the forward kernel only.
    pub fn compile(graph: &Graph, options: &CompileOptions) -> Result<Self> {
        Self::build(graph, options, false)
    }

    /// Compile the forward kernel and the training kernel.
    pub fn compile_training(graph: &Graph, options: &CompileOptions) -> Result<Self> {
        Self::build(graph, options, true)
    }

    fn build(graph: &Graph, options: &CompileOptions, train: bool) -> Result<Self> {
        let start = Instant::now();

        if train {
            options.optimizer.validate()?;
        }
        let aux_per_param = if train {
            options.optimizer.aux_per_param()
        } else {
            0
        };

        let placement = placement_for(options.ownership);
        let (layout, store) = compile_layout(graph, placement.as_ref(), aux_per_param)?;
        let forward = compile_forward(graph, &layout, ForwardMode::Inference)?;

        let training = if train {
            let backward = compile_backward(graph, &layout, LossKernel::resolve(options.loss))?;
            let training_forward = compile_forward(graph, &layout, ForwardMode::Training)?;
            let optimizer = options.optimizer.build(layout.param_len())?;
            Some(TrainingKernel {
                forward: training_forward,
                backward,
                slots: layout.param_slots().copied().collect(),
                grads: vec![0.0; layout.param_len()],
                optimizer,
                targets: Vec::new(),
                inputs: Vec::new(),
            })
        } else {
            None
        };

        let schedule = graph.schedule()?;
        let stats = CompileStats {
            num_nodes: graph.num_nodes(),
            num_edges: graph.num_edges(),
            num_sets: schedule.len(),
            forward_instructions: forward.len(),
            training_forward_instructions: training.as_ref().map_or(0, |t| t.forward.len()),
            backward_instructions: training.as_ref().map_or(0, |t| t.backward.len()),
            param_len: layout.param_len(),
            data_len: layout.data_len(),
            optimizer_len: layout.optimizer_len(),
            compile_time_us: start.elapsed().as_micros() as u64,
        };
        debug!(%stats, "compiled graph");

        let data = if train {
            DataRegion::training(&layout)
        } else {
            DataRegion::inference(&layout)
        };

        Ok(CompiledGraph {
            input: vec![0.0; layout.input_len()],
            data,
            names: graph.nodes().iter().map(|n| n.name.clone()).collect(),
            outputs: graph.output_nodes().map(|n| n.id).collect(),
            layout,
            store,
            forward,
            training,
            stats,
        })
    }

    pub fn stats(&self) -> &CompileStats {
        &self.stats
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn ownership(&self) -> WeightOwnership {
        self.layout.ownership()
    }

    /// Whether a training kernel was compiled.
    pub fn is_trainable(&self) -> bool {
        self.training.is_some()
    }

    // Forward

    /// Evaluate the graph on one sample's inputs (targets are ignored).
    ///
    /// Every node's value stays readable through [`value`](Self::value)
    /// until the next evaluation.
    pub fn forward(&mut self, sample: &Sample) -> Result<ForwardResult> {
        pack_inputs(&self.layout, sample.inputs(), &mut self.input)?;
        let CompiledGraph {
            store,
            forward,
            input,
            data,
            ..
        } = self;
        store.with_ref(|params| {
            let mut frame = Frame {
                input: input.as_slice(),
                target: &[],
                data,
                grads: &mut [],
            };
            execute(forward.as_slice(), params, &mut frame);
        })?;
        Ok(self.collect_outputs(&self.data.value))
    }

    /// Evaluate many independent samples in parallel.
    ///
    /// Each worker runs the inference tape on its own data region; the
    /// parameters are only read. Results are in sample order.
    pub fn evaluate_many(&self, samples: &[Sample]) -> Result<Vec<ForwardResult>> {
        let mut packed = vec![0.0; samples.len() * self.layout.input_len()];
        let stride = self.layout.input_len();
        for (i, sample) in samples.iter().enumerate() {
            pack_inputs(
                &self.layout,
                sample.inputs(),
                &mut packed[i * stride..(i + 1) * stride],
            )?;
        }

        (0..samples.len())
            .into_par_iter()
            .map(|i| -> Result<ForwardResult> {
                let mut data = DataRegion::inference(&self.layout);
                self.store.with_ref(|params| {
                    let mut frame = Frame {
                        input: &packed[i * stride..(i + 1) * stride],
                        target: &[],
                        data: &mut data,
                        grads: &mut [],
                    };
                    execute(&self.forward, params, &mut frame);
                })?;
                Ok(self.collect_outputs(&data.value))
            })
            .collect()
    }

    /// The value of `node` after the most recent evaluation.
    pub fn value(&self, node: NodeId) -> Result<&[f64]> {
        let slot = self
            .layout
            .nodes()
            .get(node.0)
            .ok_or(Error::UnknownNode { node })?;
        Ok(&self.data.value[slot.data..slot.data + slot.width])
    }

    fn collect_outputs(&self, values: &[f64]) -> ForwardResult {
        let outputs = self
            .outputs
            .iter()
            .map(|&id| {
                let slot = self.layout.node(id);
                (
                    self.names[id.0].clone(),
                    values[slot.data..slot.data + slot.width].to_vec(),
                )
            })
            .collect();
        ForwardResult { outputs }
    }

    // Training

    /// Run one training call on `batch`: accumulate gradients over every
    /// sample, apply one optimizer step, and make the new parameters visible
    /// in the host tensors. Returns the batch loss (sum over samples).
    pub fn train_step(&mut self, batch: &[Sample]) -> Result<f64> {
        let loss = self.run_batch(batch, true)?;
        self.store.sync_to_host()?;
        Ok(loss)
    }

    /// Zero the gradient region, then run forward and backward for every
    /// sample of `batch`, leaving the summed gradients in place. Parameters
    /// are not changed. Returns the batch loss.
    pub fn accumulate_gradients(&mut self, batch: &[Sample]) -> Result<f64> {
        self.run_batch(batch, false)
    }

    /// Apply one optimizer step from the gradient region, zero it, and sync
    /// the host tensors in copy mode.
    pub fn apply_gradients(&mut self) -> Result<()> {
        let kernel = self
            .training
            .as_mut()
            .ok_or_else(|| Error::msg("graph was compiled without a training kernel"))?;
        let TrainingKernel {
            slots,
            grads,
            optimizer,
            ..
        } = kernel;
        self.store.with_mut(|params| {
            optimizer.step(slots, params, grads);
            grads.iter_mut().for_each(|g| *g = 0.0);
        })?;
        self.store.sync_to_host()
    }

    fn run_batch(&mut self, batch: &[Sample], step: bool) -> Result<f64> {
        let layout = &self.layout;
        let kernel = self
            .training
            .as_mut()
            .ok_or_else(|| Error::msg("graph was compiled without a training kernel"))?;
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }

        // Validate and pack the whole batch before any tape runs.
        let in_stride = layout.input_len();
        let tg_stride = layout.target_len();
        kernel.inputs.clear();
        kernel.inputs.resize(batch.len() * in_stride, 0.0);
        kernel.targets.clear();
        kernel.targets.resize(batch.len() * tg_stride, 0.0);
        for (i, sample) in batch.iter().enumerate() {
            pack_inputs(
                layout,
                sample.inputs(),
                &mut kernel.inputs[i * in_stride..(i + 1) * in_stride],
            )?;
            pack_targets(
                layout,
                i,
                sample.targets(),
                &mut kernel.targets[i * tg_stride..(i + 1) * tg_stride],
            )?;
        }

        self.data.ensure_training(layout);
        let data = &mut self.data;
        let TrainingKernel {
            forward,
            backward,
            slots,
            grads,
            optimizer,
            inputs,
            targets,
        } = kernel;
        grads.iter_mut().for_each(|g| *g = 0.0);

        // One lock of the state region for the whole call.
        let loss = self.store.with_mut(|params| {
            let mut total = 0.0;
            for i in 0..batch.len() {
                let mut frame = Frame {
                    input: &inputs[i * in_stride..(i + 1) * in_stride],
                    target: &targets[i * tg_stride..(i + 1) * tg_stride],
                    data: &mut *data,
                    grads: grads.as_mut_slice(),
                };
                execute(forward, &*params, &mut frame);
                total += execute(backward, &*params, &mut frame);
            }
            if step {
                optimizer.step(slots, params, grads);
                grads.iter_mut().for_each(|g| *g = 0.0);
            }
            total
        })?;

        trace!(samples = batch.len(), loss, step, "ran training batch");
        Ok(loss)
    }

    /// The gradient region (summed over the last accumulated batch).
    pub fn gradients(&self) -> Option<&[f64]> {
        self.training.as_ref().map(|t| t.grads.as_slice())
    }

    /// The optimizer state, if a training kernel was compiled.
    pub fn optimizer(&self) -> Option<&OptimizerState> {
        self.training.as_ref().map(|t| &t.optimizer)
    }

    // Parameters

    /// Current compiled values of an edge's weight matrix.
    pub fn weight(&self, edge: EdgeId) -> Result<Vec<f64>> {
        let slot = self
            .layout
            .edges()
            .get(edge.0)
            .map(|e| e.weight)
            .ok_or_else(|| Error::msg(format!("unknown edge {edge}")))?;
        self.store.read(&slot)
    }

    /// Current compiled values of a node's bias, if it has one.
    pub fn bias(&self, node: NodeId) -> Result<Option<Vec<f64>>> {
        let slot = self
            .layout
            .nodes()
            .get(node.0)
            .ok_or(Error::UnknownNode { node })?;
        slot.bias.map(|b| self.store.read(&b)).transpose()
    }

    /// Current values of every parameter in flat order.
    pub fn params(&self) -> Result<Vec<(ParamOwner, Vec<f64>)>> {
        self.store.with_ref(|p| {
            self.layout
                .params()
                .iter()
                .map(|(owner, slot)| (*owner, p.get(slot).to_vec()))
                .collect()
        })
    }

    /// Write compiled parameter values back to the host tensors (copy mode).
    pub fn sync_to_host(&self) -> Result<()> {
        self.store.sync_to_host()
    }

    /// Re-read the host tensors into the compiled copy (copy mode).
    pub fn reload_from_host(&mut self) -> Result<()> {
        self.store.reload_from_host()
    }
}

// Batch validation

fn pack_inputs(layout: &MemoryLayout, inputs: &[(NodeId, Vec<f64>)], out: &mut [f64]) -> Result<()> {
    let mut seen = vec![false; layout.nodes().len()];
    for (node, values) in inputs {
        let slot = layout
            .nodes()
            .get(node.0)
            .ok_or(Error::UnknownNode { node: *node })?;
        let offset = slot.input.ok_or(Error::UnexpectedInput { node: *node })?;
        if values.len() != slot.width {
            return Err(Error::InputWidthMismatch {
                node: *node,
                expected: slot.width,
                got: values.len(),
            });
        }
        out[offset..offset + slot.width].copy_from_slice(values);
        seen[node.0] = true;
    }
    for slot in layout.nodes() {
        if slot.input.is_some() && !seen[slot.id.0] {
            return Err(Error::MissingInput { node: slot.id });
        }
    }
    Ok(())
}

fn pack_targets(
    layout: &MemoryLayout,
    sample: usize,
    targets: &[(NodeId, Vec<f64>)],
    out: &mut [f64],
) -> Result<()> {
    let mut seen = vec![false; layout.nodes().len()];
    for (node, values) in targets {
        let slot = layout
            .nodes()
            .get(node.0)
            .ok_or(Error::UnknownNode { node: *node })?;
        let offset = slot.target.ok_or(Error::UnexpectedTarget {
            sample,
            node: *node,
        })?;
        if values.len() != slot.width {
            return Err(Error::InputWidthMismatch {
                node: *node,
                expected: slot.width,
                got: values.len(),
            });
        }
        out[offset..offset + slot.width].copy_from_slice(values);
        seen[node.0] = true;
    }
    for slot in layout.nodes() {
        if slot.target.is_some() && !seen[slot.id.0] {
            return Err(Error::MissingTarget {
                sample,
                node: slot.id,
            });
        }
    }
    Ok(())
}
