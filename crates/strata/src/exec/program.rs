// Program — the instruction tape compiled kernels run
//
// A compiled kernel is a flat `Vec<Instruction>`. Every operand is resolved
// at compile time:
//
//   - offsets into the input, target, data and gradient regions
//   - `ParamSlot`s into the state region
//   - activation, derivative and loss kernels as function pointers
//
// so running a tape is one linear pass with no lookups, no name matching
// and no dispatch on nodes or edges.
//
// DATA REGION:
//
//   value   post-activation per node       (read by successors, outputs)
//   z       pre-activation per node        (training only; read by f')
//   error   delta per node                 (training only)
//   pre     one node-width scratch vector  (inference pre-activation)
//   temp    one node-width scratch vector  (accumulation staging)
//
// value/z/error share the node offsets of the memory layout. Each bank is
// its own Vec so an instruction can read one bank while writing another.

use std::fmt;

use strata_core::kernels;
use strata_core::layout::{MemoryLayout, ParamSlot, ParamView};
use strata_nn::{ActivationKernel, DerivativeKernel, LossKernel};

/// Where a node's pre-activation vector is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreAct {
    /// The shared `pre` scratch vector (inference).
    Scratch,
    /// The node's own slot in the z bank, kept for the backward pass.
    Retained(usize),
}

/// A single operation of a compiled kernel.
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    // ── Forward ──
    /// `pre = input[src..src+width]`
    LoadInput {
        src: usize,
        pre: PreAct,
        width: usize,
    },
    /// `pre (+)= value[src] · W`
    MatMul {
        src: usize,
        weight: ParamSlot,
        rows: usize,
        cols: usize,
        pre: PreAct,
        accumulate: bool,
    },
    /// `pre += bias`
    AddBias {
        bias: ParamSlot,
        pre: PreAct,
        width: usize,
    },
    /// `value[dst] = f(pre)`
    Activate {
        kernel: ActivationKernel,
        pre: PreAct,
        dst: usize,
        width: usize,
    },

    // ── Backward ──
    /// Adds the node's loss to the running total; `error (+)= dL/da`.
    OutputError {
        loss: LossKernel,
        value: usize,
        target: usize,
        error: usize,
        width: usize,
        accumulate: bool,
    },
    /// `error[src] (+)= error[dst] · Wᵗ`
    BackpropEdge {
        dst_error: usize,
        weight: ParamSlot,
        rows: usize,
        cols: usize,
        src_error: usize,
        accumulate: bool,
    },
    /// `error ⊙= f'(z)`
    ApplyDerivative {
        kernel: DerivativeKernel,
        z: usize,
        error: usize,
        width: usize,
    },
    /// `grad[W] += outer(value[src], error[dst])`
    AccumulateWeightGrad {
        value: usize,
        error: usize,
        rows: usize,
        cols: usize,
        grad: usize,
    },
    /// `grad[b] += error`
    AccumulateBiasGrad {
        error: usize,
        grad: usize,
        width: usize,
    },
}

impl Instruction {
    /// Short mnemonic, for stats and tracing.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::LoadInput { .. } => "load",
            Instruction::MatMul { .. } => "matmul",
            Instruction::AddBias { .. } => "bias",
            Instruction::Activate { .. } => "act",
            Instruction::OutputError { .. } => "loss",
            Instruction::BackpropEdge { .. } => "backprop",
            Instruction::ApplyDerivative { .. } => "deriv",
            Instruction::AccumulateWeightGrad { .. } => "gradw",
            Instruction::AccumulateBiasGrad { .. } => "gradb",
        }
    }
}

/// The data region of one running kernel.
#[derive(Debug, Clone)]
pub(crate) struct DataRegion {
    pub value: Vec<f64>,
    pub z: Vec<f64>,
    pub error: Vec<f64>,
    pub pre: Vec<f64>,
    pub temp: Vec<f64>,
}

impl DataRegion {
    /// Value bank and scratch only.
    pub fn inference(layout: &MemoryLayout) -> Self {
        DataRegion {
            value: vec![0.0; layout.data_len()],
            z: Vec::new(),
            error: Vec::new(),
            pre: vec![0.0; layout.scratch_len()],
            temp: vec![0.0; layout.scratch_len()],
        }
    }

    /// All three banks.
    pub fn training(layout: &MemoryLayout) -> Self {
        DataRegion {
            value: vec![0.0; layout.data_len()],
            z: vec![0.0; layout.data_len()],
            error: vec![0.0; layout.data_len()],
            pre: vec![0.0; layout.scratch_len()],
            temp: vec![0.0; layout.scratch_len()],
        }
    }

    /// Grow to the training banks, keeping current values.
    pub fn ensure_training(&mut self, layout: &MemoryLayout) {
        if self.z.len() != layout.data_len() {
            self.z = vec![0.0; layout.data_len()];
            self.error = vec![0.0; layout.data_len()];
        }
    }
}

/// The non-parameter regions a tape reads and writes.
pub(crate) struct Frame<'a> {
    pub input: &'a [f64],
    pub target: &'a [f64],
    pub data: &'a mut DataRegion,
    pub grads: &'a mut [f64],
}

fn pre_slot<'a>(z: &'a mut [f64], scratch: &'a mut [f64], pre: PreAct, width: usize) -> &'a mut [f64] {
    match pre {
        PreAct::Scratch => &mut scratch[..width],
        PreAct::Retained(offset) => &mut z[offset..offset + width],
    }
}

/// Run `tape` once. Returns the loss accumulated by `OutputError`
/// instructions (0 for a forward-only tape).
pub(crate) fn execute<P: ParamView + ?Sized>(
    tape: &[Instruction],
    params: &P,
    frame: &mut Frame<'_>,
) -> f64 {
    let data = &mut *frame.data;
    let mut loss_total = 0.0;

    for instr in tape {
        match *instr {
            Instruction::LoadInput { src, pre, width } => {
                let out = pre_slot(&mut data.z, &mut data.pre, pre, width);
                kernels::vec_copy(&frame.input[src..src + width], width, out);
            }
            Instruction::MatMul {
                src,
                weight,
                rows,
                cols,
                pre,
                accumulate,
            } => {
                let u = &data.value[src..src + rows];
                let w = params.param(&weight);
                let out = pre_slot(&mut data.z, &mut data.pre, pre, cols);
                if accumulate {
                    kernels::vec_mat_mul(u, w, rows, cols, &mut data.temp);
                    kernels::vec_add_assign(out, &data.temp, cols);
                } else {
                    kernels::vec_mat_mul(u, w, rows, cols, out);
                }
            }
            Instruction::AddBias { bias, pre, width } => {
                let out = pre_slot(&mut data.z, &mut data.pre, pre, width);
                kernels::vec_add_assign(out, params.param(&bias), width);
            }
            Instruction::Activate {
                kernel,
                pre,
                dst,
                width,
            } => {
                let z = match pre {
                    PreAct::Scratch => &data.pre[..width],
                    PreAct::Retained(offset) => &data.z[offset..offset + width],
                };
                kernel.apply(z, width, &mut data.value[dst..dst + width]);
            }
            Instruction::OutputError {
                loss,
                value,
                target,
                error,
                width,
                accumulate,
            } => {
                let a = &data.value[value..value + width];
                let y = &frame.target[target..target + width];
                loss_total += loss.value(a, y, width);
                if accumulate {
                    loss.derivative(a, y, width, &mut data.temp);
                    kernels::vec_add_assign(&mut data.error[error..error + width], &data.temp, width);
                } else {
                    loss.derivative(a, y, width, &mut data.error[error..error + width]);
                }
            }
            Instruction::BackpropEdge {
                dst_error,
                weight,
                rows,
                cols,
                src_error,
                accumulate,
            } => {
                kernels::vec_mat_mul_transposed(
                    &data.error[dst_error..dst_error + cols],
                    params.param(&weight),
                    rows,
                    cols,
                    &mut data.temp,
                );
                let out = &mut data.error[src_error..src_error + rows];
                if accumulate {
                    kernels::vec_add_assign(out, &data.temp, rows);
                } else {
                    kernels::vec_copy(&data.temp, rows, out);
                }
            }
            Instruction::ApplyDerivative {
                kernel,
                z,
                error,
                width,
            } => {
                kernel.scale(
                    &data.z[z..z + width],
                    width,
                    &mut data.error[error..error + width],
                );
            }
            Instruction::AccumulateWeightGrad {
                value,
                error,
                rows,
                cols,
                grad,
            } => {
                kernels::outer_product_accumulate(
                    &data.value[value..value + rows],
                    &data.error[error..error + cols],
                    rows,
                    cols,
                    &mut frame.grads[grad..grad + rows * cols],
                );
            }
            Instruction::AccumulateBiasGrad { error, grad, width } => {
                kernels::vec_add_assign(
                    &mut frame.grads[grad..grad + width],
                    &data.error[error..error + width],
                    width,
                );
            }
        }
    }

    loss_total
}

// CompileStats

/// Statistics from compiling one graph.
#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    /// Number of execution sets.
    pub num_sets: usize,
    /// Instructions in the inference tape.
    pub forward_instructions: usize,
    /// Instructions in the training forward tape (0 if not compiled for training).
    pub training_forward_instructions: usize,
    /// Instructions in the per-sample backward tape.
    pub backward_instructions: usize,
    /// Total parameter elements.
    pub param_len: usize,
    /// Length of each data bank.
    pub data_len: usize,
    /// Optimizer region length.
    pub optimizer_len: usize,
    /// Compilation time in microseconds.
    pub compile_time_us: u64,
}

impl fmt::Display for CompileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledGraph: {} nodes, {} edges in {} sets; {} forward / {} training-forward / {} backward instructions; {} params, {} data, {} optimizer; compiled in {}μs",
            self.num_nodes,
            self.num_edges,
            self.num_sets,
            self.forward_instructions,
            self.training_forward_instructions,
            self.backward_instructions,
            self.param_len,
            self.data_len,
            self.optimizer_len,
            self.compile_time_us,
        )
    }
}
