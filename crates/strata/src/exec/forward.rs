// Forward compiler
//
// Emits, for every execution set in order and every node in it:
//
//   source node   LoadInput                     input slot → pre-activation
//   other nodes   MatMul per afferent edge      first writes, rest accumulate
//                 AddBias                       if the node has a bias
//   every node    Activate                      f(pre) → value slot
//
// The inference variant computes every pre-activation in one shared scratch
// vector. The training variant keeps each node's pre-activation in its own
// z slot, where the backward tape reads it to evaluate f'.

use tracing::debug;

use strata_core::error::Result;
use strata_core::graph::Graph;
use strata_core::layout::MemoryLayout;
use strata_nn::ActivationKernel;

use super::program::{Instruction, PreAct};

/// Which forward tape to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Pre-activations in shared scratch.
    Inference,
    /// Pre-activations retained per node.
    Training,
}

/// Compile the forward tape of `graph` over `layout`.
pub fn compile_forward(
    graph: &Graph,
    layout: &MemoryLayout,
    mode: ForwardMode,
) -> Result<Vec<Instruction>> {
    let schedule = graph.schedule()?;
    let mut tape = Vec::with_capacity(graph.num_nodes() * 2 + graph.num_edges());

    for id in schedule.node_order() {
        let node = graph.node(id);
        let slot = layout.node(id);
        let width = slot.width;
        let pre = match mode {
            ForwardMode::Inference => PreAct::Scratch,
            ForwardMode::Training => PreAct::Retained(slot.data),
        };

        if let Some(src) = slot.input {
            tape.push(Instruction::LoadInput { src, pre, width });
        } else {
            for (position, &edge_id) in layout.afferents(id).iter().enumerate() {
                let edge = layout.edge(edge_id);
                tape.push(Instruction::MatMul {
                    src: layout.node(edge.src).data,
                    weight: edge.weight,
                    rows: edge.rows,
                    cols: edge.cols,
                    pre,
                    accumulate: position > 0,
                });
            }
            if let Some(bias) = slot.bias {
                tape.push(Instruction::AddBias { bias, pre, width });
            }
        }

        tape.push(Instruction::Activate {
            kernel: ActivationKernel::resolve(&node.activation),
            pre,
            dst: slot.data,
            width,
        });
    }

    debug!(?mode, instructions = tape.len(), "compiled forward tape");
    Ok(tape)
}
