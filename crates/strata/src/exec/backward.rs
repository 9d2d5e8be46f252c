// Backward compiler — per-sample reverse pass
//
// The tape is ordered by a work queue over the graph, run at compile time:
//
//   1. seed the queue with the sinks (output nodes without efferents)
//   2. pop a node N; all of its efferent successors are already finalized
//   3. emit N's instructions:
//        BackpropEdge per efferent       error[N] (+)= error[S] · Wᵗ
//        OutputError if N is an output   error[N] (+)= dL/da, loss += L
//        ApplyDerivative                 error[N] ⊙= f'(z[N])
//        AccumulateWeightGrad per afferent edge P → N
//        AccumulateBiasGrad if N has a bias
//   4. a predecessor is queued once its last efferent has been finalized
//
// An output node that also feeds other nodes receives both its loss term
// and the backpropagated term. Source nodes own no parameters upstream, so
// they only contribute their loss (if they are outputs).
//
// Every non-source node must have an activation with a derivative kernel.

use std::collections::VecDeque;

use tracing::debug;

use strata_core::error::{Error, Result};
use strata_core::graph::{Graph, NodeId};
use strata_core::layout::MemoryLayout;
use strata_nn::{ActivationKernel, LossKernel};

use super::program::Instruction;

/// Compile the per-sample backward tape of `graph`.
pub fn compile_backward(
    graph: &Graph,
    layout: &MemoryLayout,
    loss: LossKernel,
) -> Result<Vec<Instruction>> {
    // Resolve derivatives first so an unsupported activation fails before
    // anything is emitted.
    let mut derivatives = Vec::with_capacity(graph.num_nodes());
    for node in graph.nodes() {
        if graph.is_source(node.id) {
            derivatives.push(None);
            continue;
        }
        let kernel = ActivationKernel::resolve(&node.activation);
        let derivative = kernel.derivative().ok_or_else(|| Error::UnsupportedFunction {
            node: node.id,
            function: kernel.name().to_string(),
            reason: "activation has no derivative kernel; it cannot be trained through"
                .to_string(),
        })?;
        derivatives.push(Some(derivative));
    }

    let mut pending: Vec<usize> = (0..graph.num_nodes())
        .map(|i| layout.efferents(NodeId(i)).len())
        .collect();
    let mut queue: VecDeque<NodeId> = (0..graph.num_nodes())
        .map(NodeId)
        .filter(|&id| pending[id.0] == 0)
        .collect();

    let mut tape = Vec::new();
    let mut finalized = 0usize;

    while let Some(id) = queue.pop_front() {
        finalized += 1;
        let node = graph.node(id);
        let slot = layout.node(id);
        let width = slot.width;
        let efferents = layout.efferents(id);

        if derivatives[id.0].is_some() {
            for (i, &edge_id) in efferents.iter().enumerate() {
                let edge = layout.edge(edge_id);
                tape.push(Instruction::BackpropEdge {
                    dst_error: layout.node(edge.dst).data,
                    weight: edge.weight,
                    rows: edge.rows,
                    cols: edge.cols,
                    src_error: slot.data,
                    accumulate: i > 0,
                });
            }
        }

        if node.is_output {
            if let Some(target) = slot.target {
                tape.push(Instruction::OutputError {
                    loss,
                    value: slot.data,
                    target,
                    error: slot.data,
                    width,
                    accumulate: derivatives[id.0].is_some() && !efferents.is_empty(),
                });
            }
        }

        if let Some(derivative) = derivatives[id.0] {
            tape.push(Instruction::ApplyDerivative {
                kernel: derivative,
                z: slot.data,
                error: slot.data,
                width,
            });
            for &edge_id in layout.afferents(id) {
                let edge = layout.edge(edge_id);
                tape.push(Instruction::AccumulateWeightGrad {
                    value: layout.node(edge.src).data,
                    error: slot.data,
                    rows: edge.rows,
                    cols: edge.cols,
                    grad: edge.weight.flat,
                });
            }
            if let Some(bias) = slot.bias {
                tape.push(Instruction::AccumulateBiasGrad {
                    error: slot.data,
                    grad: bias.flat,
                    width,
                });
            }
        }

        for &edge_id in layout.afferents(id) {
            let src = layout.edge(edge_id).src;
            pending[src.0] -= 1;
            if pending[src.0] == 0 {
                queue.push_back(src);
            }
        }
    }

    // Unreachable for a graph that scheduled: acyclic with no dead nodes.
    if finalized != graph.num_nodes() {
        let node = pending
            .iter()
            .position(|&p| p > 0)
            .map_or(NodeId(0), NodeId);
        return Err(Error::CyclicGraph { node });
    }

    debug!(instructions = tape.len(), loss = ?loss.kind(), "compiled backward tape");
    Ok(tape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::graph::{Activation, GraphBuilder, NodeSpec};
    use strata_core::layout::{compile_layout, CopyPlacement};
    use strata_core::tensor::Tensor;
    use strata_nn::Loss;

    fn mnemonics(tape: &[Instruction]) -> Vec<&'static str> {
        tape.iter().map(|i| i.mnemonic()).collect()
    }

    #[test]
    fn test_chain_order() {
        let mut g = GraphBuilder::new();
        let x = g.add_node(NodeSpec::new("x", 2));
        let h = g.add_node(NodeSpec::new("h", 3).bias(Tensor::zeros(3)));
        let y = g.add_node(NodeSpec::new("y", 1).activation(Activation::logistic()).output());
        g.add_edge(x, h, Tensor::zeros((2, 3)));
        g.add_edge(h, y, Tensor::zeros((3, 1)));
        let graph = g.build().unwrap();
        let (layout, _) = compile_layout(&graph, &CopyPlacement, 0).unwrap();

        let tape = compile_backward(&graph, &layout, LossKernel::resolve(Loss::Mse)).unwrap();
        assert_eq!(
            mnemonics(&tape),
            vec![
                "loss", "deriv", "gradw", // y
                "backprop", "deriv", "gradw", "gradb", // h
            ]
        );
    }

    #[test]
    fn test_output_with_efferents_gets_both_terms() {
        // x → a (output) → b (output)
        let mut g = GraphBuilder::new();
        let x = g.add_node(NodeSpec::new("x", 1));
        let a = g.add_node(NodeSpec::new("a", 1).output());
        let b = g.add_node(NodeSpec::new("b", 1).output());
        g.add_edge(x, a, Tensor::zeros((1, 1)));
        g.add_edge(a, b, Tensor::zeros((1, 1)));
        let graph = g.build().unwrap();
        let (layout, _) = compile_layout(&graph, &CopyPlacement, 0).unwrap();
        let tape = compile_backward(&graph, &layout, LossKernel::resolve(Loss::Mse)).unwrap();

        assert_eq!(
            mnemonics(&tape),
            vec!["loss", "deriv", "gradw", "backprop", "loss", "deriv", "gradw"]
        );
        assert!(matches!(
            tape[4],
            Instruction::OutputError {
                accumulate: true,
                ..
            }
        ));
    }

    #[test]
    fn test_softmax_is_rejected() {
        let mut g = GraphBuilder::new();
        let x = g.add_node(NodeSpec::new("x", 2));
        let y = g.add_node(
            NodeSpec::new("y", 2)
                .activation(Activation::SoftMax { gain: 1.0 })
                .output(),
        );
        g.add_edge(x, y, Tensor::zeros((2, 2)));
        let graph = g.build().unwrap();
        let (layout, _) = compile_layout(&graph, &CopyPlacement, 0).unwrap();
        let err = compile_backward(&graph, &layout, LossKernel::resolve(Loss::Mse)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFunction { node, .. } if node == y));
    }
}
