// Integration tests for compiled forward kernels
//
// These tests build small graphs by hand, compile them, and check node
// values, ownership semantics and the errors raised at compile/setup time.

use strata::nn::init;
use strata::optim::AdamConfig;
use strata::prelude::*;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_close(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// x(2) → h(3, Linear slope 2, biased) → y(1, Logistic)
fn two_layer() -> (Graph, NodeId, NodeId, NodeId) {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 2));
    let h = g.add_node(
        NodeSpec::new("h", 3)
            .activation(Activation::Linear {
                slope: 2.0,
                intercept: 0.0,
            })
            .bias(Tensor::vector(&[0.1, -0.2, 0.0])),
    );
    let y = g.add_node(NodeSpec::new("y", 1).activation(Activation::logistic()).output());
    g.add_edge(
        x,
        h,
        Tensor::matrix(&[&[0.1, 0.2, 0.3], &[0.4, 0.5, 0.6]]).unwrap(),
    );
    g.add_edge(h, y, Tensor::matrix(&[&[1.0], &[-1.0], &[0.5]]).unwrap());
    (g.build().unwrap(), x, h, y)
}

// Forward values

#[test]
fn test_forward_two_layer() -> strata::Result<()> {
    let (graph, x, h, y) = two_layer();
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let result = compiled.forward(&Sample::new().input(x, vec![1.0, 2.0]))?;

    // x·W1 = [0.9, 1.2, 1.5], + b = [1.0, 1.0, 1.5], ×2 = [2, 2, 3]
    assert_close(compiled.value(h)?, &[2.0, 2.0, 3.0], 1e-12);
    // [2, 2, 3]·W2 = 1.5
    let expected = sigmoid(1.5);
    assert_close(compiled.value(y)?, &[expected], 1e-12);
    assert_close(result.get("y").unwrap(), &[expected], 1e-12);
    assert_close(result.output().unwrap(), &[expected], 1e-12);
    // source nodes pass their input through their (identity) activation
    assert_close(compiled.value(x)?, &[1.0, 2.0], 1e-15);
    Ok(())
}

#[test]
fn test_multiple_afferents_accumulate() -> strata::Result<()> {
    let mut g = GraphBuilder::new();
    let a = g.add_node(NodeSpec::new("a", 1));
    let b = g.add_node(NodeSpec::new("b", 2));
    let c = g.add_node(NodeSpec::new("c", 2).output());
    g.add_edge(a, c, Tensor::matrix(&[&[1.0, 2.0]])?);
    g.add_edge(b, c, Tensor::matrix(&[&[1.0, 0.0], &[0.0, -1.0]])?);
    let graph = g.build()?;

    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    compiled.forward(&Sample::new().input(a, vec![3.0]).input(b, vec![5.0, 7.0]))?;
    // [3, 6] + [5, -7]
    assert_close(compiled.value(c)?, &[8.0, -1.0], 1e-12);
    Ok(())
}

#[test]
fn test_skip_connection() -> strata::Result<()> {
    // x → h → y and x → y
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 1));
    let h = g.add_node(NodeSpec::new("h", 1).activation(Activation::relu()));
    let y = g.add_node(NodeSpec::new("y", 1).output());
    g.add_edge(x, h, Tensor::matrix(&[&[-1.0]])?);
    g.add_edge(h, y, Tensor::matrix(&[&[10.0]])?);
    g.add_edge(x, y, Tensor::matrix(&[&[1.0]])?);
    let graph = g.build()?;
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;

    compiled.forward(&Sample::new().input(x, vec![2.0]))?;
    assert_close(compiled.value(y)?, &[2.0], 1e-12);
    compiled.forward(&Sample::new().input(x, vec![-2.0]))?;
    assert_close(compiled.value(y)?, &[18.0], 1e-12);
    Ok(())
}

#[test]
fn test_softmax_forward() -> strata::Result<()> {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 3));
    let y = g.add_node(
        NodeSpec::new("y", 3)
            .activation(Activation::SoftMax { gain: 1.0 })
            .output(),
    );
    g.add_edge(x, y, Tensor::matrix(&[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0]])?);
    let graph = g.build()?;
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let out = compiled.forward(&Sample::new().input(x, vec![1.0, 2.0, 3.0]))?;
    let y = out.get("y").unwrap();
    assert!(approx_eq(y.iter().sum::<f64>(), 1.0, 1e-12));
    assert!(y[0] < y[1] && y[1] < y[2]);
    Ok(())
}

#[test]
fn test_forward_is_idempotent() -> strata::Result<()> {
    let (graph, x, _, _) = two_layer();
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let sample = Sample::new().input(x, vec![0.3, -0.9]);
    let first = compiled.forward(&sample)?;
    compiled.forward(&Sample::new().input(x, vec![5.0, 5.0]))?;
    let second = compiled.forward(&sample)?;
    // bit-identical
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_evaluate_many_matches_forward() -> strata::Result<()> {
    let (graph, x, _, _) = two_layer();
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let samples: Vec<Sample> = (0..16)
        .map(|i| Sample::new().input(x, vec![i as f64 * 0.1, 1.0 - i as f64 * 0.05]))
        .collect();
    let parallel = compiled.evaluate_many(&samples)?;
    assert_eq!(parallel.len(), samples.len());
    for (sample, result) in samples.iter().zip(&parallel) {
        assert_eq!(&compiled.forward(sample)?, result);
    }
    Ok(())
}

#[test]
fn test_evaluate_many_validates_every_sample() {
    let (graph, x, _, _) = two_layer();
    let compiled = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap();
    let samples = vec![
        Sample::new().input(x, vec![0.0, 0.0]),
        Sample::new().input(x, vec![0.0]),
    ];
    assert!(matches!(
        compiled.evaluate_many(&samples),
        Err(Error::InputWidthMismatch { .. })
    ));
}

// Ownership

#[test]
fn test_copy_and_reference_forward_agree() -> strata::Result<()> {
    let (graph, x, _, y) = two_layer();
    let mut copy = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let mut reference = CompiledGraph::compile(
        &graph,
        &CompileOptions::default().with_ownership(WeightOwnership::Reference),
    )?;
    assert_eq!(copy.ownership(), WeightOwnership::Copy);
    assert_eq!(reference.ownership(), WeightOwnership::Reference);

    let sample = Sample::new().input(x, vec![-0.4, 0.8]);
    copy.forward(&sample)?;
    reference.forward(&sample)?;
    assert_eq!(copy.value(y)?, reference.value(y)?);
    Ok(())
}

#[test]
fn test_reference_sees_host_edits() -> strata::Result<()> {
    let (graph, x, h, y) = two_layer();
    let mut copy = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let mut reference = CompiledGraph::compile(
        &graph,
        &CompileOptions::default().with_ownership(WeightOwnership::Reference),
    )?;
    let sample = Sample::new().input(x, vec![1.0, 2.0]);

    // zero the h → y weights on the host
    let w2 = &graph.edge(graph.afferents(y)[0]).weight;
    w2.assign(&[0.0, 0.0, 0.0])?;

    reference.forward(&sample)?;
    assert_close(reference.value(y)?, &[0.5], 1e-12);

    // the copy keeps its compiled values until reloaded
    copy.forward(&sample)?;
    assert_close(copy.value(y)?, &[sigmoid(1.5)], 1e-12);
    copy.reload_from_host()?;
    copy.forward(&sample)?;
    assert_close(copy.value(y)?, &[0.5], 1e-12);

    // h did not depend on w2
    assert_close(copy.value(h)?, reference.value(h)?, 1e-15);
    Ok(())
}

#[test]
fn test_host_writes_keep_compiled_offsets_valid() -> strata::Result<()> {
    let (graph, x, _, y) = two_layer();
    let mut reference = CompiledGraph::compile(
        &graph,
        &CompileOptions::default().with_ownership(WeightOwnership::Reference),
    )?;
    let mut copy = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    let sample = Sample::new().input(x, vec![1.0, 2.0]);

    // the host may rewrite elements, but never resize the storage
    let w2 = &graph.edge(graph.afferents(y)[0]).weight;
    w2.write()?.fill(0.0);
    assert_eq!(w2.read()?.len(), 3);

    reference.forward(&sample)?;
    assert_close(reference.value(y)?, &[0.5], 1e-12);
    copy.reload_from_host()?;
    copy.forward(&sample)?;
    assert_close(copy.value(y)?, &[0.5], 1e-12);
    Ok(())
}

#[test]
fn test_zero_width_node_rejected() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 2));
    let h = g.add_node(NodeSpec::new("h", 0).bias(Tensor::vector(&[])));
    let y = g.add_node(NodeSpec::new("y", 1).output());
    g.add_edge(x, h, Tensor::zeros((2, 0)));
    g.add_edge(h, y, Tensor::zeros((0, 1)));
    let err = g.build().unwrap_err();
    assert!(matches!(err, Error::ZeroWidthNode { node, .. } if node == h));
}

#[test]
fn test_parameter_accessors() -> strata::Result<()> {
    let (graph, _, h, y) = two_layer();
    let compiled = CompiledGraph::compile(&graph, &CompileOptions::default())?;
    assert_eq!(compiled.weight(EdgeId(1))?, vec![1.0, -1.0, 0.5]);
    assert_eq!(compiled.bias(h)?, Some(vec![0.1, -0.2, 0.0]));
    assert_eq!(compiled.bias(y)?, None);
    assert!(compiled.weight(EdgeId(7)).is_err());
    // weights in edge order, then biases
    let params = compiled.params()?;
    assert_eq!(params.len(), 3);
    assert_eq!(params[2].1, vec![0.1, -0.2, 0.0]);
    Ok(())
}

// Compile statistics

#[test]
fn test_compile_stats() -> strata::Result<()> {
    let (graph, _, _, _) = two_layer();
    let compiled = CompiledGraph::compile_training(&graph, &CompileOptions::default())?;
    let stats = compiled.stats();
    assert_eq!(stats.num_nodes, 3);
    assert_eq!(stats.num_edges, 2);
    assert_eq!(stats.num_sets, 3);
    // load+act, matmul+bias+act, matmul+act
    assert_eq!(stats.forward_instructions, 7);
    assert_eq!(stats.training_forward_instructions, 7);
    assert_eq!(stats.param_len, 6 + 3 + 3);
    assert_eq!(stats.data_len, 6);
    assert_eq!(stats.optimizer_len, 0);
    let text = stats.to_string();
    assert!(text.contains("3 nodes"));
    assert!(text.contains("7 forward"));
    Ok(())
}

// Errors raised at compile/setup time

#[test]
fn test_cyclic_graph_fails_to_compile() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 1));
    let a = g.add_node(NodeSpec::new("a", 1));
    let b = g.add_node(NodeSpec::new("b", 1).output());
    g.add_edge(x, a, Tensor::zeros((1, 1)));
    g.add_edge(a, b, Tensor::zeros((1, 1)));
    g.add_edge(b, a, Tensor::zeros((1, 1)));
    let graph = g.build().unwrap();
    let err = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::CyclicGraph { node } if node == a || node == b));
    assert!(err.is_topology());
}

#[test]
fn test_dead_node_fails_to_compile() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 1));
    let dead = g.add_node(NodeSpec::new("dead", 1));
    let y = g.add_node(NodeSpec::new("y", 1).output());
    g.add_edge(x, dead, Tensor::zeros((1, 1)));
    g.add_edge(x, y, Tensor::zeros((1, 1)));
    let graph = g.build().unwrap();
    let err = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::DeadNode { node, .. } if node == dead));
}

#[test]
fn test_duplicate_edge_rejected_at_build() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 1));
    let y = g.add_node(NodeSpec::new("y", 1).output());
    g.add_edge(x, y, Tensor::zeros((1, 1)));
    g.add_edge(x, y, Tensor::zeros((1, 1)));
    assert!(matches!(g.build(), Err(Error::DuplicateEdge { .. })));
}

#[test]
fn test_edge_shape_mismatch_names_edge() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 2));
    let y = g.add_node(NodeSpec::new("y", 3).output());
    let e = g.add_edge(x, y, Tensor::zeros((3, 2)));
    let graph = g.build().unwrap();
    let err = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::EdgeShapeMismatch { edge, .. } if edge == e));
}

#[test]
fn test_bias_shape_mismatch() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 2));
    let y = g.add_node(NodeSpec::new("y", 3).output().bias(Tensor::zeros(2)));
    g.add_edge(x, y, Tensor::zeros((2, 3)));
    let graph = g.build().unwrap();
    let err = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::BiasShapeMismatch { node, .. } if node == y));
}

#[test]
fn test_softmax_rejected_for_training_only() {
    let mut g = GraphBuilder::new();
    let x = g.add_node(NodeSpec::new("x", 2));
    let y = g.add_node(
        NodeSpec::new("y", 2)
            .activation(Activation::SoftMax { gain: 1.0 })
            .output(),
    );
    g.add_edge(x, y, Tensor::zeros((2, 2)));
    let graph = g.build().unwrap();
    assert!(CompiledGraph::compile(&graph, &CompileOptions::default()).is_ok());
    let err = CompiledGraph::compile_training(&graph, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFunction { node, .. } if node == y));
}

#[test]
fn test_invalid_hyperparameters_rejected_at_compile() {
    let (graph, _, _, _) = two_layer();
    let bad_adam = CompileOptions::default()
        .with_optimizer(OptimizerConfig::Adam(AdamConfig::default().with_betas(1.5, 0.9)));
    let err = CompiledGraph::compile_training(&graph, &bad_adam).unwrap_err();
    assert!(matches!(err, Error::InvalidHyperparameter { name: "beta1", .. }));
    assert!(err.is_configuration());

    let bad_sgd = CompileOptions::default().with_optimizer(OptimizerConfig::sgd(0.0));
    assert!(CompiledGraph::compile_training(&graph, &bad_sgd).is_err());
    // the forward kernel does not use the optimizer
    assert!(CompiledGraph::compile(&graph, &bad_sgd).is_ok());
}

#[test]
fn test_shared_tensor_rejected_in_both_modes() {
    let shared = init::constant((1, 1), 1.0);
    let mut g = GraphBuilder::new();
    let a = g.add_node(NodeSpec::new("a", 1));
    let b = g.add_node(NodeSpec::new("b", 1));
    let c = g.add_node(NodeSpec::new("c", 1).output());
    g.add_edge(a, b, shared.clone());
    g.add_edge(b, c, shared);
    let graph = g.build().unwrap();
    for ownership in [WeightOwnership::Copy, WeightOwnership::Reference] {
        let options = CompileOptions::default().with_ownership(ownership);
        assert!(CompiledGraph::compile(&graph, &options).is_err());
    }
}

#[test]
fn test_forward_input_errors() {
    let (graph, x, h, _) = two_layer();
    let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap();
    assert!(matches!(
        compiled.forward(&Sample::new()),
        Err(Error::MissingInput { node }) if node == x
    ));
    assert!(matches!(
        compiled.forward(&Sample::new().input(x, vec![1.0, 2.0]).input(h, vec![0.0; 3])),
        Err(Error::UnexpectedInput { node }) if node == h
    ));
    assert!(matches!(
        compiled.forward(&Sample::new().input(x, vec![1.0, 2.0, 3.0])),
        Err(Error::InputWidthMismatch {
            expected: 2,
            got: 3,
            ..
        })
    ));
}

// Properties over random inputs

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn input() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(-10.0f64..10.0, 2)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ownership_modes_agree(values in input()) {
            let (graph, x, _, _) = two_layer();
            let mut copy = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap();
            let mut reference = CompiledGraph::compile(
                &graph,
                &CompileOptions::default().with_ownership(WeightOwnership::Reference),
            )
            .unwrap();
            let sample = Sample::new().input(x, values);
            prop_assert_eq!(copy.forward(&sample).unwrap(), reference.forward(&sample).unwrap());
        }

        #[test]
        fn prop_logistic_output_in_unit_interval(values in input()) {
            let (graph, x, _, y) = two_layer();
            let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap();
            compiled.forward(&Sample::new().input(x, values)).unwrap();
            let out = compiled.value(y).unwrap()[0];
            prop_assert!((0.0..=1.0).contains(&out));
        }

        #[test]
        fn prop_parallel_matches_sequential(batch in prop::collection::vec(input(), 1..12)) {
            let (graph, x, _, _) = two_layer();
            let mut compiled = CompiledGraph::compile(&graph, &CompileOptions::default()).unwrap();
            let samples: Vec<Sample> = batch
                .into_iter()
                .map(|v| Sample::new().input(x, v))
                .collect();
            let parallel = compiled.evaluate_many(&samples).unwrap();
            for (sample, result) in samples.iter().zip(parallel) {
                prop_assert_eq!(compiled.forward(sample).unwrap(), result);
            }
        }
    }
}
