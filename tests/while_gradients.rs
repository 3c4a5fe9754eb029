#![cfg(feature = "autodiff")]

use mind_loops::autodiff::{
    add_backprop_loop_counter, add_forward_loop_counter, add_symbolic_gradients,
    add_while_gradient_loop, add_while_loop_gradient, AutodiffError,
};
use mind_loops::eval::Executor;
use mind_loops::graph::{verify_graph, Graph, GraphError, Op, Output, Scope, WhileContextId};
use mind_loops::ops::{self, build_while_loop};

/// `i = 0; x = x0; while i < iterations: i += 1; x *= factor`.
fn scaling_loop(
    graph: &mut Graph,
    iterations: i64,
    factor: f64,
) -> (Vec<Output>, WhileContextId) {
    let root = Scope::root();
    let i0 = ops::const_i32(graph, &root, 0).unwrap();
    let x0 = ops::const_f32(graph, &root, 1.0).unwrap();
    let out = build_while_loop::<_, _, GraphError>(
        graph,
        &root.new_sub_scope("forward"),
        &[i0, x0],
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let limit = ops::const_i32(g, s, iterations)?;
            ops::less(g, s, xs[0], limit)
        },
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let one = ops::const_i32(g, s, 1)?;
            let f = ops::const_f32(g, s, factor)?;
            Ok(vec![ops::add(g, s, xs[0], one)?, ops::mul(g, s, xs[1], f)?])
        },
        "forward",
        true,
    )
    .unwrap();
    let (id, _) = graph.while_context_for(out.outputs[0]).unwrap();
    (out.outputs, id)
}

fn seeds(graph: &mut Graph) -> [Output; 2] {
    let root = Scope::root();
    [
        ops::const_i32(graph, &root, 0).unwrap(),
        ops::const_f32(graph, &root, 1.0).unwrap(),
    ]
}

#[test]
fn forward_counter_counts_seven_iterations() {
    let mut graph = Graph::new();
    let (outputs, id) = scaling_loop(&mut graph, 7, 2.0);
    let count = add_forward_loop_counter(&mut graph, id, &Scope::root().new_sub_scope("grad"))
        .unwrap();
    verify_graph(&graph).unwrap();

    let values = Executor::new(&graph).run(&[count, outputs[1]]).unwrap();
    assert_eq!(values[0].as_i64(), Some(7));
    assert_eq!(values[1].as_f64(), Some(128.0));
}

#[test]
fn backprop_counter_runs_seven_live_iterations() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 7, 2.0);
    let scope = Scope::root().new_sub_scope("grad");
    let count = add_forward_loop_counter(&mut graph, id, &scope).unwrap();
    let pred = add_backprop_loop_counter(&mut graph, id, count, &scope).unwrap();

    let mut exec = Executor::new(&graph);
    exec.run(&[count]).unwrap();
    let flags: Vec<Option<bool>> = exec
        .trace()
        .iteration_values(pred)
        .into_iter()
        .map(|v| v.and_then(|t| t.as_bool()))
        .collect();
    let mut expected = vec![Some(true); 7];
    expected.push(Some(false));
    assert_eq!(flags, expected);
}

#[test]
fn backprop_counter_on_an_idle_loop_is_false_at_once() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 0, 2.0);
    let scope = Scope::root().new_sub_scope("grad");
    let count = add_forward_loop_counter(&mut graph, id, &scope).unwrap();
    let pred = add_backprop_loop_counter(&mut graph, id, count, &scope).unwrap();

    let mut exec = Executor::new(&graph);
    let values = exec.run(&[count]).unwrap();
    assert_eq!(values[0].as_i64(), Some(0));
    let flags: Vec<Option<bool>> = exec
        .trace()
        .iteration_values(pred)
        .into_iter()
        .map(|v| v.and_then(|t| t.as_bool()))
        .collect();
    assert_eq!(flags, vec![Some(false)]);
}

#[test]
fn gradient_of_repeated_doubling_is_power_of_two() {
    for m in [1i64, 3, 5] {
        let mut graph = Graph::new();
        let (outputs, id) = scaling_loop(&mut graph, m, 2.0);
        let grad_inputs = seeds(&mut graph);
        let grads = add_while_loop_gradient(&mut graph, id, &grad_inputs, &Scope::root()).unwrap();
        assert_eq!(grads.len(), 2);
        verify_graph(&graph).unwrap();

        let values = Executor::new(&graph)
            .run(&[outputs[1], grads[1]])
            .unwrap();
        let expected = 2f64.powi(m as i32);
        assert_eq!(values[0].as_f64(), Some(expected), "x after {m} iterations");
        assert_eq!(values[1].as_f64(), Some(expected), "dx/dx0 after {m} iterations");
    }
}

#[test]
fn gradient_respects_the_scaling_factor() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 4, 0.5);
    let grad_inputs = seeds(&mut graph);
    let grads = add_while_loop_gradient(&mut graph, id, &grad_inputs, &Scope::root()).unwrap();

    let values = Executor::new(&graph).run(&grads).unwrap();
    assert_eq!(values[0].as_i64(), Some(0));
    assert_eq!(values[1].as_f64(), Some(0.0625));
}

#[test]
fn gradient_of_idle_loop_passes_seed_through() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 0, 2.0);
    let grad_inputs = seeds(&mut graph);
    let grads = add_while_loop_gradient(&mut graph, id, &grad_inputs, &Scope::root()).unwrap();

    let values = Executor::new(&graph).run(&grads).unwrap();
    assert_eq!(values[1].as_f64(), Some(1.0));
}

#[test]
fn derived_loops_share_the_forward_frame() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 2, 2.0);
    let grad_inputs = seeds(&mut graph);
    add_while_loop_gradient(&mut graph, id, &grad_inputs, &Scope::root()).unwrap();

    let enters: Vec<(&str, &str)> = graph
        .nodes()
        .iter()
        .filter_map(|n| match &n.op {
            Op::Enter { frame_name } => Some((n.name.as_str(), frame_name.as_str())),
            _ => None,
        })
        .collect();
    // Forward loop, forward counter, backprop counter and gradient loop.
    assert_eq!(enters.len(), 2 + 1 + 1 + 2);
    assert!(enters.iter().all(|(_, frame)| *frame == "forward"), "{enters:?}");
    assert!(enters
        .iter()
        .filter(|(name, _)| !name.starts_with("forward/"))
        .all(|(name, _)| name.starts_with("while_grad/")));
    assert_eq!(graph.while_contexts().len(), 1);
}

#[test]
fn gradient_loop_rejects_mismatched_seed_count() {
    let mut graph = Graph::new();
    let (_, id) = scaling_loop(&mut graph, 2, 2.0);
    let root = Scope::root();
    let gx = ops::const_f32(&mut graph, &root, 1.0).unwrap();
    let pred = ops::const_bool(&mut graph, &root, false).unwrap();

    let err = add_while_gradient_loop(&mut graph, id, &[gx, gx, gx], pred, &root).unwrap_err();
    assert!(
        matches!(&err, AutodiffError::Graph(GraphError::InvalidArgument(msg)) if msg.contains("got 3")),
        "{err}"
    );
}

#[test]
fn symbolic_gradients_reject_loops_in_the_region() {
    let mut graph = Graph::new();
    let root = Scope::root();
    let x = ops::const_f32(&mut graph, &root, 1.0).unwrap();
    let out = build_while_loop::<_, _, GraphError>(
        &mut graph,
        &root.new_sub_scope("inner"),
        &[x],
        |g: &mut Graph, s: &Scope, _: &[Output]| ops::const_bool(g, s, false),
        |_: &mut Graph, _: &Scope, xs: &[Output]| Ok(xs.to_vec()),
        "inner",
        false,
    )
    .unwrap();
    let seed = ops::const_f32(&mut graph, &root, 1.0).unwrap();

    let err = add_symbolic_gradients(&mut graph, &root, &out.outputs, &[x], &[seed]).unwrap_err();
    assert!(matches!(err, AutodiffError::UnsupportedOp { .. }), "{err}");
}
