// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! While loop construction.
//!
//! A loop over `n` variables is assembled from `n` Enter, Merge, Switch,
//! NextIteration and Exit nodes plus one LoopCond:
//!
//! ```text
//!   input_i -> Enter_i -> Merge_i -> Switch_i --true--> body -> NextIteration_i
//!                           ^          |  ^                          |
//!                           |          |  +------ LoopCond <- cond   |
//!                           |        false                           |
//!                           |          v                             |
//!                           |        Exit_i                          |
//!                           +----------------------------------------+
//! ```
//!
//! The back edge NextIteration_i -> Merge_i is declared on the Merge before
//! its producer exists and is resolved with [`Graph::add_edge`] once the
//! body has been built.

use crate::graph::{
    to_output_tensors, Graph, GraphError, NodeId, Op, Output, Scope, WhileContext,
};
use crate::types::DType;

use super::control_flow::{self, next_iteration_named};
use super::NodeBuilder;

/// Values produced by [`build_while_loop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhileLoopOutputs {
    /// Exit values, one per loop variable, in input order.
    pub outputs: Vec<Output>,
    /// The LoopCond output: true while the loop keeps iterating.
    pub cond_output: Output,
}

/// Build a while loop over `inputs`.
///
/// `cond` receives the Merge outputs and returns the boolean continuation
/// predicate; `body` receives the Switch true-outputs and returns the
/// next-iteration values, one per loop variable. Both run in sub-scopes
/// (`cond`, `body`) whose control dependencies pin any constants they create
/// inside the loop frame.
///
/// When `create_while_ctx` is set, a [`WhileContext`] describing the loop is
/// registered on the graph and attached to every Exit node.
///
/// On error the nodes created so far stay in the graph; the caller should
/// abandon the build.
pub fn build_while_loop<C, B, E>(
    graph: &mut Graph,
    scope: &Scope,
    inputs: &[Output],
    mut cond: C,
    mut body: B,
    frame_name: &str,
    create_while_ctx: bool,
) -> Result<WhileLoopOutputs, E>
where
    C: FnMut(&mut Graph, &Scope, &[Output]) -> Result<Output, E>,
    B: FnMut(&mut Graph, &Scope, &[Output]) -> Result<Vec<Output>, E>,
    E: From<GraphError>,
{
    if inputs.is_empty() {
        return Err(GraphError::InvalidArgument(
            "BuildWhileLoop: 'inputs' must contain at least one loop variable".to_string(),
        )
        .into());
    }
    let n = inputs.len();
    log::debug!(
        "building while loop frame='{frame_name}' vars={n} scope='{}'",
        scope.name()
    );

    let mut enter_outputs = Vec::with_capacity(n);
    for input in inputs {
        enter_outputs.push(control_flow::enter(graph, scope, *input, frame_name)?);
    }

    let next_names: Vec<String> = (0..n)
        .map(|_| scope.unique_name_for_op(graph, Op::NextIteration.name()))
        .collect();

    let mut merge_outputs = Vec::with_capacity(n);
    for (entered, next_name) in enter_outputs.iter().zip(&next_names) {
        let dtype = graph.output_type(*entered)?.dtype;
        let name = scope.unique_name_for_op(graph, Op::Merge.name());
        let id = NodeBuilder::new(name, Op::Merge)
            .input(*entered)
            .deferred_input(next_name.clone(), 0, dtype)
            .finalize(graph)?;
        merge_outputs.push(Output::new(id, 0));
    }

    let cond_scope = scope
        .new_sub_scope("cond")
        .with_control_dependencies(&merge_outputs[..1]);
    let raw_cond = cond(graph, &cond_scope, &merge_outputs)?;
    let cond_dtype = graph.output_type(raw_cond)?.dtype;
    if cond_dtype != DType::Bool {
        return Err(GraphError::InvalidArgument(format!(
            "BuildWhileLoop: 'cond' argument must return a boolean output, got {cond_dtype}"
        ))
        .into());
    }
    let cond_output = control_flow::loop_cond(graph, scope, raw_cond)?;

    let mut switch_trues = Vec::with_capacity(n);
    let mut switch_falses = Vec::with_capacity(n);
    for merged in &merge_outputs {
        let switched = control_flow::switch(graph, scope, *merged, cond_output)?;
        switch_trues.push(switched.output_true);
        switch_falses.push(switched.output_false);
    }

    let body_scope = scope
        .new_sub_scope("body")
        .with_control_dependencies(&switch_trues[..1]);
    let body_outputs = body(graph, &body_scope, &switch_trues)?;
    if body_outputs.len() != n {
        return Err(GraphError::InvalidArgument(format!(
            "BuildWhileLoop: 'body' argument expected to return {n} outputs, got {}",
            body_outputs.len()
        ))
        .into());
    }

    let mut next_outputs = Vec::with_capacity(n);
    for (value, reserved) in body_outputs.iter().zip(&next_names) {
        let next = next_iteration_named(graph, reserved, *value)?;
        // A mismatch would leave the Merge pointing at some other node.
        assert_eq!(
            &graph.node(next.node)?.name,
            reserved,
            "NextIteration was not bound to its reserved name"
        );
        next_outputs.push(next);
    }

    for (next, merged) in next_outputs.iter().zip(&merge_outputs) {
        graph.add_edge(*next, merged.node, 1)?;
    }

    let mut outputs = Vec::with_capacity(n);
    for value in &switch_falses {
        outputs.push(control_flow::exit(graph, scope, *value)?);
    }

    if create_while_ctx {
        let nodes = |outs: &[Output]| outs.iter().map(|o| o.node).collect::<Vec<NodeId>>();
        let ctx = WhileContext::new(
            frame_name,
            nodes(&enter_outputs),
            nodes(&outputs),
            cond_output.into(),
            to_output_tensors(&switch_trues),
            to_output_tensors(&body_outputs),
        )?;
        let id = graph.add_while_context(ctx)?;
        for exit in &outputs {
            graph.set_while_ctx(exit.node, id)?;
        }
    }

    Ok(WhileLoopOutputs {
        outputs,
        cond_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{verify_graph, NodeInput};
    use crate::ops::{add, const_f32, const_i32, less};

    fn count_to_five(graph: &mut Graph, scope: &Scope) -> Result<WhileLoopOutputs, GraphError> {
        let zero = const_i32(graph, &Scope::root(), 0)?;
        build_while_loop(
            graph,
            scope,
            &[zero],
            |g: &mut Graph, s: &Scope, xs: &[Output]| {
                let five = const_i32(g, s, 5)?;
                less(g, s, xs[0], five)
            },
            |g: &mut Graph, s: &Scope, xs: &[Output]| {
                let one = const_i32(g, s, 1)?;
                Ok(vec![add(g, s, xs[0], one)?])
            },
            "count",
            true,
        )
    }

    #[test]
    fn builds_well_formed_loop() {
        let mut graph = Graph::new();
        let scope = Scope::root().new_sub_scope("loop");
        let out = count_to_five(&mut graph, &scope).unwrap();
        verify_graph(&graph).unwrap();

        assert_eq!(out.outputs.len(), 1);
        let exit = graph.node(out.outputs[0].node).unwrap();
        assert!(matches!(exit.op, Op::Exit));
        assert_eq!(exit.name, "loop/Exit");
        assert!(matches!(graph.node(out.cond_output.node).unwrap().op, Op::LoopCond));
    }

    #[test]
    fn merge_inputs_are_enter_then_next_iteration() {
        let mut graph = Graph::new();
        let scope = Scope::root().new_sub_scope("loop");
        count_to_five(&mut graph, &scope).unwrap();

        let merge = graph.node_by_name("loop/Merge").unwrap();
        assert_eq!(merge.inputs.len(), 2);
        let first = graph.node(merge.input(0).unwrap().node).unwrap();
        let second = graph.node(merge.input(1).unwrap().node).unwrap();
        assert!(matches!(first.op, Op::Enter { .. }));
        assert!(matches!(second.op, Op::NextIteration));
        assert_eq!(second.name, "loop/NextIteration");
        assert!(merge.inputs.iter().all(|i| matches!(i, NodeInput::Edge(_))));
    }

    #[test]
    fn cond_and_body_nodes_carry_control_dependencies() {
        let mut graph = Graph::new();
        let scope = Scope::root().new_sub_scope("loop");
        count_to_five(&mut graph, &scope).unwrap();

        let merge = graph.node_by_name("loop/Merge").unwrap().id;
        let switch = graph.node_by_name("loop/Switch").unwrap().id;
        let cond_const = graph.node_by_name("loop/cond/Const").unwrap();
        let body_const = graph.node_by_name("loop/body/Const").unwrap();
        assert_eq!(cond_const.control_inputs, vec![Output::new(merge, 0)]);
        assert_eq!(body_const.control_inputs, vec![Output::new(switch, 1)]);
    }

    #[test]
    fn context_is_attached_to_every_exit() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_i32(&mut graph, &root, 0).unwrap();
        let b = const_f32(&mut graph, &root, 1.0).unwrap();
        let out = build_while_loop(
            &mut graph,
            &root,
            &[a, b],
            |g: &mut Graph, s: &Scope, xs: &[Output]| {
                let three = const_i32(g, s, 3)?;
                less(g, s, xs[0], three)
            },
            |_: &mut Graph, _: &Scope, xs: &[Output]| Ok::<_, GraphError>(xs.to_vec()),
            "pair",
            true,
        )
        .unwrap();

        let (id, ctx) = graph.while_context_for(out.outputs[1]).unwrap();
        assert_eq!(ctx.frame_name(), "pair");
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.cond_output(), out.cond_output.into());
        assert_eq!(graph.node(out.outputs[0].node).unwrap().while_ctx, Some(id));
        assert_eq!(ctx.body_outputs(), ctx.body_inputs());
        // Reserved names follow the first-unsuffixed convention.
        assert!(graph.node_by_name("NextIteration").is_some());
        assert!(graph.node_by_name("NextIteration_1").is_some());
    }

    #[test]
    fn without_context_exits_are_unannotated() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let zero = const_i32(&mut graph, &root, 0).unwrap();
        let out = build_while_loop(
            &mut graph,
            &root,
            &[zero],
            |g: &mut Graph, s: &Scope, xs: &[Output]| {
                let one = const_i32(g, s, 1)?;
                less(g, s, xs[0], one)
            },
            |_: &mut Graph, _: &Scope, xs: &[Output]| Ok::<_, GraphError>(xs.to_vec()),
            "plain",
            false,
        )
        .unwrap();
        assert!(graph.while_context_for(out.outputs[0]).is_none());
        assert!(graph.while_contexts().is_empty());
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut graph = Graph::new();
        let err = build_while_loop(
            &mut graph,
            &Scope::root(),
            &[],
            |g: &mut Graph, s: &Scope, _: &[Output]| crate::ops::const_bool(g, s, false),
            |_: &mut Graph, _: &Scope, xs: &[Output]| Ok::<_, GraphError>(xs.to_vec()),
            "empty",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
        assert!(graph.is_empty());
    }
}
