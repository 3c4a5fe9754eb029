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

//! Gradients of while loops.
//!
//! The gradient of a recorded loop is three more loops built with
//! [`build_while_loop`], all in the forward loop's frame so that they run
//! iteration for iteration alongside it:
//!
//! 1. a forward counter driven by the original predicate,
//! 2. a backprop counter running from that count down to zero,
//! 3. the gradient loop, driven by the backprop counter's predicate, whose
//!    body is the symbolic gradient of the original body.

use crate::graph::{to_outputs, Graph, GraphError, Output, Scope, WhileContextId};
use crate::ops::{self, build_while_loop};

use super::engine::{GraphGradients, SymbolicGradients};
use super::AutodiffError;

/// Count the iterations of the loop recorded in `while_ctx`.
///
/// Builds `i = 0; while <original predicate>: i += 1` and returns the exit
/// value of `i`.
pub fn add_forward_loop_counter(
    graph: &mut Graph,
    while_ctx: WhileContextId,
    scope: &Scope,
) -> Result<Output, GraphError> {
    let ctx = graph.while_context(while_ctx)?;
    let frame_name = ctx.frame_name().to_string();
    let pred: Output = ctx.cond_output().into();

    let zero = ops::const_i32(graph, scope, 0)?;
    let counter = build_while_loop::<_, _, GraphError>(
        graph,
        scope,
        &[zero],
        |_: &mut Graph, _: &Scope, _: &[Output]| Ok(pred),
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let one = ops::const_i32(g, s, 1)?;
            Ok(vec![ops::add(g, s, xs[0], one)?])
        },
        &frame_name,
        false,
    )?;
    Ok(counter.outputs[0])
}

/// Count down from `n` in the frame of `while_ctx`.
///
/// Returns the countdown's LoopCond output: true while backprop iterations
/// remain.
pub fn add_backprop_loop_counter(
    graph: &mut Graph,
    while_ctx: WhileContextId,
    n: Output,
    scope: &Scope,
) -> Result<Output, GraphError> {
    let frame_name = graph.while_context(while_ctx)?.frame_name().to_string();

    let countdown = build_while_loop::<_, _, GraphError>(
        graph,
        scope,
        &[n],
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let zero = ops::scalar_like(g, s, xs[0], 0.0)?;
            ops::greater(g, s, xs[0], zero)
        },
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let one = ops::scalar_like(g, s, xs[0], 1.0)?;
            Ok(vec![ops::sub(g, s, xs[0], one)?])
        },
        &frame_name,
        false,
    )?;
    Ok(countdown.cond_output)
}

/// Thread `grad_inputs` backwards through the body of the loop recorded in
/// `while_ctx` while `backprop_pred` holds.
///
/// `grad_inputs` are the gradients of the loop's exit values; the result
/// holds the gradients with respect to the loop's initial values.
pub fn add_while_gradient_loop(
    graph: &mut Graph,
    while_ctx: WhileContextId,
    grad_inputs: &[Output],
    backprop_pred: Output,
    scope: &Scope,
) -> Result<Vec<Output>, AutodiffError> {
    add_while_gradient_loop_with(
        &mut GraphGradients,
        graph,
        while_ctx,
        grad_inputs,
        backprop_pred,
        scope,
    )
}

/// [`add_while_gradient_loop`] with a caller-supplied differentiation engine.
pub fn add_while_gradient_loop_with<S: SymbolicGradients>(
    engine: &mut S,
    graph: &mut Graph,
    while_ctx: WhileContextId,
    grad_inputs: &[Output],
    backprop_pred: Output,
    scope: &Scope,
) -> Result<Vec<Output>, AutodiffError> {
    let ctx = graph.while_context(while_ctx)?;
    let frame_name = ctx.frame_name().to_string();
    let body_inputs = to_outputs(ctx.body_inputs());
    let body_outputs = to_outputs(ctx.body_outputs());

    if grad_inputs.len() != body_outputs.len() {
        return Err(GraphError::InvalidArgument(format!(
            "while gradient expects {} gradient inputs (one per loop output), got {}",
            body_outputs.len(),
            grad_inputs.len()
        ))
        .into());
    }
    if body_inputs.len() != body_outputs.len() {
        return Err(GraphError::InvalidArgument(format!(
            "while context records {} body inputs but {} body outputs",
            body_inputs.len(),
            body_outputs.len()
        ))
        .into());
    }

    let scope = scope.new_sub_scope("while");
    let grad_loop = build_while_loop(
        graph,
        &scope,
        grad_inputs,
        |_: &mut Graph, _: &Scope, _: &[Output]| Ok(backprop_pred),
        |g: &mut Graph, s: &Scope, grads: &[Output]| {
            engine.add_symbolic_gradients(g, s, &body_outputs, &body_inputs, grads)
        },
        &frame_name,
        false,
    )?;
    Ok(grad_loop.outputs)
}

/// Build the full gradient of a recorded loop under `<scope>/while_grad`.
///
/// `grad_inputs` holds one gradient per loop exit; the result holds one
/// gradient per initial loop value.
pub fn add_while_loop_gradient(
    graph: &mut Graph,
    while_ctx: WhileContextId,
    grad_inputs: &[Output],
    scope: &Scope,
) -> Result<Vec<Output>, AutodiffError> {
    let scope = scope.new_sub_scope("while_grad");
    let frame = graph.while_context(while_ctx)?.frame_name().to_string();
    log::debug!(
        "adding while loop gradient for frame '{frame}' under '{}'",
        scope.name()
    );

    let count = add_forward_loop_counter(graph, while_ctx, &scope)?;
    let backprop_pred = add_backprop_loop_counter(graph, while_ctx, count, &scope)?;
    add_while_gradient_loop(graph, while_ctx, grad_inputs, backprop_pred, &scope)
}
