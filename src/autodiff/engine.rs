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

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Graph, GraphError, NodeId, Op, Output, Scope};
use crate::ops;

use super::rules;

/// Errors returned by the autodiff engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AutodiffError {
    /// Building a gradient node failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The autodiff engine does not have a rule for the encountered operation.
    #[error("unsupported operation for autodiff: {op}")]
    UnsupportedOp { op: &'static str },
    /// The request itself was malformed (mismatched counts or dtypes).
    #[error("invalid autodiff input: {0}")]
    InvalidInput(String),
}

/// Capability to add symbolic partial derivatives to a graph.
///
/// Given `outputs`, the `inputs` to differentiate with respect to, and one
/// seed gradient per output, implementations add the gradient subgraph and
/// return one gradient per input.
pub trait SymbolicGradients {
    fn add_symbolic_gradients(
        &mut self,
        graph: &mut Graph,
        scope: &Scope,
        outputs: &[Output],
        inputs: &[Output],
        grad_inputs: &[Output],
    ) -> Result<Vec<Output>, AutodiffError>;
}

/// The built-in reverse-mode engine, see [`add_symbolic_gradients`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphGradients;

impl SymbolicGradients for GraphGradients {
    fn add_symbolic_gradients(
        &mut self,
        graph: &mut Graph,
        scope: &Scope,
        outputs: &[Output],
        inputs: &[Output],
        grad_inputs: &[Output],
    ) -> Result<Vec<Output>, AutodiffError> {
        add_symbolic_gradients(graph, scope, outputs, inputs, grad_inputs)
    }
}

/// Add the reverse-mode gradient of `outputs` with respect to `inputs`.
///
/// Only nodes lying on a data path from some input to some output are
/// differentiated. Inputs that do not reach any output get a zero gradient.
/// Control-flow ops on such a path are rejected, so a loop nested inside the
/// differentiated region fails with [`AutodiffError::UnsupportedOp`].
pub fn add_symbolic_gradients(
    graph: &mut Graph,
    scope: &Scope,
    outputs: &[Output],
    inputs: &[Output],
    grad_inputs: &[Output],
) -> Result<Vec<Output>, AutodiffError> {
    if outputs.len() != grad_inputs.len() {
        return Err(as_invalid(format!(
            "expected one gradient per output: {} outputs, {} gradients",
            outputs.len(),
            grad_inputs.len()
        )));
    }
    for (out, grad) in outputs.iter().zip(grad_inputs) {
        let out_dtype = graph.output_type(*out)?.dtype;
        let grad_dtype = graph.output_type(*grad)?.dtype;
        if out_dtype != grad_dtype {
            return Err(as_invalid(format!(
                "gradient for {} must be {out_dtype}, got {grad_dtype}",
                graph.node(out.node)?.name
            )));
        }
    }

    let region = between(graph, outputs, inputs);
    log::trace!(
        "symbolic gradients: {} outputs, {} inputs, {} nodes in region",
        outputs.len(),
        inputs.len(),
        region.len()
    );

    let mut builder = GradientBuilder {
        graph,
        scope: scope.new_sub_scope("gradients"),
        grads: BTreeMap::new(),
        region,
        inputs: inputs.iter().copied().collect(),
    };
    for (out, grad) in outputs.iter().zip(grad_inputs) {
        builder.add_grad(*out, *grad)?;
    }
    builder.propagate_gradients()?;
    builder.finish(inputs)
}

struct GradientBuilder<'g> {
    graph: &'g mut Graph,
    scope: Scope,
    grads: BTreeMap<Output, Output>,
    region: BTreeSet<NodeId>,
    inputs: BTreeSet<Output>,
}

impl GradientBuilder<'_> {
    fn propagate_gradients(&mut self) -> Result<(), AutodiffError> {
        let order: Vec<NodeId> = self.region.iter().rev().copied().collect();
        for id in order {
            let node = self.graph.node(id)?;
            if node.op.is_control_flow() {
                return Err(AutodiffError::UnsupportedOp { op: node.op.name() });
            }
            let upstream = Output::new(id, 0);
            if self.inputs.contains(&upstream) {
                continue;
            }
            let Some(&grad) = self.grads.get(&upstream) else {
                continue;
            };
            let op = node.op.clone();
            let operands: Vec<Output> = (0..node.inputs.len())
                .filter_map(|slot| node.input(slot))
                .collect();
            rules::apply_rule(self, &op, &operands, grad)?;
        }
        Ok(())
    }

    fn finish(mut self, inputs: &[Output]) -> Result<Vec<Output>, AutodiffError> {
        let mut result = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.grads.get(input) {
                Some(grad) => result.push(*grad),
                None => result.push(ops::zeros_like(self.graph, &self.scope, *input)?),
            }
        }
        Ok(result)
    }
}

/// Nodes reachable backwards from `outputs` without passing through an
/// input, restricted to those that depend on some input.
fn between(graph: &Graph, outputs: &[Output], inputs: &[Output]) -> BTreeSet<NodeId> {
    let inputs: BTreeSet<Output> = inputs.iter().copied().collect();

    let mut backward = BTreeSet::new();
    let mut stack: Vec<NodeId> = outputs
        .iter()
        .filter(|out| !inputs.contains(out))
        .map(|out| out.node)
        .collect();
    while let Some(id) = stack.pop() {
        if !backward.insert(id) {
            continue;
        }
        if let Ok(node) = graph.node(id) {
            for slot in 0..node.inputs.len() {
                if let Some(src) = node.input(slot) {
                    if !inputs.contains(&src) {
                        stack.push(src.node);
                    }
                }
            }
        }
    }

    let mut forward = BTreeSet::new();
    let mut stack: Vec<NodeId> = inputs
        .iter()
        .flat_map(|input| graph.consumers(*input))
        .map(|(id, _)| id)
        .collect();
    while let Some(id) = stack.pop() {
        if !backward.contains(&id) || !forward.insert(id) {
            continue;
        }
        if let Ok(node) = graph.node(id) {
            for index in 0..node.num_outputs() {
                let next = graph.consumers(Output::new(id, index));
                stack.extend(next.into_iter().map(|(consumer, _)| consumer));
            }
        }
    }
    forward
}

// Helper API used by derivative rules.
pub(super) trait GradientOps {
    /// Whether a gradient for `target` is needed by anything.
    fn wants(&self, target: Output) -> bool;
    fn add_binop(&mut self, op: Op, lhs: Output, rhs: Output) -> Result<Output, AutodiffError>;
    fn add_scalar_like(&mut self, like: Output, value: f64) -> Result<Output, AutodiffError>;
    fn add_grad(&mut self, target: Output, contribution: Output) -> Result<(), AutodiffError>;
}

impl GradientOps for GradientBuilder<'_> {
    fn wants(&self, target: Output) -> bool {
        self.inputs.contains(&target) || self.region.contains(&target.node)
    }

    fn add_binop(&mut self, op: Op, lhs: Output, rhs: Output) -> Result<Output, AutodiffError> {
        Ok(ops::binary(self.graph, &self.scope, op, lhs, rhs)?)
    }

    fn add_scalar_like(&mut self, like: Output, value: f64) -> Result<Output, AutodiffError> {
        Ok(ops::scalar_like(self.graph, &self.scope, like, value)?)
    }

    fn add_grad(&mut self, target: Output, contribution: Output) -> Result<(), AutodiffError> {
        let summed = match self.grads.get(&target).copied() {
            None => contribution,
            Some(existing) => self.add_binop(Op::Add, existing, contribution)?,
        };
        self.grads.insert(target, summed);
        Ok(())
    }
}

pub(super) fn as_invalid(msg: impl Into<String>) -> AutodiffError {
    AutodiffError::InvalidInput(msg.into())
}
