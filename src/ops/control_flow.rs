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

//! Loop primitives.
//!
//! Only [`enter`] picks up the scope's control dependencies. The other
//! primitives sit on the loop's cycle, and a control edge there would make
//! the runtime wait on a value from the wrong iteration.

use crate::graph::{Graph, GraphError, Op, Output, Scope};

use super::NodeBuilder;

/// Outputs of a Switch node. Output 0 carries the value when the predicate
/// is false, output 1 when it is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutputs {
    pub output_false: Output,
    pub output_true: Output,
}

fn unscoped(
    graph: &mut Graph,
    scope: &Scope,
    op: Op,
    inputs: &[Output],
) -> NodeBuilder {
    let name = scope.unique_name_for_op(graph, op.name());
    let mut builder = NodeBuilder::new(name, op);
    for input in inputs {
        builder = builder.input(*input);
    }
    builder
}

pub fn enter(
    graph: &mut Graph,
    scope: &Scope,
    data: Output,
    frame_name: &str,
) -> Result<Output, GraphError> {
    if frame_name.is_empty() {
        return Err(GraphError::InvalidArgument(
            "Enter requires a non-empty frame name".to_string(),
        ));
    }
    let op = Op::Enter {
        frame_name: frame_name.to_string(),
    };
    let id = unscoped(graph, scope, op, &[data])
        .control_inputs(scope.control_dependencies())
        .finalize(graph)?;
    Ok(Output::new(id, 0))
}

pub fn switch(
    graph: &mut Graph,
    scope: &Scope,
    data: Output,
    pred: Output,
) -> Result<SwitchOutputs, GraphError> {
    let id = unscoped(graph, scope, Op::Switch, &[data, pred]).finalize(graph)?;
    Ok(SwitchOutputs {
        output_false: Output::new(id, 0),
        output_true: Output::new(id, 1),
    })
}

pub fn loop_cond(graph: &mut Graph, scope: &Scope, pred: Output) -> Result<Output, GraphError> {
    let id = unscoped(graph, scope, Op::LoopCond, &[pred]).finalize(graph)?;
    Ok(Output::new(id, 0))
}

pub fn next_iteration(
    graph: &mut Graph,
    scope: &Scope,
    data: Output,
) -> Result<Output, GraphError> {
    let id = unscoped(graph, scope, Op::NextIteration, &[data]).finalize(graph)?;
    Ok(Output::new(id, 0))
}

/// NextIteration bound to a name reserved earlier with [`Graph::unique_name`].
pub fn next_iteration_named(
    graph: &mut Graph,
    name: &str,
    data: Output,
) -> Result<Output, GraphError> {
    let id = NodeBuilder::new(name, Op::NextIteration)
        .input(data)
        .finalize(graph)?;
    Ok(Output::new(id, 0))
}

pub fn exit(graph: &mut Graph, scope: &Scope, data: Output) -> Result<Output, GraphError> {
    let id = unscoped(graph, scope, Op::Exit, &[data]).finalize(graph)?;
    Ok(Output::new(id, 0))
}
