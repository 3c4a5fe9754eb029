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

use super::{GraphError, NodeId, Output};

/// Index of a [`WhileContext`] inside its [`Graph`](super::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WhileContextId(pub usize);

/// Output reference as stored in loop records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputTensor {
    pub node: NodeId,
    pub index: usize,
}

impl From<Output> for OutputTensor {
    fn from(out: Output) -> Self {
        Self {
            node: out.node,
            index: out.index,
        }
    }
}

impl From<OutputTensor> for Output {
    fn from(tensor: OutputTensor) -> Self {
        Output::new(tensor.node, tensor.index)
    }
}

pub fn to_output_tensors(outputs: &[Output]) -> Vec<OutputTensor> {
    outputs.iter().copied().map(OutputTensor::from).collect()
}

pub fn to_outputs(tensors: &[OutputTensor]) -> Vec<Output> {
    tensors.iter().copied().map(Output::from).collect()
}

/// Structural record of one built while loop, kept so its gradient can be
/// constructed later.
///
/// `body_inputs` are the Switch true-outputs the body consumed and
/// `body_outputs` the values it handed to NextIteration. Every list has one
/// entry per loop variable. The record never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileContext {
    frame_name: String,
    enter_nodes: Vec<NodeId>,
    exit_nodes: Vec<NodeId>,
    cond_output: OutputTensor,
    body_inputs: Vec<OutputTensor>,
    body_outputs: Vec<OutputTensor>,
}

impl WhileContext {
    pub fn new(
        frame_name: impl Into<String>,
        enter_nodes: Vec<NodeId>,
        exit_nodes: Vec<NodeId>,
        cond_output: OutputTensor,
        body_inputs: Vec<OutputTensor>,
        body_outputs: Vec<OutputTensor>,
    ) -> Result<Self, GraphError> {
        let n = enter_nodes.len();
        if exit_nodes.len() != n || body_inputs.len() != n || body_outputs.len() != n {
            return Err(GraphError::InvalidArgument(format!(
                "while context expects {n} entries per list, got exits={}, body_inputs={}, body_outputs={}",
                exit_nodes.len(),
                body_inputs.len(),
                body_outputs.len()
            )));
        }
        Ok(Self {
            frame_name: frame_name.into(),
            enter_nodes,
            exit_nodes,
            cond_output,
            body_inputs,
            body_outputs,
        })
    }

    pub fn frame_name(&self) -> &str {
        &self.frame_name
    }

    pub fn enter_nodes(&self) -> &[NodeId] {
        &self.enter_nodes
    }

    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }

    pub fn cond_output(&self) -> OutputTensor {
        self.cond_output
    }

    pub fn body_inputs(&self) -> &[OutputTensor] {
        &self.body_inputs
    }

    pub fn body_outputs(&self) -> &[OutputTensor] {
        &self.body_outputs
    }

    /// Number of loop variables.
    pub fn len(&self) -> usize {
        self.enter_nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enter_nodes.is_empty()
    }
}
