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

//! Node constructors.
//!
//! Every helper takes the graph and a [`Scope`]: the scope supplies the name
//! prefix and the control dependencies attached to the new node.

pub mod control_flow;
pub mod while_loop;

use crate::graph::{Graph, GraphError, NodeDef, NodeId, NodeInput, Op, Output, Scope};
use crate::types::{Scalar, ShapeDim};

pub use control_flow::{enter, exit, loop_cond, next_iteration, switch, SwitchOutputs};
pub use while_loop::{build_while_loop, WhileLoopOutputs};

/// Low-level node construction, for nodes whose inputs cannot be expressed
/// as plain outputs (e.g. a Merge whose back edge does not exist yet).
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    def: NodeDef,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>, op: Op) -> Self {
        Self {
            def: NodeDef {
                name: name.into(),
                op,
                inputs: Vec::new(),
                control_inputs: Vec::new(),
            },
        }
    }

    pub fn input(mut self, out: Output) -> Self {
        self.def.inputs.push(NodeInput::Edge(out));
        self
    }

    /// Input produced by a node that will be created later as `name`.
    pub fn deferred_input(mut self, name: impl Into<String>, index: usize, dtype: crate::types::DType) -> Self {
        self.def.inputs.push(NodeInput::Deferred {
            name: name.into(),
            index,
            dtype,
        });
        self
    }

    pub fn control_inputs(mut self, deps: &[Output]) -> Self {
        for dep in deps {
            if !self.def.control_inputs.contains(dep) {
                self.def.control_inputs.push(*dep);
            }
        }
        self
    }

    pub fn finalize(self, graph: &mut Graph) -> Result<NodeId, GraphError> {
        graph.add_node(self.def)
    }
}

/// Create a node named after its op inside `scope`, carrying the scope's
/// control dependencies, and return its first output.
pub(crate) fn build(
    graph: &mut Graph,
    scope: &Scope,
    op: Op,
    inputs: &[Output],
) -> Result<Output, GraphError> {
    let name = scope.unique_name_for_op(graph, op.name());
    let mut builder = NodeBuilder::new(name, op).control_inputs(scope.control_dependencies());
    for input in inputs {
        builder = builder.input(*input);
    }
    let id = builder.finalize(graph)?;
    Ok(Output::new(id, 0))
}

pub fn constant(
    graph: &mut Graph,
    scope: &Scope,
    value: Scalar,
    shape: Vec<ShapeDim>,
) -> Result<Output, GraphError> {
    build(graph, scope, Op::Const { value, shape }, &[])
}

pub fn const_i32(graph: &mut Graph, scope: &Scope, value: i64) -> Result<Output, GraphError> {
    constant(graph, scope, Scalar::Int(value), Vec::new())
}

pub fn const_f32(graph: &mut Graph, scope: &Scope, value: f64) -> Result<Output, GraphError> {
    constant(graph, scope, Scalar::Float(value), Vec::new())
}

pub fn const_bool(graph: &mut Graph, scope: &Scope, value: bool) -> Result<Output, GraphError> {
    constant(graph, scope, Scalar::Bool(value), Vec::new())
}

/// Scalar constant with the dtype of `like`.
pub fn scalar_like(
    graph: &mut Graph,
    scope: &Scope,
    like: Output,
    value: f64,
) -> Result<Output, GraphError> {
    let dtype = graph.output_type(like)?.dtype;
    constant(graph, scope, Scalar::from_f64(dtype, value), Vec::new())
}

/// Zero-filled constant with the dtype and shape of `like`.
pub fn zeros_like(graph: &mut Graph, scope: &Scope, like: Output) -> Result<Output, GraphError> {
    let ty = graph.output_type(like)?.clone();
    constant(graph, scope, Scalar::from_f64(ty.dtype, 0.0), ty.shape)
}

/// Binary elementwise op (arithmetic or comparison).
pub fn binary(
    graph: &mut Graph,
    scope: &Scope,
    op: Op,
    lhs: Output,
    rhs: Output,
) -> Result<Output, GraphError> {
    if !matches!(op, Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Less | Op::Greater) {
        return Err(GraphError::InvalidArgument(format!(
            "{} is not a binary elementwise op",
            op.name()
        )));
    }
    build(graph, scope, op, &[lhs, rhs])
}

pub fn add(graph: &mut Graph, scope: &Scope, lhs: Output, rhs: Output) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Add, lhs, rhs)
}

pub fn sub(graph: &mut Graph, scope: &Scope, lhs: Output, rhs: Output) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Sub, lhs, rhs)
}

pub fn mul(graph: &mut Graph, scope: &Scope, lhs: Output, rhs: Output) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Mul, lhs, rhs)
}

pub fn div(graph: &mut Graph, scope: &Scope, lhs: Output, rhs: Output) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Div, lhs, rhs)
}

pub fn less(graph: &mut Graph, scope: &Scope, lhs: Output, rhs: Output) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Less, lhs, rhs)
}

pub fn greater(
    graph: &mut Graph,
    scope: &Scope,
    lhs: Output,
    rhs: Output,
) -> Result<Output, GraphError> {
    binary(graph, scope, Op::Greater, lhs, rhs)
}

pub fn identity(graph: &mut Graph, scope: &Scope, input: Output) -> Result<Output, GraphError> {
    build(graph, scope, Op::Identity, &[input])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DType, TensorType};

    #[test]
    fn scoped_control_dependencies_attach_to_new_nodes() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let gate = const_bool(&mut graph, &root, true).unwrap();
        let scope = root.new_sub_scope("body").with_control_dependencies(&[gate]);
        let one = const_i32(&mut graph, &scope, 1).unwrap();

        let node = graph.node(one.node).unwrap();
        assert_eq!(node.name, "body/Const");
        assert_eq!(node.control_inputs, vec![gate]);
    }

    #[test]
    fn scalar_like_follows_dtype() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let x = const_f32(&mut graph, &root, 3.0).unwrap();
        let one = scalar_like(&mut graph, &root, x, 1.0).unwrap();
        assert_eq!(graph.output_type(one).unwrap(), &TensorType::scalar(DType::F32));
    }

    #[test]
    fn zeros_like_keeps_shape() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let x = constant(&mut graph, &root, Scalar::Float(2.0), vec![ShapeDim::Known(3)]).unwrap();
        let zero = zeros_like(&mut graph, &root, x).unwrap();
        assert_eq!(
            graph.output_type(zero).unwrap(),
            &TensorType::new(DType::F32, vec![ShapeDim::Known(3)])
        );
    }

    #[test]
    fn comparisons_produce_bool() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_i32(&mut graph, &root, 1).unwrap();
        let b = const_i32(&mut graph, &root, 2).unwrap();
        let lt = less(&mut graph, &root, a, b).unwrap();
        assert_eq!(graph.output_type(lt).unwrap().dtype, DType::Bool);
    }

    #[test]
    fn mixed_dtypes_fail_shape_inference() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_i32(&mut graph, &root, 1).unwrap();
        let b = const_f32(&mut graph, &root, 2.0).unwrap();
        let err = add(&mut graph, &root, a, b).unwrap_err();
        assert!(matches!(err, GraphError::Shape(_)));
    }

    #[test]
    fn binary_rejects_non_binary_ops() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_i32(&mut graph, &root, 1).unwrap();
        let err = binary(&mut graph, &root, Op::Identity, a, a).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }
}
