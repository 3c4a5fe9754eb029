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

//! Dataflow graph storage.
//!
//! Nodes live in an arena indexed by [`NodeId`]; a value is addressed by an
//! [`Output`] (node plus output slot). Unlike an SSA module the graph may be
//! cyclic: a Merge node can declare a [`NodeInput::Deferred`] input naming a
//! node that does not exist yet, and [`Graph::add_edge`] resolves it once the
//! producer has been created.

mod print;
mod scope;
mod verify;
mod while_context;

use std::collections::HashMap;
use std::fmt;

use crate::shapes::{self, ShapeError};
use crate::types::{DType, Scalar, ShapeDim, TensorType};

pub use print::format_graph;
pub use scope::Scope;
pub use verify::{verify_graph, GraphVerifyError};
pub use while_context::{
    to_output_tensors, to_outputs, OutputTensor, WhileContext, WhileContextId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// One value-producing port of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// A data input of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeInput {
    /// Edge from an existing output.
    Edge(Output),
    /// Forward reference to an output of a node that will be created later
    /// under `name`. Only Merge nodes accept these.
    Deferred {
        name: String,
        index: usize,
        dtype: DType,
    },
}

impl NodeInput {
    pub fn as_edge(&self) -> Option<Output> {
        match self {
            NodeInput::Edge(out) => Some(*out),
            NodeInput::Deferred { .. } => None,
        }
    }
}

/// Node kinds understood by the graph, the shape engine and the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Const { value: Scalar, shape: Vec<ShapeDim> },
    Add,
    Sub,
    Mul,
    Div,
    Less,
    Greater,
    Identity,
    /// Moves a value into the loop frame `frame_name`.
    Enter { frame_name: String },
    Merge,
    Switch,
    LoopCond,
    NextIteration,
    Exit,
}

impl Op {
    /// Canonical operator name, also used as the default node name.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Const { .. } => "Const",
            Op::Add => "Add",
            Op::Sub => "Sub",
            Op::Mul => "Mul",
            Op::Div => "Div",
            Op::Less => "Less",
            Op::Greater => "Greater",
            Op::Identity => "Identity",
            Op::Enter { .. } => "Enter",
            Op::Merge => "Merge",
            Op::Switch => "Switch",
            Op::LoopCond => "LoopCond",
            Op::NextIteration => "NextIteration",
            Op::Exit => "Exit",
        }
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Op::Enter { .. } | Op::Merge | Op::Switch | Op::LoopCond | Op::NextIteration | Op::Exit
        )
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op: Op,
    pub inputs: Vec<NodeInput>,
    /// Outputs that must be produced (in the same frame iteration) before
    /// this node runs. A dead control input makes the node dead.
    pub control_inputs: Vec<Output>,
    pub output_types: Vec<TensorType>,
    /// Loop this node is an exit of, if it was recorded.
    pub while_ctx: Option<WhileContextId>,
}

impl Node {
    /// Resolved data input at `slot`.
    pub fn input(&self, slot: usize) -> Option<Output> {
        self.inputs.get(slot).and_then(NodeInput::as_edge)
    }

    pub fn num_outputs(&self) -> usize {
        self.output_types.len()
    }
}

/// Everything needed to add a node; see [`crate::ops::NodeBuilder`].
#[derive(Debug, Clone)]
pub struct NodeDef {
    pub name: String,
    pub op: Op,
    pub inputs: Vec<NodeInput>,
    pub control_inputs: Vec<Output>,
}

/// Errors surfaced by graph construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// A caller-supplied argument broke the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A node with this name already exists.
    #[error("node name '{0}' is already in use")]
    DuplicateName(String),
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node '{node}' has no output {index}")]
    UnknownOutput { node: String, index: usize },
    #[error("shape inference failed: {0}")]
    Shape(#[from] ShapeError),
    /// An edge could not be attached to the requested input slot.
    #[error("invalid edge into '{node}' input {slot}: {message}")]
    InvalidEdge {
        node: String,
        slot: usize,
        message: String,
    },
    #[error("while context with frame name '{0}' already exists")]
    AlreadyExists(String),
    #[error("while context {0} does not exist")]
    UnknownWhileContext(usize),
}

/// A mutable dataflow graph plus the loop records attached to it.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    /// Taken names; `None` marks a name that is reserved but not yet bound.
    names: HashMap<String, Option<NodeId>>,
    while_contexts: Vec<WhileContext>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        match self.names.get(name) {
            Some(Some(id)) => self.nodes.get(id.0),
            _ => None,
        }
    }

    pub fn output_type(&self, out: Output) -> Result<&TensorType, GraphError> {
        let node = self.node(out.node)?;
        node.output_types
            .get(out.index)
            .ok_or_else(|| GraphError::UnknownOutput {
                node: node.name.clone(),
                index: out.index,
            })
    }

    /// Allocate a name derived from `prefix` and reserve it.
    ///
    /// The first request for a prefix returns it unchanged; later requests
    /// return `prefix_1`, `prefix_2`, ... skipping names already taken.
    pub fn unique_name(&mut self, prefix: &str) -> String {
        if !self.names.contains_key(prefix) {
            self.names.insert(prefix.to_string(), None);
            return prefix.to_string();
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{prefix}_{suffix}");
            if !self.names.contains_key(&candidate) {
                self.names.insert(candidate.clone(), None);
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Add a node, running shape inference over its resolved inputs.
    ///
    /// The name may be fresh or previously reserved through
    /// [`Graph::unique_name`]; it must not be bound to another node.
    pub fn add_node(&mut self, def: NodeDef) -> Result<NodeId, GraphError> {
        if let Some(Some(_)) = self.names.get(&def.name) {
            return Err(GraphError::DuplicateName(def.name));
        }

        let mut input_types = Vec::with_capacity(def.inputs.len());
        for (slot, input) in def.inputs.iter().enumerate() {
            match input {
                NodeInput::Edge(out) => input_types.push(self.output_type(*out)?),
                NodeInput::Deferred { .. } if matches!(def.op, Op::Merge) => {}
                NodeInput::Deferred { name, .. } => {
                    return Err(GraphError::InvalidEdge {
                        node: def.name.clone(),
                        slot,
                        message: format!(
                            "deferred input '{name}' is only supported on Merge nodes"
                        ),
                    });
                }
            }
        }
        for ctrl in &def.control_inputs {
            self.output_type(*ctrl)?;
        }
        let output_types = shapes::infer_output_types(&def.op, &input_types)?;

        let id = NodeId(self.nodes.len());
        log::trace!("add node {} {} ({})", id, def.name, def.op.name());
        self.names.insert(def.name.clone(), Some(id));
        self.nodes.push(Node {
            id,
            name: def.name,
            op: def.op,
            inputs: def.inputs,
            control_inputs: def.control_inputs,
            output_types,
            while_ctx: None,
        });
        Ok(id)
    }

    /// Attach `src` to input `slot` of `dst` after both exist.
    ///
    /// A deferred input at `slot` must name `src` exactly (node name, output
    /// index and dtype). `slot == inputs.len()` appends a new input, which
    /// only Merge nodes accept. Back-edges into a Merge must keep the
    /// merge's shape.
    pub fn add_edge(&mut self, src: Output, dst: NodeId, slot: usize) -> Result<(), GraphError> {
        let src_type = self.output_type(src)?.clone();
        let src_name = self.node(src.node)?.name.clone();
        let dst_node = self
            .nodes
            .get_mut(dst.0)
            .ok_or(GraphError::UnknownNode(dst))?;
        let invalid = |message: String| GraphError::InvalidEdge {
            node: dst_node.name.clone(),
            slot,
            message,
        };

        match dst_node.inputs.get(slot) {
            Some(NodeInput::Deferred { name, index, dtype }) => {
                if *name != src_name || *index != src.index {
                    return Err(invalid(format!(
                        "expected {name}:{index}, got {src_name}:{}",
                        src.index
                    )));
                }
                if *dtype != src_type.dtype {
                    return Err(invalid(format!(
                        "declared dtype {dtype} but {src_name}:{} is {}",
                        src.index, src_type.dtype
                    )));
                }
            }
            Some(NodeInput::Edge(_)) => {
                return Err(invalid("input is already connected".to_string()));
            }
            None if slot == dst_node.inputs.len() && matches!(dst_node.op, Op::Merge) => {}
            None => return Err(invalid("no such input slot".to_string())),
        }

        if matches!(dst_node.op, Op::Merge) {
            if let Some(merged) = dst_node.output_types.first() {
                if merged.dtype != src_type.dtype || merged.shape != src_type.shape {
                    return Err(invalid(format!(
                        "back edge type {src_type} does not match merge type {merged}"
                    )));
                }
            }
        }

        log::trace!("add edge {src_name}:{} -> {} input {slot}", src.index, dst_node.name);
        if slot == dst_node.inputs.len() {
            dst_node.inputs.push(NodeInput::Edge(src));
        } else {
            dst_node.inputs[slot] = NodeInput::Edge(src);
        }
        Ok(())
    }

    /// Data consumers of `out` as `(node, input slot)` pairs, in node order.
    pub fn consumers(&self, out: Output) -> Vec<(NodeId, usize)> {
        let mut found = Vec::new();
        for node in &self.nodes {
            for (slot, input) in node.inputs.iter().enumerate() {
                if input.as_edge() == Some(out) {
                    found.push((node.id, slot));
                }
            }
        }
        found
    }

    /// Register a loop record. Frame names are unique per graph.
    pub fn add_while_context(&mut self, ctx: WhileContext) -> Result<WhileContextId, GraphError> {
        if self
            .while_contexts
            .iter()
            .any(|existing| existing.frame_name() == ctx.frame_name())
        {
            return Err(GraphError::AlreadyExists(ctx.frame_name().to_string()));
        }
        let id = WhileContextId(self.while_contexts.len());
        self.while_contexts.push(ctx);
        Ok(id)
    }

    pub fn while_context(&self, id: WhileContextId) -> Result<&WhileContext, GraphError> {
        self.while_contexts
            .get(id.0)
            .ok_or(GraphError::UnknownWhileContext(id.0))
    }

    pub fn while_contexts(&self) -> &[WhileContext] {
        &self.while_contexts
    }

    pub fn set_while_ctx(&mut self, node: NodeId, id: WhileContextId) -> Result<(), GraphError> {
        self.while_context(id)?;
        let node = self
            .nodes
            .get_mut(node.0)
            .ok_or(GraphError::UnknownNode(node))?;
        node.while_ctx = Some(id);
        Ok(())
    }

    /// Loop record reachable from `out`'s node (set on loop exits).
    pub fn while_context_for(&self, out: Output) -> Option<(WhileContextId, &WhileContext)> {
        let id = self.nodes.get(out.node.0)?.while_ctx?;
        self.while_contexts.get(id.0).map(|ctx| (id, ctx))
    }
}
