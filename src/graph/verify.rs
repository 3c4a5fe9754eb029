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

use std::collections::BTreeSet;

use super::{Graph, Node, NodeId, NodeInput, Op, Output};

/// Structured errors returned by the graph verifier.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphVerifyError {
    /// A forward reference was never resolved with [`Graph::add_edge`].
    #[error("node '{node}' input {slot} still refers to not-yet-created '{name}'")]
    UnresolvedInput {
        node: String,
        slot: usize,
        name: String,
    },
    /// An edge or control dependency names an output that does not exist.
    #[error("node '{node}' refers to missing output {producer}:{index}")]
    DanglingEdge {
        node: String,
        producer: NodeId,
        index: usize,
    },
    #[error("merge '{node}' must have exactly 2 inputs, found {found}")]
    MergeArity { node: String, found: usize },
    /// The second merge input has to be the loop's back edge.
    #[error("merge '{node}' back edge comes from '{producer}', expected a NextIteration")]
    MergeBackEdge { node: String, producer: String },
    #[error("NextIteration '{node}' does not feed any Merge")]
    OrphanNextIteration { node: String },
    #[error("Enter '{node}' has an empty frame name")]
    EmptyFrameName { node: String },
}

/// Verify that a [`Graph`] contains only well-formed loops.
///
/// The verifier checks that every deferred input was resolved, every edge
/// points at an existing output, and that Merge/NextIteration pairs form
/// proper back edges. It returns the first problem found in node order.
pub fn verify_graph(graph: &Graph) -> Result<(), GraphVerifyError> {
    let mut back_edge_sources: BTreeSet<NodeId> = BTreeSet::new();

    for node in graph.nodes() {
        validate_edges(graph, node)?;

        match &node.op {
            Op::Merge => {
                if node.inputs.len() != 2 {
                    return Err(GraphVerifyError::MergeArity {
                        node: node.name.clone(),
                        found: node.inputs.len(),
                    });
                }
                if let Some(back) = node.input(1) {
                    let Some(producer) = producer(graph, back) else {
                        return Err(GraphVerifyError::DanglingEdge {
                            node: node.name.clone(),
                            producer: back.node,
                            index: back.index,
                        });
                    };
                    if !matches!(producer.op, Op::NextIteration) {
                        return Err(GraphVerifyError::MergeBackEdge {
                            node: node.name.clone(),
                            producer: producer.name.clone(),
                        });
                    }
                    back_edge_sources.insert(back.node);
                }
            }
            Op::Enter { frame_name } if frame_name.is_empty() => {
                return Err(GraphVerifyError::EmptyFrameName {
                    node: node.name.clone(),
                });
            }
            _ => {}
        }
    }

    if let Some(orphan) = graph
        .nodes()
        .iter()
        .find(|n| matches!(n.op, Op::NextIteration) && !back_edge_sources.contains(&n.id))
    {
        return Err(GraphVerifyError::OrphanNextIteration {
            node: orphan.name.clone(),
        });
    }

    Ok(())
}

fn validate_edges(graph: &Graph, node: &Node) -> Result<(), GraphVerifyError> {
    let check_exists = |out: Output| {
        if graph.output_type(out).is_ok() {
            Ok(())
        } else {
            Err(GraphVerifyError::DanglingEdge {
                node: node.name.clone(),
                producer: out.node,
                index: out.index,
            })
        }
    };

    for (slot, input) in node.inputs.iter().enumerate() {
        match input {
            NodeInput::Edge(out) => check_exists(*out)?,
            NodeInput::Deferred { name, .. } => {
                return Err(GraphVerifyError::UnresolvedInput {
                    node: node.name.clone(),
                    slot,
                    name: name.clone(),
                });
            }
        }
    }
    for ctrl in &node.control_inputs {
        check_exists(*ctrl)?;
    }
    Ok(())
}

fn producer(graph: &Graph, out: Output) -> Option<&Node> {
    let Ok(node) = graph.node(out.node) else {
        return None;
    };
    (out.index < node.num_outputs()).then_some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeDef;
    use crate::types::{DType, Scalar};

    fn add(graph: &mut Graph, name: &str, op: Op, inputs: Vec<NodeInput>) -> NodeId {
        graph
            .add_node(NodeDef {
                name: name.to_string(),
                op,
                inputs,
                control_inputs: Vec::new(),
            })
            .unwrap()
    }

    fn seed(graph: &mut Graph) -> Output {
        let c = add(
            graph,
            "c",
            Op::Const {
                value: Scalar::Int(0),
                shape: Vec::new(),
            },
            vec![],
        );
        Output::new(c, 0)
    }

    #[test]
    fn unresolved_back_edge_is_reported() {
        let mut graph = Graph::new();
        let c = seed(&mut graph);
        add(
            &mut graph,
            "merge",
            Op::Merge,
            vec![
                NodeInput::Edge(c),
                NodeInput::Deferred {
                    name: "next".to_string(),
                    index: 0,
                    dtype: DType::I32,
                },
            ],
        );
        let err = verify_graph(&graph).unwrap_err();
        assert_eq!(
            err,
            GraphVerifyError::UnresolvedInput {
                node: "merge".to_string(),
                slot: 1,
                name: "next".to_string(),
            }
        );
    }

    #[test]
    fn single_input_merge_is_rejected() {
        let mut graph = Graph::new();
        let c = seed(&mut graph);
        add(&mut graph, "merge", Op::Merge, vec![NodeInput::Edge(c)]);
        let err = verify_graph(&graph).unwrap_err();
        assert!(matches!(err, GraphVerifyError::MergeArity { found: 1, .. }));
    }

    #[test]
    fn orphan_next_iteration_is_rejected() {
        let mut graph = Graph::new();
        let c = seed(&mut graph);
        add(&mut graph, "next", Op::NextIteration, vec![NodeInput::Edge(c)]);
        let err = verify_graph(&graph).unwrap_err();
        assert!(matches!(err, GraphVerifyError::OrphanNextIteration { .. }));
    }

    #[test]
    fn producer_of_a_missing_output_is_none() {
        let mut graph = Graph::new();
        let c = seed(&mut graph);
        assert_eq!(producer(&graph, c).map(|n| n.id), Some(c.node));
        assert!(producer(&graph, Output::new(c.node, 3)).is_none());
        assert!(producer(&graph, Output::new(NodeId(9), 0)).is_none());
    }

    #[test]
    fn empty_frame_name_is_rejected() {
        let mut graph = Graph::new();
        let c = seed(&mut graph);
        add(
            &mut graph,
            "enter",
            Op::Enter {
                frame_name: String::new(),
            },
            vec![NodeInput::Edge(c)],
        );
        let err = verify_graph(&graph).unwrap_err();
        assert!(matches!(err, GraphVerifyError::EmptyFrameName { .. }));
    }
}
