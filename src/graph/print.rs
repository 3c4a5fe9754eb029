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

use std::fmt::Write;

use super::{Graph, Node, NodeInput, Op, Output};

/// Format a [`Graph`] into a stable, human-readable string.
pub fn format_graph(graph: &Graph) -> String {
    let mut out = String::new();
    writeln!(&mut out, "graph {{").expect("write to string cannot fail");
    for node in graph.nodes() {
        format_node(graph, node, &mut out);
    }
    for ctx in graph.while_contexts() {
        writeln!(
            &mut out,
            "  // while frame=\"{}\" vars={} cond={}",
            ctx.frame_name(),
            ctx.len(),
            output_name(graph, ctx.cond_output().into())
        )
        .expect("write to string cannot fail");
    }
    writeln!(
        &mut out,
        "}}  // nodes = {}, while_contexts = {}",
        graph.len(),
        graph.while_contexts().len()
    )
    .expect("write to string cannot fail");
    out
}

fn format_node(graph: &Graph, node: &Node, out: &mut String) {
    let inputs: Vec<String> = node
        .inputs
        .iter()
        .map(|input| match input {
            NodeInput::Edge(src) => output_name(graph, *src),
            NodeInput::Deferred { name, index, .. } => format!("<deferred {name}:{index}>"),
        })
        .collect();
    let types: Vec<String> = node.output_types.iter().map(ToString::to_string).collect();

    write!(
        out,
        "  {} {} = {}({}) : {}",
        node.id,
        node.name,
        format_op(&node.op),
        inputs.join(", "),
        types.join(", ")
    )
    .expect("write to string cannot fail");
    for ctrl in &node.control_inputs {
        write!(out, " ^{}", output_name(graph, *ctrl)).expect("write to string cannot fail");
    }
    writeln!(out).expect("write to string cannot fail");
}

fn format_op(op: &Op) -> String {
    match op {
        Op::Const { value, .. } => format!("Const[{value}]"),
        Op::Enter { frame_name } => format!("Enter[frame=\"{frame_name}\"]"),
        other => other.name().to_string(),
    }
}

fn output_name(graph: &Graph, out: Output) -> String {
    match graph.node(out.node) {
        Ok(node) => format!("{}:{}", node.name, out.index),
        Err(_) => format!("{}:{}?", out.node, out.index),
    }
}
