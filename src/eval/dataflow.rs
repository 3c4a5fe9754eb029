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

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::eval::value::TensorVal;
use crate::eval::{EvalError, ExecOptions};
use crate::graph::{verify_graph, Graph, Node, NodeId, Op, Output};
use crate::types::{DType, Scalar};

/// Execution context of a token: the stack of enclosing loop frames with
/// the iteration reached in each. The root tag is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameTag(Vec<(String, usize)>);

impl FrameTag {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Innermost frame name and iteration, if inside a loop.
    pub fn innermost(&self) -> Option<(&str, usize)> {
        self.0.last().map(|(frame, iter)| (frame.as_str(), *iter))
    }

    fn enter(&self, frame: &str) -> Self {
        let mut tag = self.clone();
        tag.0.push((frame.to_string(), 0));
        tag
    }

    fn next_iteration(&self) -> Option<Self> {
        let mut tag = self.clone();
        tag.0.last_mut()?.1 += 1;
        Some(tag)
    }

    fn exit(&self) -> Option<Self> {
        let mut tag = self.clone();
        tag.0.pop()?;
        Some(tag)
    }
}

impl fmt::Display for FrameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("root");
        }
        for (i, (frame, iter)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{frame}:{iter}")?;
        }
        Ok(())
    }
}

/// A produced value; `None` is a dead token.
pub type Token = Option<TensorVal>;

/// Every token produced during a run, per output in production order.
#[derive(Debug, Clone, Default)]
pub struct ExecTrace {
    tokens: BTreeMap<Output, Vec<(FrameTag, Token)>>,
}

impl ExecTrace {
    fn record(&mut self, out: Output, tag: FrameTag, token: Token) {
        self.tokens.entry(out).or_default().push((tag, token));
    }

    pub fn values(&self, out: Output) -> &[(FrameTag, Token)] {
        self.tokens.get(&out).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live value of `out` outside of every loop frame.
    pub fn root_value(&self, out: Output) -> Option<&TensorVal> {
        self.values(out)
            .iter()
            .find(|(tag, _)| tag.depth() == 0)
            .and_then(|(_, token)| token.as_ref())
    }

    /// Tokens of a loop-resident `out` ordered by innermost iteration. Dead
    /// tokens appear as `None`.
    pub fn iteration_values(&self, out: Output) -> Vec<Option<&TensorVal>> {
        let mut by_iter: Vec<(usize, Option<&TensorVal>)> = self
            .values(out)
            .iter()
            .filter_map(|(tag, token)| tag.innermost().map(|(_, iter)| (iter, token.as_ref())))
            .collect();
        by_iter.sort_by_key(|(iter, _)| *iter);
        by_iter.into_iter().map(|(_, token)| token).collect()
    }
}

/// Reference interpreter for loop graphs.
///
/// Nodes fire as soon as their inputs are available in a given
/// [`FrameTag`]. Switch sends a dead token down its untaken branch, and
/// dead tokens poison everything downstream until a Merge (which forwards
/// its first live input), a NextIteration or an Exit (which drop them).
#[derive(Debug)]
pub struct Executor<'g> {
    graph: &'g Graph,
    options: ExecOptions,
    trace: ExecTrace,
}

impl<'g> Executor<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            options: ExecOptions::default(),
            trace: ExecTrace::default(),
        }
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the whole graph to completion and return the root-level values
    /// of `fetches`.
    pub fn run(&mut self, fetches: &[Output]) -> Result<Vec<TensorVal>, EvalError> {
        verify_graph(self.graph)?;
        log::debug!("executing graph with {} nodes", self.graph.len());

        let mut flow = Dataflow::new(self.graph, self.options);
        let result = flow.run();
        self.trace = flow.trace;
        result?;

        let mut values = Vec::with_capacity(fetches.len());
        for fetch in fetches {
            match self.trace.root_value(*fetch) {
                Some(value) => values.push(value.clone()),
                None => {
                    return Err(EvalError::NotProduced {
                        name: self.graph.node(fetch.node)?.name.clone(),
                        index: fetch.index,
                    })
                }
            }
        }
        Ok(values)
    }

    pub fn trace(&self) -> &ExecTrace {
        &self.trace
    }
}

struct Dataflow<'g> {
    graph: &'g Graph,
    options: ExecOptions,
    /// Consumers (data or control) of each node, indexed by producer.
    consumers: Vec<Vec<NodeId>>,
    tokens: HashMap<(Output, FrameTag), Token>,
    fired: HashSet<(NodeId, FrameTag)>,
    queue: VecDeque<(NodeId, FrameTag)>,
    trace: ExecTrace,
}

impl<'g> Dataflow<'g> {
    fn new(graph: &'g Graph, options: ExecOptions) -> Self {
        let mut consumers: Vec<Vec<NodeId>> = vec![Vec::new(); graph.len()];
        for node in graph.nodes() {
            let data = (0..node.inputs.len()).filter_map(|slot| node.input(slot));
            for src in data.chain(node.control_inputs.iter().copied()) {
                let list = &mut consumers[src.node.0];
                if !list.contains(&node.id) {
                    list.push(node.id);
                }
            }
        }
        Self {
            graph,
            options,
            consumers,
            tokens: HashMap::new(),
            fired: HashSet::new(),
            queue: VecDeque::new(),
            trace: ExecTrace::default(),
        }
    }

    fn run(&mut self) -> Result<(), EvalError> {
        for node in self.graph.nodes() {
            if node.inputs.is_empty() && node.control_inputs.is_empty() {
                self.queue.push_back((node.id, FrameTag::root()));
            }
        }
        while let Some((id, tag)) = self.queue.pop_front() {
            self.fire(id, tag)?;
        }
        Ok(())
    }

    /// `None` until every control input has a token at `tag`, then whether
    /// all of them are live.
    fn control_state(&self, node: &Node, tag: &FrameTag) -> Option<bool> {
        let mut live = true;
        for ctrl in &node.control_inputs {
            match self.tokens.get(&(*ctrl, tag.clone()))? {
                Some(_) => {}
                None => live = false,
            }
        }
        Some(live)
    }

    fn fire(&mut self, id: NodeId, tag: FrameTag) -> Result<(), EvalError> {
        if self.fired.contains(&(id, tag.clone())) {
            return Ok(());
        }
        let graph = self.graph;
        let node = graph.node(id)?;
        let Some(ctrl_live) = self.control_state(node, &tag) else {
            return Ok(());
        };
        if matches!(node.op, Op::Merge) {
            return self.fire_merge(node, tag, ctrl_live);
        }

        let mut args = Vec::with_capacity(node.inputs.len());
        for slot in 0..node.inputs.len() {
            let Some(src) = node.input(slot) else {
                return Err(eval_err(node, format!("input {slot} is unresolved")));
            };
            match self.tokens.get(&(src, tag.clone())) {
                Some(token) => args.push(token.clone()),
                None => return Ok(()),
            }
        }
        self.fired.insert((id, tag.clone()));

        let live: Option<Vec<TensorVal>> = if ctrl_live {
            args.into_iter().collect()
        } else {
            None
        };

        match &node.op {
            Op::Enter { frame_name } => {
                let value = live.map(|mut a| a.swap_remove(0));
                self.emit(Output::new(id, 0), tag.enter(frame_name), value);
            }
            Op::NextIteration => {
                if let Some(mut a) = live {
                    let next = tag
                        .next_iteration()
                        .ok_or_else(|| eval_err(node, "used outside of a loop frame"))?;
                    if let Some((frame, iter)) = next.innermost() {
                        if iter > self.options.max_iterations {
                            log::warn!(
                                "frame '{frame}' exceeded {} iterations at {}",
                                self.options.max_iterations,
                                node.name
                            );
                            return Err(EvalError::IterationLimit {
                                frame: frame.to_string(),
                                limit: self.options.max_iterations,
                            });
                        }
                    }
                    self.emit(Output::new(id, 0), next, Some(a.swap_remove(0)));
                }
            }
            Op::Exit => {
                if let Some(mut a) = live {
                    let outer = tag
                        .exit()
                        .ok_or_else(|| eval_err(node, "used outside of a loop frame"))?;
                    self.emit(Output::new(id, 0), outer, Some(a.swap_remove(0)));
                }
            }
            Op::Switch => {
                let (out_false, out_true) = match live {
                    None => (None, None),
                    Some(a) => {
                        let pred = a[1]
                            .as_bool()
                            .ok_or_else(|| eval_err(node, "predicate is not a bool"))?;
                        let data = a[0].clone();
                        if pred {
                            (None, Some(data))
                        } else {
                            (Some(data), None)
                        }
                    }
                };
                self.emit(Output::new(id, 0), tag.clone(), out_false);
                self.emit(Output::new(id, 1), tag, out_true);
            }
            _ => {
                let value = match live {
                    None => None,
                    Some(a) => Some(compute(node, &a)?),
                };
                self.emit(Output::new(id, 0), tag, value);
            }
        }
        Ok(())
    }

    fn fire_merge(&mut self, node: &Node, tag: FrameTag, ctrl_live: bool) -> Result<(), EvalError> {
        let mut arrived = 0;
        let mut chosen = None;
        for slot in 0..node.inputs.len() {
            let Some(src) = node.input(slot) else {
                continue;
            };
            if let Some(token) = self.tokens.get(&(src, tag.clone())) {
                arrived += 1;
                if let (true, Some(value)) = (chosen.is_none(), token) {
                    chosen = Some((slot, value.clone()));
                }
            }
        }

        let (value, index) = match chosen {
            Some((slot, value)) if ctrl_live => {
                (Some(value), Some(TensorVal::scalar(Scalar::Int(slot as i64))))
            }
            Some(_) => (None, None),
            None if arrived == node.inputs.len() => (None, None),
            None => return Ok(()),
        };
        self.fired.insert((node.id, tag.clone()));
        self.emit(Output::new(node.id, 0), tag.clone(), value);
        self.emit(Output::new(node.id, 1), tag, index);
        Ok(())
    }

    fn emit(&mut self, out: Output, tag: FrameTag, token: Token) {
        log::trace!(
            "{}:{} @ {} -> {}",
            self.graph.nodes()[out.node.0].name,
            out.index,
            tag,
            token
                .as_ref()
                .map(|v| v.fill.to_string())
                .unwrap_or_else(|| "dead".to_string())
        );
        self.trace.record(out, tag.clone(), token.clone());
        for consumer in &self.consumers[out.node.0] {
            self.queue.push_back((*consumer, tag.clone()));
        }
        self.tokens.insert((out, tag), token);
    }
}

fn eval_err(node: &Node, message: impl Into<String>) -> EvalError {
    EvalError::Evaluation {
        op: node.op.name(),
        message: format!("{}: {}", node.name, message.into()),
    }
}

fn compute(node: &Node, args: &[TensorVal]) -> Result<TensorVal, EvalError> {
    let Some(ty) = node.output_types.first() else {
        return Err(eval_err(node, "node has no outputs"));
    };
    let fill = match (&node.op, args) {
        (Op::Const { value, .. }, []) => *value,
        (Op::Identity | Op::LoopCond, [x]) => x.fill,
        (Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Less | Op::Greater, [lhs, rhs]) => {
            binary(node, ty.dtype, lhs.fill, rhs.fill)?
        }
        _ => {
            return Err(eval_err(
                node,
                format!("cannot evaluate with {} inputs", args.len()),
            ))
        }
    };
    Ok(TensorVal::from_type(ty, fill))
}

fn binary(node: &Node, out_dtype: DType, lhs: Scalar, rhs: Scalar) -> Result<Scalar, EvalError> {
    match (lhs, rhs) {
        (Scalar::Int(a), Scalar::Int(b)) => {
            let value = match node.op {
                Op::Less => return Ok(Scalar::Bool(a < b)),
                Op::Greater => return Ok(Scalar::Bool(a > b)),
                Op::Add => a.checked_add(b),
                Op::Sub => a.checked_sub(b),
                Op::Mul => a.checked_mul(b),
                Op::Div if b == 0 => return Err(eval_err(node, "division by zero")),
                Op::Div => a.checked_div(b),
                _ => None,
            };
            match value.and_then(|v| i32::try_from(v).ok()) {
                Some(v) if out_dtype == DType::I32 => Ok(Scalar::Int(i64::from(v))),
                _ => Err(eval_err(node, format!("i32 overflow computing {a} and {b}"))),
            }
        }
        (Scalar::Float(a), Scalar::Float(b)) => Ok(match node.op {
            Op::Less => Scalar::Bool(a < b),
            Op::Greater => Scalar::Bool(a > b),
            Op::Add => Scalar::Float(a + b),
            Op::Sub => Scalar::Float(a - b),
            Op::Mul => Scalar::Float(a * b),
            _ => Scalar::Float(a / b),
        }),
        _ => Err(eval_err(
            node,
            format!("operands {} and {} have different dtypes", lhs.dtype(), rhs.dtype()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Scope;
    use crate::ops::{self, const_bool, const_f32, const_i32};

    #[test]
    fn straight_line_arithmetic() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_f32(&mut graph, &root, 1.5).unwrap();
        let b = const_f32(&mut graph, &root, 2.0).unwrap();
        let c = ops::mul(&mut graph, &root, a, b).unwrap();

        let values = Executor::new(&graph).run(&[c]).unwrap();
        assert_eq!(values[0].as_f64(), Some(3.0));
    }

    #[test]
    fn switch_kills_the_untaken_branch() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let x = const_i32(&mut graph, &root, 4).unwrap();
        let p = const_bool(&mut graph, &root, false).unwrap();
        let sw = ops::switch(&mut graph, &root, x, p).unwrap();
        let one = const_i32(&mut graph, &root, 1).unwrap();
        let dead_sum = ops::add(&mut graph, &root, sw.output_true, one).unwrap();

        let mut exec = Executor::new(&graph);
        let values = exec.run(&[sw.output_false]).unwrap();
        assert_eq!(values[0].as_i64(), Some(4));
        assert_eq!(exec.trace().values(dead_sum), &[(FrameTag::root(), None::<TensorVal>)]);
        let err = exec.run(&[dead_sum]).unwrap_err();
        assert!(matches!(err, EvalError::NotProduced { .. }));
    }

    #[test]
    fn dead_control_input_kills_constants() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let x = const_i32(&mut graph, &root, 4).unwrap();
        let p = const_bool(&mut graph, &root, true).unwrap();
        let sw = ops::switch(&mut graph, &root, x, p).unwrap();
        let gated = root.with_control_dependencies(&[sw.output_false]);
        let c = const_i32(&mut graph, &gated, 7).unwrap();

        let mut exec = Executor::new(&graph);
        assert!(exec.run(&[c]).is_err());
        assert_eq!(exec.trace().values(c).len(), 1);
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let mut graph = Graph::new();
        let root = Scope::root();
        let a = const_i32(&mut graph, &root, 1).unwrap();
        let b = const_i32(&mut graph, &root, 0).unwrap();
        let c = ops::div(&mut graph, &root, a, b).unwrap();
        let err = Executor::new(&graph).run(&[c]).unwrap_err();
        assert!(matches!(err, EvalError::Evaluation { op: "Div", .. }));
    }

    #[test]
    fn frame_tags_display_nesting() {
        let tag = FrameTag::root().enter("outer").enter("inner");
        let tag = tag.next_iteration().unwrap();
        assert_eq!(tag.to_string(), "outer:0/inner:1");
        assert_eq!(tag.exit().unwrap().to_string(), "outer:0");
        assert_eq!(FrameTag::root().to_string(), "root");
        assert!(FrameTag::root().exit().is_none());
    }
}
