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

//! Symbolic reverse-mode differentiation over the dataflow graph.
//!
//! Gradients are added as new graph nodes; nothing is evaluated. The
//! acyclic engine ([`add_symbolic_gradients`]) handles straight-line
//! regions such as a loop body, and [`while_gradients`] uses it to build
//! the gradient of a whole while loop from its recorded
//! [`WhileContext`](crate::graph::WhileContext).

mod engine;
mod rules;
pub mod while_gradients;

pub use engine::{add_symbolic_gradients, AutodiffError, GraphGradients, SymbolicGradients};
pub use while_gradients::{
    add_backprop_loop_counter, add_forward_loop_counter, add_while_gradient_loop,
    add_while_gradient_loop_with, add_while_loop_gradient,
};
