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

//! Reference execution of loop graphs.
//!
//! The interpreter exists to check what a built graph computes; it works
//! on uniform-fill tensors and makes no attempt at speed.

pub mod dataflow;
pub mod value;

use crate::graph::{GraphError, GraphVerifyError};

pub use dataflow::{ExecTrace, Executor, FrameTag, Token};
pub use value::{format_value_human, TensorVal};

/// Interpreter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Iterations a single frame may run before the run is aborted.
    pub max_iterations: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("graph failed verification: {0}")]
    Verify(#[from] GraphVerifyError),
    #[error("frame '{frame}' exceeded {limit} iterations")]
    IterationLimit { frame: String, limit: usize },
    /// The fetched output never received a live value outside all loops.
    #[error("output {name}:{index} was not produced")]
    NotProduced { name: String, index: usize },
    #[error("{op}: {message}")]
    Evaluation { op: &'static str, message: String },
}
