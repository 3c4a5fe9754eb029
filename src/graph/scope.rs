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

use super::{Graph, Output};

/// Naming prefix and control dependencies applied to nodes created through
/// it. Scopes are plain values; the graph they build into is passed
/// separately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    name: String,
    control_deps: Vec<Output>,
}

impl Scope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn control_dependencies(&self) -> &[Output] {
        &self.control_deps
    }

    /// Child scope `<name>/<child>` inheriting the control dependencies.
    pub fn new_sub_scope(&self, child: &str) -> Scope {
        let name = match (self.name.is_empty(), child.is_empty()) {
            (_, true) => self.name.clone(),
            (true, false) => child.to_string(),
            (false, false) => format!("{}/{}", self.name, child),
        };
        Scope {
            name,
            control_deps: self.control_deps.clone(),
        }
    }

    pub fn with_control_dependencies(&self, deps: &[Output]) -> Scope {
        let mut scope = self.clone();
        for dep in deps {
            if !scope.control_deps.contains(dep) {
                scope.control_deps.push(*dep);
            }
        }
        scope
    }

    /// Scope-qualified, graph-unique name for a new node of kind `op`.
    pub fn unique_name_for_op(&self, graph: &mut Graph, op: &str) -> String {
        if self.name.is_empty() {
            graph.unique_name(op)
        } else {
            graph.unique_name(&format!("{}/{}", self.name, op))
        }
    }
}
