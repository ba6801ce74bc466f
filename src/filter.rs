// Copyright (c) 2026 DWARF-Sig-Helper Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::entries::{AttrValue, CompilationUnit, AT_DECL_FILE};

/// Decides which entries were declared in the first-party source tree.
/// Matching is a plain string prefix test on the declared file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePathFilter {
    prefix: String,
}

impl SourcePathFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Whether the entry at `idx` belongs. Only the entry's own declaration
    /// site counts (inherited from its specification when the entry is an
    /// out-of-line definition); the types it references are never consulted.
    pub fn belongs(&self, unit: &CompilationUnit, idx: usize) -> bool {
        match unit.inherited_attr(idx, AT_DECL_FILE) {
            Some(AttrValue::Str(path)) => self.matches(path),
            _ => false,
        }
    }
}
