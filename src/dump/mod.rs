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

//! Dump adapter: object file -> compilation units.
//! Both dumper encodings and the in-process reader normalize into
//! `entries::CompilationUnit`, so nothing downstream knows which one ran.

pub mod native;
pub mod text;
pub mod tool;
pub mod tree;

use std::io::BufRead;
use std::path::Path;

use clap::ValueEnum;

use crate::entries::CompilationUnit;
use crate::errors::DumpError;

pub use native::NativeReader;
pub use tool::ToolDumper;

/// How the external dumper prints debug info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpEncoding {
    /// Label-delimited text (`dwarfdump --debug-info`)
    Text,
    /// JSON tree of entries
    Tree,
}

/// Anything that can produce the compilation units of one object file.
pub trait DumpSource: Sync {
    fn dump(&self, object: &Path) -> Result<Vec<CompilationUnit>, DumpError>;
}

/// Parse a dump in the given encoding.
pub fn parse_dump<R: BufRead>(
    encoding: DumpEncoding,
    reader: R,
) -> Result<Vec<CompilationUnit>, DumpError> {
    match encoding {
        DumpEncoding::Text => text::parse_text_dump(reader),
        DumpEncoding::Tree => tree::parse_tree_dump(reader),
    }
}
