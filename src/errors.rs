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

//! Error types for the extraction pipeline.
//!
//! None of these abort a run. A `DumpError` costs one object file, a
//! `SignatureError` costs one function entry. Only failing to write the
//! output file (an `anyhow` error in `main`) is fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one object file into compilation units.
#[derive(Error, Debug)]
pub enum DumpError {
    /// The dumper could not be started or exited abnormally
    #[error("failed to run `{program}`: {reason}")]
    ToolInvocation { program: String, reason: String },

    /// The dump could not be parsed into entries
    #[error("malformed debug-info dump: {0}")]
    MalformedDump(String),

    /// The object file itself could not be read (in-process reader)
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to resolve one type reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("type reference 0x{0:08x} does not name an entry in this unit")]
    UnresolvedReference(u64),

    #[error("cyclic type reference through entry 0x{0:08x}")]
    CyclicReference(u64),

    /// The offset names an entry that does not describe a type
    #[error("entry 0x{offset:08x} ({tag}) is not a type")]
    NotAType { offset: u64, tag: String },

    /// The attribute holds neither a name nor an offset
    #[error("unusable type attribute value: {0}")]
    InvalidReference(String),
}

/// Why a function entry produced no signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("subprogram at 0x{offset:08x} has no linkage name")]
    MissingLinkageName { offset: u64 },

    #[error("subprogram at 0x{offset:08x}: {source}")]
    Resolve {
        offset: u64,
        #[source]
        source: ResolveError,
    },
}
