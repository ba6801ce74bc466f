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

//! Runs an external debug-info dumper (`dwarfdump --debug-info <obj>` by
//! default) and streams its stdout straight into the parser for the chosen
//! encoding. stderr is drained on a separate thread so a chatty dumper cannot
//! stall on a full pipe while we are still reading stdout.

use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use log::debug;

use super::{parse_dump, DumpEncoding, DumpSource};
use crate::entries::CompilationUnit;
use crate::errors::DumpError;

pub const DEFAULT_DUMPER: &str = "dwarfdump";
pub const DEFAULT_DUMPER_ARGS: &[&str] = &["--debug-info"];

#[derive(Debug, Clone)]
pub struct ToolDumper {
    pub program: String,
    /// Fixed flags; the object path is appended after them
    pub args: Vec<String>,
    pub encoding: DumpEncoding,
}

impl Default for ToolDumper {
    fn default() -> Self {
        Self {
            program: DEFAULT_DUMPER.to_string(),
            args: DEFAULT_DUMPER_ARGS.iter().map(|s| s.to_string()).collect(),
            encoding: DumpEncoding::Text,
        }
    }
}

impl ToolDumper {
    pub fn new(program: impl Into<String>, args: Vec<String>, encoding: DumpEncoding) -> Self {
        Self {
            program: program.into(),
            args,
            encoding,
        }
    }

    fn invocation_error(&self, reason: impl Into<String>) -> DumpError {
        DumpError::ToolInvocation {
            program: self.program.clone(),
            reason: reason.into(),
        }
    }
}

impl DumpSource for ToolDumper {
    fn dump(&self, object: &Path) -> Result<Vec<CompilationUnit>, DumpError> {
        debug!("running {} {:?} {}", self.program, self.args, object.display());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(object)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.invocation_error("program not found"),
                _ => self.invocation_error(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.invocation_error("failed to capture stdout"))?;
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let mut reader = BufReader::with_capacity(64 * 1024, stdout);
        let parsed = parse_dump(self.encoding, &mut reader);
        if parsed.is_err() {
            // Let the dumper finish so its exit status decides which error wins.
            let _ = io::copy(&mut reader, &mut io::sink());
        }
        drop(reader);

        let status = child.wait();
        let stderr_text = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let status = status.map_err(|e| self.invocation_error(e.to_string()))?;

        if !status.success() {
            let detail = stderr_text.lines().next().unwrap_or("").trim();
            let reason = match status.code() {
                Some(code) if detail.is_empty() => format!("exited with status {code}"),
                Some(code) => format!("exited with status {code}: {detail}"),
                None => "terminated by signal".to_string(),
            };
            return Err(self.invocation_error(reason));
        }
        parsed
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_an_invocation_error() {
        let dumper = ToolDumper::new(
            "/nonexistent/dwarf-sig-helper-dumper",
            Vec::new(),
            DumpEncoding::Text,
        );
        let err = dumper.dump(Path::new("a.o")).unwrap_err();
        match err {
            DumpError::ToolInvocation { reason, .. } => assert_eq!(reason, "program not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_is_an_invocation_error() {
        let dumper = ToolDumper::new("false", Vec::new(), DumpEncoding::Text);
        let err = dumper.dump(Path::new("a.o")).unwrap_err();
        assert!(matches!(err, DumpError::ToolInvocation { .. }));
    }

    #[test]
    fn stdout_is_parsed_in_the_chosen_encoding() {
        let dumper = ToolDumper::new(
            "sh",
            vec![
                "-c".to_string(),
                "printf '[{\"offset\": 1, \"tag\": \"DW_TAG_compile_unit\"}]'".to_string(),
            ],
            DumpEncoding::Tree,
        );
        // `sh -c script <obj>` binds the object path to $0, which the script ignores.
        let units = dumper.dump(Path::new("a.o")).unwrap();
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn failed_dumper_outranks_its_partial_output() {
        let dumper = ToolDumper::new(
            "sh",
            vec![
                "-c".to_string(),
                "printf '0x0000000b: garbage\\n'; echo 'cannot read object' >&2; exit 2".to_string(),
            ],
            DumpEncoding::Text,
        );
        match dumper.dump(Path::new("a.o")).unwrap_err() {
            DumpError::ToolInvocation { reason, .. } => {
                assert_eq!(reason, "exited with status 2: cannot read object")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn garbage_from_a_successful_dumper_is_malformed() {
        let dumper = ToolDumper::new(
            "sh",
            vec!["-c".to_string(), "printf '0x0000000b: garbage\\n'".to_string()],
            DumpEncoding::Text,
        );
        let err = dumper.dump(Path::new("a.o")).unwrap_err();
        assert!(matches!(err, DumpError::MalformedDump(_)));
    }
}
