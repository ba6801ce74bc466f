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

//! Parser for the textual `dwarfdump --debug-info` layout.
//!
//! Each entry starts with an offset line and its tag; its attributes follow
//! on indented lines until the next offset line:
//!
//! ```text
//! 0x0000002a:   DW_TAG_subprogram
//!                 DW_AT_linkage_name	("_Z3addii")
//!                 DW_AT_decl_file	("/proj/Source/math.cpp")
//!                 DW_AT_type	(0x00000062 "int")
//!
//! 0x00000045:     DW_TAG_formal_parameter
//!                   DW_AT_type	(0x00000062 "int")
//!
//! 0x00000061:     NULL
//! ```
//!
//! Nesting is recovered from how far the tag is indented past the offset.
//! `NULL` terminators and unit header lines carry no information we need.

use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;

use crate::entries::{is_reference_attr, AttrValue, CompilationUnit, Entry, Tag};
use crate::errors::DumpError;

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x([0-9a-fA-F]+):(\s*)(.*?)\s*$").expect("entry regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The `[DW_FORM_*]` group only appears in --verbose dumps.
    RE.get_or_init(|| {
        Regex::new(r"^\s+(DW_AT_[A-Za-z0-9_]+)(?:\s*\[[^\]]*\])?\s*\((.*?)\)?\s*$")
            .expect("attribute regex")
    })
}

fn ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `0x00000062 "int"` or, verbose, `cu + 0x0057 => {0x00000062} "int"`
    RE.get_or_init(|| {
        Regex::new(r#"^(?:.*\{)?0x([0-9a-fA-F]+)\}?(?:\s+"(.*)")?$"#).expect("reference regex")
    })
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `"add"` or, verbose, `.debug_str[0x00000000] = "add"`
    RE.get_or_init(|| Regex::new(r#"^(?:[^"]*=\s*)?"(.*)"$"#).expect("string regex"))
}

struct Pending {
    entry: Entry,
    indent: usize,
}

/// Accumulates the entries of the unit currently being read.
#[derive(Default)]
struct UnitBuilder {
    unit: CompilationUnit,
    // (indent, arena index) of the open ancestors
    stack: Vec<(usize, usize)>,
    pending: Option<Pending>,
}

impl UnitBuilder {
    fn flush(&mut self) -> Result<(), DumpError> {
        if let Some(p) = self.pending.take() {
            while self
                .stack
                .last()
                .is_some_and(|&(indent, _)| indent >= p.indent)
            {
                self.stack.pop();
            }
            let parent = self.stack.last().map(|&(_, idx)| idx);
            let idx = self.unit.push(p.entry, parent)?;
            self.stack.push((p.indent, idx));
        }
        Ok(())
    }

    fn open(&mut self, entry: Entry, indent: usize) -> Result<(), DumpError> {
        self.flush()?;
        self.pending = Some(Pending { entry, indent });
        Ok(())
    }

    fn set_attr(&mut self, name: &str, value: AttrValue) -> bool {
        match self.pending.as_mut() {
            Some(p) => {
                p.entry.attrs.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn finish(&mut self) -> Result<Option<CompilationUnit>, DumpError> {
        self.flush()?;
        self.stack.clear();
        if self.unit.is_empty() {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.unit)))
    }
}

pub(crate) fn parse_value(attr: &str, raw: &str) -> AttrValue {
    let raw = raw.trim();
    if is_reference_attr(attr) {
        if let Some(caps) = ref_re().captures(raw) {
            if let Ok(off) = u64::from_str_radix(&caps[1], 16) {
                return AttrValue::Ref(off);
            }
        }
    }
    if let Some(caps) = quoted_re().captures(raw) {
        return AttrValue::Str(caps[1].to_string());
    }
    match raw {
        "true" => return AttrValue::Flag(true),
        "false" => return AttrValue::Flag(false),
        _ => {}
    }
    let number = match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u64>().ok(),
    };
    match number {
        Some(v) => AttrValue::Unsigned(v),
        None => AttrValue::Other(raw.to_string()),
    }
}

/// Parse a textual dump into its compilation units.
pub fn parse_text_dump<R: BufRead>(mut reader: R) -> Result<Vec<CompilationUnit>, DumpError> {
    let mut units = Vec::new();
    let mut builder = UnitBuilder::default();
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| DumpError::MalformedDump(format!("read error: {e}")))?;
        if n == 0 {
            break; // EOF
        }
        line_no += 1;

        while buf
            .last()
            .map(|b| *b == b'\n' || *b == b'\r')
            .unwrap_or(false)
        {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf);
        let s: &str = line.as_ref();

        if let Some(caps) = entry_re().captures(s) {
            let offset = u64::from_str_radix(&caps[1], 16).map_err(|_| {
                DumpError::MalformedDump(format!("line {line_no}: bad entry offset {}", &caps[1]))
            })?;
            let indent = caps[2].len();
            let rest = &caps[3];
            let first = rest.split_whitespace().next().unwrap_or("");
            if first == "NULL" || rest.contains("Unit:") {
                continue;
            }
            if !first.starts_with("DW_TAG_") {
                return Err(DumpError::MalformedDump(format!(
                    "line {line_no}: entry 0x{offset:08x} has no tag"
                )));
            }
            let tag = Tag::from_name(first);
            if tag.is_unit() {
                if let Some(unit) = builder.finish()? {
                    units.push(unit);
                }
            }
            builder.open(Entry::new(offset, tag), indent)?;
            continue;
        }

        if let Some(caps) = attr_re().captures(s) {
            let name = &caps[1];
            let value = parse_value(name, &caps[2]);
            if !builder.set_attr(name, value) {
                return Err(DumpError::MalformedDump(format!(
                    "line {line_no}: attribute {name} outside of any entry"
                )));
            }
        }
        // Anything else is a banner or a continuation of a multi-line value.
    }

    if let Some(unit) = builder.finish()? {
        units.push(unit);
    }
    Ok(units)
}
