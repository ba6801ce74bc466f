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

//! Parser for dumpers that emit the entry tree as JSON.
//!
//! Accepted shapes are a bare array of root entries or `{"units": [...]}`.
//! Each entry looks like
//!
//! ```json
//! { "offset": "0x2a", "tag": "DW_TAG_subprogram",
//!   "attributes": { "DW_AT_linkage_name": "_Z3addii", "DW_AT_type": { "ref": 98 } },
//!   "children": [ ... ] }
//! ```
//!
//! `offset` may be a number or a hex string. Attribute and tag names may drop
//! their `DW_AT_` / `DW_TAG_` prefix.

use std::collections::BTreeMap;
use std::io::BufRead;

use serde::Deserialize;
use serde_json::Value;

use crate::entries::{is_reference_attr, AttrValue, CompilationUnit, Entry, Tag};
use crate::errors::DumpError;

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawOffset {
    Number(u64),
    Text(String),
}

impl RawOffset {
    fn value(&self) -> Result<u64, DumpError> {
        match self {
            RawOffset::Number(n) => Ok(*n),
            RawOffset::Text(s) => parse_offset_str(s)
                .ok_or_else(|| DumpError::MalformedDump(format!("bad entry offset {s:?}"))),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawEntry {
    offset: RawOffset,
    tag: String,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    children: Vec<RawEntry>,
}

#[derive(Deserialize, Debug)]
struct RawWrapped {
    units: Vec<RawEntry>,
}

fn parse_offset_str(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse::<u64>().ok(),
    }
}

fn with_prefix(name: &str, prefix: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

fn convert_value(attr: &str, value: &Value) -> Result<AttrValue, DumpError> {
    let reference = is_reference_attr(attr);
    Ok(match value {
        Value::String(s) if reference && s.starts_with("0x") => match parse_offset_str(s) {
            Some(off) => AttrValue::Ref(off),
            None => AttrValue::Str(s.clone()),
        },
        Value::String(s) => AttrValue::Str(s.clone()),
        Value::Bool(b) => AttrValue::Flag(*b),
        Value::Number(n) => match n.as_u64() {
            Some(v) if reference => AttrValue::Ref(v),
            Some(v) => AttrValue::Unsigned(v),
            None => AttrValue::Other(n.to_string()),
        },
        Value::Object(map) if map.contains_key("ref") => {
            let off = match &map["ref"] {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => parse_offset_str(s),
                _ => None,
            };
            let off = off.ok_or_else(|| {
                DumpError::MalformedDump(format!("{attr}: bad reference {}", map["ref"]))
            })?;
            AttrValue::Ref(off)
        }
        other => AttrValue::Other(other.to_string()),
    })
}

fn push_entry(
    unit: &mut CompilationUnit,
    raw: RawEntry,
    parent: Option<usize>,
) -> Result<(), DumpError> {
    let offset = raw.offset.value()?;
    if raw.tag.trim().is_empty() {
        return Err(DumpError::MalformedDump(format!(
            "entry 0x{offset:08x} has an empty tag"
        )));
    }
    let mut entry = Entry::new(offset, Tag::from_name(&with_prefix(raw.tag.trim(), "DW_TAG_")));
    for (name, value) in &raw.attributes {
        let name = with_prefix(name, "DW_AT_");
        let value = convert_value(&name, value)?;
        entry.attrs.insert(name, value);
    }
    let idx = unit.push(entry, parent)?;
    for child in raw.children {
        push_entry(unit, child, Some(idx))?;
    }
    Ok(())
}

/// Parse a JSON tree dump into its compilation units. Each root unit entry
/// becomes one unit; stray non-unit roots are grouped into an implicit one.
pub fn parse_tree_dump<R: BufRead>(reader: R) -> Result<Vec<CompilationUnit>, DumpError> {
    let doc: Value = serde_json::from_reader(reader)
        .map_err(|e| DumpError::MalformedDump(format!("invalid JSON: {e}")))?;
    let roots: Vec<RawEntry> = match doc {
        Value::Array(_) => serde_json::from_value(doc),
        _ => serde_json::from_value::<RawWrapped>(doc).map(|w| w.units),
    }
    .map_err(|e| DumpError::MalformedDump(e.to_string()))?;

    let mut units = Vec::new();
    let mut loose = CompilationUnit::new();
    for raw in roots {
        if Tag::from_name(&with_prefix(raw.tag.trim(), "DW_TAG_")).is_unit() {
            let mut unit = CompilationUnit::new();
            push_entry(&mut unit, raw, None)?;
            units.push(unit);
        } else {
            push_entry(&mut loose, raw, None)?;
        }
    }
    if !loose.is_empty() {
        units.push(loose);
    }
    Ok(units)
}
