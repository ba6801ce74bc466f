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

//! In-process reader: loads `.debug_info` with gimli instead of spawning a
//! dumper. Produces the same entry model as the text and tree parsers, with
//! unit-relative offsets and `DW_AT_decl_file` indices resolved to paths.

use std::borrow::Cow;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use gimli::{AttributeValue, Endianity, Reader};
use log::debug;
use object::{Object, ObjectSection, ObjectSymbol};

use super::DumpSource;
use crate::entries::{AttrValue, CompilationUnit, Entry, Tag};
use crate::errors::DumpError;

type DwarfReader = gimli::EndianRcSlice<gimli::RunTimeEndian>;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeReader;

impl DumpSource for NativeReader {
    fn dump(&self, object: &Path) -> Result<Vec<CompilationUnit>, DumpError> {
        let data = fs::read(object).map_err(|source| DumpError::Io {
            path: object.to_path_buf(),
            source,
        })?;
        read_units(&data)
    }
}

fn malformed(e: impl std::fmt::Display) -> DumpError {
    DumpError::MalformedDump(e.to_string())
}

/// Parse an object file image and convert every compilation unit it carries.
pub fn read_units(data: &[u8]) -> Result<Vec<CompilationUnit>, DumpError> {
    let obj_file = object::File::parse(data).map_err(malformed)?;
    let endian = if obj_file.is_little_endian() {
        gimli::RunTimeEndian::Little
    } else {
        gimli::RunTimeEndian::Big
    };
    // Relocatable ELF objects leave string and reference offsets in the
    // relocation tables; Mach-O objects don't need this.
    let relocate = obj_file.kind() == object::ObjectKind::Relocatable
        && obj_file.format() == object::BinaryFormat::Elf;

    let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
        let data = match obj_file.section_by_name(id.name()) {
            Some(section) => section_bytes(&obj_file, &section, relocate, endian),
            None => Vec::new(),
        };
        let data_rc: Rc<[u8]> = Rc::from(data);
        Ok(gimli::EndianRcSlice::new(data_rc, endian))
    };

    let dwarf = gimli::Dwarf::load(&load_section).map_err(malformed)?;
    units_from_dwarf(&dwarf)
}

fn section_bytes(
    file: &object::File<'_>,
    section: &object::Section<'_, '_>,
    relocate: bool,
    endian: gimli::RunTimeEndian,
) -> Vec<u8> {
    let mut data = section
        .uncompressed_data()
        .map(Cow::into_owned)
        .unwrap_or_default();
    if relocate {
        for (offset, reloc) in section.relocations() {
            apply_relocation(file, &mut data, offset, &reloc, endian);
        }
    }
    data
}

fn apply_relocation(
    file: &object::File<'_>,
    data: &mut [u8],
    offset: u64,
    reloc: &object::Relocation,
    endian: gimli::RunTimeEndian,
) {
    if reloc.kind() != object::RelocationKind::Absolute {
        return;
    }
    let object::RelocationTarget::Symbol(index) = reloc.target() else {
        return;
    };
    let Ok(symbol) = file.symbol_by_index(index) else {
        debug!("relocation at 0x{offset:x} names a missing symbol");
        return;
    };
    let value = symbol.address().wrapping_add(reloc.addend() as u64);
    if !patch_slot(
        data,
        offset,
        reloc.size(),
        value,
        reloc.has_implicit_addend(),
        endian,
    ) {
        debug!("relocation at 0x{offset:x} ({} bits) not applied", reloc.size());
    }
}

/// Store `value` into the `bits`-wide slot at `offset`, adding the addend
/// already stored there when it is implicit. False if the slot is out of range
/// or of an unsupported width.
fn patch_slot(
    data: &mut [u8],
    offset: u64,
    bits: u8,
    value: u64,
    implicit_addend: bool,
    endian: gimli::RunTimeEndian,
) -> bool {
    let width = match bits {
        32 => 4,
        64 => 8,
        _ => return false,
    };
    let Some(slot) = usize::try_from(offset)
        .ok()
        .and_then(|start| Some(start..start.checked_add(width)?))
        .and_then(|range| data.get_mut(range))
    else {
        return false;
    };
    if width == 4 {
        let addend = if implicit_addend {
            u64::from(endian.read_u32(slot))
        } else {
            0
        };
        endian.write_u32(slot, value.wrapping_add(addend) as u32);
    } else {
        let addend = if implicit_addend {
            endian.read_u64(slot)
        } else {
            0
        };
        endian.write_u64(slot, value.wrapping_add(addend));
    }
    true
}

pub(crate) fn units_from_dwarf(
    dwarf: &gimli::Dwarf<DwarfReader>,
) -> Result<Vec<CompilationUnit>, DumpError> {
    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers.next().map_err(malformed)? {
        let unit = dwarf.unit(header).map_err(malformed)?;
        units.push(convert_unit(dwarf, &unit)?);
    }
    Ok(units)
}

fn convert_unit(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &gimli::Unit<DwarfReader>,
) -> Result<CompilationUnit, DumpError> {
    let mut cu = CompilationUnit::new();
    // Arena indices of the ancestors of the next entry
    let mut stack: Vec<usize> = Vec::new();
    let mut depth: isize = 0;

    let mut entries = unit.entries();
    while let Some((delta, entry)) = entries.next_dfs().map_err(malformed)? {
        depth += delta;
        stack.truncate(depth.max(0) as usize);

        let tag = match entry.tag().static_string() {
            Some(name) => Tag::from_name(name),
            None => Tag::Other(format!("DW_TAG_0x{:x}", entry.tag().0)),
        };
        let mut converted = Entry::new(entry.offset().0 as u64, tag);

        let mut attrs = entry.attrs();
        while let Some(attr) = attrs.next().map_err(malformed)? {
            let name = match attr.name().static_string() {
                Some(name) => name.to_string(),
                None => format!("DW_AT_0x{:x}", attr.name().0),
            };
            converted
                .attrs
                .insert(name, convert_attr(dwarf, unit, attr.value()));
        }

        let idx = cu.push(converted, stack.last().copied())?;
        stack.push(idx);
    }
    Ok(cu)
}

fn convert_attr(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &gimli::Unit<DwarfReader>,
    value: AttributeValue<DwarfReader>,
) -> AttrValue {
    match value {
        AttributeValue::UnitRef(off) => AttrValue::Ref(off.0 as u64),
        AttributeValue::DebugInfoRef(off) => match off.to_unit_offset(&unit.header) {
            Some(local) => AttrValue::Ref(local.0 as u64),
            None => AttrValue::Other(format!(".debug_info+0x{:x}", off.0)),
        },
        AttributeValue::FileIndex(index) => match file_path(dwarf, unit, index) {
            Some(path) => AttrValue::Str(path),
            None => AttrValue::Unsigned(index),
        },
        AttributeValue::Flag(flag) => AttrValue::Flag(flag),
        other => {
            if let Some(v) = other.udata_value() {
                return AttrValue::Unsigned(v);
            }
            match reader_string(dwarf, unit, other.clone()) {
                Some(s) => AttrValue::Str(s),
                None => AttrValue::Other(format!("{other:?}")),
            }
        }
    }
}

fn reader_string(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &gimli::Unit<DwarfReader>,
    value: AttributeValue<DwarfReader>,
) -> Option<String> {
    let s = dwarf.attr_string(unit, value).ok()?;
    let text = s.to_string_lossy().ok()?;
    Some(text.into_owned())
}

/// Full path of a line-table file entry: directory (made absolute against
/// the unit's `DW_AT_comp_dir`) joined with the file name.
fn file_path(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &gimli::Unit<DwarfReader>,
    index: u64,
) -> Option<String> {
    let header = unit.line_program.as_ref()?.header();
    let file = header.file(index)?;
    let name = reader_string(dwarf, unit, file.path_name())?;
    if name.starts_with('/') {
        return Some(name);
    }

    let mut dir = match file.directory(header) {
        Some(d) => reader_string(dwarf, unit, d)?,
        None => String::new(),
    };
    if !dir.starts_with('/') {
        if let Some(comp_dir) = unit.comp_dir.as_ref().and_then(|c| c.to_string_lossy().ok()) {
            dir = if dir.is_empty() {
                comp_dir.into_owned()
            } else {
                format!("{}/{}", comp_dir.trim_end_matches('/'), dir)
            };
        }
    }
    if dir.is_empty() {
        Some(name)
    } else {
        Some(format!("{}/{}", dir.trim_end_matches('/'), name))
    }
}
