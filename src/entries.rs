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

//! In-memory model of one compilation unit's debug-info entries.
//!
//! Entries live in an arena (`Vec<Entry>`) and refer to each other by index.
//! Type references in the dump are offsets, so the unit also keeps an
//! offset -> index map. Nothing here owns a pointer to another entry, which
//! keeps cyclic (malformed) inputs harmless until the resolver walks them.

use std::collections::{BTreeMap, HashMap};

use crate::errors::DumpError;

pub const AT_NAME: &str = "DW_AT_name";
pub const AT_TYPE: &str = "DW_AT_type";
pub const AT_LINKAGE_NAME: &str = "DW_AT_linkage_name";
pub const AT_MIPS_LINKAGE_NAME: &str = "DW_AT_MIPS_linkage_name";
pub const AT_DECL_FILE: &str = "DW_AT_decl_file";
pub const AT_SPECIFICATION: &str = "DW_AT_specification";
pub const AT_ABSTRACT_ORIGIN: &str = "DW_AT_abstract_origin";
pub const AT_COUNT: &str = "DW_AT_count";
pub const AT_UPPER_BOUND: &str = "DW_AT_upper_bound";
pub const AT_CONTAINING_TYPE: &str = "DW_AT_containing_type";

/// Attributes whose values address another entry of the same unit.
pub const REFERENCE_ATTRS: &[&str] = &[
    AT_TYPE,
    AT_SPECIFICATION,
    AT_ABSTRACT_ORIGIN,
    AT_CONTAINING_TYPE,
    "DW_AT_sibling",
    "DW_AT_import",
    "DW_AT_object_pointer",
];

pub fn is_reference_attr(name: &str) -> bool {
    REFERENCE_ATTRS.contains(&name)
}

/// The entry tags the pipeline cares about. Anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    CompileUnit,
    PartialUnit,
    TypeUnit,
    SkeletonUnit,
    Namespace,
    Subprogram,
    FormalParameter,
    UnspecifiedParameters,
    BaseType,
    UnspecifiedType,
    PointerType,
    ReferenceType,
    RvalueReferenceType,
    PtrToMemberType,
    ConstType,
    VolatileType,
    RestrictType,
    AtomicType,
    Typedef,
    ArrayType,
    SubrangeType,
    StructureType,
    ClassType,
    UnionType,
    EnumerationType,
    SubroutineType,
    Other(String),
}

impl Tag {
    /// Parse a `DW_TAG_*` name as printed by dumpers (and by `gimli::DwTag`).
    pub fn from_name(name: &str) -> Tag {
        match name {
            "DW_TAG_compile_unit" => Tag::CompileUnit,
            "DW_TAG_partial_unit" => Tag::PartialUnit,
            "DW_TAG_type_unit" => Tag::TypeUnit,
            "DW_TAG_skeleton_unit" => Tag::SkeletonUnit,
            "DW_TAG_namespace" => Tag::Namespace,
            "DW_TAG_subprogram" => Tag::Subprogram,
            "DW_TAG_formal_parameter" => Tag::FormalParameter,
            "DW_TAG_unspecified_parameters" => Tag::UnspecifiedParameters,
            "DW_TAG_base_type" => Tag::BaseType,
            "DW_TAG_unspecified_type" => Tag::UnspecifiedType,
            "DW_TAG_pointer_type" => Tag::PointerType,
            "DW_TAG_reference_type" => Tag::ReferenceType,
            "DW_TAG_rvalue_reference_type" => Tag::RvalueReferenceType,
            "DW_TAG_ptr_to_member_type" => Tag::PtrToMemberType,
            "DW_TAG_const_type" => Tag::ConstType,
            "DW_TAG_volatile_type" => Tag::VolatileType,
            "DW_TAG_restrict_type" => Tag::RestrictType,
            "DW_TAG_atomic_type" => Tag::AtomicType,
            "DW_TAG_typedef" => Tag::Typedef,
            "DW_TAG_array_type" => Tag::ArrayType,
            "DW_TAG_subrange_type" => Tag::SubrangeType,
            "DW_TAG_structure_type" => Tag::StructureType,
            "DW_TAG_class_type" => Tag::ClassType,
            "DW_TAG_union_type" => Tag::UnionType,
            "DW_TAG_enumeration_type" => Tag::EnumerationType,
            "DW_TAG_subroutine_type" => Tag::SubroutineType,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(
            self,
            Tag::CompileUnit | Tag::PartialUnit | Tag::TypeUnit | Tag::SkeletonUnit
        )
    }

    /// Scopes that contribute a `prefix::` to the names of types declared inside them.
    pub fn is_named_scope(&self) -> bool {
        matches!(
            self,
            Tag::Namespace | Tag::StructureType | Tag::ClassType | Tag::UnionType
        )
    }
}

/// A normalized attribute value. Every dump encoding maps onto these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    /// Offset of another entry in the same unit.
    Ref(u64),
    Unsigned(u64),
    Flag(bool),
    /// Anything the pipeline never interprets (locations, encodings, ...).
    Other(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            AttrValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }
}

/// Where a type attribute points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Inline(String),
    Offset(u64),
}

impl TypeRef {
    /// Interpret an attribute value as a type reference. `None` when the value is
    /// neither a literal name nor an offset.
    pub fn from_attr(value: &AttrValue) -> Option<TypeRef> {
        match value {
            AttrValue::Ref(off) => Some(TypeRef::Offset(*off)),
            AttrValue::Str(name) => Some(TypeRef::Inline(name.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub offset: u64,
    pub tag: Tag,
    pub attrs: BTreeMap<String, AttrValue>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Entry {
    pub fn new(offset: u64, tag: Tag) -> Self {
        Self {
            offset,
            tag,
            attrs: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.insert(name.to_string(), value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn name(&self) -> Option<&str> {
        self.attr(AT_NAME).and_then(AttrValue::as_str)
    }
}

/// One compilation unit: an arena of entries addressed by index or by offset.
#[derive(Debug, Default)]
pub struct CompilationUnit {
    entries: Vec<Entry>,
    by_offset: HashMap<u64, usize>,
    roots: Vec<usize>,
}

impl CompilationUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry below `parent` (or as a root). Offsets must be unique
    /// within the unit; a duplicate means the dump cannot be trusted.
    pub fn push(&mut self, mut entry: Entry, parent: Option<usize>) -> Result<usize, DumpError> {
        if self.by_offset.contains_key(&entry.offset) {
            return Err(DumpError::MalformedDump(format!(
                "duplicate entry offset 0x{:08x}",
                entry.offset
            )));
        }
        let idx = self.entries.len();
        entry.parent = parent;
        entry.children.clear();
        match parent {
            Some(p) => {
                let parent_entry = self.entries.get_mut(p).ok_or_else(|| {
                    DumpError::MalformedDump(format!("entry 0x{:08x} has no parent", entry.offset))
                })?;
                parent_entry.children.push(idx);
            }
            None => self.roots.push(idx),
        }
        self.by_offset.insert(entry.offset, idx);
        self.entries.push(entry);
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &Entry {
        &self.entries[idx]
    }

    pub fn index_of(&self, offset: u64) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    pub fn by_offset(&self, offset: u64) -> Option<&Entry> {
        self.index_of(offset).map(|idx| &self.entries[idx])
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn children(&self, idx: usize) -> impl Iterator<Item = &Entry> + '_ {
        self.entries[idx].children.iter().map(|&c| &self.entries[c])
    }

    /// Name of the unit, taken from its root unit entry.
    pub fn name(&self) -> Option<&str> {
        self.roots
            .iter()
            .map(|&r| &self.entries[r])
            .find(|e| e.tag.is_unit())
            .and_then(Entry::name)
    }

    /// Indices of all entries with the given tag, in dump order.
    pub fn indices_with_tag<'a>(&'a self, tag: &'a Tag) -> impl Iterator<Item = usize> + 'a {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, e)| &e.tag == tag)
            .map(|(i, _)| i)
    }

    /// Look up an attribute on the entry, falling back to the entries it
    /// completes (`DW_AT_specification`, `DW_AT_abstract_origin`).
    pub fn inherited_attr(&self, idx: usize, name: &str) -> Option<&AttrValue> {
        let mut current = idx;
        let mut seen = Vec::new();
        loop {
            let entry = &self.entries[current];
            if let Some(value) = entry.attr(name) {
                return Some(value);
            }
            seen.push(current);
            let origin = [AT_SPECIFICATION, AT_ABSTRACT_ORIGIN]
                .iter()
                .find_map(|at| match entry.attr(at) {
                    Some(AttrValue::Ref(off)) => self.index_of(*off),
                    _ => None,
                })?;
            if seen.contains(&origin) {
                return None;
            }
            current = origin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_with_spec() -> CompilationUnit {
        let mut cu = CompilationUnit::new();
        let root = cu
            .push(
                Entry::new(0x0b, Tag::CompileUnit)
                    .with_attr(AT_NAME, AttrValue::Str("/proj/Source/a.cpp".into())),
                None,
            )
            .unwrap();
        cu.push(
            Entry::new(0x20, Tag::Subprogram)
                .with_attr(AT_LINKAGE_NAME, AttrValue::Str("_ZN1W3getEv".into()))
                .with_attr(AT_DECL_FILE, AttrValue::Str("/proj/Source/a.h".into())),
            Some(root),
        )
        .unwrap();
        cu.push(
            Entry::new(0x40, Tag::Subprogram).with_attr(AT_SPECIFICATION, AttrValue::Ref(0x20)),
            Some(root),
        )
        .unwrap();
        cu
    }

    #[test]
    fn tag_names_round_into_known_variants() {
        assert_eq!(Tag::from_name("DW_TAG_subprogram"), Tag::Subprogram);
        assert_eq!(Tag::from_name("DW_TAG_const_type"), Tag::ConstType);
        assert_eq!(
            Tag::from_name("DW_TAG_lexical_block"),
            Tag::Other("DW_TAG_lexical_block".into())
        );
    }

    #[test]
    fn push_links_children_and_offsets() {
        let cu = unit_with_spec();
        assert_eq!(cu.len(), 3);
        assert_eq!(cu.roots(), &[0]);
        assert_eq!(cu.children(0).count(), 2);
        assert_eq!(cu.by_offset(0x40).map(|e| e.tag.clone()), Some(Tag::Subprogram));
        assert_eq!(cu.entry(2).parent, Some(0));
        assert_eq!(cu.name(), Some("/proj/Source/a.cpp"));
    }

    #[test]
    fn duplicate_offsets_are_malformed() {
        let mut cu = CompilationUnit::new();
        cu.push(Entry::new(1, Tag::CompileUnit), None).unwrap();
        let err = cu.push(Entry::new(1, Tag::BaseType), Some(0)).unwrap_err();
        assert!(matches!(err, DumpError::MalformedDump(_)));
    }

    #[test]
    fn inherited_attr_follows_specification() {
        let cu = unit_with_spec();
        let def = cu.index_of(0x40).unwrap();
        assert_eq!(
            cu.inherited_attr(def, AT_LINKAGE_NAME).and_then(AttrValue::as_str),
            Some("_ZN1W3getEv")
        );
        assert!(cu.inherited_attr(def, AT_TYPE).is_none());
    }

    #[test]
    fn inherited_attr_stops_on_origin_cycle() {
        let mut cu = CompilationUnit::new();
        cu.push(
            Entry::new(1, Tag::Subprogram).with_attr(AT_SPECIFICATION, AttrValue::Ref(2)),
            None,
        )
        .unwrap();
        cu.push(
            Entry::new(2, Tag::Subprogram).with_attr(AT_SPECIFICATION, AttrValue::Ref(1)),
            None,
        )
        .unwrap();
        assert!(cu.inherited_attr(0, AT_LINKAGE_NAME).is_none());
    }
}
