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

//! Type reference resolution.
//!
//! A type attribute is either a literal name or the offset of another entry
//! in the same unit. Offsets are followed through qualifier, pointer, typedef
//! and array entries down to a named type, building a C-like spelling on the
//! way back up:
//!
//! | entry                    | spelling            |
//! |--------------------------|---------------------|
//! | base / struct / enum     | `name` (`ns::name`) |
//! | pointer to T             | `T*`                |
//! | reference to T           | `T&` / `T&&`        |
//! | const T (T not a pointer)| `const T`           |
//! | const T (T a pointer)    | `T const`           |
//! | typedef of T             | `T`                 |
//! | array of T               | `T[N]` / `T[]`      |
//! | function type            | `R(P1, P2)`         |
//!
//! Typedefs never survive: signatures are compared on their underlying
//! representation. A missing `DW_AT_type` means `void`.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::entries::{
    AttrValue, CompilationUnit, Entry, Tag, TypeRef, AT_CONTAINING_TYPE, AT_COUNT, AT_TYPE,
    AT_UPPER_BOUND,
};
use crate::errors::ResolveError;

pub const VOID: &str = "void";

#[derive(Debug, Clone)]
struct Resolved {
    text: String,
    // Pointer, reference or pointer-to-member: qualifiers go after it.
    pointer_like: bool,
}

impl Resolved {
    fn named(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pointer_like: false,
        }
    }

    fn void() -> Self {
        Self::named(VOID)
    }
}

/// Resolves type references within one compilation unit. Results are cached
/// per offset, so one resolver should be reused for every entry of the unit.
#[derive(Debug)]
pub struct TypeResolver<'a> {
    unit: &'a CompilationUnit,
    cache: HashMap<u64, Resolved>,
    // Offsets on the current resolution chain
    in_progress: HashSet<u64>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(unit: &'a CompilationUnit) -> Self {
        Self {
            unit,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    pub fn unit(&self) -> &'a CompilationUnit {
        self.unit
    }

    /// Resolve a type reference to its canonical spelling.
    pub fn resolve(&mut self, reference: &TypeRef) -> Result<String, ResolveError> {
        self.resolve_ref(reference).map(|r| r.text)
    }

    /// Resolve the value of a `DW_AT_type` attribute; no attribute is `void`.
    pub fn resolve_attr(&mut self, value: Option<&AttrValue>) -> Result<String, ResolveError> {
        self.resolve_type_attr(value).map(|r| r.text)
    }

    fn resolve_type_attr(&mut self, value: Option<&AttrValue>) -> Result<Resolved, ResolveError> {
        match value {
            None => Ok(Resolved::void()),
            Some(v) => {
                let reference = TypeRef::from_attr(v)
                    .ok_or_else(|| ResolveError::InvalidReference(format!("{v:?}")))?;
                self.resolve_ref(&reference)
            }
        }
    }

    fn resolve_ref(&mut self, reference: &TypeRef) -> Result<Resolved, ResolveError> {
        match reference {
            TypeRef::Inline(name) => Ok(Resolved {
                text: name.clone(),
                pointer_like: name.ends_with('*') || name.ends_with('&'),
            }),
            TypeRef::Offset(off) => self.resolve_offset(*off),
        }
    }

    fn resolve_offset(&mut self, offset: u64) -> Result<Resolved, ResolveError> {
        if let Some(hit) = self.cache.get(&offset) {
            return Ok(hit.clone());
        }
        if !self.in_progress.insert(offset) {
            return Err(ResolveError::CyclicReference(offset));
        }
        trace!("resolving type at 0x{offset:08x}");
        let result = self.resolve_entry(offset);
        self.in_progress.remove(&offset);
        if let Ok(resolved) = &result {
            self.cache.insert(offset, resolved.clone());
        }
        result
    }

    fn resolve_entry(&mut self, offset: u64) -> Result<Resolved, ResolveError> {
        let unit = self.unit;
        let idx = unit
            .index_of(offset)
            .ok_or(ResolveError::UnresolvedReference(offset))?;
        let entry = unit.entry(idx);

        match &entry.tag {
            Tag::BaseType | Tag::UnspecifiedType => {
                Ok(Resolved::named(entry.name().unwrap_or(VOID)))
            }
            Tag::StructureType | Tag::ClassType | Tag::UnionType | Tag::EnumerationType => {
                Ok(Resolved::named(self.qualified_name(idx)))
            }
            Tag::Typedef => self.target(entry),
            Tag::PointerType => self.suffixed(entry, "*"),
            Tag::ReferenceType => self.suffixed(entry, "&"),
            Tag::RvalueReferenceType => self.suffixed(entry, "&&"),
            Tag::ConstType => self.qualified(entry, "const"),
            Tag::VolatileType => self.qualified(entry, "volatile"),
            Tag::RestrictType => {
                let inner = self.target(entry)?;
                Ok(Resolved {
                    text: format!("{} restrict", inner.text),
                    pointer_like: inner.pointer_like,
                })
            }
            Tag::AtomicType => {
                let inner = self.target(entry)?;
                Ok(Resolved::named(format!("_Atomic {}", inner.text)))
            }
            Tag::ArrayType => {
                let inner = self.target(entry)?;
                Ok(Resolved::named(format!("{}{}", inner.text, self.array_bounds(idx))))
            }
            Tag::SubroutineType => {
                let ret = self.target(entry)?;
                let params = self.parameter_types(idx)?;
                Ok(Resolved::named(format!("{}({})", ret.text, params.join(", "))))
            }
            Tag::PtrToMemberType => {
                let inner = self.target(entry)?;
                let class = self.resolve_type_attr(entry.attr(AT_CONTAINING_TYPE))?;
                Ok(Resolved {
                    text: format!("{} {}::*", inner.text, class.text),
                    pointer_like: true,
                })
            }
            other => Err(ResolveError::NotAType {
                offset,
                tag: tag_label(other),
            }),
        }
    }

    /// The type an entry wraps, `void` when it has none.
    fn target(&mut self, entry: &Entry) -> Result<Resolved, ResolveError> {
        self.resolve_type_attr(entry.attr(AT_TYPE))
    }

    fn suffixed(&mut self, entry: &Entry, marker: &str) -> Result<Resolved, ResolveError> {
        let inner = self.target(entry)?;
        Ok(Resolved {
            text: format!("{}{}", inner.text, marker),
            pointer_like: true,
        })
    }

    fn qualified(&mut self, entry: &Entry, keyword: &str) -> Result<Resolved, ResolveError> {
        let inner = self.target(entry)?;
        let text = if inner.pointer_like {
            format!("{} {}", inner.text, keyword)
        } else {
            format!("{} {}", keyword, inner.text)
        };
        Ok(Resolved {
            text,
            pointer_like: inner.pointer_like,
        })
    }

    /// Parameter spellings for the formal-parameter children of `idx`, with a
    /// trailing `...` for variadic entries. A parameter of a concrete instance
    /// takes its type from the abstract parameter it points at.
    pub fn parameter_types(&mut self, idx: usize) -> Result<Vec<String>, ResolveError> {
        let unit = self.unit;
        let mut params = Vec::new();
        for &child in &unit.entry(idx).children {
            match unit.entry(child).tag {
                Tag::FormalParameter => {
                    params.push(self.resolve_attr(unit.inherited_attr(child, AT_TYPE))?)
                }
                Tag::UnspecifiedParameters => params.push("...".to_string()),
                _ => {}
            }
        }
        Ok(params)
    }

    fn array_bounds(&self, idx: usize) -> String {
        let mut bounds = String::new();
        for child in self.unit.children(idx) {
            if child.tag != Tag::SubrangeType {
                continue;
            }
            let count = child
                .attr(AT_COUNT)
                .and_then(AttrValue::as_unsigned)
                .or_else(|| {
                    child
                        .attr(AT_UPPER_BOUND)
                        .and_then(AttrValue::as_unsigned)
                        .and_then(|upper| upper.checked_add(1))
                });
            match count {
                Some(n) => bounds.push_str(&format!("[{n}]")),
                None => bounds.push_str("[]"),
            }
        }
        if bounds.is_empty() {
            bounds.push_str("[]");
        }
        bounds
    }

    /// `outer::Inner` for aggregates nested in namespaces or other aggregates.
    fn qualified_name(&self, idx: usize) -> String {
        let mut parts = vec![display_name(self.unit.entry(idx))];
        let mut parent = self.unit.entry(idx).parent;
        while let Some(p) = parent {
            let scope = self.unit.entry(p);
            if scope.tag.is_named_scope() {
                parts.push(display_name(scope));
            }
            parent = scope.parent;
        }
        parts.reverse();
        parts.join("::")
    }
}

fn display_name(entry: &Entry) -> String {
    if let Some(name) = entry.name() {
        return name.to_string();
    }
    let kind = match entry.tag {
        Tag::Namespace => "namespace",
        Tag::ClassType => "class",
        Tag::UnionType => "union",
        Tag::EnumerationType => "enum",
        _ => "struct",
    };
    format!("(anonymous {kind})")
}

fn tag_label(tag: &Tag) -> String {
    match tag {
        Tag::Other(name) => name.clone(),
        known => format!("{known:?}"),
    }
}

/// One-shot resolution of a single reference.
pub fn resolve(reference: &TypeRef, unit: &CompilationUnit) -> Result<String, ResolveError> {
    TypeResolver::new(unit).resolve(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{AT_ABSTRACT_ORIGIN, AT_NAME};

    struct UnitBuilder {
        unit: CompilationUnit,
    }

    impl UnitBuilder {
        fn new() -> Self {
            let mut unit = CompilationUnit::new();
            unit.push(Entry::new(0, Tag::CompileUnit), None).unwrap();
            Self { unit }
        }

        fn add(&mut self, offset: u64, tag: Tag, name: Option<&str>, ty: Option<u64>) -> usize {
            self.add_under(0, offset, tag, name, ty)
        }

        fn add_under(
            &mut self,
            parent: usize,
            offset: u64,
            tag: Tag,
            name: Option<&str>,
            ty: Option<u64>,
        ) -> usize {
            let mut entry = Entry::new(offset, tag);
            if let Some(name) = name {
                entry = entry.with_attr(AT_NAME, AttrValue::Str(name.into()));
            }
            if let Some(ty) = ty {
                entry = entry.with_attr(AT_TYPE, AttrValue::Ref(ty));
            }
            self.unit.push(entry, Some(parent)).unwrap()
        }
    }

    fn resolve_at(unit: &CompilationUnit, off: u64) -> Result<String, ResolveError> {
        resolve(&TypeRef::Offset(off), unit)
    }

    #[test]
    fn inline_names_are_returned_verbatim() {
        let b = UnitBuilder::new();
        assert_eq!(
            resolve(&TypeRef::Inline("unsigned long".into()), &b.unit).unwrap(),
            "unsigned long"
        );
    }

    #[test]
    fn qualifier_order_is_preserved() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("int"), None);
        b.add(0x20, Tag::ConstType, None, Some(0x10)); // const int
        b.add(0x30, Tag::PointerType, None, Some(0x20)); // const int*
        b.add(0x40, Tag::PointerType, None, Some(0x10)); // int*
        b.add(0x50, Tag::ConstType, None, Some(0x40)); // int* const
        b.add(0x60, Tag::ConstType, None, Some(0x30)); // const int* const
        b.add(0x70, Tag::VolatileType, None, Some(0x50)); // int* const volatile

        assert_eq!(resolve_at(&b.unit, 0x20).unwrap(), "const int");
        assert_eq!(resolve_at(&b.unit, 0x30).unwrap(), "const int*");
        assert_eq!(resolve_at(&b.unit, 0x50).unwrap(), "int* const");
        assert_ne!(
            resolve_at(&b.unit, 0x30).unwrap(),
            resolve_at(&b.unit, 0x50).unwrap()
        );
        assert_eq!(resolve_at(&b.unit, 0x60).unwrap(), "const int* const");
        assert_eq!(resolve_at(&b.unit, 0x70).unwrap(), "int* const volatile");
    }

    #[test]
    fn typedefs_are_transparent() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("unsigned long"), None);
        b.add(0x20, Tag::Typedef, Some("size_t"), Some(0x10));
        b.add(0x30, Tag::Typedef, Some("my_size"), Some(0x20));
        b.add(0x40, Tag::PointerType, None, Some(0x30));
        b.add(0x50, Tag::ConstType, None, Some(0x40));
        assert_eq!(resolve_at(&b.unit, 0x30).unwrap(), "unsigned long");
        assert_eq!(resolve_at(&b.unit, 0x40).unwrap(), "unsigned long*");
        // A typedef of a pointer is still a pointer for qualifier placement.
        b.add(0x60, Tag::Typedef, Some("ulong_ptr"), Some(0x40));
        b.add(0x70, Tag::ConstType, None, Some(0x60));
        assert_eq!(resolve_at(&b.unit, 0x70).unwrap(), "unsigned long* const");
        assert_eq!(resolve_at(&b.unit, 0x50).unwrap(), "unsigned long* const");
    }

    #[test]
    fn missing_target_is_void() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::PointerType, None, None);
        b.add(0x20, Tag::ConstType, None, None);
        b.add(0x30, Tag::PointerType, None, Some(0x20));
        assert_eq!(resolve_at(&b.unit, 0x10).unwrap(), "void*");
        assert_eq!(resolve_at(&b.unit, 0x30).unwrap(), "const void*");
        let mut r = TypeResolver::new(&b.unit);
        assert_eq!(r.resolve_attr(None).unwrap(), "void");
    }

    #[test]
    fn arrays_carry_their_bounds() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("char"), None);
        let arr = b.add(0x20, Tag::ArrayType, None, Some(0x10));
        b.add_under(arr, 0x21, Tag::SubrangeType, None, None);
        assert_eq!(resolve_at(&b.unit, 0x20).unwrap(), "char[]");

        let mut c = UnitBuilder::new();
        c.add(0x10, Tag::BaseType, Some("char"), None);
        let arr = c.add(0x20, Tag::ArrayType, None, Some(0x10));
        c.unit
            .push(
                Entry::new(0x21, Tag::SubrangeType).with_attr(AT_COUNT, AttrValue::Unsigned(16)),
                Some(arr),
            )
            .unwrap();
        c.unit
            .push(
                Entry::new(0x22, Tag::SubrangeType)
                    .with_attr(AT_UPPER_BOUND, AttrValue::Unsigned(3)),
                Some(arr),
            )
            .unwrap();
        assert_eq!(resolve_at(&c.unit, 0x20).unwrap(), "char[16][4]");
    }

    #[test]
    fn aggregates_are_scope_qualified() {
        let mut b = UnitBuilder::new();
        let ns = b.add(0x10, Tag::Namespace, Some("audio"), None);
        let class = b.add_under(ns, 0x20, Tag::ClassType, Some("Buffer"), None);
        b.add_under(class, 0x30, Tag::EnumerationType, Some("Kind"), None);
        b.add(0x40, Tag::StructureType, None, None);
        b.add(0x50, Tag::ReferenceType, None, Some(0x20));
        b.add(0x60, Tag::ConstType, None, Some(0x20));
        b.add(0x70, Tag::ReferenceType, None, Some(0x60));
        assert_eq!(resolve_at(&b.unit, 0x20).unwrap(), "audio::Buffer");
        assert_eq!(resolve_at(&b.unit, 0x30).unwrap(), "audio::Buffer::Kind");
        assert_eq!(resolve_at(&b.unit, 0x40).unwrap(), "(anonymous struct)");
        assert_eq!(resolve_at(&b.unit, 0x50).unwrap(), "audio::Buffer&");
        assert_eq!(resolve_at(&b.unit, 0x70).unwrap(), "const audio::Buffer&");
    }

    #[test]
    fn function_types_spell_their_parameters() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("int"), None);
        b.add(0x11, Tag::BaseType, Some("char"), None);
        let f = b.add(0x20, Tag::SubroutineType, None, Some(0x10));
        b.add_under(f, 0x21, Tag::FormalParameter, None, Some(0x10));
        b.add_under(f, 0x22, Tag::FormalParameter, None, Some(0x11));
        b.add_under(f, 0x23, Tag::UnspecifiedParameters, None, None);
        b.add(0x30, Tag::PointerType, None, Some(0x20));
        assert_eq!(resolve_at(&b.unit, 0x30).unwrap(), "int(int, char, ...)*");
    }

    #[test]
    fn dangling_offsets_are_unresolved() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::PointerType, None, Some(0x99));
        assert_eq!(
            resolve_at(&b.unit, 0x10),
            Err(ResolveError::UnresolvedReference(0x99))
        );
        assert_eq!(
            resolve_at(&b.unit, 0x1234),
            Err(ResolveError::UnresolvedReference(0x1234))
        );
    }

    #[test]
    fn cycles_are_detected() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::PointerType, None, Some(0x20));
        b.add(0x20, Tag::Typedef, Some("loop"), Some(0x10));
        assert_eq!(
            resolve_at(&b.unit, 0x10),
            Err(ResolveError::CyclicReference(0x10))
        );
        // Self-reference.
        b.add(0x30, Tag::ConstType, None, Some(0x30));
        assert_eq!(
            resolve_at(&b.unit, 0x30),
            Err(ResolveError::CyclicReference(0x30))
        );
    }

    #[test]
    fn non_type_entries_are_rejected() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::Subprogram, Some("f"), None);
        assert!(matches!(
            resolve_at(&b.unit, 0x10),
            Err(ResolveError::NotAType { offset: 0x10, .. })
        ));
    }

    #[test]
    fn shared_resolver_caches_without_leaking_chain_state() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("int"), None);
        b.add(0x20, Tag::PointerType, None, Some(0x10));
        b.add(0x30, Tag::PointerType, None, Some(0x20));
        let mut r = TypeResolver::new(&b.unit);
        assert_eq!(r.resolve(&TypeRef::Offset(0x20)).unwrap(), "int*");
        assert_eq!(r.resolve(&TypeRef::Offset(0x30)).unwrap(), "int**");
        assert_eq!(r.resolve(&TypeRef::Offset(0x20)).unwrap(), "int*");
    }

    #[test]
    fn concrete_parameters_take_their_abstract_type() {
        let mut b = UnitBuilder::new();
        b.add(0x10, Tag::BaseType, Some("int"), None);
        b.add(0x11, Tag::BaseType, Some("char"), None);
        let abs = b.add(0x20, Tag::Subprogram, Some("add"), Some(0x10));
        b.add_under(abs, 0x21, Tag::FormalParameter, Some("a"), Some(0x10));
        b.add_under(abs, 0x22, Tag::FormalParameter, Some("b"), Some(0x11));
        let concrete = b
            .unit
            .push(
                Entry::new(0x40, Tag::Subprogram).with_attr(AT_ABSTRACT_ORIGIN, AttrValue::Ref(0x20)),
                Some(0),
            )
            .unwrap();
        for (off, origin) in [(0x41, 0x21), (0x42, 0x22)] {
            b.unit
                .push(
                    Entry::new(off, Tag::FormalParameter)
                        .with_attr(AT_ABSTRACT_ORIGIN, AttrValue::Ref(origin)),
                    Some(concrete),
                )
                .unwrap();
        }
        let mut r = TypeResolver::new(&b.unit);
        assert_eq!(r.parameter_types(concrete).unwrap(), vec!["int", "char"]);
        assert_eq!(r.parameter_types(abs).unwrap(), vec!["int", "char"]);
    }
}
