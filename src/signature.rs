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

use std::fmt;

use crate::entries::{AttrValue, CompilationUnit, AT_LINKAGE_NAME, AT_MIPS_LINKAGE_NAME, AT_TYPE};
use crate::errors::{ResolveError, SignatureError};
use crate::resolve::TypeResolver;

/// A function as the linker and its callers see it. Two signatures are the
/// same function only if the whole tuple matches; parameter order matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionSignature {
    pub linkage_name: String,
    pub return_type: String,
    pub parameters: Vec<String>,
}

impl FunctionSignature {
    pub fn new(
        linkage_name: impl Into<String>,
        return_type: impl Into<String>,
        parameters: Vec<String>,
    ) -> Self {
        Self {
            linkage_name: linkage_name.into(),
            return_type: return_type.into(),
            parameters,
        }
    }
}

/// `<return type> <linkage name>(<param>, <param>, ...)`
impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}({})",
            self.return_type,
            self.linkage_name,
            self.parameters.join(", ")
        )
    }
}

/// Build the signature of the subprogram at `idx`, reusing `resolver`'s cache.
///
/// Linkage name and return type may come from the declaration the entry
/// completes; parameters are always the entry's own formal-parameter children.
/// Any resolution failure rejects the whole signature.
pub fn assemble_with(
    resolver: &mut TypeResolver<'_>,
    idx: usize,
) -> Result<FunctionSignature, SignatureError> {
    let unit = resolver.unit();
    let offset = unit.entry(idx).offset;

    let linkage_name = [AT_LINKAGE_NAME, AT_MIPS_LINKAGE_NAME]
        .iter()
        .find_map(|at| unit.inherited_attr(idx, at).and_then(AttrValue::as_str))
        .filter(|name| !name.is_empty())
        .ok_or(SignatureError::MissingLinkageName { offset })?;

    let to_signature_error = |source: ResolveError| SignatureError::Resolve { offset, source };
    let return_type = resolver
        .resolve_attr(unit.inherited_attr(idx, AT_TYPE))
        .map_err(to_signature_error)?;
    let parameters = resolver
        .parameter_types(idx)
        .map_err(to_signature_error)?;

    Ok(FunctionSignature::new(linkage_name, return_type, parameters))
}

/// Build the signature of the subprogram at `idx` of `unit`.
pub fn assemble(unit: &CompilationUnit, idx: usize) -> Result<FunctionSignature, SignatureError> {
    assemble_with(&mut TypeResolver::new(unit), idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{Entry, Tag, AT_NAME, AT_SPECIFICATION};

    fn base_unit() -> CompilationUnit {
        let mut cu = CompilationUnit::new();
        cu.push(Entry::new(0x0b, Tag::CompileUnit), None).unwrap();
        cu.push(
            Entry::new(0x10, Tag::BaseType).with_attr(AT_NAME, AttrValue::Str("int".into())),
            Some(0),
        )
        .unwrap();
        cu.push(
            Entry::new(0x11, Tag::BaseType).with_attr(AT_NAME, AttrValue::Str("double".into())),
            Some(0),
        )
        .unwrap();
        cu
    }

    fn add_function(
        cu: &mut CompilationUnit,
        offset: u64,
        linkage: Option<&str>,
        ret: Option<u64>,
        params: &[u64],
    ) -> usize {
        let mut entry = Entry::new(offset, Tag::Subprogram);
        if let Some(name) = linkage {
            entry = entry.with_attr(AT_LINKAGE_NAME, AttrValue::Str(name.into()));
        }
        if let Some(ret) = ret {
            entry = entry.with_attr(AT_TYPE, AttrValue::Ref(ret));
        }
        let idx = cu.push(entry, Some(0)).unwrap();
        for (i, ty) in params.iter().enumerate() {
            cu.push(
                Entry::new(offset + 1 + i as u64, Tag::FormalParameter)
                    .with_attr(AT_TYPE, AttrValue::Ref(*ty)),
                Some(idx),
            )
            .unwrap();
        }
        idx
    }

    #[test]
    fn renders_canonical_form() {
        let mut cu = base_unit();
        let idx = add_function(&mut cu, 0x20, Some("_Z3addii"), Some(0x10), &[0x10, 0x10]);
        let sig = assemble(&cu, idx).unwrap();
        assert_eq!(sig.to_string(), "int _Z3addii(int, int)");
    }

    #[test]
    fn missing_return_type_is_void() {
        let mut cu = base_unit();
        let idx = add_function(&mut cu, 0x20, Some("_Z4stepv"), None, &[]);
        assert_eq!(assemble(&cu, idx).unwrap().to_string(), "void _Z4stepv()");
    }

    #[test]
    fn parameter_order_distinguishes_signatures() {
        let mut cu = base_unit();
        let a = add_function(&mut cu, 0x20, Some("_Z1fid"), None, &[0x10, 0x11]);
        let b = add_function(&mut cu, 0x30, Some("_Z1fid"), None, &[0x11, 0x10]);
        let (a, b) = (assemble(&cu, a).unwrap(), assemble(&cu, b).unwrap());
        assert_eq!(a.parameters, vec!["int", "double"]);
        assert_ne!(a, b);
    }

    #[test]
    fn missing_linkage_name_is_reported() {
        let mut cu = base_unit();
        let idx = add_function(&mut cu, 0x20, None, Some(0x10), &[]);
        assert_eq!(
            assemble(&cu, idx),
            Err(SignatureError::MissingLinkageName { offset: 0x20 })
        );
    }

    #[test]
    fn a_bad_parameter_rejects_the_whole_signature() {
        let mut cu = base_unit();
        let idx = add_function(&mut cu, 0x20, Some("_Z1gi"), Some(0x10), &[0x10, 0x99]);
        assert_eq!(
            assemble(&cu, idx),
            Err(SignatureError::Resolve {
                offset: 0x20,
                source: ResolveError::UnresolvedReference(0x99)
            })
        );
    }

    #[test]
    fn definitions_inherit_from_their_declaration() {
        let mut cu = base_unit();
        add_function(&mut cu, 0x20, Some("_ZN1W3getEi"), Some(0x11), &[]);
        let def = cu
            .push(
                Entry::new(0x40, Tag::Subprogram).with_attr(AT_SPECIFICATION, AttrValue::Ref(0x20)),
                Some(0),
            )
            .unwrap();
        cu.push(
            Entry::new(0x41, Tag::FormalParameter).with_attr(AT_TYPE, AttrValue::Ref(0x10)),
            Some(def),
        )
        .unwrap();
        assert_eq!(
            assemble(&cu, def).unwrap().to_string(),
            "double _ZN1W3getEi(int)"
        );
    }

    #[test]
    fn mips_linkage_name_is_accepted() {
        let mut cu = base_unit();
        let idx = cu
            .push(
                Entry::new(0x20, Tag::Subprogram)
                    .with_attr(AT_MIPS_LINKAGE_NAME, AttrValue::Str("_Z3oldv".into())),
                Some(0),
            )
            .unwrap();
        assert_eq!(assemble(&cu, idx).unwrap().linkage_name, "_Z3oldv");
    }
}
