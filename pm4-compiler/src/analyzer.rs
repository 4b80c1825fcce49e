// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files;
use codespan_reporting::term;
use codespan_reporting::term::termcolor;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use pm4_runtime::{EnumTable, GpuVariantMask, Tables, ValueKind};

use crate::ast::*;

pub mod layout;
pub mod resolve;

/// Name of the enum listing the command packet opcodes.
pub const OPCODE_ENUM: &str = "adreno_pm4_type3_packets";

/// List of unique errors reported as analyzer diagnostics.
#[repr(u16)]
#[derive(Copy, Clone)]
pub enum ErrorCode {
    LoadError = 1,
    DuplicateEnum = 2,
    EnumOverflow = 3,
    MissingBitSpec = 4,
    UnresolvedType = 5,
    AmbiguousArray = 6,
    ReverseOffset = 7,
    DuplicateBitset = 8,
    AmbiguousType = 9,
    RecursiveBitset = 10,
    InvalidBitRange = 11,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "E{}", *self as u16)
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        format!("{}", code)
    }
}

/// Aggregate analyzer diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic<FileId>>,
}

impl Diagnostics {
    fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn push(&mut self, diagnostic: Diagnostic<FileId>) {
        self.diagnostics.push(diagnostic)
    }

    fn err_or<T>(self, value: T) -> Result<T, Diagnostics> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn emit(
        &self,
        sources: &SourceDatabase,
        writer: &mut dyn termcolor::WriteColor,
    ) -> Result<(), files::Error> {
        let config = term::Config::default();
        for d in self.diagnostics.iter() {
            term::emit(writer, &config, sources, d)?;
        }
        Ok(())
    }
}

impl From<Diagnostic<FileId>> for Diagnostics {
    fn from(diagnostic: Diagnostic<FileId>) -> Self {
        Diagnostics { diagnostics: vec![diagnostic] }
    }
}

/// Resolved meaning of a `type` attribute.
#[derive(Debug, Clone, Copy)]
pub enum TypeRef<'d> {
    Builtin(ValueKind),
    Enum(u8),
    Bitset(&'d Bitset),
    Unresolved,
}

/// Revision of an enum entry: the oldest generation named by its
/// `variants` attribute, or 0 when unconstrained.
fn revision(variants: Option<&str>) -> u32 {
    variants
        .and_then(|variants| GpuVariantMask::parse(variants).oldest())
        .map(|variant| variant.generation())
        .unwrap_or(0)
}

#[derive(Debug)]
struct CatalogEnum<'d> {
    decl: &'d Enum,
    /// Value names after revision overrides, with the revision of the
    /// retained entry.
    values: BTreeMap<u32, (&'d EnumValue, u32)>,
}

/// Global catalog of the enums and bitsets of a description, flattened
/// across the root and every domain.
#[derive(Debug)]
pub struct Catalog<'d> {
    /// Reference to the description tree.
    pub file: &'d File,
    enums: Vec<CatalogEnum<'d>>,
    enum_handles: HashMap<&'d str, u8>,
    bitsets: HashMap<&'d str, &'d Bitset>,
}

impl<'d> Catalog<'d> {
    pub fn new(file: &'d File, diagnostics: &mut Diagnostics) -> Catalog<'d> {
        let mut catalog =
            Catalog { file, enums: vec![], enum_handles: HashMap::new(), bitsets: HashMap::new() };

        let enums = file.enums().chain(file.domains().flat_map(|domain| domain.enums()));
        for decl in enums {
            if let Some(handle) = catalog.enum_handles.get(decl.name.as_str()) {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::DuplicateEnum)
                        .with_message(format!("redeclaration of enum `{}`", decl.name))
                        .with_labels(vec![
                            decl.loc.primary(),
                            catalog.enums[*handle as usize]
                                .decl
                                .loc
                                .secondary()
                                .with_message(format!("`{}` is first declared here", decl.name)),
                        ]),
                );
                continue;
            }
            let Ok(handle) = u8::try_from(catalog.enums.len()) else {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::EnumOverflow)
                        .with_message(format!(
                            "enum `{}` exceeds the maximum of 256 enums",
                            decl.name
                        ))
                        .with_labels(vec![decl.loc.primary()]),
                );
                break;
            };
            catalog.enum_handles.insert(&decl.name, handle);
            catalog.enums.push(CatalogEnum { decl, values: enum_values(decl) });
        }

        let bitsets = file.bitsets().chain(file.domains().flat_map(|domain| domain.bitsets()));
        for decl in bitsets {
            if let Some(previous) = catalog.bitsets.get(decl.name.as_str()) {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::DuplicateBitset)
                        .with_message(format!("redeclaration of bitset `{}`", decl.name))
                        .with_labels(vec![
                            decl.loc.primary(),
                            previous
                                .loc
                                .secondary()
                                .with_message(format!("`{}` is first declared here", decl.name)),
                        ]),
                );
                continue;
            }
            if let Some(handle) = catalog.enum_handles.get(decl.name.as_str()) {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::AmbiguousType)
                        .with_message(format!(
                            "type `{}` is declared as both an enum and a bitset",
                            decl.name
                        ))
                        .with_labels(vec![
                            decl.loc.primary(),
                            catalog.enums[*handle as usize]
                                .decl
                                .loc
                                .secondary()
                                .with_message(format!("`{}` is declared as an enum here", decl.name)),
                        ]),
                );
            }
            catalog.bitsets.insert(&decl.name, decl);
        }

        catalog
    }

    pub fn enum_handle(&self, name: &str) -> Option<u8> {
        self.enum_handles.get(name).copied()
    }

    pub fn bitset(&self, name: &str) -> Option<&'d Bitset> {
        self.bitsets.get(name).copied()
    }

    /// Resolve the name of a field or register type.
    pub fn resolve_type(&self, name: &str) -> TypeRef<'d> {
        if let Some(kind) = ValueKind::from_builtin(name) {
            TypeRef::Builtin(kind)
        } else if let Some(handle) = self.enum_handle(name) {
            TypeRef::Enum(handle)
        } else if let Some(bitset) = self.bitset(name) {
            TypeRef::Bitset(bitset)
        } else {
            TypeRef::Unresolved
        }
    }

    /// Return the value of the entry `value_name` of the enum `enum_name`.
    pub fn enum_value(&self, enum_name: &str, value_name: &str) -> Option<u32> {
        let handle = self.enum_handle(enum_name)?;
        self.enums[handle as usize]
            .decl
            .values
            .iter()
            .find(|entry| entry.name == value_name)
            .and_then(|entry| entry.value)
    }

    /// Return the opcode enum declaration, if the description has one.
    pub fn opcode_enum(&self) -> Option<&'d Enum> {
        let handle = self.enum_handle(OPCODE_ENUM)?;
        Some(self.enums[handle as usize].decl)
    }

    /// Return the resolved opcode entries, ordered by opcode.
    pub fn opcodes(&self) -> Vec<pm4_runtime::Opcode> {
        let Some(handle) = self.enum_handle(OPCODE_ENUM) else {
            return vec![];
        };
        self.enums[handle as usize]
            .values
            .iter()
            .filter(|(_, (entry, _))| entry.name.starts_with("CP_"))
            .map(|(value, (entry, _))| pm4_runtime::Opcode {
                opcode: *value,
                name: entry.name.clone(),
            })
            .collect()
    }

    /// Return the enum reflection tables, indexed by handle.
    pub fn enum_tables(&self) -> Vec<EnumTable> {
        self.enums
            .iter()
            .map(|decl| EnumTable {
                name: decl.decl.name.clone(),
                values: decl
                    .values
                    .iter()
                    .map(|(value, (entry, _))| (*value, entry.name.clone()))
                    .collect(),
            })
            .collect()
    }
}

/// Build the value table of an enum. When two colliding entries both name
/// a generation, the entry of the later revision wins and document order
/// breaks ties. Otherwise the later entry wins.
fn enum_values(decl: &Enum) -> BTreeMap<u32, (&EnumValue, u32)> {
    let mut values: BTreeMap<u32, (&EnumValue, u32)> = BTreeMap::new();
    for entry in &decl.values {
        let Some(value) = entry.value else {
            continue;
        };
        let entry_revision = revision(entry.variants.as_deref());
        let superseded = values.get(&value).is_some_and(|(_, previous_revision)| {
            entry_revision != 0 && *previous_revision != 0 && *previous_revision > entry_revision
        });
        if superseded {
            tracing::trace!("{}: {} is superseded by a later revision", decl.name, entry.name);
            continue;
        }
        values.insert(value, (entry, entry_revision));
    }
    values
}

/// Analyze a description tree and lower it to the reflection tables.
pub fn analyze(file: &File) -> Result<Tables, Diagnostics> {
    let mut diagnostics = Diagnostics::default();
    let catalog = Catalog::new(file, &mut diagnostics);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let registers = resolve::registers(&catalog, &mut diagnostics);
    let packets = resolve::packets(&catalog, &mut diagnostics);
    diagnostics.err_or(Tables {
        opcodes: catalog.opcodes(),
        enums: catalog.enum_tables(),
        registers,
        packets,
    })
}
