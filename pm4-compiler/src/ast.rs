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

use codespan_reporting::diagnostic;
use codespan_reporting::files;
use std::fmt;

/// File identifier.
/// References a source file in the source database.
pub type FileId = usize;

/// Source database.
/// Stores the source file contents for reference.
pub type SourceDatabase = files::SimpleFiles<String, String>;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceLocation {
    /// Byte offset into the file (counted from zero).
    pub offset: usize,
    /// Line number (counted from zero).
    pub line: usize,
    /// Column number (counted from zero)
    pub column: usize,
}

#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub file: FileId,
    pub start: SourceLocation,
    pub end: SourceLocation,
}

/// Storage width of a register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterWidth {
    Reg32,
    Reg64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    pub loc: SourceRange,
    pub name: String,
    pub pos: Option<u32>,
    pub low: Option<u32>,
    pub high: Option<u32>,
    pub type_id: Option<String>,
    pub shr: u32,
    pub radix: u32,
    pub variants: Option<String>,
    pub addvariant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub loc: SourceRange,
    pub width: RegisterWidth,
    pub name: String,
    /// Offset in 32-bit words from the enclosing domain or array.
    pub offset: u32,
    pub type_id: Option<String>,
    pub shr: u32,
    pub radix: u32,
    pub variants: Option<String>,
    pub addvariant: bool,
    pub bitfields: Vec<Bitfield>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub loc: SourceRange,
    pub name: String,
    /// Entries without a value only document a name and are not
    /// cataloged.
    pub value: Option<u32>,
    pub variants: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enum {
    pub loc: SourceRange,
    pub name: String,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitset {
    pub loc: SourceRange,
    pub name: String,
    pub bitfields: Vec<Bitfield>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    pub loc: SourceRange,
    pub name: Option<String>,
    pub offset: u32,
    pub stride: u32,
    pub length: u32,
    pub variants: Option<String>,
    pub registers: Vec<Register>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripe {
    pub loc: SourceRange,
    /// Either `chip` or the name of the enum selecting the stripe.
    pub varset: String,
    pub variants: Option<String>,
    pub prefix: Option<String>,
    pub registers: Vec<Register>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Register(Register),
    Array(Array),
    Stripe(Stripe),
    Enum(Enum),
    Bitset(Bitset),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub loc: SourceRange,
    pub name: String,
    pub varset: Option<String>,
    pub variants: Option<String>,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Domain(Domain),
    Enum(Enum),
    Bitset(Bitset),
}

/// Description tree with every import spliced in place.
#[derive(Debug, Clone)]
pub struct File {
    /// Root document.
    pub root: FileId,
    /// Every document merged into this tree, root first.
    pub files: Vec<FileId>,
    pub declarations: Vec<Decl>,
}

impl SourceLocation {
    /// Construct a new source location.
    ///
    /// The `line_starts` indicates the byte offsets where new lines
    /// start in the file. The first element should thus be `0` since
    /// every file has at least one line starting at offset `0`.
    pub fn new(offset: usize, line_starts: &[usize]) -> SourceLocation {
        let mut loc = SourceLocation { offset, line: 0, column: offset };
        for (line, start) in line_starts.iter().enumerate() {
            if *start > offset {
                break;
            }
            loc = SourceLocation { offset, line, column: offset - start };
        }
        loc
    }
}

impl SourceRange {
    pub fn primary(&self) -> diagnostic::Label<FileId> {
        diagnostic::Label::primary(self.file, self.start.offset..self.end.offset)
    }
    pub fn secondary(&self) -> diagnostic::Label<FileId> {
        diagnostic::Label::secondary(self.file, self.start.offset..self.end.offset)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

impl fmt::Debug for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRange").finish_non_exhaustive()
    }
}

impl RegisterWidth {
    /// Width of the register in bits.
    pub fn bits(&self) -> u32 {
        match self {
            RegisterWidth::Reg32 => 32,
            RegisterWidth::Reg64 => 64,
        }
    }

    /// Number of payload dwords occupied by the register.
    pub fn dwords(&self) -> u32 {
        match self {
            RegisterWidth::Reg32 => 1,
            RegisterWidth::Reg64 => 2,
        }
    }
}

impl Bitfield {
    /// Construct a bitfield spanning `low..=high`.
    pub fn range(name: &str, low: u32, high: u32) -> Bitfield {
        Bitfield {
            loc: SourceRange::default(),
            name: name.to_owned(),
            pos: None,
            low: Some(low),
            high: Some(high),
            type_id: None,
            shr: 0,
            radix: 0,
            variants: None,
            addvariant: false,
        }
    }
}

impl Register {
    /// Construct a register without attributes other than its name,
    /// width and offset.
    pub fn new(width: RegisterWidth, name: &str, offset: u32) -> Register {
        Register {
            loc: SourceRange::default(),
            width,
            name: name.to_owned(),
            offset,
            type_id: None,
            shr: 0,
            radix: 0,
            variants: None,
            addvariant: false,
            bitfields: vec![],
        }
    }

    /// Return the variants constraint of the register, falling back
    /// to the provided outer constraint.
    pub fn variants_or<'a>(&'a self, outer: Option<&'a str>) -> Option<&'a str> {
        self.variants.as_deref().or(outer)
    }
}

impl Domain {
    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.elements.iter().filter_map(|element| match element {
            Element::Register(register) => Some(register),
            _ => None,
        })
    }

    pub fn arrays(&self) -> impl Iterator<Item = &Array> {
        self.elements.iter().filter_map(|element| match element {
            Element::Array(array) => Some(array),
            _ => None,
        })
    }

    pub fn stripes(&self) -> impl Iterator<Item = &Stripe> {
        self.elements.iter().filter_map(|element| match element {
            Element::Stripe(stripe) => Some(stripe),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.elements.iter().filter_map(|element| match element {
            Element::Enum(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn bitsets(&self) -> impl Iterator<Item = &Bitset> {
        self.elements.iter().filter_map(|element| match element {
            Element::Bitset(decl) => Some(decl),
            _ => None,
        })
    }
}

impl File {
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.declarations.iter().filter_map(|decl| match decl {
            Decl::Domain(domain) => Some(domain),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.declarations.iter().filter_map(|decl| match decl {
            Decl::Enum(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn bitsets(&self) -> impl Iterator<Item = &Bitset> {
        self.declarations.iter().filter_map(|decl| match decl {
            Decl::Bitset(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains().find(|domain| domain.name == name)
    }
}
