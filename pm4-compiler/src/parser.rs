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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::analyzer::ErrorCode;
use crate::ast;

/// Documentation elements, skipped without notice.
const DOC_ELEMENTS: &[&str] = &["doc", "brief", "copyright", "license", "author", "nick"];

type Node<'a, 'i> = roxmltree::Node<'a, 'i>;

struct Context<'a> {
    file: ast::FileId,
    line_starts: &'a [usize],
}

impl Context<'_> {
    fn range(&self, node: Node<'_, '_>) -> ast::SourceRange {
        let range = node.range();
        ast::SourceRange {
            file: self.file,
            start: ast::SourceLocation::new(range.start, self.line_starts),
            end: ast::SourceLocation::new(range.end, self.line_starts),
        }
    }

    fn error(&self, node: Node<'_, '_>, message: String) -> Diagnostic<ast::FileId> {
        Diagnostic::error()
            .with_code(ErrorCode::LoadError)
            .with_message(message)
            .with_labels(vec![self.range(node).primary()])
    }

    fn required(&self, node: Node<'_, '_>, attribute: &str) -> Result<String, Diagnostic<ast::FileId>> {
        node.attribute(attribute).map(str::to_owned).ok_or_else(|| {
            self.error(
                node,
                format!("missing attribute `{}` on element `{}`", attribute, node.tag_name().name()),
            )
        })
    }

    fn optional(&self, node: Node<'_, '_>, attribute: &str) -> Option<String> {
        node.attribute(attribute).map(str::to_owned)
    }

    fn integer(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
    ) -> Result<Option<u32>, Diagnostic<ast::FileId>> {
        match node.attribute(attribute) {
            None => Ok(None),
            Some(text) => parse_integer(text).map(Some).ok_or_else(|| {
                self.error(node, format!("invalid integer value `{}` for `{}`", text, attribute))
            }),
        }
    }

    fn required_integer(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
    ) -> Result<u32, Diagnostic<ast::FileId>> {
        self.integer(node, attribute)?.ok_or_else(|| {
            self.error(
                node,
                format!("missing attribute `{}` on element `{}`", attribute, node.tag_name().name()),
            )
        })
    }
}

/// Parse an integer attribute value.
/// Accepts decimal and `0x` prefixed hexadecimal values. Negative values
/// are stored in two's complement.
pub fn parse_integer(text: &str) -> Option<u32> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u64>().ok()?,
    };
    if negative {
        (value <= 1 << 31).then(|| (value as u32).wrapping_neg())
    } else {
        u32::try_from(value).ok()
    }
}

fn skip(node: Node<'_, '_>) {
    let name = node.tag_name().name();
    if !DOC_ELEMENTS.contains(&name) {
        tracing::debug!("skipping unsupported element `{}`", name);
    }
}

fn parse_bitfield(node: Node<'_, '_>, ctx: &Context) -> Result<ast::Bitfield, Diagnostic<ast::FileId>> {
    Ok(ast::Bitfield {
        loc: ctx.range(node),
        name: ctx.required(node, "name")?,
        pos: ctx.integer(node, "pos")?,
        low: ctx.integer(node, "low")?,
        high: ctx.integer(node, "high")?,
        type_id: ctx.optional(node, "type"),
        shr: ctx.integer(node, "shr")?.unwrap_or(0),
        radix: ctx.integer(node, "radix")?.unwrap_or(0),
        variants: ctx.optional(node, "variants"),
        addvariant: node.has_attribute("addvariant"),
    })
}

fn parse_bitfields(
    node: Node<'_, '_>,
    ctx: &Context,
) -> Result<Vec<ast::Bitfield>, Diagnostic<ast::FileId>> {
    let mut bitfields = vec![];
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "bitfield" => bitfields.push(parse_bitfield(child, ctx)?),
            _ => skip(child),
        }
    }
    Ok(bitfields)
}

fn parse_register(
    node: Node<'_, '_>,
    width: ast::RegisterWidth,
    ctx: &Context,
) -> Result<ast::Register, Diagnostic<ast::FileId>> {
    Ok(ast::Register {
        loc: ctx.range(node),
        width,
        name: ctx.required(node, "name")?,
        offset: ctx.required_integer(node, "offset")?,
        type_id: ctx.optional(node, "type"),
        shr: ctx.integer(node, "shr")?.unwrap_or(0),
        radix: ctx.integer(node, "radix")?.unwrap_or(0),
        variants: ctx.optional(node, "variants"),
        addvariant: node.has_attribute("addvariant"),
        bitfields: parse_bitfields(node, ctx)?,
    })
}

fn register_width(node: Node<'_, '_>) -> Option<ast::RegisterWidth> {
    match node.tag_name().name() {
        "reg32" => Some(ast::RegisterWidth::Reg32),
        "reg64" => Some(ast::RegisterWidth::Reg64),
        _ => None,
    }
}

fn parse_registers(
    node: Node<'_, '_>,
    ctx: &Context,
) -> Result<Vec<ast::Register>, Diagnostic<ast::FileId>> {
    let mut registers = vec![];
    for child in node.children().filter(Node::is_element) {
        match register_width(child) {
            Some(width) => registers.push(parse_register(child, width, ctx)?),
            None => skip(child),
        }
    }
    Ok(registers)
}

fn parse_enum(node: Node<'_, '_>, ctx: &Context) -> Result<ast::Enum, Diagnostic<ast::FileId>> {
    let mut values = vec![];
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "value" => values.push(ast::EnumValue {
                loc: ctx.range(child),
                name: ctx.required(child, "name")?,
                value: ctx.integer(child, "value")?,
                variants: ctx.optional(child, "variants"),
            }),
            _ => skip(child),
        }
    }
    Ok(ast::Enum { loc: ctx.range(node), name: ctx.required(node, "name")?, values })
}

fn parse_bitset(node: Node<'_, '_>, ctx: &Context) -> Result<ast::Bitset, Diagnostic<ast::FileId>> {
    Ok(ast::Bitset {
        loc: ctx.range(node),
        name: ctx.required(node, "name")?,
        bitfields: parse_bitfields(node, ctx)?,
    })
}

fn parse_array(node: Node<'_, '_>, ctx: &Context) -> Result<ast::Array, Diagnostic<ast::FileId>> {
    Ok(ast::Array {
        loc: ctx.range(node),
        name: ctx.optional(node, "name"),
        offset: ctx.integer(node, "offset")?.unwrap_or(0),
        stride: ctx.required_integer(node, "stride")?,
        length: ctx.required_integer(node, "length")?,
        variants: ctx.optional(node, "variants"),
        registers: parse_registers(node, ctx)?,
    })
}

fn parse_domain(node: Node<'_, '_>, ctx: &Context) -> Result<ast::Domain, Diagnostic<ast::FileId>> {
    let varset = ctx.optional(node, "varset");
    let mut elements = vec![];
    for child in node.children().filter(Node::is_element) {
        if let Some(width) = register_width(child) {
            elements.push(ast::Element::Register(parse_register(child, width, ctx)?));
            continue;
        }
        match child.tag_name().name() {
            "array" => elements.push(ast::Element::Array(parse_array(child, ctx)?)),
            "stripe" => elements.push(ast::Element::Stripe(ast::Stripe {
                loc: ctx.range(child),
                varset: ctx
                    .optional(child, "varset")
                    .or_else(|| varset.clone())
                    .unwrap_or_else(|| "chip".to_owned()),
                variants: ctx.optional(child, "variants"),
                prefix: ctx.optional(child, "prefix"),
                registers: parse_registers(child, ctx)?,
            })),
            "enum" => elements.push(ast::Element::Enum(parse_enum(child, ctx)?)),
            "bitset" => elements.push(ast::Element::Bitset(parse_bitset(child, ctx)?)),
            _ => skip(child),
        }
    }
    Ok(ast::Domain {
        loc: ctx.range(node),
        name: ctx.required(node, "name")?,
        varset,
        variants: ctx.optional(node, "variants"),
        elements,
    })
}

/// Recursive document loader.
/// Tracks the canonical paths of the documents already merged so that
/// each document is spliced at most once.
struct Loader<'s> {
    sources: &'s mut ast::SourceDatabase,
    root_dir: PathBuf,
    visited: HashSet<PathBuf>,
    files: Vec<ast::FileId>,
}

impl Loader<'_> {
    fn load_path(
        &mut self,
        name: &str,
        import: Option<(&Context, Node<'_, '_>)>,
    ) -> Result<Vec<ast::Decl>, Diagnostic<ast::FileId>> {
        let path = self.root_dir.join(name);
        let error = |message: String| match import {
            Some((ctx, node)) => ctx.error(node, message),
            None => Diagnostic::error().with_code(ErrorCode::LoadError).with_message(message),
        };
        let canonical = path.canonicalize().map_err(|e| {
            error(format!("failed to read input file '{}': {}", path.display(), e))
        })?;
        if !self.visited.insert(canonical.clone()) {
            tracing::debug!("skipping already imported file '{}'", path.display());
            return Ok(vec![]);
        }
        let source = std::fs::read_to_string(&canonical).map_err(|e| {
            error(format!("failed to read input file '{}': {}", path.display(), e))
        })?;
        self.load_source(canonical.display().to_string(), source)
    }

    fn load_source(
        &mut self,
        name: String,
        source: String,
    ) -> Result<Vec<ast::Decl>, Diagnostic<ast::FileId>> {
        let line_starts: Vec<_> = files::line_starts(&source).collect();
        let file = self.sources.add(name.clone(), source.clone());
        self.files.push(file);
        let ctx = Context { file, line_starts: &line_starts };

        let document = roxmltree::Document::parse(&source).map_err(|e| {
            let pos = e.pos();
            let offset = line_starts
                .get((pos.row as usize).saturating_sub(1))
                .map(|start| start + (pos.col as usize).saturating_sub(1))
                .unwrap_or(0)
                .min(source.len());
            Diagnostic::error()
                .with_code(ErrorCode::LoadError)
                .with_message(format!("failed to parse input file '{}': {}", name, e))
                .with_labels(vec![codespan_reporting::diagnostic::Label::primary(
                    file,
                    offset..offset,
                )])
        })?;

        let mut declarations = vec![];
        for node in document.root_element().children().filter(Node::is_element) {
            match node.tag_name().name() {
                "import" => {
                    let import = ctx.required(node, "file")?;
                    declarations.extend(self.load_path(&import, Some((&ctx, node)))?);
                }
                "domain" => declarations.push(ast::Decl::Domain(parse_domain(node, &ctx)?)),
                "enum" => declarations.push(ast::Decl::Enum(parse_enum(node, &ctx)?)),
                "bitset" => declarations.push(ast::Decl::Bitset(parse_bitset(node, &ctx)?)),
                _ => skip(node),
            }
        }
        Ok(declarations)
    }

    fn finish(self, declarations: Vec<ast::Decl>) -> Result<ast::File, Diagnostic<ast::FileId>> {
        Ok(ast::File { root: self.files[0], files: self.files, declarations })
    }
}

/// Parse a source document held in memory.
///
/// The source is added to the source database under `name`. Imports
/// are resolved relative to the directory of `name`.
pub fn parse_inline(
    sources: &mut ast::SourceDatabase,
    name: &str,
    source: String,
) -> Result<ast::File, Diagnostic<ast::FileId>> {
    let root_dir = Path::new(name).parent().map(Path::to_path_buf).unwrap_or_default();
    let mut loader = Loader { sources, root_dir, visited: HashSet::new(), files: vec![] };
    let declarations = loader.load_source(name.to_owned(), source)?;
    loader.finish(declarations)
}

/// Parse a new source file.
///
/// The root document `name` is read from `root_dir` and every imported
/// document is read and added to the compilation database. Returns the
/// description tree with the imports spliced in, or a descriptive error
/// in case of a missing file or malformed document.
pub fn parse_file(
    sources: &mut ast::SourceDatabase,
    root_dir: &Path,
    name: &str,
) -> Result<ast::File, Diagnostic<ast::FileId>> {
    let mut loader = Loader {
        sources,
        root_dir: root_dir.to_path_buf(),
        visited: HashSet::new(),
        files: vec![],
    };
    let declarations = loader.load_path(name, None)?;
    loader.finish(declarations)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> ast::File {
        let mut db = ast::SourceDatabase::new();
        parse_inline(&mut db, "stdin", text.to_owned()).expect("parsing failure")
    }

    fn names(file: &ast::File) -> Vec<String> {
        file.declarations
            .iter()
            .map(|decl| match decl {
                ast::Decl::Domain(domain) => domain.name.clone(),
                ast::Decl::Enum(decl) => decl.name.clone(),
                ast::Decl::Bitset(decl) => decl.name.clone(),
            })
            .collect()
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("0x2a"), Some(42));
        assert_eq!(parse_integer("0X2A"), Some(42));
        assert_eq!(parse_integer("-1"), Some(u32::MAX));
        assert_eq!(parse_integer("4294967296"), None);
        assert_eq!(parse_integer("seven"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn test_parse_domain() {
        let file = parse(
            r#"
<database xmlns="http://nouveau.freedesktop.org/">
  <copyright><author name="someone"/></copyright>
  <domain name="CP_DRAW_INDX" varset="chip">
    <doc>Draw packet</doc>
    <reg32 offset="0" name="0">
      <bitfield name="PRIM_TYPE" low="0" high="5" type="pc_di_primtype"/>
      <bitfield name="ENABLE" pos="6" addvariant="yes"/>
    </reg32>
    <reg64 offset="0x1" name="ADDR" type="address"/>
    <stripe variants="A7XX-" prefix="NEW">
      <reg32 offset="3" name="3"/>
    </stripe>
  </domain>
</database>
"#,
        );
        let domain = file.domain("CP_DRAW_INDX").unwrap();
        assert_eq!(domain.varset.as_deref(), Some("chip"));
        let registers: Vec<_> = domain.registers().collect();
        assert_eq!(registers.len(), 2);
        assert_eq!(registers[0].bitfields.len(), 2);
        assert_eq!(registers[0].bitfields[0].high, Some(5));
        assert!(registers[0].bitfields[1].addvariant);
        assert_eq!(registers[1].width, ast::RegisterWidth::Reg64);
        assert_eq!(registers[1].offset, 1);
        let stripe = domain.stripes().next().unwrap();
        assert_eq!(stripe.varset, "chip");
        assert_eq!(stripe.prefix.as_deref(), Some("NEW"));
    }

    #[test]
    fn test_parse_errors() {
        let mut db = ast::SourceDatabase::new();
        let result = parse_inline(&mut db, "stdin", "<database><domain".to_owned());
        assert_eq!(result.unwrap_err().code, Some(ErrorCode::LoadError.into()));

        let result =
            parse_inline(&mut db, "stdin", r#"<database><domain/></database>"#.to_owned());
        assert_eq!(result.unwrap_err().code, Some(ErrorCode::LoadError.into()));

        let result = parse_inline(
            &mut db,
            "stdin",
            r#"<database><enum name="E"><value name="V" value="1x"/></enum></database>"#.to_owned(),
        );
        assert_eq!(result.unwrap_err().code, Some(ErrorCode::LoadError.into()));

        let result = parse_file(&mut db, Path::new("/nonexistent"), "root.xml");
        assert_eq!(result.unwrap_err().code, Some(ErrorCode::LoadError.into()));
    }

    #[test]
    fn test_imports_are_spliced_once() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(text.as_bytes()).unwrap();
        };
        write(
            "root.xml",
            r#"<database>
                 <enum name="first"/>
                 <import file="left.xml"/>
                 <import file="right.xml"/>
                 <enum name="last"/>
               </database>"#,
        );
        write(
            "left.xml",
            r#"<database><import file="common.xml"/><enum name="left"/></database>"#,
        );
        write(
            "right.xml",
            r#"<database><import file="common.xml"/><import file="root.xml"/><enum name="right"/></database>"#,
        );
        write("common.xml", r#"<database><bitset name="common"/></database>"#);

        let mut db = ast::SourceDatabase::new();
        let file = parse_file(&mut db, dir.path(), "root.xml").unwrap();
        assert_eq!(names(&file), vec!["first", "common", "left", "right", "last"]);
        assert_eq!(file.files.len(), 4);
        assert_eq!(file.root, file.files[0]);
    }

    #[test]
    fn test_missing_import() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("root.xml"),
            r#"<database><import file="missing.xml"/></database>"#,
        )
        .unwrap();
        let mut db = ast::SourceDatabase::new();
        let diagnostic = parse_file(&mut db, dir.path(), "root.xml").unwrap_err();
        assert_eq!(diagnostic.code, Some(ErrorCode::LoadError.into()));
        assert_eq!(diagnostic.labels.len(), 1);
    }
}
