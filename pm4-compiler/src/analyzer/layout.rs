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

//! Field layout calculator.
//!
//! Converts bitfield declarations into resolved fields: mask, shift,
//! width and value interpretation. Bitset typed bitfields are expanded
//! in place.

use codespan_reporting::diagnostic::Diagnostic;

use pm4_runtime::{Field, GpuVariantMask, RegInfo, ValueKind};

use super::{Catalog, ErrorCode, TypeRef};
use crate::ast::*;

/// Mask of `width` bits starting at bit `shift`.
pub fn mask(shift: u32, width: u32) -> u64 {
    if width == 0 {
        0
    } else {
        (u64::MAX >> (64 - width)) << shift
    }
}

/// Return the `(shift, width)` of a bitfield, relative to the start of
/// its register or enclosing bitfield.
pub fn bit_range(bitfield: &Bitfield) -> Result<(u32, u32), Diagnostic<FileId>> {
    match (bitfield.pos, bitfield.low, bitfield.high) {
        (Some(pos), _, _) => Ok((pos, 1)),
        (None, Some(low), Some(high)) if low <= high => match (high - low).checked_add(1) {
            Some(width) => Ok((low, width)),
            None => Err(Diagnostic::error()
                .with_code(ErrorCode::InvalidBitRange)
                .with_message(format!("bitfield `{}` spans too many bits", bitfield.name))
                .with_labels(vec![bitfield.loc.primary()])),
        },
        (None, Some(low), Some(high)) => Err(Diagnostic::error()
            .with_code(ErrorCode::InvalidBitRange)
            .with_message(format!(
                "bitfield `{}` has a low bit {} greater than its high bit {}",
                bitfield.name, low, high
            ))
            .with_labels(vec![bitfield.loc.primary()])),
        _ => Err(Diagnostic::error()
            .with_code(ErrorCode::MissingBitSpec)
            .with_message(format!("bitfield `{}` has no bit position", bitfield.name))
            .with_labels(vec![bitfield.loc.primary()])
            .with_notes(vec!["hint: expected `pos`, or `low` and `high`".to_owned()])),
    }
}

/// Resolve the value interpretation of a field or register of the
/// given width. Untyped single bit values are booleans.
fn value_type(
    catalog: &Catalog,
    type_id: Option<&str>,
    width: u32,
    loc: &SourceRange,
) -> Result<(ValueKind, Option<u8>), Diagnostic<FileId>> {
    let Some(type_id) = type_id else {
        return Ok((if width == 1 { ValueKind::Boolean } else { ValueKind::Uint }, None));
    };
    match catalog.resolve_type(type_id) {
        TypeRef::Builtin(kind) => Ok((kind, None)),
        TypeRef::Enum(handle) => Ok((ValueKind::Other, Some(handle))),
        TypeRef::Bitset(_) => Ok((ValueKind::Uint, None)),
        TypeRef::Unresolved => Err(Diagnostic::error()
            .with_code(ErrorCode::UnresolvedType)
            .with_message(format!("undeclared type identifier `{}`", type_id))
            .with_labels(vec![loc.primary()])
            .with_notes(vec!["hint: expected builtin, enum, or bitset identifier".to_owned()])),
    }
}

struct Expander<'a, 'd> {
    catalog: &'a Catalog<'d>,
    register: &'a Register,
    /// Bitsets being expanded, outermost first.
    stack: Vec<String>,
    fields: Vec<Field>,
}

impl Expander<'_, '_> {
    fn expand_bitfields(
        &mut self,
        bitfields: &[Bitfield],
        base: u32,
        outer_variants: Option<&str>,
    ) -> Result<(), Diagnostic<FileId>> {
        for bitfield in bitfields {
            let (shift, width) = bit_range(bitfield)?;
            let register_bits = self.register.width.bits();
            let shift = match base.checked_add(shift) {
                Some(shift) if shift.checked_add(width).is_some_and(|end| end <= register_bits) => {
                    shift
                }
                _ => {
                    return Err(Diagnostic::error()
                        .with_code(ErrorCode::InvalidBitRange)
                        .with_message(format!(
                            "bitfield `{}` exceeds the {} bits of register `{}`",
                            bitfield.name, register_bits, self.register.name
                        ))
                        .with_labels(vec![bitfield.loc.primary(), self.register.loc.secondary()]))
                }
            };

            let variants = bitfield.variants.as_deref().or(outer_variants);
            let type_id = bitfield.type_id.as_deref();
            if let Some(TypeRef::Bitset(bitset)) = type_id.map(|id| self.catalog.resolve_type(id)) {
                self.expand_bitset(bitset, shift, variants, &bitfield.loc)?;
                continue;
            }

            let (value_kind, enum_handle) = value_type(self.catalog, type_id, width, &bitfield.loc)?;
            self.fields.push(Field {
                name: bitfield.name.clone(),
                dword: 0,
                value_kind,
                enum_handle,
                shift,
                shr: bitfield.shr,
                radix: bitfield.radix,
                width,
                gpu_variants: variants.map(GpuVariantMask::parse).unwrap_or_default(),
                mask: mask(shift, width),
                is_variant_selector: bitfield.addvariant,
            });
        }
        Ok(())
    }

    fn expand_bitset(
        &mut self,
        bitset: &Bitset,
        base: u32,
        variants: Option<&str>,
        loc: &SourceRange,
    ) -> Result<(), Diagnostic<FileId>> {
        if self.stack.iter().any(|name| *name == bitset.name) {
            return Err(Diagnostic::error()
                .with_code(ErrorCode::RecursiveBitset)
                .with_message(format!("recursive expansion of bitset `{}`", bitset.name))
                .with_labels(vec![loc.primary(), bitset.loc.secondary()]));
        }
        self.stack.push(bitset.name.clone());
        self.expand_bitfields(&bitset.bitfields, base, variants)?;
        self.stack.pop();
        Ok(())
    }
}

/// Truncate a field list at the first field overlapping an earlier
/// field of the same dword. Fields only overlap when both can apply on
/// one generation.
pub fn truncate_overlapping(fields: &mut Vec<Field>, register: &str) {
    for index in 1..fields.len() {
        let field = &fields[index];
        let overlapped = fields[..index].iter().find(|previous| {
            previous.dword == field.dword
                && previous.mask & field.mask != 0
                && previous.gpu_variants.overlaps(field.gpu_variants)
        });
        if let Some(previous) = overlapped {
            tracing::warn!(
                "{}: field {} overlaps field {}, dropping {} trailing fields",
                register,
                field.name,
                previous.name,
                fields.len() - index
            );
            fields.truncate(index);
            return;
        }
    }
}

/// Compute the fields of a register from its bitfields, or from the
/// bitset naming its type. Plain registers have no fields.
pub fn register_fields(
    catalog: &Catalog,
    register: &Register,
) -> Result<Vec<Field>, Diagnostic<FileId>> {
    let mut expander = Expander { catalog, register, stack: vec![], fields: vec![] };
    if !register.bitfields.is_empty() {
        expander.expand_bitfields(&register.bitfields, 0, None)?;
    } else if let Some(TypeRef::Bitset(bitset)) =
        register.type_id.as_deref().map(|id| catalog.resolve_type(id))
    {
        expander.expand_bitset(bitset, 0, None, &register.loc)?;
    }
    let mut fields = expander.fields;
    truncate_overlapping(&mut fields, &register.name);
    Ok(fields)
}

/// Field covering the low `bits` bits of a register without bitfields.
pub fn whole_register_field(
    catalog: &Catalog,
    register: &Register,
    name: String,
    bits: u32,
) -> Result<Field, Diagnostic<FileId>> {
    let (value_kind, enum_handle) =
        value_type(catalog, register.type_id.as_deref(), bits, &register.loc)?;
    Ok(Field {
        name,
        dword: 0,
        value_kind,
        enum_handle,
        shift: 0,
        shr: register.shr,
        radix: register.radix,
        width: bits,
        gpu_variants: register.variants.as_deref().map(GpuVariantMask::parse).unwrap_or_default(),
        mask: mask(0, bits),
        is_variant_selector: register.addvariant,
    })
}

/// Compute the register table description of a register.
pub fn register_info(catalog: &Catalog, register: &Register) -> Result<RegInfo, Diagnostic<FileId>> {
    let bits = register.width.bits();
    let (value_kind, enum_handle) =
        value_type(catalog, register.type_id.as_deref(), bits, &register.loc)?;
    let mut fields = register_fields(catalog, register)?;
    if fields.is_empty() {
        fields.push(whole_register_field(catalog, register, register.name.clone(), bits)?);
    }
    Ok(RegInfo {
        name: register.name.clone(),
        is_64_bit: register.width == RegisterWidth::Reg64,
        value_kind,
        enum_handle,
        shr: register.shr,
        radix: register.radix,
        fields,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analyzer::Diagnostics;
    use crate::parser::parse_inline;
    use googletest::prelude::{assert_that, eq, some};

    fn parse(text: &str) -> File {
        let mut db = SourceDatabase::new();
        parse_inline(&mut db, "stdin", text.to_owned()).expect("parsing failure")
    }

    /// Compute the register info of the register `name` of the domain
    /// `A6XX`.
    fn register_info_of(file: &File, name: &str) -> Result<RegInfo, Diagnostic<FileId>> {
        let mut diagnostics = Diagnostics::default();
        let catalog = Catalog::new(file, &mut diagnostics);
        assert!(diagnostics.diagnostics.is_empty());
        let register = file.domain("A6XX").unwrap().registers().find(|r| r.name == name).unwrap();
        register_info(&catalog, register)
    }

    fn summary(fields: &[Field]) -> Vec<(&str, u32, u32, u64)> {
        fields.iter().map(|f| (f.name.as_str(), f.shift, f.width, f.mask)).collect()
    }

    const DESCRIPTION: &str = r#"
    <database>
      <enum name="a6xx_tex_filter">
        <value name="A6XX_TEX_NEAREST" value="0"/>
        <value name="A6XX_TEX_LINEAR" value="1"/>
      </enum>
      <bitset name="a6xx_filter_cntl">
        <bitfield name="XY_MAG" low="0" high="1" type="a6xx_tex_filter"/>
        <bitfield name="ANISO" pos="2"/>
      </bitset>
      <bitset name="a6xx_loop_a">
        <bitfield name="B" low="0" high="3" type="a6xx_loop_b"/>
      </bitset>
      <bitset name="a6xx_loop_b">
        <bitfield name="A" low="0" high="1" type="a6xx_loop_a"/>
      </bitset>
      <domain name="A6XX">
        <reg32 offset="0x0001" name="RB_CNTL">
          <bitfield name="ENABLE" pos="0"/>
          <bitfield name="COUNT" low="4" high="23" shr="2"/>
          <bitfield name="SCALE" low="24" high="31" type="ufixed" radix="4"/>
        </reg32>
        <reg32 offset="0x0002" name="SP_FILTER">
          <bitfield name="MODE" low="0" high="3"/>
          <bitfield name="FILTER" low="8" high="10" type="a6xx_filter_cntl"/>
        </reg32>
        <reg32 offset="0x0003" name="SP_FILTER_ALL" type="a6xx_filter_cntl"/>
        <reg32 offset="0x0004" name="SP_OVERLAP">
          <bitfield name="LOW" low="0" high="7"/>
          <bitfield name="HIGH" low="4" high="11"/>
          <bitfield name="AFTER" low="16" high="31"/>
        </reg32>
        <reg32 offset="0x0005" name="SP_VARIANT_SPLIT">
          <bitfield name="OLD" low="0" high="7" variants="A6XX"/>
          <bitfield name="NEW" low="0" high="11" variants="A7XX-"/>
          <bitfield name="SHARED" low="4" high="5"/>
        </reg32>
        <reg64 offset="0x0006" name="RB_ADDR" type="waddress"/>
        <reg64 offset="0x0008" name="RB_WIDE">
          <bitfield name="HI_BITS" low="32" high="63"/>
        </reg64>
        <reg32 offset="0x000a" name="RB_TOO_WIDE">
          <bitfield name="BITS" low="16" high="32"/>
        </reg32>
        <reg32 offset="0x000b" name="RB_NO_SPEC">
          <bitfield name="BITS"/>
        </reg32>
        <reg32 offset="0x000c" name="RB_INVERTED">
          <bitfield name="BITS" low="8" high="4"/>
        </reg32>
        <reg32 offset="0x000d" name="RB_LOOP" type="a6xx_loop_a"/>
        <reg32 offset="0x000e" name="RB_MISSING_TYPE">
          <bitfield name="BITS" low="0" high="3" type="a6xx_missing"/>
        </reg32>
        <reg32 offset="0x000f" name="RB_MODE" type="a6xx_tex_filter"/>
        <reg32 offset="0x0010" name="RB_HUGE_RANGE">
          <bitfield name="BITS" low="0" high="4294967295"/>
        </reg32>
        <reg32 offset="0x0011" name="RB_HUGE_POS">
          <bitfield name="BIT" pos="4294967295"/>
        </reg32>
        <reg32 offset="0x0012" name="RB_HUGE_BITSET">
          <bitfield name="FILTER" low="4294967290" high="4294967295" type="a6xx_filter_cntl"/>
        </reg32>
      </domain>
    </database>
    "#;

    #[test]
    fn test_mask() {
        assert_eq!(mask(0, 20), 0xfffff);
        assert_eq!(mask(4, 1), 0x10);
        assert_eq!(mask(0, 32), 0xffff_ffff);
        assert_eq!(mask(32, 32), 0xffff_ffff_0000_0000);
        assert_eq!(mask(0, 64), u64::MAX);
        assert_eq!(mask(3, 0), 0);
    }

    #[test]
    fn test_bitfield_layout() {
        let file = parse(DESCRIPTION);
        let info = register_info_of(&file, "RB_CNTL").unwrap();
        assert_eq!(
            summary(&info.fields),
            vec![("ENABLE", 0, 1, 0x1), ("COUNT", 4, 20, 0x00ff_fff0), ("SCALE", 24, 8, 0xff00_0000)]
        );
        assert_eq!(info.fields[0].value_kind, ValueKind::Boolean);
        assert_eq!(info.fields[1].value_kind, ValueKind::Uint);
        assert_eq!(info.fields[1].shr, 2);
        assert_eq!(info.fields[2].value_kind, ValueKind::Ufixed);
        assert_eq!(info.fields[2].radix, 4);
        assert!(!info.is_64_bit);
    }

    #[test]
    fn test_bitset_expansion() {
        let file = parse(DESCRIPTION);
        let info = register_info_of(&file, "SP_FILTER").unwrap();
        assert_eq!(
            summary(&info.fields),
            vec![("MODE", 0, 4, 0xf), ("XY_MAG", 8, 2, 0x300), ("ANISO", 10, 1, 0x400)]
        );
        assert_that!(info.fields[1].enum_handle, some(eq(0)));
        assert_eq!(info.fields[1].value_kind, ValueKind::Other);

        let info = register_info_of(&file, "SP_FILTER_ALL").unwrap();
        assert_eq!(summary(&info.fields), vec![("XY_MAG", 0, 2, 0x3), ("ANISO", 2, 1, 0x4)]);
    }

    #[test]
    fn test_overlap_truncation() {
        let file = parse(DESCRIPTION);
        let info = register_info_of(&file, "SP_OVERLAP").unwrap();
        assert_eq!(summary(&info.fields), vec![("LOW", 0, 8, 0xff)]);

        // Fields of disjoint generations do not overlap.
        let info = register_info_of(&file, "SP_VARIANT_SPLIT").unwrap();
        assert_eq!(summary(&info.fields), vec![("OLD", 0, 8, 0xff), ("NEW", 0, 12, 0xfff)]);
    }

    #[test]
    fn test_whole_register_field() {
        let file = parse(DESCRIPTION);
        let info = register_info_of(&file, "RB_ADDR").unwrap();
        assert!(info.is_64_bit);
        assert_eq!(info.value_kind, ValueKind::WAddress);
        assert_eq!(summary(&info.fields), vec![("RB_ADDR", 0, 64, u64::MAX)]);

        let info = register_info_of(&file, "RB_WIDE").unwrap();
        assert_eq!(summary(&info.fields), vec![("HI_BITS", 32, 32, 0xffff_ffff_0000_0000)]);

        let info = register_info_of(&file, "RB_MODE").unwrap();
        assert_that!(info.enum_handle, some(eq(0)));
        assert_eq!(summary(&info.fields), vec![("RB_MODE", 0, 32, 0xffff_ffff)]);
    }

    #[test]
    fn test_layout_errors() {
        let file = parse(DESCRIPTION);
        let code = |name: &str| register_info_of(&file, name).unwrap_err().code;
        assert_eq!(code("RB_TOO_WIDE"), Some(ErrorCode::InvalidBitRange.into()));
        assert_eq!(code("RB_NO_SPEC"), Some(ErrorCode::MissingBitSpec.into()));
        assert_eq!(code("RB_INVERTED"), Some(ErrorCode::InvalidBitRange.into()));
        assert_eq!(code("RB_LOOP"), Some(ErrorCode::RecursiveBitset.into()));
        assert_eq!(code("RB_MISSING_TYPE"), Some(ErrorCode::UnresolvedType.into()));
        assert_eq!(code("RB_HUGE_RANGE"), Some(ErrorCode::InvalidBitRange.into()));
        assert_eq!(code("RB_HUGE_POS"), Some(ErrorCode::InvalidBitRange.into()));
        assert_eq!(code("RB_HUGE_BITSET"), Some(ErrorCode::InvalidBitRange.into()));
    }

    #[test]
    fn test_truncate_overlapping_keeps_other_dwords() {
        let field = |name: &str, dword: u32, shift: u32, width: u32| Field {
            name: name.to_owned(),
            dword,
            value_kind: ValueKind::Uint,
            enum_handle: None,
            shift,
            shr: 0,
            radix: 0,
            width,
            gpu_variants: GpuVariantMask::UNCONSTRAINED,
            mask: mask(shift, width),
            is_variant_selector: false,
        };
        let mut fields = vec![field("A", 0, 0, 8), field("B", 1, 0, 8), field("C", 1, 4, 8)];
        truncate_overlapping(&mut fields, "CP_TEST");
        assert_eq!(summary(&fields), vec![("A", 0, 8, 0xff), ("B", 0, 8, 0xff)]);
    }
}
