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

//! Variant and stripe resolution.
//!
//! Lowers register domains to register table entries, and packet
//! domains to one packet layout per retained stripe.

use codespan_reporting::diagnostic::Diagnostic;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use pm4_runtime::{Field, GpuVariant, GpuVariantMask, PacketEntry, PacketInfo, RegisterEntry};

use super::{layout, Catalog, Diagnostics, ErrorCode, OPCODE_ENUM};
use crate::ast::*;

/// Largest register offset accepted in a packet description. Larger
/// offsets are absolute register addresses declared by mistake, and
/// the affected packet variant is skipped.
pub const MAX_PACKET_OFFSET: u32 = 1000;

const CHIP_VARSET: &str = "chip";

fn variant_mask(variants: Option<&str>) -> GpuVariantMask {
    variants.map(GpuVariantMask::parse).unwrap_or_default()
}

/// Register domains are named after the generation they describe.
fn is_register_domain(domain: &Domain) -> bool {
    domain.name.parse::<GpuVariant>().is_ok()
}

fn register_entry(
    catalog: &Catalog,
    register: &Register,
    offset: u32,
    name: Option<String>,
    variants: Option<&str>,
) -> Result<RegisterEntry, Diagnostic<FileId>> {
    let info = match name {
        Some(name) => layout::register_info(catalog, &Register { name, ..register.clone() })?,
        None => layout::register_info(catalog, register)?,
    };
    Ok(RegisterEntry { offset, gpu_variants: variant_mask(variants), info })
}

fn array_entries(
    catalog: &Catalog,
    array: &Array,
    variants: Option<&str>,
) -> Result<Vec<RegisterEntry>, Diagnostic<FileId>> {
    let variants = array.variants.as_deref().or(variants);
    let prefix = array.name.as_deref().unwrap_or_default();
    let overflow = || {
        Diagnostic::error()
            .with_code(ErrorCode::LoadError)
            .with_message(format!(
                "array `{}` extends beyond the 32-bit register address space",
                prefix
            ))
            .with_labels(vec![array.loc.primary()])
    };
    let offset = |base: u32, offset: u32| base.checked_add(offset).ok_or_else(overflow);
    let mut entries = vec![];
    for index in 0..array.length {
        let base = index
            .checked_mul(array.stride)
            .and_then(|delta| array.offset.checked_add(delta))
            .ok_or_else(overflow)?;
        if !array.registers.is_empty() {
            for register in &array.registers {
                entries.push(register_entry(
                    catalog,
                    register,
                    offset(base, register.offset)?,
                    Some(format!("{}{}_{}", prefix, index, register.name)),
                    register.variants_or(variants),
                )?);
            }
        } else if array.stride == 2 {
            for (offset, suffix) in [(base, "LO"), (offset(base, 1)?, "HI")] {
                let name = format!("{}{}_{}", prefix, index, suffix);
                let register = Register::new(RegisterWidth::Reg32, &name, offset);
                entries.push(register_entry(catalog, &register, offset, None, variants)?);
            }
        } else {
            let name = format!("{}{}", prefix, index);
            let register = Register::new(RegisterWidth::Reg32, &name, base);
            entries.push(register_entry(catalog, &register, base, None, variants)?);
        }
    }
    Ok(entries)
}

fn domain_registers(
    catalog: &Catalog,
    domain: &Domain,
) -> Result<Vec<RegisterEntry>, Diagnostic<FileId>> {
    let variants = domain.variants.as_deref();
    let mut entries = vec![];
    for element in &domain.elements {
        match element {
            Element::Register(register) => entries.push(register_entry(
                catalog,
                register,
                register.offset,
                None,
                register.variants_or(variants),
            )?),
            Element::Array(array) => entries.extend(array_entries(catalog, array, variants)?),
            Element::Stripe(stripe) => {
                let stripe_variants = match stripe.varset.as_str() {
                    CHIP_VARSET => stripe.variants.as_deref().or(variants),
                    _ => variants,
                };
                for register in &stripe.registers {
                    entries.push(register_entry(
                        catalog,
                        register,
                        register.offset,
                        None,
                        register.variants_or(stripe_variants),
                    )?);
                }
            }
            Element::Enum(_) | Element::Bitset(_) => (),
        }
    }
    Ok(entries)
}

/// Lower the register domains to register table entries.
pub fn registers(catalog: &Catalog, diagnostics: &mut Diagnostics) -> Vec<RegisterEntry> {
    let mut entries = vec![];
    for domain in catalog.file.domains().filter(|domain| is_register_domain(domain)) {
        match domain_registers(catalog, domain) {
            Ok(domain_entries) => {
                tracing::debug!("{}: {} registers", domain.name, domain_entries.len());
                entries.extend(domain_entries)
            }
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
    }
    entries
}

fn indirect_buffer_domain(name: &str) -> Domain {
    let mut base = Register::new(RegisterWidth::Reg64, "IB_BASE", 0);
    base.type_id = Some("address".to_owned());
    let mut size = Register::new(RegisterWidth::Reg32, "2", 2);
    size.bitfields.push(Bitfield::range("IB_SIZE", 0, 19));
    Domain {
        loc: SourceRange::default(),
        name: name.to_owned(),
        varset: None,
        variants: None,
        elements: vec![Element::Register(base), Element::Register(size)],
    }
}

/// Build the packet domains which the opcode enum names but the
/// description leaves out.
///
/// The indirect buffer prefetch packets share the layout of
/// `CP_INDIRECT_BUFFER`, and the geometry and fragment state loads
/// share the layout of `CP_LOAD_STATE6`.
fn synthesized_domains(file: &File, opcode_enum: &Enum) -> Vec<Domain> {
    let missing = |name: &str| {
        opcode_enum.values.iter().any(|entry| entry.name == name) && file.domain(name).is_none()
    };
    let mut domains = vec![];
    for name in ["CP_INDIRECT_BUFFER_PFD", "CP_INDIRECT_BUFFER_PFE"] {
        if missing(name) {
            domains.push(indirect_buffer_domain(name));
        }
    }
    if let Some(load_state) = file.domain("CP_LOAD_STATE6") {
        for name in ["CP_LOAD_STATE6_GEOM", "CP_LOAD_STATE6_FRAG"] {
            if missing(name) {
                domains.push(Domain {
                    loc: load_state.loc,
                    name: name.to_owned(),
                    varset: load_state.varset.clone(),
                    variants: load_state.variants.clone(),
                    elements: load_state
                        .elements
                        .iter()
                        .filter(|element| !matches!(element, Element::Enum(_)))
                        .cloned()
                        .collect(),
                });
            }
        }
    }
    domains
}

/// Compute the fields of a packet from its registers, sorted by
/// offset. Field dwords are payload relative.
fn packet_fields<'r>(
    catalog: &Catalog,
    registers: impl Iterator<Item = &'r Register>,
) -> Result<Vec<Field>, Diagnostic<FileId>> {
    let mut fields = vec![];
    let mut cursor = 0;
    let mut previous: Option<&Register> = None;
    for register in registers {
        if cursor > register.offset {
            let mut labels = vec![register.loc.primary()];
            if let Some(previous) = previous {
                labels.push(
                    previous
                        .loc
                        .secondary()
                        .with_message(format!("`{}` extends to dword {}", previous.name, cursor)),
                );
            }
            return Err(Diagnostic::error()
                .with_code(ErrorCode::ReverseOffset)
                .with_message(format!(
                    "register `{}` at offset {} overlaps the previous register",
                    register.name, register.offset
                ))
                .with_labels(labels));
        }
        cursor = register.offset + register.width.dwords();
        previous = Some(register);

        let register_fields = layout::register_fields(catalog, register)?;
        if !register_fields.is_empty() {
            fields.extend(
                register_fields.into_iter().map(|field| Field { dword: register.offset, ..field }),
            );
            continue;
        }
        match register.width {
            RegisterWidth::Reg32 => {
                let field = layout::whole_register_field(catalog, register, register.name.clone(), 32)?;
                fields.push(Field { dword: register.offset, ..field });
            }
            RegisterWidth::Reg64 => {
                for (dword, suffix) in [(register.offset, "LO"), (register.offset + 1, "HI")] {
                    let name = format!("{}_{}", register.name, suffix);
                    let field = layout::whole_register_field(catalog, register, name, 32)?;
                    fields.push(Field { dword, ..field });
                }
            }
        }
    }
    Ok(fields)
}

/// Resolve the value selecting an enum varset stripe.
fn stripe_selector(catalog: &Catalog, stripe: &Stripe) -> Result<u32, Diagnostic<FileId>> {
    stripe
        .variants
        .as_deref()
        .and_then(|variants| catalog.enum_value(&stripe.varset, variants))
        .ok_or_else(|| {
            Diagnostic::error()
                .with_code(ErrorCode::UnresolvedType)
                .with_message(format!(
                    "stripe variant `{}` is not a value of enum `{}`",
                    stripe.variants.as_deref().unwrap_or_default(),
                    stripe.varset
                ))
                .with_labels(vec![stripe.loc.primary()])
        })
}

/// Resolve the packet layouts of a packet domain, one per retained
/// stripe.
///
/// Only the last `chip` stripe is retained: the newest generation
/// shadows the older ones. Every enum selected stripe is retained.
fn domain_packets(catalog: &Catalog, domain: &Domain) -> Result<Vec<PacketInfo>, Diagnostic<FileId>> {
    let (base, max_array_size): (Vec<&Register>, u32) = match domain.arrays().next() {
        Some(array) => {
            if let Some(register) = domain.registers().next() {
                return Err(Diagnostic::error()
                    .with_code(ErrorCode::AmbiguousArray)
                    .with_message(format!(
                        "packet `{}` declares registers outside of its array",
                        domain.name
                    ))
                    .with_labels(vec![register.loc.primary(), array.loc.secondary()]));
            }
            (array.registers.iter().collect(), array.length)
        }
        None => (domain.registers().collect(), 1),
    };

    let stripes: Vec<&Stripe> = domain.stripes().collect();
    let last_chip = stripes.iter().rposition(|stripe| stripe.varset == CHIP_VARSET);
    let mut variants: Vec<Option<&Stripe>> = stripes
        .iter()
        .enumerate()
        .filter(|(index, stripe)| stripe.varset != CHIP_VARSET || Some(*index) == last_chip)
        .map(|(_, stripe)| Some(*stripe))
        .collect();
    if variants.is_empty() {
        variants.push(None);
    }

    let mut packets = vec![];
    for stripe in variants {
        let mut registers: BTreeMap<u32, &Register> = BTreeMap::new();
        for register in base.iter().copied() {
            registers.entry(register.offset).or_insert(register);
        }

        let mut name = domain.name.clone();
        let mut stripe_variant = None;
        if let Some(stripe) = stripe {
            for register in &stripe.registers {
                registers.insert(register.offset, register);
            }
            if stripe.varset != CHIP_VARSET {
                stripe_variant = Some(stripe_selector(catalog, stripe)?);
                let suffix = stripe.prefix.as_deref().or(stripe.variants.as_deref());
                name = format!("{}_{}", domain.name, suffix.unwrap_or_default());
            }
        }

        if let Some(register) = registers.values().find(|r| r.offset > MAX_PACKET_OFFSET) {
            tracing::warn!(
                "{}: register {} has offset {:#x} above {}, skipping packet",
                name,
                register.name,
                register.offset,
                MAX_PACKET_OFFSET
            );
            continue;
        }

        let fields = packet_fields(catalog, registers.values().copied())?;
        packets.push(PacketInfo { name, max_array_size, stripe_variant, fields });
    }
    Ok(packets)
}

/// Lower the packet domains to packet table entries.
///
/// Every entry of the opcode enum produces packets: the layouts of the
/// domain it names, or a single packet without fields when there is no
/// such domain.
pub fn packets(catalog: &Catalog, diagnostics: &mut Diagnostics) -> Vec<PacketEntry> {
    let Some(opcode_enum) = catalog.opcode_enum() else {
        tracing::debug!("no `{}` enum, the packet table is empty", OPCODE_ENUM);
        return vec![];
    };
    let synthesized = synthesized_domains(catalog.file, opcode_enum);

    let mut resolved: HashMap<&str, Option<Vec<PacketInfo>>> = HashMap::new();
    let mut entries = vec![];
    for entry in &opcode_enum.values {
        let Some(opcode) = entry.value else {
            continue;
        };
        let domain = catalog
            .file
            .domain(&entry.name)
            .or_else(|| synthesized.iter().find(|domain| domain.name == entry.name));
        let Some(domain) = domain else {
            entries.push(PacketEntry {
                opcode,
                gpu_variants: variant_mask(entry.variants.as_deref()),
                info: PacketInfo {
                    name: entry.name.clone(),
                    max_array_size: 0,
                    stripe_variant: None,
                    fields: vec![],
                },
            });
            continue;
        };

        let gpu_variants = variant_mask(domain.variants.as_deref().or(entry.variants.as_deref()));
        let packets = match resolved.entry(&entry.name) {
            Entry::Occupied(packets) => packets.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(match domain_packets(catalog, domain) {
                Ok(packets) => Some(packets),
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    None
                }
            }),
        };
        if let Some(packets) = packets {
            entries.extend(packets.iter().map(|info| PacketEntry {
                opcode,
                gpu_variants,
                info: info.clone(),
            }));
        }
    }
    entries
}
