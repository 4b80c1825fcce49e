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

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::{Field, GpuVariant, PacketInfo, RegInfo, Tables};

/// Location of a register definition in one of the two register tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegKey {
    Unconditional(u32),
    Variant(u32, GpuVariant),
}

/// Keyed reflection tables.
///
/// Every table is split in two: entries valid on all generations are
/// keyed by offset (or opcode) alone, and generation specific entries
/// are keyed by offset and generation, with one copy per generation of
/// the entry mask. Lookups consult the unconditional table first, then
/// the variant table under the active generation.
#[derive(Debug)]
pub struct Database {
    opcodes: BTreeMap<u32, String>,
    enums: Vec<BTreeMap<u32, String>>,
    registers: BTreeMap<u32, RegInfo>,
    variant_registers: BTreeMap<(u32, GpuVariant), RegInfo>,
    register_names: HashMap<String, RegKey>,
    packets: BTreeMap<u32, Vec<PacketInfo>>,
    variant_packets: BTreeMap<(u32, GpuVariant), Vec<PacketInfo>>,
    /// Zero when no generation is selected, otherwise the generation
    /// index plus one.
    active: AtomicU8,
}

impl Database {
    /// Assemble the keyed tables.
    pub fn new(tables: Tables) -> Database {
        let opcodes: BTreeMap<u32, String> =
            tables.opcodes.into_iter().map(|op| (op.opcode, op.name)).collect();
        let enums: Vec<BTreeMap<u32, String>> =
            tables.enums.into_iter().map(|e| e.values.into_iter().collect()).collect();

        let mut registers = BTreeMap::new();
        let mut variant_registers = BTreeMap::new();
        for entry in tables.registers {
            if entry.gpu_variants.is_unconstrained() {
                if let Some(previous) = registers.insert(entry.offset, entry.info) {
                    tracing::warn!(
                        "register {} at offset {:#x} is redefined",
                        previous.name,
                        entry.offset
                    );
                }
            } else {
                for variant in entry.gpu_variants.iter() {
                    variant_registers.insert((entry.offset, variant), entry.info.clone());
                }
            }
        }

        // Unconditional names are inserted first so that they take
        // precedence over generation qualified names.
        let mut register_names = HashMap::new();
        for (offset, info) in &registers {
            register_names
                .entry(info.name.clone())
                .or_insert(RegKey::Unconditional(*offset));
        }
        for ((offset, variant), info) in &variant_registers {
            register_names
                .entry(format!("{}_{}", info.name, variant))
                .or_insert(RegKey::Variant(*offset, *variant));
        }

        let mut packets: BTreeMap<u32, Vec<PacketInfo>> = BTreeMap::new();
        let mut variant_packets: BTreeMap<(u32, GpuVariant), Vec<PacketInfo>> = BTreeMap::new();
        for entry in tables.packets {
            if entry.gpu_variants.is_unconstrained() {
                packets.entry(entry.opcode).or_default().push(entry.info);
            } else {
                for variant in entry.gpu_variants.iter() {
                    variant_packets
                        .entry((entry.opcode, variant))
                        .or_default()
                        .push(entry.info.clone());
                }
            }
        }

        Database {
            opcodes,
            enums,
            registers,
            variant_registers,
            register_names,
            packets,
            variant_packets,
            active: AtomicU8::new(0),
        }
    }

    /// Select the active generation from a numeric hardware identifier.
    /// Unrecognized identifiers clear the selection, after which only
    /// unconditional entries can be found.
    pub fn set_active_gpu(&self, id: u32) {
        let variant = GpuVariant::from_gpu_id(id);
        if variant.is_none() {
            tracing::debug!("unknown GPU id {id}, generation specific tables disabled");
        }
        self.set_active_variant(variant)
    }

    pub fn set_active_variant(&self, variant: Option<GpuVariant>) {
        let value = variant.map(|variant| variant as u8 + 1).unwrap_or(0);
        self.active.store(value, Ordering::Relaxed)
    }

    pub fn active_gpu(&self) -> Option<GpuVariant> {
        match self.active.load(Ordering::Relaxed) {
            0 => None,
            value => GpuVariant::ALL.get(value as usize - 1).copied(),
        }
    }

    pub fn opcode_name(&self, opcode: u32) -> Option<&str> {
        self.opcodes.get(&opcode).map(String::as_str)
    }

    pub fn reg_info(&self, offset: u32) -> Option<&RegInfo> {
        self.registers.get(&offset).or_else(|| {
            let variant = self.active_gpu()?;
            self.variant_registers.get(&(offset, variant))
        })
    }

    /// Find a register by name. Generation specific registers are
    /// found under their bare name when a generation is active.
    pub fn reg_by_name(&self, name: &str) -> Option<&RegInfo> {
        let key = self.register_names.get(name).copied().or_else(|| {
            let variant = self.active_gpu()?;
            self.register_names.get(&format!("{name}_{variant}")).copied()
        })?;
        match key {
            RegKey::Unconditional(offset) => self.registers.get(&offset),
            RegKey::Variant(offset, variant) => self.variant_registers.get(&(offset, variant)),
        }
    }

    pub fn field_by_name<'a>(&self, reg: &'a RegInfo, name: &str) -> Option<&'a Field> {
        reg.fields.iter().find(|field| field.name == name)
    }

    pub fn enum_value_name(&self, handle: u8, value: u32) -> Option<&str> {
        self.enums.get(handle as usize)?.get(&value).map(String::as_str)
    }

    /// Return the first packet declared for the opcode.
    pub fn packet_info(&self, opcode: u32) -> Option<&PacketInfo> {
        self.packets.get(&opcode).and_then(|packets| packets.first()).or_else(|| {
            let variant = self.active_gpu()?;
            self.variant_packets.get(&(opcode, variant)).and_then(|packets| packets.first())
        })
    }

    /// Find a packet by name among the packets sharing an opcode.
    /// The opcode `u32::MAX` searches every packet.
    pub fn packet_info_by_name(&self, opcode: u32, name: &str) -> Option<&PacketInfo> {
        let active = self.active_gpu();
        let unconditional = self
            .packets
            .iter()
            .filter(|(op, _)| opcode == u32::MAX || **op == opcode)
            .flat_map(|(_, packets)| packets);
        let variant = self
            .variant_packets
            .iter()
            .filter(|((op, variant), _)| {
                (opcode == u32::MAX || *op == opcode) && Some(*variant) == active
            })
            .flat_map(|(_, packets)| packets);
        unconditional.chain(variant).find(|packet| packet.name == name)
    }

    /// A field applies when it is unconstrained or valid on the active
    /// generation.
    pub fn is_field_applicable(&self, field: &Field) -> bool {
        field.gpu_variants.is_unconstrained()
            || self.active_gpu().is_some_and(|variant| field.gpu_variants.contains(variant))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::*;
    use googletest::prelude::{assert_that, eq, some};

    fn field(name: &str, shift: u32, width: u32, gpu_variants: GpuVariantMask) -> Field {
        Field {
            name: name.to_owned(),
            dword: 0,
            value_kind: ValueKind::Uint,
            enum_handle: None,
            shift,
            shr: 0,
            radix: 0,
            width,
            gpu_variants,
            mask: ((1u64 << width) - 1) << shift,
            is_variant_selector: false,
        }
    }

    fn reg(name: &str, fields: Vec<Field>) -> RegInfo {
        RegInfo {
            name: name.to_owned(),
            is_64_bit: false,
            value_kind: ValueKind::Uint,
            enum_handle: None,
            shr: 0,
            radix: 0,
            fields,
        }
    }

    fn packet(name: &str) -> PacketInfo {
        PacketInfo { name: name.to_owned(), max_array_size: 1, stripe_variant: None, fields: vec![] }
    }

    fn tables() -> Tables {
        Tables {
            opcodes: vec![Opcode { opcode: 0x22, name: "CP_DRAW_INDX".to_owned() }],
            enums: vec![EnumTable {
                name: "pc_di_primtype".to_owned(),
                values: vec![(0, "DI_PT_NONE".to_owned()), (4, "DI_PT_TRILIST".to_owned())],
            }],
            registers: vec![
                RegisterEntry {
                    offset: 0x100,
                    gpu_variants: GpuVariantMask::UNCONSTRAINED,
                    info: reg("RB_MODE", vec![field("ENABLE", 0, 1, GpuVariantMask::UNCONSTRAINED)]),
                },
                RegisterEntry {
                    offset: 0x100,
                    gpu_variants: GpuVariantMask::parse("A7XX"),
                    info: reg("RB_MODE_SHADOW", vec![]),
                },
                RegisterEntry {
                    offset: 0x200,
                    gpu_variants: GpuVariantMask::parse("A6XX"),
                    info: reg("SP_CTRL", vec![]),
                },
                RegisterEntry {
                    offset: 0x300,
                    gpu_variants: GpuVariantMask::parse("A7XX-"),
                    info: reg("SP_CTRL", vec![]),
                },
            ],
            packets: vec![
                PacketEntry {
                    opcode: 0x22,
                    gpu_variants: GpuVariantMask::UNCONSTRAINED,
                    info: packet("CP_DRAW_INDX"),
                },
                PacketEntry {
                    opcode: 0x46,
                    gpu_variants: GpuVariantMask::parse("A2XX-A5XX"),
                    info: packet("CP_OLD_PACKET"),
                },
                PacketEntry {
                    opcode: 0x46,
                    gpu_variants: GpuVariantMask::parse("A6XX-"),
                    info: packet("CP_NEW_PACKET"),
                },
                PacketEntry {
                    opcode: 0x47,
                    gpu_variants: GpuVariantMask::UNCONSTRAINED,
                    info: packet("CP_STRIPED"),
                },
                PacketEntry {
                    opcode: 0x47,
                    gpu_variants: GpuVariantMask::UNCONSTRAINED,
                    info: packet("CP_STRIPED_ALT"),
                },
            ],
        }
    }

    #[test]
    fn test_opcode_and_enum_lookup() {
        let db = Database::new(tables());
        assert_eq!(db.opcode_name(0x22), Some("CP_DRAW_INDX"));
        assert_eq!(db.opcode_name(0x23), None);
        assert_eq!(db.enum_value_name(0, 4), Some("DI_PT_TRILIST"));
        assert_eq!(db.enum_value_name(0, 5), None);
        assert_eq!(db.enum_value_name(1, 0), None);
    }

    #[test]
    fn test_unconditional_takes_precedence() {
        let db = Database::new(tables());
        db.set_active_gpu(7);
        assert_that!(db.reg_info(0x100).map(|r| r.name.as_str()), some(eq("RB_MODE")));
    }

    #[test]
    fn test_variant_register_requires_active_gpu() {
        let db = Database::new(tables());
        assert!(db.reg_info(0x200).is_none());
        db.set_active_gpu(6);
        assert_that!(db.reg_info(0x200).map(|r| r.name.as_str()), some(eq("SP_CTRL")));
        db.set_active_gpu(7);
        assert!(db.reg_info(0x200).is_none());
        assert_that!(db.reg_info(0x300).map(|r| r.name.as_str()), some(eq("SP_CTRL")));
    }

    #[test]
    fn test_unknown_gpu_id_disables_variant_tables() {
        let db = Database::new(tables());
        db.set_active_gpu(6);
        db.set_active_gpu(42);
        assert_eq!(db.active_gpu(), None);
        assert!(db.reg_info(0x200).is_none());
        assert!(db.reg_info(0x100).is_some());
    }

    #[test]
    fn test_reg_by_name() {
        let db = Database::new(tables());
        assert_eq!(db.reg_by_name("RB_MODE").map(|r| r.name.as_str()), Some("RB_MODE"));
        assert!(db.reg_by_name("SP_CTRL").is_none());
        assert!(db.reg_by_name("SP_CTRL_A6XX").is_some());

        db.set_active_gpu(8);
        let info = db.reg_by_name("SP_CTRL").unwrap();
        assert_eq!(info.name, "SP_CTRL");
        assert_eq!(db.reg_info(0x300), Some(info));
    }

    #[test]
    fn test_field_by_name() {
        let db = Database::new(tables());
        let info = db.reg_info(0x100).unwrap();
        assert_eq!(db.field_by_name(info, "ENABLE").map(|f| f.mask), Some(0x1));
        assert!(db.field_by_name(info, "DISABLE").is_none());
    }

    #[test]
    fn test_packet_lookup() {
        let db = Database::new(tables());
        assert_eq!(db.packet_info(0x22).map(|p| p.name.as_str()), Some("CP_DRAW_INDX"));
        assert!(db.packet_info(0x46).is_none());

        db.set_active_gpu(5);
        assert_eq!(db.packet_info(0x46).map(|p| p.name.as_str()), Some("CP_OLD_PACKET"));
        db.set_active_gpu(7);
        assert_eq!(db.packet_info(0x46).map(|p| p.name.as_str()), Some("CP_NEW_PACKET"));
        assert!(db.packet_info_by_name(0x46, "CP_OLD_PACKET").is_none());
    }

    #[test]
    fn test_packet_lookup_by_name() {
        let db = Database::new(tables());
        assert_eq!(db.packet_info(0x47).map(|p| p.name.as_str()), Some("CP_STRIPED"));
        assert_eq!(
            db.packet_info_by_name(0x47, "CP_STRIPED_ALT").map(|p| p.name.as_str()),
            Some("CP_STRIPED_ALT")
        );
        assert!(db.packet_info_by_name(0x22, "CP_STRIPED_ALT").is_none());
        assert!(db.packet_info_by_name(u32::MAX, "CP_STRIPED_ALT").is_some());
    }

    #[test]
    fn test_field_applicability() {
        let db = Database::new(tables());
        let any = field("ANY", 0, 1, GpuVariantMask::UNCONSTRAINED);
        let a7 = field("NEW", 1, 1, GpuVariantMask::parse("A7XX-"));
        assert!(db.is_field_applicable(&any));
        assert!(!db.is_field_applicable(&a7));
        db.set_active_gpu(6);
        assert!(!db.is_field_applicable(&a7));
        db.set_active_gpu(7);
        assert!(db.is_field_applicable(&a7));
    }
}
