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

//! Reflection tables and lookup helpers used by the generated PM4
//! tables and by command stream disassemblers.

mod database;
pub mod global;
mod variant;

pub use database::Database;
pub use variant::{GpuVariant, GpuVariantMask};

/// Type of runtime contract errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("the PM4 reflection database is already initialized")]
    AlreadyInitialized,
}

/// Interpretation of the bits selected by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueKind {
    Boolean,
    Uint,
    Int,
    Float,
    Fixed,
    Ufixed,
    Hex,
    /// GPU address which is only read by the command processor.
    Address,
    /// GPU address written by the command processor.
    WAddress,
    /// Shader register identifier.
    RegId,
    /// Enumerated value, see the field's enum handle.
    Other,
}

impl ValueKind {
    /// Resolve the name of a builtin description type.
    pub fn from_builtin(name: &str) -> Option<ValueKind> {
        Some(match name {
            "boolean" => ValueKind::Boolean,
            "uint" => ValueKind::Uint,
            "int" => ValueKind::Int,
            "float" => ValueKind::Float,
            "fixed" => ValueKind::Fixed,
            "ufixed" => ValueKind::Ufixed,
            "hex" => ValueKind::Hex,
            "address" => ValueKind::Address,
            "waddress" => ValueKind::WAddress,
            "a3xx_regid" => ValueKind::RegId,
            _ => return None,
        })
    }
}

/// Resolved location and meaning of a bitfield within a register or
/// packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub name: String,
    /// Payload dword holding the field, counted from zero after the
    /// packet header. Always zero for register fields.
    pub dword: u32,
    pub value_kind: ValueKind,
    pub enum_handle: Option<u8>,
    pub shift: u32,
    /// Left shift applied to the extracted value before display.
    pub shr: u32,
    /// Number of fractional bits of fixed point values.
    pub radix: u32,
    pub width: u32,
    pub gpu_variants: GpuVariantMask,
    pub mask: u64,
    /// The field selects the stripe variant of the packet.
    pub is_variant_selector: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegInfo {
    pub name: String,
    pub is_64_bit: bool,
    pub value_kind: ValueKind,
    pub enum_handle: Option<u8>,
    pub shr: u32,
    pub radix: u32,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketInfo {
    pub name: String,
    pub max_array_size: u32,
    /// Value of the variant selector field identifying this packet
    /// layout, for packets declared with enum selected stripes.
    pub stripe_variant: Option<u32>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opcode {
    pub opcode: u32,
    pub name: String,
}

/// Value names of one enum, sorted by value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumTable {
    pub name: String,
    pub values: Vec<(u32, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterEntry {
    pub offset: u32,
    pub gpu_variants: GpuVariantMask,
    pub info: RegInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketEntry {
    pub opcode: u32,
    pub gpu_variants: GpuVariantMask,
    pub info: PacketInfo,
}

/// Flat description of every table, as produced by the compiler.
/// Enum handles index into `enums`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tables {
    pub opcodes: Vec<Opcode>,
    pub enums: Vec<EnumTable>,
    pub registers: Vec<RegisterEntry>,
    pub packets: Vec<PacketEntry>,
}
