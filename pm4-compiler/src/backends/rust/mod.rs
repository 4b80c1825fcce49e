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

//! Rust compiler backend.
//!
//! Emits the reflection tables as a `tables()` constructor, value
//! constants for every opcode and enum, and entry points delegating to
//! the process-wide database of `pm4_runtime`.

use heck::{ToShoutySnakeCase, ToSnakeCase};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashSet;
use std::path::Path;

use pm4_runtime::{EnumTable, Field, PacketEntry, RegInfo, RegisterEntry, Tables, ValueKind};

mod preamble;

/// Turn a description name into a valid Rust identifier.
/// Invalid characters are replaced, and keywords are suffixed.
fn ident(name: &str) -> syn::Ident {
    let mut id: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if id.is_empty() || id.starts_with(|c: char| c.is_ascii_digit()) {
        id.insert(0, '_');
    }
    if syn::parse_str::<syn::Ident>(&id).is_err() {
        id.push('_');
    }
    syn::Ident::new(&id, Span::call_site())
}

fn hex(value: u64) -> syn::LitInt {
    syn::LitInt::new(&format!("{value:#x}"), Span::call_site())
}

fn value_kind(kind: ValueKind) -> TokenStream {
    match kind {
        ValueKind::Boolean => quote!(ValueKind::Boolean),
        ValueKind::Uint => quote!(ValueKind::Uint),
        ValueKind::Int => quote!(ValueKind::Int),
        ValueKind::Float => quote!(ValueKind::Float),
        ValueKind::Fixed => quote!(ValueKind::Fixed),
        ValueKind::Ufixed => quote!(ValueKind::Ufixed),
        ValueKind::Hex => quote!(ValueKind::Hex),
        ValueKind::Address => quote!(ValueKind::Address),
        ValueKind::WAddress => quote!(ValueKind::WAddress),
        ValueKind::RegId => quote!(ValueKind::RegId),
        ValueKind::Other => quote!(ValueKind::Other),
    }
}

fn option<T: quote::ToTokens>(value: Option<T>) -> TokenStream {
    match value {
        Some(value) => quote!(Some(#value)),
        None => quote!(None),
    }
}

/// Generate a module of `u32` constants. Names mapping to the same
/// identifier keep their first value.
fn generate_constants<'a>(
    module: &syn::Ident,
    doc: &str,
    values: impl Iterator<Item = (u32, &'a str)>,
) -> TokenStream {
    let mut seen = HashSet::new();
    let mut constants = vec![];
    for (value, name) in values {
        let id = ident(&name.to_shouty_snake_case());
        if !seen.insert(id.to_string()) {
            tracing::debug!("{}: skipping duplicate constant {}", module, id);
            continue;
        }
        let value = hex(value as u64);
        constants.push(quote!(pub const #id: u32 = #value;));
    }
    quote! {
        #[doc = #doc]
        #[allow(dead_code)]
        pub mod #module {
            #(#constants)*
        }
    }
}

fn generate_enum_modules(enums: &[EnumTable]) -> Vec<TokenStream> {
    let mut modules = HashSet::from(["opcodes".to_owned()]);
    enums
        .iter()
        .map(|decl| {
            let mut module = ident(&decl.name.to_snake_case());
            if !modules.insert(module.to_string()) {
                module = format_ident!("{}_enum", module);
                modules.insert(module.to_string());
            }
            let doc = format!(" Values of the enum `{}`.", decl.name);
            generate_constants(
                &module,
                &doc,
                decl.values.iter().map(|(value, name)| (*value, name.as_str())),
            )
        })
        .collect()
}

fn generate_field(field: &Field) -> TokenStream {
    let Field {
        name,
        dword,
        value_kind: kind,
        enum_handle,
        shift,
        shr,
        radix,
        width,
        gpu_variants,
        mask,
        is_variant_selector,
    } = field;
    let kind = value_kind(*kind);
    let enum_handle = option(*enum_handle);
    let gpu_variants = gpu_variants.bits();
    let mask = hex(*mask);
    quote! {
        Field {
            name: #name.to_owned(),
            dword: #dword,
            value_kind: #kind,
            enum_handle: #enum_handle,
            shift: #shift,
            shr: #shr,
            radix: #radix,
            width: #width,
            gpu_variants: GpuVariantMask::from_bits(#gpu_variants),
            mask: #mask,
            is_variant_selector: #is_variant_selector,
        }
    }
}

fn generate_register(entry: &RegisterEntry) -> TokenStream {
    let RegInfo { name, is_64_bit, value_kind: kind, enum_handle, shr, radix, fields } = &entry.info;
    let offset = hex(entry.offset as u64);
    let gpu_variants = entry.gpu_variants.bits();
    let kind = value_kind(*kind);
    let enum_handle = option(*enum_handle);
    let fields = fields.iter().map(generate_field);
    quote! {
        RegisterEntry {
            offset: #offset,
            gpu_variants: GpuVariantMask::from_bits(#gpu_variants),
            info: RegInfo {
                name: #name.to_owned(),
                is_64_bit: #is_64_bit,
                value_kind: #kind,
                enum_handle: #enum_handle,
                shr: #shr,
                radix: #radix,
                fields: vec![#(#fields),*],
            },
        }
    }
}

fn generate_packet(entry: &PacketEntry) -> TokenStream {
    let opcode = hex(entry.opcode as u64);
    let gpu_variants = entry.gpu_variants.bits();
    let name = &entry.info.name;
    let max_array_size = entry.info.max_array_size;
    let stripe_variant = option(entry.info.stripe_variant);
    let fields = entry.info.fields.iter().map(generate_field);
    quote! {
        PacketEntry {
            opcode: #opcode,
            gpu_variants: GpuVariantMask::from_bits(#gpu_variants),
            info: PacketInfo {
                name: #name.to_owned(),
                max_array_size: #max_array_size,
                stripe_variant: #stripe_variant,
                fields: vec![#(#fields),*],
            },
        }
    }
}

fn generate_tables(tables: &Tables) -> TokenStream {
    let opcodes = tables.opcodes.iter().map(|op| {
        let opcode = hex(op.opcode as u64);
        let name = &op.name;
        quote!(Opcode { opcode: #opcode, name: #name.to_owned() })
    });
    let enums = tables.enums.iter().map(|decl| {
        let name = &decl.name;
        let values = decl.values.iter().map(|(value, name)| quote!((#value, #name.to_owned())));
        quote!(EnumTable { name: #name.to_owned(), values: vec![#(#values),*] })
    });
    let registers = tables.registers.iter().map(generate_register);
    let packets = tables.packets.iter().map(generate_packet);
    quote! {
        /// Build the reflection tables.
        pub fn tables() -> Tables {
            Tables {
                opcodes: vec![#(#opcodes),*],
                enums: vec![#(#enums),*],
                registers: vec![#(#registers),*],
                packets: vec![#(#packets),*],
            }
        }
    }
}

fn generate_entry_points() -> TokenStream {
    quote! {
        /// Initialize the process-wide reflection database with the
        /// generated tables.
        pub fn initialize() -> Result<&'static pm4_runtime::Database, pm4_runtime::Error> {
            pm4_runtime::global::initialize(tables())
        }

        pub fn set_active_gpu(id: u32) {
            pm4_runtime::global::set_active_gpu(id)
        }

        pub fn opcode_name(opcode: u32) -> Option<&'static str> {
            pm4_runtime::global::opcode_name(opcode)
        }

        pub fn reg_info(offset: u32) -> Option<&'static RegInfo> {
            pm4_runtime::global::reg_info(offset)
        }

        pub fn reg_by_name(name: &str) -> Option<&'static RegInfo> {
            pm4_runtime::global::reg_by_name(name)
        }

        pub fn field_by_name<'a>(reg: &'a RegInfo, name: &str) -> Option<&'a Field> {
            pm4_runtime::global::field_by_name(reg, name)
        }

        pub fn enum_value_name(handle: u8, value: u32) -> Option<&'static str> {
            pm4_runtime::global::enum_value_name(handle, value)
        }

        pub fn packet_info(opcode: u32) -> Option<&'static PacketInfo> {
            pm4_runtime::global::packet_info(opcode)
        }

        pub fn packet_info_by_name(opcode: u32, name: &str) -> Option<&'static PacketInfo> {
            pm4_runtime::global::packet_info_by_name(opcode, name)
        }

        pub fn is_field_applicable(field: &Field) -> bool {
            pm4_runtime::global::is_field_applicable(field)
        }
    }
}

/// Generate the token stream of the reflection tables.
/// `source_name` is the name of the root description document.
pub fn generate_tokens(tables: &Tables, source_name: &str) -> TokenStream {
    let preamble = preamble::generate(Path::new(source_name));
    let opcodes = generate_constants(
        &format_ident!("opcodes"),
        " Command packet opcodes.",
        tables.opcodes.iter().map(|op| (op.opcode, op.name.as_str())),
    );
    let enums = generate_enum_modules(&tables.enums);
    let tables = generate_tables(tables);
    let entry_points = generate_entry_points();
    quote! {
        #preamble

        #opcodes
        #(#enums)*

        #tables

        #entry_points
    }
}

/// Generate formatted Rust code from the reflection tables.
pub fn generate(tables: &Tables, source_name: &str) -> String {
    let syntax_tree =
        syn::parse2(generate_tokens(tables, source_name)).expect("Could not parse code");
    prettyplease::unparse(&syntax_tree)
}
