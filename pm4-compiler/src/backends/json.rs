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

//! JSON serializer for the reflection tables.

use pm4_runtime::Tables;

/// Turn the reflection tables into a JSON representation.
pub fn generate(tables: &Tables) -> Result<String, String> {
    serde_json::to_string_pretty(tables)
        .map_err(|err| format!("could not JSON serialize tables: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm4_runtime::{GpuVariantMask, Opcode, PacketEntry, PacketInfo};

    #[test]
    fn test_generate_json() {
        let tables = Tables {
            opcodes: vec![Opcode { opcode: 0x10, name: "CP_NOP".to_owned() }],
            packets: vec![PacketEntry {
                opcode: 0x10,
                gpu_variants: GpuVariantMask::parse("A6XX-"),
                info: PacketInfo {
                    name: "CP_NOP".to_owned(),
                    max_array_size: 0,
                    stripe_variant: None,
                    fields: vec![],
                },
            }],
            ..Default::default()
        };
        let json = generate(&tables).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["opcodes"][0]["name"], "CP_NOP");
        assert_eq!(value["packets"][0]["gpu_variants"], 0b111_0000);
        assert_eq!(value["packets"][0]["info"]["stripe_variant"], serde_json::Value::Null);

        let decoded: Tables = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tables);
    }
}
