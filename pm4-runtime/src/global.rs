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

//! Process-wide reflection database.
//!
//! The database is initialized once, typically through the
//! `initialize` function of the generated tables. Lookups performed
//! before initialization return `None`. The active generation is
//! shared by every caller: select it once before starting concurrent
//! analysis, and use independent [`Database`] instances when different
//! generations are needed at the same time.

use std::sync::OnceLock;

use crate::{Database, Error, Field, PacketInfo, RegInfo, Tables};

static DATABASE: OnceLock<Database> = OnceLock::new();

/// Assemble the process-wide database.
/// Fails if the database was already initialized.
pub fn initialize(tables: Tables) -> Result<&'static Database, Error> {
    let mut initialized = false;
    let database = DATABASE.get_or_init(|| {
        initialized = true;
        Database::new(tables)
    });
    if initialized {
        Ok(database)
    } else {
        Err(Error::AlreadyInitialized)
    }
}

pub fn database() -> Option<&'static Database> {
    DATABASE.get()
}

/// Select the active generation, see [`Database::set_active_gpu`].
/// Has no effect before initialization.
pub fn set_active_gpu(id: u32) {
    if let Some(database) = database() {
        database.set_active_gpu(id)
    }
}

pub fn opcode_name(opcode: u32) -> Option<&'static str> {
    database()?.opcode_name(opcode)
}

pub fn reg_info(offset: u32) -> Option<&'static RegInfo> {
    database()?.reg_info(offset)
}

pub fn reg_by_name(name: &str) -> Option<&'static RegInfo> {
    database()?.reg_by_name(name)
}

pub fn field_by_name<'a>(reg: &'a RegInfo, name: &str) -> Option<&'a Field> {
    reg.fields.iter().find(|field| field.name == name)
}

pub fn enum_value_name(handle: u8, value: u32) -> Option<&'static str> {
    database()?.enum_value_name(handle, value)
}

pub fn packet_info(opcode: u32) -> Option<&'static PacketInfo> {
    database()?.packet_info(opcode)
}

pub fn packet_info_by_name(opcode: u32, name: &str) -> Option<&'static PacketInfo> {
    database()?.packet_info_by_name(opcode, name)
}

pub fn is_field_applicable(field: &Field) -> bool {
    match database() {
        Some(database) => database.is_field_applicable(field),
        None => field.gpu_variants.is_unconstrained(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{GpuVariant, Opcode};

    // The process-wide database can only be initialized once per test
    // binary, keep every check in a single test.
    #[test]
    fn test_initialize_once() {
        assert!(database().is_none());
        assert_eq!(opcode_name(0x10), None);
        set_active_gpu(6);

        let tables = Tables {
            opcodes: vec![Opcode { opcode: 0x10, name: "CP_NOP".to_owned() }],
            ..Default::default()
        };
        let database = initialize(tables.clone()).unwrap();
        assert_eq!(database.active_gpu(), None);
        assert_eq!(opcode_name(0x10), Some("CP_NOP"));
        assert!(matches!(initialize(tables), Err(Error::AlreadyInitialized)));

        set_active_gpu(6);
        assert_eq!(database.active_gpu(), Some(GpuVariant::A6xx));
    }
}
