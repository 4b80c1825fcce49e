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

//! Lookups through the process-wide database.
//! The database is initialized once per process, hence a single test.

use pm4_runtime::Error;
use pm4_tests::adreno;

#[test]
fn test_global_database() {
    assert!(adreno::opcode_name(0x22).is_none());
    assert!(adreno::initialize().is_ok());
    assert!(matches!(adreno::initialize(), Err(Error::AlreadyInitialized)));

    assert_eq!(adreno::opcode_name(0x22), Some("CP_DRAW_INDX"));
    assert!(adreno::packet_info(adreno::opcodes::CP_DRAW_INDX).is_some());
    assert!(adreno::reg_info(0x880).is_none());

    adreno::set_active_gpu(7);
    let reg = adreno::reg_by_name("CP_APRIV_CNTL").unwrap();
    let field = adreno::field_by_name(reg, "ICACHE").unwrap();
    assert!(adreno::is_field_applicable(field));
    let packet = adreno::packet_info_by_name(70, "CP_EVENT_WRITE7").unwrap();
    let handle = packet.fields[0].enum_handle.unwrap();
    assert_eq!(adreno::enum_value_name(handle, 4), Some("CACHE_FLUSH7"));
}
