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

//! PM4 hardware description loader, analyzer and table generator.

pub mod analyzer;
pub mod ast;
pub mod backends;
pub mod parser;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rust_output_is_deterministic() {
        // The generated code should be deterministic, to avoid unnecessary rebuilds during
        // incremental builds.
        let src = r#"
<database>
  <enum name="adreno_pm4_type3_packets">
    <value name="CP_NOP" value="16"/>
    <value name="CP_DRAW_INDX" value="0x22"/>
    <value name="CP_EVENT_WRITE" value="70" variants="A2XX-A5XX"/>
    <value name="CP_EVENT_WRITE7" value="70" variants="A6XX-"/>
  </enum>
  <enum name="pc_di_primtype">
    <value name="DI_PT_NONE" value="0"/>
    <value name="DI_PT_POINTLIST" value="1"/>
  </enum>
  <domain name="CP_DRAW_INDX">
    <reg32 offset="0" name="0">
      <bitfield name="PRIM_TYPE" low="0" high="5" type="pc_di_primtype"/>
    </reg32>
    <reg64 offset="1" name="ADDR" type="address"/>
  </domain>
  <domain name="A6XX">
    <reg32 offset="0x0800" name="CP_RB_CNTL"/>
    <reg32 offset="0x0801" name="CP_MISC_CNTL" variants="A7XX-"/>
  </domain>
</database>
"#;

        let generate = || {
            let mut sources = ast::SourceDatabase::new();
            let file = parser::parse_inline(&mut sources, "foo.xml", src.to_owned()).unwrap();
            let tables = analyzer::analyze(&file).unwrap();
            backends::rust::generate(&tables, "foo.xml")
        };

        let result1 = generate();
        let result2 = generate();
        let result3 = generate();

        assert_eq!(result1, result2);
        assert_eq!(result2, result3);
    }
}
