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

use quote::quote;
use std::path::Path;

/// Generate the file preamble.
/// The doc string is an outer attribute: the generated code is spliced
/// in the middle of a module by the `pm4` attribute macro.
pub fn generate(path: &Path) -> proc_macro2::TokenStream {
    let filename = path.file_name().and_then(|name| name.to_str()).unwrap_or("<inline>");
    let module_doc_string = format!(" @generated PM4 reflection tables from {filename}.");
    quote! {
        #[doc = #module_doc_string]
        #[allow(unused_imports)]
        use pm4_runtime::{
            EnumTable, Field, GpuVariantMask, Opcode, PacketEntry, PacketInfo, RegInfo,
            RegisterEntry, Tables, ValueKind,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_preamble() {
        let code = generate(Path::new("some/path/adreno_pm4.xml")).to_string();
        assert!(code.contains("@generated PM4 reflection tables from adreno_pm4.xml."));
        assert!(code.contains("pm4_runtime"));
    }
}
