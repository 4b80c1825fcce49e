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

use codespan_reporting::term;
use proc_macro2::TokenStream;
use quote::quote;
use std::env;
use std::path::Path;
use syn::parse_macro_input;

fn pm4_proc_macro(path: syn::LitStr, input: syn::ItemMod) -> TokenStream {
    // Locate the root description document.
    let root = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into());
    let Some(document) =
        [Path::new(&root).join(path.value()), Path::new(&root).join("src").join(path.value())]
            .into_iter()
            .find(|path| path.is_file())
    else {
        return syn::Error::new(path.span(), "error: unable to find file").to_compile_error();
    };
    let (Some(root_dir), Some(name)) =
        (document.parent(), document.file_name().and_then(|name| name.to_str()))
    else {
        return syn::Error::new(path.span(), "error: invalid file name").to_compile_error();
    };

    // Load the document and its imports.
    let mut sources = pm4_compiler::ast::SourceDatabase::new();
    let file = match pm4_compiler::parser::parse_file(&mut sources, root_dir, name) {
        Ok(file) => file,
        Err(err) => {
            let mut buffer = termcolor::Buffer::no_color();
            term::emit(&mut buffer, &term::Config::default(), &sources, &err)
                .expect("could not emit parser diagnostics");
            return syn::Error::new(path.span(), String::from_utf8_lossy(buffer.as_slice()))
                .to_compile_error();
        }
    };

    // Run the analyzer.
    let tables = match pm4_compiler::analyzer::analyze(&file) {
        Ok(tables) => tables,
        Err(diagnostics) => {
            let mut buffer = termcolor::Buffer::no_color();
            diagnostics.emit(&sources, &mut buffer).expect("could not emit analyzer diagnostics");
            return syn::Error::new(path.span(), String::from_utf8_lossy(buffer.as_slice()))
                .to_compile_error();
        }
    };

    let generated = pm4_compiler::backends::rust::generate_tokens(&tables, name);
    // Every loaded document is a build dependency of the module.
    let dependencies = file.files.iter().filter_map(|id| sources.get(*id).ok()).map(|file| {
        let name = file.name();
        quote!(const _: &[u8] = include_bytes!(#name);)
    });
    let mod_ident = input.ident;
    let mod_attrs = input.attrs;
    let mod_vis = input.vis;
    let mod_items = input.content.map(|(_, items)| items).unwrap_or_default();

    quote! {
        #(#mod_attrs)*
        #mod_vis mod #mod_ident {
            #(#dependencies)*
            #generated
            #(#mod_items)*
        }
    }
}

/// Embed the reflection tables compiled from a description document in
/// the annotated module.
///
/// The path is relative to the crate root or its `src` directory.
#[proc_macro_attribute]
pub fn pm4(
    attr: proc_macro::TokenStream,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let attr = parse_macro_input!(attr as syn::LitStr);
    let input = parse_macro_input!(input as syn::ItemMod);
    pm4_proc_macro(attr, input).into()
}
