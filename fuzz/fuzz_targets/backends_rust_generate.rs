#![no_main]

use libfuzzer_sys::fuzz_target;
use pm4_compiler::{analyzer, ast, backends, parser};

// Fuzz pm4_compiler::backends::rust::generate.
fuzz_target!(|source: String| {
    let mut sources = ast::SourceDatabase::new();
    let Ok(file) = parser::parse_inline(&mut sources, "input.xml", source) else {
        return;
    };
    let Ok(tables) = analyzer::analyze(&file) else {
        return
    };
    let _ = backends::rust::generate(&tables, "input.xml");
});
