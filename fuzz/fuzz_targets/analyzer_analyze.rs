#![no_main]

use libfuzzer_sys::fuzz_target;
use pm4_compiler::{analyzer, ast, parser};

// Fuzz pm4_compiler::analyzer::analyze.
fuzz_target!(|source: String| {
    let mut sources = ast::SourceDatabase::new();
    let Ok(file) = parser::parse_inline(&mut sources, "input.xml", source) else {
        return;
    };
    let _ = analyzer::analyze(&file);
});
