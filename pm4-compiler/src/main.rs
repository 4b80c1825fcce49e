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

//! PM4 description compiler.

use argh::FromArgs;
use codespan_reporting::term::{self, termcolor};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pm4_compiler::{analyzer, ast, backends, parser};

#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    JSON,
    Rust,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::JSON => "json",
            OutputFormat::Rust => "rs",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "json" => Ok(Self::JSON),
            "rust" => Ok(Self::Rust),
            _ => Err(format!("could not parse {input:?}, valid option are 'json', 'rust'.")),
        }
    }
}

#[derive(FromArgs, Debug)]
/// PM4 register and packet table generator.
struct Opt {
    #[argh(switch)]
    /// print tool version and exit.
    version: bool,

    #[argh(option, default = "OutputFormat::Rust")]
    /// generate output in this format ("rust", "json").
    /// The output is written to <output-basename>.rs or <output-basename>.json.
    output_format: OutputFormat,

    #[argh(positional)]
    /// directory containing the description documents.
    root_dir: Option<String>,

    #[argh(positional)]
    /// name of the root document, relative to the root directory.
    root_document: Option<String>,

    #[argh(positional)]
    /// path of the generated file, without extension.
    output_basename: Option<String>,
}

fn output_path(basename: &str, format: OutputFormat) -> PathBuf {
    PathBuf::from(format!("{basename}.{}", format.extension()))
}

fn generate_backend(
    format: OutputFormat,
    root_dir: &str,
    root_document: &str,
    output_basename: &str,
) -> Result<(), String> {
    let mut sources = ast::SourceDatabase::new();
    let writer = termcolor::StandardStream::stderr(termcolor::ColorChoice::Auto);
    let file = match parser::parse_file(&mut sources, Path::new(root_dir), root_document) {
        Ok(file) => file,
        Err(err) => {
            let config = term::Config::default();
            term::emit(&mut writer.lock(), &config, &sources, &err)
                .expect("Could not print error");
            return Err(String::from("Error while loading descriptions"));
        }
    };

    let tables = match analyzer::analyze(&file) {
        Ok(tables) => tables,
        Err(diagnostics) => {
            diagnostics
                .emit(&sources, &mut writer.lock())
                .expect("Could not print analyzer diagnostics");
            return Err(String::from("Analysis failed"));
        }
    };
    tracing::info!(
        "{} opcodes, {} enums, {} registers, {} packets",
        tables.opcodes.len(),
        tables.enums.len(),
        tables.registers.len(),
        tables.packets.len()
    );

    let output = match format {
        #[cfg(feature = "serde")]
        OutputFormat::JSON => backends::json::generate(&tables)?,
        #[cfg(not(feature = "serde"))]
        OutputFormat::JSON => {
            return Err(String::from(
                "For JSON support, please recompile with the 'serde' feature",
            ))
        }
        OutputFormat::Rust => backends::rust::generate(&tables, root_document),
    };

    let path = output_path(output_basename, format);
    std::fs::write(&path, output)
        .map_err(|err| format!("Could not write {}: {err}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}

fn main() -> Result<(), String> {
    let opt: Opt = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if opt.version {
        println!("pm4c {}\nCopyright (C) 2026 Google LLC", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (Some(root_dir), Some(root_document), Some(output_basename)) =
        (opt.root_dir.as_ref(), opt.root_document.as_ref(), opt.output_basename.as_ref())
    else {
        return Err("Usage: pm4c <root-dir> <root-document> <output-basename>".to_owned());
    };

    generate_backend(opt.output_format, root_dir, root_document, output_basename)
}
