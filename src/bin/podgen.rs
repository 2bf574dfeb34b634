//! podgen CLI
//!
//! `podgen <schema-file>... -t <template-dir> -o <output-dir> -c <schema-root-dir>`
//!
//! Skippable problems (missing input, wrong extension) are diagnosed and do
//! not affect the exit code; template or output failures abort the whole
//! run.

use std::path::{Path, PathBuf};

use clap::Parser;
use podgen::graph::ImportResolver;
use podgen::parser::CapnpParser;
use podgen::render;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "podgen")]
#[command(about = "Generate POD declarations and conversion routines from Cap'n Proto schemas")]
struct Cli {
    /// Input schema files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Template directory
    #[arg(short = 't', long = "templates")]
    template_dir: PathBuf,

    /// Output directory, created as needed
    #[arg(short = 'o', long = "output")]
    output_dir: PathBuf,

    /// Schema root directory for absolute imports
    #[arg(short = 'c', long = "schema-root")]
    schema_root: PathBuf,
}

fn main() {
    // diagnostics stay visible without RUST_LOG set
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // usage error: print and exit 1
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if !cli.schema_root.exists() {
        eprintln!("Invalid schema root: '{}'", cli.schema_root.display());
        std::process::exit(2);
    }
    if !cli.template_dir.exists() {
        eprintln!("Invalid template path: '{}'", cli.template_dir.display());
        std::process::exit(2);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Why an input file is skipped instead of processed
#[derive(Debug, PartialEq)]
enum SkippedInput {
    Missing,
    NotSchema,
}

fn check_input(input: &Path) -> Option<SkippedInput> {
    if !input.exists() {
        return Some(SkippedInput::Missing);
    }
    if input.extension().map(|e| e != "capnp").unwrap_or(true) {
        return Some(SkippedInput::NotSchema);
    }
    None
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let parser = CapnpParser::new();
    let resolver = ImportResolver::new(&parser, &cli.schema_root)
        .with_search_paths(vec![cli.schema_root.clone(), cli.template_dir.clone()]);

    for input in &cli.inputs {
        match check_input(input) {
            Some(SkippedInput::Missing) => {
                println!("capnp file not found: {}", input.display());
                continue;
            }
            Some(SkippedInput::NotSchema) => {
                println!("not a capnp file: {}", input.display());
                continue;
            }
            None => {}
        }

        println!("parsing {}", input.display());

        // the root file's own parse (or classification) failing is fatal
        let info = resolver.build_schema_info(input)?;

        if let Some(namespace) = info.import_namespaces.get(&info.anchor) {
            if !namespace.is_empty() {
                println!("  found namespace {namespace}");
            }
        }
        for line in &info.diagnostics {
            println!("  {line}");
        }

        let artifacts =
            render::generate_for_root(&info, input, &cli.template_dir, &cli.output_dir)?;
        println!("  generating file {}", artifacts.pod_header.display());
        println!("  generating file {}", artifacts.convert_header.display());
        println!("  generating file {}", artifacts.convert_source.display());
    }

    Ok(())
}
