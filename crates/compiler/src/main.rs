//! TAPL Compiler CLI
//!
//! Command-line interface for compiling .tapl programs to executables:
//! generate C sources into the build directory, format them, hand them
//! to the C compiler and run the result.

use clap::Parser as ClapParser;
use std::path::Path;
use std::path::PathBuf;
use std::process;
use taplc::BuildConfig;
use taplc::BuildError;
use taplc::Tokenizer;

#[derive(ClapParser)]
#[command(name = "taplc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "TAPL compiler - compile .tapl programs to executables", long_about = None)]
struct Cli {
    /// Input .tapl source file
    input: PathBuf,

    /// Build directory for the generated sources (overrides tapl.toml)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Stop after producing the executable instead of running it
    #[arg(long)]
    no_run: bool,

    /// Dump the token stream (live and discarded channels) and exit
    #[arg(long)]
    emit_tokens: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.emit_tokens {
        dump_tokens(&cli.input);
        return;
    }

    let config = match BuildConfig::load(&cli.input) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
    };
    let build_dir = cli.build_dir.unwrap_or_else(|| config.build_dir());

    let written = match taplc::compile_file(&cli.input, &build_dir) {
        Ok(written) => written,
        Err(BuildError::Compile(errors)) => {
            taplc::errors::report(&errors);
            process::exit(1);
        }
        Err(BuildError::Tool(message)) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
    };

    if let Err(message) = taplc::format_files(&written, &config.clang_format()) {
        eprintln!("Error: {message}");
        process::exit(1);
    }

    let executable = match taplc::compile_c(&build_dir, &config.cc()) {
        Ok(executable) => executable,
        Err(message) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
    };
    println!("Compiled {} -> {}", cli.input.display(), executable.display());

    if cli.no_run || !config.run() {
        return;
    }
    match taplc::run_executable(&executable) {
        Ok(code) => process::exit(code),
        Err(message) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
    }
}

/// Debug aid: print every token the tokenizer produced, including the
/// comments and redundant newlines it discarded
fn dump_tokens(input: &Path) {
    let source = match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Error: Failed to read {}: {error}", input.display());
            process::exit(1);
        }
    };

    let mut result = Tokenizer::new(&source, input).tokenize();
    while let Some(token) = result.tokens.next() {
        println!(
            "{:?} @ {}..{}",
            token.kind,
            token.location.start,
            token.location.end()
        );
    }
    for token in &result.discarded {
        println!(
            "discarded {:?} @ {}..{}",
            token.kind,
            token.location.start,
            token.location.end()
        );
    }
    for error in &result.errors {
        eprintln!("{error}");
    }
    if !result.errors.is_empty() {
        process::exit(1);
    }
}
