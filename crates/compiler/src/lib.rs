//! TAPL Compiler Library
//!
//! Provides compilation from .tapl source to C source and executables.
//!
//! The pipeline is strictly sequential: source text is tokenized
//! (indentation becomes INDENT/DEDENT tokens), type-naming identifiers
//! are rewritten into type tokens, the rewritten stream is parsed into
//! a statement tree, the scoping and typing passes validate it, and the
//! code generator emits a C translation unit plus headers into a build
//! directory. External tools finish the job: clang-format for layout,
//! a C compiler for the executable.
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! let ast = taplc::compile_source("u16 var = 10\nprint(var)\n", Path::new("x.tapl"))?;
//! let code = taplc::CodeGen::new(&ast).generate();
//! assert!(code.main_c.contains("u16 var = 10;"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod parser;
pub mod scope;
pub mod scoping;
pub mod source_location;
pub mod stream;
pub mod tokenizer;
pub mod tokens;
pub mod type_applier;
pub mod type_resolver;
pub mod typechecker;
pub mod types;

pub use ast::Ast;
pub use codegen::CodeGen;
pub use codegen::GeneratedCode;
pub use config::BuildConfig;
pub use errors::CompileError;
pub use parser::Parser;
pub use scoping::ScopingPass;
pub use tokenizer::Tokenizer;
pub use typechecker::TypingPass;
pub use types::Type;
pub use types::Types;

use crate::type_applier::TypeApplier;
use crate::type_resolver::TypeResolver;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

/// Why a build stopped
#[derive(Debug)]
pub enum BuildError {
    /// User-visible diagnostics, ready to print
    Compile(Vec<CompileError>),
    /// File-system or downstream tool failure
    Tool(String),
}

/// Run the full front end on in-memory source text and return the
/// checked AST
pub fn compile_source(source: &str, filename: &Path) -> Result<Ast, Vec<CompileError>> {
    // lexical errors abort before any later pass sees the ERROR tokens
    let tokenized = Tokenizer::new(source, filename).tokenize();
    if !tokenized.errors.is_empty() {
        return Err(tokenized.errors);
    }
    let mut tokens = tokenized.tokens;

    let mut types = TypeResolver::resolve(&tokens);
    TypeApplier::new(filename, source, &mut types).apply(&mut tokens)?;

    let mut ast = Parser::new(tokens, types, filename, source).parse()?;

    ScopingPass::new(&ast, source).run(&ast)?;
    TypingPass::new(&ast, source).run(&mut ast)?;
    typechecker::verify_types(&ast);

    Ok(ast)
}

/// Compile a source file and write the generated C sources under the
/// build directory; returns the paths of the written files
pub fn compile_file(input: &Path, build_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let source = fs::read_to_string(input)
        .map_err(|e| BuildError::Tool(format!("Failed to read {}: {e}", input.display())))?;
    let ast = compile_source(&source, input).map_err(BuildError::Compile)?;
    CodeGen::new(&ast)
        .write(build_dir)
        .map_err(|e| BuildError::Tool(format!("Failed to write generated sources: {e}")))
}

/// Format every generated file in place; there is no fallback style, so
/// a missing formatter or style aborts the build
pub fn format_files(files: &[PathBuf], clang_format: &str) -> Result<(), String> {
    for file in files {
        let status = Command::new(clang_format)
            .arg("-i")
            .arg("--fallback-style=none")
            .arg(file)
            .status()
            .map_err(|e| format!("Failed to run {clang_format}: {e}"))?;
        if !status.success() {
            return Err(format!(
                "{clang_format} failed on {} with exit code {:?}",
                file.display(),
                status.code()
            ));
        }
    }
    Ok(())
}

/// Invoke the C compiler on the generated `main.c`, with the build
/// directory on the include path, and return the executable path
pub fn compile_c(build_dir: &Path, cc: &str) -> Result<PathBuf, String> {
    let executable = build_dir.join("main");
    let status = Command::new(cc)
        .arg("-I")
        .arg(build_dir)
        .arg("-O0")
        .arg("-g3")
        .arg("-o")
        .arg(&executable)
        .arg(build_dir.join("main.c"))
        .status()
        .map_err(|e| format!("Failed to run {cc}: {e}"))?;
    if !status.success() {
        return Err(format!("{cc} failed with exit code {:?}", status.code()));
    }
    Ok(executable)
}

/// Run the produced executable and hand back its exit code
pub fn run_executable(executable: &Path) -> Result<i32, String> {
    let status = Command::new(executable)
        .status()
        .map_err(|e| format!("Failed to run {}: {e}", executable.display()))?;
    Ok(status.code().unwrap_or(1))
}
