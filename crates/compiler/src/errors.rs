//! User-visible compile errors
//!
//! A [`CompileError`] renders as:
//!
//! ```text
//! /abs/path/file.tapl:3: error: unknown identifier 'nope'!
//!    3 | print(nope)
//! ```
//!
//! with the path and "error:" in ANSI bold (red for the severity token).
//! The parser and the two AST passes collect these instead of fast-failing,
//! so one run reports as many errors as possible.

use crate::source_location::SourceLocation;
use crate::source_location::source_line;
use std::fmt;
use std::path::Path;

pub const BOLD: &str = "\x1b[1m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// A single diagnostic tied to a source line
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub filename: String,
    pub line: i64,
    pub source_line: String,
}

impl CompileError {
    /// Build an error from a span into the source text
    pub fn at(
        message: impl Into<String>,
        filename: &Path,
        source: &str,
        location: SourceLocation,
    ) -> Self {
        let line = location.line_number(source);
        CompileError {
            message: message.into(),
            filename: absolute(filename),
            line,
            source_line: source_line(source, line),
        }
    }

    /// Build an error that has no usable span (internal compiler error path)
    pub fn without_location(message: impl Into<String>, filename: &Path) -> Self {
        CompileError {
            message: format!(
                "[ internal compiler error! (no source location found) ] {}",
                message.into()
            ),
            filename: absolute(filename),
            line: -1,
            source_line: "<no source code line available>".to_string(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{BOLD}{}:{}:{RESET} {BOLD}{RED}error:{RESET} {}",
            self.filename, self.line, self.message
        )?;
        write!(f, "{:>4} | {}", self.line, self.source_line)
    }
}

fn absolute(filename: &Path) -> String {
    filename
        .canonicalize()
        .unwrap_or_else(|_| filename.to_path_buf())
        .display()
        .to_string()
}

/// Print every collected error to stderr
pub fn report(errors: &[CompileError]) {
    for error in errors {
        eprintln!("{error}");
    }
}
