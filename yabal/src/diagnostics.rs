//! Diagnostics accumulated while compiling.
//!
//! Semantic diagnostics are collected into a [`DiagnosticSink`] rather than returned eagerly, so
//! that `declare`/`initialize`/`build` can surface as many problems as possible in one pass. The
//! final image is only produced if the sink contains no [`Level::Error`] entry.

use std::fmt;

use crate::parser::Rule;

/// A half-open span in the original source text, line/column based like `pest::Span::start_pos`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SourceRange {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceRange {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        SourceRange {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn from_span(span: &pest::Span) -> Self {
        let (start_line, start_col) = span.start_pos().line_col();
        let (end_line, end_col) = span.end_pos().line_col();
        SourceRange::new(start_line, start_col, end_line, end_col)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(
                f,
                "{}:{}-{}",
                self.start_line, self.start_col, self.end_col
            )
        } else {
            write!(
                f,
                "{}:{}-{}:{}",
                self.start_line, self.start_col, self.end_line, self.end_col
            )
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "debug",
            Level::Warning => "warning",
            Level::Error => "error",
        })
    }
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub range: SourceRange,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}: {}", self.range, self.level, self.message)
    }
}

/// Accumulates diagnostics in emission order, as a flat, ordered list since nothing needs
/// random access by range and rendering wants emission order.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, range: SourceRange, level: Level, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            range,
            level,
            message: message.into(),
        });
    }

    pub fn error(&mut self, range: SourceRange, message: impl Into<String>) {
        self.push(range, Level::Error, message);
    }

    pub fn warning(&mut self, range: SourceRange, message: impl Into<String>) {
        self.push(range, Level::Warning, message);
    }

    pub fn debug(&mut self, range: SourceRange, message: impl Into<String>) {
        self.push(range, Level::Debug, message);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.level == Level::Error)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn extend(&mut self, other: DiagnosticSink) {
        self.entries.extend(other.entries);
    }
}

/// Top-level compile error: either the grammar rejected the source outright, or `initialize`/
/// `build` recorded at least one [`Level::Error`] diagnostic.
#[derive(Debug)]
pub enum Error {
    Parse(pest::error::Error<Rule>),
    Diagnostics(Vec<Diagnostic>),
}

impl From<pest::error::Error<Rule>> for Error {
    fn from(err: pest::error::Error<Rule>) -> Self {
        Error::Parse(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{}", err),
            Error::Diagnostics(diagnostics) => {
                for (i, diagnostic) in diagnostics.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", diagnostic)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}
