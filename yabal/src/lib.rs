//! # yabal
//!
//! A compiler for the Yabal language: a small C-like surface syntax that targets a 16-bit,
//! single-accumulator machine with no hardware call stack, multiply/divide, or xor instruction.
//! The instruction set is just `AIN, BIN, CIN, ADD, SUB, AND, OR,
//! NOT, SHL, SHR`, three register swaps, a bank switch, three jumps, `STA/LDI/STI` for indirect
//! memory access, and `HLT`.
//!
//! The pipeline is:
//!
//! 1. **Parse** (`parser`) — `yabal.pest` + `pest_derive` turn source text into a `Pair<Rule>`
//!    tree; `parser::parse_program` walks it into a `Vec<ast::Stmt>`.
//! 2. **Declare** (`ast::Stmt::declare`) — hoists top-level function/struct names so forward
//!    references and recursion resolve regardless of textual order.
//! 3. **Compile** (`ast::Stmt::compile`) — a single combined `initialize`/`optimize`/`build` pass
//!    per statement (see `ast::stmt`'s module doc for why this is one pass, not three), threading
//!    a [`Builder`] that owns the instruction buffer, scopes, function table, and literal pools.
//! 4. **Link** (`Builder::finish` → `linker::link`) — lays out the data region, used function
//!    bodies, the shared `__call`/`__return` trampoline, user code, and the string/binary pools,
//!    patching every symbolic operand to a concrete address in one pass.
//!
//! [`compile`] runs the whole pipeline and returns a [`CompileOutput`] that can be rendered to any
//! of the four output encodings via [`CompileOutput::render`].
//!
//! Diagnostics (parse errors, and any `declare`/`compile`-time error, warning, or debug note) are
//! accumulated rather than returned eagerly, so one run surfaces as many problems as possible;
//! see `diagnostics` for the accumulation policy and why an `Error`-level diagnostic suppresses
//! the image even though compilation itself always runs to completion.

pub mod ast;
mod block;
mod builder;
mod char_table;
mod diagnostics;
mod instr;
mod linker;
mod memory_map;
mod parser;
mod strings;
mod symbols;
#[cfg(test)]
mod test;
mod types;

pub use block::StorageClass;
pub use builder::{Builder, Function, FunctionParam, FunctionTable};
pub use diagnostics::{Diagnostic, DiagnosticSink, Error, Level, SourceRange};
pub use instr::{Opcode, Operand};
pub use linker::{LinkError, LinkOutput, RenderedEntry, ResolvedOperand};
pub use memory_map::{
    CHARACTER_BUFFER_ADDRESS, DEFAULT_PROGRAM_SIZE, DEFAULT_STACK_SLOTS, DEVICE_BANK, KEYBOARD_ADDRESS,
    MOUSE_ADDRESS, SCREEN_ADDRESS,
};
pub use symbols::{Bank, Label, Pointer, PointerWithOffset};
pub use types::{BitField, StructDef, StructField, Type};

pub type Result<T> = std::result::Result<T, Error>;

/// One of the four ways a linked image can be rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One mnemonic (and resolved operand) per line.
    Asm,
    /// Same as `Asm`, with a trailing `; comment` on lines that carry one.
    AsmC,
    /// One hex word per line, in address order — the flat load image a simulator reads.
    Aexe,
    /// Logisim Evolution's `v2.0 raw` memory-image text format, run-length compressed.
    Hex,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asm" => Ok(OutputFormat::Asm),
            "asmc" => Ok(OutputFormat::AsmC),
            "aexe" => Ok(OutputFormat::Aexe),
            "hex" => Ok(OutputFormat::Hex),
            other => Err(format!("unknown output format '{}' (expected asm, asmc, aexe or hex)", other)),
        }
    }
}

/// One top-level statement's source range mapped to the half-open word-address range it
/// compiled to in the final image. Coarse (per top-level statement, not per expression or
/// instruction) since the builder's single combined declare/compile pass has no cheaper place
/// to record source ranges at finer grain without threading a range through every `Buffer::emit`
/// call, including the synthetic ones (trampoline, literal pools) that have no source position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceMapEntry {
    pub range: SourceRange,
    pub start_address: u16,
    pub end_address: u16,
}

/// A successful compile: the linked image, plus every diagnostic gathered along the way that
/// wasn't severe enough to fail the compile (warnings, and "function is never called" notes).
pub struct CompileOutput {
    pub image: LinkOutput,
    pub diagnostics: DiagnosticSink,
    pub source_map: Vec<SourceMapEntry>,
}

impl CompileOutput {
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Asm => linker::render_assembly(&self.image, false),
            OutputFormat::AsmC => linker::render_assembly(&self.image, true),
            OutputFormat::Aexe => linker::render_aexe(&self.image),
            OutputFormat::Hex => linker::render_logisim(&self.image, None),
        }
    }

    /// Renders the source map as one `line:col-line:col -> 0xSTART..0xEND` entry per line, in
    /// program order.
    pub fn render_source_map(&self) -> String {
        let mut out = String::new();
        for entry in &self.source_map {
            out.push_str(&format!(
                "{}:{}-{}:{} -> 0x{:04X}..0x{:04X}\n",
                entry.range.start_line,
                entry.range.start_col,
                entry.range.end_line,
                entry.range.end_col,
                entry.start_address,
                entry.end_address,
            ));
        }
        out
    }
}

/// Compiles `source` into a linked program image.
///
/// Runs parse → declare → compile over the whole program, then links, unless `compile` recorded
/// at least one [`Level::Error`]-level diagnostic — in which case linking is skipped entirely and
/// every accumulated diagnostic is returned via [`Error::Diagnostics`]. A grammar-level parse
/// failure short-circuits before any of that and comes back as [`Error::Parse`].
pub fn compile(source: &str) -> Result<CompileOutput> {
    let mut program = parser::parse_program(source)?;

    let mut builder = Builder::new();
    for stmt in &program {
        stmt.declare(&mut builder);
    }

    let program_start = builder.create_label(Some("__start".to_owned()));
    builder.mark(program_start);
    let mut extents: Vec<(SourceRange, usize, usize)> = Vec::with_capacity(program.len());
    for stmt in program.iter_mut() {
        let start = builder.buffer().position();
        stmt.compile(&mut builder);
        let end = builder.buffer().position();
        extents.push((stmt.range, start, end));
    }
    builder.emit(Opcode::HLT, Operand::None);

    if builder.diagnostics().has_errors() {
        return Err(Error::Diagnostics(builder.into_diagnostics().entries().to_vec()));
    }

    let (image, diagnostics) = builder.finish(program_start).map_err(|err| {
        Error::Diagnostics(vec![Diagnostic {
            range: SourceRange::default(),
            level: Level::Error,
            message: err.message,
        }])
    })?;

    let main_base = image.addresses.get(&program_start.as_pointer()).copied().unwrap_or(0);
    let source_map = extents
        .into_iter()
        .map(|(range, start, end)| SourceMapEntry {
            range,
            start_address: main_base + start as u16,
            end_address: main_base + end as u16,
        })
        .collect();

    Ok(CompileOutput {
        image,
        diagnostics,
        source_map,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compiles_a_trivial_program_to_a_halting_image() {
        let output = compile("int main() { return 0; }").expect("compiles");
        assert!(!output.image.words.is_empty());
    }

    #[test]
    fn reports_an_undeclared_identifier_without_panicking() {
        let err = compile("int main() { return y; }").unwrap_err();
        match err {
            Error::Diagnostics(diagnostics) => {
                assert!(diagnostics.iter().any(|d| d.message.contains("not declared")));
            }
            other => panic!("expected Diagnostics, got {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_source_as_a_parse_error() {
        let err = compile("int main( { }").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn renders_every_output_format_without_panicking() {
        let output = compile("int main() { int x = 1 + 2; return x; }").expect("compiles");
        for format in [OutputFormat::Asm, OutputFormat::AsmC, OutputFormat::Aexe, OutputFormat::Hex] {
            assert!(!output.render(format).is_empty());
        }
    }

    #[test]
    fn notes_an_unused_function_as_a_debug_diagnostic() {
        let output = compile("int unused() { return 1; } int main() { return 0; }").expect("compiles");
        assert!(output
            .diagnostics
            .entries()
            .iter()
            .any(|d| d.level == Level::Debug && d.message.contains("never called")));
    }

    #[test]
    fn source_map_covers_every_top_level_statement_in_order() {
        let output = compile("int main() { int x = 1; int y = 2; return x + y; }").expect("compiles");
        assert_eq!(output.source_map.len(), 1);
        let entry = output.source_map[0];
        assert!(entry.start_address <= entry.end_address);
        assert!(!output.render_source_map().is_empty());
    }

    #[test]
    fn output_format_parses_all_four_names() {
        assert_eq!("asm".parse::<OutputFormat>().unwrap(), OutputFormat::Asm);
        assert_eq!("asmc".parse::<OutputFormat>().unwrap(), OutputFormat::AsmC);
        assert_eq!("aexe".parse::<OutputFormat>().unwrap(), OutputFormat::Aexe);
        assert_eq!("hex".parse::<OutputFormat>().unwrap(), OutputFormat::Hex);
        assert!("bogus".parse::<OutputFormat>().is_err());
    }
}
