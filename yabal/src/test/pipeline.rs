//! Whole-pipeline tests, one per literal source from the machine description's scenario list —
//! the compiled-image-level counterpart to `lib.rs`'s own inline `compile()` tests. Each of these
//! sources is written the way a user would write it (no `int main() { ... }` wrapper; Yabal
//! programs are a bare sequence of top-level statements), unlike `lib.rs`'s own tests, which
//! happen to use a `main` function for unrelated reasons.
//!
//! There is no emulator in this workspace to actually run the compiled image against, so these
//! assert what's observable from here: the program compiles without an `Error`-level diagnostic,
//! and every output format renders without panicking. Asserting the exact resulting memory
//! contents would require executing the image, which is the external emulator's job.

use crate::{compile, Level, OutputFormat};

fn assert_compiles_cleanly(source: &str) -> crate::CompileOutput {
    let output = compile(source).unwrap_or_else(|err| panic!("expected {:?} to compile, got {}", source, err));
    assert!(
        !output.diagnostics.entries().iter().any(|d| d.level == Level::Error),
        "unexpected error diagnostic compiling {:?}: {:?}",
        source,
        output.diagnostics.entries()
    );
    for format in [OutputFormat::Asm, OutputFormat::AsmC, OutputFormat::Aexe, OutputFormat::Hex] {
        assert!(!output.render(format).is_empty());
    }
    output
}

#[test]
fn reassignment_after_declaration() {
    assert_compiles_cleanly("var a=2; var b=2; a = a + b;");
}

#[test]
fn compound_assignment() {
    assert_compiles_cleanly("var a=2; a -= 2;");
}

#[test]
fn a_function_call_mutates_a_global_through_two_levels() {
    assert_compiles_cleanly(
        "var a = 0; void f(int x){ a += x; g(); } void g(){ var v=1; a += v; } f(2);",
    );
}

#[test]
fn inline_asm_reads_and_writes_a_source_variable_by_name() {
    let output = assert_compiles_cleanly(
        "var r = 0; void inc(int amount){ asm { AIN @r; BIN @amount; ADD; STA @r } } inc(1);",
    );
    let asm = output.render(OutputFormat::Asm);
    for mnemonic in ["AIN", "BIN", "ADD", "STA"] {
        assert!(asm.contains(mnemonic), "expected {:?} to appear in rendered asm:\n{}", mnemonic, asm);
    }
}

#[test]
fn a_function_returning_an_asm_block_builds_a_raw_pointer_indexable_as_an_array() {
    assert_compiles_cleanly(
        "int[] mem(int a){ return asm { AIN @a } } var i=1; var v=2; var m=mem(4095); m[i]=v;",
    );
}

#[test]
fn a_while_loop_counting_down_through_negative_increments() {
    assert_compiles_cleanly("var v=10; while(v>0) v += -1;");
}

#[test]
fn a_c_style_for_loop_counting_up() {
    assert_compiles_cleanly("var v=0; for(; v<10; v++){ v += 1 }");
}
