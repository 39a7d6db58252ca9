//! Grammar-level tests against `yabal.pest` directly, bypassing `parser::parse_program`'s AST
//! construction. These pin down the token tree pest produces for individual rules, the same way
//! a grammar's own test suite would, rather than only exercising the grammar indirectly through
//! whatever `parse_program` happens to read out of it.

use crate::parser::{Rule, YabalParser};
use ::pest::*;

#[test]
fn identifier() {
    parses_to! {
        parser: YabalParser,
        input: "foo_Bar9",
        rule: Rule::identifier,
        tokens: [ identifier(0, 8) ]
    };

    // "integer" shares a prefix with the `int` keyword but isn't one; the keyword rule's own
    // word-boundary lookahead must keep it from being rejected.
    parses_to! {
        parser: YabalParser,
        input: "integer",
        rule: Rule::identifier,
        tokens: [ identifier(0, 7) ]
    };

    fails_with! {
        parser: YabalParser,
        input: "123abc",
        rule: Rule::identifier,
        positives: vec![Rule::identifier],
        negatives: vec![],
        pos: 0
    };
}

#[test]
fn keyword_is_not_a_valid_identifier() {
    assert!(YabalParser::parse(Rule::identifier, "if").is_err());
    assert!(YabalParser::parse(Rule::identifier, "struct").is_err());
    assert!(YabalParser::parse(Rule::identifier, "create_pointer").is_err());
}

#[test]
fn int_literal() {
    parses_to! {
        parser: YabalParser,
        input: "123",
        rule: Rule::int_literal,
        tokens: [ int_literal(0, 3) ]
    };
    parses_to! {
        parser: YabalParser,
        input: "0x1A",
        rule: Rule::int_literal,
        tokens: [ int_literal(0, 4) ]
    };
    parses_to! {
        parser: YabalParser,
        input: "-7",
        rule: Rule::int_literal,
        tokens: [ int_literal(0, 2) ]
    };
}

#[test]
fn bool_literal() {
    parses_to! {
        parser: YabalParser,
        input: "true",
        rule: Rule::bool_literal,
        tokens: [ bool_literal(0, 4) ]
    };
    parses_to! {
        parser: YabalParser,
        input: "false",
        rule: Rule::bool_literal,
        tokens: [ bool_literal(0, 5) ]
    };
    // "truer" isn't `true` followed by a word boundary, so the whole rule must fail rather than
    // matching a truncated "true".
    assert!(YabalParser::parse(Rule::bool_literal, "truer").is_err());
}

#[test]
fn type_name_base_only() {
    parses_to! {
        parser: YabalParser,
        input: "int",
        rule: Rule::type_name,
        tokens: [ type_name(0, 3, [ base_type(0, 3) ]) ]
    };
}

#[test]
fn type_name_array_suffix() {
    parses_to! {
        parser: YabalParser,
        input: "int[10]",
        rule: Rule::type_name,
        tokens: [ type_name(0, 7, [
            base_type(0, 3),
            type_suffix(3, 7, [ int_literal(4, 6) ])
        ]) ]
    };
}

#[test]
fn type_name_ref_recurses() {
    parses_to! {
        parser: YabalParser,
        input: "ref int",
        rule: Rule::type_name,
        tokens: [ type_name(0, 7, [
            type_name(4, 7, [ base_type(4, 7) ])
        ]) ]
    };
}

#[test]
fn var_decl_stmt_without_initializer() {
    parses_to! {
        parser: YabalParser,
        input: "var x;",
        rule: Rule::var_decl_stmt,
        tokens: [ var_decl_stmt(0, 6, [ identifier(4, 5) ]) ]
    };
    parses_to! {
        parser: YabalParser,
        input: "bool flag",
        rule: Rule::var_decl_stmt,
        tokens: [ var_decl_stmt(0, 9, [
            type_name(0, 4, [ base_type(0, 4) ]),
            identifier(5, 9)
        ]) ]
    };
}

#[test]
fn struct_field_with_and_without_bit_width() {
    parses_to! {
        parser: YabalParser,
        input: "int x: 4;",
        rule: Rule::struct_field,
        tokens: [ struct_field(0, 9, [
            type_name(0, 3, [ base_type(0, 3) ]),
            identifier(4, 5),
            int_literal(7, 8)
        ]) ]
    };
    parses_to! {
        parser: YabalParser,
        input: "bool b;",
        rule: Rule::struct_field,
        tokens: [ struct_field(0, 7, [
            type_name(0, 4, [ base_type(0, 4) ]),
            identifier(5, 6)
        ]) ]
    };
}

#[test]
fn function_decl_with_a_parameter() {
    parses_to! {
        parser: YabalParser,
        input: "void f(int x){}",
        rule: Rule::function_decl,
        tokens: [ function_decl(0, 15, [
            identifier(5, 6),
            param_list(7, 12, [
                param(7, 12, [
                    type_name(7, 10, [ base_type(7, 10) ]),
                    identifier(11, 12)
                ])
            ]),
            block_stmt(13, 15)
        ]) ]
    };
}

#[test]
fn struct_decl() {
    parses_to! {
        parser: YabalParser,
        input: "struct P{int x;}",
        rule: Rule::struct_decl,
        tokens: [ struct_decl(0, 16, [
            identifier(7, 8),
            struct_field(9, 15, [
                type_name(9, 12, [ base_type(9, 12) ]),
                identifier(13, 14)
            ])
        ]) ]
    };
}

#[test]
fn asm_expr_with_a_variable_operand() {
    parses_to! {
        parser: YabalParser,
        input: "asm{AIN;BIN@x;}",
        rule: Rule::asm_expr,
        tokens: [ asm_expr(0, 15, [
            asm_line(4, 8, [ mnemonic(4, 7) ]),
            asm_line(8, 14, [
                mnemonic(8, 11),
                asm_operand(11, 13, [ var_ref(11, 13) ])
            ])
        ]) ]
    };
}

#[test]
fn program_is_a_sequence_of_statements_to_eoi() {
    parses_to! {
        parser: YabalParser,
        input: "void f(){}",
        rule: Rule::program,
        tokens: [ program(0, 10, [
            stmt(0, 10, [
                function_decl(0, 10, [
                    identifier(5, 6),
                    block_stmt(8, 10)
                ])
            ]),
            EOI(10, 10)
        ]) ]
    };
}
