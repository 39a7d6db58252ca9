//! Builds the Yabal AST out of a `pest`-generated parse tree.
//!
//! `yabal.pest` defines the grammar; `#[derive(Parser)]` turns it into a `Rule` enum and a
//! `YabalParser` type. Everything below just walks the resulting `Pair<Rule>` tree into
//! `ast::{Expr, Stmt}` nodes — the same `Pair`-driven `process_*` dispatch style
//! `vasm::instructions`/`vasm::data` use for their own (unrelated) grammar.

use pest::iterators::Pair;
use pest::Parser as _;
use pest_derive::Parser;

use crate::ast::{
    AsmLine, AsmOperand, BinaryOp, Expr, ExprKind, Param, Stmt, StmtKind, StructFieldDecl, TypeName, UnaryOp,
};
use crate::diagnostics::SourceRange;

#[derive(Parser)]
#[grammar = "yabal.pest"]
pub struct YabalParser;

/// Parses a whole source file into its top-level statement list (the `program` rule).
pub fn parse_program(input: &str) -> Result<Vec<Stmt>, pest::error::Error<Rule>> {
    let mut pairs = YabalParser::parse(Rule::program, input)?;
    let program = pairs.next().expect("program rule always produces one pair");
    Ok(program
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::stmt)
        .map(parse_stmt)
        .collect())
}

fn range_of(pair: &Pair<Rule>) -> SourceRange {
    SourceRange::from_span(&pair.as_span())
}

// ---- statements ----

fn parse_stmt(pair: Pair<Rule>) -> Stmt {
    let inner = pair.into_inner().next().expect("stmt always wraps one alternative");
    match inner.as_rule() {
        Rule::function_decl => parse_function_decl(inner),
        Rule::struct_decl => parse_struct_decl(inner),
        Rule::if_stmt => parse_if_stmt(inner),
        Rule::while_stmt => parse_while_stmt(inner),
        Rule::for_stmt => parse_for_stmt(inner),
        Rule::return_stmt => parse_return_stmt(inner),
        Rule::block_stmt => parse_block_stmt(inner),
        Rule::var_decl_stmt => parse_var_decl_stmt(inner),
        Rule::incr_stmt => parse_incr_stmt(inner),
        Rule::assign_stmt => parse_assign_stmt(inner),
        Rule::expr_stmt => parse_expr_stmt(inner),
        other => unreachable!("unexpected stmt alternative {:?}", other),
    }
}

fn parse_block_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let stmts = pair.into_inner().map(parse_stmt).collect();
    Stmt::new(StmtKind::Block(stmts), range)
}

/// Shared shape of `var_decl_stmt`/`var_decl_inline`: `("var" | type_name) identifier ("=" expr)?`.
/// `"var"` is a bare keyword with no pair of its own, so a leading `type_name` pair is the only
/// way to tell an explicitly-typed declaration from a `var`-inferred one.
fn parse_var_decl(mut inner: pest::iterators::Pairs<Rule>) -> (Option<TypeName>, String, Option<Expr>) {
    let first = inner.next().expect("var_decl always has at least a name");
    let (type_name, name_pair) = if first.as_rule() == Rule::type_name {
        (Some(parse_type_name(first)), inner.next().expect("typed var_decl has a name"))
    } else {
        (None, first)
    };
    let name = name_pair.as_str().to_owned();
    let init = inner.next().map(parse_expr);
    (type_name, name, init)
}

fn parse_var_decl_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let (type_name, name, init) = parse_var_decl(pair.into_inner());
    Stmt::new(StmtKind::VarDecl { type_name, name, init }, range)
}

fn parse_var_decl_inline(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let (type_name, name, init) = parse_var_decl(pair.into_inner());
    Stmt::new(StmtKind::VarDecl { type_name, name, init }, range)
}

fn parse_assign_op(pair: Pair<Rule>) -> crate::ast::AssignOp {
    use crate::ast::AssignOp;
    match pair.as_str() {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::AddAssign,
        "-=" => AssignOp::SubAssign,
        "*=" => AssignOp::MulAssign,
        "/=" => AssignOp::DivAssign,
        "&=" => AssignOp::AndAssign,
        "|=" => AssignOp::OrAssign,
        "^=" => AssignOp::XorAssign,
        "<<=" => AssignOp::ShlAssign,
        ">>=" => AssignOp::ShrAssign,
        other => unreachable!("unknown assignment operator {:?}", other),
    }
}

fn parse_assign_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let target = parse_postfix(inner.next().expect("assign_stmt has a target"));
    let op = parse_assign_op(inner.next().expect("assign_stmt has an operator"));
    let value = parse_expr(inner.next().expect("assign_stmt has a value"));
    Stmt::new(StmtKind::Assign { target, op, value }, range)
}

fn parse_assign_inline(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let target = parse_postfix(inner.next().expect("assign_inline has a target"));
    let op = parse_assign_op(inner.next().expect("assign_inline has an operator"));
    let value = parse_expr(inner.next().expect("assign_inline has a value"));
    Stmt::new(StmtKind::Assign { target, op, value }, range)
}

/// `++`/`--` desugar to `target += 1`/`target -= 1` at parse time; the builder only ever sees
/// plain `Assign` statements.
fn incr_to_assign(range: SourceRange, target: Expr, op_pair: Pair<Rule>) -> Stmt {
    use crate::ast::AssignOp;
    let op = match op_pair.as_str() {
        "++" => AssignOp::AddAssign,
        "--" => AssignOp::SubAssign,
        other => unreachable!("unknown increment operator {:?}", other),
    };
    let value = Expr::new(ExprKind::IntLiteral(1), range);
    Stmt::new(StmtKind::Assign { target, op, value }, range)
}

fn parse_incr_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let target = parse_postfix(inner.next().expect("incr_stmt has a target"));
    let op = inner.next().expect("incr_stmt has an operator");
    incr_to_assign(range, target, op)
}

fn parse_incr_inline(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let target = parse_postfix(inner.next().expect("incr_inline has a target"));
    let op = inner.next().expect("incr_inline has an operator");
    incr_to_assign(range, target, op)
}

fn parse_expr_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let expr = parse_expr(pair.into_inner().next().expect("expr_stmt wraps an expr"));
    Stmt::new(StmtKind::ExprStmt(expr), range)
}

fn parse_if_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut parts = pair.into_inner().peekable();
    let mut arms = Vec::new();
    while parts.peek().map(|p| p.as_rule()) == Some(Rule::expr) {
        let cond = parse_expr(parts.next().unwrap());
        let body = parse_stmt(parts.next().expect("if/else-if arm has a body"));
        arms.push((cond, body));
    }
    let else_branch = parts.next().map(|p| Box::new(parse_stmt(p)));
    Stmt::new(StmtKind::If { arms, else_branch }, range)
}

fn parse_while_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let cond = parse_expr(inner.next().expect("while_stmt has a condition"));
    let body = Box::new(parse_stmt(inner.next().expect("while_stmt has a body")));
    Stmt::new(StmtKind::While { cond, body }, range)
}

fn parse_for_init(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let inner = pair.into_inner().next().expect("for_init wraps one alternative");
    match inner.as_rule() {
        Rule::var_decl_inline => parse_var_decl_inline(inner),
        Rule::assign_inline => parse_assign_inline(inner),
        Rule::incr_inline => parse_incr_inline(inner),
        Rule::expr => Stmt::new(StmtKind::ExprStmt(parse_expr(inner)), range),
        other => unreachable!("unexpected for_init alternative {:?}", other),
    }
}

fn parse_for_step(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let inner = pair.into_inner().next().expect("for_step wraps one alternative");
    match inner.as_rule() {
        Rule::assign_inline => parse_assign_inline(inner),
        Rule::incr_inline => parse_incr_inline(inner),
        Rule::expr => Stmt::new(StmtKind::ExprStmt(parse_expr(inner)), range),
        other => unreachable!("unexpected for_step alternative {:?}", other),
    }
}

fn parse_for_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut init = None;
    let mut cond = None;
    let mut step = None;
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::for_init => init = Some(Box::new(parse_for_init(part))),
            Rule::expr => cond = Some(parse_expr(part)),
            Rule::for_step => step = Some(Box::new(parse_for_step(part))),
            Rule::stmt => body = Some(Box::new(parse_stmt(part))),
            other => unreachable!("unexpected for_stmt part {:?}", other),
        }
    }
    Stmt::new(
        StmtKind::For {
            init,
            cond,
            step,
            body: body.expect("for_stmt always has a body"),
        },
        range,
    )
}

fn parse_return_stmt(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let expr = pair.into_inner().next().map(parse_expr);
    Stmt::new(StmtKind::Return(expr), range)
}

fn parse_param(pair: Pair<Rule>) -> Param {
    let mut inner = pair.into_inner();
    let type_name = parse_type_name(inner.next().expect("param has a type"));
    let name = inner.next().expect("param has a name").as_str().to_owned();
    Param { name, type_name }
}

/// Shape shared by `function_decl`'s return type position: an explicit `type_name`, or the bare
/// `"void"` keyword, which (like `"var"` above) leaves no pair of its own.
fn parse_function_decl(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().expect("function_decl has a return type and a name");
    let (return_type, name_pair) = if first.as_rule() == Rule::type_name {
        (parse_type_name(first), inner.next().expect("function_decl has a name"))
    } else {
        (TypeName::Void, first)
    };
    let name = name_pair.as_str().to_owned();

    let mut params = Vec::new();
    let mut body = Vec::new();
    for part in inner {
        match part.as_rule() {
            Rule::param_list => params = part.into_inner().map(parse_param).collect(),
            Rule::block_stmt => body = part.into_inner().map(parse_stmt).collect(),
            other => unreachable!("unexpected function_decl part {:?}", other),
        }
    }
    Stmt::new(
        StmtKind::FunctionDecl { name, params, return_type, body },
        range,
    )
}

fn parse_struct_field(pair: Pair<Rule>) -> StructFieldDecl {
    let mut inner = pair.into_inner();
    let type_name = parse_type_name(inner.next().expect("struct_field has a type"));
    let name = inner.next().expect("struct_field has a name").as_str().to_owned();
    let bit_size = inner.next().map(|p| parse_int_literal(p.as_str()) as u8);
    StructFieldDecl { name, type_name, bit_size }
}

fn parse_struct_decl(pair: Pair<Rule>) -> Stmt {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().expect("struct_decl has a name").as_str().to_owned();
    let fields = inner.map(parse_struct_field).collect();
    Stmt::new(StmtKind::StructDecl { name, fields }, range)
}

// ---- type names ----

fn parse_base_type(pair: Pair<Rule>) -> TypeName {
    match pair.as_str() {
        "int" => TypeName::Int,
        "bool" => TypeName::Bool,
        "char" => TypeName::Char,
        "void" => TypeName::Void,
        name => TypeName::Named(name.to_owned()),
    }
}

/// `type_suffix`'s `"[" int_literal? "]" ("@" int_literal)?` can contain zero, one, or two
/// `int_literal` pairs that are otherwise indistinguishable by rule — a single present literal
/// could be the length or the bank. Reading the raw text directly sidesteps the ambiguity; the
/// suffix has no nested brackets or recursion, so simple substring slicing is exact.
fn parse_type_suffix(pair: Pair<Rule>, base: TypeName) -> TypeName {
    let text = pair.as_str();
    let close = text.find(']').expect("type_suffix always has a closing bracket");
    let length_text = text[1..close].trim();
    let length = if length_text.is_empty() {
        None
    } else {
        Some(parse_int_literal(length_text) as usize)
    };
    let bank_text = &text[close + 1..];
    let bank = match bank_text.find('@') {
        Some(at) => parse_int_literal(bank_text[at + 1..].trim()) as u8,
        None => 0,
    };
    TypeName::Indexed { base: Box::new(base), length, bank }
}

fn parse_type_name(pair: Pair<Rule>) -> TypeName {
    let mut inner = pair.into_inner();
    let first = inner.next().expect("type_name always wraps at least one pair");
    if first.as_rule() == Rule::type_name {
        return TypeName::Reference(Box::new(parse_type_name(first)));
    }
    let mut ty = parse_base_type(first);
    for suffix in inner {
        ty = parse_type_suffix(suffix, ty);
    }
    ty
}

// ---- expressions, lowest to highest precedence ----

fn parse_expr(pair: Pair<Rule>) -> Expr {
    parse_logic_or(pair.into_inner().next().expect("expr always wraps logic_or"))
}

/// Builds a left-associative binary chain (`operand (op operand)*`) — the shape shared by every
/// precedence level from `logic_or` down to `multiplicative`.
fn left_assoc(pair: Pair<Rule>, parse_operand: fn(Pair<Rule>) -> Expr, to_op: fn(&str) -> BinaryOp) -> Expr {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let mut left = parse_operand(inner.next().expect("binary chain always has a first operand"));
    while let Some(op_pair) = inner.next() {
        let op = to_op(op_pair.as_str());
        let right = parse_operand(inner.next().expect("binary operator always has a right operand"));
        left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), range);
    }
    left
}

fn parse_logic_or(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_logic_and, |s| match s {
        "||" => BinaryOp::Or,
        other => unreachable!("unexpected logic_or operator {:?}", other),
    })
}

fn parse_logic_and(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_equality, |s| match s {
        "&&" => BinaryOp::And,
        other => unreachable!("unexpected logic_and operator {:?}", other),
    })
}

fn parse_equality(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_relational, |s| match s {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        other => unreachable!("unexpected equality operator {:?}", other),
    })
}

fn parse_relational(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_bit_or, |s| match s {
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        other => unreachable!("unexpected relational operator {:?}", other),
    })
}

fn parse_bit_or(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_bit_xor, |s| match s {
        "|" => BinaryOp::BitOr,
        other => unreachable!("unexpected bit_or operator {:?}", other),
    })
}

fn parse_bit_xor(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_bit_and, |s| match s {
        "^" => BinaryOp::BitXor,
        other => unreachable!("unexpected bit_xor operator {:?}", other),
    })
}

fn parse_bit_and(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_shift, |s| match s {
        "&" => BinaryOp::BitAnd,
        other => unreachable!("unexpected bit_and operator {:?}", other),
    })
}

fn parse_shift(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_additive, |s| match s {
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        other => unreachable!("unexpected shift operator {:?}", other),
    })
}

fn parse_additive(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_multiplicative, |s| match s {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        other => unreachable!("unexpected additive operator {:?}", other),
    })
}

fn parse_multiplicative(pair: Pair<Rule>) -> Expr {
    left_assoc(pair, parse_unary, |s| match s {
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        other => unreachable!("unexpected multiplicative operator {:?}", other),
    })
}

fn parse_unary(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().expect("unary always wraps at least one pair");
    match first.as_rule() {
        Rule::unary_op => {
            let op = match first.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                "~" => UnaryOp::BitNot,
                other => unreachable!("unexpected unary operator {:?}", other),
            };
            let operand = parse_unary(inner.next().expect("unary operator always has an operand"));
            Expr::new(ExprKind::Unary(op, Box::new(operand)), range)
        }
        Rule::postfix => parse_postfix(first),
        other => unreachable!("unexpected unary alternative {:?}", other),
    }
}

fn parse_postfix(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let mut expr = parse_primary(inner.next().expect("postfix always has a primary"));
    for postfix_op in inner {
        let op = postfix_op
            .into_inner()
            .next()
            .expect("postfix_op always wraps one alternative");
        expr = match op.as_rule() {
            Rule::index_op => {
                let index = parse_expr(op.into_inner().next().expect("index_op wraps an expr"));
                Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), range)
            }
            Rule::field_op => {
                let field = op
                    .into_inner()
                    .next()
                    .expect("field_op wraps an identifier")
                    .as_str()
                    .to_owned();
                Expr::new(ExprKind::Field(Box::new(expr), field), range)
            }
            Rule::call_op => {
                let args = op
                    .into_inner()
                    .next()
                    .map(|arg_list| arg_list.into_inner().map(parse_expr).collect())
                    .unwrap_or_default();
                // The language has no function pointers or methods, so a call's target is always
                // a plain name; `initialize` reports a clear "undeclared function" diagnostic for
                // anything else rather than this needing its own parse error.
                let name = match &expr.kind {
                    ExprKind::Identifier(name) => name.clone(),
                    _ => "<invalid call target>".to_owned(),
                };
                Expr::new(ExprKind::Call(name, args), range)
            }
            other => unreachable!("unexpected postfix_op alternative {:?}", other),
        };
    }
    expr
}

fn parse_primary(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let inner = pair.into_inner().next().expect("primary always wraps one alternative");
    match inner.as_rule() {
        Rule::asm_expr => parse_asm_expr(inner),
        Rule::sizeof_expr => parse_sizeof_expr(inner),
        Rule::create_pointer_expr => parse_create_pointer_expr(inner),
        Rule::bool_literal => Expr::new(ExprKind::BoolLiteral(inner.as_str() == "true"), range),
        Rule::char_literal => parse_char_literal(inner, range),
        Rule::string_literal => parse_string_literal(inner, range),
        Rule::int_literal => Expr::new(ExprKind::IntLiteral(parse_int_literal(inner.as_str())), range),
        Rule::struct_literal => parse_struct_literal(inner),
        Rule::identifier => Expr::new(ExprKind::Identifier(inner.as_str().to_owned()), range),
        Rule::expr => parse_expr(inner),
        other => unreachable!("unexpected primary alternative {:?}", other),
    }
}

fn parse_sizeof_expr(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let inner = parse_expr(pair.into_inner().next().expect("sizeof_expr wraps an expr"));
    Expr::new(ExprKind::Sizeof(Box::new(inner)), range)
}

fn parse_create_pointer_expr(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let addr = parse_expr(inner.next().expect("create_pointer_expr has an address"));
    let bank = inner.next().map(|p| Box::new(parse_expr(p)));
    Expr::new(ExprKind::CreatePointer(Box::new(addr), bank), range)
}

fn parse_field_init(pair: Pair<Rule>) -> (String, Expr) {
    let mut inner = pair.into_inner();
    let name = inner.next().expect("field_init has a name").as_str().to_owned();
    let value = parse_expr(inner.next().expect("field_init has a value"));
    (name, value)
}

fn parse_struct_literal(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().expect("struct_literal has a type name").as_str().to_owned();
    let fields = inner.map(parse_field_init).collect();
    Expr::new(ExprKind::StructLiteral(name, fields), range)
}

fn parse_asm_operand(pair: Pair<Rule>) -> AsmOperand {
    let inner = pair.into_inner().next().expect("asm_operand wraps one alternative");
    match inner.as_rule() {
        Rule::var_ref => AsmOperand::Var(inner.as_str()[1..].to_owned()),
        Rule::int_literal => AsmOperand::Literal(parse_int_literal(inner.as_str())),
        other => unreachable!("unexpected asm_operand alternative {:?}", other),
    }
}

fn parse_asm_line(pair: Pair<Rule>) -> AsmLine {
    let mut inner = pair.into_inner();
    let mnemonic = inner.next().expect("asm_line has a mnemonic").as_str().to_owned();
    let operand = inner.next().map(parse_asm_operand);
    AsmLine { mnemonic, operand }
}

fn parse_asm_expr(pair: Pair<Rule>) -> Expr {
    let range = range_of(&pair);
    let mut type_name = None;
    let mut lines = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::type_name => type_name = Some(parse_type_name(part)),
            Rule::asm_line => lines.push(parse_asm_line(part)),
            other => unreachable!("unexpected asm_expr part {:?}", other),
        }
    }
    Expr::new(ExprKind::Asm(type_name, lines), range)
}

fn parse_char_literal(pair: Pair<Rule>, range: SourceRange) -> Expr {
    let text = pair.into_inner().next().expect("char_literal wraps char_inner").as_str();
    Expr::new(ExprKind::CharLiteral(unescape_one(text)), range)
}

fn parse_string_literal(pair: Pair<Rule>, range: SourceRange) -> Expr {
    let text = pair.into_inner().next().expect("string_literal wraps string_inner").as_str();
    Expr::new(ExprKind::StringLiteral(unescape_all(text)), range)
}

fn unescape_one(s: &str) -> char {
    match s.strip_prefix('\\') {
        Some(rest) => unescape_char(rest.chars().next().expect("char_escape always has an escaped char")),
        None => s.chars().next().expect("char_inner is never empty"),
    }
}

fn unescape_char(escaped: char) -> char {
    match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn unescape_all(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                result.push(unescape_char(escaped));
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Parses `int_literal`'s `"-"? ("0x" hex_digits | dec_digits)` text, also reused for the plain
/// decimal text captured by a `type_suffix`'s length/bank and a `struct_field`'s bit-size.
fn parse_int_literal(s: &str) -> i32 {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value: i64 = match rest.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).expect("hex_digits is validated by the grammar"),
        None => rest.parse().expect("dec_digits is validated by the grammar"),
    };
    (if negative { -value } else { value }) as i32
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse_one_expr(source: &str) -> Expr {
        let program = parse_program(&format!("x = {};", source)).expect("parses");
        match program.into_iter().next().unwrap().kind {
            StmtKind::Assign { value, .. } => value,
            other => panic!("expected an assign statement, got {:?}", other),
        }
    }

    #[test]
    fn parses_integer_literal() {
        let expr = parse_one_expr("42");
        assert!(matches!(expr.kind, ExprKind::IntLiteral(42)));
    }

    #[test]
    fn parses_hex_literal() {
        let expr = parse_one_expr("0xFF");
        assert!(matches!(expr.kind, ExprKind::IntLiteral(255)));
    }

    #[test]
    fn parses_left_associative_additive_chain() {
        let expr = parse_one_expr("1 - 2 - 3");
        match expr.kind {
            ExprKind::Binary(BinaryOp::Sub, l, r) => {
                assert!(matches!(r.kind, ExprKind::IntLiteral(3)));
                assert!(matches!(l.kind, ExprKind::Binary(BinaryOp::Sub, _, _)));
            }
            other => panic!("expected a left-associative Sub chain, got {:?}", other),
        }
    }

    #[test]
    fn respects_operator_precedence() {
        // 1 + 2 * 3 should parse as 1 + (2 * 3), not (1 + 2) * 3.
        let expr = parse_one_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary(BinaryOp::Add, l, r) => {
                assert!(matches!(l.kind, ExprKind::IntLiteral(1)));
                assert!(matches!(r.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("expected an Add whose right side is a Mul, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_call_with_arguments() {
        let expr = parse_one_expr("add(1, 2)");
        match expr.kind {
            ExprKind::Call(name, args) => {
                assert_eq!(name, "add");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a Call, got {:?}", other),
        }
    }

    #[test]
    fn parses_index_and_field_chain() {
        let expr = parse_one_expr("points[0].x");
        match expr.kind {
            ExprKind::Field(base, field) => {
                assert_eq!(field, "x");
                assert!(matches!(base.kind, ExprKind::Index(_, _)));
            }
            other => panic!("expected a Field over an Index, got {:?}", other),
        }
    }

    #[test]
    fn parses_pointer_type_with_bank() {
        let program = parse_program("int[]@1 p;").expect("parses");
        match &program[0].kind {
            StmtKind::VarDecl { type_name: Some(TypeName::Indexed { base, length, bank }), .. } => {
                assert!(matches!(**base, TypeName::Int));
                assert_eq!(*length, None);
                assert_eq!(*bank, 1);
            }
            other => panic!("expected a pointer-typed var_decl, got {:?}", other),
        }
    }

    #[test]
    fn parses_fixed_array_type() {
        let program = parse_program("int[4] xs;").expect("parses");
        match &program[0].kind {
            StmtKind::VarDecl { type_name: Some(TypeName::Indexed { length: Some(4), bank: 0, .. }), .. } => {}
            other => panic!("expected a fixed-size array var_decl, got {:?}", other),
        }
    }

    #[test]
    fn desugars_increment_to_compound_assign() {
        let program = parse_program("i++;").expect("parses");
        match &program[0].kind {
            StmtKind::Assign { op: crate::ast::AssignOp::AddAssign, value, .. } => {
                assert!(matches!(value.kind, ExprKind::IntLiteral(1)));
            }
            other => panic!("expected i++ to desugar to an AddAssign, got {:?}", other),
        }
    }

    #[test]
    fn parses_if_else_if_else_chain() {
        let program = parse_program("if (a) { } else if (b) { } else { }").expect("parses");
        match &program[0].kind {
            StmtKind::If { arms, else_branch } => {
                assert_eq!(arms.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("expected an If with two arms and an else, got {:?}", other),
        }
    }

    #[test]
    fn parses_for_loop_with_all_clauses() {
        let program = parse_program("for (var i = 0; i < 10; i++) { }").expect("parses");
        match &program[0].kind {
            StmtKind::For { init: Some(_), cond: Some(_), step: Some(_), .. } => {}
            other => panic!("expected a fully-populated for loop, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_declaration() {
        let program = parse_program("int add(int a, int b) { return a + b; }").expect("parses");
        match &program[0].kind {
            StmtKind::FunctionDecl { name, params, return_type, body } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(matches!(return_type, TypeName::Int));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a FunctionDecl, got {:?}", other),
        }
    }

    #[test]
    fn parses_struct_declaration_with_bit_field() {
        let program = parse_program("struct Flags { int a: 4; int b; }").expect("parses");
        match &program[0].kind {
            StmtKind::StructDecl { name, fields } => {
                assert_eq!(name, "Flags");
                assert_eq!(fields[0].bit_size, Some(4));
                assert_eq!(fields[1].bit_size, None);
            }
            other => panic!("expected a StructDecl, got {:?}", other),
        }
    }

    #[test]
    fn parses_asm_block_with_variable_and_literal_operands() {
        let expr = parse_one_expr("asm<int> { AIN @x; BIN 5; ADD; }");
        match expr.kind {
            ExprKind::Asm(Some(TypeName::Int), lines) => {
                assert_eq!(lines.len(), 3);
                assert!(matches!(&lines[0].operand, Some(AsmOperand::Var(name)) if name == "x"));
                assert!(matches!(lines[1].operand, Some(AsmOperand::Literal(5))));
                assert!(lines[2].operand.is_none());
            }
            other => panic!("expected an Asm block, got {:?}", other),
        }
    }

    #[test]
    fn parses_string_and_char_escapes() {
        let expr = parse_one_expr(r#""hi\n""#);
        assert!(matches!(expr.kind, ExprKind::StringLiteral(ref s) if s == "hi\n"));
        let expr = parse_one_expr(r"'\n'");
        assert!(matches!(expr.kind, ExprKind::CharLiteral('\n')));
    }

    #[test]
    fn rejects_malformed_source() {
        assert!(parse_program("int x = ;").is_err());
    }
}
