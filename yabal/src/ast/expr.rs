//! Expression nodes: operators, literals, l-value forms (`identifier`, `a[i]`, `a.b`),
//! calls, struct literals, and the three escape hatches `sizeof`, `create_pointer`, `asm { }`.
//!
//! The machine's ALU has no multiply/divide/xor opcode; `*`, `/`, `%` and `^` are expanded here into small unrolled/looped
//! instruction sequences rather than a single opcode, the same way a real assembly-targeting
//! compiler would lower them for a CPU that doesn't have the primitive in hardware.

use crate::builder::Builder;
use crate::diagnostics::SourceRange;
use crate::instr::{Opcode, Operand};
use crate::symbols::{Bank, Pointer, PointerWithOffset};
use crate::types::{BitField, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AsmOperand {
    Var(String),
    Literal(i32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AsmLine {
    pub mnemonic: String,
    pub operand: Option<AsmOperand>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    IntLiteral(i32),
    BoolLiteral(bool),
    CharLiteral(char),
    StringLiteral(String),
    Identifier(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Field(Box<Expr>, String),
    Call(String, Vec<Expr>),
    StructLiteral(String, Vec<(String, Expr)>),
    Sizeof(Box<Expr>),
    CreatePointer(Box<Expr>, Option<Box<Expr>>),
    Asm(Option<crate::ast::TypeName>, Vec<AsmLine>),
}

/// One expression node. `ty` and `constant` start `Unknown`/`None` and are filled in by
/// `initialize`/`optimize` respectively — the same declare/initialize/optimize/build pipeline
/// applies per-node, not just per-statement.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: SourceRange,
    pub ty: Type,
    /// Set once this node is known, after `optimize`, to always evaluate to the same value.
    /// A literal is constant from `initialize` on; an identifier is constant only while the
    /// variable it names has never been assigned.
    pub constant: Option<i32>,
    string_pointer: Option<Pointer>,
}

impl Expr {
    pub fn new(kind: ExprKind, range: SourceRange) -> Self {
        Expr {
            kind,
            range,
            ty: Type::Unknown,
            constant: None,
            string_pointer: None,
        }
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::Index(_, _) | ExprKind::Field(_, _)
        )
    }

    /// The home address of this expression, if it names a storage location whose address is
    /// itself known at compile time (a plain variable, or a field/constant-index chain rooted in
    /// one) — used by [`Builder::set_value`]'s direct-copy path and by indexing a struct field
    /// through an already-resolved base.
    pub fn constant_pointer_with_offset(&self, builder: &Builder) -> Option<PointerWithOffset> {
        match &self.kind {
            ExprKind::Identifier(name) => builder
                .lookup_variable(name)
                .map(|var| PointerWithOffset::new(var.home)),
            ExprKind::Field(base, field) => {
                let base_ptr = base.constant_pointer_with_offset(builder)?;
                let def = match &base.ty {
                    Type::Struct(def) => def.clone(),
                    Type::Reference(inner) => match inner.as_ref() {
                        Type::Struct(def) => def.clone(),
                        _ => return None,
                    },
                    _ => return None,
                };
                let field = def.field(field)?;
                Some(base_ptr.plus(field.offset as i32))
            }
            ExprKind::Index(base, index) => {
                let base_ptr = base.constant_pointer_with_offset(builder)?;
                let idx = index.constant?;
                let elem_size = base.ty.element_type()?.size_words().max(1) as i32;
                Some(base_ptr.plus(idx * elem_size))
            }
            _ => None,
        }
    }

    pub fn initialize(&mut self, builder: &mut Builder) {
        match &mut self.kind {
            ExprKind::IntLiteral(v) => {
                self.ty = Type::Integer;
                self.constant = Some(*v);
            }
            ExprKind::BoolLiteral(v) => {
                self.ty = Type::Boolean;
                self.constant = Some(if *v { 1 } else { 0 });
            }
            ExprKind::CharLiteral(c) => {
                self.ty = Type::Char;
                match crate::char_table::char_code(*c) {
                    Some(code) => self.constant = Some(code as i32),
                    None => builder.error(
                        self.range,
                        format!("character {:?} has no entry in the character table", c),
                    ),
                }
            }
            ExprKind::StringLiteral(value) => {
                self.ty = Type::Pointer(Box::new(Type::Char), 0);
                self.string_pointer = Some(builder.intern_string(self.range, value));
            }
            ExprKind::Identifier(name) => {
                builder.mark_used(name);
                match builder.lookup_variable(name) {
                    Some(var) => {
                        self.ty = var.ty.clone();
                        if var.is_foldable() {
                            self.constant = var.constant_value;
                        }
                    }
                    None => {
                        builder.error(self.range, format!("'{}' is not declared", name));
                        self.ty = Type::Unknown;
                    }
                }
            }
            ExprKind::Unary(op, inner) => {
                inner.initialize(builder);
                self.ty = match op {
                    UnaryOp::Not => Type::Boolean,
                    UnaryOp::Neg | UnaryOp::BitNot => inner.ty.clone(),
                };
            }
            ExprKind::Binary(op, l, r) => {
                l.initialize(builder);
                r.initialize(builder);
                self.ty = binary_result_type(*op, &l.ty, &r.ty);
            }
            ExprKind::Index(base, index) => {
                base.initialize(builder);
                index.initialize(builder);
                self.ty = match base.ty.element_type() {
                    Some(ty) => ty.clone(),
                    None => {
                        builder.error(self.range, format!("'{}' cannot be indexed", base.ty));
                        Type::Unknown
                    }
                };
            }
            ExprKind::Field(base, field) => {
                base.initialize(builder);
                self.ty = resolve_field_type(builder, self.range, &base.ty, field);
            }
            ExprKind::Call(name, args) => {
                for arg in args.iter_mut() {
                    arg.initialize(builder);
                }
                self.ty = match builder.functions().get(name) {
                    Some(f) => f.return_type.clone(),
                    None => {
                        builder.error(self.range, format!("call to undeclared function '{}'", name));
                        Type::Unknown
                    }
                };
            }
            ExprKind::StructLiteral(name, fields) => {
                let def = builder.lookup_struct(name);
                for (field_name, field_expr) in fields.iter_mut() {
                    field_expr.initialize(builder);
                    if let Some(def) = &def {
                        if def.field(field_name).is_none() {
                            builder.error(
                                field_expr.range,
                                format!("'{}' has no field '{}'", name, field_name),
                            );
                        }
                    }
                }
                self.ty = match def {
                    Some(def) => Type::Struct(def),
                    None => {
                        builder.error(self.range, format!("unknown struct '{}'", name));
                        Type::Unknown
                    }
                };
            }
            ExprKind::Sizeof(inner) => {
                inner.initialize(builder);
                self.ty = Type::Integer;
                self.constant = Some(inner.ty.size_words() as i32);
            }
            ExprKind::CreatePointer(addr, bank) => {
                addr.initialize(builder);
                if let Some(bank_expr) = bank {
                    bank_expr.initialize(builder);
                }
                let bank_value = bank.as_ref().and_then(|b| b.constant).unwrap_or(0) as Bank;
                self.ty = Type::Pointer(Box::new(Type::Integer), bank_value);
            }
            ExprKind::Asm(type_name, lines) => {
                for line in lines.iter() {
                    if line.mnemonic.to_uppercase().parse::<Opcode>().is_err() {
                        builder.error(
                            self.range,
                            format!("unknown instruction mnemonic '{}'", line.mnemonic),
                        );
                    }
                    if let Some(AsmOperand::Var(name)) = &line.operand {
                        if builder.lookup_variable(name).is_none() {
                            builder.error(self.range, format!("'{}' is not declared", name));
                        }
                    }
                }
                self.ty = match type_name {
                    Some(type_name) => type_name.resolve(builder).unwrap_or_else(|message| {
                        builder.error(self.range, message);
                        Type::Unknown
                    }),
                    None => Type::Integer,
                };
            }
        }
    }

    pub fn optimize(&mut self, builder: &mut Builder) {
        match &mut self.kind {
            ExprKind::Unary(op, inner) => {
                inner.optimize(builder);
                if let Some(v) = inner.constant {
                    self.constant = Some(match op {
                        UnaryOp::Not => {
                            if v == 0 {
                                1
                            } else {
                                0
                            }
                        }
                        UnaryOp::Neg => -v,
                        UnaryOp::BitNot => !v,
                    });
                }
            }
            ExprKind::Binary(op, l, r) => {
                l.optimize(builder);
                r.optimize(builder);
                if let (Some(lv), Some(rv)) = (l.constant, r.constant) {
                    self.constant = fold_binary(*op, lv, rv);
                }
            }
            ExprKind::Index(base, index) => {
                base.optimize(builder);
                index.optimize(builder);
            }
            ExprKind::Field(base, _) => base.optimize(builder),
            ExprKind::Call(_, args) => {
                for arg in args.iter_mut() {
                    arg.optimize(builder);
                }
            }
            ExprKind::StructLiteral(_, fields) => {
                for (_, field) in fields.iter_mut() {
                    field.optimize(builder);
                }
            }
            ExprKind::Sizeof(inner) => inner.optimize(builder),
            ExprKind::CreatePointer(addr, bank) => {
                addr.optimize(builder);
                if let Some(bank) = bank {
                    bank.optimize(builder);
                }
            }
            ExprKind::IntLiteral(_)
            | ExprKind::BoolLiteral(_)
            | ExprKind::CharLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::Identifier(_)
            | ExprKind::Asm(_, _) => {}
        }
    }

    /// Builds this expression's value into `A` and returns its type. With `address_of` set,
    /// builds the *address* of an l-value into `A` instead (used internally by indexing/field
    /// chains; not reachable from surface syntax, which has no address-of operator).
    pub fn build_expression(&self, builder: &mut Builder, address_of: bool, _expected: Option<&Type>) -> Type {
        match &self.kind {
            ExprKind::IntLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::CharLiteral(_) => {
                builder.emit(Opcode::AIN, Operand::Data(self.constant.unwrap_or(0)));
                self.ty.clone()
            }
            ExprKind::StringLiteral(_) => {
                let pointer = self.string_pointer.expect("interned during initialize");
                builder.emit(Opcode::AIN, Operand::from(pointer));
                self.ty.clone()
            }
            ExprKind::Identifier(name) => {
                if let Some(value) = self.constant {
                    builder.emit(Opcode::AIN, Operand::Data(value));
                    return self.ty.clone();
                }
                // `initialize` already recorded an error for an unresolved name (the image is
                // suppressed once any error is present); emit a harmless placeholder rather than
                // panicking so the rest of the pass can still run and surface further diagnostics.
                let home = match builder.lookup_variable(name) {
                    Some(var) => var.home,
                    None => {
                        builder.emit(Opcode::AIN, Operand::Data(0));
                        return self.ty.clone();
                    }
                };
                if address_of {
                    let cell = builder.address_of(home);
                    builder.load_word(cell, 0, 0);
                } else {
                    builder.load_word(home, 0, 0);
                }
                self.ty.clone()
            }
            ExprKind::Unary(op, inner) => {
                build_unary(builder, *op, inner);
                self.ty.clone()
            }
            ExprKind::Binary(op, l, r) => {
                build_binary(builder, *op, l, r);
                self.ty.clone()
            }
            ExprKind::Index(base, index) => build_index(builder, base, index, &self.ty, address_of),
            ExprKind::Field(base, field) => build_field(builder, self.range, base, field, &self.ty, address_of),
            ExprKind::Call(name, args) => builder.build_call(self.range, name, args),
            ExprKind::StructLiteral(..) => {
                builder.error(self.range, "struct literal is only valid as an initializer".to_owned());
                Type::Unknown
            }
            ExprKind::Sizeof(_) => {
                builder.emit(Opcode::AIN, Operand::Data(self.constant.unwrap_or(0)));
                Type::Integer
            }
            ExprKind::CreatePointer(addr, _bank) => {
                match addr.constant {
                    Some(value) => builder.emit(Opcode::AIN, Operand::Data(value)),
                    None => builder.error(
                        self.range,
                        "create_pointer requires a compile-time constant address".to_owned(),
                    ),
                }
                self.ty.clone()
            }
            ExprKind::Asm(_, lines) => {
                build_asm(builder, self.range, lines);
                self.ty.clone()
            }
        }
    }
}

fn binary_result_type(op: BinaryOp, l: &Type, r: &Type) -> Type {
    use BinaryOp::*;
    match op {
        Or | And | Eq | Ne | Lt | Le | Gt | Ge => Type::Boolean,
        Add | Sub if l.element_type().is_some() => l.clone(),
        Add if r.element_type().is_some() => r.clone(),
        _ => Type::Integer,
    }
}

fn resolve_field_type(builder: &mut Builder, range: SourceRange, base: &Type, field: &str) -> Type {
    let def = match base {
        Type::Struct(def) => Some(def.clone()),
        Type::Reference(inner) => match inner.as_ref() {
            Type::Struct(def) => Some(def.clone()),
            _ => None,
        },
        _ => None,
    };
    match def {
        Some(def) => match def.field(field) {
            Some(field) => field.ty.clone(),
            None => {
                builder.error(range, format!("'{}' has no field '{}'", def.name, field));
                Type::Unknown
            }
        },
        None => {
            builder.error(range, format!("'{}' is not a struct", base));
            Type::Unknown
        }
    }
}

fn fold_binary(op: BinaryOp, l: i32, r: i32) -> Option<i32> {
    use BinaryOp::*;
    Some(match op {
        Or => i32::from(l != 0 || r != 0),
        And => i32::from(l != 0 && r != 0),
        Eq => i32::from(l == r),
        Ne => i32::from(l != r),
        Lt => i32::from(l < r),
        Le => i32::from(l <= r),
        Gt => i32::from(l > r),
        Ge => i32::from(l >= r),
        BitOr => l | r,
        BitXor => l ^ r,
        BitAnd => l & r,
        Shl => l << r,
        Shr => l >> r,
        Add => l + r,
        Sub => l - r,
        Mul => l * r,
        Div if r != 0 => l / r,
        Mod if r != 0 => l % r,
        Div | Mod => return None,
    })
}

fn build_unary(builder: &mut Builder, op: UnaryOp, inner: &Expr) {
    inner.build_expression(builder, false, None);
    match op {
        UnaryOp::Neg => {
            let temp = builder.get_temporary(&Type::Integer);
            let temp_ptr = temp.pointer();
            builder.store_word(temp_ptr, 0, 0);
            builder.emit(Opcode::AIN, Operand::Data(0));
            builder.emit(Opcode::BIN, Operand::from(temp_ptr));
            builder.emit(Opcode::SUB, Operand::None);
        }
        UnaryOp::BitNot => builder.emit(Opcode::NOT, Operand::None),
        UnaryOp::Not => {
            let is_zero = builder.create_label(None);
            let end = builder.create_label(None);
            builder.emit(Opcode::JMPZ, Operand::from(is_zero));
            builder.emit(Opcode::AIN, Operand::Data(0));
            builder.emit(Opcode::JMP, Operand::from(end));
            builder.mark(is_zero);
            builder.emit(Opcode::AIN, Operand::Data(1));
            builder.mark(end);
        }
    }
}

/// Builds `r` into a temporary, `l` into `A`, reloads `r` into `B`, then applies a no-operand
/// ALU opcode — the shared shape every two-operand instruction (`ADD`, `SUB`, `AND`, `OR`,
/// `SHL`, `SHR`) uses, since none of them can take an operand of their own.
///
/// Takes the operands as "build this value into `A`" closures rather than `&Expr` directly, so
/// the statement layer can drive the same lowering for a compound assignment's already-resolved
/// l-value without inventing a synthetic expression node for it (see
/// `crate::ast::stmt::build_compound_binary`).
fn build_simple_alu_values(
    builder: &mut Builder,
    build_l: impl FnOnce(&mut Builder),
    build_r: impl FnOnce(&mut Builder),
    opcode: Opcode,
) {
    let temp = builder.get_temporary(&Type::Integer);
    let temp_ptr = temp.pointer();
    build_r(builder);
    builder.store_word(temp_ptr, 0, 0);
    build_l(builder);
    builder.emit(Opcode::BIN, Operand::from(temp_ptr));
    builder.emit(opcode, Operand::None);
}

fn build_simple_alu(builder: &mut Builder, l: &Expr, r: &Expr, opcode: Opcode) {
    build_simple_alu_values(
        builder,
        |b| {
            l.build_expression(b, false, None);
        },
        |b| {
            r.build_expression(b, false, None);
        },
        opcode,
    );
}

fn build_diff_values(builder: &mut Builder, build_l: impl FnOnce(&mut Builder), build_r: impl FnOnce(&mut Builder)) {
    build_simple_alu_values(builder, build_l, build_r, Opcode::SUB);
}

fn build_diff(builder: &mut Builder, l: &Expr, r: &Expr) {
    build_simple_alu(builder, l, r, Opcode::SUB);
}

fn emit_compare(builder: &mut Builder, flag_opcode: Opcode, invert: bool) {
    let branch = builder.create_label(None);
    let end = builder.create_label(None);
    builder.emit(flag_opcode, Operand::from(branch));
    builder.emit(Opcode::AIN, Operand::Data(if invert { 1 } else { 0 }));
    builder.emit(Opcode::JMP, Operand::from(end));
    builder.mark(branch);
    builder.emit(Opcode::AIN, Operand::Data(if invert { 0 } else { 1 }));
    builder.mark(end);
}

/// Short-circuiting `&&`/`||`: `r` is only built if `l` alone doesn't already decide the
/// result.
fn build_logical(builder: &mut Builder, l: &Expr, r: &Expr, is_or: bool) {
    build_logical_values(
        builder,
        |b| l.build_expression(b, false, None),
        |b| {
            r.build_expression(b, false, None);
        },
        is_or,
    );
}

fn build_logical_values(
    builder: &mut Builder,
    build_l: impl FnOnce(&mut Builder),
    build_r: impl FnOnce(&mut Builder),
    is_or: bool,
) {
    let evaluate_r = builder.create_label(None);
    let end = builder.create_label(None);
    build_l(builder);
    if is_or {
        builder.emit(Opcode::JMPZ, Operand::from(evaluate_r));
        builder.emit(Opcode::AIN, Operand::Data(1));
        builder.emit(Opcode::JMP, Operand::from(end));
    } else {
        let short_circuit_false = builder.create_label(None);
        builder.emit(Opcode::JMPZ, Operand::from(short_circuit_false));
        builder.emit(Opcode::JMP, Operand::from(evaluate_r));
        builder.mark(short_circuit_false);
        builder.emit(Opcode::AIN, Operand::Data(0));
        builder.emit(Opcode::JMP, Operand::from(end));
    }
    builder.mark(evaluate_r);
    build_r(builder);
    emit_compare(builder, Opcode::JMPZ, true); // r == 0 -> 0, else 1
    builder.mark(end);
}

fn build_xor(builder: &mut Builder, l: &Expr, r: &Expr) {
    build_xor_values(
        builder,
        |b| {
            l.build_expression(b, false, None);
        },
        |b| {
            r.build_expression(b, false, None);
        },
    );
}

fn build_xor_values(builder: &mut Builder, build_l: impl FnOnce(&mut Builder), build_r: impl FnOnce(&mut Builder)) {
    let l_temp = builder.get_temporary(&Type::Integer);
    let l_ptr = l_temp.pointer();
    build_l(builder);
    builder.store_word(l_ptr, 0, 0);

    let r_temp = builder.get_temporary(&Type::Integer);
    let r_ptr = r_temp.pointer();
    build_r(builder);
    builder.store_word(r_ptr, 0, 0);

    let or_temp = builder.get_temporary(&Type::Integer);
    let or_ptr = or_temp.pointer();
    builder.load_word(l_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::from(r_ptr));
    builder.emit(Opcode::OR, Operand::None);
    builder.store_word(or_ptr, 0, 0);

    builder.load_word(l_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::from(r_ptr));
    builder.emit(Opcode::AND, Operand::None);
    builder.emit(Opcode::NOT, Operand::None);
    builder.emit(Opcode::BIN, Operand::from(or_ptr));
    builder.emit(Opcode::AND, Operand::None);
}

/// Russian-peasant multiplication: `elem_size` many ADDs/SHLs rather than a hardware `MUL` this
/// machine doesn't have.
fn build_multiply(builder: &mut Builder, l: &Expr, r: &Expr) {
    build_multiply_values(
        builder,
        |b| {
            l.build_expression(b, false, None);
        },
        |b| {
            r.build_expression(b, false, None);
        },
    );
}

fn build_multiply_values(builder: &mut Builder, build_l: impl FnOnce(&mut Builder), build_r: impl FnOnce(&mut Builder)) {
    let lhs = builder.get_temporary(&Type::Integer);
    let lhs_ptr = lhs.pointer();
    build_l(builder);
    builder.store_word(lhs_ptr, 0, 0);

    let rhs = builder.get_temporary(&Type::Integer);
    let rhs_ptr = rhs.pointer();
    build_r(builder);
    builder.store_word(rhs_ptr, 0, 0);

    let product = builder.get_temporary(&Type::Integer);
    let product_ptr = product.pointer();
    builder.emit(Opcode::AIN, Operand::Data(0));
    builder.store_word(product_ptr, 0, 0);

    let loop_start = builder.create_label(None);
    let skip_add = builder.create_label(None);
    let loop_end = builder.create_label(None);
    builder.mark(loop_start);

    builder.load_word(rhs_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::Data(1));
    builder.emit(Opcode::AND, Operand::None);
    builder.emit(Opcode::JMPZ, Operand::from(skip_add));
    builder.load_word(product_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::from(lhs_ptr));
    builder.emit(Opcode::ADD, Operand::None);
    builder.store_word(product_ptr, 0, 0);
    builder.mark(skip_add);

    builder.load_word(lhs_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::Data(1));
    builder.emit(Opcode::SHL, Operand::None);
    builder.store_word(lhs_ptr, 0, 0);

    builder.load_word(rhs_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::Data(1));
    builder.emit(Opcode::SHR, Operand::None);
    builder.store_word(rhs_ptr, 0, 0);
    builder.emit(Opcode::JMPZ, Operand::from(loop_end));
    builder.emit(Opcode::JMP, Operand::from(loop_start));
    builder.mark(loop_end);

    builder.load_word(product_ptr, 0, 0);
}

/// Restoring-subtraction division: no hardware `DIV`, so the quotient/remainder are accumulated
/// by repeatedly subtracting the divisor.
fn build_divmod(builder: &mut Builder, l: &Expr, r: &Expr, want_quotient: bool) {
    build_divmod_values(
        builder,
        |b| {
            l.build_expression(b, false, None);
        },
        |b| {
            r.build_expression(b, false, None);
        },
        want_quotient,
    );
}

fn build_divmod_values(
    builder: &mut Builder,
    build_l: impl FnOnce(&mut Builder),
    build_r: impl FnOnce(&mut Builder),
    want_quotient: bool,
) {
    let remainder = builder.get_temporary(&Type::Integer);
    let remainder_ptr = remainder.pointer();
    build_l(builder);
    builder.store_word(remainder_ptr, 0, 0);

    let divisor = builder.get_temporary(&Type::Integer);
    let divisor_ptr = divisor.pointer();
    build_r(builder);
    builder.store_word(divisor_ptr, 0, 0);

    let quotient = builder.get_temporary(&Type::Integer);
    let quotient_ptr = quotient.pointer();
    builder.emit(Opcode::AIN, Operand::Data(0));
    builder.store_word(quotient_ptr, 0, 0);

    let loop_start = builder.create_label(None);
    let loop_end = builder.create_label(None);
    builder.mark(loop_start);

    builder.load_word(remainder_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::from(divisor_ptr));
    builder.emit(Opcode::SUB, Operand::None);
    builder.emit(Opcode::JMPC, Operand::from(loop_end)); // remainder < divisor: done

    builder.store_word(remainder_ptr, 0, 0);
    builder.load_word(quotient_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::Data(1));
    builder.emit(Opcode::ADD, Operand::None);
    builder.store_word(quotient_ptr, 0, 0);
    builder.emit(Opcode::JMP, Operand::from(loop_start));
    builder.mark(loop_end);

    builder.load_word(if want_quotient { quotient_ptr } else { remainder_ptr }, 0, 0);
}

fn build_binary(builder: &mut Builder, op: BinaryOp, l: &Expr, r: &Expr) {
    match op {
        BinaryOp::Or => build_logical(builder, l, r, true),
        BinaryOp::And => build_logical(builder, l, r, false),
        BinaryOp::Eq => {
            build_diff(builder, l, r);
            emit_compare(builder, Opcode::JMPZ, false);
        }
        BinaryOp::Ne => {
            build_diff(builder, l, r);
            emit_compare(builder, Opcode::JMPZ, true);
        }
        BinaryOp::Lt => {
            build_diff(builder, l, r);
            emit_compare(builder, Opcode::JMPC, false);
        }
        BinaryOp::Ge => {
            build_diff(builder, l, r);
            emit_compare(builder, Opcode::JMPC, true);
        }
        BinaryOp::Gt => {
            build_diff(builder, r, l);
            emit_compare(builder, Opcode::JMPC, false);
        }
        BinaryOp::Le => {
            build_diff(builder, r, l);
            emit_compare(builder, Opcode::JMPC, true);
        }
        BinaryOp::BitOr => build_simple_alu(builder, l, r, Opcode::OR),
        BinaryOp::BitAnd => build_simple_alu(builder, l, r, Opcode::AND),
        BinaryOp::BitXor => build_xor(builder, l, r),
        BinaryOp::Shl => build_simple_alu(builder, l, r, Opcode::SHL),
        BinaryOp::Shr => build_simple_alu(builder, l, r, Opcode::SHR),
        BinaryOp::Add => build_simple_alu(builder, l, r, Opcode::ADD),
        BinaryOp::Sub => build_diff(builder, l, r),
        BinaryOp::Mul => build_multiply(builder, l, r),
        BinaryOp::Div => build_divmod(builder, l, r, true),
        BinaryOp::Mod => build_divmod(builder, l, r, false),
    }
}

/// The closure-driven twin of [`build_binary`], used when the operands aren't expression nodes
/// of their own — a compound assignment (`x += 1`) already has its l-value's *address* resolved
/// and only needs the arithmetic lowering, not a second address computation (see
/// `crate::ast::stmt`).
pub(crate) fn build_binary_op_values(
    builder: &mut Builder,
    op: BinaryOp,
    build_l: impl FnOnce(&mut Builder),
    build_r: impl FnOnce(&mut Builder),
) {
    match op {
        BinaryOp::Or => build_logical_values(builder, build_l, build_r, true),
        BinaryOp::And => build_logical_values(builder, build_l, build_r, false),
        BinaryOp::BitOr => build_simple_alu_values(builder, build_l, build_r, Opcode::OR),
        BinaryOp::BitAnd => build_simple_alu_values(builder, build_l, build_r, Opcode::AND),
        BinaryOp::BitXor => build_xor_values(builder, build_l, build_r),
        BinaryOp::Shl => build_simple_alu_values(builder, build_l, build_r, Opcode::SHL),
        BinaryOp::Shr => build_simple_alu_values(builder, build_l, build_r, Opcode::SHR),
        BinaryOp::Add => build_simple_alu_values(builder, build_l, build_r, Opcode::ADD),
        BinaryOp::Sub => build_diff_values(builder, build_l, build_r),
        BinaryOp::Mul => build_multiply_values(builder, build_l, build_r),
        BinaryOp::Div => build_divmod_values(builder, build_l, build_r, true),
        BinaryOp::Mod => build_divmod_values(builder, build_l, build_r, false),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            // Compound assignment never uses a comparison operator (`assign_op` in the grammar
            // excludes them); reaching this would be a parser bug, not a user error.
            unreachable!("comparison operators are not compound-assignable")
        }
    }
}

fn load_or_address(builder: &mut Builder, target: PointerWithOffset, bank: Bank, ty: &Type, address_of: bool) -> Type {
    if address_of {
        let cell = builder.address_of(target);
        builder.load_word(cell, 0, 0);
    } else {
        builder.load_word(target, 0, bank);
    }
    ty.clone()
}

/// Builds the numeric *address value* of `expr` into `A`: for an `Array`-typed expression that's
/// its home address (only ever known at link time, via the address-literal trick); for anything
/// else (a `Pointer`-typed value already living in a variable, say) it's just the expression's
/// ordinary built value.
fn build_address_value(builder: &mut Builder, expr: &Expr) {
    match &expr.ty {
        Type::Array(_, _) => {
            let home = expr
                .constant_pointer_with_offset(builder)
                .expect("array-typed expression must be a named array variable");
            let cell = builder.address_of(home);
            builder.load_word(cell, 0, 0);
        }
        _ => {
            expr.build_expression(builder, false, None);
        }
    }
}

fn build_index(builder: &mut Builder, base: &Expr, index: &Expr, result_ty: &Type, address_of: bool) -> Type {
    let bank = match &base.ty {
        Type::Pointer(_, bank) => *bank,
        _ => 0,
    };
    let elem_size = base.ty.element_type().map(|t| t.size_words().max(1)).unwrap_or(1) as i32;

    if let (Some(base_ptr), Some(idx)) = (base.constant_pointer_with_offset(builder), index.constant) {
        let target = base_ptr.plus(idx * elem_size);
        return load_or_address(builder, target, bank, result_ty, address_of);
    }

    let idx_temp = builder.get_temporary(&Type::Integer);
    let idx_ptr = idx_temp.pointer();
    index.build_expression(builder, false, None);
    builder.store_word(idx_ptr, 0, 0);

    let offset_temp = builder.get_temporary(&Type::Integer);
    let offset_ptr = offset_temp.pointer();
    builder.emit(Opcode::AIN, Operand::Data(0));
    builder.store_word(offset_ptr, 0, 0);
    for _ in 0..elem_size {
        builder.load_word(offset_ptr, 0, 0);
        builder.emit(Opcode::BIN, Operand::from(idx_ptr));
        builder.emit(Opcode::ADD, Operand::None);
        builder.store_word(offset_ptr, 0, 0);
    }

    let base_value_temp = builder.get_temporary(&Type::Integer);
    let base_value_ptr = base_value_temp.pointer();
    build_address_value(builder, base);
    builder.store_word(base_value_ptr, 0, 0);

    builder.load_word(offset_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::from(base_value_ptr));
    builder.emit(Opcode::ADD, Operand::None);
    builder.emit(Opcode::SWAP_AB, Operand::None); // B = computed address

    if address_of {
        builder.emit(Opcode::SWAP_AB, Operand::None); // leave the address in A
    } else {
        builder.with_bank(bank, |b| b.emit(Opcode::LDI, Operand::None));
    }
    result_ty.clone()
}

fn build_field(
    builder: &mut Builder,
    range: SourceRange,
    base: &Expr,
    field: &str,
    result_ty: &Type,
    address_of: bool,
) -> Type {
    let def = match &base.ty {
        Type::Struct(def) => def.clone(),
        Type::Reference(inner) => match inner.as_ref() {
            Type::Struct(def) => def.clone(),
            _ => {
                builder.error(range, format!("'{}' is not a struct", base.ty));
                return Type::Unknown;
            }
        },
        _ => {
            builder.error(range, format!("'{}' is not a struct", base.ty));
            return Type::Unknown;
        }
    };
    let Some(struct_field) = def.field(field) else {
        builder.error(range, format!("'{}' has no field '{}'", def.name, field));
        return Type::Unknown;
    };

    if let Some(bit_field) = struct_field.bit_field {
        let host_offset = struct_field.offset as i32;
        return match base.constant_pointer_with_offset(builder) {
            Some(base_ptr) => load_bitfield(builder, base_ptr.base, base_ptr.offset + host_offset, &bit_field),
            None => {
                builder.error(range, "bit-field access through a computed base is not supported".to_owned());
                Type::Unknown
            }
        };
    }

    if let Some(base_ptr) = base.constant_pointer_with_offset(builder) {
        let target = base_ptr.plus(struct_field.offset as i32);
        return load_or_address(builder, target, 0, result_ty, address_of);
    }

    build_address_value(builder, base);
    let base_value = builder.get_temporary(&Type::Integer);
    let base_value_ptr = base_value.pointer();
    builder.store_word(base_value_ptr, 0, 0);
    builder.emit(Opcode::AIN, Operand::Data(struct_field.offset as i32));
    builder.emit(Opcode::BIN, Operand::from(base_value_ptr));
    builder.emit(Opcode::ADD, Operand::None);
    builder.emit(Opcode::SWAP_AB, Operand::None);
    if address_of {
        builder.emit(Opcode::SWAP_AB, Operand::None);
    } else {
        builder.emit(Opcode::LDI, Operand::None);
    }
    result_ty.clone()
}

fn load_bitfield(builder: &mut Builder, host: Pointer, host_offset: i32, bit_field: &BitField) -> Type {
    builder.load_word(host, host_offset, 0);
    builder.emit(Opcode::BIN, Operand::Data(bit_field.mask() as i32));
    builder.emit(Opcode::AND, Operand::None);
    if bit_field.offset != 0 {
        let temp = builder.get_temporary(&Type::Integer);
        let temp_ptr = temp.pointer();
        builder.store_word(temp_ptr, 0, 0);
        builder.load_word(temp_ptr, 0, 0);
        builder.emit(Opcode::BIN, Operand::Data(bit_field.offset as i32));
        builder.emit(Opcode::SHR, Operand::None);
    }
    Type::Integer
}

fn build_asm(builder: &mut Builder, range: SourceRange, lines: &[AsmLine]) {
    for line in lines {
        let Ok(opcode) = line.mnemonic.to_uppercase().parse::<Opcode>() else {
            builder.error(range, format!("unknown instruction mnemonic '{}'", line.mnemonic));
            continue;
        };
        let operand = match &line.operand {
            None => Operand::None,
            Some(AsmOperand::Literal(v)) => Operand::Data(*v),
            Some(AsmOperand::Var(name)) => match builder.lookup_variable(name) {
                Some(var) => Operand::from(var.home),
                None => {
                    builder.error(range, format!("'{}' is not declared", name));
                    Operand::None
                }
            },
        };
        if opcode.has_operand() {
            builder.emit(opcode, operand);
        } else if matches!(operand, Operand::None) {
            builder.emit(opcode, Operand::None);
        } else {
            builder.error(range, format!("'{}' does not take an operand", line.mnemonic));
        }
    }
}
