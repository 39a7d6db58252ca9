//! Statement nodes: declarations, control flow, and assignment.
//!
//! Expression nodes keep `initialize`/`optimize`/`build_expression` as three separately callable
//! passes (see `crate::ast::expr`), but nothing about that contract requires the *caller* to run
//! them as three separate whole-program walks. A variable's home pointer and scope membership are
//! minted exactly once, when `declare_variable`/`declare_param` is called — running three
//! independent top-to-bottom tree walks would either re-mint storage for every local on every
//! walk or lose it between walks when a block's scope is popped. So [`Stmt::compile`] runs a
//! single recursive pass that calls each touched expression's three methods back to back, and
//! brackets a block's entire lifetime (not each phase) in one `push_scope`/`pop_scope` pair. Only
//! top-level forward references (a function calling one declared later, or a struct used before
//! its declaration) need a separate earlier step — that's [`Stmt::declare`], run once over the
//! top-level statement list before any `compile`.

use crate::ast::expr::build_binary_op_values;
use crate::ast::{BinaryOp, Expr, ExprKind, TypeName};
use crate::builder::Builder;
use crate::diagnostics::SourceRange;
use crate::instr::{Opcode, Operand};
use crate::symbols::{Bank, Pointer, PointerWithOffset};
use crate::types::{BitField, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
}

impl AssignOp {
    fn to_binary_op(self) -> BinaryOp {
        match self {
            AssignOp::AddAssign => BinaryOp::Add,
            AssignOp::SubAssign => BinaryOp::Sub,
            AssignOp::MulAssign => BinaryOp::Mul,
            AssignOp::DivAssign => BinaryOp::Div,
            AssignOp::AndAssign => BinaryOp::BitAnd,
            AssignOp::OrAssign => BinaryOp::BitOr,
            AssignOp::XorAssign => BinaryOp::BitXor,
            AssignOp::ShlAssign => BinaryOp::Shl,
            AssignOp::ShrAssign => BinaryOp::Shr,
            AssignOp::Assign => unreachable!("plain assignment has no corresponding binary op"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub type_name: TypeName,
}

#[derive(Clone, Debug)]
pub struct StructFieldDecl {
    pub name: String,
    pub type_name: TypeName,
    /// Bit width, for a `name: 4;`-style field. `None` is an ordinary whole-word field.
    pub bit_size: Option<u8>,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    VarDecl {
        /// `None` for a `var` declaration — the type is inferred from `init`.
        type_name: Option<TypeName>,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    ExprStmt(Expr),
    Block(Vec<Stmt>),
    If {
        /// `(condition, body)` per `if`/`else if` arm, tried in order.
        arms: Vec<(Expr, Stmt)>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        return_type: TypeName,
        body: Vec<Stmt>,
    },
    StructDecl {
        name: String,
        fields: Vec<StructFieldDecl>,
    },
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: SourceRange,
}

impl Stmt {
    pub fn new(kind: StmtKind, range: SourceRange) -> Self {
        Stmt { kind, range }
    }

    /// Hoists a function's signature or a struct's fields so sibling top-level statements can
    /// reference them regardless of textual order. A no-op for every other statement kind. Idempotent in practice:
    /// [`Stmt::compile`] only calls this itself when the name hasn't been declared yet, which is
    /// how a nested (non-top-level) `FunctionDecl`/`StructDecl` gets hoisted lazily instead.
    pub fn declare(&self, builder: &mut Builder) {
        match &self.kind {
            StmtKind::FunctionDecl { name, params, return_type, .. } => {
                declare_function_decl(builder, self.range, name, params, return_type);
            }
            StmtKind::StructDecl { name, fields } => {
                declare_struct_decl(builder, self.range, name, fields);
            }
            _ => {}
        }
    }

    /// Runs this statement's semantic checks and emits its code, recursing into nested statements
    /// and expressions. See the module doc comment for why this is one combined pass rather than
    /// three separate `initialize`/`optimize`/`build` tree walks.
    pub fn compile(&mut self, builder: &mut Builder) {
        match &mut self.kind {
            StmtKind::VarDecl { type_name, name, init } => {
                if let Some(init) = init.as_mut() {
                    init.initialize(builder);
                    init.optimize(builder);
                }
                let ty = match type_name {
                    Some(type_name) => type_name.resolve(builder).unwrap_or_else(|message| {
                        builder.error(self.range, message);
                        Type::Unknown
                    }),
                    None => match init.as_ref() {
                        Some(init) => init.ty.clone(),
                        None => {
                            builder.error(
                                self.range,
                                "a 'var' declaration needs an initializer to infer its type".to_owned(),
                            );
                            Type::Unknown
                        }
                    },
                };
                let (constant_value, is_constant) = match init.as_ref() {
                    Some(init) => (init.constant, init.constant.is_some()),
                    None => (None, false),
                };
                match builder.declare_variable(name, ty.clone(), constant_value, is_constant) {
                    Ok(home) => {
                        if let Some(init) = init.as_ref() {
                            builder.set_value(home, &ty, init);
                        }
                    }
                    Err(message) => builder.error(self.range, message),
                }
            }

            StmtKind::Assign { target, op, value } => {
                target.initialize(builder);
                value.initialize(builder);
                target.optimize(builder);
                value.optimize(builder);
                if !target.is_lvalue() {
                    builder.error(
                        self.range,
                        "left-hand side of an assignment must be a variable, field, or index expression".to_owned(),
                    );
                    return;
                }
                build_assign(builder, target, *op, value);
                if let ExprKind::Identifier(name) = &target.kind {
                    builder.mark_assigned(name);
                }
            }

            StmtKind::ExprStmt(expr) => {
                expr.initialize(builder);
                expr.optimize(builder);
                expr.build_expression(builder, false, None);
            }

            StmtKind::Block(stmts) => {
                builder.push_scope();
                for stmt in stmts.iter_mut() {
                    stmt.compile(builder);
                }
                builder.pop_scope();
            }

            StmtKind::If { arms, else_branch } => {
                let end = builder.create_label(None);
                for (cond, body) in arms.iter_mut() {
                    let next = builder.create_label(None);
                    cond.initialize(builder);
                    cond.optimize(builder);
                    cond.build_expression(builder, false, None);
                    builder.emit(Opcode::JMPZ, Operand::from(next));
                    builder.push_scope();
                    body.compile(builder);
                    builder.pop_scope();
                    builder.emit(Opcode::JMP, Operand::from(end));
                    builder.mark(next);
                }
                if let Some(else_branch) = else_branch {
                    builder.push_scope();
                    else_branch.compile(builder);
                    builder.pop_scope();
                }
                builder.mark(end);
            }

            StmtKind::While { cond, body } => {
                let loop_start = builder.create_label(None);
                let loop_end = builder.create_label(None);
                builder.mark(loop_start);
                let mut reassigned = Vec::new();
                collect_assigned_names(body, &mut reassigned);
                for name in &reassigned {
                    builder.mark_assigned(name);
                }
                cond.initialize(builder);
                cond.optimize(builder);
                cond.build_expression(builder, false, None);
                builder.emit(Opcode::JMPZ, Operand::from(loop_end));
                builder.push_scope();
                body.compile(builder);
                builder.pop_scope();
                builder.emit(Opcode::JMP, Operand::from(loop_start));
                builder.mark(loop_end);
            }

            StmtKind::For { init, cond, step, body } => {
                builder.push_scope();
                if let Some(init) = init {
                    init.compile(builder);
                }
                let loop_start = builder.create_label(None);
                let loop_end = builder.create_label(None);
                builder.mark(loop_start);
                if let Some(cond) = cond {
                    let mut reassigned = Vec::new();
                    collect_assigned_names(body, &mut reassigned);
                    if let Some(step) = step {
                        collect_assigned_names(step, &mut reassigned);
                    }
                    for name in &reassigned {
                        builder.mark_assigned(name);
                    }
                    cond.initialize(builder);
                    cond.optimize(builder);
                    cond.build_expression(builder, false, None);
                    builder.emit(Opcode::JMPZ, Operand::from(loop_end));
                }
                builder.push_scope();
                body.compile(builder);
                builder.pop_scope();
                if let Some(step) = step {
                    step.compile(builder);
                }
                builder.emit(Opcode::JMP, Operand::from(loop_start));
                builder.mark(loop_end);
                builder.pop_scope();
            }

            StmtKind::Return(expr) => {
                if let Some(expr) = expr {
                    expr.initialize(builder);
                    expr.optimize(builder);
                    expr.build_expression(builder, false, None);
                } else {
                    builder.emit(Opcode::AIN, Operand::Data(0));
                }
                let return_label = builder.return_label();
                builder.emit(Opcode::JMP, Operand::from(return_label));
            }

            StmtKind::FunctionDecl { name, params, return_type, body } => {
                if builder.functions().get(name).is_none() {
                    declare_function_decl(builder, self.range, name, params, return_type);
                }
                let Some(function) = builder.functions().get(name) else {
                    return;
                };
                let return_type = function.return_type.clone();
                let params: Vec<(String, Type, Pointer)> =
                    function.params.iter().map(|p| (p.name.clone(), p.ty.clone(), p.home)).collect();

                let outer_buffer = builder.enter_function();
                for (param_name, ty, home) in &params {
                    if let Err(message) = builder.declare_param(param_name, ty.clone(), *home) {
                        builder.error(self.range, message);
                    }
                }
                for stmt in body.iter_mut() {
                    stmt.compile(builder);
                }
                if matches!(return_type, Type::Void) {
                    builder.emit(Opcode::AIN, Operand::Data(0));
                    let return_label = builder.return_label();
                    builder.emit(Opcode::JMP, Operand::from(return_label));
                }
                let body_buffer = builder.leave_function(outer_buffer);
                if let Some(function) = builder.functions_mut().get_mut(name) {
                    function.body = Some(body_buffer);
                }
            }

            StmtKind::StructDecl { name, fields } => {
                if builder.lookup_struct(name).is_none() {
                    declare_struct_decl(builder, self.range, name, fields);
                }
            }
        }
    }
}

/// Collects the names of every variable a statement (or its nested blocks/arms) assigns to,
/// directly or through a compound/increment assignment. Used to pre-clear a variable's `Constant`
/// fold flag before a loop's condition is built: the condition is only ever emitted once, ahead
/// of the body, so without this a variable re-assigned in the body or step would still look
/// foldable the first (and only) time the condition is compiled, baking in a stale constant and
/// making the loop never terminate. Does not descend into a nested `FunctionDecl`'s body, which
/// compiles into its own function-local scope and can't affect the enclosing loop's variables.
fn collect_assigned_names(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::Assign { target, .. } => {
            if let ExprKind::Identifier(name) = &target.kind {
                out.push(name.clone());
            }
        }
        StmtKind::Block(stmts) => {
            for s in stmts {
                collect_assigned_names(s, out);
            }
        }
        StmtKind::If { arms, else_branch } => {
            for (_, body) in arms {
                collect_assigned_names(body, out);
            }
            if let Some(else_branch) = else_branch {
                collect_assigned_names(else_branch, out);
            }
        }
        StmtKind::While { body, .. } => collect_assigned_names(body, out),
        StmtKind::For { init, step, body, .. } => {
            if let Some(init) = init {
                collect_assigned_names(init, out);
            }
            if let Some(step) = step {
                collect_assigned_names(step, out);
            }
            collect_assigned_names(body, out);
        }
        StmtKind::VarDecl { .. }
        | StmtKind::ExprStmt(_)
        | StmtKind::Return(_)
        | StmtKind::FunctionDecl { .. }
        | StmtKind::StructDecl { .. } => {}
    }
}

fn declare_function_decl(
    builder: &mut Builder,
    range: SourceRange,
    name: &str,
    params: &[Param],
    return_type: &TypeName,
) {
    if builder.functions().get(name).is_some() {
        builder.error(range, format!("'{}' is already declared", name));
        return;
    }
    let mut resolved_params = Vec::with_capacity(params.len());
    for param in params {
        match param.type_name.resolve(builder) {
            Ok(ty) => resolved_params.push((param.name.clone(), ty)),
            Err(message) => builder.error(range, message),
        }
    }
    let return_ty = return_type.resolve(builder).unwrap_or_else(|message| {
        builder.error(range, message);
        Type::Unknown
    });
    builder.declare_function(name, resolved_params, return_ty);
}

fn declare_struct_decl(builder: &mut Builder, range: SourceRange, name: &str, fields: &[StructFieldDecl]) {
    if builder.lookup_struct(name).is_some() {
        builder.error(range, format!("'{}' is already declared", name));
        return;
    }
    let def = resolve_struct_def(builder, range, name, fields);
    builder.declare_struct(def);
}

/// Packs bit-field members into shared host words, closing out (moving to the next word) on the
/// first ordinary field or once a bit-field wouldn't fit in the 16 bits remaining.
fn resolve_struct_def(
    builder: &mut Builder,
    range: SourceRange,
    name: &str,
    fields: &[StructFieldDecl],
) -> crate::types::StructDef {
    let mut resolved = Vec::with_capacity(fields.len());
    let mut offset = 0usize;
    // (host word offset, next free bit) of the bit-field group currently being packed, if any.
    let mut open_group: Option<(usize, u8)> = None;

    for field in fields {
        let ty = field.type_name.resolve(builder).unwrap_or_else(|message| {
            builder.error(range, message);
            Type::Unknown
        });
        match field.bit_size {
            Some(bits) => {
                let (host_offset, bit_pos) = match open_group {
                    Some((host_offset, bit_pos)) if bit_pos as u32 + bits as u32 <= 16 => (host_offset, bit_pos),
                    _ => {
                        if open_group.is_some() {
                            offset += 1;
                        }
                        (offset, 0)
                    }
                };
                resolved.push(crate::types::StructField {
                    name: field.name.clone(),
                    offset: host_offset,
                    ty,
                    bit_field: Some(BitField { offset: bit_pos, size: bits }),
                });
                open_group = Some((host_offset, bit_pos + bits));
            }
            None => {
                if open_group.take().is_some() {
                    offset += 1;
                }
                let size = ty.size_words().max(1);
                resolved.push(crate::types::StructField {
                    name: field.name.clone(),
                    offset,
                    ty,
                    bit_field: None,
                });
                offset += size;
            }
        }
    }

    crate::types::StructDef { name: name.to_owned(), fields: resolved }
}

/// Builds a `=` or compound assignment to `target`, an l-value expression already `initialize`d
/// and `optimize`d by the caller.
fn build_assign(builder: &mut Builder, target: &Expr, op: AssignOp, value: &Expr) {
    if let ExprKind::Field(base, field_name) = &target.kind {
        if let Some(def) = field_owner(base) {
            if let Some(field) = builder.lookup_struct(&def).and_then(|def| def.field(field_name).cloned()) {
                if let Some(bit_field) = field.bit_field {
                    let Some(base_ptr) = base.constant_pointer_with_offset(builder) else {
                        builder.error(
                            target.range,
                            "bit-field assignment through a computed base is not supported".to_owned(),
                        );
                        return;
                    };
                    let host = base_ptr.base;
                    let host_offset = base_ptr.offset + field.offset as i32;
                    match op {
                        AssignOp::Assign => {
                            store_bitfield_value(builder, host, host_offset, &bit_field, |b| {
                                value.build_expression(b, false, Some(&Type::Integer));
                            });
                        }
                        _ => {
                            let binop = op.to_binary_op();
                            store_bitfield_value(builder, host, host_offset, &bit_field, |b| {
                                build_binary_op_values(
                                    b,
                                    binop,
                                    |b2| {
                                        target.build_expression(b2, false, None);
                                    },
                                    |b2| {
                                        value.build_expression(b2, false, Some(&Type::Integer));
                                    },
                                );
                            });
                        }
                    }
                    return;
                }
            }
        }
    }

    match target.constant_pointer_with_offset(builder) {
        Some(addr) => build_assign_constant(builder, addr, &target.ty, op, value),
        None => build_assign_dynamic(builder, target, op, value),
    }
}

/// The struct name a `Field` target's base resolves to, if its type is (possibly through a `ref`)
/// a named struct — just enough to re-look-up the field through `Builder::lookup_struct` without
/// holding a borrow of `base.ty` across the call.
fn field_owner(base: &Expr) -> Option<String> {
    match &base.ty {
        Type::Struct(def) => Some(def.name.clone()),
        Type::Reference(inner) => match inner.as_ref() {
            Type::Struct(def) => Some(def.name.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn build_assign_constant(builder: &mut Builder, target: PointerWithOffset, ty: &Type, op: AssignOp, value: &Expr) {
    match op {
        AssignOp::Assign => {
            if target.offset == 0 {
                builder.set_value(target.base, ty, value);
            } else {
                assign_value_at_offset(builder, target, ty, value);
            }
        }
        _ => {
            let binop = op.to_binary_op();
            build_binary_op_values(
                builder,
                binop,
                |b| {
                    b.load_word(target, 0, 0);
                },
                |b| {
                    value.build_expression(b, false, Some(ty));
                },
            );
            builder.store_word(target, 0, 0);
        }
    }
}

/// `Builder::set_value`'s direct-store/struct-literal logic, generalized to a nonzero field/index
/// offset — `set_value` itself only takes a bare `Pointer` (implicitly offset zero), which covers
/// every plain-variable assignment but not `point.x = 1;`-style constant field chains.
fn assign_value_at_offset(builder: &mut Builder, target: PointerWithOffset, ty: &Type, value: &Expr) {
    if let ExprKind::StructLiteral(struct_name, fields) = &value.kind {
        let Some(def) = builder.lookup_struct(struct_name) else {
            builder.error(value.range, format!("unknown struct '{}'", struct_name));
            return;
        };
        for (field_name, field_expr) in fields {
            let Some(field) = def.field(field_name) else {
                builder.error(value.range, format!("'{}' has no field '{}'", struct_name, field_name));
                continue;
            };
            if let Some(bit_field) = &field.bit_field {
                let field_target = target.plus(field.offset as i32);
                store_bitfield_value(builder, field_target.base, field_target.offset, bit_field, |b| {
                    field_expr.build_expression(b, false, Some(&Type::Integer));
                });
            } else {
                assign_value_at_offset(builder, target.plus(field.offset as i32), &field.ty, field_expr);
            }
        }
        return;
    }

    let size = ty.size_words();
    if size > 1 && value.is_lvalue() {
        if let Some(src) = value.constant_pointer_with_offset(builder) {
            builder.copy_words(target, 0, src, 0, size);
            return;
        }
    }
    value.build_expression(builder, false, Some(ty));
    builder.store_word(target, 0, 0);
    if let Type::Pointer(_, bank) = ty {
        builder.emit(Opcode::AIN, Operand::Data(*bank as i32));
        builder.store_word(target, 1, 0);
    }
}

/// Assignment through a computed address — `m[i] = v;` with a non-constant `i`, or indexing
/// through a pointer-typed base. Mirrors `crate::ast::expr::build_index`'s load-path address
/// computation, but stores through `STI` instead of loading through `LDI`.
fn build_assign_dynamic(builder: &mut Builder, target: &Expr, op: AssignOp, value: &Expr) {
    let bank = dynamic_target_bank(target);

    target.build_expression(builder, true, None); // address into A
    let addr_temp = builder.get_temporary(&Type::Integer);
    let addr_ptr = addr_temp.pointer();
    builder.store_word(addr_ptr, 0, 0);

    match op {
        AssignOp::Assign => {
            value.build_expression(builder, false, Some(&target.ty));
        }
        _ => {
            let binop = op.to_binary_op();
            build_binary_op_values(
                builder,
                binop,
                |b| {
                    b.emit(Opcode::BIN, Operand::from(addr_ptr));
                    b.with_bank(bank, |b2| b2.emit(Opcode::LDI, Operand::None));
                },
                |b| {
                    value.build_expression(b, false, Some(&target.ty));
                },
            );
        }
    }

    // `BIN` only ever touches `B`, so the new value just computed into `A` survives reloading the
    // address for the store.
    builder.emit(Opcode::BIN, Operand::from(addr_ptr));
    builder.with_bank(bank, |b| b.emit(Opcode::STI, Operand::None));
}

fn dynamic_target_bank(target: &Expr) -> Bank {
    match &target.kind {
        ExprKind::Index(base, _) => match &base.ty {
            Type::Pointer(_, bank) => *bank,
            _ => 0,
        },
        _ => 0,
    }
}

/// The closure-driven twin of [`Builder::store_bitfield`]: the new raw value comes from
/// `build_value` (a compound assignment's freshly-computed result) rather than from an `Expr`
/// directly.
fn store_bitfield_value(
    builder: &mut Builder,
    host: Pointer,
    host_offset: i32,
    bit_field: &BitField,
    build_value: impl FnOnce(&mut Builder),
) {
    let mask = bit_field.mask();
    let temp = builder.get_temporary(&Type::Integer);
    let temp_ptr = temp.pointer();

    build_value(builder);
    builder.store_word(temp_ptr, 0, 0);

    builder.load_word(temp_ptr, 0, 0);
    builder.emit(Opcode::BIN, Operand::Data(bit_field.offset as i32));
    builder.emit(Opcode::SHL, Operand::None);
    builder.emit(Opcode::BIN, Operand::Data(mask as i32));
    builder.emit(Opcode::AND, Operand::None);
    builder.store_word(temp_ptr, 0, 0);

    builder.load_word(host, host_offset, 0);
    builder.emit(Opcode::BIN, Operand::Data(!mask as i32));
    builder.emit(Opcode::AND, Operand::None);
    builder.emit(Opcode::BIN, Operand::from(temp_ptr));
    builder.emit(Opcode::OR, Operand::None);
    builder.store_word(host, host_offset, 0);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::expr::ExprKind as EK;

    fn range() -> SourceRange {
        SourceRange::default()
    }

    fn int(v: i32) -> Expr {
        Expr::new(EK::IntLiteral(v), range())
    }

    #[test]
    fn collect_assigned_names_finds_direct_and_nested_assignments() {
        let assign = |name: &str| Stmt::new(
            StmtKind::Assign {
                target: Expr::new(EK::Identifier(name.to_owned()), range()),
                op: AssignOp::AddAssign,
                value: int(1),
            },
            range(),
        );
        let block = Stmt::new(StmtKind::Block(vec![assign("a"), assign("b")]), range());
        let mut found = Vec::new();
        collect_assigned_names(&block, &mut found);
        assert_eq!(found, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn collect_assigned_names_does_not_descend_into_nested_functions() {
        let nested_fn = Stmt::new(
            StmtKind::FunctionDecl {
                name: "f".to_owned(),
                params: Vec::new(),
                return_type: TypeName::Void,
                body: vec![Stmt::new(
                    StmtKind::Assign {
                        target: Expr::new(EK::Identifier("inner".to_owned()), range()),
                        op: AssignOp::Assign,
                        value: int(1),
                    },
                    range(),
                )],
            },
            range(),
        );
        let mut found = Vec::new();
        collect_assigned_names(&nested_fn, &mut found);
        assert!(found.is_empty());
    }

    /// Regression test for a loop condition folding a reassigned variable's stale initial value:
    /// once the `while` body has compiled, `v` must no longer be foldable, since its condition
    /// was built (and would otherwise have inlined `v`'s initializer) before the body's own
    /// reassignment got a chance to clear the flag.
    #[test]
    fn while_loop_clears_foldability_of_a_variable_its_body_reassigns() {
        let mut builder = Builder::new();
        let mut decl = Stmt::new(
            StmtKind::VarDecl {
                type_name: None,
                name: "v".to_owned(),
                init: Some(int(10)),
            },
            range(),
        );
        decl.compile(&mut builder);
        assert!(builder.lookup_variable("v").unwrap().is_foldable());

        let cond = Expr::new(
            EK::Binary(
                BinaryOp::Gt,
                Box::new(Expr::new(EK::Identifier("v".to_owned()), range())),
                Box::new(int(0)),
            ),
            range(),
        );
        let body = Stmt::new(
            StmtKind::Assign {
                target: Expr::new(EK::Identifier("v".to_owned()), range()),
                op: AssignOp::AddAssign,
                value: int(-1),
            },
            range(),
        );
        let mut while_stmt = Stmt::new(
            StmtKind::While {
                cond,
                body: Box::new(body),
            },
            range(),
        );
        while_stmt.compile(&mut builder);
        assert!(!builder.diagnostics().has_errors());
        assert!(!builder.lookup_variable("v").unwrap().is_foldable());
    }

    #[test]
    fn assign_op_maps_to_expected_binary_op() {
        assert_eq!(AssignOp::AddAssign.to_binary_op(), BinaryOp::Add);
        assert_eq!(AssignOp::ShrAssign.to_binary_op(), BinaryOp::Shr);
    }

    #[test]
    #[should_panic]
    fn plain_assign_has_no_binary_op() {
        AssignOp::Assign.to_binary_op();
    }

    #[test]
    fn var_decl_with_literal_initializer_compiles() {
        let mut builder = Builder::new();
        let mut stmt = Stmt::new(
            StmtKind::VarDecl {
                type_name: None,
                name: "x".to_owned(),
                init: Some(int(41)),
            },
            range(),
        );
        stmt.compile(&mut builder);
        assert!(!builder.diagnostics().has_errors());
        let var = builder.lookup_variable("x").expect("declared");
        assert_eq!(var.constant_value, Some(41));
        assert!(var.is_constant);
    }

    #[test]
    fn assigning_to_an_undeclared_name_is_an_error() {
        let mut builder = Builder::new();
        let mut stmt = Stmt::new(
            StmtKind::Assign {
                target: Expr::new(EK::Identifier("missing".to_owned()), range()),
                op: AssignOp::Assign,
                value: int(1),
            },
            range(),
        );
        stmt.compile(&mut builder);
        assert!(builder.diagnostics().has_errors());
    }

    #[test]
    fn reassigning_a_variable_clears_its_constant_flag() {
        let mut builder = Builder::new();
        Stmt::new(
            StmtKind::VarDecl {
                type_name: None,
                name: "x".to_owned(),
                init: Some(int(1)),
            },
            range(),
        )
        .compile(&mut builder);
        Stmt::new(
            StmtKind::Assign {
                target: Expr::new(EK::Identifier("x".to_owned()), range()),
                op: AssignOp::Assign,
                value: int(2),
            },
            range(),
        )
        .compile(&mut builder);
        let var = builder.lookup_variable("x").expect("declared");
        assert!(!var.is_constant);
    }

    #[test]
    fn struct_with_two_four_bit_fields_shares_a_host_word() {
        let mut builder = Builder::new();
        let def = resolve_struct_def(
            &mut builder,
            range(),
            "Flags",
            &[
                StructFieldDecl { name: "a".to_owned(), type_name: TypeName::Int, bit_size: Some(4) },
                StructFieldDecl { name: "b".to_owned(), type_name: TypeName::Int, bit_size: Some(4) },
                StructFieldDecl { name: "c".to_owned(), type_name: TypeName::Int, bit_size: None },
            ],
        );
        assert_eq!(def.field("a").unwrap().offset, 0);
        assert_eq!(def.field("b").unwrap().offset, 0);
        assert_eq!(def.field("b").unwrap().bit_field.unwrap().offset, 4);
        assert_eq!(def.field("c").unwrap().offset, 1);
    }
}
