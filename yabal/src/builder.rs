//! The Yabal builder: the single mutable code-generation context threaded through
//! `declare`/`initialize`/`optimize`/`build`. Owns the instruction buffer, the block stack, the
//! three pointer collections, the function table, the literal pools and the diagnostic sink.
//!
//! Function bodies are built into a *swapped-in* child [`Buffer`] (see [`Builder::enter_function`]
//! / [`Builder::leave_function`]) rather than a separate `Builder` value: everything else (block
//! stack aside) is genuinely shared state, so swapping the one field that differs keeps the
//! sharing implicit instead of threading `Rc<RefCell<_>>` through every table.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::block::{BlockStack, PointerCollection, StorageClass, TemporaryGuard, Variable};
use crate::diagnostics::{DiagnosticSink, SourceRange};
use crate::instr::{Buffer, Opcode, Operand, RawValue, SharedSymbols};
use crate::memory_map;
use crate::strings::{BinaryFileTable, StringTable};
use crate::symbols::{Bank, Label, Pointer, PointerWithOffset};
use crate::types::{StructDef, Type};

/// One function's signature plus, once built, its body. Present in the table from the moment
/// its declaration is seen so later statements — including ones earlier in the file, for the
/// common forward-call/recursion case — can call it.
pub struct Function {
    pub name: String,
    pub params: Vec<FunctionParam>,
    pub return_type: Type,
    pub entry: Label,
    pub reference_count: u32,
    pub body: Option<Buffer>,
}

pub struct FunctionParam {
    pub name: String,
    pub ty: Type,
    pub home: Pointer,
}

#[derive(Default)]
pub struct FunctionTable {
    functions: HashMap<String, Function>,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn insert(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn into_iter(self) -> impl Iterator<Item = Function> {
        self.functions.into_values()
    }
}

/// Context shared by the builder's codegen methods: the machine's calling convention,
/// laid out once `finish()` knows the final stack-slot high-water mark.
struct CallingConvention {
    call_label: Label,
    return_label: Label,
    sp_cell: Pointer,
    return_value_cell: Pointer,
}

pub struct Builder {
    symbols: SharedSymbols,
    buffer: Buffer,
    globals: PointerCollection,
    temporaries: Rc<RefCell<PointerCollection>>,
    stack: Rc<RefCell<PointerCollection>>,
    blocks: BlockStack,
    /// Scopes suspended while building a function body; the innermost is the scope that was
    /// active just before `enter_function` — global variable lookups fall back to it, since a
    /// function's own `BlockStack` chain is rooted separately from the program's.
    outer_blocks: Vec<BlockStack>,
    functions: FunctionTable,
    structs: HashMap<String, Rc<StructDef>>,
    strings: StringTable,
    binaries: BinaryFileTable,
    diagnostics: DiagnosticSink,
    calling_convention: Option<CallingConvention>,
    any_call_emitted: bool,
    /// Link-time-constant addresses (array decay, struct/field base addresses used as a runtime
    /// pointer value) that a later pass needs as a plain numeric value rather than a dereference.
    /// `AIN`/`STA` always dereference their operand, so the only way to load "the address itself"
    /// is to park it as a data word (resolved by the linker like any other literal) and read that
    /// word back with an ordinary load — the same trick string/binary literals already use.
    address_literals: Vec<(Pointer, PointerWithOffset)>,
}

impl Builder {
    pub fn new() -> Self {
        let symbols = crate::instr::SymbolTable::shared();
        let buffer = Buffer::new(Rc::clone(&symbols));
        Builder {
            symbols,
            buffer,
            globals: PointerCollection::new(),
            temporaries: Rc::new(RefCell::new(PointerCollection::new())),
            stack: Rc::new(RefCell::new(PointerCollection::new())),
            blocks: BlockStack::new_global(),
            outer_blocks: Vec::new(),
            functions: FunctionTable::default(),
            structs: HashMap::new(),
            strings: StringTable::new(),
            binaries: BinaryFileTable::new(),
            diagnostics: DiagnosticSink::new(),
            calling_convention: None,
            any_call_emitted: false,
            address_literals: Vec::new(),
        }
    }

    /// A pointer whose *contents*, once linked, equal `target`'s resolved address — load it with
    /// an ordinary `AIN`/`load_word` to get an address as a runtime value.
    pub fn address_of(&mut self, target: impl Into<PointerWithOffset>) -> Pointer {
        let target = target.into();
        let cell = self.buffer.create_pointer(None, 0, 1);
        self.address_literals.push((cell, target));
        cell
    }

    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticSink {
        &mut self.diagnostics
    }

    pub fn error(&mut self, range: SourceRange, message: impl Into<String>) {
        self.diagnostics.error(range, message);
    }

    // ---- scopes & variables ----

    pub fn push_scope(&mut self) {
        let current = std::mem::replace(&mut self.blocks, BlockStack::new_function_root());
        self.blocks = current.push();
    }

    pub fn pop_scope(&mut self) {
        let current = std::mem::replace(&mut self.blocks, BlockStack::new_function_root());
        self.blocks = current.pop();
    }

    pub fn in_function(&self) -> bool {
        !self.outer_blocks.is_empty()
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&Variable> {
        self.blocks
            .lookup(name)
            .or_else(|| self.outer_blocks.last().and_then(|outer| outer.lookup(name)))
    }

    pub fn lookup_variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        if self.blocks.lookup(name).is_some() {
            return self.blocks.lookup_mut(name);
        }
        self.outer_blocks.last_mut().and_then(|outer| outer.lookup_mut(name))
    }

    pub fn mark_used(&mut self, name: &str) {
        if let Some(variable) = self.lookup_variable_mut(name) {
            variable.mark_used();
        }
    }

    pub fn mark_assigned(&mut self, name: &str) {
        if let Some(variable) = self.lookup_variable_mut(name) {
            variable.mark_assigned();
        }
    }

    /// Declares a new variable in the current innermost scope, carving its home pointer out of
    /// the globals pool (outside a function) or the stack pool (inside one). Returns an error
    /// message if the name is already declared in this exact scope.
    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: Type,
        constant_value: Option<i32>,
        is_constant: bool,
    ) -> Result<Pointer, String> {
        let bank = 0;
        let size = ty.size_words().max(1);
        let (home, storage) = if self.in_function() {
            (self.stack.borrow_mut().get_next(&self.buffer, bank, size), StorageClass::Stack)
        } else {
            (self.globals.get_next(&self.buffer, bank, size), StorageClass::Global)
        };
        self.symbols.borrow_mut().assign_variable(home, name);
        self.blocks.declare(Variable {
            name: name.to_owned(),
            home,
            ty,
            storage,
            constant_value,
            is_constant,
            usages: 0,
        })?;
        Ok(home)
    }

    pub fn get_temporary(&mut self, ty: &Type) -> TemporaryGuard {
        let size = ty.size_words().max(1);
        let pointer = self.temporaries.borrow_mut().get_next(&self.buffer, 0, size);
        TemporaryGuard::new(Rc::clone(&self.temporaries), pointer, size)
    }

    /// Binds an already-minted pointer (a function parameter's home, carved out at `declare`
    /// time) as a named variable in the current scope — used when entering a function body,
    /// where the home must already exist so forward calls can reference it.
    pub fn declare_param(&mut self, name: &str, ty: Type, home: Pointer) -> Result<(), String> {
        self.blocks.declare(Variable {
            name: name.to_owned(),
            home,
            ty,
            storage: StorageClass::Stack,
            constant_value: None,
            is_constant: false,
            usages: 0,
        })
    }

    /// Refines a variable's foldability after its initializer has been constant-folded by the
    /// `optimize` pass — `declare_variable` only sees the initializer's
    /// `initialize`-time constant, which misses compound expressions like `var x = 2 + 3;` that
    /// only fold once `optimize` runs over the whole tree.
    pub fn refine_constant(&mut self, name: &str, value: Option<i32>) {
        if let (Some(value), Some(var)) = (value, self.lookup_variable_mut(name)) {
            var.constant_value = Some(value);
            var.is_constant = true;
        }
    }

    // ---- struct table ----

    pub fn declare_struct(&mut self, def: StructDef) {
        self.structs.insert(def.name.clone(), Rc::new(def));
    }

    pub fn lookup_struct(&self, name: &str) -> Option<Rc<StructDef>> {
        self.structs.get(name).cloned()
    }

    // ---- functions ----

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    /// Hoists a function's signature: mints an entry label and a home
    /// pointer per parameter up front, before the body is seen, so earlier statements — including
    /// the function's own body, for recursion — can already call it.
    pub fn declare_function(&mut self, name: &str, params: Vec<(String, Type)>, return_type: Type) {
        let entry = self.buffer.create_label(Some(name.to_owned()));
        let mut resolved_params = Vec::with_capacity(params.len());
        for (param_name, ty) in params {
            let size = ty.size_words().max(1);
            let home = self.stack.borrow_mut().get_next(&self.buffer, 0, size);
            self.symbols.borrow_mut().assign_variable(home, param_name.clone());
            resolved_params.push(FunctionParam { name: param_name, ty, home });
        }
        self.functions.insert(Function {
            name: name.to_owned(),
            params: resolved_params,
            return_type,
            entry,
            reference_count: 0,
            body: None,
        });
    }

    /// Swaps in a fresh buffer and function-root scope for building one function's body,
    /// stashing the previously active ones so `leave_function` can restore them.
    pub fn enter_function(&mut self) -> Buffer {
        let outer_scope = std::mem::replace(&mut self.blocks, BlockStack::new_function_root());
        self.outer_blocks.push(outer_scope);
        std::mem::replace(&mut self.buffer, self.buffer.child())
    }

    pub fn leave_function(&mut self, outer_buffer: Buffer) -> Buffer {
        let outer_scope = self.outer_blocks.pop().expect("leave_function without enter_function");
        self.blocks = outer_scope;
        std::mem::replace(&mut self.buffer, outer_buffer)
    }

    // ---- literal pools ----

    pub fn intern_string(&mut self, range: SourceRange, value: &str) -> Pointer {
        match self.strings.intern(&self.buffer, value) {
            Ok(pointer) => pointer,
            Err(bad_char) => {
                self.error(
                    range,
                    format!("character {:?} has no entry in the character table", bad_char),
                );
                self.strings.intern(&self.buffer, "").expect("empty string always interns")
            }
        }
    }

    // ---- instruction emission ----

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    pub fn create_label(&self, name: Option<String>) -> Label {
        self.buffer.create_label(name)
    }

    pub fn create_pointer(&self, name: Option<String>, bank: Bank, size: usize) -> Pointer {
        self.buffer.create_pointer(name, bank, size)
    }

    pub fn mark(&mut self, label: Label) {
        self.buffer.mark(label);
    }

    pub fn emit(&mut self, opcode: Opcode, operand: Operand) {
        self.buffer.emit(opcode, operand);
    }

    /// Brackets `body` with `SET_BANK(bank) ... SET_BANK(0)` when `bank != 0`; a no-op bracket for bank-0 accesses.
    pub fn with_bank<F: FnOnce(&mut Builder)>(&mut self, bank: Bank, body: F) {
        if bank != 0 {
            self.emit(Opcode::SET_BANK, Operand::Data(bank as i32));
        }
        body(self);
        if bank != 0 {
            self.emit(Opcode::SET_BANK, Operand::Data(0));
        }
    }

    // ---- loads/stores of whole (possibly multi-word) values ----

    /// Loads the word at `pointer + word_offset` into `A`.
    pub fn load_word(&mut self, pointer: impl Into<PointerWithOffset>, word_offset: i32, bank: Bank) {
        let operand = Operand::Symbol(pointer.into().plus(word_offset));
        self.with_bank(bank, |b| b.emit(Opcode::AIN, operand));
    }

    /// Stores `A` to the word at `pointer + word_offset`.
    pub fn store_word(&mut self, pointer: impl Into<PointerWithOffset>, word_offset: i32, bank: Bank) {
        let operand = Operand::Symbol(pointer.into().plus(word_offset));
        self.with_bank(bank, |b| b.emit(Opcode::STA, operand));
    }

    /// Word-wise copy from `src` to `dst`, `size` words, without routing each word through a
    /// temporary beyond `A` itself.
    pub fn copy_words(
        &mut self,
        dst: impl Into<PointerWithOffset>,
        dst_bank: Bank,
        src: impl Into<PointerWithOffset>,
        src_bank: Bank,
        size: usize,
    ) {
        let dst = dst.into();
        let src = src.into();
        for word in 0..size as i32 {
            self.load_word(src, word, src_bank);
            self.store_word(dst, word, dst_bank);
        }
    }

    // ---- calling convention ----

    pub fn any_call_emitted(&self) -> bool {
        self.any_call_emitted
    }

    pub fn sp_cell(&mut self) -> Pointer {
        self.ensure_calling_convention_labels();
        self.calling_convention.as_ref().unwrap().sp_cell
    }

    pub fn return_value_cell(&mut self) -> Pointer {
        self.ensure_calling_convention_labels();
        self.calling_convention.as_ref().unwrap().return_value_cell
    }

    pub fn return_label(&mut self) -> Label {
        self.ensure_calling_convention_labels();
        self.calling_convention.as_ref().unwrap().return_label
    }

    fn ensure_calling_convention_labels(&mut self) {
        if self.calling_convention.is_none() {
            self.calling_convention = Some(CallingConvention {
                call_label: self.buffer.create_label(Some("__call".to_owned())),
                return_label: self.buffer.create_label(Some("__return".to_owned())),
                sp_cell: self.buffer.create_pointer(Some("__sp".to_owned()), 0, 1),
                return_value_cell: self.buffer.create_pointer(Some("__retval".to_owned()), 0, 1),
            });
        }
    }

    /// Emits a call to `function` at the current position, evaluating `args` left-to-right into
    /// the callee's parameter slots before transferring control. Leaves
    /// the return value in `A`.
    pub fn build_call(
        &mut self,
        range: SourceRange,
        name: &str,
        args: &[crate::ast::Expr],
    ) -> Type {
        self.ensure_calling_convention_labels();
        self.any_call_emitted = true;

        let Some(function) = self.functions.get(name) else {
            self.error(range, format!("call to undeclared function '{}'", name));
            return Type::Unknown;
        };
        let return_type = function.return_type.clone();
        if args.len() != function.params.len() {
            self.error(
                range,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    name,
                    function.params.len(),
                    args.len()
                ),
            );
        }
        let param_pointers: Vec<(Pointer, Type)> = function
            .params
            .iter()
            .map(|p| (p.home, p.ty.clone()))
            .collect();

        for (arg, (home, ty)) in args.iter().zip(param_pointers.iter()) {
            self.set_value(*home, ty, arg);
        }

        let entry = self.functions.get(name).unwrap().entry;
        let call_label = self.calling_convention.as_ref().unwrap().call_label;
        let after_call = self.buffer.create_label(None);

        self.emit(Opcode::BIN, Operand::from(after_call));
        self.emit(Opcode::CIN, Operand::from(entry));
        self.emit(Opcode::JMP, Operand::from(call_label));
        self.mark(after_call);
        let return_value_cell = self.calling_convention.as_ref().unwrap().return_value_cell;
        self.emit(Opcode::AIN, Operand::from(return_value_cell));

        if let Some(function) = self.functions.get_mut(name) {
            function.reference_count += 1;
        }

        return_type
    }

    /// Canonical store: struct literals recurse field-by-field honoring
    /// bit-field layout; other l-values of matching composite type are word-wise direct-copied;
    /// everything else is built into `A` and stored with a single `STA`.
    pub fn set_value(&mut self, dst: Pointer, ty: &Type, expr: &crate::ast::Expr) {
        use crate::ast::ExprKind;

        if let ExprKind::StructLiteral(struct_name, fields) = &expr.kind {
            let Some(def) = self.lookup_struct(struct_name) else {
                self.error(expr.range, format!("unknown struct '{}'", struct_name));
                return;
            };
            for (field_name, field_expr) in fields {
                let Some(field) = def.field(field_name) else {
                    self.error(expr.range, format!("'{}' has no field '{}'", struct_name, field_name));
                    continue;
                };
                if let Some(bit_field) = &field.bit_field {
                    self.store_bitfield(dst, field.offset as i32, bit_field, field_expr);
                } else {
                    self.set_value_at(dst, field.offset as i32, &field.ty, field_expr);
                }
            }
            return;
        }

        let size = ty.size_words();
        if size > 1 && expr.is_lvalue() {
            if let Some(src) = expr.constant_pointer_with_offset(self) {
                self.copy_words(dst, 0, src, 0, size);
                return;
            }
        }

        expr.build_expression(self, false, Some(ty));
        self.store_word(dst, 0, 0);
        self.store_pointer_bank(dst, 0, ty);
    }

    fn set_value_at(&mut self, base: Pointer, offset: i32, ty: &Type, expr: &crate::ast::Expr) {
        expr.build_expression(self, false, Some(ty));
        let dst = PointerWithOffset::with_offset(base, offset);
        self.store_word(dst, 0, 0);
        self.store_pointer_bank(dst, 0, ty);
    }

    /// Writes a freshly-built pointer value's bank word. Only needed here — the `size > 1 && is_lvalue()` branch above already copies
    /// both words verbatim via `copy_words` when the source is itself a pointer-typed l-value.
    fn store_pointer_bank(&mut self, dst: impl Into<PointerWithOffset>, word_offset: i32, ty: &Type) {
        if let Type::Pointer(_, bank) = ty {
            self.emit(Opcode::AIN, Operand::Data(*bank as i32));
            self.store_word(dst, word_offset + 1, 0);
        }
    }

    /// Bit-field write: constant RHS folds the mask at compile time; a computed RHS is
    /// built into `A`, masked and shifted, then read-modify-write applied to the host word.
    pub fn store_bitfield(
        &mut self,
        host: Pointer,
        host_offset: i32,
        bit_field: &crate::types::BitField,
        expr: &crate::ast::Expr,
    ) {
        let mask = bit_field.mask();
        let temp = self.get_temporary(&Type::Integer);
        let temp_ptr = temp.pointer();

        expr.build_expression(self, false, Some(&Type::Integer));
        self.store_word(temp_ptr, 0, 0); // temp = raw value

        self.load_word(temp_ptr, 0, 0);
        self.emit(Opcode::BIN, Operand::Data(bit_field.offset as i32));
        self.emit(Opcode::SHL, Operand::None); // A = value << offset
        self.emit(Opcode::BIN, Operand::Data(mask as i32));
        self.emit(Opcode::AND, Operand::None); // A = (value << offset) & mask
        self.store_word(temp_ptr, 0, 0);

        self.load_word(host, host_offset, 0);
        self.emit(Opcode::BIN, Operand::Data(!mask as i32));
        self.emit(Opcode::AND, Operand::None); // A = host & !mask
        self.emit(Opcode::BIN, Operand::from(temp_ptr));
        self.emit(Opcode::OR, Operand::None); // A = (host & !mask) | shifted
        self.store_word(host, host_offset, 0);
    }

    // ---- finishing up ----

    /// Runs the linker over everything built so far, after appending the shared calling
    /// convention trampoline (if any call was ever emitted) and the literal pools. Returns the
    /// diagnostics accumulated over the whole compile alongside the image, since a "function is
    /// never called" debug note can only be discovered here, once every call site has built.
    pub fn finish(
        mut self,
        program_start: Label,
    ) -> Result<(crate::linker::LinkOutput, DiagnosticSink), crate::linker::LinkError> {
        let trampoline = if self.any_call_emitted {
            Some(self.build_trampoline())
        } else {
            None
        };

        let data_region: Vec<(Pointer, usize)> = self
            .globals
            .all()
            .iter()
            .chain(self.temporaries.borrow().all().iter())
            .chain(self.stack.borrow().all().iter())
            .cloned()
            .chain(self.calling_convention.iter().flat_map(|cc| {
                vec![(cc.sp_cell, 1), (cc.return_value_cell, 1)]
            }))
            .collect();

        let functions: Vec<crate::linker::LinkedFunction> = self
            .functions
            .into_iter()
            .filter_map(|f| {
                if f.reference_count == 0 {
                    self.diagnostics.debug(
                        SourceRange::default(),
                        format!("function '{}' is never called, omitted", f.name),
                    );
                    None
                } else {
                    f.body.map(|body| crate::linker::LinkedFunction { entry: f.entry, body })
                }
            })
            .collect();

        let mut strings_pool = self.buffer.child();
        self.strings.emit(&mut strings_pool);
        for (cell, target) in &self.address_literals {
            strings_pool.mark_pointer(*cell);
            strings_pool.emit_raw(RawValue::Symbol(*target), None);
        }
        let mut binaries_pool = self.buffer.child();
        self.binaries.emit(&mut binaries_pool);

        let symbols = Rc::clone(&self.symbols);
        let mut diagnostics = std::mem::take(&mut self.diagnostics);
        let output = crate::linker::link(
            &symbols,
            crate::linker::LinkInput {
                data_region,
                functions,
                trampoline,
                program_start,
                main: self.buffer,
                strings: strings_pool,
                binaries: binaries_pool,
            },
            0,
            &mut diagnostics,
        )?;
        Ok((output, diagnostics))
    }

    pub fn into_diagnostics(self) -> DiagnosticSink {
        self.diagnostics
    }

    /// Builds the shared `__call`/`__return` trampoline, sized to the final high-water
    /// mark of the stack-slot pool — by this point every function body has been built, so no
    /// further stack-resident variable can be declared.
    fn build_trampoline(&mut self) -> Buffer {
        let cc = self.calling_convention.as_ref().expect("trampoline requires calling convention cells");
        let call_label = cc.call_label;
        let return_label = cc.return_label;
        let sp_cell = cc.sp_cell;
        let slots: Vec<(Pointer, usize)> = self.stack.borrow().all().to_vec();
        let stack_total: i32 = slots.iter().map(|(_, size)| *size as i32).sum();

        let mut trampoline = self.buffer.child();

        // __call: B = return address, C = callee entry, on entry.
        trampoline.mark(call_label);
        trampoline.emit(Opcode::AIN, Operand::from(sp_cell)); // A = SP
        trampoline.emit(Opcode::SWAP_AB, Operand::None); // B = SP, A = return address
        trampoline.emit(Opcode::STI, Operand::None); // MEM[SP] = return address
        emit_spill_or_restore(&mut trampoline, sp_cell, &slots, true);
        trampoline.emit(Opcode::AIN, Operand::from(sp_cell));
        trampoline.emit(Opcode::BIN, Operand::Data(stack_total + 1));
        trampoline.emit(Opcode::ADD, Operand::None);
        trampoline.emit(Opcode::STA, Operand::from(sp_cell)); // SP += stack_total + 1
        trampoline.emit(Opcode::SWAP_AC, Operand::None); // A = callee entry (was in C)
        emit_indirect_jump(&mut trampoline);

        // __return: A holds the function's result on entry.
        trampoline.mark(return_label);
        trampoline.emit(Opcode::STA, Operand::from(cc.return_value_cell));
        trampoline.emit(Opcode::AIN, Operand::from(sp_cell));
        trampoline.emit(Opcode::BIN, Operand::Data(stack_total + 1));
        trampoline.emit(Opcode::SUB, Operand::None); // A = SP - (stack_total + 1)
        trampoline.emit(Opcode::STA, Operand::from(sp_cell));
        emit_spill_or_restore(&mut trampoline, sp_cell, &slots, false);
        trampoline.emit(Opcode::AIN, Operand::from(sp_cell));
        trampoline.emit(Opcode::BIN, Operand::Data(0));
        trampoline.emit(Opcode::ADD, Operand::None);
        trampoline.emit(Opcode::SWAP_AB, Operand::None);
        trampoline.emit(Opcode::LDI, Operand::None); // A = MEM[SP] = saved return address
        emit_indirect_jump(&mut trampoline);

        trampoline
    }
}

/// Spills (`save = true`) or restores every stack-resident slot, word by word, to/from
/// `MEM[sp_cell + offset]`.
fn emit_spill_or_restore(buffer: &mut Buffer, sp_cell: Pointer, slots: &[(Pointer, usize)], save: bool) {
    let mut offset = 1i32; // offset 0 is reserved for the saved return address itself.
    for (pointer, size) in slots {
        for word in 0..*size as i32 {
            buffer.emit(Opcode::AIN, Operand::Data(offset + word));
            buffer.emit(Opcode::BIN, Operand::from(sp_cell));
            buffer.emit(Opcode::ADD, Operand::None);
            buffer.emit(Opcode::SWAP_AB, Operand::None);
            if save {
                buffer.emit(Opcode::AIN, Operand::Symbol(PointerWithOffset::with_offset(*pointer, word)));
                buffer.emit(Opcode::STI, Operand::None);
            } else {
                buffer.emit(Opcode::LDI, Operand::None);
                buffer.emit(Opcode::STA, Operand::Symbol(PointerWithOffset::with_offset(*pointer, word)));
            }
        }
        offset += *size as i32;
    }
}

/// Jumps to the address currently in `A` by self-modifying the operand word of the `JMP`
/// immediately below: the only way to express a runtime-computed jump target with a fixed
/// instruction set whose `JMP` operand is otherwise always a compile-time symbol or immediate.
fn emit_indirect_jump(buffer: &mut Buffer) {
    let jump_at = buffer.create_label(None);
    buffer.emit(Opcode::STA, Operand::Symbol(PointerWithOffset::with_offset(jump_at.as_pointer(), 1)));
    buffer.mark(jump_at);
    buffer.emit(Opcode::JMP, Operand::Symbol(PointerWithOffset::new(jump_at.as_pointer())));
}

pub fn default_initial_stack_pointer(stack_slots: u16) -> u16 {
    memory_map::initial_stack_pointer(stack_slots)
}
