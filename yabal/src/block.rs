//! Scopes, variables, and the three storage classes a variable can live in.
//!
//! A [`BlockStack`] is a singly-linked chain of name→[`Variable`] maps, one per nested `{ }`
//! scope. Lookup walks outward from the innermost scope to the function's top-level scope (and,
//! for globals, beyond that to the program's top-level scope). Each function owns its own
//! top-level [`BlockStack`]; nothing is shared between functions except through explicit
//! parameters and globals.

use std::collections::HashMap;
use std::rc::Rc;

use crate::instr::Buffer;
use crate::symbols::Pointer;
use crate::types::Type;

/// Which region of memory a variable's home pointer was carved out of. Determines both layout
/// order in the data region and whether the storage is reused once the variable goes out of
/// scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    Global,
    /// A local living in the function's stack frame; spilled/restored by the `__call`/`__return`
    /// trampoline if the function (transitively) calls another function.
    Stack,
    /// A reusable scratch slot, checked back in to its [`PointerCollection`] once the expression
    /// or statement that needed it finishes building.
    Temporary,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub home: Pointer,
    pub ty: Type,
    pub storage: StorageClass,
    /// Set for `const` declarations whose initializer was a compile-time constant; such a
    /// variable never occupies a runtime storage slot; reads are folded to the literal directly.
    pub constant_value: Option<i32>,
    /// True from declaration until the first assignment. Cleared by any
    /// `declare`/`initialize`-phase assignment, even one that doesn't change `constant_value`.
    pub is_constant: bool,
    /// Number of expression-level reads seen during `initialize`. A function-local variable
    /// with zero usages at `build` time may be elided.
    pub usages: u32,
}

impl Variable {
    pub fn is_foldable(&self) -> bool {
        self.is_constant && self.constant_value.is_some()
    }

    pub fn mark_used(&mut self) {
        self.usages += 1;
    }

    /// Clears the `Constant` flag on assignment.
    pub fn mark_assigned(&mut self) {
        self.is_constant = false;
        self.constant_value = None;
    }
}

/// A pool of same-sized pointers available for reuse as temporaries. `reusable` holds pointers
/// that are currently checked in (free); `next_index` is the high-water mark used when nothing
/// reusable of the right size is available yet — the trampoline only needs to spill slots up to
/// the high-water mark, not the pool's total capacity.
#[derive(Default)]
pub struct PointerCollection {
    by_size: HashMap<usize, Vec<Pointer>>,
    high_water_mark: usize,
    /// Every pointer this collection has ever minted, in minting order, together with its word
    /// size — the order the linker lays this collection's region out in.
    all: Vec<(Pointer, usize)>,
}

impl PointerCollection {
    pub fn new() -> Self {
        PointerCollection::default()
    }

    /// Checks out a pointer of the given size, minting a fresh one via `buffer` only if nothing
    /// of that size is currently free.
    pub fn get_next(&mut self, buffer: &Buffer, bank: crate::symbols::Bank, size: usize) -> Pointer {
        if let Some(pointer) = self.by_size.get_mut(&size).and_then(Vec::pop) {
            return pointer;
        }
        self.high_water_mark += size;
        let pointer = buffer.create_pointer(None, bank, size);
        self.all.push((pointer, size));
        pointer
    }

    /// Every pointer minted by this collection, in minting order — the linker's layout order.
    pub fn all(&self) -> &[(Pointer, usize)] {
        &self.all
    }

    /// Returns a pointer to the pool for later reuse by a same-sized temporary.
    pub fn release(&mut self, pointer: Pointer, size: usize) {
        self.by_size.entry(size).or_default().push(pointer);
    }

    /// Word count the trampoline must be prepared to spill: the largest this collection has
    /// grown, not its current (possibly smaller, due to releases) live set.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }
}

/// RAII handle that checks a temporary pointer back in to its [`PointerCollection`] when a
/// subexpression or statement that needed scratch space finishes building. Holds an
/// `Rc<RefCell<..>>` to the owning collection so nested temporaries (one expression's temporary
/// outliving a sub-expression's) can each release independently.
pub struct TemporaryGuard {
    collection: Rc<std::cell::RefCell<PointerCollection>>,
    pointer: Pointer,
    size: usize,
}

impl TemporaryGuard {
    pub fn new(
        collection: Rc<std::cell::RefCell<PointerCollection>>,
        pointer: Pointer,
        size: usize,
    ) -> Self {
        TemporaryGuard {
            collection,
            pointer,
            size,
        }
    }

    pub fn pointer(&self) -> Pointer {
        self.pointer
    }
}

impl Drop for TemporaryGuard {
    fn drop(&mut self) {
        self.collection.borrow_mut().release(self.pointer, self.size);
    }
}

/// One nested scope's name→variable map, linked to its parent. The outermost `BlockStack` in a
/// function is that function's top-level scope; `is_global` marks the single program-level
/// instance that holds global variables and is visible from every function.
pub struct BlockStack {
    parent: Option<Box<BlockStack>>,
    variables: HashMap<String, Variable>,
    is_global: bool,
}

impl BlockStack {
    pub fn new_global() -> Self {
        BlockStack {
            parent: None,
            variables: HashMap::new(),
            is_global: true,
        }
    }

    pub fn new_function_root() -> Self {
        BlockStack {
            parent: None,
            variables: HashMap::new(),
            is_global: false,
        }
    }

    /// Pushes a nested `{ }` scope, taking ownership of `self` as its parent. Pop by calling
    /// [`BlockStack::pop`] on the returned stack once the scope's statements are all built.
    pub fn push(self) -> Self {
        BlockStack {
            parent: Some(Box::new(self)),
            variables: HashMap::new(),
            is_global: false,
        }
    }

    /// Discards this scope's own variables and returns its parent. Panics if called on a
    /// function's or the program's root scope — callers only push/pop scopes they themselves
    /// pushed.
    pub fn pop(self) -> Self {
        *self.parent.expect("popped the root scope")
    }

    pub fn declare(&mut self, variable: Variable) -> Result<(), String> {
        if self.variables.contains_key(&variable.name) {
            return Err(format!("'{}' is already declared in this scope", variable.name));
        }
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        if let Some(variable) = self.variables.get(name) {
            return Some(variable);
        }
        self.parent.as_deref().and_then(|parent| parent.lookup(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Variable> {
        if self.variables.contains_key(name) {
            return self.variables.get_mut(name);
        }
        self.parent.as_deref_mut().and_then(|parent| parent.lookup_mut(name))
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instr::SymbolTable;

    fn variable(name: &str, home: Pointer) -> Variable {
        Variable {
            name: name.to_owned(),
            home,
            ty: Type::Integer,
            storage: StorageClass::Stack,
            constant_value: None,
            is_constant: false,
            usages: 0,
        }
    }

    #[test]
    fn lookup_finds_variable_declared_in_enclosing_scope() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let pointer = buffer.create_pointer(None, 0, 1);
        let mut root = BlockStack::new_function_root();
        root.declare(variable("x", pointer)).unwrap();
        let inner = root.push();
        assert_eq!(inner.lookup("x").unwrap().name, "x");
    }

    #[test]
    fn redeclaring_in_the_same_scope_is_an_error() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let pointer = buffer.create_pointer(None, 0, 1);
        let mut root = BlockStack::new_function_root();
        root.declare(variable("x", pointer)).unwrap();
        assert!(root.declare(variable("x", pointer)).is_err());
    }

    #[test]
    fn pointer_collection_reuses_released_slots() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let mut pool = PointerCollection::new();
        let a = pool.get_next(&buffer, 0, 1);
        pool.release(a, 1);
        let b = pool.get_next(&buffer, 0, 1);
        assert_eq!(a, b);
        assert_eq!(pool.high_water_mark(), 1);
    }

    #[test]
    fn pointer_collection_high_water_mark_ignores_releases() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let mut pool = PointerCollection::new();
        let a = pool.get_next(&buffer, 0, 1);
        let _b = pool.get_next(&buffer, 0, 1);
        pool.release(a, 1);
        assert_eq!(pool.high_water_mark(), 2);
    }
}
