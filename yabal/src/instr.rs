//! The instruction buffer: an append-only sequence of symbolic instructions, label
//! marks, and raw data words, plus the symbol table those entries refer to.
//!
//! A root [`Buffer`] and every function-body "child" buffer share one [`SymbolTable`] via
//! `Rc<RefCell<_>>`: a `Pointer` minted by one buffer resolves
//! correctly regardless of which buffer eventually gets linked, because its resolved address
//! lives in the shared table, not in the buffer that created it.

use std::cell::RefCell;
use std::rc::Rc;

use num_derive::{FromPrimitive, ToPrimitive};
use util::{EnumFromStr, InteropGetName, ParseEnumError};
use util_derive::{EnumFromStr, InteropGetName};

use crate::symbols::{Bank, Label, Pointer, PointerWithOffset};

/// The machine's fixed instruction set. `AIN`/`BIN`/`CIN` load a register from a resolved
/// operand; `STA` stores `A` to a resolved address; `LDI`/`STI` dereference the address
/// currently held in `B`, for runtime-computed pointers that a symbolic operand can't express.
#[derive(Clone, Copy, PartialEq, Eq, Debug, ToPrimitive, FromPrimitive, InteropGetName, EnumFromStr)]
pub enum Opcode {
    AIN,
    BIN,
    CIN,
    ADD,
    SUB,
    AND,
    OR,
    NOT,
    SHL,
    SHR,
    SWAP_AB,
    SWAP_AC,
    SWAP_BC,
    SET_BANK,
    JMP,
    JMPZ,
    JMPC,
    STA,
    LDI,
    STI,
    HLT,
}

impl Opcode {
    /// Whether this opcode carries an operand word (or two, in long form) at all.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::AIN
                | Opcode::BIN
                | Opcode::CIN
                | Opcode::STA
                | Opcode::SET_BANK
                | Opcode::JMP
                | Opcode::JMPZ
                | Opcode::JMPC
        )
    }

    pub fn mnemonic(self) -> &'static str {
        std::str::from_utf8(self.interop_name())
            .expect("mnemonic is ASCII")
            .trim_end_matches('\0')
    }
}

/// An instruction's operand, before link-time resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    None,
    /// A literal data value, not a memory reference (e.g. the bank number for `SET_BANK`, or a
    /// constant-folded integer loaded via `AIN`). Known in full at emit time, so the short/long
    /// form split can be (and is) decided immediately.
    Data(i32),
    /// A pointer or label symbol, resolved to `base.address() + offset` at link time. Since the
    /// resolved value isn't known until linking, the emitter conservatively always uses the
    /// long (two-word) form for symbolic operands; the 5-bit short form is only ever reachable
    /// for compile-time-constant immediates (see `Operand::Data`). This never produces a wrong
    /// image, only a marginally larger one than an optimal linker might.
    Symbol(PointerWithOffset),
}

impl From<Pointer> for Operand {
    fn from(p: Pointer) -> Self {
        Operand::Symbol(PointerWithOffset::new(p))
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Operand::Symbol(PointerWithOffset::new(l.as_pointer()))
    }
}

impl From<PointerWithOffset> for Operand {
    fn from(p: PointerWithOffset) -> Self {
        Operand::Symbol(p)
    }
}

/// True if a data immediate fits the 5-bit short form (signed, -16..=15).
fn fits_short(value: i32) -> bool {
    (-16..=15).contains(&value)
}

/// A data word emitted outside of an instruction (string/data pools); may itself need
/// link-time resolution if it names a pointer's resolved address.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawValue {
    Immediate(u16),
    Symbol(PointerWithOffset),
}

impl From<u16> for RawValue {
    fn from(v: u16) -> Self {
        RawValue::Immediate(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Entry {
    Instruction {
        opcode: Opcode,
        operand: Operand,
        comment: Option<String>,
    },
    Raw {
        value: RawValue,
        comment: Option<String>,
    },
}

impl Entry {
    /// Number of 16-bit words this entry expands to. Decidable without consulting the symbol
    /// table (see `Operand::Symbol`'s doc comment).
    pub(crate) fn word_len(&self) -> usize {
        match self {
            Entry::Instruction { operand, .. } => match operand {
                Operand::None => 1,
                Operand::Data(v) if fits_short(*v) => 1,
                Operand::Data(_) => 2,
                Operand::Symbol(_) => 2,
            },
            Entry::Raw { .. } => 1,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PointerInfo {
    pub name: Option<String>,
    pub bank: Bank,
    pub size: usize,
    pub fixed_index: Option<u16>,
    pub assigned_variables: Vec<String>,
    pub is_label: bool,
    pub address: Option<u16>,
}

/// Owns every pointer/label symbol minted by any buffer sharing this table, and their resolved
/// addresses once linking has happened.
#[derive(Default)]
pub struct SymbolTable {
    pub(crate) pointers: Vec<PointerInfo>,
}

pub type SharedSymbols = Rc<RefCell<SymbolTable>>;

impl SymbolTable {
    pub fn shared() -> SharedSymbols {
        Rc::new(RefCell::new(SymbolTable::default()))
    }

    fn push(&mut self, info: PointerInfo) -> Pointer {
        let id = self.pointers.len() as u32;
        self.pointers.push(info);
        Pointer(id)
    }

    pub fn create_pointer(
        &mut self,
        name: Option<String>,
        bank: Bank,
        size: usize,
        fixed_index: Option<u16>,
    ) -> Pointer {
        self.push(PointerInfo {
            name,
            bank,
            size,
            fixed_index,
            assigned_variables: Vec::new(),
            is_label: false,
            address: fixed_index,
        })
    }

    pub fn create_label(&mut self, name: Option<String>) -> Label {
        Label(self.push(PointerInfo {
            name,
            bank: 0,
            size: 1,
            fixed_index: None,
            assigned_variables: Vec::new(),
            is_label: true,
            address: None,
        }))
    }

    pub fn info(&self, pointer: Pointer) -> &PointerInfo {
        &self.pointers[pointer.index()]
    }

    pub fn assign_variable(&mut self, pointer: Pointer, variable: impl Into<String>) {
        self.pointers[pointer.index()]
            .assigned_variables
            .push(variable.into());
    }

    pub fn address_of(&self, pointer: Pointer) -> Option<u16> {
        self.pointers[pointer.index()].address
    }

    pub(crate) fn set_address(&mut self, pointer: Pointer, address: u16) {
        self.pointers[pointer.index()].address = Some(address);
    }

    pub fn bank_of(&self, pointer: Pointer) -> Bank {
        self.pointers[pointer.index()].bank
    }

    pub fn size_of(&self, pointer: Pointer) -> usize {
        self.pointers[pointer.index()].size
    }
}

/// An append-only sequence of instructions/raw words for one contiguous unit of code (the
/// top-level program, one function body, the calling-convention trampoline, or a literal pool).
pub struct Buffer {
    pub(crate) entries: Vec<Entry>,
    pub(crate) marks: Vec<(Pointer, usize)>,
    word_len: usize,
    symbols: SharedSymbols,
}

impl Buffer {
    pub fn new(symbols: SharedSymbols) -> Self {
        Buffer {
            entries: Vec::new(),
            marks: Vec::new(),
            word_len: 0,
            symbols,
        }
    }

    /// A fresh buffer sharing this one's symbol table — used for a function body or literal
    /// pool that will later be spliced into the final image by the linker.
    pub fn child(&self) -> Self {
        Buffer::new(Rc::clone(&self.symbols))
    }

    pub fn symbols(&self) -> &SharedSymbols {
        &self.symbols
    }

    pub fn create_pointer(&self, name: Option<String>, bank: Bank, size: usize) -> Pointer {
        self.symbols
            .borrow_mut()
            .create_pointer(name, bank, size, None)
    }

    pub fn create_label(&self, name: Option<String>) -> Label {
        self.symbols.borrow_mut().create_label(name)
    }

    /// Local word offset the next emitted entry will land at, relative to this buffer's own
    /// start. Resolved to an absolute address once the linker knows this buffer's base offset.
    pub fn position(&self) -> usize {
        self.word_len
    }

    pub fn mark(&mut self, label: Label) {
        self.marks.push((label.as_pointer(), self.word_len));
    }

    pub fn mark_pointer(&mut self, pointer: Pointer) {
        self.marks.push((pointer, self.word_len));
    }

    pub fn emit(&mut self, opcode: Opcode, operand: Operand) {
        self.word_len += Entry::Instruction {
            opcode,
            operand,
            comment: None,
        }
        .word_len();
        self.entries.push(Entry::Instruction {
            opcode,
            operand,
            comment: None,
        });
    }

    pub fn emit_raw(&mut self, value: impl Into<RawValue>, comment: Option<String>) {
        self.word_len += 1;
        self.entries.push(Entry::Raw {
            value: value.into(),
            comment,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mnemonic_round_trips_through_from_str() {
        for opcode in [Opcode::AIN, Opcode::JMPZ, Opcode::SET_BANK, Opcode::HLT] {
            let parsed: Opcode = opcode.mnemonic().parse().unwrap();
            assert_eq!(parsed, opcode);
        }
    }

    #[test]
    fn mnemonic_parsing_is_case_insensitive_when_uppercased_by_the_caller() {
        assert_eq!("add".to_uppercase().parse::<Opcode>().unwrap(), Opcode::ADD);
        assert_eq!("Add".to_uppercase().parse::<Opcode>().unwrap(), Opcode::ADD);
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        assert!("FROB".parse::<Opcode>().is_err());
    }

    #[test]
    fn operand_free_opcodes_take_no_operand() {
        assert!(!Opcode::HLT.has_operand());
        assert!(!Opcode::ADD.has_operand());
        assert!(Opcode::AIN.has_operand());
    }

    #[test]
    fn small_immediate_is_short_form_large_is_long_form() {
        assert_eq!(
            Entry::Instruction {
                opcode: Opcode::AIN,
                operand: Operand::Data(5),
                comment: None,
            }
            .word_len(),
            1
        );
        assert_eq!(
            Entry::Instruction {
                opcode: Opcode::AIN,
                operand: Operand::Data(4095),
                comment: None,
            }
            .word_len(),
            2
        );
    }

    #[test]
    fn symbol_operand_is_always_long_form() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let label = buffer.create_label(None);
        assert_eq!(
            Entry::Instruction {
                opcode: Opcode::JMP,
                operand: label.into(),
                comment: None,
            }
            .word_len(),
            2
        );
    }

    #[test]
    fn mark_records_local_word_offset() {
        let symbols = SymbolTable::shared();
        let mut buffer = Buffer::new(symbols);
        buffer.emit(Opcode::HLT, Operand::None);
        let label = buffer.create_label(None);
        buffer.mark(label);
        assert_eq!(buffer.marks, vec![(label.as_pointer(), 1)]);
    }
}
