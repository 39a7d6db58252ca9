//! Single-pass address resolution and final-image rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::diagnostics::{DiagnosticSink, SourceRange};
use crate::instr::{Buffer, Entry, Operand, RawValue, SharedSymbols};
use crate::symbols::{Label, Pointer, PointerWithOffset};

#[derive(Debug)]
pub struct LinkError {
    pub message: String,
}

/// One function body, keyed by its entry label, laid out in the header only if it was actually
/// called at least once.
pub struct LinkedFunction {
    pub entry: Label,
    pub body: Buffer,
}

/// Everything the linker needs to assemble one contiguous image, already split into the
/// sections it lays out in order.
pub struct LinkInput {
    /// Globals, then top-level temporaries, then stack slots: the data region, in layout order.
    /// Each entry is a pointer together with its word size.
    pub data_region: Vec<(Pointer, usize)>,
    pub functions: Vec<LinkedFunction>,
    pub trampoline: Option<Buffer>,
    pub program_start: Label,
    pub main: Buffer,
    pub strings: Buffer,
    pub binaries: Buffer,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolvedOperand {
    None,
    Data(i32),
    Address(u16),
}

pub enum RenderedEntry {
    Instruction {
        address: u16,
        opcode: crate::instr::Opcode,
        operand: ResolvedOperand,
        comment: Option<String>,
    },
    Raw {
        address: u16,
        value: u16,
        comment: Option<String>,
    },
}

pub struct LinkOutput {
    pub words: Vec<u16>,
    pub rendered: Vec<RenderedEntry>,
    pub addresses: HashMap<Pointer, u16>,
}

/// A running cursor over the final word array, shared by every section-appending step below.
struct Layout<'a> {
    symbols: &'a SharedSymbols,
    words: Vec<u16>,
    rendered: Vec<RenderedEntry>,
}

impl<'a> Layout<'a> {
    fn base(&self) -> usize {
        self.words.len()
    }

    fn splice(&mut self, buffer: Buffer) {
        let base = self.base();
        for (pointer, local_offset) in &buffer.marks {
            self.symbols
                .borrow_mut()
                .set_address(*pointer, (base + local_offset) as u16);
        }
        for entry in buffer.entries {
            let address = self.words.len() as u16;
            match entry {
                Entry::Instruction {
                    opcode,
                    operand,
                    comment,
                } => match operand {
                    Operand::None => {
                        self.words.push(encode_short(opcode, 0));
                        self.rendered.push(RenderedEntry::Instruction {
                            address,
                            opcode,
                            operand: ResolvedOperand::None,
                            comment,
                        });
                    }
                    Operand::Data(value) if fits_short(value) => {
                        self.words.push(encode_short(opcode, value as i16 as u16));
                        self.rendered.push(RenderedEntry::Instruction {
                            address,
                            opcode,
                            operand: ResolvedOperand::Data(value),
                            comment,
                        });
                    }
                    Operand::Data(value) => {
                        self.words.push(encode_long(opcode));
                        self.words.push(value as i16 as u16);
                        self.rendered.push(RenderedEntry::Instruction {
                            address,
                            opcode,
                            operand: ResolvedOperand::Data(value),
                            comment,
                        });
                    }
                    Operand::Symbol(ptr) => {
                        let resolved = self.resolve(ptr);
                        self.words.push(encode_long(opcode));
                        self.words.push(resolved);
                        self.rendered.push(RenderedEntry::Instruction {
                            address,
                            opcode,
                            operand: ResolvedOperand::Address(resolved),
                            comment,
                        });
                    }
                },
                Entry::Raw { value, comment } => {
                    let resolved = match value {
                        RawValue::Immediate(v) => v,
                        RawValue::Symbol(ptr) => self.resolve(ptr),
                    };
                    self.words.push(resolved);
                    self.rendered.push(RenderedEntry::Raw {
                        address,
                        value: resolved,
                        comment,
                    });
                }
            }
        }
    }

    fn resolve(&self, ptr: PointerWithOffset) -> u16 {
        let address = self
            .symbols
            .borrow()
            .address_of(ptr.base)
            .expect("pointer referenced by an emitted entry was never marked or laid out");
        (address as i32 + ptr.offset) as u16
    }
}

fn fits_short(value: i32) -> bool {
    (-16..=15).contains(&value)
}

const OPCODE_SHIFT: u16 = 11;
const LONG_FORM_BIT: u16 = 1 << 10;
const SHORT_DATA_MASK: u16 = 0x1F;

fn encode_short(opcode: crate::instr::Opcode, data: u16) -> u16 {
    use num_traits::ToPrimitive;
    ((opcode.to_u16().unwrap()) << OPCODE_SHIFT) | (data & SHORT_DATA_MASK)
}

fn encode_long(opcode: crate::instr::Opcode) -> u16 {
    use num_traits::ToPrimitive;
    ((opcode.to_u16().unwrap()) << OPCODE_SHIFT) | LONG_FORM_BIT
}

/// Runs the linker: lays out the data region, then used function bodies, then the
/// calling-convention trampoline, then user code, then the literal pools, resolving every
/// symbolic operand along the way.
pub fn link(
    symbols: &SharedSymbols,
    input: LinkInput,
    offset: u32,
    diagnostics: &mut DiagnosticSink,
) -> Result<LinkOutput, LinkError> {
    let needs_header = !input.data_region.is_empty()
        || !input.functions.is_empty()
        || input.trampoline.is_some();

    let mut layout = Layout {
        symbols,
        words: Vec::new(),
        rendered: Vec::new(),
    };

    if offset > 0 {
        layout.words.resize(offset as usize, 0);
    }

    // step 1: reserve two words (long-form `JMP`) for a jump to the program start. Always
    // long form since `main_base` essentially never fits the 5-bit short-form range.
    let header_jump_slot: Option<usize> = if needs_header {
        let slot = layout.words.len();
        layout.words.push(0);
        layout.words.push(0);
        layout.rendered.push(RenderedEntry::Instruction {
            address: slot as u16,
            opcode: crate::instr::Opcode::JMP,
            operand: ResolvedOperand::Address(0),
            comment: Some("jump to program start".to_owned()),
        });
        Some(slot)
    } else {
        None
    };

    // step 2a: data region (globals, then temporaries, then stack slots).
    if !input.data_region.is_empty() {
        let region_start = layout.words.len() as u16;
        for (pointer, size) in &input.data_region {
            let address = layout.words.len() as u16;
            symbols.borrow_mut().set_address(*pointer, address);
            for _ in 0..*size {
                layout.words.push(0);
            }
        }
        let region_size: usize = input.data_region.iter().map(|(_, s)| s).sum();
        layout.rendered.push(RenderedEntry::Raw {
            address: region_start,
            value: 0,
            comment: Some(format!("data region: {} word(s)", region_size)),
        });
    }

    // step 2b: used function bodies.
    for function in input.functions {
        let base = layout.base();
        symbols.borrow_mut().set_address(function.entry.as_pointer(), base as u16);
        layout.splice(function.body);
    }

    // step 2c: the shared __call/__return trampoline, only if any call was ever emitted.
    if let Some(trampoline) = input.trampoline {
        layout.splice(trampoline);
    }

    // step 3: user code. `program_start` is what the header jump (if any) targets.
    let main_base = layout.base();
    symbols
        .borrow_mut()
        .set_address(input.program_start.as_pointer(), main_base as u16);
    layout.splice(input.main);

    if let Some(slot) = header_jump_slot {
        layout.words[slot] = encode_long(crate::instr::Opcode::JMP);
        layout.words[slot + 1] = main_base as u16;
        if let Some(RenderedEntry::Instruction { operand, .. }) = layout.rendered.get_mut(0) {
            *operand = ResolvedOperand::Address(main_base as u16);
        }
    }

    // step 4: literal pools, strings then binary files.
    layout.splice(input.strings);
    layout.splice(input.binaries);

    // step 5: verify every symbol referenced actually got an address.
    for pointer in &symbols.borrow().pointers {
        if pointer.address.is_none() && !pointer.assigned_variables.is_empty() {
            diagnostics.error(
                SourceRange::default(),
                format!(
                    "internal error: pointer {:?} was never resolved",
                    pointer.name
                ),
            );
        }
    }

    let mut addresses = HashMap::new();
    for (index, info) in symbols.borrow().pointers.iter().enumerate() {
        if let Some(address) = info.address {
            addresses.insert(Pointer(index as u32), address);
        }
    }

    Ok(LinkOutput {
        words: layout.words,
        rendered: layout.rendered,
        addresses,
    })
}

/// Renders the final image as one mnemonic (and, with `with_comments`, a trailing `; comment`)
/// per line — the `asm`/`asmc` output formats.
pub fn render_assembly(output: &LinkOutput, with_comments: bool) -> String {
    let mut text = String::new();
    for entry in &output.rendered {
        match entry {
            RenderedEntry::Instruction {
                opcode,
                operand,
                comment,
                ..
            } => {
                write!(text, "{}", opcode.mnemonic()).unwrap();
                match operand {
                    ResolvedOperand::None => {}
                    ResolvedOperand::Data(v) => write!(text, " {}", v).unwrap(),
                    ResolvedOperand::Address(a) => write!(text, " {}", a).unwrap(),
                }
                if with_comments {
                    if let Some(comment) = comment {
                        write!(text, " ; {}", comment).unwrap();
                    }
                }
                writeln!(text).unwrap();
            }
            RenderedEntry::Raw { value, comment, .. } => {
                write!(text, ".word {}", value).unwrap();
                if with_comments {
                    if let Some(comment) = comment {
                        write!(text, " ; {}", comment).unwrap();
                    }
                }
                writeln!(text).unwrap();
            }
        }
    }
    text
}

/// The `aexe` output format: a flat sequence of 16-bit words as four-digit hex, one per line.
pub fn render_aexe(output: &LinkOutput) -> String {
    let mut text = String::new();
    for word in &output.words {
        writeln!(text, "{:04X}", word).unwrap();
    }
    text
}

/// The `hex` output format: a Logisim v2.0 raw memory image, with runs of four or more
/// identical words run-length compressed as `count*value`, optionally zero-padded to
/// `min_size` words.
pub fn render_logisim(output: &LinkOutput, min_size: Option<usize>) -> String {
    let mut words = output.words.clone();
    if let Some(min_size) = min_size {
        if words.len() < min_size {
            words.resize(min_size, 0);
        }
    }

    let mut text = String::from("v2.0 raw\n");
    let mut i = 0;
    while i < words.len() {
        let value = words[i];
        let mut run = 1;
        while i + run < words.len() && words[i + run] == value {
            run += 1;
        }
        if run >= 4 {
            write!(text, "{}*{:x} ", run, value).unwrap();
        } else {
            for _ in 0..run {
                write!(text, "{:x} ", value).unwrap();
            }
        }
        i += run;
    }
    text.push('\n');
    text
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instr::{Opcode, SymbolTable};

    #[test]
    fn empty_program_with_no_header_starts_at_zero() {
        let symbols = SymbolTable::shared();
        let main = Buffer::new(symbols.clone());
        let program_start = main.create_label(None);
        let mut diagnostics = DiagnosticSink::new();
        let output = link(
            &symbols,
            LinkInput {
                data_region: Vec::new(),
                functions: Vec::new(),
                trampoline: None,
                program_start,
                main,
                strings: Buffer::new(symbols.clone()),
                binaries: Buffer::new(symbols.clone()),
            },
            0,
            &mut diagnostics,
        )
        .unwrap();
        assert!(output.words.is_empty());
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn data_region_pointers_get_sequential_addresses() {
        let symbols = SymbolTable::shared();
        let a = symbols.borrow_mut().create_pointer(Some("a".into()), 0, 1, None);
        let b = symbols.borrow_mut().create_pointer(Some("b".into()), 0, 2, None);
        let main = Buffer::new(symbols.clone());
        let program_start = main.create_label(None);
        let mut diagnostics = DiagnosticSink::new();
        let output = link(
            &symbols,
            LinkInput {
                data_region: vec![(a, 1), (b, 2)],
                functions: Vec::new(),
                trampoline: None,
                program_start,
                main,
                strings: Buffer::new(symbols.clone()),
                binaries: Buffer::new(symbols.clone()),
            },
            0,
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(output.addresses[&a], 2); // slots 0-1 are the header jump
        assert_eq!(output.addresses[&b], 3);
    }

    #[test]
    fn asm_rendering_includes_mnemonics() {
        let symbols = SymbolTable::shared();
        let mut main = Buffer::new(symbols.clone());
        let program_start = main.create_label(None);
        main.mark(program_start);
        main.emit(Opcode::HLT, Operand::None);
        let mut diagnostics = DiagnosticSink::new();
        let output = link(
            &symbols,
            LinkInput {
                data_region: Vec::new(),
                functions: Vec::new(),
                trampoline: None,
                program_start,
                main,
                strings: Buffer::new(symbols.clone()),
                binaries: Buffer::new(symbols.clone()),
            },
            0,
            &mut diagnostics,
        )
        .unwrap();
        let text = render_assembly(&output, false);
        assert!(text.contains("HLT"));
    }
}
