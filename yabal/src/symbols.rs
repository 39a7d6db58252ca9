//! Pointer and label symbols: opaque handles resolved to absolute addresses by the linker.
//!
//! A [`Pointer`] and a [`Label`] are cheap, `Copy` handles into the instruction buffer's own
//! symbol table (see [`crate::instr::Buffer`]) rather than owning their resolved address
//! directly — this is what lets emission stay purely local: an instruction can reference
//! a pointer long before that pointer's address is known.

/// A memory bank selector. Bank 0 is program memory; banks `>= 1` are device/auxiliary memory
/// reached only through `SET_BANK`-bracketed loads and stores.
pub type Bank = u8;

/// Opaque handle to a pointer symbol. Resolves to an absolute address once the owning
/// [`crate::instr::Buffer`] has been linked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pointer(pub(crate) u32);

impl Pointer {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pointer symbol that additionally marks a position in the instruction stream (a jump
/// target). Every `Label` is backed by a `Pointer`; the distinction is purely what `mark`s it
/// (an instruction position rather than a data slot).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) Pointer);

impl Label {
    pub fn as_pointer(self) -> Pointer {
        self.0
    }
}

/// A view over a base pointer plus a compile-time-constant word offset. Shares the base
/// pointer's bank and "is this address known yet" locality; resolves to
/// `base.address() + offset` at link time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointerWithOffset {
    pub base: Pointer,
    pub offset: i32,
}

impl PointerWithOffset {
    pub fn new(base: Pointer) -> Self {
        PointerWithOffset { base, offset: 0 }
    }

    pub fn with_offset(base: Pointer, offset: i32) -> Self {
        PointerWithOffset { base, offset }
    }

    pub fn plus(self, delta: i32) -> Self {
        PointerWithOffset {
            base: self.base,
            offset: self.offset + delta,
        }
    }
}

impl From<Pointer> for PointerWithOffset {
    fn from(base: Pointer) -> Self {
        PointerWithOffset::new(base)
    }
}
