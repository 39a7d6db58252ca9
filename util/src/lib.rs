use std::{error::Error, fmt};

/// Byte order used throughout the toolchain's binary and textual output formats.
pub type Endian = byteorder::LittleEndian;

/// Gives an enum variant a stable, NUL-terminated textual name, independent of `Debug`.
///
/// Used to recover the mnemonic of an `Opcode` or a register identifier when rendering
/// assembly text.
pub trait InteropGetName {
    fn interop_name(&self) -> &'static [u8];
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Failed to parse \"{}\" as {}.",
            &self.value, &self.enum_name
        )
    }
}

impl Error for ParseEnumError {}

/// Parses a bare identifier (no `$`/`@` sigil, case already normalized by the caller) into an
/// enum variant. Implemented by `#[derive(EnumFromStr)]`.
pub trait EnumFromStr: Sized {
    fn from_str(s: &str) -> Result<Self, ParseEnumError>;
}
