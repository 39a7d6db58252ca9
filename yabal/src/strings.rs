//! String and embedded-binary-file literal pools.
//!
//! Both tables deduplicate by value: two occurrences of the same string literal, or two
//! `embed_file` references to the same path, share one pointer and one copy of the data in the
//! final image.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::char_table;
use crate::instr::Buffer;
use crate::symbols::Pointer;

/// String literals, rendered as one character code per word (via
/// [`char_table::char_code`]), terminated by a `0` word.
#[derive(Default)]
pub struct StringTable {
    entries: HashMap<String, Pointer>,
}

impl StringTable {
    pub fn new() -> Self {
        StringTable::default()
    }

    /// Interns `value`, minting a pointer (and reserving space in `buffer`) only the first time
    /// this exact string is seen.
    pub fn intern(&mut self, buffer: &Buffer, value: &str) -> Result<Pointer, char> {
        if let Some(pointer) = self.entries.get(value) {
            return Ok(*pointer);
        }
        let codes: Result<Vec<u8>, char> = value
            .chars()
            .map(|c| char_table::char_code(c).ok_or(c))
            .collect();
        let codes = codes?;
        let pointer = buffer.create_pointer(None, 0, codes.len() + 1);
        self.entries.insert(value.to_owned(), pointer);
        Ok(pointer)
    }

    /// Appends every interned string's words (in first-interned order) to `pool`, marking each
    /// string's pointer at its position.
    pub fn emit(&self, pool: &mut Buffer) {
        let mut ordered: Vec<(&String, &Pointer)> = self.entries.iter().collect();
        ordered.sort_by_key(|(_, pointer)| pointer.index());
        for (value, pointer) in ordered {
            pool.mark_pointer(*pointer);
            for c in value.chars() {
                let code = char_table::char_code(c).expect("interned with a valid char table entry");
                pool.emit_raw(code as u16, None);
            }
            pool.emit_raw(0u16, None);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A binary file embedded verbatim, keyed by the path it was read from so
/// repeat references share one copy.
#[derive(Default)]
pub struct BinaryFileTable {
    entries: HashMap<PathBuf, (Pointer, Vec<u8>)>,
    order: Vec<PathBuf>,
}

impl BinaryFileTable {
    pub fn new() -> Self {
        BinaryFileTable::default()
    }

    pub fn embed(&mut self, buffer: &Buffer, path: &Path) -> std::io::Result<Pointer> {
        let canonical = path.to_path_buf();
        if let Some((pointer, _)) = self.entries.get(&canonical) {
            return Ok(*pointer);
        }
        let bytes = fs::read(path)?;
        // Every byte becomes its own word; an odd-length file's final byte occupies a full word.
        let pointer = buffer.create_pointer(None, 0, bytes.len());
        self.entries.insert(canonical.clone(), (pointer, bytes));
        self.order.push(canonical);
        Ok(pointer)
    }

    pub fn emit(&self, pool: &mut Buffer) {
        for path in &self.order {
            let (pointer, bytes) = &self.entries[path];
            pool.mark_pointer(*pointer);
            for byte in bytes {
                pool.emit_raw(*byte as u16, None);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instr::SymbolTable;

    #[test]
    fn interning_the_same_string_twice_returns_the_same_pointer() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let mut table = StringTable::new();
        let a = table.intern(&buffer, "hi").unwrap();
        let b = table.intern(&buffer, "hi").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_get_distinct_pointers() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let mut table = StringTable::new();
        let a = table.intern(&buffer, "hi").unwrap();
        let b = table.intern(&buffer, "bye").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unmappable_character_is_rejected() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols);
        let mut table = StringTable::new();
        assert!(table.intern(&buffer, "caf\u{e9}").is_err());
    }

    #[test]
    fn string_emission_is_terminated_by_zero() {
        let symbols = SymbolTable::shared();
        let buffer = Buffer::new(symbols.clone());
        let mut table = StringTable::new();
        table.intern(&buffer, "hi").unwrap();
        let mut pool = buffer.child();
        table.emit(&mut pool);
        assert_eq!(pool.entries.len(), 3); // 'h', 'i', terminator
    }
}
