//! The Yabal type system.

use std::fmt;
use std::rc::Rc;

use crate::symbols::Bank;

/// A bit-field descriptor: the member occupies `size` bits starting at bit `offset` within its
/// host word. Several bit-fields may share one host word; the host word only counts once
/// towards the struct's size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    pub offset: u8,
    pub size: u8,
}

impl BitField {
    /// `(value & mask) << offset`, ready to be OR'd into a host word.
    pub fn mask(&self) -> u16 {
        let span = if self.size >= 16 {
            u16::MAX
        } else {
            (1u16 << self.size) - 1
        };
        span << self.offset
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    /// Word offset from the start of the struct.
    pub offset: usize,
    pub ty: Type,
    pub bit_field: Option<BitField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Size in words. A field with a `bit_field` contributes exactly one word (its host word),
    /// regardless of how many sibling bit-fields share that same offset.
    pub fn size_words(&self) -> usize {
        self.fields
            .iter()
            .map(|f| {
                f.offset
                    + if f.bit_field.is_some() {
                        1
                    } else {
                        f.ty.size_words()
                    }
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Integer,
    Boolean,
    Char,
    Void,
    /// Type could not be determined; only ever produced alongside an error diagnostic.
    Unknown,
    Pointer(Box<Type>, Bank),
    Reference(Box<Type>),
    Array(Box<Type>, usize),
    Struct(Rc<StructDef>),
}

impl Type {
    /// Size in 16-bit words. Pointers and references are two words: address followed by bank.
    pub fn size_words(&self) -> usize {
        match self {
            Type::Integer | Type::Boolean | Type::Char => 1,
            Type::Void | Type::Unknown => 0,
            Type::Pointer(_, _) | Type::Reference(_) => 2,
            Type::Array(element, length) => element.size_words() * length,
            Type::Struct(def) => def.size_words(),
        }
    }

    pub fn is_integer_like(&self) -> bool {
        matches!(self, Type::Integer | Type::Boolean | Type::Char)
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(element, _) => Some(element),
            Type::Array(element, _) => Some(element),
            _ => None,
        }
    }

    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (a, b) if a.is_integer_like() && b.is_integer_like() => true,
            (Type::Reference(inner), other) => inner.is_assignable_from(other),
            (this, Type::Reference(inner)) => this.is_assignable_from(inner),
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "int"),
            Type::Boolean => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Void => write!(f, "void"),
            Type::Unknown => write!(f, "<unknown>"),
            Type::Pointer(element, bank) if *bank == 0 => write!(f, "{}[]", element),
            Type::Pointer(element, bank) => write!(f, "{}[]@{}", element, bank),
            Type::Reference(inner) => write!(f, "ref {}", inner),
            Type::Array(element, length) => write!(f, "{}[{}]", element, length),
            Type::Struct(def) => write!(f, "{}", def.name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pointer_is_two_words() {
        assert_eq!(Type::Pointer(Box::new(Type::Integer), 0).size_words(), 2);
    }

    #[test]
    fn array_size_is_element_size_times_length() {
        let ty = Type::Array(Box::new(Type::Integer), 4);
        assert_eq!(ty.size_words(), 4);
    }

    #[test]
    fn struct_size_counts_bitfield_host_word_once() {
        let def = StructDef {
            name: "Flags".to_owned(),
            fields: vec![
                StructField {
                    name: "a".to_owned(),
                    offset: 0,
                    ty: Type::Integer,
                    bit_field: Some(BitField { offset: 0, size: 4 }),
                },
                StructField {
                    name: "b".to_owned(),
                    offset: 0,
                    ty: Type::Integer,
                    bit_field: Some(BitField { offset: 4, size: 4 }),
                },
                StructField {
                    name: "c".to_owned(),
                    offset: 1,
                    ty: Type::Integer,
                    bit_field: None,
                },
            ],
        };
        assert_eq!(def.size_words(), 2);
    }

    #[test]
    fn bitfield_mask_is_shifted_into_place() {
        let bf = BitField { offset: 4, size: 4 };
        assert_eq!(bf.mask(), 0b1111_0000);
    }
}
