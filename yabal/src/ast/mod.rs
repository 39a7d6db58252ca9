//! The Yabal AST: a discriminated union over expression and statement nodes, each
//! carrying a [`SourceRange`]. Expression nodes additionally carry a [`Type`] and an optional
//! folded constant value, both filled in by the `initialize`/`optimize` passes.
//!
//! Modeled as a tagged union with a hand-written match in each of `declare`/`initialize`/
//! `optimize`/`build`, mirroring the `Pair`-driven `match rule { ... }` dispatch style used
//! elsewhere in this codebase for a different grammar (`vasm::instructions`/`vasm::data`).

pub mod expr;
pub mod stmt;

pub use expr::{AsmLine, AsmOperand, BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{AssignOp, Param, Stmt, StmtKind, StructFieldDecl};

use crate::diagnostics::SourceRange;
use crate::symbols::Bank;
use crate::types::Type;

/// A type as written in source, before resolution against the builder's struct table.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    Int,
    Bool,
    Char,
    Void,
    Named(String),
    Reference(Box<TypeName>),
    /// `base[]` (pointer) if `length` is `None`, `base[N]` (fixed array) otherwise.
    Indexed {
        base: Box<TypeName>,
        length: Option<usize>,
        bank: Bank,
    },
}

impl TypeName {
    pub fn resolve(&self, builder: &crate::builder::Builder) -> Result<Type, String> {
        match self {
            TypeName::Int => Ok(Type::Integer),
            TypeName::Bool => Ok(Type::Boolean),
            TypeName::Char => Ok(Type::Char),
            TypeName::Void => Ok(Type::Void),
            TypeName::Named(name) => builder
                .lookup_struct(name)
                .map(Type::Struct)
                .ok_or_else(|| format!("unknown type '{}'", name)),
            TypeName::Reference(inner) => Ok(Type::Reference(Box::new(inner.resolve(builder)?))),
            TypeName::Indexed { base, length, bank } => {
                let base_ty = base.resolve(builder)?;
                Ok(match length {
                    Some(len) => Type::Array(Box::new(base_ty), *len),
                    None => Type::Pointer(Box::new(base_ty), *bank),
                })
            }
        }
    }
}
