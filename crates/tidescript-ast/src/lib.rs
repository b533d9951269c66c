//! AST node taxonomy for the tidescript compiler.
//!
//! The lexer and parser are external collaborators; this crate is their
//! output contract. Nodes form a closed set of tagged variants - statement,
//! expression and pattern enums - each carrying a [`Span`] and, where the
//! checker annotates them, a computed [`StaticType`].
//!
//! [`Span`]: tidescript_core::Span
//! [`StaticType`]: tidescript_core::StaticType

mod ast;

pub use ast::*;
