//! Core types shared across the tidescript workspace.
//!
//! This crate holds the small vocabulary every other crate speaks:
//!
//! - [`Span`]: source positions for diagnostics and the chunk line table
//! - [`CompileError`] / [`LimitError`] / [`TidescriptError`]: the error
//!   hierarchy (collected user errors vs. fatal resource limits)
//! - [`StaticType`]: the checker's computed-type vocabulary

mod error;
mod span;
mod types;

pub use error::{CompileError, LimitError, TidescriptError};
pub use span::Span;
pub use types::StaticType;
