//! Tidescript: a TypeScript-flavored scripting language toolchain.
//!
//! This facade crate re-exports the public surface of the workspace:
//! the AST contract ([`ast`]), the shared core types, and the bytecode
//! compiler. The typical entry point is [`compile`]:
//!
//! ```
//! use tidescript::ast::{Expr, Program, Stmt};
//! use tidescript_core::Span;
//!
//! let span = Span::new(1, 1, 1);
//! let mut program = Program {
//!     body: vec![Stmt::expr(Expr::number(42.0, span))],
//!     ..Default::default()
//! };
//! let output = tidescript::compile(&mut program).unwrap();
//! assert!(output.is_success());
//! ```

pub use tidescript_ast as ast;
pub use tidescript_compiler::{
    Checker, CompileOutput, Compiler, CompilerConfig, GlobalRegistry, bytecode, modules,
};
pub use tidescript_core::{CompileError, LimitError, Span, StaticType, TidescriptError};

use tidescript_ast::Program;

/// Compile a program with the default configuration.
///
/// User errors come back in the [`CompileOutput`]; resource-limit errors
/// abort with `Err`.
pub fn compile(program: &mut Program) -> Result<CompileOutput, LimitError> {
    Compiler::new(CompilerConfig::default()).compile_program(program)
}

/// Compile a program with an explicit configuration.
pub fn compile_with(
    program: &mut Program,
    config: CompilerConfig,
) -> Result<CompileOutput, LimitError> {
    Compiler::new(config).compile_program(program)
}
