//! Shared helpers for the in-crate test suites.

use std::rc::Rc;

use tidescript_ast::{Expr, Program, Stmt};
use tidescript_core::CompileError;

use crate::bytecode::{Chunk, FunctionProto};
use crate::driver::{CompileOutput, Compiler, CompilerConfig};

/// Compile statements as a script with the default (typed, strict)
/// configuration.
pub(crate) fn output_of(stmts: Vec<Stmt>) -> CompileOutput {
    let mut program = Program {
        body: stmts,
        ..Default::default()
    };
    Compiler::new(CompilerConfig::default())
        .compile_program(&mut program)
        .expect("compilation hit a resource limit")
}

/// Compile statements, asserting success, and return the chunk.
#[track_caller]
pub(crate) fn compile_stmts(stmts: Vec<Stmt>) -> Chunk {
    let output = output_of(stmts);
    assert!(
        output.errors.is_empty(),
        "unexpected compile errors: {:?}",
        output.errors
    );
    output.chunk
}

/// Compile statements and return the collected errors.
pub(crate) fn compile_stmts_with_errors(stmts: Vec<Stmt>) -> Vec<CompileError> {
    output_of(stmts).errors
}

/// Compile statements in untyped sloppy mode (no "use strict").
#[track_caller]
pub(crate) fn compile_stmts_sloppy(stmts: Vec<Stmt>) -> Chunk {
    let mut program = Program {
        body: stmts,
        ..Default::default()
    };
    let config = CompilerConfig {
        typed: false,
        ..Default::default()
    };
    let output = Compiler::new(config)
        .compile_program(&mut program)
        .expect("compilation hit a resource limit");
    assert!(
        output.errors.is_empty(),
        "unexpected compile errors: {:?}",
        output.errors
    );
    output.chunk
}

/// Compile a single expression statement.
#[track_caller]
pub(crate) fn compile_expr_chunk(expr: Expr) -> Chunk {
    compile_stmts(vec![Stmt::expr(expr)])
}

/// The first function constant in a chunk.
#[track_caller]
pub(crate) fn first_function(chunk: &Chunk) -> Rc<FunctionProto> {
    chunk
        .constants()
        .functions()
        .next()
        .expect("no function constant in chunk")
        .clone()
}
