//! Try/catch/finally compilation.
//!
//! ## Bytecode layout (catch only)
//!
//! ```text
//! try_start:
//!   [try body]
//!   Jump -> after          ; skip the handler
//! try_end:                 ; exclusive, covers the jump above
//! handler:
//!   [catch body]           ; exception value in catch_reg
//! after:
//! ```
//!
//! One exception-table row `(try_start, try_end, handler, catch_reg,
//! is_catch)` covers every opcode of the try body *including* the trailing
//! skip jump, so a call whose return pc lands on that jump is still
//! covered.
//!
//! ## Finally
//!
//! A finally block has three kinds of entry, distinguished by the action
//! register:
//!
//! - normal completion of the try (or catch) body: action 0
//! - the exception path via an `is_finally` table row: the VM stashes the
//!   exception in the value register, a prelude sets action 1
//! - routed non-local exits (`break`/`continue`/`return` crossing the
//!   try): the exit site stores its action code and jumps straight to the
//!   finally body
//!
//! The epilogue dispatches on the action register: rethrow, perform the
//! routed exit (re-entering the non-local-exit protocol, so outer
//! finallys chain), or fall through on normal completion.

use tidescript_ast::{CatchClause, Pattern, Stmt};
use tidescript_core::LimitError;

use crate::bytecode::{Constant, ExceptionEntry, OpCode, Register};
use crate::driver::Compiler;
use crate::emit::{ACTION_NORMAL, ACTION_RETHROW, ExitKind, FinallyContext};
use crate::expr::destructure::PatternBind;
use crate::scope::{ScopeKind, Symbol};

impl<'h> Compiler<'h> {
    pub(crate) fn compile_try(&mut self, stmt: &Stmt) -> Result<(), LimitError> {
        let Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } = stmt
        else {
            unreachable!("compile_try on non-try");
        };

        match (handler, finalizer) {
            (Some(handler), None) => self.compile_try_catch(block, handler),
            (handler, Some(finalizer)) => {
                self.compile_try_finally(block, handler.as_ref(), finalizer)
            }
            (None, None) => self.compile_block(block),
        }
    }

    fn compile_try_catch(
        &mut self,
        block: &[Stmt],
        handler: &CatchClause,
    ) -> Result<(), LimitError> {
        let try_start = self.chunk().current_offset();
        self.compile_block(block)?;
        let skip_handler = self.emit_jump(OpCode::Jump, None);
        let try_end = self.chunk().current_offset();

        let handler_pc = self.chunk().current_offset();
        let catch_reg = self.compile_catch_body(handler)?;
        self.patch_jump(skip_handler)?;

        self.chunk_mut()
            .add_exception(ExceptionEntry::catch(try_start, try_end, handler_pc, catch_reg));
        Ok(())
    }

    /// Compile a catch clause's scope and body; returns the register the
    /// VM must write the exception value into.
    fn compile_catch_body(&mut self, handler: &CatchClause) -> Result<Register, LimitError> {
        // The catch register backs the binding for the whole clause (and
        // any closure that captures it), so it stays pinned.
        let catch_reg = self.alloc_reg()?;
        self.pin_reg(catch_reg);

        self.table.push(ScopeKind::Block);
        match &handler.param {
            Some(Pattern::Ident { name, span }) => {
                let symbol = Symbol::register(name.clone(), catch_reg, *span);
                if let Err(err) = self.table.declare(symbol) {
                    self.error(err);
                }
            }
            Some(pattern) => {
                self.bind_pattern(pattern, catch_reg, PatternBind::Declare)?;
            }
            None => {}
        }
        self.hoist_statements(&handler.body, false)?;
        for stmt in &handler.body {
            self.compile_stmt(stmt)?;
        }
        self.table.pop();
        Ok(catch_reg)
    }

    fn compile_try_finally(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: &[Stmt],
    ) -> Result<(), LimitError> {
        // Routing registers live for the whole statement.
        let action_reg = self.alloc_reg()?;
        self.pin_reg(action_reg);
        let value_reg = self.alloc_reg()?;
        self.pin_reg(value_reg);
        self.emit_load_const(action_reg, Constant::Number(f64::from(ACTION_NORMAL)))?;

        self.frame_mut().flow.enter_finally(action_reg, value_reg);

        let try_start = self.chunk().current_offset();
        let mut to_normal_entry = Vec::new();

        self.compile_block(block)?;
        to_normal_entry.push(self.emit_jump(OpCode::Jump, None));
        let try_end = self.chunk().current_offset();

        if let Some(handler) = handler {
            let handler_pc = self.chunk().current_offset();
            let catch_reg = self.compile_catch_body(handler)?;
            to_normal_entry.push(self.emit_jump(OpCode::Jump, None));
            self.chunk_mut().add_exception(ExceptionEntry::catch(
                try_start, try_end, handler_pc, catch_reg,
            ));
        }

        // Exception path: the finally row sends uncaught exceptions (and
        // exceptions thrown by the catch body) here with the value already
        // stashed in value_reg.
        let finally_handler_pc = self.chunk().current_offset();
        self.emit_load_const(action_reg, Constant::Number(f64::from(ACTION_RETHROW)))?;
        let to_body = self.emit_jump(OpCode::Jump, None);

        // Normal completion path.
        for jump in to_normal_entry {
            self.patch_jump(jump)?;
        }
        self.emit_load_const(action_reg, Constant::Number(f64::from(ACTION_NORMAL)))?;

        // Finally body: routed exits land here with their action set.
        let finally_body = self.chunk().current_offset();
        self.patch_jump_to(to_body, finally_body)?;
        let context = self.frame_mut().flow.exit_finally();
        for jump in &context.route_jumps {
            self.patch_jump_to(*jump, finally_body)?;
        }
        self.chunk_mut().add_exception(ExceptionEntry::finally(
            try_start,
            finally_handler_pc,
            finally_handler_pc,
            value_reg,
        ));

        self.compile_block(finalizer)?;
        self.emit_finally_epilogue(&context)?;
        Ok(())
    }

    /// Dispatch on the action register after the finally body: rethrow,
    /// perform routed exits, or fall through on normal completion.
    fn emit_finally_epilogue(&mut self, context: &FinallyContext) -> Result<(), LimitError> {
        // Rethrow arm.
        let next = self.emit_action_test(context.action_reg, ACTION_RETHROW)?;
        self.emit_a(OpCode::Throw, context.value_reg);
        self.patch_jump(next)?;

        // Routed-exit arms. Re-entering the exit protocol here chains
        // through any finally context still open around this one.
        for exit in &context.exits {
            let next = self.emit_action_test(context.action_reg, exit.action)?;
            match &exit.kind {
                ExitKind::Return => {
                    self.emit_nonlocal_exit(ExitKind::Return, Some(context.value_reg))?;
                }
                kind => self.emit_nonlocal_exit(kind.clone(), None)?,
            }
            self.patch_jump(next)?;
        }
        Ok(())
    }

    /// Test `action_reg === code`; returns the jump to patch at the next
    /// arm.
    fn emit_action_test(&mut self, action_reg: Register, code: u16) -> Result<usize, LimitError> {
        let expected = self.alloc_reg()?;
        self.emit_load_const(expected, Constant::Number(f64::from(code)))?;
        let cmp = self.alloc_reg()?;
        self.emit_abc(OpCode::StrictEq, cmp, action_reg, expected);
        self.free_reg(expected);
        let next = self.emit_jump(OpCode::JumpIfFalse, Some(cmp));
        self.free_reg(cmp);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{CatchClause, Expr, Pattern, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn catch_e(body: Vec<Stmt>) -> CatchClause {
        CatchClause {
            param: Some(Pattern::Ident {
                name: "e".into(),
                span: sp(),
            }),
            body,
            span: sp(),
        }
    }

    #[test]
    fn try_catch_emits_one_covering_row() {
        // try { throw 42 } catch (e) { e + 1 }
        let chunk = compile_stmts(vec![Stmt::Try {
            block: vec![Stmt::Throw {
                value: Expr::number(42.0, sp()),
                span: sp(),
            }],
            handler: Some(catch_e(vec![Stmt::expr(Expr::binary(
                tidescript_ast::BinaryOp::Add,
                Expr::ident("e", sp()),
                Expr::number(1.0, sp()),
            ))])),
            finalizer: None,
            span: sp(),
        }]);

        assert_eq!(chunk.exceptions().len(), 1);
        let row = chunk.exceptions()[0];
        assert!(row.is_catch);
        assert!(!row.is_finally);

        // The throw's byte position lies inside [start, end).
        let (throw_pc, _) = chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Throw)
            .expect("throw emitted");
        assert!(row.covers(throw_pc));

        // The trailing skip jump is covered too.
        let skip_jump_pc = (row.end as usize) - 3;
        assert_eq!(chunk.read_op(skip_jump_pc), Some(OpCode::Jump));
        assert!(row.covers(skip_jump_pc));

        // The handler lies outside the covered range.
        assert!(!row.covers(row.handler as usize));
    }

    #[test]
    fn every_try_opcode_is_covered() {
        let chunk = compile_stmts(vec![Stmt::Try {
            block: vec![
                Stmt::expr(Expr::number(1.0, sp())),
                Stmt::expr(Expr::number(2.0, sp())),
            ],
            handler: Some(catch_e(vec![])),
            finalizer: None,
            span: sp(),
        }]);
        let row = chunk.exceptions()[0];
        for (pc, _) in chunk.instructions() {
            if pc >= row.start as usize && pc < row.handler as usize {
                assert!(row.covers(pc), "pc {pc} escaped the try range");
            }
        }
    }

    #[test]
    fn catch_binds_the_exception_register() {
        let chunk = compile_stmts(vec![Stmt::Try {
            block: vec![],
            handler: Some(catch_e(vec![Stmt::expr(Expr::ident("e", sp()))])),
            finalizer: None,
            span: sp(),
        }]);
        let row = chunk.exceptions()[0];
        assert_ne!(row.catch_reg, crate::bytecode::NIL_REGISTER);
    }

    #[test]
    fn try_finally_emits_both_rows_in_inner_to_outer_order() {
        let chunk = compile_stmts(vec![Stmt::Try {
            block: vec![Stmt::expr(Expr::number(1.0, sp()))],
            handler: Some(catch_e(vec![])),
            finalizer: Some(vec![Stmt::expr(Expr::number(2.0, sp()))]),
            span: sp(),
        }]);
        assert_eq!(chunk.exceptions().len(), 2);
        assert!(chunk.exceptions()[0].is_catch);
        assert!(chunk.exceptions()[1].is_finally);

        // The finally row covers the catch handler as well.
        let catch_row = chunk.exceptions()[0];
        let finally_row = chunk.exceptions()[1];
        assert!(finally_row.start <= catch_row.start);
        assert!(finally_row.end > catch_row.end);

        // The rethrow arm exists.
        chunk.assert_contains_opcodes(&[OpCode::StrictEq, OpCode::JumpIfFalse, OpCode::Throw]);
    }

    #[test]
    fn finally_without_catch() {
        let output = output_of(vec![Stmt::Try {
            block: vec![Stmt::expr(Expr::number(1.0, sp()))],
            handler: None,
            finalizer: Some(vec![Stmt::expr(Expr::number(2.0, sp()))]),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.exceptions().len(), 1);
        assert!(output.chunk.exceptions()[0].is_finally);
        assert_eq!(output.chunk.unpatched_jump(), None);
    }

    #[test]
    fn break_through_finally_routes() {
        // while (true) { try { break; } finally { 1; } }
        let output = output_of(vec![Stmt::While {
            cond: Expr::bool(true, sp()),
            body: Box::new(Stmt::Try {
                block: vec![Stmt::Break {
                    label: None,
                    span: sp(),
                }],
                handler: None,
                finalizer: Some(vec![Stmt::expr(Expr::number(1.0, sp()))]),
                span: sp(),
            }),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
        // The routed break stores an action code beyond rethrow.
        output
            .chunk
            .assert_contains_opcodes(&[OpCode::LoadConst, OpCode::Jump]);
    }

    #[test]
    fn nested_finallys_patch_cleanly() {
        // try { try { 1 } finally { 2 } } finally { 3 }
        let output = output_of(vec![Stmt::Try {
            block: vec![Stmt::Try {
                block: vec![Stmt::expr(Expr::number(1.0, sp()))],
                handler: None,
                finalizer: Some(vec![Stmt::expr(Expr::number(2.0, sp()))]),
                span: sp(),
            }],
            handler: None,
            finalizer: Some(vec![Stmt::expr(Expr::number(3.0, sp()))]),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
        assert_eq!(output.chunk.exceptions().len(), 2);
    }
}
