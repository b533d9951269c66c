//! `for-in` and `for-of` compilation, plus the iterator-protocol helpers
//! shared with `yield*`.
//!
//! `for-of` has two lowerings: an indexed fast path when the checker
//! proves the operand is an array, and the general iterator path - call
//! `@@iterator`, call `next` per round, and on early exit call `return`
//! guarded by "only if not done" and "only if `return` is not nullish",
//! type-checking its result.
//!
//! `for-in` collects the object's enumerable keys up front and runs the
//! indexed loop over the key array.

use tidescript_ast::{ForHead, Stmt};
use tidescript_core::LimitError;

use crate::bytecode::{Constant, OpCode, Register};
use crate::driver::Compiler;
use crate::emit::IterCleanup;
use crate::expr::destructure::PatternBind;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_iteration(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        match stmt {
            Stmt::ForIn {
                head, object, body, ..
            } => {
                let object_reg = self.compile_expr(object, None)?;
                let keys = self.alloc_reg()?;
                self.emit_ab(OpCode::GetPropKeys, keys, object_reg);
                self.free_reg(object_reg);
                self.compile_indexed_loop(head, keys, body, label)?;
                self.free_reg(keys);
                Ok(())
            }
            Stmt::ForOf {
                head,
                iterable,
                body,
                ..
            } => {
                if iterable.static_type().is_array() {
                    // Fast path: the checker proved an array.
                    let array = self.compile_expr(iterable, None)?;
                    self.compile_indexed_loop(head, array, body, label)?;
                    self.free_reg(array);
                    Ok(())
                } else {
                    self.compile_iterator_loop(head, iterable, body, label)
                }
            }
            _ => unreachable!("compile_iteration on non-iteration"),
        }
    }

    /// Indexed loop over an array register (for-in keys, fast-path for-of).
    fn compile_indexed_loop(
        &mut self,
        head: &ForHead,
        array: Register,
        body: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let index = self.alloc_reg()?;
        self.emit_load_const(index, Constant::Number(0.0))?;
        let length = self.alloc_reg()?;
        let length_const = self.str_const("length")?;
        self.emit_ab(OpCode::GetProp, length, array);
        self.emit_u16(length_const);

        let loop_start = self.chunk().current_offset();
        let cond = self.alloc_reg()?;
        self.emit_abc(OpCode::Less, cond, index, length);
        let exit = self.emit_jump(OpCode::JumpIfFalse, Some(cond));
        self.free_reg(cond);

        self.table.push(ScopeKind::Block);
        let element = self.alloc_reg()?;
        self.emit_abc(OpCode::GetIndex, element, array, index);
        self.bind_for_head(head, element)?;
        self.free_reg(element);

        let completion = self.frame().completion;
        self.frame_mut().flow.enter_loop(loop_start, label, completion);
        self.compile_stmt(body)?;
        let ctx = self.frame_mut().flow.exit_breakable();
        self.table.pop();

        // Continue lands on the increment.
        let increment_pc = self.chunk().current_offset();
        for jump in ctx.continue_labels {
            self.patch_jump_to(jump, increment_pc)?;
        }
        let one = self.alloc_reg()?;
        self.emit_load_const(one, Constant::Number(1.0))?;
        self.emit_abc(OpCode::Add, index, index, one);
        self.free_reg(one);
        self.emit_jump_back(loop_start)?;

        self.patch_jump(exit)?;
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }

        self.free_reg(length);
        self.free_reg(index);
        Ok(())
    }

    /// General iterator-protocol loop.
    fn compile_iterator_loop(
        &mut self,
        head: &ForHead,
        iterable: &tidescript_ast::Expr,
        body: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let iterable_reg = self.compile_expr(iterable, None)?;
        let (iterator, done, value) = self.emit_get_iterator(iterable_reg)?;
        self.free_reg(iterable_reg);

        let loop_start = self.chunk().current_offset();
        self.emit_iterator_next(iterator, done, value)?;
        let not_done = self.alloc_reg()?;
        self.emit_ab(OpCode::Not, not_done, done);
        let exit = self.emit_jump(OpCode::JumpIfFalse, Some(not_done));
        self.free_reg(not_done);

        self.table.push(ScopeKind::Block);
        self.bind_for_head(head, value)?;

        let completion = self.frame().completion;
        let loop_index = self
            .frame_mut()
            .flow
            .enter_loop(loop_start, label, completion);
        self.frame_mut().flow.breakable_mut(loop_index).iter_cleanup =
            Some(IterCleanup { iterator, done });
        self.compile_stmt(body)?;
        let ctx = self.frame_mut().flow.exit_breakable();
        self.table.pop();

        for jump in ctx.continue_labels {
            self.patch_jump_to(jump, ctx.loop_start)?;
        }
        self.emit_jump_back(ctx.loop_start)?;
        self.patch_jump(exit)?;
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }

        self.free_reg(value);
        self.free_reg(done);
        self.free_reg(iterator);
        Ok(())
    }

    /// Bind the loop head to the current element.
    fn bind_for_head(&mut self, head: &ForHead, value: Register) -> Result<(), LimitError> {
        match head {
            ForHead::Decl { kind, pattern } => self.bind_loop_decl(*kind, pattern, value),
            ForHead::Pattern(pattern) => self.bind_pattern(pattern, value, PatternBind::Assign),
        }
    }

    // ========================================================================
    // Iterator protocol
    // ========================================================================

    /// Materialize an iterator: guard iterability, call `@@iterator`, and
    /// allocate the `done`/`value` trackers.
    pub(crate) fn emit_get_iterator(
        &mut self,
        iterable: Register,
    ) -> Result<(Register, Register, Register), LimitError> {
        self.emit_a(OpCode::TypeGuardIterable, iterable);

        let window = self.frame_mut().regs.alloc_contiguous(2)?;
        let iterator_const = self.str_const("@@iterator")?;
        self.emit_ab(OpCode::GetProp, window, iterable);
        self.emit_u16(iterator_const);
        self.emit_ab(OpCode::Move, window + 1, iterable);
        self.emit_ab(OpCode::CallMethod, window, 0);
        self.free_reg(window + 1);

        let done = self.alloc_reg()?;
        self.emit_a(OpCode::LoadFalse, done);
        let value = self.alloc_reg()?;
        self.emit_a(OpCode::LoadUndefined, value);
        Ok((window, done, value))
    }

    /// One protocol round: call `next`, unpack `done` and `value`.
    pub(crate) fn emit_iterator_next(
        &mut self,
        iterator: Register,
        done: Register,
        value: Register,
    ) -> Result<(), LimitError> {
        let window = self.frame_mut().regs.alloc_contiguous(2)?;
        let next_const = self.str_const("next")?;
        self.emit_ab(OpCode::GetProp, window, iterator);
        self.emit_u16(next_const);
        self.emit_ab(OpCode::Move, window + 1, iterator);
        self.emit_ab(OpCode::CallMethod, window, 0);

        let done_const = self.str_const("done")?;
        self.emit_ab(OpCode::GetProp, done, window);
        self.emit_u16(done_const);
        let value_const = self.str_const("value")?;
        self.emit_ab(OpCode::GetProp, value, window);
        self.emit_u16(value_const);

        self.free_reg(window + 1);
        self.free_reg(window);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{DeclKind, Expr, ExprOrSpread, ForHead, Pattern, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn head(name: &str) -> ForHead {
        ForHead::Decl {
            kind: DeclKind::Let,
            pattern: Pattern::Ident {
                name: name.into(),
                span: sp(),
            },
        }
    }

    #[test]
    fn for_of_over_array_literal_takes_the_fast_path() {
        // for (let x of [1, 2]) {}
        let chunk = compile_stmts(vec![Stmt::ForOf {
            head: head("x"),
            iterable: Expr::Array {
                elements: vec![
                    Some(ExprOrSpread {
                        spread: false,
                        expr: Expr::number(1.0, sp()),
                    }),
                    Some(ExprOrSpread {
                        spread: false,
                        expr: Expr::number(2.0, sp()),
                    }),
                ],
                span: sp(),
            },
            body: Box::new(Stmt::Empty { span: sp() }),
            span: sp(),
        }]);

        // Indexed loop: length read, bounds test, element read.
        chunk.assert_contains_opcodes(&[
            OpCode::GetProp, // length
            OpCode::Less,
            OpCode::JumpIfFalse,
            OpCode::GetIndex,
            OpCode::Add, // index increment
        ]);
        // No iterator protocol on the fast path.
        assert!(!chunk.opcodes().contains(&OpCode::TypeGuardIterable));
    }

    #[test]
    fn for_of_over_unknown_operand_uses_the_iterator_protocol() {
        let chunk = compile_stmts(vec![Stmt::ForOf {
            head: head("x"),
            iterable: Expr::ident("stream", sp()),
            body: Box::new(Stmt::Empty { span: sp() }),
            span: sp(),
        }]);
        chunk.assert_contains_opcodes(&[
            OpCode::TypeGuardIterable,
            OpCode::GetProp,    // @@iterator
            OpCode::CallMethod, // iterator
            OpCode::GetProp,    // next
            OpCode::CallMethod,
            OpCode::GetProp, // done
            OpCode::GetProp, // value
            OpCode::Not,
            OpCode::JumpIfFalse,
        ]);
    }

    #[test]
    fn break_in_iterator_loop_emits_cleanup() {
        // Early exit calls return() guarded by done and nullish checks.
        let chunk = compile_stmts(vec![Stmt::ForOf {
            head: head("x"),
            iterable: Expr::ident("stream", sp()),
            body: Box::new(Stmt::Break {
                label: None,
                span: sp(),
            }),
            span: sp(),
        }]);
        chunk.assert_contains_opcodes(&[
            OpCode::JumpIfNullish, // return-method nullish guard
            OpCode::TypeGuardIteratorReturn,
        ]);
    }

    #[test]
    fn for_in_collects_keys_first() {
        let chunk = compile_stmts(vec![Stmt::ForIn {
            head: head("key"),
            object: Expr::ident("obj", sp()),
            body: Box::new(Stmt::Empty { span: sp() }),
            span: sp(),
        }]);
        chunk.assert_contains_opcodes(&[OpCode::GetPropKeys, OpCode::Less, OpCode::GetIndex]);
    }

    #[test]
    fn iteration_loops_patch_cleanly() {
        let output = output_of(vec![Stmt::ForOf {
            head: head("x"),
            iterable: Expr::ident("stream", sp()),
            body: Box::new(Stmt::Continue {
                label: None,
                span: sp(),
            }),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
    }
}
