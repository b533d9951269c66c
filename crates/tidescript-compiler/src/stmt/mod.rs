//! Statement lowering.
//!
//! `compile_stmt` dispatches on the statement discriminant. Control-flow
//! statements live in their own modules; this module holds the dispatch,
//! declarations, expression statements (which feed the completion-value
//! register at the script top level), `return`/`throw`, and the shared
//! non-local-exit protocol for `break`/`continue`/`return`:
//!
//! 1. evaluate the carried value, if any
//! 2. run iterator cleanups for every `for-of` loop the exit crosses
//! 3. if an open `finally` stands between the exit and its target, store
//!    the action code and route through it; the finally epilogue re-enters
//!    this protocol, so chained finallys unwind outward
//! 4. otherwise jump (or return) directly

mod block;
mod do_while_stmt;
mod enum_decl;
mod for_stmt;
mod if_stmt;
mod iter_stmt;
mod module_decl;
mod switch_stmt;
mod try_catch;
mod while_stmt;
mod with_stmt;

use tidescript_ast::{DeclKind, Declarator, Expr, Stmt};
use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;
use crate::emit::{ExitKind, IterCleanup};
use crate::expr::destructure::PatternBind;

impl<'h> Compiler<'h> {
    /// Compile a statement.
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), LimitError> {
        self.compile_stmt_labeled(stmt, None)
    }

    /// Compile a statement carrying an optional label (from an enclosing
    /// labeled statement).
    pub(crate) fn compile_stmt_labeled(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        self.set_line(stmt.span());
        match stmt {
            Stmt::Expr { expr, .. } => {
                let value = self.compile_expr(expr, None)?;
                if let Some(completion) = self.frame().completion
                    && value != crate::bytecode::NIL_REGISTER
                {
                    self.emit_ab(OpCode::Move, completion, value);
                }
                self.free_reg(value);
            }
            Stmt::Decl {
                kind, declarators, ..
            } => self.compile_decl(*kind, declarators)?,
            Stmt::Function { .. } => {
                // Function declarations are fully handled by hoisting.
            }
            Stmt::Class { class, span } => {
                let name = class.name.clone().expect("declaration has a name");
                let value = self.compile_class_literal(class, None)?;
                self.set_line(*span);
                self.emit_init_binding(&name, value);
                self.free_reg(value);
            }
            Stmt::Enum { decl, .. } => self.compile_enum_decl(decl)?,
            Stmt::Return { value, span } => self.compile_return(value.as_ref(), *span)?,
            Stmt::If { .. } => self.compile_if(stmt)?,
            Stmt::Block { body, .. } => self.compile_block(body)?,
            Stmt::While { .. } => self.compile_while(stmt, label)?,
            Stmt::DoWhile { .. } => self.compile_do_while(stmt, label)?,
            Stmt::For { .. } => self.compile_for(stmt, label)?,
            Stmt::ForIn { .. } | Stmt::ForOf { .. } => self.compile_iteration(stmt, label)?,
            Stmt::Switch { .. } => self.compile_switch(stmt, label)?,
            Stmt::Try { .. } => self.compile_try(stmt)?,
            Stmt::Throw { value, .. } => {
                let reg = self.compile_expr(value, None)?;
                self.emit_a(OpCode::Throw, reg);
                self.free_reg(reg);
            }
            Stmt::With { .. } => self.compile_with(stmt)?,
            Stmt::Labeled {
                label: name, body, ..
            } => self.compile_labeled(name, body)?,
            Stmt::Break { label, span } => self.compile_break(label.as_deref(), *span)?,
            Stmt::Continue { label, span } => self.compile_continue(label.as_deref(), *span)?,
            Stmt::Debugger { .. } => self.emit(OpCode::Debugger),
            Stmt::Empty { .. } => {}
            Stmt::Import { decl, span } => self.compile_import_decl(decl, *span)?,
            Stmt::Export { decl, span } => self.compile_export_decl(decl, *span)?,
        }
        Ok(())
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    /// Compile declaration initializers. Storage and TDZ markers already
    /// exist (the hoisting pass ran); this emits the initializing stores.
    fn compile_decl(&mut self, kind: DeclKind, declarators: &[Declarator]) -> Result<(), LimitError> {
        for declarator in declarators {
            self.set_line(declarator.span);
            match &declarator.init {
                Some(init) => {
                    let value = self.compile_expr(init, None)?;
                    self.bind_pattern(&declarator.target, value, PatternBind::Init)?;
                    self.free_reg(value);
                }
                None => {
                    // `var x;` keeps its hoisted undefined. `let x;`
                    // initializes to undefined, ending the dead zone.
                    if kind != DeclKind::Var {
                        let value = self.alloc_reg()?;
                        self.emit_a(OpCode::LoadUndefined, value);
                        self.bind_pattern(&declarator.target, value, PatternBind::Init)?;
                        self.free_reg(value);
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Labels
    // ========================================================================

    fn compile_labeled(&mut self, label: &str, body: &Stmt) -> Result<(), LimitError> {
        match body {
            Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. }
            | Stmt::Switch { .. } => self.compile_stmt_labeled(body, Some(label.to_string())),
            _ => {
                self.frame_mut().flow.enter_labeled_block(label.to_string());
                self.compile_stmt(body)?;
                let ctx = self.frame_mut().flow.exit_breakable();
                for jump in ctx.break_labels {
                    self.patch_jump(jump)?;
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Non-local exits
    // ========================================================================

    fn compile_break(&mut self, label: Option<&str>, span: Span) -> Result<(), LimitError> {
        let Some(target) = self.frame().flow.break_target(label) else {
            self.error(CompileError::IllegalBreak {
                label: label.map(str::to_string),
                span,
            });
            return Ok(());
        };
        self.emit_nonlocal_exit(ExitKind::Break { breakable: target }, None)
    }

    fn compile_continue(&mut self, label: Option<&str>, span: Span) -> Result<(), LimitError> {
        let Some(target) = self.frame().flow.continue_target(label) else {
            self.error(CompileError::IllegalContinue {
                label: label.map(str::to_string),
                span,
            });
            return Ok(());
        };
        self.emit_nonlocal_exit(ExitKind::Continue { breakable: target }, None)
    }

    fn compile_return(&mut self, value: Option<&Expr>, span: Span) -> Result<(), LimitError> {
        if self.at_root() {
            self.error(CompileError::Other {
                message: "'return' outside of function".into(),
                span,
            });
            return Ok(());
        }
        let reg = match value {
            Some(value) => self.compile_expr(value, None)?,
            None => {
                let reg = self.alloc_reg()?;
                self.emit_a(OpCode::LoadUndefined, reg);
                reg
            }
        };
        self.emit_nonlocal_exit(ExitKind::Return, Some(reg))?;
        self.free_reg(reg);
        Ok(())
    }

    /// The shared exit protocol (see module docs). `value` carries the
    /// return value for [`ExitKind::Return`].
    pub(crate) fn emit_nonlocal_exit(
        &mut self,
        kind: ExitKind,
        value: Option<Register>,
    ) -> Result<(), LimitError> {
        // 2. Iterator cleanups for crossed for-of loops.
        let cleanups = match kind {
            ExitKind::Return => self.frame().flow.all_cleanups(),
            ExitKind::Break { breakable } => self.frame().flow.crossed_cleanups(breakable),
            // Continue re-enters the loop; only *inner* loops are crossed.
            ExitKind::Continue { breakable } => {
                self.frame().flow.crossed_cleanups(breakable + 1)
            }
        };
        for cleanup in cleanups {
            self.emit_iterator_cleanup(cleanup)?;
        }

        // 3. Finally routing.
        let finally = match kind {
            ExitKind::Return => self.frame().flow.innermost_finally(),
            ExitKind::Break { breakable } | ExitKind::Continue { breakable } => {
                self.frame().flow.finally_for_breakable(breakable)
            }
        };
        if let Some(index) = finally {
            let context = self.frame_mut().flow.finally_mut(index);
            let action = context.exit_action(kind);
            let action_reg = context.action_reg;
            let value_reg = context.value_reg;

            if let Some(value) = value
                && value != value_reg
            {
                self.emit_ab(OpCode::Move, value_reg, value);
            }
            self.emit_load_const(action_reg, crate::bytecode::Constant::Number(f64::from(action)))?;
            let jump = self.emit_jump(OpCode::Jump, None);
            self.frame_mut()
                .flow
                .finally_mut(index)
                .route_jumps
                .push(jump);
            return Ok(());
        }

        // 4. Direct exit.
        match kind {
            ExitKind::Return => match value {
                Some(value) => self.emit_a(OpCode::Return, value),
                None => self.emit(OpCode::ReturnUndefined),
            },
            ExitKind::Break { breakable } => {
                let jump = self.emit_jump(OpCode::Jump, None);
                self.frame_mut()
                    .flow
                    .breakable_mut(breakable)
                    .break_labels
                    .push(jump);
            }
            ExitKind::Continue { breakable } => {
                let jump = self.emit_jump(OpCode::Jump, None);
                self.frame_mut()
                    .flow
                    .breakable_mut(breakable)
                    .continue_labels
                    .push(jump);
            }
        }
        Ok(())
    }

    /// Run one crossed `for-of` loop's iterator cleanup: call `return()`
    /// only if the iterator is not done and only if `return` is not
    /// nullish, then type-check its result.
    pub(crate) fn emit_iterator_cleanup(
        &mut self,
        cleanup: IterCleanup,
    ) -> Result<(), LimitError> {
        let run = self.emit_jump(OpCode::JumpIfFalse, Some(cleanup.done));
        let skip_all = self.emit_jump(OpCode::Jump, None);
        self.patch_jump(run)?;

        let window = self.frame_mut().regs.alloc_contiguous(2)?;
        let name_const = self.str_const("return")?;
        self.emit_ab(OpCode::GetProp, window, cleanup.iterator);
        self.emit_u16(name_const);
        let skip_call = self.emit_jump(OpCode::JumpIfNullish, Some(window));
        self.emit_ab(OpCode::Move, window + 1, cleanup.iterator);
        self.emit_ab(OpCode::CallMethod, window, 0);
        self.emit_a(OpCode::TypeGuardIteratorReturn, window);
        self.patch_jump(skip_call)?;
        self.free_reg(window + 1);
        self.free_reg(window);

        self.patch_jump(skip_all)?;
        Ok(())
    }
}
