//! Expression lowering.
//!
//! `compile_expr` is the single dispatch point: it takes a destination
//! hint and returns the register holding the value. Variable reads return
//! the variable's own (pinned) register without copying; everything else
//! lands in the hint or a fresh scratch register. Callers free scratch
//! results when done - `free` is a no-op on pinned and nil registers, so
//! blind frees are safe.
//!
//! A failing subtree records its error and returns the nil-register
//! sentinel; emission continues so one pass surfaces as many diagnostics
//! as possible.

pub(crate) mod assignment;
pub(crate) mod binary;
pub(crate) mod calls;
pub(crate) mod destructure;
pub(crate) mod identifiers;
pub(crate) mod literals;
pub(crate) mod member;
pub(crate) mod objects;
pub(crate) mod unary;

use tidescript_ast::Expr;
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    /// Compile an expression, returning the register holding its value.
    ///
    /// `hint` requests a destination; literal and operator lowerings honor
    /// it, while variable reads may return the variable's own register
    /// instead.
    pub(crate) fn compile_expr(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        self.set_line(expr.span());
        match expr {
            Expr::Number { .. }
            | Expr::BigInt { .. }
            | Expr::Str { .. }
            | Expr::Bool { .. }
            | Expr::Null { .. }
            | Expr::Regex { .. }
            | Expr::Template { .. } => self.compile_literal(expr, hint),

            Expr::Ident { name, span, .. } => self.compile_ident(name, *span, hint),
            Expr::This { .. } => {
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::LoadThis, dst);
                Ok(dst)
            }
            Expr::NewTarget { .. } => {
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::LoadNewTarget, dst);
                Ok(dst)
            }
            Expr::ImportMeta { .. } => {
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::LoadImportMeta, dst);
                Ok(dst)
            }
            Expr::Super { span } => {
                Ok(self.error(CompileError::SuperOutsideMethod { span: *span }))
            }

            Expr::Array { .. } | Expr::Object { .. } => self.compile_container(expr, hint),

            Expr::Function(func) => self.compile_function_literal(func, hint, false),
            Expr::Class(class) => self.compile_class_literal(class, hint),

            Expr::Unary { .. } | Expr::Update { .. } => self.compile_unary(expr, hint),
            Expr::Binary { .. } | Expr::Logical { .. } | Expr::Cond { .. } => {
                self.compile_binary(expr, hint)
            }
            Expr::Sequence { exprs, .. } => {
                let mut result = crate::bytecode::NIL_REGISTER;
                for (index, expr) in exprs.iter().enumerate() {
                    if index + 1 < exprs.len() {
                        let reg = self.compile_expr(expr, None)?;
                        self.free_reg(reg);
                    } else {
                        result = self.compile_expr(expr, hint)?;
                    }
                }
                Ok(result)
            }

            Expr::Assign { .. } => self.compile_assignment(expr, hint),
            Expr::Call { .. } | Expr::New { .. } | Expr::DynamicImport { .. } => {
                self.compile_call(expr, hint)
            }
            Expr::Member { .. } => self.compile_member(expr, hint),

            Expr::Yield { arg, delegate, .. } => {
                if *delegate {
                    return self.compile_yield_delegate(arg.as_deref(), expr.span(), hint);
                }
                let value = match arg {
                    Some(arg) => self.compile_expr(arg, None)?,
                    None => {
                        let reg = self.alloc_reg()?;
                        self.emit_a(OpCode::LoadUndefined, reg);
                        reg
                    }
                };
                let dst = self.hint_or_alloc(hint)?;
                self.emit_ab(OpCode::Yield, dst, value);
                self.free_reg(value);
                Ok(dst)
            }
            Expr::Await { arg, .. } => {
                let value = self.compile_expr(arg, None)?;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_ab(OpCode::Await, dst, value);
                self.free_reg(value);
                Ok(dst)
            }
        }
    }

    /// Compile an expression and guarantee the value ends up in `dst`.
    pub(crate) fn compile_expr_to(&mut self, expr: &Expr, dst: Register) -> Result<(), LimitError> {
        let reg = self.compile_expr(expr, Some(dst))?;
        if reg != dst && reg != crate::bytecode::NIL_REGISTER {
            self.emit_ab(OpCode::Move, dst, reg);
            self.free_reg(reg);
        }
        Ok(())
    }

    /// The hint, or a fresh scratch register.
    pub(crate) fn hint_or_alloc(&mut self, hint: Option<Register>) -> Result<Register, LimitError> {
        match hint {
            Some(reg) => Ok(reg),
            None => self.alloc_reg(),
        }
    }

    /// `yield*` lowers to the general iterator loop, yielding each element.
    fn compile_yield_delegate(
        &mut self,
        arg: Option<&Expr>,
        span: tidescript_core::Span,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let Some(arg) = arg else {
            return Ok(self.error(CompileError::Other {
                message: "yield* requires an operand".into(),
                span,
            }));
        };

        let dst = self.hint_or_alloc(hint)?;
        self.emit_a(OpCode::LoadUndefined, dst);

        let iterable = self.compile_expr(arg, None)?;
        let (iterator, done, value) = self.emit_get_iterator(iterable)?;
        self.free_reg(iterable);

        let loop_start = self.chunk().current_offset();
        self.emit_iterator_next(iterator, done, value)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse, Some(done));
        // done: fall through to the end with the final value as result.
        let finish = self.emit_jump(OpCode::Jump, None);
        self.patch_jump(exit)?;
        self.emit_ab(OpCode::Yield, dst, value);
        self.emit_jump_back(loop_start)?;
        self.patch_jump(finish)?;
        self.emit_ab(OpCode::Move, dst, value);

        self.free_reg(value);
        self.free_reg(done);
        self.free_reg(iterator);
        Ok(dst)
    }
}
