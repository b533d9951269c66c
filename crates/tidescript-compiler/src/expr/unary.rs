//! Unary operators and increment/decrement.

use tidescript_ast::{Expr, MemberProp, UnaryOp, UpdateOp};
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::{Constant, OpCode, Register};
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_unary(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match expr {
            Expr::Unary { op, operand, span } => match op {
                UnaryOp::Neg => {
                    let src = self.compile_expr(operand, None)?;
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_ab(OpCode::Negate, dst, src);
                    self.free_reg(src);
                    Ok(dst)
                }
                UnaryOp::Plus => {
                    // Unary plus is ToNumber; subtracting zero performs the
                    // same coercion without a dedicated opcode.
                    let src = self.compile_expr(operand, None)?;
                    let zero = self.alloc_reg()?;
                    self.emit_load_const(zero, Constant::Number(0.0))?;
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_abc(OpCode::Sub, dst, src, zero);
                    self.free_reg(zero);
                    self.free_reg(src);
                    Ok(dst)
                }
                UnaryOp::Not => {
                    let src = self.compile_expr(operand, None)?;
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_ab(OpCode::Not, dst, src);
                    self.free_reg(src);
                    Ok(dst)
                }
                UnaryOp::BitNot => {
                    let src = self.compile_expr(operand, None)?;
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_ab(OpCode::BitNot, dst, src);
                    self.free_reg(src);
                    Ok(dst)
                }
                UnaryOp::TypeOf => {
                    let src = self.compile_expr(operand, None)?;
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_ab(OpCode::TypeOf, dst, src);
                    self.free_reg(src);
                    Ok(dst)
                }
                UnaryOp::Void => {
                    let src = self.compile_expr(operand, None)?;
                    self.free_reg(src);
                    let dst = self.hint_or_alloc(hint)?;
                    self.emit_a(OpCode::LoadUndefined, dst);
                    Ok(dst)
                }
                UnaryOp::Delete => self.compile_delete(operand, *span, hint),
            },
            Expr::Update {
                op,
                prefix,
                target,
                span,
            } => self.compile_update(*op, *prefix, target, *span, hint),
            _ => unreachable!("compile_unary on non-unary"),
        }
    }

    fn compile_delete(
        &mut self,
        operand: &Expr,
        span: tidescript_core::Span,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match operand {
            Expr::Member {
                object, property, ..
            } => {
                let obj = self.compile_expr(object, None)?;
                let key = match property {
                    MemberProp::Ident(name) => {
                        let key = self.alloc_reg()?;
                        self.emit_load_const(key, Constant::Str(name.clone()))?;
                        key
                    }
                    MemberProp::Index(index) => self.compile_expr(index, None)?,
                    MemberProp::Private(_) => {
                        return Ok(self.error(CompileError::Other {
                            message: "private fields cannot be deleted".into(),
                            span,
                        }));
                    }
                };
                let dst = self.hint_or_alloc(hint)?;
                self.emit_abc(OpCode::DeleteIndex, dst, obj, key);
                self.free_reg(key);
                self.free_reg(obj);
                Ok(dst)
            }
            Expr::Ident { .. } if self.strict() => Ok(self.error(CompileError::Other {
                message: "cannot delete a variable in strict mode".into(),
                span,
            })),
            _ => {
                // Deleting a non-reference evaluates it and yields true.
                let reg = self.compile_expr(operand, None)?;
                self.free_reg(reg);
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::LoadTrue, dst);
                Ok(dst)
            }
        }
    }

    fn compile_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &Expr,
        span: tidescript_core::Span,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let arith = match op {
            UpdateOp::Inc => OpCode::Add,
            UpdateOp::Dec => OpCode::Sub,
        };

        match target {
            Expr::Ident { name, .. } => {
                let old = self.alloc_reg()?;
                let current = self.compile_ident(name, span, Some(old))?;
                debug_assert_eq!(current, old);

                let one = self.alloc_reg()?;
                self.emit_load_const(one, Constant::Number(1.0))?;
                let new = self.alloc_reg()?;
                self.emit_abc(arith, new, old, one);
                self.free_reg(one);
                self.emit_store_binding(name, span, new)?;

                let dst = self.hint_or_alloc(hint)?;
                let result = if prefix { new } else { old };
                if dst != result {
                    self.emit_ab(OpCode::Move, dst, result);
                }
                self.free_reg(new);
                self.free_reg(old);
                Ok(dst)
            }
            Expr::Member {
                object, property, ..
            } => {
                let access = self.eval_member_target(object, property)?;
                let old = self.alloc_reg()?;
                self.emit_member_get(&access, old)?;

                let one = self.alloc_reg()?;
                self.emit_load_const(one, Constant::Number(1.0))?;
                let new = self.alloc_reg()?;
                self.emit_abc(arith, new, old, one);
                self.free_reg(one);
                self.emit_member_set(&access, new)?;

                let dst = self.hint_or_alloc(hint)?;
                let result = if prefix { new } else { old };
                if dst != result {
                    self.emit_ab(OpCode::Move, dst, result);
                }
                self.free_reg(new);
                self.free_reg(old);
                self.free_member_access(access);
                Ok(dst)
            }
            _ => Ok(self.error(CompileError::InvalidAssignmentTarget { span })),
        }
    }
}
