//! Assignment lowering: plain, compound, logical, and destructuring.
//!
//! The assignment target must be an identifier, member, or index
//! expression (or a destructuring pattern for plain `=`); anything else is
//! the "invalid assignment target" error.
//!
//! Compound arithmetic on a register-resident identifier emits the
//! combined op in place; other targets compute into a fresh register and
//! store. Logical assignments (`&&=`, `||=`, `??=`) skip the entire store
//! path with a jump when the short-circuit condition holds, so a
//! non-storing evaluation never touches the target. Member compound
//! assignment evaluates the base and key exactly once.
//!
//! The expression's value is the final stored value, or the preserved LHS
//! value on short-circuit.

use tidescript_ast::{AssignOp, AssignTarget, Expr, LogicalOp};
use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;
use crate::expr::binary::binary_opcode;
use crate::expr::destructure::PatternBind;
use crate::expr::identifiers::BindingKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_assignment(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let Expr::Assign {
            op,
            target,
            value,
            span,
        } = expr
        else {
            unreachable!("compile_assignment on non-assignment");
        };

        match target {
            AssignTarget::Pattern(pattern) => {
                if *op != AssignOp::Assign {
                    return Ok(self.error(CompileError::InvalidAssignmentTarget { span: *span }));
                }
                let dst = self.hint_or_alloc(hint)?;
                self.compile_expr_to(value, dst)?;
                self.bind_pattern(pattern, dst, PatternBind::Assign)?;
                Ok(dst)
            }
            AssignTarget::Expr(target) => match target.as_ref() {
                Expr::Ident { name, span, .. } => {
                    self.compile_ident_assignment(*op, name, *span, value, hint)
                }
                Expr::Member {
                    object,
                    property,
                    optional,
                    span,
                    ..
                } => {
                    if *optional {
                        // `a?.b = v` is not a valid target.
                        return Ok(self.error(CompileError::InvalidAssignmentTarget {
                            span: *span,
                        }));
                    }
                    self.compile_member_assignment(*op, object, property, value, hint)
                }
                other => Ok(self.error(CompileError::InvalidAssignmentTarget {
                    span: other.span(),
                })),
            },
        }
    }

    fn compile_ident_assignment(
        &mut self,
        op: AssignOp,
        name: &str,
        span: Span,
        value: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        if op == AssignOp::Assign {
            let dst = self.hint_or_alloc(hint)?;
            self.compile_expr_to(value, dst)?;
            self.emit_store_binding(name, span, dst)?;
            return Ok(dst);
        }

        if let Some(logical) = op.logical_op() {
            return self.compile_logical_ident_assignment(logical, name, span, value, hint);
        }

        let arith = binary_opcode(op.binary_op().expect("compound operator"));

        // Fast path: combined op in place on a register-resident,
        // non-captured-as-upvalue, non-const identifier.
        let resolved = self.resolve_name(name)?;
        if let BindingKind::Register(reg) = resolved.kind
            && !resolved.is_const
        {
            if resolved.is_tdz {
                self.emit_tdz_check(reg, name)?;
            }
            let rhs = self.compile_expr(value, None)?;
            self.emit_abc(arith, reg, reg, rhs);
            self.free_reg(rhs);
            if let Some(dst) = hint
                && dst != reg
            {
                self.emit_ab(OpCode::Move, dst, reg);
                return Ok(dst);
            }
            return Ok(reg);
        }

        // General path: load, combine into a fresh register, store.
        let dst = self.hint_or_alloc(hint)?;
        let current = self.emit_load_binding(name, span, &resolved, None)?;
        let rhs = self.compile_expr(value, None)?;
        self.emit_abc(arith, dst, current, rhs);
        self.free_reg(rhs);
        self.free_reg(current);
        self.emit_store_binding(name, span, dst)?;
        Ok(dst)
    }

    /// `&&=` stores only if the LHS is truthy, `||=` only if falsey,
    /// `??=` only if nullish. The store path is skipped - not merely
    /// nullified - by a jump to the end label.
    fn compile_logical_ident_assignment(
        &mut self,
        op: LogicalOp,
        name: &str,
        span: Span,
        value: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        let resolved = self.resolve_name(name)?;
        let current = self.emit_load_binding(name, span, &resolved, Some(dst))?;
        debug_assert_eq!(current, dst);

        let skip_store = match op {
            LogicalOp::And => self.emit_jump(OpCode::JumpIfFalse, Some(dst)),
            LogicalOp::Or => {
                let to_store = self.emit_jump(OpCode::JumpIfFalse, Some(dst));
                let skip = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(to_store)?;
                skip
            }
            LogicalOp::Nullish => {
                let to_store = self.emit_jump(OpCode::JumpIfNullish, Some(dst));
                let skip = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(to_store)?;
                skip
            }
        };

        self.compile_expr_to(value, dst)?;
        self.emit_store_binding(name, span, dst)?;
        self.patch_jump(skip_store)?;
        Ok(dst)
    }

    /// Member/index assignment; the base object (and computed key) are
    /// evaluated exactly once, including for compound and logical forms.
    fn compile_member_assignment(
        &mut self,
        op: AssignOp,
        object: &Expr,
        property: &tidescript_ast::MemberProp,
        value: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let access = self.eval_member_target(object, property)?;
        let dst = self.hint_or_alloc(hint)?;

        if op == AssignOp::Assign {
            self.compile_expr_to(value, dst)?;
            self.emit_member_set(&access, dst)?;
            self.free_member_access(access);
            return Ok(dst);
        }

        if let Some(logical) = op.logical_op() {
            self.emit_member_get(&access, dst)?;
            let skip_store = match logical {
                LogicalOp::And => self.emit_jump(OpCode::JumpIfFalse, Some(dst)),
                LogicalOp::Or => {
                    let to_store = self.emit_jump(OpCode::JumpIfFalse, Some(dst));
                    let skip = self.emit_jump(OpCode::Jump, None);
                    self.patch_jump(to_store)?;
                    skip
                }
                LogicalOp::Nullish => {
                    let to_store = self.emit_jump(OpCode::JumpIfNullish, Some(dst));
                    let skip = self.emit_jump(OpCode::Jump, None);
                    self.patch_jump(to_store)?;
                    skip
                }
            };
            self.compile_expr_to(value, dst)?;
            self.emit_member_set(&access, dst)?;
            self.patch_jump(skip_store)?;
            self.free_member_access(access);
            return Ok(dst);
        }

        let arith = binary_opcode(op.binary_op().expect("compound operator"));
        let current = self.alloc_reg()?;
        self.emit_member_get(&access, current)?;
        let rhs = self.compile_expr(value, None)?;
        self.emit_abc(arith, dst, current, rhs);
        self.free_reg(rhs);
        self.free_reg(current);
        self.emit_member_set(&access, dst)?;
        self.free_member_access(access);
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_expr_chunk, compile_stmts, compile_stmts_with_errors};
    use tidescript_ast::{AssignOp, AssignTarget, DeclKind, Expr, Pattern, Stmt};
    use tidescript_core::{CompileError, Span};

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn assign_op(op: AssignOp, target: Expr, value: Expr) -> Expr {
        Expr::Assign {
            op,
            target: AssignTarget::Expr(Box::new(target)),
            value: Box::new(value),
            span: sp(),
        }
    }

    #[test]
    fn plain_assignment_stores_and_yields_the_value() {
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "x", Some(Expr::number(1.0, sp())), sp()),
            Stmt::expr(Expr::assign(Expr::ident("x", sp()), Expr::number(2.0, sp()))),
        ]);
        chunk.assert_contains_opcodes(&[OpCode::SetGlobal, OpCode::LoadConst, OpCode::SetGlobal]);
    }

    #[test]
    fn compound_assignment_loads_combines_stores() {
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "x", Some(Expr::number(1.0, sp())), sp()),
            Stmt::expr(assign_op(
                AssignOp::Add,
                Expr::ident("x", sp()),
                Expr::number(2.0, sp()),
            )),
        ]);
        chunk.assert_contains_opcodes(&[OpCode::GetGlobal, OpCode::Add, OpCode::SetGlobal]);
    }

    #[test]
    fn logical_and_assignment_skips_the_store_path() {
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "x", Some(Expr::bool(false, sp())), sp()),
            Stmt::expr(assign_op(
                AssignOp::And,
                Expr::ident("x", sp()),
                Expr::number(2.0, sp()),
            )),
        ]);
        // Load, conditional skip over the compute+store tail.
        chunk.assert_contains_opcodes(&[
            OpCode::GetGlobal,
            OpCode::JumpIfFalse,
            OpCode::LoadConst,
            OpCode::SetGlobal,
        ]);
    }

    #[test]
    fn nullish_assignment_uses_nullish_jump() {
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "x", None, sp()),
            Stmt::expr(assign_op(
                AssignOp::Nullish,
                Expr::ident("x", sp()),
                Expr::number(2.0, sp()),
            )),
        ]);
        chunk.assert_contains_opcodes(&[OpCode::JumpIfNullish, OpCode::Jump, OpCode::SetGlobal]);
    }

    #[test]
    fn member_compound_evaluates_base_once() {
        // obj.x += 1 - exactly one GetGlobal for obj.
        let chunk = compile_expr_chunk(assign_op(
            AssignOp::Add,
            Expr::member(Expr::ident("obj", sp()), "x", sp()),
            Expr::number(1.0, sp()),
        ));
        let base_reads = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::GetGlobal)
            .count();
        assert_eq!(base_reads, 1);
        chunk.assert_contains_opcodes(&[OpCode::GetProp, OpCode::Add, OpCode::SetProp]);
    }

    #[test]
    fn index_assignment() {
        let target = Expr::Member {
            object: Box::new(Expr::ident("arr", sp())),
            property: tidescript_ast::MemberProp::Index(Box::new(Expr::number(0.0, sp()))),
            optional: false,
            ty: tidescript_core::StaticType::Unknown,
            span: sp(),
        };
        let chunk = compile_expr_chunk(Expr::Assign {
            op: AssignOp::Assign,
            target: AssignTarget::Expr(Box::new(target)),
            value: Box::new(Expr::number(9.0, sp())),
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::SetIndex]);
    }

    #[test]
    fn destructuring_assignment_binds_pattern() {
        // [a] = value (a declared first)
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "a", Some(Expr::number(0.0, sp())), sp()),
            Stmt::expr(Expr::Assign {
                op: AssignOp::Assign,
                target: AssignTarget::Pattern(Box::new(Pattern::Array {
                    elements: vec![Some(Pattern::Ident {
                        name: "a".into(),
                        span: sp(),
                    })],
                    span: sp(),
                })),
                value: Box::new(Expr::ident("value", sp())),
                span: sp(),
            }),
        ]);
        chunk.assert_contains_opcodes(&[OpCode::GetIndex, OpCode::SetGlobal]);
    }

    #[test]
    fn invalid_target_is_reported() {
        let errors = compile_stmts_with_errors(vec![Stmt::expr(assign_op(
            AssignOp::Assign,
            Expr::number(1.0, sp()),
            Expr::number(2.0, sp()),
        ))]);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CompileError::InvalidAssignmentTarget { .. }))
        );
    }

    #[test]
    fn compound_on_invalid_target_is_reported() {
        let errors = compile_stmts_with_errors(vec![Stmt::expr(Expr::Assign {
            op: AssignOp::Add,
            target: AssignTarget::Pattern(Box::new(Pattern::Array {
                elements: vec![],
                span: sp(),
            })),
            value: Box::new(Expr::number(1.0, sp())),
            span: sp(),
        })]);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CompileError::InvalidAssignmentTarget { .. }))
        );
    }
}
