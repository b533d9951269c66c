//! Member and index access, including optional chaining and `super`.
//!
//! Optional chains share one short-circuit target: every `?.` link emits a
//! nullish test jumping to a shared "result = undefined" tail, so the
//! whole expression yields undefined if any link is nullish.

use tidescript_ast::{Expr, MemberProp};
use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::{NIL_REGISTER, OpCode, Register};
use crate::driver::Compiler;
use crate::expr::identifiers::BindingKind;

/// An evaluated member-access key.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MemberKey {
    /// `.name` - a string constant index.
    Name(u16),
    /// `.#name` - a private-field name constant index.
    Private(u16),
    /// `[expr]` - an evaluated key register.
    Index(Register),
}

/// A member target evaluated exactly once (base object plus key), reusable
/// for read-modify-write sequences.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemberAccess {
    pub obj: Register,
    pub key: MemberKey,
}

impl<'h> Compiler<'h> {
    /// Evaluate a member target's base and key, each exactly once.
    pub(crate) fn eval_member_target(
        &mut self,
        object: &Expr,
        property: &MemberProp,
    ) -> Result<MemberAccess, LimitError> {
        let obj = match object {
            Expr::Super { span } => self.load_super_binding("__super_proto__", *span)?,
            _ => self.compile_expr(object, None)?,
        };
        let key = match property {
            MemberProp::Ident(name) => MemberKey::Name(self.str_const(name)?),
            MemberProp::Private(name) => MemberKey::Private(self.str_const(name)?),
            MemberProp::Index(index) => MemberKey::Index(self.compile_expr(index, None)?),
        };
        Ok(MemberAccess { obj, key })
    }

    /// Read through an evaluated member target.
    pub(crate) fn emit_member_get(
        &mut self,
        access: &MemberAccess,
        dst: Register,
    ) -> Result<(), LimitError> {
        match access.key {
            MemberKey::Name(name_const) => {
                self.emit_ab(OpCode::GetProp, dst, access.obj);
                self.emit_u16(name_const);
            }
            MemberKey::Private(name_const) => {
                self.emit_ab(OpCode::GetPrivateField, dst, access.obj);
                self.emit_u16(name_const);
            }
            MemberKey::Index(key) => {
                self.emit_abc(OpCode::GetIndex, dst, access.obj, key);
            }
        }
        Ok(())
    }

    /// Write through an evaluated member target.
    pub(crate) fn emit_member_set(
        &mut self,
        access: &MemberAccess,
        value: Register,
    ) -> Result<(), LimitError> {
        match access.key {
            MemberKey::Name(name_const) => {
                self.emit_a(OpCode::SetProp, access.obj);
                self.emit_u16(name_const);
                self.emit_byte(value);
            }
            MemberKey::Private(name_const) => {
                self.emit_a(OpCode::SetPrivateField, access.obj);
                self.emit_u16(name_const);
                self.emit_byte(value);
            }
            MemberKey::Index(key) => {
                self.emit_abc(OpCode::SetIndex, access.obj, key, value);
            }
        }
        Ok(())
    }

    /// Release the scratch registers an evaluated member target holds.
    pub(crate) fn free_member_access(&mut self, access: MemberAccess) {
        if let MemberKey::Index(key) = access.key {
            self.free_reg(key);
        }
        self.free_reg(access.obj);
    }

    /// Compile a member expression (the read form).
    pub(crate) fn compile_member(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        let mut shorts = Vec::new();
        self.compile_member_link(expr, dst, &mut shorts)?;
        self.finish_optional_chain(dst, shorts)?;
        Ok(dst)
    }

    /// Compile one link of a (possibly optional) member chain into `dst`,
    /// recursing through nested member bases so all links share `shorts`.
    pub(crate) fn compile_member_link(
        &mut self,
        expr: &Expr,
        dst: Register,
        shorts: &mut Vec<usize>,
    ) -> Result<(), LimitError> {
        let Expr::Member {
            object,
            property,
            optional,
            ..
        } = expr
        else {
            unreachable!("member link on non-member");
        };

        let obj = match object.as_ref() {
            Expr::Member { .. } => {
                self.compile_member_link(object, dst, shorts)?;
                dst
            }
            Expr::Super { span } => self.load_super_binding("__super_proto__", *span)?,
            other => self.compile_expr(other, None)?,
        };

        if *optional {
            shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(obj)));
        }

        let key = match property {
            MemberProp::Ident(name) => MemberKey::Name(self.str_const(name)?),
            MemberProp::Private(name) => MemberKey::Private(self.str_const(name)?),
            MemberProp::Index(index) => MemberKey::Index(self.compile_expr(index, None)?),
        };
        let access = MemberAccess { obj, key };
        self.emit_member_get(&access, dst)?;

        if let MemberKey::Index(key) = key {
            self.free_reg(key);
        }
        if obj != dst {
            self.free_reg(obj);
        }
        Ok(())
    }

    /// Close an optional chain: patch every short-circuit jump to a shared
    /// "result = undefined" tail.
    pub(crate) fn finish_optional_chain(
        &mut self,
        dst: Register,
        shorts: Vec<usize>,
    ) -> Result<(), LimitError> {
        if shorts.is_empty() {
            return Ok(());
        }
        let done = self.emit_jump(OpCode::Jump, None);
        for short in shorts {
            self.patch_jump(short)?;
        }
        self.emit_a(OpCode::LoadUndefined, dst);
        self.patch_jump(done)?;
        Ok(())
    }

    /// Load one of the synthetic `super` bindings the class compiler
    /// declares; outside a method scope this is an error.
    pub(crate) fn load_super_binding(
        &mut self,
        name: &str,
        span: Span,
    ) -> Result<Register, LimitError> {
        let resolved = self.resolve_name(name)?;
        if matches!(resolved.kind, BindingKind::Unresolved) {
            return Ok(self.error(CompileError::SuperOutsideMethod { span }));
        }
        let reg = self.emit_load_binding(name, span, &resolved, None)?;
        debug_assert_ne!(reg, NIL_REGISTER);
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_expr_chunk, compile_stmts_with_errors};
    use tidescript_ast::{Expr, MemberProp, Stmt};
    use tidescript_core::{CompileError, Span, StaticType};

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn plain_member_read() {
        let chunk = compile_expr_chunk(Expr::member(Expr::ident("obj", sp()), "field", sp()));
        chunk.assert_contains_opcodes(&[OpCode::GetGlobal, OpCode::GetProp]);
    }

    #[test]
    fn index_read() {
        let chunk = compile_expr_chunk(Expr::Member {
            object: Box::new(Expr::ident("arr", sp())),
            property: MemberProp::Index(Box::new(Expr::number(0.0, sp()))),
            optional: false,
            ty: StaticType::Unknown,
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::GetIndex]);
    }

    #[test]
    fn optional_link_jumps_to_shared_undefined_tail() {
        // a?.b
        let chunk = compile_expr_chunk(Expr::Member {
            object: Box::new(Expr::ident("a", sp())),
            property: MemberProp::Ident("b".into()),
            optional: true,
            ty: StaticType::Unknown,
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[
            OpCode::JumpIfNullish,
            OpCode::GetProp,
            OpCode::Jump,
            OpCode::LoadUndefined,
        ]);
    }

    #[test]
    fn nested_chain_shares_one_tail() {
        // a?.b?.c - two nullish tests, one undefined tail.
        let inner = Expr::Member {
            object: Box::new(Expr::ident("a", sp())),
            property: MemberProp::Ident("b".into()),
            optional: true,
            ty: StaticType::Unknown,
            span: sp(),
        };
        let chunk = compile_expr_chunk(Expr::Member {
            object: Box::new(inner),
            property: MemberProp::Ident("c".into()),
            optional: true,
            ty: StaticType::Unknown,
            span: sp(),
        });

        let nullish_tests = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::JumpIfNullish)
            .count();
        let undefined_tails = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::LoadUndefined)
            .count();
        assert_eq!(nullish_tests, 2);
        // One tail for the chain plus the completion-register preamble.
        assert_eq!(undefined_tails, 2);
    }

    #[test]
    fn private_field_read() {
        let chunk = compile_expr_chunk(Expr::Member {
            object: Box::new(Expr::ident("obj", sp())),
            property: MemberProp::Private("secret".into()),
            optional: false,
            ty: StaticType::Unknown,
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::GetPrivateField]);
    }

    #[test]
    fn super_outside_method_is_an_error() {
        let errors = compile_stmts_with_errors(vec![Stmt::expr(Expr::Member {
            object: Box::new(Expr::Super { span: sp() }),
            property: MemberProp::Ident("m".into()),
            optional: false,
            ty: StaticType::Unknown,
            span: sp(),
        })]);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CompileError::SuperOutsideMethod { .. }))
        );
    }
}
