//! C-style `for` loop compilation.

use tidescript_ast::{DeclKind, ForInit, Pattern, Stmt};
use tidescript_core::LimitError;

use crate::bytecode::OpCode;
use crate::driver::Compiler;
use crate::expr::destructure::PatternBind;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_for(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let Stmt::For {
            init,
            test,
            update,
            body,
            ..
        } = stmt
        else {
            unreachable!("compile_for on non-for");
        };

        // The head scope holds `let`/`const` loop variables.
        self.table.push(ScopeKind::Block);

        match init {
            Some(ForInit::Decl { kind, declarators }) => {
                for declarator in declarators {
                    self.set_line(declarator.span);
                    let value = match &declarator.init {
                        Some(init) => self.compile_expr(init, None)?,
                        None => {
                            let reg = self.alloc_reg()?;
                            self.emit_a(OpCode::LoadUndefined, reg);
                            reg
                        }
                    };
                    self.bind_loop_decl(*kind, &declarator.target, value)?;
                    self.free_reg(value);
                }
            }
            Some(ForInit::Expr(expr)) => {
                let reg = self.compile_expr(expr, None)?;
                self.free_reg(reg);
            }
            None => {}
        }

        let loop_start = self.chunk().current_offset();
        let exit = match test {
            Some(test) => {
                let cond = self.compile_expr(test, None)?;
                let exit = self.emit_jump(OpCode::JumpIfFalse, Some(cond));
                self.free_reg(cond);
                Some(exit)
            }
            None => None,
        };

        let completion = self.frame().completion;
        self.frame_mut().flow.enter_loop(loop_start, label, completion);
        self.table.push(ScopeKind::Block);
        self.compile_stmt(body)?;
        self.table.pop();
        let ctx = self.frame_mut().flow.exit_breakable();

        // Continue lands on the update expression.
        let update_pc = self.chunk().current_offset();
        for jump in ctx.continue_labels {
            self.patch_jump_to(jump, update_pc)?;
        }
        if let Some(update) = update {
            let reg = self.compile_expr(update, None)?;
            self.free_reg(reg);
        }
        self.emit_jump_back(loop_start)?;

        if let Some(exit) = exit {
            self.patch_jump(exit)?;
        }
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }

        self.table.pop();
        Ok(())
    }

    /// Bind a loop-head declaration: `var` targets its hoisted storage,
    /// `let`/`const` declare fresh bindings in the head scope.
    pub(crate) fn bind_loop_decl(
        &mut self,
        kind: DeclKind,
        pattern: &Pattern,
        value: crate::bytecode::Register,
    ) -> Result<(), LimitError> {
        match kind {
            DeclKind::Var => self.bind_pattern(pattern, value, PatternBind::Init),
            DeclKind::Let | DeclKind::Const => {
                self.bind_pattern(pattern, value, PatternBind::Declare)?;
                if kind == DeclKind::Const {
                    self.mark_const_bindings(pattern);
                }
                Ok(())
            }
        }
    }

    /// Flag every name a pattern just declared as const.
    pub(crate) fn mark_const_bindings(&mut self, pattern: &Pattern) {
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        let names: Vec<String> = names.into_iter().map(str::to_string).collect();
        let scope = self.table.current();
        for name in names {
            if let Some(symbol) = self.table.symbol_mut(scope, &name) {
                symbol.is_const = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{
        AssignOp, AssignTarget, BinaryOp, DeclKind, Declarator, Expr, ForInit, Pattern, Stmt,
        UpdateOp,
    };
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn counting_for(body: Box<Stmt>) -> Stmt {
        // for (let i = 0; i < 3; i++) body
        Stmt::For {
            init: Some(ForInit::Decl {
                kind: DeclKind::Let,
                declarators: vec![Declarator {
                    target: Pattern::Ident {
                        name: "i".into(),
                        span: sp(),
                    },
                    init: Some(Expr::number(0.0, sp())),
                    span: sp(),
                }],
            }),
            test: Some(Expr::binary(
                BinaryOp::Less,
                Expr::ident("i", sp()),
                Expr::number(3.0, sp()),
            )),
            update: Some(Expr::Update {
                op: UpdateOp::Inc,
                prefix: false,
                target: Box::new(Expr::ident("i", sp())),
                span: sp(),
            }),
            body,
            span: sp(),
        }
    }

    #[test]
    fn full_for_loop_shape() {
        let chunk = compile_stmts(vec![counting_for(Box::new(Stmt::Empty { span: sp() }))]);
        chunk.assert_contains_opcodes(&[
            OpCode::LoadConst,   // i = 0
            OpCode::Less,        // test
            OpCode::JumpIfFalse, // exit
            OpCode::Add,         // i++
            OpCode::Jump,        // back edge
        ]);
        assert_eq!(chunk.unpatched_jump(), None);
    }

    #[test]
    fn loop_variable_is_scoped_to_the_loop() {
        // for (let i = 0; ...) {}  i
        // The trailing read must not see the loop binding: it compiles as
        // a global-by-name lookup (runtime ReferenceError), not a register
        // read.
        let output = output_of(vec![
            counting_for(Box::new(Stmt::Empty { span: sp() })),
            Stmt::expr(Expr::ident("i", sp())),
        ]);
        assert!(output.is_success());
        // The final completion read is a GetGlobal, which the VM resolves
        // (and rejects) by name at runtime.
        let ops = output.chunk.opcodes();
        let last_read = ops
            .iter()
            .rev()
            .find(|op| matches!(op, OpCode::GetGlobal | OpCode::Move | OpCode::Return));
        assert!(last_read.is_some());
        output
            .chunk
            .assert_contains_opcodes(&[OpCode::GetGlobal, OpCode::Return]);
    }

    #[test]
    fn infinite_for_has_only_the_back_edge() {
        // for (;;) { break; }
        let output = output_of(vec![Stmt::For {
            init: None,
            test: None,
            update: None,
            body: Box::new(Stmt::Break {
                label: None,
                span: sp(),
            }),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
    }

    #[test]
    fn expression_init() {
        let output = output_of(vec![
            Stmt::decl(DeclKind::Let, "i", Some(Expr::number(0.0, sp())), sp()),
            Stmt::For {
                init: Some(ForInit::Expr(Expr::Assign {
                    op: AssignOp::Assign,
                    target: AssignTarget::Expr(Box::new(Expr::ident("i", sp()))),
                    value: Box::new(Expr::number(1.0, sp())),
                    span: sp(),
                })),
                test: Some(Expr::bool(false, sp())),
                update: None,
                body: Box::new(Stmt::Empty { span: sp() }),
                span: sp(),
            },
        ]);
        assert!(output.is_success());
    }
}
