//! Switch statement compilation.
//!
//! Lowered as a chain of strict-equality tests jumping to their case
//! bodies, which are laid out in source order so fallthrough is the
//! natural control flow. The whole switch body is one lexical scope.

use tidescript_ast::Stmt;
use tidescript_core::LimitError;

use crate::bytecode::OpCode;
use crate::driver::Compiler;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_switch(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let Stmt::Switch { disc, cases, .. } = stmt else {
            unreachable!("compile_switch on non-switch");
        };

        let disc_reg = self.compile_expr(disc, None)?;

        self.table.push(ScopeKind::Block);
        for case in cases {
            self.hoist_statements(&case.body, false)?;
        }
        self.frame_mut().flow.enter_switch(label);

        // Test chain: each matching case jumps to its body.
        let mut body_jumps: Vec<Option<usize>> = Vec::with_capacity(cases.len());
        for case in cases {
            match &case.test {
                Some(test) => {
                    self.set_line(case.span);
                    let test_reg = self.compile_expr(test, None)?;
                    let cmp = self.alloc_reg()?;
                    self.emit_abc(OpCode::StrictEq, cmp, disc_reg, test_reg);
                    self.free_reg(test_reg);
                    let next_test = self.emit_jump(OpCode::JumpIfFalse, Some(cmp));
                    self.free_reg(cmp);
                    body_jumps.push(Some(self.emit_jump(OpCode::Jump, None)));
                    self.patch_jump(next_test)?;
                }
                None => body_jumps.push(None),
            }
        }

        // No test matched: go to the default clause, or past the switch.
        let to_default = self.emit_jump(OpCode::Jump, None);
        let mut default_patched = false;

        // Bodies in source order; fallthrough is implicit.
        for (case, body_jump) in cases.iter().zip(&body_jumps) {
            match body_jump {
                Some(jump) => self.patch_jump(*jump)?,
                None => {
                    self.patch_jump(to_default)?;
                    default_patched = true;
                }
            }
            for stmt in &case.body {
                self.compile_stmt(stmt)?;
            }
        }

        let ctx = self.frame_mut().flow.exit_breakable();
        if !default_patched {
            self.patch_jump(to_default)?;
        }
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }

        self.table.pop();
        self.free_reg(disc_reg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{Expr, Stmt, SwitchCase};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn switch_on_x(cases: Vec<SwitchCase>) -> Stmt {
        Stmt::Switch {
            disc: Expr::ident("x", sp()),
            cases,
            span: sp(),
        }
    }

    #[test]
    fn cases_compare_with_strict_equality() {
        let chunk = compile_stmts(vec![switch_on_x(vec![
            SwitchCase {
                test: Some(Expr::number(1.0, sp())),
                body: vec![Stmt::expr(Expr::number(10.0, sp()))],
                span: sp(),
            },
            SwitchCase {
                test: Some(Expr::number(2.0, sp())),
                body: vec![Stmt::expr(Expr::number(20.0, sp()))],
                span: sp(),
            },
        ])]);
        let eq_count = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::StrictEq)
            .count();
        assert_eq!(eq_count, 2);
        assert_eq!(chunk.unpatched_jump(), None);
    }

    #[test]
    fn default_clause_catches_unmatched() {
        let output = output_of(vec![switch_on_x(vec![
            SwitchCase {
                test: Some(Expr::number(1.0, sp())),
                body: vec![Stmt::Break {
                    label: None,
                    span: sp(),
                }],
                span: sp(),
            },
            SwitchCase {
                test: None,
                body: vec![Stmt::expr(Expr::number(99.0, sp()))],
                span: sp(),
            },
        ])]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
    }

    #[test]
    fn switch_without_default_jumps_past() {
        let output = output_of(vec![switch_on_x(vec![SwitchCase {
            test: Some(Expr::number(1.0, sp())),
            body: vec![],
            span: sp(),
        }])]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
    }

    #[test]
    fn break_in_case_exits_the_switch() {
        let output = output_of(vec![switch_on_x(vec![
            SwitchCase {
                test: Some(Expr::number(1.0, sp())),
                body: vec![Stmt::Break {
                    label: None,
                    span: sp(),
                }],
                span: sp(),
            },
            SwitchCase {
                test: None,
                body: vec![],
                span: sp(),
            },
        ])]);
        assert!(output.is_success());
    }
}
