//! Do-while loop compilation.

use tidescript_ast::Stmt;
use tidescript_core::LimitError;

use crate::bytecode::OpCode;
use crate::driver::Compiler;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    /// The body runs before the first test; continue lands on the test.
    pub(crate) fn compile_do_while(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let Stmt::DoWhile { body, cond, .. } = stmt else {
            unreachable!("compile_do_while on non-do-while");
        };

        let loop_start = self.chunk().current_offset();
        let completion = self.frame().completion;
        self.frame_mut().flow.enter_loop(loop_start, label, completion);
        self.table.push(ScopeKind::Block);
        self.compile_stmt(body)?;
        self.table.pop();
        let ctx = self.frame_mut().flow.exit_breakable();

        // Continue targets the condition test.
        let test_pc = self.chunk().current_offset();
        for jump in ctx.continue_labels {
            self.patch_jump_to(jump, test_pc)?;
        }

        let cond_reg = self.compile_expr(cond, None)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse, Some(cond_reg));
        self.free_reg(cond_reg);
        self.emit_jump_back(loop_start)?;
        self.patch_jump(exit)?;
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{Expr, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn body_precedes_the_test() {
        let chunk = compile_stmts(vec![Stmt::DoWhile {
            body: Box::new(Stmt::expr(Expr::number(1.0, sp()))),
            cond: Expr::bool(false, sp()),
            span: sp(),
        }]);
        chunk.assert_contains_opcodes(&[
            OpCode::LoadConst, // body
            OpCode::LoadFalse, // test
            OpCode::JumpIfFalse,
            OpCode::Jump,
        ]);
    }

    #[test]
    fn continue_lands_on_the_test() {
        let output = output_of(vec![Stmt::DoWhile {
            body: Box::new(Stmt::Continue {
                label: None,
                span: sp(),
            }),
            cond: Expr::bool(false, sp()),
            span: sp(),
        }]);
        assert!(output.is_success());
        assert_eq!(output.chunk.unpatched_jump(), None);
    }
}
