//! While loop compilation.

use tidescript_ast::Stmt;
use tidescript_core::LimitError;

use crate::bytecode::OpCode;
use crate::driver::Compiler;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_while(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
    ) -> Result<(), LimitError> {
        let Stmt::While { cond, body, .. } = stmt else {
            unreachable!("compile_while on non-while");
        };

        let loop_start = self.chunk().current_offset();
        let cond_reg = self.compile_expr(cond, None)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse, Some(cond_reg));
        self.free_reg(cond_reg);

        let completion = self.frame().completion;
        self.frame_mut().flow.enter_loop(loop_start, label, completion);
        self.table.push(ScopeKind::Block);
        self.compile_stmt(body)?;
        self.table.pop();
        let ctx = self.frame_mut().flow.exit_breakable();

        // Continue re-tests the condition.
        for jump in ctx.continue_labels {
            self.patch_jump_to(jump, ctx.loop_start)?;
        }
        self.emit_jump_back(ctx.loop_start)?;
        self.patch_jump(exit)?;
        for jump in ctx.break_labels {
            self.patch_jump(jump)?;
        }
        Ok(())
    }
}
