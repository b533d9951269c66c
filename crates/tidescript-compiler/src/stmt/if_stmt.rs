//! If statement compilation.

use tidescript_ast::Stmt;
use tidescript_core::LimitError;

use crate::bytecode::OpCode;
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_if(&mut self, stmt: &Stmt) -> Result<(), LimitError> {
        let Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } = stmt
        else {
            unreachable!("compile_if on non-if");
        };

        let cond_reg = self.compile_expr(cond, None)?;
        let to_else = self.emit_jump(OpCode::JumpIfFalse, Some(cond_reg));
        self.free_reg(cond_reg);

        self.compile_stmt(then_branch)?;

        match else_branch {
            Some(else_branch) => {
                let to_end = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(to_else)?;
                self.compile_stmt(else_branch)?;
                self.patch_jump(to_end)?;
            }
            None => self.patch_jump(to_else)?,
        }
        Ok(())
    }
}
