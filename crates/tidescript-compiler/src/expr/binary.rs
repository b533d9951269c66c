//! Binary operators, short-circuiting logical operators, and the
//! conditional expression.

use tidescript_ast::{BinaryOp, Expr, LogicalOp};
use tidescript_core::LimitError;

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;

/// Map a non-short-circuiting binary operator to its opcode.
pub(crate) fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Mod => OpCode::Mod,
        BinaryOp::Exp => OpCode::Exp,
        BinaryOp::BitAnd => OpCode::BitAnd,
        BinaryOp::BitOr => OpCode::BitOr,
        BinaryOp::BitXor => OpCode::BitXor,
        BinaryOp::Shl => OpCode::Shl,
        BinaryOp::Shr => OpCode::Shr,
        BinaryOp::Ushr => OpCode::Ushr,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::NotEq => OpCode::NotEq,
        BinaryOp::StrictEq => OpCode::StrictEq,
        BinaryOp::StrictNotEq => OpCode::StrictNotEq,
        BinaryOp::Less => OpCode::Less,
        BinaryOp::LessEq => OpCode::LessEq,
        BinaryOp::Greater => OpCode::Greater,
        BinaryOp::GreaterEq => OpCode::GreaterEq,
        BinaryOp::In => OpCode::In,
        BinaryOp::InstanceOf => OpCode::InstanceOf,
    }
}

impl<'h> Compiler<'h> {
    pub(crate) fn compile_binary(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match expr {
            Expr::Binary {
                op, left, right, ..
            } => {
                let left_reg = self.compile_expr(left, None)?;
                let right_reg = self.compile_expr(right, None)?;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_abc(binary_opcode(*op), dst, left_reg, right_reg);
                self.free_reg(right_reg);
                self.free_reg(left_reg);
                Ok(dst)
            }
            Expr::Logical {
                op, left, right, ..
            } => self.compile_logical(*op, left, right, hint),
            Expr::Cond {
                test,
                consequent,
                alternate,
                ..
            } => {
                let dst = self.hint_or_alloc(hint)?;
                let test_reg = self.compile_expr(test, None)?;
                let to_alternate = self.emit_jump(OpCode::JumpIfFalse, Some(test_reg));
                self.free_reg(test_reg);

                self.compile_expr_to(consequent, dst)?;
                let done = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(to_alternate)?;
                self.compile_expr_to(alternate, dst)?;
                self.patch_jump(done)?;
                Ok(dst)
            }
            _ => unreachable!("compile_binary on non-binary"),
        }
    }

    /// Short-circuit lowering: the left operand lands in the destination;
    /// the right operand is only evaluated (into the same destination)
    /// when the operator requires it.
    fn compile_logical(
        &mut self,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        self.compile_expr_to(left, dst)?;

        match op {
            LogicalOp::And => {
                // Falsey left is the result; skip the right operand.
                let short = self.emit_jump(OpCode::JumpIfFalse, Some(dst));
                self.compile_expr_to(right, dst)?;
                self.patch_jump(short)?;
            }
            LogicalOp::Or => {
                // Falsey left: evaluate the right operand.
                let take_right = self.emit_jump(OpCode::JumpIfFalse, Some(dst));
                let done = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(take_right)?;
                self.compile_expr_to(right, dst)?;
                self.patch_jump(done)?;
            }
            LogicalOp::Nullish => {
                let take_right = self.emit_jump(OpCode::JumpIfNullish, Some(dst));
                let done = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(take_right)?;
                self.compile_expr_to(right, dst)?;
                self.patch_jump(done)?;
            }
        }
        Ok(dst)
    }
}
