//! Literal lowering: numbers, strings, booleans, null, bigints, regexes,
//! and template literals.

use tidescript_ast::Expr;
use tidescript_core::LimitError;

use crate::bytecode::{Constant, OpCode, Register};
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_literal(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        match expr {
            Expr::Number { value, .. } => {
                self.emit_load_const(dst, Constant::Number(*value))?;
            }
            Expr::BigInt { value, .. } => {
                self.emit_load_const(dst, Constant::BigInt(value.clone()))?;
            }
            Expr::Str { value, .. } => {
                self.emit_load_const(dst, Constant::Str(value.clone()))?;
            }
            Expr::Bool { value, .. } => {
                self.emit_a(if *value { OpCode::LoadTrue } else { OpCode::LoadFalse }, dst);
            }
            Expr::Null { .. } => {
                self.emit_a(OpCode::LoadNull, dst);
            }
            Expr::Regex { pattern, flags, .. } => {
                // Pattern validity is deferred to constant materialization.
                self.emit_load_const(
                    dst,
                    Constant::Regex {
                        pattern: pattern.clone(),
                        flags: flags.clone(),
                    },
                )?;
            }
            Expr::Template { quasis, exprs, .. } => {
                self.compile_template(dst, quasis, exprs)?;
            }
            _ => unreachable!("compile_literal on non-literal"),
        }
        Ok(dst)
    }

    /// Template literals fold left: start from the first quasi and `Add`
    /// each interpolation and following quasi. `Add` performs the string
    /// coercion at runtime.
    fn compile_template(
        &mut self,
        dst: Register,
        quasis: &[String],
        exprs: &[Expr],
    ) -> Result<(), LimitError> {
        debug_assert_eq!(quasis.len(), exprs.len() + 1);

        self.emit_load_const(dst, Constant::Str(quasis[0].clone()))?;
        for (expr, quasi) in exprs.iter().zip(&quasis[1..]) {
            let part = self.compile_expr(expr, None)?;
            self.emit_abc(OpCode::Add, dst, dst, part);
            self.free_reg(part);

            if !quasi.is_empty() {
                let tail = self.alloc_reg()?;
                self.emit_load_const(tail, Constant::Str(quasi.clone()))?;
                self.emit_abc(OpCode::Add, dst, dst, tail);
                self.free_reg(tail);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::{Constant, OpCode};
    use crate::test_support::{compile_expr_chunk, compile_stmts};
    use tidescript_ast::Expr;
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn number_literal() {
        let chunk = compile_expr_chunk(Expr::number(123.45, sp()));
        chunk.assert_contains_opcodes(&[OpCode::LoadConst, OpCode::Return]);
        assert!(
            chunk
                .constants()
                .constants()
                .iter()
                .any(|c| matches!(c, Constant::Number(n) if *n == 123.45))
        );
    }

    #[test]
    fn boolean_literals_use_dedicated_loads() {
        let chunk = compile_expr_chunk(Expr::bool(true, sp()));
        chunk.assert_contains_opcodes(&[OpCode::LoadTrue]);

        let chunk = compile_expr_chunk(Expr::bool(false, sp()));
        chunk.assert_contains_opcodes(&[OpCode::LoadFalse]);
    }

    #[test]
    fn duplicate_string_constants_share_a_slot() {
        let chunk = compile_stmts(vec![
            tidescript_ast::Stmt::expr(Expr::str("dup", sp())),
            tidescript_ast::Stmt::expr(Expr::str("dup", sp())),
        ]);
        let strings = chunk
            .constants()
            .constants()
            .iter()
            .filter(|c| matches!(c, Constant::Str(s) if s == "dup"))
            .count();
        assert_eq!(strings, 1);
    }

    #[test]
    fn regex_literal_stores_pattern_and_flags() {
        let chunk = compile_expr_chunk(Expr::Regex {
            pattern: "a+b".into(),
            flags: "gi".into(),
            span: sp(),
        });
        assert!(chunk.constants().constants().iter().any(
            |c| matches!(c, Constant::Regex { pattern, flags } if pattern == "a+b" && flags == "gi")
        ));
    }

    #[test]
    fn template_concatenates_with_add() {
        // `before${x}after`
        let chunk = compile_expr_chunk(Expr::Template {
            quasis: vec!["before".into(), "after".into()],
            exprs: vec![Expr::number(1.0, sp())],
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[
            OpCode::LoadConst, // "before"
            OpCode::LoadConst, // 1.0
            OpCode::Add,
            OpCode::LoadConst, // "after"
            OpCode::Add,
        ]);
    }

    #[test]
    fn template_skips_empty_tail_quasis() {
        // `${x}` - one empty leading and trailing quasi.
        let chunk = compile_expr_chunk(Expr::Template {
            quasis: vec!["".into(), "".into()],
            exprs: vec![Expr::number(1.0, sp())],
            span: sp(),
        });
        let adds = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::Add)
            .count();
        assert_eq!(adds, 1);
    }
}
