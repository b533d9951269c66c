//! Call, construction, and dynamic-import lowering.
//!
//! The call convention needs arguments contiguous: the callee sits in the
//! window base, the result replaces it, and arguments occupy the
//! registers immediately after (with the receiver between them for method
//! calls). When the checker knows the callee's signature and the site
//! passes fewer arguments than its arity, trailing optional parameters
//! are padded with undefined. Spread arguments leave the contiguous path
//! entirely: they collect into an array and use the dedicated spread-call
//! opcodes.

use tidescript_ast::{Expr, ExprOrSpread, MemberProp};
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_call(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match expr {
            Expr::Call {
                callee,
                args,
                optional,
                span,
            } => {
                if args.len() > usize::from(u8::MAX) {
                    return Ok(self.error(CompileError::Other {
                        message: "too many call arguments (max 255)".into(),
                        span: *span,
                    }));
                }
                match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                        ..
                    } => self.compile_method_call(
                        object,
                        property,
                        *member_optional,
                        args,
                        *optional,
                        hint,
                    ),
                    Expr::Super { span } => self.compile_super_call(args, *span, hint),
                    _ => self.compile_plain_call(callee, args, *optional, hint),
                }
            }
            Expr::New { callee, args, span } => {
                if args.len() > usize::from(u8::MAX) {
                    return Ok(self.error(CompileError::Other {
                        message: "too many call arguments (max 255)".into(),
                        span: *span,
                    }));
                }
                self.compile_new(callee, args, hint)
            }
            Expr::DynamicImport { arg, .. } => {
                let specifier = self.compile_expr(arg, None)?;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_ab(OpCode::DynamicImport, dst, specifier);
                self.free_reg(specifier);
                Ok(dst)
            }
            _ => unreachable!("compile_call on non-call"),
        }
    }

    fn compile_plain_call(
        &mut self,
        callee: &Expr,
        args: &[ExprOrSpread],
        optional: bool,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let mut shorts = Vec::new();

        if args.iter().any(|a| a.spread) {
            let window = self.frame_mut().regs.alloc_contiguous(1)?;
            self.compile_expr_to(callee, window)?;
            if optional {
                shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(window)));
            }
            let array = self.build_args_array(args)?;
            self.emit_ab(OpCode::CallSpread, window, array);
            self.free_reg(array);
            return self.finish_call(window, 0, hint, shorts);
        }

        let argc = self.padded_argc(callee, args.len());
        let window = self.frame_mut().regs.alloc_contiguous(1 + argc as u16)?;
        self.compile_expr_to(callee, window)?;
        if optional {
            shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(window)));
        }
        self.compile_args(args, argc, window + 1)?;
        self.emit_ab(OpCode::Call, window, argc);
        self.finish_call(window, argc, hint, shorts)
    }

    fn compile_method_call(
        &mut self,
        object: &Expr,
        property: &MemberProp,
        member_optional: bool,
        args: &[ExprOrSpread],
        optional: bool,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let mut shorts = Vec::new();
        let has_spread = args.iter().any(|a| a.spread);
        let argc = if has_spread {
            0
        } else {
            args.len() as u8
        };
        let window_len = if has_spread { 2 } else { 2 + argc as u16 };
        let window = self.frame_mut().regs.alloc_contiguous(window_len)?;
        let this_reg = window + 1;

        // Receiver into the slot immediately before the arguments.
        match object {
            Expr::Super { span } => {
                // super.m(...) runs on the current `this` with the method
                // looked up on the parent prototype.
                let proto = self.load_super_binding("__super_proto__", *span)?;
                self.emit_a(OpCode::LoadThis, this_reg);
                self.emit_method_load(window, proto, property)?;
                self.free_reg(proto);
            }
            // A member-chain receiver shares this call's short-circuit
            // tail, so `a?.b.c()` yields undefined without calling.
            Expr::Member { .. } => {
                self.compile_member_link(object, this_reg, &mut shorts)?;
                if member_optional {
                    shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(this_reg)));
                }
                self.emit_method_load(window, this_reg, property)?;
            }
            _ => {
                self.compile_expr_to(object, this_reg)?;
                if member_optional {
                    shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(this_reg)));
                }
                self.emit_method_load(window, this_reg, property)?;
            }
        }

        if optional {
            shorts.push(self.emit_jump(OpCode::JumpIfNullish, Some(window)));
        }

        if has_spread {
            let array = self.build_args_array(args)?;
            self.emit_ab(OpCode::CallMethodSpread, window, array);
            self.free_reg(array);
            self.finish_call(window, 1, hint, shorts)
        } else {
            self.compile_args(args, argc, window + 2)?;
            self.emit_ab(OpCode::CallMethod, window, argc);
            self.finish_call(window, 1 + argc, hint, shorts)
        }
    }

    fn compile_super_call(
        &mut self,
        args: &[ExprOrSpread],
        span: tidescript_core::Span,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let ctor = self.load_super_binding("__super_ctor__", span)?;
        if ctor == crate::bytecode::NIL_REGISTER {
            return Ok(ctor);
        }

        let argc = args.len() as u8;
        let window = self.frame_mut().regs.alloc_contiguous(2 + argc as u16)?;
        self.emit_ab(OpCode::Move, window, ctor);
        self.free_reg(ctor);
        self.emit_a(OpCode::LoadThis, window + 1);
        if args.iter().any(|a| a.spread) {
            let array = self.build_args_array(args)?;
            self.emit_ab(OpCode::CallMethodSpread, window, array);
            self.free_reg(array);
        } else {
            self.compile_args(args, argc, window + 2)?;
            self.emit_ab(OpCode::CallMethod, window, argc);
        }
        self.finish_call(window, 1 + argc, hint, Vec::new())
    }

    fn compile_new(
        &mut self,
        callee: &Expr,
        args: &[ExprOrSpread],
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        if args.iter().any(|a| a.spread) {
            let window = self.frame_mut().regs.alloc_contiguous(1)?;
            self.compile_expr_to(callee, window)?;
            let array = self.build_args_array(args)?;
            self.emit_ab(OpCode::NewSpread, window, array);
            self.free_reg(array);
            return self.finish_call(window, 0, hint, Vec::new());
        }

        let argc = self.padded_argc(callee, args.len());
        let window = self.frame_mut().regs.alloc_contiguous(1 + argc as u16)?;
        self.compile_expr_to(callee, window)?;
        self.compile_args(args, argc, window + 1)?;
        self.emit_ab(OpCode::New, window, argc);
        self.finish_call(window, argc, hint, Vec::new())
    }

    /// Load a method into the window base from a receiver register.
    fn emit_method_load(
        &mut self,
        dst: Register,
        receiver: Register,
        property: &MemberProp,
    ) -> Result<(), LimitError> {
        match property {
            MemberProp::Ident(name) => {
                let name_const = self.str_const(name)?;
                self.emit_ab(OpCode::GetProp, dst, receiver);
                self.emit_u16(name_const);
            }
            MemberProp::Private(name) => {
                let name_const = self.str_const(name)?;
                self.emit_ab(OpCode::GetPrivateField, dst, receiver);
                self.emit_u16(name_const);
            }
            MemberProp::Index(index) => {
                let key = self.compile_expr(index, None)?;
                self.emit_abc(OpCode::GetIndex, dst, receiver, key);
                self.free_reg(key);
            }
        }
        Ok(())
    }

    /// Compile positional arguments into the window, padding trailing
    /// optional parameters with undefined up to `argc`.
    fn compile_args(
        &mut self,
        args: &[ExprOrSpread],
        argc: u8,
        first: Register,
    ) -> Result<(), LimitError> {
        for (index, arg) in args.iter().enumerate() {
            debug_assert!(!arg.spread);
            self.compile_expr_to(&arg.expr, first + index as Register)?;
        }
        for index in args.len()..usize::from(argc) {
            self.emit_a(OpCode::LoadUndefined, first + index as Register);
        }
        Ok(())
    }

    /// Effective argument count after undefined-padding against the
    /// callee's checked signature.
    fn padded_argc(&self, callee: &Expr, provided: usize) -> u8 {
        match callee.static_type().callable_signature() {
            Some((arity, _)) if provided < usize::from(arity) => arity,
            _ => provided as u8,
        }
    }

    /// Collect arguments (with spreads) into a fresh array register.
    fn build_args_array(&mut self, args: &[ExprOrSpread]) -> Result<Register, LimitError> {
        let array = self.alloc_reg()?;
        self.emit_a(OpCode::NewArray, array);
        for arg in args {
            let value = self.compile_expr(&arg.expr, None)?;
            if arg.spread {
                self.emit_ab(OpCode::ArrayExtend, array, value);
            } else {
                self.emit_ab(OpCode::ArrayAppend, array, value);
            }
            self.free_reg(value);
        }
        Ok(array)
    }

    /// Close the optional-chain shorts, land the result, and release the
    /// call window's argument registers.
    fn finish_call(
        &mut self,
        window: Register,
        extra_regs: u8,
        hint: Option<Register>,
        shorts: Vec<usize>,
    ) -> Result<Register, LimitError> {
        self.finish_optional_chain(window, shorts)?;
        for offset in (1..=extra_regs).rev() {
            self.free_reg(window + offset);
        }
        match hint {
            Some(dst) if dst != window => {
                self.emit_ab(OpCode::Move, dst, window);
                self.free_reg(window);
                Ok(dst)
            }
            _ => Ok(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_expr_chunk, compile_stmts, first_function};
    use tidescript_ast::{DeclKind, Expr, ExprOrSpread, FunctionLit, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn plain_call_uses_a_contiguous_window() {
        // f(1, 2) - callee at w, args at w+1, w+2.
        let chunk = compile_expr_chunk(Expr::call(
            Expr::ident("f", sp()),
            vec![Expr::number(1.0, sp()), Expr::number(2.0, sp())],
            sp(),
        ));
        let (pc, _) = chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Call)
            .expect("call emitted");
        let callee = chunk.read_byte(pc + 1).unwrap();
        let argc = chunk.read_byte(pc + 2).unwrap();
        assert_eq!(argc, 2);

        // The two argument loads target callee+1 and callee+2.
        let loads: Vec<u8> = chunk
            .instructions()
            .into_iter()
            .filter(|(_, op)| *op == OpCode::LoadConst)
            .map(|(pc, _)| chunk.read_byte(pc + 1).unwrap())
            .collect();
        assert!(loads.contains(&(callee + 1)));
        assert!(loads.contains(&(callee + 2)));
    }

    #[test]
    fn method_call_places_receiver_before_args() {
        let chunk = compile_expr_chunk(Expr::call(
            Expr::member(Expr::ident("obj", sp()), "m", sp()),
            vec![Expr::number(1.0, sp())],
            sp(),
        ));
        chunk.assert_contains_opcodes(&[OpCode::GetProp, OpCode::CallMethod]);
        let (pc, _) = chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::CallMethod)
            .unwrap();
        assert_eq!(chunk.read_byte(pc + 2), Some(1)); // argc
    }

    #[test]
    fn spread_arguments_use_the_spread_call_path() {
        let chunk = compile_expr_chunk(Expr::Call {
            callee: Box::new(Expr::ident("f", sp())),
            args: vec![ExprOrSpread {
                spread: true,
                expr: Expr::ident("parts", sp()),
            }],
            optional: false,
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::NewArray, OpCode::ArrayExtend, OpCode::CallSpread]);
    }

    #[test]
    fn optional_call_short_circuits() {
        let chunk = compile_expr_chunk(Expr::Call {
            callee: Box::new(Expr::ident("maybe", sp())),
            args: vec![],
            optional: true,
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[
            OpCode::JumpIfNullish,
            OpCode::Call,
            OpCode::Jump,
            OpCode::LoadUndefined,
        ]);
    }

    #[test]
    fn known_signature_pads_missing_optionals_with_undefined() {
        // const f = function(a, b, c) {}; f(1)
        // The checker sees arity 3; the call site pads to 3 arguments.
        let chunk = compile_stmts(vec![
            Stmt::decl(
                DeclKind::Const,
                "f",
                Some(Expr::Function(FunctionLit::plain(
                    None,
                    &["a", "b", "c"],
                    vec![],
                    sp(),
                ))),
                sp(),
            ),
            Stmt::expr(Expr::call(
                Expr::ident("f", sp()),
                vec![Expr::number(1.0, sp())],
                sp(),
            )),
        ]);
        let _ = first_function(&chunk);
        let (pc, _) = chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Call)
            .unwrap();
        assert_eq!(chunk.read_byte(pc + 2), Some(3)); // padded argc
        let undefined_loads = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::LoadUndefined)
            .count();
        // Completion preamble + two padded arguments.
        assert!(undefined_loads >= 3);
    }

    #[test]
    fn new_expression() {
        let chunk = compile_expr_chunk(Expr::New {
            callee: Box::new(Expr::ident("Point", sp())),
            args: vec![ExprOrSpread {
                spread: false,
                expr: Expr::number(1.0, sp()),
            }],
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::GetGlobal, OpCode::New]);
    }

    #[test]
    fn dynamic_import() {
        let chunk = compile_expr_chunk(Expr::DynamicImport {
            arg: Box::new(Expr::str("./mod.ts", sp())),
            span: sp(),
        });
        chunk.assert_contains_opcodes(&[OpCode::LoadConst, OpCode::DynamicImport]);
    }
}
