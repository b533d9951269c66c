//! Function-body compilation and the closure/upvalue machinery.
//!
//! Compiling a function literal pushes a fresh frame (chunk, register
//! allocator, free-symbol list) whose scope boundary is the enclosing
//! frame's current scope-table depth, compiles parameters and body, then
//! pops the frame and freezes it into a [`FunctionProto`] constant. The
//! enclosing frame then emits the `Closure` instruction with one capture
//! descriptor per free symbol:
//!
//! - self-reference to the closure being built -> capture from the
//!   destination register
//! - local of the enclosing frame -> capture from register (marks the
//!   enclosing function's local-captures flag and pins the register)
//! - spilled local of the enclosing frame -> capture from spill slot
//! - binding of a further-out frame -> registered as the enclosing frame's
//!   own free symbol and captured from upvalue
//!
//! Free symbols deduplicate by (name, source), so no closure captures the
//! same binding twice.

use std::rc::Rc;

use tidescript_ast::{FnBody, FunctionLit, Pattern};
use tidescript_core::LimitError;

use crate::bytecode::{
    CaptureTag, Constant, FunctionFlags, FunctionProto, NIL_REGISTER, OpCode, Register,
};
use crate::driver::{Compiler, FuncFrame};
use crate::scope::{CaptureSource, FreeSymbol, ScopeKind, Storage, Symbol};

impl<'h> Compiler<'h> {
    // ========================================================================
    // Free-variable resolution
    // ========================================================================

    /// Resolve a binding that lives across the current frame's scope
    /// boundary into an upvalue index of the current function, registering
    /// intermediate captures along the frame chain.
    pub(crate) fn resolve_free(
        &mut self,
        name: &str,
        defining_scope: usize,
    ) -> Result<u16, LimitError> {
        let owner = self.owning_frame(defining_scope);
        let current = self.frames.len() - 1;
        debug_assert!(owner < current, "resolve_free on a same-frame binding");

        let symbol = self
            .table
            .symbol(defining_scope, name)
            .expect("free symbol vanished")
            .clone();

        let mut source = match symbol.storage {
            Storage::Register(reg) => {
                if symbol.is_function_self {
                    CaptureSource::SelfClosure
                } else {
                    if reg == NIL_REGISTER {
                        panic!("binding '{name}' resolved to the nil register");
                    }
                    self.frames[owner].flags |= FunctionFlags::LOCAL_CAPTURES;
                    self.frames[owner].regs.pin(reg);
                    CaptureSource::Register(reg)
                }
            }
            Storage::Spill(slot) => CaptureSource::Spill(slot),
            Storage::Global(_) | Storage::Upvalue(_) => {
                unreachable!("globals and upvalues never cross the boundary")
            }
        };

        let mut index = 0;
        for frame in owner + 1..=current {
            index = self.add_free(
                frame,
                FreeSymbol {
                    name: name.to_string(),
                    source,
                },
            )?;
            source = CaptureSource::Upvalue(index);
        }
        Ok(index)
    }

    /// The frame owning a scope-table index.
    fn owning_frame(&self, scope: usize) -> usize {
        self.frames
            .iter()
            .rposition(|frame| frame.scope_base <= scope)
            .expect("scope below every frame")
    }

    /// Add a free symbol to a frame, deduplicating by (name, source).
    fn add_free(&mut self, frame: usize, free: FreeSymbol) -> Result<u16, LimitError> {
        let list = &mut self.frames[frame].free_symbols;
        if let Some(existing) = list.iter().position(|f| *f == free) {
            return Ok(existing as u16);
        }
        if list.len() >= usize::from(u16::MAX) {
            return Err(LimitError::TooManyUpvalues);
        }
        list.push(free);
        Ok((list.len() - 1) as u16)
    }

    // ========================================================================
    // Function literals
    // ========================================================================

    /// Compile a function literal into a closure in `dst`.
    ///
    /// `skip_self_binding` suppresses the named-expression self binding:
    /// methods are reached through their object, and hoisted declarations
    /// already have their name declared in scope.
    pub(crate) fn compile_function_literal(
        &mut self,
        func: &FunctionLit,
        hint: Option<Register>,
        skip_self_binding: bool,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;

        // Named function expression: pre-bind the name to the nil-register
        // sentinel so the body's identifier resolution classifies the
        // self-reference as an upvalue; the closure emitter substitutes
        // the destination register.
        let has_self_binding = !skip_self_binding && !func.is_arrow && func.name.is_some();
        if has_self_binding {
            self.table.push(ScopeKind::Block);
            let mut symbol = Symbol::register(
                func.name.clone().expect("named expression"),
                NIL_REGISTER,
                func.span,
            );
            symbol.is_function_self = true;
            self.table
                .declare(symbol)
                .expect("fresh scope cannot collide");
        }

        let (proto, free) = self.compile_function_proto(func)?;

        if has_self_binding {
            self.table.pop();
        }

        self.emit_closure(dst, proto, &free)?;
        Ok(dst)
    }

    /// Compile a function literal into a frozen prototype plus its
    /// free-symbol list (the caller emits the closure instruction).
    pub(crate) fn compile_function_proto(
        &mut self,
        func: &FunctionLit,
    ) -> Result<(FunctionProto, Vec<FreeSymbol>), LimitError> {
        let name = func.name.clone().unwrap_or_default();
        let mut strict = self.strict();
        if let FnBody::Block(body) = &func.body {
            strict = strict || body.iter().map_while(|s| s.directive()).any(|d| d == "use strict");
        }

        let scope_base = self.table.depth();
        self.frames
            .push(FuncFrame::new(name.clone(), strict, scope_base));
        self.table.push(ScopeKind::Function);

        if func.is_generator {
            self.frame_mut().flags |= FunctionFlags::GENERATOR;
        }
        if func.is_async {
            self.frame_mut().flags |= FunctionFlags::ASYNC;
        }
        if func.is_arrow {
            self.frame_mut().flags |= FunctionFlags::ARROW;
        }
        if strict {
            self.frame_mut().flags |= FunctionFlags::STRICT;
        }

        self.set_line(func.span);
        self.bind_parameters(func)?;

        match &func.body {
            FnBody::Block(body) => {
                self.hoist_statements(body, true)?;
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                // Fall-through return.
                self.emit(OpCode::ReturnUndefined);
            }
            FnBody::Expr(expr) => {
                let value = self.compile_expr(expr, None)?;
                self.emit_a(OpCode::Return, value);
            }
        }

        let scope = self.table.pop();
        debug_assert_eq!(scope.kind, ScopeKind::Function);
        let frame = self.frames.pop().expect("function frame");

        let mut chunk = frame.chunk;
        if let Some(operand) = chunk.unpatched_jump() {
            panic!("unpatched placeholder jump at operand offset {operand}");
        }
        chunk.max_regs = frame.regs.max_regs().min(255) as u8;
        chunk.spill_slots = frame.regs.spill_count();
        chunk.strict = frame.strict;

        let arity = func.params.len().min(usize::from(u8::MAX)) as u8;
        let length = func
            .params
            .iter()
            .take_while(|p| p.default.is_none() && matches!(p.pattern, Pattern::Ident { .. }))
            .count() as u8;

        let mut flags = frame.flags;
        if func.rest.is_some() {
            flags |= FunctionFlags::REST;
        }

        let proto = FunctionProto {
            name,
            arity,
            length,
            upvalue_count: frame.free_symbols.len() as u16,
            reg_size: chunk.max_regs,
            spill_slots: chunk.spill_slots,
            flags,
            chunk: Rc::new(chunk),
        };
        Ok((proto, frame.free_symbols))
    }

    /// Bind parameters to the leading frame registers.
    ///
    /// Arguments arrive in registers `0..arity` (plus the rest array at
    /// register `arity`). Simple parameter lists bind names directly onto
    /// those registers. Parameter lists with defaults or destructuring
    /// re-bind into fresh registers pre-set to the Uninitialized marker,
    /// so a default that reads a not-yet-bound later parameter hits the
    /// runtime TDZ check.
    fn bind_parameters(&mut self, func: &FunctionLit) -> Result<(), LimitError> {
        let arity = func.params.len() as u16;
        let raw_count = arity + u16::from(func.rest.is_some());
        let raw_base = if raw_count > 0 {
            self.frame_mut().regs.alloc_contiguous(raw_count)?
        } else {
            0
        };
        debug_assert_eq!(raw_base, 0, "parameters must start the register file");

        let simple = func
            .params
            .iter()
            .all(|p| p.default.is_none() && matches!(p.pattern, Pattern::Ident { .. }));

        if simple {
            for (index, param) in func.params.iter().enumerate() {
                let Pattern::Ident { name, span } = &param.pattern else {
                    unreachable!()
                };
                let reg = index as Register;
                self.pin_reg(reg);
                self.table
                    .declare(Symbol::register(name.clone(), reg, *span))
                    .unwrap_or_else(|err| {
                        self.error(err);
                    });
            }
        } else {
            // Pre-declare every identifier parameter in TDZ on a fresh
            // register.
            let mut bound: Vec<Register> = Vec::with_capacity(func.params.len());
            for param in &func.params {
                let reg = self.alloc_reg()?;
                self.pin_reg(reg);
                self.emit_a(OpCode::LoadUninitialized, reg);
                bound.push(reg);
                if let Pattern::Ident { name, span } = &param.pattern {
                    let mut symbol = Symbol::register(name.clone(), reg, *span);
                    symbol.is_tdz = true;
                    self.table.declare(symbol).unwrap_or_else(|err| {
                        self.error(err);
                    });
                }
            }

            for (index, param) in func.params.iter().enumerate() {
                self.set_line(param.span);
                let raw = index as Register;
                let reg = bound[index];

                match &param.default {
                    Some(default) => {
                        let apply = self.emit_jump(OpCode::JumpIfUndefined, Some(raw));
                        self.emit_ab(OpCode::Move, reg, raw);
                        let skip = self.emit_jump(OpCode::Jump, None);
                        self.patch_jump(apply)?;
                        self.compile_expr_to(default, reg)?;
                        self.patch_jump(skip)?;
                    }
                    None => self.emit_ab(OpCode::Move, reg, raw),
                }

                match &param.pattern {
                    Pattern::Ident { name, .. } => {
                        let scope = self.table.current();
                        self.table.mark_initialized(scope, name);
                    }
                    pattern => {
                        // Destructuring parameters expand after binding.
                        self.bind_pattern(pattern, reg, crate::expr::destructure::PatternBind::Declare)?;
                    }
                }
            }
        }

        if let Some(rest) = &func.rest {
            let rest_reg = arity as Register;
            self.pin_reg(rest_reg);
            match rest {
                Pattern::Ident { name, span } => {
                    self.table
                        .declare(Symbol::register(name.clone(), rest_reg, *span))
                        .unwrap_or_else(|err| {
                            self.error(err);
                        });
                }
                pattern => {
                    // Synthetic binding carrying the collected rest array,
                    // then the pattern expands from it.
                    self.table
                        .declare(Symbol::register("__rest__", rest_reg, pattern.span()))
                        .unwrap_or_else(|err| {
                            self.error(err);
                        });
                    self.bind_pattern(pattern, rest_reg, crate::expr::destructure::PatternBind::Declare)?;
                }
            }
        }

        Ok(())
    }

    // ========================================================================
    // Closure emission
    // ========================================================================

    /// Emit the closure instruction for a compiled prototype.
    ///
    /// The upvalue count in the instruction always equals the free-symbol
    /// list length; the wide form is used past 255 captures.
    pub(crate) fn emit_closure(
        &mut self,
        dst: Register,
        proto: FunctionProto,
        free: &[FreeSymbol],
    ) -> Result<(), LimitError> {
        let count = free.len();
        if count > usize::from(u16::MAX) {
            return Err(LimitError::TooManyUpvalues);
        }

        let const_index = self.add_const(Constant::Function(Rc::new(proto)))?;
        if count > usize::from(u8::MAX) {
            self.emit_a(OpCode::ClosureWide, dst);
            self.emit_u16(const_index);
            self.emit_u16(count as u16);
        } else {
            self.emit_a(OpCode::Closure, dst);
            self.emit_u16(const_index);
            self.emit_byte(count as u8);
        }

        for symbol in free {
            match symbol.source {
                CaptureSource::SelfClosure => {
                    self.emit_byte(CaptureTag::FromRegister as u8);
                    self.emit_byte(dst);
                }
                CaptureSource::Register(reg) => {
                    self.emit_byte(CaptureTag::FromRegister as u8);
                    self.emit_byte(reg);
                }
                CaptureSource::Spill(slot) => {
                    if slot <= u16::from(u8::MAX) {
                        self.emit_byte(CaptureTag::FromSpill as u8);
                        self.emit_byte(slot as u8);
                    } else {
                        self.emit_byte(CaptureTag::FromSpill16 as u8);
                        self.emit_u16(slot);
                    }
                }
                CaptureSource::Upvalue(index) => {
                    if index <= u16::from(u8::MAX) {
                        self.emit_byte(CaptureTag::FromUpvalue as u8);
                        self.emit_byte(index as u8);
                    } else {
                        self.emit_byte(CaptureTag::FromUpvalue16 as u8);
                        self.emit_u16(index);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::{CaptureTag, Constant, FunctionFlags, OpCode};
    use crate::test_support::{compile_stmts, first_function};
    use tidescript_ast::{DeclKind, Expr, FnBody, FunctionLit, Param, Pattern, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn func_expr(func: FunctionLit) -> Expr {
        Expr::Function(func)
    }

    #[test]
    fn function_literal_freezes_a_prototype() {
        // let double = function(x) { return x * 2; };
        let body = vec![Stmt::ret(
            Some(Expr::binary(
                tidescript_ast::BinaryOp::Mul,
                Expr::ident("x", sp()),
                Expr::number(2.0, sp()),
            )),
            sp(),
        )];
        let chunk = compile_stmts(vec![Stmt::decl(
            DeclKind::Let,
            "double",
            Some(func_expr(FunctionLit::plain(None, &["x"], body, sp()))),
            sp(),
        )]);

        chunk.assert_contains_opcodes(&[OpCode::Closure]);
        let proto = first_function(&chunk);
        assert_eq!(proto.arity, 1);
        assert_eq!(proto.upvalue_count, 0);
        // Inner constants are exactly [2].
        let inner_consts = proto.chunk.constants().constants();
        assert_eq!(inner_consts.len(), 1);
        assert!(matches!(inner_consts[0], Constant::Number(n) if n == 2.0));
        proto
            .chunk
            .assert_contains_opcodes(&[OpCode::LoadConst, OpCode::Mul, OpCode::Return]);
    }

    #[test]
    fn inner_closure_captures_outer_parameter_from_register() {
        // function(x) { return function(y) { return x + y; }; }
        let inner = FunctionLit::plain(
            None,
            &["y"],
            vec![Stmt::ret(
                Some(Expr::binary(
                    tidescript_ast::BinaryOp::Add,
                    Expr::ident("x", sp()),
                    Expr::ident("y", sp()),
                )),
                sp(),
            )],
            sp(),
        );
        let outer = FunctionLit::plain(
            None,
            &["x"],
            vec![Stmt::ret(Some(func_expr(inner)), sp())],
            sp(),
        );
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(outer))]);

        let outer_proto = first_function(&chunk);
        assert!(outer_proto.flags.contains(FunctionFlags::LOCAL_CAPTURES));

        let inner_proto = first_function(&outer_proto.chunk);
        assert_eq!(inner_proto.upvalue_count, 1);

        // The Closure instruction in the outer body carries one
        // from-register descriptor naming x's register (0).
        let (pc, _) = outer_proto
            .chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Closure)
            .expect("closure instruction");
        let count = outer_proto.chunk.read_byte(pc + 4).unwrap();
        assert_eq!(count, 1);
        assert_eq!(
            outer_proto.chunk.read_byte(pc + 5),
            Some(CaptureTag::FromRegister as u8)
        );
        assert_eq!(outer_proto.chunk.read_byte(pc + 6), Some(0));
    }

    #[test]
    fn chained_capture_registers_intermediate_free_symbol() {
        // f(x) { return g() { return h() { return x; }; }; }
        let innermost = FunctionLit::plain(
            None,
            &[],
            vec![Stmt::ret(Some(Expr::ident("x", sp())), sp())],
            sp(),
        );
        let middle = FunctionLit::plain(
            None,
            &[],
            vec![Stmt::ret(Some(func_expr(innermost)), sp())],
            sp(),
        );
        let outer = FunctionLit::plain(
            None,
            &["x"],
            vec![Stmt::ret(Some(func_expr(middle)), sp())],
            sp(),
        );
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(outer))]);

        let outer_proto = first_function(&chunk);
        let middle_proto = first_function(&outer_proto.chunk);
        let innermost_proto = first_function(&middle_proto.chunk);

        // The middle function captures x from the outer frame even though
        // its own body never mentions it.
        assert_eq!(middle_proto.upvalue_count, 1);
        assert_eq!(innermost_proto.upvalue_count, 1);

        // Innermost captures from-upvalue, not from-register.
        let (pc, _) = middle_proto
            .chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Closure)
            .unwrap();
        assert_eq!(
            middle_proto.chunk.read_byte(pc + 5),
            Some(CaptureTag::FromUpvalue as u8)
        );
    }

    #[test]
    fn named_function_expression_captures_itself() {
        // let f = function fact(n) { return fact(n); };
        let body = vec![Stmt::ret(
            Some(Expr::call(
                Expr::ident("fact", sp()),
                vec![Expr::ident("n", sp())],
                sp(),
            )),
            sp(),
        )];
        let chunk = compile_stmts(vec![Stmt::decl(
            DeclKind::Let,
            "f",
            Some(func_expr(FunctionLit::plain(Some("fact"), &["n"], body, sp()))),
            sp(),
        )]);

        let proto = first_function(&chunk);
        assert_eq!(proto.upvalue_count, 1);

        // The descriptor is from-register, pointing at the closure's own
        // destination register.
        let (pc, _) = chunk
            .instructions()
            .into_iter()
            .find(|(_, op)| *op == OpCode::Closure)
            .unwrap();
        let dst = chunk.read_byte(pc + 1).unwrap();
        assert_eq!(chunk.read_byte(pc + 5), Some(CaptureTag::FromRegister as u8));
        assert_eq!(chunk.read_byte(pc + 6), Some(dst));
    }

    #[test]
    fn duplicate_references_capture_once() {
        // function(x) { return function() { return x + x; }; }
        let inner = FunctionLit::plain(
            None,
            &[],
            vec![Stmt::ret(
                Some(Expr::binary(
                    tidescript_ast::BinaryOp::Add,
                    Expr::ident("x", sp()),
                    Expr::ident("x", sp()),
                )),
                sp(),
            )],
            sp(),
        );
        let outer = FunctionLit::plain(
            None,
            &["x"],
            vec![Stmt::ret(Some(func_expr(inner)), sp())],
            sp(),
        );
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(outer))]);

        let outer_proto = first_function(&chunk);
        let inner_proto = first_function(&outer_proto.chunk);
        assert_eq!(inner_proto.upvalue_count, 1);
    }

    #[test]
    fn default_parameters_rebind_with_tdz_marker() {
        // function(a, b = a) {}
        let func = FunctionLit {
            params: vec![
                Param {
                    pattern: Pattern::Ident {
                        name: "a".into(),
                        span: sp(),
                    },
                    default: None,
                    span: sp(),
                },
                Param {
                    pattern: Pattern::Ident {
                        name: "b".into(),
                        span: sp(),
                    },
                    default: Some(Expr::ident("a", sp())),
                    span: sp(),
                },
            ],
            rest: None,
            body: FnBody::Block(vec![]),
            is_arrow: false,
            is_async: false,
            is_generator: false,
            ty: tidescript_core::StaticType::Unknown,
            span: sp(),
        };
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(func))]);
        let proto = first_function(&chunk);

        proto.chunk.assert_contains_opcodes(&[
            OpCode::LoadUninitialized,
            OpCode::LoadUninitialized,
            OpCode::JumpIfUndefined,
        ]);
        // length counts only the leading no-default run.
        assert_eq!(proto.arity, 2);
        assert_eq!(proto.length, 1);
    }

    #[test]
    fn rest_parameter_sets_the_flag() {
        let func = FunctionLit {
            rest: Some(Pattern::Ident {
                name: "rest".into(),
                span: sp(),
            }),
            ..FunctionLit::plain(None, &["a"], vec![], sp())
        };
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(func))]);
        let proto = first_function(&chunk);
        assert!(proto.has_rest());
        assert_eq!(proto.arity, 1);
    }

    #[test]
    fn generator_and_async_flags() {
        let mut func = FunctionLit::plain(None, &[], vec![], sp());
        func.is_generator = true;
        func.is_async = true;
        let chunk = compile_stmts(vec![Stmt::expr(func_expr(func))]);
        let proto = first_function(&chunk);
        assert!(proto.is_generator());
        assert!(proto.is_async());
    }
}
