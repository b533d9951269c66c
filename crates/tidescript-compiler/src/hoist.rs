//! The hoisting and TDZ pre-pass.
//!
//! Before any statement in a block or function body compiles, this pass
//! allocates stable storage for everything the block declares:
//!
//! 1. `var` declarations (function-scoped; collected recursively at
//!    function entry, excluding nested function bodies) get storage in the
//!    function-level scope, initialized to undefined
//! 2. `let`/`const`/class/enum declarations (block-scoped) get storage in
//!    the current scope, marked TDZ and initialized to the Uninitialized
//!    marker
//! 3. function declarations are declared first (so mutual recursion
//!    resolves) and then compiled in sorted name order, so code reaching
//!    the top of the block already sees them bound and emitted bytecode is
//!    byte-identical across runs
//!
//! At the script/module top level, storage means a stable 16-bit global
//! index; in function bodies it means a pinned register or, past the
//! variable-register budget, a spill slot.

use tidescript_ast::{DeclKind, ExportDecl, ForHead, ForInit, FunctionLit, Stmt};
use tidescript_core::{LimitError, Span};

use crate::bytecode::{Constant, OpCode};
use crate::driver::Compiler;
use crate::scope::{Storage, Symbol};

impl<'h> Compiler<'h> {
    /// Run the hoisting pass over a statement list.
    ///
    /// `function_entry` is true for function/script bodies (where `var`s
    /// are collected recursively); block scopes pass false and only hoist
    /// their own lexical declarations.
    pub(crate) fn hoist_statements(
        &mut self,
        body: &[Stmt],
        function_entry: bool,
    ) -> Result<(), LimitError> {
        // 1. Function-scoped vars.
        if function_entry {
            let mut var_names: Vec<(String, Span)> = Vec::new();
            collect_vars(body, &mut var_names);
            for (name, span) in var_names {
                self.hoist_var(&name, span)?;
            }
        } else {
            // Vars re-encountered at block level already have storage from
            // the function-entry collection; merging is a no-op.
            for stmt in body {
                if let Stmt::Decl {
                    kind: DeclKind::Var,
                    declarators,
                    span,
                } = stmt
                {
                    let mut names = Vec::new();
                    for declarator in declarators {
                        declarator.target.bound_names(&mut names);
                    }
                    let names: Vec<String> = names.into_iter().map(str::to_string).collect();
                    for name in names {
                        self.hoist_var(&name, *span)?;
                    }
                }
            }
        }

        // 2. Block-scoped lexical declarations.
        for stmt in body {
            self.hoist_lexical(stmt)?;
        }

        // 3. Function declarations, compiled in sorted name order.
        let mut functions: Vec<(&str, &FunctionLit)> = Vec::new();
        for stmt in body {
            let stmt = unwrap_export(stmt);
            if let Stmt::Function { func, .. } = stmt {
                let name = func.name.as_deref().expect("declaration has a name");
                functions.push((name, func));
            }
        }
        functions.sort_by_key(|(name, _)| *name);

        // Declare every name before compiling any body.
        for (name, func) in &functions {
            self.hoist_function_name(name, func.span)?;
        }
        for (name, func) in &functions {
            self.emit_hoisted_function(name, func)?;
        }

        Ok(())
    }

    /// Validate a parser-precomputed hoisted-declarations map (already
    /// sorted; every index must point at a function declaration).
    pub(crate) fn validate_hoisted_map(
        &self,
        body: &[Stmt],
        hoisted: &std::collections::BTreeMap<String, usize>,
    ) {
        for (name, &index) in hoisted {
            let stmt = unwrap_export(&body[index]);
            let Stmt::Function { func, .. } = stmt else {
                panic!("hoisted declaration '{name}' is not a function literal");
            };
            debug_assert_eq!(func.name.as_deref(), Some(name.as_str()));
        }
    }

    /// Declare a `var` in the function-level scope and initialize it to
    /// undefined. Redeclaration merges without re-initializing (a block's
    /// `var x;` must not wipe a value the function already stored).
    fn hoist_var(&mut self, name: &str, span: Span) -> Result<(), LimitError> {
        let function_scope = self.frame().function_scope;
        if self.table.symbol(function_scope, name).is_some() {
            return Ok(());
        }
        let symbol = self.make_variable_symbol(name, span, false, false, function_scope)?;
        let storage = self.table.declare_var(function_scope, symbol);

        match storage {
            Storage::Global(index) => {
                self.chunk_mut().var_globals.push(index);
                let scratch = self.alloc_reg()?;
                self.emit_a(OpCode::LoadUndefined, scratch);
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(scratch);
                self.free_reg(scratch);
            }
            Storage::Register(reg) => self.emit_a(OpCode::LoadUndefined, reg),
            Storage::Spill(slot) => {
                let scratch = self.alloc_reg()?;
                self.emit_a(OpCode::LoadUndefined, scratch);
                self.emit_store_spill(slot, scratch);
                self.free_reg(scratch);
            }
            Storage::Upvalue(_) => unreachable!("vars never hoist to upvalues"),
        }
        Ok(())
    }

    /// Pre-declare the block's `let`/`const`/class/enum bindings with TDZ
    /// marking and Uninitialized storage.
    fn hoist_lexical(&mut self, stmt: &Stmt) -> Result<(), LimitError> {
        let stmt = unwrap_export(stmt);
        match stmt {
            Stmt::Decl {
                kind: kind @ (DeclKind::Let | DeclKind::Const),
                declarators,
                ..
            } => {
                for declarator in declarators {
                    let mut names = Vec::new();
                    declarator.target.bound_names(&mut names);
                    let names: Vec<String> = names.into_iter().map(str::to_string).collect();
                    for name in names {
                        self.hoist_tdz_binding(&name, declarator.span, *kind == DeclKind::Const)?;
                    }
                }
            }
            Stmt::Class { class, span } => {
                let name = class.name.clone().expect("declaration has a name");
                self.hoist_tdz_binding(&name, *span, false)?;
            }
            Stmt::Enum { decl, span } => {
                let name = decl.name.clone();
                self.hoist_tdz_binding(&name, *span, true)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Declare one TDZ binding in the current scope and write the
    /// Uninitialized marker into its storage.
    fn hoist_tdz_binding(
        &mut self,
        name: &str,
        span: Span,
        is_const: bool,
    ) -> Result<(), LimitError> {
        let current = self.table.current();
        let symbol = self.make_variable_symbol(name, span, is_const, true, current)?;
        let storage = symbol.storage;
        if let Err(err) = self.table.declare(symbol) {
            self.error(err);
            return Ok(());
        }

        match storage {
            Storage::Register(reg) => self.emit_a(OpCode::LoadUninitialized, reg),
            Storage::Spill(slot) => {
                let scratch = self.alloc_reg()?;
                self.emit_a(OpCode::LoadUninitialized, scratch);
                self.emit_store_spill(slot, scratch);
                self.free_reg(scratch);
            }
            Storage::Global(index) => {
                let scratch = self.alloc_reg()?;
                let marker = self.add_const(Constant::Uninitialized)?;
                self.emit_a(OpCode::LoadConst, scratch);
                self.emit_u16(marker);
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(scratch);
                self.free_reg(scratch);
            }
            Storage::Upvalue(_) => unreachable!("lexicals never hoist to upvalues"),
        }
        Ok(())
    }

    /// Declare a hoisted function's name (storage only; the closure is
    /// emitted in a second phase so mutual recursion resolves).
    fn hoist_function_name(&mut self, name: &str, span: Span) -> Result<(), LimitError> {
        let current = self.table.current();
        let symbol = self.make_variable_symbol(name, span, false, false, current)?;
        // Re-declaration of a function declaration is legal; the last one
        // wins at its original storage.
        match self.table.lookup(name) {
            crate::scope::NameLookup::Binding { scope, .. } if scope == current => {}
            _ => self.table.redefine(current, symbol),
        }
        Ok(())
    }

    /// Compile a hoisted function declaration's closure into its assigned
    /// storage.
    fn emit_hoisted_function(&mut self, name: &str, func: &FunctionLit) -> Result<(), LimitError> {
        self.set_line(func.span);
        let current = self.table.current();
        let symbol = self
            .table
            .symbol(current, name)
            .expect("hoisted name declared")
            .clone();

        match symbol.storage {
            Storage::Register(reg) => {
                self.compile_function_literal(func, Some(reg), true)?;
            }
            Storage::Spill(slot) => {
                let value = self.compile_function_literal(func, None, true)?;
                self.emit_store_spill(slot, value);
                self.free_reg(value);
            }
            Storage::Global(index) => {
                let value = self.compile_function_literal(func, None, true)?;
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(value);
                self.free_reg(value);
            }
            Storage::Upvalue(_) => unreachable!("declarations never hoist to upvalues"),
        }
        Ok(())
    }

    /// Build a symbol with freshly allocated storage: a global index at
    /// the root function scope, otherwise a pinned register or, past the
    /// variable budget, a spill slot.
    fn make_variable_symbol(
        &mut self,
        name: &str,
        span: Span,
        is_const: bool,
        is_tdz: bool,
        target_scope: usize,
    ) -> Result<Symbol, LimitError> {
        let storage = if self.at_root() && target_scope == self.frame().function_scope {
            let global_name = self.global_name(name);
            Storage::Global(self.globals.intern(&global_name)?)
        } else if let Some(reg) = self.frame_mut().regs.try_alloc_for_variable()? {
            self.pin_reg(reg);
            Storage::Register(reg)
        } else {
            Storage::Spill(self.frame_mut().regs.alloc_spill()?)
        };

        let mut symbol = Symbol::register(name, 0, span);
        symbol.storage = storage;
        symbol.is_const = is_const;
        symbol.is_tdz = is_tdz;
        Ok(symbol)
    }

    /// Declare a non-hoisted binding (catch parameters, loop heads) in the
    /// current scope with fresh storage.
    pub(crate) fn declare_variable(
        &mut self,
        name: &str,
        span: Span,
        is_const: bool,
        is_tdz: bool,
    ) -> Result<Storage, LimitError> {
        let current = self.table.current();
        let symbol = self.make_variable_symbol(name, span, is_const, is_tdz, current)?;
        let storage = symbol.storage;
        if let Err(err) = self.table.declare(symbol) {
            self.error(err);
        }
        Ok(storage)
    }
}

/// Recursively collect `var`-declared names, stopping at nested function
/// boundaries.
fn collect_vars(body: &[Stmt], out: &mut Vec<(String, Span)>) {
    for stmt in body {
        collect_vars_stmt(stmt, out);
    }
}

fn collect_vars_stmt(stmt: &Stmt, out: &mut Vec<(String, Span)>) {
    let stmt = unwrap_export(stmt);
    match stmt {
        Stmt::Decl {
            kind: DeclKind::Var,
            declarators,
            span,
        } => {
            for declarator in declarators {
                let mut names = Vec::new();
                declarator.target.bound_names(&mut names);
                out.extend(names.into_iter().map(|n| (n.to_string(), *span)));
            }
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_vars_stmt(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_vars_stmt(else_branch, out);
            }
        }
        Stmt::Block { body, .. } => collect_vars(body, out),
        Stmt::While { body, .. }
        | Stmt::DoWhile { body, .. }
        | Stmt::With { body, .. }
        | Stmt::Labeled { body, .. } => collect_vars_stmt(body, out),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Decl {
                kind: DeclKind::Var,
                declarators,
            }) = init
            {
                for declarator in declarators {
                    let mut names = Vec::new();
                    declarator.target.bound_names(&mut names);
                    out.extend(names.into_iter().map(|n| (n.to_string(), declarator.span)));
                }
            }
            collect_vars_stmt(body, out);
        }
        Stmt::ForIn { head, body, .. } | Stmt::ForOf { head, body, .. } => {
            if let ForHead::Decl {
                kind: DeclKind::Var,
                pattern,
            } = head
            {
                let mut names = Vec::new();
                pattern.bound_names(&mut names);
                out.extend(names.into_iter().map(|n| (n.to_string(), pattern.span())));
            }
            collect_vars_stmt(body, out);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_vars(&case.body, out);
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_vars(block, out);
            if let Some(handler) = handler {
                collect_vars(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_vars(finalizer, out);
            }
        }
        _ => {}
    }
}

/// See through `export <declaration>` wrappers.
fn unwrap_export(stmt: &Stmt) -> &Stmt {
    match stmt {
        Stmt::Export {
            decl: ExportDecl::Decl(inner),
            ..
        } => inner,
        _ => stmt,
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::{Constant, OpCode};
    use crate::test_support::{compile_stmts, output_of};
    use tidescript_ast::{DeclKind, Expr, FunctionLit, Stmt};
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn var_hoists_to_undefined_global() {
        let output = output_of(vec![Stmt::decl(
            DeclKind::Var,
            "v",
            Some(Expr::number(1.0, sp())),
            sp(),
        )]);
        // The var's global index is recorded for the VM.
        assert_eq!(output.chunk.var_globals.len(), 1);
        output
            .chunk
            .assert_contains_opcodes(&[OpCode::LoadUndefined, OpCode::SetGlobal]);
    }

    #[test]
    fn var_inside_nested_block_is_hoisted_at_entry() {
        let output = output_of(vec![Stmt::Block {
            body: vec![Stmt::decl(DeclKind::Var, "deep", None, sp())],
            span: sp(),
        }]);
        assert_eq!(output.chunk.var_globals.len(), 1);
    }

    #[test]
    fn let_pre_initializes_to_uninitialized_marker() {
        let chunk = compile_stmts(vec![Stmt::decl(
            DeclKind::Let,
            "x",
            Some(Expr::number(1.0, sp())),
            sp(),
        )]);
        assert!(
            chunk
                .constants()
                .constants()
                .iter()
                .any(|c| matches!(c, Constant::Uninitialized))
        );
    }

    #[test]
    fn function_declarations_emit_in_sorted_name_order() {
        // Declared zebra-then-alpha; compiled alpha-then-zebra.
        let chunk = compile_stmts(vec![
            Stmt::Function {
                func: FunctionLit::plain(Some("zebra"), &[], vec![], sp()),
                span: sp(),
            },
            Stmt::Function {
                func: FunctionLit::plain(Some("alpha"), &[], vec![], sp()),
                span: sp(),
            },
        ]);
        let names: Vec<&str> = chunk
            .constants()
            .functions()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zebra"]);
    }

    #[test]
    fn hoisting_is_deterministic() {
        let stmts = || {
            vec![
                Stmt::Function {
                    func: FunctionLit::plain(Some("b"), &[], vec![], sp()),
                    span: sp(),
                },
                Stmt::Function {
                    func: FunctionLit::plain(Some("a"), &[], vec![], sp()),
                    span: sp(),
                },
                Stmt::decl(DeclKind::Let, "x", Some(Expr::number(1.0, sp())), sp()),
            ]
        };
        let first = compile_stmts(stmts());
        let second = compile_stmts(stmts());
        assert_eq!(first.code(), second.code());
    }

    #[test]
    fn mutually_recursive_declarations_resolve() {
        // function even(n) { return odd(n); } function odd(n) { return even(n); }
        let even = FunctionLit::plain(
            Some("even"),
            &["n"],
            vec![Stmt::ret(
                Some(Expr::call(
                    Expr::ident("odd", sp()),
                    vec![Expr::ident("n", sp())],
                    sp(),
                )),
                sp(),
            )],
            sp(),
        );
        let odd = FunctionLit::plain(
            Some("odd"),
            &["n"],
            vec![Stmt::ret(
                Some(Expr::call(
                    Expr::ident("even", sp()),
                    vec![Expr::ident("n", sp())],
                    sp(),
                )),
                sp(),
            )],
            sp(),
        );
        let output = output_of(vec![
            Stmt::Function {
                func: even,
                span: sp(),
            },
            Stmt::Function {
                func: odd,
                span: sp(),
            },
        ]);
        // Both bodies resolved their sibling by global index; no
        // undeclared-variable diagnostics.
        assert!(output.is_success());
    }
}
