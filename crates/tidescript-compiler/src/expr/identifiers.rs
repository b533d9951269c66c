//! Identifier resolution and binding load/store emission.
//!
//! Every identifier resolves to exactly one binding class: same-function
//! register or spill slot, upvalue of an enclosing function, global index,
//! with-object property, or module import. The resolution protocol walks
//! the scope table; a hit below the current frame's scope boundary is a
//! free variable and goes through the upvalue machinery.

use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::{NIL_REGISTER, OpCode, Register};
use crate::driver::Compiler;
use crate::modules::{ImportBinding, ImportKind};
use crate::scope::{NameLookup, Storage};

/// The binding class an identifier resolved to.
#[derive(Debug, Clone)]
pub(crate) enum BindingKind {
    /// A register of the current frame.
    Register(Register),
    /// A spill slot of the current frame.
    Spill(u16),
    /// An upvalue of the current function.
    Upvalue(u16),
    /// A global slot.
    Global(u16),
    /// Intercepted by a `with` scope: dynamic name lookup.
    WithProp,
    /// A module import.
    Import(ImportBinding),
    /// No binding found: global-by-name at runtime.
    Unresolved,
}

/// A resolved identifier.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedBinding {
    pub kind: BindingKind,
    /// Reads must emit a runtime uninitialized check.
    pub is_tdz: bool,
    /// Assignment is a compile error.
    pub is_const: bool,
}

impl<'h> Compiler<'h> {
    /// Resolve a name at the current position.
    pub(crate) fn resolve_name(&mut self, name: &str) -> Result<ResolvedBinding, LimitError> {
        match self.table.lookup(name) {
            NameLookup::Binding { scope, symbol } => {
                let is_tdz = symbol.is_tdz;
                let is_const = symbol.is_const;
                let kind = match symbol.storage {
                    Storage::Global(index) => BindingKind::Global(index),
                    _ if scope >= self.frame().scope_base => match symbol.storage {
                        Storage::Register(reg) => BindingKind::Register(reg),
                        Storage::Spill(slot) => BindingKind::Spill(slot),
                        Storage::Upvalue(index) => BindingKind::Upvalue(index),
                        Storage::Global(_) => unreachable!(),
                    },
                    // Across the scope boundary: a free variable.
                    _ => BindingKind::Upvalue(self.resolve_free(name, scope)?),
                };
                Ok(ResolvedBinding {
                    kind,
                    is_tdz,
                    is_const,
                })
            }
            NameLookup::WithObject => Ok(ResolvedBinding {
                kind: BindingKind::WithProp,
                is_tdz: false,
                is_const: false,
            }),
            NameLookup::NotFound => {
                if self.module_mode()
                    && let Some(import) = self.bindings.import(name)
                {
                    return Ok(ResolvedBinding {
                        kind: BindingKind::Import(import.clone()),
                        is_tdz: false,
                        is_const: true,
                    });
                }
                Ok(ResolvedBinding {
                    kind: BindingKind::Unresolved,
                    is_tdz: false,
                    is_const: false,
                })
            }
        }
    }

    /// Compile an identifier read.
    pub(crate) fn compile_ident(
        &mut self,
        name: &str,
        span: Span,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let resolved = self.resolve_name(name)?;

        // `arguments` with no binding refers to the frame's arguments
        // object inside any function (the VM resolves through arrow
        // frames to the nearest ordinary one).
        if name == "arguments"
            && !self.at_root()
            && matches!(resolved.kind, BindingKind::Unresolved)
        {
            let dst = self.hint_or_alloc(hint)?;
            self.emit_a(OpCode::GetArguments, dst);
            return Ok(dst);
        }

        self.emit_load_binding(name, span, &resolved, hint)
    }

    /// Emit the load for a resolved binding.
    pub(crate) fn emit_load_binding(
        &mut self,
        name: &str,
        _span: Span,
        resolved: &ResolvedBinding,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match &resolved.kind {
            BindingKind::Register(reg) => {
                let reg = *reg;
                if resolved.is_tdz {
                    self.emit_tdz_check(reg, name)?;
                }
                if let Some(dst) = hint
                    && dst != reg
                {
                    self.emit_ab(OpCode::Move, dst, reg);
                    return Ok(dst);
                }
                Ok(reg)
            }
            BindingKind::Spill(slot) => {
                let slot = *slot;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_load_spill(dst, slot);
                if resolved.is_tdz {
                    self.emit_tdz_check(dst, name)?;
                }
                Ok(dst)
            }
            BindingKind::Upvalue(index) => {
                let index = *index;
                if index > u16::from(u8::MAX) {
                    return Err(LimitError::TooManyUpvalues);
                }
                let dst = self.hint_or_alloc(hint)?;
                self.emit(OpCode::LoadFree);
                self.emit_byte(dst);
                self.emit_byte(index as u8);
                if resolved.is_tdz {
                    self.emit_tdz_check(dst, name)?;
                }
                Ok(dst)
            }
            BindingKind::Global(index) => {
                let index = *index;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::GetGlobal, dst);
                self.emit_u16(index);
                if resolved.is_tdz {
                    self.emit_tdz_check(dst, name)?;
                }
                Ok(dst)
            }
            BindingKind::WithProp => {
                let name_const = self.str_const(name)?;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::GetWithProp, dst);
                self.emit_u16(name_const);
                Ok(dst)
            }
            BindingKind::Import(import) => {
                let import = import.clone();
                self.emit_import_read(&import, hint)
            }
            BindingKind::Unresolved => {
                // Global-by-name; the VM raises ReferenceError for a slot
                // that was never defined.
                let global_name = self.global_name(name);
                let index = self.globals.intern(&global_name)?;
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::GetGlobal, dst);
                self.emit_u16(index);
                Ok(dst)
            }
        }
    }

    /// Emit a store to a named binding.
    pub(crate) fn emit_store_binding(
        &mut self,
        name: &str,
        span: Span,
        value: Register,
    ) -> Result<(), LimitError> {
        let resolved = self.resolve_name(name)?;

        if resolved.is_const {
            self.error(CompileError::ConstAssignment {
                name: name.to_string(),
                span,
            });
            return Ok(());
        }

        match resolved.kind {
            BindingKind::Register(reg) => {
                if resolved.is_tdz {
                    self.emit_tdz_check(reg, name)?;
                }
                if reg != value {
                    self.emit_ab(OpCode::Move, reg, value);
                }
            }
            BindingKind::Spill(slot) => {
                if resolved.is_tdz {
                    let probe = self.alloc_reg()?;
                    self.emit_load_spill(probe, slot);
                    self.emit_tdz_check(probe, name)?;
                    self.free_reg(probe);
                }
                self.emit_store_spill(slot, value);
            }
            BindingKind::Upvalue(index) => {
                if index > u16::from(u8::MAX) {
                    return Err(LimitError::TooManyUpvalues);
                }
                self.emit(OpCode::SetUpvalue);
                self.emit_byte(index as u8);
                self.emit_byte(value);
            }
            BindingKind::Global(index) => {
                if resolved.is_tdz {
                    let probe = self.alloc_reg()?;
                    self.emit_a(OpCode::GetGlobal, probe);
                    self.emit_u16(index);
                    self.emit_tdz_check(probe, name)?;
                    self.free_reg(probe);
                }
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(value);
            }
            BindingKind::WithProp => {
                let name_const = self.str_const(name)?;
                self.emit(OpCode::SetWithProp);
                self.emit_u16(name_const);
                self.emit_byte(value);
            }
            BindingKind::Import(_) => {
                self.error(CompileError::ConstAssignment {
                    name: name.to_string(),
                    span,
                });
            }
            BindingKind::Unresolved => {
                if self.strict() {
                    self.error(CompileError::UndeclaredVariable {
                        name: name.to_string(),
                        span,
                    });
                    return Ok(());
                }
                // Sloppy mode: implicit global.
                let global_name = self.global_name(name);
                let index = self.globals.intern(&global_name)?;
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(value);
            }
        }
        Ok(())
    }

    /// Emit an import read: direct global when the heap assigned a slot,
    /// otherwise a module-export (or namespace) lookup.
    fn emit_import_read(
        &mut self,
        import: &ImportBinding,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        if let Some(index) = import.global_index {
            self.emit_a(OpCode::GetGlobal, dst);
            self.emit_u16(index);
            return Ok(dst);
        }
        if import.source.ends_with(".json") {
            // JSON modules materialize as a single parsed value; named
            // imports read a property of it.
            let path_const = self.str_const(&import.source)?;
            self.emit_a(OpCode::LoadJsonModule, dst);
            self.emit_u16(path_const);
            if import.kind == ImportKind::Named {
                let name_const = self.str_const(&import.source_name)?;
                self.emit_ab(OpCode::GetProp, dst, dst);
                self.emit_u16(name_const);
            }
            return Ok(dst);
        }
        match import.kind {
            ImportKind::Namespace => {
                let path_const = self.str_const(&import.source)?;
                self.emit_a(OpCode::CreateNamespace, dst);
                self.emit_u16(path_const);
            }
            ImportKind::Default | ImportKind::Named => {
                let path_const = self.str_const(&import.source)?;
                let name_const = self.str_const(&import.source_name)?;
                self.emit_a(OpCode::GetModuleExport, dst);
                self.emit_u16(path_const);
                self.emit_u16(name_const);
            }
        }
        Ok(dst)
    }

    /// Emit the runtime TDZ check for a register holding a possibly
    /// Uninitialized binding.
    pub(crate) fn emit_tdz_check(&mut self, reg: Register, name: &str) -> Result<(), LimitError> {
        debug_assert_ne!(reg, NIL_REGISTER, "TDZ check on nil register");
        let name_const = self.str_const(name)?;
        self.emit_a(OpCode::CheckUninitialized, reg);
        self.emit_u16(name_const);
        Ok(())
    }

    /// Spill load with automatic narrow/wide selection.
    pub(crate) fn emit_load_spill(&mut self, dst: Register, slot: u16) {
        if slot <= u16::from(u8::MAX) {
            self.emit_ab(OpCode::LoadSpill, dst, slot as u8);
        } else {
            self.emit_a(OpCode::LoadSpillWide, dst);
            self.emit_u16(slot);
        }
    }

    /// Spill store with automatic narrow/wide selection.
    pub(crate) fn emit_store_spill(&mut self, slot: u16, src: Register) {
        if slot <= u16::from(u8::MAX) {
            self.emit_ab(OpCode::StoreSpill, slot as u8, src);
        } else {
            self.emit(OpCode::StoreSpillWide);
            self.emit_u16(slot);
            self.emit_byte(src);
        }
    }

    /// The global-registry name for a binding: plain in script mode,
    /// module-qualified in module mode.
    pub(crate) fn global_name(&self, name: &str) -> String {
        if self.module_mode() {
            crate::driver::export_global_name(&self.bindings.path, name)
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, compile_stmts_with_errors};
    use tidescript_ast::{DeclKind, Expr, Stmt};
    use tidescript_core::{CompileError, Span};

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn unresolved_read_is_a_global_get() {
        let chunk = compile_stmts(vec![Stmt::expr(Expr::ident("mystery", sp()))]);
        chunk.assert_contains_opcodes(&[OpCode::GetGlobal, OpCode::Return]);
    }

    #[test]
    fn top_level_let_read_back() {
        // Top-level bindings are globals with TDZ pre-marking; the read
        // after initialization needs no check (flag cleared in order).
        let chunk = compile_stmts(vec![
            Stmt::decl(DeclKind::Let, "x", Some(Expr::number(1.0, sp())), sp()),
            Stmt::expr(Expr::ident("x", sp())),
        ]);
        chunk.assert_contains_opcodes(&[OpCode::SetGlobal, OpCode::GetGlobal]);
    }

    #[test]
    fn tdz_read_before_declaration_emits_check() {
        // `x; let x = 1;` - the read reaches the binding in its dead zone.
        let chunk = compile_stmts(vec![
            Stmt::expr(Expr::ident("x", sp())),
            Stmt::decl(DeclKind::Let, "x", Some(Expr::number(1.0, sp())), sp()),
        ]);
        chunk.assert_contains_opcodes(&[
            OpCode::GetGlobal,
            OpCode::CheckUninitialized,
            OpCode::SetGlobal,
        ]);
    }

    #[test]
    fn assignment_to_const_is_an_error() {
        let errors = compile_stmts_with_errors(vec![
            Stmt::decl(DeclKind::Const, "k", Some(Expr::number(1.0, sp())), sp()),
            Stmt::expr(Expr::assign(Expr::ident("k", sp()), Expr::number(2.0, sp()))),
        ]);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CompileError::ConstAssignment { name, .. } if name == "k"))
        );
    }

    #[test]
    fn arguments_resolves_to_the_frame_object() {
        use tidescript_ast::FunctionLit;
        let func = FunctionLit::plain(
            None,
            &[],
            vec![Stmt::ret(Some(Expr::ident("arguments", sp())), sp())],
            sp(),
        );
        let chunk = compile_stmts(vec![Stmt::expr(Expr::Function(func))]);
        let proto = crate::test_support::first_function(&chunk);
        proto
            .chunk
            .assert_contains_opcodes(&[OpCode::GetArguments, OpCode::Return]);
    }

    #[test]
    fn strict_assignment_to_undeclared_is_an_error() {
        let errors = compile_stmts_with_errors(vec![Stmt::expr(Expr::assign(
            Expr::ident("ghost", sp()),
            Expr::number(1.0, sp()),
        ))]);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CompileError::UndeclaredVariable { name, .. } if name == "ghost"))
        );
    }
}
