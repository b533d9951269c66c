//! Import and export declaration compilation.
//!
//! Import bindings were registered before code generation (the checker's
//! binder walk feeds the module-bindings table); the statements themselves
//! only ensure the source module is evaluated. Exports record
//! export-name -> local/global mappings and, for re-exports, pull the
//! source module's values into freshly assigned global slots so
//! downstream modules can chain.

use tidescript_ast::{ExportDecl, ImportDecl, Stmt};
use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::OpCode;
use crate::driver::{Compiler, export_global_name};
use crate::modules::{ExportBinding, ImportBinding, ImportKind};

impl<'h> Compiler<'h> {
    pub(crate) fn compile_import_decl(
        &mut self,
        decl: &ImportDecl,
        span: Span,
    ) -> Result<(), LimitError> {
        if !self.module_mode() {
            self.error(CompileError::NotInModule { span });
            return Ok(());
        }
        // Bindings are already registered; make sure the dependency runs.
        self.emit_eval_module(&decl.source)
    }

    pub(crate) fn compile_export_decl(
        &mut self,
        decl: &ExportDecl,
        span: Span,
    ) -> Result<(), LimitError> {
        if !self.module_mode() {
            self.error(CompileError::NotInModule { span });
            return Ok(());
        }

        match decl {
            ExportDecl::Decl(inner) => {
                self.compile_stmt(inner)?;
                for name in exported_names(inner) {
                    let global = self.globals.lookup(&self.global_name(&name));
                    self.bindings.add_export(
                        name.clone(),
                        ExportBinding {
                            local_name: name,
                            global_index: global,
                            re_export_source: None,
                        },
                    );
                }
            }
            ExportDecl::Default { expr, span } => {
                self.set_line(*span);
                let value = self.compile_expr(expr, None)?;
                let heap_name = export_global_name(&self.bindings.path, "default");
                let index = self.globals.intern(&heap_name)?;
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(value);
                self.free_reg(value);
                self.bindings.add_export(
                    "default",
                    ExportBinding {
                        local_name: "default".into(),
                        global_index: Some(index),
                        re_export_source: None,
                    },
                );
            }
            ExportDecl::Named {
                specifiers,
                source: None,
                span,
            } => {
                for specifier in specifiers {
                    let global = self.globals.lookup(&self.global_name(&specifier.local));
                    if global.is_none() {
                        self.error(CompileError::UndeclaredVariable {
                            name: specifier.local.clone(),
                            span: *span,
                        });
                        continue;
                    }
                    self.bindings.add_export(
                        specifier.exported.clone(),
                        ExportBinding {
                            local_name: specifier.local.clone(),
                            global_index: global,
                            re_export_source: None,
                        },
                    );
                }
            }
            ExportDecl::Named {
                specifiers,
                source: Some(source),
                span,
            } => {
                for specifier in specifiers {
                    self.re_export(source, &specifier.local, &specifier.exported, *span)?;
                }
            }
            ExportDecl::All { source, span } => {
                let names: Vec<String> = match self.loader.and_then(|l| l.get_module(source)) {
                    Some(record) => {
                        let mut names: Vec<String> = record
                            .get_export_names()
                            .iter()
                            .filter(|name| *name != "default")
                            .cloned()
                            .collect();
                        names.sort_unstable();
                        names
                    }
                    None => {
                        self.error(CompileError::Other {
                            message: format!("module '{source}' is not loaded"),
                            span: *span,
                        });
                        return Ok(());
                    }
                };
                for name in names {
                    self.re_export(source, &name, &name, *span)?;
                }
            }
        }
        Ok(())
    }

    /// Re-export `source_name` from `source` under `exported`: evaluate
    /// the source module, read the export, store it into a freshly
    /// assigned global slot, and register both an import and an export
    /// binding so downstream modules can chain.
    fn re_export(
        &mut self,
        source: &str,
        source_name: &str,
        exported: &str,
        span: Span,
    ) -> Result<(), LimitError> {
        if let Some(loader) = self.loader
            && let Some(record) = loader.get_module(source)
            && !record.get_export_names().iter().any(|n| n == source_name)
        {
            self.error(CompileError::ExportNotFound {
                name: source_name.to_string(),
                module: source.to_string(),
                span,
            });
            return Ok(());
        }

        self.emit_eval_module(source)?;

        let value = self.alloc_reg()?;
        let path_const = self.str_const(source)?;
        let name_const = self.str_const(source_name)?;
        self.emit_a(OpCode::GetModuleExport, value);
        self.emit_u16(path_const);
        self.emit_u16(name_const);

        let heap_name = export_global_name(&self.bindings.path, exported);
        let index = self.globals.intern(&heap_name)?;
        self.emit(OpCode::SetGlobal);
        self.emit_u16(index);
        self.emit_byte(value);
        self.free_reg(value);

        self.bindings.add_import(
            exported,
            ImportBinding {
                source: source.to_string(),
                source_name: source_name.to_string(),
                kind: ImportKind::Named,
                global_index: Some(index),
            },
        );
        self.bindings.add_export(
            exported,
            ExportBinding {
                local_name: source_name.to_string(),
                global_index: Some(index),
                re_export_source: Some(source.to_string()),
            },
        );
        Ok(())
    }
}

/// Names an exported declaration introduces.
fn exported_names(stmt: &Stmt) -> Vec<String> {
    match stmt {
        Stmt::Decl { declarators, .. } => {
            let mut names = Vec::new();
            for declarator in declarators {
                declarator.target.bound_names(&mut names);
            }
            names.into_iter().map(str::to_string).collect()
        }
        Stmt::Function { func, .. } => func.name.clone().into_iter().collect(),
        Stmt::Class { class, .. } => class.name.clone().into_iter().collect(),
        Stmt::Enum { decl, .. } => vec![decl.name.clone()],
        _ => Vec::new(),
    }
}
