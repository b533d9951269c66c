//! The type-checker collaborator, sketched.
//!
//! The real checker is out of scope; the compiler only needs the narrow
//! surface it consults:
//!
//! - [`Checker::check`]: annotate the tree and collect diagnostics
//! - [`Checker::get_import_bindings`]: import declarations found by the
//!   binder walk
//! - [`Checker::is_module_mode`]: whether the unit is a module
//! - [`Checker::set_allow_super_in_eval`]: eval-in-method support toggle
//!
//! The implementation here is a literal-level annotator: it types literal
//! shapes, propagates `const`-bound initializer types to identifier reads,
//! and computes function-literal signatures. That is exactly enough to
//! drive the computed-type consumers in the code generator (the fast-array
//! `for-of` path, call-arity padding, with-property bias) without growing
//! into a type system.

use rustc_hash::FxHashMap;
use tidescript_ast::{
    Declarator, Expr, FnBody, ForInit, FunctionLit, ImportSpecifier, ObjectMember, Program,
    SourceKind, Stmt,
};
use tidescript_core::{CompileError, StaticType};

use crate::modules::{ImportBinding, ImportKind};

/// The sketched checker.
#[derive(Debug, Default)]
pub struct Checker {
    module_mode: bool,
    allow_super_in_eval: bool,
    imports: Vec<(String, ImportBinding)>,
    /// `const`-bound names with known initializer types, per enclosing
    /// function (approximate: names are not scope-qualified, so a name is
    /// dropped on any shadowing redeclaration).
    env: Vec<FxHashMap<String, StaticType>>,
    errors: Vec<CompileError>,
}

impl Checker {
    /// Create a fresh checker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last checked unit is a module.
    pub fn is_module_mode(&self) -> bool {
        self.module_mode
    }

    /// Import bindings collected from the last checked unit.
    pub fn get_import_bindings(&self) -> &[(String, ImportBinding)] {
        &self.imports
    }

    /// Allow `super` inside eval text compiled in a method context.
    pub fn set_allow_super_in_eval(&mut self, allow: bool) {
        self.allow_super_in_eval = allow;
    }

    /// Whether `super` is allowed in eval text.
    pub fn allow_super_in_eval(&self) -> bool {
        self.allow_super_in_eval
    }

    /// Check a program: annotate computed types in place, collect import
    /// bindings, and return diagnostics.
    pub fn check(&mut self, program: &mut Program) -> Vec<CompileError> {
        self.errors.clear();
        self.imports.clear();
        self.env = vec![FxHashMap::default()];

        self.module_mode = program.kind == SourceKind::Module
            || program
                .body
                .iter()
                .any(|stmt| matches!(stmt, Stmt::Import { .. } | Stmt::Export { .. }));

        let mut body = std::mem::take(&mut program.body);
        for stmt in &mut body {
            self.check_stmt(stmt);
        }
        program.body = body;

        std::mem::take(&mut self.errors)
    }

    fn scope(&mut self) -> &mut FxHashMap<String, StaticType> {
        self.env.last_mut().expect("checker env underflow")
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Expr { expr, .. } | Stmt::Throw { value: expr, .. } => self.check_expr(expr),
            Stmt::Decl {
                kind, declarators, ..
            } => {
                let is_const = *kind == tidescript_ast::DeclKind::Const;
                for Declarator { target, init, .. } in declarators {
                    if let Some(init) = init {
                        self.check_expr(init);
                        if let tidescript_ast::Pattern::Ident { name, .. } = target {
                            let ty = init.static_type();
                            if is_const && ty != StaticType::Unknown {
                                self.scope().insert(name.clone(), ty);
                            } else {
                                self.scope().remove(name);
                            }
                        }
                    }
                }
            }
            Stmt::Function { func, .. } => self.check_function(func),
            Stmt::Class { class, .. } => {
                if let Some(superclass) = &mut class.superclass {
                    self.check_expr(superclass);
                }
                for member in &mut class.members {
                    match &mut member.value {
                        tidescript_ast::ClassMemberValue::Method(func) => self.check_function(func),
                        tidescript_ast::ClassMemberValue::Field(Some(init)) => {
                            self.check_expr(init)
                        }
                        tidescript_ast::ClassMemberValue::Field(None) => {}
                    }
                }
            }
            Stmt::Enum { decl, .. } => {
                for member in &mut decl.members {
                    if let Some(init) = &mut member.init {
                        self.check_expr(init);
                    }
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.check_expr(value);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(cond);
                self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }
            Stmt::Block { body, .. } => {
                for stmt in body {
                    self.check_stmt(stmt);
                }
            }
            Stmt::While { cond, body, .. } | Stmt::DoWhile { cond, body, .. } => {
                self.check_expr(cond);
                self.check_stmt(body);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                match init {
                    Some(ForInit::Decl { declarators, .. }) => {
                        for declarator in declarators {
                            if let Some(init) = &mut declarator.init {
                                self.check_expr(init);
                            }
                        }
                    }
                    Some(ForInit::Expr(expr)) => self.check_expr(expr),
                    None => {}
                }
                if let Some(test) = test {
                    self.check_expr(test);
                }
                if let Some(update) = update {
                    self.check_expr(update);
                }
                self.check_stmt(body);
            }
            Stmt::ForIn { object, body, .. } => {
                self.check_expr(object);
                self.check_stmt(body);
            }
            Stmt::ForOf { iterable, body, .. } => {
                self.check_expr(iterable);
                self.check_stmt(body);
            }
            Stmt::Switch { disc, cases, .. } => {
                self.check_expr(disc);
                for case in cases {
                    if let Some(test) = &mut case.test {
                        self.check_expr(test);
                    }
                    for stmt in &mut case.body {
                        self.check_stmt(stmt);
                    }
                }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                for stmt in block {
                    self.check_stmt(stmt);
                }
                if let Some(handler) = handler {
                    for stmt in &mut handler.body {
                        self.check_stmt(stmt);
                    }
                }
                if let Some(finalizer) = finalizer {
                    for stmt in finalizer {
                        self.check_stmt(stmt);
                    }
                }
            }
            Stmt::With { object, body, .. } => {
                self.check_expr(object);
                self.check_stmt(body);
            }
            Stmt::Labeled { body, .. } => self.check_stmt(body),
            Stmt::Import { decl, .. } => {
                for specifier in &decl.specifiers {
                    let (local, binding) = match specifier {
                        ImportSpecifier::Default { local } => (
                            local.clone(),
                            ImportBinding {
                                source: decl.source.clone(),
                                source_name: "default".into(),
                                kind: ImportKind::Default,
                                global_index: None,
                            },
                        ),
                        ImportSpecifier::Named { imported, local } => (
                            local.clone(),
                            ImportBinding {
                                source: decl.source.clone(),
                                source_name: imported.clone(),
                                kind: ImportKind::Named,
                                global_index: None,
                            },
                        ),
                        ImportSpecifier::Namespace { local } => (
                            local.clone(),
                            ImportBinding {
                                source: decl.source.clone(),
                                source_name: String::new(),
                                kind: ImportKind::Namespace,
                                global_index: None,
                            },
                        ),
                    };
                    self.imports.push((local, binding));
                }
            }
            Stmt::Export { decl, .. } => match decl {
                tidescript_ast::ExportDecl::Decl(inner) => self.check_stmt(inner),
                tidescript_ast::ExportDecl::Default { expr, .. } => self.check_expr(expr),
                tidescript_ast::ExportDecl::Named { .. } | tidescript_ast::ExportDecl::All { .. } => {}
            },
            Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Debugger { .. }
            | Stmt::Empty { .. } => {}
        }
    }

    fn check_function(&mut self, func: &mut FunctionLit) {
        let arity = func.params.len().min(u8::MAX as usize) as u8;
        let required = func
            .params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
            .min(arity as usize) as u8;
        func.ty = StaticType::Function { arity, required };

        self.env.push(FxHashMap::default());
        for param in &mut func.params {
            if let Some(default) = &mut param.default {
                self.check_expr(default);
            }
        }
        match &mut func.body {
            FnBody::Block(body) => {
                for stmt in body {
                    self.check_stmt(stmt);
                }
            }
            FnBody::Expr(expr) => self.check_expr(expr),
        }
        self.env.pop();
    }

    fn check_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Ident { name, ty, .. } => {
                if let Some(known) = self.env.last().and_then(|scope| scope.get(name)) {
                    *ty = known.clone();
                }
            }
            Expr::Template { exprs, .. } | Expr::Sequence { exprs, .. } => {
                for expr in exprs {
                    self.check_expr(expr);
                }
            }
            Expr::Array { elements, .. } => {
                for element in elements.iter_mut().flatten() {
                    self.check_expr(&mut element.expr);
                }
            }
            Expr::Object { members, .. } => {
                for member in members {
                    match member {
                        ObjectMember::Prop { value, .. } => self.check_expr(value),
                        ObjectMember::Spread { expr, .. } => self.check_expr(expr),
                    }
                }
            }
            Expr::Function(func) => self.check_function(func),
            Expr::Class(class) => {
                if let Some(superclass) = &mut class.superclass {
                    self.check_expr(superclass);
                }
            }
            Expr::Unary { operand, .. } => self.check_expr(operand),
            Expr::Update { target, .. } => self.check_expr(target),
            Expr::Binary {
                op, left, right, span,
            } => {
                self.check_expr(left);
                self.check_expr(right);
                use tidescript_ast::BinaryOp::*;
                let numeric_only = matches!(
                    op,
                    Sub | Mul | Div | Mod | Exp | BitAnd | BitOr | BitXor | Shl | Shr | Ushr
                );
                if numeric_only {
                    for side in [&left, &right] {
                        let ty = side.static_type();
                        if matches!(
                            ty,
                            StaticType::String | StaticType::Null | StaticType::Undefined
                        ) {
                            self.errors.push(CompileError::Type {
                                message: format!("arithmetic operand is {ty:?}"),
                                span: *span,
                            });
                        }
                    }
                }
            }
            Expr::Logical { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::Assign { target, value, .. } => {
                if let tidescript_ast::AssignTarget::Expr(target) = target {
                    self.check_expr(target);
                    // A reassigned name is no longer known.
                    if let Expr::Ident { name, .. } = target.as_ref() {
                        let name = name.clone();
                        self.scope().remove(&name);
                    }
                }
                self.check_expr(value);
            }
            Expr::Cond {
                test,
                consequent,
                alternate,
                ..
            } => {
                self.check_expr(test);
                self.check_expr(consequent);
                self.check_expr(alternate);
            }
            Expr::Call { callee, args, .. } | Expr::New { callee, args, .. } => {
                self.check_expr(callee);
                for arg in args {
                    self.check_expr(&mut arg.expr);
                }
            }
            Expr::Member { object, property, .. } => {
                self.check_expr(object);
                if let tidescript_ast::MemberProp::Index(index) = property {
                    self.check_expr(index);
                }
            }
            Expr::Yield { arg, .. } => {
                if let Some(arg) = arg {
                    self.check_expr(arg);
                }
            }
            Expr::Await { arg, .. } | Expr::DynamicImport { arg, .. } => self.check_expr(arg),
            Expr::Number { .. }
            | Expr::BigInt { .. }
            | Expr::Str { .. }
            | Expr::Bool { .. }
            | Expr::Null { .. }
            | Expr::Regex { .. }
            | Expr::This { .. }
            | Expr::Super { .. }
            | Expr::NewTarget { .. }
            | Expr::ImportMeta { .. } => {}
        }
    }
}
