//! Per-module import/export bindings and the module-loader interface.
//!
//! One [`ModuleBindings`] exists per compiled module. Every identifier
//! resolution in module mode consults it: a name registered as an import
//! routes to a direct global read (when the unified heap has assigned the
//! export a global index) or a `GetModuleExport` against the source module.
//!
//! The [`ModuleLoader`] is an external collaborator; only the surface the
//! compiler consumes is sketched here, plus an in-memory implementation for
//! tests.

use rustc_hash::{FxHashMap, FxHashSet};

/// How a name was imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import x from "m"`.
    Default,
    /// `import { x } from "m"`.
    Named,
    /// `import * as x from "m"`.
    Namespace,
}

/// One imported binding (local name -> source).
#[derive(Debug, Clone)]
pub struct ImportBinding {
    /// Source module path.
    pub source: String,
    /// Name inside the source module ("default" for default imports, ""
    /// for namespace imports).
    pub source_name: String,
    /// Import kind.
    pub kind: ImportKind,
    /// Directly resolved global index, when the heap has assigned one.
    pub global_index: Option<u16>,
}

/// One exported binding (export name -> local).
#[derive(Debug, Clone)]
pub struct ExportBinding {
    /// Local name inside this module.
    pub local_name: String,
    /// Global index backing the export, when assigned.
    pub global_index: Option<u16>,
    /// For re-exports: the module the value actually comes from.
    pub re_export_source: Option<String>,
}

/// Import/export registry for one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleBindings {
    /// This module's path.
    pub path: String,
    imports: FxHashMap<String, ImportBinding>,
    exports: FxHashMap<String, ExportBinding>,
    dependencies: FxHashSet<String>,
}

impl ModuleBindings {
    /// Create bindings for the module at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Register an import; also records the dependency edge.
    pub fn add_import(&mut self, local: impl Into<String>, binding: ImportBinding) {
        self.dependencies.insert(binding.source.clone());
        self.imports.insert(local.into(), binding);
    }

    /// Register an export.
    pub fn add_export(&mut self, export_name: impl Into<String>, binding: ExportBinding) {
        if let Some(source) = &binding.re_export_source {
            self.dependencies.insert(source.clone());
        }
        self.exports.insert(export_name.into(), binding);
    }

    /// Look up an import by local name.
    pub fn import(&self, local: &str) -> Option<&ImportBinding> {
        self.imports.get(local)
    }

    /// Look up an export by exported name.
    pub fn export(&self, name: &str) -> Option<&ExportBinding> {
        self.exports.get(name)
    }

    /// Exported names, sorted for deterministic iteration.
    pub fn export_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Module paths this module depends on, sorted.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = self.dependencies.iter().map(String::as_str).collect();
        deps.sort_unstable();
        deps
    }

    /// Whether any imports are registered.
    pub fn has_imports(&self) -> bool {
        !self.imports.is_empty()
    }
}

// ============================================================================
// Loader interface
// ============================================================================

/// A loaded module's record, as the loader exposes it to the compiler.
#[derive(Debug, Clone, Default)]
pub struct ModuleRecord {
    /// Module path.
    pub path: String,
    /// Names the module exports.
    export_names: Vec<String>,
}

impl ModuleRecord {
    /// Create a record with its export-name list.
    pub fn new(path: impl Into<String>, export_names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            export_names,
        }
    }

    /// The module's export names.
    pub fn get_export_names(&self) -> &[String] {
        &self.export_names
    }
}

/// The module loader collaborator.
///
/// `load_module` may perform work (read, parse, register); `get_module`
/// only looks up something already loaded. The compiler needs nothing
/// else from it.
pub trait ModuleLoader {
    /// Load (or return the already-loaded) module at `path`, resolved
    /// relative to `referrer`.
    fn load_module(&self, path: &str, referrer: Option<&str>) -> Option<&ModuleRecord>;

    /// Look up an already-loaded module.
    fn get_module(&self, path: &str) -> Option<&ModuleRecord>;
}

/// A pre-populated loader for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct InMemoryLoader {
    modules: FxHashMap<String, ModuleRecord>,
}

impl InMemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module record.
    pub fn add_module(&mut self, record: ModuleRecord) {
        self.modules.insert(record.path.clone(), record);
    }
}

impl ModuleLoader for InMemoryLoader {
    fn load_module(&self, path: &str, _referrer: Option<&str>) -> Option<&ModuleRecord> {
        self.modules.get(path)
    }

    fn get_module(&self, path: &str) -> Option<&ModuleRecord> {
        self.modules.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_register_dependencies() {
        let mut bindings = ModuleBindings::new("./app.ts");
        bindings.add_import(
            "helper",
            ImportBinding {
                source: "./util.ts".into(),
                source_name: "helper".into(),
                kind: ImportKind::Named,
                global_index: None,
            },
        );

        assert!(bindings.has_imports());
        assert_eq!(bindings.dependencies(), vec!["./util.ts"]);
        assert_eq!(bindings.import("helper").unwrap().source_name, "helper");
        assert!(bindings.import("missing").is_none());
    }

    #[test]
    fn export_names_are_sorted() {
        let mut bindings = ModuleBindings::new("./m.ts");
        for name in ["zeta", "alpha", "mid"] {
            bindings.add_export(
                name,
                ExportBinding {
                    local_name: name.into(),
                    global_index: None,
                    re_export_source: None,
                },
            );
        }
        assert_eq!(bindings.export_names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn re_exports_record_the_source_edge() {
        let mut bindings = ModuleBindings::new("./m.ts");
        bindings.add_export(
            "thing",
            ExportBinding {
                local_name: "thing".into(),
                global_index: Some(7),
                re_export_source: Some("./origin.ts".into()),
            },
        );
        assert_eq!(bindings.dependencies(), vec!["./origin.ts"]);
        assert_eq!(bindings.export("thing").unwrap().global_index, Some(7));
    }

    #[test]
    fn in_memory_loader_round_trip() {
        let mut loader = InMemoryLoader::new();
        loader.add_module(ModuleRecord::new(
            "./util.ts",
            vec!["helper".into(), "default".into()],
        ));

        let record = loader.get_module("./util.ts").unwrap();
        assert_eq!(record.get_export_names().len(), 2);
        assert!(loader.load_module("./missing.ts", None).is_none());
    }
}
