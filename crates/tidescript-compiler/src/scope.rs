//! Lexical scope and symbol management.
//!
//! This module provides the [`SymbolTable`]: a stack of nested scopes, one
//! per function entry and one per block. It handles:
//! - Binding declaration with register / spill / global storage
//! - TDZ flags for `let`/`const` and const-ness
//! - `with`-object scopes that intercept name lookup
//! - The scope-boundary protocol: the table itself is shared by nested
//!   function compilations; each function frame records the index where its
//!   own scopes begin, and a lookup that lands below that index is a free
//!   variable of the current function
//!
//! Every identifier resolves to exactly one binding class: local register,
//! local spill, upvalue, global index, with-object property, or module
//! import (the last two are decided by the caller on `WithObject` /
//! `NotFound`).

use rustc_hash::FxHashMap;
use tidescript_core::{CompileError, Span};

use crate::bytecode::Register;

// ============================================================================
// Types
// ============================================================================

/// Where a binding's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A frame register.
    Register(Register),
    /// A frame spill slot.
    Spill(u16),
    /// A global-object slot.
    Global(u16),
    /// An upvalue of the current function (recorded once the free-variable
    /// machinery has assigned an index).
    Upvalue(u16),
}

/// A declared binding.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Binding name.
    pub name: String,
    /// Current storage.
    pub storage: Storage,
    /// `const` binding: assignment is a compile error.
    pub is_const: bool,
    /// Still in the temporal dead zone; reads emit a runtime check.
    pub is_tdz: bool,
    /// Placeholder pre-bound for a named function expression's
    /// self-reference; resolved captures substitute the closure's own
    /// destination register.
    pub is_function_self: bool,
    /// Declaration site.
    pub span: Span,
}

impl Symbol {
    /// A plain register-resident binding.
    pub fn register(name: impl Into<String>, reg: Register, span: Span) -> Symbol {
        Symbol {
            name: name.into(),
            storage: Storage::Register(reg),
            is_const: false,
            is_tdz: false,
            is_function_self: false,
            span,
        }
    }

    /// A global binding.
    pub fn global(name: impl Into<String>, index: u16, span: Span) -> Symbol {
        Symbol {
            name: name.into(),
            storage: Storage::Global(index),
            is_const: false,
            is_tdz: false,
            is_function_self: false,
            span,
        }
    }
}

/// What kind of scope a table entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A function's outermost scope (parameters and `var` hoisting target).
    Function,
    /// A block scope.
    Block,
    /// A `with (obj)` scope; intercepts lookups that may be properties.
    With,
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    /// Bindings declared in this scope.
    symbols: FxHashMap<String, Symbol>,
    /// Scope kind.
    pub kind: ScopeKind,
    /// For `With` scopes: the checker-known property set of the with
    /// object. `None` means unknown - every lookup through it goes dynamic.
    pub with_props: Option<Vec<String>>,
}

/// Result of a name lookup.
#[derive(Debug, Clone)]
pub enum NameLookup {
    /// A static binding; `scope` is its defining scope's table index.
    Binding { scope: usize, symbol: Symbol },
    /// Intercepted by a `with` scope: resolve dynamically at runtime.
    WithObject,
    /// No binding; the caller routes to imports or globals.
    NotFound,
}

/// How an inner function captures one free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// From a register of the enclosing frame.
    Register(Register),
    /// From a spill slot of the enclosing frame.
    Spill(u16),
    /// From an upvalue of the enclosing closure.
    Upvalue(u16),
    /// The closure itself (named function expression self-reference);
    /// resolved to the closure's destination register at emission.
    SelfClosure,
}

/// A free variable of a function being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSymbol {
    /// Variable name.
    pub name: String,
    /// Where the enclosing frame finds the value.
    pub source: CaptureSource,
}

// ============================================================================
// SymbolTable
// ============================================================================

/// The scope stack shared by a compiler and all its nested function
/// compilations.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a scope; returns its index.
    pub fn push(&mut self, kind: ScopeKind) -> usize {
        self.scopes.push(Scope {
            symbols: FxHashMap::default(),
            kind,
            with_props: None,
        });
        self.scopes.len() - 1
    }

    /// Push a `with` scope carrying the checker-known property set.
    pub fn push_with(&mut self, props: Option<Vec<String>>) -> usize {
        let index = self.push(ScopeKind::With);
        self.scopes[index].with_props = props;
        index
    }

    /// Pop the innermost scope.
    pub fn pop(&mut self) -> Scope {
        self.scopes.pop().expect("scope stack underflow")
    }

    /// Number of scopes on the stack.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Index of the innermost scope.
    pub fn current(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Declare a binding in the innermost scope; redeclaration in the same
    /// scope is an error.
    pub fn declare(&mut self, symbol: Symbol) -> Result<(), CompileError> {
        let scope = self.scopes.last_mut().expect("no scope to declare in");
        if let Some(existing) = scope.symbols.get(&symbol.name) {
            return Err(CompileError::Redeclaration {
                name: symbol.name.clone(),
                original_span: existing.span,
                new_span: symbol.span,
            });
        }
        scope.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Declare in a specific scope (used by `var` hoisting, which targets
    /// the innermost *function* scope rather than the innermost scope).
    /// `var` re-declarations merge: the existing storage wins.
    pub fn declare_var(&mut self, scope: usize, symbol: Symbol) -> Storage {
        let slot = &mut self.scopes[scope].symbols;
        if let Some(existing) = slot.get(&symbol.name) {
            return existing.storage;
        }
        let storage = symbol.storage;
        slot.insert(symbol.name.clone(), symbol);
        storage
    }

    /// Insert or replace without a redeclaration check (hoisted function
    /// declarations: the last one wins).
    pub fn redefine(&mut self, scope: usize, symbol: Symbol) {
        self.scopes[scope].symbols.insert(symbol.name.clone(), symbol);
    }

    /// Look up a name from the innermost scope outward.
    ///
    /// A `with` scope whose property set is unknown or contains the name
    /// intercepts the search before any outer binding is reached.
    pub fn lookup(&self, name: &str) -> NameLookup {
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            if scope.kind == ScopeKind::With {
                let intercepts = match &scope.with_props {
                    None => true,
                    Some(props) => props.iter().any(|p| p == name),
                };
                if intercepts {
                    return NameLookup::WithObject;
                }
            }
            if let Some(symbol) = scope.symbols.get(name) {
                return NameLookup::Binding {
                    scope: index,
                    symbol: symbol.clone(),
                };
            }
        }
        NameLookup::NotFound
    }

    /// Get a symbol by scope index and name.
    pub fn symbol(&self, scope: usize, name: &str) -> Option<&Symbol> {
        self.scopes.get(scope)?.symbols.get(name)
    }

    /// Mutable access to a symbol by scope index and name.
    pub fn symbol_mut(&mut self, scope: usize, name: &str) -> Option<&mut Symbol> {
        self.scopes.get_mut(scope)?.symbols.get_mut(name)
    }

    /// Clear a binding's TDZ flag (its initializer has run).
    pub fn mark_initialized(&mut self, scope: usize, name: &str) {
        if let Some(symbol) = self.symbol_mut(scope, name) {
            symbol.is_tdz = false;
        }
    }

    /// Iterate the symbols of one scope (arbitrary order).
    pub fn scope_symbols(&self, scope: usize) -> impl Iterator<Item = &Symbol> {
        self.scopes[scope].symbols.values()
    }

    /// The kind of the scope at `index`.
    pub fn kind(&self, index: usize) -> ScopeKind {
        self.scopes[index].kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::default()
    }

    #[test]
    fn declare_and_lookup() {
        let mut table = SymbolTable::new();
        table.push(ScopeKind::Function);
        table.declare(Symbol::register("x", 0, sp())).unwrap();

        match table.lookup("x") {
            NameLookup::Binding { scope, symbol } => {
                assert_eq!(scope, 0);
                assert_eq!(symbol.storage, Storage::Register(0));
            }
            other => panic!("expected binding, got {other:?}"),
        }
        assert!(matches!(table.lookup("y"), NameLookup::NotFound));
    }

    #[test]
    fn redeclaration_in_same_scope_errors() {
        let mut table = SymbolTable::new();
        table.push(ScopeKind::Function);
        table.declare(Symbol::register("x", 0, sp())).unwrap();

        let result = table.declare(Symbol::register("x", 1, sp()));
        assert!(matches!(result, Err(CompileError::Redeclaration { .. })));
    }

    #[test]
    fn shadowing_across_scopes() {
        let mut table = SymbolTable::new();
        table.push(ScopeKind::Function);
        table.declare(Symbol::register("x", 0, sp())).unwrap();

        table.push(ScopeKind::Block);
        table.declare(Symbol::register("x", 1, sp())).unwrap();

        match table.lookup("x") {
            NameLookup::Binding { scope, symbol } => {
                assert_eq!(scope, 1);
                assert_eq!(symbol.storage, Storage::Register(1));
            }
            other => panic!("expected inner binding, got {other:?}"),
        }

        table.pop();
        match table.lookup("x") {
            NameLookup::Binding { symbol, .. } => {
                assert_eq!(symbol.storage, Storage::Register(0));
            }
            other => panic!("expected outer binding, got {other:?}"),
        }
    }

    #[test]
    fn var_redeclaration_merges() {
        let mut table = SymbolTable::new();
        let func = table.push(ScopeKind::Function);
        let first = table.declare_var(func, Symbol::register("v", 4, sp()));
        let second = table.declare_var(func, Symbol::register("v", 9, sp()));
        assert_eq!(first, Storage::Register(4));
        // Existing storage wins.
        assert_eq!(second, Storage::Register(4));
    }

    #[test]
    fn with_unknown_props_intercepts_everything() {
        let mut table = SymbolTable::new();
        table.push(ScopeKind::Function);
        table.declare(Symbol::register("x", 0, sp())).unwrap();
        table.push_with(None);

        assert!(matches!(table.lookup("x"), NameLookup::WithObject));
        assert!(matches!(table.lookup("unknown"), NameLookup::WithObject));
    }

    #[test]
    fn with_known_props_only_intercepts_members() {
        let mut table = SymbolTable::new();
        table.push(ScopeKind::Function);
        table.declare(Symbol::register("x", 0, sp())).unwrap();
        table.push_with(Some(vec!["member".into()]));

        assert!(matches!(table.lookup("member"), NameLookup::WithObject));
        // x is provably not a property; the lexical binding is visible.
        assert!(matches!(table.lookup("x"), NameLookup::Binding { .. }));
    }

    #[test]
    fn tdz_flag_clears() {
        let mut table = SymbolTable::new();
        let scope = table.push(ScopeKind::Function);
        let mut symbol = Symbol::register("lexical", 0, sp());
        symbol.is_tdz = true;
        table.declare(symbol).unwrap();

        assert!(table.symbol(scope, "lexical").unwrap().is_tdz);
        table.mark_initialized(scope, "lexical");
        assert!(!table.symbol(scope, "lexical").unwrap().is_tdz);
    }

    #[test]
    fn free_symbol_dedup_key() {
        let a = FreeSymbol {
            name: "x".into(),
            source: CaptureSource::Register(3),
        };
        let b = FreeSymbol {
            name: "x".into(),
            source: CaptureSource::Register(3),
        };
        let c = FreeSymbol {
            name: "x".into(),
            source: CaptureSource::Spill(3),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
