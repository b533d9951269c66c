//! Destructuring pattern binding.
//!
//! One recursive walk serves declarations, parameters, for-heads, catch
//! bindings and destructuring assignment; [`PatternBind`] selects what
//! happens at each identifier leaf:
//!
//! - `Declare`: declare a fresh binding in the current scope (parameters,
//!   catch clauses) and store into it
//! - `Init`: store into a binding the hoisting pass pre-declared, clearing
//!   its TDZ flag (declaration statements)
//! - `Assign`: a full assignment with const and TDZ checks
//!
//! Evaluation follows source pattern order; defaults apply on undefined;
//! rest elements collect tails.

use tidescript_ast::{Pattern, PropKey};
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::{Constant, OpCode, Register};
use crate::driver::Compiler;
use crate::scope::{NameLookup, Storage};

/// What an identifier leaf of a pattern does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternBind {
    /// Declare a fresh binding in the current scope.
    Declare,
    /// Initialize a pre-declared (hoisted) binding.
    Init,
    /// Assign to an existing binding, with the usual checks.
    Assign,
}

impl<'h> Compiler<'h> {
    /// Bind `value` to a pattern.
    pub(crate) fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Register,
        mode: PatternBind,
    ) -> Result<(), LimitError> {
        self.set_line(pattern.span());
        match pattern {
            Pattern::Ident { name, span } => match mode {
                PatternBind::Declare => {
                    let storage = self.declare_variable(name, *span, false, false)?;
                    self.store_to_storage(storage, value);
                }
                PatternBind::Init => self.emit_init_binding(name, value),
                PatternBind::Assign => self.emit_store_binding(name, *span, value)?,
            },
            Pattern::Assign {
                target, default, ..
            } => {
                // Apply the default when the incoming value is undefined.
                let slot = self.alloc_reg()?;
                self.emit_ab(OpCode::Move, slot, value);
                let apply = self.emit_jump(OpCode::JumpIfUndefined, Some(slot));
                let skip = self.emit_jump(OpCode::Jump, None);
                self.patch_jump(apply)?;
                self.compile_expr_to(default, slot)?;
                self.patch_jump(skip)?;
                self.bind_pattern(target, slot, mode)?;
                self.free_reg(slot);
            }
            Pattern::Array { elements, .. } => {
                for (index, element) in elements.iter().enumerate() {
                    let Some(element) = element else {
                        continue; // hole
                    };
                    if let Pattern::Rest { inner, span } = element {
                        if index + 1 != elements.len() {
                            self.error(CompileError::InvalidRest { span: *span });
                            continue;
                        }
                        let rest = self.alloc_reg()?;
                        self.emit(OpCode::ArrayRest);
                        self.emit_byte(rest);
                        self.emit_byte(value);
                        self.emit_byte(index.min(255) as u8);
                        self.bind_pattern(inner, rest, mode)?;
                        self.free_reg(rest);
                        continue;
                    }

                    let index_reg = self.alloc_reg()?;
                    self.emit_load_const(index_reg, Constant::Number(index as f64))?;
                    let element_reg = self.alloc_reg()?;
                    self.emit_abc(OpCode::GetIndex, element_reg, value, index_reg);
                    self.free_reg(index_reg);
                    self.bind_pattern(element, element_reg, mode)?;
                    self.free_reg(element_reg);
                }
            }
            Pattern::Object { props, rest, .. } => {
                // Keys already taken, for the rest object's exclusion set.
                let taken = if rest.is_some() {
                    let keys = self.alloc_reg()?;
                    self.emit_a(OpCode::NewArray, keys);
                    Some(keys)
                } else {
                    None
                };

                for prop in props {
                    let element_reg = self.alloc_reg()?;
                    match &prop.key {
                        PropKey::Ident(name) | PropKey::Str(name) => {
                            let name_const = self.str_const(name)?;
                            self.emit_ab(OpCode::GetProp, element_reg, value);
                            self.emit_u16(name_const);
                            if let Some(keys) = taken {
                                let key_reg = self.alloc_reg()?;
                                self.emit_load_const(key_reg, Constant::Str(name.clone()))?;
                                self.emit_ab(OpCode::ArrayAppend, keys, key_reg);
                                self.free_reg(key_reg);
                            }
                        }
                        PropKey::Number(value_key) => {
                            let key_reg = self.alloc_reg()?;
                            self.emit_load_const(key_reg, Constant::Number(*value_key))?;
                            self.emit_abc(OpCode::GetIndex, element_reg, value, key_reg);
                            if let Some(keys) = taken {
                                self.emit_ab(OpCode::ArrayAppend, keys, key_reg);
                            }
                            self.free_reg(key_reg);
                        }
                        PropKey::Computed(key_expr) => {
                            let key_reg = self.compile_expr(key_expr, None)?;
                            self.emit_abc(OpCode::GetIndex, element_reg, value, key_reg);
                            if let Some(keys) = taken {
                                self.emit_ab(OpCode::ArrayAppend, keys, key_reg);
                            }
                            self.free_reg(key_reg);
                        }
                        PropKey::Private(_) => {
                            self.error(CompileError::Other {
                                message: "private names cannot appear in destructuring".into(),
                                span: prop.span,
                            });
                        }
                    }
                    self.bind_pattern(&prop.value, element_reg, mode)?;
                    self.free_reg(element_reg);
                }

                if let (Some(rest), Some(keys)) = (rest, taken) {
                    let rest_reg = self.alloc_reg()?;
                    self.emit_abc(OpCode::ObjectRest, rest_reg, value, keys);
                    self.bind_pattern(rest, rest_reg, mode)?;
                    self.free_reg(rest_reg);
                    self.free_reg(keys);
                }
            }
            Pattern::Rest { span, .. } => {
                // Rest is only valid inside array elements / parameters,
                // which are handled by their containers.
                self.error(CompileError::InvalidRest { span: *span });
            }
        }
        Ok(())
    }

    /// Store into a pre-declared binding without const/TDZ checks, then
    /// clear its TDZ flag. Declaration initializers use this: the checks
    /// guard *uses*, not the defining store.
    pub(crate) fn emit_init_binding(&mut self, name: &str, value: Register) {
        match self.table.lookup(name) {
            NameLookup::Binding { scope, symbol } => {
                self.store_to_storage(symbol.storage, value);
                self.table.mark_initialized(scope, name);
            }
            // Hoisting always pre-declares declaration targets.
            _ => panic!("initializing store to undeclared binding '{name}'"),
        }
    }

    /// Raw store to a storage location.
    pub(crate) fn store_to_storage(&mut self, storage: Storage, value: Register) {
        match storage {
            Storage::Register(reg) => {
                if reg != value {
                    self.emit_ab(OpCode::Move, reg, value);
                }
            }
            Storage::Spill(slot) => self.emit_store_spill(slot, value),
            Storage::Global(index) => {
                self.emit(OpCode::SetGlobal);
                self.emit_u16(index);
                self.emit_byte(value);
            }
            Storage::Upvalue(index) => {
                self.emit(OpCode::SetUpvalue);
                self.emit_byte(index.min(255) as u8);
                self.emit_byte(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::compile_stmts;
    use tidescript_ast::{
        DeclKind, Declarator, Expr, ObjectPatternProp, Pattern, PropKey, Stmt,
    };
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn decl_pattern(pattern: Pattern, init: Expr) -> Stmt {
        Stmt::Decl {
            kind: DeclKind::Let,
            declarators: vec![Declarator {
                target: pattern,
                init: Some(init),
                span: sp(),
            }],
            span: sp(),
        }
    }

    #[test]
    fn array_pattern_reads_indices_in_order() {
        // let [a, , b] = value;
        let pattern = Pattern::Array {
            elements: vec![
                Some(Pattern::Ident {
                    name: "a".into(),
                    span: sp(),
                }),
                None,
                Some(Pattern::Ident {
                    name: "b".into(),
                    span: sp(),
                }),
            ],
            span: sp(),
        };
        let chunk = compile_stmts(vec![decl_pattern(pattern, Expr::ident("value", sp()))]);
        // Two reads: indices 0 and 2 (the hole is skipped).
        let gets = chunk
            .opcodes()
            .iter()
            .filter(|op| **op == OpCode::GetIndex)
            .count();
        assert_eq!(gets, 2);
    }

    #[test]
    fn array_rest_collects_the_tail() {
        // let [head, ...tail] = value;
        let pattern = Pattern::Array {
            elements: vec![
                Some(Pattern::Ident {
                    name: "head".into(),
                    span: sp(),
                }),
                Some(Pattern::Rest {
                    inner: Box::new(Pattern::Ident {
                        name: "tail".into(),
                        span: sp(),
                    }),
                    span: sp(),
                }),
            ],
            span: sp(),
        };
        let chunk = compile_stmts(vec![decl_pattern(pattern, Expr::ident("value", sp()))]);
        chunk.assert_contains_opcodes(&[OpCode::GetIndex, OpCode::ArrayRest]);
    }

    #[test]
    fn object_pattern_with_rest_tracks_taken_keys() {
        // let { a, ...others } = value;
        let pattern = Pattern::Object {
            props: vec![ObjectPatternProp {
                key: PropKey::Ident("a".into()),
                value: Pattern::Ident {
                    name: "a".into(),
                    span: sp(),
                },
                span: sp(),
            }],
            rest: Some(Box::new(Pattern::Ident {
                name: "others".into(),
                span: sp(),
            })),
            span: sp(),
        };
        let chunk = compile_stmts(vec![decl_pattern(pattern, Expr::ident("value", sp()))]);
        chunk.assert_contains_opcodes(&[
            OpCode::NewArray,    // taken-keys array
            OpCode::GetProp,     // read a
            OpCode::ArrayAppend, // record "a" as taken
            OpCode::ObjectRest,
        ]);
    }

    #[test]
    fn default_applies_on_undefined() {
        // let [x = 1] = value;
        let pattern = Pattern::Array {
            elements: vec![Some(Pattern::Assign {
                target: Box::new(Pattern::Ident {
                    name: "x".into(),
                    span: sp(),
                }),
                default: Box::new(Expr::number(1.0, sp())),
                span: sp(),
            })],
            span: sp(),
        };
        let chunk = compile_stmts(vec![decl_pattern(pattern, Expr::ident("value", sp()))]);
        chunk.assert_contains_opcodes(&[
            OpCode::GetIndex,
            OpCode::JumpIfUndefined,
            OpCode::Jump,
            OpCode::LoadConst,
        ]);
    }
}
