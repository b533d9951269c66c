//! Array and object literal lowering.

use tidescript_ast::{Expr, ObjectMember, PropKey};
use tidescript_core::LimitError;

use crate::bytecode::{Constant, OpCode, Register};
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_container(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        match expr {
            Expr::Array { elements, .. } => {
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::NewArray, dst);
                for element in elements {
                    match element {
                        None => {
                            // A hole still occupies an index.
                            let reg = self.alloc_reg()?;
                            self.emit_a(OpCode::LoadUndefined, reg);
                            self.emit_ab(OpCode::ArrayAppend, dst, reg);
                            self.free_reg(reg);
                        }
                        Some(element) if element.spread => {
                            let reg = self.compile_expr(&element.expr, None)?;
                            self.emit_ab(OpCode::ArrayExtend, dst, reg);
                            self.free_reg(reg);
                        }
                        Some(element) => {
                            let reg = self.compile_expr(&element.expr, None)?;
                            self.emit_ab(OpCode::ArrayAppend, dst, reg);
                            self.free_reg(reg);
                        }
                    }
                }
                Ok(dst)
            }
            Expr::Object { members, .. } => {
                let dst = self.hint_or_alloc(hint)?;
                self.emit_a(OpCode::NewObject, dst);
                for member in members {
                    match member {
                        ObjectMember::Prop { key, value, .. } => {
                            let value_reg = self.compile_expr(value, None)?;
                            self.emit_prop_write(dst, key, value_reg)?;
                            self.free_reg(value_reg);
                        }
                        ObjectMember::Spread { expr, .. } => {
                            let src = self.compile_expr(expr, None)?;
                            self.emit_ab(OpCode::CopyProps, dst, src);
                            self.free_reg(src);
                        }
                    }
                }
                Ok(dst)
            }
            _ => unreachable!("compile_container on non-container"),
        }
    }

    /// Write `value` to `obj` under a literal property key.
    pub(crate) fn emit_prop_write(
        &mut self,
        obj: Register,
        key: &PropKey,
        value: Register,
    ) -> Result<(), LimitError> {
        match key {
            PropKey::Ident(name) | PropKey::Str(name) => {
                let name_const = self.str_const(name)?;
                self.emit_a(OpCode::SetProp, obj);
                self.emit_u16(name_const);
                self.emit_byte(value);
            }
            PropKey::Number(number) => {
                let key_reg = self.alloc_reg()?;
                self.emit_load_const(key_reg, Constant::Number(*number))?;
                self.emit_abc(OpCode::SetIndex, obj, key_reg, value);
                self.free_reg(key_reg);
            }
            PropKey::Computed(key_expr) => {
                let key_reg = self.compile_expr(key_expr, None)?;
                self.emit_abc(OpCode::SetIndex, obj, key_reg, value);
                self.free_reg(key_reg);
            }
            PropKey::Private(name) => {
                let name_const = self.str_const(name)?;
                self.emit_a(OpCode::SetPrivateField, obj);
                self.emit_u16(name_const);
                self.emit_byte(value);
            }
        }
        Ok(())
    }
}
