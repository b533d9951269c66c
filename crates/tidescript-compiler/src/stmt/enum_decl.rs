//! Enum declaration lowering.
//!
//! An enum becomes a frozen-shape member object. Numeric members also
//! write the reverse mapping (`E[E.A] === "A"`). Initializers must be
//! constant expressions; auto-numbering continues from the previous
//! numeric member.

use tidescript_ast::{EnumDecl, Expr, UnaryOp};
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::{Constant, OpCode};
use crate::driver::Compiler;

/// A constant-evaluated enum member value.
#[derive(Debug, Clone, PartialEq)]
enum EnumValue {
    Number(f64),
    Str(String),
}

/// Constant-evaluate an enum initializer; `None` means not constant.
fn const_eval(expr: &Expr) -> Option<EnumValue> {
    match expr {
        Expr::Number { value, .. } => Some(EnumValue::Number(*value)),
        Expr::Str { value, .. } => Some(EnumValue::Str(value.clone())),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
            ..
        } => match const_eval(operand)? {
            EnumValue::Number(n) => Some(EnumValue::Number(-n)),
            EnumValue::Str(_) => None,
        },
        _ => None,
    }
}

impl<'h> Compiler<'h> {
    pub(crate) fn compile_enum_decl(&mut self, decl: &EnumDecl) -> Result<(), LimitError> {
        let object = self.alloc_reg()?;
        self.emit_a(OpCode::NewObject, object);

        let mut next_auto = 0.0f64;
        for member in &decl.members {
            self.set_line(member.span);
            let value = match &member.init {
                None => EnumValue::Number(next_auto),
                Some(init) => match const_eval(init) {
                    Some(value) => value,
                    None => {
                        self.error(CompileError::EnumConstInitializer {
                            name: member.name.clone(),
                            span: member.span,
                        });
                        continue;
                    }
                },
            };

            let value_reg = self.alloc_reg()?;
            match &value {
                EnumValue::Number(n) => {
                    self.emit_load_const(value_reg, Constant::Number(*n))?;
                    next_auto = n + 1.0;
                }
                EnumValue::Str(s) => {
                    self.emit_load_const(value_reg, Constant::Str(s.clone()))?;
                }
            }

            let name_const = self.str_const(&member.name)?;
            self.emit_a(OpCode::SetProp, object);
            self.emit_u16(name_const);
            self.emit_byte(value_reg);

            // Reverse mapping for numeric members.
            if matches!(value, EnumValue::Number(_)) {
                let name_reg = self.alloc_reg()?;
                self.emit_load_const(name_reg, Constant::Str(member.name.clone()))?;
                self.emit_abc(OpCode::SetIndex, object, value_reg, name_reg);
                self.free_reg(name_reg);
            }
            self.free_reg(value_reg);
        }

        self.emit_init_binding(&decl.name, object);
        self.free_reg(object);
        Ok(())
    }
}
