//! Class lowering.
//!
//! A class becomes a constructor closure plus a prototype object:
//!
//! ```text
//! ctor  = closure(constructor body, instance field inits inlined first)
//! proto = {}                      ; proto.[[Prototype]] = super.prototype
//! proto.method = closure(...)     ; per instance method
//! ctor.static = ...               ; statics live on the constructor
//! ctor.prototype = proto; proto.constructor = ctor
//! ```
//!
//! `super` dispatch rides the ordinary upvalue machinery: the class scope
//! declares synthetic `__super_ctor__` / `__super_proto__` bindings, so
//! `super(...)` and `super.m()` inside any method (or nested arrow)
//! resolve them as captures instead of needing a home-object slot.

use tidescript_ast::{
    AssignOp, AssignTarget, ClassLit, ClassMemberValue, Expr, ExprOrSpread, FnBody, FunctionLit,
    MemberProp, Pattern, PropKey, Stmt,
};
use tidescript_core::{LimitError, Span, StaticType};

use crate::bytecode::{OpCode, Register};
use crate::driver::Compiler;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_class_literal(
        &mut self,
        class: &ClassLit,
        hint: Option<Register>,
    ) -> Result<Register, LimitError> {
        let dst = self.hint_or_alloc(hint)?;
        let span = class.span;

        // Class scope carries the synthetic super bindings.
        self.table.push(ScopeKind::Block);
        let has_super = class.superclass.is_some();
        if let Some(superclass) = &class.superclass {
            let ctor_storage = self.declare_variable("__super_ctor__", span, true, false)?;
            let parent = self.compile_expr(superclass, None)?;
            self.store_to_storage(ctor_storage, parent);

            let proto_storage = self.declare_variable("__super_proto__", span, true, false)?;
            let parent_proto = self.alloc_reg()?;
            let prototype_const = self.str_const("prototype")?;
            self.emit_ab(OpCode::GetProp, parent_proto, parent);
            self.emit_u16(prototype_const);
            self.store_to_storage(proto_storage, parent_proto);
            self.free_reg(parent_proto);
            self.free_reg(parent);
        }

        // Constructor: declared body (with field inits inlined at entry)
        // or a synthesized default.
        let ctor = build_constructor(class, has_super, span);
        self.compile_function_literal(&ctor, Some(dst), true)?;

        // Prototype object.
        let proto = self.alloc_reg()?;
        self.emit_a(OpCode::NewObject, proto);
        if has_super {
            let parent_proto = self.load_super_binding("__super_proto__", span)?;
            self.emit_ab(OpCode::SetProto, proto, parent_proto);
            self.free_reg(parent_proto);
        }

        // Members.
        for member in &class.members {
            self.set_line(member.span);
            match &member.value {
                ClassMemberValue::Method(func) => {
                    if is_constructor_member(&member.key, member.is_static) {
                        continue;
                    }
                    let method = self.compile_function_literal(func, None, true)?;
                    let target = if member.is_static { dst } else { proto };
                    self.emit_prop_write(target, &member.key, method)?;
                    self.free_reg(method);
                }
                ClassMemberValue::Field(init) => {
                    if !member.is_static {
                        // Instance fields were inlined into the ctor.
                        continue;
                    }
                    let value = match init {
                        Some(init) => self.compile_expr(init, None)?,
                        None => {
                            let reg = self.alloc_reg()?;
                            self.emit_a(OpCode::LoadUndefined, reg);
                            reg
                        }
                    };
                    self.emit_prop_write(dst, &member.key, value)?;
                    self.free_reg(value);
                }
            }
        }

        // Wire the prototype chain.
        let prototype_const = self.str_const("prototype")?;
        self.emit_a(OpCode::SetProp, dst);
        self.emit_u16(prototype_const);
        self.emit_byte(proto);
        let constructor_const = self.str_const("constructor")?;
        self.emit_a(OpCode::SetProp, proto);
        self.emit_u16(constructor_const);
        self.emit_byte(dst);

        self.free_reg(proto);
        self.table.pop();
        Ok(dst)
    }
}

/// Whether a member is the instance constructor.
fn is_constructor_member(key: &PropKey, is_static: bool) -> bool {
    !is_static && matches!(key, PropKey::Ident(name) if name == "constructor")
}

/// Build the constructor to compile: the declared one with instance field
/// initializers inlined at entry, or a synthesized default (`super(...)`
/// pass-through for derived classes).
fn build_constructor(class: &ClassLit, has_super: bool, span: Span) -> FunctionLit {
    let mut body: Vec<Stmt> = Vec::new();

    let declared = class.constructor().cloned();
    if declared.is_none() && has_super {
        // constructor(...args) { super(...args) }
        let super_call = Expr::Call {
            callee: Box::new(Expr::Super { span }),
            args: vec![ExprOrSpread {
                spread: true,
                expr: Expr::ident("args", span),
            }],
            optional: false,
            span,
        };
        body.push(Stmt::expr(super_call));
    }

    // Field initializers run at constructor entry, in declaration order.
    for member in &class.members {
        if member.is_static {
            continue;
        }
        if let ClassMemberValue::Field(init) = &member.value {
            let value = match init {
                Some(init) => init.clone(),
                None => Expr::ident("undefined", member.span),
            };
            let target = Expr::Member {
                object: Box::new(Expr::This { span: member.span }),
                property: match &member.key {
                    PropKey::Ident(name) | PropKey::Str(name) => MemberProp::Ident(name.clone()),
                    PropKey::Private(name) => MemberProp::Private(name.clone()),
                    PropKey::Number(n) => {
                        MemberProp::Index(Box::new(Expr::number(*n, member.span)))
                    }
                    PropKey::Computed(expr) => MemberProp::Index(expr.clone()),
                },
                optional: false,
                ty: StaticType::Unknown,
                span: member.span,
            };
            body.push(Stmt::expr(Expr::Assign {
                op: AssignOp::Assign,
                target: AssignTarget::Expr(Box::new(target)),
                value: Box::new(value),
                span: member.span,
            }));
        }
    }

    match declared {
        Some(mut ctor) => {
            if let FnBody::Block(ctor_body) = &mut ctor.body {
                // Field inits precede the declared body. A derived class's
                // explicit super() still runs first at runtime because the
                // VM defers `this` access until it completes; the compiler
                // keeps source order for everything else.
                let mut merged = body;
                merged.append(ctor_body);
                *ctor_body = merged;
            }
            ctor.name = class.name.clone();
            ctor
        }
        None => FunctionLit {
            name: class.name.clone(),
            params: Vec::new(),
            rest: if has_super {
                Some(Pattern::Ident {
                    name: "args".into(),
                    span,
                })
            } else {
                None
            },
            body: FnBody::Block(body),
            is_arrow: false,
            is_async: false,
            is_generator: false,
            ty: StaticType::Unknown,
            span,
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::OpCode;
    use crate::test_support::{compile_stmts, first_function, output_of};
    use tidescript_ast::{
        ClassLit, ClassMember, ClassMemberValue, Expr, FunctionLit, PropKey, Stmt,
    };
    use tidescript_core::Span;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    fn method(name: &str, is_static: bool, func: FunctionLit) -> ClassMember {
        ClassMember {
            key: PropKey::Ident(name.into()),
            is_static,
            value: ClassMemberValue::Method(func),
            span: sp(),
        }
    }

    fn class_stmt(class: ClassLit) -> Stmt {
        Stmt::Class {
            class,
            span: sp(),
        }
    }

    #[test]
    fn plain_class_wires_the_prototype_chain() {
        let chunk = compile_stmts(vec![class_stmt(ClassLit {
            name: Some("Point".into()),
            superclass: None,
            members: vec![method("move", false, FunctionLit::plain(None, &["d"], vec![], sp()))],
            span: sp(),
        })]);

        chunk.assert_contains_opcodes(&[
            OpCode::Closure,   // constructor
            OpCode::NewObject, // prototype
            OpCode::Closure,   // method
            OpCode::SetProp,   // proto.move
            OpCode::SetProp,   // ctor.prototype
            OpCode::SetProp,   // proto.constructor
        ]);
    }

    #[test]
    fn derived_class_links_the_parent_prototype() {
        let chunk = compile_stmts(vec![class_stmt(ClassLit {
            name: Some("Dog".into()),
            superclass: Some(Box::new(Expr::ident("Animal", sp()))),
            members: vec![],
            span: sp(),
        })]);
        chunk.assert_contains_opcodes(&[
            OpCode::GetGlobal, // Animal
            OpCode::GetProp,   // Animal.prototype
            OpCode::SetProto,
        ]);
    }

    #[test]
    fn default_derived_constructor_forwards_to_super() {
        let chunk = compile_stmts(vec![class_stmt(ClassLit {
            name: Some("Dog".into()),
            superclass: Some(Box::new(Expr::ident("Animal", sp()))),
            members: vec![],
            span: sp(),
        })]);
        // The synthesized ctor captures __super_ctor__ and has a rest
        // parameter for the pass-through.
        let ctor = first_function(&chunk);
        assert!(ctor.has_rest());
        assert!(ctor.upvalue_count >= 1);
        ctor.chunk
            .assert_contains_opcodes(&[OpCode::LoadFree, OpCode::LoadThis, OpCode::CallMethodSpread]);
    }

    #[test]
    fn instance_fields_inline_into_the_constructor() {
        let chunk = compile_stmts(vec![class_stmt(ClassLit {
            name: Some("Counter".into()),
            superclass: None,
            members: vec![ClassMember {
                key: PropKey::Private("count".into()),
                is_static: false,
                value: ClassMemberValue::Field(Some(Expr::number(0.0, sp()))),
                span: sp(),
            }],
            span: sp(),
        })]);
        let ctor = first_function(&chunk);
        ctor.chunk
            .assert_contains_opcodes(&[OpCode::LoadThis, OpCode::SetPrivateField]);
    }

    #[test]
    fn static_members_land_on_the_constructor() {
        let chunk = compile_stmts(vec![class_stmt(ClassLit {
            name: Some("Registry".into()),
            superclass: None,
            members: vec![ClassMember {
                key: PropKey::Ident("instances".into()),
                is_static: true,
                value: ClassMemberValue::Field(Some(Expr::number(0.0, sp()))),
                span: sp(),
            }],
            span: sp(),
        })]);
        // Static field store happens before prototype wiring, targeting
        // the ctor register.
        chunk.assert_contains_opcodes(&[OpCode::Closure, OpCode::NewObject, OpCode::SetProp]);
    }

    #[test]
    fn super_method_call_in_a_method() {
        // class Dog extends Animal { speak() { return super.speak(); } }
        let speak = FunctionLit::plain(
            None,
            &[],
            vec![Stmt::ret(
                Some(Expr::call(
                    Expr::Member {
                        object: Box::new(Expr::Super { span: sp() }),
                        property: tidescript_ast::MemberProp::Ident("speak".into()),
                        optional: false,
                        ty: tidescript_core::StaticType::Unknown,
                        span: sp(),
                    },
                    vec![],
                    sp(),
                )),
                sp(),
            )],
            sp(),
        );
        let output = output_of(vec![class_stmt(ClassLit {
            name: Some("Dog".into()),
            superclass: Some(Box::new(Expr::ident("Animal", sp()))),
            members: vec![method("speak", false, speak)],
            span: sp(),
        })]);
        assert!(output.is_success());
    }

    #[test]
    fn class_expression_yields_the_constructor() {
        let output = output_of(vec![Stmt::expr(Expr::Class(ClassLit {
            name: None,
            superclass: None,
            members: vec![],
            span: sp(),
        }))]);
        assert!(output.is_success());
        output
            .chunk
            .assert_contains_opcodes(&[OpCode::Closure, OpCode::NewObject]);
    }
}
