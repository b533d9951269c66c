//! Statement, expression and pattern nodes.
//!
//! The tree is a closed set of tagged variants; the compiler dispatches on
//! the discriminant, never on open-world trait objects. Every node carries
//! a [`Span`]. Expression nodes the checker annotates ([`Expr::Ident`],
//! [`Expr::Member`], function literals) carry a [`StaticType`] slot that
//! defaults to `Unknown`; [`Expr::static_type`] is the uniform read surface.

use std::collections::BTreeMap;

use tidescript_core::{Span, StaticType};

// ============================================================================
// Program
// ============================================================================

/// The kind of compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// A classic script (top-level bindings become globals).
    #[default]
    Script,
    /// A module (import/export declarations allowed).
    Module,
    /// Eval text (inherits strictness from the calling context).
    Eval,
}

/// A parsed compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Stmt>,
    /// Script / module / eval.
    pub kind: SourceKind,
    /// Module path, when known (module mode).
    pub path: Option<String>,
    /// Optional parser-precomputed map of hoisted function declarations:
    /// name to index in `body`. Sorted iteration keeps emitted bytecode
    /// deterministic; when absent the hoisting pass scans `body` itself.
    pub hoisted_declarations: Option<BTreeMap<String, usize>>,
    /// Span of the whole unit.
    pub span: Span,
}

// ============================================================================
// Statements
// ============================================================================

/// Binding kind of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Function-scoped, hoisted, initialized to undefined.
    Var,
    /// Block-scoped with a temporal dead zone.
    Let,
    /// Block-scoped, TDZ, assignment is an error.
    Const,
}

/// One `target = init` unit of a declaration statement.
#[derive(Debug, Clone)]
pub struct Declarator {
    /// Bound name or destructuring pattern.
    pub target: Pattern,
    /// Initializer, if present.
    pub init: Option<Expr>,
    /// Source location.
    pub span: Span,
}

/// The init clause of a C-style `for`.
#[derive(Debug, Clone)]
pub enum ForInit {
    /// `for (let i = 0; ...)`
    Decl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    /// `for (i = 0; ...)`
    Expr(Expr),
}

/// The binding clause of `for-in` / `for-of`.
#[derive(Debug, Clone)]
pub enum ForHead {
    /// `for (let x of ...)` / `for (const [a, b] of ...)`
    Decl { kind: DeclKind, pattern: Pattern },
    /// `for (x of ...)` - assignment to an existing binding.
    Pattern(Pattern),
}

/// A `case`/`default` clause of a switch.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for the default clause.
    pub test: Option<Expr>,
    /// Clause body (falls through unless it breaks).
    pub body: Vec<Stmt>,
    /// Source location.
    pub span: Span,
}

/// A `catch` clause.
#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Exception binding; `None` for `catch { }`.
    pub param: Option<Pattern>,
    /// Handler body.
    pub body: Vec<Stmt>,
    /// Source location.
    pub span: Span,
}

/// A statement node.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// An expression evaluated for effect (and completion value).
    Expr { expr: Expr, span: Span },
    /// `var`/`let`/`const` declaration.
    Decl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
        span: Span,
    },
    /// A function declaration (`func.name` is always `Some`).
    Function { func: FunctionLit, span: Span },
    /// A class declaration (`class.name` is always `Some`).
    Class { class: ClassLit, span: Span },
    /// A TS-style enum declaration.
    Enum { decl: EnumDecl, span: Span },
    /// `return [value]`.
    Return { value: Option<Expr>, span: Span },
    /// `if (cond) then [else alt]`.
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        span: Span,
    },
    /// `{ ... }` block with its own lexical scope.
    Block { body: Vec<Stmt>, span: Span },
    /// `while (cond) body`.
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `do body while (cond)`.
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    /// C-style `for`.
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    /// `for (head in object) body`.
    ForIn {
        head: ForHead,
        object: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `for (head of iterable) body`.
    ForOf {
        head: ForHead,
        iterable: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `switch (disc) { cases }`.
    Switch {
        disc: Expr,
        cases: Vec<SwitchCase>,
        span: Span,
    },
    /// `try { } [catch] [finally]`.
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
        span: Span,
    },
    /// `throw value`.
    Throw { value: Expr, span: Span },
    /// `with (object) body`.
    With {
        object: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    /// `label: body`.
    Labeled {
        label: String,
        body: Box<Stmt>,
        span: Span,
    },
    /// `break [label]`.
    Break { label: Option<String>, span: Span },
    /// `continue [label]`.
    Continue { label: Option<String>, span: Span },
    /// `debugger`.
    Debugger { span: Span },
    /// `;`
    Empty { span: Span },
    /// An import declaration (module mode only).
    Import { decl: ImportDecl, span: Span },
    /// An export declaration (module mode only).
    Export { decl: ExportDecl, span: Span },
}

impl Stmt {
    /// Source location of this statement.
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { span, .. }
            | Stmt::Decl { span, .. }
            | Stmt::Function { span, .. }
            | Stmt::Class { span, .. }
            | Stmt::Enum { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::ForOf { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::With { span, .. }
            | Stmt::Labeled { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. }
            | Stmt::Debugger { span }
            | Stmt::Empty { span }
            | Stmt::Import { span, .. }
            | Stmt::Export { span, .. } => *span,
        }
    }

    /// Whether this statement is a `"use strict"`-style directive candidate:
    /// an expression statement whose expression is a plain string literal.
    pub fn directive(&self) -> Option<&str> {
        match self {
            Stmt::Expr {
                expr: Expr::Str { value, .. },
                ..
            } => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// A property inside an object pattern: `{ key: value }`.
#[derive(Debug, Clone)]
pub struct ObjectPatternProp {
    /// Property key being read.
    pub key: PropKey,
    /// Pattern the value binds to.
    pub value: Pattern,
    /// Source location.
    pub span: Span,
}

/// A binding pattern (declaration targets, parameters, catch bindings,
/// destructuring assignment targets).
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A plain name.
    Ident { name: String, span: Span },
    /// `[a, , b, ...rest]` - `None` entries are holes.
    Array {
        elements: Vec<Option<Pattern>>,
        span: Span,
    },
    /// `{ a, b: c, ...rest }`.
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// `target = default`.
    Assign {
        target: Box<Pattern>,
        default: Box<Expr>,
        span: Span,
    },
    /// `...inner` - only valid as the final element of an array pattern
    /// or the rest clause of parameters.
    Rest { inner: Box<Pattern>, span: Span },
}

impl Pattern {
    /// Source location of this pattern.
    pub fn span(&self) -> Span {
        match self {
            Pattern::Ident { span, .. }
            | Pattern::Array { span, .. }
            | Pattern::Object { span, .. }
            | Pattern::Assign { span, .. }
            | Pattern::Rest { span, .. } => *span,
        }
    }

    /// Collect every name this pattern binds, in source order.
    pub fn bound_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Ident { name, .. } => out.push(name),
            Pattern::Array { elements, .. } => {
                for elem in elements.iter().flatten() {
                    elem.bound_names(out);
                }
            }
            Pattern::Object { props, rest, .. } => {
                for prop in props {
                    prop.value.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Pattern::Assign { target, .. } => target.bound_names(out),
            Pattern::Rest { inner, .. } => inner.bound_names(out),
        }
    }
}

// ============================================================================
// Functions & Classes
// ============================================================================

/// One positional parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Bound name or destructuring pattern.
    pub pattern: Pattern,
    /// Default value, compiled under parameter TDZ rules.
    pub default: Option<Expr>,
    /// Source location.
    pub span: Span,
}

/// Body of a function literal.
#[derive(Debug, Clone)]
pub enum FnBody {
    /// `{ statements }`.
    Block(Vec<Stmt>),
    /// Concise arrow body: `x => expr`.
    Expr(Box<Expr>),
}

/// A function literal: declaration, expression, arrow, or method value.
#[derive(Debug, Clone)]
pub struct FunctionLit {
    /// Name for declarations and named function expressions.
    pub name: Option<String>,
    /// Positional parameters in declaration order.
    pub params: Vec<Param>,
    /// Rest clause, if any (`...name` or `...pattern`).
    pub rest: Option<Pattern>,
    /// The body.
    pub body: FnBody,
    /// Arrow function (lexical `this`, no `arguments`).
    pub is_arrow: bool,
    /// `async` function.
    pub is_async: bool,
    /// Generator (`function*`).
    pub is_generator: bool,
    /// Checker-computed signature type.
    pub ty: StaticType,
    /// Source location.
    pub span: Span,
}

/// The value side of a class member.
#[derive(Debug, Clone)]
pub enum ClassMemberValue {
    /// A method (shorthand method syntax).
    Method(FunctionLit),
    /// A field with an optional initializer.
    Field(Option<Expr>),
}

/// One member of a class body.
#[derive(Debug, Clone)]
pub struct ClassMember {
    /// Member name (may be `PropKey::Private` for `#field`).
    pub key: PropKey,
    /// `static` member (stored on the constructor, not the prototype).
    pub is_static: bool,
    /// Method or field.
    pub value: ClassMemberValue,
    /// Source location.
    pub span: Span,
}

/// A class literal: declaration or expression.
#[derive(Debug, Clone)]
pub struct ClassLit {
    /// Name for declarations and named class expressions.
    pub name: Option<String>,
    /// `extends` clause.
    pub superclass: Option<Box<Expr>>,
    /// Members in source order.
    pub members: Vec<ClassMember>,
    /// Source location.
    pub span: Span,
}

impl ClassLit {
    /// The constructor member, if the class declares one.
    pub fn constructor(&self) -> Option<&FunctionLit> {
        self.members.iter().find_map(|m| match (&m.key, &m.value) {
            (PropKey::Ident(name), ClassMemberValue::Method(func))
                if !m.is_static && name == "constructor" =>
            {
                Some(func)
            }
            _ => None,
        })
    }
}

/// A TS-style enum declaration.
#[derive(Debug, Clone)]
pub struct EnumDecl {
    /// Enum name.
    pub name: String,
    /// Members in source order.
    pub members: Vec<EnumMember>,
    /// Source location.
    pub span: Span,
}

/// One member of an enum.
#[derive(Debug, Clone)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Initializer; must be a constant expression when present.
    pub init: Option<Expr>,
    /// Source location.
    pub span: Span,
}

// ============================================================================
// Modules
// ============================================================================

/// One imported binding.
#[derive(Debug, Clone)]
pub enum ImportSpecifier {
    /// `import local from "m"`.
    Default { local: String },
    /// `import { imported as local } from "m"`.
    Named { imported: String, local: String },
    /// `import * as local from "m"`.
    Namespace { local: String },
}

/// An import declaration.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// Source module specifier.
    pub source: String,
    /// Bindings introduced (may be empty: `import "m"`).
    pub specifiers: Vec<ImportSpecifier>,
    /// Source location.
    pub span: Span,
}

/// One re-exported or locally exported name.
#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    /// Local (or source-module) name.
    pub local: String,
    /// Exported name.
    pub exported: String,
}

/// An export declaration.
#[derive(Debug, Clone)]
pub enum ExportDecl {
    /// `export <declaration>`.
    Decl(Box<Stmt>),
    /// `export default <expr>`.
    Default { expr: Box<Expr>, span: Span },
    /// `export { a as b } [from "m"]`.
    Named {
        specifiers: Vec<ExportSpecifier>,
        source: Option<String>,
        span: Span,
    },
    /// `export * from "m"`.
    All { source: String, span: Span },
}

// ============================================================================
// Expressions
// ============================================================================

/// A property key in object literals, classes, and member patterns.
#[derive(Debug, Clone)]
pub enum PropKey {
    /// `{ name: ... }`.
    Ident(String),
    /// `{ "name": ... }`.
    Str(String),
    /// `{ 1: ... }`.
    Number(f64),
    /// `{ [expr]: ... }`.
    Computed(Box<Expr>),
    /// `#name` (classes only).
    Private(String),
}

/// An argument or array element that may be spread.
#[derive(Debug, Clone)]
pub struct ExprOrSpread {
    /// `...expr` when true.
    pub spread: bool,
    /// The value.
    pub expr: Expr,
}

/// A member of an object literal.
#[derive(Debug, Clone)]
pub enum ObjectMember {
    /// `key: value`, shorthand `key`, or shorthand method.
    Prop {
        key: PropKey,
        value: Expr,
        shorthand: bool,
        span: Span,
    },
    /// `...expr`.
    Spread { expr: Expr, span: Span },
}

/// The property part of a member expression.
#[derive(Debug, Clone)]
pub enum MemberProp {
    /// `obj.name`.
    Ident(String),
    /// `obj.#name`.
    Private(String),
    /// `obj[expr]`.
    Index(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    In,
    InstanceOf,
}

/// Short-circuiting logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

/// `++`/`--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

/// Assignment operators, including compound and logical forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    /// `&&=`
    And,
    /// `||=`
    Or,
    /// `??=`
    Nullish,
}

impl AssignOp {
    /// The underlying binary operator for compound arithmetic/bitwise forms.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::Exp => Some(BinaryOp::Exp),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
            AssignOp::Ushr => Some(BinaryOp::Ushr),
            _ => None,
        }
    }

    /// The short-circuit operator for logical assignment forms.
    pub fn logical_op(self) -> Option<LogicalOp> {
        match self {
            AssignOp::And => Some(LogicalOp::And),
            AssignOp::Or => Some(LogicalOp::Or),
            AssignOp::Nullish => Some(LogicalOp::Nullish),
            _ => None,
        }
    }
}

/// The target of an assignment expression.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// Identifier, member, or index expression.
    Expr(Box<Expr>),
    /// Destructuring pattern (`[a, b] = arr`, `{x} = obj`). Plain `=` only.
    Pattern(Box<Pattern>),
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Number literal.
    Number { value: f64, span: Span },
    /// BigInt literal (digits, without the `n` suffix).
    BigInt { value: String, span: Span },
    /// String literal.
    Str { value: String, span: Span },
    /// Boolean literal.
    Bool { value: bool, span: Span },
    /// `null`.
    Null { span: Span },
    /// Regex literal.
    Regex {
        pattern: String,
        flags: String,
        span: Span,
    },
    /// Template literal: `quasis` has exactly one more entry than `exprs`.
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
        span: Span,
    },
    /// An identifier reference.
    Ident {
        name: String,
        ty: StaticType,
        span: Span,
    },
    /// `this`.
    This { span: Span },
    /// `super` (only valid as a callee or member base).
    Super { span: Span },
    /// `new.target`.
    NewTarget { span: Span },
    /// `import.meta`.
    ImportMeta { span: Span },
    /// `import(specifier)`.
    DynamicImport { arg: Box<Expr>, span: Span },
    /// Array literal (`None` entries are holes).
    Array {
        elements: Vec<Option<ExprOrSpread>>,
        span: Span,
    },
    /// Object literal.
    Object {
        members: Vec<ObjectMember>,
        span: Span,
    },
    /// Function or arrow literal.
    Function(FunctionLit),
    /// Class expression.
    Class(ClassLit),
    /// Unary operator application.
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// `++x` / `x--`.
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
        span: Span,
    },
    /// Non-short-circuiting binary operator.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `&&` / `||` / `??`.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// Assignment, compound assignment, or logical assignment.
    Assign {
        op: AssignOp,
        target: AssignTarget,
        value: Box<Expr>,
        span: Span,
    },
    /// `test ? consequent : alternate`.
    Cond {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
        span: Span,
    },
    /// Call expression; `optional` marks `a?.()`.
    Call {
        callee: Box<Expr>,
        args: Vec<ExprOrSpread>,
        optional: bool,
        span: Span,
    },
    /// `new callee(args)`.
    New {
        callee: Box<Expr>,
        args: Vec<ExprOrSpread>,
        span: Span,
    },
    /// Member access; `optional` marks `a?.b` / `a?.[i]`.
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
        ty: StaticType,
        span: Span,
    },
    /// Comma expression.
    Sequence { exprs: Vec<Expr>, span: Span },
    /// `yield [arg]` / `yield* arg`.
    Yield {
        arg: Option<Box<Expr>>,
        delegate: bool,
        span: Span,
    },
    /// `await arg`.
    Await { arg: Box<Expr>, span: Span },
}

impl Expr {
    /// Source location of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::BigInt { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Null { span }
            | Expr::Regex { span, .. }
            | Expr::Template { span, .. }
            | Expr::Ident { span, .. }
            | Expr::This { span }
            | Expr::Super { span }
            | Expr::NewTarget { span }
            | Expr::ImportMeta { span }
            | Expr::DynamicImport { span, .. }
            | Expr::Array { span, .. }
            | Expr::Object { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Update { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Cond { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Member { span, .. }
            | Expr::Sequence { span, .. }
            | Expr::Yield { span, .. }
            | Expr::Await { span, .. } => *span,
            Expr::Function(func) => func.span,
            Expr::Class(class) => class.span,
        }
    }

    /// The checker-computed type of this expression.
    ///
    /// Literal shapes answer from their own discriminant; identifier and
    /// member nodes answer from the checker-filled slot; everything else
    /// is `Unknown`.
    pub fn static_type(&self) -> StaticType {
        match self {
            Expr::Number { .. } => StaticType::Number,
            Expr::BigInt { .. } => StaticType::BigInt,
            Expr::Str { .. } | Expr::Template { .. } => StaticType::String,
            Expr::Bool { .. } => StaticType::Boolean,
            Expr::Null { .. } => StaticType::Null,
            Expr::Array { .. } => StaticType::Array,
            Expr::Ident { ty, .. } | Expr::Member { ty, .. } => ty.clone(),
            Expr::Function(func) => func.ty.clone(),
            Expr::Object { members, .. } => {
                let mut props = Vec::new();
                for member in members {
                    match member {
                        ObjectMember::Prop {
                            key: PropKey::Ident(name) | PropKey::Str(name),
                            ..
                        } => props.push(name.clone()),
                        // Spread or computed keys make the set open.
                        _ => return StaticType::Unknown,
                    }
                }
                StaticType::Object {
                    props: props.into(),
                }
            }
            _ => StaticType::Unknown,
        }
    }

    // ------------------------------------------------------------------------
    // Construction helpers (used heavily by tests; parsers build nodes
    // directly)
    // ------------------------------------------------------------------------

    /// A number literal at a span.
    pub fn number(value: f64, span: Span) -> Expr {
        Expr::Number { value, span }
    }

    /// A string literal at a span.
    pub fn str(value: impl Into<String>, span: Span) -> Expr {
        Expr::Str {
            value: value.into(),
            span,
        }
    }

    /// A boolean literal at a span.
    pub fn bool(value: bool, span: Span) -> Expr {
        Expr::Bool { value, span }
    }

    /// An identifier reference at a span.
    pub fn ident(name: impl Into<String>, span: Span) -> Expr {
        Expr::Ident {
            name: name.into(),
            ty: StaticType::Unknown,
            span,
        }
    }

    /// A binary operator application.
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span().merge(right.span());
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }
    }

    /// A plain assignment to an expression target.
    pub fn assign(target: Expr, value: Expr) -> Expr {
        let span = target.span().merge(value.span());
        Expr::Assign {
            op: AssignOp::Assign,
            target: AssignTarget::Expr(Box::new(target)),
            value: Box::new(value),
            span,
        }
    }

    /// A non-optional property access `object.name`.
    pub fn member(object: Expr, name: impl Into<String>, span: Span) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: MemberProp::Ident(name.into()),
            optional: false,
            ty: StaticType::Unknown,
            span,
        }
    }

    /// A non-optional, non-spread call.
    pub fn call(callee: Expr, args: Vec<Expr>, span: Span) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args: args
                .into_iter()
                .map(|expr| ExprOrSpread {
                    spread: false,
                    expr,
                })
                .collect(),
            optional: false,
            span,
        }
    }
}

impl Stmt {
    /// An expression statement.
    pub fn expr(expr: Expr) -> Stmt {
        let span = expr.span();
        Stmt::Expr { expr, span }
    }

    /// A single-declarator declaration binding `name`.
    pub fn decl(kind: DeclKind, name: impl Into<String>, init: Option<Expr>, span: Span) -> Stmt {
        Stmt::Decl {
            kind,
            declarators: vec![Declarator {
                target: Pattern::Ident {
                    name: name.into(),
                    span,
                },
                init,
                span,
            }],
            span,
        }
    }

    /// A return statement.
    pub fn ret(value: Option<Expr>, span: Span) -> Stmt {
        Stmt::Return { value, span }
    }
}

impl FunctionLit {
    /// A plain (non-arrow, non-async, non-generator) function literal with
    /// identifier parameters and a block body.
    pub fn plain(
        name: Option<&str>,
        params: &[&str],
        body: Vec<Stmt>,
        span: Span,
    ) -> FunctionLit {
        FunctionLit {
            name: name.map(str::to_string),
            params: params
                .iter()
                .map(|p| Param {
                    pattern: Pattern::Ident {
                        name: (*p).to_string(),
                        span,
                    },
                    default: None,
                    span,
                })
                .collect(),
            rest: None,
            body: FnBody::Block(body),
            is_arrow: false,
            is_async: false,
            is_generator: false,
            ty: StaticType::Unknown,
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp() -> Span {
        Span::new(1, 1, 1)
    }

    #[test]
    fn bound_names_simple() {
        let pattern = Pattern::Ident {
            name: "x".into(),
            span: sp(),
        };
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn bound_names_nested() {
        // [a, {b: c, ...rest}, ...d]
        let pattern = Pattern::Array {
            elements: vec![
                Some(Pattern::Ident {
                    name: "a".into(),
                    span: sp(),
                }),
                None,
                Some(Pattern::Object {
                    props: vec![ObjectPatternProp {
                        key: PropKey::Ident("b".into()),
                        value: Pattern::Ident {
                            name: "c".into(),
                            span: sp(),
                        },
                        span: sp(),
                    }],
                    rest: Some(Box::new(Pattern::Ident {
                        name: "rest".into(),
                        span: sp(),
                    })),
                    span: sp(),
                }),
                Some(Pattern::Rest {
                    inner: Box::new(Pattern::Ident {
                        name: "d".into(),
                        span: sp(),
                    }),
                    span: sp(),
                }),
            ],
            span: sp(),
        };
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        assert_eq!(names, vec!["a", "c", "rest", "d"]);
    }

    #[test]
    fn directive_detection() {
        let stmt = Stmt::expr(Expr::str("use strict", sp()));
        assert_eq!(stmt.directive(), Some("use strict"));

        let stmt = Stmt::expr(Expr::number(1.0, sp()));
        assert_eq!(stmt.directive(), None);
    }

    #[test]
    fn static_type_of_literals() {
        assert_eq!(Expr::number(1.0, sp()).static_type(), StaticType::Number);
        assert_eq!(Expr::str("s", sp()).static_type(), StaticType::String);
        assert_eq!(
            Expr::Array {
                elements: vec![],
                span: sp()
            }
            .static_type(),
            StaticType::Array
        );
    }

    #[test]
    fn static_type_of_closed_object() {
        let obj = Expr::Object {
            members: vec![ObjectMember::Prop {
                key: PropKey::Ident("x".into()),
                value: Expr::number(1.0, sp()),
                shorthand: false,
                span: sp(),
            }],
            span: sp(),
        };
        assert_eq!(obj.static_type().known_props(), Some(&["x".to_string()][..]));

        let open = Expr::Object {
            members: vec![ObjectMember::Spread {
                expr: Expr::ident("other", sp()),
                span: sp(),
            }],
            span: sp(),
        };
        assert_eq!(open.static_type(), StaticType::Unknown);
    }

    #[test]
    fn assign_op_classification() {
        assert_eq!(AssignOp::Add.binary_op(), Some(BinaryOp::Add));
        assert_eq!(AssignOp::And.binary_op(), None);
        assert_eq!(AssignOp::And.logical_op(), Some(LogicalOp::And));
        assert_eq!(AssignOp::Assign.binary_op(), None);
        assert_eq!(AssignOp::Assign.logical_op(), None);
    }

    #[test]
    fn class_constructor_lookup() {
        let class = ClassLit {
            name: Some("C".into()),
            superclass: None,
            members: vec![ClassMember {
                key: PropKey::Ident("constructor".into()),
                is_static: false,
                value: ClassMemberValue::Method(FunctionLit::plain(None, &[], vec![], sp())),
                span: sp(),
            }],
            span: sp(),
        };
        assert!(class.constructor().is_some());

        let empty = ClassLit {
            name: None,
            superclass: None,
            members: vec![],
            span: sp(),
        };
        assert!(empty.constructor().is_none());
    }
}
