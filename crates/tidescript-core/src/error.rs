//! Unified error types for the tidescript compiler.
//!
//! This module provides a consistent error type hierarchy for the compiler
//! pipeline. Two kinds of failure are modeled separately:
//!
//! ```text
//! TidescriptError (top-level wrapper)
//! ├── CompileError - syntactic/semantic errors, collected per compiler
//! └── LimitError   - resource limits, fatal, terminate compilation
//! ```
//!
//! `CompileError`s attach a source position and accumulate in the
//! per-compiler error list; compilation continues past the failing subtree
//! so a single pass surfaces as many diagnostics as possible.
//!
//! `LimitError`s (register exhaustion, too many upvalues, jump offsets that
//! no longer fit in `i16`, global/constant pool overflow) abort the whole
//! compilation; the driver returns them as `Err`.
//!
//! Internal invariant violations (a resolved binding holding the nil
//! register, a hoisted declaration that is not a function literal) are
//! compiler bugs, not user errors, and panic.

use thiserror::Error;

use crate::Span;

// ============================================================================
// Compile Errors
// ============================================================================

/// Errors produced by semantic analysis and code generation.
///
/// These are user errors: they carry the source position of the offending
/// construct and are appended to the compiler's error list. The compiler
/// keeps going after recording one, returning the nil-register sentinel for
/// the failed subtree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The left-hand side of an assignment is not an identifier, member, or
    /// index expression.
    #[error("at {span}: invalid assignment target")]
    InvalidAssignmentTarget { span: Span },

    /// Assignment to a name that has no binding anywhere in scope (strict
    /// mode forbids implicit global creation).
    #[error("at {span}: assignment to undeclared variable '{name}'")]
    UndeclaredVariable { name: String, span: Span },

    /// Assignment to a `const` binding.
    #[error("at {span}: assignment to constant variable '{name}'")]
    ConstAssignment { name: String, span: Span },

    /// A binding was declared twice in the same scope.
    #[error("at {new_span}: '{name}' redeclared (originally declared at {original_span})")]
    Redeclaration {
        name: String,
        original_span: Span,
        new_span: Span,
    },

    /// An operator the code generator has no lowering for.
    #[error("at {span}: unsupported operator '{op}'")]
    UnsupportedOperator { op: String, span: Span },

    /// Enum members require constant initializers.
    #[error("at {span}: enum member '{name}' requires a constant initializer")]
    EnumConstInitializer { name: String, span: Span },

    /// A named export does not exist in the source module.
    #[error("at {span}: module '{module}' has no export named '{name}'")]
    ExportNotFound {
        name: String,
        module: String,
        span: Span,
    },

    /// Spread appeared somewhere it is not allowed.
    #[error("at {span}: spread is not allowed here")]
    InvalidSpread { span: Span },

    /// A rest element appeared somewhere it is not allowed (not in final
    /// position, or outside a pattern).
    #[error("at {span}: rest element is not allowed here")]
    InvalidRest { span: Span },

    /// `break` outside of a loop or switch, or to an unknown label.
    #[error("at {span}: illegal break{}", label.as_ref().map(|l| format!(" to label '{l}'")).unwrap_or_default())]
    IllegalBreak { label: Option<String>, span: Span },

    /// `continue` outside of a loop, or to an unknown label.
    #[error("at {span}: illegal continue{}", label.as_ref().map(|l| format!(" to label '{l}'")).unwrap_or_default())]
    IllegalContinue { label: Option<String>, span: Span },

    /// `with` is forbidden in strict mode.
    #[error("at {span}: 'with' statements are not allowed in strict mode")]
    WithInStrictMode { span: Span },

    /// `super` used outside a class method (or eval without the toggle).
    #[error("at {span}: 'super' is not allowed here")]
    SuperOutsideMethod { span: Span },

    /// `import`/`export` declaration outside of module mode.
    #[error("at {span}: import/export declarations require module mode")]
    NotInModule { span: Span },

    /// A checker-reported type error (typed compilation only).
    #[error("at {span}: type error: {message}")]
    Type { message: String, span: Span },

    /// The compiler has no lowering for this node kind.
    #[error("at {span}: compilation not implemented for {what}")]
    NotImplemented { what: String, span: Span },

    /// Fallback for errors that don't fit the structured variants.
    #[error("at {span}: {message}")]
    Other { message: String, span: Span },
}

impl CompileError {
    /// Get the span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            CompileError::InvalidAssignmentTarget { span }
            | CompileError::UndeclaredVariable { span, .. }
            | CompileError::ConstAssignment { span, .. }
            | CompileError::Redeclaration { new_span: span, .. }
            | CompileError::UnsupportedOperator { span, .. }
            | CompileError::EnumConstInitializer { span, .. }
            | CompileError::ExportNotFound { span, .. }
            | CompileError::InvalidSpread { span }
            | CompileError::InvalidRest { span }
            | CompileError::IllegalBreak { span, .. }
            | CompileError::IllegalContinue { span, .. }
            | CompileError::WithInStrictMode { span }
            | CompileError::SuperOutsideMethod { span }
            | CompileError::NotInModule { span }
            | CompileError::Type { span, .. }
            | CompileError::NotImplemented { span, .. }
            | CompileError::Other { span, .. } => *span,
        }
    }
}

// ============================================================================
// Limit Errors
// ============================================================================

/// Resource-limit failures. Fatal: compilation terminates.
///
/// Unlike [`CompileError`], these do not accumulate; the first one aborts
/// the compile and propagates to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitError {
    /// A function captured more than 65,535 upvalues.
    #[error("too many upvalues in function (max 65535)")]
    TooManyUpvalues,

    /// The register file (0-254) is exhausted and no spill is possible
    /// (e.g. a contiguous call window does not fit).
    #[error("out of registers (max 255)")]
    RegisterExhausted,

    /// More than 65,535 spill slots were requested.
    #[error("too many spilled variables (max 65535)")]
    SpillExhausted,

    /// A patched jump offset does not fit in a signed 16-bit operand.
    #[error("jump offset out of range (max ±32767 bytes)")]
    JumpTooFar,

    /// The 16-bit global index space is exhausted.
    #[error("too many globals (max 65535)")]
    TooManyGlobals,

    /// The 16-bit constant pool index space is exhausted.
    #[error("too many constants in one chunk (max 65535)")]
    TooManyConstants,
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error wrapper for unified handling at the driver boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TidescriptError {
    /// A collected compile error (usually the first of the list).
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A fatal resource-limit error.
    #[error(transparent)]
    Limit(#[from] LimitError),
}
