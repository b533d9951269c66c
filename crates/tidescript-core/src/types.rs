//! Computed-type vocabulary shared between the checker and the compiler.
//!
//! The code generator consults a handful of checker-computed facts: whether
//! a `for-of` operand is a known array (fast-path lowering), the parameter
//! count of a known callee (undefined-padding of trailing optionals), and
//! the property set of a `with` object (static vs. dynamic name routing).
//! [`StaticType`] is that vocabulary - deliberately far short of a type
//! system.

use std::rc::Rc;

/// The checker's computed type for an expression node.
///
/// `Unknown` is the default and always safe: every consumer of a computed
/// type falls back to the fully dynamic lowering when it sees it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StaticType {
    /// Nothing is known; use the dynamic path.
    #[default]
    Unknown,
    /// A number (f64).
    Number,
    /// A bigint.
    BigInt,
    /// A boolean.
    Boolean,
    /// A string.
    String,
    /// The `null` value.
    Null,
    /// The `undefined` value.
    Undefined,
    /// An array; enables the indexed fast path for `for-of`.
    Array,
    /// An object with a known (closed) property set.
    Object {
        /// Property names the checker proved present.
        props: Rc<[String]>,
    },
    /// A callable with a known signature.
    Function {
        /// Total declared parameter count (excluding rest).
        arity: u8,
        /// Parameters without defaults; callers must supply at least these.
        required: u8,
    },
}

impl StaticType {
    /// Whether this type is statically known to be an array.
    pub fn is_array(&self) -> bool {
        matches!(self, StaticType::Array)
    }

    /// The known property set, if this is a closed object type.
    pub fn known_props(&self) -> Option<&[String]> {
        match self {
            StaticType::Object { props } => Some(props),
            _ => None,
        }
    }

    /// `(arity, required)` if this is a known callable.
    pub fn callable_signature(&self) -> Option<(u8, u8)> {
        match self {
            StaticType::Function { arity, required } => Some((*arity, *required)),
            _ => None,
        }
    }

    /// Whether this type is statically nullish (`null` or `undefined`).
    pub fn is_nullish(&self) -> bool {
        matches!(self, StaticType::Null | StaticType::Undefined)
    }
}
