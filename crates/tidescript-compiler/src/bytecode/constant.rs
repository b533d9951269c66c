//! Per-chunk constant pool.
//!
//! Constants are referenced by 16-bit index. Scalar constants deduplicate
//! on insert; function constants have identity semantics and always append.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tidescript_core::LimitError;

use super::FunctionProto;

/// Values stored in the constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    /// A number (f64).
    Number(f64),
    /// A bigint, stored as its decimal digits; the VM materializes it.
    BigInt(String),
    /// A string.
    Str(String),
    /// A regex literal; pattern validity is checked at materialization.
    Regex { pattern: String, flags: String },
    /// A compiled function prototype (an inner chunk).
    Function(Rc<FunctionProto>),
    /// The `null` value.
    Null,
    /// The `undefined` value.
    Undefined,
    /// The TDZ marker written into `let`/`const` storage at scope entry.
    Uninitialized,
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::BigInt(a), Constant::BigInt(b)) => a == b,
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (
                Constant::Regex {
                    pattern: p1,
                    flags: f1,
                },
                Constant::Regex {
                    pattern: p2,
                    flags: f2,
                },
            ) => p1 == p2 && f1 == f2,
            // Function constants compare by identity.
            (Constant::Function(a), Constant::Function(b)) => Rc::ptr_eq(a, b),
            (Constant::Null, Constant::Null) => true,
            (Constant::Undefined, Constant::Undefined) => true,
            (Constant::Uninitialized, Constant::Uninitialized) => true,
            _ => false,
        }
    }
}

/// Key for constant deduplication (hashable version of the scalar
/// constants; numbers hash by bit pattern).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Number(u64),
    BigInt(String),
    Str(String),
    Regex(String, String),
    Null,
    Undefined,
    Uninitialized,
}

impl ConstantKey {
    fn of(constant: &Constant) -> Option<ConstantKey> {
        match constant {
            Constant::Number(n) => Some(ConstantKey::Number(n.to_bits())),
            Constant::BigInt(digits) => Some(ConstantKey::BigInt(digits.clone())),
            Constant::Str(s) => Some(ConstantKey::Str(s.clone())),
            Constant::Regex { pattern, flags } => {
                Some(ConstantKey::Regex(pattern.clone(), flags.clone()))
            }
            Constant::Null => Some(ConstantKey::Null),
            Constant::Undefined => Some(ConstantKey::Undefined),
            Constant::Uninitialized => Some(ConstantKey::Uninitialized),
            // Functions never dedupe.
            Constant::Function(_) => None,
        }
    }
}

/// A chunk's constant pool with dedupe-or-append insertion.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<ConstantKey, u16>,
}

impl ConstantPool {
    /// Create a new empty constant pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant, deduplicating scalars, and return its 16-bit index.
    pub fn add(&mut self, constant: Constant) -> Result<u16, LimitError> {
        let key = ConstantKey::of(&constant);
        if let Some(key) = &key
            && let Some(&idx) = self.index.get(key)
        {
            return Ok(idx);
        }

        let idx = u16::try_from(self.constants.len()).map_err(|_| LimitError::TooManyConstants)?;
        self.constants.push(constant);
        if let Some(key) = key {
            self.index.insert(key, idx);
        }
        Ok(idx)
    }

    /// Get a constant by index.
    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// All constants, in index order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Number of constants.
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate the function constants (inner chunks) in index order.
    pub fn functions(&self) -> impl Iterator<Item = &Rc<FunctionProto>> {
        self.constants.iter().filter_map(|c| match c {
            Constant::Function(proto) => Some(proto),
            _ => None,
        })
    }
}
