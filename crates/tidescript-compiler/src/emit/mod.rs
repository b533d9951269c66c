//! Control-flow emission support.
//!
//! Jump byte-plumbing (placeholders, patching) lives on
//! [`Chunk`](crate::bytecode::Chunk); this module tracks the *contexts*
//! that decide where a given `break`/`continue`/`return` must land: the
//! breakable stack (loops, switches, labeled blocks) and the finally stack
//! that re-routes non-local exits through open `finally` blocks.

mod jumps;

pub use jumps::{
    ACTION_NORMAL, ACTION_RETHROW, BreakableContext, BreakableKind, ControlFlow, ExitKind,
    FinallyContext, FinallyExit, IterCleanup,
};
