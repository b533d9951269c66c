//! Breakable and finally context stacks.
//!
//! Tracks nested breakable constructs (loops, switches, labeled blocks) for
//! `break`/`continue` targeting, and open `finally` blocks for non-local
//! exit routing.
//!
//! ## Finally routing
//!
//! A `break`, `continue`, or `return` whose target lies outside a
//! `try ... finally` cannot jump straight there: the finally body must run
//! first. Each open finally carries an action register and a value
//! register. The exit site stores an action code, jumps to the finally
//! entry (a placeholder collected in `route_jumps`), and registers an
//! [`FinallyExit`] describing what the finally epilogue must do for that
//! code. The epilogue dispatches on the action register; an exit that still
//! crosses *another* open finally re-enters the same protocol, so nested
//! finallys chain outward naturally.

use crate::bytecode::Register;

/// Action code for normal fall-through into a finally block.
pub const ACTION_NORMAL: u16 = 0;
/// Action code for the exception path: the epilogue rethrows the stashed
/// exception value.
pub const ACTION_RETHROW: u16 = 1;

/// The kind of breakable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakableKind {
    /// A loop: supports break and continue.
    Loop,
    /// A switch: supports break only.
    Switch,
    /// A labeled block: supports labeled break only.
    LabeledBlock,
}

/// Iterator-cleanup info for a `for-of` loop: crossing exits must call the
/// iterator's `return` method before leaving.
#[derive(Debug, Clone, Copy)]
pub struct IterCleanup {
    /// Register holding the iterator object.
    pub iterator: Register,
    /// Register holding the latest `done` flag.
    pub done: Register,
}

/// Context for a breakable construct.
#[derive(Debug)]
pub struct BreakableContext {
    /// What kind of breakable this is.
    pub kind: BreakableKind,
    /// Statement label, if any.
    pub label: Option<String>,
    /// Loop-start pc (loops only).
    pub loop_start: usize,
    /// Pending break placeholder operands, patched past the construct.
    pub break_labels: Vec<usize>,
    /// Pending continue placeholder operands, patched to the continue
    /// target once it is known (e.g. a `for` loop's update expression).
    pub continue_labels: Vec<usize>,
    /// Completion-value register threaded through the loop body.
    pub completion: Option<Register>,
    /// Iterator cleanup to run when an exit crosses this loop.
    pub iter_cleanup: Option<IterCleanup>,
}

/// What a finally epilogue does for one routed action code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Return the value register.
    Return,
    /// Break out of the breakable at stack index `breakable`.
    Break { breakable: usize },
    /// Continue the loop at stack index `breakable`.
    Continue { breakable: usize },
}

/// One routed exit through a finally block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinallyExit {
    /// The action code stored before jumping to the finally entry.
    pub action: u16,
    /// What the epilogue does when it sees `action`.
    pub kind: ExitKind,
}

/// Context for an open `try ... finally`.
#[derive(Debug)]
pub struct FinallyContext {
    /// `breakables.len()` at creation: a breakable with index >= this was
    /// entered inside the try and exits to it need no routing.
    pub breakable_depth: usize,
    /// Register holding the routing action code.
    pub action_reg: Register,
    /// Register holding the in-flight value (return value or exception).
    pub value_reg: Register,
    /// Placeholder jump operands that must be patched to the finally
    /// entry pc.
    pub route_jumps: Vec<usize>,
    /// Registered non-local exits, in action-code order.
    pub exits: Vec<FinallyExit>,
}

impl FinallyContext {
    /// Register (or reuse) an exit, returning its action code.
    pub fn exit_action(&mut self, kind: ExitKind) -> u16 {
        if let Some(exit) = self.exits.iter().find(|e| e.kind == kind) {
            return exit.action;
        }
        let action = ACTION_RETHROW + 1 + self.exits.len() as u16;
        self.exits.push(FinallyExit { action, kind });
        action
    }
}

/// The per-function stacks of breakable and finally contexts.
#[derive(Debug, Default)]
pub struct ControlFlow {
    breakables: Vec<BreakableContext>,
    finallys: Vec<FinallyContext>,
}

impl ControlFlow {
    /// Create empty stacks.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Breakables
    // ========================================================================

    /// Enter a loop; returns its stack index.
    pub fn enter_loop(
        &mut self,
        loop_start: usize,
        label: Option<String>,
        completion: Option<Register>,
    ) -> usize {
        self.breakables.push(BreakableContext {
            kind: BreakableKind::Loop,
            label,
            loop_start,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            completion,
            iter_cleanup: None,
        });
        self.breakables.len() - 1
    }

    /// Enter a switch; returns its stack index.
    pub fn enter_switch(&mut self, label: Option<String>) -> usize {
        self.breakables.push(BreakableContext {
            kind: BreakableKind::Switch,
            label,
            loop_start: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            completion: None,
            iter_cleanup: None,
        });
        self.breakables.len() - 1
    }

    /// Enter a labeled non-loop block; returns its stack index.
    pub fn enter_labeled_block(&mut self, label: String) -> usize {
        self.breakables.push(BreakableContext {
            kind: BreakableKind::LabeledBlock,
            label: Some(label),
            loop_start: 0,
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            completion: None,
            iter_cleanup: None,
        });
        self.breakables.len() - 1
    }

    /// Exit the innermost breakable, returning it for patching.
    pub fn exit_breakable(&mut self) -> BreakableContext {
        self.breakables.pop().expect("breakable stack underflow")
    }

    /// Find the break target: the innermost loop/switch, or the innermost
    /// context with a matching label.
    pub fn break_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self
                .breakables
                .iter()
                .rposition(|ctx| ctx.kind != BreakableKind::LabeledBlock),
            Some(label) => self
                .breakables
                .iter()
                .rposition(|ctx| ctx.label.as_deref() == Some(label)),
        }
    }

    /// Find the continue target: the innermost loop, or the labeled loop.
    pub fn continue_target(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self
                .breakables
                .iter()
                .rposition(|ctx| ctx.kind == BreakableKind::Loop),
            Some(label) => self.breakables.iter().rposition(|ctx| {
                ctx.kind == BreakableKind::Loop && ctx.label.as_deref() == Some(label)
            }),
        }
    }

    /// Access a breakable by index.
    pub fn breakable(&self, index: usize) -> &BreakableContext {
        &self.breakables[index]
    }

    /// Mutable access to a breakable by index.
    pub fn breakable_mut(&mut self, index: usize) -> &mut BreakableContext {
        &mut self.breakables[index]
    }

    /// The breakables from `target` (exclusive) to the innermost, i.e. the
    /// contexts an exit to `target` crosses, innermost first.
    pub fn crossed_cleanups(&self, target: usize) -> Vec<IterCleanup> {
        self.breakables[target..]
            .iter()
            .rev()
            .filter_map(|ctx| ctx.iter_cleanup)
            .collect()
    }

    /// All active iterator cleanups (for `return`), innermost first.
    pub fn all_cleanups(&self) -> Vec<IterCleanup> {
        self.breakables
            .iter()
            .rev()
            .filter_map(|ctx| ctx.iter_cleanup)
            .collect()
    }

    /// Current breakable stack depth.
    pub fn breakable_depth(&self) -> usize {
        self.breakables.len()
    }

    // ========================================================================
    // Finallys
    // ========================================================================

    /// Enter a finally context.
    pub fn enter_finally(&mut self, action_reg: Register, value_reg: Register) {
        self.finallys.push(FinallyContext {
            breakable_depth: self.breakables.len(),
            action_reg,
            value_reg,
            route_jumps: Vec::new(),
            exits: Vec::new(),
        });
    }

    /// Exit the innermost finally context, returning it for epilogue
    /// emission.
    pub fn exit_finally(&mut self) -> FinallyContext {
        self.finallys.pop().expect("finally stack underflow")
    }

    /// The innermost finally an exit to breakable `target` must route
    /// through: one created while `target` was already on the stack.
    pub fn finally_for_breakable(&self, target: usize) -> Option<usize> {
        self.finallys.iter().rposition(|f| f.breakable_depth > target)
    }

    /// The innermost finally (every `return` routes through it).
    pub fn innermost_finally(&self) -> Option<usize> {
        if self.finallys.is_empty() {
            None
        } else {
            Some(self.finallys.len() - 1)
        }
    }

    /// Mutable access to a finally context by index.
    pub fn finally_mut(&mut self, index: usize) -> &mut FinallyContext {
        &mut self.finallys[index]
    }
}
