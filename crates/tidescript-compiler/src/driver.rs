//! Compilation driver: configuration, the compiler state machine, and the
//! pipeline orchestration.
//!
//! The pipeline is: type check -> strict-mode determination -> module-import
//! registration -> hoisting -> statement compilation -> final-return emission
//! -> chunk finalization.
//!
//! One [`Compiler`] owns all mutable state: the frame stack (chunk +
//! register allocator + control-flow stacks per function being compiled),
//! the shared scope table, the error list, module bindings, and the global
//! registry. Compiling a nested function pushes a frame; the enclosing
//! frame is quiescent until the inner one pops. A frame's `scope_base`
//! index into the shared table is its scope boundary: lookups landing
//! below it are free variables.

use rustc_hash::FxHashSet;
use tidescript_ast::{Program, SourceKind, Stmt};
use tidescript_core::{CompileError, LimitError, Span};

use crate::bytecode::{
    Chunk, Constant, FunctionFlags, NIL_REGISTER, OpCode, Register,
};
use crate::checker::Checker;
use crate::emit::ControlFlow;
use crate::modules::{ModuleBindings, ModuleLoader};
use crate::regalloc::RegisterAllocator;
use crate::scope::{FreeSymbol, ScopeKind, SymbolTable};

// ============================================================================
// Configuration
// ============================================================================

/// Compiler configuration, threaded from the driver entry (no global
/// mutable state).
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Type-checked mode: always strict, checker errors gate compilation.
    pub typed: bool,
    /// Compile even when the checker reports type errors.
    pub ignore_type_errors: bool,
    /// Eval text inheriting strictness from the calling context.
    pub inherit_strict: bool,
    /// Allow `super` in eval text compiled inside a method.
    pub allow_super_in_eval: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            typed: true,
            ignore_type_errors: false,
            inherit_strict: false,
            allow_super_in_eval: false,
        }
    }
}

// ============================================================================
// Globals
// ============================================================================

/// Stable 16-bit global-index assignment, shared across compiles of one
/// session so module exports keep their slots.
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    names: rustc_hash::FxHashMap<String, u16>,
    ordered: Vec<String>,
}

impl GlobalRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or assign the index for a global name.
    pub fn intern(&mut self, name: &str) -> Result<u16, LimitError> {
        if let Some(&index) = self.names.get(name) {
            return Ok(index);
        }
        let index = u16::try_from(self.ordered.len()).map_err(|_| LimitError::TooManyGlobals)?;
        self.names.insert(name.to_string(), index);
        self.ordered.push(name.to_string());
        Ok(index)
    }

    /// Look up an already-assigned index.
    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.names.get(name).copied()
    }

    /// The name at an index.
    pub fn name(&self, index: u16) -> Option<&str> {
        self.ordered.get(index as usize).map(String::as_str)
    }

    /// Number of assigned globals.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether no globals are assigned.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

// ============================================================================
// Output
// ============================================================================

/// Result of a compilation: the (possibly partial) chunk plus collected
/// errors. The caller decides whether an erroneous chunk is worth running.
#[derive(Debug)]
pub struct CompileOutput {
    /// The compiled chunk.
    pub chunk: Chunk,
    /// Collected compile errors, in source order of detection.
    pub errors: Vec<CompileError>,
}

impl CompileOutput {
    /// Whether compilation produced no errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Per-function compilation state. The innermost frame is the one being
/// emitted into.
#[derive(Debug)]
pub(crate) struct FuncFrame {
    /// The chunk under construction.
    pub chunk: Chunk,
    /// Register and spill allocation.
    pub regs: RegisterAllocator,
    /// Breakable and finally context stacks.
    pub flow: ControlFlow,
    /// Index into the shared scope table where this function's scopes
    /// begin; lookups below this boundary are free variables.
    pub scope_base: usize,
    /// The function-level scope `var` declarations hoist into.
    pub function_scope: usize,
    /// Free variables discovered while compiling this function's body.
    pub free_symbols: Vec<FreeSymbol>,
    /// Flags accumulated for the function prototype.
    pub flags: FunctionFlags,
    /// Function name (for the prototype and diagnostics).
    pub name: String,
    /// Strict mode of this function.
    pub strict: bool,
    /// Completion-value register (script/eval top frame only).
    pub completion: Option<Register>,
    /// Source line for emitted bytes.
    pub current_line: u32,
}

impl FuncFrame {
    pub(crate) fn new(name: String, strict: bool, scope_base: usize) -> Self {
        Self {
            chunk: Chunk::new(),
            regs: RegisterAllocator::new(),
            flow: ControlFlow::new(),
            scope_base,
            function_scope: scope_base,
            free_symbols: Vec::new(),
            flags: FunctionFlags::empty(),
            name,
            strict,
            completion: None,
            current_line: 1,
        }
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// The bytecode compiler.
pub struct Compiler<'h> {
    pub(crate) config: CompilerConfig,
    pub(crate) checker: Checker,
    pub(crate) loader: Option<&'h dyn ModuleLoader>,
    pub(crate) globals: GlobalRegistry,
    pub(crate) bindings: ModuleBindings,
    pub(crate) processed_modules: FxHashSet<String>,
    pub(crate) frames: Vec<FuncFrame>,
    pub(crate) table: SymbolTable,
    pub(crate) errors: Vec<CompileError>,
}

impl<'h> Compiler<'h> {
    /// Create a compiler with the given configuration.
    pub fn new(config: CompilerConfig) -> Self {
        let mut checker = Checker::new();
        checker.set_allow_super_in_eval(config.allow_super_in_eval);
        Self {
            config,
            checker,
            loader: None,
            globals: GlobalRegistry::new(),
            bindings: ModuleBindings::default(),
            processed_modules: FxHashSet::default(),
            frames: Vec::new(),
            table: SymbolTable::new(),
            errors: Vec::new(),
        }
    }

    /// Attach a module loader (required for module-mode re-export
    /// expansion and namespace validation).
    pub fn with_loader(mut self, loader: &'h dyn ModuleLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Seed the global registry (e.g. host-defined globals), returning the
    /// compiler for chaining.
    pub fn with_globals(mut self, globals: GlobalRegistry) -> Self {
        self.globals = globals;
        self
    }

    /// The global registry, for inspection or carrying into the next
    /// compile of the session.
    pub fn globals(&self) -> &GlobalRegistry {
        &self.globals
    }

    /// Compile a program into a chunk.
    ///
    /// User errors accumulate in the returned [`CompileOutput`];
    /// resource-limit errors abort with `Err`.
    pub fn compile_program(&mut self, program: &mut Program) -> Result<CompileOutput, LimitError> {
        // 1. Type check.
        let type_errors = self.checker.check(program);
        if !type_errors.is_empty() && self.config.typed && !self.config.ignore_type_errors {
            return Ok(CompileOutput {
                chunk: Chunk::new(),
                errors: type_errors,
            });
        }
        if !(self.config.typed && !self.config.ignore_type_errors) {
            // Untyped mode still surfaces the diagnostics.
            self.errors.extend(type_errors);
        }

        // 2. Strict-mode determination.
        let strict = self.determine_strict(program);

        // 3. Module bindings.
        if self.checker.is_module_mode() {
            let path = program.path.clone().unwrap_or_else(|| "<module>".into());
            self.bindings = ModuleBindings::new(path);
            let imports: Vec<_> = self.checker.get_import_bindings().to_vec();
            for (local, mut binding) in imports {
                let heap_name = export_global_name(&binding.source, &binding.source_name);
                binding.global_index = self.globals.lookup(&heap_name);
                self.bindings.add_import(local, binding);
            }
        }

        // 4. Root frame and scope.
        let name = match program.kind {
            SourceKind::Module => "<module>",
            SourceKind::Eval => "<eval>",
            SourceKind::Script => "<script>",
        };
        self.frames
            .push(FuncFrame::new(name.into(), strict, self.table.depth()));
        self.table.push(ScopeKind::Function);

        let completion = self.alloc_reg()?;
        self.pin_reg(completion);
        self.frame_mut().completion = Some(completion);
        self.emit_a(OpCode::LoadUndefined, completion);

        // 5. Module prologue: evaluate dependencies once each.
        if self.checker.is_module_mode() {
            self.emit_module_prologue(program.span)?;
        }

        // 6. Hoisting, then 7. statements.
        let body = std::mem::take(&mut program.body);
        if let Some(hoisted) = &program.hoisted_declarations {
            self.validate_hoisted_map(&body, hoisted);
        }
        self.hoist_statements(&body, true)?;
        for stmt in &body {
            self.compile_stmt(stmt)?;
        }
        program.body = body;

        // 8. Final return of the completion value.
        self.set_line(Span::point(self.frame().current_line, 0));
        self.emit_a(OpCode::Return, completion);

        // 9. Finalize.
        let scope = self.table.pop();
        debug_assert_eq!(scope.kind, ScopeKind::Function);
        let frame = self.frames.pop().expect("root frame");
        let mut chunk = frame.chunk;
        if let Some(operand) = chunk.unpatched_jump() {
            panic!("unpatched placeholder jump at operand offset {operand}");
        }
        chunk.max_regs = frame.regs.max_regs().min(255) as u8;
        chunk.spill_slots = frame.regs.spill_count();
        chunk.strict = frame.strict;

        Ok(CompileOutput {
            chunk,
            errors: std::mem::take(&mut self.errors),
        })
    }

    fn determine_strict(&self, program: &Program) -> bool {
        if self.config.typed {
            return true;
        }
        if self.config.inherit_strict {
            return true;
        }
        directive_prologue_has_use_strict(&program.body)
    }

    fn emit_module_prologue(&mut self, span: Span) -> Result<(), LimitError> {
        self.set_line(span);
        let deps: Vec<String> = self
            .bindings
            .dependencies()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for dep in deps {
            self.emit_eval_module(&dep)?;
        }
        Ok(())
    }

    /// Emit `EvalModule` for a path unless it was already emitted in this
    /// compile.
    pub(crate) fn emit_eval_module(&mut self, path: &str) -> Result<(), LimitError> {
        if !self.processed_modules.insert(path.to_string()) {
            return Ok(());
        }
        let path_const = self.str_const(path)?;
        self.emit(OpCode::EvalModule);
        self.emit_u16(path_const);
        Ok(())
    }

    // ========================================================================
    // Frame access
    // ========================================================================

    pub(crate) fn frame(&self) -> &FuncFrame {
        self.frames.last().expect("no active frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut FuncFrame {
        self.frames.last_mut().expect("no active frame")
    }

    pub(crate) fn chunk(&self) -> &Chunk {
        &self.frame().chunk
    }

    pub(crate) fn chunk_mut(&mut self) -> &mut Chunk {
        &mut self.frame_mut().chunk
    }

    /// Whether the innermost frame is the script/module root.
    pub(crate) fn at_root(&self) -> bool {
        self.frames.len() == 1
    }

    /// Whether the current frame is in module mode.
    pub(crate) fn module_mode(&self) -> bool {
        self.checker.is_module_mode()
    }

    /// Strictness of the current frame.
    pub(crate) fn strict(&self) -> bool {
        self.frame().strict
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    /// Update the current line from a source span.
    pub(crate) fn set_line(&mut self, span: Span) {
        if span.line > 0 {
            self.frame_mut().current_line = span.line;
        }
    }

    pub(crate) fn emit(&mut self, op: OpCode) {
        let line = self.frame().current_line;
        self.chunk_mut().write_op(op, line);
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.frame().current_line;
        self.chunk_mut().write_byte(byte, line);
    }

    pub(crate) fn emit_u16(&mut self, value: u16) {
        let line = self.frame().current_line;
        self.chunk_mut().write_u16(value, line);
    }

    /// Opcode with one register operand.
    pub(crate) fn emit_a(&mut self, op: OpCode, a: Register) {
        self.emit(op);
        self.emit_byte(a);
    }

    /// Opcode with two register operands.
    pub(crate) fn emit_ab(&mut self, op: OpCode, a: Register, b: Register) {
        self.emit(op);
        self.emit_byte(a);
        self.emit_byte(b);
    }

    /// Opcode with three register operands.
    pub(crate) fn emit_abc(&mut self, op: OpCode, a: Register, b: Register, c: Register) {
        self.emit(op);
        self.emit_byte(a);
        self.emit_byte(b);
        self.emit_byte(c);
    }

    /// Add a constant to the current chunk.
    pub(crate) fn add_const(&mut self, constant: Constant) -> Result<u16, LimitError> {
        self.chunk_mut().add_constant(constant)
    }

    /// Add a string constant.
    pub(crate) fn str_const(&mut self, value: &str) -> Result<u16, LimitError> {
        self.add_const(Constant::Str(value.to_string()))
    }

    /// Load a constant into a register.
    pub(crate) fn emit_load_const(
        &mut self,
        dst: Register,
        constant: Constant,
    ) -> Result<(), LimitError> {
        let index = self.add_const(constant)?;
        self.emit_a(OpCode::LoadConst, dst);
        self.emit_u16(index);
        Ok(())
    }

    /// Emit a forward placeholder jump; returns the patch handle.
    pub(crate) fn emit_jump(&mut self, op: OpCode, cond: Option<Register>) -> usize {
        let line = self.frame().current_line;
        self.chunk_mut().emit_jump(op, cond, line)
    }

    /// Patch a placeholder to the current offset.
    pub(crate) fn patch_jump(&mut self, operand: usize) -> Result<(), LimitError> {
        self.chunk_mut().patch_jump(operand)
    }

    /// Patch a placeholder to a specific target.
    pub(crate) fn patch_jump_to(&mut self, operand: usize, target: usize) -> Result<(), LimitError> {
        self.chunk_mut().patch_jump_to(operand, target)
    }

    /// Unconditional backward jump.
    pub(crate) fn emit_jump_back(&mut self, target: usize) -> Result<(), LimitError> {
        let line = self.frame().current_line;
        self.chunk_mut().emit_jump_back(target, line)
    }

    // ========================================================================
    // Registers
    // ========================================================================

    pub(crate) fn alloc_reg(&mut self) -> Result<Register, LimitError> {
        self.frame_mut().regs.alloc()
    }

    pub(crate) fn free_reg(&mut self, reg: Register) {
        self.frame_mut().regs.free(reg);
    }

    pub(crate) fn pin_reg(&mut self, reg: Register) {
        self.frame_mut().regs.pin(reg);
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Record a user error and return the bad-register sentinel the parent
    /// can propagate.
    pub(crate) fn error(&mut self, error: CompileError) -> Register {
        self.errors.push(error);
        NIL_REGISTER
    }
}

/// Global-heap name of a module export.
pub(crate) fn export_global_name(module_path: &str, export_name: &str) -> String {
    format!("{module_path}::{export_name}")
}

/// Whether the directive prologue (leading string-literal expression
/// statements) contains `"use strict"`.
fn directive_prologue_has_use_strict(body: &[Stmt]) -> bool {
    for stmt in body {
        match stmt.directive() {
            Some("use strict") => return true,
            Some(_) => continue,
            None => break,
        }
    }
    false
}
