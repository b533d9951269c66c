//! Block statement compilation.

use tidescript_ast::Stmt;
use tidescript_core::LimitError;

use crate::driver::Compiler;
use crate::scope::ScopeKind;

impl<'h> Compiler<'h> {
    /// Compile a `{ ... }` block: push a scope, hoist the block's own
    /// lexical declarations, compile the statements, pop.
    pub(crate) fn compile_block(&mut self, body: &[Stmt]) -> Result<(), LimitError> {
        self.table.push(ScopeKind::Block);
        self.hoist_statements(body, false)?;
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        self.table.pop();
        Ok(())
    }
}
