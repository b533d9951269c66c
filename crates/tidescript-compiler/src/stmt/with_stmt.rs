//! With statement compilation.
//!
//! The with object joins the runtime with-object stack; lexical name
//! lookup inside the body goes dynamic unless the checker proves the name
//! is not a property of the object.

use tidescript_ast::Stmt;
use tidescript_core::{CompileError, LimitError};

use crate::bytecode::OpCode;
use crate::driver::Compiler;

impl<'h> Compiler<'h> {
    pub(crate) fn compile_with(&mut self, stmt: &Stmt) -> Result<(), LimitError> {
        let Stmt::With { object, body, span } = stmt else {
            unreachable!("compile_with on non-with");
        };

        if self.strict() {
            self.error(CompileError::WithInStrictMode { span: *span });
        }

        let props = object
            .static_type()
            .known_props()
            .map(|props| props.to_vec());

        let object_reg = self.compile_expr(object, None)?;
        self.emit_a(OpCode::PushWith, object_reg);
        self.free_reg(object_reg);

        self.table.push_with(props);
        self.compile_stmt(body)?;
        self.table.pop();
        self.emit(OpCode::PopWith);
        Ok(())
    }
}
