//! Expression compiler.
//!
//! Turns the text of a debugger expression into a self-contained unit of
//! byte code that runs against a suspended program. The pipeline is:
//!
//! 1. [`lexer`] splits the text into tokens;
//! 2. [`parser`] builds an [`ast::Expr`], resolving names against the local
//!    scope of a stack level and then against the global symbols;
//! 3. the folder collapses constant subexpressions, and in speculative mode
//!    side effects are rejected;
//! 4. the code generator emits the unit, ending in an implicit return.
//!
//! Units that outgrow the dynamic code page size fail with
//! `expression too large`.

pub mod ast;
mod codegen;
mod fold;
pub mod lexer;
mod parser;

use crate::error::CompileError;
use crate::symbols::{LocalScope, SymbolTable};
use crate::value::CodeAddr;
use log::trace;

/// Generated code of a compiled expression, before it is placed in the
/// program's dynamic code area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpression {
    pub code: Vec<u8>,
    /// True if the expression can be assigned to
    pub is_lval: bool,
}

/// A compiled expression placed in dynamic code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledUnit {
    pub addr: CodeAddr,
    pub len: usize,
    pub is_lval: bool,
}

/// Compilation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// `self` and the method context are available
    pub self_valid: bool,
    /// Reject side effects and read properties as data only
    pub speculative: bool,
    /// Largest unit the dynamic code area accepts
    pub page_size: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            self_valid: false,
            speculative: false,
            page_size: vmdbg_config::DYNAMIC_CODE_PAGE_SIZE,
        }
    }
}

/// Name resolution context shared by the parser.
pub(crate) struct Resolver<'a> {
    pub(crate) symbols: &'a SymbolTable,
    pub(crate) scope: Option<LocalScope<'a>>,
    pub(crate) self_valid: bool,
}

/// Compiles debugger expressions.
pub struct ExpressionCompiler<'a> {
    resolver: Resolver<'a>,
    options: CompileOptions,
}

impl<'a> ExpressionCompiler<'a> {
    /// Creates a compiler resolving names against `symbols` and, when given,
    /// the locals of `scope`.
    pub fn new(symbols: &'a SymbolTable, scope: Option<LocalScope<'a>>, options: CompileOptions) -> Self {
        Self {
            resolver: Resolver {
                symbols,
                scope,
                self_valid: options.self_valid,
            },
            options,
        }
    }

    /// Compiles `text`.
    pub fn compile(&self, text: &str) -> Result<CompiledExpression, CompileError> {
        let tokens = lexer::tokenize(text)?;
        let expr = parser::Parser::new(tokens, &self.resolver).parse()?;
        let is_lval = expr.is_lval();

        let expr = fold::fold(expr);
        if self.options.speculative {
            fold::check_speculative(&expr)?;
        }

        let code = codegen::CodeGenerator::new(self.options.speculative).generate(&expr)?;
        if code.len() > self.options.page_size {
            return Err(CompileError::new("expression too large"));
        }
        trace!("compiled {:?} into {} bytes", text, code.len());
        Ok(CompiledExpression { code, is_lval })
    }
}

/// Compiles `text` with the given scope and options.
pub fn compile(
    text: &str,
    symbols: &SymbolTable,
    scope: Option<LocalScope<'_>>,
    options: CompileOptions,
) -> Result<CompiledExpression, CompileError> {
    ExpressionCompiler::new(symbols, scope, options).compile(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_table::{DebugTable, LocalKind};
    use crate::instruction::disassemble;
    use crate::value::{ObjId, PropId};

    fn symbols() -> SymbolTable {
        let mut syms = SymbolTable::new();
        syms.add_object("me", ObjId(5));
        syms.add_property("name", PropId(3));
        syms.add_function("main", 0x100);
        syms
    }

    fn opcodes(code: &[u8]) -> Vec<String> {
        disassemble(code)
            .lines()
            .filter_map(|l| l.split_whitespace().nth(1).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_constant_expression_folds() {
        let syms = symbols();
        let unit = compile("2 * (3 + 4)", &syms, None, CompileOptions::default()).unwrap();
        assert_eq!(opcodes(&unit.code), vec!["PUSHINT8", "RETVAL"]);
        assert!(!unit.is_lval);
    }

    #[test]
    fn test_locals_shadow_globals() {
        let syms = symbols();
        let mut table = DebugTable::new(0x40);
        let frame = table.add_frame(0);
        table.add_symbol(frame, "me", LocalKind::Param { var: 1 });
        let scope = LocalScope::new(&table, frame, 2);

        let unit = compile("me", &syms, Some(scope), CompileOptions::default()).unwrap();
        assert_eq!(opcodes(&unit.code), vec!["GETDBARG", "RETVAL"]);
        assert!(unit.is_lval);
    }

    #[test]
    fn test_self_requires_valid_context() {
        let syms = symbols();
        let err = compile("self", &syms, None, CompileOptions::default()).unwrap_err();
        assert_eq!(err.message(), "\"self\" is not valid in this context");

        let opts = CompileOptions {
            self_valid: true,
            ..Default::default()
        };
        let unit = compile("name", &syms, None, opts).unwrap();
        assert_eq!(opcodes(&unit.code), vec!["PUSHSELF", "GETPROP", "RETVAL"]);
        assert!(unit.is_lval);
    }

    #[test]
    fn test_speculative_mode_rejects_calls() {
        let syms = symbols();
        let opts = CompileOptions {
            speculative: true,
            ..Default::default()
        };
        assert!(compile("main()", &syms, None, opts).is_err());
        assert!(compile("me.name", &syms, None, opts).is_ok());
    }

    #[test]
    fn test_undefined_symbol_message() {
        let syms = symbols();
        let err = compile("nosuch + 1", &syms, None, CompileOptions::default()).unwrap_err();
        assert_eq!(err.message(), "undefined symbol \"nosuch\"");
    }

    #[test]
    fn test_unit_larger_than_page_fails() {
        let syms = symbols();
        let opts = CompileOptions {
            page_size: 16,
            ..Default::default()
        };
        let text = format!("'{}'", "x".repeat(64));
        let err = compile(&text, &syms, None, opts).unwrap_err();
        assert_eq!(err.message(), "expression too large");
    }

    #[test]
    fn test_special_forms_compile() {
        let syms = symbols();
        let unit = compile("[#__obj 5, #__prop 3, #__bifptr 1 2]", &syms, None, CompileOptions::default()).unwrap();
        assert_eq!(
            opcodes(&unit.code),
            vec!["PUSHOBJ", "PUSHPROPID", "PUSHBIFPTR", "NEWLIST", "RETVAL"]
        );
    }

    #[test]
    fn test_assignment_to_constant_is_rejected() {
        let syms = symbols();
        assert!(compile("1 = 2", &syms, None, CompileOptions::default()).is_err());
        assert!(compile("me = 2", &syms, None, CompileOptions::default()).is_err());
    }
}
