//! # VM Debugger Engine
//!
//! An interactive debugger engine for a bytecode virtual machine.
//!
//! The engine sits between a suspended interpreter and a user interface. It
//! maps source lines to code addresses and back, manages breakpoints by
//! patching a trap opcode into the code stream, compiles and runs
//! expressions in the context of any stack level, drives single stepping,
//! and renders runtime values and call stacks as text.
//!
//! ## Architecture
//!
//! - **Debugger**: the context object owning every table and the stepping state
//! - **SourceFileTable**: per-file line to address maps with nearest-line lookup
//! - **MethodHeaderIndex**: sorted method entry points, for address to method lookup
//! - **BreakpointRegistry**: the fixed-size breakpoint array and trap patching
//! - **ExpressionCompiler**: turns debugger expressions into dynamic code units
//! - **ExecutionController**: step modes and the remembered statement
//! - **ValueFormatter**: value rendering with escapes and length limits
//!
//! The VM, its object system and the UI are reached through the traits in
//! [`host`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use vmdbg_debugger::{DebugTable, Debugger};
//!
//! let mut debugger = Debugger::default();
//!
//! // Load the line records of one method
//! let mut table = DebugTable::new(0x20);
//! table.add_line(0, 0, 10, 0).add_line(8, 0, 11, 0);
//! debugger.add_debug_table(0x1000, table);
//! debugger.methods_mut().push(0x1000);
//!
//! debugger
//!     .sources_mut()
//!     .add_entry("main.t", 0, true)
//!     .add_line(10, 0x1000);
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

/// Breakpoint records and trap patching
pub mod breakpoint;
/// Expression compiler for dynamic code units
pub mod compiler;
/// Step modes and execution position tracking
pub mod controller;
/// Per-method statement and scope records
pub mod debug_table;
/// The debugger context and the suspended session
pub mod debugger;
/// Error types and result handling
pub mod error;
/// Value stack for running compiled units
pub mod evaluation_stack;
/// Interpreter for compiled units
pub mod expression_engine;
/// Value rendering
pub mod formatter;
/// Contracts with the VM and the user interface
pub mod host;
/// Instruction decoding
pub mod instruction;
/// Method entry point index
pub mod method_index;
/// Opcode definitions
pub mod op_code;
/// Source file line tables
pub mod source_file;
/// Call stack listings
pub mod stack_trace;
/// Global and local symbol tables
pub mod symbols;
/// Utility for constructing compiled units
pub mod unit_builder;
/// Runtime values
pub mod value;

pub use breakpoint::{Breakpoint, BreakpointInfo, BreakpointRegistry};
pub use compiler::{CompileOptions, CompiledExpression, CompiledUnit, ExpressionCompiler};
pub use controller::{BreakEvent, ExecutionController, StepFlags, StepMode};
pub use debug_table::{DebugLine, DebugTable, LocalKind, StatementBounds};
pub use debugger::{DebugSession, Debugger, Evaluation, StackLevelInfo};
pub use error::{CompileError, DebugError, DebugResult, ErrorCode, RuntimeError};
pub use expression_engine::ExpressionEngine;
pub use formatter::ValueFormatter;
pub use host::{
    CallContext, CodeMemory, DebugUi, NativeCaller, ObjectInspector, ObjectKind, PropEntry, RunContext,
    StackFrame, VmHost,
};
pub use method_index::MethodHeaderIndex;
pub use op_code::OpCode;
pub use source_file::{LineMatch, SourceFileEntry, SourceFileTable};
pub use stack_trace::SourceLocation;
pub use symbols::{LocalScope, SymbolTable};
pub use unit_builder::UnitBuilder;
pub use value::{BifId, CodeAddr, ObjId, PropId, Value};

pub use vmdbg_config::{Charset, DebuggerSettings, EngineLimits};
