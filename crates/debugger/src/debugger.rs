//! Debugger for a bytecode virtual machine.
//!
//! [`Debugger`] is the context object tying the engine together. It owns
//! the source line tables, the method index, per-method debug tables, the
//! symbol tables, the breakpoint array and the stepping state. The virtual
//! machine and the user interface are passed in by reference on every call
//! that needs them.
//!
//! The interpreter calls [`Debugger::step`] before each instruction while
//! single-stepping (and whenever it hits a trap or raises an error). When
//! execution should stop, `step` removes every trap from the code, hands a
//! [`DebugSession`] to the UI's command loop, and puts the traps back when
//! the session ends.

use crate::breakpoint::{BreakpointInfo, BreakpointRegistry};
use crate::compiler::{self, CompileOptions, CompiledExpression, CompiledUnit};
use crate::controller::{ExecutionController, StepMode};
use crate::debug_table::{DebugLine, DebugTable};
use crate::error::{CompileError, DebugError, DebugResult, ErrorCode, RuntimeError};
use crate::expression_engine::ExpressionEngine;
use crate::formatter::ValueFormatter;
use crate::host::{CallContext, DebugUi, VmHost};
use crate::method_index::MethodHeaderIndex;
use crate::op_code::OpCode;
use crate::source_file::SourceFileTable;
use crate::stack_trace::{self, SourceLocation, StackLister};
use crate::symbols::{LocalScope, SymbolTable};
use crate::value::{CodeAddr, Value};
use hashbrown::HashMap;
use log::{debug, trace};
use std::sync::Arc;
use vmdbg_config::DebuggerSettings;

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The value the expression produced
    pub value: Value,
    /// The value as the user sees it
    pub text: String,
    /// The expression can be assigned to
    pub is_lval: bool,
    /// The value has children a UI can expand
    pub is_openable: bool,
}

/// The execution position of one stack level.
#[derive(Debug, Clone)]
pub struct StackLevelInfo {
    pub entry: CodeAddr,
    pub table: Arc<DebugTable>,
    pub line: DebugLine,
    pub stm_start: CodeAddr,
    pub stm_end: CodeAddr,
}

/// The debugger context.
pub struct Debugger {
    settings: DebuggerSettings,
    sources: SourceFileTable,
    methods: MethodHeaderIndex,
    tables: HashMap<CodeAddr, Arc<DebugTable>>,
    symbols: SymbolTable,
    breakpoints: BreakpointRegistry,
    controller: ExecutionController,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new(DebuggerSettings::default())
    }
}

impl Debugger {
    /// Creates a debugger with the given settings.
    pub fn new(settings: DebuggerSettings) -> Self {
        Self {
            sources: SourceFileTable::new(settings.max_line_records),
            methods: MethodHeaderIndex::new(),
            tables: HashMap::new(),
            symbols: SymbolTable::new(),
            breakpoints: BreakpointRegistry::new(settings.max_breakpoints),
            controller: ExecutionController::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &DebuggerSettings {
        &self.settings
    }

    pub fn sources(&self) -> &SourceFileTable {
        &self.sources
    }

    /// The source file table, for the image loader.
    pub fn sources_mut(&mut self) -> &mut SourceFileTable {
        &mut self.sources
    }

    pub fn methods(&self) -> &MethodHeaderIndex {
        &self.methods
    }

    /// The method header index, for the image loader.
    pub fn methods_mut(&mut self) -> &mut MethodHeaderIndex {
        &mut self.methods
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The global symbol table, for the image loader.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ExecutionController {
        &mut self.controller
    }

    /// Registers the debug records of the method starting at `entry`.
    pub fn add_debug_table(&mut self, entry: CodeAddr, table: DebugTable) {
        self.tables.insert(entry, table.into_shared());
    }

    /// Gets the debug records of the method starting at `entry`.
    pub fn debug_table(&self, entry: CodeAddr) -> Option<&Arc<DebugTable>> {
        self.tables.get(&entry)
    }

    /// Returns true if the image carried debugging symbols.
    pub fn has_debug_info(&self) -> bool {
        self.symbols.has_symbols()
    }

    /// A formatter using this debugger's symbols and the host's objects.
    pub fn formatter<'a>(&'a self, host: &'a dyn VmHost) -> ValueFormatter<'a> {
        ValueFormatter::new(&self.symbols, host.objects(), self.settings.ui_charset)
    }

    /// An engine hosts can run compiled units with.
    pub fn expression_engine(&self) -> ExpressionEngine {
        ExpressionEngine::new(self.settings.engine.clone())
    }

    /* ------------------------------------------------------------------ */
    /* Breakpoints */

    /// Sets a breakpoint at `addr`, or deletes the one already there.
    ///
    /// Returns the breakpoint id and whether a breakpoint was created. An
    /// address of 0 sets a global breakpoint, which needs a condition to
    /// ever stop.
    pub fn toggle_breakpoint(
        &mut self,
        host: &mut dyn VmHost,
        addr: CodeAddr,
        condition: Option<&str>,
        stop_on_change: bool,
    ) -> DebugResult<(usize, bool)> {
        if let Some(id) = self.breakpoints.find(addr) {
            self.delete_breakpoint(host, id)?;
            return Ok((id, false));
        }

        let id = self.breakpoints.alloc().ok_or(DebugError::BreakpointCapacity)?;
        if let Err(err) = self.set_breakpoint_info(host, id, addr, condition, stop_on_change) {
            self.breakpoints.release(id);
            return Err(err);
        }
        debug!("breakpoint {} set at {:#x}", id, addr);
        Ok((id, true))
    }

    fn set_breakpoint_info(
        &mut self,
        host: &mut dyn VmHost,
        id: usize,
        addr: CodeAddr,
        condition: Option<&str>,
        stop_on_change: bool,
    ) -> DebugResult<()> {
        if let Some(bp) = self.breakpoints.get_mut(id) {
            bp.set_addr(addr);
        }
        if condition.is_some() {
            self.set_breakpoint_condition(host, id, condition, stop_on_change)?;
        }

        let in_debugger = self.controller.is_in_debugger();
        self.breakpoints.save_orig_instr(&*host, id);
        self.breakpoints.set_bp_instr(&mut *host, id, true, false, in_debugger);
        if addr == 0 {
            self.breakpoints.inc_global_count();
        }
        Ok(())
    }

    /// Finds the lexical frame of the statement at `addr`.
    fn scope_at(&self, addr: CodeAddr) -> Option<(Arc<DebugTable>, u16)> {
        let entry = self.methods.find_method_start(addr)?;
        let table = self.tables.get(&entry)?.clone();
        let stm = table.statement_at(addr - entry)?;
        Some((table, stm.line.frame_id))
    }

    /// Sets or clears the condition of breakpoint `id`.
    ///
    /// The condition is compiled in the scope of the breakpoint's statement.
    /// If it doesn't compile the previous condition stays in effect. A
    /// stop-on-change condition is evaluated once right away, so that only
    /// a later change stops.
    pub fn set_breakpoint_condition(
        &mut self,
        host: &mut dyn VmHost,
        id: usize,
        condition: Option<&str>,
        stop_on_change: bool,
    ) -> DebugResult<()> {
        let addr = self
            .breakpoints
            .get_in_use(id)
            .ok_or(DebugError::InvalidBreakpoint)?
            .addr();

        let text = condition.map(str::trim).filter(|t| !t.is_empty());
        let unit = match text {
            Some(text) => {
                let scope = self.scope_at(addr);
                let options = CompileOptions {
                    self_valid: true,
                    speculative: false,
                    page_size: self.settings.dynamic_code_page_size,
                };
                let compiled = compiler::compile(
                    text,
                    &self.symbols,
                    scope.as_ref().map(|(table, frame)| LocalScope::new(table, *frame, 0)),
                    options,
                )
                .map_err(|err| {
                    debug!("condition {:?} for breakpoint {} rejected: {}", text, id, err);
                    err
                })?;
                Some(place_unit(host, &compiled)?)
            }
            None => None,
        };

        let old = self
            .breakpoints
            .get_mut(id)
            .and_then(|bp| bp.replace_condition(text.map(str::to_string), unit, stop_on_change));
        if let Some(old) = old {
            host.free_dynamic_code(old.addr);
        }

        if stop_on_change && unit.is_some() {
            if let Some(bp) = self.breakpoints.get_mut(id) {
                bp.set_prev_value(Value::Empty);
            }
            self.eval_breakpoint_condition(host, id);
        }
        Ok(())
    }

    /// Evaluates the condition of breakpoint `id`.
    ///
    /// A breakpoint without a condition is never satisfied here. A plain
    /// condition is satisfied by any value but `nil` and zero; a
    /// stop-on-change condition when its value differs from the last one.
    /// An error while evaluating counts as satisfied.
    pub fn eval_breakpoint_condition(&mut self, host: &mut dyn VmHost, id: usize) -> bool {
        let Some(bp) = self.breakpoints.get_in_use(id) else {
            return false;
        };
        let Some(unit) = bp.compiled_condition().copied() else {
            return false;
        };
        let stop_on_change = bp.stop_on_change();

        let value = match self.run_unit(host, unit.addr, 0) {
            Ok(value) => value,
            Err(err) => {
                debug!("condition of breakpoint {} failed: {}", id, err);
                return true;
            }
        };

        if !stop_on_change {
            return value.is_truthy();
        }
        let Some(bp) = self.breakpoints.get_mut(id) else {
            return false;
        };
        let changed = match bp.prev_value() {
            Some(prev) => !prev.is_empty() && !host.objects().values_equal(prev, &value),
            None => false,
        };
        bp.set_prev_value(value);
        changed
    }

    /// Enables or disables breakpoint `id`.
    pub fn set_disable(&mut self, host: &mut dyn VmHost, id: usize, disabled: bool) -> DebugResult<()> {
        let bp = self.breakpoints.get_in_use(id).ok_or(DebugError::InvalidBreakpoint)?;
        if bp.is_disabled() == disabled {
            return Ok(());
        }
        let global = bp.is_global();

        if let Some(bp) = self.breakpoints.get_mut(id) {
            bp.set_disabled_flag(disabled);
        }
        let in_debugger = self.controller.is_in_debugger();
        self.breakpoints.set_bp_instr(&mut *host, id, !disabled, false, in_debugger);
        if global {
            if disabled {
                self.breakpoints.dec_global_count();
            } else {
                self.breakpoints.inc_global_count();
            }
        }
        debug!("breakpoint {} {}", id, if disabled { "disabled" } else { "enabled" });
        Ok(())
    }

    /// Flips the enabled state of breakpoint `id`; returns true if it is
    /// now disabled.
    pub fn toggle_disable(&mut self, host: &mut dyn VmHost, id: usize) -> DebugResult<bool> {
        let disabled = !self.is_disabled(id);
        self.set_disable(host, id, disabled)?;
        Ok(disabled)
    }

    pub fn is_disabled(&self, id: usize) -> bool {
        self.breakpoints.get_in_use(id).is_some_and(|bp| bp.is_disabled())
    }

    /// Deletes breakpoint `id`, restoring the original instruction and
    /// releasing its condition.
    pub fn delete_breakpoint(&mut self, host: &mut dyn VmHost, id: usize) -> DebugResult<()> {
        let bp = self.breakpoints.get_in_use(id).ok_or(DebugError::InvalidBreakpoint)?;
        let counted = bp.is_global() && !bp.is_disabled();

        let in_debugger = self.controller.is_in_debugger();
        self.breakpoints.set_bp_instr(&mut *host, id, false, false, in_debugger);
        if counted {
            self.breakpoints.dec_global_count();
        }
        if let Some(unit) = self.breakpoints.get_mut(id).and_then(|bp| bp.take_condition()) {
            host.free_dynamic_code(unit.addr);
        }
        self.breakpoints.release(id);
        debug!("breakpoint {} deleted", id);
        Ok(())
    }

    pub fn breakpoint_info(&self, id: usize) -> Option<BreakpointInfo> {
        self.breakpoints.get_in_use(id).map(|bp| bp.info(id))
    }

    /// Returns true if the interpreter must call [`Debugger::step`] before
    /// every instruction.
    pub fn is_single_step(&self) -> bool {
        self.controller.is_single_step_mode() || self.breakpoints.global_count() != 0
    }

    /// Releases every compiled condition. Call when the program ends.
    pub fn terminate(&mut self, host: &mut dyn VmHost) {
        for unit in self.breakpoints.drain_conditions() {
            host.free_dynamic_code(unit.addr);
        }
        self.breakpoints.reset_global_count();
    }

    /* ------------------------------------------------------------------ */
    /* Expressions */

    /// Compiles `text` in the scope of stack level `level`.
    pub fn compile_expression(
        &self,
        host: &dyn VmHost,
        text: &str,
        level: usize,
        speculative: bool,
    ) -> Result<CompiledExpression, CompileError> {
        let info = self.stack_level_info(host, level);
        let scope = info
            .as_ref()
            .map(|info| LocalScope::new(&info.table, info.line.frame_id, level));
        let options = CompileOptions {
            self_valid: host.self_at_level(level).is_some(),
            speculative,
            page_size: self.settings.dynamic_code_page_size,
        };
        compiler::compile(text, &self.symbols, scope, options)
    }

    /// Compiles `text` at stack level `level` and places it in dynamic code.
    /// The caller owns the unit and frees it with
    /// [`VmHost::free_dynamic_code`].
    pub fn compile_unit(
        &self,
        host: &mut dyn VmHost,
        text: &str,
        level: usize,
        speculative: bool,
    ) -> DebugResult<CompiledUnit> {
        let compiled = self.compile_expression(host, text, level, speculative)?;
        place_unit(host, &compiled)
    }

    /// Evaluates `text` in the context of stack level `level`.
    ///
    /// The interpreter context, the step mode and R0 are the same after the
    /// call as before it, whether or not evaluation succeeded.
    pub fn evaluate(
        &mut self,
        host: &mut dyn VmHost,
        text: &str,
        level: usize,
        speculative: bool,
    ) -> DebugResult<Evaluation> {
        let compiled = self
            .compile_expression(host, text, level, speculative)
            .map_err(|err| {
                debug!("cannot compile {:?}: {}", text, err);
                err
            })?;
        let unit = place_unit(host, &compiled)?;
        let result = self.run_unit(host, unit.addr, level);
        host.free_dynamic_code(unit.addr);

        let value = result.map_err(|err| {
            debug!("evaluation of {:?} failed: {}", text, err);
            DebugError::Runtime(err)
        })?;

        let formatter = self.formatter(host);
        Ok(Evaluation {
            text: formatter.format_value(&value),
            is_openable: formatter.is_openable(&value),
            is_lval: compiled.is_lval,
            value,
        })
    }

    /// Reports the children of an evaluated value. See
    /// [`ValueFormatter::enum_aggregate`].
    pub fn enum_aggregate<F: FnMut(&str, &str)>(&self, host: &dyn VmHost, value: &Value, cb: F) {
        self.formatter(host).enum_aggregate(value, cb);
    }

    /// Runs a unit through the interpreter with the context of stack level
    /// `level`, with stepping off.
    fn run_unit(&mut self, host: &mut dyn VmHost, addr: CodeAddr, level: usize) -> Result<Value, RuntimeError> {
        let ctx = CallContext {
            self_obj: host.self_at_level(level),
            target_prop: host.target_prop_at_level(level),
            orig_target_obj: host.orig_target_obj_at_level(level),
            defining_obj: host.defining_obj_at_level(level),
        };

        let saved_r0 = host.r0();
        let saved_ctx = host.save_context();
        let saved_mode = self.controller.prepare_for_eval();

        let result = host.call_code(addr, &ctx);

        host.restore_context(saved_ctx);
        self.controller.restore_from_eval(saved_mode);
        host.set_r0(saved_r0);
        result
    }

    /* ------------------------------------------------------------------ */
    /* Stack inspection */

    /// Describes the execution position at stack level `level`. Level 0 is
    /// the statement of the last stop; outer levels use their return
    /// address. Native levels have no position.
    pub fn stack_level_info(&self, host: &dyn VmHost, level: usize) -> Option<StackLevelInfo> {
        if level == 0 {
            let (stm_start, stm_end) = self.controller.statement_bounds();
            if stm_start == 0 {
                return None;
            }
            return Some(StackLevelInfo {
                entry: self.controller.current_entry(),
                table: self.controller.current_table()?.clone(),
                line: self.controller.current_line()?,
                stm_start,
                stm_end,
            });
        }

        let frame = host.stack_frame(level)?;
        if frame.is_native() {
            return None;
        }
        let table = self.tables.get(&frame.entry)?.clone();
        let stm = table.statement_at(frame.pc.checked_sub(frame.entry)?)?;
        Some(StackLevelInfo {
            entry: frame.entry,
            line: stm.line,
            stm_start: frame.entry + stm.start,
            stm_end: frame.entry + stm.end,
            table,
        })
    }

    /// Gets the source file and line at stack level `level`.
    pub fn source_info(&self, host: &dyn VmHost, level: usize) -> Option<SourceLocation> {
        let info = self.stack_level_info(host, level)?;
        let file = self.sources.get(info.line.source_id as usize)?;
        Some(SourceLocation {
            file: file.name().to_string(),
            line: info.line.line,
        })
    }

    /// Returns true if `addr` is inside the executable code of the method
    /// of the last stop.
    pub fn is_in_current_method(&self, addr: CodeAddr) -> bool {
        let entry = self.controller.current_entry();
        let Some(table) = self.controller.current_table() else {
            return false;
        };
        addr != 0 && entry != 0 && addr >= entry && addr < entry + table.executable_len()
    }

    /// Calls `cb` with one line per stack level.
    pub fn build_stack_listing<F: FnMut(&str)>(&self, host: &dyn VmHost, cb: F) {
        let lister = StackLister::new(
            host,
            &self.symbols,
            self.formatter(host),
            self.settings.stack_line_buffer_size,
        );
        if self.settings.source_in_stack_listing {
            let mut source = |level| self.source_info(host, level);
            lister.list(Some(&mut source), cb);
        } else {
            lister.list(None, cb);
        }
    }

    /// Calls `cb` with each name visible at stack level `level`.
    pub fn enum_locals<F: FnMut(&str)>(&self, host: &dyn VmHost, level: usize, cb: F) {
        if let Some(info) = self.stack_level_info(host, level) {
            let has_self = host.self_at_level(level).is_some();
            stack_trace::enum_locals(&info.table, info.line.frame_id, has_self, cb);
        }
    }

    /* ------------------------------------------------------------------ */
    /* Execution control */

    pub fn set_step_in(&mut self) {
        self.controller.set_step_in();
    }

    pub fn set_step_over(&mut self, host: &dyn VmHost) {
        self.controller.set_step_over(host.frame_depth());
    }

    pub fn set_step_out(&mut self, host: &dyn VmHost) {
        self.controller.set_step_out(host.frame_depth());
    }

    pub fn set_go(&mut self) {
        self.controller.set_go();
    }

    pub fn set_break_stop(&mut self) {
        self.controller.set_break_stop();
    }

    pub fn set_debug_trace(&mut self) {
        self.controller.set_debug_trace();
    }

    /// Notes a return for step tracking.
    pub fn step_return(&mut self, host: &dyn VmHost) {
        self.controller.step_return(host.frame_depth());
    }

    /// Updates the remembered execution position without stopping.
    pub fn sync_exec_pos(&mut self, pc: CodeAddr, entry: CodeAddr) {
        if self.controller.is_in_debugger() {
            return;
        }
        let table = self.tables.get(&entry).cloned();
        self.controller.sync_position(entry, table, pc);
    }

    /// Single-step entry point.
    ///
    /// `pc` is the next instruction (0 while native code runs) and `entry`
    /// the entry point of its method. `hit_bp` is set when the interpreter
    /// ran into a trap, and `error` when it is about to report an error.
    /// The UI may move `pc`.
    pub fn step(
        &mut self,
        host: &mut dyn VmHost,
        ui: &mut dyn DebugUi,
        pc: &mut CodeAddr,
        entry: CodeAddr,
        hit_bp: bool,
        error: Option<ErrorCode>,
    ) {
        // the instruction under a trap just ran; put the trap back
        if let Some(id) = self.controller.end_step_over_bp() {
            let armed = self.breakpoints.get_in_use(id).is_some_and(|bp| !bp.is_disabled());
            if armed {
                self.breakpoints.set_bp_instr(&mut *host, id, true, true, false);
            }
        }

        if self.controller.is_in_debugger() {
            return;
        }
        self.controller.set_in_debugger(true);

        let released_reserve = error == Some(ErrorCode::STACK_OVERFLOW) && host.release_stack_reserve();
        let saved_r0 = host.r0();
        let frame_depth = host.frame_depth();

        let mut trace_over_bp = false;
        let mut stop_for_step = self.controller.is_single_step_mode() || error.is_some();
        let mut hit = hit_bp;
        let mut bp_number = 0;

        if hit_bp {
            if let Some(id) = self.breakpoints.find(*pc) {
                bp_number = id;
                let has_condition = self.breakpoints.get(id).is_some_and(|bp| bp.has_condition());
                if has_condition && !self.eval_breakpoint_condition(host, id) {
                    hit = false;
                    bp_number = 0;
                    trace_over_bp = true;
                }
            }
        }

        let mut hit_global = false;
        if !hit && *pc != 0 && self.breakpoints.global_count() != 0 {
            for id in self.breakpoints.enabled_globals() {
                if self.eval_breakpoint_condition(host, id) {
                    hit_global = true;
                    bp_number = id;
                    let stop_on_change = self.breakpoints.get(id).is_some_and(|bp| bp.stop_on_change());
                    if !stop_on_change {
                        if let Err(err) = self.set_disable(host, id, true) {
                            debug!("global breakpoint {} stays enabled: {}", id, err);
                        }
                    }
                    break;
                }
            }
        }

        if stop_for_step && self.controller.in_same_statement(*pc, frame_depth) {
            trace!("still in the statement at {:#x}", pc);
            stop_for_step = false;
        }

        let stepping_over = matches!(self.controller.mode(), StepMode::StepOver | StepMode::StepOut);
        if stop_for_step && error.is_none() && stepping_over && frame_depth > self.controller.step_frame_depth() {
            stop_for_step = false;
        }

        let located = if *pc != 0 {
            self.tables.get(&entry).cloned().and_then(|table| {
                let stm = table.statement_at(pc.checked_sub(entry)?)?;
                Some((table, stm))
            })
        } else {
            None
        };

        if stop_for_step
            && error.is_none()
            && located
                .as_ref()
                .is_some_and(|(_, stm)| self.controller.is_same_line(&stm.line, frame_depth))
        {
            trace!("still on the line of the last stop at {:#x}", pc);
            stop_for_step = false;
        }

        // native code can't stop, but the next byte code must look moved
        if *pc == 0 && stop_for_step {
            self.controller.clear_statement();
        }

        if let Some((table, stm)) = located.filter(|_| stop_for_step || hit || hit_global) {
            self.controller.record_stop(entry, table, stm, frame_depth);
            debug!(
                "stopped at {:#x} line {} (breakpoint {}, error {:?})",
                pc, stm.line.line, bp_number, error
            );

            let mut resume = *pc;
            {
                let mut session = DebugSession::open(self, host);
                ui.cmd_loop(&mut session, bp_number, error, &mut resume);
            }
            *pc = resume;
            self.controller.update_statement(entry, resume);
            trace_over_bp = true;
        }

        if released_reserve {
            host.recover_stack_reserve();
        }
        self.controller.set_in_debugger(false);

        // run the real instruction under a trap before arming it again
        if trace_over_bp && *pc != 0 && host.read_code_byte(*pc) == Some(OpCode::BP as u8) {
            if let Some(id) = self.breakpoints.find(*pc) {
                self.breakpoints.set_bp_instr(&mut *host, id, false, true, false);
                self.controller.begin_step_over_bp(id);
            }
        }

        host.set_r0(saved_r0);
    }
}

/// Copies a compiled expression into the program's dynamic code.
fn place_unit(host: &mut dyn VmHost, compiled: &CompiledExpression) -> DebugResult<CompiledUnit> {
    let addr = host
        .alloc_dynamic_code(&compiled.code)
        .ok_or_else(|| CompileError::new("out of dynamic code space"))?;
    Ok(CompiledUnit {
        addr,
        len: compiled.code.len(),
        is_lval: compiled.is_lval,
    })
}

/// The debugger and the suspended machine, as handed to the UI's command
/// loop.
///
/// Breakpoint traps are out of the code while a session is open, so the
/// user sees the original instructions. They go back in when the session
/// is dropped.
pub struct DebugSession<'a> {
    debugger: &'a mut Debugger,
    host: &'a mut dyn VmHost,
}

impl<'a> DebugSession<'a> {
    /// Opens a session, removing every trap from the code.
    pub fn open(debugger: &'a mut Debugger, host: &'a mut dyn VmHost) -> Self {
        debugger.breakpoints.suspend_all(&mut *host);
        Self { debugger, host }
    }

    pub fn debugger(&self) -> &Debugger {
        &*self.debugger
    }

    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut *self.debugger
    }

    pub fn host(&self) -> &dyn VmHost {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut dyn VmHost {
        &mut *self.host
    }

    pub fn evaluate(&mut self, text: &str, level: usize, speculative: bool) -> DebugResult<Evaluation> {
        self.debugger.evaluate(&mut *self.host, text, level, speculative)
    }

    pub fn toggle_breakpoint(
        &mut self,
        addr: CodeAddr,
        condition: Option<&str>,
        stop_on_change: bool,
    ) -> DebugResult<(usize, bool)> {
        self.debugger
            .toggle_breakpoint(&mut *self.host, addr, condition, stop_on_change)
    }

    pub fn set_disable(&mut self, id: usize, disabled: bool) -> DebugResult<()> {
        self.debugger.set_disable(&mut *self.host, id, disabled)
    }

    pub fn delete_breakpoint(&mut self, id: usize) -> DebugResult<()> {
        self.debugger.delete_breakpoint(&mut *self.host, id)
    }

    /// The call stack, one line per level.
    pub fn stack_listing(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.debugger
            .build_stack_listing(&*self.host, |line| lines.push(line.to_string()));
        lines
    }

    /// The names visible at stack level `level`.
    pub fn locals(&self, level: usize) -> Vec<String> {
        let mut names = Vec::new();
        self.debugger
            .enum_locals(&*self.host, level, |name| names.push(name.to_string()));
        names
    }

    pub fn source_info(&self, level: usize) -> Option<SourceLocation> {
        self.debugger.source_info(&*self.host, level)
    }

    pub fn set_step_in(&mut self) {
        self.debugger.set_step_in();
    }

    pub fn set_step_over(&mut self) {
        self.debugger.set_step_over(&*self.host);
    }

    pub fn set_step_out(&mut self) {
        self.debugger.set_step_out(&*self.host);
    }

    pub fn set_go(&mut self) {
        self.debugger.set_go();
    }
}

impl Drop for DebugSession<'_> {
    fn drop(&mut self) {
        self.debugger.breakpoints.restore_all(&mut *self.host);
    }
}
