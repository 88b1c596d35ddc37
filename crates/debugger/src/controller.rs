//! Execution controller state.
//!
//! Holds the stepping mode and the memory of the last stop that the
//! stepping algorithm consults: the bounds of the statement execution was
//! last reported in, the call depth at that point, and the transient state
//! used to run one instruction past a breakpoint trap.

use crate::debug_table::{DebugLine, DebugTable, StatementBounds};
use crate::value::CodeAddr;
use bitflags::bitflags;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

bitflags! {
    /// Stepping mode bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct StepFlags: u8 {
        /// Stop at the next statement
        const SINGLE_STEP = 0b0000_0001;
        /// Stop in nested calls too
        const STEP_IN = 0b0000_0010;
        /// Stop once the current frame has returned
        const STEP_OUT = 0b0000_0100;
    }
}

/// The user-visible stepping modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Go,
    StepIn,
    StepOver,
    StepOut,
}

impl StepFlags {
    /// Classifies the flags as a stepping mode.
    pub fn mode(&self) -> StepMode {
        if !self.contains(StepFlags::SINGLE_STEP) {
            StepMode::Go
        } else if self.contains(StepFlags::STEP_IN) {
            StepMode::StepIn
        } else if self.contains(StepFlags::STEP_OUT) {
            StepMode::StepOut
        } else {
            StepMode::StepOver
        }
    }
}

/// An asynchronous break request.
///
/// Cloning shares the event, so a signal handler or UI thread can hold one
/// end while the interpreter waits on the other.
#[derive(Debug, Clone, Default)]
pub struct BreakEvent {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl BreakEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event and wakes every waiter.
    pub fn signal(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock() = true;
        cv.notify_all();
    }

    pub fn reset(&self) {
        *self.inner.0.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Waits until the event is set or `timeout` passes. Returns true if the
    /// event was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let mut set = flag.lock();
        if !*set {
            cv.wait_for(&mut set, timeout);
        }
        *set
    }
}

/// The mode saved while a compiled unit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct SavedMode {
    flags: StepFlags,
    in_debugger: bool,
}

/// Stepping state.
#[derive(Debug)]
pub struct ExecutionController {
    flags: StepFlags,

    /// Breakpoint being stepped over, with the flags to restore afterwards
    step_over_bp: Option<(usize, StepFlags)>,

    /// Frame depth the current step is relative to
    step_frame_depth: usize,

    /// Bounds of the statement of the last stop, as absolute addresses
    stm_start: CodeAddr,
    stm_end: CodeAddr,

    /// Method and line of the last stop
    cur_entry: CodeAddr,
    cur_table: Option<Arc<DebugTable>>,
    cur_line: Option<DebugLine>,
    cur_frame_depth: usize,

    in_debugger: bool,
    break_event: BreakEvent,
}

impl Default for ExecutionController {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionController {
    /// Creates a controller in step-in mode, so the first executable
    /// statement stops.
    pub fn new() -> Self {
        Self {
            flags: StepFlags::SINGLE_STEP | StepFlags::STEP_IN,
            step_over_bp: None,
            step_frame_depth: 0,
            stm_start: 0,
            stm_end: 0,
            cur_entry: 0,
            cur_table: None,
            cur_line: None,
            cur_frame_depth: 0,
            in_debugger: false,
            break_event: BreakEvent::new(),
        }
    }

    pub fn flags(&self) -> StepFlags {
        self.flags
    }

    pub fn mode(&self) -> StepMode {
        self.flags.mode()
    }

    pub fn is_single_step_mode(&self) -> bool {
        self.flags.contains(StepFlags::SINGLE_STEP)
    }

    pub fn is_in_debugger(&self) -> bool {
        self.in_debugger
    }

    pub(crate) fn set_in_debugger(&mut self, on: bool) {
        self.in_debugger = on;
    }

    pub fn break_event(&self) -> &BreakEvent {
        &self.break_event
    }

    pub fn step_frame_depth(&self) -> usize {
        self.step_frame_depth
    }

    /// Stops at the next statement anywhere.
    pub fn set_step_in(&mut self) {
        self.flags = StepFlags::SINGLE_STEP | StepFlags::STEP_IN;
        self.break_event.reset();
    }

    /// Breaks into the debugger from inside an intrinsic: stops as soon as
    /// byte code runs again, even on the line of the last stop.
    pub fn set_debug_trace(&mut self) {
        self.set_step_in();
        self.clear_statement();
    }

    /// Stops at the next statement at `frame_depth` or shallower.
    pub fn set_step_over(&mut self, frame_depth: usize) {
        self.flags = StepFlags::SINGLE_STEP;
        self.step_frame_depth = frame_depth;
        self.break_event.reset();
    }

    /// Stops at the next statement after the frame at `frame_depth` returns.
    pub fn set_step_out(&mut self, frame_depth: usize) {
        self.flags = StepFlags::SINGLE_STEP | StepFlags::STEP_OUT;
        self.step_frame_depth = frame_depth.saturating_sub(1);
        self.break_event.reset();
    }

    /// Runs until a breakpoint.
    pub fn set_go(&mut self) {
        self.flags = StepFlags::empty();
        self.break_event.reset();
    }

    /// Handles an asynchronous break request: the next instruction stops,
    /// even inside the statement of the last stop.
    pub fn set_break_stop(&mut self) {
        self.set_step_in();
        self.break_event.signal();
        self.clear_statement();
    }

    /// Corrects step-over and step-out after a return to native code. If
    /// the frame depth dropped below the step's target, stepping continues
    /// at the next instruction wherever it is.
    pub fn step_return(&mut self, frame_depth: usize) {
        // while stepping past a trap the user's mode is the saved one
        let flags = self.step_over_bp.map_or(self.flags, |(_, orig)| orig);
        let stepping_over = flags.contains(StepFlags::SINGLE_STEP) && !flags.contains(StepFlags::STEP_IN);
        if stepping_over && frame_depth < self.step_frame_depth {
            match &mut self.step_over_bp {
                Some((_, orig)) => orig.insert(StepFlags::STEP_IN),
                None => self.flags.insert(StepFlags::STEP_IN),
            }
            self.break_event.reset();
        }
    }

    /// Switches to single-stepping one instruction past the trap of
    /// breakpoint `id`, remembering the current flags.
    pub(crate) fn begin_step_over_bp(&mut self, id: usize) {
        self.step_over_bp = Some((id, self.flags));
        self.flags = StepFlags::SINGLE_STEP | StepFlags::STEP_IN;
    }

    /// Ends a step over a trap, restoring the remembered flags. Returns the
    /// id of the breakpoint to re-arm.
    pub(crate) fn end_step_over_bp(&mut self) -> Option<usize> {
        let (id, orig) = self.step_over_bp.take()?;
        self.flags = orig;
        Some(id)
    }

    pub fn is_stepping_over_bp(&self) -> bool {
        self.step_over_bp.is_some()
    }

    /// Forces run mode for a nested evaluation and blocks re-entry.
    pub(crate) fn prepare_for_eval(&mut self) -> SavedMode {
        let saved = SavedMode {
            flags: self.flags,
            in_debugger: self.in_debugger,
        };
        self.flags = StepFlags::empty();
        self.in_debugger = true;
        saved
    }

    pub(crate) fn restore_from_eval(&mut self, saved: SavedMode) {
        self.flags = saved.flags;
        self.in_debugger = saved.in_debugger;
    }

    /// Returns true if `pc` lies in the statement of the last stop at the
    /// same call depth.
    pub fn in_same_statement(&self, pc: CodeAddr, frame_depth: usize) -> bool {
        pc >= self.stm_start && pc < self.stm_end && frame_depth == self.step_frame_depth
    }

    /// Returns true if `line` is the line of the last stop at the same
    /// call depth.
    pub(crate) fn is_same_line(&self, line: &DebugLine, frame_depth: usize) -> bool {
        frame_depth == self.step_frame_depth
            && self.stm_start != 0
            && self
                .cur_line
                .is_some_and(|cur| cur.source_id == line.source_id && cur.line == line.line)
    }

    /// Records the location of a stop: the method, its statement and the
    /// call depth later steps are measured from.
    pub(crate) fn record_stop(
        &mut self,
        entry: CodeAddr,
        table: Arc<DebugTable>,
        stm: StatementBounds,
        frame_depth: usize,
    ) {
        self.cur_entry = entry;
        self.cur_table = Some(table);
        self.cur_line = Some(stm.line);
        self.cur_frame_depth = frame_depth;
        self.step_frame_depth = frame_depth;
        self.stm_start = entry + stm.start;
        self.stm_end = entry + stm.end;
    }

    /// Recomputes the statement bounds for `pc` in the method at `entry`.
    /// Clears them when the address has no statement record.
    pub(crate) fn update_statement(&mut self, entry: CodeAddr, pc: CodeAddr) {
        let bounds = self
            .cur_table
            .as_ref()
            .filter(|_| pc != 0 && pc >= entry)
            .and_then(|table| table.statement_at(pc - entry));
        match bounds {
            Some(stm) => {
                self.stm_start = entry + stm.start;
                self.stm_end = entry + stm.end;
                self.cur_line = Some(stm.line);
                trace!(
                    "statement bounds {:#x}..{:#x} (line {})",
                    self.stm_start,
                    self.stm_end,
                    stm.line.line
                );
            }
            None => self.clear_statement(),
        }
    }

    /// Sets the current method without a stop and recomputes the bounds.
    /// Forgets the method when the address has no statement record.
    pub(crate) fn sync_position(&mut self, entry: CodeAddr, table: Option<Arc<DebugTable>>, pc: CodeAddr) {
        self.cur_entry = entry;
        self.cur_table = table;
        self.update_statement(entry, pc);
        if self.stm_start == 0 {
            self.cur_entry = 0;
            self.cur_table = None;
        }
    }

    pub(crate) fn clear_statement(&mut self) {
        self.stm_start = 0;
        self.stm_end = 0;
    }

    pub fn statement_bounds(&self) -> (CodeAddr, CodeAddr) {
        (self.stm_start, self.stm_end)
    }

    /// Entry point of the method of the last stop.
    pub fn current_entry(&self) -> CodeAddr {
        self.cur_entry
    }

    pub fn current_table(&self) -> Option<&Arc<DebugTable>> {
        self.cur_table.as_ref()
    }

    pub fn current_line(&self) -> Option<DebugLine> {
        self.cur_line
    }

    pub fn current_frame_depth(&self) -> usize {
        self.cur_frame_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_starts_in_step_in() {
        let ctl = ExecutionController::new();
        assert_eq!(ctl.mode(), StepMode::StepIn);
        assert!(ctl.is_single_step_mode());
    }

    #[test]
    fn test_mode_setters() {
        let mut ctl = ExecutionController::new();
        ctl.set_step_over(3);
        assert_eq!(ctl.mode(), StepMode::StepOver);
        assert_eq!(ctl.step_frame_depth(), 3);

        ctl.set_step_out(3);
        assert_eq!(ctl.mode(), StepMode::StepOut);
        assert_eq!(ctl.step_frame_depth(), 2);

        ctl.set_step_out(0);
        assert_eq!(ctl.step_frame_depth(), 0);

        ctl.set_go();
        assert_eq!(ctl.mode(), StepMode::Go);
    }

    #[test]
    fn test_step_return_rearms_step_in() {
        let mut ctl = ExecutionController::new();
        ctl.set_step_over(4);
        ctl.step_return(5);
        assert_eq!(ctl.mode(), StepMode::StepOver);
        ctl.step_return(3);
        assert_eq!(ctl.mode(), StepMode::StepIn);
    }

    #[test]
    fn test_step_return_while_over_breakpoint() {
        let mut ctl = ExecutionController::new();
        ctl.set_step_over(4);
        ctl.begin_step_over_bp(1);
        ctl.step_return(2);
        assert_eq!(ctl.end_step_over_bp(), Some(1));
        assert_eq!(ctl.mode(), StepMode::StepIn);
        assert_eq!(ctl.end_step_over_bp(), None);
    }

    #[test]
    fn test_eval_mode_round_trip() {
        let mut ctl = ExecutionController::new();
        ctl.set_step_over(1);
        let saved = ctl.prepare_for_eval();
        assert_eq!(ctl.mode(), StepMode::Go);
        assert!(ctl.is_in_debugger());
        ctl.restore_from_eval(saved);
        assert_eq!(ctl.mode(), StepMode::StepOver);
        assert!(!ctl.is_in_debugger());
    }

    #[test]
    fn test_statement_memory() {
        let mut table = DebugTable::new(0x20);
        table.add_line(2, 0, 10, 0).add_line(8, 0, 11, 0);
        let mut ctl = ExecutionController::new();
        ctl.sync_position(0x100, Some(table.into_shared()), 0x104);
        assert_eq!(ctl.statement_bounds(), (0x102, 0x108));

        ctl.set_step_over(0);
        assert!(ctl.in_same_statement(0x106, 0));
        assert!(!ctl.in_same_statement(0x108, 0));
        assert!(!ctl.in_same_statement(0x106, 1));

        ctl.update_statement(0x100, 0);
        assert_eq!(ctl.statement_bounds(), (0, 0));
    }

    #[test]
    fn test_break_event_wakes_waiter() {
        let event = BreakEvent::new();
        let remote = event.clone();
        let handle = thread::spawn(move || remote.wait(Duration::from_secs(5)));
        event.signal();
        assert!(handle.join().unwrap());
        event.reset();
        assert!(!event.wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_debug_trace_forgets_statement() {
        let mut table = DebugTable::new(0x20);
        table.add_line(2, 0, 10, 0);
        let mut ctl = ExecutionController::new();
        ctl.sync_position(0x100, Some(table.into_shared()), 0x104);
        ctl.set_go();
        ctl.set_debug_trace();
        assert_eq!(ctl.mode(), StepMode::StepIn);
        assert_eq!(ctl.statement_bounds(), (0, 0));
    }

    #[test]
    fn test_break_stop_signals_and_clears_statement() {
        let mut ctl = ExecutionController::new();
        ctl.set_go();
        ctl.set_break_stop();
        assert_eq!(ctl.mode(), StepMode::StepIn);
        assert!(ctl.break_event().is_signaled());
        assert_eq!(ctl.statement_bounds(), (0, 0));
    }
}
