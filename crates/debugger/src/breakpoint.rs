//! Breakpoint records.
//!
//! Breakpoints live in a fixed-capacity array and are identified by their
//! 1-based position in it. A breakpoint with a code address is armed by
//! patching the trap opcode over the first byte of the instruction at that
//! address; a global breakpoint (address 0) has no trap and is evaluated on
//! every instruction instead.

use crate::compiler::CompiledUnit;
use crate::host::CodeMemory;
use crate::op_code::OpCode;
use crate::value::{CodeAddr, Value};
use log::warn;

/// A breakpoint record.
#[derive(Debug, Clone, Default)]
pub struct Breakpoint {
    addr: CodeAddr,
    in_use: bool,
    disabled: bool,
    orig_instr: u8,
    condition: Option<String>,
    compiled: Option<CompiledUnit>,
    stop_on_change: bool,
    /// Last value of a stop-on-change condition; `None` until seeded
    prev_val: Option<Value>,
}

impl Breakpoint {
    /// Code address of the breakpoint, 0 for a global breakpoint.
    pub fn addr(&self) -> CodeAddr {
        self.addr
    }

    pub fn is_global(&self) -> bool {
        self.addr == 0
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Condition source text, if any.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn has_condition(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn compiled_condition(&self) -> Option<&CompiledUnit> {
        self.compiled.as_ref()
    }

    pub fn stop_on_change(&self) -> bool {
        self.stop_on_change
    }

    /// The byte the trap replaced.
    pub fn orig_instr(&self) -> u8 {
        self.orig_instr
    }

    pub(crate) fn prev_value(&self) -> Option<&Value> {
        self.prev_val.as_ref()
    }

    pub(crate) fn set_prev_value(&mut self, value: Value) {
        self.prev_val = Some(value);
    }

    pub(crate) fn set_addr(&mut self, addr: CodeAddr) {
        self.addr = addr;
    }

    pub(crate) fn set_disabled_flag(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Installs a compiled condition and returns the unit it replaced.
    pub(crate) fn replace_condition(
        &mut self,
        text: Option<String>,
        compiled: Option<CompiledUnit>,
        stop_on_change: bool,
    ) -> Option<CompiledUnit> {
        self.condition = text;
        self.stop_on_change = compiled.is_some() && stop_on_change;
        self.prev_val = None;
        std::mem::replace(&mut self.compiled, compiled)
    }

    /// Drops the condition and returns the compiled unit that held it.
    pub(crate) fn take_condition(&mut self) -> Option<CompiledUnit> {
        self.condition = None;
        self.stop_on_change = false;
        self.prev_val = None;
        self.compiled.take()
    }

    /// Returns a serializable description of the breakpoint.
    pub fn info(&self, id: usize) -> BreakpointInfo {
        BreakpointInfo {
            id,
            addr: self.addr,
            disabled: self.disabled,
            condition: self.condition.clone(),
            stop_on_change: self.stop_on_change,
        }
    }
}

/// A snapshot of one breakpoint, as shown to a user interface.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakpointInfo {
    pub id: usize,
    pub addr: CodeAddr,
    pub disabled: bool,
    pub condition: Option<String>,
    pub stop_on_change: bool,
}

/// The breakpoint array.
#[derive(Debug, Clone)]
pub struct BreakpointRegistry {
    records: Vec<Breakpoint>,
    /// Number of in-use, enabled global breakpoints
    global_count: usize,
}

impl BreakpointRegistry {
    /// Creates a registry holding at most `capacity` breakpoints.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: vec![Breakpoint::default(); capacity],
            global_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Claims a free record and returns its id.
    pub fn alloc(&mut self) -> Option<usize> {
        let idx = self.records.iter().position(|bp| !bp.in_use)?;
        self.records[idx] = Breakpoint {
            in_use: true,
            ..Breakpoint::default()
        };
        Some(idx + 1)
    }

    /// Returns a record to the free list. The caller must already have
    /// removed its trap and released its condition.
    pub(crate) fn release(&mut self, id: usize) {
        if let Some(bp) = self.get_mut(id) {
            *bp = Breakpoint::default();
        }
    }

    /// Finds the in-use breakpoint at a code address. Global breakpoints are
    /// never found by address.
    pub fn find(&self, addr: CodeAddr) -> Option<usize> {
        if addr == 0 {
            return None;
        }
        self.records
            .iter()
            .position(|bp| bp.in_use && bp.addr == addr)
            .map(|idx| idx + 1)
    }

    /// Gets a record by 1-based id, whether or not it is in use.
    pub fn get(&self, id: usize) -> Option<&Breakpoint> {
        id.checked_sub(1).and_then(|idx| self.records.get(idx))
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut Breakpoint> {
        id.checked_sub(1).and_then(move |idx| self.records.get_mut(idx))
    }

    /// Gets an in-use record.
    pub fn get_in_use(&self, id: usize) -> Option<&Breakpoint> {
        self.get(id).filter(|bp| bp.in_use)
    }

    /// Iterates the in-use records with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Breakpoint)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, bp)| bp.in_use)
            .map(|(idx, bp)| (idx + 1, bp))
    }

    /// Ids of the in-use, enabled global breakpoints in array order.
    pub fn enabled_globals(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, bp)| bp.is_global() && !bp.disabled)
            .map(|(id, _)| id)
            .collect()
    }

    /// Snapshot of every in-use breakpoint.
    pub fn snapshot(&self) -> Vec<BreakpointInfo> {
        self.iter().map(|(id, bp)| bp.info(id)).collect()
    }

    /// Number of enabled global breakpoints.
    pub fn global_count(&self) -> usize {
        self.global_count
    }

    pub(crate) fn inc_global_count(&mut self) {
        self.global_count += 1;
    }

    pub(crate) fn dec_global_count(&mut self) {
        self.global_count = self.global_count.saturating_sub(1);
    }

    pub(crate) fn reset_global_count(&mut self) {
        self.global_count = 0;
    }

    /// Saves the byte at the breakpoint's address so the trap can later be
    /// removed.
    pub(crate) fn save_orig_instr<M: CodeMemory + ?Sized>(&mut self, code: &M, id: usize) {
        if let Some(bp) = self.get_mut(id) {
            if bp.addr != 0 {
                match code.read_code_byte(bp.addr) {
                    Some(byte) => bp.orig_instr = byte,
                    None => warn!("breakpoint {} at unmapped address {:#x}", id, bp.addr),
                }
            }
        }
    }

    /// Patches or restores the trap for breakpoint `id`.
    ///
    /// While the debugger is active traps stay out of the code; they are
    /// only written then when `always` is set.
    pub fn set_bp_instr<M: CodeMemory + ?Sized>(
        &self,
        code: &mut M,
        id: usize,
        set: bool,
        always: bool,
        in_debugger: bool,
    ) {
        let Some(bp) = self.get(id) else {
            return;
        };
        if bp.addr == 0 || !(always || !in_debugger) {
            return;
        }
        let byte = if set { OpCode::BP as u8 } else { bp.orig_instr };
        if !code.write_code_byte(bp.addr, byte) {
            warn!("cannot patch breakpoint {} at unmapped address {:#x}", id, bp.addr);
        }
    }

    /// Removes every active trap from the code.
    pub fn suspend_all<M: CodeMemory + ?Sized>(&self, code: &mut M) {
        for (id, bp) in self.iter() {
            if !bp.disabled {
                self.set_bp_instr(code, id, false, true, false);
            }
        }
    }

    /// Puts every active trap back into the code.
    pub fn restore_all<M: CodeMemory + ?Sized>(&self, code: &mut M) {
        for (id, bp) in self.iter() {
            if !bp.disabled {
                self.set_bp_instr(code, id, true, true, false);
            }
        }
    }

    /// Drops every condition, returning the compiled units they held.
    pub(crate) fn drain_conditions(&mut self) -> Vec<CompiledUnit> {
        let units = self
            .records
            .iter_mut()
            .filter_map(Breakpoint::take_condition)
            .collect();
        self.global_count = 0;
        units
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new(vmdbg_config::MAX_BREAKPOINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Code(Vec<u8>);

    impl CodeMemory for Code {
        fn read_code_byte(&self, addr: CodeAddr) -> Option<u8> {
            self.0.get(addr as usize).copied()
        }

        fn write_code_byte(&mut self, addr: CodeAddr, byte: u8) -> bool {
            match self.0.get_mut(addr as usize) {
                Some(slot) => {
                    *slot = byte;
                    true
                }
                None => false,
            }
        }
    }

    fn armed(code: &mut Code, reg: &mut BreakpointRegistry, addr: CodeAddr) -> usize {
        let id = reg.alloc().unwrap();
        reg.get_mut(id).unwrap().set_addr(addr);
        reg.save_orig_instr(code, id);
        reg.set_bp_instr(code, id, true, false, false);
        id
    }

    #[test]
    fn test_alloc_until_full() {
        let mut reg = BreakpointRegistry::new(2);
        assert_eq!(reg.alloc(), Some(1));
        assert_eq!(reg.alloc(), Some(2));
        assert_eq!(reg.alloc(), None);
        reg.release(1);
        assert_eq!(reg.alloc(), Some(1));
    }

    #[test]
    fn test_patch_and_restore() {
        let mut code = Code(vec![OpCode::NOP as u8; 16]);
        code.0[4] = OpCode::RETVAL as u8;
        let mut reg = BreakpointRegistry::new(4);
        let id = armed(&mut code, &mut reg, 4);

        assert_eq!(code.0[4], OpCode::BP as u8);
        assert_eq!(reg.get(id).unwrap().orig_instr(), OpCode::RETVAL as u8);
        assert_eq!(reg.find(4), Some(id));
        assert_eq!(reg.find(0), None);

        reg.suspend_all(&mut code);
        assert_eq!(code.0[4], OpCode::RETVAL as u8);
        reg.restore_all(&mut code);
        assert_eq!(code.0[4], OpCode::BP as u8);
    }

    #[test]
    fn test_no_patch_inside_debugger_unless_forced() {
        let mut code = Code(vec![OpCode::NOP as u8; 8]);
        let mut reg = BreakpointRegistry::new(1);
        let id = reg.alloc().unwrap();
        reg.get_mut(id).unwrap().set_addr(2);
        reg.save_orig_instr(&code, id);

        reg.set_bp_instr(&mut code, id, true, false, true);
        assert_eq!(code.0[2], OpCode::NOP as u8);
        reg.set_bp_instr(&mut code, id, true, true, true);
        assert_eq!(code.0[2], OpCode::BP as u8);
    }

    #[test]
    fn test_disabled_traps_are_left_alone() {
        let mut code = Code(vec![OpCode::NOP as u8; 8]);
        let mut reg = BreakpointRegistry::new(2);
        let id = armed(&mut code, &mut reg, 3);
        reg.set_bp_instr(&mut code, id, false, false, false);
        reg.get_mut(id).unwrap().set_disabled_flag(true);

        reg.restore_all(&mut code);
        assert_eq!(code.0[3], OpCode::NOP as u8);
    }

    #[test]
    fn test_global_breakpoints_listed_in_order() {
        let mut reg = BreakpointRegistry::new(3);
        let a = reg.alloc().unwrap();
        let b = reg.alloc().unwrap();
        let c = reg.alloc().unwrap();
        reg.get_mut(b).unwrap().set_addr(0x40);
        reg.get_mut(c).unwrap().set_disabled_flag(true);
        assert_eq!(reg.enabled_globals(), vec![a]);
    }

    #[cfg(feature = "serde-types")]
    #[test]
    fn test_snapshot_serializes() {
        let mut reg = BreakpointRegistry::new(2);
        let id = reg.alloc().unwrap();
        reg.get_mut(id).unwrap().set_addr(0x120);
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].addr, 0x120);

        let json = serde_json::to_string(&snap[0]).unwrap();
        let back: BreakpointInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap[0]);
    }
}
