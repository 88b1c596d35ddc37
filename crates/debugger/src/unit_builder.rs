//! Unit builder module.
//!
//! This module provides a way to programmatically construct compiled
//! expression units.

use crate::op_code::{ContextElement, OpCode};
use crate::value::{BifId, CodeAddr, ObjId, PropId};

/// A forward branch whose offset is filled in later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct JumpLabel {
    /// Position of the i16 operand
    operand: usize,
}

/// Helps construct expression units programmatically.
#[derive(Debug, Default, Clone)]
pub struct UnitBuilder {
    /// The code being built
    code: Vec<u8>,
}

impl UnitBuilder {
    /// Creates a new unit builder.
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Emits a single byte.
    pub fn emit(&mut self, byte: u8) -> &mut Self {
        self.code.push(byte);
        self
    }

    /// Emits an opcode.
    pub fn emit_opcode(&mut self, op: OpCode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn emit_u16(&mut self, value: u16) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn emit_u32(&mut self, value: u32) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Emits a push of an integer constant using the shortest encoding.
    pub fn emit_push_int(&mut self, value: i32) -> &mut Self {
        match value {
            0 => self.emit_opcode(OpCode::PUSH_0),
            1 => self.emit_opcode(OpCode::PUSH_1),
            v if i8::try_from(v).is_ok() => self.emit_opcode(OpCode::PUSHINT8).emit(v as i8 as u8),
            v => self.emit_opcode(OpCode::PUSHINT).emit_u32(v as u32),
        }
    }

    /// Emits a push of an inline string constant.
    ///
    /// Strings longer than the 16-bit length prefix allows are cut at the
    /// last character boundary that fits.
    pub fn emit_push_string(&mut self, value: &str) -> &mut Self {
        let mut len = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(len) {
            len -= 1;
        }
        self.emit_opcode(OpCode::PUSHSTRI).emit_u16(len as u16);
        self.code.extend_from_slice(&value.as_bytes()[..len]);
        self
    }

    pub fn emit_push_obj(&mut self, obj: ObjId) -> &mut Self {
        self.emit_opcode(OpCode::PUSHOBJ).emit_u32(obj.0)
    }

    pub fn emit_push_prop(&mut self, prop: PropId) -> &mut Self {
        self.emit_opcode(OpCode::PUSHPROPID).emit_u16(prop.0)
    }

    pub fn emit_push_enum(&mut self, value: u32) -> &mut Self {
        self.emit_opcode(OpCode::PUSHENUM).emit_u32(value)
    }

    pub fn emit_push_func(&mut self, addr: CodeAddr) -> &mut Self {
        self.emit_opcode(OpCode::PUSHFNPTR).emit_u32(addr)
    }

    pub fn emit_push_bif(&mut self, bif: BifId) -> &mut Self {
        self.emit_opcode(OpCode::PUSHBIFPTR)
            .emit_u16(bif.index)
            .emit_u16(bif.set)
    }

    pub fn emit_push_context(&mut self, element: ContextElement) -> &mut Self {
        self.emit_opcode(OpCode::PUSHCTXELE).emit(element as u8)
    }

    /// Emits a frame variable access: `op level, index`.
    pub fn emit_frame_var(&mut self, op: OpCode, level: u16, index: u16) -> &mut Self {
        self.emit_opcode(op).emit_u16(level).emit_u16(index)
    }

    /// Emits a context-local access: `op level, var, array_index`.
    pub fn emit_context_var(&mut self, op: OpCode, level: u16, var: u16, arr_idx: u16) -> &mut Self {
        self.emit_opcode(op)
            .emit_u16(level)
            .emit_u16(var)
            .emit_u16(arr_idx)
    }

    /// Emits a property instruction (`GETPROP`, `GETPROPDATA`, `SETPROP`).
    pub fn emit_prop_op(&mut self, op: OpCode, prop: PropId) -> &mut Self {
        self.emit_opcode(op).emit_u16(prop.0)
    }

    pub fn emit_call(&mut self, func: CodeAddr, argc: u8) -> &mut Self {
        self.emit_opcode(OpCode::CALL).emit(argc).emit_u32(func)
    }

    pub fn emit_call_prop(&mut self, prop: PropId, argc: u8) -> &mut Self {
        self.emit_opcode(OpCode::CALLPROP).emit(argc).emit_u16(prop.0)
    }

    pub fn emit_call_bif(&mut self, bif: BifId, argc: u8) -> &mut Self {
        self.emit_opcode(OpCode::BUILTIN2)
            .emit(argc)
            .emit_u16(bif.index)
            .emit_u16(bif.set)
    }

    /// Emits a forward branch and returns the label to patch.
    pub fn emit_jump(&mut self, op: OpCode) -> JumpLabel {
        self.emit_opcode(op);
        let operand = self.code.len();
        self.emit_u16(0);
        JumpLabel { operand }
    }

    /// Points a forward branch at the current position.
    ///
    /// Returns false if the distance does not fit the 16-bit offset.
    pub fn patch_jump(&mut self, label: JumpLabel) -> bool {
        let distance = self.code.len() - (label.operand + 2);
        match i16::try_from(distance) {
            Ok(offset) => {
                self.code[label.operand..label.operand + 2].copy_from_slice(&offset.to_le_bytes());
                true
            }
            Err(_) => false,
        }
    }

    /// Current length of the code.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Gets the code built so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Consumes the builder and returns the code.
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}
