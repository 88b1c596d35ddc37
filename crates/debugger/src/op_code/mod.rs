//! OpCode module for compiled expression units.
//!
//! The debugger only needs a small slice of the VM's instruction set: the
//! breakpoint trap it patches into the code stream, and the instructions the
//! expression compiler emits into dynamic code. Values match the VM's own
//! encoding, so a host interpreter can run compiled units unchanged.

pub mod operand_size;

pub use operand_size::OperandSize;

use std::fmt;

/// Element selector for [`OpCode::PUSHCTXELE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextElement {
    TargetProp = 0x01,
    TargetObj = 0x02,
    DefiningObj = 0x03,
}

impl ContextElement {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::TargetProp),
            0x02 => Some(Self::TargetObj),
            0x03 => Some(Self::DefiningObj),
            _ => None,
        }
    }
}

/// Represents the opcodes of the unit instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum OpCode {
    // Constants
    PUSH_0 = 0x01,
    PUSH_1 = 0x02,
    /// Operand: i8
    PUSHINT8 = 0x03,
    /// Operand: i32
    PUSHINT = 0x04,
    /// Operand: u32 object id
    PUSHOBJ = 0x07,
    PUSHNIL = 0x08,
    PUSHTRUE = 0x09,
    /// Operand: u16 property id
    PUSHPROPID = 0x0A,
    /// Operand: u32 code address
    PUSHFNPTR = 0x0B,
    /// Operand: u16 length, then UTF-8 bytes
    PUSHSTRI = 0x0C,
    /// Operand: u32 enumerator
    PUSHENUM = 0x0F,
    /// Operands: u16 function index, u16 set index
    PUSHBIFPTR = 0x10,

    // Arithmetic and logic
    NEG = 0x20,
    BNOT = 0x21,
    ADD = 0x22,
    SUB = 0x23,
    MUL = 0x24,
    BAND = 0x25,
    BOR = 0x26,
    SHL = 0x27,
    ASHR = 0x28,
    XOR = 0x29,
    DIV = 0x2A,
    MOD = 0x2B,
    NOT = 0x2C,
    BOOLIZE = 0x2D,
    LSHR = 0x30,

    // Comparison
    EQ = 0x40,
    NE = 0x41,
    LT = 0x42,
    LE = 0x43,
    GT = 0x44,
    GE = 0x45,

    RETVAL = 0x50,

    // Calls
    /// Operands: u8 argc, u32 function address
    CALL = 0x58,
    /// Operand: u8 argc; the function pointer is on top of the arguments
    PTRCALL = 0x59,
    /// Operand: u16 property id; the target object is on the stack
    GETPROP = 0x60,
    /// Operands: u8 argc, u16 property id
    CALLPROP = 0x61,
    /// Operand: u16 property id; fails instead of running code
    GETPROPDATA = 0x68,

    // Frame access
    PUSHSELF = 0x84,
    /// Operands: u16 stack level, u16 local index
    GETDBLCL = 0x85,
    /// Operands: u16 stack level, u16 parameter index
    GETDBARG = 0x86,
    DUP = 0x88,
    DISC = 0x89,
    /// Operand: u16 stack level
    GETDBARGC = 0x8C,
    SWAP = 0x8D,
    /// Operand: u8 [`ContextElement`]
    PUSHCTXELE = 0x8E,
    DUP2 = 0x8F,

    // Branches; operand is an i16 offset from the end of the instruction
    JMP = 0x91,
    JT = 0x92,
    JF = 0x93,

    /// Operands: u16 stack level, u16 context variable, u16 array index
    GETDBCTXLCL = 0xA7,
    /// Operands: u16 stack level, u16 context variable, u16 array index
    SETDBCTXLCL = 0xA8,

    /// Operands: u8 argc, u16 function index, u16 set index
    BUILTIN2 = 0xB6,

    INDEX = 0xBA,

    /// Operand: u16 element count
    NEWLIST = 0xC4,

    SETIND = 0xE4,
    /// Operand: u16 property id
    SETPROP = 0xE5,
    /// Operands: u16 stack level, u16 local index
    SETDBLCL = 0xE9,
    /// Operands: u16 stack level, u16 parameter index
    SETDBARG = 0xEA,

    /// The breakpoint trap.
    BP = 0xF1,
    NOP = 0xF2,
}

impl OpCode {
    /// Decodes an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        use OpCode::*;
        let op = match value {
            0x01 => PUSH_0,
            0x02 => PUSH_1,
            0x03 => PUSHINT8,
            0x04 => PUSHINT,
            0x07 => PUSHOBJ,
            0x08 => PUSHNIL,
            0x09 => PUSHTRUE,
            0x0A => PUSHPROPID,
            0x0B => PUSHFNPTR,
            0x0C => PUSHSTRI,
            0x0F => PUSHENUM,
            0x10 => PUSHBIFPTR,
            0x20 => NEG,
            0x21 => BNOT,
            0x22 => ADD,
            0x23 => SUB,
            0x24 => MUL,
            0x25 => BAND,
            0x26 => BOR,
            0x27 => SHL,
            0x28 => ASHR,
            0x29 => XOR,
            0x2A => DIV,
            0x2B => MOD,
            0x2C => NOT,
            0x2D => BOOLIZE,
            0x30 => LSHR,
            0x40 => EQ,
            0x41 => NE,
            0x42 => LT,
            0x43 => LE,
            0x44 => GT,
            0x45 => GE,
            0x50 => RETVAL,
            0x58 => CALL,
            0x59 => PTRCALL,
            0x60 => GETPROP,
            0x61 => CALLPROP,
            0x68 => GETPROPDATA,
            0x84 => PUSHSELF,
            0x85 => GETDBLCL,
            0x86 => GETDBARG,
            0x88 => DUP,
            0x89 => DISC,
            0x8C => GETDBARGC,
            0x8D => SWAP,
            0x8E => PUSHCTXELE,
            0x8F => DUP2,
            0x91 => JMP,
            0x92 => JT,
            0x93 => JF,
            0xA7 => GETDBCTXLCL,
            0xA8 => SETDBCTXLCL,
            0xB6 => BUILTIN2,
            0xBA => INDEX,
            0xC4 => NEWLIST,
            0xE4 => SETIND,
            0xE5 => SETPROP,
            0xE9 => SETDBLCL,
            0xEA => SETDBARG,
            0xF1 => BP,
            0xF2 => NOP,
            _ => return None,
        };
        Some(op)
    }

    /// Gets the operand layout of this opcode.
    pub fn operand_size(&self) -> OperandSize {
        use OpCode::*;
        match self {
            PUSHINT8 | PUSHCTXELE | PTRCALL => OperandSize::fixed(1),
            PUSHPROPID | GETPROP | GETPROPDATA | GETDBARGC | JMP | JT | JF | NEWLIST | SETPROP => {
                OperandSize::fixed(2)
            }
            CALLPROP => OperandSize::fixed(3),
            PUSHINT | PUSHOBJ | PUSHFNPTR | PUSHENUM | PUSHBIFPTR | GETDBLCL | GETDBARG
            | SETDBLCL | SETDBARG => OperandSize::fixed(4),
            CALL | BUILTIN2 => OperandSize::fixed(5),
            GETDBCTXLCL | SETDBCTXLCL => OperandSize::fixed(6),
            PUSHSTRI => OperandSize::prefix(2),
            _ => OperandSize::NONE,
        }
    }

    /// Returns true for the relative branch instructions.
    pub fn is_jump(&self) -> bool {
        matches!(self, OpCode::JMP | OpCode::JT | OpCode::JF)
    }

    /// Returns true if the instruction may run code outside the unit.
    pub fn is_call(&self) -> bool {
        matches!(
            self,
            OpCode::CALL | OpCode::PTRCALL | OpCode::CALLPROP | OpCode::BUILTIN2
        )
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        OpCode::from_u8(value).ok_or(value)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{self:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_decodes_to_itself() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert_eq!(op as u8, byte);
            }
        }
    }

    #[test]
    fn test_trap_is_single_byte() {
        assert_eq!(OpCode::BP as u8, 0xF1);
        assert_eq!(OpCode::BP.operand_size(), OperandSize::NONE);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::CALL.operand_size().size(), 5);
        assert_eq!(OpCode::GETDBCTXLCL.operand_size().size(), 6);
        assert!(OpCode::PUSHSTRI.operand_size().has_size_prefix());
        assert_eq!(OpCode::try_from(0x00), Err(0x00));
    }
}
