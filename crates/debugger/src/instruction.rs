//! Instruction decoding for compiled expression units.

use crate::error::{ErrorCode, RuntimeError};
use crate::op_code::OpCode;
use std::fmt;

/// A decoded instruction borrowing its operand bytes from the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Offset of the opcode within the unit
    pub position: usize,

    pub opcode: OpCode,

    /// The raw operand bytes, including any length prefix
    pub operand: &'a [u8],
}

impl<'a> Instruction<'a> {
    /// Decodes the instruction at `position`.
    pub fn decode(code: &'a [u8], position: usize) -> Result<Self, RuntimeError> {
        let byte = *code
            .get(position)
            .ok_or_else(|| invalid(position, "instruction pointer past end of unit"))?;
        let opcode = OpCode::from_u8(byte)
            .ok_or_else(|| invalid(position, &format!("invalid opcode 0x{byte:02X}")))?;

        let rest = &code[position + 1..];
        let len = opcode
            .operand_size()
            .operand_len(rest)
            .ok_or_else(|| invalid(position, "truncated operand"))?;

        Ok(Self {
            position,
            opcode,
            operand: &rest[..len],
        })
    }

    /// Total encoded size of the instruction.
    pub fn size(&self) -> usize {
        1 + self.operand.len()
    }

    /// Offset of the following instruction.
    pub fn next_position(&self) -> usize {
        self.position + self.size()
    }

    pub fn u8_at(&self, ofs: usize) -> u8 {
        self.operand.get(ofs).copied().unwrap_or(0)
    }

    pub fn i8_at(&self, ofs: usize) -> i8 {
        self.u8_at(ofs) as i8
    }

    pub fn u16_at(&self, ofs: usize) -> u16 {
        u16::from_le_bytes([self.u8_at(ofs), self.u8_at(ofs + 1)])
    }

    pub fn i16_at(&self, ofs: usize) -> i16 {
        self.u16_at(ofs) as i16
    }

    pub fn u32_at(&self, ofs: usize) -> u32 {
        u32::from_le_bytes([
            self.u8_at(ofs),
            self.u8_at(ofs + 1),
            self.u8_at(ofs + 2),
            self.u8_at(ofs + 3),
        ])
    }

    pub fn i32_at(&self, ofs: usize) -> i32 {
        self.u32_at(ofs) as i32
    }

    /// Gets the payload of a length-prefixed string operand.
    pub fn string_operand(&self) -> Result<&'a str, RuntimeError> {
        let payload = self.operand.get(2..).unwrap_or_default();
        std::str::from_utf8(payload).map_err(|_| invalid(self.position, "invalid string constant"))
    }

    /// Resolves the target of a relative branch.
    pub fn jump_target(&self) -> usize {
        let offset = self.i16_at(0) as isize;
        (self.next_position() as isize + offset).max(0) as usize
    }
}

fn invalid(position: usize, reason: &str) -> RuntimeError {
    RuntimeError::vm(
        ErrorCode::INVALID_OPCODE,
        format!("{reason} at unit offset {position}"),
    )
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}  {:<12}", self.position, self.opcode)?;
        match self.opcode {
            OpCode::PUSHINT8 => write!(f, "{}", self.i8_at(0)),
            OpCode::PUSHINT => write!(f, "{}", self.i32_at(0)),
            OpCode::PUSHOBJ | OpCode::PUSHENUM => write!(f, "#{:x}", self.u32_at(0)),
            OpCode::PUSHFNPTR => write!(f, "{:08x}", self.u32_at(0)),
            OpCode::PUSHPROPID | OpCode::GETPROP | OpCode::GETPROPDATA | OpCode::SETPROP => {
                write!(f, "prop#{:x}", self.u16_at(0))
            }
            OpCode::PUSHSTRI => match self.string_operand() {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "<bad string>"),
            },
            OpCode::PUSHBIFPTR => write!(f, "{}.{}", self.u16_at(2), self.u16_at(0)),
            OpCode::CALL => write!(f, "{:08x}, argc={}", self.u32_at(1), self.u8_at(0)),
            OpCode::CALLPROP => write!(f, "prop#{:x}, argc={}", self.u16_at(1), self.u8_at(0)),
            OpCode::PTRCALL => write!(f, "argc={}", self.u8_at(0)),
            OpCode::BUILTIN2 => write!(
                f,
                "{}.{}, argc={}",
                self.u16_at(3),
                self.u16_at(1),
                self.u8_at(0)
            ),
            OpCode::GETDBLCL | OpCode::SETDBLCL | OpCode::GETDBARG | OpCode::SETDBARG => {
                write!(f, "level={}, {}", self.u16_at(0), self.u16_at(2))
            }
            OpCode::GETDBCTXLCL | OpCode::SETDBCTXLCL => write!(
                f,
                "level={}, {}[{}]",
                self.u16_at(0),
                self.u16_at(2),
                self.u16_at(4)
            ),
            OpCode::GETDBARGC => write!(f, "level={}", self.u16_at(0)),
            OpCode::PUSHCTXELE => write!(f, "{}", self.u8_at(0)),
            OpCode::NEWLIST => write!(f, "{}", self.u16_at(0)),
            OpCode::JMP | OpCode::JT | OpCode::JF => write!(f, "{:04X}", self.jump_target()),
            _ => Ok(()),
        }
    }
}

/// Renders a unit as one instruction per line, stopping at the first
/// undecodable byte.
pub fn disassemble(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pos = 0;
    while pos < code.len() {
        match Instruction::decode(code, pos) {
            Ok(instr) => {
                out.push_str(&instr.to_string());
                out.push('\n');
                pos = instr.next_position();
            }
            Err(err) => {
                out.push_str(&format!("{pos:04X}  ?? ({err})\n"));
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fixed_operands() {
        let code = [OpCode::PUSHINT as u8, 0x2A, 0, 0, 0, OpCode::RETVAL as u8];
        let instr = Instruction::decode(&code, 0).unwrap();
        assert_eq!(instr.opcode, OpCode::PUSHINT);
        assert_eq!(instr.i32_at(0), 42);
        assert_eq!(instr.next_position(), 5);

        let ret = Instruction::decode(&code, 5).unwrap();
        assert_eq!(ret.opcode, OpCode::RETVAL);
    }

    #[test]
    fn test_decode_string_operand() {
        let code = [OpCode::PUSHSTRI as u8, 2, 0, b'h', b'i'];
        let instr = Instruction::decode(&code, 0).unwrap();
        assert_eq!(instr.string_operand().unwrap(), "hi");
        assert_eq!(instr.size(), 5);
    }

    #[test]
    fn test_decode_rejects_bad_bytes() {
        assert!(Instruction::decode(&[0x00], 0).is_err());
        assert!(Instruction::decode(&[OpCode::PUSHINT as u8, 1], 0).is_err());
        assert!(Instruction::decode(&[], 0).is_err());
    }

    #[test]
    fn test_jump_target_is_relative_to_next_instruction() {
        // JMP +1 over a NOP
        let code = [OpCode::JMP as u8, 1, 0, OpCode::NOP as u8, OpCode::RETVAL as u8];
        let instr = Instruction::decode(&code, 0).unwrap();
        assert_eq!(instr.jump_target(), 4);
    }

    #[test]
    fn test_disassemble_listing() {
        let code = [OpCode::PUSH_1 as u8, OpCode::RETVAL as u8];
        let text = disassemble(&code);
        assert!(text.contains("PUSH_1"));
        assert!(text.contains("RETVAL"));
    }
}
