//! Operand size information for unit opcodes.

/// Describes how many operand bytes follow an opcode.
///
/// An opcode either carries a fixed number of operand bytes, or a
/// little-endian length prefix followed by that many payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSize {
    /// The size of the operand, if fixed
    size: usize,

    /// The size of the length prefix, if variable
    size_prefix: usize,
}

impl OperandSize {
    /// An opcode without operands.
    pub const NONE: Self = Self {
        size: 0,
        size_prefix: 0,
    };

    /// Creates a new operand size with a fixed size.
    ///
    /// # Arguments
    ///
    /// * `size` - The number of operand bytes
    ///
    /// # Returns
    ///
    /// A new OperandSize with the specified fixed size
    pub const fn fixed(size: usize) -> Self {
        Self {
            size,
            size_prefix: 0,
        }
    }

    /// Creates a new operand size with a length prefix.
    ///
    /// # Arguments
    ///
    /// * `size_prefix` - The number of bytes in the length prefix
    ///
    /// # Returns
    ///
    /// A new OperandSize whose payload length is read from the code
    pub const fn prefix(size_prefix: usize) -> Self {
        Self {
            size: 0,
            size_prefix,
        }
    }

    /// Gets the fixed size of the operand.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Gets the size of the length prefix.
    pub fn size_prefix(&self) -> usize {
        self.size_prefix
    }

    /// Checks if the operand has a fixed size.
    pub fn has_fixed_size(&self) -> bool {
        self.size > 0
    }

    /// Checks if the operand has a length prefix.
    pub fn has_size_prefix(&self) -> bool {
        self.size_prefix > 0
    }

    /// Computes the full operand length of an instruction.
    ///
    /// # Arguments
    ///
    /// * `operands` - The code bytes following the opcode
    ///
    /// # Returns
    ///
    /// The number of operand bytes, including the length prefix, or `None`
    /// if the code ends before the operand does
    pub fn operand_len(&self, operands: &[u8]) -> Option<usize> {
        if !self.has_size_prefix() {
            return (operands.len() >= self.size).then_some(self.size);
        }

        let prefix = operands.get(..self.size_prefix)?;
        let payload = prefix
            .iter()
            .rev()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        let total = self.size_prefix + payload;
        (operands.len() >= total).then_some(total)
    }
}
