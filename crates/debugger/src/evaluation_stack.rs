//! Evaluation stack module.
//!
//! This module represents the value stack a compiled expression unit runs on.

use crate::error::{ErrorCode, RuntimeError};
use crate::value::Value;

/// Represents the evaluation stack of a compiled unit.
#[derive(Debug, Clone)]
pub struct EvaluationStack {
    /// The underlying stack storage
    stack: Vec<Value>,

    /// The maximum number of values the stack may hold
    max_size: usize,
}

fn underflow() -> RuntimeError {
    RuntimeError::vm(ErrorCode::INVALID_OPCODE, "evaluation stack underflow")
}

impl EvaluationStack {
    /// Creates a new evaluation stack holding at most `max_size` values.
    pub fn new(max_size: usize) -> Self {
        Self {
            stack: Vec::new(),
            max_size,
        }
    }

    /// Pushes a value onto the stack.
    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.max_size {
            return Err(RuntimeError::vm(ErrorCode::STACK_OVERFLOW, "stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops a value from the stack.
    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(underflow)
    }

    /// Pops `n` values and returns them in the order they were pushed.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        if n > self.stack.len() {
            return Err(underflow());
        }
        let start = self.stack.len() - n;
        Ok(self.stack.split_off(start))
    }

    /// Pops `n` values and returns them in pop order (top first).
    pub fn pop_args(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let mut values = self.pop_n(n)?;
        values.reverse();
        Ok(values)
    }

    /// Returns the value `n` entries below the top without removing it.
    pub fn peek(&self, n: usize) -> Result<&Value, RuntimeError> {
        if n >= self.stack.len() {
            return Err(underflow());
        }
        Ok(&self.stack[self.stack.len() - 1 - n])
    }

    /// Swaps the two top values.
    pub fn swap_top(&mut self) -> Result<(), RuntimeError> {
        let len = self.stack.len();
        if len < 2 {
            return Err(underflow());
        }
        self.stack.swap(len - 1, len - 2);
        Ok(())
    }

    /// Returns the number of values on the stack.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Clears the stack.
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = EvaluationStack::new(8);
        stack.push(Value::Int(1)).unwrap();
        stack.push(Value::Int(2)).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek(0).unwrap(), &Value::Int(2));
        assert_eq!(stack.peek(1).unwrap(), &Value::Int(1));
        assert_eq!(stack.pop().unwrap(), Value::Int(2));
        assert_eq!(stack.pop().unwrap(), Value::Int(1));
        assert!(stack.pop().is_err());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow() {
        let mut stack = EvaluationStack::new(1);
        stack.push(Value::Nil).unwrap();
        let err = stack.push(Value::Nil).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::STACK_OVERFLOW));
    }

    #[test]
    fn test_pop_orders() {
        let mut stack = EvaluationStack::new(8);
        for i in 1..=3 {
            stack.push(Value::Int(i)).unwrap();
        }
        assert_eq!(stack.pop_args(2).unwrap(), vec![Value::Int(3), Value::Int(2)]);
        stack.push(Value::Int(9)).unwrap();
        assert_eq!(stack.pop_n(2).unwrap(), vec![Value::Int(1), Value::Int(9)]);
        assert!(stack.pop_n(1).is_err());
    }

    #[test]
    fn test_swap_top() {
        let mut stack = EvaluationStack::new(4);
        stack.push(Value::Int(1)).unwrap();
        assert!(stack.swap_top().is_err());
        stack.push(Value::True).unwrap();
        stack.swap_top().unwrap();
        assert_eq!(stack.pop().unwrap(), Value::Int(1));
    }
}
