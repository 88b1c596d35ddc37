//! Value module for the debugger engine.
//!
//! This module provides the runtime value model exchanged with the virtual
//! machine: the values compiled expressions produce, the values held in
//! frames and the values the formatter renders.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde-types")]
use serde::{Deserialize, Serialize};

/// An absolute address in the code pool. Zero is never an executable address.
pub type CodeAddr = u32;

/// Object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(Serialize, Deserialize))]
pub struct ObjId(pub u32);

/// Property identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(Serialize, Deserialize))]
pub struct PropId(pub u16);

/// Built-in function identifier: a function set index and a function index
/// within that set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(Serialize, Deserialize))]
pub struct BifId {
    pub set: u16,
    pub index: u16,
}

impl BifId {
    /// Creates a new built-in function identifier.
    pub fn new(set: u16, index: u16) -> Self {
        Self { set, index }
    }

    /// Packs the identifier into the single key used by reverse lookups.
    pub fn key(&self) -> u32 {
        ((self.set as u32) << 16) | self.index as u32
    }
}

impl fmt::LowerHex for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// The type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Empty = 0x00,
    Nil = 0x01,
    True = 0x02,
    Int = 0x03,
    Obj = 0x04,
    Prop = 0x05,
    Enum = 0x06,
    String = 0x07,
    List = 0x08,
    FuncPtr = 0x09,
    BifPtr = 0x0a,
    CodeOfs = 0x0b,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(Serialize, Deserialize))]
pub enum Value {
    /// The unset sentinel; never produced by a program.
    Empty,

    /// The `nil` constant.
    Nil,

    /// The `true` constant.
    True,

    /// A 32-bit integer.
    Int(i32),

    /// An object reference.
    Obj(ObjId),

    /// A property pointer.
    Prop(PropId),

    /// An enumerator.
    Enum(u32),

    /// A constant string.
    Str(Arc<str>),

    /// A constant list.
    List(Arc<[Value]>),

    /// A pointer to a function entry.
    FuncPtr(CodeAddr),

    /// A pointer to a built-in function.
    BifPtr(BifId),

    /// A method body reference; never shown as a property value.
    CodeOfs(CodeAddr),
}

impl Value {
    /// Creates a boolean value (`true` or `nil`).
    pub fn from_bool(value: bool) -> Self {
        if value {
            Value::True
        } else {
            Value::Nil
        }
    }

    /// Creates a string value.
    pub fn from_str<T: AsRef<str>>(value: T) -> Self {
        Value::Str(Arc::from(value.as_ref()))
    }

    /// Creates a list value.
    pub fn from_list<T: Into<Vec<Value>>>(value: T) -> Self {
        Value::List(Arc::from(value.into()))
    }

    /// Creates an object reference, or `nil` when there is no object.
    pub fn obj_or_nil(obj: Option<ObjId>) -> Self {
        obj.map(Value::Obj).unwrap_or(Value::Nil)
    }

    /// Creates a property pointer, or `nil` when there is no property.
    pub fn prop_or_nil(prop: Option<PropId>) -> Self {
        prop.map(Value::Prop).unwrap_or(Value::Nil)
    }

    /// Returns the type of the value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Empty => ValueType::Empty,
            Value::Nil => ValueType::Nil,
            Value::True => ValueType::True,
            Value::Int(_) => ValueType::Int,
            Value::Obj(_) => ValueType::Obj,
            Value::Prop(_) => ValueType::Prop,
            Value::Enum(_) => ValueType::Enum,
            Value::Str(_) => ValueType::String,
            Value::List(_) => ValueType::List,
            Value::FuncPtr(_) => ValueType::FuncPtr,
            Value::BifPtr(_) => ValueType::BifPtr,
            Value::CodeOfs(_) => ValueType::CodeOfs,
        }
    }

    /// Returns true if the value is the unset sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Returns true if the value is `nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Interprets the value as a condition result: `nil` and zero are false,
    /// anything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Int(i) => *i != 0,
            _ => true,
        }
    }

    /// Gets the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Gets the object id, if this is an object reference.
    pub fn as_obj(&self) -> Option<ObjId> {
        match self {
            Value::Obj(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Gets the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Gets the list elements, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}

impl From<ObjId> for Value {
    fn from(value: ObjId) -> Self {
        Value::Obj(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::from_str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(Value::True.is_truthy());
        assert!(Value::from_str("").is_truthy());
        assert!(Value::Obj(ObjId(5)).is_truthy());
    }

    #[test]
    fn test_bif_key_packs_set_and_index() {
        assert_eq!(BifId::new(2, 7).key(), 0x0002_0007);
    }

    #[test]
    fn test_list_equality_is_structural() {
        let a = Value::from_list(vec![Value::Int(1), Value::from_str("x")]);
        let b = Value::from_list(vec![Value::Int(1), Value::from_str("x")]);
        assert_eq!(a, b);
        assert_eq!(a.value_type(), ValueType::List);
    }
}
