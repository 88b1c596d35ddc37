//! Expression engine module.
//!
//! A small interpreter for compiled expression units. The debugger never
//! runs units itself: it hands their address to [`VmHost::call_code`]. A
//! host without a native interpreter for the unit instruction set can
//! implement `call_code` by fetching the unit and delegating here.

use crate::error::{ErrorCode, RuntimeError};
use crate::evaluation_stack::EvaluationStack;
use crate::host::{CallContext, VmHost};
use crate::instruction::{disassemble, Instruction};
use crate::op_code::{ContextElement, OpCode};
use crate::value::{BifId, ObjId, PropId, Value};
use log::{log_enabled, trace, Level};
use std::cmp::Ordering;
use vmdbg_config::EngineLimits;

/// Runs compiled expression units against a host.
#[derive(Debug, Clone, Default)]
pub struct ExpressionEngine {
    /// Restrictions on a single run
    limits: EngineLimits,
}

impl ExpressionEngine {
    /// Creates an engine with the given limits.
    pub fn new(limits: EngineLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// Runs `code` to its return instruction and returns the result.
    pub fn execute(&self, host: &mut dyn VmHost, code: &[u8], ctx: &CallContext) -> Result<Value, RuntimeError> {
        if log_enabled!(Level::Trace) {
            trace!("executing unit:\n{}", disassemble(code));
        }

        let mut stack = EvaluationStack::new(self.limits.max_stack_size);
        let mut pc = 0usize;
        let mut executed = 0usize;

        loop {
            if pc >= code.len() {
                return Err(RuntimeError::vm(
                    ErrorCode::INVALID_OPCODE,
                    "expression unit ended without returning a value",
                ));
            }
            executed += 1;
            if executed > self.limits.max_instructions {
                return Err(RuntimeError::Limit(format!(
                    "expression exceeded the limit of {} instructions",
                    self.limits.max_instructions
                )));
            }

            let instr = Instruction::decode(code, pc)?;
            let mut next = instr.next_position();

            match instr.opcode {
                OpCode::PUSH_0 => stack.push(Value::Int(0))?,
                OpCode::PUSH_1 => stack.push(Value::Int(1))?,
                OpCode::PUSHINT8 => stack.push(Value::Int(instr.i8_at(0) as i32))?,
                OpCode::PUSHINT => stack.push(Value::Int(instr.i32_at(0)))?,
                OpCode::PUSHOBJ => stack.push(Value::Obj(ObjId(instr.u32_at(0))))?,
                OpCode::PUSHNIL => stack.push(Value::Nil)?,
                OpCode::PUSHTRUE => stack.push(Value::True)?,
                OpCode::PUSHPROPID => stack.push(Value::Prop(PropId(instr.u16_at(0))))?,
                OpCode::PUSHFNPTR => stack.push(Value::FuncPtr(instr.u32_at(0)))?,
                OpCode::PUSHSTRI => stack.push(Value::from_str(instr.string_operand()?))?,
                OpCode::PUSHENUM => stack.push(Value::Enum(instr.u32_at(0)))?,
                OpCode::PUSHBIFPTR => stack.push(Value::BifPtr(BifId::new(
                    instr.u16_at(2),
                    instr.u16_at(0),
                )))?,

                OpCode::NEG => {
                    let v = int_operand(stack.pop()?)?;
                    stack.push(Value::Int(v.checked_neg().ok_or_else(RuntimeError::num_overflow)?))?;
                }
                OpCode::BNOT => {
                    let v = int_operand(stack.pop()?)?;
                    stack.push(Value::Int(!v))?;
                }
                OpCode::NOT => {
                    let v = stack.pop()?;
                    stack.push(Value::from_bool(!v.is_truthy()))?;
                }
                OpCode::BOOLIZE => {
                    let v = stack.pop()?;
                    stack.push(Value::from_bool(v.is_truthy()))?;
                }
                OpCode::ADD => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(add(a, b)?)?;
                }
                OpCode::SUB => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    stack.push(sub(host, a, b)?)?;
                }
                OpCode::MUL
                | OpCode::DIV
                | OpCode::MOD
                | OpCode::BAND
                | OpCode::BOR
                | OpCode::XOR
                | OpCode::SHL
                | OpCode::ASHR
                | OpCode::LSHR => {
                    let b = int_operand(stack.pop()?)?;
                    let a = int_operand(stack.pop()?)?;
                    stack.push(Value::Int(integer_op(instr.opcode, a, b)?))?;
                }

                OpCode::EQ | OpCode::NE => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    let eq = host.objects().values_equal(&a, &b);
                    stack.push(Value::from_bool(eq == (instr.opcode == OpCode::EQ)))?;
                }
                OpCode::LT | OpCode::LE | OpCode::GT | OpCode::GE => {
                    let b = stack.pop()?;
                    let a = stack.pop()?;
                    let ord = compare(&a, &b)?;
                    let result = match instr.opcode {
                        OpCode::LT => ord == Ordering::Less,
                        OpCode::LE => ord != Ordering::Greater,
                        OpCode::GT => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    };
                    stack.push(Value::from_bool(result))?;
                }

                OpCode::RETVAL => return stack.pop(),

                OpCode::CALL => {
                    let args = stack.pop_args(instr.u8_at(0) as usize)?;
                    let result = host.call_function(instr.u32_at(1), &args)?;
                    stack.push(result)?;
                }
                OpCode::PTRCALL => {
                    let target = stack.pop()?;
                    let args = stack.pop_args(instr.u8_at(0) as usize)?;
                    let result = match target {
                        Value::FuncPtr(addr) => host.call_function(addr, &args)?,
                        Value::BifPtr(bif) => host.call_builtin(bif, &args)?,
                        _ => {
                            return Err(RuntimeError::vm(
                                ErrorCode::FUNCPTR_VAL_REQD,
                                "function pointer value required",
                            ))
                        }
                    };
                    stack.push(result)?;
                }
                OpCode::BUILTIN2 => {
                    let args = stack.pop_args(instr.u8_at(0) as usize)?;
                    let bif = BifId::new(instr.u16_at(3), instr.u16_at(1));
                    let result = host.call_builtin(bif, &args)?;
                    stack.push(result)?;
                }
                OpCode::GETPROP | OpCode::GETPROPDATA => {
                    let target = stack.pop()?;
                    let data_only = instr.opcode == OpCode::GETPROPDATA;
                    let result = host.get_prop(&target, PropId(instr.u16_at(0)), &[], data_only)?;
                    stack.push(result)?;
                }
                OpCode::CALLPROP => {
                    let target = stack.pop()?;
                    let args = stack.pop_args(instr.u8_at(0) as usize)?;
                    let result = host.get_prop(&target, PropId(instr.u16_at(1)), &args, false)?;
                    stack.push(result)?;
                }
                OpCode::SETPROP => {
                    let obj = stack.pop()?;
                    let value = stack.pop()?;
                    let obj = obj
                        .as_obj()
                        .ok_or_else(|| RuntimeError::vm(ErrorCode::OBJ_VAL_REQD, "object value required"))?;
                    host.set_prop(obj, PropId(instr.u16_at(0)), value)?;
                }

                OpCode::PUSHSELF => stack.push(Value::obj_or_nil(ctx.self_obj))?,
                OpCode::PUSHCTXELE => {
                    let value = match ContextElement::from_u8(instr.u8_at(0)) {
                        Some(ContextElement::TargetProp) => Value::prop_or_nil(ctx.target_prop),
                        Some(ContextElement::TargetObj) => Value::obj_or_nil(ctx.orig_target_obj),
                        Some(ContextElement::DefiningObj) => Value::obj_or_nil(ctx.defining_obj),
                        None => {
                            return Err(RuntimeError::vm(
                                ErrorCode::INVALID_OPCODE,
                                format!("invalid context element {}", instr.u8_at(0)),
                            ))
                        }
                    };
                    stack.push(value)?;
                }
                OpCode::GETDBLCL => {
                    let v = host.local_at_level(instr.u16_at(0) as usize, instr.u16_at(2));
                    stack.push(v.unwrap_or(Value::Nil))?;
                }
                OpCode::GETDBARG => {
                    let v = host.param_at_level(instr.u16_at(0) as usize, instr.u16_at(2));
                    stack.push(v.unwrap_or(Value::Nil))?;
                }
                OpCode::GETDBARGC => {
                    let argc = host.argc_at_level(instr.u16_at(0) as usize);
                    stack.push(Value::Int(i32::try_from(argc).map_err(|_| RuntimeError::num_overflow())?))?;
                }
                OpCode::GETDBCTXLCL => {
                    let v = host.context_local_at_level(instr.u16_at(0) as usize, instr.u16_at(2), instr.u16_at(4));
                    stack.push(v.unwrap_or(Value::Nil))?;
                }
                OpCode::SETDBLCL => {
                    let v = stack.pop()?;
                    host.set_local_at_level(instr.u16_at(0) as usize, instr.u16_at(2), v)?;
                }
                OpCode::SETDBARG => {
                    let v = stack.pop()?;
                    host.set_param_at_level(instr.u16_at(0) as usize, instr.u16_at(2), v)?;
                }
                OpCode::SETDBCTXLCL => {
                    let v = stack.pop()?;
                    host.set_context_local_at_level(instr.u16_at(0) as usize, instr.u16_at(2), instr.u16_at(4), v)?;
                }

                OpCode::DUP => {
                    let v = stack.peek(0)?.clone();
                    stack.push(v)?;
                }
                OpCode::DUP2 => {
                    let a = stack.peek(1)?.clone();
                    let b = stack.peek(0)?.clone();
                    stack.push(a)?;
                    stack.push(b)?;
                }
                OpCode::DISC => {
                    stack.pop()?;
                }
                OpCode::SWAP => stack.swap_top()?,

                OpCode::JMP => next = instr.jump_target(),
                OpCode::JT => {
                    if stack.pop()?.is_truthy() {
                        next = instr.jump_target();
                    }
                }
                OpCode::JF => {
                    if !stack.pop()?.is_truthy() {
                        next = instr.jump_target();
                    }
                }

                OpCode::INDEX => {
                    let index = stack.pop()?;
                    let container = stack.pop()?;
                    let result = match (&container, &index) {
                        (Value::List(items), Value::Int(i)) => list_slot(items.len(), *i)
                            .map(|slot| items[slot].clone())
                            .ok_or_else(RuntimeError::index_out_of_range)?,
                        (Value::List(_), _) => {
                            return Err(RuntimeError::vm(ErrorCode::NUM_VAL_REQD, "integer index required"))
                        }
                        _ => host.index_value(&container, &index)?,
                    };
                    stack.push(result)?;
                }
                OpCode::SETIND => {
                    let index = stack.pop()?;
                    let container = stack.pop()?;
                    let value = stack.pop()?;
                    let result = match (&container, &index) {
                        (Value::List(items), Value::Int(i)) => set_list_element(items, *i, value)?,
                        (Value::List(_), _) => {
                            return Err(RuntimeError::vm(ErrorCode::NUM_VAL_REQD, "integer index required"))
                        }
                        _ => host.set_index_value(&container, &index, value)?,
                    };
                    stack.push(result)?;
                }
                OpCode::NEWLIST => {
                    let items = stack.pop_n(instr.u16_at(0) as usize)?;
                    stack.push(Value::from_list(items))?;
                }

                OpCode::NOP => {}
                OpCode::BP => {
                    return Err(RuntimeError::vm(
                        ErrorCode::BREAKPOINT,
                        "breakpoint instruction in expression unit",
                    ))
                }
            }

            pc = next;
        }
    }
}

fn int_operand(value: Value) -> Result<i32, RuntimeError> {
    value
        .as_int()
        .ok_or_else(|| RuntimeError::vm(ErrorCode::NUM_VAL_REQD, "numeric value required"))
}

fn integer_op(op: OpCode, a: i32, b: i32) -> Result<i32, RuntimeError> {
    let v = match op {
        OpCode::MUL => a.checked_mul(b).ok_or_else(RuntimeError::num_overflow)?,
        OpCode::DIV | OpCode::MOD if b == 0 => return Err(RuntimeError::divide_by_zero()),
        OpCode::DIV => a.checked_div(b).ok_or_else(RuntimeError::num_overflow)?,
        OpCode::MOD => a.checked_rem(b).ok_or_else(RuntimeError::num_overflow)?,
        OpCode::BAND => a & b,
        OpCode::BOR => a | b,
        OpCode::XOR => a ^ b,
        OpCode::SHL => a.wrapping_shl(b as u32),
        OpCode::ASHR => a.wrapping_shr(b as u32),
        _ => (a as u32).wrapping_shr(b as u32) as i32,
    };
    Ok(v)
}

/// Text a value contributes when appended to a string.
fn concat_text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Nil => Some("nil".to_string()),
        Value::True => Some("true".to_string()),
        _ => None,
    }
}

fn add(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_add(*y)
            .map(Value::Int)
            .ok_or_else(RuntimeError::num_overflow),
        (Value::Str(s), _) => match concat_text(&b) {
            Some(tail) => Ok(Value::from_str(format!("{s}{tail}"))),
            None => Err(RuntimeError::vm(ErrorCode::BAD_TYPE_ADD, "invalid type for addition")),
        },
        (Value::List(items), _) => {
            let mut out = items.to_vec();
            match &b {
                Value::List(more) => out.extend(more.iter().cloned()),
                other => out.push(other.clone()),
            }
            Ok(Value::from_list(out))
        }
        _ => Err(RuntimeError::vm(ErrorCode::BAD_TYPE_ADD, "invalid type for addition")),
    }
}

fn sub(host: &dyn VmHost, a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => x
            .checked_sub(*y)
            .map(Value::Int)
            .ok_or_else(RuntimeError::num_overflow),
        (Value::List(items), _) => {
            let removed: Vec<Value> = match &b {
                Value::List(more) => more.to_vec(),
                other => vec![other.clone()],
            };
            let objects = host.objects();
            let out: Vec<Value> = items
                .iter()
                .filter(|item| !removed.iter().any(|r| objects.values_equal(item, r)))
                .cloned()
                .collect();
            Ok(Value::from_list(out))
        }
        _ => Err(RuntimeError::vm(ErrorCode::BAD_TYPE_SUB, "invalid type for subtraction")),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(RuntimeError::vm(ErrorCode::INVALID_COMPARISON, "invalid comparison")),
    }
}

/// Converts a 1-based list index into a slot.
fn list_slot(len: usize, index: i32) -> Option<usize> {
    let slot = usize::try_from(index).ok()?.checked_sub(1)?;
    (slot < len).then_some(slot)
}

/// Stores into a list copy. Storing one past the end extends the list,
/// padding with nil.
fn set_list_element(items: &[Value], index: i32, value: Value) -> Result<Value, RuntimeError> {
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .ok_or_else(RuntimeError::index_out_of_range)?;
    if slot > u16::MAX as usize {
        return Err(RuntimeError::index_out_of_range());
    }
    let mut out = items.to_vec();
    if slot >= out.len() {
        out.resize(slot + 1, Value::Nil);
    }
    out[slot] = value;
    Ok(Value::from_list(out))
}
