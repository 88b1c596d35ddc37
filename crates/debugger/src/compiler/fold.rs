//! Constant folding and speculative-mode checks.

use super::ast::{BinaryOp, Callee, Expr, LogicalOp, UnaryOp};
use crate::error::CompileError;
use crate::value::Value;
use std::sync::Arc;

/// Folds constant subexpressions.
///
/// Only operations that cannot fail are folded; an overflow or a division
/// by zero is left for the run time to report.
pub(crate) fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::List(items) => {
            let items: Vec<Expr> = items.into_iter().map(fold).collect();
            if items.iter().all(|e| e.as_const().is_some()) {
                let values: Vec<Value> = items
                    .into_iter()
                    .filter_map(|e| match e {
                        Expr::Const(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                Expr::Const(Value::List(Arc::from(values)))
            } else {
                Expr::List(items)
            }
        }
        Expr::Unary(op, operand) => {
            let operand = fold(*operand);
            match (op, operand.as_const()) {
                (UnaryOp::Neg, Some(Value::Int(v))) if *v != i32::MIN => Expr::Const(Value::Int(-v)),
                (UnaryOp::BitNot, Some(Value::Int(v))) => Expr::Const(Value::Int(!v)),
                (UnaryOp::Not, Some(Value::Nil)) => Expr::Const(Value::True),
                (UnaryOp::Not, Some(Value::True)) => Expr::Const(Value::Nil),
                (UnaryOp::Not, Some(Value::Int(v))) => Expr::Const(Value::from_bool(*v == 0)),
                _ => Expr::Unary(op, Box::new(operand)),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = fold(*lhs);
            let rhs = fold(*rhs);
            match fold_binary(op, lhs.as_const(), rhs.as_const()) {
                Some(v) => Expr::Const(v),
                None => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
            }
        }
        Expr::Logical(op, lhs, rhs) => {
            let lhs = fold(*lhs);
            let rhs = fold(*rhs);
            let truth = |e: &Expr| e.as_const().and_then(const_truth);
            match (op, truth(&lhs), truth(&rhs)) {
                (LogicalOp::And, Some(false), _) | (LogicalOp::Or, Some(true), _) => {
                    Expr::Const(Value::from_bool(op == LogicalOp::Or))
                }
                (_, Some(_), Some(r)) => Expr::Const(Value::from_bool(r)),
                _ => Expr::Logical(op, Box::new(lhs), Box::new(rhs)),
            }
        }
        Expr::Conditional(cond, then, otherwise) => {
            let cond = fold(*cond);
            let then = fold(*then);
            let otherwise = fold(*otherwise);
            match cond.as_const().and_then(const_truth) {
                Some(true) => then,
                Some(false) => otherwise,
                None => Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)),
            }
        }
        Expr::Index(container, index) => Expr::Index(Box::new(fold(*container)), Box::new(fold(*index))),
        Expr::Prop { obj, prop, args } => Expr::Prop {
            obj: obj.map(|o| Box::new(fold(*o))),
            prop,
            args: args.map(|a| a.into_iter().map(fold).collect()),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: match callee {
                Callee::Pointer(p) => Callee::Pointer(Box::new(fold(*p))),
                other => other,
            },
            args: args.into_iter().map(fold).collect(),
        },
        Expr::Assign { op, target, value } => Expr::Assign {
            op,
            target: Box::new(fold_target(*target)),
            value: Box::new(fold(*value)),
        },
        other => other,
    }
}

/// Folds inside an assignment target without collapsing the target itself.
fn fold_target(target: Expr) -> Expr {
    match target {
        Expr::Index(container, index) => Expr::Index(Box::new(fold_target(*container)), Box::new(fold(*index))),
        Expr::Prop { obj, prop, args } => Expr::Prop {
            obj: obj.map(|o| Box::new(fold(*o))),
            prop,
            args,
        },
        other => other,
    }
}

/// The truth value of a constant, if it has a fixed one.
fn const_truth(value: &Value) -> Option<bool> {
    match value {
        Value::Nil => Some(false),
        Value::Int(v) => Some(*v != 0),
        Value::True | Value::Str(_) | Value::List(_) | Value::Obj(_) => Some(true),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, lhs: Option<&Value>, rhs: Option<&Value>) -> Option<Value> {
    let (lhs, rhs) = (lhs?, rhs?);
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let v = match op {
                BinaryOp::Add => Value::Int(a.checked_add(b)?),
                BinaryOp::Sub => Value::Int(a.checked_sub(b)?),
                BinaryOp::Mul => Value::Int(a.checked_mul(b)?),
                BinaryOp::Div => Value::Int(a.checked_div(b)?),
                BinaryOp::Mod => Value::Int(a.checked_rem(b)?),
                BinaryOp::BitAnd => Value::Int(a & b),
                BinaryOp::BitOr => Value::Int(a | b),
                BinaryOp::BitXor => Value::Int(a ^ b),
                BinaryOp::Shl => Value::Int(a.wrapping_shl(b as u32)),
                BinaryOp::Ashr => Value::Int(a.wrapping_shr(b as u32)),
                BinaryOp::Lshr => Value::Int((a as u32).wrapping_shr(b as u32) as i32),
                BinaryOp::Eq => Value::from_bool(a == b),
                BinaryOp::Ne => Value::from_bool(a != b),
                BinaryOp::Lt => Value::from_bool(a < b),
                BinaryOp::Le => Value::from_bool(a <= b),
                BinaryOp::Gt => Value::from_bool(a > b),
                BinaryOp::Ge => Value::from_bool(a >= b),
            };
            Some(v)
        }
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Some(Value::from_str(format!("{a}{b}"))),
            BinaryOp::Eq => Some(Value::from_bool(a == b)),
            BinaryOp::Ne => Some(Value::from_bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

/// Rejects constructs that could have side effects in speculative mode.
pub(crate) fn check_speculative(expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::Assign { .. } => Err(CompileError::new("assignment is not allowed in speculative evaluation")),
        Expr::Call { .. } => Err(CompileError::new("function calls are not allowed in speculative evaluation")),
        Expr::Prop { args: Some(_), .. } => Err(CompileError::new(
            "method calls are not allowed in speculative evaluation",
        )),
        Expr::Prop { obj, .. } => obj.as_deref().map_or(Ok(()), check_speculative),
        Expr::List(items) => items.iter().try_for_each(check_speculative),
        Expr::Index(a, b) | Expr::Binary(_, a, b) | Expr::Logical(_, a, b) => {
            check_speculative(a)?;
            check_speculative(b)
        }
        Expr::Unary(_, a) => check_speculative(a),
        Expr::Conditional(c, a, b) => {
            check_speculative(c)?;
            check_speculative(a)?;
            check_speculative(b)
        }
        Expr::Const(_) | Expr::Local(_) | Expr::SelfObj | Expr::Context(_) | Expr::ArgCount { .. } => Ok(()),
    }
}
