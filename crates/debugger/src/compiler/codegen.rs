//! Code generation for expression trees.

use super::ast::{Callee, Expr, LocalRef, LogicalOp, UnaryOp};
use crate::debug_table::LocalKind;
use crate::error::CompileError;
use crate::op_code::OpCode;
use crate::unit_builder::{JumpLabel, UnitBuilder};
use crate::value::Value;

type GenResult = Result<(), CompileError>;

pub(crate) struct CodeGenerator {
    builder: UnitBuilder,
    speculative: bool,
}

impl CodeGenerator {
    pub(crate) fn new(speculative: bool) -> Self {
        Self {
            builder: UnitBuilder::new(),
            speculative,
        }
    }

    /// Generates `expr` followed by the implicit return.
    pub(crate) fn generate(mut self, expr: &Expr) -> Result<Vec<u8>, CompileError> {
        self.expr(expr)?;
        self.builder.emit_opcode(OpCode::RETVAL);
        Ok(self.builder.into_code())
    }

    fn patch(&mut self, label: JumpLabel) -> GenResult {
        if self.builder.patch_jump(label) {
            Ok(())
        } else {
            Err(CompileError::new("expression too large"))
        }
    }

    fn constant(&mut self, value: &Value) -> GenResult {
        let b = &mut self.builder;
        match value {
            Value::Nil | Value::Empty => {
                b.emit_opcode(OpCode::PUSHNIL);
            }
            Value::True => {
                b.emit_opcode(OpCode::PUSHTRUE);
            }
            Value::Int(v) => {
                b.emit_push_int(*v);
            }
            Value::Obj(obj) => {
                b.emit_push_obj(*obj);
            }
            Value::Prop(prop) => {
                b.emit_push_prop(*prop);
            }
            Value::Enum(v) => {
                b.emit_push_enum(*v);
            }
            Value::Str(s) => {
                if s.len() > u16::MAX as usize {
                    return Err(CompileError::new("string constant too long"));
                }
                b.emit_push_string(s);
            }
            Value::FuncPtr(addr) | Value::CodeOfs(addr) => {
                b.emit_push_func(*addr);
            }
            Value::BifPtr(bif) => {
                b.emit_push_bif(*bif);
            }
            Value::List(items) => {
                for item in items.iter() {
                    self.constant(item)?;
                }
                self.new_list(items.len())?;
            }
        }
        Ok(())
    }

    fn new_list(&mut self, count: usize) -> GenResult {
        let count = u16::try_from(count).map_err(|_| CompileError::new("list too long"))?;
        self.builder.emit_opcode(OpCode::NEWLIST).emit_u16(count);
        Ok(())
    }

    /// Pushes call arguments last to first, so the callee pops them in order.
    fn arguments(&mut self, args: &[Expr]) -> Result<u8, CompileError> {
        let argc = u8::try_from(args.len()).map_err(|_| CompileError::new("too many arguments in function call"))?;
        for arg in args.iter().rev() {
            self.expr(arg)?;
        }
        Ok(argc)
    }

    fn load_local(&mut self, local: &LocalRef) {
        let b = &mut self.builder;
        match local.kind {
            LocalKind::Local { var } => {
                b.emit_frame_var(OpCode::GETDBLCL, local.level, var);
            }
            LocalKind::Param { var } => {
                b.emit_frame_var(OpCode::GETDBARG, local.level, var);
            }
            LocalKind::ContextLocal { var, arr_idx } => {
                b.emit_context_var(OpCode::GETDBCTXLCL, local.level, var, arr_idx);
            }
            LocalKind::Unknown => {
                b.emit_opcode(OpCode::PUSHNIL);
            }
        }
    }

    fn object(&mut self, obj: &Option<Box<Expr>>) -> GenResult {
        match obj {
            Some(obj) => self.expr(obj),
            None => {
                self.builder.emit_opcode(OpCode::PUSHSELF);
                Ok(())
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> GenResult {
        match expr {
            Expr::Const(v) => self.constant(v)?,
            Expr::List(items) => {
                for item in items {
                    self.expr(item)?;
                }
                self.new_list(items.len())?;
            }
            Expr::Local(local) => self.load_local(local),
            Expr::SelfObj => {
                self.builder.emit_opcode(OpCode::PUSHSELF);
            }
            Expr::Context(element) => {
                self.builder.emit_push_context(*element);
            }
            Expr::ArgCount { level } => {
                self.builder.emit_opcode(OpCode::GETDBARGC).emit_u16(*level);
            }
            Expr::Prop { obj, prop, args } => match args {
                Some(args) => {
                    let argc = self.arguments(args)?;
                    self.object(obj)?;
                    self.builder.emit_call_prop(*prop, argc);
                }
                None => {
                    self.object(obj)?;
                    let op = if self.speculative {
                        OpCode::GETPROPDATA
                    } else {
                        OpCode::GETPROP
                    };
                    self.builder.emit_prop_op(op, *prop);
                }
            },
            Expr::Call { callee, args } => {
                let argc = self.arguments(args)?;
                match callee {
                    Callee::Function(addr) => {
                        self.builder.emit_call(*addr, argc);
                    }
                    Callee::Builtin(bif) => {
                        self.builder.emit_call_bif(*bif, argc);
                    }
                    Callee::Pointer(ptr) => {
                        self.expr(ptr)?;
                        self.builder.emit_opcode(OpCode::PTRCALL).emit(argc);
                    }
                }
            }
            Expr::Index(container, index) => {
                self.expr(container)?;
                self.expr(index)?;
                self.builder.emit_opcode(OpCode::INDEX);
            }
            Expr::Unary(op, operand) => {
                self.expr(operand)?;
                let op = match op {
                    UnaryOp::Neg => OpCode::NEG,
                    UnaryOp::Not => OpCode::NOT,
                    UnaryOp::BitNot => OpCode::BNOT,
                };
                self.builder.emit_opcode(op);
            }
            Expr::Binary(op, lhs, rhs) => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.builder.emit_opcode(op.opcode());
            }
            Expr::Logical(op, lhs, rhs) => self.logical(*op, lhs, rhs)?,
            Expr::Conditional(cond, then, otherwise) => {
                self.expr(cond)?;
                let to_else = self.builder.emit_jump(OpCode::JF);
                self.expr(then)?;
                let to_end = self.builder.emit_jump(OpCode::JMP);
                self.patch(to_else)?;
                self.expr(otherwise)?;
                self.patch(to_end)?;
            }
            Expr::Assign { op, target, value } => {
                match op {
                    Some(op) => {
                        self.expr(target)?;
                        self.expr(value)?;
                        self.builder.emit_opcode(op.opcode());
                    }
                    None => self.expr(value)?,
                }
                self.builder.emit_opcode(OpCode::DUP);
                self.store(target)?;
            }
        }
        Ok(())
    }

    /// `a && b` yields true or nil; `b` only runs when `a` doesn't decide.
    fn logical(&mut self, op: LogicalOp, lhs: &Expr, rhs: &Expr) -> GenResult {
        let branch = match op {
            LogicalOp::And => OpCode::JF,
            LogicalOp::Or => OpCode::JT,
        };
        self.expr(lhs)?;
        let short1 = self.builder.emit_jump(branch);
        self.expr(rhs)?;
        let short2 = self.builder.emit_jump(branch);

        let (fallthrough, shortcut) = match op {
            LogicalOp::And => (OpCode::PUSHTRUE, OpCode::PUSHNIL),
            LogicalOp::Or => (OpCode::PUSHNIL, OpCode::PUSHTRUE),
        };
        self.builder.emit_opcode(fallthrough);
        let to_end = self.builder.emit_jump(OpCode::JMP);
        self.patch(short1)?;
        self.patch(short2)?;
        self.builder.emit_opcode(shortcut);
        self.patch(to_end)
    }

    /// Stores the value on top of the stack into `target`, consuming it.
    fn store(&mut self, target: &Expr) -> GenResult {
        match target {
            Expr::Local(local) => {
                let b = &mut self.builder;
                match local.kind {
                    LocalKind::Local { var } => {
                        b.emit_frame_var(OpCode::SETDBLCL, local.level, var);
                    }
                    LocalKind::Param { var } => {
                        b.emit_frame_var(OpCode::SETDBARG, local.level, var);
                    }
                    LocalKind::ContextLocal { var, arr_idx } => {
                        b.emit_context_var(OpCode::SETDBCTXLCL, local.level, var, arr_idx);
                    }
                    LocalKind::Unknown => {
                        return Err(CompileError::new("invalid assignment: the left side cannot be assigned"))
                    }
                }
            }
            Expr::Prop { obj, prop, args: None } => {
                self.object(obj)?;
                self.builder.emit_prop_op(OpCode::SETPROP, *prop);
            }
            Expr::Index(container, index) => {
                self.expr(container)?;
                self.expr(index)?;
                self.builder.emit_opcode(OpCode::SETIND);
                self.store(container)?;
            }
            _ => return Err(CompileError::new("invalid assignment: the left side cannot be assigned")),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::BinaryOp;
    use crate::instruction::disassemble;
    use crate::value::PropId;

    fn gen(expr: &Expr) -> Vec<u8> {
        CodeGenerator::new(false).generate(expr).unwrap()
    }

    #[test]
    fn test_constant_return() {
        let code = gen(&Expr::Const(Value::Int(1)));
        assert_eq!(code, vec![OpCode::PUSH_1 as u8, OpCode::RETVAL as u8]);
    }

    #[test]
    fn test_call_pushes_arguments_in_reverse() {
        let call = Expr::Call {
            callee: Callee::Function(0x100),
            args: vec![Expr::Const(Value::Int(0)), Expr::Const(Value::Int(1))],
        };
        let code = gen(&call);
        assert_eq!(code[0], OpCode::PUSH_1 as u8);
        assert_eq!(code[1], OpCode::PUSH_0 as u8);
        assert_eq!(code[2], OpCode::CALL as u8);
        assert_eq!(code[3], 2);
    }

    #[test]
    fn test_speculative_property_read_is_data_only() {
        let read = Expr::Prop {
            obj: None,
            prop: PropId(7),
            args: None,
        };
        let code = CodeGenerator::new(true).generate(&read).unwrap();
        assert_eq!(code[0], OpCode::PUSHSELF as u8);
        assert_eq!(code[1], OpCode::GETPROPDATA as u8);
    }

    #[test]
    fn test_compound_assignment_stores_back() {
        let x = Expr::Local(LocalRef {
            kind: LocalKind::Local { var: 2 },
            level: 0,
        });
        let assign = Expr::Assign {
            op: Some(BinaryOp::Add),
            target: Box::new(x),
            value: Box::new(Expr::Const(Value::Int(5))),
        };
        let text = disassemble(&gen(&assign));
        let ops: Vec<&str> = text
            .lines()
            .filter_map(|l| l.split_whitespace().nth(1))
            .collect();
        assert_eq!(ops, vec!["GETDBLCL", "PUSHINT8", "ADD", "DUP", "SETDBLCL", "RETVAL"]);
    }
}
