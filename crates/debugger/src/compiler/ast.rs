//! Expression tree.

use crate::debug_table::LocalKind;
use crate::op_code::{ContextElement, OpCode};
use crate::value::{BifId, CodeAddr, PropId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Ashr,
    Lshr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// The instruction implementing the operator.
    pub fn opcode(&self) -> OpCode {
        match self {
            BinaryOp::Add => OpCode::ADD,
            BinaryOp::Sub => OpCode::SUB,
            BinaryOp::Mul => OpCode::MUL,
            BinaryOp::Div => OpCode::DIV,
            BinaryOp::Mod => OpCode::MOD,
            BinaryOp::BitAnd => OpCode::BAND,
            BinaryOp::BitOr => OpCode::BOR,
            BinaryOp::BitXor => OpCode::XOR,
            BinaryOp::Shl => OpCode::SHL,
            BinaryOp::Ashr => OpCode::ASHR,
            BinaryOp::Lshr => OpCode::LSHR,
            BinaryOp::Eq => OpCode::EQ,
            BinaryOp::Ne => OpCode::NE,
            BinaryOp::Lt => OpCode::LT,
            BinaryOp::Le => OpCode::LE,
            BinaryOp::Gt => OpCode::GT,
            BinaryOp::Ge => OpCode::GE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A resolved local variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRef {
    pub kind: LocalKind,
    pub level: u16,
}

/// What a call invokes.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Function(CodeAddr),
    Builtin(BifId),
    /// A function or built-in pointer computed at run time
    Pointer(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    /// A list literal with non-constant elements
    List(Vec<Expr>),
    Local(LocalRef),
    SelfObj,
    Context(ContextElement),
    ArgCount { level: u16 },
    /// `obj.prop` or `obj.prop(args)`; `obj` of `None` means `self`
    Prop {
        obj: Option<Box<Expr>>,
        prop: PropId,
        args: Option<Vec<Expr>>,
    },
    Call { callee: Callee, args: Vec<Expr> },
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `target = value`, or `target op= value` when `op` is set
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    /// Returns true if the expression can be assigned to.
    pub fn is_lval(&self) -> bool {
        match self {
            Expr::Local(_) => true,
            Expr::Prop { args: None, .. } => true,
            Expr::Index(container, _) => container.is_lval(),
            _ => false,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }
}
