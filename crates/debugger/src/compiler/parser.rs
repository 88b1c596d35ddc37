//! Recursive-descent expression parser.
//!
//! Names are resolved while parsing: locals of the scope first, then the
//! pseudo-variables, then global symbols.

use super::ast::{BinaryOp, Callee, Expr, LocalRef, LogicalOp, UnaryOp};
use super::lexer::{Punct, SpecialForm, Token};
use super::Resolver;
use crate::debug_table::LocalKind;
use crate::error::CompileError;
use crate::op_code::ContextElement;
use crate::symbols::GlobalSymbol;
use crate::value::{BifId, CodeAddr, ObjId, PropId, Value};

type ParseResult<T> = Result<T, CompileError>;

/// Maximum number of arguments a call instruction can carry.
const MAX_CALL_ARGS: usize = u8::MAX as usize;

const EQUALITY: &[(Punct, BinaryOp)] = &[(Punct::EqEq, BinaryOp::Eq), (Punct::NotEq, BinaryOp::Ne)];
const RELATIONAL: &[(Punct, BinaryOp)] = &[
    (Punct::Lt, BinaryOp::Lt),
    (Punct::Le, BinaryOp::Le),
    (Punct::Gt, BinaryOp::Gt),
    (Punct::Ge, BinaryOp::Ge),
];
const SHIFT: &[(Punct, BinaryOp)] = &[
    (Punct::Shl, BinaryOp::Shl),
    (Punct::Ashr, BinaryOp::Ashr),
    (Punct::Lshr, BinaryOp::Lshr),
];
const ADDITIVE: &[(Punct, BinaryOp)] = &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)];
const MULTIPLICATIVE: &[(Punct, BinaryOp)] = &[
    (Punct::Star, BinaryOp::Mul),
    (Punct::Slash, BinaryOp::Div),
    (Punct::Percent, BinaryOp::Mod),
];

pub(crate) struct Parser<'r, 'a> {
    tokens: Vec<Token>,
    pos: usize,
    resolver: &'r Resolver<'a>,
}

impl<'r, 'a> Parser<'r, 'a> {
    pub(crate) fn new(tokens: Vec<Token>, resolver: &'r Resolver<'a>) -> Self {
        Self {
            tokens,
            pos: 0,
            resolver,
        }
    }

    /// Parses a complete expression; trailing tokens are an error.
    pub(crate) fn parse(mut self) -> ParseResult<Expr> {
        let expr = self.assignment()?;
        match self.peek() {
            Token::Eof => Ok(expr),
            tok => Err(CompileError::new(format!(
                "syntax error: unexpected '{}'",
                tok.describe()
            ))),
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, p: Punct) -> bool {
        if *self.peek() == Token::Punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: Punct) -> ParseResult<()> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(CompileError::new(format!(
                "expected '{}' but found '{}'",
                p.as_str(),
                self.peek().describe()
            )))
        }
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let target = self.conditional()?;
        let op = match self.peek() {
            Token::Punct(Punct::Assign) => None,
            Token::Punct(Punct::PlusAssign) => Some(BinaryOp::Add),
            Token::Punct(Punct::MinusAssign) => Some(BinaryOp::Sub),
            Token::Punct(Punct::StarAssign) => Some(BinaryOp::Mul),
            Token::Punct(Punct::SlashAssign) => Some(BinaryOp::Div),
            Token::Punct(Punct::PercentAssign) => Some(BinaryOp::Mod),
            _ => return Ok(target),
        };
        self.advance();

        if !target.is_lval() {
            return Err(CompileError::new("invalid assignment: the left side cannot be assigned"));
        }
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let cond = self.logical_or()?;
        if !self.eat(Punct::Question) {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect(Punct::Colon)?;
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.logical_and()?;
        while self.eat(Punct::OrOr) {
            let rhs = self.logical_and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.bit_or()?;
        while self.eat(Punct::AndAnd) {
            let rhs = self.bit_or()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary(&[(Punct::Pipe, BinaryOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary(&[(Punct::Caret, BinaryOp::BitXor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary(&[(Punct::Amp, BinaryOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary(EQUALITY, Self::relational)
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        self.binary(RELATIONAL, Self::shift)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        self.binary(SHIFT, Self::additive)
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary(ADDITIVE, Self::multiplicative)
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary(MULTIPLICATIVE, Self::unary)
    }

    /// Parses a left-associative run of the operators in `ops`.
    fn binary(
        &mut self,
        ops: &[(Punct, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut lhs = next(self)?;
        loop {
            let op = match self.peek() {
                Token::Punct(p) => ops.iter().find(|(punct, _)| punct == p).map(|(_, op)| *op),
                _ => None,
            };
            let Some(op) = op else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Token::Punct(Punct::Minus) => {
                self.advance();
                if let Token::Int { value, hex: false } = self.peek() {
                    if *value == i64::from(i32::MAX) + 1 {
                        self.advance();
                        return self.postfix(Expr::Const(Value::Int(i32::MIN)));
                    }
                }
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Token::Punct(Punct::Bang) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            Token::Punct(Punct::Tilde) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::BitNot, Box::new(self.unary()?)))
            }
            Token::Punct(Punct::Amp) => {
                self.advance();
                match self.advance() {
                    Token::Ident(name) => self.address_of(&name),
                    tok => Err(CompileError::new(format!(
                        "expected a symbol after '&' but found '{}'",
                        tok.describe()
                    ))),
                }
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            match self.peek() {
                Token::Punct(Punct::LParen) => {
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Callee::Pointer(Box::new(expr)),
                        args,
                    };
                }
                Token::Punct(Punct::Dot) => {
                    self.advance();
                    let prop = match self.advance() {
                        Token::Ident(name) => self.property_named(&name)?,
                        tok => {
                            return Err(CompileError::new(format!(
                                "expected a property name after '.' but found '{}'",
                                tok.describe()
                            )))
                        }
                    };
                    let args = if self.eat(Punct::LParen) {
                        Some(self.arguments()?)
                    } else {
                        None
                    };
                    expr = Expr::Prop {
                        obj: Some(Box::new(expr)),
                        prop,
                        args,
                    };
                }
                Token::Punct(Punct::LBracket) => {
                    self.advance();
                    let index = self.assignment()?;
                    self.expect(Punct::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses a call's argument list; the opening parenthesis has already
    /// been consumed.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(Punct::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.assignment()?);
            if args.len() > MAX_CALL_ARGS {
                return Err(CompileError::new("too many arguments in function call"));
            }
            if self.eat(Punct::RParen) {
                return Ok(args);
            }
            self.expect(Punct::Comma)?;
        }
    }

    fn optional_arguments(&mut self) -> ParseResult<Option<Vec<Expr>>> {
        if self.eat(Punct::LParen) {
            self.arguments().map(Some)
        } else {
            Ok(None)
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.advance() {
            Token::Int { value, hex } => {
                if !hex && value > i64::from(i32::MAX) {
                    return Err(CompileError::new("numeric constant out of range"));
                }
                Ok(Expr::Const(Value::Int(value as i32)))
            }
            Token::Str(s) => Ok(Expr::Const(Value::from_str(s))),
            Token::Special(form) => self.special(form),
            Token::Punct(Punct::LParen) => {
                let inner = self.assignment()?;
                self.expect(Punct::RParen)?;
                Ok(inner)
            }
            Token::Punct(Punct::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(Punct::RBracket) {
                    loop {
                        items.push(self.assignment()?);
                        if self.eat(Punct::RBracket) {
                            break;
                        }
                        self.expect(Punct::Comma)?;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Ident(name) => self.name(&name),
            tok => Err(CompileError::new(format!(
                "syntax error: unexpected '{}'",
                tok.describe()
            ))),
        }
    }

    fn special_number(&mut self) -> ParseResult<u32> {
        match self.advance() {
            Token::Int { value, .. } if value >= 0 && value <= i64::from(u32::MAX) => Ok(value as u32),
            tok => Err(CompileError::new(format!(
                "expected a number but found '{}'",
                tok.describe()
            ))),
        }
    }

    fn special(&mut self, form: SpecialForm) -> ParseResult<Expr> {
        let value = match form {
            SpecialForm::Obj => Value::Obj(ObjId(self.special_number()?)),
            SpecialForm::Prop => Value::Prop(PropId(narrow(self.special_number()?)?)),
            SpecialForm::Func => Value::FuncPtr(self.special_number()? as CodeAddr),
            SpecialForm::Enum => Value::Enum(self.special_number()?),
            SpecialForm::BifPtr => {
                let set = narrow(self.special_number()?)?;
                let index = narrow(self.special_number()?)?;
                Value::BifPtr(BifId::new(set, index))
            }
            SpecialForm::Invalid => return Err(CompileError::new("invalid value")),
        };
        Ok(Expr::Const(value))
    }

    fn require_self(&self, name: &str) -> ParseResult<()> {
        if self.resolver.self_valid {
            Ok(())
        } else {
            Err(CompileError::new(format!("\"{name}\" is not valid in this context")))
        }
    }

    fn name(&mut self, name: &str) -> ParseResult<Expr> {
        match name {
            "nil" => return Ok(Expr::Const(Value::Nil)),
            "true" => return Ok(Expr::Const(Value::True)),
            "self" => {
                self.require_self(name)?;
                return Ok(Expr::SelfObj);
            }
            "targetprop" | "targetobj" | "definingobj" => {
                self.require_self(name)?;
                let element = match name {
                    "targetprop" => ContextElement::TargetProp,
                    "targetobj" => ContextElement::TargetObj,
                    _ => ContextElement::DefiningObj,
                };
                return Ok(Expr::Context(element));
            }
            "argcount" => {
                let level = match &self.resolver.scope {
                    Some(scope) => stack_level(scope.stack_level)?,
                    None => return Err(CompileError::new("\"argcount\" is not valid in this context")),
                };
                return Ok(Expr::ArgCount { level });
            }
            _ => {}
        }

        if let Some(local) = self.resolver.scope.as_ref().and_then(|s| s.find_symbol(name)) {
            if local.kind == LocalKind::Unknown {
                return Err(CompileError::new(format!(
                    "local variable \"{name}\" cannot be accessed in the debugger"
                )));
            }
            return Ok(Expr::Local(LocalRef {
                kind: local.kind,
                level: stack_level(local.level)?,
            }));
        }

        match self.resolver.symbols.lookup(name) {
            Some(GlobalSymbol::Object(id)) => Ok(Expr::Const(Value::Obj(id))),
            Some(GlobalSymbol::Enum(v)) => Ok(Expr::Const(Value::Enum(v))),
            Some(GlobalSymbol::Property(prop)) => {
                self.require_self("self")?;
                let args = self.optional_arguments()?;
                Ok(Expr::Prop { obj: None, prop, args })
            }
            // without an argument list a function name is a pointer to it
            Some(GlobalSymbol::Function(addr)) => Ok(match self.optional_arguments()? {
                Some(args) => Expr::Call {
                    callee: Callee::Function(addr),
                    args,
                },
                None => Expr::Const(Value::FuncPtr(addr)),
            }),
            Some(GlobalSymbol::Builtin(bif)) => Ok(match self.optional_arguments()? {
                Some(args) => Expr::Call {
                    callee: Callee::Builtin(bif),
                    args,
                },
                None => Expr::Const(Value::BifPtr(bif)),
            }),
            None => Err(CompileError::new(format!("undefined symbol \"{name}\""))),
        }
    }

    fn address_of(&mut self, name: &str) -> ParseResult<Expr> {
        let value = match self.resolver.symbols.lookup(name) {
            Some(GlobalSymbol::Property(prop)) => Value::Prop(prop),
            Some(GlobalSymbol::Function(addr)) => Value::FuncPtr(addr),
            Some(GlobalSymbol::Builtin(bif)) => Value::BifPtr(bif),
            Some(_) => {
                return Err(CompileError::new(format!(
                    "cannot take the address of \"{name}\""
                )))
            }
            None => return Err(CompileError::new(format!("undefined symbol \"{name}\""))),
        };
        self.postfix(Expr::Const(value))
    }

    fn property_named(&self, name: &str) -> ParseResult<PropId> {
        match self.resolver.symbols.lookup(name) {
            Some(GlobalSymbol::Property(prop)) => Ok(prop),
            Some(_) => Err(CompileError::new(format!("\"{name}\" is not a property"))),
            None => Err(CompileError::new(format!("undefined symbol \"{name}\""))),
        }
    }
}

fn narrow(value: u32) -> ParseResult<u16> {
    u16::try_from(value).map_err(|_| CompileError::new("numeric constant out of range"))
}

fn stack_level(level: usize) -> ParseResult<u16> {
    u16::try_from(level).map_err(|_| CompileError::new("stack level too deep"))
}
