//! Expression tokenizer.

use crate::error::CompileError;

/// Operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    OrOr,
    AndAnd,
    Pipe,
    Caret,
    Amp,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Ashr,
    Lshr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Punct::LParen => "(",
            Punct::RParen => ")",
            Punct::LBracket => "[",
            Punct::RBracket => "]",
            Punct::Comma => ",",
            Punct::Dot => ".",
            Punct::Question => "?",
            Punct::Colon => ":",
            Punct::Assign => "=",
            Punct::PlusAssign => "+=",
            Punct::MinusAssign => "-=",
            Punct::StarAssign => "*=",
            Punct::SlashAssign => "/=",
            Punct::PercentAssign => "%=",
            Punct::OrOr => "||",
            Punct::AndAnd => "&&",
            Punct::Pipe => "|",
            Punct::Caret => "^",
            Punct::Amp => "&",
            Punct::EqEq => "==",
            Punct::NotEq => "!=",
            Punct::Lt => "<",
            Punct::Le => "<=",
            Punct::Gt => ">",
            Punct::Ge => ">=",
            Punct::Shl => "<<",
            Punct::Ashr => ">>",
            Punct::Lshr => ">>>",
            Punct::Plus => "+",
            Punct::Minus => "-",
            Punct::Star => "*",
            Punct::Slash => "/",
            Punct::Percent => "%",
            Punct::Bang => "!",
            Punct::Tilde => "~",
        }
    }
}

/// The `#__` literal forms produced by the value formatter's special
/// notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Obj,
    Prop,
    Func,
    Enum,
    BifPtr,
    Invalid,
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An integer literal. Decimal literals keep their full magnitude so
    /// that `-2147483648` can be folded; hex literals are already wrapped
    /// to 32 bits.
    Int { value: i64, hex: bool },
    Str(String),
    Ident(String),
    Special(SpecialForm),
    Punct(Punct),
    Eof,
}

impl Token {
    /// Describes the token for a diagnostic.
    pub fn describe(&self) -> String {
        match self {
            Token::Int { value, .. } => value.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Ident(name) => name.clone(),
            Token::Special(_) => "#__".to_string(),
            Token::Punct(p) => p.as_str().to_string(),
            Token::Eof => "end of expression".to_string(),
        }
    }
}

/// Splits expression text into tokens. The result always ends with
/// [`Token::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_digit() {
            tokens.push(lex_number(&mut chars)?);
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let token = match name.as_str() {
                "and" => Token::Punct(Punct::AndAnd),
                "or" => Token::Punct(Punct::OrOr),
                "not" => Token::Punct(Punct::Bang),
                _ => Token::Ident(name),
            };
            tokens.push(token);
            continue;
        }

        chars.next();
        let token = match ch {
            '\'' | '"' => Token::Str(lex_string(&mut chars, ch)?),
            '#' => Token::Special(lex_special(&mut chars)?),
            '(' => Token::Punct(Punct::LParen),
            ')' => Token::Punct(Punct::RParen),
            '[' => Token::Punct(Punct::LBracket),
            ']' => Token::Punct(Punct::RBracket),
            ',' => Token::Punct(Punct::Comma),
            '.' => Token::Punct(Punct::Dot),
            '?' => Token::Punct(Punct::Question),
            ':' => Token::Punct(Punct::Colon),
            '~' => Token::Punct(Punct::Tilde),
            '^' => Token::Punct(Punct::Caret),
            '=' => pick(&mut chars, '=', Punct::EqEq, Punct::Assign),
            '!' => pick(&mut chars, '=', Punct::NotEq, Punct::Bang),
            '+' => pick(&mut chars, '=', Punct::PlusAssign, Punct::Plus),
            '-' => pick(&mut chars, '=', Punct::MinusAssign, Punct::Minus),
            '*' => pick(&mut chars, '=', Punct::StarAssign, Punct::Star),
            '/' => pick(&mut chars, '=', Punct::SlashAssign, Punct::Slash),
            '%' => pick(&mut chars, '=', Punct::PercentAssign, Punct::Percent),
            '|' => pick(&mut chars, '|', Punct::OrOr, Punct::Pipe),
            '&' => pick(&mut chars, '&', Punct::AndAnd, Punct::Amp),
            '<' => match chars.peek() {
                Some('=') => {
                    chars.next();
                    Token::Punct(Punct::Le)
                }
                Some('<') => {
                    chars.next();
                    Token::Punct(Punct::Shl)
                }
                _ => Token::Punct(Punct::Lt),
            },
            '>' => match chars.peek() {
                Some('=') => {
                    chars.next();
                    Token::Punct(Punct::Ge)
                }
                Some('>') => {
                    chars.next();
                    pick(&mut chars, '>', Punct::Lshr, Punct::Ashr)
                }
                _ => Token::Punct(Punct::Gt),
            },
            other => {
                return Err(CompileError::new(format!(
                    "invalid character '{other}' in expression"
                )))
            }
        };
        tokens.push(token);
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn pick(chars: &mut Chars<'_>, next: char, yes: Punct, no: Punct) -> Token {
    if chars.peek() == Some(&next) {
        chars.next();
        Token::Punct(yes)
    } else {
        Token::Punct(no)
    }
}

fn lex_number(chars: &mut Chars<'_>) -> Result<Token, CompileError> {
    let mut digits = String::new();
    let mut hex = false;

    if chars.peek() == Some(&'0') {
        digits.push('0');
        chars.next();
        if matches!(chars.peek(), Some('x') | Some('X')) {
            chars.next();
            digits.clear();
            hex = true;
        }
    }

    while let Some(&c) = chars.peek() {
        let ok = if hex { c.is_ascii_hexdigit() } else { c.is_ascii_digit() };
        if !ok {
            break;
        }
        digits.push(c);
        chars.next();
    }
    if chars.peek().is_some_and(|c| c.is_alphanumeric() || *c == '_') {
        return Err(CompileError::new("invalid numeric constant"));
    }

    let out_of_range = || CompileError::new("numeric constant out of range");
    if hex {
        if digits.is_empty() {
            return Err(CompileError::new("invalid numeric constant"));
        }
        let value = u32::from_str_radix(&digits, 16).map_err(|_| out_of_range())?;
        Ok(Token::Int {
            value: value as i32 as i64,
            hex: true,
        })
    } else {
        let value: i64 = digits.parse().map_err(|_| out_of_range())?;
        if value > i64::from(i32::MAX) + 1 {
            return Err(out_of_range());
        }
        Ok(Token::Int { value, hex: false })
    }
}

fn lex_string(chars: &mut Chars<'_>, quote: char) -> Result<String, CompileError> {
    let mut out = String::new();
    loop {
        let c = chars
            .next()
            .ok_or_else(|| CompileError::new("unterminated string"))?;
        if c == quote {
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }

        let esc = chars
            .next()
            .ok_or_else(|| CompileError::new("unterminated string"))?;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '^' => out.push('\u{0F}'),
            'v' => out.push('\u{0E}'),
            'b' => out.push('\u{0B}'),
            ' ' => out.push('\u{15}'),
            'x' => out.push(hex_escape(chars, 2)?),
            'u' => out.push(hex_escape(chars, 4)?),
            other => out.push(other),
        }
    }
}

fn hex_escape(chars: &mut Chars<'_>, len: usize) -> Result<char, CompileError> {
    let mut code = 0u32;
    for _ in 0..len {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| CompileError::new("invalid escape sequence in string"))?;
        code = code * 16 + digit;
    }
    char::from_u32(code).ok_or_else(|| CompileError::new("invalid escape sequence in string"))
}

fn lex_special(chars: &mut Chars<'_>) -> Result<SpecialForm, CompileError> {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    match name.as_str() {
        "__obj" => Ok(SpecialForm::Obj),
        "__prop" => Ok(SpecialForm::Prop),
        "__func" => Ok(SpecialForm::Func),
        "__enum" => Ok(SpecialForm::Enum),
        "__bifptr" => Ok(SpecialForm::BifPtr),
        "__invalid" => Ok(SpecialForm::Invalid),
        _ => Err(CompileError::new(format!("invalid character '#' before '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operators_take_longest_match() {
        let toks = tokenize("a >>> 2 >= b").unwrap();
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Punct(Punct::Lshr),
                Token::Int { value: 2, hex: false },
                Token::Punct(Punct::Ge),
                Token::Ident("b".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        let toks = tokenize("x and not y or z").unwrap();
        assert_eq!(toks[1], Token::Punct(Punct::AndAnd));
        assert_eq!(toks[2], Token::Punct(Punct::Bang));
        assert_eq!(toks[4], Token::Punct(Punct::OrOr));
    }

    #[test]
    fn test_string_escapes() {
        let toks = tokenize(r#"'a\tb\'c\x41é\^\ '"#).unwrap();
        assert_eq!(toks[0], Token::Str("a\tb'cAé\u{0F}\u{15}".into()));
        assert_eq!(tokenize(r#""it's""#).unwrap()[0], Token::Str("it's".into()));
    }

    #[test]
    fn test_hex_wraps_to_32_bits() {
        let toks = tokenize("0xFFFFFFFF").unwrap();
        assert_eq!(toks[0], Token::Int { value: -1, hex: true });
    }

    #[test]
    fn test_lexical_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a @ b").is_err());
        assert!(tokenize("12abc").is_err());
        assert!(tokenize("99999999999").is_err());
        assert!(tokenize("#__nothing").is_err());
    }

    #[test]
    fn test_special_forms() {
        let toks = tokenize("#__bifptr 1 2").unwrap();
        assert_eq!(toks[0], Token::Special(SpecialForm::BifPtr));
        assert_eq!(toks.len(), 4);
    }
}
