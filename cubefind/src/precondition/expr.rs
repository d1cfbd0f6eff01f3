//! Arithmetic expressions in the voxel coordinates `x`, `y` and `z`.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | 'x' | 'y' | 'z' | ident '(' expr (',' expr)? ')' | '(' expr ')'
//! ```
//!
//! Only the functions in [`Func1`] and [`Func2`] are callable. The source is
//! parsed once into an [`Expr`] tree that is evaluated per voxel.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ===========================================================================
// Tokenizer
// ===========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug)]
struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn next_token(&mut self) -> std::result::Result<Token, String> {
        while matches!(self.peek_byte(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
        let Some(b) = self.peek_byte() else {
            return Ok(Token::Eof);
        };

        let single = match b {
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'/' => Some(Token::Slash),
            b'^' => Some(Token::Caret),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }

        match b {
            b'*' => {
                self.pos += 1;
                // `**` is an alias of `^`
                if self.peek_byte() == Some(b'*') {
                    self.pos += 1;
                    Ok(Token::Caret)
                } else {
                    Ok(Token::Star)
                }
            }
            b'0'..=b'9' | b'.' => self.read_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.read_ident()),
            _ => Err(format!(
                "unexpected character {:?} at column {}",
                b as char,
                self.pos + 1
            )),
        }
    }

    fn eat_digits(&mut self) -> usize {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn read_number(&mut self) -> std::result::Result<Token, String> {
        let start = self.pos;
        let mut digits = self.eat_digits();
        if self.peek_byte() == Some(b'.') {
            self.pos += 1;
            digits += self.eat_digits();
        }
        if digits == 0 {
            return Err(format!("malformed number at column {}", start + 1));
        }
        if matches!(self.peek_byte(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.eat_digits() == 0 {
                return Err(format!("missing exponent digits at column {}", self.pos + 1));
            }
        }
        // The scanned range holds ASCII digits, '.', 'e' and signs only.
        let text = String::from_utf8_lossy(&self.input[start..self.pos]);
        text.parse()
            .map(Token::Number)
            .map_err(|_| format!("invalid number '{}' at column {}", text, start + 1))
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while matches!(
            self.peek_byte(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
        Token::Ident(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }
}

// ===========================================================================
// Syntax tree
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// One-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func1 {
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Sinh,
    Cosh,
    Tanh,
    Arcsinh,
    Arccosh,
    Arctanh,
    Exp,
    Log,
    Sqrt,
    Square,
    Absolute,
    Sign,
}

impl Func1 {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func1::Sin,
            "cos" => Func1::Cos,
            "tan" => Func1::Tan,
            "arcsin" => Func1::Arcsin,
            "arccos" => Func1::Arccos,
            "arctan" => Func1::Arctan,
            "sinh" => Func1::Sinh,
            "cosh" => Func1::Cosh,
            "tanh" => Func1::Tanh,
            "arcsinh" => Func1::Arcsinh,
            "arccosh" => Func1::Arccosh,
            "arctanh" => Func1::Arctanh,
            "exp" => Func1::Exp,
            "log" => Func1::Log,
            "sqrt" => Func1::Sqrt,
            "square" => Func1::Square,
            "absolute" | "fabs" => Func1::Absolute,
            "sign" => Func1::Sign,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func1::Sin => v.sin(),
            Func1::Cos => v.cos(),
            Func1::Tan => v.tan(),
            Func1::Arcsin => v.asin(),
            Func1::Arccos => v.acos(),
            Func1::Arctan => v.atan(),
            Func1::Sinh => v.sinh(),
            Func1::Cosh => v.cosh(),
            Func1::Tanh => v.tanh(),
            Func1::Arcsinh => v.asinh(),
            Func1::Arccosh => v.acosh(),
            Func1::Arctanh => v.atanh(),
            Func1::Exp => v.exp(),
            Func1::Log => v.ln(),
            Func1::Sqrt => v.sqrt(),
            Func1::Square => v * v,
            Func1::Absolute => v.abs(),
            // sign(0) is 0, unlike f64::signum
            Func1::Sign => {
                if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    v
                }
            }
        }
    }
}

/// Two-argument functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func2 {
    Arctan2,
    Power,
}

impl Func2 {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "arctan2" => Some(Func2::Arctan2),
            "power" => Some(Func2::Power),
            _ => None,
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Func2::Arctan2 => a.atan2(b),
            Func2::Power => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(Var),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call1(Func1, Box<Expr>),
    Call2(Func2, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, x: f64, y: f64, z: f64) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Var(Var::X) => x,
            Expr::Var(Var::Y) => y,
            Expr::Var(Var::Z) => z,
            Expr::Neg(e) => -e.eval(x, y, z),
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(x, y, z), b.eval(x, y, z));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call1(f, a) => f.apply(a.eval(x, y, z)),
            Expr::Call2(f, a, b) => f.apply(a.eval(x, y, z), b.eval(x, y, z)),
        }
    }

    /// Whether the expression reads any coordinate.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Number(_) => true,
            Expr::Var(_) => false,
            Expr::Neg(e) | Expr::Call1(_, e) => e.is_constant(),
            Expr::Binary(_, a, b) | Expr::Call2(_, a, b) => a.is_constant() && b.is_constant(),
        }
    }
}

// ===========================================================================
// Parser: tokens -> Expr
// ===========================================================================

struct Parser<'a> {
    lexer: Lexer<'a>,
    /// Single-token lookahead.
    peeked: Option<Token>,
}

type ParseResult<T> = std::result::Result<T, String>;

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn peek(&mut self) -> ParseResult<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.get_or_insert(Token::Eof))
    }

    fn next(&mut self) -> ParseResult<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let token = self.next()?;
        if token != expected {
            return Err(format!("expected {:?}, found {:?}", expected, token));
        }
        Ok(())
    }

    fn parse(mut self) -> ParseResult<Expr> {
        let expr = self.parse_expr()?;
        match self.next()? {
            Token::Eof => Ok(expr),
            token => Err(format!("unexpected trailing {:?}", token)),
        }
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek()? {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek()? {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.peek()? {
            Token::Minus => {
                self.next()?;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.next()?;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_primary()?;
        if matches!(self.peek()?, Token::Caret) {
            self.next()?;
            // Right-associative, and binds tighter than a leading minus.
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.next()? {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "x" => Ok(Expr::Var(Var::X)),
                "y" => Ok(Expr::Var(Var::Y)),
                "z" => Ok(Expr::Var(Var::Z)),
                _ => self.parse_call(name),
            },
            token => Err(format!("unexpected {:?}", token)),
        }
    }

    fn parse_call(&mut self, name: String) -> ParseResult<Expr> {
        let f1 = Func1::from_name(&name);
        let f2 = Func2::from_name(&name);
        if f1.is_none() && f2.is_none() {
            return Err(format!("unknown identifier '{}'", name));
        }

        self.expect(Token::LParen)?;
        let first = self.parse_expr()?;
        let second = if matches!(self.peek()?, Token::Comma) {
            self.next()?;
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(Token::RParen)?;

        match (f1, f2, second) {
            (Some(f), _, None) => Ok(Expr::Call1(f, Box::new(first))),
            (_, Some(f), Some(second)) => Ok(Expr::Call2(f, Box::new(first), Box::new(second))),
            (Some(_), _, Some(_)) => Err(format!("'{}' takes one argument", name)),
            (None, _, _) => Err(format!("'{}' takes two arguments", name)),
        }
    }
}

// ===========================================================================
// Public wrapper
// ===========================================================================

/// Parsed weights function, e.g. `exp(-((x-64)^2 + (y-64)^2) / 800)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightsFunction {
    source: String,
    expr: Expr,
}

impl WeightsFunction {
    pub fn parse(source: &str) -> Result<Self> {
        let expr = Parser::new(source)
            .parse()
            .map_err(|reason| Error::InvalidWeightsFunction {
                expression: source.to_string(),
                reason,
            })?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Weight at voxel `(x, y, z)`. Not checked for finiteness.
    #[inline]
    pub fn eval(&self, x: usize, y: usize, z: usize) -> f64 {
        self.expr.eval(x as f64, y as f64, z as f64)
    }
}

impl FromStr for WeightsFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WeightsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
