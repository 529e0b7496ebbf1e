//! Sandboxed transform expressions
//!
//! A minimal arithmetic expression language for per-output value
//! transforms. The only binding is `value` (the resolved sample), the
//! function set is a fixed allow-list, and evaluation is total: no
//! recursion into user code, no side effects, no panics.
//!
//! # Grammar
//!
//! ```text
//! expr    := cmp
//! cmp     := add (('<'|'<='|'>'|'>='|'=='|'!=') add)*
//! add     := mul (('+'|'-') mul)*
//! mul     := unary (('*'|'/'|'%') unary)*
//! unary   := '-' unary | primary
//! primary := NUMBER | 'value' | FUNC '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Comparisons yield 1.0 or 0.0. Division follows IEEE float semantics;
//! the pipeline treats non-finite results as evaluation failures.

use thiserror::Error;

/// Maximum expression source length in characters
const MAX_EXPR_LEN: usize = 1024;

/// Maximum nesting depth of the parsed expression
const MAX_DEPTH: usize = 64;

/// Errors from compiling a transform expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// A character the lexer does not recognize
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    /// A token in a position the grammar does not allow
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    /// The expression ended mid-construct
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// An identifier that is neither `value` nor an allowed function
    #[error("unknown identifier '{0}'")]
    UnknownIdent(String),

    /// A function called with the wrong number of arguments
    #[error("{func} takes {expected} argument(s), got {got}")]
    WrongArity {
        func: &'static str,
        expected: usize,
        got: usize,
    },

    /// Expression nests deeper than the allowed limit
    #[error("expression nests deeper than {MAX_DEPTH} levels")]
    TooDeep,

    /// Expression source exceeds the allowed length
    #[error("expression longer than {MAX_EXPR_LEN} characters")]
    TooLong,
}

/// Allow-listed functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sqrt,
    Min,
    Max,
    Clamp,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "abs" => Func::Abs,
            "floor" => Func::Floor,
            "ceil" => Func::Ceil,
            "round" => Func::Round,
            "trunc" => Func::Trunc,
            "sqrt" => Func::Sqrt,
            "min" => Func::Min,
            "max" => Func::Max,
            "clamp" => Func::Clamp,
            _ => return None,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Floor => "floor",
            Func::Ceil => "ceil",
            Func::Round => "round",
            Func::Trunc => "trunc",
            Func::Sqrt => "sqrt",
            Func::Min => "min",
            Func::Max => "max",
            Func::Clamp => "clamp",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            Func::Clamp => 3,
            _ => 1,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// A parsed expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal
    Number(f64),
    /// The `value` binding
    Value,
    /// Unary negation
    Neg(Box<Expr>),
    /// A binary operation
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// A call to an allow-listed function
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Evaluate with `value` bound to the given number
    ///
    /// Total over all inputs; float edge cases (division by zero, sqrt of
    /// negatives) flow through as IEEE infinities and NaNs.
    pub fn eval(&self, value: f64) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Value => value,
            Expr::Neg(inner) => -inner.eval(value),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(value);
                let b = rhs.eval(value);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Rem => a % b,
                    BinOp::Lt => bool_num(a < b),
                    BinOp::Le => bool_num(a <= b),
                    BinOp::Gt => bool_num(a > b),
                    BinOp::Ge => bool_num(a >= b),
                    BinOp::Eq => bool_num(a == b),
                    BinOp::Ne => bool_num(a != b),
                }
            }
            Expr::Call(func, args) => {
                let x = args[0].eval(value);
                match func {
                    Func::Abs => x.abs(),
                    Func::Floor => x.floor(),
                    Func::Ceil => x.ceil(),
                    Func::Round => x.round(),
                    Func::Trunc => x.trunc(),
                    Func::Sqrt => x.sqrt(),
                    Func::Min => x.min(args[1].eval(value)),
                    Func::Max => x.max(args[1].eval(value)),
                    Func::Clamp => {
                        let lo = args[1].eval(value);
                        let hi = args[2].eval(value);
                        // clamp with inverted bounds would panic; order them
                        if lo <= hi {
                            x.clamp(lo, hi)
                        } else {
                            x.clamp(hi, lo)
                        }
                    }
                }
            }
        }
    }
}

fn bool_num(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// A compiled, reusable transform expression
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    ast: Expr,
    source: String,
}

impl CompiledExpr {
    /// Compile an expression source string
    pub fn compile(source: &str) -> Result<CompiledExpr, ExprError> {
        if source.len() > MAX_EXPR_LEN {
            return Err(ExprError::TooLong);
        }
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let ast = parser.parse_expr(0)?;
        if parser.pos < parser.tokens.len() {
            return Err(ExprError::UnexpectedToken(parser.tokens[parser.pos].describe()));
        }
        Ok(CompiledExpr {
            ast,
            source: source.to_string(),
        })
    }

    /// Evaluate with the given `value` binding
    pub fn eval(&self, value: f64) -> f64 {
        self.ast.eval(value)
    }

    /// The original source string
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Percent => "%".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Lt => "<".to_string(),
            Token::Le => "<=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Ge => ">=".to_string(),
            Token::EqEq => "==".to_string(),
            Token::NotEq => "!=".to_string(),
        }
    }
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('=', i));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(ExprError::UnexpectedChar('!', i));
                }
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedChar(c, start))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Left and right binding powers per infix operator
fn infix_binding_power(token: &Token) -> Option<(u8, u8, BinOp)> {
    Some(match token {
        Token::Lt => (1, 2, BinOp::Lt),
        Token::Le => (1, 2, BinOp::Le),
        Token::Gt => (1, 2, BinOp::Gt),
        Token::Ge => (1, 2, BinOp::Ge),
        Token::EqEq => (1, 2, BinOp::Eq),
        Token::NotEq => (1, 2, BinOp::Ne),
        Token::Plus => (3, 4, BinOp::Add),
        Token::Minus => (3, 4, BinOp::Sub),
        Token::Star => (5, 6, BinOp::Mul),
        Token::Slash => (5, 6, BinOp::Div),
        Token::Percent => (5, 6, BinOp::Rem),
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }

        let mut lhs = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let Some((left_bp, right_bp, op)) = infix_binding_power(token) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(right_bp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        self.depth -= 1;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            self.depth += 1;
            if self.depth > MAX_DEPTH {
                return Err(ExprError::TooDeep);
            }
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if name == "value" {
                    return Ok(Expr::Value);
                }
                let func = Func::from_name(&name).ok_or(ExprError::UnknownIdent(name))?;
                self.expect(Token::LParen)?;
                let mut args = vec![self.parse_expr(0)?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.parse_expr(0)?);
                }
                self.expect(Token::RParen)?;
                if args.len() != func.arity() {
                    return Err(ExprError::WrongArity {
                        func: func.name(),
                        expected: func.arity(),
                        got: args.len(),
                    });
                }
                Ok(Expr::Call(func, args))
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}
