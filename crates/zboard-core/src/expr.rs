//! 函数表达式解析与求值
//!
//! 支持：
//! - 数字（整数、小数、科学计数法）
//! - 自变量 `x`
//! - 运算符 `+ - * / ^`（`**` 等同于 `^`，右结合）
//! - 括号与一元负号
//! - 常量 `pi`、`e`
//! - 函数 `sin cos tan asin acos atan sinh cosh tanh exp ln log log10 sqrt abs floor ceil round pow`
//!
//! 求值不报错：定义域外的结果为 NaN，由调用方按不连续点处理。

use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// 表达式错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("parse error at position {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}

fn parse_error(message: impl Into<String>, position: usize) -> ExprError {
    ExprError::Parse {
        message: message.into(),
        position,
    }
}

/// 内置函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Pow,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            // log 为自然对数
            "ln" | "log" => Self::Ln,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "pow" => Self::Pow,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Self::Pow => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        match self {
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Asin => a.asin(),
            Self::Acos => a.acos(),
            Self::Atan => a.atan(),
            Self::Sinh => a.sinh(),
            Self::Cosh => a.cosh(),
            Self::Tanh => a.tanh(),
            Self::Exp => a.exp(),
            Self::Ln => a.ln(),
            Self::Log10 => a.log10(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
            Self::Pow => a.powf(args.get(1).copied().unwrap_or(f64::NAN)),
        }
    }
}

/// 表达式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// 自变量 x
    Var,
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl Expr {
    /// 在 x 处求值
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Var => x,
            Expr::Neg(operand) => -operand.eval(x),
            Expr::Binary { op, left, right } => {
                let l = left.eval(x);
                let r = right.eval(x);
                match op {
                    BinaryOperator::Add => l + r,
                    BinaryOperator::Sub => l - r,
                    BinaryOperator::Mul => l * r,
                    BinaryOperator::Div => l / r,
                    BinaryOperator::Pow => l.powf(r),
                }
            }
            Expr::Call { function, args } => {
                let values: Vec<f64> = args.iter().map(|a| a.eval(x)).collect();
                function.apply(&values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
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

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.position += 1;
        self.chars.next()
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }

        let pos = self.position;
        let Some(&c) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                self.advance();
                if self.chars.peek() == Some(&'*') {
                    self.advance();
                    return Ok(Token::Caret);
                }
                return Ok(Token::Star);
            }
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            c if c.is_ascii_digit() || c == '.' => return self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => {
                return Ok(Token::Identifier(self.read_identifier()))
            }
            _ => return Err(parse_error(format!("unexpected character '{c}'"), pos)),
        };
        self.advance();
        Ok(token)
    }

    fn read_number(&mut self) -> Result<Token, ExprError> {
        let pos = self.position;
        let mut text = String::new();
        let mut has_dot = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || (c == '.' && !has_dot) {
                has_dot |= c == '.';
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // 科学计数法
        if matches!(self.chars.peek(), Some('e' | 'E')) {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            let exponent_follows = match lookahead.next() {
                Some(d) if d.is_ascii_digit() => true,
                Some('+' | '-') => lookahead.next().is_some_and(|d| d.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                text.push('e');
                self.advance();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.advance();
                    }
                }
                while let Some(&d) = self.chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    text.push(d);
                    self.advance();
                }
            }
        }

        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| parse_error(format!("invalid number '{text}'"), pos))
    }

    fn read_identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ExprError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<(), ExprError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExprError> {
        if self.current != token {
            return Err(parse_error(format!("expected {what}"), self.lexer.position));
        }
        self.advance()
    }

    fn parse(&mut self) -> Result<Expr, ExprError> {
        let expr = self.parse_additive()?;
        if self.current != Token::Eof {
            return Err(parse_error(
                format!("unexpected token {:?}", self.current),
                self.lexer.position,
            ));
        }
        Ok(expr)
    }

    // additive: multiplicative (('+' | '-') multiplicative)*
    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    // multiplicative: unary (('*' | '/') unary)*
    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    // unary: '-' unary | '+' unary | power
    // 负号优先级低于乘方：-x^2 = -(x^2)
    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.current {
            Token::Minus => {
                self.advance()?;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.advance()?;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power: primary ('^' unary)?
    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_primary()?;
        if self.current == Token::Caret {
            self.advance()?;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOperator::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Identifier(name) => {
                self.advance()?;
                match name.as_str() {
                    "x" | "X" => Ok(Expr::Var),
                    "pi" | "PI" => Ok(Expr::Number(std::f64::consts::PI)),
                    "e" | "E" => Ok(Expr::Number(std::f64::consts::E)),
                    _ => {
                        let function = Function::lookup(&name)
                            .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
                        self.expect(Token::LParen, "'(' after function name")?;
                        let mut args = vec![self.parse_additive()?];
                        while self.current == Token::Comma {
                            self.advance()?;
                            args.push(self.parse_additive()?);
                        }
                        self.expect(Token::RParen, "')'")?;
                        if args.len() != function.arity() {
                            return Err(ExprError::Arity {
                                name,
                                expected: function.arity(),
                                got: args.len(),
                            });
                        }
                        Ok(Expr::Call { function, args })
                    }
                }
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_additive()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(parse_error(
                format!("unexpected token {other:?}"),
                self.lexer.position,
            )),
        }
    }
}

/// 解析表达式
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    if input.trim().is_empty() {
        return Err(parse_error("empty expression", 0));
    }
    Parser::new(input)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(input: &str, x: f64) -> f64 {
        parse_expression(input).unwrap().eval(x)
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_eq!(eval("2 ** 3", 0.0), 8.0);
        assert_eq!(eval("-x^2", 3.0), -9.0);
        assert_eq!(eval("10 - 4 - 3", 0.0), 3.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_relative_eq!(eval("sin(pi / 2)", 0.0), 1.0);
        assert_relative_eq!(eval("ln(e)", 0.0), 1.0);
        assert_relative_eq!(eval("log(e^2)", 0.0), 2.0);
        assert_relative_eq!(eval("log10(1000)", 0.0), 3.0);
        assert_relative_eq!(eval("pow(x, 3)", 2.0), 8.0);
        assert_relative_eq!(eval("1.5e-3 * 1000", 0.0), 1.5);
        assert_eq!(eval("abs(floor(x))", -1.5), 2.0);
    }

    #[test]
    fn test_domain_errors_are_nan() {
        assert!(eval("sqrt(x)", -1.0).is_nan());
        assert!(eval("1 / x", 0.0).is_infinite());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_expression(""), Err(ExprError::Parse { .. })));
        assert!(matches!(parse_expression("(1 + 2"), Err(ExprError::Parse { .. })));
        assert!(matches!(parse_expression("1 $ 2"), Err(ExprError::Parse { .. })));
        assert_eq!(
            parse_expression("foo(x)"),
            Err(ExprError::UnknownFunction("foo".into()))
        );
        assert!(matches!(parse_expression("pow(x)"), Err(ExprError::Arity { .. })));
    }
}
