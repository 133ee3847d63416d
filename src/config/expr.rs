/*
 * SPDX-FileCopyrightText: 2025 The filsight developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A small interpreter for the `f(x)` option of export-job entries.
//!
//! The accepted grammar is fixed: elementwise arithmetic on the result
//! vector `x` and numeric literals, the reductions `sum(...)` and
//! `mean(...)`, indexing `expr[i]` and slicing `expr[a:b]`, and
//! parentheses. Anything else is rejected when the export definition is
//! planned, long before results are parsed.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("index {index} is out of bounds for a vector of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("operands have mismatching lengths {0} and {1}")]
    LengthMismatch(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reduction {
    Sum,
    Mean,
}

#[derive(Debug, Clone)]
enum Ast {
    Var,
    Num(f64),
    Neg(Box<Ast>),
    Bin(Op, Box<Ast>, Box<Ast>),
    Call(Reduction, Box<Ast>),
    Index(Box<Ast>, usize),
    Slice(Box<Ast>, usize, usize),
}

/// A compiled `f(x)` expression: a pure function from one vector to one
/// vector.
#[derive(Clone)]
pub struct Expr {
    src: String,
    ast: Ast,
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({:?})", self.src)
    }
}

enum Value {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Value {
    fn into_vec(self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![v],
            Value::Array(v) => v,
        }
    }
}

impl Expr {
    /// Compiles an expression, rejecting anything outside the grammar.
    pub fn parse(src: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.expression()?;
        match parser.peek() {
            None => Ok(Self {
                src: src.to_string(),
                ast,
            }),
            Some(tok) => Err(ExprError::UnexpectedToken(tok.to_string())),
        }
    }

    /// The source text the expression was compiled from.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Evaluates the expression for one result vector.
    pub fn eval(&self, x: &[f64]) -> Result<Vec<f64>, ExprError> {
        eval(&self.ast, x).map(Value::into_vec)
    }
}

fn eval(ast: &Ast, x: &[f64]) -> Result<Value, ExprError> {
    Ok(match ast {
        Ast::Var => Value::Array(x.to_vec()),
        Ast::Num(v) => Value::Scalar(*v),
        Ast::Neg(inner) => match eval(inner, x)? {
            Value::Scalar(v) => Value::Scalar(-v),
            Value::Array(v) => Value::Array(v.into_iter().map(|e| -e).collect()),
        },
        Ast::Bin(op, lhs, rhs) => apply(*op, eval(lhs, x)?, eval(rhs, x)?)?,
        Ast::Call(red, inner) => {
            let values = eval(inner, x)?.into_vec();
            let sum: f64 = values.iter().sum();
            Value::Scalar(match red {
                Reduction::Sum => sum,
                Reduction::Mean => {
                    if values.is_empty() {
                        0.0
                    } else {
                        sum / values.len() as f64
                    }
                }
            })
        }
        Ast::Index(inner, index) => {
            let values = eval(inner, x)?.into_vec();
            match values.get(*index) {
                Some(v) => Value::Scalar(*v),
                None => {
                    return Err(ExprError::IndexOutOfBounds {
                        index: *index,
                        len: values.len(),
                    })
                }
            }
        }
        Ast::Slice(inner, start, end) => {
            let values = eval(inner, x)?.into_vec();
            let end = (*end).min(values.len());
            let start = (*start).min(end);
            Value::Array(values[start..end].to_vec())
        }
    })
}

fn apply(op: Op, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    let f = |a: f64, b: f64| match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
    };
    Ok(match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
        (Value::Array(a), Value::Scalar(b)) => {
            Value::Array(a.into_iter().map(|e| f(e, b)).collect())
        }
        (Value::Scalar(a), Value::Array(b)) => {
            Value::Array(b.into_iter().map(|e| f(a, e)).collect())
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(ExprError::LengthMismatch(a.len(), b.len()));
            }
            Value::Array(a.into_iter().zip(b).map(|(e, g)| f(e, g)).collect())
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{}", v),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Colon => write!(f, ":"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '0'..='9' | '.' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        text.push(d);
                        chars.next();
                        // exponent sign
                        if (d == 'e' || d == 'E')
                            && matches!(chars.peek(), Some('+') | Some('-'))
                        {
                            if let Some(sign) = chars.next() {
                                text.push(sign);
                            }
                        }
                    } else {
                        break;
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token.ok_or(ExprError::UnexpectedEnd)
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        let found = self.next()?;
        if found == token {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(found.to_string()))
        }
    }

    fn expression(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Ast::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn factor(&mut self) -> Result<Ast, ExprError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            return Ok(Ast::Neg(Box::new(self.factor()?)));
        }
        let mut node = self.primary()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.pos += 1;
            let start = self.index_value()?;
            if matches!(self.peek(), Some(Token::Colon)) {
                self.pos += 1;
                let end = self.index_value()?;
                self.expect(Token::RBracket)?;
                node = Ast::Slice(Box::new(node), start, end);
            } else {
                self.expect(Token::RBracket)?;
                node = Ast::Index(Box::new(node), start);
            }
        }
        Ok(node)
    }

    fn index_value(&mut self) -> Result<usize, ExprError> {
        match self.next()? {
            Token::Num(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }

    fn primary(&mut self) -> Result<Ast, ExprError> {
        match self.next()? {
            Token::Num(v) => Ok(Ast::Num(v)),
            Token::Ident(name) if name == "x" => Ok(Ast::Var),
            Token::Ident(name) => {
                let reduction = match name.as_str() {
                    "sum" => Reduction::Sum,
                    "mean" => Reduction::Mean,
                    _ => return Err(ExprError::UnknownFunction(name)),
                };
                self.expect(Token::LParen)?;
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(Ast::Call(reduction, Box::new(inner)))
            }
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elementwise_arithmetic() {
        let expr = Expr::parse("2 * x + 1").unwrap();
        assert_eq!(expr.eval(&[0.0, 1.0, 2.0]).unwrap(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn reductions_and_indexing() {
        let expr = Expr::parse("sum(x) / 2").unwrap();
        assert_eq!(expr.eval(&[1.0, 2.0, 3.0]).unwrap(), vec![3.0]);

        let expr = Expr::parse("mean(x[0:2])").unwrap();
        assert_eq!(expr.eval(&[1.0, 3.0, 100.0]).unwrap(), vec![2.0]);

        let expr = Expr::parse("x[1] - x[0]").unwrap();
        assert_eq!(expr.eval(&[1.0, 4.0]).unwrap(), vec![3.0]);
    }

    #[test]
    fn negation_and_parentheses() {
        let expr = Expr::parse("-(x - 1)").unwrap();
        assert_eq!(expr.eval(&[3.0]).unwrap(), vec![-2.0]);
    }

    #[test]
    fn rejects_out_of_grammar_expressions() {
        assert!(Expr::parse("__import__('os')").is_err());
        assert!(Expr::parse("y + 1").is_err());
        assert!(Expr::parse("max(x)").is_err());
        assert!(Expr::parse("x +").is_err());
        assert!(Expr::parse("x; x").is_err());
    }

    #[test]
    fn index_out_of_bounds_is_an_error() {
        let expr = Expr::parse("x[5]").unwrap();
        assert!(matches!(
            expr.eval(&[1.0]),
            Err(ExprError::IndexOutOfBounds { index: 5, len: 1 })
        ));
    }
}
