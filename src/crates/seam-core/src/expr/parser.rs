//! Expression parser
//!
//! Recursive descent with conventional precedence:
//!
//! ```text
//! ||  <  &&  <  == !=  <  < <= > >=  <  + -  <  * / %  <  unary ! -
//! ```
//!
//! References are rooted at `node.<id>`, `variables.<name>`, or
//! `context.<name>`, followed by an optional dot-and-bracket path walk.
//! Function calls are restricted to the fixed whitelist; an unknown name is
//! a compile-time [`FlowError::UndefinedReference`].
//!
//! Recursion depth is capped; running past the cap is a syntax error
//! rather than a stack overflow.

use super::token::{syntax_error, tokenize, Spanned, Token};
use seam_node::error::{FlowError, Result};
use std::collections::BTreeSet;

/// Path step into a mapping or list.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    /// `.field`
    Key(String),
    /// `[N]`
    Index(usize),
}

/// Reference root.
#[derive(Debug, Clone, PartialEq)]
pub enum RefRoot {
    /// `node.<id>` - reads the result map and contributes an implicit edge.
    Node(String),
    /// `variables.<name>` - reads the variable store.
    Variable(String),
    /// `context.<name>` - reads the execution's contextual constants.
    Context(String),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// Whitelisted functions. The set is fixed; there is no user extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Len,
    Contains,
    StartsWith,
    EndsWith,
    Lower,
    Upper,
    Trim,
    Matches,
    ParseInt,
    ParseFloat,
    ToString,
    Now,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Self::Len),
            "contains" => Some(Self::Contains),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "lower" => Some(Self::Lower),
            "upper" => Some(Self::Upper),
            "trim" => Some(Self::Trim),
            "matches" => Some(Self::Matches),
            "parseInt" => Some(Self::ParseInt),
            "parseFloat" => Some(Self::ParseFloat),
            "toString" => Some(Self::ToString),
            "now" => Some(Self::Now),
            _ => None,
        }
    }

    fn arity(&self) -> usize {
        match self {
            Self::Now => 0,
            Self::Len
            | Self::Lower
            | Self::Upper
            | Self::Trim
            | Self::ParseInt
            | Self::ParseFloat
            | Self::ToString => 1,
            Self::Contains | Self::StartsWith | Self::EndsWith | Self::Matches => 2,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// The sole input value of the evaluating node; produced by the
    /// shorthand forms (`">100"`).
    Input,
    Ref(RefRoot, Vec<PathSeg>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

/// Parse a full expression source into an AST.
pub fn parse(source: &str, max_depth: usize) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        max_depth,
    };
    let expr = parser.expression(0)?;
    if let Some(extra) = parser.peek() {
        return Err(syntax_error(
            extra.line,
            extra.col,
            format!("unexpected trailing '{}'", extra.token),
        ));
    }
    Ok(expr)
}

/// Collect the node ids a parsed expression references.
pub fn referenced_nodes(expr: &Expr) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    collect_refs(expr, &mut refs);
    refs
}

fn collect_refs(expr: &Expr, refs: &mut BTreeSet<String>) {
    match expr {
        Expr::Ref(RefRoot::Node(id), _) => {
            refs.insert(id.clone());
        }
        Expr::Unary(_, inner) => collect_refs(inner, refs),
        Expr::Binary(_, lhs, rhs) => {
            collect_refs(lhs, refs);
            collect_refs(rhs, refs);
        }
        Expr::Call(_, args) => {
            for arg in args {
                collect_refs(arg, refs);
            }
        }
        _ => {}
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Spanned> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.bump() {
            Some(s) if &s.token == expected => Ok(()),
            Some(s) => Err(syntax_error(
                s.line,
                s.col,
                format!("expected '{expected}', found '{}'", s.token),
            )),
            None => Err(self.eof(format!("expected '{expected}'"))),
        }
    }

    fn eof(&self, message: impl Into<String>) -> FlowError {
        let (line, col) = self
            .tokens
            .last()
            .map(|s| (s.line, s.col + 1))
            .unwrap_or((1, 1));
        syntax_error(line, col, format!("{} at end of expression", message.into()))
    }

    fn guard_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            let (line, col) = self.peek().map(|s| (s.line, s.col)).unwrap_or((1, 1));
            return Err(syntax_error(
                line,
                col,
                format!("expression nesting exceeds depth limit of {}", self.max_depth),
            ));
        }
        Ok(())
    }

    fn expression(&mut self, depth: usize) -> Result<Expr> {
        self.or(depth)
    }

    fn or(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.and(depth)?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and(depth)?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.equality(depth)?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality(depth)?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.comparison(depth)?;
        loop {
            let op = if self.eat(&Token::EqEq) {
                BinOp::Eq
            } else if self.eat(&Token::NotEq) {
                BinOp::Ne
            } else {
                break;
            };
            let rhs = self.comparison(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.additive(depth)?;
        loop {
            let op = if self.eat(&Token::Le) {
                BinOp::Le
            } else if self.eat(&Token::Lt) {
                BinOp::Lt
            } else if self.eat(&Token::Ge) {
                BinOp::Ge
            } else if self.eat(&Token::Gt) {
                BinOp::Gt
            } else {
                break;
            };
            let rhs = self.additive(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn additive(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.multiplicative(depth)?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.multiplicative(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let mut lhs = self.unary(depth)?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinOp::Mul
            } else if self.eat(&Token::Slash) {
                BinOp::Div
            } else if self.eat(&Token::Percent) {
                BinOp::Rem
            } else {
                break;
            };
            let rhs = self.unary(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        if self.eat(&Token::Bang) {
            let inner = self.unary(depth + 1)?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(inner)));
        }
        if self.eat(&Token::Minus) {
            let inner = self.unary(depth + 1)?;
            return Ok(Expr::Unary(UnOp::Neg, Box::new(inner)));
        }
        self.primary(depth)
    }

    fn primary(&mut self, depth: usize) -> Result<Expr> {
        self.guard_depth(depth)?;
        let spanned = match self.bump() {
            Some(s) => s,
            None => return Err(self.eof("expected a value")),
        };
        match &spanned.token {
            Token::Number(n) => Ok(Expr::Number(*n)),
            Token::Str(s) => Ok(Expr::Str(s.clone())),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::LParen => {
                let inner = self.expression(depth + 1)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "node" | "variables" | "context" => self.reference(name, spanned),
                _ => {
                    if self.peek().map(|s| &s.token) == Some(&Token::LParen) {
                        self.call(name, spanned, depth)
                    } else {
                        Err(FlowError::UndefinedReference {
                            token: name.clone(),
                        })
                    }
                }
            },
            other => Err(syntax_error(
                spanned.line,
                spanned.col,
                format!("unexpected '{other}'"),
            )),
        }
    }

    fn reference(&mut self, root: &str, at: &Spanned) -> Result<Expr> {
        self.expect(&Token::Dot)?;
        let name = match self.bump() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => name.clone(),
            Some(s) => {
                return Err(syntax_error(
                    s.line,
                    s.col,
                    format!("expected a name after '{root}.'"),
                ))
            }
            None => return Err(self.eof(format!("expected a name after '{root}.'"))),
        };
        let path = self.path(at)?;
        let root = match root {
            "node" => RefRoot::Node(name),
            "variables" => RefRoot::Variable(name),
            "context" => RefRoot::Context(name),
            _ => unreachable!("caller matched the root keyword"),
        };
        Ok(Expr::Ref(root, path))
    }

    fn path(&mut self, at: &Spanned) -> Result<Vec<PathSeg>> {
        let mut path = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.bump() {
                    Some(Spanned {
                        token: Token::Ident(key),
                        ..
                    }) => path.push(PathSeg::Key(key.clone())),
                    Some(s) => {
                        return Err(syntax_error(s.line, s.col, "expected a field name after '.'"))
                    }
                    None => return Err(self.eof("expected a field name after '.'")),
                }
            } else if self.eat(&Token::LBracket) {
                match self.bump() {
                    Some(Spanned {
                        token: Token::Number(n),
                        line,
                        col,
                    }) => {
                        if n.fract() != 0.0 || *n < 0.0 {
                            return Err(syntax_error(
                                *line,
                                *col,
                                format!("list index must be a non-negative integer, got {n}"),
                            ));
                        }
                        path.push(PathSeg::Index(*n as usize));
                        self.expect(&Token::RBracket)?;
                    }
                    Some(s) => {
                        return Err(syntax_error(
                            s.line,
                            s.col,
                            format!("expected a list index, found '{}'", s.token),
                        ))
                    }
                    None => {
                        return Err(syntax_error(at.line, at.col, "unterminated index"));
                    }
                }
            } else {
                return Ok(path);
            }
        }
    }

    fn call(&mut self, name: &str, at: &Spanned, depth: usize) -> Result<Expr> {
        let func = Func::from_name(name).ok_or_else(|| FlowError::UndefinedReference {
            token: name.to_string(),
        })?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression(depth + 1)?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen)?;
                break;
            }
        }
        if args.len() != func.arity() {
            return Err(syntax_error(
                at.line,
                at.col,
                format!(
                    "{name}() takes {} argument(s), got {}",
                    func.arity(),
                    args.len()
                ),
            ));
        }
        Ok(Expr::Call(func, args))
    }
}
