//! Expression evaluator
//!
//! A small, side-effect-free expression language used by condition, switch,
//! and while-loop nodes to test predicates, and by HTTP templates to
//! interpolate values. Expressions can reference other nodes' outputs
//! (`node.fetch.body.items[0]`), workflow variables (`variables.count`),
//! and contextual constants (`context.execution_id`).
//!
//! Compilation and evaluation are separate: the engine compiles every
//! expression once at graph-build time, harvesting the referenced node ids
//! as implicit graph edges, and evaluates the compiled form as the walk
//! reaches each node.
//!
//! # Grammar
//!
//! ```text
//! literal    := number | 'text' | "text" | true | false | null
//! reference  := node.<id><path> | variables.<name><path> | context.<name><path>
//! path       := ( '.' field | '[' N ']' )*
//! unary      := '!' | '-'
//! binary     := * / %  >  + -  >  < <= > >=  >  == !=  >  &&  >  ||
//! function   := len contains startsWith endsWith lower upper trim
//!               matches parseInt parseFloat toString now
//! ```
//!
//! # Shorthand
//!
//! A bare operator-and-number form (`">100"`, `"<=0"`, `"==5"`) or a bare
//! boolean is recognised before the general grammar and compared against
//! the evaluating node's sole input value:
//!
//! ```rust
//! use seam_core::expr::{compile, Scope};
//! use serde_json::json;
//!
//! let compiled = compile(">100", 64).unwrap();
//! let scope = Scope::default().with_input(json!(42));
//! assert_eq!(compiled.evaluate(&scope).unwrap(), json!(false));
//! ```

mod eval;
mod parser;
mod template;
mod token;

pub use eval::Scope;
pub use parser::{BinOp, Expr, Func, PathSeg, RefRoot, UnOp};
pub use template::Template;

pub(crate) use eval::{as_number, number, stringify, type_name};

use seam_node::error::Result;
use serde_json::Value;
use std::collections::BTreeSet;

/// A compiled expression: the parsed form plus the set of node ids it
/// references (the engine turns those into implicit edges).
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
    refs: BTreeSet<String>,
}

impl CompiledExpr {
    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Node ids referenced via `node.<id>` terms. `variables` and
    /// `context` references do not contribute.
    pub fn referenced_nodes(&self) -> &BTreeSet<String> {
        &self.refs
    }

    /// Evaluate against a scope. Never mutates anything.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        eval::evaluate(&self.ast, scope)
    }
}

/// Compile an expression source. Idempotent: the same source and depth cap
/// always produce the same compiled form.
///
/// The shorthand forms are recognised before the general grammar is
/// attempted.
pub fn compile(source: &str, max_depth: usize) -> Result<CompiledExpr> {
    let ast = match parse_shorthand(source) {
        Some(ast) => ast,
        None => parser::parse(source, max_depth)?,
    };
    let refs = parser::referenced_nodes(&ast);
    Ok(CompiledExpr {
        source: source.to_string(),
        ast,
        refs,
    })
}

/// Recognise the backward-compatible shorthand: `<op><number>` against the
/// sole input, or a bare boolean.
fn parse_shorthand(source: &str) -> Option<Expr> {
    let trimmed = source.trim();
    match trimmed {
        "true" => return Some(Expr::Bool(true)),
        "false" => return Some(Expr::Bool(false)),
        _ => {}
    }

    let (op, rest) = if let Some(rest) = trimmed.strip_prefix("==") {
        (BinOp::Eq, rest)
    } else if let Some(rest) = trimmed.strip_prefix("!=") {
        (BinOp::Ne, rest)
    } else if let Some(rest) = trimmed.strip_prefix("<=") {
        (BinOp::Le, rest)
    } else if let Some(rest) = trimmed.strip_prefix(">=") {
        (BinOp::Ge, rest)
    } else if let Some(rest) = trimmed.strip_prefix('<') {
        (BinOp::Lt, rest)
    } else if let Some(rest) = trimmed.strip_prefix('>') {
        (BinOp::Gt, rest)
    } else {
        return None;
    };

    let literal: f64 = rest.trim().parse().ok()?;
    Some(Expr::Binary(
        op,
        Box::new(Expr::Input),
        Box::new(Expr::Number(literal)),
    ))
}
