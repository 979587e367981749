//! Sandboxed expression sub-language.
//!
//! A hand-written lexer, Pratt parser and tree-walking evaluator over JSON
//! values. Identifiers resolve exclusively through a caller-supplied
//! [`Scope`]; nothing else is reachable, and every evaluation carries a
//! wall-clock budget so a pathological expression cannot stall the record
//! loop.

mod eval;
mod lexer;
mod parser;

pub use eval::truthy;
pub use parser::Node;

use errors::Result;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Default per-call evaluation budget.
pub const DEFAULT_BUDGET: Duration = Duration::from_millis(25);

/// Identifier resolution seam; anything unresolved evaluates to null.
pub trait Scope {
    fn lookup(&self, ident: &str) -> Option<Value>;
}

impl Scope for serde_json::Map<String, Value> {
    fn lookup(&self, ident: &str) -> Option<Value> {
        self.get(ident).cloned()
    }
}

/// A parsed expression, reusable across records.
#[derive(Debug, Clone)]
pub struct Expr {
    node: Node,
    source: String,
}

impl Expr {
    pub fn parse(source: impl AsRef<str>) -> Result<Expr> {
        let source = source.as_ref().to_string();
        let tokens = lexer::lex(&source)?;
        let node = parser::parse(&tokens)?;
        Ok(Expr { node, source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        self.eval_with_budget(scope, DEFAULT_BUDGET)
    }

    pub fn eval_with_budget(&self, scope: &dyn Scope, budget: Duration) -> Result<Value> {
        eval::eval(&self.node, scope, Instant::now() + budget)
    }
}
