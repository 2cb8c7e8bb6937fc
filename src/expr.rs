//! Compiled expression wrapper.
//!
//! Rules are authored as `evalexpr` arithmetic/logical expressions over named
//! values ("channels" and other rules' outputs). This module wraps the
//! compiled operator tree behind a deliberately narrow contract:
//!
//! - the set of names an expression references is known up front, and
//! - evaluation is a pure function of an explicit name→value map.
//!
//! No parameter bindings are retained between calls: every evaluation builds
//! its context from scratch. That keeps passes and rules decoupled — a rule's
//! result can never depend on which rule happened to evaluate before it.

use crate::{MimikaError, Result};
use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value, build_operator_tree};
use std::collections::{BTreeSet, HashMap};

/// A compiled expression and the names it references.
#[derive(Debug, Clone)]
pub struct Expression {
    tree: Node,
    references: BTreeSet<String>,
}

impl Expression {
    /// Compile `text` into an operator tree.
    ///
    /// The referenced variable identifiers are extracted once here, so the
    /// resolver can test "are all dependencies bound?" without evaluating.
    pub fn compile(text: &str) -> Result<Self> {
        let tree = build_operator_tree(text).map_err(|e| MimikaError::ExpressionSyntax(e.to_string()))?;
        let references: BTreeSet<String> = tree.iter_variable_identifiers().map(str::to_string).collect();
        Ok(Expression { tree, references })
    }

    /// Names this expression reads (raw channels or other rules' outputs).
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    /// Evaluate against `values`, producing an `f64`.
    ///
    /// Boolean results are coerced to `1.0`/`0.0` so purely logical rules
    /// (e.g. `HeadRotZ > 10`) produce a usable parameter value. Only the
    /// referenced names are bound into the context.
    pub fn eval(&self, values: &HashMap<String, f64>) -> Result<f64> {
        let mut ctx = HashMapContext::new();
        for name in &self.references {
            if let Some(v) = values.get(name) {
                ctx.set_value(name.clone(), Value::Float(*v)).map_err(|e| MimikaError::Evaluation(e.to_string()))?;
            }
        }

        match self.tree.eval_with_context(&ctx) {
            Ok(Value::Float(f)) => Ok(f),
            Ok(Value::Int(i)) => Ok(i as f64),
            Ok(Value::Boolean(b)) => Ok(if b { 1.0 } else { 0.0 }),
            Ok(other) => Err(MimikaError::Evaluation(format!("non-numeric result: {other:?}"))),
            Err(e) => Err(MimikaError::Evaluation(e.to_string())),
        }
    }
}
