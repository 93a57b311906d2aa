//! The expression language: lexing, parsing, and evaluation of condition,
//! key-condition, filter, update, and projection expressions.
//!
//! Pipeline: tokenize → recursive-descent parse into the AST → evaluate
//! against an item snapshot (or lower into SQL, for the query planner).

pub mod ast;
pub mod evaluator;
pub mod parser;

use std::collections::HashMap;

use dynabridge_model::{AttributeValue, Item};

pub use ast::{AttributePath, Expr, Operand, PathElement, UpdateExpr};
pub use evaluator::EvalContext;
pub use parser::{ExpressionError, parse_condition, parse_projection, parse_update};

/// A condition compiled for execution inside a transaction: the parsed
/// tree, its placeholder bindings, and the set of top-level columns it
/// reads (which bounds the transactional read).
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    /// Parsed condition tree.
    pub expr: Expr,
    /// `#name` substitutions captured at compile time.
    pub names: HashMap<String, String>,
    /// `:value` bindings captured at compile time.
    pub values: HashMap<String, AttributeValue>,
    /// Resolved top-level column names the condition references.
    pub columns: Vec<String>,
}

impl CompiledCondition {
    /// Parse and compile a condition expression.
    pub fn compile(
        expression: &str,
        names: &HashMap<String, String>,
        values: &HashMap<String, AttributeValue>,
    ) -> Result<Self, ExpressionError> {
        let expr = parse_condition(expression)?;
        let mut columns = Vec::new();
        collect_columns(&expr, names, &mut columns);
        Ok(Self {
            expr,
            names: names.clone(),
            values: values.clone(),
            columns,
        })
    }

    /// Evaluate the condition against a row snapshot.
    pub fn evaluate(&self, item: &Item) -> Result<bool, ExpressionError> {
        let ctx = EvalContext {
            item,
            names: &self.names,
            values: &self.values,
        };
        ctx.evaluate(&self.expr)
    }
}

/// Resolve the top-level column of a path through the name map; `#name`
/// placeholders without a mapping are kept verbatim (the evaluator will
/// fail on them with a precise error).
fn path_column(path: &AttributePath, names: &HashMap<String, String>) -> Option<String> {
    match path.elements.first()? {
        PathElement::Attribute(name) => {
            if name.starts_with('#') {
                Some(names.get(name).cloned().unwrap_or_else(|| name.clone()))
            } else {
                Some(name.clone())
            }
        }
        PathElement::Index(_) => None,
    }
}

fn collect_operand(operand: &Operand, names: &HashMap<String, String>, out: &mut Vec<String>) {
    match operand {
        Operand::Path(path) | Operand::Size(path) => {
            if let Some(column) = path_column(path, names) {
                if !out.contains(&column) {
                    out.push(column);
                }
            }
        }
        Operand::Value(_) => {}
    }
}

fn collect_columns(expr: &Expr, names: &HashMap<String, String>, out: &mut Vec<String>) {
    match expr {
        Expr::Compare { left, right, .. } => {
            collect_operand(left, names, out);
            collect_operand(right, names, out);
        }
        Expr::Between { value, low, high } => {
            collect_operand(value, names, out);
            collect_operand(low, names, out);
            collect_operand(high, names, out);
        }
        Expr::In { value, list } => {
            collect_operand(value, names, out);
            for candidate in list {
                collect_operand(candidate, names, out);
            }
        }
        Expr::Logical { left, right, .. } => {
            collect_columns(left, names, out);
            collect_columns(right, names, out);
        }
        Expr::Not(inner) => collect_columns(inner, names, out),
        Expr::Function { args, .. } => {
            for arg in args {
                collect_operand(arg, names, out);
            }
        }
    }
}
