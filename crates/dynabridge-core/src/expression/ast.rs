//! AST for condition, key-condition, filter, update, and projection
//! expressions. Produced by the parser, consumed by the evaluator and the
//! query planner.

use std::fmt;

/// A boolean expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `left op right`.
    Compare {
        /// Left operand.
        left: Box<Operand>,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Box<Operand>,
    },
    /// `value BETWEEN low AND high` (bounds inclusive).
    Between {
        value: Box<Operand>,
        low: Box<Operand>,
        high: Box<Operand>,
    },
    /// `value IN (candidates…)`.
    In {
        value: Box<Operand>,
        list: Vec<Operand>,
    },
    /// `left AND right` / `left OR right`.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `NOT expr`.
    Not(Box<Expr>),
    /// `name(args…)`.
    Function {
        name: FunctionName,
        args: Vec<Operand>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// `AND` / `OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Condition functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// `attribute_exists(path)`.
    AttributeExists,
    /// `attribute_not_exists(path)`; also true on an empty snapshot.
    AttributeNotExists,
    /// `begins_with(path, prefix)`.
    BeginsWith,
    /// `contains(path, operand)`.
    Contains,
    /// `size(path)`; only legal inside a comparison.
    Size,
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AttributeExists => "attribute_exists",
            Self::AttributeNotExists => "attribute_not_exists",
            Self::BeginsWith => "begins_with",
            Self::Contains => "contains",
            Self::Size => "size",
        };
        f.write_str(s)
    }
}

/// A value producer inside an expression.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A document path (`info.rating`, `#name`, `list[0]`).
    Path(AttributePath),
    /// A `:value` placeholder reference (stored without the colon).
    Value(String),
    /// `size(path)` used as a comparison operand.
    Size(AttributePath),
}

/// A document path: one or more dot/index elements.
#[derive(Debug, Clone)]
pub struct AttributePath {
    /// Elements in order; the first is always an attribute name.
    pub elements: Vec<PathElement>,
}

/// One element of a document path.
#[derive(Debug, Clone)]
pub enum PathElement {
    /// Attribute name or `#placeholder` (kept with its `#`).
    Attribute(String),
    /// List index dereference.
    Index(usize),
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.elements.iter().enumerate() {
            match elem {
                PathElement::Attribute(name) if i == 0 => write!(f, "{name}")?,
                PathElement::Attribute(name) => write!(f, ".{name}")?,
                PathElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// A parsed update expression: the four clause kinds in declaration order.
#[derive(Debug, Clone, Default)]
pub struct UpdateExpr {
    /// `SET path = value` assignments.
    pub set_actions: Vec<SetAction>,
    /// `ADD path value` actions (numbers and sets).
    pub add_actions: Vec<AddAction>,
    /// `REMOVE path` targets, including `path[i]`.
    pub remove_paths: Vec<AttributePath>,
    /// `DELETE path value` set-difference actions.
    pub delete_actions: Vec<DeleteAction>,
}

impl UpdateExpr {
    /// True when no clause parsed anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set_actions.is_empty()
            && self.add_actions.is_empty()
            && self.remove_paths.is_empty()
            && self.delete_actions.is_empty()
    }
}

/// One `SET` assignment.
#[derive(Debug, Clone)]
pub struct SetAction {
    /// Target path (may carry a trailing index).
    pub path: AttributePath,
    /// Right-hand side.
    pub value: SetValue,
}

/// The right-hand side of a `SET` assignment.
#[derive(Debug, Clone)]
pub enum SetValue {
    /// Plain operand.
    Operand(Operand),
    /// `a + b` (numeric).
    Plus(Operand, Operand),
    /// `a - b` (numeric).
    Minus(Operand, Operand),
    /// `if_exists(path, operand)`: current value when present, else operand.
    IfExists(AttributePath, Operand),
    /// `if_not_exists(path, operand)`: operand only when path is absent.
    IfNotExists(AttributePath, Operand),
    /// `list_append(a, b)`.
    ListAppend(Operand, Operand),
}

/// One `ADD` action.
#[derive(Debug, Clone)]
pub struct AddAction {
    pub path: AttributePath,
    pub value: Operand,
}

/// One `DELETE` action.
#[derive(Debug, Clone)]
pub struct DeleteAction {
    pub path: AttributePath,
    pub value: Operand,
}
