//! Evaluation of parsed expressions against an item snapshot.
//!
//! [`EvalContext`] binds an item to its `#name`/`:value` maps and can
//! evaluate conditions to booleans, apply update expressions, and project
//! attributes. Update application follows a fixed clause order (SET, then
//! ADD, then REMOVE, then DELETE) over a copy of the pre-image.

use std::collections::HashMap;

use dynabridge_model::{AttributeValue, Item};

use super::ast::{
    AddAction, AttributePath, CompareOp, DeleteAction, Expr, FunctionName, LogicalOp, Operand,
    PathElement, SetAction, SetValue, UpdateExpr,
};
use super::parser::ExpressionError;

/// Binds an item snapshot to its expression placeholder maps.
#[derive(Debug)]
pub struct EvalContext<'a> {
    /// The item under evaluation (possibly empty: no row yet).
    pub item: &'a Item,
    /// `#name` → column substitutions.
    pub names: &'a HashMap<String, String>,
    /// `:value` → attribute substitutions.
    pub values: &'a HashMap<String, AttributeValue>,
}

// ---------------------------------------------------------------------------
// Condition evaluation
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Evaluate a condition expression to a boolean.
    pub fn evaluate(&self, expr: &Expr) -> Result<bool, ExpressionError> {
        match expr {
            Expr::Compare { left, op, right } => self.eval_compare(left, *op, right),
            Expr::Between { value, low, high } => self.eval_between(value, low, high),
            Expr::In { value, list } => self.eval_in(value, list),
            Expr::Logical { op, left, right } => match op {
                LogicalOp::And => Ok(self.evaluate(left)? && self.evaluate(right)?),
                LogicalOp::Or => Ok(self.evaluate(left)? || self.evaluate(right)?),
            },
            Expr::Not(inner) => Ok(!self.evaluate(inner)?),
            Expr::Function { name, args } => self.eval_function(*name, args),
        }
    }

    fn eval_compare(
        &self,
        left: &Operand,
        op: CompareOp,
        right: &Operand,
    ) -> Result<bool, ExpressionError> {
        let lval = self.resolve_operand(left)?;
        let rval = self.resolve_operand(right)?;

        let (Some(lv), Some(rv)) = (&lval, &rval) else {
            // A missing attribute matches nothing; `<>` against anything is
            // vacuously true.
            return Ok(matches!(op, CompareOp::Ne));
        };

        if is_ordering(op) {
            validate_orderable(left, lv, op)?;
            validate_orderable(right, rv, op)?;
        }

        compare_values(lv, rv, op)
    }

    fn eval_between(
        &self,
        value: &Operand,
        low: &Operand,
        high: &Operand,
    ) -> Result<bool, ExpressionError> {
        let v = self.resolve_operand(value)?;
        let lo = self.resolve_operand(low)?;
        let hi = self.resolve_operand(high)?;

        let (Some(v), Some(lo), Some(hi)) = (&v, &lo, &hi) else {
            return Ok(false);
        };

        validate_orderable(value, v, CompareOp::Ge)?;
        validate_orderable(low, lo, CompareOp::Ge)?;
        validate_orderable(high, hi, CompareOp::Le)?;

        if is_constant(low) && is_constant(high) {
            if std::mem::discriminant(lo) != std::mem::discriminant(hi) {
                return Err(ExpressionError::TypeMismatch {
                    message: "BETWEEN bounds must share a type".to_owned(),
                });
            }
            if compare_values(lo, hi, CompareOp::Gt)? {
                return Err(ExpressionError::TypeMismatch {
                    message: "BETWEEN bounds are in the wrong order".to_owned(),
                });
            }
        }

        Ok(compare_values(v, lo, CompareOp::Ge)? && compare_values(v, hi, CompareOp::Le)?)
    }

    fn eval_in(&self, value: &Operand, list: &[Operand]) -> Result<bool, ExpressionError> {
        let Some(v) = self.resolve_operand(value)? else {
            return Ok(false);
        };
        for candidate in list {
            if let Some(cv) = self.resolve_operand(candidate)? {
                if compare_values(&v, &cv, CompareOp::Eq)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn eval_function(&self, name: FunctionName, args: &[Operand]) -> Result<bool, ExpressionError> {
        match name {
            FunctionName::AttributeExists => {
                let path = operand_as_path(&args[0], "attribute_exists")?;
                Ok(self.resolve_path(path).is_some())
            }
            FunctionName::AttributeNotExists => {
                // Also true when the snapshot is empty (no row yet).
                let path = operand_as_path(&args[0], "attribute_not_exists")?;
                Ok(self.resolve_path(path).is_none())
            }
            FunctionName::BeginsWith => {
                let lval = self.resolve_operand(&args[0])?;
                let rval = self.resolve_operand(&args[1])?;
                for (operand, resolved) in [(&args[0], &lval), (&args[1], &rval)] {
                    if let Some(v) = resolved {
                        if is_constant(operand)
                            && !matches!(v, AttributeValue::S(_) | AttributeValue::B(_))
                        {
                            return Err(ExpressionError::InvalidOperand {
                                operation: "begins_with".to_owned(),
                                message: format!("operand type {} not allowed", v.type_code()),
                            });
                        }
                    }
                }
                match (&lval, &rval) {
                    (Some(AttributeValue::S(s)), Some(AttributeValue::S(prefix))) => {
                        Ok(s.starts_with(prefix.as_str()))
                    }
                    (Some(AttributeValue::B(b)), Some(AttributeValue::B(prefix))) => {
                        Ok(b.starts_with(prefix.as_ref()))
                    }
                    _ => Ok(false),
                }
            }
            FunctionName::Contains => self.eval_contains(args),
            FunctionName::Size => Err(ExpressionError::InvalidOperand {
                operation: "condition".to_owned(),
                message: "size() must appear inside a comparison".to_owned(),
            }),
        }
    }

    fn eval_contains(&self, args: &[Operand]) -> Result<bool, ExpressionError> {
        let path = operand_as_path(&args[0], "contains")?;
        let Some(attr) = self.resolve_path(path) else {
            return Ok(false);
        };
        let Some(search) = self.resolve_operand(&args[1])? else {
            return Ok(false);
        };
        Ok(match (attr, &search) {
            (AttributeValue::S(s), AttributeValue::S(sub)) => s.contains(sub.as_str()),
            (AttributeValue::B(b), AttributeValue::B(sub)) => {
                !sub.is_empty() && b.windows(sub.len()).any(|w| w == sub.as_ref())
            }
            (AttributeValue::Ss(set), AttributeValue::S(v))
            | (AttributeValue::Ns(set), AttributeValue::N(v)) => set.contains(v),
            (AttributeValue::Bs(set), AttributeValue::B(v)) => set.contains(v),
            (AttributeValue::L(list), _) => list.contains(&search),
            _ => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Operand & path resolution
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Resolve an operand to a concrete value, if one exists.
    pub fn resolve_operand(
        &self,
        operand: &Operand,
    ) -> Result<Option<AttributeValue>, ExpressionError> {
        match operand {
            Operand::Path(path) => Ok(self.resolve_path(path).cloned()),
            Operand::Value(name) => {
                let key = format!(":{name}");
                self.values.get(&key).cloned().map(Some).ok_or_else(|| {
                    ExpressionError::UnresolvedValue { name: key.clone() }
                })
            }
            Operand::Size(path) => match self.resolve_path(path) {
                Some(v) => match attribute_size(v) {
                    Some(size) => Ok(Some(AttributeValue::N(size.to_string()))),
                    // size() is undefined for numbers/booleans/null coming
                    // from the item: the comparison simply fails to match.
                    None => Ok(None),
                },
                None => Ok(None),
            },
        }
    }

    /// Walk a document path against the item, resolving `#name` segments.
    #[must_use]
    pub fn resolve_path(&self, path: &AttributePath) -> Option<&AttributeValue> {
        let mut current: Option<&AttributeValue> = None;
        for (i, element) in path.elements.iter().enumerate() {
            match element {
                PathElement::Attribute(name) => {
                    let resolved = self.resolve_segment(name)?;
                    current = if i == 0 {
                        self.item.get(resolved.as_ref())
                    } else {
                        current?.as_m()?.get(resolved.as_ref())
                    };
                }
                PathElement::Index(idx) => {
                    current = current?.as_l()?.get(*idx);
                }
            }
        }
        current
    }

    fn resolve_segment<'s>(&'s self, name: &'s str) -> Option<std::borrow::Cow<'s, str>> {
        if name.starts_with('#') {
            self.names
                .get(name)
                .map(|s| std::borrow::Cow::Borrowed(s.as_str()))
        } else {
            Some(std::borrow::Cow::Borrowed(name))
        }
    }

    fn top_level_name(&self, path: &AttributePath) -> Result<String, ExpressionError> {
        let Some(PathElement::Attribute(name)) = path.elements.first() else {
            return Err(ExpressionError::InvalidOperand {
                operation: "path".to_owned(),
                message: "a path must start with an attribute name".to_owned(),
            });
        };
        if name.starts_with('#') {
            self.names
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnresolvedName { name: name.clone() })
        } else {
            Ok(name.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Update application
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Apply an update expression, returning the post-image.
    ///
    /// Clause order is fixed: SET, then ADD, then REMOVE, then DELETE.
    pub fn apply_update(&self, update: &UpdateExpr) -> Result<Item, ExpressionError> {
        let mut result = self.item.clone();

        for action in &update.set_actions {
            self.apply_set(&mut result, action)?;
        }
        for action in &update.add_actions {
            self.apply_add(&mut result, action)?;
        }
        for path in &update.remove_paths {
            self.apply_remove(&mut result, path)?;
        }
        for action in &update.delete_actions {
            self.apply_delete(&mut result, action)?;
        }

        Ok(result)
    }

    fn apply_set(&self, item: &mut Item, action: &SetAction) -> Result<(), ExpressionError> {
        // `if_exists` on an absent attribute skips the assignment entirely.
        let Some(value) = self.resolve_set_value(&action.value)? else {
            return Ok(());
        };
        self.set_at_path(item, &action.path, value)
    }

    fn resolve_set_value(
        &self,
        value: &SetValue,
    ) -> Result<Option<AttributeValue>, ExpressionError> {
        match value {
            SetValue::Operand(op) => self.required_operand(op, "SET").map(Some),
            SetValue::Plus(a, b) => {
                let av = self.required_operand(a, "SET")?;
                let bv = self.required_operand(b, "SET")?;
                numeric_arithmetic(&av, &bv, true).map(Some)
            }
            SetValue::Minus(a, b) => {
                let av = self.required_operand(a, "SET")?;
                let bv = self.required_operand(b, "SET")?;
                numeric_arithmetic(&av, &bv, false).map(Some)
            }
            // The guarded forms: `if_exists` writes the operand only when
            // the attribute is present, `if_not_exists` only when absent
            // (keeping the current value otherwise).
            SetValue::IfExists(path, operand) => {
                if self.resolve_path(path).is_some() {
                    self.required_operand(operand, "if_exists").map(Some)
                } else {
                    Ok(None)
                }
            }
            SetValue::IfNotExists(path, operand) => match self.resolve_path(path) {
                Some(existing) => Ok(Some(existing.clone())),
                None => self.required_operand(operand, "if_not_exists").map(Some),
            },
            SetValue::ListAppend(a, b) => {
                let av = self.required_operand(a, "list_append")?;
                let bv = self.required_operand(b, "list_append")?;
                match (av, bv) {
                    (AttributeValue::L(mut head), AttributeValue::L(tail)) => {
                        head.extend(tail);
                        Ok(Some(AttributeValue::L(head)))
                    }
                    _ => Err(ExpressionError::TypeMismatch {
                        message: "list_append requires two lists".to_owned(),
                    }),
                }
            }
        }
    }

    fn required_operand(
        &self,
        operand: &Operand,
        operation: &str,
    ) -> Result<AttributeValue, ExpressionError> {
        self.resolve_operand(operand)?
            .ok_or_else(|| ExpressionError::InvalidOperand {
                operation: operation.to_owned(),
                message: "operand resolved to nothing".to_owned(),
            })
    }

    fn apply_add(&self, item: &mut Item, action: &AddAction) -> Result<(), ExpressionError> {
        let add_val = self.required_operand(&action.value, "ADD")?;

        if !matches!(
            add_val,
            AttributeValue::N(_)
                | AttributeValue::Ss(_)
                | AttributeValue::Ns(_)
                | AttributeValue::Bs(_)
        ) {
            return Err(ExpressionError::InvalidOperand {
                operation: "ADD".to_owned(),
                message: format!("operand type {} not allowed", add_val.type_code()),
            });
        }

        let existing = self.resolve_path(&action.path).cloned();
        let merged = match (&add_val, existing) {
            // Numeric increment, starting from 0 when absent.
            (AttributeValue::N(_), Some(ref current @ AttributeValue::N(_))) => {
                numeric_arithmetic(current, &add_val, true)?
            }
            (AttributeValue::Ss(incoming), Some(AttributeValue::Ss(current))) => {
                AttributeValue::Ss(union_set(&current, incoming))
            }
            (AttributeValue::Ns(incoming), Some(AttributeValue::Ns(current))) => {
                AttributeValue::Ns(union_set(&current, incoming))
            }
            (AttributeValue::Bs(incoming), Some(AttributeValue::Bs(current))) => {
                AttributeValue::Bs(union_set(&current, incoming))
            }
            (_, None) => add_val.clone(),
            (_, Some(_)) => {
                return Err(ExpressionError::TypeMismatch {
                    message: "ADD operand type does not match the stored attribute".to_owned(),
                });
            }
        };

        self.set_at_path(item, &action.path, merged)
    }

    fn apply_remove(&self, item: &mut Item, path: &AttributePath) -> Result<(), ExpressionError> {
        let top = self.top_level_name(path)?;

        if path.elements.len() == 1 {
            item.remove(&top);
            return Ok(());
        }

        if let Some(container) = item.get_mut(&top) {
            self.remove_in_container(container, &path.elements[1..]);
        }
        Ok(())
    }

    fn remove_in_container(&self, container: &mut AttributeValue, remaining: &[PathElement]) {
        if remaining.len() == 1 {
            match &remaining[0] {
                PathElement::Attribute(name) => {
                    if let (AttributeValue::M(map), Some(resolved)) =
                        (container, self.resolve_segment(name))
                    {
                        map.remove(resolved.as_ref());
                    }
                }
                PathElement::Index(idx) => {
                    // List removal preserves the order of the survivors.
                    if let AttributeValue::L(list) = container {
                        if *idx < list.len() {
                            list.remove(*idx);
                        }
                    }
                }
            }
            return;
        }

        match &remaining[0] {
            PathElement::Attribute(name) => {
                let Some(resolved) = self.resolve_segment(name).map(|c| c.into_owned()) else {
                    return;
                };
                if let AttributeValue::M(map) = container {
                    if let Some(child) = map.get_mut(&resolved) {
                        self.remove_in_container(child, &remaining[1..]);
                    }
                }
            }
            PathElement::Index(idx) => {
                if let AttributeValue::L(list) = container {
                    if let Some(child) = list.get_mut(*idx) {
                        self.remove_in_container(child, &remaining[1..]);
                    }
                }
            }
        }
    }

    fn apply_delete(&self, item: &mut Item, action: &DeleteAction) -> Result<(), ExpressionError> {
        let del_val = self.required_operand(&action.value, "DELETE")?;
        if !del_val.is_set() {
            return Err(ExpressionError::InvalidOperand {
                operation: "DELETE".to_owned(),
                message: format!("operand type {} not allowed", del_val.type_code()),
            });
        }

        let top = self.top_level_name(&action.path)?;
        let Some(existing) = item.get(&top) else {
            // Deleting from an absent attribute is a no-op.
            return Ok(());
        };

        let remaining = match (&del_val, existing) {
            (AttributeValue::Ss(remove), AttributeValue::Ss(current)) => {
                let kept: Vec<String> = current
                    .iter()
                    .filter(|v| !remove.contains(v))
                    .cloned()
                    .collect();
                AttributeValue::Ss(kept)
            }
            (AttributeValue::Ns(remove), AttributeValue::Ns(current)) => {
                let kept: Vec<String> = current
                    .iter()
                    .filter(|v| !remove.contains(v))
                    .cloned()
                    .collect();
                AttributeValue::Ns(kept)
            }
            (AttributeValue::Bs(remove), AttributeValue::Bs(current)) => {
                let kept: Vec<bytes::Bytes> = current
                    .iter()
                    .filter(|v| !remove.contains(v))
                    .cloned()
                    .collect();
                AttributeValue::Bs(kept)
            }
            _ => {
                return Err(ExpressionError::TypeMismatch {
                    message: "DELETE operand type does not match the stored set".to_owned(),
                });
            }
        };

        let emptied = match &remaining {
            AttributeValue::Ss(v) | AttributeValue::Ns(v) => v.is_empty(),
            AttributeValue::Bs(v) => v.is_empty(),
            _ => false,
        };
        if emptied {
            item.remove(&top);
        } else {
            item.insert(top, remaining);
        }
        Ok(())
    }

    /// Write a value at a path, creating intermediate maps as needed.
    ///
    /// Indexed list targets are tolerant: an in-range index replaces the
    /// element, an index at or past the current length appends at the end.
    fn set_at_path(
        &self,
        item: &mut Item,
        path: &AttributePath,
        value: AttributeValue,
    ) -> Result<(), ExpressionError> {
        let top = self.top_level_name(path)?;

        if path.elements.len() == 1 {
            item.insert(top, value);
            return Ok(());
        }

        let container = item
            .entry(top)
            .or_insert_with(|| AttributeValue::M(HashMap::new()));
        self.set_in_container(container, &path.elements[1..], value);
        Ok(())
    }

    fn set_in_container(
        &self,
        container: &mut AttributeValue,
        remaining: &[PathElement],
        value: AttributeValue,
    ) {
        match &remaining[0] {
            PathElement::Attribute(name) => {
                let Some(resolved) = self.resolve_segment(name).map(|c| c.into_owned()) else {
                    return;
                };
                let AttributeValue::M(map) = container else {
                    return;
                };
                if remaining.len() == 1 {
                    map.insert(resolved, value);
                } else {
                    let child = map
                        .entry(resolved)
                        .or_insert_with(|| AttributeValue::M(HashMap::new()));
                    self.set_in_container(child, &remaining[1..], value);
                }
            }
            PathElement::Index(idx) => {
                let AttributeValue::L(list) = container else {
                    return;
                };
                if remaining.len() == 1 {
                    if *idx < list.len() {
                        list[*idx] = value;
                    } else {
                        list.push(value);
                    }
                } else if let Some(child) = list.get_mut(*idx) {
                    self.set_in_container(child, &remaining[1..], value);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

impl EvalContext<'_> {
    /// Project the item down to the requested paths, rebuilding nested
    /// structure for dotted paths. Unresolvable paths are dropped.
    #[must_use]
    pub fn apply_projection(&self, paths: &[AttributePath]) -> Item {
        let mut result = Item::new();
        for path in paths {
            let Some(value) = self.resolve_path(path) else {
                continue;
            };
            let Ok(top) = self.top_level_name(path) else {
                continue;
            };
            if path.elements.len() == 1 {
                result.insert(top, value.clone());
            } else {
                let entry = result
                    .entry(top)
                    .or_insert_with(|| AttributeValue::M(HashMap::new()));
                self.set_in_container(entry, &path.elements[1..], value.clone());
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Value comparison
// ---------------------------------------------------------------------------

fn is_ordering(op: CompareOp) -> bool {
    matches!(
        op,
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
    )
}

/// A query constant (`:value` or `size()`) as opposed to an item path.
fn is_constant(operand: &Operand) -> bool {
    matches!(operand, Operand::Value(_) | Operand::Size(_))
}

/// Ordering is defined for strings, numbers, bytes, and booleans. A query
/// constant of any other type is a validation error; an item attribute of
/// another type simply fails to match.
fn validate_orderable(
    operand: &Operand,
    value: &AttributeValue,
    op: CompareOp,
) -> Result<(), ExpressionError> {
    let unorderable = matches!(
        value,
        AttributeValue::L(_)
            | AttributeValue::M(_)
            | AttributeValue::Ss(_)
            | AttributeValue::Ns(_)
            | AttributeValue::Bs(_)
            | AttributeValue::Null(_)
    );
    if unorderable && is_constant(operand) {
        return Err(ExpressionError::InvalidOperand {
            operation: op.to_string(),
            message: format!("operand type {} not allowed", value.type_code()),
        });
    }
    Ok(())
}

/// Type-aware comparison. Equality is defined for every type (sets compare
/// order-free, maps and lists deeply); ordering only for S, N, B, BOOL.
pub fn compare_values(
    left: &AttributeValue,
    right: &AttributeValue,
    op: CompareOp,
) -> Result<bool, ExpressionError> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            let fa = parse_num(a)?;
            let fb = parse_num(b)?;
            Ok(match op {
                CompareOp::Eq => (fa - fb).abs() < f64::EPSILON,
                CompareOp::Ne => (fa - fb).abs() >= f64::EPSILON,
                CompareOp::Lt => fa < fb,
                CompareOp::Le => fa <= fb,
                CompareOp::Gt => fa > fb,
                CompareOp::Ge => fa >= fb,
            })
        }
        (AttributeValue::B(a), AttributeValue::B(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Ok(compare_ord(a, b, op)),
        (AttributeValue::Null(true), AttributeValue::Null(true)) => {
            Ok(matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Ge))
        }
        (AttributeValue::Ss(a), AttributeValue::Ss(b))
        | (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            Ok(equality_only(sets_equal(a, b), op))
        }
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => Ok(equality_only(sets_equal(a, b), op)),
        (AttributeValue::L(a), AttributeValue::L(b)) => {
            let eq = a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| compare_values(x, y, CompareOp::Eq).unwrap_or(false));
            Ok(equality_only(eq, op))
        }
        (AttributeValue::M(a), AttributeValue::M(b)) => {
            let eq = a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.get(k)
                        .is_some_and(|bv| compare_values(v, bv, CompareOp::Eq).unwrap_or(false))
                });
            Ok(equality_only(eq, op))
        }
        // Cross-type: equal never, not-equal always, ordering never.
        _ => Ok(matches!(op, CompareOp::Ne)),
    }
}

fn compare_ord<T: Ord + ?Sized>(a: &T, b: &T, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn equality_only(eq: bool, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => eq,
        CompareOp::Ne => !eq,
        CompareOp::Le | CompareOp::Ge => eq,
        CompareOp::Lt | CompareOp::Gt => false,
    }
}

fn sets_equal<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().all(|item| b.contains(item))
}

fn parse_num(text: &str) -> Result<f64, ExpressionError> {
    text.parse::<f64>()
        .map_err(|_| ExpressionError::TypeMismatch {
            message: format!("'{text}' is not a valid number"),
        })
}

/// Add or subtract two `N` values, rejecting non-finite results.
fn numeric_arithmetic(
    a: &AttributeValue,
    b: &AttributeValue,
    add: bool,
) -> Result<AttributeValue, ExpressionError> {
    let (AttributeValue::N(na), AttributeValue::N(nb)) = (a, b) else {
        return Err(ExpressionError::TypeMismatch {
            message: "arithmetic requires number operands".to_owned(),
        });
    };
    let fa = parse_num(na)?;
    let fb = parse_num(nb)?;
    let result = if add { fa + fb } else { fa - fb };
    if !result.is_finite() {
        return Err(ExpressionError::NonFiniteResult);
    }
    Ok(AttributeValue::N(format_num(result)))
}

fn format_num(value: f64) -> String {
    #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Element/byte count per type; `None` for numbers, booleans, and null.
fn attribute_size(value: &AttributeValue) -> Option<usize> {
    match value {
        AttributeValue::S(s) => Some(s.len()),
        AttributeValue::B(b) => Some(b.len()),
        AttributeValue::Ss(v) | AttributeValue::Ns(v) => Some(v.len()),
        AttributeValue::Bs(v) => Some(v.len()),
        AttributeValue::L(v) => Some(v.len()),
        AttributeValue::M(m) => Some(m.len()),
        AttributeValue::N(_) | AttributeValue::Bool(_) | AttributeValue::Null(_) => None,
    }
}

fn union_set<T: PartialEq + Clone>(current: &[T], incoming: &[T]) -> Vec<T> {
    let mut merged = current.to_vec();
    for item in incoming {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

fn operand_as_path<'o>(
    operand: &'o Operand,
    function: &str,
) -> Result<&'o AttributePath, ExpressionError> {
    match operand {
        Operand::Path(path) => Ok(path),
        _ => Err(ExpressionError::InvalidOperand {
            operation: function.to_owned(),
            message: "argument must be an attribute path".to_owned(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
