//! `ExecuteStatement`: a PartiQL subset translated onto the engine.
//!
//! Supported statement shapes, all single-table, with `?` positional
//! parameters and quoted or numeric literals:
//!
//! ```text
//! SELECT * | col, col FROM table [WHERE cond [AND cond]…] [LIMIT n]
//! INSERT INTO table VALUE {'col': ?, 'col': 'literal'}
//! UPDATE table SET col = ? [, col = ?]… WHERE col = ? [AND col = ?]…
//! DELETE FROM table WHERE col = ? [AND col = ?]…
//! ```
//!
//! SELECT conditions allow the six comparators; UPDATE/DELETE WHERE
//! clauses must be equalities covering the primary key.

use std::collections::HashMap;

use dynabridge_model::input::{
    DeleteItemInput, ExecuteStatementInput, PutItemInput, ScanInput, UpdateItemInput,
};
use dynabridge_model::output::ExecuteStatementOutput;
use dynabridge_model::{AdapterError, AttributeValue, Item};

use crate::engine::Engine;

/// Execute a PartiQL statement.
pub async fn execute_statement(
    engine: &Engine,
    input: ExecuteStatementInput,
) -> Result<ExecuteStatementOutput, AdapterError> {
    let tokens = tokenize(&input.statement)?;
    let mut params = input.parameters.clone().into_iter();
    let mut cursor = Cursor {
        tokens: &tokens,
        pos: 0,
        params: &mut params,
    };

    match cursor.peek_keyword().as_deref() {
        Some("SELECT") => execute_select(engine, &mut cursor, &input).await,
        Some("INSERT") => execute_insert(engine, &mut cursor).await,
        Some("UPDATE") => execute_update(engine, &mut cursor).await,
        Some("DELETE") => execute_delete(engine, &mut cursor).await,
        _ => Err(AdapterError::validation(
            "statement must start with SELECT, INSERT, UPDATE, or DELETE",
        )),
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare identifier or keyword.
    Word(String),
    /// `'…'` string literal.
    Str(String),
    /// Numeric literal (kept textual for `N` fidelity).
    Num(String),
    /// `?` positional parameter.
    Param,
    Symbol(char),
    /// Two-char comparators `<=`, `>=`, `<>`.
    Op(&'static str),
}

fn tokenize(statement: &str) -> Result<Vec<Token>, AdapterError> {
    let mut tokens = Vec::new();
    let mut chars = statement.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(AdapterError::validation(
                                "unterminated string literal in statement",
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '"' => {
                // Double-quoted table/column names are plain identifiers.
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => text.push(ch),
                        None => {
                            return Err(AdapterError::validation(
                                "unterminated quoted identifier in statement",
                            ));
                        }
                    }
                }
                tokens.push(Token::Word(text));
            }
            '?' => {
                chars.next();
                tokens.push(Token::Param);
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Op("<="));
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Token::Op("<>"));
                    }
                    _ => tokens.push(Token::Symbol('<')),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(">="));
                } else {
                    tokens.push(Token::Symbol('>'));
                }
            }
            '=' | ',' | '(' | ')' | '{' | '}' | ':' | '*' | '.' => {
                chars.next();
                tokens.push(Token::Symbol(c));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut text = String::from(c);
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || d == '+' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Num(text));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                chars.next();
                let mut text = String::from(c);
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '-' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(text));
            }
            other => {
                return Err(AdapterError::validation(format!(
                    "unexpected character '{other}' in statement"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    params: &'a mut std::vec::IntoIter<AttributeValue>,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn peek_keyword(&self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w.to_ascii_uppercase()),
            _ => None,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), AdapterError> {
        match self.next() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(AdapterError::validation(format!(
                "expected {keyword}, found {other:?}"
            ))),
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), AdapterError> {
        match self.next() {
            Some(Token::Symbol(c)) if *c == symbol => Ok(()),
            other => Err(AdapterError::validation(format!(
                "expected '{symbol}', found {other:?}"
            ))),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, AdapterError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.clone()),
            other => Err(AdapterError::validation(format!(
                "expected an identifier, found {other:?}"
            ))),
        }
    }

    fn keyword_matches(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    /// A value position: `?`, a string literal, or a number.
    fn expect_value(&mut self) -> Result<AttributeValue, AdapterError> {
        match self.next().cloned() {
            Some(Token::Param) => self.params.next().ok_or_else(|| {
                AdapterError::validation("statement has more '?' markers than Parameters")
            }),
            Some(Token::Str(s)) => Ok(AttributeValue::S(s)),
            Some(Token::Num(n)) => Ok(AttributeValue::N(n)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => {
                Ok(AttributeValue::Bool(true))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => {
                Ok(AttributeValue::Bool(false))
            }
            other => Err(AdapterError::validation(format!(
                "expected a value, found {other:?}"
            ))),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// One `col op value` condition from a WHERE clause.
struct Condition {
    column: String,
    op: &'static str,
    value: AttributeValue,
}

fn parse_where(cursor: &mut Cursor<'_>) -> Result<Vec<Condition>, AdapterError> {
    cursor.expect_keyword("WHERE")?;
    let mut conditions = Vec::new();
    loop {
        let column = cursor.expect_identifier()?;
        let op = match cursor.next() {
            Some(Token::Symbol('=')) => "=",
            Some(Token::Symbol('<')) => "<",
            Some(Token::Symbol('>')) => ">",
            Some(Token::Op(op)) => *op,
            other => {
                return Err(AdapterError::validation(format!(
                    "expected a comparator, found {other:?}"
                )));
            }
        };
        let value = cursor.expect_value()?;
        conditions.push(Condition { column, op, value });

        if cursor.keyword_matches("AND") {
            cursor.next();
        } else {
            break;
        }
    }
    Ok(conditions)
}

/// WHERE equalities become a primary-key item for UPDATE/DELETE.
fn conditions_to_key(conditions: Vec<Condition>) -> Result<Item, AdapterError> {
    let mut key = Item::new();
    for condition in conditions {
        if condition.op != "=" {
            return Err(AdapterError::validation(
                "UPDATE and DELETE statements support only equality conditions",
            ));
        }
        key.insert(condition.column, condition.value);
    }
    Ok(key)
}

// ---------------------------------------------------------------------------
// Statement execution
// ---------------------------------------------------------------------------

async fn execute_select(
    engine: &Engine,
    cursor: &mut Cursor<'_>,
    input: &ExecuteStatementInput,
) -> Result<ExecuteStatementOutput, AdapterError> {
    cursor.expect_keyword("SELECT")?;

    let mut projection: Option<String> = None;
    if matches!(cursor.peek(), Some(Token::Symbol('*'))) {
        cursor.next();
    } else {
        let mut columns = vec![cursor.expect_identifier()?];
        while matches!(cursor.peek(), Some(Token::Symbol(','))) {
            cursor.next();
            columns.push(cursor.expect_identifier()?);
        }
        projection = Some(columns.join(", "));
    }

    cursor.expect_keyword("FROM")?;
    let table = cursor.expect_identifier()?;

    let mut filter = None;
    let mut values = HashMap::new();
    if cursor.keyword_matches("WHERE") {
        let conditions = parse_where(cursor)?;
        let mut fragments = Vec::with_capacity(conditions.len());
        for (i, condition) in conditions.into_iter().enumerate() {
            let placeholder = format!(":p{}", i + 1);
            fragments.push(format!(
                "{} {} {placeholder}",
                condition.column, condition.op
            ));
            values.insert(placeholder, condition.value);
        }
        filter = Some(fragments.join(" AND "));
    }

    let mut limit = input.limit;
    if cursor.keyword_matches("LIMIT") {
        cursor.next();
        match cursor.next().cloned() {
            Some(Token::Num(n)) => {
                limit = Some(n.parse().map_err(|_| {
                    AdapterError::validation(format!("'{n}' is not a valid LIMIT"))
                })?);
            }
            other => {
                return Err(AdapterError::validation(format!(
                    "expected a number after LIMIT, found {other:?}"
                )));
            }
        }
    }

    if !cursor.at_end() {
        return Err(AdapterError::validation("unexpected trailing statement text"));
    }

    let mut exclusive_start_key = Item::new();
    if let Some(token) = &input.next_token {
        exclusive_start_key.insert("offset".to_owned(), AttributeValue::N(token.clone()));
    }

    let output = engine
        .scan(ScanInput {
            table_name: table,
            filter_expression: filter,
            projection_expression: projection,
            expression_attribute_values: values,
            limit,
            exclusive_start_key,
            ..ScanInput::default()
        })
        .await?;

    let next_token = output
        .last_evaluated_key
        .get("offset")
        .and_then(|v| v.as_n().map(ToOwned::to_owned));

    Ok(ExecuteStatementOutput {
        items: output.items,
        next_token,
    })
}

async fn execute_insert(
    engine: &Engine,
    cursor: &mut Cursor<'_>,
) -> Result<ExecuteStatementOutput, AdapterError> {
    cursor.expect_keyword("INSERT")?;
    cursor.expect_keyword("INTO")?;
    let table = cursor.expect_identifier()?;
    cursor.expect_keyword("VALUE")?;
    cursor.expect_symbol('{')?;

    let mut item = Item::new();
    loop {
        let column = match cursor.next().cloned() {
            Some(Token::Str(s)) => s,
            Some(Token::Word(w)) => w,
            other => {
                return Err(AdapterError::validation(format!(
                    "expected an attribute name, found {other:?}"
                )));
            }
        };
        cursor.expect_symbol(':')?;
        let value = cursor.expect_value()?;
        item.insert(column, value);

        match cursor.next() {
            Some(Token::Symbol(',')) => {}
            Some(Token::Symbol('}')) => break,
            other => {
                return Err(AdapterError::validation(format!(
                    "expected ',' or '}}', found {other:?}"
                )));
            }
        }
    }

    // PartiQL INSERT fails when the item already exists.
    let partition_key = {
        let schema = engine.schema().snapshot();
        schema.require_table(&table)?.partition_key.clone()
    };
    engine
        .put_item(PutItemInput {
            table_name: table,
            item,
            condition_expression: Some(format!("attribute_not_exists({partition_key})")),
            ..PutItemInput::default()
        })
        .await?;

    Ok(ExecuteStatementOutput::default())
}

async fn execute_update(
    engine: &Engine,
    cursor: &mut Cursor<'_>,
) -> Result<ExecuteStatementOutput, AdapterError> {
    cursor.expect_keyword("UPDATE")?;
    let table = cursor.expect_identifier()?;
    cursor.expect_keyword("SET")?;

    let mut values = HashMap::new();
    let mut assignments = Vec::new();
    loop {
        let column = cursor.expect_identifier()?;
        cursor.expect_symbol('=')?;
        let value = cursor.expect_value()?;
        let placeholder = format!(":u{}", assignments.len() + 1);
        assignments.push(format!("{column} = {placeholder}"));
        values.insert(placeholder, value);

        if matches!(cursor.peek(), Some(Token::Symbol(','))) {
            cursor.next();
        } else {
            break;
        }
    }

    let key = conditions_to_key(parse_where(cursor)?)?;

    engine
        .update_item(UpdateItemInput {
            table_name: table,
            key,
            update_expression: Some(format!("SET {}", assignments.join(", "))),
            expression_attribute_values: values,
            ..UpdateItemInput::default()
        })
        .await?;

    Ok(ExecuteStatementOutput::default())
}

async fn execute_delete(
    engine: &Engine,
    cursor: &mut Cursor<'_>,
) -> Result<ExecuteStatementOutput, AdapterError> {
    cursor.expect_keyword("DELETE")?;
    cursor.expect_keyword("FROM")?;
    let table = cursor.expect_identifier()?;
    let key = conditions_to_key(parse_where(cursor)?)?;

    engine
        .delete_item(DeleteItemInput {
            table_name: table,
            key,
            ..DeleteItemInput::default()
        })
        .await?;

    Ok(ExecuteStatementOutput::default())
}
