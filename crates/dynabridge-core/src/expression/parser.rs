//! Lexer and recursive-descent parser for the expression language.
//!
//! Keywords and function names match case-insensitively. `#name` and
//! `:value` placeholders survive lexing as dedicated tokens; names resolve
//! through the name map at evaluation/planning time, values bind from the
//! value map.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::ast::{
    AddAction, AttributePath, CompareOp, DeleteAction, Expr, FunctionName, LogicalOp, Operand,
    PathElement, SetAction, SetValue, UpdateExpr,
};

/// Errors produced while parsing or evaluating expressions. All of them
/// surface as `ValidationException` on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    /// The token stream did not match the grammar.
    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the parser wanted.
        expected: String,
        /// What it got.
        found: String,
    },
    /// Input ended mid-production.
    #[error("Unexpected end of expression")]
    UnexpectedEof,
    /// A clause keyword appeared twice in one update expression.
    #[error("The {clause} clause may appear at most once")]
    DuplicateClause {
        /// Offending clause keyword.
        clause: &'static str,
    },
    /// A `#name` placeholder has no entry in the name map.
    #[error("Unresolved expression attribute name: {name}")]
    UnresolvedName { name: String },
    /// A `:value` placeholder has no entry in the value map.
    #[error("Unresolved expression attribute value: {name}")]
    UnresolvedValue { name: String },
    /// An operand cannot be used with the given operation.
    #[error("Invalid operand for {operation}: {message}")]
    InvalidOperand { operation: String, message: String },
    /// Incompatible types met during evaluation.
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },
    /// Arithmetic produced a non-finite number.
    #[error("Arithmetic overflow: result is not a finite number")]
    NonFiniteResult,
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    /// `#name` reference (without the `#`).
    NameRef(String),
    /// `:value` reference (without the `:`).
    ValueRef(String),
    Number(usize),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    AttributeExists,
    AttributeNotExists,
    BeginsWith,
    Contains,
    Size,
    IfExists,
    IfNotExists,
    ListAppend,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::NameRef(s) => write!(f, "#{s}"),
            Self::ValueRef(s) => write!(f, ":{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Eq => f.write_str("'='"),
            Self::Ne => f.write_str("'<>'"),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("'<='"),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("'>='"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Dot => f.write_str("'.'"),
            Self::Comma => f.write_str("','"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
            Self::Not => f.write_str("NOT"),
            Self::Between => f.write_str("BETWEEN"),
            Self::In => f.write_str("IN"),
            Self::Set => f.write_str("SET"),
            Self::Remove => f.write_str("REMOVE"),
            Self::Add => f.write_str("ADD"),
            Self::Delete => f.write_str("DELETE"),
            Self::AttributeExists => f.write_str("attribute_exists"),
            Self::AttributeNotExists => f.write_str("attribute_not_exists"),
            Self::BeginsWith => f.write_str("begins_with"),
            Self::Contains => f.write_str("contains"),
            Self::Size => f.write_str("size"),
            Self::IfExists => f.write_str("if_exists"),
            Self::IfNotExists => f.write_str("if_not_exists"),
            Self::ListAppend => f.write_str("list_append"),
            Self::Eof => f.write_str("EOF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }

        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '#' => {
                self.chars.next();
                self.read_placeholder('#').map(Token::NameRef)
            }
            ':' => {
                self.chars.next();
                self.read_placeholder(':').map(Token::ValueRef)
            }
            '=' => self.single(Token::Eq),
            '<' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('=') => self.single(Token::Le),
                    Some('>') => self.single(Token::Ne),
                    _ => Ok(Token::Lt),
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.peek() == Some(&'=') {
                    self.single(Token::Ge)
                } else {
                    Ok(Token::Gt)
                }
            }
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '.' => self.single(Token::Dot),
            ',' => self.single(Token::Comma),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            c if c.is_ascii_digit() => self.read_index(),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.read_word()),
            _ => Err(ExpressionError::UnexpectedToken {
                expected: "a valid expression token".to_owned(),
                found: format!("'{ch}'"),
            }),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token, ExpressionError> {
        self.chars.next();
        Ok(token)
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn read_placeholder(&mut self, sigil: char) -> Result<String, ExpressionError> {
        let name = self.read_ident();
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedToken {
                expected: format!("a name after '{sigil}'"),
                found: "nothing".to_owned(),
            });
        }
        Ok(name)
    }

    fn read_index(&mut self) -> Result<Token, ExpressionError> {
        let mut digits = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        digits
            .parse()
            .map(Token::Number)
            .map_err(|_| ExpressionError::InvalidOperand {
                operation: "index".to_owned(),
                message: format!("'{digits}' is not a valid list index"),
            })
    }

    fn read_word(&mut self) -> Token {
        let word = self.read_ident();
        match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "between" => Token::Between,
            "in" => Token::In,
            "set" => Token::Set,
            "remove" => Token::Remove,
            "add" => Token::Add,
            "delete" => Token::Delete,
            "attribute_exists" => Token::AttributeExists,
            "attribute_not_exists" => Token::AttributeNotExists,
            "begins_with" => Token::BeginsWith,
            "contains" => Token::Contains,
            "size" => Token::Size,
            "if_exists" => Token::IfExists,
            "if_not_exists" => Token::IfNotExists,
            "list_append" => Token::ListAppend,
            _ => Token::Identifier(word),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<Token, ExpressionError> {
        let token = self.advance();
        if std::mem::discriminant(&token) == std::mem::discriminant(expected) {
            Ok(token)
        } else {
            Err(ExpressionError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.to_string(),
            })
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    // -- Conditions (precedence: OR < AND < NOT < primary) --

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        if matches!(self.peek(), Token::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }

        if let Some(name) = self.peek_function() {
            return self.parse_function(name);
        }

        let operand = self.parse_operand()?;
        self.parse_comparison_tail(operand)
    }

    fn peek_function(&self) -> Option<FunctionName> {
        match self.peek() {
            Token::AttributeExists => Some(FunctionName::AttributeExists),
            Token::AttributeNotExists => Some(FunctionName::AttributeNotExists),
            Token::BeginsWith => Some(FunctionName::BeginsWith),
            Token::Contains => Some(FunctionName::Contains),
            _ => None,
        }
    }

    fn parse_function(&mut self, name: FunctionName) -> Result<Expr, ExpressionError> {
        self.advance();
        self.expect(&Token::LParen)?;
        let mut args = vec![self.parse_operand()?];
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            args.push(self.parse_operand()?);
        }
        self.expect(&Token::RParen)?;

        let arity = match name {
            FunctionName::AttributeExists | FunctionName::AttributeNotExists => 1,
            _ => 2,
        };
        if args.len() != arity {
            return Err(ExpressionError::InvalidOperand {
                operation: name.to_string(),
                message: format!("expected {arity} argument(s), got {}", args.len()),
            });
        }
        Ok(Expr::Function { name, args })
    }

    fn parse_comparison_tail(&mut self, left: Operand) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge => {
                let op = match self.advance() {
                    Token::Eq => CompareOp::Eq,
                    Token::Ne => CompareOp::Ne,
                    Token::Lt => CompareOp::Lt,
                    Token::Le => CompareOp::Le,
                    Token::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                let right = self.parse_operand()?;
                Ok(Expr::Compare {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                })
            }
            Token::Between => {
                self.advance();
                let low = self.parse_operand()?;
                self.expect(&Token::And)?;
                let high = self.parse_operand()?;
                Ok(Expr::Between {
                    value: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                })
            }
            Token::In => {
                self.advance();
                self.expect(&Token::LParen)?;
                let mut list = vec![self.parse_operand()?];
                while matches!(self.peek(), Token::Comma) {
                    self.advance();
                    list.push(self.parse_operand()?);
                }
                self.expect(&Token::RParen)?;
                Ok(Expr::In {
                    value: Box::new(left),
                    list,
                })
            }
            other => Err(ExpressionError::UnexpectedToken {
                expected: "a comparison operator, BETWEEN, or IN".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    // -- Operands & paths --

    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.peek() {
            Token::ValueRef(_) => {
                let Token::ValueRef(name) = self.advance() else {
                    return Err(ExpressionError::UnexpectedEof);
                };
                Ok(Operand::Value(name))
            }
            Token::Size => {
                self.advance();
                self.expect(&Token::LParen)?;
                let path = self.parse_path()?;
                self.expect(&Token::RParen)?;
                Ok(Operand::Size(path))
            }
            _ => Ok(Operand::Path(self.parse_path()?)),
        }
    }

    fn parse_path(&mut self) -> Result<AttributePath, ExpressionError> {
        let mut elements = vec![self.parse_path_segment()?];
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    elements.push(self.parse_path_segment()?);
                }
                Token::LBracket => {
                    self.advance();
                    let Token::Number(idx) = self.advance() else {
                        return Err(ExpressionError::UnexpectedToken {
                            expected: "a list index".to_owned(),
                            found: "non-number".to_owned(),
                        });
                    };
                    self.expect(&Token::RBracket)?;
                    elements.push(PathElement::Index(idx));
                }
                _ => break,
            }
        }
        Ok(AttributePath { elements })
    }

    fn parse_path_segment(&mut self) -> Result<PathElement, ExpressionError> {
        match self.advance() {
            Token::Identifier(name) => Ok(PathElement::Attribute(name)),
            Token::NameRef(name) => Ok(PathElement::Attribute(format!("#{name}"))),
            other => Err(ExpressionError::UnexpectedToken {
                expected: "an attribute name or #name".to_owned(),
                found: other.to_string(),
            }),
        }
    }

    // -- Update expressions --

    fn parse_update(&mut self) -> Result<UpdateExpr, ExpressionError> {
        let mut update = UpdateExpr::default();

        while !self.at_end() {
            match self.peek() {
                Token::Set => {
                    self.advance();
                    if !update.set_actions.is_empty() {
                        return Err(ExpressionError::DuplicateClause { clause: "SET" });
                    }
                    self.parse_list(|p| {
                        let action = p.parse_set_action()?;
                        update.set_actions.push(action);
                        Ok(())
                    })?;
                }
                Token::Add => {
                    self.advance();
                    if !update.add_actions.is_empty() {
                        return Err(ExpressionError::DuplicateClause { clause: "ADD" });
                    }
                    self.parse_list(|p| {
                        let path = p.parse_path()?;
                        let value = p.parse_operand()?;
                        update.add_actions.push(AddAction { path, value });
                        Ok(())
                    })?;
                }
                Token::Remove => {
                    self.advance();
                    if !update.remove_paths.is_empty() {
                        return Err(ExpressionError::DuplicateClause { clause: "REMOVE" });
                    }
                    self.parse_list(|p| {
                        let path = p.parse_path()?;
                        update.remove_paths.push(path);
                        Ok(())
                    })?;
                }
                Token::Delete => {
                    self.advance();
                    if !update.delete_actions.is_empty() {
                        return Err(ExpressionError::DuplicateClause { clause: "DELETE" });
                    }
                    self.parse_list(|p| {
                        let path = p.parse_path()?;
                        let value = p.parse_operand()?;
                        update.delete_actions.push(DeleteAction { path, value });
                        Ok(())
                    })?;
                }
                other => {
                    return Err(ExpressionError::UnexpectedToken {
                        expected: "SET, ADD, REMOVE, or DELETE".to_owned(),
                        found: other.to_string(),
                    });
                }
            }
        }

        Ok(update)
    }

    /// Parse a comma-separated list of clause entries. The callback parses
    /// one entry; commas continue the list, a clause keyword or EOF ends it.
    fn parse_list(
        &mut self,
        mut entry: impl FnMut(&mut Self) -> Result<(), ExpressionError>,
    ) -> Result<(), ExpressionError> {
        entry(self)?;
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            entry(self)?;
        }
        Ok(())
    }

    fn parse_set_action(&mut self) -> Result<SetAction, ExpressionError> {
        let path = self.parse_path()?;
        self.expect(&Token::Eq)?;
        let value = self.parse_set_value()?;
        Ok(SetAction { path, value })
    }

    fn parse_set_value(&mut self) -> Result<SetValue, ExpressionError> {
        match self.peek() {
            Token::IfExists | Token::IfNotExists => {
                let wants_existing = matches!(self.advance(), Token::IfExists);
                self.expect(&Token::LParen)?;
                let path = self.parse_path()?;
                self.expect(&Token::Comma)?;
                let fallback = self.parse_operand()?;
                self.expect(&Token::RParen)?;
                if wants_existing {
                    Ok(SetValue::IfExists(path, fallback))
                } else {
                    Ok(SetValue::IfNotExists(path, fallback))
                }
            }
            Token::ListAppend => {
                self.advance();
                self.expect(&Token::LParen)?;
                let first = self.parse_operand()?;
                self.expect(&Token::Comma)?;
                let second = self.parse_operand()?;
                self.expect(&Token::RParen)?;
                Ok(SetValue::ListAppend(first, second))
            }
            _ => {
                let first = self.parse_operand()?;
                match self.peek() {
                    Token::Plus => {
                        self.advance();
                        Ok(SetValue::Plus(first, self.parse_operand()?))
                    }
                    Token::Minus => {
                        self.advance();
                        Ok(SetValue::Minus(first, self.parse_operand()?))
                    }
                    _ => Ok(SetValue::Operand(first)),
                }
            }
        }
    }

    // -- Projections --

    fn parse_projection(&mut self) -> Result<Vec<AttributePath>, ExpressionError> {
        let mut paths = vec![self.parse_path()?];
        while matches!(self.peek(), Token::Comma) {
            self.advance();
            paths.push(self.parse_path()?);
        }
        Ok(paths)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse a condition, key-condition, or filter expression.
pub fn parse_condition(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(Lexer::new(input).tokenize()?);
    let expr = parser.parse_or()?;
    if parser.at_end() {
        Ok(expr)
    } else {
        Err(ExpressionError::UnexpectedToken {
            expected: "end of expression".to_owned(),
            found: parser.peek().to_string(),
        })
    }
}

/// Parse an update expression; at least one clause is required.
pub fn parse_update(input: &str) -> Result<UpdateExpr, ExpressionError> {
    let mut parser = Parser::new(Lexer::new(input).tokenize()?);
    let update = parser.parse_update()?;
    if update.is_empty() {
        return Err(ExpressionError::UnexpectedToken {
            expected: "SET, ADD, REMOVE, or DELETE".to_owned(),
            found: "an empty update expression".to_owned(),
        });
    }
    Ok(update)
}

/// Parse a projection expression.
pub fn parse_projection(input: &str) -> Result<Vec<AttributePath>, ExpressionError> {
    let mut parser = Parser::new(Lexer::new(input).tokenize()?);
    let paths = parser.parse_projection()?;
    if parser.at_end() {
        Ok(paths)
    } else {
        Err(ExpressionError::UnexpectedToken {
            expected: "end of expression".to_owned(),
            found: parser.peek().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_comparisons() {
        for (input, op) in [
            ("#a = :v", CompareOp::Eq),
            ("#a <> :v", CompareOp::Ne),
            ("#a < :v", CompareOp::Lt),
            ("#a <= :v", CompareOp::Le),
            ("#a > :v", CompareOp::Gt),
            ("#a >= :v", CompareOp::Ge),
        ] {
            match parse_condition(input).unwrap() {
                Expr::Compare { op: parsed, .. } => assert_eq!(parsed, op, "input: {input}"),
                other => panic!("expected Compare for '{input}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_should_parse_logical_combinations() {
        let expr = parse_condition("#a = :v1 AND (#b = :v2 OR NOT #c = :v3)").unwrap();
        let Expr::Logical {
            op: LogicalOp::And,
            right,
            ..
        } = expr
        else {
            panic!("expected top-level AND");
        };
        assert!(matches!(
            *right,
            Expr::Logical {
                op: LogicalOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_should_parse_between_and_in() {
        assert!(matches!(
            parse_condition("age BETWEEN :lo AND :hi").unwrap(),
            Expr::Between { .. }
        ));
        match parse_condition("st IN (:a, :b, :c)").unwrap() {
            Expr::In { list, .. } => assert_eq!(list.len(), 3),
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn test_should_parse_condition_functions() {
        for (input, name) in [
            ("attribute_exists(#n)", FunctionName::AttributeExists),
            ("attribute_not_exists(n)", FunctionName::AttributeNotExists),
            ("begins_with(#n, :p)", FunctionName::BeginsWith),
            ("contains(tags, :t)", FunctionName::Contains),
        ] {
            match parse_condition(input).unwrap() {
                Expr::Function { name: parsed, .. } => assert_eq!(parsed, name),
                other => panic!("expected Function for '{input}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_should_reject_wrong_function_arity() {
        assert!(parse_condition("begins_with(#n)").is_err());
        assert!(parse_condition("attribute_exists(#n, :v)").is_err());
    }

    #[test]
    fn test_should_parse_size_in_comparison() {
        match parse_condition("size(name) > :len").unwrap() {
            Expr::Compare { left, .. } => assert!(matches!(*left, Operand::Size(_))),
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn test_should_parse_dotted_and_indexed_paths() {
        let expr = parse_condition("info.rating[2].score = :v").unwrap();
        let Expr::Compare { left, .. } = expr else {
            panic!("expected Compare");
        };
        let Operand::Path(path) = *left else {
            panic!("expected Path operand");
        };
        assert_eq!(path.elements.len(), 4);
        assert!(matches!(&path.elements[2], PathElement::Index(2)));
    }

    #[test]
    fn test_should_parse_update_clauses_in_any_order() {
        let update = parse_update("REMOVE old ADD cnt :one SET a = :v DELETE tags :t").unwrap();
        assert_eq!(update.set_actions.len(), 1);
        assert_eq!(update.add_actions.len(), 1);
        assert_eq!(update.remove_paths.len(), 1);
        assert_eq!(update.delete_actions.len(), 1);
    }

    #[test]
    fn test_should_reject_duplicate_clause() {
        let err = parse_update("SET a = :v SET b = :w").unwrap_err();
        assert!(matches!(
            err,
            ExpressionError::DuplicateClause { clause: "SET" }
        ));
    }

    #[test]
    fn test_should_parse_set_rhs_forms() {
        let update = parse_update(
            "SET a = :v, b = b + :inc, c = c - :dec, \
             d = if_not_exists(d, :dflt), e = if_exists(e, :alt), \
             f = list_append(f, :tail)",
        )
        .unwrap();
        assert_eq!(update.set_actions.len(), 6);
        assert!(matches!(&update.set_actions[0].value, SetValue::Operand(_)));
        assert!(matches!(&update.set_actions[1].value, SetValue::Plus(_, _)));
        assert!(matches!(
            &update.set_actions[2].value,
            SetValue::Minus(_, _)
        ));
        assert!(matches!(
            &update.set_actions[3].value,
            SetValue::IfNotExists(_, _)
        ));
        assert!(matches!(
            &update.set_actions[4].value,
            SetValue::IfExists(_, _)
        ));
        assert!(matches!(
            &update.set_actions[5].value,
            SetValue::ListAppend(_, _)
        ));
    }

    #[test]
    fn test_should_parse_indexed_set_target() {
        let update = parse_update("SET list_type[1] = :val").unwrap();
        let path = &update.set_actions[0].path;
        assert_eq!(path.elements.len(), 2);
        assert!(matches!(&path.elements[1], PathElement::Index(1)));
    }

    #[test]
    fn test_should_parse_keywords_case_insensitively() {
        assert!(parse_update("set a = :v remove b").is_ok());
        assert!(matches!(
            parse_condition("#a = :v and #b = :w").unwrap(),
            Expr::Logical {
                op: LogicalOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_should_parse_projection_paths() {
        let paths = parse_projection("id, #n, info.rating").unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[2].elements.len(), 2);
    }

    #[test]
    fn test_should_reject_malformed_input() {
        assert!(parse_condition("").is_err());
        assert!(parse_condition("= :v").is_err());
        assert!(parse_condition("#a = :v AND").is_err());
        assert!(parse_condition("begins_with(#a, :v").is_err());
        assert!(parse_update("").is_err());
        assert!(parse_update("   ").is_err());
        assert!(parse_update("SET").is_err());
        assert!(parse_projection("a,,b").is_err());
    }

    #[test]
    fn test_should_reject_trailing_tokens() {
        assert!(parse_condition("#a = :v )").is_err());
        assert!(parse_projection("a b").is_err());
    }
}
