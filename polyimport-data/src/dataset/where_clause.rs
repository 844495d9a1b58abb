//! Attribute filters in a small SQL `WHERE` dialect.
//!
//! Supported: comparisons (`=`, `<>`, `!=`, `<`, `<=`, `>`, `>=`) between a
//! column and a number or single-quoted string, `IS [NOT] NULL`, `NOT`,
//! `AND`, `OR` and parentheses. Column names resolve against the layer
//! schema when the filter is parsed; `FID` and the layer's id column refer
//! to the feature id. Comparisons against `NULL` values are false.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use polyimport_core::{Feature, FieldValue, LayerInfo};
use thiserror::Error;

/// Reasons a filter expression is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WhereError {
    /// The expression contains nothing to evaluate.
    #[error("filter is empty")]
    Empty,
    /// A character outside the dialect.
    #[error("unexpected character <{character}> at offset {offset}")]
    UnexpectedCharacter {
        /// The character.
        character: char,
        /// Byte offset in the expression.
        offset: usize,
    },
    /// A string literal without its closing quote.
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },
    /// A token where the grammar expects something else.
    #[error("unexpected <{token}>")]
    UnexpectedToken {
        /// Rendering of the token.
        token: String,
    },
    /// The expression ends early.
    #[error("unexpected end of filter")]
    UnexpectedEnd,
    /// The column is not part of the layer schema.
    #[error("unknown column <{column}>")]
    UnknownColumn {
        /// Column as written.
        column: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Number(f64),
    Compare(Comparison),
    Open,
    Close,
}

impl Token {
    fn render(&self) -> String {
        match self {
            Self::Word(word) => word.clone(),
            Self::Quoted(text) => format!("'{text}'"),
            Self::Number(value) => value.to_string(),
            Self::Compare(op) => format!("{op:?}"),
            Self::Open => "(".to_owned(),
            Self::Close => ")".to_owned(),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(word) if word.eq_ignore_ascii_case(keyword))
    }
}

struct Lexer<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn tokens(mut self) -> Result<Vec<Token>, WhereError> {
        let mut tokens = Vec::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match c {
                '(' => self.single(Token::Open),
                ')' => self.single(Token::Close),
                '\'' => self.quoted(offset)?,
                '"' => self.identifier(offset)?,
                '=' | '<' | '>' | '!' => self.comparison(offset, c)?,
                c if c.is_ascii_digit() || c == '.' || c == '-' => self.number(offset)?,
                c if c.is_alphabetic() || c == '_' => self.word(offset),
                character => return Err(WhereError::UnexpectedCharacter { character, offset }),
            };
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn end_of(&mut self, start: usize, accept: impl Fn(char, Option<char>) -> bool) -> usize {
        let mut previous = None;
        while let Some(&(offset, c)) = self.chars.peek() {
            if offset > start && !accept(c, previous) {
                return offset;
            }
            previous = Some(c);
            self.chars.next();
        }
        self.text.len()
    }

    fn word(&mut self, start: usize) -> Token {
        let end = self.end_of(start, |c, _| c.is_alphanumeric() || c == '_');
        Token::Word(self.text.get(start..end).unwrap_or_default().to_owned())
    }

    fn number(&mut self, start: usize) -> Result<Token, WhereError> {
        let end = self.end_of(start, |c, previous| {
            c.is_ascii_digit()
                || matches!(c, '.' | 'e' | 'E')
                || (matches!(c, '+' | '-') && matches!(previous, Some('e' | 'E')))
        });
        let literal = self.text.get(start..end).unwrap_or_default();
        literal
            .parse()
            .map(Token::Number)
            .map_err(|_| WhereError::UnexpectedToken {
                token: literal.to_owned(),
            })
    }

    fn delimited(&mut self, delimiter: char, offset: usize) -> Result<String, WhereError> {
        self.chars.next();
        let mut text = String::new();
        while let Some((_, c)) = self.chars.next() {
            if c != delimiter {
                text.push(c);
                continue;
            }
            if self.chars.peek().is_some_and(|&(_, next)| next == delimiter) {
                self.chars.next();
                text.push(delimiter);
            } else {
                return Ok(text);
            }
        }
        Err(WhereError::UnterminatedString { offset })
    }

    fn quoted(&mut self, offset: usize) -> Result<Token, WhereError> {
        self.delimited('\'', offset).map(Token::Quoted)
    }

    fn identifier(&mut self, offset: usize) -> Result<Token, WhereError> {
        self.delimited('"', offset).map(Token::Word)
    }

    fn comparison(&mut self, offset: usize, first: char) -> Result<Token, WhereError> {
        self.chars.next();
        let second = self.chars.peek().map(|&(_, c)| c);
        let (op, pair) = match (first, second) {
            ('=', _) => (Comparison::Eq, false),
            ('<', Some('=')) => (Comparison::Le, true),
            ('<', Some('>')) | ('!', Some('=')) => (Comparison::Ne, true),
            ('<', _) => (Comparison::Lt, false),
            ('>', Some('=')) => (Comparison::Ge, true),
            ('>', _) => (Comparison::Gt, false),
            (character, _) => return Err(WhereError::UnexpectedCharacter { character, offset }),
        };
        if pair {
            self.chars.next();
        }
        Ok(Token::Compare(op))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Field(usize),
    Fid,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        column: Column,
        op: Comparison,
        literal: Literal,
    },
    IsNull {
        column: Column,
        negated: bool,
    },
}

struct Parser<'a> {
    tokens: std::vec::IntoIter<Token>,
    peeked: Option<Token>,
    layer: &'a LayerInfo,
}

impl Parser<'_> {
    fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self.tokens.next();
        }
        self.peeked.as_ref()
    }

    fn next(&mut self) -> Result<Token, WhereError> {
        self.peeked
            .take()
            .or_else(|| self.tokens.next())
            .ok_or(WhereError::UnexpectedEnd)
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek().is_some_and(|token| token.is_keyword(keyword));
        if found {
            self.peeked = None;
        }
        found
    }

    fn or(&mut self) -> Result<Expr, WhereError> {
        let mut expr = self.and()?;
        while self.keyword("OR") {
            expr = Expr::Or(Box::new(expr), Box::new(self.and()?));
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, WhereError> {
        let mut expr = self.predicate()?;
        while self.keyword("AND") {
            expr = Expr::And(Box::new(expr), Box::new(self.predicate()?));
        }
        Ok(expr)
    }

    fn predicate(&mut self) -> Result<Expr, WhereError> {
        if self.keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.predicate()?)));
        }
        match self.next()? {
            Token::Open => {
                let expr = self.or()?;
                match self.next()? {
                    Token::Close => Ok(expr),
                    other => Err(unexpected(&other)),
                }
            }
            Token::Word(name) => {
                let column = self.column(&name)?;
                self.condition(column)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn condition(&mut self, column: Column) -> Result<Expr, WhereError> {
        if self.keyword("IS") {
            let negated = self.keyword("NOT");
            return if self.keyword("NULL") {
                Ok(Expr::IsNull { column, negated })
            } else {
                Err(self.next().map_or(WhereError::UnexpectedEnd, |t| unexpected(&t)))
            };
        }
        let Token::Compare(op) = self.next()? else {
            return Err(WhereError::UnexpectedToken {
                token: "missing comparison".to_owned(),
            });
        };
        let literal = match self.next()? {
            Token::Number(value) => Literal::Number(value),
            Token::Quoted(text) => Literal::Text(text),
            other => return Err(unexpected(&other)),
        };
        Ok(Expr::Compare {
            column,
            op,
            literal,
        })
    }

    fn column(&self, name: &str) -> Result<Column, WhereError> {
        let fields = &self.layer.fields;
        if let Some(index) = self
            .layer
            .field_index(name)
            .or_else(|| fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)))
        {
            return Ok(Column::Field(index));
        }
        let is_fid = name.eq_ignore_ascii_case("FID")
            || self
                .layer
                .fid_column
                .as_deref()
                .is_some_and(|fid| fid.eq_ignore_ascii_case(name));
        if is_fid {
            Ok(Column::Fid)
        } else {
            Err(WhereError::UnknownColumn {
                column: name.to_owned(),
            })
        }
    }
}

fn unexpected(token: &Token) -> WhereError {
    WhereError::UnexpectedToken {
        token: token.render(),
    }
}

/// A parsed attribute filter bound to one layer schema.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    text: String,
    expr: Expr,
}

impl WhereClause {
    /// Parse `text` against the columns of `layer`.
    ///
    /// ```
    /// use polyimport_core::{FieldDefn, FieldType, LayerInfo};
    /// use polyimport_data::WhereClause;
    ///
    /// let layer = LayerInfo {
    ///     name: "parcels".into(),
    ///     fields: vec![FieldDefn::new("zone", FieldType::String)],
    ///     geometry_fields: vec!["geometry".into()],
    ///     fid_column: None,
    /// };
    /// assert!(WhereClause::parse("zone = 'R1' AND FID > 3", &layer).is_ok());
    /// assert!(WhereClause::parse("owner = 'x'", &layer).is_err());
    /// ```
    pub fn parse(text: &str, layer: &LayerInfo) -> Result<Self, WhereError> {
        let tokens = Lexer::new(text).tokens()?;
        if tokens.is_empty() {
            return Err(WhereError::Empty);
        }
        let mut parser = Parser {
            tokens: tokens.into_iter(),
            peeked: None,
            layer,
        };
        let expr = parser.or()?;
        if let Some(extra) = parser.peek() {
            return Err(unexpected(extra));
        }
        Ok(Self {
            text: text.to_owned(),
            expr,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether `feature` satisfies the filter.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        evaluate(&self.expr, feature)
    }
}

fn evaluate(expr: &Expr, feature: &Feature) -> bool {
    match expr {
        Expr::Or(lhs, rhs) => evaluate(lhs, feature) || evaluate(rhs, feature),
        Expr::And(lhs, rhs) => evaluate(lhs, feature) && evaluate(rhs, feature),
        Expr::Not(inner) => !evaluate(inner, feature),
        Expr::IsNull { column, negated } => {
            let is_null = match column {
                Column::Fid => false,
                Column::Field(index) => matches!(feature.value(*index), FieldValue::Null),
            };
            is_null != *negated
        }
        Expr::Compare {
            column,
            op,
            literal,
        } => {
            let ordering = match column {
                Column::Fid => order(&FieldValue::Integer(feature.fid), literal),
                Column::Field(index) => order(feature.value(*index), literal),
            };
            ordering.is_some_and(|ordering| op.holds(ordering))
        }
    }
}

fn order(value: &FieldValue, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (FieldValue::Integer(lhs), Literal::Number(rhs)) => (*lhs as f64).partial_cmp(rhs),
        (FieldValue::Real(lhs), Literal::Number(rhs)) => lhs.partial_cmp(rhs),
        (FieldValue::Text(lhs), Literal::Text(rhs)) => Some(lhs.as_str().cmp(rhs)),
        (FieldValue::Text(lhs), Literal::Number(rhs)) => {
            lhs.trim().parse::<f64>().ok()?.partial_cmp(rhs)
        }
        (FieldValue::Integer(_) | FieldValue::Real(_), Literal::Text(rhs)) => {
            let rhs = rhs.trim().parse::<f64>().ok()?;
            order(value, &Literal::Number(rhs))
        }
        _ => None,
    }
}
