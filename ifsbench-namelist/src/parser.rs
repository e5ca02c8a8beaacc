//! Namelist Reader
//!
//! Reads the Fortran namelist text format:
//!
//! ```text
//! &NAMPAR0
//!     NPROC = 4,            ! comment
//!     NSTRIN(2:3) = 2*1,
//!     RLIST = 1.0D-3, 2.5,
//!     YREC%NAME = 'it''s',
//! /
//! ```
//!
//! Every error is a [`FormatError`] naming the line and group.

use crate::error::{ConfigError, FormatError, Result};
use crate::model::{Group, Namelist, is_valid_name, normalize};
use crate::schema::Schema;
use crate::value::{Array, Scalar, Value};
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// How to treat a group that appears more than once in one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupMergeStrategy {
    /// Raise `DuplicateGroup`
    #[default]
    Reject,
    /// Keep only the first occurrence
    First,
    /// Keep only the last occurrence (at the position of the first)
    Last,
    /// Merge all occurrences; the first assignment of a key wins
    MergeFirst,
    /// Merge all occurrences; the last assignment of a key wins
    MergeLast,
}

impl FromStr for GroupMergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "reject" => Ok(Self::Reject),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "merge-first" => Ok(Self::MergeFirst),
            "merge-last" => Ok(Self::MergeLast),
            other => Err(format!(
                "unknown strategy '{}' (expected reject, first, last, merge-first or merge-last)",
                other
            )),
        }
    }
}

impl fmt::Display for GroupMergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::First => "first",
            Self::Last => "last",
            Self::MergeFirst => "merge-first",
            Self::MergeLast => "merge-last",
        })
    }
}

/// Reader options
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Type declarations to check values against
    pub schema: Option<Schema>,
    /// Duplicate group handling
    pub duplicate_groups: GroupMergeStrategy,
}

/// Parse namelist text with default options
pub fn parse_str(text: &str) -> Result<Namelist> {
    parse_str_with(text, &ParseOptions::default())
}

/// Parse namelist text
pub fn parse_str_with(text: &str, options: &ParseOptions) -> Result<Namelist> {
    let tokens = Lexer::new(text).tokenize()?;
    let groups = Parser::new(tokens).parse_document()?;
    let groups = merge_duplicate_groups(groups, options.duplicate_groups)?;

    let mut builder = Namelist::builder();
    for group in groups {
        builder = builder.group(group.name().to_string());
        for (key, value) in group.iter() {
            builder = builder.set(group.name().to_string(), key.to_string(), value.clone());
        }
    }
    match &options.schema {
        Some(schema) => builder.build_with_schema(schema),
        None => builder.build(),
    }
}

/// Read and parse a namelist file
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<Namelist> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let namelist = parse_str_with(&text, options)?;
    debug!(path = %path.display(), groups = namelist.len(), "Parsed namelist");
    Ok(namelist)
}

/// Parse the right-hand side of an assignment (`4`, `1.0, 2.0`, `3*'x'`).
///
/// One value yields a scalar, several yield an array starting at index 1.
pub fn parse_value(text: &str) -> std::result::Result<Value, FormatError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser::new(tokens);
    let values = parser.parse_values(None)?;
    if let Some(token) = parser.peek() {
        return Err(FormatError::new(
            token.line,
            None,
            format!("unexpected {} after value", token.kind),
        ));
    }
    Ok(values_to_value(values))
}

/// Parse a single unquoted literal (logical, integer or real)
pub fn parse_literal(word: &str) -> Option<Scalar> {
    let lower = word.to_ascii_lowercase();
    match lower.as_str() {
        "t" | ".t." | ".true." | "true" => return Some(Scalar::Bool(true)),
        "f" | ".f." | ".false." | "false" => return Some(Scalar::Bool(false)),
        _ => {}
    }
    let unsigned = lower.strip_prefix('+').unwrap_or(&lower);
    if let Ok(i) = unsigned.parse::<i64>() {
        return Some(Scalar::Int(i));
    }
    let float_text = unsigned.replace('d', "e");
    float_text.parse::<f64>().ok().map(Scalar::Float)
}

fn values_to_value(mut values: Vec<Scalar>) -> Value {
    if values.len() == 1 {
        if let Some(single) = values.pop() {
            return Value::Scalar(single);
        }
    }
    Value::Array(Array::from_values(values))
}

fn merge_duplicate_groups(groups: Vec<Group>, strategy: GroupMergeStrategy) -> Result<Vec<Group>> {
    let mut merged: IndexMap<String, Group> = IndexMap::new();
    for group in groups {
        let norm = normalize(group.name());
        let Some(existing) = merged.get_mut(&norm) else {
            merged.insert(norm, group);
            continue;
        };
        debug!(group = group.name(), %strategy, "Duplicate namelist group");
        match strategy {
            GroupMergeStrategy::Reject => {
                return Err(ConfigError::DuplicateGroup(group.name().to_string()));
            }
            GroupMergeStrategy::First => {}
            GroupMergeStrategy::Last => *existing = group,
            GroupMergeStrategy::MergeFirst => {
                for (key, value) in group.iter() {
                    if !existing.contains_key(key) {
                        existing.set(key, value.clone())?;
                    }
                }
            }
            GroupMergeStrategy::MergeLast => {
                for (key, value) in group.iter() {
                    existing.set(key, value.clone())?;
                }
            }
        }
    }
    Ok(merged.into_values().collect())
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    GroupStart(String),
    GroupEnd,
    Word(String),
    Str(String),
    Equals,
    Comma,
    LParen,
    RParen,
    Colon,
    Percent,
    Star,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::GroupStart(name) => write!(f, "'&{}'", name),
            TokenKind::GroupEnd => f.write_str("group terminator"),
            TokenKind::Word(w) => write!(f, "'{}'", w),
            TokenKind::Str(_) => f.write_str("string"),
            TokenKind::Equals => f.write_str("'='"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Percent => f.write_str("'%'"),
            TokenKind::Star => f.write_str("'*'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '&' | '$' | '/' | '!' | '\'' | '"' | '=' | ',' | ';' | '(' | ')' | ':' | '%' | '*')
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<Token>, FormatError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let kind = match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                    continue;
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '!' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.chars.next();
                    }
                    continue;
                }
                '&' | '$' => {
                    self.chars.next();
                    let name = self.word();
                    if name.is_empty() {
                        return Err(FormatError::new(line, None, "expected group name after '&'"));
                    }
                    if name.eq_ignore_ascii_case("end") {
                        TokenKind::GroupEnd
                    } else {
                        TokenKind::GroupStart(name)
                    }
                }
                '/' => {
                    self.chars.next();
                    TokenKind::GroupEnd
                }
                '\'' | '"' => TokenKind::Str(self.string(c)?),
                '=' => self.single(TokenKind::Equals),
                ',' | ';' => self.single(TokenKind::Comma),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ':' => self.single(TokenKind::Colon),
                '%' => self.single(TokenKind::Percent),
                '*' => self.single(TokenKind::Star),
                _ => TokenKind::Word(self.word()),
            };
            tokens.push(Token { kind, line });
        }
        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.chars.next();
        kind
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_word_char(c) {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }

    /// Quoted string; a doubled quote is a literal quote
    fn string(&mut self, quote: char) -> std::result::Result<String, FormatError> {
        let start = self.line;
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => {
                    if self.chars.peek() == Some(&quote) {
                        self.chars.next();
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    out.push(c);
                }
                None => return Err(FormatError::new(start, None, "unterminated string")),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Upper bound on the values one assignment may expand to, repeat counts included
pub const MAX_VALUES: usize = 1 << 20;

/// Left-hand side of an assignment
struct Target {
    /// Name followed by record fields (`KEY%A%B` -> [KEY, A, B])
    path: Vec<String>,
    /// Element range on the last path component
    index: Option<(usize, Option<usize>)>,
    line: usize,
}

/// Key being assembled while a group is parsed
enum Slot {
    Plain(String, Value),
    Indexed(String, Array),
    Record(String, PendingGroup),
}

struct PendingGroup {
    name: String,
    slots: IndexMap<String, Slot>,
}

impl PendingGroup {
    fn new(name: String) -> Self {
        Self {
            name,
            slots: IndexMap::new(),
        }
    }

    fn into_group(self) -> Result<Group> {
        let mut group = Group::new(self.name)?;
        for (_, slot) in self.slots {
            match slot {
                Slot::Plain(key, value) => group.insert(key, value)?,
                Slot::Indexed(key, array) => group.insert(key, Value::Array(array))?,
                Slot::Record(key, pending) => group.insert(key, Value::Record(pending.into_group()?))?,
            }
        }
        Ok(group)
    }

    fn assign(&mut self, path: &[String], target: &Target, values: Vec<Scalar>, top: &str) -> Result<()> {
        let duplicate = |key: String| ConfigError::DuplicateKey {
            group: top.to_string(),
            key,
        };
        let Some((name, rest)) = path.split_first() else {
            return Ok(());
        };
        let norm = normalize(name);

        if !rest.is_empty() {
            let slot = self
                .slots
                .entry(norm)
                .or_insert_with(|| Slot::Record(name.clone(), PendingGroup::new(name.clone())));
            return match slot {
                Slot::Record(_, record) => record.assign(rest, target, values, top),
                _ => Err(duplicate(name.clone())),
            };
        }

        match target.index {
            None => {
                if self.slots.contains_key(&norm) {
                    return Err(duplicate(name.clone()));
                }
                self.slots
                    .insert(norm, Slot::Plain(name.clone(), values_to_value(values)));
            }
            Some((start, end)) => {
                if let Some(end) = end {
                    // parse_index guarantees start <= end
                    let room = (end - start).saturating_add(1);
                    if values.len() > room {
                        return Err(FormatError::new(
                            target.line,
                            Some(top),
                            format!("{} values for {} elements of '{}'", values.len(), room, name),
                        )
                        .into());
                    }
                }
                let slot = self
                    .slots
                    .entry(norm)
                    .or_insert_with(|| Slot::Indexed(name.clone(), Array::new()));
                let Slot::Indexed(_, array) = slot else {
                    return Err(duplicate(name.clone()));
                };
                for (offset, value) in values.into_iter().enumerate() {
                    let index = start.checked_add(offset).ok_or_else(|| {
                        FormatError::new(
                            target.line,
                            Some(top),
                            format!("index of '{}' overflows past element {}", name, start),
                        )
                    })?;
                    if array.get(index).is_some() {
                        return Err(duplicate(format!("{}({})", name, index)));
                    }
                    array.insert(index, value);
                }
            }
        }
        Ok(())
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    group: Option<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            group: None,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn error(&self, line: usize, message: impl Into<String>) -> FormatError {
        FormatError::new(line, self.group.as_deref(), message)
    }

    fn expect(&mut self, expected: TokenKind) -> std::result::Result<Token, FormatError> {
        match self.next() {
            Some(token) if token.kind == expected => Ok(token),
            Some(token) => Err(self.error(
                token.line,
                format!("expected {}, found {}", expected, token.kind),
            )),
            None => Err(self.error(self.last_line(), format!("expected {}, found end of input", expected))),
        }
    }

    fn parse_document(&mut self) -> Result<Vec<Group>> {
        let mut groups = Vec::new();
        while let Some(token) = self.next() {
            let name = match token.kind {
                TokenKind::GroupStart(name) => name,
                other => {
                    return Err(self
                        .error(token.line, format!("expected '&GROUP', found {}", other))
                        .into());
                }
            };
            check_name(&name, token.line, None)?;
            self.group = Some(name.clone());
            groups.push(self.parse_group(name)?);
            self.group = None;
        }
        Ok(groups)
    }

    fn parse_group(&mut self, name: String) -> Result<Group> {
        let mut pending = PendingGroup::new(name.clone());
        loop {
            let Some(token) = self.peek() else {
                return Err(self
                    .error(self.last_line(), "missing group terminator '/'")
                    .into());
            };
            match &token.kind {
                TokenKind::GroupEnd => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Word(_) => {
                    let target = self.parse_target()?;
                    let values = self.parse_values(Some(target.line))?;
                    pending.assign(&target.path, &target, values, &name)?;
                }
                other => {
                    return Err(self
                        .error(token.line, format!("expected a key, found {}", other))
                        .into());
                }
            }
        }
        pending.into_group()
    }

    fn parse_target(&mut self) -> std::result::Result<Target, FormatError> {
        let first = self.next().ok_or_else(|| self.error(self.last_line(), "expected a key"))?;
        let line = first.line;
        let name = match first.kind {
            TokenKind::Word(name) => name,
            other => return Err(self.error(line, format!("expected a key, found {}", other))),
        };
        check_name(&name, line, self.group.as_deref())?;
        let mut path = vec![name];
        let mut index = None;

        loop {
            match self.peek_kind_at(0) {
                Some(TokenKind::Percent) => {
                    if index.is_some() {
                        return Err(self.error(line, "arrays of derived types are not supported"));
                    }
                    self.pos += 1;
                    match self.next() {
                        Some(Token {
                            kind: TokenKind::Word(field),
                            line,
                        }) => {
                            check_name(&field, line, self.group.as_deref())?;
                            path.push(field);
                        }
                        _ => return Err(self.error(line, "expected a field name after '%'")),
                    }
                }
                Some(TokenKind::LParen) => {
                    if index.is_some() {
                        return Err(self.error(line, "arrays of derived types are not supported"));
                    }
                    self.pos += 1;
                    index = Some(self.parse_index(line)?);
                }
                _ => break,
            }
        }
        self.expect(TokenKind::Equals)?;
        Ok(Target { path, index, line })
    }

    fn parse_index(&mut self, line: usize) -> std::result::Result<(usize, Option<usize>), FormatError> {
        let start = self.parse_index_bound(line)?;
        let end = if self.peek_kind_at(0) == Some(&TokenKind::Colon) {
            self.pos += 1;
            let end = self.parse_index_bound(line)?;
            if end < start {
                return Err(self.error(line, format!("empty index range {}:{}", start, end)));
            }
            Some(end)
        } else {
            None
        };
        match self.next().map(|t| t.kind) {
            Some(TokenKind::RParen) => Ok((start, end)),
            Some(TokenKind::Comma) => Err(self.error(line, "multi-dimensional indices are not supported")),
            Some(TokenKind::Colon) => Err(self.error(line, "index strides are not supported")),
            _ => Err(self.error(line, "expected ')' after index")),
        }
    }

    fn parse_index_bound(&mut self, line: usize) -> std::result::Result<usize, FormatError> {
        match self.next().map(|t| t.kind) {
            Some(TokenKind::Word(w)) => match w.parse::<usize>() {
                Ok(i) if i >= 1 => Ok(i),
                _ => Err(self.error(line, format!("invalid array index '{}' (indices start at 1)", w))),
            },
            _ => Err(self.error(line, "expected an array index")),
        }
    }

    /// Whether the upcoming tokens start a new assignment
    fn at_key(&self) -> bool {
        matches!(self.peek_kind_at(0), Some(TokenKind::Word(_)))
            && matches!(
                self.peek_kind_at(1),
                Some(TokenKind::Equals | TokenKind::LParen | TokenKind::Percent)
            )
    }

    /// Values up to the next key or group terminator
    fn parse_values(&mut self, line: Option<usize>) -> std::result::Result<Vec<Scalar>, FormatError> {
        let line = line.unwrap_or(1);
        let mut values = Vec::new();
        // Set after '=' or ',' until a value is seen
        let mut expecting = true;

        while let Some(token) = self.peek().cloned() {
            match token.kind {
                TokenKind::Comma => {
                    if expecting {
                        return Err(self.error(token.line, "null values are not supported"));
                    }
                    expecting = true;
                    self.pos += 1;
                }
                TokenKind::Word(_) if self.at_key() => break,
                TokenKind::Word(_) | TokenKind::Str(_) => {
                    let (count, value) = self.parse_item()?;
                    if values.len().saturating_add(count) > MAX_VALUES {
                        return Err(self.error(
                            token.line,
                            format!("more than {} values in one assignment", MAX_VALUES),
                        ));
                    }
                    values.extend(std::iter::repeat_n(value, count));
                    expecting = false;
                }
                TokenKind::LParen => {
                    return Err(self.error(token.line, "complex values are not supported"));
                }
                TokenKind::GroupEnd | TokenKind::GroupStart(_) => break,
                other => {
                    return Err(self.error(token.line, format!("unexpected {} in value list", other)));
                }
            }
        }
        if values.is_empty() {
            return Err(self.error(line, "missing value"));
        }
        Ok(values)
    }

    /// One value with an optional repeat count (`3*1.0`)
    fn parse_item(&mut self) -> std::result::Result<(usize, Scalar), FormatError> {
        let Some(token) = self.next() else {
            return Err(self.error(self.last_line(), "expected a value"));
        };
        let line = token.line;

        if let TokenKind::Word(ref w) = token.kind {
            if self.peek_kind_at(0) == Some(&TokenKind::Star) {
                let count = match w.parse::<usize>() {
                    Ok(n) if n >= 1 => n,
                    _ => return Err(self.error(line, format!("invalid repeat count '{}'", w))),
                };
                self.pos += 1;
                let Some(next) = self.next() else {
                    return Err(self.error(line, "null values are not supported"));
                };
                return Ok((count, self.literal(next)?));
            }
        }
        Ok((1, self.literal(token)?))
    }

    fn literal(&self, token: Token) -> std::result::Result<Scalar, FormatError> {
        match token.kind {
            TokenKind::Str(s) => Ok(Scalar::Str(s)),
            TokenKind::Word(w) => parse_literal(&w)
                .ok_or_else(|| self.error(token.line, format!("unrecognized value '{}'", w))),
            TokenKind::Comma | TokenKind::GroupEnd => {
                Err(self.error(token.line, "null values are not supported"))
            }
            other => Err(self.error(token.line, format!("expected a value, found {}", other))),
        }
    }
}

fn check_name(name: &str, line: usize, group: Option<&str>) -> std::result::Result<(), FormatError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(FormatError::new(line, group, format!("invalid name '{}'", name)))
    }
}
