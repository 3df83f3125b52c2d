//! Typed coercion of resolved raw strings
//!
//! Converts a raw string into a typed value according to a declared
//! [`Shape`]. Scalar shapes parse directly; container shapes are tried in a
//! fixed priority order when no explicit delimiter hint is given:
//!
//! 1. a bracketed literal (`[..]`, `(..)`, `{..}` with quoted or bare
//!    elements), parsed structurally;
//! 2. a JSON literal;
//! 3. delimiter auto-detection in the order configured by [`CoercePolicy`]
//!    (comma, then pipe, then newline by default), trimming each element.
//!
//! An explicit delimiter hint always wins over auto-detection. Element values
//! are recursively coerced to the declared element shape; the first failing
//! element fails the whole container. Mapping shapes accept bracketed or JSON
//! objects only.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// How filesystem-path coercion treats a missing directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    /// The path must already exist
    MustExist,
    /// Create the directory at coercion time when it is missing
    CreateIfMissing,
}

/// Arity of a tuple shape
#[derive(Debug, Clone, PartialEq)]
pub enum TupleArity {
    /// Exactly these element shapes, in order
    Fixed(Vec<Shape>),
    /// Any number of elements of one shape
    Variable(Box<Shape>),
}

/// The declared target shape of a configuration field
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Date,
    Time,
    DateTime,
    Url,
    Path(PathMode),
    List(Box<Shape>),
    Tuple(TupleArity),
    Set(Box<Shape>),
    Map(Box<Shape>),
}

impl Shape {
    /// Convenience constructor for a list of one element shape
    pub fn list(elem: Shape) -> Self {
        Shape::List(Box::new(elem))
    }

    /// Convenience constructor for a set of one element shape
    pub fn set(elem: Shape) -> Self {
        Shape::Set(Box::new(elem))
    }

    /// Convenience constructor for a string-keyed map
    pub fn map(value: Shape) -> Self {
        Shape::Map(Box::new(value))
    }

    /// Convenience constructor for a fixed-arity tuple
    pub fn tuple<I: IntoIterator<Item = Shape>>(elems: I) -> Self {
        Shape::Tuple(TupleArity::Fixed(elems.into_iter().collect()))
    }

    /// Human-readable name used in coercion errors
    pub fn expected(&self) -> String {
        match self {
            Shape::Str => "string".to_string(),
            Shape::Int => "integer".to_string(),
            Shape::Float => "float".to_string(),
            Shape::Bool => "boolean".to_string(),
            Shape::Bytes => "bytes".to_string(),
            Shape::Date => "date (ISO-8601)".to_string(),
            Shape::Time => "time (ISO-8601)".to_string(),
            Shape::DateTime => "datetime (ISO-8601)".to_string(),
            Shape::Url => "url".to_string(),
            Shape::Path(PathMode::MustExist) => "path (must exist)".to_string(),
            Shape::Path(PathMode::CreateIfMissing) => "path (auto-create)".to_string(),
            Shape::List(elem) => format!("list<{}>", elem.expected()),
            Shape::Tuple(TupleArity::Fixed(elems)) => {
                let names: Vec<String> = elems.iter().map(Shape::expected).collect();
                format!("tuple<{}>", names.join(", "))
            }
            Shape::Tuple(TupleArity::Variable(elem)) => {
                format!("tuple<{}, ...>", elem.expected())
            }
            Shape::Set(elem) => format!("set<{}>", elem.expected()),
            Shape::Map(value) => format!("map<string, {}>", value.expected()),
        }
    }

    fn is_container(&self) -> bool {
        matches!(
            self,
            Shape::List(_) | Shape::Tuple(_) | Shape::Set(_) | Shape::Map(_)
        )
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expected())
    }
}

/// A coerced, typed configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    Url(String),
    Path(PathBuf),
    List(Vec<TypedValue>),
    Tuple(Vec<TypedValue>),
    Set(Vec<TypedValue>),
    Map(IndexMap<String, TypedValue>),
}

impl TypedValue {
    /// The string value, if this is a string or URL
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(s) | TypedValue::Url(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            TypedValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            TypedValue::Path(p) => Some(p),
            _ => None,
        }
    }

    /// The elements, if this is a list, tuple, or set
    pub fn as_slice(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::List(v) | TypedValue::Tuple(v) | TypedValue::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, TypedValue>> {
        match self {
            TypedValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Human-readable kind name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Str(_) => "string",
            TypedValue::Int(_) => "integer",
            TypedValue::Float(_) => "float",
            TypedValue::Bool(_) => "boolean",
            TypedValue::Bytes(_) => "bytes",
            TypedValue::Date(_) => "date",
            TypedValue::Time(_) => "time",
            TypedValue::DateTime(_) => "datetime",
            TypedValue::Url(_) => "url",
            TypedValue::Path(_) => "path",
            TypedValue::List(_) => "list",
            TypedValue::Tuple(_) => "tuple",
            TypedValue::Set(_) => "set",
            TypedValue::Map(_) => "map",
        }
    }
}

/// Tunable container-coercion behavior.
///
/// `delimiters` is the auto-detection priority order used when a container
/// value has no explicit delimiter hint and is not a bracketed or JSON
/// literal; the first configured delimiter present in the value wins. The
/// default order is comma, pipe, newline.
#[derive(Debug, Clone)]
pub struct CoercePolicy {
    pub delimiters: Vec<char>,
}

impl Default for CoercePolicy {
    fn default() -> Self {
        Self {
            delimiters: vec![',', '|', '\n'],
        }
    }
}

/// Coerce a resolved raw string into a typed value.
///
/// `delimiter` is the per-field hint; when present it overrides both literal
/// parsing and auto-detection for the outermost container. Errors carry the
/// expected shape and the offending raw text; the binder adds the field path.
pub fn coerce(
    raw: &str,
    shape: &Shape,
    delimiter: Option<char>,
    policy: &CoercePolicy,
) -> Result<TypedValue> {
    if shape.is_container() {
        return coerce_container(raw, shape, delimiter, policy);
    }
    let trimmed = raw.trim();
    match shape {
        Shape::Str => Ok(TypedValue::Str(raw.to_string())),
        Shape::Bytes => Ok(TypedValue::Bytes(raw.as_bytes().to_vec())),
        Shape::Int => trimmed
            .parse::<i64>()
            .map(TypedValue::Int)
            .map_err(|e| coercion_err(shape, raw, e.to_string())),
        Shape::Float => trimmed
            .parse::<f64>()
            .map(TypedValue::Float)
            .map_err(|e| coercion_err(shape, raw, e.to_string())),
        Shape::Bool => match trimmed.to_lowercase().as_str() {
            "yes" | "true" | "1" | "on" => Ok(TypedValue::Bool(true)),
            "no" | "false" | "0" | "off" => Ok(TypedValue::Bool(false)),
            _ => Err(coercion_err(
                shape,
                raw,
                "expected one of yes/no/true/false/1/0/on/off",
            )),
        },
        Shape::Date => trimmed
            .parse::<NaiveDate>()
            .map(TypedValue::Date)
            .map_err(|e| coercion_err(shape, raw, e.to_string())),
        Shape::Time => trimmed
            .parse::<NaiveTime>()
            .map(TypedValue::Time)
            .map_err(|e| coercion_err(shape, raw, e.to_string())),
        Shape::DateTime => DateTime::parse_from_rfc3339(trimmed)
            .or_else(|_| {
                trimmed
                    .parse::<NaiveDateTime>()
                    .map(|naive| naive.and_utc().fixed_offset())
            })
            .map(TypedValue::DateTime)
            .map_err(|e| coercion_err(shape, raw, e.to_string())),
        Shape::Url => match validate_url(trimmed) {
            Ok(()) => Ok(TypedValue::Url(trimmed.to_string())),
            Err(reason) => Err(coercion_err(shape, raw, reason)),
        },
        Shape::Path(mode) => {
            let path = PathBuf::from(trimmed);
            match mode {
                PathMode::MustExist => {
                    if !path.exists() {
                        return Err(coercion_err(shape, raw, "path does not exist"));
                    }
                }
                PathMode::CreateIfMissing => {
                    if !path.exists() {
                        std::fs::create_dir_all(&path)
                            .map_err(|e| coercion_err(shape, raw, e.to_string()))?;
                        tracing::debug!(path = %path.display(), "Created missing directory");
                    }
                }
            }
            Ok(TypedValue::Path(path))
        }
        // Containers handled above.
        _ => unreachable!("container shapes dispatch through coerce_container"),
    }
}

fn coercion_err(shape: &Shape, raw: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::coercion(shape.expected(), truncate_raw(raw), reason)
}

/// Truncate long raw text for display in errors
fn truncate_raw(raw: &str) -> String {
    const MAX: usize = 60;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(MAX - 3).collect();
        format!("{cut}...")
    }
}

/// Syntactic URL validation: a scheme and a non-empty host are required.
fn validate_url(text: &str) -> std::result::Result<(), String> {
    let (scheme, rest) = text
        .split_once("://")
        .ok_or_else(|| "missing `scheme://`".to_string())?;
    let mut chars = scheme.chars();
    let valid_scheme = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return Err(format!("invalid scheme `{scheme}`"));
    }
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Strip userinfo and port from the authority.
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    if host.is_empty() {
        return Err("missing host".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Container coercion
// ---------------------------------------------------------------------------

/// Intermediate structural form shared by the bracketed-literal parser, the
/// JSON fallback, and delimiter splitting.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Scalar(String),
    Seq(Vec<Literal>),
    Map(IndexMap<String, Literal>),
}

fn coerce_container(
    raw: &str,
    shape: &Shape,
    delimiter: Option<char>,
    policy: &CoercePolicy,
) -> Result<TypedValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return empty_container(shape, raw);
    }

    let literal = if let Some(d) = delimiter {
        split_elements(trimmed, d)
    } else if matches!(trimmed.as_bytes()[0], b'[' | b'(' | b'{') {
        parse_bracketed(trimmed)
            .or_else(|| parse_json(trimmed))
            .ok_or_else(|| {
                coercion_err(shape, raw, "not a valid bracketed or JSON literal")
            })?
    } else {
        match policy.delimiters.iter().find(|d| trimmed.contains(**d)) {
            Some(d) => split_elements(trimmed, *d),
            None => Literal::Seq(vec![Literal::Scalar(trimmed.to_string())]),
        }
    };

    assemble(&literal, shape, raw, policy)
}

fn empty_container(shape: &Shape, raw: &str) -> Result<TypedValue> {
    match shape {
        Shape::List(_) => Ok(TypedValue::List(Vec::new())),
        Shape::Set(_) => Ok(TypedValue::Set(Vec::new())),
        Shape::Map(_) => Ok(TypedValue::Map(IndexMap::new())),
        Shape::Tuple(TupleArity::Variable(_)) => Ok(TypedValue::Tuple(Vec::new())),
        Shape::Tuple(TupleArity::Fixed(elems)) if elems.is_empty() => {
            Ok(TypedValue::Tuple(Vec::new()))
        }
        Shape::Tuple(TupleArity::Fixed(elems)) => Err(coercion_err(
            shape,
            raw,
            format!("expected {} elements, got 0", elems.len()),
        )),
        _ => unreachable!("empty_container called for non-container shape"),
    }
}

/// Split on a delimiter, tolerating one leading delimiter and trimming each
/// element (a leading delimiter is common with multi-line INI values).
fn split_elements(text: &str, delimiter: char) -> Literal {
    let text = text.strip_prefix(delimiter).unwrap_or(text);
    Literal::Seq(
        text.split(delimiter)
            .map(|e| Literal::Scalar(e.trim().to_string()))
            .collect(),
    )
}

fn assemble(
    literal: &Literal,
    shape: &Shape,
    raw: &str,
    policy: &CoercePolicy,
) -> Result<TypedValue> {
    match (shape, literal) {
        (Shape::List(elem), Literal::Seq(items)) => {
            Ok(TypedValue::List(assemble_elems(items, elem, shape, raw, policy)?))
        }
        (Shape::Set(elem), Literal::Seq(items)) => {
            let coerced = assemble_elems(items, elem, shape, raw, policy)?;
            let mut unique = Vec::with_capacity(coerced.len());
            for value in coerced {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            Ok(TypedValue::Set(unique))
        }
        (Shape::Tuple(TupleArity::Variable(elem)), Literal::Seq(items)) => {
            Ok(TypedValue::Tuple(assemble_elems(items, elem, shape, raw, policy)?))
        }
        (Shape::Tuple(TupleArity::Fixed(shapes)), Literal::Seq(items)) => {
            if items.len() != shapes.len() {
                return Err(coercion_err(
                    shape,
                    raw,
                    format!("expected {} elements, got {}", shapes.len(), items.len()),
                ));
            }
            let mut values = Vec::with_capacity(items.len());
            for (index, (item, elem_shape)) in items.iter().zip(shapes).enumerate() {
                values.push(
                    assemble(item, elem_shape, raw, policy)
                        .map_err(|e| element_err(shape, raw, index, e))?,
                );
            }
            Ok(TypedValue::Tuple(values))
        }
        (Shape::Map(value_shape), Literal::Map(entries)) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (index, (key, item)) in entries.iter().enumerate() {
                let value = assemble(item, value_shape, raw, policy)
                    .map_err(|e| element_err(shape, raw, index, e))?;
                map.insert(key.clone(), value);
            }
            Ok(TypedValue::Map(map))
        }
        (Shape::Map(_), _) => Err(coercion_err(
            shape,
            raw,
            "mapping values require a bracketed or JSON object",
        )),
        // A scalar element coming out of a literal or a split.
        (_, Literal::Scalar(s)) => coerce(s, shape, None, policy),
        (_, Literal::Seq(_)) => Err(coercion_err(
            shape,
            raw,
            "got a sequence literal where a scalar was expected",
        )),
        (_, Literal::Map(_)) => Err(coercion_err(
            shape,
            raw,
            "got a mapping literal where a sequence was expected",
        )),
    }
}

fn assemble_elems(
    items: &[Literal],
    elem: &Shape,
    container: &Shape,
    raw: &str,
    policy: &CoercePolicy,
) -> Result<Vec<TypedValue>> {
    let mut values = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        values.push(
            assemble(item, elem, raw, policy)
                .map_err(|e| element_err(container, raw, index, e))?,
        );
    }
    Ok(values)
}

/// Report the first offending element of a container coercion
fn element_err(container: &Shape, raw: &str, index: usize, inner: ConfigError) -> ConfigError {
    let detail = match &inner {
        ConfigError::Coercion { raw: elem_raw, reason, .. } => {
            format!("element {index} (`{elem_raw}`): {reason}")
        }
        other => format!("element {index}: {other}"),
    };
    coercion_err(container, raw, detail)
}

fn parse_json(text: &str) -> Option<Literal> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    Some(json_to_literal(&value))
}

fn json_to_literal(value: &serde_json::Value) -> Literal {
    match value {
        serde_json::Value::Null => Literal::Scalar(String::new()),
        serde_json::Value::Bool(b) => Literal::Scalar(b.to_string()),
        serde_json::Value::Number(n) => Literal::Scalar(n.to_string()),
        serde_json::Value::String(s) => Literal::Scalar(s.clone()),
        serde_json::Value::Array(items) => {
            Literal::Seq(items.iter().map(json_to_literal).collect())
        }
        serde_json::Value::Object(entries) => Literal::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_literal(v)))
                .collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Bracketed-literal parser
// ---------------------------------------------------------------------------

/// Parse a bracketed literal: `[a, "b"]`, `(1, 2)`, `{x, y}`, `{k: v}`.
///
/// This is a deliberately small grammar, not an expression evaluator: quoted
/// or bare atoms, nested brackets, and `key: value` pairs inside braces.
/// Returns `None` on any syntax it does not recognize so the caller can fall
/// back to JSON.
fn parse_bracketed(text: &str) -> Option<Literal> {
    let mut cursor = Cursor { text, pos: 0 };
    cursor.skip_ws();
    let literal = cursor.parse_value()?;
    cursor.skip_ws();
    if cursor.at_end() {
        Some(literal)
    } else {
        None
    }
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn parse_value(&mut self) -> Option<Literal> {
        self.skip_ws();
        match self.peek()? {
            '[' => self.parse_seq('[', ']'),
            '(' => self.parse_seq('(', ')'),
            '{' => self.parse_braced(),
            '"' => self.parse_quoted('"').map(Literal::Scalar),
            '\'' => self.parse_quoted('\'').map(Literal::Scalar),
            _ => Some(Literal::Scalar(self.parse_bare(&[',', ']', ')', '}']))),
        }
    }

    fn parse_seq(&mut self, open: char, close: char) -> Option<Literal> {
        debug_assert_eq!(self.peek(), Some(open));
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek()? {
                c if c == close => {
                    self.bump();
                    return Some(Literal::Seq(items));
                }
                ',' => {
                    // Tolerate a trailing comma before the close.
                    self.bump();
                }
                _ => {
                    let before = self.pos;
                    let item = self.parse_value()?;
                    // A mismatched closing bracket makes no progress; treat
                    // it as a syntax error instead of spinning.
                    if self.pos == before {
                        return None;
                    }
                    items.push(item);
                }
            }
        }
    }

    /// `{...}` is a mapping when the first element is followed by `:`,
    /// otherwise a set-style sequence.
    fn parse_braced(&mut self) -> Option<Literal> {
        debug_assert_eq!(self.peek(), Some('{'));
        self.bump();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Some(Literal::Map(IndexMap::new()));
        }

        let first_key = self.parse_map_key()?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.bump();
            let mut entries = IndexMap::new();
            entries.insert(first_key, self.parse_value()?);
            loop {
                self.skip_ws();
                match self.peek()? {
                    '}' => {
                        self.bump();
                        return Some(Literal::Map(entries));
                    }
                    ',' => {
                        self.bump();
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.bump();
                            return Some(Literal::Map(entries));
                        }
                        let key = self.parse_map_key()?;
                        self.skip_ws();
                        if self.bump()? != ':' {
                            return None;
                        }
                        entries.insert(key, self.parse_value()?);
                    }
                    _ => return None,
                }
            }
        }

        // Set-style braces.
        let mut items = vec![Literal::Scalar(first_key)];
        loop {
            self.skip_ws();
            match self.peek()? {
                '}' => {
                    self.bump();
                    return Some(Literal::Seq(items));
                }
                ',' => {
                    self.bump();
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.bump();
                        return Some(Literal::Seq(items));
                    }
                    items.push(self.parse_value()?);
                }
                _ => return None,
            }
        }
    }

    fn parse_map_key(&mut self) -> Option<String> {
        self.skip_ws();
        match self.peek()? {
            '"' => self.parse_quoted('"'),
            '\'' => self.parse_quoted('\''),
            _ => Some(self.parse_bare(&[',', ':', '}'])),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Option<String> {
        debug_assert_eq!(self.peek(), Some(quote));
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(value),
                '\\' => match self.bump()? {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    other => value.push(other),
                },
                other => value.push(other),
            }
        }
    }

    fn parse_bare(&mut self, stop: &[char]) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if stop.contains(&c) {
                break;
            }
            self.bump();
        }
        self.text[start..self.pos].trim().to_string()
    }
}
