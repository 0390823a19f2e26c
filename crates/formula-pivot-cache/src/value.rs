use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Spreadsheet error values that can appear in source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    NA,
}

impl ErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::Null => "#NULL!",
            ErrorKind::Div0 => "#DIV/0!",
            ErrorKind::Value => "#VALUE!",
            ErrorKind::Ref => "#REF!",
            ErrorKind::Name => "#NAME?",
            ErrorKind::Num => "#NUM!",
            ErrorKind::NA => "#N/A",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// The payload of a [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Scalar {
    Empty,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Error(ErrorKind),
}

/// An immutable cell value as delivered by a cache source.
///
/// Cloning is cheap: text and number formats are reference counted, so the same value can be
/// shared between inline record storage and field dictionaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    scalar: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    format: Option<Arc<str>>,
}

impl Value {
    pub fn new(scalar: Scalar) -> Self {
        Self {
            scalar,
            format: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Scalar::Empty)
    }

    pub fn number(n: f64) -> Self {
        Self::new(Scalar::Number(n))
    }

    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Self::new(Scalar::Text(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::new(Scalar::Bool(b))
    }

    pub fn error(kind: ErrorKind) -> Self {
        Self::new(Scalar::Error(kind))
    }

    /// Attach a display format (e.g. `yyyy-mm-dd`). The format never affects identity or ordering.
    pub fn with_format(mut self, format: impl Into<Arc<str>>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn scalar(&self) -> &Scalar {
        &self.scalar
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.scalar {
            Scalar::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.scalar {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.scalar, Scalar::Empty)
    }

    /// Hashable identity used for dictionary lookups.
    pub fn key(&self) -> ValueKey {
        match &self.scalar {
            Scalar::Empty => ValueKey::Empty,
            Scalar::Bool(b) => ValueKey::Bool(*b),
            Scalar::Number(n) => ValueKey::Number(OrderedFloat(canonical_number(*n))),
            Scalar::Text(s) => ValueKey::Text(s.clone()),
            Scalar::Error(e) => ValueKey::Error(*e),
        }
    }

    /// Display-oriented string (not a stable serialization).
    pub fn display_string(&self) -> String {
        match &self.scalar {
            Scalar::Empty => String::new(),
            Scalar::Bool(true) => "TRUE".to_string(),
            Scalar::Bool(false) => "FALSE".to_string(),
            Scalar::Number(n) => display_number(*n),
            Scalar::Text(s) => s.to_string(),
            Scalar::Error(e) => e.as_code().to_string(),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self.scalar {
            Scalar::Number(_) => 0,
            Scalar::Text(_) => 1,
            Scalar::Bool(_) => 2,
            Scalar::Error(_) => 3,
            Scalar::Empty => 4,
        }
    }

    /// Total ordering across value kinds: numbers, text, booleans, errors, then empty.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (&self.scalar, &other.scalar) {
            (Scalar::Number(a), Scalar::Number(b)) => {
                canonical_number(*a).total_cmp(&canonical_number(*b))
            }
            (Scalar::Text(a), Scalar::Text(b)) => match cmp_text_case_insensitive(a, b) {
                Ordering::Equal => a.cmp(b),
                ord => ord,
            },
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Error(a), Scalar::Error(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Like [`Value::total_cmp`], with a missing value (`None`) ordered after everything.
    pub fn cmp_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => a.total_cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::text(value)
    }
}

/// Identity of a [`Value`] ignoring its display format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Empty,
    Bool(bool),
    Number(OrderedFloat<f64>),
    Text(Arc<str>),
    Error(ErrorKind),
}

/// Treat `-0.0` as `0.0` and collapse NaN payloads so equal-looking numbers share one item.
fn canonical_number(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else if n.is_nan() {
        f64::NAN
    } else {
        n
    }
}

fn display_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn cmp_text_case_insensitive(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        let a = a.bytes().map(|c| c.to_ascii_uppercase());
        let b = b.bytes().map(|c| c.to_ascii_uppercase());
        return a.cmp(b);
    }

    let a = a.chars().flat_map(char::to_uppercase);
    let b = b.chars().flat_map(char::to_uppercase);
    a.cmp(b)
}
