//! Cell values.

use std::fmt;
use std::sync::Arc;

/// Shared, immutable string storage for cell text.
pub type InternedString = Arc<str>;

/// The value held by a worksheet cell.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    String(InternedString),
    Number(f64),
    Boolean(bool),
    /// ISO 8601 text as stored in `t="d"` cells.
    Date(String),
    /// Formula text without the leading `=`, plus the result last computed
    /// by a spreadsheet application when the file carried one in `<v>`.
    Formula {
        formula: String,
        cached: Option<Box<CellValue>>,
    },
}

impl CellValue {
    /// A formula with no cached result.
    pub fn formula(formula: impl Into<String>) -> Self {
        CellValue::Formula {
            formula: formula.into(),
            cached: None,
        }
    }

    /// A formula together with its last computed result. An empty result is
    /// not kept.
    pub fn formula_with_cached(formula: impl Into<String>, cached: CellValue) -> Self {
        CellValue::Formula {
            formula: formula.into(),
            cached: (!cached.is_empty()).then(|| Box::new(cached)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Render the value the way a spreadsheet shows it in a header cell.
    ///
    /// Formulas render their cached result. Returns `None` for a formula
    /// without one, whose displayed value is unknown without a calculation
    /// engine.
    pub fn display_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => Some(String::new()),
            CellValue::String(s) => Some(s.to_string()),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Boolean(true) => Some("TRUE".to_string()),
            CellValue::Boolean(false) => Some("FALSE".to_string()),
            CellValue::Date(d) => Some(d.clone()),
            CellValue::Formula { cached, .. } => cached.as_ref().and_then(|c| c.display_text()),
        }
    }
}

/// Format a number the way it is written to `<v>` elements: integral values
/// without a fractional part, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        let mut buf = itoa::Buffer::new();
        buf.format(n as i64).to_string()
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(n).to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Formula { formula, .. } => write!(f, "={}", formula),
            other => f.write_str(&other.display_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(Arc::from(s))
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(Arc::from(s))
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}
