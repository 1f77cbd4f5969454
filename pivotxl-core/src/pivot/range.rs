//! `Sheet!Range` references.

use std::fmt;

use crate::error::{PivotxlError, Result};
use crate::utils::{coordinate_from_row_col, parse_range};

/// A sheet-qualified rectangle with `x` = column and `y` = row, 1-indexed.
///
/// Always satisfies `x1 <= x2` and `y1 <= y2`, and never covers a single
/// cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedRange {
    pub sheet: String,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl NormalizedRange {
    /// Parse and normalize a `Sheet!Range` reference.
    ///
    /// `$` anchors are ignored and the sheet name may be single-quoted.
    /// Reversed corners are corrected per axis, so `Sheet1!$E$31:$A$1` and
    /// `Sheet1!C1:B3` resolve to `A1:E31` and `B1:C3`.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let (sheet, cells) = reference.rsplit_once('!').ok_or_else(|| PivotxlError::RangeFormat {
            range: reference.to_string(),
            reason: "expected a Sheet!Range reference".to_string(),
        })?;

        let sheet = unquote_sheet_name(sheet);
        if sheet.is_empty() {
            return Err(PivotxlError::RangeFormat {
                range: reference.to_string(),
                reason: "sheet name is empty".to_string(),
            });
        }

        let ((r1, c1), (r2, c2)) = parse_range(cells).map_err(|e| PivotxlError::RangeFormat {
            range: reference.to_string(),
            reason: e.to_string(),
        })?;

        if r1 == r2 && c1 == c2 {
            return Err(PivotxlError::RangeDegenerate(reference.to_string()));
        }

        Ok(NormalizedRange {
            sheet,
            x1: c1.min(c2),
            y1: r1.min(r2),
            x2: c1.max(c2),
            y2: r1.max(r2),
        })
    }

    pub fn top_left(&self) -> String {
        coordinate_from_row_col(self.y1, self.x1)
    }

    pub fn bottom_right(&self) -> String {
        coordinate_from_row_col(self.y2, self.x2)
    }

    /// The unanchored cell reference, e.g. `A1:E31`.
    pub fn cell_ref(&self) -> String {
        format!("{}:{}", self.top_left(), self.bottom_right())
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }
}

impl fmt::Display for NormalizedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sheet.chars().all(|c| c.is_alphanumeric() || c == '_') {
            write!(f, "{}!{}", self.sheet, self.cell_ref())
        } else {
            write!(f, "'{}'!{}", self.sheet.replace('\'', "''"), self.cell_ref())
        }
    }
}

fn unquote_sheet_name(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_corners_normalize() {
        let reversed = NormalizedRange::parse("Sheet1!$E$31:$A$1").unwrap();
        let forward = NormalizedRange::parse("Sheet1!$A$1:$E$31").unwrap();
        assert_eq!(reversed, forward);
        assert_eq!(forward.cell_ref(), "A1:E31");
        assert_eq!((forward.x1, forward.y1, forward.x2, forward.y2), (1, 1, 5, 31));
        assert_eq!(forward.width(), 5);
        assert_eq!(forward.height(), 31);
    }

    #[test]
    fn test_axes_swap_independently() {
        // Top-right to bottom-left: only the columns are reversed.
        let range = NormalizedRange::parse("Sheet1!C1:B3").unwrap();
        assert_eq!(range.cell_ref(), "B1:C3");
        let range = NormalizedRange::parse("Sheet1!B3:C1").unwrap();
        assert_eq!(range.cell_ref(), "B1:C3");
    }

    #[test]
    fn test_single_cell_is_degenerate() {
        let err = NormalizedRange::parse("Sheet1!$A$1:$A$1").unwrap_err();
        assert!(matches!(err, PivotxlError::RangeDegenerate(_)));
    }

    #[test]
    fn test_single_row_or_column_is_allowed() {
        assert!(NormalizedRange::parse("Sheet1!A1:E1").is_ok());
        assert!(NormalizedRange::parse("Sheet1!A1:A9").is_ok());
    }

    #[test]
    fn test_format_errors() {
        for bad in ["A1:E31", "Sheet1!", "Sheet1!A1", "Sheet1!A1:ZZZZ1", "!A1:B2", "", "Sheet1!A1-B2"] {
            let err = NormalizedRange::parse(bad).unwrap_err();
            assert!(
                matches!(err, PivotxlError::RangeFormat { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_quoted_sheet_names() {
        let range = NormalizedRange::parse("'Q1 Sales'!$A$1:$B$4").unwrap();
        assert_eq!(range.sheet, "Q1 Sales");
        assert_eq!(range.to_string(), "'Q1 Sales'!A1:B4");

        let range = NormalizedRange::parse("'Bob''s'!A1:B2").unwrap();
        assert_eq!(range.sheet, "Bob's");
        assert_eq!(range.to_string(), "'Bob''s'!A1:B2");

        assert_eq!(NormalizedRange::parse("Sheet1!A1:B2").unwrap().to_string(), "Sheet1!A1:B2");
    }
}
