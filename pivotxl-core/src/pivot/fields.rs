//! Header-driven field discovery and axis classification.

use crate::error::{PivotxlError, Result};
use crate::pivot::range::NormalizedRange;
use crate::utils::coordinate_from_row_col;
use crate::workbook::Workbook;

/// Role of a source field inside a pivot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldAxis {
    Row,
    Column,
    Data,
    None,
}

/// Read the header row of `data_range` into field names, left to right.
///
/// The result has one entry per column of the range. Duplicate names are
/// kept as they are.
pub fn field_order(workbook: &Workbook, data_range: &str) -> Result<Vec<String>> {
    let range = NormalizedRange::parse(data_range).map_err(|e| e.for_parameter("DataRange"))?;
    header_names(workbook, &range)
}

pub(crate) fn header_names(workbook: &Workbook, range: &NormalizedRange) -> Result<Vec<String>> {
    let sheet = workbook.get_sheet_by_name(&range.sheet)?;
    (range.x1..=range.x2)
        .map(|col| match sheet.get_cell_value(range.y1, col) {
            None => Ok(String::new()),
            Some(value) => value.display_text().ok_or_else(|| PivotxlError::CellRead {
                sheet: range.sheet.clone(),
                cell: coordinate_from_row_col(range.y1, col),
                reason: "formula cell has no cached value".to_string(),
            }),
        })
        .collect()
}

/// Positions of `names` in `order`, first occurrence wins. Names that are not
/// in the header are skipped.
pub fn field_indices<S: AsRef<str>>(names: &[S], order: &[String]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| order.iter().position(|field| field == name.as_ref()))
        .collect()
}

/// Classify every header field, in header order. A name listed for more than
/// one role takes the first of row, column, data.
pub fn classify_fields<S: AsRef<str>>(
    order: &[String],
    rows: &[S],
    columns: &[S],
    data: &[S],
) -> Vec<FieldAxis> {
    let contains = |list: &[S], name: &str| list.iter().any(|n| n.as_ref() == name);
    order
        .iter()
        .map(|name| {
            if contains(rows, name) {
                FieldAxis::Row
            } else if contains(columns, name) {
                FieldAxis::Column
            } else if contains(data, name) {
                FieldAxis::Data
            } else {
                FieldAxis::None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    fn header() -> Vec<String> {
        ["Month", "Year", "Type", "Sales", "Region"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn workbook_with_header() -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws.set_row(1, 1, ["Month", "Year", "Type", "Sales", "Region"]);
        ws.set_row(2, 1, [CellValue::from("Jan"), CellValue::Number(2017.0)]);
        wb
    }

    #[test]
    fn test_field_order_reads_top_row() {
        let wb = workbook_with_header();
        assert_eq!(field_order(&wb, "Sheet1!$A$1:$E$31").unwrap(), header());
        // Corner order does not matter.
        assert_eq!(field_order(&wb, "Sheet1!$E$31:$A$1").unwrap(), header());
    }

    #[test]
    fn test_field_order_covers_full_width() {
        let wb = workbook_with_header();
        let order = field_order(&wb, "Sheet1!B1:G3").unwrap();
        assert_eq!(order, vec!["Year", "Type", "Sales", "Region", "", ""]);
    }

    #[test]
    fn test_field_order_renders_non_text_headers() {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws.set_row(1, 1, [CellValue::Number(2017.0), CellValue::Boolean(false)]);
        assert_eq!(field_order(&wb, "Sheet1!A1:B2").unwrap(), vec!["2017", "FALSE"]);
    }

    #[test]
    fn test_field_order_formula_header_fails() {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws.set_cell_value(1, 2, CellValue::formula("UPPER(\"x\")"));
        let err = field_order(&wb, "Sheet1!A1:B2").unwrap_err();
        assert!(matches!(err, PivotxlError::CellRead { ref cell, .. } if cell == "B1"));
    }

    #[test]
    fn test_field_order_uses_cached_formula_result() {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws.set_cell_value(1, 1, CellValue::from("Month"));
        ws.set_cell_value(
            1,
            2,
            CellValue::formula_with_cached(r#""Ye"&"ar""#, CellValue::from("Year")),
        );
        assert_eq!(field_order(&wb, "Sheet1!A1:B2").unwrap(), vec!["Month", "Year"]);
    }

    #[test]
    fn test_field_order_missing_sheet() {
        let wb = workbook_with_header();
        let err = field_order(&wb, "Nope!A1:B2").unwrap_err();
        assert!(matches!(err, PivotxlError::WorksheetNotFound(_)));
    }

    #[test]
    fn test_field_indices() {
        let order = header();
        assert_eq!(field_indices(&["Year", "Sales"], &order), vec![1, 3]);
        assert_eq!(field_indices(&["NotAColumn"], &order), Vec::<usize>::new());
        assert_eq!(field_indices(&["Sales", "Bogus", "Month"], &order), vec![3, 0]);
    }

    #[test]
    fn test_field_indices_first_duplicate_wins() {
        let order: Vec<String> = ["A", "B", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(field_indices(&["A"], &order), vec![0]);
    }

    #[test]
    fn test_classify_fields() {
        let axes = classify_fields(&header(), &["Month", "Year"], &["Type"], &["Sales"]);
        assert_eq!(
            axes,
            vec![FieldAxis::Row, FieldAxis::Row, FieldAxis::Column, FieldAxis::Data, FieldAxis::None]
        );
    }

    #[test]
    fn test_classify_overlap_uses_priority() {
        let axes = classify_fields(&header(), &["Type"], &["Type", "Sales"], &["Sales", "Type"]);
        assert_eq!(axes[2], FieldAxis::Row);
        assert_eq!(axes[3], FieldAxis::Column);
    }
}
