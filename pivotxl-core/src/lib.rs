//! # pivotxl-core
//!
//! Pivot tables for xlsx workbooks.
//!
//! A [`Workbook`] holds worksheets and a [`Package`] of the parts that are
//! not regenerated from cells on save. [`Workbook::add_pivot_table`] compiles
//! a [`PivotTableSpec`] into a pivot cache definition and a pivot table
//! definition, and wires both into the package.
//!
//! ```no_run
//! use pivotxl_core::{PivotTableSpec, Workbook};
//!
//! let mut wb = Workbook::new();
//! let ws = wb.create_sheet(Some("Sheet1".to_string()))?;
//! ws.set_row(1, 1, ["Month", "Year", "Type", "Sales", "Region"]);
//!
//! wb.add_pivot_table(
//!     &PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$G$2:$M$34")
//!         .rows(["Month", "Year"])
//!         .columns(["Type"])
//!         .data(["Sales"]),
//! )?;
//! wb.save("Book1.xlsx")?;
//! # Ok::<(), pivotxl_core::PivotxlError>(())
//! ```

pub mod cell;
pub mod error;
pub mod package;
pub mod pivot;
pub mod relationships;
pub mod utils;
pub mod workbook;
pub mod worksheet;
pub mod writer;

pub use cell::{CellValue, InternedString};
pub use error::{PivotxlError, Result};
pub use package::{ContentTypes, Package};
pub use pivot::{
    FieldAxis, NormalizedRange, PivotCacheDefinition, PivotCacheInfo, PivotTableDefinition,
    PivotTableInfo, PivotTableSpec,
};
pub use relationships::{Relationship, Relationships};
pub use utils::{column_to_letter, coordinate_from_row_col, letter_to_column, parse_coordinate};
pub use workbook::{CompressionLevel, NamedRange, Workbook};
pub use worksheet::Worksheet;
pub use writer::PivotCacheEntry;
