//! Pivot table compilation.
//!
//! A [`PivotTableSpec`] names a source range, a placement range and the
//! header fields to put on the row, column and data axes. Adding it to a
//! workbook produces a `pivotCacheDefinition` part describing the source, a
//! `pivotTableDefinition` part laying out the table, and the relationship,
//! content-type and `<pivotCaches>` entries that tie them into the package.

pub mod cache;
pub mod fields;
pub mod parse;
pub mod range;
pub mod registrar;
pub mod table;

pub use cache::PivotCacheDefinition;
pub use fields::{classify_fields, field_indices, field_order, FieldAxis};
pub use parse::{PivotCacheInfo, PivotTableInfo};
pub use range::NormalizedRange;
pub use registrar::PivotIds;
pub use table::{PivotLocation, PivotTableDefinition, PivotTableStyle};

use crate::error::{PivotxlError, Result};
use crate::workbook::Workbook;

pub(crate) const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// What to summarize and where to put it.
///
/// Field names refer to the header row (the top row) of `data_range`. Names
/// that are not in the header are ignored. A name listed on more than one
/// axis lands on the first of rows, columns, data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PivotTableSpec {
    /// Source data, e.g. `Sheet1!$A$1:$E$31`.
    pub data_range: String,
    /// Placement, e.g. `Sheet1!$G$2:$M$34`.
    pub pivot_table_range: String,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub data: Vec<String>,
    /// Report filter fields. Accepted for compatibility and not used.
    pub page: Vec<String>,
}

impl PivotTableSpec {
    pub fn new(data_range: impl Into<String>, pivot_table_range: impl Into<String>) -> Self {
        PivotTableSpec {
            data_range: data_range.into(),
            pivot_table_range: pivot_table_range.into(),
            ..Default::default()
        }
    }

    pub fn rows<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn data<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn page<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.page = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Resolved inputs of one pivot table, checked before anything is stored.
#[derive(Debug)]
struct Validated {
    data: NormalizedRange,
    location: NormalizedRange,
    sheet_part: String,
}

fn validate(workbook: &Workbook, spec: &PivotTableSpec) -> Result<Validated> {
    if spec.data_range.trim().is_empty() {
        return Err(PivotxlError::Configuration("DataRange".to_string()));
    }
    if spec.pivot_table_range.trim().is_empty() {
        return Err(PivotxlError::Configuration("PivotTableRange".to_string()));
    }

    let data = NormalizedRange::parse(&spec.data_range).map_err(|e| e.for_parameter("DataRange"))?;
    let location = NormalizedRange::parse(&spec.pivot_table_range)
        .map_err(|e| e.for_parameter("PivotTableRange"))?;

    workbook.get_sheet_by_name(&data.sheet)?;
    let sheet_part = workbook.sheet_part_path(&location.sheet)?;

    Ok(Validated {
        data,
        location,
        sheet_part,
    })
}

/// Compile `spec` into pivot parts and register them with the workbook.
pub(crate) fn add_pivot_table(workbook: &mut Workbook, spec: &PivotTableSpec) -> Result<PivotIds> {
    let checked = validate(workbook, spec)?;
    let order = fields::header_names(workbook, &checked.data)?;

    let ids = PivotIds::allocate(&workbook.package, &workbook.pivot_caches);
    log::debug!(
        "adding pivot table {} (cache part {}, cacheId {}) at {}",
        ids.table,
        ids.cache_part,
        ids.cache_id,
        checked.location
    );

    let cache = PivotCacheDefinition::new(&checked.data, order.clone());
    workbook.package.put_part(&ids.cache_part_path(), cache.to_xml()?);

    let entry = registrar::register_workbook_cache(&mut workbook.package, &mut workbook.pivot_caches, &ids);
    log::debug!("registered cacheId {} as {}", entry.cache_id, entry.r_id);
    registrar::register_table_cache(&mut workbook.package, &ids);

    let table = PivotTableDefinition::build(ids.table, entry.cache_id, &checked.location, &order, spec);
    workbook.package.put_part(&ids.table_part(), table.to_xml()?);

    registrar::register_sheet_table(&mut workbook.package, &checked.sheet_part, &ids);
    registrar::register_content_types(&mut workbook.package, &ids);

    Ok(ids)
}
