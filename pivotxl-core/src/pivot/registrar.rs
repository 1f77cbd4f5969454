//! Identifier allocation and package registration for new pivot parts.

use crate::package::{Package, CT_PIVOT_CACHE, CT_PIVOT_TABLE};
use crate::relationships::{rels_path_for, REL_PIVOT_CACHE, REL_PIVOT_TABLE};
use crate::writer::PivotCacheEntry;

pub(crate) const WORKBOOK_PART: &str = "xl/workbook.xml";
const TABLE_PART_PREFIX: &str = "xl/pivotTables/pivotTable";
const CACHE_PART_PREFIX: &str = "xl/pivotCache/pivotCacheDefinition";

/// Identifiers reserved for one new pivot table and its cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PivotIds {
    /// File suffix of `xl/pivotTables/pivotTable<N>.xml`.
    pub table: usize,
    /// File suffix of `xl/pivotCache/pivotCacheDefinition<N>.xml`.
    pub cache_part: usize,
    /// `cacheId` shared by `workbook.xml` and the table definition.
    pub cache_id: u32,
}

impl PivotIds {
    /// Reserve the next identifiers.
    ///
    /// File suffixes count the existing parts of each kind, so they stay dense
    /// as long as no pivot part was ever removed. The cache id is one past
    /// the highest id already registered and can drift from the suffixes.
    pub fn allocate(package: &Package, caches: &[PivotCacheEntry]) -> Self {
        PivotIds {
            table: package.count_parts(TABLE_PART_PREFIX) + 1,
            cache_part: package.count_parts(CACHE_PART_PREFIX) + 1,
            cache_id: caches.iter().map(|c| c.cache_id).max().unwrap_or(0) + 1,
        }
    }

    pub fn table_part(&self) -> String {
        table_part_path(self.table)
    }

    pub fn cache_part_path(&self) -> String {
        cache_part_path(self.cache_part)
    }
}

pub fn table_part_path(suffix: usize) -> String {
    format!("{}{}.xml", TABLE_PART_PREFIX, suffix)
}

pub fn cache_part_path(suffix: usize) -> String {
    format!("{}{}.xml", CACHE_PART_PREFIX, suffix)
}

/// Link the cache part from `workbook.xml` and add its `<pivotCache>` entry.
pub(crate) fn register_workbook_cache(
    package: &mut Package,
    caches: &mut Vec<PivotCacheEntry>,
    ids: &PivotIds,
) -> PivotCacheEntry {
    let target = format!("pivotCache/pivotCacheDefinition{}.xml", ids.cache_part);
    let r_id = package.add_relationship(WORKBOOK_PART, REL_PIVOT_CACHE, &target);
    let entry = PivotCacheEntry {
        cache_id: ids.cache_id,
        r_id,
    };
    caches.push(entry.clone());
    entry
}

/// Link the table part to the cache it summarizes.
pub(crate) fn register_table_cache(package: &mut Package, ids: &PivotIds) -> String {
    let target = format!("../pivotCache/pivotCacheDefinition{}.xml", ids.cache_part);
    package.add_relationship(&ids.table_part(), REL_PIVOT_CACHE, &target)
}

/// Link the hosting worksheet part to the table part.
pub(crate) fn register_sheet_table(package: &mut Package, sheet_part: &str, ids: &PivotIds) -> String {
    let target = format!("../pivotTables/pivotTable{}.xml", ids.table);
    package.add_relationship(sheet_part, REL_PIVOT_TABLE, &target)
}

pub(crate) fn register_content_types(package: &mut Package, ids: &PivotIds) {
    let types = package.content_types_mut();
    types.add_override(&ids.table_part(), CT_PIVOT_TABLE);
    types.add_override(&ids.cache_part_path(), CT_PIVOT_CACHE);
}

/// Where the relationships of a pivot table part are stored.
pub fn table_rels_path(suffix: usize) -> String {
    rels_path_for(&table_part_path(suffix))
}
