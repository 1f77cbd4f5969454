use pivotxl_core::pivot::{classify_fields, field_indices, field_order};
use pivotxl_core::{CellValue, FieldAxis, NormalizedRange, PivotTableSpec, PivotxlError, Workbook};
use std::io::{Cursor, Read, Write};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const TYPES: [&str; 4] = ["Meat", "Dairy", "Beverages", "Produce"];
const REGIONS: [&str; 4] = ["East", "West", "North", "South"];

/// A sales table on Sheet1!A1:E31 with a header row.
fn sales_workbook() -> Workbook {
    let mut wb = Workbook::new();
    let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
    ws.set_row(1, 1, ["Month", "Year", "Type", "Sales", "Region"]);
    for row in 2..=31u32 {
        let i = row as usize;
        ws.set_cell_value(row, 1, CellValue::from(MONTHS[i % 12]));
        ws.set_cell_value(row, 2, CellValue::Number(2017.0 + (i % 3) as f64));
        ws.set_cell_value(row, 3, CellValue::from(TYPES[i % 4]));
        ws.set_cell_value(row, 4, CellValue::Number((i * 137 % 5000) as f64));
        ws.set_cell_value(row, 5, CellValue::from(REGIONS[i % 4]));
    }
    wb
}

fn sales_spec() -> PivotTableSpec {
    PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$G$2:$M$34")
        .rows(["Month", "Year"])
        .columns(["Type"])
        .data(["Sales"])
}

#[test]
fn test_reversed_corners_normalize() {
    let forward = NormalizedRange::parse("Sheet1!$A$1:$E$31").unwrap();
    let reversed = NormalizedRange::parse("Sheet1!$E$31:$A$1").unwrap();
    assert_eq!(forward, reversed);
    assert_eq!(reversed.cell_ref(), "A1:E31");
}

#[test]
fn test_single_cell_range_is_degenerate() {
    let err = NormalizedRange::parse("Sheet1!$A$1:$A$1").unwrap_err();
    assert!(matches!(err, PivotxlError::RangeDegenerate(_)));
}

#[test]
fn test_header_extraction_and_classification() {
    let wb = sales_workbook();
    let order = field_order(&wb, "Sheet1!$A$1:$E$31").unwrap();
    assert_eq!(order, vec!["Month", "Year", "Type", "Sales", "Region"]);

    assert_eq!(field_indices(&["Year", "Sales"], &order), vec![1, 3]);
    assert!(field_indices(&["NotAColumn"], &order).is_empty());

    let axes = classify_fields(&order, &["Month", "Year"], &["Type"], &["Sales"]);
    assert_eq!(
        axes,
        vec![FieldAxis::Row, FieldAxis::Row, FieldAxis::Column, FieldAxis::Data, FieldAxis::None]
    );
}

#[test]
fn test_add_pivot_table_layout() {
    let mut wb = sales_workbook();
    wb.add_pivot_table(&sales_spec()).unwrap();

    let tables = wb.pivot_tables().unwrap();
    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert_eq!(table.path, "xl/pivotTables/pivotTable1.xml");
    assert_eq!(table.name.as_deref(), Some("Pivot Table1"));
    assert_eq!(table.cache_id, Some(1));
    assert_eq!(table.location_ref.as_deref(), Some("G2:M34"));
    assert_eq!(table.row_fields, vec![0, 1]);
    assert_eq!(table.col_fields, vec![2]);
    assert_eq!(table.data_fields, vec![3]);
    assert_eq!(table.fields.len(), 5);

    let caches = wb.pivot_cache_definitions().unwrap();
    assert_eq!(caches.len(), 1);
    assert_eq!(caches[0].source_ref.as_deref(), Some("A1:E31"));
    assert_eq!(caches[0].source_sheet.as_deref(), Some("Sheet1"));
    assert!(caches[0].refresh_on_load);
}

#[test]
fn test_successive_tables_take_next_suffix() {
    let mut wb = sales_workbook();
    wb.add_pivot_table(&sales_spec()).unwrap();
    wb.add_pivot_table(
        &PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$O$2:$S$20")
            .rows(["Region"])
            .data(["Sales"]),
    )
    .unwrap();

    let pkg = wb.package();
    assert!(pkg.contains_part("xl/pivotTables/pivotTable2.xml"));
    assert!(pkg.contains_part("xl/pivotCache/pivotCacheDefinition2.xml"));

    let ids: Vec<u32> = wb.pivot_caches().iter().map(|c| c.cache_id).collect();
    assert_eq!(ids, vec![1, 2]);

    let second = &wb.pivot_tables().unwrap()[1];
    assert_eq!(second.name.as_deref(), Some("Pivot Table2"));
    assert_eq!(second.cache_id, Some(2));
    assert!(second.col_fields.is_empty());

    let sheet_rels = pkg.relationships("xl/worksheets/sheet1.xml").unwrap();
    let targets: Vec<&str> = sheet_rels.iter().map(|r| r.target.as_str()).collect();
    assert_eq!(
        targets,
        vec!["../pivotTables/pivotTable1.xml", "../pivotTables/pivotTable2.xml"]
    );
}

#[test]
fn test_unknown_names_are_dropped() {
    let mut wb = sales_workbook();
    wb.add_pivot_table(
        &PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$G$2:$M$34")
            .rows(["Month", "NotAColumn"])
            .data(["Sales"]),
    )
    .unwrap();

    let table = &wb.pivot_tables().unwrap()[0];
    assert_eq!(table.row_fields, vec![0]);
    assert_eq!(table.data_fields, vec![3]);
}

#[test]
fn test_empty_spec_writes_nothing() {
    let mut wb = sales_workbook();
    let before = wb.package().part_count();

    let err = wb.add_pivot_table(&PivotTableSpec::default()).unwrap_err();
    assert!(matches!(err, PivotxlError::Configuration(_)));
    assert_eq!(wb.package().part_count(), before);
    assert!(wb.pivot_caches().is_empty());
}

#[test]
fn test_missing_pivot_sheet_writes_nothing() {
    let mut wb = sales_workbook();
    let before = wb.package().part_count();

    let err = wb
        .add_pivot_table(&PivotTableSpec::new("Sheet1!$A$1:$E$31", "Report!$G$2:$M$34").rows(["Month"]))
        .unwrap_err();
    assert!(matches!(err, PivotxlError::WorksheetNotFound(ref name) if name == "Report"));
    assert_eq!(wb.package().part_count(), before);
}

#[test]
fn test_bad_range_names_parameter() {
    let mut wb = sales_workbook();
    let err = wb
        .add_pivot_table(&PivotTableSpec::new("Sheet1!A1", "Sheet1!$G$2:$M$34"))
        .unwrap_err();
    assert!(err.to_string().contains("DataRange"));
    assert!(matches!(err.root_cause(), PivotxlError::RangeFormat { .. }));
}

#[test]
fn test_save_and_reload_keeps_pivot_parts() {
    let mut wb = sales_workbook();
    wb.add_pivot_table(&sales_spec()).unwrap();

    let temp_file = NamedTempFile::new().unwrap();
    let temp_path = temp_file.path().to_str().unwrap();
    wb.save(temp_path).unwrap();

    let mut loaded = Workbook::load(temp_path).unwrap();
    assert_eq!(loaded.sheet_names(), &["Sheet1".to_string()]);
    assert_eq!(
        loaded.get_sheet_by_name("Sheet1").unwrap().get_cell("A1").unwrap(),
        Some(&CellValue::from("Month"))
    );

    let pkg = loaded.package();
    assert!(pkg.contains_part("xl/pivotTables/pivotTable1.xml"));
    assert!(pkg.contains_part("xl/pivotCache/pivotCacheDefinition1.xml"));
    assert!(pkg.relationships("xl/pivotTables/pivotTable1.xml").is_some());
    assert!(pkg
        .content_types()
        .override_for("/xl/pivotTables/pivotTable1.xml")
        .is_some());
    assert_eq!(loaded.pivot_caches().len(), 1);
    assert_eq!(loaded.pivot_caches()[0].cache_id, 1);

    loaded
        .add_pivot_table(
            &PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$O$2:$S$20")
                .rows(["Type"])
                .data(["Sales"]),
        )
        .unwrap();
    let tables = loaded.pivot_tables().unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[1].path, "xl/pivotTables/pivotTable2.xml");
    assert_eq!(tables[1].cache_id, Some(2));

    // A second round trip still carries both tables.
    let bytes = loaded.save_to_bytes().unwrap();
    let again = Workbook::load_from_bytes(&bytes).unwrap();
    assert_eq!(again.pivot_tables().unwrap().len(), 2);
    assert_eq!(again.pivot_caches().len(), 2);
}

/// Replace the `<c>` element at `cell` in `part` of a saved package.
fn replace_cell_xml(bytes: &[u8], part: &str, cell: &str, replacement: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();

        if name == part {
            let xml = String::from_utf8(data).unwrap();
            let start = xml.find(&format!("<c r=\"{}\"", cell)).unwrap();
            let end = start + xml[start..].find("</c>").unwrap() + "</c>".len();
            data = format!("{}{}{}", &xml[..start], replacement, &xml[end..]).into_bytes();
        }

        out.start_file(name, SimpleFileOptions::default()).unwrap();
        out.write_all(&data).unwrap();
    }
    out.finish().unwrap().into_inner()
}

#[test]
fn test_formula_header_with_cached_value_after_load() {
    let bytes = sales_workbook().save_to_bytes().unwrap();
    let bytes = replace_cell_xml(
        &bytes,
        "xl/worksheets/sheet1.xml",
        "B1",
        r#"<c r="B1" t="str"><f>"Ye"&amp;"ar"</f><v>Year</v></c>"#,
    );

    let mut wb = Workbook::load_from_bytes(&bytes).unwrap();
    assert_eq!(
        wb.get_sheet_by_name("Sheet1").unwrap().get_cell("B1").unwrap(),
        Some(&CellValue::formula_with_cached(r#""Ye"&"ar""#, CellValue::from("Year")))
    );

    wb.add_pivot_table(&sales_spec()).unwrap();
    let caches = wb.pivot_cache_definitions().unwrap();
    assert_eq!(caches[0].field_names, vec!["Month", "Year", "Type", "Sales", "Region"]);
    assert_eq!(wb.pivot_tables().unwrap()[0].row_fields, vec![0, 1]);

    // The cached result survives another save and load.
    let again = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();
    assert_eq!(
        again.get_sheet_by_name("Sheet1").unwrap().get_cell("B1").unwrap(),
        Some(&CellValue::formula_with_cached(r#""Ye"&"ar""#, CellValue::from("Year")))
    );
}

#[test]
fn test_page_fields_do_not_change_output() {
    let mut plain = sales_workbook();
    plain.add_pivot_table(&sales_spec()).unwrap();

    let mut paged = sales_workbook();
    paged.add_pivot_table(&sales_spec().page(["Region"])).unwrap();

    for part in ["xl/pivotTables/pivotTable1.xml", "xl/pivotCache/pivotCacheDefinition1.xml"] {
        assert_eq!(plain.package().part(part), paged.package().part(part), "{}", part);
        assert!(paged.package().part(part).is_some());
    }
}
