//! Serialization of the parts regenerated from the workbook model on save.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;
use std::io::{Seek, Write};

use zip::write::{ExtendedFileOptions, FileOptions};
use zip::ZipWriter;

use crate::cell::{format_number, CellValue, InternedString};
use crate::error::Result;
use crate::utils::coordinate_from_row_col;
use crate::worksheet::Worksheet;

pub(crate) type PartOptions = FileOptions<'static, ExtendedFileOptions>;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// A `<pivotCache>` entry of `xl/workbook.xml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PivotCacheEntry {
    pub cache_id: u32,
    /// Relationship id in `xl/_rels/workbook.xml.rels`.
    pub r_id: String,
}

/// Escape text for use in XML content or attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Write one archive entry.
pub(crate) fn write_part<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: &PartOptions,
    path: &str,
    data: &[u8],
) -> Result<()> {
    zip.start_file(path, options.clone())?;
    zip.write_all(data)?;
    Ok(())
}

/// Collect unique strings across all worksheets in first-seen order.
pub fn collect_shared_strings(
    worksheets: &[Worksheet],
) -> (Vec<InternedString>, HashMap<InternedString, usize>) {
    let mut strings: Vec<InternedString> = Vec::new();
    let mut index: HashMap<InternedString, usize> = HashMap::new();

    for ws in worksheets {
        for (_, cells) in ws.sorted_rows() {
            for (_, value) in cells {
                if let CellValue::String(s) = value {
                    if !index.contains_key(s) {
                        index.insert(s.clone(), strings.len());
                        strings.push(s.clone());
                    }
                }
            }
        }
    }

    (strings, index)
}

pub fn shared_strings_xml(strings: &[InternedString]) -> String {
    let mut out = format!(
        "{}\n<sst xmlns=\"{}\" count=\"{}\" uniqueCount=\"{}\">",
        XML_DECL,
        MAIN_NS,
        strings.len(),
        strings.len()
    );
    for s in strings {
        let preserve = s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace);
        if preserve {
            out.push_str("<si><t xml:space=\"preserve\">");
        } else {
            out.push_str("<si><t>");
        }
        out.push_str(&escape_xml(s));
        out.push_str("</t></si>");
    }
    out.push_str("</sst>");
    out
}

/// Append a `<c>` element for `value` at `coord`.
pub fn format_cell_value(
    out: &mut String,
    coord: &str,
    value: &CellValue,
    shared_strings: &HashMap<InternedString, usize>,
) {
    match value {
        CellValue::Empty => {}
        CellValue::String(s) => match shared_strings.get(s) {
            Some(idx) => {
                let mut buf = itoa::Buffer::new();
                out.push_str("<c r=\"");
                out.push_str(coord);
                out.push_str("\" t=\"s\"><v>");
                out.push_str(buf.format(*idx));
                out.push_str("</v></c>");
            }
            None => {
                out.push_str("<c r=\"");
                out.push_str(coord);
                out.push_str("\" t=\"inlineStr\"><is><t>");
                out.push_str(&escape_xml(s));
                out.push_str("</t></is></c>");
            }
        },
        CellValue::Number(n) => {
            out.push_str("<c r=\"");
            out.push_str(coord);
            out.push_str("\"><v>");
            out.push_str(&format_number(*n));
            out.push_str("</v></c>");
        }
        CellValue::Boolean(b) => {
            out.push_str("<c r=\"");
            out.push_str(coord);
            out.push_str("\" t=\"b\"><v>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</v></c>");
        }
        CellValue::Date(d) => {
            out.push_str("<c r=\"");
            out.push_str(coord);
            out.push_str("\" t=\"d\"><v>");
            out.push_str(&escape_xml(d));
            out.push_str("</v></c>");
        }
        CellValue::Formula { formula, cached } => {
            let (cell_type, cached) = match cached.as_deref() {
                Some(CellValue::String(s)) => (Some("str"), Some(escape_xml(s))),
                Some(CellValue::Number(n)) => (None, Some(format_number(*n))),
                Some(CellValue::Boolean(b)) => (Some("b"), Some(if *b { "1" } else { "0" }.to_string())),
                Some(CellValue::Date(d)) => (Some("d"), Some(escape_xml(d))),
                _ => (None, None),
            };
            out.push_str("<c r=\"");
            out.push_str(coord);
            out.push('"');
            if let Some(t) = cell_type {
                out.push_str(" t=\"");
                out.push_str(t);
                out.push('"');
            }
            out.push_str("><f>");
            out.push_str(&escape_xml(formula));
            out.push_str("</f>");
            if let Some(v) = cached {
                out.push_str("<v>");
                out.push_str(&v);
                out.push_str("</v>");
            }
            out.push_str("</c>");
        }
    }
}

pub fn worksheet_xml(worksheet: &Worksheet, shared_strings: &HashMap<InternedString, usize>) -> String {
    let mut out = format!(
        "{}\n<worksheet xmlns=\"{}\" xmlns:r=\"{}\">",
        XML_DECL, MAIN_NS, REL_NS
    );

    let max_row = worksheet.max_row();
    let max_col = worksheet.max_column();
    if max_row > 0 && max_col > 0 {
        out.push_str(&format!(
            "<dimension ref=\"A1:{}\"/>",
            coordinate_from_row_col(max_row, max_col)
        ));
    }

    out.push_str("<sheetData>");
    let mut row_buf = itoa::Buffer::new();
    for (row, cells) in worksheet.sorted_rows() {
        out.push_str("<row r=\"");
        out.push_str(row_buf.format(row));
        out.push_str("\">");
        for (column, value) in cells {
            let coord = coordinate_from_row_col(row, column);
            format_cell_value(&mut out, &coord, value, shared_strings);
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData>");
    out.push_str(r#"<pageMargins left="0.75" right="0.75" top="1" bottom="1" header="0.5" footer="0.5"/>"#);
    out.push_str("</worksheet>");
    out
}

/// `xl/workbook.xml`. `sheet_rids` runs parallel to `sheet_names`.
pub fn workbook_xml(
    sheet_names: &[String],
    sheet_rids: &[String],
    named_ranges: &[(String, String)],
    pivot_caches: &[PivotCacheEntry],
) -> String {
    let mut out = format!(
        "{}\n<workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>",
        XML_DECL, MAIN_NS, REL_NS
    );
    for (idx, (name, rid)) in sheet_names.iter().zip(sheet_rids).enumerate() {
        out.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"{}\"/>",
            escape_xml(name),
            idx + 1,
            escape_xml(rid)
        ));
    }
    out.push_str("</sheets>");

    if !named_ranges.is_empty() {
        out.push_str("<definedNames>");
        for (name, range) in named_ranges {
            out.push_str(&format!(
                "<definedName name=\"{}\">{}</definedName>",
                escape_xml(name),
                escape_xml(range)
            ));
        }
        out.push_str("</definedNames>");
    }

    if !pivot_caches.is_empty() {
        out.push_str("<pivotCaches>");
        for cache in pivot_caches {
            out.push_str(&format!(
                "<pivotCache cacheId=\"{}\" r:id=\"{}\"/>",
                cache.cache_id,
                escape_xml(&cache.r_id)
            ));
        }
        out.push_str("</pivotCaches>");
    }

    out.push_str("</workbook>");
    out
}

pub fn core_properties_xml(created: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        r#"{}
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:creator>pivotxl</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created></cp:coreProperties>"#,
        XML_DECL,
        created.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

pub fn app_properties_xml() -> String {
    format!(
        r#"{}
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>pivotxl</Application></Properties>"#,
        XML_DECL
    )
}

pub fn styles_xml() -> String {
    format!(
        r#"{}
<styleSheet xmlns="{}"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#,
        XML_DECL, MAIN_NS
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_worksheet_xml_cells() {
        let mut ws = Worksheet::new("Data".to_string());
        ws.set_row(1, 1, ["Month", "Sales"]);
        ws.set_cell_value(2, 1, CellValue::from("Jan"));
        ws.set_cell_value(2, 2, CellValue::Number(1200.0));
        ws.set_cell_value(3, 1, CellValue::Boolean(true));
        ws.set_cell_value(3, 2, CellValue::formula("SUM(B2:B2)"));
        ws.set_cell_value(4, 1, CellValue::formula_with_cached(r#""Ye"&"ar""#, CellValue::from("Year")));
        ws.set_cell_value(4, 2, CellValue::formula_with_cached("B2*2", CellValue::Number(2400.0)));

        let (strings, index) = collect_shared_strings(std::slice::from_ref(&ws));
        let expected: Vec<Arc<str>> = vec![Arc::from("Month"), Arc::from("Sales"), Arc::from("Jan")];
        assert_eq!(strings, expected);

        let xml = worksheet_xml(&ws, &index);
        assert!(xml.contains(r#"<dimension ref="A1:B4"/>"#));
        assert!(xml.contains(r#"<c r="A1" t="s"><v>0</v></c>"#));
        assert!(xml.contains(r#"<c r="B2"><v>1200</v></c>"#));
        assert!(xml.contains(r#"<c r="A3" t="b"><v>1</v></c>"#));
        assert!(xml.contains(r#"<c r="B3"><f>SUM(B2:B2)</f></c>"#));
        assert!(xml.contains(r#"<c r="A4" t="str"><f>&quot;Ye&quot;&amp;&quot;ar&quot;</f><v>Year</v></c>"#));
        assert!(xml.contains(r#"<c r="B4"><f>B2*2</f><v>2400</v></c>"#));
    }

    #[test]
    fn test_workbook_xml_pivot_caches_follow_defined_names() {
        let xml = workbook_xml(
            &["Sheet1".to_string()],
            &["rId2".to_string()],
            &[("Totals".to_string(), "Sheet1!$A$1:$B$2".to_string())],
            &[PivotCacheEntry { cache_id: 1, r_id: "rId1".to_string() }],
        );
        let names = xml.find("<definedNames>").unwrap();
        let caches = xml.find("<pivotCaches>").unwrap();
        assert!(names < caches);
        assert!(xml.contains(r#"<sheet name="Sheet1" sheetId="1" r:id="rId2"/>"#));
        assert!(xml.contains(r#"<pivotCache cacheId="1" r:id="rId1"/>"#));
    }
}
