//! `pivotTableDefinition` parts.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::pivot::cache::bool_attr;
use crate::pivot::fields::{classify_fields, field_indices, FieldAxis};
use crate::pivot::range::NormalizedRange;
use crate::pivot::{PivotTableSpec, MAIN_NS};

/// `pivotTableStyleInfo` settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PivotTableStyle {
    pub name: String,
    pub show_row_headers: bool,
    pub show_col_headers: bool,
    pub show_row_stripes: bool,
    pub show_col_stripes: bool,
    pub show_last_column: bool,
}

impl Default for PivotTableStyle {
    fn default() -> Self {
        PivotTableStyle {
            name: "PivotStyleLight16".to_string(),
            show_row_headers: true,
            show_col_headers: true,
            show_row_stripes: false,
            show_col_stripes: false,
            show_last_column: true,
        }
    }
}

/// Placement of the table on its worksheet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PivotLocation {
    pub reference: String,
    pub first_header_row: u32,
    pub first_data_row: u32,
    pub first_data_col: u32,
}

impl PivotLocation {
    pub fn new(range: &NormalizedRange) -> Self {
        PivotLocation {
            reference: range.cell_ref(),
            first_header_row: 1,
            first_data_row: 1,
            first_data_col: 1,
        }
    }
}

/// Layout of a pivot table over a cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PivotTableDefinition {
    pub name: String,
    pub cache_id: u32,
    pub data_caption: String,
    pub location: PivotLocation,
    /// One entry per cache field, in header order.
    pub fields: Vec<FieldAxis>,
    pub row_fields: Vec<usize>,
    /// `None` leaves the `colFields` element out.
    pub col_fields: Option<Vec<usize>>,
    pub data_fields: Vec<usize>,
    pub style: PivotTableStyle,
}

impl PivotTableDefinition {
    /// Lay out `spec` over the header `order` of its cache.
    pub fn build(
        table_id: usize,
        cache_id: u32,
        location: &NormalizedRange,
        order: &[String],
        spec: &PivotTableSpec,
    ) -> Self {
        let col_fields = if spec.columns.is_empty() {
            None
        } else {
            Some(field_indices(&spec.columns, order))
        };

        PivotTableDefinition {
            name: format!("Pivot Table{}", table_id),
            cache_id,
            data_caption: "Values".to_string(),
            location: PivotLocation::new(location),
            fields: classify_fields(order, &spec.rows, &spec.columns, &spec.data),
            row_fields: field_indices(&spec.rows, order),
            col_fields,
            data_fields: field_indices(&spec.data, order),
            style: PivotTableStyle::default(),
        }
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let cache_id = self.cache_id.to_string();
        let mut root = BytesStart::new("pivotTableDefinition");
        root.push_attribute(("xmlns", MAIN_NS));
        root.push_attribute(("name", self.name.as_str()));
        root.push_attribute(("cacheId", cache_id.as_str()));
        root.push_attribute(("dataCaption", self.data_caption.as_str()));
        root.push_attribute(("updatedVersion", "3"));
        root.push_attribute(("minRefreshableVersion", "3"));
        root.push_attribute(("createdVersion", "3"));
        root.push_attribute(("useAutoFormatting", "1"));
        root.push_attribute(("itemPrintTitles", "1"));
        root.push_attribute(("indent", "0"));
        root.push_attribute(("outline", "1"));
        root.push_attribute(("outlineData", "1"));
        writer.write_event(Event::Start(root))?;

        let first_header_row = self.location.first_header_row.to_string();
        let first_data_row = self.location.first_data_row.to_string();
        let first_data_col = self.location.first_data_col.to_string();
        let mut location = BytesStart::new("location");
        location.push_attribute(("ref", self.location.reference.as_str()));
        location.push_attribute(("firstHeaderRow", first_header_row.as_str()));
        location.push_attribute(("firstDataRow", first_data_row.as_str()));
        location.push_attribute(("firstDataCol", first_data_col.as_str()));
        writer.write_event(Event::Empty(location))?;

        self.write_pivot_fields(&mut writer)?;

        write_field_list(&mut writer, "rowFields", "field", "x", &self.row_fields)?;
        write_default_items(&mut writer, "rowItems", 2)?;
        if let Some(col_fields) = &self.col_fields {
            write_field_list(&mut writer, "colFields", "field", "x", col_fields)?;
        }
        write_default_items(&mut writer, "colItems", 0)?;
        write_field_list(&mut writer, "dataFields", "dataField", "fld", &self.data_fields)?;

        let mut style = BytesStart::new("pivotTableStyleInfo");
        style.push_attribute(("name", self.style.name.as_str()));
        style.push_attribute(("showRowHeaders", bool_attr(self.style.show_row_headers)));
        style.push_attribute(("showColHeaders", bool_attr(self.style.show_col_headers)));
        style.push_attribute(("showRowStripes", bool_attr(self.style.show_row_stripes)));
        style.push_attribute(("showColStripes", bool_attr(self.style.show_col_stripes)));
        style.push_attribute(("showLastColumn", bool_attr(self.style.show_last_column)));
        writer.write_event(Event::Empty(style))?;

        writer.write_event(Event::End(BytesEnd::new("pivotTableDefinition")))?;
        Ok(writer.into_inner().into_inner())
    }

    fn write_pivot_fields(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
        let count = self.fields.len().to_string();
        let mut start = BytesStart::new("pivotFields");
        start.push_attribute(("count", count.as_str()));
        writer.write_event(Event::Start(start))?;

        for axis in &self.fields {
            let mut field = BytesStart::new("pivotField");
            let axis_name = match axis {
                FieldAxis::Row => Some("axisRow"),
                FieldAxis::Column => Some("axisCol"),
                FieldAxis::Data | FieldAxis::None => None,
            };
            match axis_name {
                Some(name) => {
                    field.push_attribute(("axis", name));
                    field.push_attribute(("showAll", "0"));
                    writer.write_event(Event::Start(field))?;
                    let mut items = BytesStart::new("items");
                    items.push_attribute(("count", "1"));
                    writer.write_event(Event::Start(items))?;
                    let mut item = BytesStart::new("item");
                    item.push_attribute(("t", "default"));
                    writer.write_event(Event::Empty(item))?;
                    writer.write_event(Event::End(BytesEnd::new("items")))?;
                    writer.write_event(Event::End(BytesEnd::new("pivotField")))?;
                }
                None => {
                    if *axis == FieldAxis::Data {
                        field.push_attribute(("dataField", "1"));
                    }
                    field.push_attribute(("showAll", "0"));
                    writer.write_event(Event::Empty(field))?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("pivotFields")))?;
        Ok(())
    }
}

/// `<list count="n"><item attr="i"/>...</list>`
fn write_field_list(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    list: &str,
    item: &str,
    attr: &str,
    indices: &[usize],
) -> Result<()> {
    let count = indices.len().to_string();
    let mut start = BytesStart::new(list);
    start.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(start))?;
    let mut buf = itoa::Buffer::new();
    for idx in indices {
        let mut el = BytesStart::new(item);
        el.push_attribute((attr, buf.format(*idx)));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new(list)))?;
    Ok(())
}

/// A single placeholder `<i>` line holding `members` empty `<x/>` elements.
fn write_default_items(writer: &mut Writer<Cursor<Vec<u8>>>, list: &str, members: usize) -> Result<()> {
    let mut start = BytesStart::new(list);
    start.push_attribute(("count", "1"));
    writer.write_event(Event::Start(start))?;
    if members == 0 {
        writer.write_event(Event::Empty(BytesStart::new("i")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("i")))?;
        for _ in 0..members {
            writer.write_event(Event::Empty(BytesStart::new("x")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("i")))?;
    }
    writer.write_event(Event::End(BytesEnd::new(list)))?;
    Ok(())
}
