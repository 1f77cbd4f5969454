//! `pivotCacheDefinition` parts.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::error::Result;
use crate::pivot::range::NormalizedRange;
use crate::pivot::{MAIN_NS, REL_NS};

/// Snapshot description of a worksheet data source.
///
/// No shared items are enumerated from the data body: every field carries an
/// empty `sharedItems` element and the definition asks to be refreshed on
/// load, so the consuming application fills in the real values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PivotCacheDefinition {
    /// Unanchored source reference, e.g. `A1:E31`.
    pub source_ref: String,
    pub source_sheet: String,
    pub fields: Vec<String>,
    pub save_data: bool,
    pub refresh_on_load: bool,
}

impl PivotCacheDefinition {
    pub fn new(source: &NormalizedRange, fields: Vec<String>) -> Self {
        PivotCacheDefinition {
            source_ref: source.cell_ref(),
            source_sheet: source.sheet.clone(),
            fields,
            save_data: false,
            refresh_on_load: true,
        }
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut root = BytesStart::new("pivotCacheDefinition");
        root.push_attribute(("xmlns", MAIN_NS));
        root.push_attribute(("xmlns:r", REL_NS));
        root.push_attribute(("saveData", bool_attr(self.save_data)));
        root.push_attribute(("refreshOnLoad", bool_attr(self.refresh_on_load)));
        root.push_attribute(("createdVersion", "3"));
        root.push_attribute(("refreshedVersion", "3"));
        root.push_attribute(("minRefreshableVersion", "3"));
        writer.write_event(Event::Start(root))?;

        let mut source = BytesStart::new("cacheSource");
        source.push_attribute(("type", "worksheet"));
        writer.write_event(Event::Start(source))?;
        let mut ws_source = BytesStart::new("worksheetSource");
        ws_source.push_attribute(("ref", self.source_ref.as_str()));
        ws_source.push_attribute(("sheet", self.source_sheet.as_str()));
        writer.write_event(Event::Empty(ws_source))?;
        writer.write_event(Event::End(BytesEnd::new("cacheSource")))?;

        let count = self.fields.len().to_string();
        let mut fields = BytesStart::new("cacheFields");
        fields.push_attribute(("count", count.as_str()));
        writer.write_event(Event::Start(fields))?;
        for name in &self.fields {
            let mut field = BytesStart::new("cacheField");
            field.push_attribute(("name", name.as_str()));
            field.push_attribute(("numFmtId", "0"));
            writer.write_event(Event::Start(field))?;
            writer.write_event(Event::Empty(BytesStart::new("sharedItems")))?;
            writer.write_event(Event::End(BytesEnd::new("cacheField")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("cacheFields")))?;

        writer.write_event(Event::End(BytesEnd::new("pivotCacheDefinition")))?;
        Ok(writer.into_inner().into_inner())
    }
}

pub(crate) fn bool_attr(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}
