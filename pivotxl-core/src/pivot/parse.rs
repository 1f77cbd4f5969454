//! Read-back of stored pivot parts.

use std::io::Cursor;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{PivotxlError, Result};
use crate::pivot::fields::FieldAxis;

/// Summary of an `xl/pivotTables/pivotTable*.xml` part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PivotTableInfo {
    /// Package path of the part.
    pub path: String,
    pub name: Option<String>,
    pub cache_id: Option<u32>,
    pub location_ref: Option<String>,
    /// Axis of every pivot field, in cache field order.
    pub fields: Vec<FieldAxis>,
    pub row_fields: Vec<usize>,
    pub col_fields: Vec<usize>,
    pub data_fields: Vec<usize>,
    pub style_name: Option<String>,
}

/// Summary of an `xl/pivotCache/pivotCacheDefinition*.xml` part.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PivotCacheInfo {
    pub path: String,
    pub source_ref: Option<String>,
    pub source_sheet: Option<String>,
    pub field_names: Vec<String>,
    pub refresh_on_load: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldList {
    Row,
    Col,
    Data,
}

impl PivotTableInfo {
    pub fn parse(path: &str, xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(true);

        let mut info = PivotTableInfo {
            path: path.to_string(),
            ..Default::default()
        };
        let mut list: Option<FieldList> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    match e.local_name().as_ref() {
                        b"rowFields" => list = Some(FieldList::Row),
                        b"colFields" => list = Some(FieldList::Col),
                        b"dataFields" => list = Some(FieldList::Data),
                        _ => {}
                    }
                    info.read_element(&e, list)?;
                }
                Ok(Event::Empty(e)) => info.read_element(&e, list)?,
                Ok(Event::End(e)) => {
                    if matches!(
                        e.local_name().as_ref(),
                        b"rowFields" | b"colFields" | b"dataFields"
                    ) {
                        list = None;
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in {}: {}",
                        path, e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(info)
    }

    fn read_element(&mut self, e: &BytesStart<'_>, list: Option<FieldList>) -> Result<()> {
        match e.local_name().as_ref() {
            b"pivotTableDefinition" => {
                self.name = attribute(e, b"name")?;
                self.cache_id = attribute(e, b"cacheId")?.and_then(|v| v.parse().ok());
            }
            b"location" => self.location_ref = attribute(e, b"ref")?,
            b"pivotField" => {
                let axis = match attribute(e, b"axis")?.as_deref() {
                    Some("axisRow") => FieldAxis::Row,
                    Some("axisCol") => FieldAxis::Column,
                    _ if is_true(attribute(e, b"dataField")?.as_deref()) => FieldAxis::Data,
                    _ => FieldAxis::None,
                };
                self.fields.push(axis);
            }
            b"field" => {
                let index = attribute(e, b"x")?.and_then(|v| v.parse::<usize>().ok());
                match (list, index) {
                    (Some(FieldList::Row), Some(x)) => self.row_fields.push(x),
                    (Some(FieldList::Col), Some(x)) => self.col_fields.push(x),
                    _ => {}
                }
            }
            b"dataField" if list == Some(FieldList::Data) => {
                if let Some(fld) = attribute(e, b"fld")?.and_then(|v| v.parse::<usize>().ok()) {
                    self.data_fields.push(fld);
                }
            }
            b"pivotTableStyleInfo" => self.style_name = attribute(e, b"name")?,
            _ => {}
        }
        Ok(())
    }
}

impl PivotCacheInfo {
    pub fn parse(path: &str, xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(true);

        let mut info = PivotCacheInfo {
            path: path.to_string(),
            ..Default::default()
        };
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"pivotCacheDefinition" => {
                        info.refresh_on_load = is_true(attribute(&e, b"refreshOnLoad")?.as_deref());
                    }
                    b"worksheetSource" => {
                        info.source_ref = attribute(&e, b"ref")?;
                        info.source_sheet = attribute(&e, b"sheet")?;
                    }
                    b"cacheField" => {
                        info.field_names.push(attribute(&e, b"name")?.unwrap_or_default());
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in {}: {}",
                        path, e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(info)
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}
