//! Package-level registries owned by a workbook.
//!
//! The [`Package`] is the single mutation context for everything in the xlsx
//! container that is not regenerated from the cell model on save: stored
//! parts (pivot caches, pivot tables, and parts preserved from a loaded
//! file), the content-type manifest, and relationships declared by any part.
//! It is exclusively owned by one [`Workbook`](crate::Workbook), so mutating
//! operations are serialized by `&mut` access.

use std::collections::BTreeMap;
use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{PivotxlError, Result};
use crate::relationships::Relationships;

pub const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
pub const CT_XML: &str = "application/xml";
pub const CT_WORKBOOK: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
pub const CT_WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
pub const CT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
pub const CT_SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
pub const CT_CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
pub const CT_EXTENDED_PROPERTIES: &str =
    "application/vnd.openxmlformats-officedocument.extended-properties+xml";
pub const CT_PIVOT_TABLE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.pivotTable+xml";
pub const CT_PIVOT_CACHE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.pivotCacheDefinition+xml";

const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// `[Content_Types].xml` entries: extension defaults plus per-part overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a default for a file extension. Existing defaults win.
    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if !self.defaults.iter().any(|(ext, _)| ext.eq_ignore_ascii_case(extension)) {
            self.defaults.push((extension.to_string(), content_type.to_string()));
        }
    }

    /// Register an override for a part. `part_name` may be given with or
    /// without the leading slash.
    pub fn add_override(&mut self, part_name: &str, content_type: &str) {
        let part_name = normalize_part_name(part_name);
        if !self.overrides.iter().any(|(name, _)| *name == part_name) {
            self.overrides.push((part_name, content_type.to_string()));
        }
    }

    pub fn defaults(&self) -> &[(String, String)] {
        &self.defaults
    }

    pub fn overrides(&self) -> &[(String, String)] {
        &self.overrides
    }

    pub fn override_for(&self, part_name: &str) -> Option<&str> {
        let part_name = normalize_part_name(part_name);
        self.overrides
            .iter()
            .find(|(name, _)| *name == part_name)
            .map(|(_, ct)| ct.as_str())
    }

    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(true);

        let mut types = ContentTypes::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    let mut key = None;
                    let mut content_type = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => {
                                key = Some(attr.unescape_value()?.into_owned())
                            }
                            b"ContentType" => {
                                content_type = Some(attr.unescape_value()?.into_owned())
                            }
                            _ => {}
                        }
                    }
                    if let (Some(key), Some(content_type)) = (key, content_type) {
                        match e.local_name().as_ref() {
                            b"Default" => types.add_default(&key, &content_type),
                            b"Override" => types.add_override(&key, &content_type),
                            _ => {}
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in [Content_Types].xml: {}",
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(types)
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut root = BytesStart::new("Types");
        root.push_attribute(("xmlns", CONTENT_TYPES_NS));
        writer.write_event(Event::Start(root))?;

        for (extension, content_type) in &self.defaults {
            let mut el = BytesStart::new("Default");
            el.push_attribute(("Extension", extension.as_str()));
            el.push_attribute(("ContentType", content_type.as_str()));
            writer.write_event(Event::Empty(el))?;
        }
        for (part_name, content_type) in &self.overrides {
            let mut el = BytesStart::new("Override");
            el.push_attribute(("PartName", part_name.as_str()));
            el.push_attribute(("ContentType", content_type.as_str()));
            writer.write_event(Event::Empty(el))?;
        }

        writer.write_event(Event::End(BytesEnd::new("Types")))?;
        Ok(writer.into_inner().into_inner())
    }
}

fn normalize_part_name(part_name: &str) -> String {
    if part_name.starts_with('/') {
        part_name.to_string()
    } else {
        format!("/{}", part_name)
    }
}

/// Stored parts, content types and relationships of one open workbook.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
    content_types: ContentTypes,
    relationships: BTreeMap<String, Relationships>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a part verbatim. Parts are written to the archive on save.
    pub fn put_part(&mut self, path: &str, data: Vec<u8>) {
        log::debug!("storing part {} ({} bytes)", path, data.len());
        self.parts.insert(path.to_string(), data);
    }

    pub fn part(&self, path: &str) -> Option<&[u8]> {
        self.parts.get(path).map(Vec::as_slice)
    }

    pub fn contains_part(&self, path: &str) -> bool {
        self.parts.contains_key(path)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Number of stored parts whose path contains `pattern`.
    ///
    /// This is a linear scan over the part table.
    pub fn count_parts(&self, pattern: &str) -> usize {
        self.parts.keys().filter(|path| path.contains(pattern)).count()
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn content_types_mut(&mut self) -> &mut ContentTypes {
        &mut self.content_types
    }

    /// Relationships declared by `source_part`, if any were registered.
    pub fn relationships(&self, source_part: &str) -> Option<&Relationships> {
        self.relationships.get(source_part)
    }

    /// All relationship sets keyed by source part.
    pub fn relationship_sources(&self) -> impl Iterator<Item = (&str, &Relationships)> {
        self.relationships.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Append a relationship from `source_part` and return its id.
    pub fn add_relationship(&mut self, source_part: &str, rel_type: &str, target: &str) -> String {
        let id = self
            .relationships
            .entry(source_part.to_string())
            .or_default()
            .add(rel_type, target);
        log::debug!("registered {} {} -> {}", source_part, id, target);
        id
    }

    /// Replace the relationship set of `source_part` (used when loading).
    pub fn set_relationships(&mut self, source_part: &str, rels: Relationships) {
        self.relationships.insert(source_part.to_string(), rels);
    }

    /// Move the relationships declared by `from` so they belong to `to`.
    /// Any set already stored under `to` is replaced.
    pub fn move_relationships(&mut self, from: &str, to: &str) {
        match self.relationships.remove(from) {
            Some(rels) => {
                self.relationships.insert(to.to_string(), rels);
            }
            None => {
                self.relationships.remove(to);
            }
        }
    }

    pub fn remove_relationships(&mut self, source_part: &str) -> Option<Relationships> {
        self.relationships.remove(source_part)
    }
}
