//! Open Packaging Conventions relationship parts (`*.rels`).

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{PivotxlError, Result};

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_CORE_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
pub const REL_EXTENDED_PROPERTIES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
pub const REL_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub const REL_PIVOT_CACHE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotCacheDefinition";
pub const REL_PIVOT_TABLE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/pivotTable";

const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// One `<Relationship>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// `TargetMode`, only set for external targets.
    pub target_mode: Option<String>,
}

/// The relationships declared by a single source part. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    entries: Vec<Relationship>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// The next free `rIdN`: one past the highest numeric suffix in use.
    pub fn next_id(&self) -> String {
        let max = self
            .entries
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    /// Append a relationship and return its newly allocated id.
    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = self.next_id();
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }

    /// Append a relationship that already carries an id (used when loading).
    pub fn push(&mut self, rel: Relationship) {
        self.entries.push(rel);
    }

    /// Parse the contents of a `.rels` part.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(Cursor::new(xml));
        reader.config_mut().trim_text(true);

        let mut rels = Relationships::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"Relationship" {
                        let mut id = None;
                        let mut rel_type = String::new();
                        let mut target = String::new();
                        let mut target_mode = None;
                        for attr in e.attributes().flatten() {
                            let value = attr.unescape_value()?.into_owned();
                            match attr.key.as_ref() {
                                b"Id" => id = Some(value),
                                b"Type" => rel_type = value,
                                b"Target" => target = value,
                                b"TargetMode" => target_mode = Some(value),
                                _ => {}
                            }
                        }
                        match id {
                            Some(id) => rels.push(Relationship {
                                id,
                                rel_type,
                                target,
                                target_mode,
                            }),
                            None => log::warn!("skipping relationship without an Id: {}", target),
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in relationships: {}",
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// Serialize as a complete `.rels` document.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut root = BytesStart::new("Relationships");
        root.push_attribute(("xmlns", RELATIONSHIPS_NS));
        writer.write_event(Event::Start(root))?;

        for rel in &self.entries {
            let mut el = BytesStart::new("Relationship");
            el.push_attribute(("Id", rel.id.as_str()));
            el.push_attribute(("Type", rel.rel_type.as_str()));
            el.push_attribute(("Target", rel.target.as_str()));
            if let Some(mode) = &rel.target_mode {
                el.push_attribute(("TargetMode", mode.as_str()));
            }
            writer.write_event(Event::Empty(el))?;
        }

        writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
        Ok(writer.into_inner().into_inner())
    }
}

/// The `.rels` part that holds relationships for `part`
/// (`xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`).
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Inverse of [`rels_path_for`]. `None` if `rels_path` is not a `.rels` part.
pub fn source_part_for(rels_path: &str) -> Option<String> {
    let file = rels_path.strip_suffix(".rels")?;
    let (dir, name) = match file.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => return None,
    };
    if dir == "_rels" {
        return Some(name.to_string());
    }
    let parent = dir.strip_suffix("/_rels")?;
    Some(format!("{}/{}", parent, name))
}

/// Resolve a relationship target relative to its source part into a package
/// path without a leading slash.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
