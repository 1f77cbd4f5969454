//! Workbook representation and file I/O operations.

#[cfg(feature = "fast-hash")]
use hashbrown::HashSet;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rayon::prelude::*;
use zip::ZipArchive;

use crate::cell::{CellValue, InternedString};
use crate::error::{PivotxlError, Result};
use crate::package::{
    ContentTypes, Package, CT_CORE_PROPERTIES, CT_EXTENDED_PROPERTIES, CT_RELATIONSHIPS,
    CT_SHARED_STRINGS, CT_STYLES, CT_WORKBOOK, CT_WORKSHEET, CT_XML,
};
use crate::pivot::registrar::WORKBOOK_PART;
use crate::pivot::{self, PivotCacheInfo, PivotTableInfo, PivotTableSpec};
use crate::relationships::{
    rels_path_for, resolve_target, source_part_for, Relationships, REL_CORE_PROPERTIES,
    REL_EXTENDED_PROPERTIES, REL_OFFICE_DOCUMENT, REL_SHARED_STRINGS, REL_STYLES, REL_WORKSHEET,
};
use crate::utils::{parse_coordinate_bytes, parse_f64_bytes};
use crate::worksheet::Worksheet;
use crate::writer::{self, write_part, PartOptions, PivotCacheEntry};

const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const STYLES_PART: &str = "xl/styles.xml";
const CORE_PROPERTIES_PART: &str = "docProps/core.xml";
const APP_PROPERTIES_PART: &str = "docProps/app.xml";

/// A named range definition.
#[derive(Clone, Debug)]
pub struct NamedRange {
    /// Name of the range.
    pub name: String,
    /// Range reference (e.g., "'Sheet1'!A1:B2").
    pub range: String,
}

/// Compression level for saving workbooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// No compression - fastest saves, largest files
    #[default]
    None,
    /// Fast compression (deflate level 1)
    Fast,
    /// Default compression (deflate level 6)
    Default,
    /// Best compression (deflate level 9) - smallest files, slowest
    Best,
}

/// An Excel workbook containing worksheets and pivot tables.
///
/// Cells are held in the worksheet model and regenerated on save. Everything
/// else in the package (pivot parts, themes, drawings and so on) lives in the
/// [`Package`] and is written back verbatim.
#[derive(Clone, Debug)]
pub struct Workbook {
    /// List of worksheets.
    pub worksheets: Vec<Worksheet>,
    /// Sheet names (parallel to worksheets).
    pub sheet_names: Vec<String>,
    /// Named ranges defined in the workbook.
    pub named_ranges: Vec<NamedRange>,
    /// Compression level for saving.
    pub compression: CompressionLevel,
    pub(crate) package: Package,
    /// `<pivotCaches>` entries of `xl/workbook.xml`.
    pub(crate) pivot_caches: Vec<PivotCacheEntry>,
}

impl Workbook {
    /// Create a new empty workbook.
    pub fn new() -> Self {
        Workbook {
            worksheets: Vec::new(),
            sheet_names: Vec::new(),
            named_ranges: Vec::new(),
            compression: CompressionLevel::default(),
            package: Package::new(),
            pivot_caches: Vec::new(),
        }
    }

    /// Set compression level for saving.
    pub fn set_compression(&mut self, level: CompressionLevel) {
        self.compression = level;
    }

    /// Load a workbook from a file path.
    pub fn load(path: &str) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut workbook = Workbook::new();
        workbook.parse_workbook(&mut archive)?;
        Ok(workbook)
    }

    /// Load a workbook from bytes.
    pub fn load_from_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut workbook = Workbook::new();
        workbook.parse_workbook(&mut archive)?;
        Ok(workbook)
    }

    /// Get the first worksheet.
    pub fn active(&self) -> Result<&Worksheet> {
        self.worksheets.first().ok_or(PivotxlError::NoWorksheets)
    }

    pub fn worksheets(&self) -> &[Worksheet] {
        &self.worksheets
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    fn sheet_index(&self, name: &str) -> Result<usize> {
        self.sheet_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| PivotxlError::WorksheetNotFound(name.to_string()))
    }

    /// Get a worksheet by name.
    pub fn get_sheet_by_name(&self, name: &str) -> Result<&Worksheet> {
        let idx = self.sheet_index(name)?;
        Ok(&self.worksheets[idx])
    }

    /// Get a mutable worksheet by name.
    pub fn get_sheet_by_name_mut(&mut self, name: &str) -> Result<&mut Worksheet> {
        let idx = self.sheet_index(name)?;
        Ok(&mut self.worksheets[idx])
    }

    /// Get a worksheet by index.
    pub fn get_sheet_by_index(&self, index: usize) -> Result<&Worksheet> {
        self.worksheets
            .get(index)
            .ok_or_else(|| PivotxlError::WorksheetNotFound(format!("index {}", index)))
    }

    /// Get a mutable worksheet by index.
    pub fn get_sheet_by_index_mut(&mut self, index: usize) -> Result<&mut Worksheet> {
        self.worksheets
            .get_mut(index)
            .ok_or_else(|| PivotxlError::WorksheetNotFound(format!("index {}", index)))
    }

    /// Package path the named sheet is written to, e.g. `xl/worksheets/sheet1.xml`.
    pub fn sheet_part_path(&self, name: &str) -> Result<String> {
        self.sheet_index(name).map(sheet_part_at)
    }

    /// Create a new worksheet.
    pub fn create_sheet(&mut self, title: Option<String>) -> Result<&mut Worksheet> {
        let sheet_title = title.unwrap_or_else(|| format!("Sheet{}", self.worksheets.len() + 1));

        if self.sheet_names.contains(&sheet_title) {
            return Err(PivotxlError::WorksheetAlreadyExists(sheet_title));
        }

        let idx = self.worksheets.len();
        self.worksheets.push(Worksheet::new(sheet_title.clone()));
        self.sheet_names.push(sheet_title);
        Ok(&mut self.worksheets[idx])
    }

    /// Remove a worksheet by name.
    ///
    /// Sheet parts are numbered by position, so relationships declared by the
    /// sheets after the removed one move down with them. Pivot tables hosted
    /// on the removed sheet stay in the package unreferenced.
    pub fn remove_sheet(&mut self, sheet_name: &str) -> Result<()> {
        let idx = self.sheet_index(sheet_name)?;
        let count = self.worksheets.len();

        self.worksheets.remove(idx);
        self.sheet_names.remove(idx);

        self.package.remove_relationships(&sheet_part_at(idx));
        for later in idx + 1..count {
            self.package
                .move_relationships(&sheet_part_at(later), &sheet_part_at(later - 1));
        }
        Ok(())
    }

    /// Create a named range.
    pub fn create_named_range(&mut self, name: String, range: String) -> Result<()> {
        if self.named_ranges.iter().any(|nr| nr.name == name) {
            return Err(PivotxlError::NamedRangeAlreadyExists(name));
        }
        self.named_ranges.push(NamedRange { name, range });
        Ok(())
    }

    /// Get a named range by name.
    pub fn get_named_range(&self, name: &str) -> Option<&str> {
        self.named_ranges
            .iter()
            .find(|nr| nr.name == name)
            .map(|nr| nr.range.as_str())
    }

    /// Get all named ranges.
    pub fn get_named_ranges(&self) -> Vec<(&str, &str)> {
        self.named_ranges
            .iter()
            .map(|nr| (nr.name.as_str(), nr.range.as_str()))
            .collect()
    }

    /// Stored parts, content types and relationships.
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Registered pivot caches in `workbook.xml` order.
    pub fn pivot_caches(&self) -> &[PivotCacheEntry] {
        &self.pivot_caches
    }

    /// Add a pivot table built from `spec`.
    ///
    /// `spec` is validated up front: missing ranges, malformed or
    /// single-cell ranges and unknown sheets fail before anything is stored.
    /// Past that point the operation is not transactional. An error while
    /// writing the table part leaves the already stored cache part and its
    /// registrations in place.
    pub fn add_pivot_table(&mut self, spec: &PivotTableSpec) -> Result<()> {
        pivot::add_pivot_table(self, spec).map(|_| ())
    }

    /// Read back every stored pivot table part, ordered by file suffix.
    pub fn pivot_tables(&self) -> Result<Vec<PivotTableInfo>> {
        stored_parts(&self.package, "xl/pivotTables/pivotTable")
            .into_iter()
            .map(|(path, data)| PivotTableInfo::parse(path, data))
            .collect()
    }

    /// Read back every stored pivot cache definition, ordered by file suffix.
    pub fn pivot_cache_definitions(&self) -> Result<Vec<PivotCacheInfo>> {
        stored_parts(&self.package, "xl/pivotCache/pivotCacheDefinition")
            .into_iter()
            .map(|(path, data)| PivotCacheInfo::parse(path, data))
            .collect()
    }

    /// Save the workbook to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let file = File::create(path)?;
        self.save_to_writer(file)
    }

    /// Save the workbook to an in-memory byte vector.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        self.write_workbook_contents(&mut zip)?;
        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    /// Save the workbook to any writer that implements Write + Seek.
    pub fn save_to_writer<W: std::io::Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = zip::ZipWriter::new(writer);
        self.write_workbook_contents(&mut zip)?;
        zip.finish()?;
        Ok(())
    }

    /// Get the file options based on compression settings.
    fn get_file_options(&self) -> PartOptions {
        use zip::write::FileOptions;
        use zip::CompressionMethod;

        match self.compression {
            CompressionLevel::None => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Stored),
            CompressionLevel::Fast => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(1)),
            CompressionLevel::Default => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(6)),
            CompressionLevel::Best => FileOptions::default()
                .large_file(false)
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(9)),
        }
    }

    /// Write all workbook contents to a ZipWriter.
    fn write_workbook_contents<W: std::io::Write + Seek>(
        &self,
        zip: &mut zip::ZipWriter<W>,
    ) -> Result<()> {
        let options = self.get_file_options();

        let (shared_strings_vec, shared_strings_map) = writer::collect_shared_strings(&self.worksheets);
        let has_shared_strings = !shared_strings_vec.is_empty();

        // Generated relationships are appended after the registered ones so
        // their ids never clash with ids already referenced by stored parts.
        let mut workbook_rels = self
            .package
            .relationships(WORKBOOK_PART)
            .cloned()
            .unwrap_or_default();
        let sheet_rids: Vec<String> = (0..self.worksheets.len())
            .map(|idx| workbook_rels.add(REL_WORKSHEET, &format!("worksheets/sheet{}.xml", idx + 1)))
            .collect();
        workbook_rels.add(REL_STYLES, "styles.xml");
        if has_shared_strings {
            workbook_rels.add(REL_SHARED_STRINGS, "sharedStrings.xml");
        }

        let mut root_rels = self.package.relationships("").cloned().unwrap_or_default();
        root_rels.add(REL_OFFICE_DOCUMENT, WORKBOOK_PART);
        root_rels.add(REL_CORE_PROPERTIES, CORE_PROPERTIES_PART);
        root_rels.add(REL_EXTENDED_PROPERTIES, APP_PROPERTIES_PART);

        let mut content_types = self.package.content_types().clone();
        content_types.add_default("rels", CT_RELATIONSHIPS);
        content_types.add_default("xml", CT_XML);
        content_types.add_override(WORKBOOK_PART, CT_WORKBOOK);
        for idx in 0..self.worksheets.len() {
            content_types.add_override(&sheet_part_at(idx), CT_WORKSHEET);
        }
        content_types.add_override(STYLES_PART, CT_STYLES);
        if has_shared_strings {
            content_types.add_override(SHARED_STRINGS_PART, CT_SHARED_STRINGS);
        }
        content_types.add_override(CORE_PROPERTIES_PART, CT_CORE_PROPERTIES);
        content_types.add_override(APP_PROPERTIES_PART, CT_EXTENDED_PROPERTIES);

        let named_ranges: Vec<(String, String)> = self
            .named_ranges
            .iter()
            .map(|nr| (nr.name.clone(), nr.range.clone()))
            .collect();
        let workbook_xml =
            writer::workbook_xml(&self.sheet_names, &sheet_rids, &named_ranges, &self.pivot_caches);

        let mut generated: Vec<(String, Vec<u8>)> = vec![
            ("[Content_Types].xml".to_string(), content_types.to_xml()?),
            ("_rels/.rels".to_string(), root_rels.to_xml()?),
            (
                CORE_PROPERTIES_PART.to_string(),
                writer::core_properties_xml(chrono::Utc::now()).into_bytes(),
            ),
            (APP_PROPERTIES_PART.to_string(), writer::app_properties_xml().into_bytes()),
            (WORKBOOK_PART.to_string(), workbook_xml.into_bytes()),
            (rels_path_for(WORKBOOK_PART), workbook_rels.to_xml()?),
        ];
        if has_shared_strings {
            generated.push((
                SHARED_STRINGS_PART.to_string(),
                writer::shared_strings_xml(&shared_strings_vec).into_bytes(),
            ));
        }
        generated.push((STYLES_PART.to_string(), writer::styles_xml().into_bytes()));
        for (idx, worksheet) in self.worksheets.iter().enumerate() {
            let xml = writer::worksheet_xml(worksheet, &shared_strings_map);
            generated.push((sheet_part_at(idx), xml.into_bytes()));
        }
        for (source, rels) in self.package.relationship_sources() {
            if source.is_empty() || source == WORKBOOK_PART || rels.is_empty() {
                continue;
            }
            generated.push((rels_path_for(source), rels.to_xml()?));
        }

        for (path, data) in &generated {
            write_part(zip, &options, path, data)?;
        }

        let generated_paths: HashSet<&str> = generated.iter().map(|(path, _)| path.as_str()).collect();
        for (path, data) in self.package.parts() {
            if generated_paths.contains(path) {
                log::warn!("stored part {} collides with a generated part, skipping", path);
                continue;
            }
            write_part(zip, &options, path, data)?;
        }

        Ok(())
    }

    /// Parse workbook from ZIP archive with parallel worksheet parsing.
    fn parse_workbook<R: Read + Seek>(&mut self, archive: &mut ZipArchive<R>) -> Result<()> {
        // Phase 1: Load all file contents into memory (sequential ZIP extraction)
        let workbook_xml = Self::read_zip_file_to_vec(archive, WORKBOOK_PART)?;
        let workbook_rels = match Self::read_zip_file_to_vec(archive, &rels_path_for(WORKBOOK_PART)) {
            Ok(xml) => Relationships::parse(&xml)?,
            Err(_) => Relationships::new(),
        };
        let shared_strings_xml = Self::read_zip_file_to_vec(archive, SHARED_STRINGS_PART).ok();

        let parsed = Self::parse_workbook_xml(Cursor::new(&workbook_xml))?;
        self.named_ranges = parsed.named_ranges;

        let mut sheet_paths: Vec<String> = Vec::with_capacity(parsed.sheets.len());
        let mut sheet_data: Vec<(String, Vec<u8>)> = Vec::with_capacity(parsed.sheets.len());
        for (sheet_name, sheet_id, sheet_rid) in &parsed.sheets {
            let sheet_path = match workbook_rels.get(sheet_rid) {
                Some(rel) => resolve_target(WORKBOOK_PART, &rel.target),
                None => format!("xl/worksheets/sheet{}.xml", sheet_id),
            };
            let sheet_xml = Self::read_zip_file_to_vec(archive, &sheet_path)?;
            sheet_paths.push(sheet_path);
            sheet_data.push((sheet_name.clone(), sheet_xml));
        }

        // Phase 2: Parse shared data (must be done before worksheets)
        let shared_strings = match shared_strings_xml {
            Some(xml) => Self::parse_shared_strings_xml(Cursor::new(&xml))?,
            None => Vec::new(),
        };

        // Phase 3: Parse worksheets in parallel using Rayon
        let shared_strings_ref = &shared_strings;
        let parse_one = |(sheet_name, sheet_xml): &(String, Vec<u8>)| -> Result<Worksheet> {
            let mut worksheet = Worksheet::new(sheet_name.clone());
            Self::parse_worksheet_xml(Cursor::new(sheet_xml), shared_strings_ref, &mut worksheet)?;
            Ok(worksheet)
        };
        let worksheets: Vec<Result<Worksheet>> = if sheet_data.len() > 1 {
            sheet_data.par_iter().map(parse_one).collect()
        } else {
            // Sequential for single sheet (avoid Rayon overhead)
            sheet_data.iter().map(parse_one).collect()
        };
        for result in worksheets {
            let worksheet = result?;
            self.sheet_names.push(worksheet.title.clone());
            self.worksheets.push(worksheet);
        }

        // Phase 4: Keep everything the model does not regenerate.
        self.preserve_parts(archive, &sheet_paths)?;

        let workbook_rels = self.package.relationships(WORKBOOK_PART);
        for (cache_id, r_id) in parsed.pivot_caches {
            match workbook_rels.and_then(|rels| rels.get(&r_id)) {
                Some(_) => self.pivot_caches.push(PivotCacheEntry { cache_id, r_id }),
                None => log::warn!("pivot cache {} refers to unknown relationship {}", cache_id, r_id),
            }
        }

        Ok(())
    }

    /// Copy parts, relationships and content-type overrides that are not
    /// regenerated on save into the package.
    fn preserve_parts<R: Read + Seek>(
        &mut self,
        archive: &mut ZipArchive<R>,
        sheet_paths: &[String],
    ) -> Result<()> {
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let regenerated = |name: &str| {
            name == "[Content_Types].xml"
                || name == WORKBOOK_PART
                || name == SHARED_STRINGS_PART
                || name == STYLES_PART
                || name == CORE_PROPERTIES_PART
                || name == APP_PROPERTIES_PART
                || name == "xl/calcChain.xml"
                || name.starts_with("xl/comments")
                || sheet_paths.iter().any(|p| p == name)
        };

        let mut rels_parts = Vec::new();
        for name in names {
            if name.ends_with('/') {
                continue;
            }
            if name.ends_with(".rels") {
                rels_parts.push(name);
            } else if !regenerated(&name) {
                let data = Self::read_zip_file_to_vec(archive, &name)?;
                self.package.put_part(&name, data);
            }
        }

        for rels_path in rels_parts {
            let Some(source) = source_part_for(&rels_path) else {
                log::warn!("skipping relationships part {}", rels_path);
                continue;
            };
            let key = match sheet_paths.iter().position(|p| *p == source) {
                Some(idx) => sheet_part_at(idx),
                None if source.is_empty()
                    || source == WORKBOOK_PART
                    || self.package.contains_part(&source) =>
                {
                    source.clone()
                }
                None => continue,
            };

            let xml = Self::read_zip_file_to_vec(archive, &rels_path)?;
            let mut kept = Relationships::new();
            for rel in Relationships::parse(&xml)?.iter() {
                let external = rel.target_mode.as_deref() == Some("External");
                if external || self.package.contains_part(&resolve_target(&source, &rel.target)) {
                    kept.push(rel.clone());
                }
            }
            if !kept.is_empty() {
                log::debug!("preserving {} relationships of {}", kept.len(), key);
                self.package.set_relationships(&key, kept);
            }
        }

        if let Ok(xml) = Self::read_zip_file_to_vec(archive, "[Content_Types].xml") {
            let loaded = ContentTypes::parse(&xml)?;
            let types = self.package.content_types_mut();
            for (extension, content_type) in loaded.defaults() {
                types.add_default(extension, content_type);
            }
            for (part_name, content_type) in loaded.overrides() {
                let path = part_name.trim_start_matches('/');
                if self.package.contains_part(path) {
                    self.package.content_types_mut().add_override(part_name, content_type);
                }
            }
        }

        log::debug!("preserved {} parts from the loaded package", self.package.part_count());
        Ok(())
    }

    /// Read a file from the ZIP archive into a Vec<u8>.
    fn read_zip_file_to_vec<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<Vec<u8>> {
        let mut file = archive.by_name(path).map_err(|e| {
            PivotxlError::InvalidFormat(format!("Failed to find {} in archive: {}", path, e))
        })?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Parses workbook.xml: sheets (name, sheetId, rId), named ranges and
    /// pivot cache entries.
    fn parse_workbook_xml<R: BufRead>(reader: R) -> Result<ParsedWorkbook> {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);

        let mut parsed = ParsedWorkbook::default();
        let mut buf = Vec::new();
        let mut current_name: Option<String> = None;
        let mut current_range = String::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"sheet" => {
                        let name = get_attr_str(&e, b"name");
                        let sheet_id = get_attr_str(&e, b"sheetId").and_then(|s| s.parse().ok());
                        let rid = get_attr_str(&e, b"id");
                        if let (Some(name), Some(id), Some(rid)) = (name, sheet_id, rid) {
                            parsed.sheets.push((name, id, rid));
                        }
                    }
                    b"definedName" => {
                        current_name = get_attr_str(&e, b"name");
                        current_range.clear();
                    }
                    b"pivotCache" => {
                        let cache_id = get_attr_str(&e, b"cacheId").and_then(|s| s.parse().ok());
                        match (cache_id, get_attr_str(&e, b"id")) {
                            (Some(cache_id), Some(rid)) => parsed.pivot_caches.push((cache_id, rid)),
                            _ => log::warn!("skipping incomplete <pivotCache> entry"),
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(e)) => {
                    if current_name.is_some() {
                        current_range.push_str(&e.unescape().unwrap_or_default());
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"definedName" {
                        if let Some(name) = current_name.take() {
                            parsed.named_ranges.push(NamedRange {
                                name,
                                range: std::mem::take(&mut current_range),
                            });
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in workbook.xml: {}",
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(parsed)
    }

    fn parse_shared_strings_xml<R: BufRead>(reader: R) -> Result<Vec<InternedString>> {
        let mut reader = Reader::from_reader(reader);
        // Don't trim text - we need to preserve whitespace in string values
        reader.config_mut().trim_text(false);

        let mut strings = Vec::new();
        let mut buf = Vec::new();
        let mut current_string = String::new();
        let mut in_t = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"t" {
                        in_t = true;
                    }
                }
                Ok(Event::Text(e)) => {
                    if in_t {
                        current_string.push_str(&e.unescape().unwrap_or_default());
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"t" => in_t = false,
                    b"si" => {
                        strings.push(InternedString::from(current_string.as_str()));
                        current_string.clear();
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in sharedStrings.xml: {}",
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(strings)
    }

    fn parse_worksheet_xml<R: BufRead>(
        reader: R,
        shared_strings: &[InternedString],
        worksheet: &mut Worksheet,
    ) -> Result<()> {
        enum TempValue {
            SharedIdx(usize),
            Bool(bool),
            Number(f64),
            Date(String),
            String(String),
        }

        let mut reader = Reader::from_reader(reader);
        // Don't trim text - we need to preserve whitespace in cell values
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut current_cell: Option<(u32, u32)> = None;
        let mut current_value: Option<TempValue> = None;
        // Cell type as single byte, see `cell_type_code`.
        let mut current_type: u8 = 0;
        let mut current_formula: Option<String> = None;
        let mut in_v = false;
        let mut in_t = false;
        let mut in_f = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        current_cell = get_attr_bytes(&e, b"r", parse_coordinate_bytes);
                        current_type = get_attr_bytes(&e, b"t", cell_type_code).unwrap_or(0);
                        current_value = None;
                        current_formula = None;
                    }
                    b"v" => in_v = true,
                    b"t" => in_t = true,
                    b"f" => in_f = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    // <c r="A1" t="inlineStr"/> is an empty string, any other
                    // self-closing cell is blank.
                    if e.local_name().as_ref() == b"c" {
                        let cell = get_attr_bytes(&e, b"r", parse_coordinate_bytes);
                        let cell_type = get_attr_bytes(&e, b"t", cell_type_code).unwrap_or(0);
                        if let (Some((row, col)), b'i' | b's') = (cell, cell_type) {
                            worksheet.set_cell_value(row, col, CellValue::String(InternedString::from("")));
                        }
                    }
                }
                Ok(Event::Text(e)) if current_cell.is_some() => {
                    let text = e.unescape().unwrap_or_default();
                    if in_v {
                        current_value = Some(match current_type {
                            b's' => match text.parse::<usize>() {
                                Ok(idx) => TempValue::SharedIdx(idx),
                                Err(_) => TempValue::String(text.into_owned()),
                            },
                            b'b' => TempValue::Bool(text.as_bytes().first() == Some(&b'1')),
                            b'd' => TempValue::Date(text.into_owned()),
                            b'e' | b'S' => TempValue::String(text.into_owned()),
                            _ => match parse_f64_bytes(text.as_bytes()) {
                                Some(n) => TempValue::Number(n),
                                None => TempValue::String(text.into_owned()),
                            },
                        });
                    } else if in_t {
                        // Rich text runs arrive as several <t> elements.
                        match &mut current_value {
                            Some(TempValue::String(s)) => s.push_str(&text),
                            _ => current_value = Some(TempValue::String(text.into_owned())),
                        }
                    } else if in_f {
                        current_formula = Some(text.into_owned());
                    }
                }
                Ok(Event::End(e)) => match e.local_name().as_ref() {
                    b"c" => {
                        if let Some((row, col)) = current_cell.take() {
                            let value = match current_value.take() {
                                Some(TempValue::SharedIdx(idx)) => match shared_strings.get(idx) {
                                    Some(s) => CellValue::String(s.clone()),
                                    None => CellValue::String(InternedString::from(idx.to_string())),
                                },
                                Some(TempValue::Bool(b)) => CellValue::Boolean(b),
                                Some(TempValue::Number(n)) => CellValue::Number(n),
                                Some(TempValue::Date(d)) => CellValue::Date(d),
                                Some(TempValue::String(s)) => CellValue::String(InternedString::from(s)),
                                None if current_type == b'i' || current_type == b's' => {
                                    CellValue::String(InternedString::from(""))
                                }
                                None => CellValue::Empty,
                            };
                            // The <v> of a formula cell is its cached result.
                            let cell_value = match current_formula.take() {
                                Some(formula) => CellValue::formula_with_cached(formula, value),
                                None => value,
                            };
                            worksheet.set_cell_value(row, col, cell_value);
                        }
                        current_type = 0;
                    }
                    b"v" => in_v = false,
                    b"t" => in_t = false,
                    b"f" => in_f = false,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PivotxlError::ParseError(format!(
                        "XML parsing error in worksheet '{}': {}",
                        worksheet.title, e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(())
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct ParsedWorkbook {
    sheets: Vec<(String, u32, String)>,
    named_ranges: Vec<NamedRange>,
    pivot_caches: Vec<(u32, String)>,
}

/// Sheets are written in order as `sheet1.xml`, `sheet2.xml`, ...
fn sheet_part_at(index: usize) -> String {
    format!("xl/worksheets/sheet{}.xml", index + 1)
}

/// Stored parts whose path starts with `prefix` followed by a number, in
/// numeric order.
fn stored_parts<'a>(package: &'a Package, prefix: &str) -> Vec<(&'a str, &'a [u8])> {
    let mut parts: Vec<(u32, &str, &[u8])> = package
        .parts()
        .filter_map(|(path, data)| {
            let suffix = path.strip_prefix(prefix)?.strip_suffix(".xml")?;
            suffix.parse::<u32>().ok().map(|n| (n, path, data))
        })
        .collect();
    parts.sort_by_key(|(n, _, _)| *n);
    parts.into_iter().map(|(_, path, data)| (path, data)).collect()
}

/// Get a string attribute value from an XML element, matching on the local
/// name so `r:id` is found as `id`.
fn get_attr_str(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .map(|attr| match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
}

/// Parse an attribute straight from its raw bytes.
/// Single-byte code for a cell `t` attribute: `s` shared string, `S` formula
/// string (`str`), `b` bool, `d` date, `e` error, `i` inline string. Numbers
/// carry no `t` and map to 0 at the call site.
fn cell_type_code(value: &[u8]) -> Option<u8> {
    match value {
        b"str" => Some(b'S'),
        _ => value.first().copied(),
    }
}

fn get_attr_bytes<T>(e: &BytesStart, key: &[u8], parse: impl Fn(&[u8]) -> Option<T>) -> Option<T> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| parse(&attr.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::REL_PIVOT_TABLE;

    fn sales_workbook() -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws.set_row(1, 1, ["Month", "Year", "Type", "Sales", "Region"]);
        ws.set_row(2, 1, [
            CellValue::from("Jan"),
            CellValue::Number(2017.0),
            CellValue::from("Meat"),
            CellValue::Number(1200.0),
            CellValue::from("East"),
        ]);
        wb
    }

    fn sales_spec() -> PivotTableSpec {
        PivotTableSpec::new("Sheet1!$A$1:$E$31", "Sheet1!$G$2:$M$34")
            .rows(["Month", "Year"])
            .columns(["Type"])
            .data(["Sales"])
    }

    #[test]
    fn test_workbook_new() {
        let wb = Workbook::new();
        assert!(wb.worksheets.is_empty());
        assert!(wb.sheet_names.is_empty());
        assert!(matches!(wb.active(), Err(PivotxlError::NoWorksheets)));
    }

    #[test]
    fn test_create_sheet() {
        let mut wb = Workbook::new();
        let _ = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        let ws = wb.create_sheet(None).unwrap();
        assert_eq!(ws.title(), "Sheet2");
        assert_eq!(wb.sheet_names, vec!["Sheet1", "Sheet2"]);
        assert_eq!(wb.sheet_part_path("Sheet2").unwrap(), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn test_create_sheet_duplicate() {
        let mut wb = Workbook::new();
        let _ = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        let result = wb.create_sheet(Some("Sheet1".to_string()));
        assert!(matches!(result, Err(PivotxlError::WorksheetAlreadyExists(_))));
    }

    #[test]
    fn test_remove_sheet_rekeys_relationships() {
        let mut wb = Workbook::new();
        for name in ["A", "B", "C"] {
            wb.create_sheet(Some(name.to_string())).unwrap();
        }
        wb.package
            .add_relationship("xl/worksheets/sheet1.xml", REL_PIVOT_TABLE, "../pivotTables/pivotTable1.xml");
        wb.package
            .add_relationship("xl/worksheets/sheet3.xml", REL_PIVOT_TABLE, "../pivotTables/pivotTable2.xml");

        wb.remove_sheet("A").unwrap();
        assert_eq!(wb.sheet_names, vec!["B", "C"]);
        assert!(wb.package.relationships("xl/worksheets/sheet1.xml").is_none());
        let moved = wb.package.relationships("xl/worksheets/sheet2.xml").unwrap();
        assert_eq!(moved.get("rId1").unwrap().target, "../pivotTables/pivotTable2.xml");
        assert!(wb.package.relationships("xl/worksheets/sheet3.xml").is_none());

        assert!(matches!(wb.remove_sheet("A"), Err(PivotxlError::WorksheetNotFound(_))));
    }

    #[test]
    fn test_named_ranges() {
        let mut wb = Workbook::new();
        wb.create_named_range("MyRange".to_string(), "'Sheet1'!A1:B10".to_string())
            .unwrap();
        assert_eq!(wb.get_named_range("MyRange"), Some("'Sheet1'!A1:B10"));
        assert!(wb
            .create_named_range("MyRange".to_string(), "Sheet1!A1".to_string())
            .is_err());
    }

    #[test]
    fn test_parse_workbook_xml() {
        let workbook_xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
    <sheets>
        <sheet name="Data &amp; More" sheetId="8" r:id="rId1"/>
        <sheet name="Summary" sheetId="2" r:id="rId2"/>
    </sheets>
    <definedNames><definedName name="Totals">Summary!$A$1:$B$2</definedName></definedNames>
    <pivotCaches><pivotCache cacheId="5" r:id="rId7"/></pivotCaches>
</workbook>"#;

        let parsed = Workbook::parse_workbook_xml(Cursor::new(workbook_xml)).unwrap();
        assert_eq!(parsed.sheets.len(), 2);
        assert_eq!(parsed.sheets[0], ("Data & More".to_string(), 8, "rId1".to_string()));
        assert_eq!(parsed.named_ranges[0].range, "Summary!$A$1:$B$2");
        assert_eq!(parsed.pivot_caches, vec![(5, "rId7".to_string())]);
    }

    #[test]
    fn test_bytes_roundtrip_with_multiple_sheets() {
        let mut wb = Workbook::new();
        let ws1 = wb.create_sheet(Some("Sheet1".to_string())).unwrap();
        ws1.set_cell_value(1, 1, CellValue::from(" padded "));
        ws1.set_cell_value(1, 2, CellValue::Number(123.45));
        let ws2 = wb.create_sheet(Some("Sheet2".to_string())).unwrap();
        ws2.set_cell_value(2, 2, CellValue::Boolean(true));
        ws2.set_cell_value(3, 1, CellValue::formula("SUM(B1:B2)"));
        ws2.set_cell_value(3, 2, CellValue::formula_with_cached("B2*2", CellValue::Number(2.0)));
        ws2.set_cell_value(4, 1, CellValue::formula_with_cached("\"42\"", CellValue::from("42")));

        let bytes = wb.save_to_bytes().unwrap();
        assert_eq!(&bytes[0..2], b"PK");
        let wb2 = Workbook::load_from_bytes(&bytes).unwrap();

        assert_eq!(wb2.sheet_names, vec!["Sheet1", "Sheet2"]);
        let ws1 = wb2.get_sheet_by_name("Sheet1").unwrap();
        assert_eq!(ws1.get_cell_value(1, 1), Some(&CellValue::from(" padded ")));
        assert_eq!(ws1.get_cell_value(1, 2), Some(&CellValue::Number(123.45)));
        let ws2 = wb2.get_sheet_by_index(1).unwrap();
        assert_eq!(ws2.get_cell_value(2, 2), Some(&CellValue::Boolean(true)));
        assert_eq!(
            ws2.get_cell_value(3, 1),
            Some(&CellValue::formula("SUM(B1:B2)"))
        );
        assert_eq!(
            ws2.get_cell_value(3, 2),
            Some(&CellValue::formula_with_cached("B2*2", CellValue::Number(2.0)))
        );
        // A digit-only formula string is not read as a shared string index.
        assert_eq!(
            ws2.get_cell_value(4, 1),
            Some(&CellValue::formula_with_cached("\"42\"", CellValue::from("42")))
        );
        assert_eq!(wb2.package().part_count(), 0);
    }

    #[test]
    fn test_add_pivot_table_stores_parts() {
        let mut wb = sales_workbook();
        wb.add_pivot_table(&sales_spec()).unwrap();

        assert!(wb.package().contains_part("xl/pivotTables/pivotTable1.xml"));
        assert!(wb.package().contains_part("xl/pivotCache/pivotCacheDefinition1.xml"));
        assert_eq!(wb.pivot_caches(), &[PivotCacheEntry { cache_id: 1, r_id: "rId1".to_string() }]);

        let tables = wb.pivot_tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name.as_deref(), Some("Pivot Table1"));
        assert_eq!(tables[0].cache_id, Some(1));
    }

    #[test]
    fn test_generated_rels_do_not_clash_with_pivot_cache() {
        let mut wb = sales_workbook();
        wb.add_pivot_table(&sales_spec()).unwrap();
        let bytes = wb.save_to_bytes().unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let xml = Workbook::read_zip_file_to_vec(&mut archive, "xl/_rels/workbook.xml.rels").unwrap();
        let rels = Relationships::parse(&xml).unwrap();
        let ids: Vec<&str> = rels.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rId1", "rId2", "rId3", "rId4"]);
        assert_eq!(rels.get("rId1").unwrap().target, "pivotCache/pivotCacheDefinition1.xml");
        assert_eq!(rels.get("rId2").unwrap().rel_type, REL_WORKSHEET);

        let workbook_xml = Workbook::read_zip_file_to_vec(&mut archive, WORKBOOK_PART).unwrap();
        let workbook_xml = String::from_utf8(workbook_xml).unwrap();
        assert!(workbook_xml.contains(r#"<sheet name="Sheet1" sheetId="1" r:id="rId2"/>"#));
        assert!(workbook_xml.contains(r#"<pivotCache cacheId="1" r:id="rId1"/>"#));
    }

    #[test]
    fn test_reload_preserves_pivot_registry() {
        let mut wb = sales_workbook();
        wb.add_pivot_table(&sales_spec()).unwrap();
        let mut wb2 = Workbook::load_from_bytes(&wb.save_to_bytes().unwrap()).unwrap();

        assert_eq!(wb2.pivot_caches(), wb.pivot_caches());
        assert_eq!(wb2.package().count_parts("xl/pivotTables/pivotTable"), 1);
        let sheet_rels = wb2.package().relationships("xl/worksheets/sheet1.xml").unwrap();
        assert_eq!(sheet_rels.get("rId1").unwrap().target, "../pivotTables/pivotTable1.xml");
        assert!(wb2
            .package()
            .content_types()
            .override_for("xl/pivotTables/pivotTable1.xml")
            .is_some());

        wb2.add_pivot_table(&sales_spec()).unwrap();
        let caches = wb2.pivot_cache_definitions().unwrap();
        assert_eq!(caches.len(), 2);
        assert_eq!(wb2.pivot_caches()[1].cache_id, 2);
        assert_eq!(wb2.pivot_caches()[1].r_id, "rId2");
    }

    #[test]
    fn test_get_file_options_levels() {
        let mut wb = Workbook::new();
        for level in [
            CompressionLevel::None,
            CompressionLevel::Fast,
            CompressionLevel::Default,
            CompressionLevel::Best,
        ] {
            wb.set_compression(level);
            wb.create_sheet(None).unwrap();
            let bytes = wb.save_to_bytes().unwrap();
            assert!(Workbook::load_from_bytes(&bytes).is_ok());
        }
    }
}
