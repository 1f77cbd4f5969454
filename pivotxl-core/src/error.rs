//! Error types for pivotxl.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PivotxlError>;

/// Errors produced while reading, writing, or mutating a workbook.
#[derive(Error, Debug)]
pub enum PivotxlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Workbook has no worksheets")]
    NoWorksheets,

    #[error("sheet {0} does not exist")]
    WorksheetNotFound(String),

    #[error("Worksheet '{0}' already exists")]
    WorksheetAlreadyExists(String),

    #[error("Named range '{0}' already exists")]
    NamedRangeAlreadyExists(String),

    /// A required pivot table parameter is missing.
    #[error("parameter is required: {0}")]
    Configuration(String),

    /// A `Sheet!Range` reference could not be parsed.
    #[error("invalid range '{range}': {reason}")]
    RangeFormat { range: String, reason: String },

    /// The range collapses to a single cell.
    #[error("range '{0}' must span more than one cell")]
    RangeDegenerate(String),

    #[error("cannot read cell {sheet}!{cell}: {reason}")]
    CellRead {
        sheet: String,
        cell: String,
        reason: String,
    },

    /// Wraps an error raised while processing a named parameter.
    #[error("parameter '{name}' parsing error: {source}")]
    Parameter {
        name: &'static str,
        #[source]
        source: Box<PivotxlError>,
    },

    #[error("{0}")]
    Custom(String),
}

impl PivotxlError {
    pub fn custom(msg: impl Into<String>) -> Self {
        PivotxlError::Custom(msg.into())
    }

    /// Attach the name of the parameter that produced this error.
    pub fn for_parameter(self, name: &'static str) -> Self {
        PivotxlError::Parameter {
            name,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any parameter wrappers.
    pub fn root_cause(&self) -> &PivotxlError {
        let mut err = self;
        while let PivotxlError::Parameter { source, .. } = err {
            err = source;
        }
        err
    }
}

impl From<quick_xml::events::attributes::AttrError> for PivotxlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        PivotxlError::Xml(quick_xml::Error::from(err))
    }
}
