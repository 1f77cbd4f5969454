//! Python bindings for Workbook.

#![allow(deprecated)]

use pyo3::exceptions::{PyKeyError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};
use pivotxl_core::{CellValue, CompressionLevel, PivotTableSpec, PivotxlError, Workbook};

/// An Excel workbook that can carry pivot tables.
#[pyclass(name = "Workbook")]
pub struct PyWorkbook {
    pub(crate) inner: Workbook,
}

/// Map a core error onto the closest Python exception.
pub(crate) fn to_py_err(err: PivotxlError) -> PyErr {
    match err.root_cause() {
        PivotxlError::WorksheetNotFound(_) => PyKeyError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

#[pymethods]
impl PyWorkbook {
    /// Create a new empty workbook.
    #[new]
    fn new() -> Self {
        PyWorkbook {
            inner: Workbook::new(),
        }
    }

    /// Load a workbook from a file path, bytes, or file-like object.
    #[staticmethod]
    #[pyo3(signature = (source))]
    pub fn load(source: &Bound<'_, PyAny>) -> PyResult<Self> {
        if let Ok(path) = source.extract::<&str>() {
            let inner = Workbook::load(path).map_err(to_py_err)?;
            return Ok(PyWorkbook { inner });
        }

        if let Ok(bytes) = source.extract::<&[u8]>() {
            let inner = Workbook::load_from_bytes(bytes).map_err(to_py_err)?;
            return Ok(PyWorkbook { inner });
        }

        if source.hasattr("read")? {
            let bytes_obj = source.call_method0("read")?;
            let bytes = bytes_obj.extract::<&[u8]>()?;
            let inner = Workbook::load_from_bytes(bytes).map_err(to_py_err)?;
            return Ok(PyWorkbook { inner });
        }

        Err(PyTypeError::new_err(
            "Expected file path (str), bytes, or file-like object with .read() method",
        ))
    }

    /// Names of all worksheets in order.
    #[getter]
    fn sheetnames(&self) -> Vec<String> {
        self.inner.sheet_names.clone()
    }

    fn __contains__(&self, key: &str) -> bool {
        self.inner.sheet_names.iter().any(|n| n == key)
    }

    fn __len__(&self) -> usize {
        self.inner.worksheets.len()
    }

    /// Create a new worksheet and return its title.
    #[pyo3(signature = (title=None))]
    fn create_sheet(&mut self, title: Option<String>) -> PyResult<String> {
        let ws = self.inner.create_sheet(title).map_err(to_py_err)?;
        Ok(ws.title().to_string())
    }

    /// Remove a worksheet by name.
    fn remove_sheet(&mut self, title: &str) -> PyResult<()> {
        self.inner.remove_sheet(title).map_err(to_py_err)
    }

    /// Set a cell by A1-style coordinate. Strings starting with `=` are
    /// stored as formulas and `None` clears the cell.
    fn set_cell(&mut self, sheet: &str, coordinate: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = python_to_cell_value(value)?;
        self.inner
            .get_sheet_by_name_mut(sheet)
            .and_then(|ws| ws.set_cell(coordinate, value))
            .map_err(to_py_err)
    }

    /// Read a cell by A1-style coordinate, `None` when empty.
    fn get_cell(&self, sheet: &str, coordinate: &str, py: Python<'_>) -> PyResult<PyObject> {
        let ws = self.inner.get_sheet_by_name(sheet).map_err(to_py_err)?;
        match ws.get_cell(coordinate).map_err(to_py_err)? {
            Some(value) => Ok(cell_value_to_python(value, py)),
            None => Ok(py.None()),
        }
    }

    /// Add a pivot table.
    ///
    /// Args:
    ///     options: dict with `data_range` and `pivot_table_range`
    ///         ("Sheet!A1:B2" references) and optional `rows`, `columns`,
    ///         `data` and `page` lists of header names.
    #[pyo3(signature = (options))]
    fn add_pivot_table(&mut self, options: Option<&Bound<'_, PyDict>>) -> PyResult<()> {
        let spec = match options {
            Some(dict) => spec_from_dict(dict)?,
            None => PivotTableSpec::default(),
        };
        self.inner.add_pivot_table(&spec).map_err(to_py_err)
    }

    /// Stored pivot tables as a list of dicts.
    fn pivot_tables<'py>(&self, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyDict>>> {
        let tables = self.inner.pivot_tables().map_err(to_py_err)?;
        tables
            .into_iter()
            .map(|info| {
                let dict = PyDict::new(py);
                dict.set_item("path", info.path)?;
                dict.set_item("name", info.name)?;
                dict.set_item("cache_id", info.cache_id)?;
                dict.set_item("location", info.location_ref)?;
                dict.set_item("row_fields", info.row_fields)?;
                dict.set_item("col_fields", info.col_fields)?;
                dict.set_item("data_fields", info.data_fields)?;
                Ok(dict)
            })
            .collect()
    }

    /// Save the workbook to a file.
    fn save(&self, filename: &str) -> PyResult<()> {
        self.inner.save(filename).map_err(to_py_err)
    }

    /// Save the workbook to bytes.
    fn save_to_bytes<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyBytes>> {
        let bytes = self.inner.save_to_bytes().map_err(to_py_err)?;
        Ok(PyBytes::new(py, &bytes))
    }

    /// Set compression level for saving: "none", "fast", "default", or "best".
    fn set_compression(&mut self, level: &str) -> PyResult<()> {
        let level = match level.to_lowercase().as_str() {
            "none" | "stored" => CompressionLevel::None,
            "fast" | "1" => CompressionLevel::Fast,
            "default" | "6" => CompressionLevel::Default,
            "best" | "9" => CompressionLevel::Best,
            _ => {
                return Err(PyValueError::new_err(
                    "Invalid compression level. Use: 'none', 'fast', 'default', or 'best'",
                ))
            }
        };
        self.inner.set_compression(level);
        Ok(())
    }

    fn __repr__(&self) -> String {
        format!(
            "<Workbook sheets={:?} pivot_caches={}>",
            self.inner.sheet_names,
            self.inner.pivot_caches().len()
        )
    }
}

fn spec_from_dict(dict: &Bound<'_, PyDict>) -> PyResult<PivotTableSpec> {
    let text = |key: &str| -> PyResult<String> {
        match dict.get_item(key)? {
            Some(v) if !v.is_none() => v.extract::<String>(),
            _ => Ok(String::new()),
        }
    };
    let names = |key: &str| -> PyResult<Vec<String>> {
        match dict.get_item(key)? {
            Some(v) if !v.is_none() => v.extract::<Vec<String>>(),
            _ => Ok(Vec::new()),
        }
    };

    Ok(PivotTableSpec {
        data_range: text("data_range")?,
        pivot_table_range: text("pivot_table_range")?,
        rows: names("rows")?,
        columns: names("columns")?,
        data: names("data")?,
        page: names("page")?,
    })
}

/// Convert a Python value to a CellValue.
fn python_to_cell_value(value: &Bound<'_, PyAny>) -> PyResult<CellValue> {
    if value.is_none() {
        Ok(CellValue::Empty)
    } else if let Ok(s) = value.extract::<String>() {
        match s.strip_prefix('=') {
            Some(formula) => Ok(CellValue::formula(formula)),
            None => Ok(CellValue::from(s)),
        }
    } else if let Ok(b) = value.extract::<bool>() {
        Ok(CellValue::Boolean(b))
    } else if let Ok(n) = value.extract::<f64>() {
        Ok(CellValue::Number(n))
    } else {
        Ok(CellValue::from(value.str()?.to_string()))
    }
}

/// Convert a CellValue to a Python object.
fn cell_value_to_python(value: &CellValue, py: Python<'_>) -> PyObject {
    match value {
        CellValue::Empty => py.None(),
        CellValue::String(s) => s.as_ref().to_object(py),
        CellValue::Number(n) => n.to_object(py),
        CellValue::Boolean(b) => b.to_object(py),
        CellValue::Formula { formula, .. } => format!("={}", formula).to_object(py),
        CellValue::Date(d) => d.to_object(py),
    }
}
