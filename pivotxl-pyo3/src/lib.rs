//! Python bindings for pivotxl.
//!
//! Exposes the `pivotxl-core` workbook with its pivot table support through
//! PyO3.

use pyo3::prelude::*;

mod workbook;

use workbook::PyWorkbook;

/// Load a workbook from a file path, bytes, or file-like object.
///
/// Example:
///     wb = load_workbook('file.xlsx')
///     wb = load_workbook(file_bytes)
#[pyfunction]
#[pyo3(signature = (source))]
fn load_workbook(source: &Bound<'_, PyAny>) -> PyResult<PyWorkbook> {
    PyWorkbook::load(source)
}

/// The pivotxl Python module.
#[pymodule]
fn pivotxl(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyWorkbook>()?;
    m.add_function(wrap_pyfunction!(load_workbook, m)?)?;
    Ok(())
}
