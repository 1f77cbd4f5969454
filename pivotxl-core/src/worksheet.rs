//! Worksheet representation.

#[cfg(feature = "fast-hash")]
use hashbrown::HashMap;
#[cfg(not(feature = "fast-hash"))]
use std::collections::HashMap;

use crate::cell::CellValue;
use crate::error::Result;
use crate::utils::parse_coordinate;

/// Pack a 1-indexed (row, column) pair into a single map key.
#[inline]
pub fn cell_key(row: u32, column: u32) -> u64 {
    ((row as u64) << 32) | column as u64
}

/// Inverse of [`cell_key`].
#[inline]
pub fn split_cell_key(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, key as u32)
}

/// A single worksheet: a title plus a sparse grid of cell values.
#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    pub title: String,
    pub cells: HashMap<u64, CellValue>,
}

impl Worksheet {
    pub fn new(title: String) -> Self {
        Worksheet {
            title,
            cells: HashMap::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set a cell value. Writing [`CellValue::Empty`] clears the cell.
    pub fn set_cell_value(&mut self, row: u32, column: u32, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&cell_key(row, column));
        } else {
            self.cells.insert(cell_key(row, column), value);
        }
    }

    /// Set a cell value using an A1-style coordinate.
    pub fn set_cell(&mut self, coordinate: &str, value: impl Into<CellValue>) -> Result<()> {
        let (row, column) = parse_coordinate(coordinate)?;
        self.set_cell_value(row, column, value.into());
        Ok(())
    }

    pub fn get_cell_value(&self, row: u32, column: u32) -> Option<&CellValue> {
        self.cells.get(&cell_key(row, column))
    }

    /// Look up a cell by A1-style coordinate.
    pub fn get_cell(&self, coordinate: &str) -> Result<Option<&CellValue>> {
        let (row, column) = parse_coordinate(coordinate)?;
        Ok(self.get_cell_value(row, column))
    }

    /// Write a row of values starting at `(row, first_column)`.
    pub fn set_row<I, V>(&mut self, row: u32, first_column: u32, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        for (offset, value) in values.into_iter().enumerate() {
            self.set_cell_value(row, first_column + offset as u32, value.into());
        }
    }

    pub fn max_row(&self) -> u32 {
        self.cells.keys().map(|k| split_cell_key(*k).0).max().unwrap_or(0)
    }

    pub fn max_column(&self) -> u32 {
        self.cells.keys().map(|k| split_cell_key(*k).1).max().unwrap_or(0)
    }

    /// Cells grouped by row, both rows and columns in ascending order.
    pub fn sorted_rows(&self) -> Vec<(u32, Vec<(u32, &CellValue)>)> {
        let mut keys: Vec<u64> = self.cells.keys().copied().collect();
        keys.sort_unstable();

        let mut rows: Vec<(u32, Vec<(u32, &CellValue)>)> = Vec::new();
        for key in keys {
            let (row, column) = split_cell_key(key);
            let value = &self.cells[&key];
            match rows.last_mut() {
                Some((r, cells)) if *r == row => cells.push((column, value)),
                _ => rows.push((row, vec![(column, value)])),
            }
        }
        rows
    }
}
