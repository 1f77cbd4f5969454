//! A1-style coordinate parsing and formatting.

use crate::error::{PivotxlError, Result};

/// Maximum column number (XFD).
pub const MAX_COLUMN: u32 = 16384;
/// Maximum row number.
pub const MAX_ROW: u32 = 1_048_576;

/// Parse a cell reference such as `b"B7"` or `b"$B$7"` into 1-indexed
/// `(row, column)`. `$` anchors are accepted in front of either part.
#[inline]
pub fn parse_coordinate_bytes(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 0usize;
    if bytes.first() == Some(&b'$') {
        pos += 1;
    }

    let letters_start = pos;
    let mut column: u32 = 0;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_alphabetic() {
            break;
        }
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as u32;
        column = column.checked_mul(26)?.checked_add(digit)?;
        if column > MAX_COLUMN {
            return None;
        }
        pos += 1;
    }
    if pos == letters_start {
        return None;
    }

    if bytes.get(pos) == Some(&b'$') {
        pos += 1;
    }

    let digits = bytes.get(pos..)?;
    let row = parse_u32_bytes(digits)?;
    if row == 0 || row > MAX_ROW {
        return None;
    }

    Some((row, column))
}

/// Parse a cell reference (e.g. `"A1"`, `"$AB$123"`) into `(row, column)`.
pub fn parse_coordinate(coord: &str) -> Result<(u32, u32)> {
    let coord = coord.trim();
    parse_coordinate_bytes(coord.as_bytes())
        .ok_or_else(|| PivotxlError::InvalidCoordinate(coord.to_string()))
}

/// Parse an unsigned decimal without allocating. `None` on empty input,
/// non-digits or overflow.
#[inline]
pub fn parse_u32_bytes(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add((b - b'0') as u32)
    })
}

/// Parse a float from raw `<v>` bytes.
#[inline]
pub fn parse_f64_bytes(bytes: &[u8]) -> Option<f64> {
    if let Some(n) = parse_u32_bytes(bytes) {
        return Some(n as f64);
    }
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Convert column letters (`"A"`, `"AB"`, `"XFD"`) to a 1-indexed number.
pub fn letter_to_column(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(PivotxlError::InvalidCoordinate("empty column letters".to_string()));
    }
    letters.bytes().try_fold(0u32, |acc, b| {
        if !b.is_ascii_alphabetic() {
            return Err(PivotxlError::InvalidCoordinate(format!(
                "invalid character '{}' in column '{}'",
                b as char, letters
            )));
        }
        let next = acc
            .checked_mul(26)
            .and_then(|n| n.checked_add((b.to_ascii_uppercase() - b'A' + 1) as u32))
            .filter(|n| *n <= MAX_COLUMN);
        next.ok_or_else(|| {
            PivotxlError::InvalidCoordinate(format!("column '{}' exceeds XFD", letters))
        })
    })
}

/// Convert a 1-indexed column number to letters (1 -> `"A"`, 28 -> `"AB"`).
pub fn column_to_letter(column: u32) -> String {
    let mut letters = Vec::with_capacity(3);
    let mut col = column;
    while col > 0 {
        col -= 1;
        letters.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Format `(row, column)` as an A1 reference.
pub fn coordinate_from_row_col(row: u32, column: u32) -> String {
    let mut out = column_to_letter(column);
    out.push_str(itoa::Buffer::new().format(row));
    out
}

/// Split `"A1:B10"` (anchors allowed) into its two corners, unnormalized.
pub fn parse_range(range: &str) -> Result<((u32, u32), (u32, u32))> {
    let (start, end) = range
        .split_once(':')
        .filter(|(_, end)| !end.contains(':'))
        .ok_or_else(|| PivotxlError::InvalidCoordinate(format!("invalid range: {}", range)))?;
    Ok((parse_coordinate(start)?, parse_coordinate(end)?))
}
