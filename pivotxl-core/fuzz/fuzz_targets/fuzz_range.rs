#![no_main]

//! Fuzz target for `Sheet!Range` resolution.
//!
//! Checks that arbitrary references never panic and that every accepted
//! range is normalized: corners ordered, more than one cell, and stable when
//! its own display form is parsed again.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pivotxl_core::{column_to_letter, NormalizedRange};

#[derive(Arbitrary, Debug)]
struct RangeFuzzInput {
    /// Raw reference text.
    reference: String,
    /// Structured corners for building well-formed references.
    sheet: String,
    corners: (u32, u32, u32, u32),
    anchored: bool,
}

fn check(reference: &str) {
    let Ok(range) = NormalizedRange::parse(reference) else {
        return;
    };
    assert!(range.x1 <= range.x2 && range.y1 <= range.y2);
    assert!(range.width() > 1 || range.height() > 1, "single cell accepted: {}", reference);

    let reparsed = NormalizedRange::parse(&range.to_string())
        .unwrap_or_else(|e| panic!("display form of {:?} rejected: {}", range, e));
    assert_eq!(reparsed, range);
}

fn structured(input: &RangeFuzzInput) -> String {
    let (c1, r1, c2, r2) = input.corners;
    let cell = |col: u32, row: u32| {
        let letters = column_to_letter(col % 16_385);
        let row = row % 1_048_577;
        if input.anchored {
            format!("${}${}", letters, row)
        } else {
            format!("{}{}", letters, row)
        }
    };
    format!("{}!{}:{}", input.sheet, cell(c1, r1), cell(c2, r2))
}

fuzz_target!(|input: RangeFuzzInput| {
    check(&input.reference);
    check(&structured(&input));
});
