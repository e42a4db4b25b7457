//! Fuzz the clause scanner with arbitrary text.
//!
//! Run with: cargo +nightly fuzz run scanner_fuzz -- -max_total_time=60

#![no_main]

use fleetdeck_filter::scanner::scan;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let clauses = scan(input);

        let mut last_end = 0;
        for clause in &clauses {
            // Spans are ordered, non-overlapping and point at the clause text.
            assert!(clause.start >= last_end, "clauses overlap");
            assert!(clause.start < clause.end, "empty clause");
            assert_eq!(&input[clause.start..clause.end], clause.text);
            assert!(!clause.text.trim().is_empty(), "blank clause");
            last_end = clause.end;
        }
    }
});
