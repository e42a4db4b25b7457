//! Fuzz parse and print over arbitrary text.
//!
//! Run with: cargo +nightly fuzz run filter_fuzz -- -max_total_time=60

#![no_main]

use fleetdeck_filter::{from_query_string, parse, serialize, to_query_string, SELECTED_FIELD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let mut predicates = parse(input);

        // Printing reaches a fixed point after one pass.
        let canonical = serialize(&predicates);
        assert_eq!(serialize(&parse(&canonical)), canonical);

        predicates.remove(SELECTED_FIELD);
        let _ = from_query_string(&to_query_string(&predicates));
        let _ = from_query_string(input);
    }
});
