//! FLEETDECK filter expressions
//!
//! A search box string such as `!zone:(lab) tags:(gpu,"big disk") rack` is
//! compiled into a [`PredicateSet`] and back. Parsing never fails: anything
//! that is not a well-formed `field:(values)` clause becomes free text.
//!
//! Architecture:
//! ```text
//! search text
//!     ↓
//! Scanner (whitespace-separated clauses, quote/paren aware)
//!     ↓
//! Parser (clause → field predicate | free-text term)
//!     ↓
//! PredicateSet ──→ Matcher (entity + FieldAccessor → bool)
//!     ↓
//! Printer / query string (for round-trip and URL persistence)
//! ```

pub mod matcher;
pub mod parser;
pub mod predicate;
pub mod printer;
pub mod query;
pub mod scanner;

pub use matcher::{matches, FieldAccessor, FieldValue, FnAccessor};
pub use parser::parse;
pub use predicate::{
    exact_value, is_exact_value_active, is_field_active, is_value_active, toggle_exact_value,
    toggle_value, PredicateSet, ValueSpec, EXACT_MARKER, FREE_TEXT_FIELD, SELECTED_FIELD,
};
pub use printer::serialize;
pub use query::{from_query_string, to_query_string};
