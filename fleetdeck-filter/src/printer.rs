//! Printer for predicate sets.
//!
//! Output is canonical: `parse(serialize(p)) == p` for every `p` produced by
//! [`crate::parse`].

use crate::predicate::{PredicateSet, ValueSpec, FREE_TEXT_FIELD};
use std::fmt::Write;

/// Render a predicate set back to search text, in insertion order.
pub fn serialize(predicates: &PredicateSet) -> String {
    let mut out = String::new();
    for (field, spec) in predicates.fields() {
        if spec.values.is_empty() {
            continue;
        }
        if field == FREE_TEXT_FIELD {
            for term in &spec.values {
                separate(&mut out);
                out.push_str(&render_term(term));
            }
        } else {
            separate(&mut out);
            write_clause(&mut out, field, spec);
        }
    }
    out
}

fn separate(out: &mut String) {
    if !out.is_empty() {
        out.push(' ');
    }
}

fn write_clause(out: &mut String, field: &str, spec: &ValueSpec) {
    let values: Vec<String> = spec.values.iter().map(|v| render_value(v)).collect();
    let bang = if spec.negated { "!" } else { "" };
    // Writing to a String cannot fail.
    let _ = write!(out, "{}{}:({})", bang, field, values.join(","));
}

/// Render a list value, quoting it when the bare form would not parse back.
pub fn render_value(value: &str) -> String {
    if value_needs_quotes(value) {
        quote(value)
    } else {
        value.to_string()
    }
}

/// Render a free-text term. Terms are also quoted when they contain `:` so
/// they cannot be mistaken for a field clause.
pub fn render_term(term: &str) -> String {
    if value_needs_quotes(term) || term.contains(':') {
        quote(term)
    } else {
        term.to_string()
    }
}

fn value_needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"' | '\\'))
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_serialize_empty() {
        assert_eq!(serialize(&PredicateSet::new()), "");
    }

    #[test]
    fn test_serialize_canonical_forms() {
        for text in [
            "zone:(a,b)",
            "!zone:(a)",
            "rack gpu",
            "rack zone:(lab) gpu",
            r#"tags:("big disk","a,b","")"#,
            r#""a:b" !gpu"#,
        ] {
            assert_eq!(serialize(&parse(text)), text);
        }
    }

    #[test]
    fn test_serialize_normalizes_alternate_spellings() {
        assert_eq!(serialize(&parse("zone:!(a)")), "!zone:(a)");
        assert_eq!(serialize(&parse("zone:a,b")), "zone:(a,b)");
        assert_eq!(serialize(&parse("zone:( a , b )")), "zone:(a,b)");
        assert_eq!(serialize(&parse("q:(rack)")), "rack");
    }

    #[test]
    fn test_serialize_groups_terms_at_first_position() {
        assert_eq!(serialize(&parse("a zone:(z) b")), "a b zone:(z)");
    }

    #[test]
    fn test_render_value_escapes() {
        assert_eq!(render_value("plain"), "plain");
        assert_eq!(render_value(""), r#""""#);
        assert_eq!(render_value(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(render_value(r"a\b"), r#""a\\b""#);
        assert_eq!(render_value("x:y"), "x:y");
        assert_eq!(render_term("x:y"), r#""x:y""#);
    }

    #[test]
    fn test_malformed_clause_survives_round_trip() {
        let set = parse("zone:(a");
        let text = serialize(&set);
        assert_eq!(text, r#""zone:(a""#);
        assert_eq!(parse(&text), set);
    }
}
