//! Clause parser.
//!
//! Turns scanned clauses into [`PredicateSet`] entries. Nothing here can
//! fail: a clause that does not match `[!]field:[!](values)` is kept
//! verbatim as a free-text term.

use crate::predicate::{PredicateSet, FREE_TEXT_FIELD};
use crate::scanner::scan;

/// A single classified clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Field {
        name: String,
        negated: bool,
        values: Vec<String>,
    },
    Term(String),
}

/// Parse search text into a predicate set. Empty input gives an empty set.
pub fn parse(text: &str) -> PredicateSet {
    let mut predicates = PredicateSet::new();
    for raw in scan(text) {
        match parse_clause(raw.text) {
            Clause::Field {
                name,
                negated,
                values,
            } => predicates.merge_clause(&name, negated, values),
            Clause::Term(term) => predicates.push_term(term),
        }
    }
    predicates
}

/// Classify one clause.
pub fn parse_clause(text: &str) -> Clause {
    parse_field_clause(text).unwrap_or_else(|| Clause::Term(parse_term(text)))
}

pub(crate) fn is_field_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn parse_field_clause(text: &str) -> Option<Clause> {
    let (bang, rest) = match text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let name_len = rest
        .find(|c: char| !is_field_char(c))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let name = &rest[..name_len];
    let body = rest[name_len..].strip_prefix(':')?;

    let (inner_bang, body) = match body.strip_prefix("!(") {
        Some(_) => (true, &body[1..]),
        None => (false, body),
    };
    if bang && inner_bang {
        return None;
    }
    let negated = bang || inner_bang;

    let list = if body.starts_with('(') {
        let close = closing_paren(body)?;
        if close != body.len() - 1 {
            return None;
        }
        &body[1..close]
    } else {
        body
    };

    let values = split_list(list)?;
    if values.is_empty() {
        return None;
    }

    if name == FREE_TEXT_FIELD {
        if negated {
            return None;
        }
        // Explicit `q:(…)` carries free-text terms.
        return Some(Clause::Field {
            name: FREE_TEXT_FIELD.to_string(),
            negated: false,
            values,
        });
    }

    Some(Clause::Field {
        name: name.to_string(),
        negated,
        values,
    })
}

/// Index of the `)` closing the `(` at the start of `body`.
///
/// Nested parentheses are not part of the grammar and yield `None`.
fn closing_paren(body: &str) -> Option<usize> {
    let mut in_quote = false;
    let mut escaped = false;
    for (i, c) in body.char_indices().skip(1) {
        if in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '(' => return None,
            ')' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split a comma-separated value list. `None` on stray quotes or parens.
fn split_list(list: &str) -> Option<Vec<String>> {
    let mut values = Vec::new();
    let mut item_start = 0;
    let mut in_quote = false;
    let mut escaped = false;

    for (i, c) in list.char_indices() {
        if in_quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '(' | ')' => return None,
            ',' => {
                push_item(&list[item_start..i], &mut values)?;
                item_start = i + 1;
            }
            _ => {}
        }
    }
    if in_quote {
        return None;
    }
    push_item(&list[item_start..], &mut values)?;
    Some(values)
}

fn push_item(raw: &str, values: &mut Vec<String>) -> Option<()> {
    let item = raw.trim();
    if item.is_empty() {
        return Some(());
    }
    if item.starts_with('"') {
        values.push(unquote(item)?);
    } else if item.contains('"') {
        return None;
    } else {
        values.push(item.to_string());
    }
    Some(())
}

fn parse_term(text: &str) -> String {
    unquote(text).unwrap_or_else(|| text.to_string())
}

/// Content of `text` if the whole of it is one quoted string.
pub(crate) fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => return None,
            },
            '"' => {
                return if i + 1 == inner.len() { Some(out) } else { None };
            }
            c => out.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, negated: bool, values: &[&str]) -> Clause {
        Clause::Field {
            name: name.to_string(),
            negated,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_clause_simple_field() {
        assert_eq!(parse_clause("zone:(a,b)"), field("zone", false, &["a", "b"]));
    }

    #[test]
    fn test_parse_clause_negations() {
        assert_eq!(parse_clause("!zone:(a)"), field("zone", true, &["a"]));
        assert_eq!(parse_clause("zone:!(a)"), field("zone", true, &["a"]));
        assert_eq!(
            parse_clause("!zone:!(a)"),
            Clause::Term("!zone:!(a)".to_string())
        );
    }

    #[test]
    fn test_parse_clause_bare_list() {
        assert_eq!(parse_clause("zone:a,b"), field("zone", false, &["a", "b"]));
        assert_eq!(parse_clause("zone:"), Clause::Term("zone:".to_string()));
    }

    #[test]
    fn test_parse_clause_trims_and_skips_empty_items() {
        assert_eq!(
            parse_clause("tags:( a ,, b )"),
            field("tags", false, &["a", "b"])
        );
    }

    #[test]
    fn test_parse_clause_explicit_empty_value() {
        assert_eq!(parse_clause(r#"tags:("")"#), field("tags", false, &[""]));
    }

    #[test]
    fn test_parse_clause_quoted_values() {
        assert_eq!(
            parse_clause(r#"tags:("a, b","c \"d\"","e\\f")"#),
            field("tags", false, &["a, b", "c \"d\"", "e\\f"])
        );
    }

    #[test]
    fn test_parse_clause_malformed_becomes_term() {
        for text in [
            "zone:()",
            "zone:(a)x",
            "zone:((a))",
            "zone:(a",
            r#"zone:(a"b)"#,
            r#"zone:("a"b)"#,
            "zone:a)",
            ":(a)",
            "zo ne:(a)",
        ] {
            assert_eq!(parse_clause(text), Clause::Term(text.to_string()), "{text}");
        }
    }

    #[test]
    fn test_parse_clause_q_field() {
        assert_eq!(parse_clause("q:(rack)"), field("q", false, &["rack"]));
        assert_eq!(parse_clause("!q:(rack)"), Clause::Term("!q:(rack)".to_string()));
    }

    #[test]
    fn test_parse_term_unquotes() {
        assert_eq!(parse_clause(r#""big disk""#), Clause::Term("big disk".to_string()));
        assert_eq!(parse_clause(r#""a"b"#), Clause::Term(r#""a"b"#.to_string()));
        assert_eq!(parse_clause("!gpu"), Clause::Term("!gpu".to_string()));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn test_parse_collects_terms_into_q() {
        let set = parse("rack zone:(a) gpu");
        assert_eq!(set.free_text().collect::<Vec<_>>(), vec!["rack", "gpu"]);
        let names: Vec<_> = set.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["q", "zone"]);
    }

    #[test]
    fn test_parse_q_clause_merges_with_terms() {
        let set = parse(r#"rack q:("big disk",gpu)"#);
        assert_eq!(
            set.free_text().collect::<Vec<_>>(),
            vec!["rack", "big disk", "gpu"]
        );
    }

    #[test]
    fn test_parse_repeated_field() {
        let set = parse("zone:(a) zone:(b) !pool:(x) pool:(y)");
        let zone = set.get("zone").unwrap();
        assert!(!zone.negated);
        assert_eq!(zone.values.len(), 2);
        let pool = set.get("pool").unwrap();
        assert!(!pool.negated);
        assert!(pool.contains("y") && !pool.contains("x"));
    }

    #[test]
    fn test_parse_dotted_field_names() {
        let set = parse("pod.name:(kvm-1) power_state:(on)");
        assert!(set.get("pod.name").is_some());
        assert!(set.get("power_state").is_some());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""""#), Some(String::new()));
        assert_eq!(unquote(r#""a\"b""#), Some("a\"b".to_string()));
        assert_eq!(unquote(r#""a"#), None);
        assert_eq!(unquote(r#""a\"#), None);
        assert_eq!(unquote("a"), None);
    }
}
