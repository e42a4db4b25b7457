//! URL query-string form of a predicate set.
//!
//! `?q=rack+gpu&zone=lab,prod&!tags=old` holds the same predicates as the
//! search text `rack gpu zone:(lab,prod) !tags:(old)`. The selection field
//! is view state and is dropped.

use crate::parser::parse;
use crate::predicate::{PredicateSet, FREE_TEXT_FIELD, SELECTED_FIELD};
use crate::printer::{render_term, render_value};

/// Encode predicates as a query string, including the leading `?`.
/// An empty set encodes as an empty string.
pub fn to_query_string(predicates: &PredicateSet) -> String {
    let mut pairs = Vec::new();
    for (field, spec) in predicates.fields() {
        if field == SELECTED_FIELD || spec.values.is_empty() {
            continue;
        }
        let value = if field == FREE_TEXT_FIELD {
            let terms: Vec<String> = spec
                .values
                .iter()
                .map(|term| encode(&render_term(term)))
                .collect();
            terms.join("+")
        } else {
            let values: Vec<String> = spec
                .values
                .iter()
                .map(|value| encode(&render_value(value)))
                .collect();
            values.join(",")
        };
        let bang = if spec.negated && field != FREE_TEXT_FIELD {
            "!"
        } else {
            ""
        };
        pairs.push(format!("{}{}={}", bang, encode(field), value));
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("?{}", pairs.join("&"))
    }
}

/// Decode a query string produced by [`to_query_string`]. The leading `?`
/// is optional; undecodable pairs are skipped.
pub fn from_query_string(query: &str) -> PredicateSet {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut clauses = Vec::new();

    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let (bang, key) = match key.strip_prefix('!') {
            Some(key) => ("!", key),
            None => ("", key),
        };
        let (Some(field), Some(value)) = (decode(key), decode(value)) else {
            continue;
        };
        if field == SELECTED_FIELD || value.is_empty() {
            continue;
        }
        if field == FREE_TEXT_FIELD {
            clauses.push(value);
        } else {
            clauses.push(format!("{}{}:({})", bang, field, value));
        }
    }

    parse(&clauses.join(" "))
}

fn encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

fn decode(text: &str) -> Option<String> {
    let spaced = text.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::serialize;

    #[test]
    fn test_query_string_shape() {
        let set = parse("rack gpu zone:(lab,prod) !tags:(old)");
        assert_eq!(to_query_string(&set), "?q=rack+gpu&zone=lab,prod&!tags=old");
    }

    #[test]
    fn test_query_string_empty() {
        assert_eq!(to_query_string(&PredicateSet::new()), "");
        assert!(from_query_string("").is_empty());
        assert!(from_query_string("?").is_empty());
    }

    #[test]
    fn test_query_string_drops_selection() {
        let set = parse("in:(selected) zone:(lab)");
        assert_eq!(to_query_string(&set), "?zone=lab");
        assert!(from_query_string("?in=selected").is_empty());
    }

    #[test]
    fn test_query_string_round_trip_with_quoting() {
        let set = parse(r#""big disk" tags:("a,b","x y") "a:b" !old"#);
        let query = to_query_string(&set);
        assert!(!query.contains(' '));
        assert_eq!(from_query_string(&query), set);
    }

    #[test]
    fn test_query_string_plus_in_value() {
        let set = parse("tags:(c++)");
        let query = to_query_string(&set);
        assert_eq!(query, "?tags=c%2B%2B");
        assert_eq!(serialize(&from_query_string(&query)), "tags:(c++)");
    }

    #[test]
    fn test_query_string_without_leading_marker() {
        let set = from_query_string("zone=lab&!pool=p1,p2");
        assert_eq!(serialize(&set), "zone:(lab) !pool:(p1,p2)");
    }
}
