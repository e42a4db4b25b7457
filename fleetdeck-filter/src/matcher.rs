//! Evaluate a predicate set against an entity.

use crate::predicate::{PredicateSet, ValueSpec, EXACT_MARKER, FREE_TEXT_FIELD};

/// The value(s) an accessor reports for one field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

impl FieldValue {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            FieldValue::One(value) => std::slice::from_ref(value),
            FieldValue::Many(values) => values,
        };
        slice.iter().map(String::as_str)
    }

    /// Whether any of these values is in `spec`. A wanted `=x` matches `x`.
    pub fn intersects(&self, spec: &ValueSpec) -> bool {
        self.iter().any(|value| {
            spec.values.iter().any(|wanted| {
                wanted == value || wanted.strip_prefix(EXACT_MARKER) == Some(value)
            })
        })
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::One(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::One(value.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(values: Vec<String>) -> Self {
        FieldValue::Many(values)
    }
}

/// Maps a field name to an entity's value(s) for it.
pub trait FieldAccessor<E: ?Sized> {
    /// Value(s) for `field`, or `None` when the entity has no such field.
    fn value(&self, entity: &E, field: &str) -> Option<FieldValue>;

    /// Value(s) that free-text terms are matched against.
    fn default_value(&self, entity: &E) -> Option<FieldValue>;
}

/// Accessor built from a lookup closure and a default field name.
pub struct FnAccessor<F> {
    lookup: F,
    default_field: String,
}

impl<F> FnAccessor<F> {
    pub fn new(default_field: impl Into<String>, lookup: F) -> Self {
        Self {
            lookup,
            default_field: default_field.into(),
        }
    }
}

impl<E, F> FieldAccessor<E> for FnAccessor<F>
where
    E: ?Sized,
    F: Fn(&E, &str) -> Option<FieldValue>,
{
    fn value(&self, entity: &E, field: &str) -> Option<FieldValue> {
        (self.lookup)(entity, field)
    }

    fn default_value(&self, entity: &E) -> Option<FieldValue> {
        (self.lookup)(entity, &self.default_field)
    }
}

/// Whether `entity` satisfies every clause in `predicates`.
pub fn matches<E, A>(entity: &E, predicates: &PredicateSet, accessor: &A) -> bool
where
    E: ?Sized,
    A: FieldAccessor<E> + ?Sized,
{
    predicates.fields().all(|(field, spec)| {
        if spec.values.is_empty() {
            return true;
        }
        if field == FREE_TEXT_FIELD {
            return matches_free_text(accessor.default_value(entity), spec);
        }
        match accessor.value(entity, field) {
            Some(value) => value.intersects(spec) != spec.negated,
            None => false,
        }
    })
}

/// Every term must hold: plain terms are contained in one of the default
/// values, `!term` is contained in none. Case-insensitive.
fn matches_free_text(haystack: Option<FieldValue>, spec: &ValueSpec) -> bool {
    let haystack: Vec<String> = haystack
        .map(|value| value.iter().map(str::to_lowercase).collect())
        .unwrap_or_default();
    let contains = |needle: &str| {
        let needle = needle.to_lowercase();
        haystack.iter().any(|value| value.contains(&needle))
    };

    spec.values.iter().all(|term| match term.strip_prefix('!') {
        Some(excluded) if !excluded.is_empty() => !contains(excluded),
        _ => contains(term),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    struct Machine {
        hostname: &'static str,
        zone: &'static str,
        tags: Vec<&'static str>,
    }

    fn lookup(machine: &Machine, field: &str) -> Option<FieldValue> {
        match field {
            "hostname" => Some(machine.hostname.into()),
            "zone" => Some(machine.zone.into()),
            "tags" => Some(FieldValue::Many(
                machine.tags.iter().map(|t| t.to_string()).collect(),
            )),
            _ => None,
        }
    }

    fn machines() -> Vec<Machine> {
        vec![
            Machine {
                hostname: "Node-One",
                zone: "lab",
                tags: vec!["gpu"],
            },
            Machine {
                hostname: "node-two",
                zone: "prod",
                tags: vec![],
            },
        ]
    }

    fn hostnames(filter: &str) -> Vec<&'static str> {
        let accessor = FnAccessor::new("hostname", lookup);
        let predicates = parse(filter);
        machines()
            .into_iter()
            .filter(|m| matches(m, &predicates, &accessor))
            .map(|m| m.hostname)
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert_eq!(hostnames(""), vec!["Node-One", "node-two"]);
    }

    #[test]
    fn test_field_match_and_negation() {
        assert_eq!(hostnames("zone:(lab)"), vec!["Node-One"]);
        assert_eq!(hostnames("!zone:(lab)"), vec!["node-two"]);
        assert_eq!(hostnames("zone:(lab,prod)"), vec!["Node-One", "node-two"]);
    }

    #[test]
    fn test_multi_valued_field() {
        assert_eq!(hostnames("tags:(gpu)"), vec!["Node-One"]);
        assert_eq!(hostnames("!tags:(gpu)"), vec!["node-two"]);
    }

    #[test]
    fn test_fields_are_anded() {
        assert_eq!(hostnames("zone:(lab) tags:(gpu)"), vec!["Node-One"]);
        assert!(hostnames("zone:(prod) tags:(gpu)").is_empty());
    }

    #[test]
    fn test_unknown_field_prunes() {
        assert!(hostnames("bogus:(x)").is_empty());
        assert!(hostnames("!bogus:(x)").is_empty());
    }

    #[test]
    fn test_free_text_case_insensitive_substring() {
        assert_eq!(hostnames("NODE"), vec!["Node-One", "node-two"]);
        assert_eq!(hostnames("one"), vec!["Node-One"]);
        assert_eq!(hostnames("node two"), vec!["node-two"]);
    }

    #[test]
    fn test_free_text_negative_term() {
        assert_eq!(hostnames("!one"), vec!["node-two"]);
        assert_eq!(hostnames("node !TWO"), vec!["Node-One"]);
    }

    #[test]
    fn test_exact_marked_values() {
        assert_eq!(hostnames("zone:(=lab)"), vec!["Node-One"]);
        assert_eq!(hostnames("zone:(=lab,prod)"), vec!["Node-One", "node-two"]);
        assert_eq!(hostnames("!tags:(=gpu)"), vec!["node-two"]);
        assert!(hostnames("zone:(=la)").is_empty());
    }

    #[test]
    fn test_values_are_case_sensitive() {
        assert!(hostnames("zone:(LAB)").is_empty());
    }

    #[test]
    fn test_field_value_iter() {
        let one = FieldValue::from("a");
        assert_eq!(one.iter().collect::<Vec<_>>(), vec!["a"]);
        let many = FieldValue::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(many.iter().count(), 2);
    }
}
