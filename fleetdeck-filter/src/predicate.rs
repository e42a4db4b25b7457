//! Predicate set: the structured form of a filter expression.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Reserved pseudo-field that collects free-text terms.
pub const FREE_TEXT_FIELD: &str = "q";

/// Pseudo-field wired to the collection's selection (`in:(selected)`).
/// It describes view state and is never persisted in query strings.
pub const SELECTED_FIELD: &str = "in";

/// Leading marker of a value toggled as an exact match, e.g. `hostname:(=n1)`.
pub const EXACT_MARKER: char = '=';

/// Values for one field, and whether the field is negated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub negated: bool,
    pub values: IndexSet<String>,
}

impl ValueSpec {
    pub fn new(negated: bool) -> Self {
        Self {
            negated,
            values: IndexSet::new(),
        }
    }

    pub fn with_values<I, S>(negated: bool, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            negated,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }
}

/// Ordered mapping of field name to [`ValueSpec`].
///
/// Insertion order drives serialization. Equality ignores both field order
/// and value order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateSet {
    fields: IndexMap<String, ValueSpec>,
}

impl PredicateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&ValueSpec> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ValueSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Free-text terms in insertion order.
    pub fn free_text(&self) -> impl Iterator<Item = &str> {
        self.fields
            .get(FREE_TEXT_FIELD)
            .into_iter()
            .flat_map(|spec| spec.values.iter().map(String::as_str))
    }

    /// Replace a field's spec outright. An existing field keeps its position.
    pub fn insert(&mut self, field: impl Into<String>, spec: ValueSpec) {
        self.fields.insert(field.into(), spec);
    }

    /// Remove a field, preserving the order of the rest.
    pub fn remove(&mut self, field: &str) -> Option<ValueSpec> {
        self.fields.shift_remove(field)
    }

    /// Merge one clause into the set.
    ///
    /// Same negation as an existing clause: values are unioned. Different
    /// negation: the later clause wins, in the earlier clause's position.
    pub fn merge_clause<I, S>(&mut self, field: &str, negated: bool, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = self
            .fields
            .entry(field.to_string())
            .or_insert_with(|| ValueSpec::new(negated));
        if spec.negated != negated {
            *spec = ValueSpec::new(negated);
        }
        spec.values.extend(values.into_iter().map(Into::into));
    }

    /// Append a free-text term.
    pub fn push_term(&mut self, term: impl Into<String>) {
        self.merge_clause(FREE_TEXT_FIELD, false, [term]);
    }

    /// Builder form of [`PredicateSet::merge_clause`].
    pub fn with_clause<I, S>(mut self, field: &str, negated: bool, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_clause(field, negated, values);
        self
    }
}

/// Whether the set holds a clause for `field` with at least one value.
pub fn is_field_active(predicates: &PredicateSet, field: &str) -> bool {
    predicates
        .get(field)
        .map(|spec| !spec.values.is_empty())
        .unwrap_or(false)
}

/// Whether `value` is currently one of the values of `field`.
pub fn is_value_active(predicates: &PredicateSet, field: &str, value: &str) -> bool {
    predicates
        .get(field)
        .map(|spec| spec.contains(value))
        .unwrap_or(false)
}

/// `value` with the exact-match marker.
pub fn exact_value(value: &str) -> String {
    format!("{EXACT_MARKER}{value}")
}

/// Whether `value` is active for `field` as an exact match.
pub fn is_exact_value_active(predicates: &PredicateSet, field: &str, value: &str) -> bool {
    is_value_active(predicates, field, &exact_value(value))
}

/// [`toggle_value`] for the exact-match form of `value`.
pub fn toggle_exact_value(predicates: &PredicateSet, field: &str, value: &str) -> PredicateSet {
    toggle_value(predicates, field, &exact_value(value))
}

/// Add `value` to `field`, or remove it if present.
///
/// Removing the last value removes the field together with its negation
/// flag. The input set is left untouched.
pub fn toggle_value(predicates: &PredicateSet, field: &str, value: &str) -> PredicateSet {
    let mut next = predicates.clone();
    match next.fields.get_mut(field) {
        Some(spec) if spec.values.contains(value) => {
            spec.values.shift_remove(value);
            if spec.values.is_empty() {
                next.remove(field);
            }
        }
        Some(spec) => {
            spec.values.insert(value.to_string());
        }
        None => {
            next.merge_clause(field, false, [value]);
        }
    }
    next
}
