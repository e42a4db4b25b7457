//! Persistence for saved searches.
//!
//! Each entity kind keeps at most one saved filter, stored as the query-string
//! form so the file stays readable and stable across printer changes.

use chrono::{DateTime, Utc};
use fleetdeck_filter::{from_query_string, to_query_string, PredicateSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Kind → query string, e.g. `"machine" → "?zone=lab&!tags=old"`.
    #[serde(default)]
    pub searches: BTreeMap<String, String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PersistedState {
    /// Save `predicates` for `kind`. An empty set forgets the saved search.
    pub fn remember(&mut self, kind: &str, predicates: &PredicateSet) {
        let query = to_query_string(predicates);
        if query.is_empty() {
            self.searches.remove(kind);
        } else {
            self.searches.insert(kind.to_string(), query);
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn recall(&self, kind: &str) -> Option<PredicateSet> {
        self.searches
            .get(kind)
            .map(|query| from_query_string(query))
    }

    pub fn forget(&mut self, kind: &str) -> bool {
        let removed = self.searches.remove(kind).is_some();
        if removed {
            self.updated_at = Some(Utc::now());
        }
        removed
    }
}

pub fn load(path: &Path) -> Result<Option<PersistedState>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let state = serde_json::from_str::<PersistedState>(&contents)?;
    Ok(Some(state))
}

pub fn save(path: &Path, state: &PersistedState) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(state)?;
    std::fs::write(path, contents)?;
    tracing::debug!(path = %path.display(), searches = state.searches.len(), "State saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdeck_filter::parse;

    #[test]
    fn test_remember_and_recall() {
        let mut state = PersistedState::default();
        let predicates = parse("rack zone:(lab,prod) !tags:(old)");
        state.remember("machine", &predicates);

        assert_eq!(state.recall("machine"), Some(predicates));
        assert!(state.recall("zone").is_none());
        assert!(state.updated_at.is_some());
    }

    #[test]
    fn test_empty_search_forgets() {
        let mut state = PersistedState::default();
        state.remember("machine", &parse("zone:(lab)"));
        state.remember("machine", &PredicateSet::new());
        assert!(state.searches.is_empty());
        assert!(!state.forget("machine"));
    }
}
