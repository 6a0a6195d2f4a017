//! Reference data lookup
//!
//! Resolves user identifiers to their date of birth and email address.
//! [`resolve_batch`] guarantees one record per requested identifier;
//! [`ReferenceCache`] keeps resolved identifiers for the rest of a run so
//! every identifier is fetched at most once.

pub mod mongo;

pub use mongo::{ClientHandle, MongoReferenceStore};

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

/// Identifier -> attributes
pub type ReferenceMap = HashMap<String, ReferenceRecord>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Failed to connect to reference store: {0}")]
    Connect(String),

    #[error("Reference lookup failed: {0}")]
    Query(String),
}

/// Attributes attached to a user. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceRecord {
    pub dob: String,
    pub email: String,
}

impl ReferenceRecord {
    pub fn new(dob: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            dob: dob.into(),
            email: email.into(),
        }
    }
}

/// A store that can fetch many records in one round trip
pub trait ReferenceLookup {
    /// Every stored `(identifier, record)` whose identifier is in `ids`.
    ///
    /// Either all matches are returned or an error; never a partial result.
    fn find_many(&self, ids: &[String]) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError>;
}

/// Resolve `ids` in a single round trip.
///
/// Identifiers without a stored record get an empty [`ReferenceRecord`], so
/// the result always has exactly one entry per requested identifier. An empty
/// request returns immediately without touching the store.
pub fn resolve_batch<L>(lookup: &L, ids: &BTreeSet<String>) -> Result<ReferenceMap, ReferenceError>
where
    L: ReferenceLookup + ?Sized,
{
    if ids.is_empty() {
        return Ok(ReferenceMap::new());
    }

    let wanted: Vec<String> = ids.iter().cloned().collect();
    let found = lookup.find_many(&wanted)?;
    debug!("Reference store matched {} of {} identifiers", found.len(), ids.len());

    let mut resolved = ReferenceMap::with_capacity(ids.len());
    for (id, record) in found {
        let id = id.trim();
        if ids.contains(id) {
            resolved.entry(id.to_string()).or_insert(record);
        }
    }
    for id in ids {
        resolved.entry(id.clone()).or_default();
    }

    Ok(resolved)
}

/// Run-scoped memo in front of a [`ReferenceLookup`]
pub struct ReferenceCache<'a, L: ReferenceLookup + ?Sized> {
    lookup: &'a L,
    known: ReferenceMap,
    round_trips: usize,
}

impl<'a, L: ReferenceLookup + ?Sized> ReferenceCache<'a, L> {
    pub fn new(lookup: &'a L) -> Self {
        Self {
            lookup,
            known: ReferenceMap::new(),
            round_trips: 0,
        }
    }

    /// Same contract as [`resolve_batch`]; only identifiers not seen earlier
    /// in the run are sent to the store.
    pub fn resolve(&mut self, ids: &BTreeSet<String>) -> Result<ReferenceMap, ReferenceError> {
        let missing: BTreeSet<String> = ids
            .iter()
            .filter(|id| !self.known.contains_key(*id))
            .cloned()
            .collect();

        if !missing.is_empty() {
            let fetched = resolve_batch(self.lookup, &missing)?;
            self.round_trips += 1;
            self.known.extend(fetched);
        } else {
            debug!("All {} identifiers already resolved in this run", ids.len());
        }

        Ok(ids
            .iter()
            .map(|id| (id.clone(), self.known.get(id).cloned().unwrap_or_default()))
            .collect())
    }

    /// Store round trips issued so far
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recording {
        records: HashMap<String, ReferenceRecord>,
        requests: RefCell<Vec<Vec<String>>>,
        fail: bool,
    }

    impl ReferenceLookup for Recording {
        fn find_many(&self, ids: &[String]) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError> {
            self.requests.borrow_mut().push(ids.to_vec());
            if self.fail {
                return Err(ReferenceError::Query("cursor killed".to_string()));
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.records.get(id).map(|r| (id.clone(), r.clone())))
                .collect())
        }
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn store() -> Recording {
        let mut store = Recording::default();
        store.records.insert(
            "1".to_string(),
            ReferenceRecord::new("1990-01-01", "a@x.com"),
        );
        store
            .records
            .insert("3".to_string(), ReferenceRecord::new("", "c@x.com"));
        store
    }

    #[test]
    fn test_resolve_batch_fills_missing_with_empty_records() {
        let store = store();
        let resolved = resolve_batch(&store, &ids(&["1", "2"])).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["1"], ReferenceRecord::new("1990-01-01", "a@x.com"));
        assert_eq!(resolved["2"], ReferenceRecord::default());
        assert_eq!(store.requests.borrow().len(), 1);
    }

    #[test]
    fn test_resolve_batch_empty_input_skips_round_trip() {
        let store = store();
        let resolved = resolve_batch(&store, &BTreeSet::new()).unwrap();
        assert!(resolved.is_empty());
        assert!(store.requests.borrow().is_empty());
    }

    #[test]
    fn test_resolve_batch_ignores_unrequested_matches() {
        struct Chatty;
        impl ReferenceLookup for Chatty {
            fn find_many(
                &self,
                _ids: &[String],
            ) -> Result<Vec<(String, ReferenceRecord)>, ReferenceError> {
                Ok(vec![
                    (" 7 ".to_string(), ReferenceRecord::new("2001-02-03", "")),
                    ("8".to_string(), ReferenceRecord::new("1999-09-09", "")),
                ])
            }
        }

        let resolved = resolve_batch(&Chatty, &ids(&["7"])).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["7"].dob, "2001-02-03");
    }

    #[test]
    fn test_resolve_batch_propagates_failure() {
        let store = Recording {
            fail: true,
            ..Default::default()
        };
        assert!(matches!(
            resolve_batch(&store, &ids(&["1"])),
            Err(ReferenceError::Query(_))
        ));
    }

    #[test]
    fn test_cache_only_fetches_unseen_identifiers() {
        let store = store();
        let mut cache = ReferenceCache::new(&store);

        let first = cache.resolve(&ids(&["1", "2"])).unwrap();
        assert_eq!(first.len(), 2);

        let second = cache.resolve(&ids(&["2", "3"])).unwrap();
        assert_eq!(second["3"].email, "c@x.com");
        assert_eq!(second["2"], ReferenceRecord::default());

        let third = cache.resolve(&ids(&["1", "3"])).unwrap();
        assert_eq!(third["1"].dob, "1990-01-01");

        assert_eq!(cache.round_trips(), 2);
        assert_eq!(
            *store.requests.borrow(),
            vec![vec!["1".to_string(), "2".to_string()], vec!["3".to_string()]]
        );
    }

    #[test]
    fn test_cache_failure_leaves_no_partial_state() {
        let mut store = store();
        store.fail = true;
        let mut cache = ReferenceCache::new(&store);

        assert!(cache.resolve(&ids(&["1"])).is_err());
        assert_eq!(cache.round_trips(), 0);
        assert!(cache.known.is_empty());
    }
}
