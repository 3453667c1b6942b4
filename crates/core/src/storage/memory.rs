//! In-memory storage adapter.
//!
//! Backs tests and hosts without a database. Histories and index entries
//! live in `BTreeMap`s behind a single `RwLock`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{ServerError, ServerResult};
use crate::types::{Comparator, IndexEntry, IndexFilter, VersionRecord};

use super::{instant_matches, Storage};

type ResourceKey = (String, String);

#[derive(Default)]
struct Inner {
    /// Append-only version lists, oldest first, keyed by (type, id).
    histories: BTreeMap<ResourceKey, Vec<VersionRecord>>,
    /// Live index entries, keyed by (type, id).
    index: BTreeMap<ResourceKey, Vec<IndexEntry>>,
}

/// A [`Storage`] adapter holding everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(resource_type: &str, id: &str) -> ResourceKey {
    (resource_type.to_string(), id.to_string())
}

impl Storage for MemoryStorage {
    fn put_version(&self, record: &VersionRecord, index: &[IndexEntry]) -> ServerResult<()> {
        let mut inner = self.inner.write();
        let k = key(&record.resource_type, &record.id);

        let history = inner.histories.entry(k.clone()).or_default();
        let expected = history.last().map(|r| r.version_id + 1).unwrap_or(1);
        if record.version_id != expected {
            return Err(ServerError::Storage(format!(
                "version numbering gap for {}/{}: expected {}, got {}",
                record.resource_type, record.id, expected, record.version_id
            )));
        }
        history.push(record.clone());

        if index.is_empty() {
            inner.index.remove(&k);
        } else {
            inner.index.insert(k, index.to_vec());
        }
        Ok(())
    }

    fn current(&self, resource_type: &str, id: &str) -> ServerResult<Option<VersionRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .histories
            .get(&key(resource_type, id))
            .and_then(|h| h.last())
            .cloned())
    }

    fn version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i64,
    ) -> ServerResult<Option<VersionRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .histories
            .get(&key(resource_type, id))
            .and_then(|h| h.iter().find(|r| r.version_id == version_id))
            .cloned())
    }

    fn versions(&self, resource_type: &str, id: &str) -> ServerResult<Vec<VersionRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .histories
            .get(&key(resource_type, id))
            .cloned()
            .unwrap_or_default())
    }

    fn live_ids(&self, resource_type: &str) -> ServerResult<BTreeSet<String>> {
        let inner = self.inner.read();
        Ok(inner
            .histories
            .range(key(resource_type, "")..)
            .take_while(|((rt, _), _)| rt == resource_type)
            .filter(|(_, history)| history.last().is_some_and(|r| !r.is_tombstone()))
            .map(|((_, id), _)| id.clone())
            .collect())
    }

    fn scan_index(
        &self,
        resource_type: &str,
        param: &str,
        filter: &IndexFilter,
    ) -> ServerResult<BTreeSet<String>> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .range(key(resource_type, "")..)
            .take_while(|((rt, _), _)| rt == resource_type)
            .filter(|(_, entries)| {
                entries
                    .iter()
                    .any(|e| e.param == param && filter.matches(&e.value))
            })
            .map(|((_, id), _)| id.clone())
            .collect())
    }

    fn scan_last_updated(
        &self,
        resource_type: &str,
        comparator: Comparator,
        instant: DateTime<Utc>,
    ) -> ServerResult<BTreeSet<String>> {
        let inner = self.inner.read();
        Ok(inner
            .histories
            .range(key(resource_type, "")..)
            .take_while(|((rt, _), _)| rt == resource_type)
            .filter(|(_, history)| {
                history.last().is_some_and(|r| {
                    !r.is_tombstone() && instant_matches(comparator, r.last_updated, instant)
                })
            })
            .map(|((_, id), _)| id.clone())
            .collect())
    }
}
