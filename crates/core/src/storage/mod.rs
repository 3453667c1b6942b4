//! Storage capability contract and adapters.
//!
//! The core only requires the [`Storage`] trait; concrete engines implement
//! it once per host platform. Two adapters ship with the crate: an
//! in-memory store (always available) and a SQLite store behind the
//! `sqlite` feature.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::ServerResult;
use crate::types::{Comparator, IndexEntry, IndexFilter, VersionRecord};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

/// Durable keyed storage for resource versions and secondary index entries.
///
/// All operations for one logical write (the version record plus its index
/// updates) happen atomically inside [`Storage::put_version`]. Adapters must
/// reject version numbering gaps: the record being written must carry
/// exactly `prior_max + 1` (or 1 for a first version).
pub trait Storage: Send + Sync {
    /// Atomically appends one version record and replaces all index entries
    /// for its `(resource_type, id)`. Passing no entries retracts any prior
    /// ones, which is how tombstone writes drop a resource from the index.
    fn put_version(&self, record: &VersionRecord, index: &[IndexEntry]) -> ServerResult<()>;

    /// The version record with the highest version id for the given
    /// resource, tombstone or not.
    fn current(&self, resource_type: &str, id: &str) -> ServerResult<Option<VersionRecord>>;

    /// A specific historical version.
    fn version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i64,
    ) -> ServerResult<Option<VersionRecord>>;

    /// All versions ever written for the resource, oldest first.
    fn versions(&self, resource_type: &str, id: &str) -> ServerResult<Vec<VersionRecord>>;

    /// Ids of all resources of a type whose current version is live.
    fn live_ids(&self, resource_type: &str) -> ServerResult<BTreeSet<String>>;

    /// Ids of live resources with at least one index entry for `param`
    /// satisfying the filter.
    fn scan_index(
        &self,
        resource_type: &str,
        param: &str,
        filter: &IndexFilter,
    ) -> ServerResult<BTreeSet<String>>;

    /// Ids of live resources whose current version's `lastUpdated` compares
    /// to `instant` per the comparator (`gt`/`lt` strict, `ge`/`le`
    /// inclusive).
    fn scan_last_updated(
        &self,
        resource_type: &str,
        comparator: Comparator,
        instant: DateTime<Utc>,
    ) -> ServerResult<BTreeSet<String>>;
}

/// Instant comparison shared by the storage adapters.
pub(crate) fn instant_matches(
    comparator: Comparator,
    value: DateTime<Utc>,
    instant: DateTime<Utc>,
) -> bool {
    match comparator {
        Comparator::Eq => value == instant,
        Comparator::Gt => value > instant,
        Comparator::Lt => value < instant,
        Comparator::Ge => value >= instant,
        Comparator::Le => value <= instant,
    }
}
