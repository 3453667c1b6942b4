//! Versioned, history-preserving resource store.
//!
//! Owns create/read/update/delete/history semantics and version numbering.
//! Every write extracts index entries through the configured registry and
//! hands them to the storage adapter inside the same atomic write.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::json::get_str;
use crate::search;
use crate::storage::Storage;
use crate::types::{IndexEntry, InteractionMethod, VersionRecord};

/// The resource store. Cheap to clone handles are not needed: one store per
/// server instance, called by one logical worker at a time.
pub struct ResourceStore {
    storage: Arc<dyn Storage>,
    config: Arc<ServerConfig>,
}

impl ResourceStore {
    /// Creates a store over the given storage adapter and configuration.
    pub fn new(storage: Arc<dyn Storage>, config: Arc<ServerConfig>) -> Self {
        Self { storage, config }
    }

    /// Creates a new resource. The server assigns a fresh id; any
    /// client-supplied id in the body is replaced.
    pub fn create(&self, resource_type: &str, body: Value) -> ServerResult<VersionRecord> {
        validate_body(resource_type, &body)?;
        let id = uuid::Uuid::new_v4().to_string();
        let record = self.write_version(resource_type, &id, 1, InteractionMethod::Post, body)?;
        tracing::debug!(resource_type, id = %record.id, "created resource");
        Ok(record)
    }

    /// Updates a resource, appending `prior_max + 1`. Returns the new record
    /// and whether the update created the resource (update-as-create, only
    /// when enabled in the configuration).
    ///
    /// When `expected_version` is given (an `If-Match` precondition), the
    /// update fails with Conflict unless it names the current live version.
    pub fn update(
        &self,
        resource_type: &str,
        id: &str,
        body: Value,
        expected_version: Option<i64>,
    ) -> ServerResult<(VersionRecord, bool)> {
        validate_body(resource_type, &body)?;
        if let Some(body_id) = get_str(&body, "id") {
            if body_id != id {
                return Err(ServerError::BadRequest(format!(
                    "id mismatch: url has {id}, body has {body_id}"
                )));
            }
        }

        let current = self.storage.current(resource_type, id)?;
        let live = current.as_ref().is_some_and(|r| !r.is_tombstone());
        if let Some(expected) = expected_version {
            let actual = current.as_ref().filter(|_| live).map(|r| r.version_id);
            if actual != Some(expected) {
                return Err(ServerError::Conflict(format!(
                    "version precondition failed for {resource_type}/{id}: expected {expected}"
                )));
            }
        }
        if !live && !self.config.create_on_update() {
            return Err(ServerError::not_found(resource_type, id));
        }

        let next = current.map(|r| r.version_id + 1).unwrap_or(1);
        let record = self.write_version(resource_type, id, next, InteractionMethod::Put, body)?;
        tracing::debug!(resource_type, id, version = next, "updated resource");
        Ok((record, !live))
    }

    /// Deletes a resource by appending a tombstone. Idempotent: deleting a
    /// missing or already-deleted resource is a successful no-op and
    /// returns `None`.
    pub fn delete(&self, resource_type: &str, id: &str) -> ServerResult<Option<VersionRecord>> {
        let current = match self.storage.current(resource_type, id)? {
            Some(record) if !record.is_tombstone() => record,
            _ => return Ok(None),
        };

        let record = VersionRecord {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version_id: current.version_id + 1,
            last_updated: self.config.now(),
            method: InteractionMethod::Delete,
            body: None,
        };
        self.storage.put_version(&record, &[])?;
        tracing::debug!(resource_type, id, version = record.version_id, "deleted resource");
        Ok(Some(record))
    }

    /// Reads the current live version, or fails NotFound when the resource
    /// is unknown or deleted.
    pub fn read(&self, resource_type: &str, id: &str) -> ServerResult<VersionRecord> {
        match self.storage.current(resource_type, id)? {
            Some(record) if !record.is_tombstone() => Ok(record),
            _ => Err(ServerError::not_found(resource_type, id)),
        }
    }

    /// Reads a specific historical version. Tombstone versions read as
    /// NotFound.
    pub fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i64,
    ) -> ServerResult<VersionRecord> {
        match self.storage.version(resource_type, id, version_id)? {
            Some(record) if !record.is_tombstone() => Ok(record),
            _ => Err(ServerError::not_found(resource_type, id)),
        }
    }

    /// All versions ever written, oldest first, tombstone included.
    pub fn history(&self, resource_type: &str, id: &str) -> ServerResult<Vec<VersionRecord>> {
        let records = self.storage.versions(resource_type, id)?;
        if records.is_empty() {
            return Err(ServerError::not_found(resource_type, id));
        }
        Ok(records)
    }

    /// Evaluates a search query. See [`crate::search::search`].
    pub fn search(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> ServerResult<Vec<(String, Value)>> {
        search::search(
            self.storage.as_ref(),
            self.config.registry(),
            resource_type,
            params,
        )
    }

    /// Stamps server-assigned fields, extracts index entries, and writes the
    /// version and its index atomically.
    fn write_version(
        &self,
        resource_type: &str,
        id: &str,
        version_id: i64,
        method: InteractionMethod,
        mut body: Value,
    ) -> ServerResult<VersionRecord> {
        let last_updated = self.config.now();

        let obj = body.as_object_mut().ok_or_else(|| {
            ServerError::BadRequest("resource body must be a JSON object".to_string())
        })?;
        obj.insert("id".to_string(), Value::String(id.to_string()));
        let meta = obj
            .entry("meta")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .ok_or_else(|| ServerError::BadRequest("meta must be an object".to_string()))?;
        meta.insert("versionId".to_string(), json!(version_id.to_string()));
        meta.insert(
            "lastUpdated".to_string(),
            json!(last_updated
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );

        let entries: Vec<IndexEntry> =
            search::extract(self.config.registry(), resource_type, &body);

        let record = VersionRecord {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version_id,
            last_updated,
            method,
            body: Some(body),
        };
        self.storage.put_version(&record, &entries)?;
        Ok(record)
    }
}

/// Rejects bodies that are not JSON objects or whose `resourceType` is
/// missing or contradicts the target collection. Runs before any write.
fn validate_body(resource_type: &str, body: &Value) -> ServerResult<()> {
    if !body.is_object() {
        return Err(ServerError::BadRequest(
            "resource body must be a JSON object".to_string(),
        ));
    }
    match get_str(body, "resourceType") {
        None => Err(ServerError::BadRequest(
            "resource body is missing resourceType".to_string(),
        )),
        Some(rt) if rt != resource_type => Err(ServerError::BadRequest(format!(
            "resourceType mismatch: url has {resource_type}, body has {rt}"
        ))),
        Some(_) => Ok(()),
    }
}
