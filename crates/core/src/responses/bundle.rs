//! Bundle response building.

use serde_json::{json, Value};

use crate::types::VersionRecord;

/// Bundle types emitted by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    /// Search results.
    Searchset,
    /// Version history.
    History,
    /// Batch response.
    BatchResponse,
    /// Transaction response.
    TransactionResponse,
}

impl BundleType {
    /// The FHIR code string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Searchset => "searchset",
            BundleType::History => "history",
            BundleType::BatchResponse => "batch-response",
            BundleType::TransactionResponse => "transaction-response",
        }
    }
}

/// Builds a `searchset` Bundle from `(id, body)` results, preserving order.
pub fn searchset(resource_type: &str, results: Vec<(String, Value)>) -> Value {
    let entries: Vec<Value> = results
        .into_iter()
        .map(|(id, body)| {
            json!({
                "fullUrl": format!("{resource_type}/{id}"),
                "resource": body,
                "search": { "mode": "match" }
            })
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": BundleType::Searchset.as_str(),
        "total": entries.len(),
        "entry": entries
    })
}

/// Builds a `history` Bundle, oldest version first. Tombstone entries carry
/// the DELETE request and no `resource` field.
pub fn history(records: Vec<VersionRecord>) -> Value {
    let entries: Vec<Value> = records
        .into_iter()
        .map(|record| {
            let mut entry = json!({
                "fullUrl": record.url(),
                "request": {
                    "method": record.method.as_str(),
                    "url": record.url()
                }
            });
            if let Some(body) = record.body {
                entry["resource"] = body;
            }
            entry
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": BundleType::History.as_str(),
        "total": entries.len(),
        "entry": entries
    })
}

/// One entry of a batch/transaction response Bundle.
pub fn response_entry(
    status: u16,
    resource: Option<Value>,
    location: Option<String>,
    etag: Option<String>,
) -> Value {
    let mut response = json!({ "status": status.to_string() });
    if let Some(location) = location {
        response["location"] = json!(location);
    }
    if let Some(etag) = etag {
        response["etag"] = json!(etag);
    }
    let mut entry = json!({ "response": response });
    if let Some(resource) = resource {
        entry["resource"] = resource;
    }
    entry
}

/// Wraps batch/transaction response entries in a Bundle.
pub fn response_bundle(bundle_type: BundleType, entries: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": bundle_type.as_str(),
        "entry": entries
    })
}
