//! Query evaluation.
//!
//! Each recognized query parameter becomes one index scan; the scans'
//! results are AND-intersected. `_lastUpdated` is always available and
//! compares against the current version's timestamp. Unknown parameter
//! names are ignored for forward compatibility.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ServerError, ServerResult};
use crate::registry::{SearchParamRegistry, SearchParamType};
use crate::storage::Storage;
use crate::types::{Comparator, IndexFilter, QueryValue};

/// Evaluates a parsed query against the index and returns matching
/// `(id, body)` pairs in ascending id order.
pub fn search(
    storage: &dyn Storage,
    registry: &SearchParamRegistry,
    resource_type: &str,
    params: &[(String, String)],
) -> ServerResult<Vec<(String, Value)>> {
    let mut candidates: Option<BTreeSet<String>> = None;

    for (name, raw) in params {
        let ids = match name.as_str() {
            "_lastUpdated" => {
                let (comparator, rest) = Comparator::parse_prefix(raw);
                let instant = parse_instant(rest)?;
                storage.scan_last_updated(resource_type, comparator, instant)?
            }
            _ if name.starts_with('_') => {
                tracing::debug!(param = %name, "ignoring unsupported control parameter");
                continue;
            }
            _ => match registry.get(resource_type, name) {
                Some(def) => {
                    let filter = parse_filter(def.param_type, raw)?;
                    storage.scan_index(resource_type, name, &filter)?
                }
                None => {
                    tracing::debug!(param = %name, resource_type, "ignoring unknown parameter");
                    continue;
                }
            },
        };

        candidates = Some(match candidates {
            None => ids,
            Some(prior) => prior.intersection(&ids).cloned().collect(),
        });

        // An empty intersection can't grow back.
        if candidates.as_ref().is_some_and(BTreeSet::is_empty) {
            break;
        }
    }

    let ids = match candidates {
        Some(ids) => ids,
        // No recognized parameter: all live resources of the type.
        None => storage.live_ids(resource_type)?,
    };

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(record) = storage.current(resource_type, &id)? {
            if let Some(body) = record.body {
                results.push((id, body));
            }
        }
    }
    Ok(results)
}

/// Parses one raw query value into an index filter, per the parameter kind.
///
/// Comparison prefixes apply to ordered kinds (date, number); string, token,
/// and reference values are taken verbatim and compared for equality.
fn parse_filter(param_type: SearchParamType, raw: &str) -> ServerResult<IndexFilter> {
    let filter = match param_type {
        SearchParamType::String => {
            IndexFilter::new(Comparator::Eq, QueryValue::Text(raw.to_string()))
        }
        SearchParamType::Token => IndexFilter::new(Comparator::Eq, parse_token(raw)),
        SearchParamType::Reference => {
            IndexFilter::new(Comparator::Eq, QueryValue::Reference(raw.to_string()))
        }
        SearchParamType::Date => {
            let (comparator, rest) = Comparator::parse_prefix(raw);
            if rest.is_empty() {
                return Err(ServerError::BadRequest(format!(
                    "empty date search value: {raw}"
                )));
            }
            IndexFilter::new(comparator, QueryValue::Date(rest.to_string()))
        }
        SearchParamType::Number => {
            let (comparator, rest) = Comparator::parse_prefix(raw);
            let number: f64 = rest.parse().map_err(|_| {
                ServerError::BadRequest(format!("invalid number search value: {raw}"))
            })?;
            IndexFilter::new(comparator, QueryValue::Number(number))
        }
    };
    Ok(filter)
}

/// `system|code` splits at the first `|`; a bare value matches on code
/// regardless of system; `|code` requires an entry with no system.
fn parse_token(raw: &str) -> QueryValue {
    match raw.split_once('|') {
        Some((system, code)) => QueryValue::Token {
            system: Some(system.to_string()),
            code: code.to_string(),
        },
        None => QueryValue::Token {
            system: None,
            code: raw.to_string(),
        },
    }
}

fn parse_instant(text: &str) -> ServerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ServerError::BadRequest(format!("invalid _lastUpdated value: {text}")))
}
