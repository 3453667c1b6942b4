//! Index entry extraction.
//!
//! Evaluates each configured search parameter's extraction path against a
//! resource body and normalizes the candidate values per the parameter's
//! value kind. An expression may yield zero, one, or many candidates (a
//! repeating `name.given` yields one entry per given name).

use serde_json::Value;

use crate::json::{get_str, navigate_path};
use crate::registry::{SearchParamRegistry, SearchParamType};
use crate::types::{IndexEntry, IndexedValue};

/// Extracts all index entries for a live resource body.
pub fn extract(
    registry: &SearchParamRegistry,
    resource_type: &str,
    body: &Value,
) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    for param in registry.params_for(resource_type) {
        let candidates = navigate_path(body, &param.path_segments());
        for candidate in candidates {
            for value in convert(param.param_type, candidate) {
                entries.push(IndexEntry::new(&param.code, value));
            }
        }
    }
    tracing::debug!(
        resource_type,
        entries = entries.len(),
        "extracted index entries"
    );
    entries
}

/// Normalizes one candidate JSON value per the parameter's value kind.
fn convert(param_type: SearchParamType, value: &Value) -> Vec<IndexedValue> {
    match param_type {
        SearchParamType::String => match value {
            Value::String(s) => vec![IndexedValue::Text(s.clone())],
            _ => Vec::new(),
        },
        SearchParamType::Token => convert_token(value),
        SearchParamType::Date => match value {
            Value::String(s) => vec![IndexedValue::Date(s.clone())],
            _ => Vec::new(),
        },
        SearchParamType::Reference => match value {
            Value::String(s) => vec![IndexedValue::Reference(s.clone())],
            // Expressions may point at a Reference element instead of its
            // `reference` field.
            Value::Object(_) => get_str(value, "reference")
                .map(|s| IndexedValue::Reference(s.to_string()))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        },
        SearchParamType::Number => match value {
            Value::Number(n) => n.as_f64().map(IndexedValue::Number).into_iter().collect(),
            _ => Vec::new(),
        },
    }
}

/// Token candidates come in several shapes: a bare code, a boolean, a
/// Coding, a CodeableConcept, or an Identifier.
fn convert_token(value: &Value) -> Vec<IndexedValue> {
    match value {
        Value::String(code) => vec![IndexedValue::Token {
            system: None,
            code: code.clone(),
        }],
        Value::Bool(b) => vec![IndexedValue::Token {
            system: None,
            code: b.to_string(),
        }],
        Value::Object(map) => {
            if let Some(Value::Array(codings)) = map.get("coding") {
                return codings.iter().flat_map(convert_token).collect();
            }
            let system = get_str(value, "system").map(String::from);
            if let Some(code) = get_str(value, "code") {
                vec![IndexedValue::Token {
                    system,
                    code: code.to_string(),
                }]
            } else if let Some(code) = get_str(value, "value") {
                // Identifier: system + value.
                vec![IndexedValue::Token {
                    system,
                    code: code.to_string(),
                }]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
