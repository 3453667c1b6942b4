//! Generic JSON tree helpers.
//!
//! Everything that walks, reads, or rewrites resource bodies goes through
//! this module; no other module touches JSON structure directly.

use serde_json::Value;

/// Navigates a dotted path through a JSON tree, flattening arrays.
///
/// `navigate_path(patient, &["name", "given"])` over a repeating `name`
/// element returns every given name as a separate value. A leading
/// capitalized segment matching a resource type should already have been
/// stripped by the caller.
pub fn navigate_path<'a>(root: &'a Value, segments: &[&str]) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(v) = map.get(*segment) {
                        flatten_into(v, &mut next);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.get(*segment) {
                            flatten_into(v, &mut next);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        other => out.push(other),
    }
}

/// Recursively visits every string-valued object property in a tree and
/// replaces it in place when the visitor returns a value.
///
/// The visitor receives `(property_name, string_value)`. Used by
/// presentation layers to rewrite `reference` fields into links; the
/// store's read/write path does not depend on it.
pub fn walk_and_modify<F>(value: &mut Value, visitor: &mut F)
where
    F: FnMut(&str, &str) -> Option<String>,
{
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if let Value::String(s) = child {
                    if let Some(replacement) = visitor(key, s) {
                        *child = Value::String(replacement);
                    }
                } else {
                    walk_and_modify(child, visitor);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                walk_and_modify(item, visitor);
            }
        }
        _ => {}
    }
}

/// Reads a string field from a JSON object.
pub fn get_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_navigate_flattens_arrays() {
        let patient = json!({
            "resourceType": "Patient",
            "name": [
                {"family": "Doe", "given": ["John", "J."]},
                {"family": "Smith", "given": ["Johnny"]}
            ]
        });

        let given: Vec<&str> = navigate_path(&patient, &["name", "given"])
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(given, vec!["John", "J.", "Johnny"]);

        let family: Vec<&str> = navigate_path(&patient, &["name", "family"])
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(family, vec!["Doe", "Smith"]);
    }

    #[test]
    fn test_navigate_missing_path() {
        let patient = json!({"resourceType": "Patient"});
        assert!(navigate_path(&patient, &["name", "family"]).is_empty());
    }

    #[test]
    fn test_navigate_scalar_leaf() {
        let obs = json!({"status": "final", "valueQuantity": {"value": 7.2}});
        let status = navigate_path(&obs, &["status"]);
        assert_eq!(status, vec![&json!("final")]);
        let value = navigate_path(&obs, &["valueQuantity", "value"]);
        assert_eq!(value, vec![&json!(7.2)]);
    }

    #[test]
    fn test_walk_and_modify_rewrites_references() {
        let mut bundle = json!({
            "entry": [
                {"resource": {"subject": {"reference": "Patient/1"}}},
                {"resource": {"subject": {"reference": "Patient/2", "display": "Two"}}}
            ]
        });

        walk_and_modify(&mut bundle, &mut |name, value| {
            (name == "reference").then(|| format!("/fhir/{value}"))
        });

        assert_eq!(
            bundle["entry"][0]["resource"]["subject"]["reference"],
            "/fhir/Patient/1"
        );
        assert_eq!(
            bundle["entry"][1]["resource"]["subject"]["reference"],
            "/fhir/Patient/2"
        );
        // Non-matching strings are untouched.
        assert_eq!(bundle["entry"][1]["resource"]["subject"]["display"], "Two");
    }

    #[test]
    fn test_walk_and_modify_leaves_non_strings() {
        let mut v = json!({"count": 3, "nested": {"flag": true}});
        walk_and_modify(&mut v, &mut |_, _| Some("changed".into()));
        assert_eq!(v, json!({"count": 3, "nested": {"flag": true}}));
    }
}
