//! Core data types: version records, index entries, and index filters.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP-style interaction that produced a resource version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InteractionMethod {
    /// Version was created via POST.
    Post,
    /// Version was created or updated via PUT.
    Put,
    /// Version is a deletion tombstone.
    Delete,
}

impl InteractionMethod {
    /// Returns the HTTP method string.
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMethod::Post => "POST",
            InteractionMethod::Put => "PUT",
            InteractionMethod::Delete => "DELETE",
        }
    }

    /// Parses an HTTP method string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "POST" => Some(InteractionMethod::Post),
            "PUT" => Some(InteractionMethod::Put),
            "DELETE" => Some(InteractionMethod::Delete),
            _ => None,
        }
    }
}

/// One immutable snapshot of a resource at a point in time.
///
/// Version numbering is strictly increasing and gapless starting at 1 per
/// `(resource_type, id)`. A record with no body is a deletion tombstone.
/// History is append-only: records are never mutated or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// The resource type (e.g. "Patient").
    pub resource_type: String,
    /// The resource's logical id.
    pub id: String,
    /// Monotonically increasing version number, starting at 1.
    pub version_id: i64,
    /// When this version was written.
    pub last_updated: DateTime<Utc>,
    /// The interaction that produced this version.
    pub method: InteractionMethod,
    /// The resource body; absent for tombstones.
    pub body: Option<Value>,
}

impl VersionRecord {
    /// Returns `true` if this version marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.body.is_none()
    }

    /// Weak ETag derived from the version id.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }

    /// Relative URL of the logical resource (e.g. "Patient/123").
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Relative URL of this specific version.
    pub fn versioned_url(&self) -> String {
        format!(
            "{}/{}/_history/{}",
            self.resource_type, self.id, self.version_id
        )
    }

    /// `lastUpdated` rendered as fixed-width RFC 3339 in UTC.
    ///
    /// Microsecond precision with a `Z` suffix, so that stored timestamps
    /// compare correctly as text.
    pub fn last_updated_string(&self) -> String {
        self.last_updated
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// A normalized value extracted from a resource body for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexedValue {
    /// A plain string, compared case-sensitively.
    Text(String),
    /// A coded value with an optional system.
    Token {
        system: Option<String>,
        code: String,
    },
    /// An ISO-8601 date or dateTime, possibly partial (e.g. "2023-05").
    Date(String),
    /// A literal reference (e.g. "Patient/123").
    Reference(String),
    /// A numeric value.
    Number(f64),
}

/// One secondary-index record derived from a live resource version.
///
/// Entries are (re)computed synchronously on every write; an update replaces
/// all prior entries for the id, and a delete retracts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The search parameter code this entry belongs to.
    pub param: String,
    /// The extracted value.
    pub value: IndexedValue,
}

impl IndexEntry {
    /// Creates a new index entry.
    pub fn new(param: impl Into<String>, value: IndexedValue) -> Self {
        Self {
            param: param.into(),
            value,
        }
    }
}

/// Comparison operator parsed from a query value prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// Equal (the default when no prefix is given).
    #[default]
    Eq,
    /// Strictly greater than.
    Gt,
    /// Strictly less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
}

impl Comparator {
    /// Splits an operator prefix off a raw query value.
    ///
    /// `"gt2023-05-04"` parses to `(Gt, "2023-05-04")`; a value with no
    /// recognized prefix parses to `(Eq, value)`. Values too short to carry
    /// a prefix, or starting mid-codepoint at byte 2, are taken verbatim.
    pub fn parse_prefix(raw: &str) -> (Self, &str) {
        match raw.split_at_checked(2) {
            Some(("gt", rest)) => (Comparator::Gt, rest),
            Some(("lt", rest)) => (Comparator::Lt, rest),
            Some(("ge", rest)) => (Comparator::Ge, rest),
            Some(("le", rest)) => (Comparator::Le, rest),
            Some(("eq", rest)) => (Comparator::Eq, rest),
            _ => (Comparator::Eq, raw),
        }
    }
}

/// A parsed query-side comparison value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Exact string comparison.
    Text(String),
    /// Token comparison: system+code when a system is given, code-only otherwise.
    Token {
        system: Option<String>,
        code: String,
    },
    /// ISO-8601 text comparison with partial-precision semantics.
    Date(String),
    /// Exact reference comparison.
    Reference(String),
    /// Numeric comparison.
    Number(f64),
}

/// A comparator plus value, evaluated against index entries during a scan.
///
/// The matching semantics live here so that every storage adapter filters
/// identically.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    /// The comparison operator.
    pub comparator: Comparator,
    /// The value to compare against.
    pub value: QueryValue,
}

impl IndexFilter {
    /// Creates a new filter.
    pub fn new(comparator: Comparator, value: QueryValue) -> Self {
        Self { comparator, value }
    }

    /// Returns `true` if an indexed value satisfies this filter.
    pub fn matches(&self, indexed: &IndexedValue) -> bool {
        match (&self.value, indexed) {
            (QueryValue::Text(q), IndexedValue::Text(v)) => compare_text(self.comparator, v, q),
            (
                QueryValue::Token { system, code },
                IndexedValue::Token {
                    system: v_system,
                    code: v_code,
                },
            ) => {
                // Tokens only support equality.
                if self.comparator != Comparator::Eq {
                    return false;
                }
                match system {
                    // "code" alone matches on code regardless of system.
                    None => v_code == code,
                    // "|code" requires an entry with no system.
                    Some(s) if s.is_empty() => v_system.is_none() && v_code == code,
                    Some(s) => v_system.as_deref() == Some(s.as_str()) && v_code == code,
                }
            }
            (QueryValue::Date(q), IndexedValue::Date(v)) => compare_date(self.comparator, v, q),
            (QueryValue::Reference(q), IndexedValue::Reference(v)) => {
                self.comparator == Comparator::Eq && v == q
            }
            (QueryValue::Number(q), IndexedValue::Number(v)) => {
                compare_ord(self.comparator, v.partial_cmp(q))
            }
            // Kind mismatch never matches.
            _ => false,
        }
    }
}

fn compare_text(cmp: Comparator, v: &str, q: &str) -> bool {
    compare_ord(cmp, Some(v.cmp(q)))
}

/// ISO-8601 text comparison with partial precision.
///
/// Equality matches when either side is a prefix of the other, so a
/// date-only filter matches any dateTime within that day. Ordering is
/// lexicographic, which is correct for same-zone ISO-8601 text.
fn compare_date(cmp: Comparator, v: &str, q: &str) -> bool {
    let overlaps = v.starts_with(q) || q.starts_with(v);
    match cmp {
        Comparator::Eq => overlaps,
        Comparator::Gt => v > q && !overlaps,
        Comparator::Lt => v < q && !overlaps,
        Comparator::Ge => v >= q || overlaps,
        Comparator::Le => v <= q || overlaps,
    }
}

fn compare_ord(cmp: Comparator, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;
    match ordering {
        None => false,
        Some(ord) => match cmp {
            Comparator::Eq => ord == Equal,
            Comparator::Gt => ord == Greater,
            Comparator::Lt => ord == Less,
            Comparator::Ge => ord != Less,
            Comparator::Le => ord != Greater,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(version_id: i64, body: Option<Value>) -> VersionRecord {
        VersionRecord {
            resource_type: "Patient".into(),
            id: "p1".into(),
            version_id,
            last_updated: Utc::now(),
            method: if body.is_some() {
                InteractionMethod::Put
            } else {
                InteractionMethod::Delete
            },
            body,
        }
    }

    #[test]
    fn test_tombstone_and_urls() {
        let live = record(2, Some(json!({"resourceType": "Patient"})));
        assert!(!live.is_tombstone());
        assert_eq!(live.url(), "Patient/p1");
        assert_eq!(live.versioned_url(), "Patient/p1/_history/2");
        assert_eq!(live.etag(), "W/\"2\"");

        let gone = record(3, None);
        assert!(gone.is_tombstone());
        assert_eq!(gone.method.as_str(), "DELETE");
    }

    #[test]
    fn test_comparator_prefix_parsing() {
        assert_eq!(
            Comparator::parse_prefix("gt2023-05-04"),
            (Comparator::Gt, "2023-05-04")
        );
        assert_eq!(Comparator::parse_prefix("le10"), (Comparator::Le, "10"));
        assert_eq!(Comparator::parse_prefix("eq5"), (Comparator::Eq, "5"));
        assert_eq!(Comparator::parse_prefix("Doe"), (Comparator::Eq, "Doe"));
        assert_eq!(Comparator::parse_prefix(""), (Comparator::Eq, ""));
    }

    #[test]
    fn test_comparator_prefix_multibyte_values() {
        // Byte 2 falls inside the first codepoint; the value is taken
        // verbatim rather than sliced.
        assert_eq!(
            Comparator::parse_prefix("\u{20ac}2023"),
            (Comparator::Eq, "\u{20ac}2023")
        );
        assert_eq!(Comparator::parse_prefix("é"), (Comparator::Eq, "é"));
        assert_eq!(Comparator::parse_prefix("ñx"), (Comparator::Eq, "ñx"));
    }

    #[test]
    fn test_token_matching() {
        let entry = IndexedValue::Token {
            system: Some("http://loinc.org".into()),
            code: "1234-5".into(),
        };

        let code_only = IndexFilter::new(
            Comparator::Eq,
            QueryValue::Token {
                system: None,
                code: "1234-5".into(),
            },
        );
        assert!(code_only.matches(&entry));

        let with_system = IndexFilter::new(
            Comparator::Eq,
            QueryValue::Token {
                system: Some("http://loinc.org".into()),
                code: "1234-5".into(),
            },
        );
        assert!(with_system.matches(&entry));

        let wrong_system = IndexFilter::new(
            Comparator::Eq,
            QueryValue::Token {
                system: Some("http://snomed.info/sct".into()),
                code: "1234-5".into(),
            },
        );
        assert!(!wrong_system.matches(&entry));

        let no_system_required = IndexFilter::new(
            Comparator::Eq,
            QueryValue::Token {
                system: Some(String::new()),
                code: "1234-5".into(),
            },
        );
        assert!(!no_system_required.matches(&entry));
    }

    #[test]
    fn test_date_partial_precision() {
        let day = IndexFilter::new(Comparator::Eq, QueryValue::Date("2023-05-04".into()));
        assert!(day.matches(&IndexedValue::Date("2023-05-04T10:30:00Z".into())));
        assert!(day.matches(&IndexedValue::Date("2023-05-04".into())));
        assert!(!day.matches(&IndexedValue::Date("2023-05-05".into())));

        let after = IndexFilter::new(Comparator::Gt, QueryValue::Date("2023-05-04".into()));
        assert!(after.matches(&IndexedValue::Date("2023-05-05T00:00:00Z".into())));
        // A moment within the queried day is not strictly after it.
        assert!(!after.matches(&IndexedValue::Date("2023-05-04T23:59:59Z".into())));
    }

    #[test]
    fn test_number_matching() {
        let ge = IndexFilter::new(Comparator::Ge, QueryValue::Number(5.0));
        assert!(ge.matches(&IndexedValue::Number(5.0)));
        assert!(ge.matches(&IndexedValue::Number(7.5)));
        assert!(!ge.matches(&IndexedValue::Number(4.9)));
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        let f = IndexFilter::new(Comparator::Eq, QueryValue::Text("5".into()));
        assert!(!f.matches(&IndexedValue::Number(5.0)));
    }
}
