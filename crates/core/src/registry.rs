//! Search parameter registry.
//!
//! Static configuration mapping a resource type to its supported search
//! parameters. Each parameter names its wire code, its value kind, and the
//! dotted path used to extract candidate values from a resource body.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The value kind of a search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name.
    String,
    /// A code from a code system, or an identifier.
    Token,
    /// A date, dateTime, or partial date.
    Date,
    /// A reference to another resource.
    Reference,
    /// A numeric value.
    Number,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Number => write!(f, "number"),
        }
    }
}

/// Definition of one search parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParamDefinition {
    /// The wire name (the URL query parameter, e.g. "family").
    pub code: String,
    /// The value kind.
    pub param_type: SearchParamType,
    /// Dotted extraction path relative to the resource root
    /// (e.g. "name.given"). Array elements along the path are flattened.
    pub expression: String,
}

impl SearchParamDefinition {
    /// Creates a new definition.
    pub fn new(
        code: impl Into<String>,
        param_type: SearchParamType,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            param_type,
            expression: expression.into(),
        }
    }

    /// The extraction path split into segments, with a leading capitalized
    /// resource-type segment stripped (so "Patient.name.family" and
    /// "name.family" are equivalent).
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.expression.split('.').collect();
        if let Some(first) = segments.first() {
            if first.chars().next().is_some_and(|c| c.is_uppercase()) {
                segments.remove(0);
            }
        }
        segments
    }
}

/// In-memory registry of search parameter definitions, indexed by
/// `(resource_type, code)`.
#[derive(Default)]
pub struct SearchParamRegistry {
    params_by_type: HashMap<String, HashMap<String, Arc<SearchParamDefinition>>>,
}

impl SearchParamRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter for a resource type. A later registration with
    /// the same code replaces the earlier one.
    pub fn register(&mut self, resource_type: impl Into<String>, def: SearchParamDefinition) {
        self.params_by_type
            .entry(resource_type.into())
            .or_default()
            .insert(def.code.clone(), Arc::new(def));
    }

    /// Looks up a parameter by resource type and wire code.
    pub fn get(&self, resource_type: &str, code: &str) -> Option<Arc<SearchParamDefinition>> {
        self.params_by_type
            .get(resource_type)
            .and_then(|params| params.get(code))
            .cloned()
    }

    /// All parameters configured for a resource type.
    pub fn params_for(&self, resource_type: &str) -> Vec<Arc<SearchParamDefinition>> {
        self.params_by_type
            .get(resource_type)
            .map(|params| params.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of registered parameters.
    pub fn len(&self) -> usize {
        self.params_by_type.values().map(|p| p.len()).sum()
    }

    /// Returns `true` if no parameters are registered.
    pub fn is_empty(&self) -> bool {
        self.params_by_type.is_empty()
    }

    /// A registry covering common parameters of a handful of clinical
    /// resource types. Hosts with other needs build their own.
    pub fn default_clinical() -> Self {
        use SearchParamType::*;

        let mut registry = Self::new();
        for (code, param_type, expression) in [
            ("family", String, "name.family"),
            ("given", String, "name.given"),
            ("identifier", Token, "identifier"),
            ("gender", Token, "gender"),
            ("birthdate", Date, "birthDate"),
        ] {
            registry.register(
                "Patient",
                SearchParamDefinition::new(code, param_type, expression),
            );
        }
        for (code, param_type, expression) in [
            ("code", Token, "code"),
            ("status", Token, "status"),
            ("subject", Reference, "subject.reference"),
            ("date", Date, "effectiveDateTime"),
            ("value-quantity", Number, "valueQuantity.value"),
        ] {
            registry.register(
                "Observation",
                SearchParamDefinition::new(code, param_type, expression),
            );
        }
        for (code, param_type, expression) in [
            ("status", Token, "status"),
            ("subject", Reference, "subject.reference"),
            ("date", Date, "period.start"),
        ] {
            registry.register(
                "Encounter",
                SearchParamDefinition::new(code, param_type, expression),
            );
        }
        for (code, param_type, expression) in [
            ("code", Token, "code"),
            ("subject", Reference, "subject.reference"),
        ] {
            registry.register(
                "Condition",
                SearchParamDefinition::new(code, param_type, expression),
            );
        }
        registry
    }
}

impl fmt::Debug for SearchParamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchParamRegistry")
            .field("params_count", &self.len())
            .field(
                "resource_types",
                &self.params_by_type.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
