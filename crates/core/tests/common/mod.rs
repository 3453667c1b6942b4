//! Test infrastructure shared by the integration suites.
//!
//! Drives the server through its public request entry point so the tests
//! exercise the same classification, rendering, and header paths a real
//! host would.

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use lumen_core::{MemoryStorage, Server, ServerConfig, Storage};

/// A dispatched response with the headers the server wrote.
pub struct TestResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl TestResponse {
    /// Parses the body as JSON, panicking with the raw body on failure.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {}", self.body))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A server wired to in-memory storage, mounted at `/fhir`.
pub struct TestServer {
    server: Server,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::with_storage(config, Arc::new(MemoryStorage::new()))
    }

    pub fn with_storage(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            server: Server::new(config, storage),
        }
    }

    pub fn request(&self, method: &str, path: &str, body: &str) -> TestResponse {
        self.request_with_headers(method, path, body, &[])
    }

    pub fn request_with_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
        request_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut headers = Vec::new();
        let get_header = |name: &str| {
            request_headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.to_string())
        };
        let response = self.server.handle_request(
            method,
            &format!("/fhir{path}"),
            "/fhir",
            body,
            &get_header,
            &mut |name, value| headers.push((name.to_string(), value.to_string())),
        );
        TestResponse {
            status: response.status,
            body: response.body,
            headers,
        }
    }

    pub fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, "")
    }

    pub fn post(&self, path: &str, body: &Value) -> TestResponse {
        self.request("POST", path, &body.to_string())
    }

    pub fn put(&self, path: &str, body: &Value) -> TestResponse {
        self.request("PUT", path, &body.to_string())
    }

    pub fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, "")
    }

    /// Creates a resource and returns its server-assigned id.
    pub fn create(&self, resource_type: &str, body: &Value) -> String {
        let response = self.post(&format!("/{resource_type}"), body);
        assert_eq!(response.status, 201, "create failed: {}", response.body);
        response.json()["id"]
            .as_str()
            .expect("created resource has an id")
            .to_string()
    }
}

/// A clock that advances by one second per observation, starting from a
/// fixed instant. Makes `_lastUpdated` values deterministic.
pub struct SteppingClock {
    epoch: DateTime<Utc>,
    ticks: Arc<AtomicI64>,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self {
            epoch: Utc.with_ymd_and_hms(2023, 5, 4, 10, 0, 0).single().unwrap(),
            ticks: Arc::new(AtomicI64::new(0)),
        }
    }

    /// The instant the clock returned on its `n`-th observation (0-based).
    pub fn instant_at(&self, n: i64) -> DateTime<Utc> {
        self.epoch + Duration::seconds(n)
    }

    pub fn into_config(self) -> ServerConfig {
        let epoch = self.epoch;
        let ticks = self.ticks;
        ServerConfig::default().with_clock(move || {
            let n = ticks.fetch_add(1, Ordering::SeqCst);
            epoch + Duration::seconds(n)
        })
    }
}

pub fn patient(family: &str) -> Value {
    serde_json::json!({
        "resourceType": "Patient",
        "name": [{ "family": family, "given": ["Alex"] }]
    })
}

pub fn observation(code: &str, value: f64) -> Value {
    serde_json::json!({
        "resourceType": "Observation",
        "status": "final",
        "code": { "coding": [{ "system": "http://loinc.org", "code": code }] },
        "valueQuantity": { "value": value, "unit": "beats/min" }
    })
}
