//! Request dispatcher.
//!
//! Classifies an inbound request descriptor into an interaction, executes
//! it against the resource store, and renders the outcome. Stateless across
//! requests; the dispatcher is the single place that converts a raised
//! [`ServerError`] into a rendered response, and every dispatched request
//! yields exactly one well-formed response.

use std::sync::Arc;

use serde_json::Value;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::responses::{bundle, outcome};
use crate::storage::Storage;
use crate::store::ResourceStore;
use crate::types::VersionRecord;

/// The response descriptor handed back to the host: a status code and a
/// JSON body (empty for 204). Headers are written through the caller's
/// `set_header` capability as a side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body as JSON text; empty when the interaction has none.
    pub body: String,
}

impl Response {
    fn new(status: u16, body: String) -> Self {
        Self { status, body }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// The resource server: one instance per store, transport-agnostic.
///
/// Hosts adapt whatever carries their requests (an HTTP listener, a browser
/// event, an in-process call) to [`Server::handle_request`].
pub struct Server {
    store: ResourceStore,
}

impl Server {
    /// Creates a server over a storage adapter with the given configuration.
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        let config = Arc::new(config);
        Self {
            store: ResourceStore::new(storage, config),
        }
    }

    /// Handles one request descriptor and returns a response descriptor.
    ///
    /// `get_header` and `set_header` are caller-supplied capabilities for
    /// reading request headers and writing response headers. Internal
    /// failures never escape: they render as OperationOutcome responses.
    pub fn handle_request(
        &self,
        method: &str,
        full_path: &str,
        base_path: &str,
        body: &str,
        get_header: &dyn Fn(&str) -> Option<String>,
        set_header: &mut dyn FnMut(&str, &str),
    ) -> Response {
        let result = self.dispatch(method, full_path, base_path, body, get_header, set_header);
        match result {
            Ok(response) => {
                tracing::debug!(method, path = full_path, status = response.status, "handled");
                response
            }
            Err(err) => {
                tracing::debug!(method, path = full_path, error = %err, "request failed");
                render_error(&err)
            }
        }
    }

    fn dispatch(
        &self,
        method: &str,
        full_path: &str,
        base_path: &str,
        body: &str,
        get_header: &dyn Fn(&str) -> Option<String>,
        set_header: &mut dyn FnMut(&str, &str),
    ) -> ServerResult<Response> {
        let base = base_path.trim_end_matches('/');
        let relative = strip_base(full_path, base)?;
        let (path, query) = match relative.split_once('?') {
            Some((path, query)) => (path, query),
            None => (relative, ""),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let params = parse_query(query);
        let minimal = prefers_minimal(get_header);

        match (method, segments.as_slice()) {
            ("POST", []) => self.process_bundle(base, body),
            ("GET", [resource_type]) => {
                let results = self.store.search(resource_type, &params)?;
                let bundle = bundle::searchset(resource_type, results);
                Ok(Response::new(200, to_json_text(&bundle)?))
            }
            ("POST", [resource_type]) => {
                let record = self.store.create(resource_type, parse_json_body(body)?)?;
                write_version_headers(base, &record, set_header);
                Ok(render_record(201, record, minimal)?)
            }
            ("GET", [resource_type, id]) => {
                let record = self.store.read(resource_type, id)?;
                set_header("ETag", &record.etag());
                Ok(render_record(200, record, false)?)
            }
            ("PUT", [resource_type, id]) => {
                let expected_version = match get_header("If-Match") {
                    Some(etag) => Some(parse_etag(&etag)?),
                    None => None,
                };
                let (record, created) =
                    self.store
                        .update(resource_type, id, parse_json_body(body)?, expected_version)?;
                write_version_headers(base, &record, set_header);
                let status = if created { 201 } else { 200 };
                Ok(render_record(status, record, minimal)?)
            }
            ("DELETE", [resource_type, id]) => {
                self.store.delete(resource_type, id)?;
                Ok(Response::empty(204))
            }
            ("GET", [resource_type, id, "_history"]) => {
                let records = self.store.history(resource_type, id)?;
                let bundle = bundle::history(records);
                Ok(Response::new(200, to_json_text(&bundle)?))
            }
            ("GET", [resource_type, id, "_history", version]) => {
                let version_id: i64 = version.parse().map_err(|_| {
                    ServerError::BadRequest(format!("invalid version id: {version}"))
                })?;
                let record = self.store.vread(resource_type, id, version_id)?;
                set_header("ETag", &record.etag());
                Ok(render_record(200, record, false)?)
            }
            _ => Err(ServerError::BadRequest(format!(
                "unsupported interaction: {method} {path}"
            ))),
        }
    }

    /// Processes a batch or transaction Bundle POSTed to the base path.
    ///
    /// Entries run sequentially through the same interaction machinery. A
    /// failing batch entry renders as an OperationOutcome in its slot; a
    /// failing transaction entry aborts the whole request. Processing is
    /// not atomic across entries.
    fn process_bundle(&self, base: &str, body: &str) -> ServerResult<Response> {
        let parsed = parse_json_body(body)?;
        if parsed.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return Err(ServerError::BadRequest(
                "POST to the base path requires a Bundle body".to_string(),
            ));
        }
        let is_transaction = match parsed.get("type").and_then(Value::as_str) {
            Some("transaction") => true,
            Some("batch") => false,
            other => {
                return Err(ServerError::BadRequest(format!(
                    "unsupported bundle type: {}",
                    other.unwrap_or("missing")
                )));
            }
        };

        let entries = match parsed.get("entry").and_then(Value::as_array) {
            Some(entries) => entries.clone(),
            None => Vec::new(),
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.execute_entry(base, &entry) {
                Ok(rendered) => out.push(rendered),
                Err(err) if is_transaction => return Err(err),
                Err(err) => out.push(bundle::response_entry(
                    err.status(),
                    Some(outcome::error_outcome(err.issue_type(), &err.to_string())),
                    None,
                    None,
                )),
            }
        }

        let bundle_type = if is_transaction {
            bundle::BundleType::TransactionResponse
        } else {
            bundle::BundleType::BatchResponse
        };
        let response = bundle::response_bundle(bundle_type, out);
        Ok(Response::new(200, to_json_text(&response)?))
    }

    fn execute_entry(&self, base: &str, entry: &Value) -> ServerResult<Value> {
        let request = entry.get("request").ok_or_else(|| {
            ServerError::BadRequest("bundle entry is missing request".to_string())
        })?;
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServerError::BadRequest("bundle entry is missing request.method".to_string())
            })?;
        let url = request.get("url").and_then(Value::as_str).ok_or_else(|| {
            ServerError::BadRequest("bundle entry is missing request.url".to_string())
        })?;

        let entry_body = match entry.get("resource") {
            Some(resource) => to_json_text(resource)?,
            None => String::new(),
        };

        let mut location = None;
        let mut etag = None;
        let full_path = format!("{base}/{url}");
        let response = {
            let get_header = |_: &str| -> Option<String> { None };
            let mut set_header = |name: &str, value: &str| {
                if name.eq_ignore_ascii_case("Location") {
                    location = Some(value.to_string());
                } else if name.eq_ignore_ascii_case("ETag") {
                    etag = Some(value.to_string());
                }
            };
            self.dispatch(
                method,
                &full_path,
                base,
                &entry_body,
                &get_header,
                &mut set_header,
            )?
        };

        let resource = if response.body.is_empty() {
            None
        } else {
            Some(parse_json_body(&response.body)?)
        };
        Ok(bundle::response_entry(
            response.status,
            resource,
            location,
            etag,
        ))
    }
}

/// Renders an error as its OperationOutcome response. The only place error
/// bodies are formatted.
fn render_error(err: &ServerError) -> Response {
    let body = outcome::error_outcome(err.issue_type(), &err.to_string());
    Response::new(
        err.status(),
        serde_json::to_string(&body).unwrap_or_default(),
    )
}

fn render_record(status: u16, record: VersionRecord, minimal: bool) -> ServerResult<Response> {
    if minimal {
        return Ok(Response::empty(status));
    }
    let body = record
        .body
        .ok_or_else(|| ServerError::Storage("live version without a body".to_string()))?;
    Ok(Response::new(status, to_json_text(&body)?))
}

fn write_version_headers(
    base: &str,
    record: &VersionRecord,
    set_header: &mut dyn FnMut(&str, &str),
) {
    set_header("Location", &format!("{base}/{}", record.versioned_url()));
    set_header("ETag", &record.etag());
}

fn strip_base<'a>(full_path: &'a str, base: &str) -> ServerResult<&'a str> {
    match full_path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') => Ok(rest),
        _ => Err(ServerError::BadRequest(format!(
            "path {full_path} does not start with base path {base}"
        ))),
    }
}

/// Parses a version id out of an `If-Match` ETag, weak or strong.
fn parse_etag(etag: &str) -> ServerResult<i64> {
    let trimmed = etag.trim();
    let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    trimmed
        .trim_matches('"')
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid If-Match value: {etag}")))
}

fn prefers_minimal(get_header: &dyn Fn(&str) -> Option<String>) -> bool {
    get_header("Prefer").is_some_and(|value| {
        value
            .split(',')
            .any(|part| part.trim().eq_ignore_ascii_case("return=minimal"))
    })
}

fn parse_json_body(body: &str) -> ServerResult<Value> {
    serde_json::from_str(body)
        .map_err(|e| ServerError::BadRequest(format!("malformed JSON body: {e}")))
}

fn to_json_text(value: &Value) -> ServerResult<String> {
    serde_json::to_string(value)
        .map_err(|e| ServerError::Storage(format!("failed to serialize response: {e}")))
}

/// Parses a query string into ordered (name, value) pairs. A parameter may
/// repeat; repeats AND-intersect downstream.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name), percent_decode(value))
        })
        .collect()
}

/// Minimal application/x-www-form-urlencoded decoding: `%XX` escapes and
/// `+` as space. Invalid escapes pass through unchanged.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                match (hex_digit(bytes.get(i + 1)), hex_digit(bytes.get(i + 2))) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi * 16 + lo);
                        i += 3;
                    }
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: Option<&u8>) -> Option<u8> {
    byte.and_then(|b| (*b as char).to_digit(16)).map(|d| d as u8)
}
