//! End-to-end CRUD conformance through the request dispatcher.
//!
//! Covers the full lifecycle of a resource: create, read, update, vread,
//! history, delete, and the error responses for each interaction.

mod common;

use common::{patient, TestServer};
use serde_json::json;

#[test]
fn test_create_returns_201_with_location_and_etag() {
    let server = TestServer::new();
    let response = server.post("/Patient", &patient("Doe"));

    assert_eq!(response.status, 201);
    let body = response.json();
    assert_eq!(body["resourceType"], "Patient");
    assert_eq!(body["meta"]["versionId"], "1");
    assert!(body["meta"]["lastUpdated"].is_string());

    let id = body["id"].as_str().unwrap();
    assert_eq!(
        response.header("Location").unwrap(),
        format!("/fhir/Patient/{id}/_history/1")
    );
    assert_eq!(response.header("ETag").unwrap(), "W/\"1\"");
}

#[test]
fn test_create_replaces_client_supplied_id() {
    let server = TestServer::new();
    let response = server.post(
        "/Patient",
        &json!({"resourceType": "Patient", "id": "mine"}),
    );
    assert_eq!(response.status, 201);
    assert_ne!(response.json()["id"], "mine");
}

#[test]
fn test_read_returns_current_version() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("John"));

    let response = server.get(&format!("/Patient/{id}"));
    assert_eq!(response.status, 200);
    assert_eq!(response.json()["name"][0]["family"], "John");
    assert_eq!(response.header("ETag").unwrap(), "W/\"1\"");
}

#[test]
fn test_update_increments_version() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("John"));

    let response = server.put(&format!("/Patient/{id}"), &patient("Jane"));
    assert_eq!(response.status, 200);
    let body = response.json();
    assert_eq!(body["meta"]["versionId"], "2");
    assert_eq!(body["name"][0]["family"], "Jane");
    assert_eq!(response.header("ETag").unwrap(), "W/\"2\"");

    let read = server.get(&format!("/Patient/{id}"));
    assert_eq!(read.json()["name"][0]["family"], "Jane");
}

#[test]
fn test_vread_returns_historical_versions() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("John"));
    server.put(&format!("/Patient/{id}"), &patient("Jane"));

    let v1 = server.get(&format!("/Patient/{id}/_history/1"));
    assert_eq!(v1.status, 200);
    assert_eq!(v1.json()["name"][0]["family"], "John");
    assert_eq!(v1.header("ETag").unwrap(), "W/\"1\"");

    let v2 = server.get(&format!("/Patient/{id}/_history/2"));
    assert_eq!(v2.json()["name"][0]["family"], "Jane");

    let missing = server.get(&format!("/Patient/{id}/_history/3"));
    assert_eq!(missing.status, 404);
}

#[test]
fn test_history_bundle_lists_all_versions_oldest_first() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("John"));
    server.put(&format!("/Patient/{id}"), &patient("Jane"));
    server.delete(&format!("/Patient/{id}"));

    let response = server.get(&format!("/Patient/{id}/_history"));
    assert_eq!(response.status, 200);
    let bundle = response.json();
    assert_eq!(bundle["resourceType"], "Bundle");
    assert_eq!(bundle["type"], "history");
    assert_eq!(bundle["total"], 3);

    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries[0]["request"]["method"], "POST");
    assert_eq!(entries[0]["resource"]["name"][0]["family"], "John");
    assert_eq!(entries[1]["request"]["method"], "PUT");
    assert_eq!(entries[1]["resource"]["name"][0]["family"], "Jane");
    assert_eq!(entries[2]["request"]["method"], "DELETE");
    assert!(entries[2].get("resource").is_none());
}

#[test]
fn test_delete_then_read_is_404() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("Doe"));

    let deleted = server.delete(&format!("/Patient/{id}"));
    assert_eq!(deleted.status, 204);
    assert!(deleted.body.is_empty());

    let read = server.get(&format!("/Patient/{id}"));
    assert_eq!(read.status, 404);
    let outcome = read.json();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "not-found");

    // Deleting again stays a successful no-op.
    assert_eq!(server.delete(&format!("/Patient/{id}")).status, 204);
}

#[test]
fn test_read_unknown_resource_is_404() {
    let server = TestServer::new();
    let response = server.get("/Patient/no-such-id");
    assert_eq!(response.status, 404);
    assert_eq!(response.json()["issue"][0]["code"], "not-found");
}

#[test]
fn test_update_unknown_resource_is_404_by_default() {
    let server = TestServer::new();
    let response = server.put("/Patient/no-such-id", &patient("Doe"));
    assert_eq!(response.status, 404);
}

#[test]
fn test_update_as_create_returns_201() {
    use lumen_core::ServerConfig;
    let server = TestServer::with_config(ServerConfig::default().with_create_on_update(true));

    let response = server.put("/Patient/chosen-id", &patient("Doe"));
    assert_eq!(response.status, 201);
    assert_eq!(response.json()["id"], "chosen-id");
    assert_eq!(response.header("ETag").unwrap(), "W/\"1\"");
}

#[test]
fn test_malformed_body_is_400_with_invalid_issue() {
    let server = TestServer::new();

    let not_json = server.request("POST", "/Patient", "{not json");
    assert_eq!(not_json.status, 400);
    assert_eq!(not_json.json()["issue"][0]["code"], "invalid");

    let missing_type = server.post("/Patient", &json!({"name": []}));
    assert_eq!(missing_type.status, 400);

    let wrong_type = server.post("/Patient", &json!({"resourceType": "Observation"}));
    assert_eq!(wrong_type.status, 400);
}

#[test]
fn test_body_id_must_match_url_id() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("Doe"));

    let mut body = patient("Doe");
    body["id"] = json!("someone-else");
    let response = server.put(&format!("/Patient/{id}"), &body);
    assert_eq!(response.status, 400);
    assert_eq!(response.json()["issue"][0]["code"], "invalid");
}

#[test]
fn test_if_match_precondition() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("John"));

    let stale = server.request_with_headers(
        "PUT",
        &format!("/Patient/{id}"),
        &patient("Jane").to_string(),
        &[("If-Match", "W/\"9\"")],
    );
    assert_eq!(stale.status, 409);
    assert_eq!(stale.json()["issue"][0]["code"], "conflict");

    let fresh = server.request_with_headers(
        "PUT",
        &format!("/Patient/{id}"),
        &patient("Jane").to_string(),
        &[("If-Match", "W/\"1\"")],
    );
    assert_eq!(fresh.status, 200);
    assert_eq!(fresh.json()["meta"]["versionId"], "2");

    let garbage = server.request_with_headers(
        "PUT",
        &format!("/Patient/{id}"),
        &patient("Jane").to_string(),
        &[("If-Match", "latest")],
    );
    assert_eq!(garbage.status, 400);
}

#[test]
fn test_unsupported_interaction_is_400() {
    let server = TestServer::new();
    assert_eq!(server.request("PATCH", "/Patient/x", "").status, 400);
    assert_eq!(server.get("/Patient/x/y/z").status, 400);
    assert_eq!(server.get("/Patient/x/_history/abc").status, 400);
}

#[test]
fn test_get_on_base_path_is_400() {
    let server = TestServer::new();
    let response = server.request("GET", "", "");
    assert_eq!(response.status, 400);
}

#[test]
fn test_prefer_return_minimal_suppresses_body() {
    let server = TestServer::new();
    let created = server.request_with_headers(
        "POST",
        "/Patient",
        &patient("Doe").to_string(),
        &[("Prefer", "return=minimal")],
    );
    assert_eq!(created.status, 201);
    assert!(created.body.is_empty());
    // Headers still identify the new version.
    assert!(created.header("Location").is_some());
    assert_eq!(created.header("ETag").unwrap(), "W/\"1\"");

    let location = created.header("Location").unwrap();
    let id = location
        .trim_start_matches("/fhir/Patient/")
        .trim_end_matches("/_history/1");
    let updated = server.request_with_headers(
        "PUT",
        &format!("/Patient/{id}"),
        &patient("Ray").to_string(),
        &[("Prefer", "return=minimal")],
    );
    assert_eq!(updated.status, 200);
    assert!(updated.body.is_empty());
}

#[test]
fn test_batch_bundle_mixes_successes_and_failures() {
    let server = TestServer::new();
    let id = server.create("Patient", &patient("Doe"));

    let batch = json!({
        "resourceType": "Bundle",
        "type": "batch",
        "entry": [
            {
                "request": { "method": "GET", "url": format!("Patient/{id}") }
            },
            {
                "request": { "method": "GET", "url": "Patient/missing" }
            },
            {
                "resource": patient("New"),
                "request": { "method": "POST", "url": "Patient" }
            }
        ]
    });

    let response = server.post("", &batch);
    assert_eq!(response.status, 200);
    let bundle = response.json();
    assert_eq!(bundle["type"], "batch-response");

    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["response"]["status"], "200");
    assert_eq!(entries[0]["resource"]["name"][0]["family"], "Doe");
    assert_eq!(entries[1]["response"]["status"], "404");
    assert_eq!(entries[1]["resource"]["resourceType"], "OperationOutcome");
    assert_eq!(entries[2]["response"]["status"], "201");
    assert_eq!(entries[2]["response"]["etag"], "W/\"1\"");
    let location = entries[2]["response"]["location"].as_str().unwrap();
    assert!(location.starts_with("/fhir/Patient/"));
    assert!(location.ends_with("/_history/1"));
}

#[test]
fn test_transaction_bundle_aborts_on_failure() {
    let server = TestServer::new();

    let transaction = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "resource": patient("First"),
                "request": { "method": "POST", "url": "Patient" }
            },
            {
                "request": { "method": "GET", "url": "Patient/missing" }
            }
        ]
    });

    let response = server.post("", &transaction);
    assert_eq!(response.status, 404);
    assert_eq!(response.json()["resourceType"], "OperationOutcome");
}

#[test]
fn test_transaction_bundle_success() {
    let server = TestServer::new();

    let transaction = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "resource": patient("One"),
                "request": { "method": "POST", "url": "Patient" }
            },
            {
                "resource": patient("Two"),
                "request": { "method": "POST", "url": "Patient" }
            }
        ]
    });

    let response = server.post("", &transaction);
    assert_eq!(response.status, 200);
    let bundle = response.json();
    assert_eq!(bundle["type"], "transaction-response");
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);
}

#[test]
fn test_base_post_requires_bundle() {
    let server = TestServer::new();
    let response = server.post("", &patient("Doe"));
    assert_eq!(response.status, 400);

    let unknown_type = server.post(
        "",
        &json!({"resourceType": "Bundle", "type": "searchset"}),
    );
    assert_eq!(unknown_type.status, 400);
}
