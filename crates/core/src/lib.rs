//! # Lumen Core
//!
//! An embeddable FHIR resource server: a versioned, history-preserving
//! resource store with search indexing and a transport-agnostic request
//! dispatcher.
//!
//! The crate has no opinion about how requests arrive. Hosts hand
//! [`Server::handle_request`] a request descriptor (method, path, body,
//! header capabilities) and get back a status code and JSON body; the
//! `lumen-server` crate is one such host, mounting the dispatcher behind
//! axum.
//!
//! ## Architecture
//!
//! - [`dispatch`] — request classification, response rendering
//! - [`store`] — CRUD, history, and version numbering
//! - [`search`] — index extraction and query evaluation
//! - [`storage`] — the persistence contract plus in-memory and SQLite
//!   adapters
//! - [`registry`] — search parameter definitions
//! - [`responses`] — Bundle and OperationOutcome builders
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use lumen_core::{Server, ServerConfig, MemoryStorage};
//!
//! let server = Server::new(ServerConfig::default(), Arc::new(MemoryStorage::new()));
//! let mut headers = Vec::new();
//! let response = server.handle_request(
//!     "POST",
//!     "/fhir/Patient",
//!     "/fhir",
//!     r#"{"resourceType": "Patient", "name": [{"family": "Doe"}]}"#,
//!     &|_| None::<String>,
//!     &mut |name, value| headers.push((name.to_string(), value.to_string())),
//! );
//! assert_eq!(response.status, 201);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod json;
pub mod registry;
pub mod responses;
pub mod search;
pub mod storage;
pub mod store;
pub mod types;

pub use config::ServerConfig;
pub use dispatch::{Response, Server};
pub use error::{ServerError, ServerResult};
pub use registry::{SearchParamDefinition, SearchParamRegistry, SearchParamType};
pub use storage::{MemoryStorage, Storage};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
pub use store::ResourceStore;
pub use types::{InteractionMethod, VersionRecord};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
