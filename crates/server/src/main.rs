//! Lumen HTTP host.
//!
//! Mounts the transport-agnostic lumen-core dispatcher behind an axum
//! listener. All FHIR semantics live in the core crate; this binary only
//! adapts HTTP requests to the core's request descriptor.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lumen_core::{Server, ServerConfig};

const FHIR_JSON: &str = "application/fhir+json";

#[derive(Debug, Clone, Parser)]
#[command(name = "lumen", about = "Lumen FHIR server")]
struct Args {
    /// Address to bind to.
    #[arg(long, env = "LUMEN_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "LUMEN_PORT", default_value = "8080")]
    port: u16,

    /// Path prefix the FHIR endpoint is served under.
    #[arg(long, env = "LUMEN_BASE_PATH", default_value = "/fhir")]
    base_path: String,

    /// SQLite database path, or ":memory:" for a transient store.
    #[arg(long, env = "LUMEN_DATABASE", default_value = ":memory:")]
    database: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "LUMEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Allow PUT to create a resource under a client-chosen id.
    #[arg(long, env = "LUMEN_CREATE_ON_UPDATE", default_value = "false")]
    create_on_update: bool,
}

struct AppState {
    server: Server,
    base_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = ServerConfig::default().with_create_on_update(args.create_on_update);
    let storage = open_storage(&args.database)?;
    let state = Arc::new(AppState {
        server: Server::new(config, storage),
        base_path: args.base_path.trim_end_matches('/').to_string(),
    });

    let app = Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", args.host, args.port);
    info!(address = %addr, database = %args.database, "Lumen listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn open_storage(database: &str) -> anyhow::Result<Arc<dyn lumen_core::Storage>> {
    use lumen_core::SqliteStorage;
    let storage = if database == ":memory:" {
        SqliteStorage::open_in_memory()?
    } else {
        SqliteStorage::open(database)?
    };
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "sqlite"))]
fn open_storage(database: &str) -> anyhow::Result<Arc<dyn lumen_core::Storage>> {
    if database != ":memory:" {
        anyhow::bail!("persistent storage requires the 'sqlite' feature");
    }
    Ok(Arc::new(lumen_core::MemoryStorage::new()))
}

/// Adapts one HTTP request to the core dispatcher.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    request_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let full_path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let body = String::from_utf8_lossy(&body);

    let get_header = |name: &str| {
        request_headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut out_headers: Vec<(String, String)> = Vec::new();

    let response = state.server.handle_request(
        method.as_str(),
        full_path,
        &state.base_path,
        &body,
        &get_header,
        &mut |name, value| out_headers.push((name.to_string(), value.to_string())),
    );

    let mut headers = HeaderMap::new();
    for (name, value) in out_headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "dropping malformed response header"),
        }
    }
    if !response.body.is_empty() {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, headers, response.body).into_response()
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("lumen_core={level},lumen_server={level},tower_http=debug"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
