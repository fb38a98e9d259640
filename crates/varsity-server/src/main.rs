//! # varsity-server
//!
//! HTTP surface of the Varsity document and notice portal.
//!
//! This binary wires the engine to its collaborators:
//! - **SQLite entity store** (`varsity-store`) for users, documents, and
//!   notices
//! - **Disk file store** for uploaded bytes (opaque UUID locators)
//! - **Tracing notifier** standing in for real notice broadcast transport
//! - **REST API** (axum) exposing the listing, fetch, download, and
//!   management operations
//!
//! Authentication is out of scope: an upstream gateway injects the resolved
//! actor identity as request headers.

mod api;
mod config;
mod error;
mod file_store;
mod notifier;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use varsity_core::Portal;
use varsity_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::file_store::DiskFileStore;
use crate::notifier::LogNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,varsity_server=debug")),
        )
        .init();

    info!("Starting Varsity portal server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Entity store (runs migrations on open)
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    // File store (creates directory if missing)
    let file_store = Arc::new(
        DiskFileStore::new(config.file_storage_path.clone(), config.max_file_size)
            .await
            .map_err(|e| anyhow::anyhow!("file store init failed: {e}"))?,
    );

    // Notice broadcast sink
    let notifier = Arc::new(LogNotifier);

    let portal = Portal::new(database, file_store, notifier);

    let http_addr = config.http_addr;
    let app_state = AppState {
        portal,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
