//! Menu Catalog Sync - vendor menu catalog replication
//!
//! Replicates a third party menu catalog (items, temperature/size options,
//! images) into local SQLite storage. Only one sync runs at a time across every
//! instance sharing the coordination store.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::SyncCoordinator;
use crate::domain::repositories::CoordinationStore;
use crate::infrastructure::{
    AppConfig, CoordinationBackend, DatabaseConnection, HttpClient, ImageDownloader,
    InMemoryCoordinationStore, SqliteCatalogRepository, SqliteCoordinationStore, VendorCatalogClient,
};

/// Open the database and wire every collaborator of the coordinator from `config`
pub async fn build_coordinator(config: &AppConfig) -> Result<SyncCoordinator> {
    let database_url = config.storage.database_url();
    let db = DatabaseConnection::new(&database_url).await?;
    db.migrate().await.context("Failed to migrate database")?;
    info!("🗄️ Database ready: {}", database_url);

    let pool = Arc::new(db.pool().clone());
    let http = HttpClient::new(config.http.clone())?;

    let store: Arc<dyn CoordinationStore> = match config.coordination.backend {
        CoordinationBackend::Sqlite => Arc::new(SqliteCoordinationStore::new(Arc::clone(&pool))),
        CoordinationBackend::Memory => Arc::new(InMemoryCoordinationStore::new()),
    };
    info!("🔒 Coordination backend: {:?}", config.coordination.backend);

    Ok(SyncCoordinator::new(
        Arc::new(SqliteCatalogRepository::new(pool)),
        store,
        Arc::new(VendorCatalogClient::new(http.clone(), config.vendor.clone())),
        Arc::new(ImageDownloader::new(http, config.vendor.cdn_base_url.clone(), &config.storage)),
        config.sync.clone(),
    ))
}
