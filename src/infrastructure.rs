//! Infrastructure layer: configuration, logging, persistence, HTTP and the
//! vendor catalog integration.

pub mod catalog_client;
pub mod catalog_parser;
pub mod catalog_repository;
pub mod config; // Layered configuration
pub mod coordination_store;
pub mod database_connection;
pub mod http_client;
pub mod image_downloader;
pub mod logging; // Logging infrastructure

// Re-export commonly used items
pub use catalog_client::VendorCatalogClient;
pub use catalog_repository::SqliteCatalogRepository;
pub use config::{AppConfig, ConfigError, CoordinationBackend};
pub use coordination_store::{InMemoryCoordinationStore, SqliteCoordinationStore};
pub use database_connection::DatabaseConnection;
pub use http_client::HttpClient;
pub use image_downloader::ImageDownloader;
pub use logging::{init_logging_with_config, log_system_info};
