//! Configuration infrastructure
//!
//! Configuration is layered with the `config` crate:
//! 1. Built-in defaults (`defaults` module)
//! 2. Optional config file (TOML/JSON/YAML, picked by extension)
//! 3. Environment variables, e.g. `MENU_SYNC__SYNC__WORKER_POOL_WIDTH=20`

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "MENU_SYNC";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub vendor: VendorConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub coordination: CoordinationConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

/// Sync pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum concurrent tasks during the image and option stages
    pub worker_pool_width: usize,

    /// Name of the cross-process sync lease
    pub lock_name: String,

    /// Lease duration; backstop for a crashed holder
    pub lock_lease_seconds: u64,

    /// TTL of the published progress record
    pub progress_ttl_seconds: u64,

    /// Publish progress every N completed items during fan-out stages
    pub progress_publish_interval: u32,
}

impl SyncConfig {
    pub const fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_seconds)
    }

    pub const fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_seconds)
    }
}

/// Vendor endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// JSON menu list endpoint
    pub menu_list_url: String,

    /// HTML detail page, `menuCd` is appended as a query parameter
    pub menu_detail_url: String,

    /// JSON size option endpoint, queried with `menuCd` and `ondoOpt`
    pub size_option_url: String,

    /// Base host for relative image URLs
    pub cdn_base_url: String,

    /// `queryCode` value of a successful list response
    pub success_query_code: i64,
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,

    /// Attempts per request, including the first one
    pub max_attempts: u32,

    /// 0 disables rate limiting
    pub max_requests_per_second: u32,

    pub user_agent: String,
    pub follow_redirects: bool,
}

/// Local storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the database and downloaded images
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`
    pub database_file: String,

    /// Images are stored under `<data_dir>/images/<image_subdir>/`
    pub image_subdir: String,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path().display())
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join("images").join(&self.image_subdir)
    }
}

/// Which coordination store backs the lock and progress record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackend {
    /// Shared SQLite database; coordinates every instance using the same file
    #[default]
    Sqlite,
    /// Process-local; single instance deployments and tests
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub backend: CoordinationBackend,
}

/// Daily trigger time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    /// Offset of the schedule's timezone from UTC (Asia/Seoul = 9)
    pub utc_offset_hours: i32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to `<data_dir>/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of daily log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_pool_width: defaults::WORKER_POOL_WIDTH,
            lock_name: defaults::LOCK_NAME.to_string(),
            lock_lease_seconds: defaults::LOCK_LEASE_SECONDS,
            progress_ttl_seconds: defaults::PROGRESS_TTL_SECONDS,
            progress_publish_interval: defaults::PROGRESS_PUBLISH_INTERVAL,
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            menu_list_url: vendor::MENU_LIST_URL.to_string(),
            menu_detail_url: vendor::MENU_DETAIL_URL.to_string(),
            size_option_url: vendor::SIZE_OPTION_URL.to_string(),
            cdn_base_url: vendor::CDN_BASE_URL.to_string(),
            success_query_code: vendor::SUCCESS_QUERY_CODE,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            max_attempts: defaults::MAX_ATTEMPTS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            user_agent: defaults::USER_AGENT.to_string(),
            follow_redirects: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: defaults::DATABASE_FILE.to_string(),
            image_subdir: defaults::IMAGE_SUBDIR.to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: defaults::SCHEDULE_HOUR,
            minute: defaults::SCHEDULE_MINUTE,
            utc_offset_hours: defaults::SCHEDULE_UTC_OFFSET_HOURS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

/// Application data directory (`~/.local/share/menu-catalog-sync` on Linux), `./data` as fallback
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("menu-catalog-sync"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl AppConfig {
    /// Load defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            info!("Loading configuration from: {:?}", path);
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.worker_pool_width == 0 {
            return Err(validation("sync.worker_pool_width must be at least 1"));
        }
        if self.sync.lock_name.trim().is_empty() {
            return Err(validation("sync.lock_name must not be empty"));
        }
        if self.sync.lock_lease_seconds == 0 {
            return Err(validation("sync.lock_lease_seconds must be positive"));
        }
        if self.sync.progress_ttl_seconds == 0 {
            return Err(validation("sync.progress_ttl_seconds must be positive"));
        }
        if self.sync.progress_publish_interval == 0 {
            return Err(validation("sync.progress_publish_interval must be at least 1"));
        }
        if self.http.max_attempts == 0 {
            return Err(validation("http.max_attempts must be at least 1"));
        }
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(validation(format!(
                "schedule time {:02}:{:02} is out of range",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(validation("schedule.utc_offset_hours must be within -12..=14"));
        }

        for (field, value) in [
            ("vendor.menu_list_url", &self.vendor.menu_list_url),
            ("vendor.menu_detail_url", &self.vendor.menu_detail_url),
            ("vendor.size_option_url", &self.vendor.size_option_url),
            ("vendor.cdn_base_url", &self.vendor.cdn_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| validation(format!("{} is not a valid URL ({}): {}", field, value, e)))?;
        }

        Ok(())
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation { message: message.into() }
}

/// Vendor endpoints used by default
pub mod vendor {
    /// Menu list (JSON envelope with `queryCode` and `fetchResultListSet`)
    pub const MENU_LIST_URL: &str = "https://mo.twosome.co.kr/mn/menuInfoListAjax.json";

    /// Menu detail page (HTML); temperature tabs are rendered as `fn_ondoTabClick('010H')`
    pub const MENU_DETAIL_URL: &str = "https://mo.twosome.co.kr/mn/menuInfoDetail.do";

    /// Size options for one temperature (JSON array)
    pub const SIZE_OPTION_URL: &str = "https://mo.twosome.co.kr/mn/menuSizeOptListAjax.json";

    /// Image CDN host for relative image paths
    pub const CDN_BASE_URL: &str = "https://mcdn.twosome.co.kr";

    pub const SUCCESS_QUERY_CODE: i64 = 1000;
}

/// Default configuration values
pub mod defaults {
    /// 병렬 처리 워커 수
    pub const WORKER_POOL_WIDTH: usize = 10;

    pub const LOCK_NAME: &str = "catalog:sync:lock";

    /// 락 최대 유지 시간 (10분)
    pub const LOCK_LEASE_SECONDS: u64 = 600;

    /// 진행 상태 보관 시간 (30분)
    pub const PROGRESS_TTL_SECONDS: u64 = 1800;

    pub const PROGRESS_PUBLISH_INTERVAL: u32 = 10;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;

    pub const MAX_ATTEMPTS: u32 = 2;

    pub const MAX_REQUESTS_PER_SECOND: u32 = 0;

    pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; menu-catalog-sync/0.1)";

    pub const DATABASE_FILE: &str = "catalog.db";

    pub const IMAGE_SUBDIR: &str = "catalog";

    /// 매일 새벽 3시 (Asia/Seoul)
    pub const SCHEDULE_HOUR: u32 = 3;

    pub const SCHEDULE_MINUTE: u32 = 0;

    pub const SCHEDULE_UTC_OFFSET_HOURS: i32 = 9;

    pub const LOG_LEVEL: &str = "info";

    pub const LOG_MAX_FILES: u32 = 7;
}
