//! Menu image download into the local image directory

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::repositories::ImageStore;
use crate::infrastructure::config::StorageConfig;
use crate::infrastructure::http_client::HttpClient;

/// Extensions kept as-is; anything else is stored as `.jpg`
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Stores images as `<image_dir>/<code><ext>` and reports `/images/<subdir>/<code><ext>`
#[derive(Clone)]
pub struct ImageDownloader {
    http: HttpClient,
    cdn_base_url: String,
    image_dir: PathBuf,
    web_prefix: String,
}

impl ImageDownloader {
    pub fn new(http: HttpClient, cdn_base_url: impl Into<String>, storage: &StorageConfig) -> Self {
        Self {
            http,
            cdn_base_url: cdn_base_url.into(),
            image_dir: storage.image_dir(),
            web_prefix: format!("/images/{}", storage.image_subdir.trim_matches('/')),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Whether a local image exists for `item_code` under any allowed extension
    pub async fn image_exists(&self, item_code: &str) -> bool {
        for ext in ALLOWED_EXTENSIONS {
            let path = self.image_dir.join(format!("{}.{}", item_code, ext));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl ImageStore for ImageDownloader {
    async fn download_and_store(&self, item_code: &str, remote_url: &str) -> Option<String> {
        if remote_url.trim().is_empty() {
            warn!("Image URL is empty for menu {}", item_code);
            return None;
        }
        if !is_safe_file_stem(item_code) {
            warn!("Refusing to store image for unsafe menu code {:?}", item_code);
            return None;
        }

        let url = resolve_image_url(&self.cdn_base_url, remote_url);
        let file_name = format!("{}{}", item_code, extract_extension(remote_url));
        let target = self.image_dir.join(&file_name);

        match self.http.download_to_file(&url, &target).await {
            Ok(bytes) => {
                let local_path = format!("{}/{}", self.web_prefix, file_name);
                debug!("🖼️ Image saved: {} -> {} ({} bytes)", item_code, local_path, bytes);
                Some(local_path)
            }
            Err(e) => {
                warn!("Failed to download image for menu {}: {:#}", item_code, e);
                None
            }
        }
    }
}

/// Absolute URLs pass through; relative ones are joined onto the CDN base
pub fn resolve_image_url(cdn_base_url: &str, image_url: &str) -> String {
    let image_url = image_url.trim();
    if image_url.starts_with("http://") || image_url.starts_with("https://") {
        return image_url.to_string();
    }
    if let Some(rest) = image_url.strip_prefix("//") {
        return format!("https://{}", rest);
    }

    let base = cdn_base_url.trim_end_matches('/');
    if image_url.starts_with('/') {
        format!("{}{}", base, image_url)
    } else {
        format!("{}/{}", base, image_url)
    }
}

/// Extension (with dot, lowercased) of the last path segment, ignoring query and fragment
pub fn extract_extension(image_url: &str) -> String {
    let path = image_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();

    file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), |ext| format!(".{}", ext))
}

fn is_safe_file_stem(item_code: &str) -> bool {
    !item_code.is_empty()
        && item_code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
