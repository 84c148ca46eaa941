//! Vendor catalog client
//!
//! Only the list fetch reports errors. Per-item calls (detail page, size
//! options) swallow failures and return empty results so one bad item never
//! escalates beyond its own task.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::catalog::{CatalogItem, SizeOption};
use crate::domain::repositories::CatalogSource;
use crate::infrastructure::catalog_parser::{extract_temperature_codes, parse_menu_list, parse_size_options};
use crate::infrastructure::config::VendorConfig;
use crate::infrastructure::http_client::HttpClient;

#[derive(Clone)]
pub struct VendorCatalogClient {
    http: HttpClient,
    vendor: VendorConfig,
}

impl VendorCatalogClient {
    pub const fn new(http: HttpClient, vendor: VendorConfig) -> Self {
        Self { http, vendor }
    }

    pub fn detail_url(&self, item_code: &str) -> Result<Url> {
        Url::parse_with_params(&self.vendor.menu_detail_url, &[("menuCd", item_code)])
            .with_context(|| format!("Invalid detail URL for menu {}", item_code))
    }

    pub fn size_option_url(&self, item_code: &str, temperature_code: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.vendor.size_option_url,
            &[("menuCd", item_code), ("ondoOpt", temperature_code)],
        )
        .with_context(|| format!("Invalid size option URL for menu {}", item_code))
    }
}

#[async_trait]
impl CatalogSource for VendorCatalogClient {
    async fn fetch_list(&self) -> Result<Vec<CatalogItem>> {
        info!("📋 Fetching menu list: {}", self.vendor.menu_list_url);
        let body = self
            .http
            .fetch_text(&self.vendor.menu_list_url)
            .await
            .context("Failed to fetch menu list")?;

        let items = parse_menu_list(&body, self.vendor.success_query_code, Utc::now());
        info!("📋 Menu list returned {} items", items.len());
        Ok(items)
    }

    async fn fetch_temperature_options(&self, item_code: &str) -> Vec<String> {
        let url = match self.detail_url(item_code) {
            Ok(url) => url,
            Err(e) => {
                warn!("{:#}", e);
                return Vec::new();
            }
        };

        match self.http.fetch_text(url.as_str()).await {
            Ok(html) => {
                let codes = extract_temperature_codes(&html);
                debug!("Menu {} has temperature options: {:?}", item_code, codes);
                codes
            }
            Err(e) => {
                warn!("Failed to fetch menu detail for {}: {:#}", item_code, e);
                Vec::new()
            }
        }
    }

    async fn fetch_size_options(&self, item_code: &str, temperature_code: &str) -> Vec<SizeOption> {
        let url = match self.size_option_url(item_code, temperature_code) {
            Ok(url) => url,
            Err(e) => {
                warn!("{:#}", e);
                return Vec::new();
            }
        };

        match self.http.fetch_text(url.as_str()).await {
            Ok(body) => {
                let options = parse_size_options(&body);
                debug!(
                    "Menu {} ({}) has {} size options",
                    item_code,
                    temperature_code,
                    options.len()
                );
                options
            }
            Err(e) => {
                warn!(
                    "Failed to fetch size options for {} ({}): {:#}",
                    item_code, temperature_code, e
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::HttpConfig;

    fn client() -> VendorCatalogClient {
        let http = HttpClient::new(HttpConfig::default()).unwrap();
        VendorCatalogClient::new(http, VendorConfig::default())
    }

    #[test]
    fn test_detail_url_encodes_code() {
        let url = client().detail_url("10100001").unwrap();
        assert_eq!(
            url.as_str(),
            "https://mo.twosome.co.kr/mn/menuInfoDetail.do?menuCd=10100001"
        );
    }

    #[test]
    fn test_size_option_url_has_both_params() {
        let url = client().size_option_url("10100001", "010H").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("menuCd".to_string(), "10100001".to_string()),
                ("ondoOpt".to_string(), "010H".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_empty_options() {
        let vendor = VendorConfig {
            menu_detail_url: "http://127.0.0.1:9/detail".into(),
            size_option_url: "http://127.0.0.1:9/sizes".into(),
            ..VendorConfig::default()
        };
        let http = HttpClient::new(HttpConfig { max_attempts: 1, ..HttpConfig::default() }).unwrap();
        let client = VendorCatalogClient::new(http, vendor);

        assert!(client.fetch_temperature_options("A1").await.is_empty());
        assert!(client.fetch_size_options("A1", "010H").await.is_empty());
    }
}
