//! Vendor payload parsing: menu list envelope, detail page temperature tabs,
//! size option arrays.
//!
//! Every parser here is lenient. Unusable input yields an empty result and a
//! warning; deciding whether "empty" is fatal is left to the coordinator.

#![allow(clippy::uninlined_format_args)]

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::domain::catalog::{CatalogItem, SizeOption};

/// Temperature tab handler on the detail page, e.g. `fn_ondoTabClick('010H')`
static TEMPERATURE_TAB_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"fn_ondoTabClick\('(\d{3}[HI])'\)").expect("valid temperature tab regex"));

/// `{queryCode, queryMessage, fetchResultListSet}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuListEnvelope {
    pub query_code: Option<i64>,
    pub query_message: Option<String>,
    #[serde(default)]
    pub fetch_result_list_set: Option<Vec<MenuListEntry>>,
}

/// One entry of `fetchResultListSet`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MenuListEntry {
    pub menu_cd: Option<String>,
    pub menu_nm: Option<String>,
    pub en_menu_nm: Option<String>,
    pub grt_cd: Option<String>,
    pub grt_nm: Option<String>,
    pub mid_cd: Option<String>,
    pub mid_nm: Option<String>,
    pub menu_img: Option<String>,
    #[serde(rename = "MENU_IMG_01")]
    pub menu_img_01: Option<String>,
    #[serde(rename = "MENU_IMG_02")]
    pub menu_img_02: Option<String>,
    #[serde(rename = "MENU_IMG_03")]
    pub menu_img_03: Option<String>,
    pub badg_cd: Option<String>,
    pub badg_nm: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub sort_ord: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dm_display_no: Option<String>,
}

/// One entry of the size option array
#[derive(Debug, Deserialize)]
pub struct SizeOptionEntry {
    #[serde(rename = "OPTS")]
    pub opts: Option<String>,
    #[serde(rename = "SIZE_OPT_GRP_CD")]
    pub size_opt_grp_cd: Option<String>,
    #[serde(rename = "SIZE_OPT_NM")]
    pub size_opt_nm: Option<String>,
    #[serde(rename = "SIZE_OPT_CD")]
    pub size_opt_cd: Option<String>,
}

impl MenuListEntry {
    /// `None` when the entry has no external code
    pub fn into_catalog_item(self, now: DateTime<Utc>) -> Option<CatalogItem> {
        let code = non_blank(self.menu_cd)?;
        let mut item = CatalogItem::new(code, self.menu_nm.unwrap_or_default().trim());
        item.name_en = non_blank(self.en_menu_nm);
        item.group_code = non_blank(self.grt_cd);
        item.group_name = non_blank(self.grt_nm);
        item.category_code = non_blank(self.mid_cd);
        item.category_name = non_blank(self.mid_nm);
        item.image_url = non_blank(self.menu_img);
        item.image_url_01 = non_blank(self.menu_img_01);
        item.image_url_02 = non_blank(self.menu_img_02);
        item.image_url_03 = non_blank(self.menu_img_03);
        item.badge_code = non_blank(self.badg_cd);
        item.badge_name = non_blank(self.badg_nm);
        item.sort_order = self.sort_ord;
        item.display_no = non_blank(self.dm_display_no);
        item.created_at = now;
        item.updated_at = now;
        Some(item)
    }
}

impl SizeOptionEntry {
    /// `None` when the entry has no size code
    pub fn into_size_option(self) -> Option<SizeOption> {
        Some(SizeOption {
            size_code: non_blank(self.size_opt_cd)?,
            variant_code: non_blank(self.opts),
            size_group_code: non_blank(self.size_opt_grp_cd),
            size_name: non_blank(self.size_opt_nm),
        })
    }
}

/// Parse the list endpoint body. A result code other than `success_code`,
/// a missing list or malformed JSON all yield an empty list.
pub fn parse_menu_list(body: &str, success_code: i64, now: DateTime<Utc>) -> Vec<CatalogItem> {
    let envelope: MenuListEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("⚠️ Menu list payload is not a valid envelope: {}", e);
            return Vec::new();
        }
    };

    if envelope.query_code != Some(success_code) {
        warn!(
            "⚠️ Menu list returned queryCode {:?} ({})",
            envelope.query_code,
            envelope.query_message.as_deref().unwrap_or("no message")
        );
        return Vec::new();
    }

    let entries = envelope.fetch_result_list_set.unwrap_or_default();
    let total = entries.len();
    let items: Vec<CatalogItem> = entries
        .into_iter()
        .filter_map(|entry| entry.into_catalog_item(now))
        .collect();

    if items.len() < total {
        warn!("Skipped {} menu entries without a menu code", total - items.len());
    }
    items
}

/// Distinct temperature codes in first-seen order
pub fn extract_temperature_codes(html: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for captures in TEMPERATURE_TAB_PATTERN.captures_iter(html) {
        let code = &captures[1];
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// `true` when the body is an HTML document served in place of JSON
pub fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().as_bytes();
    ["<!doctype", "<html"]
        .iter()
        .any(|prefix| head.len() >= prefix.len() && head[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()))
}

/// Parse the size option array; HTML bodies and malformed JSON yield an empty list
pub fn parse_size_options(body: &str) -> Vec<SizeOption> {
    if looks_like_html(body) {
        warn!("⚠️ Received HTML instead of size option JSON");
        return Vec::new();
    }

    match serde_json::from_str::<Vec<SizeOptionEntry>>(body) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(SizeOptionEntry::into_size_option)
            .collect(),
        Err(e) => {
            debug!("Size option payload could not be parsed: {}", e);
            Vec::new()
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
