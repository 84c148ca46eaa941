//! Catalog entities replicated from the vendor feed
//!
//! `CatalogItem` is keyed by the vendor's external code (`menu_cd` on the wire);
//! `OptionRecord` rows hang off that code and are fully replaced on every sync.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Temperature code suffix for hot variants (e.g. `010H`)
pub const HOT_SUFFIX: char = 'H';

/// Temperature code suffix for iced variants (e.g. `011I`)
pub const ICED_SUFFIX: char = 'I';

/// Display name stored for hot variants
pub const HOT_DISPLAY_NAME: &str = "핫";

/// Display name stored for iced variants
pub const ICED_DISPLAY_NAME: &str = "아이스";

/// A menu item as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: Option<i64>,
    /// Vendor-assigned external code, the upsert key
    pub code: String,
    pub name: String,
    pub name_en: Option<String>,
    pub group_code: Option<String>,
    pub group_name: Option<String>,
    pub category_code: Option<String>,
    pub category_name: Option<String>,
    pub image_url: Option<String>,
    pub image_url_01: Option<String>,
    /// 276x276 rendition, preferred for local download
    pub image_url_02: Option<String>,
    pub image_url_03: Option<String>,
    pub badge_code: Option<String>,
    pub badge_name: Option<String>,
    pub sort_order: Option<i32>,
    pub display_no: Option<String>,
    /// Web-relative path of the downloaded image (e.g. `/images/catalog/10100001.jpg`)
    pub local_image_path: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Create a fresh, not yet persisted item with only the identity fields set
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            code: code.into(),
            name: name.into(),
            name_en: None,
            group_code: None,
            group_name: None,
            category_code: None,
            category_name: None,
            image_url: None,
            image_url_01: None,
            image_url_02: None,
            image_url_03: None,
            badge_code: None,
            badge_name: None,
            sort_order: None,
            display_no: None,
            local_image_path: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Image URL used for the local copy: the 276px rendition first, then the default one.
    /// Blank values are treated as missing.
    pub fn preferred_image_url(&self) -> Option<&str> {
        [&self.image_url_02, &self.image_url]
            .into_iter()
            .filter_map(|url| url.as_deref())
            .map(str::trim)
            .find(|url| !url.is_empty())
    }

    /// Copy every vendor-owned field from `incoming`, keeping local state
    /// (row id, image path, creation time) and reviving soft-deleted rows.
    pub fn merge_from_feed(&mut self, incoming: &Self, now: DateTime<Utc>) {
        self.name.clone_from(&incoming.name);
        self.name_en.clone_from(&incoming.name_en);
        self.group_code.clone_from(&incoming.group_code);
        self.group_name.clone_from(&incoming.group_name);
        self.category_code.clone_from(&incoming.category_code);
        self.category_name.clone_from(&incoming.category_name);
        self.image_url.clone_from(&incoming.image_url);
        self.image_url_01.clone_from(&incoming.image_url_01);
        self.image_url_02.clone_from(&incoming.image_url_02);
        self.image_url_03.clone_from(&incoming.image_url_03);
        self.badge_code.clone_from(&incoming.badge_code);
        self.badge_name.clone_from(&incoming.badge_name);
        self.sort_order = incoming.sort_order;
        self.display_no.clone_from(&incoming.display_no);
        self.deleted = false;
        self.updated_at = now;
    }
}

/// One size entry returned by the vendor for a (item, temperature) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeOption {
    /// Combined code, e.g. `020R`
    pub variant_code: Option<String>,
    /// e.g. `020`
    pub size_group_code: Option<String>,
    /// e.g. `레귤러`
    pub size_name: Option<String>,
    /// e.g. `R`, `L`, `M`
    pub size_code: String,
}

/// A (temperature, size) variant of a catalog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRecord {
    pub id: Option<i64>,
    pub item_code: String,
    pub temperature_code: String,
    pub temperature_name: String,
    pub size_code: String,
    pub size_name: Option<String>,
    pub size_group_code: Option<String>,
    pub variant_code: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptionRecord {
    /// Build the record for one size of one temperature of an item
    pub fn from_size(
        item_code: &str,
        temperature_code: &str,
        size: &SizeOption,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            item_code: item_code.to_string(),
            temperature_code: temperature_code.to_string(),
            temperature_name: temperature_display_name(temperature_code).to_string(),
            size_code: size.size_code.clone(),
            size_name: size.size_name.clone(),
            size_group_code: size.size_group_code.clone(),
            variant_code: size.variant_code.clone(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Build every option row for one item.
///
/// Each temperature contributes only its own sizes; this is not a full cross
/// product across temperatures.
pub fn build_option_records(
    item_code: &str,
    sizes_by_temperature: &[(String, Vec<SizeOption>)],
    now: DateTime<Utc>,
) -> Vec<OptionRecord> {
    sizes_by_temperature
        .iter()
        .flat_map(|(temperature, sizes)| {
            sizes
                .iter()
                .map(move |size| OptionRecord::from_size(item_code, temperature, size, now))
        })
        .collect()
}

/// Collapse repeated external codes, keeping the first position and the last entry
pub fn dedupe_by_code(items: &[CatalogItem]) -> Vec<CatalogItem> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<CatalogItem> = Vec::with_capacity(items.len());

    for item in items {
        match positions.get(item.code.as_str()) {
            Some(&index) => unique[index] = item.clone(),
            None => {
                positions.insert(item.code.as_str(), unique.len());
                unique.push(item.clone());
            }
        }
    }
    unique
}

/// Human readable temperature name for a code such as `010H`
pub fn temperature_display_name(code: &str) -> &str {
    if code.ends_with(HOT_SUFFIX) {
        HOT_DISPLAY_NAME
    } else if code.ends_with(ICED_SUFFIX) {
        ICED_DISPLAY_NAME
    } else {
        code
    }
}
