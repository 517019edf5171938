//! Runtime configuration.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::overlay_store::AppDbState;

/// How a fresh remote list is folded into the cached `products` collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Only append products not seen before. Items removed on the server stay cached.
    #[default]
    Additive,
    /// Rebuild `products` from each fetch, so server-side removals show up locally.
    Replace,
}

impl MergePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "additive" => Some(MergePolicy::Additive),
            "replace" => Some(MergePolicy::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base of the list/get/update/delete endpoints.
    pub base_url: String,
    /// Host accepting creates, when it differs from `base_url`.
    pub create_base_url: Option<String>,
    /// Path of the create endpoint, relative to the create host.
    pub create_path: String,
    /// Overlay store name; LMDB files go to `<db_name>.lmdb`.
    pub db_name: String,
    pub map_size: usize,
    pub page_size: usize,
    pub merge_policy: MergePolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fakestoreapi.com".to_string(),
            create_base_url: None,
            create_path: "products".to_string(),
            db_name: "catalog_overlay".to_string(),
            map_size: AppDbState::DEFAULT_MAP_SIZE,
            page_size: 8,
            merge_policy: MergePolicy::Additive,
        }
    }
}

impl CatalogConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, AppResponse> {
        serde_json::from_str(json)
            .map_err(|e| AppResponse::BadRequest(format!("Invalid catalog configuration: {e}")))
    }

    /// Defaults overridden by `CATALOG_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from any variable source. Unusable values are logged and skipped.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CATALOG_BASE_URL") {
            self.base_url = url;
        }
        if let Some(url) = lookup("CATALOG_CREATE_BASE_URL") {
            self.create_base_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(path) = lookup("CATALOG_CREATE_PATH") {
            self.create_path = path;
        }
        if let Some(name) = lookup("CATALOG_DB_NAME") {
            self.db_name = name;
        }
        if let Some(raw) = lookup("CATALOG_PAGE_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.page_size = size,
                _ => warn!("Ignoring CATALOG_PAGE_SIZE={raw:?}, keeping {}", self.page_size),
            }
        }
        if let Some(raw) = lookup("CATALOG_MERGE_POLICY") {
            match MergePolicy::parse(&raw) {
                Some(policy) => self.merge_policy = policy,
                None => warn!("Ignoring CATALOG_MERGE_POLICY={raw:?}, keeping {:?}", self.merge_policy),
            }
        }
        self
    }
}
