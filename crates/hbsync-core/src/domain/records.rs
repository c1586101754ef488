//! Library records handed to the storage collaborator
//!
//! These are port-level DTOs decomposed from one batch response. They carry
//! no behavior beyond what the categorizer and data syncer need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::Gamekey;

/// One purchase (order) in the user's library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub gamekey: Gamekey,
    pub name: String,
    pub machine_name: Option<String>,
    /// Product category reported by the platform (`bundle`, `storefront`, `subscriptioncontent`, ...)
    pub bundle_type: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub amount_spent: Option<f64>,
    pub currency: Option<String>,
}

/// One product (subproduct) delivered by a purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Stable identifier derived from the gamekey and machine name
    pub id: String,
    pub gamekey: Gamekey,
    pub machine_name: String,
    pub name: String,
    pub developer: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub is_subscription: bool,
    pub tags: Vec<String>,
}

/// One downloadable file of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub product_id: String,
    pub platform: String,
    pub name: String,
    pub file_name: Option<String>,
    pub size_bytes: Option<u64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub url: Option<String>,
}

/// Category label assigned to a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub category: String,
    pub subcategory: Option<String>,
    /// 0.0 to 1.0
    pub confidence: f32,
}

impl Categorization {
    pub const UNCATEGORIZED: &'static str = "uncategorized";

    pub fn new(category: impl Into<String>, subcategory: Option<String>, confidence: f32) -> Self {
        Self {
            category: category.into(),
            subcategory,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The fallback result when no category applies or categorization fails
    pub fn uncategorized() -> Self {
        Self::new(Self::UNCATEGORIZED, None, 0.0)
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == Self::UNCATEGORIZED
    }
}
