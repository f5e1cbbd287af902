//! Represents a lost-and-found item and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Lifecycle status of an item.
///
/// `Active` items are waiting to be picked up. `Collected` is terminal.
/// `Archived` is only ever reached from `Active` through the time-based rule.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Collected,
    Archived,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 3] = [Self::Active, Self::Collected, Self::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Collected => "collected",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| "status must be one of: active, collected, archived".to_string())
    }
}

/// Coarse item category. Unspecified categories fall back to `Other`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Clothing,
    Accessories,
    Books,
    Bags,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Electronics,
        Self::Clothing,
        Self::Accessories,
        Self::Books,
        Self::Bags,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Clothing => "clothing",
            Self::Accessories => "accessories",
            Self::Books => "books",
            Self::Bags => "bags",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| {
                "category must be one of: electronics, clothing, accessories, books, bags, other"
                    .to_string()
            })
    }
}

/// A single found item.
///
/// The record only references its photo; `image_path` is always relative to
/// the upload root (e.g. `uploads/image-1718000000000-ab12.jpg`).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Identifier assigned at creation.
    pub id: Uuid,

    /// Free-text description (at most 500 characters).
    pub description: String,

    /// Where the item was found (at most 200 characters).
    pub found_location: String,

    /// Where the owner can pick the item up (at most 200 characters).
    pub collection_location: String,

    pub category: Category,

    /// Free-text tags, stored as a JSON array.
    #[sqlx(json)]
    pub tags: Vec<String>,

    pub image_path: String,

    pub status: ItemStatus,

    /// Name given by whoever picked the item up.
    pub collected_by: Option<String>,

    pub collected_at: Option<DateTime<Utc>>,

    /// Account that registered the item.
    pub uploaded_by: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// An item as returned to callers, with the uploader's display name resolved.
#[derive(Serialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: Item,

    /// Username of `item.uploaded_by`, if the account still exists.
    pub uploader_name: Option<String>,
}
