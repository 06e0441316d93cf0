use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::job::DetectedEquipment;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum AssetStatus {
    #[default]
    Active,
    Missing,
    #[serde(rename = "Out of Service")]
    #[strum(serialize = "Out of Service")]
    OutOfService,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum AssetCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
    #[serde(rename = "Needs Repair")]
    #[strum(serialize = "Needs Repair")]
    NeedsRepair,
}

impl AssetCondition {
    /// Map a condition label reported by the vision model. Only the four
    /// grades the model is asked for are accepted.
    pub fn from_detected(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "excellent" => Some(Self::Excellent),
            "good" => Some(Self::Good),
            "fair" => Some(Self::Fair),
            "poor" => Some(Self::Poor),
            _ => None,
        }
    }
}

/// A tracked piece of gym equipment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub asset_tag: String,
    pub name: Option<String>,
    pub item_type: String,
    pub description: Option<String>,
    pub location: String,
    pub status: AssetStatus,
    pub condition: AssetCondition,
    pub weight: Option<String>,
    pub notes: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

/// Request body for creating an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewAsset {
    #[garde(length(min = 1, max = 64), custom(not_blank))]
    pub asset_tag: String,

    #[garde(length(max = 200))]
    pub name: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub item_type: String,

    #[garde(skip)]
    pub description: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub location: String,

    #[serde(default)]
    #[garde(skip)]
    pub status: AssetStatus,

    #[serde(default)]
    #[garde(skip)]
    pub condition: AssetCondition,

    #[garde(length(max = 100))]
    pub weight: Option<String>,

    #[garde(skip)]
    pub notes: Option<String>,

    #[garde(skip)]
    pub metadata: Option<serde_json::Value>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AssetUpdate {
    #[garde(length(max = 200))]
    pub name: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub item_type: Option<String>,

    #[garde(skip)]
    pub description: Option<String>,

    #[garde(length(min = 1, max = 200))]
    pub location: Option<String>,

    #[garde(skip)]
    pub status: Option<AssetStatus>,

    #[garde(skip)]
    pub condition: Option<AssetCondition>,

    #[garde(length(max = 100))]
    pub weight: Option<String>,

    #[garde(skip)]
    pub notes: Option<String>,

    #[garde(skip)]
    pub metadata: Option<serde_json::Value>,
}

impl AssetUpdate {
    pub fn apply_to(&self, asset: &mut Asset) {
        if let Some(v) = &self.name {
            asset.name = Some(v.clone());
        }
        if let Some(v) = &self.item_type {
            asset.item_type = v.clone();
        }
        if let Some(v) = &self.description {
            asset.description = Some(v.clone());
        }
        if let Some(v) = &self.location {
            asset.location = v.clone();
        }
        if let Some(v) = self.status {
            asset.status = v;
        }
        if let Some(v) = self.condition {
            asset.condition = v;
        }
        if let Some(v) = &self.weight {
            asset.weight = Some(v.clone());
        }
        if let Some(v) = &self.notes {
            asset.notes = Some(v.clone());
        }
        if let Some(v) = &self.metadata {
            asset.metadata = Some(v.clone());
        }
    }
}

impl Asset {
    /// Merge what the vision model saw into this record.
    pub fn absorb_detection(&mut self, detected: Option<&DetectedEquipment>, now: DateTime<Utc>) {
        self.last_seen = now;
        self.updated_at = now;

        let Some(item) = detected else {
            return;
        };
        if let Some(condition) = AssetCondition::from_detected(&item.condition) {
            self.condition = condition;
        }
        if self.weight.as_deref().map_or(true, str::is_empty) {
            if let Some(weight) = &item.estimated_weight {
                self.weight = Some(weight.clone());
            }
        }
        if self.description.as_deref().map_or(true, str::is_empty) {
            if let Some(description) = &item.description {
                self.description = Some(description.clone());
            }
        }
    }
}

/// Filters for the asset listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFilter {
    pub status: Option<AssetStatus>,
    pub condition: Option<AssetCondition>,
    pub item_type: Option<String>,
    /// Case-insensitive substring match
    pub location: Option<String>,
    /// Case-insensitive substring match over tag, name, description and location
    pub search: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub limit: i64,
}

impl AssetFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    pub fn normalized(mut self) -> Self {
        self.skip = self.skip.max(0);
        self.limit = if self.limit <= 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit.min(Self::MAX_LIMIT)
        };
        self
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        let contains = |haystack: &str, needle: &str| {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        };

        if self.status.is_some_and(|s| s != asset.status) {
            return false;
        }
        if self.condition.is_some_and(|c| c != asset.condition) {
            return false;
        }
        if let Some(t) = &self.item_type {
            if &asset.item_type != t {
                return false;
            }
        }
        if let Some(loc) = &self.location {
            if !contains(&asset.location, loc) {
                return false;
            }
        }
        if let Some(q) = &self.search {
            let hit = contains(&asset.asset_tag, q)
                || asset.name.as_deref().is_some_and(|n| contains(n, q))
                || asset.description.as_deref().is_some_and(|d| contains(d, q))
                || contains(&asset.location, q);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Trim and upper-case a tag; blank tags become `None`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_uppercase())
    }
}
