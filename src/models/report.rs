use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Asset counts grouped by each categorical field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub total_assets: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_condition: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_location: BTreeMap<String, i64>,
    pub last_updated: DateTime<Utc>,
}
