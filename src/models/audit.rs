use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RESOURCE_ASSET: &str = "asset";
pub const RESOURCE_ANALYSIS: &str = "analysis";

/// Actor recorded for mutations made by background workers.
pub const SYSTEM_ACTOR: &str = "system";

/// An append-only audit log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub action: &'static str,
    pub resource_type: &'static str,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl NewAuditEntry {
    pub fn analysis(actor: &str, action: &'static str, job_id: Uuid) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            resource_type: RESOURCE_ANALYSIS,
            resource_id: Some(job_id.to_string()),
            details: None,
        }
    }

    pub fn asset(actor: &str, action: &'static str, asset_tag: &str) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            resource_type: RESOURCE_ASSET,
            resource_id: Some(asset_tag.to_string()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub resource_type: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub limit: i64,
}

impl AuditFilter {
    pub fn normalized(mut self) -> Self {
        self.skip = self.skip.max(0);
        self.limit = if self.limit <= 0 { 50 } else { self.limit.min(100) };
        self
    }
}

/// Audit actions written by this service.
pub mod actions {
    pub const CREATE: &str = "CREATE";
    pub const UPDATE: &str = "UPDATE";
    pub const DELETE: &str = "DELETE";
    pub const LOCATION_UPDATE: &str = "LOCATION_UPDATE";
    pub const ANALYZE_REQUEST: &str = "ANALYZE_REQUEST";
    pub const ANALYZE_COMPLETE: &str = "ANALYZE_COMPLETE";
    pub const ANALYZE_FAILED: &str = "ANALYZE_FAILED";
    pub const ANALYZE_REPROCESS: &str = "ANALYZE_REPROCESS";
    pub const ASSET_AUTO_UPDATE: &str = "ASSET_AUTO_UPDATE";
}
