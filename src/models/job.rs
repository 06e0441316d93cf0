use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a photo analysis job in the async queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Classification of a failed remote analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Network, timeout or rate limiting. Worth retrying.
    Transient,
    /// Bad input, unsupported content, or rejected credentials.
    Permanent,
    /// The model answered with something we could not interpret.
    MalformedResponse,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        self == FailureKind::Transient
    }
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }
}

/// A piece of equipment recognised in the photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedEquipment {
    #[serde(rename = "type")]
    pub equipment_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_weight: Option<String>,
    pub condition: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Canonical result of a completed analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub detected_tags: Vec<String>,
    pub equipment: Vec<DetectedEquipment>,
    pub image_quality: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    pub confidence_score: f64,
}

/// Terminal outcome written when a job leaves `Processing`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed(AnalysisResult),
    Failed(JobError),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

/// A photo analysis job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub image_key: String,
    pub asset_tag: Option<String>,
    pub original_filename: Option<String>,
    pub result: Option<AnalysisResult>,
    pub error: Option<JobError>,
    pub retry_count: i32,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
}

/// Fields supplied when a job is first recorded.
#[derive(Debug, Clone)]
pub struct NewAnalysisJob {
    pub id: Uuid,
    pub image_key: String,
    pub asset_tag: Option<String>,
    pub original_filename: Option<String>,
}

/// Filters for the history listing.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<JobStatus>,
    pub asset_tag: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

impl HistoryFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamp paging and normalise the tag the way assets store it.
    pub fn normalized(mut self) -> Self {
        self.skip = self.skip.max(0);
        self.limit = if self.limit <= 0 {
            Self::DEFAULT_LIMIT
        } else {
            self.limit.min(Self::MAX_LIMIT)
        };
        self.asset_tag = self
            .asset_tag
            .as_deref()
            .and_then(crate::models::asset::normalize_tag);
        self
    }
}

/// Result of an attempt to move a failed job back to `Pending`.
#[derive(Debug, Clone)]
pub enum ReprocessOutcome {
    Reset(AnalysisJob),
    NotFound,
    WrongState(JobStatus),
    RetryExceeded { retry_count: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_text_roundtrip() {
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::from_str("failed").unwrap(), JobStatus::Failed);
        assert!(JobStatus::from_str("unknown").is_err());
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(JobError::new(FailureKind::Transient, "timeout").retryable);
        assert!(!JobError::new(FailureKind::Permanent, "401").retryable);
        assert!(!JobError::new(FailureKind::MalformedResponse, "junk").retryable);
    }

    #[test]
    fn test_history_filter_clamps_paging() {
        let filter = HistoryFilter {
            skip: -3,
            limit: 500,
            asset_tag: Some("  db-25 ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(filter.skip, 0);
        assert_eq!(filter.limit, HistoryFilter::MAX_LIMIT);
        assert_eq!(filter.asset_tag.as_deref(), Some("DB-25"));

        let filter = HistoryFilter::default().normalized();
        assert_eq!(filter.limit, HistoryFilter::DEFAULT_LIMIT);
    }

    #[test]
    fn test_equipment_serializes_type_field() {
        let item = DetectedEquipment {
            equipment_type: "dumbbell".to_string(),
            estimated_weight: Some("25 lbs".to_string()),
            condition: "good".to_string(),
            confidence: 0.8,
            description: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "dumbbell");
        assert!(value.get("description").is_none());
    }
}
