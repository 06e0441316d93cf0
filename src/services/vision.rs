use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::job::FailureKind;

const ANALYSIS_PROMPT: &str = r#"You are an expert gym equipment analyzer. Analyze this image and identify:

1. Any asset tags, labels, barcodes, or identification codes on equipment
2. All gym equipment visible with their weights/specifications
3. Equipment condition if visible

Return a JSON response with this exact structure:
{
  "asset_tags": [
    {
      "tag": "asset_tag_text",
      "confidence": 0.95,
      "location_description": "where on the equipment"
    }
  ],
  "equipment": [
    {
      "type": "dumbbell/barbell_plate/kettlebell/medicine_ball/resistance_band/cable_attachment/bench/other",
      "weight": "25 lbs" or "unknown",
      "description": "detailed description",
      "condition": "excellent/good/fair/poor/unknown",
      "suggested_asset_tag": "suggested tag if no tag visible",
      "location_in_image": "description of location in image"
    }
  ],
  "image_quality": "excellent/good/fair/poor",
  "total_items": 0,
  "recommendations": "any suggestions for better detection"
}

Be thorough but concise. If you see multiple identical items (like a rack of dumbbells), list each separately.
For asset tags, look for any text/codes that could be used for tracking - stickers, engraved text, barcodes, etc.
For equipment, be specific about weights and types."#;

/// Remote model that turns a photo into loosely structured JSON.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image_jpeg: &[u8]) -> Result<serde_json::Value, VisionError>;
}

/// Client for an OpenAI-compatible chat completions endpoint with image input.
pub struct OpenAiVisionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiVisionClient {
    async fn analyze(&self, image_jpeg: &[u8]) -> Result<serde_json::Value, VisionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let data_url = format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image_jpeg)
        );

        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": ANALYSIS_PROMPT},
                    {"type": "image_url", "image_url": {"url": data_url, "detail": "high"}}
                ]
            }],
            "max_tokens": 1500,
            "temperature": 0.1
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(VisionError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, truncate(&message, 300)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| VisionError::Malformed("response has no message content".to_string()))?;

        extract_json(&content)
    }
}

/// Parse the outermost `{ ... }` span of a chat reply, which may be wrapped
/// in prose or a code fence.
pub fn extract_json(content: &str) -> Result<serde_json::Value, VisionError> {
    let start = content.find('{');
    let end = content.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&content[s..=e])
            .map_err(|e| VisionError::Malformed(format!("invalid JSON in reply: {e}"))),
        _ => Err(VisionError::Malformed("no JSON object in reply".to_string())),
    }
}

/// Map a non-success HTTP status onto the failure taxonomy.
pub fn classify_status(status: StatusCode, message: String) -> VisionError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => VisionError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VisionError::Unauthorized,
        StatusCode::REQUEST_TIMEOUT => VisionError::Timeout,
        s if s.is_server_error() => VisionError::Upstream {
            status: s.as_u16(),
            message,
        },
        s => VisionError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Vision request timed out")]
    Timeout,

    #[error("Vision service rate limited the request")]
    RateLimited,

    #[error("Vision request failed: {0}")]
    Network(String),

    #[error("Vision service rejected the credentials")]
    Unauthorized,

    #[error("Vision service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Vision service error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Unparseable vision response: {0}")]
    Malformed(String),
}

impl VisionError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VisionError::Timeout
        } else {
            VisionError::Network(e.to_string())
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            VisionError::Timeout
            | VisionError::RateLimited
            | VisionError::Network(_)
            | VisionError::Upstream { .. } => FailureKind::Transient,
            VisionError::Unauthorized | VisionError::Rejected { .. } => FailureKind::Permanent,
            VisionError::Malformed(_) => FailureKind::MalformedResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let kind = |code: u16| {
            classify_status(StatusCode::from_u16(code).unwrap(), String::new()).failure_kind()
        };

        assert_eq!(kind(408), FailureKind::Transient);
        assert_eq!(kind(429), FailureKind::Transient);
        assert_eq!(kind(500), FailureKind::Transient);
        assert_eq!(kind(503), FailureKind::Transient);
        assert_eq!(kind(400), FailureKind::Permanent);
        assert_eq!(kind(401), FailureKind::Permanent);
        assert_eq!(kind(403), FailureKind::Permanent);
        assert_eq!(kind(413), FailureKind::Permanent);
        assert_eq!(kind(422), FailureKind::Permanent);
    }

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"image_quality\": \"good\"}\n```";
        let value = extract_json(reply).unwrap();
        assert_eq!(value["image_quality"], "good");
    }

    #[test]
    fn test_extract_json_without_object() {
        let err = extract_json("I cannot see any equipment.").unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::MalformedResponse);
    }

    #[test]
    fn test_extract_json_with_broken_object() {
        let err = extract_json("{\"equipment\": [}").unwrap_err();
        assert!(matches!(err, VisionError::Malformed(_)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
