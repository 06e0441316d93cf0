use serde_json::{Map, Value};

use crate::models::job::{AnalysisResult, DetectedEquipment};

const RECOGNISED_KEYS: &[&str] = &[
    "asset_tags",
    "detected_tags",
    "equipment",
    "image_quality",
    "recommendations",
];

/// Weight reported when the model could not read one.
const UNKNOWN: &str = "unknown";

/// Score an image quality label the model reported.
pub fn quality_score(label: &str) -> f64 {
    match label {
        "excellent" => 1.0,
        "good" => 0.8,
        "fair" => 0.6,
        "poor" => 0.3,
        _ => 0.5,
    }
}

/// Map the vision model's JSON into the canonical result, tolerating
/// missing optional fields.
pub fn normalize_response(raw: &Value) -> Result<AnalysisResult, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
    if !RECOGNISED_KEYS.iter().any(|k| obj.contains_key(*k)) {
        return Err(NormalizeError::UnrecognisedShape);
    }

    let image_quality = match obj.get("image_quality") {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_lowercase(),
        Some(Value::String(_)) => UNKNOWN.to_string(),
        Some(_) => return Err(NormalizeError::WrongType("image_quality")),
    };
    let default_confidence = quality_score(&image_quality);

    let (detected_tags, tag_confidences) = parse_tags(obj)?;
    let equipment = parse_equipment(obj, default_confidence)?;

    let recommendations = match obj.get("recommendations") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined).filter(|s| !s.is_empty())
        }
        Some(_) => return Err(NormalizeError::WrongType("recommendations")),
    };

    let mut scores = tag_confidences;
    scores.push(default_confidence);
    if !equipment.is_empty() {
        scores.push(0.8);
    }
    let confidence_score = scores.iter().sum::<f64>() / scores.len() as f64;

    Ok(AnalysisResult {
        detected_tags,
        equipment,
        image_quality,
        recommendations,
        confidence_score,
    })
}

fn parse_tags(obj: &Map<String, Value>) -> Result<(Vec<String>, Vec<f64>), NormalizeError> {
    let (key, value) = match (obj.get("asset_tags"), obj.get("detected_tags")) {
        (Some(v), _) => ("asset_tags", v),
        (None, Some(v)) => ("detected_tags", v),
        (None, None) => return Ok((Vec::new(), Vec::new())),
    };
    let items = match value {
        Value::Null => return Ok((Vec::new(), Vec::new())),
        Value::Array(items) => items,
        _ => return Err(NormalizeError::WrongType(key)),
    };

    let mut tags: Vec<String> = Vec::new();
    let mut confidences = Vec::new();
    for item in items {
        let (text, confidence) = match item {
            Value::String(s) => (s.as_str(), None),
            Value::Object(o) => match o.get("tag").and_then(Value::as_str) {
                Some(s) => (s, o.get("confidence").and_then(Value::as_f64)),
                None => continue,
            },
            _ => continue,
        };
        let text = text.trim();
        if text.is_empty() || tags.iter().any(|t| t == text) {
            continue;
        }
        tags.push(text.to_string());
        if let Some(c) = confidence {
            confidences.push(c.clamp(0.0, 1.0));
        }
    }
    Ok((tags, confidences))
}

fn parse_equipment(
    obj: &Map<String, Value>,
    default_confidence: f64,
) -> Result<Vec<DetectedEquipment>, NormalizeError> {
    let items = match obj.get("equipment") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(NormalizeError::WrongType("equipment")),
    };

    let text = |o: &Map<String, Value>, key: &str| {
        o.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(|o| DetectedEquipment {
            equipment_type: text(o, "type").unwrap_or_else(|| "other".to_string()),
            estimated_weight: text(o, "weight")
                .or_else(|| text(o, "estimated_weight"))
                .filter(|w| !w.eq_ignore_ascii_case(UNKNOWN)),
            condition: text(o, "condition")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            confidence: o
                .get("confidence")
                .and_then(Value::as_f64)
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(default_confidence),
            description: text(o, "description"),
        })
        .collect())
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NormalizeError {
    #[error("Vision response is not a JSON object")]
    NotAnObject,

    #[error("Vision response has none of the expected fields")]
    UnrecognisedShape,

    #[error("Vision response field '{0}' has an unexpected type")]
    WrongType(&'static str),
}
