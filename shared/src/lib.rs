use serde::{Deserialize, Serialize};

/// One (name, confidence) pair from the label-detection service.
/// Confidence is rounded to the nearest integer percent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DetectionLabel {
    pub name: String,
    pub confidence: u8,
}

impl DetectionLabel {
    pub fn new(name: impl Into<String>, confidence: u8) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyDetectionRequest {
    pub is_verified: bool,
    pub is_deer: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyDetectionResponse {
    pub updated: bool,
    pub sort_key: String,
    pub is_verified: bool,
    pub is_deer: bool,
}

/// Owner-facing view of a persisted detection, as returned by the list endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectionView {
    pub sort_key: String,
    pub image_key: String,
    pub capture_date: String,
    pub labels: Vec<DetectionLabel>,
    pub deer_labels: Vec<DetectionLabel>,
    pub confidence: u8,
    pub is_deer: bool,
    pub is_verified: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectionListResponse {
    pub detections: Vec<DetectionView>,
}
