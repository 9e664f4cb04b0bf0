use aws_sdk_rekognition::Client;
use aws_sdk_rekognition::types::{Image, S3Object};
use log::debug;
use shared::DetectionLabel;

use crate::detection::classifier::MIN_CONFIDENCE;
use crate::detection::pipeline::{LabelDetector, PipelineError};

/// Upper bound on labels requested per image; the service also filters
/// server-side to the shared confidence floor.
const MAX_LABELS: i32 = 20;

#[derive(Clone)]
pub struct RekognitionService {
    client: Client,
    bucket_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LabelServiceError {
    #[error("Rekognition error: {0}")]
    Rekognition(String),
}

impl RekognitionService {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    /// One DetectLabels call against the stored object. Labels come back
    /// with fractional confidences; they are rounded to integer percent.
    pub async fn detect_labels(
        &self,
        s3_key: &str,
    ) -> Result<Vec<DetectionLabel>, LabelServiceError> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&self.bucket_name)
                    .name(s3_key)
                    .build(),
            )
            .build();

        let response = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(MAX_LABELS)
            .min_confidence(MIN_CONFIDENCE as f32)
            .send()
            .await
            .map_err(|e| LabelServiceError::Rekognition(e.to_string()))?;

        let labels: Vec<DetectionLabel> = response
            .labels()
            .iter()
            .map(|label| DetectionLabel {
                name: label.name().unwrap_or("Unknown").to_string(),
                confidence: label.confidence().unwrap_or(0.0).round().clamp(0.0, 100.0) as u8,
            })
            .collect();

        debug!("Rekognition returned {} labels for {}", labels.len(), s3_key);
        Ok(labels)
    }
}

impl LabelDetector for RekognitionService {
    async fn detect_labels(&self, key: &str) -> Result<Vec<DetectionLabel>, PipelineError> {
        RekognitionService::detect_labels(self, key)
            .await
            .map_err(|e| PipelineError::Detection(e.to_string()))
    }
}
