use chrono::{DateTime, SecondsFormat, Utc};
use shared::{DetectionLabel, DetectionView};

use super::classifier::Classification;

pub const SORT_KEY_PREFIX: &str = "DETECT#";

/// The durable outcome of classifying one uploaded image. Everything except
/// the verification fields is immutable after creation.
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    pub owner: String,
    pub sort_key: String,
    pub image_key: String,
    pub capture_date: DateTime<Utc>,
    pub labels: Vec<DetectionLabel>,
    pub deer_labels: Vec<DetectionLabel>,
    pub confidence: u8,
    pub is_deer: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl DetectionRecord {
    pub fn build(
        owner: &str,
        image_key: &str,
        capture_date: DateTime<Utc>,
        labels: Vec<DetectionLabel>,
        classification: Classification,
    ) -> Self {
        let timestamp = iso_timestamp(&capture_date);
        let sort_key = format!(
            "{SORT_KEY_PREFIX}{timestamp}#{}",
            sort_key_suffix(image_key)
        );
        Self {
            owner: owner.to_string(),
            sort_key,
            image_key: image_key.to_string(),
            capture_date,
            labels,
            deer_labels: classification.deer_labels,
            confidence: classification.confidence,
            is_deer: classification.is_deer,
            is_verified: false,
            created_at: Utc::now(),
            verified_at: None,
        }
    }

    pub fn to_view(&self) -> DetectionView {
        DetectionView {
            sort_key: self.sort_key.clone(),
            image_key: self.image_key.clone(),
            capture_date: iso_timestamp(&self.capture_date),
            labels: self.labels.clone(),
            deer_labels: self.deer_labels.clone(),
            confidence: self.confidence,
            is_deer: self.is_deer,
            is_verified: self.is_verified,
            created_at: iso_timestamp(&self.created_at),
            verified_at: self.verified_at.as_ref().map(iso_timestamp),
        }
    }
}

/// Millisecond-precision ISO-8601 with a trailing Z. This doubles as the
/// sortable axis of the sort key, so the format must stay fixed-width and
/// lexicographically ordered.
pub fn iso_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Upload keys look like `uploads/<uuid>-<original filename>`. The first
/// hyphen-delimited group of the filename is unique per upload and keeps two
/// images sharing a capture timestamp from colliding on the sort key.
fn sort_key_suffix(image_key: &str) -> &str {
    image_key
        .rsplit('/')
        .next()
        .and_then(|filename| filename.split('-').next())
        .unwrap_or("")
}
