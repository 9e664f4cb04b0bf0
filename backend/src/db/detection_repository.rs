use std::collections::HashMap;

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use shared::{DetectionLabel, VerifyDetectionResponse};

use crate::detection::pipeline::{DetectionSink, PipelineError};
use crate::detection::record::{DetectionRecord, SORT_KEY_PREFIX, iso_timestamp};

/// Partition marker shared by every record on the global time-ordered index.
const GSI1_PARTITION: &str = "DETECTIONS";

#[derive(Clone)]
pub struct DetectionRepository {
    client: Client,
    table_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Detection not found")]
    NotFound,
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

impl DetectionRepository {
    pub fn new(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    /// Unconditional create. Sort keys are collision-free by construction,
    /// so a replay of the same event overwrites the item with identical
    /// content rather than duplicating it.
    pub async fn put_detection(&self, record: &DetectionRecord) -> Result<(), RepositoryError> {
        let item = record_to_item(record)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| {
                error!(
                    "DynamoDB put_item failed for {}: {:?}",
                    record.sort_key, e
                );
                RepositoryError::DynamoDb(e.to_string())
            })?;
        info!("Detection {} stored for {}", record.sort_key, record.owner);
        Ok(())
    }

    /// Applies a user correction to the deer verdict. The write is guarded
    /// by an existence condition so verifying a record that was never
    /// written surfaces as NotFound instead of creating a partial item.
    /// Confidence and label attributes are deliberately left untouched.
    pub async fn verify_detection(
        &self,
        owner: &str,
        detection_id: &str,
        is_verified: bool,
        is_deer: bool,
    ) -> Result<VerifyDetectionResponse, RepositoryError> {
        let sort_key = format!("{SORT_KEY_PREFIX}{detection_id}");
        let mut key = HashMap::new();
        key.insert("PK".to_string(), AttributeValue::S(partition_key(owner)));
        key.insert("SK".to_string(), AttributeValue::S(sort_key.clone()));

        let (update_expression, values) = verification_update(is_verified, is_deer, Utc::now());

        match self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(key))
            .update_expression(update_expression)
            .set_expression_attribute_values(Some(values))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await
        {
            Ok(_) => {
                info!(
                    "Detection {} verified for {}: is_deer={}",
                    sort_key, owner, is_deer
                );
                Ok(VerifyDetectionResponse {
                    updated: true,
                    sort_key,
                    is_verified,
                    is_deer,
                })
            }
            Err(e) => {
                let condition_failed = e
                    .as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false);
                if condition_failed {
                    Err(RepositoryError::NotFound)
                } else {
                    error!(
                        "DynamoDB update_item failed for {} ({}): {:?}",
                        sort_key, owner, e
                    );
                    Err(RepositoryError::DynamoDb(e.to_string()))
                }
            }
        }
    }

    /// Newest-first listing of one owner's detections.
    pub async fn list_detections(
        &self,
        owner: &str,
    ) -> Result<Vec<DetectionRecord>, RepositoryError> {
        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(partition_key(owner)))
            .expression_attribute_values(
                ":sk_prefix",
                AttributeValue::S(SORT_KEY_PREFIX.to_string()),
            )
            .scan_index_forward(false)
            .send()
            .await
            .map_err(|e| {
                error!("DynamoDB query failed for {}: {:?}", owner, e);
                RepositoryError::DynamoDb(e.to_string())
            })?;

        result
            .items()
            .iter()
            .map(parse_detection_from_item)
            .collect()
    }
}

impl DetectionSink for DetectionRepository {
    async fn put_detection(&self, record: &DetectionRecord) -> Result<(), PipelineError> {
        DetectionRepository::put_detection(self, record)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))
    }
}

fn partition_key(owner: &str) -> String {
    format!("USER#{owner}")
}

/// Verification touches exactly three attributes; the evidence written at
/// ingestion time (labels, confidence) stays as-is.
fn verification_update(
    is_verified: bool,
    is_deer: bool,
    verified_at: DateTime<Utc>,
) -> (String, HashMap<String, AttributeValue>) {
    let mut values = HashMap::new();
    values.insert(":v".to_string(), AttributeValue::Bool(is_verified));
    values.insert(":d".to_string(), AttributeValue::Bool(is_deer));
    values.insert(
        ":ts".to_string(),
        AttributeValue::S(iso_timestamp(&verified_at)),
    );
    (
        "SET is_verified = :v, is_deer = :d, verified_at = :ts".to_string(),
        values,
    )
}

fn record_to_item(
    record: &DetectionRecord,
) -> Result<HashMap<String, AttributeValue>, RepositoryError> {
    debug!("Converting detection {} to attributes", record.sort_key);
    let capture_date = iso_timestamp(&record.capture_date);

    let mut item = HashMap::new();
    item.insert(
        "PK".to_string(),
        AttributeValue::S(partition_key(&record.owner)),
    );
    item.insert("SK".to_string(), AttributeValue::S(record.sort_key.clone()));
    item.insert(
        "image_key".to_string(),
        AttributeValue::S(record.image_key.clone()),
    );
    item.insert(
        "capture_date".to_string(),
        AttributeValue::S(capture_date.clone()),
    );
    item.insert(
        "labels".to_string(),
        AttributeValue::S(serde_json::to_string(&record.labels)?),
    );
    item.insert(
        "deer_labels".to_string(),
        AttributeValue::S(serde_json::to_string(&record.deer_labels)?),
    );
    item.insert(
        "confidence".to_string(),
        AttributeValue::N(record.confidence.to_string()),
    );
    item.insert("is_deer".to_string(), AttributeValue::Bool(record.is_deer));
    item.insert(
        "is_verified".to_string(),
        AttributeValue::Bool(record.is_verified),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(iso_timestamp(&record.created_at)),
    );
    if let Some(verified_at) = &record.verified_at {
        item.insert(
            "verified_at".to_string(),
            AttributeValue::S(iso_timestamp(verified_at)),
        );
    }
    item.insert(
        "GSI1PK".to_string(),
        AttributeValue::S(GSI1_PARTITION.to_string()),
    );
    item.insert("GSI1SK".to_string(), AttributeValue::S(capture_date));
    Ok(item)
}

fn parse_detection_from_item(
    item: &HashMap<String, AttributeValue>,
) -> Result<DetectionRecord, RepositoryError> {
    let string_attr = |name: &str| -> Result<&str, RepositoryError> {
        item.get(name)
            .and_then(|av| av.as_s().ok())
            .map(String::as_str)
            .ok_or_else(|| RepositoryError::InvalidData(format!("Missing {name} attribute")))
    };
    let bool_attr = |name: &str| -> Result<bool, RepositoryError> {
        item.get(name)
            .and_then(|av| av.as_bool().ok())
            .copied()
            .ok_or_else(|| RepositoryError::InvalidData(format!("Missing {name} attribute")))
    };
    let timestamp = |raw: &str| -> Result<DateTime<Utc>, RepositoryError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|e| RepositoryError::InvalidData(format!("Bad timestamp {raw}: {e}")))
    };

    let owner = string_attr("PK")?
        .strip_prefix("USER#")
        .ok_or_else(|| RepositoryError::InvalidData("Malformed PK attribute".to_string()))?
        .to_string();
    let labels: Vec<DetectionLabel> = serde_json::from_str(string_attr("labels")?)?;
    let deer_labels: Vec<DetectionLabel> = serde_json::from_str(string_attr("deer_labels")?)?;
    let confidence = item
        .get("confidence")
        .and_then(|av| av.as_n().ok())
        .and_then(|n| n.parse::<u8>().ok())
        .ok_or_else(|| RepositoryError::InvalidData("Missing confidence attribute".to_string()))?;
    let verified_at = match item.get("verified_at").and_then(|av| av.as_s().ok()) {
        Some(raw) => Some(timestamp(raw)?),
        None => None,
    };

    Ok(DetectionRecord {
        owner,
        sort_key: string_attr("SK")?.to_string(),
        image_key: string_attr("image_key")?.to_string(),
        capture_date: timestamp(string_attr("capture_date")?)?,
        labels,
        deer_labels,
        confidence,
        is_deer: bool_attr("is_deer")?,
        is_verified: bool_attr("is_verified")?,
        created_at: timestamp(string_attr("created_at")?)?,
        verified_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::classifier::classify;
    use chrono::TimeZone;

    fn sample_record() -> DetectionRecord {
        let labels = vec![
            DetectionLabel::new("deer", 82),
            DetectionLabel::new("tree", 95),
        ];
        DetectionRecord::build(
            "user-1",
            "uploads/9f8e7d6c-trail.jpg",
            Utc.with_ymd_and_hms(2023, 11, 4, 6, 12, 45).unwrap(),
            labels.clone(),
            classify(&labels),
        )
    }

    #[test]
    fn record_round_trips_through_attributes() {
        let record = sample_record();
        let item = record_to_item(&record).unwrap();
        let parsed = parse_detection_from_item(&item).unwrap();

        assert_eq!(parsed.owner, record.owner);
        assert_eq!(parsed.sort_key, record.sort_key);
        assert_eq!(parsed.image_key, record.image_key);
        assert_eq!(parsed.capture_date, record.capture_date);
        assert_eq!(parsed.labels, record.labels);
        assert_eq!(parsed.deer_labels, record.deer_labels);
        assert_eq!(parsed.confidence, record.confidence);
        assert_eq!(parsed.is_deer, record.is_deer);
        assert_eq!(parsed.is_verified, record.is_verified);
        assert!(parsed.verified_at.is_none());
    }

    #[test]
    fn item_carries_global_index_attributes() {
        let item = record_to_item(&sample_record()).unwrap();
        assert_eq!(
            item.get("GSI1PK").unwrap().as_s().unwrap(),
            GSI1_PARTITION
        );
        assert_eq!(
            item.get("GSI1SK").unwrap().as_s().unwrap(),
            "2023-11-04T06:12:45.000Z"
        );
        assert!(!item.contains_key("verified_at"));
    }

    #[test]
    fn verification_touches_only_verdict_attributes() {
        let verified_at = Utc.with_ymd_and_hms(2023, 11, 5, 9, 0, 0).unwrap();
        let (expression, values) = verification_update(true, false, verified_at);

        assert_eq!(
            expression,
            "SET is_verified = :v, is_deer = :d, verified_at = :ts"
        );
        assert!(!expression.contains("confidence"));
        assert!(!expression.contains("labels"));
        assert_eq!(values.len(), 3);
        assert_eq!(values.get(":v").unwrap().as_bool().unwrap(), &true);
        assert_eq!(values.get(":d").unwrap().as_bool().unwrap(), &false);
        assert_eq!(
            values.get(":ts").unwrap().as_s().unwrap(),
            "2023-11-05T09:00:00.000Z"
        );
    }

    #[test]
    fn partition_key_embeds_owner() {
        assert_eq!(partition_key("user-1"), "USER#user-1");
    }

    #[test]
    fn parse_rejects_items_missing_required_attributes() {
        let mut item = record_to_item(&sample_record()).unwrap();
        item.remove("capture_date");
        assert!(matches!(
            parse_detection_from_item(&item),
            Err(RepositoryError::InvalidData(_))
        ));
    }
}
