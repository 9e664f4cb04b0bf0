use std::collections::HashMap;

use log::{error, info, warn};
use shared::DetectionLabel;
use thiserror::Error;

use super::capture;
use super::classifier;
use super::event::S3Event;
use super::record::DetectionRecord;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("object storage error: {0}")]
    Storage(String),
    #[error("label detection error: {0}")]
    Detection(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Read access to the object store holding uploaded images.
pub trait ImageStore {
    async fn object_metadata(&self, key: &str) -> Result<HashMap<String, String>, PipelineError>;
    async fn object_bytes(&self, key: &str) -> Result<Vec<u8>, PipelineError>;
}

/// The external label-detection collaborator.
pub trait LabelDetector {
    async fn detect_labels(&self, key: &str) -> Result<Vec<DetectionLabel>, PipelineError>;
}

/// Write access for finished detection records.
pub trait DetectionSink {
    async fn put_detection(&self, record: &DetectionRecord) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Persisted { sort_key: String },
    /// The object carried no owner metadata, meaning it did not come through
    /// the expected upload path. Dropped without error.
    Skipped,
    Failed { reason: String },
}

#[derive(Clone)]
pub struct IngestionPipeline<S, L, D> {
    images: S,
    detector: L,
    sink: D,
}

impl<S: ImageStore, L: LabelDetector, D: DetectionSink> IngestionPipeline<S, L, D> {
    pub fn new(images: S, detector: L, sink: D) -> Self {
        Self {
            images,
            detector,
            sink,
        }
    }

    /// Processes every record in an event. One bad image never aborts the
    /// rest of the batch; its failure is logged and reported per key.
    pub async fn process_event(&self, event: &S3Event) -> Vec<(String, ImageOutcome)> {
        let mut outcomes = Vec::with_capacity(event.records.len());
        for event_record in &event.records {
            let key = event_record.decoded_key();
            let outcome = match self.process_image(&key).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Failed to process {}: {}", key, e);
                    ImageOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push((key, outcome));
        }
        outcomes
    }

    async fn process_image(&self, key: &str) -> Result<ImageOutcome, PipelineError> {
        let metadata = self.images.object_metadata(key).await?;
        let Some(owner) = metadata.get("userid") else {
            warn!("No userid metadata on {}, skipping", key);
            return Ok(ImageOutcome::Skipped);
        };

        let image_bytes = self.images.object_bytes(key).await?;
        let capture_date = capture::resolve_capture_date(&image_bytes);

        // One detection attempt per image. A failing detector must not lose
        // the image from the owner's view, so the record is persisted with
        // an empty label set instead.
        let labels = match self.detector.detect_labels(key).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(
                    "Label detection failed for {} ({}), saving record without labels",
                    key, e
                );
                Vec::new()
            }
        };

        let classification = classifier::classify(&labels);
        let record = DetectionRecord::build(owner, key, capture_date, labels, classification);
        self.sink.put_detection(&record).await?;

        info!(
            "Processed {} for {}: is_deer={}, confidence={}, capture_date={}",
            key, owner, record.is_deer, record.confidence, record.capture_date
        );
        Ok(ImageOutcome::Persisted {
            sort_key: record.sort_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::event::{S3Entity, S3EventRecord, S3ObjectRef};
    use std::sync::Mutex;

    struct FakeImageStore {
        // key -> owner metadata; None models an object without a userid entry
        objects: HashMap<String, Option<String>>,
    }

    impl FakeImageStore {
        fn new(objects: &[(&str, Option<&str>)]) -> Self {
            Self {
                objects: objects
                    .iter()
                    .map(|(key, owner)| (key.to_string(), owner.map(str::to_string)))
                    .collect(),
            }
        }
    }

    impl ImageStore for &FakeImageStore {
        async fn object_metadata(
            &self,
            key: &str,
        ) -> Result<HashMap<String, String>, PipelineError> {
            let owner = self
                .objects
                .get(key)
                .ok_or_else(|| PipelineError::Storage(format!("no such object: {key}")))?;
            let mut metadata = HashMap::new();
            if let Some(owner) = owner {
                metadata.insert("userid".to_string(), owner.clone());
            }
            Ok(metadata)
        }

        async fn object_bytes(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
            if self.objects.contains_key(key) {
                Ok(b"not a real jpeg".to_vec())
            } else {
                Err(PipelineError::Storage(format!("no such object: {key}")))
            }
        }
    }

    struct FakeDetector {
        response: Result<Vec<DetectionLabel>, String>,
    }

    impl LabelDetector for &FakeDetector {
        async fn detect_labels(&self, _key: &str) -> Result<Vec<DetectionLabel>, PipelineError> {
            self.response
                .clone()
                .map_err(PipelineError::Detection)
        }
    }

    #[derive(Default)]
    struct FakeSink {
        records: Mutex<Vec<DetectionRecord>>,
        fail_for: Option<String>,
    }

    impl DetectionSink for &FakeSink {
        async fn put_detection(&self, record: &DetectionRecord) -> Result<(), PipelineError> {
            if self.fail_for.as_deref() == Some(record.image_key.as_str()) {
                return Err(PipelineError::Persistence("table unavailable".to_string()));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn event(keys: &[&str]) -> S3Event {
        S3Event {
            records: keys
                .iter()
                .map(|key| S3EventRecord {
                    s3: S3Entity {
                        object: S3ObjectRef {
                            key: key.to_string(),
                        },
                    },
                })
                .collect(),
        }
    }

    #[actix_web::test]
    async fn missing_owner_skips_one_image_without_poisoning_the_batch() {
        let store = FakeImageStore::new(&[
            ("uploads/aaa11111-one.jpg", Some("user-1")),
            ("uploads/bbb22222-two.jpg", None),
            ("uploads/ccc33333-three.jpg", Some("user-1")),
        ]);
        let detector = FakeDetector {
            response: Ok(vec![DetectionLabel::new("deer", 82)]),
        };
        let sink = FakeSink::default();
        let pipeline = IngestionPipeline::new(&store, &detector, &sink);

        let outcomes = pipeline
            .process_event(&event(&[
                "uploads/aaa11111-one.jpg",
                "uploads/bbb22222-two.jpg",
                "uploads/ccc33333-three.jpg",
            ]))
            .await;

        assert!(matches!(outcomes[0].1, ImageOutcome::Persisted { .. }));
        assert_eq!(outcomes[1].1, ImageOutcome::Skipped);
        assert!(matches!(outcomes[2].1, ImageOutcome::Persisted { .. }));

        let records = sink.records.lock().unwrap();
        let stored_keys: Vec<&str> = records.iter().map(|r| r.image_key.as_str()).collect();
        assert_eq!(
            stored_keys,
            vec!["uploads/aaa11111-one.jpg", "uploads/ccc33333-three.jpg"]
        );
    }

    #[actix_web::test]
    async fn detector_failure_still_persists_an_unlabeled_record() {
        let store = FakeImageStore::new(&[("uploads/aaa11111-one.jpg", Some("user-1"))]);
        let detector = FakeDetector {
            response: Err("throttled".to_string()),
        };
        let sink = FakeSink::default();
        let pipeline = IngestionPipeline::new(&store, &detector, &sink);

        let outcomes = pipeline
            .process_event(&event(&["uploads/aaa11111-one.jpg"]))
            .await;
        assert!(matches!(outcomes[0].1, ImageOutcome::Persisted { .. }));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].labels.is_empty());
        assert!(records[0].deer_labels.is_empty());
        assert_eq!(records[0].confidence, 0);
        assert!(!records[0].is_deer);
    }

    #[actix_web::test]
    async fn persistence_failure_is_contained_to_its_own_image() {
        let store = FakeImageStore::new(&[
            ("uploads/aaa11111-one.jpg", Some("user-1")),
            ("uploads/bbb22222-two.jpg", Some("user-2")),
        ]);
        let detector = FakeDetector {
            response: Ok(Vec::new()),
        };
        let sink = FakeSink {
            records: Mutex::new(Vec::new()),
            fail_for: Some("uploads/aaa11111-one.jpg".to_string()),
        };
        let pipeline = IngestionPipeline::new(&store, &detector, &sink);

        let outcomes = pipeline
            .process_event(&event(&[
                "uploads/aaa11111-one.jpg",
                "uploads/bbb22222-two.jpg",
            ]))
            .await;

        assert!(matches!(outcomes[0].1, ImageOutcome::Failed { .. }));
        assert!(matches!(outcomes[1].1, ImageOutcome::Persisted { .. }));
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn classifier_output_flows_into_the_record() {
        let store = FakeImageStore::new(&[("uploads/aaa11111-one.jpg", Some("user-1"))]);
        let detector = FakeDetector {
            response: Ok(vec![
                DetectionLabel::new("deer", 82),
                DetectionLabel::new("tree", 97),
                DetectionLabel::new("wildlife", 91),
            ]),
        };
        let sink = FakeSink::default();
        let pipeline = IngestionPipeline::new(&store, &detector, &sink);

        pipeline
            .process_event(&event(&["uploads/aaa11111-one.jpg"]))
            .await;

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].owner, "user-1");
        assert_eq!(records[0].labels.len(), 3);
        assert_eq!(records[0].deer_labels.len(), 2);
        assert_eq!(records[0].confidence, 91);
        assert!(records[0].is_deer);
        assert!(!records[0].is_verified);
    }
}
