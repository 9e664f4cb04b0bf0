use std::collections::HashMap;

use aws_sdk_s3::Client;

use crate::detection::pipeline::{ImageStore, PipelineError};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("S3 error: {0}")]
    S3(String),
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    /// Key-value metadata attached to the object at upload time. The upload
    /// path stamps a `userid` entry; its absence means the object arrived
    /// some other way.
    pub async fn object_metadata(
        &self,
        s3_key: &str,
    ) -> Result<HashMap<String, String>, S3ServiceError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(result.metadata().cloned().unwrap_or_default())
    }

    pub async fn get_image(&self, s3_key: &str) -> Result<Vec<u8>, S3ServiceError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }
}

impl ImageStore for S3Service {
    async fn object_metadata(&self, key: &str) -> Result<HashMap<String, String>, PipelineError> {
        S3Service::object_metadata(self, key)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }

    async fn object_bytes(&self, key: &str) -> Result<Vec<u8>, PipelineError> {
        self.get_image(key)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }
}
