use serde::Deserialize;

/// The subset of an S3 event notification payload this service consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub object: S3ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ObjectRef {
    pub key: String,
}

impl S3EventRecord {
    /// Object keys arrive URL-encoded with spaces folded into `+`.
    pub fn decoded_key(&self) -> String {
        let normalized = self.s3.object.key.replace('+', " ");
        urlencoding::decode(&normalized)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| normalized.clone())
    }
}
