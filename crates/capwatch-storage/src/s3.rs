use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::traits::{ObjectSink, StorageError, StorageResult};

/// S3 object sink
#[derive(Clone)]
pub struct S3ObjectSink {
    store: AmazonS3,
    bucket: String,
    name: String,
}

impl S3ObjectSink {
    /// Create a new S3ObjectSink
    ///
    /// Credentials come from the environment; `region` overrides the
    /// environment's region when given.
    pub fn new(bucket: String, region: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket.clone());
        if let Some(region) = region {
            builder = builder.with_region(region);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3ObjectSink {
            store,
            name: format!("s3://{}", bucket),
            bucket,
        })
    }
}

fn put_options(content_type: &str, metadata: &BTreeMap<String, String>) -> PutOptions {
    let mut attributes = Attributes::new();
    attributes.insert(
        Attribute::ContentType,
        AttributeValue::from(content_type.to_string()),
    );
    for (key, value) in metadata {
        attributes.insert(
            Attribute::Metadata(Cow::Owned(key.clone())),
            AttributeValue::from(value.clone()),
        );
    }
    PutOptions {
        attributes,
        ..Default::default()
    }
}

#[async_trait]
impl ObjectSink for S3ObjectSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, data, metadata), fields(
        aws.service.name = "s3",
        aws.s3.bucket = %self.bucket,
        aws.s3.key = %key,
        aws.s3.operation = "PutObject",
        s3.size = %data.len()
    ))]
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<()> {
        let size = data.len() as u64;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), put_options(content_type, metadata))
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::WriteFailed(e.to_string())
        })?;

        tracing::debug!(
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(())
    }
}
