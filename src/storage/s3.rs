use crate::error::{ArchiverError, Result};
use crate::storage::ObjectSink;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

/// Uploads artifacts to an S3 bucket, one `PutObject` per key.
pub struct S3Sink {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Sink {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Build a client for `region`, with explicit credentials or the default AWS chain.
    pub async fn connect(
        bucket: String,
        prefix: String,
        region: String,
        credentials: Option<(String, String)>,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));

        if let Some((access_key_id, secret_access_key)) = credentials {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "slack-archiver",
            ));
        }

        let config = loader.load().await;
        tracing::info!(bucket = %bucket, prefix = %prefix, "S3 sink configured");

        Self::new(Client::new(&config), bucket, prefix)
    }
}

fn object_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

impl ObjectSink for S3Sink {
    async fn put(&self, key: &str, body: String) -> Result<()> {
        let object_key = object_key(&self.prefix, key);
        let bytes = body.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type("application/json")
            .body(ByteStream::from(body.into_bytes()))
            .send()
            .await
            .map_err(|e| ArchiverError::storage(&object_key, DisplayErrorContext(&e)))?;

        tracing::debug!(bucket = %self.bucket, key = %object_key, bytes, "Uploaded artifact");
        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}", object_key(&self.bucket, &self.prefix).trim_end_matches('/'))
    }
}
