//! Thin wrapper around `aws-sdk-s3`, narrowed to exactly what the pipeline
//! needs: put one object with server-side encryption and mint a presigned
//! GET url for it

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use shiftcall_core::prelude::*;
use std::time::Duration;

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn presigned_get_url(&self, bucket: &str, key: &str, valid_for: Duration) -> Result<String>;
}

pub struct S3ObjectStoreClient {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStoreClient {
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::from_env().region(aws_sdk_s3::config::Region::new(region.to_string())).load().await;
        Self { client: aws_sdk_s3::Client::new(&config) }
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStoreClient {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .server_side_encryption(aws_sdk_s3::types::ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| OrchestratorError::transient(format!("s3 put_object: {e}")))?;
        Ok(())
    }

    async fn presigned_get_url(&self, bucket: &str, key: &str, valid_for: Duration) -> Result<String> {
        let presign_config = PresigningConfig::expires_in(valid_for)
            .map_err(|e| OrchestratorError::config(format!("invalid presign duration: {e}")))?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| OrchestratorError::transient(format!("s3 presign: {e}")))?;
        Ok(presigned.uri().to_string())
    }
}
