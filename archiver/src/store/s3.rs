//! S3 driver built on aws-sdk-s3. Archived segments are single gzip members
//! well below multipart territory, so this sticks to plain `put_object` with
//! a small bounded retry.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tokio::time::{Duration, sleep};

use super::{ObjectStore, StoreError};

const PUT_ATTEMPTS: u64 = 3;

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(
        bucket: impl Into<String>,
        region: String,
        endpoint: Option<String>,
    ) -> Self {
        let mut loader = aws_config::ConfigLoader::default()
            .credentials_provider(
                aws_config::environment::EnvironmentVariableCredentialsProvider::new(),
            )
            .region(aws_config::Region::new(region));
        if let Some(url) = endpoint {
            loader = loader.endpoint_url(url);
        }
        let conf = loader.load().await;
        Self {
            client: Client::new(&conf),
            bucket: bucket.into(),
        }
    }

    /// Wrap an already-configured client; used when the caller owns the AWS
    /// config lifecycle.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn upload(
        &self,
        body: Vec<u8>,
        key: &str,
        content_type: &str,
        compressed: bool,
    ) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut req = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .body(ByteStream::from(body.clone()));
            if compressed {
                req = req.content_encoding("gzip");
            }
            match req.send().await {
                Ok(_) => return Ok(()),
                Err(_e) if attempt < PUT_ATTEMPTS => {
                    sleep(Duration::from_millis(100 * attempt)).await;
                }
                Err(e) => return Err(StoreError::Backend(e.to_string())),
            }
        }
    }
}
