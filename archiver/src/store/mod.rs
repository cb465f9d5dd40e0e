//! Object store seam: durable writes of archived artifacts.

pub mod localfs;
pub mod s3;

use async_trait::async_trait;
use thiserror::Error;

/// Content type of every archived segment.
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Durably write `body` under `key`. `compressed` marks the payload as
    /// already gzip-encoded so backends can record encoding metadata instead
    /// of re-compressing.
    async fn upload(
        &self,
        body: Vec<u8>,
        key: &str,
        content_type: &str,
        compressed: bool,
    ) -> Result<(), StoreError>;
}
