use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Invalid or missing configuration; fatal to startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local artifact missing or unreadable. Reported synchronously with
    /// session diagnostics; never retried.
    #[error("cannot open artifact {key} (shard {shard}, session started {session_start}): {source}")]
    OpenArtifact {
        key: String,
        shard: u64,
        session_start: DateTime<Utc>,
        #[source]
        source: io::Error,
    },

    /// A segment that was already read could not be made durable. Uploads
    /// are mandatory, not best-effort: the supervising layer decides how to
    /// escalate.
    #[error("upload of {key} failed: {source}")]
    UploadFailed {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl ArchiveError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UploadFailed { .. })
    }
}
