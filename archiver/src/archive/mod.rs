//! Session uploader: reads the two artifacts of a finished session from the
//! staging directory, splits the DOM stream when it crosses the configured
//! threshold, gzip-compresses every segment and hands it to the object
//! store, then records telemetry.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task;
use tokio::time::{Duration, sleep, timeout};
use tracing::warn;

use crate::config::Config;
use crate::error::ArchiveError;
use crate::metrics::{self, MetricsRecorder};
use crate::session_id;
use crate::store::{OCTET_STREAM, ObjectStore, StoreError};

/// DOM-mutation artifact inside a session directory.
pub const DOM_FILE: &str = "dom.mob";
/// Devtools-protocol artifact inside a session directory.
pub const DEVTOOLS_FILE: &str = "devtools.mob";

const DOM_ATTEMPTS: i32 = 5;
const DEVTOOLS_ATTEMPTS: i32 = 4;

/// Budget for the metrics tail; a stalled sink never holds a worker.
const METRICS_TIMEOUT: Duration = Duration::from_millis(200);

pub struct Archiver {
    cfg: Config,
    store: Arc<dyn ObjectStore>,
    metrics: Arc<dyn MetricsRecorder>,
}

enum AttemptError {
    Open(io::Error),
    Read(io::Error),
    Upload(ArchiveError),
}

impl Archiver {
    pub fn new(
        cfg: Config,
        store: Arc<dyn ObjectStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self, ArchiveError> {
        if cfg.split_threshold == 0 {
            return Err(ArchiveError::Config(
                "split threshold must be positive".into(),
            ));
        }
        if cfg.staging_dir.as_os_str().is_empty() {
            return Err(ArchiveError::Config("staging directory must be set".into()));
        }
        Ok(Self {
            cfg,
            store,
            metrics,
        })
    }

    /// Upload both artifacts of one session. The DOM stream goes first with
    /// splitting enabled; a failure there short-circuits and the devtools
    /// stream is never attempted.
    pub async fn upload_session_files(&self, session_id: u64) -> Result<(), ArchiveError> {
        let session_dir = session_id.to_string();
        self.upload_key(
            session_id,
            &format!("{session_dir}/{DOM_FILE}"),
            true,
            DOM_ATTEMPTS,
        )
        .await?;
        self.upload_key(
            session_id,
            &format!("{session_dir}/{DEVTOOLS_FILE}"),
            false,
            DEVTOOLS_ATTEMPTS,
        )
        .await
    }

    /// Upload one artifact under its remote key. `retry_count` bounds the
    /// attempts at reading the split prefix; once the budget is spent the
    /// failure is dropped without surfacing an error. A non-positive budget
    /// is a no-op that reports success.
    pub async fn upload_key(
        &self,
        session_id: u64,
        key: &str,
        should_split: bool,
        retry_count: i32,
    ) -> Result<(), ArchiveError> {
        let mut remaining = retry_count;
        let mut first_attempt = true;
        while remaining > 0 {
            remaining -= 1;
            match self.try_upload(key, should_split).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Open(source)) => {
                    let err = ArchiveError::OpenArtifact {
                        key: key.to_string(),
                        shard: session_id::shard(session_id),
                        session_start: session_id::start_time(session_id),
                        source,
                    };
                    if first_attempt {
                        return Err(err);
                    }
                    // Retry attempts report nothing upward; only the first
                    // open failure is the caller's business.
                    warn!(key, "artifact vanished during retry: {err}");
                    return Ok(());
                }
                Err(AttemptError::Read(source)) => {
                    warn!(
                        key,
                        shard = session_id::shard(session_id),
                        session_start = %session_id::start_time(session_id),
                        "artifact read failed: {source}",
                    );
                    if remaining == 0 {
                        warn!(key, "read retries exhausted, giving up");
                        return Ok(());
                    }
                    sleep(self.cfg.retry_delay).await;
                    first_attempt = false;
                }
                Err(AttemptError::Upload(err)) => return Err(err),
            }
        }
        Ok(())
    }

    async fn try_upload(&self, key: &str, should_split: bool) -> Result<(), AttemptError> {
        let path = self.cfg.staging_dir.join(key);
        let started = Instant::now();
        let mut file = File::open(&path).await.map_err(AttemptError::Open)?;

        if should_split {
            // Scratch buffer is allocated per call: concurrent sessions must
            // never share split-read state.
            let mut prefix = vec![0u8; self.cfg.split_threshold];
            let n_read = read_up_to(&mut file, &mut prefix)
                .await
                .map_err(AttemptError::Read)?;
            prefix.truncate(n_read);
            self.record_duration(metrics::READING_DURATION, started).await;

            let archiving = Instant::now();
            let start_key = format!("{key}s");
            let body = gzip_bytes(prefix)
                .await
                .map_err(|e| upload_failed(&start_key, e.into()))?;
            self.store
                .upload(body, &start_key, OCTET_STREAM, true)
                .await
                .map_err(|e| upload_failed(&start_key, e))?;

            if n_read == self.cfg.split_threshold {
                // The file holds at least the threshold; the rest becomes
                // the end segment, streamed from the current offset.
                let end_key = format!("{key}e");
                let body = gzip_file(file)
                    .await
                    .map_err(|e| upload_failed(&end_key, e.into()))?;
                self.store
                    .upload(body, &end_key, OCTET_STREAM, true)
                    .await
                    .map_err(|e| upload_failed(&end_key, e))?;
            }
            self.record_duration(metrics::ARCHIVING_DURATION, archiving)
                .await;
        } else {
            let archiving = Instant::now();
            let start_key = format!("{key}s");
            let body = gzip_file(file)
                .await
                .map_err(|e| upload_failed(&start_key, e.into()))?;
            self.store
                .upload(body, &start_key, OCTET_STREAM, true)
                .await
                .map_err(|e| upload_failed(&start_key, e))?;
            self.record_duration(metrics::ARCHIVING_DURATION, archiving)
                .await;
        }

        let file_size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len() as f64,
            Err(err) => {
                warn!(key, "cannot stat artifact: {err}");
                0.0
            }
        };
        // Metrics are best-effort: bounded and never propagated.
        let _ = timeout(METRICS_TIMEOUT, async {
            if should_split {
                self.metrics.add_counter(metrics::SESSIONS_TOTAL, 1.0).await;
                self.metrics
                    .record_histogram(metrics::SESSIONS_SIZE, file_size)
                    .await;
            } else {
                self.metrics
                    .record_histogram(metrics::SESSIONS_DT_SIZE, file_size)
                    .await;
            }
        })
        .await;

        Ok(())
    }

    async fn record_duration(&self, series: &'static str, since: Instant) {
        self.metrics
            .record_histogram(series, since.elapsed().as_millis() as f64)
            .await;
    }
}

fn upload_failed(key: &str, source: StoreError) -> AttemptError {
    AttemptError::Upload(ArchiveError::UploadFailed {
        key: key.to_string(),
        source,
    })
}

/// Read until `buf` is full or the file ends; returns the bytes read.
async fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Gzip an in-memory segment.
async fn gzip_bytes(data: Vec<u8>) -> io::Result<Vec<u8>> {
    task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data)?;
        encoder.finish()
    })
    .await
    .map_err(io::Error::other)?
}

/// Stream-gzip the rest of an open artifact from its current offset. The
/// encoder consumes the file handle directly; nothing is staged on disk.
async fn gzip_file(file: File) -> io::Result<Vec<u8>> {
    let mut file = file.into_std().await;
    task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        io::copy(&mut file, &mut encoder)?;
        encoder.finish()
    })
    .await
    .map_err(io::Error::other)?
}
