//! Metrics recorder seam. The uploader only knows series names and the
//! counter/histogram distinction; registration and export belong to the
//! backend behind the trait.

use async_trait::async_trait;
use tracing::debug;

pub const SESSIONS_TOTAL: &str = "sessions_total";
pub const SESSIONS_SIZE: &str = "sessions_size";
pub const SESSIONS_DT_SIZE: &str = "sessions_dt_size";
pub const READING_DURATION: &str = "reading_duration";
pub const ARCHIVING_DURATION: &str = "archiving_duration";

#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    async fn add_counter(&self, series: &'static str, delta: f64);
    async fn record_histogram(&self, series: &'static str, value: f64);
}

/// Default sink: emits every sample on the log stream.
pub struct LogRecorder;

#[async_trait]
impl MetricsRecorder for LogRecorder {
    async fn add_counter(&self, series: &'static str, delta: f64) {
        debug!(series, delta, "counter");
    }

    async fn record_histogram(&self, series: &'static str, value: f64) {
        debug!(series, value, "histogram");
    }
}
