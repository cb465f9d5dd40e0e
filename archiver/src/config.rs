use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::ArchiveError;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Staging directory holding one subdirectory per recorded session
    #[arg(
        long,
        env = "ARCH_STAGING_DIR",
        default_value = "/var/lib/archiver/staging"
    )]
    pub staging_dir: PathBuf,

    /// Byte threshold above which a DOM artifact is uploaded as two segments
    #[arg(long, env = "ARCH_FILE_SPLIT_SIZE", default_value_t = 300_000)]
    pub split_threshold: usize,

    /// Delay between artifact read retries, in seconds
    #[arg(long, env = "ARCH_RETRY_TIMEOUT_SECS", default_value_t = 2)]
    pub retry_timeout_secs: u64,

    /// Number of pool workers
    #[arg(long, env = "ARCH_WORKERS", default_value_t = 8)]
    pub workers: usize,

    /// Object store backend type
    #[arg(short, long, env = "ARCH_STORE", default_value = "FILESYSTEM")]
    pub store: String,

    /// Bucket receiving archived sessions (S3 backend)
    #[arg(long, env = "ARCH_S3_BUCKET", default_value = "sessions")]
    pub bucket: String,

    /// S3 region
    #[arg(long, env = "ARCH_S3_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint, e.g. a local MinIO
    #[arg(long, env = "ARCH_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Root directory of the filesystem backend
    #[arg(
        long,
        env = "ARCH_FS_ROOT",
        default_value = "/var/lib/archiver/objects"
    )]
    pub fs_root: PathBuf,
}

/// Settings the uploader consumes, read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub staging_dir: PathBuf,
    pub split_threshold: usize,
    pub retry_delay: Duration,
    pub workers: usize,
}

impl Config {
    /// Validate the uploader-facing settings. Failures here are construction
    /// errors and fatal to startup.
    pub fn from_args(args: &Args) -> Result<Self, ArchiveError> {
        let mut problems = Vec::new();
        if args.split_threshold == 0 {
            problems.push("ARCH_FILE_SPLIT_SIZE must be positive");
        }
        if args.workers == 0 {
            problems.push("ARCH_WORKERS must be positive");
        }
        if args.staging_dir.as_os_str().is_empty() {
            problems.push("ARCH_STAGING_DIR must not be empty");
        }
        if !problems.is_empty() {
            return Err(ArchiveError::Config(problems.join("; ")));
        }
        Ok(Self {
            staging_dir: args.staging_dir.clone(),
            split_threshold: args.split_threshold,
            retry_delay: Duration::from_secs(args.retry_timeout_secs),
            workers: args.workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, Config};

    #[test]
    fn defaults_validate() {
        let args = Args::parse_from(["archiver"]);
        let cfg = Config::from_args(&args).unwrap();
        assert_eq!(cfg.split_threshold, 300_000);
        assert_eq!(cfg.workers, 8);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let args = Args::parse_from(["archiver", "--split-threshold", "0"]);
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let args = Args::parse_from(["archiver", "--workers", "0"]);
        assert!(Config::from_args(&args).is_err());
    }
}
