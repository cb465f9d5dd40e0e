//! Service binary: wires config, store driver, metrics and the worker pool,
//! then feeds session identifiers from stdin until EOF or a shutdown signal.
//! Deciding *when* a session is ready to archive stays upstream; this
//! process only moves artifacts once asked.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use archiver::archive::Archiver;
use archiver::config::{Args, Config};
use archiver::error::ArchiveError;
use archiver::metrics::LogRecorder;
use archiver::store::ObjectStore;
use archiver::store::localfs::LocalFsStore;
use archiver::store::s3::S3Store;
use archiver::task::Task;
use libdispatch::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::from_args(&args)?;
    match tokio::fs::metadata(&cfg.staging_dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => anyhow::bail!(
            "ARCH_STAGING_DIR `{}` exists but is not a directory",
            cfg.staging_dir.display()
        ),
        Err(_) => anyhow::bail!(
            "ARCH_STAGING_DIR `{}` does not exist",
            cfg.staging_dir.display()
        ),
    }

    let store: Arc<dyn ObjectStore> = match args.store.to_uppercase().as_str() {
        "S3" => Arc::new(S3Store::new(&args.bucket, args.region.clone(), args.endpoint.clone()).await),
        "FILESYSTEM" => Arc::new(LocalFsStore::new(&args.fs_root)),
        other => anyhow::bail!("unknown store backend `{other}`"),
    };

    let archiver = Arc::new(Archiver::new(cfg.clone(), store, Arc::new(LogRecorder))?);

    // Fatal upload failures escalate here instead of aborting mid-routine;
    // main owns the decision to stop.
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<ArchiveError>(1);

    let pool = Arc::new(WorkerPool::new(cfg.workers, {
        let archiver = Arc::clone(&archiver);
        move |task: Task| {
            let archiver = Arc::clone(&archiver);
            let fatal_tx = fatal_tx.clone();
            async move {
                match task {
                    Task::Archive { session_id } => {
                        match archiver.upload_session_files(session_id).await {
                            Ok(()) => info!(session_id, "session archived"),
                            Err(err) if err.is_fatal() => {
                                error!(session_id, "unrecoverable upload failure: {err}");
                                let _ = fatal_tx.try_send(err);
                            }
                            Err(err) => warn!(session_id, "session skipped: {err}"),
                        }
                    }
                    Task::CacheAsset { session_id, .. } => {
                        warn!(session_id, "no asset-cache handler in this service");
                    }
                }
            }
        }
    }));

    info!(workers = cfg.workers, "archiver ready, reading session ids from stdin");

    let feed = {
        let pool = Arc::clone(&pool);
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<u64>() {
                    Ok(session_id) => {
                        if pool.add_task(Task::Archive { session_id }).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!(line, "ignoring malformed session id"),
                }
            }
        }
    };

    let mut failed = false;
    tokio::select! {
        _ = feed => info!("input drained"),
        _ = shutdown_signal() => info!("shutdown signal received"),
        Some(err) = fatal_rx.recv() => {
            error!("stopping after fatal error: {err}");
            failed = true;
        }
    }

    pool.stop().await;
    info!("all workers stopped");

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
