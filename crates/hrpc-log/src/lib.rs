//! Tracing setup for the invocation and naming runtimes: a non-blocking
//! stdout layer plus a size-rotated file layer, and a [`LogRetentionTask`]
//! that deletes rotated files past a configured age.

#[macro_use]
extern crate tracing;

use std::io;

use anyhow::Context as _;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use hrpc_task::{ShutdownSignal, Task};
use tokio::fs;
use tokio::time::{Duration, sleep};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Compile-time knobs a binary provides for its log files.
pub trait StaticLogConfig {
    const MAX_LOG_FILES: usize;
    const LOG_FILE_PREFIX: &'static str;
    /// Rotated files older than this are deleted by [`LogRetentionTask`].
    const MAX_LOG_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 90);
}

/// Keeps the non-blocking writers alive; dropping it flushes and stops them.
pub struct LoggerGuard {
    _file_guard: WorkerGuard,
    _stdio_guard: WorkerGuard,
}

/// `path` may be a folder (file prefix comes from the config) or a full file
/// path whose name overrides the prefix.
fn split_log_path<C: StaticLogConfig>(path: &Utf8Path) -> anyhow::Result<(&Utf8Path, &str)> {
    if path.is_dir() {
        Ok((path, C::LOG_FILE_PREFIX))
    } else {
        let folder = path.parent().context("log path has no parent folder")?;
        let prefix = path.file_name().context("log path has no file name")?;
        Ok((folder, prefix))
    }
}

/// Installs the global subscriber: an `EnvFilter` built from `log_filter`,
/// writing to both stdout and a size-rotated file under `path`.
pub fn init<C: StaticLogConfig>(
    path: &Utf8Path,
    log_filter: &str,
    extra_directives: Option<&str>,
) -> anyhow::Result<LoggerGuard> {
    let (folder, prefix) = split_log_path::<C>(path)?;

    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(C::MAX_LOG_FILES)
        .build(folder)
        .context("failed to create the rolling file appender")?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdio_writer, stdio_guard) = tracing_appender::non_blocking(io::stdout());

    let mut env_filter = EnvFilter::try_new(log_filter).context("invalid log filter directives")?;
    if let Some(directives) = extra_directives {
        for directive in directives.split(',') {
            env_filter = env_filter.add_directive(directive.parse().context("invalid extra log directive")?);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(fmt::layer().with_writer(stdio_writer))
        .with(env_filter)
        .init();

    Ok(LoggerGuard {
        _file_guard: file_guard,
        _stdio_guard: stdio_guard,
    })
}

/// Deletes rotated log files older than `C::MAX_LOG_AGE`, once a day, until
/// shut down.
pub struct LogRetentionTask<C: StaticLogConfig> {
    path: Utf8PathBuf,
    _config: std::marker::PhantomData<C>,
}

impl<C: StaticLogConfig> LogRetentionTask<C> {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            _config: std::marker::PhantomData,
        }
    }

    async fn sweep(folder: &Utf8Path, prefix: &str) {
        let mut read_dir = match fs::read_dir(folder).await {
            Ok(read_dir) => read_dir,
            Err(error) => {
                warn!(%error, %folder, "couldn't read the log folder");
                return;
            }
        };

        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.starts_with(prefix) || !file_name.contains("log") {
                continue;
            }

            let age = entry
                .metadata()
                .await
                .and_then(|metadata| metadata.modified())
                .and_then(|modified| modified.elapsed().map_err(io::Error::other));

            match age {
                Ok(age) if age > C::MAX_LOG_AGE => {
                    info!(file_name, "deleting expired log file");
                    if let Err(error) = fs::remove_file(entry.path()).await {
                        warn!(%error, file_name, "couldn't delete log file");
                    }
                }
                Ok(_) => {}
                Err(error) => warn!(%error, file_name, "couldn't read log file metadata"),
            }
        }
    }
}

#[async_trait]
impl<C: StaticLogConfig + Send> Task for LogRetentionTask<C> {
    const NAME: &'static str = "log retention";

    async fn run(self, mut shutdown_signal: ShutdownSignal) -> anyhow::Result<()> {
        const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);

        let (folder, prefix) = split_log_path::<C>(&self.path)?;

        loop {
            Self::sweep(folder, prefix).await;

            tokio::select! {
                _ = sleep(SWEEP_INTERVAL) => {}
                _ = shutdown_signal.wait() => break,
            }
        }

        Ok(())
    }
}
