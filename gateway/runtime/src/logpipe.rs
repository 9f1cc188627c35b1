use anyhow::{Context, Result};
use nix::{sys::stat::Mode, unistd};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::unix::pipe,
    task::JoinHandle,
    time,
};
use tracing::{debug, info, info_span, warn, Instrument};

const REOPEN_DELAY: time::Duration = time::Duration::from_secs(1);

/// A named pipe that nginx writes its logs to.
///
/// nginx blocks once a pipe's buffer fills, so the pipe must be drained for as long as nginx runs.
#[derive(Debug)]
pub struct LogPipe {
    path: PathBuf,
}

// === impl LogPipe ===

impl LogPipe {
    /// Creates the FIFO at `path`, replacing whatever file is already there.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale log pipe"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to remove {}", path.display()));
            }
        }
        unistd::mkfifo(&path, Mode::from_bits_truncate(0o666))
            .with_context(|| format!("failed to create fifo {}", path.display()))?;
        info!(path = %path.display(), "Created log pipe");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drains the pipe into the log until the task is aborted.
    ///
    /// Each line is logged under the `nginx` target. Read failures are logged and the pipe is
    /// reopened.
    pub fn spawn(self) -> JoinHandle<()> {
        let span = info_span!("logpipe", path = %self.path.display());
        tokio::spawn(
            async move {
                loop {
                    match self.drain().await {
                        Ok(()) => debug!("Log pipe closed"),
                        Err(error) => warn!(%error, "Failed to read log pipe"),
                    }
                    time::sleep(REOPEN_DELAY).await;
                }
            }
            .instrument(span),
        )
    }

    async fn drain(&self) -> io::Result<()> {
        // Holding the write side open keeps the pipe from reporting EOF between writers.
        let rx = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&self.path)?;
        let mut rx = BufReader::new(rx);
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            if rx.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end();
            if !line.is_empty() {
                info!(target: "nginx", "{line}");
            }
        }
    }
}
