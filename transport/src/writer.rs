use crate::codec::{self, Protocol};
use crate::stats::Stats;
use crate::terminate;
use common::channel::{self, ChannelId, ChannelPolicy, PolicyOverride};
use common::Record;
use errors::Result;
use log::{error, info, warn};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};

const REOPEN_INTERVAL: Duration = Duration::from_millis(500);

/// Where a write channel sends its bytes.
#[derive(Debug, Clone)]
pub enum Target {
    Stdout,
    Fd(i32),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub channel: ChannelId,
    pub protocol: Protocol,
    pub policy: PolicyOverride,
    pub linger: Option<bool>,
    pub verbose_output: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            channel: ChannelId::Stdout,
            protocol: Protocol::default(),
            policy: PolicyOverride::default(),
            linger: None,
            verbose_output: false,
        }
    }
}

type Sink = Box<dyn AsyncWrite + Unpin + Send>;

/// Encoding writer over one channel.
///
/// Path targets are opened read-write and non-blocking so a FIFO with no
/// reader never stalls the module. Failed opens reschedule every 500 ms;
/// while the channel is down, writes are silently discarded so the primary
/// chain keeps moving.
pub struct Writer {
    target: Target,
    channel: ChannelId,
    protocol: Protocol,
    policy: ChannelPolicy,
    verbose_output: bool,
    sink: Option<Sink>,
    retry_at: Option<Instant>,
    error_logged: bool,
    stats: Option<Arc<Stats>>,
}

impl Writer {
    pub fn open(target: Target, options: WriteOptions, stats: Option<Arc<Stats>>) -> Writer {
        let policy = channel::resolve(&options.channel, options.policy, options.linger);
        let mut writer = Writer {
            target,
            channel: options.channel,
            protocol: options.protocol,
            policy,
            verbose_output: options.verbose_output,
            sink: None,
            retry_at: None,
            error_logged: false,
            stats,
        };
        writer.try_open();
        writer
    }

    pub fn policy(&self) -> ChannelPolicy {
        self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    /// Encodes and writes one record under the channel policy.
    pub async fn write(&mut self, record: &Record) -> Result<()> {
        if self.sink.is_none() {
            let due = self.retry_at.map(|at| at <= Instant::now()).unwrap_or(false);
            if due {
                self.try_open();
            }
            if self.sink.is_none() {
                // Channel is down; the reopen timer owns recovery.
                return Ok(());
            }
        }

        let bytes = codec::encode(record, self.protocol)?;
        if self.verbose_output {
            if let Ok(line) = serde_json::to_string(record) {
                info!("output {line}");
            }
        }

        let result = {
            let sink = self.sink.as_mut().expect("sink checked above");
            match sink.write_all(&bytes).await {
                Ok(()) => sink.flush().await,
                Err(err) => Err(err),
            }
        };

        match result {
            Ok(()) => {
                if let Some(stats) = &self.stats {
                    stats.record_out(record);
                }
                Ok(())
            }
            Err(err) => {
                self.handle_write_error(err);
                Ok(())
            }
        }
    }

    fn try_open(&mut self) {
        match open_sink(&self.target) {
            Ok(sink) => {
                if self.retry_at.take().is_some() {
                    info!("channel {} reconnected", self.channel);
                }
                self.sink = Some(sink);
            }
            Err(err) => {
                if self.retry_at.is_none() {
                    warn!("cannot open {}: {err}, retrying every 500 ms", self.channel);
                }
                self.retry_at = Some(Instant::now() + REOPEN_INTERVAL);
            }
        }
    }

    fn handle_write_error(&mut self, err: std::io::Error) {
        let transient = is_transient(&err);
        let broken_pipe = err.kind() == std::io::ErrorKind::BrokenPipe;

        if broken_pipe && self.policy.exit_on_close {
            terminate::terminate(0);
        }

        if self.policy.retry && transient {
            info!("transient write error on {}: {err}", self.channel);
            self.sink = None;
            self.retry_at = Some(Instant::now() + REOPEN_INTERVAL);
            return;
        }

        if !self.error_logged {
            error!("write failed on {}: {err}", self.channel);
            self.error_logged = true;
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::WouldBlock
    ) || err.raw_os_error() == Some(libc::ENXIO)
}

fn open_sink(target: &Target) -> std::io::Result<Sink> {
    match target {
        Target::Stdout => Ok(Box::new(tokio::io::stdout())),
        Target::Fd(fd) => {
            let file = unsafe { std::fs::File::from_raw_fd(*fd) };
            Ok(Box::new(tokio::fs::File::from_std(file)))
        }
        Target::Path(path) => {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)?;
            Ok(Box::new(tokio::fs::File::from_std(file)))
        }
    }
}

/// Pre-creates a side target so downstream attach never races.
///
/// A regular file stands in for a missing FIFO, with degraded timing.
pub fn ensure_target_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    warn!(
        "{} does not exist, creating a regular file; timing will degrade vs a fifo",
        path.display()
    );
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(errors::Error::from)?;
    Ok(())
}
