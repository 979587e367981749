use crate::codec::{Decoder, Protocol};
use crate::stats::Stats;
use crate::terminate;
use common::channel::{self, ChannelId, PolicyOverride};
use common::Record;
use log::{error, info};
use std::os::unix::io::FromRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Where a read channel gets its bytes.
#[derive(Debug, Clone)]
pub enum Source {
    Stdin,
    Fd(i32),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub channel: ChannelId,
    pub protocol: Protocol,
    pub policy: PolicyOverride,
    pub linger: Option<bool>,
    pub verbose_input: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            channel: ChannelId::Stdin,
            protocol: Protocol::default(),
            policy: PolicyOverride::default(),
            linger: None,
            verbose_input: false,
        }
    }
}

/// Stream of normalized records from one channel.
///
/// When the channel closes and its effective policy says `exit_on_close`,
/// the process terminates after the stream drains; the module loop never
/// observes a half-processed tail.
pub struct RecordStream {
    rx: mpsc::Receiver<Record>,
    exit_on_close: Arc<AtomicBool>,
}

impl RecordStream {
    pub async fn recv(&mut self) -> Option<Record> {
        match self.rx.recv().await {
            Some(record) => Some(record),
            None => {
                if self.exit_on_close.load(Ordering::SeqCst) {
                    terminate::terminate(0);
                }
                None
            }
        }
    }
}

/// Spawns the reader task for a source.
pub fn spawn(source: Source, options: ReadOptions, stats: Option<Arc<Stats>>) -> RecordStream {
    let policy = channel::resolve(&options.channel, options.policy, options.linger);
    let (tx, rx) = mpsc::channel(16);
    let exit_on_close = Arc::new(AtomicBool::new(false));
    let exit_flag = Arc::clone(&exit_on_close);

    tokio::spawn(async move {
        match source {
            Source::Stdin => {
                run(tokio::io::stdin(), options, tx, stats).await;
            }
            Source::Fd(fd) => {
                let file = unsafe { std::fs::File::from_raw_fd(fd) };
                run(tokio::fs::File::from_std(file), options, tx, stats).await;
            }
            Source::Path(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => {
                    run(file, options, tx, stats).await;
                }
                Err(err) => {
                    error!("cannot open {}: {err}", path.display());
                }
            },
        }
        if policy.exit_on_close {
            exit_flag.store(true, Ordering::SeqCst);
        }
    });

    RecordStream { rx, exit_on_close }
}

/// Reader loop over an arbitrary byte source; the seam the tests use.
pub fn spawn_from(
    reader: impl AsyncRead + Unpin + Send + 'static,
    options: ReadOptions,
    stats: Option<Arc<Stats>>,
) -> RecordStream {
    let policy = channel::resolve(&options.channel, options.policy, options.linger);
    let (tx, rx) = mpsc::channel(16);
    let exit_on_close = Arc::new(AtomicBool::new(false));
    let exit_flag = Arc::clone(&exit_on_close);

    tokio::spawn(async move {
        run(reader, options, tx, stats).await;
        if policy.exit_on_close {
            exit_flag.store(true, Ordering::SeqCst);
        }
    });

    RecordStream { rx, exit_on_close }
}

async fn run(
    mut reader: impl AsyncRead + Unpin,
    options: ReadOptions,
    tx: mpsc::Sender<Record>,
    stats: Option<Arc<Stats>>,
) {
    let mut decoder = Decoder::new(options.protocol);
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for record in decoder.push(&buf[..n]) {
                    if !deliver(record, &options, &tx, &stats).await {
                        return;
                    }
                }
            }
            Err(err) => {
                error!("read failed on {}: {err}", options.channel);
                break;
            }
        }
    }
    if let Some(record) = decoder.finish() {
        let _ = deliver(record, &options, &tx, &stats).await;
    }
}

async fn deliver(
    record: Record,
    options: &ReadOptions,
    tx: &mpsc::Sender<Record>,
    stats: &Option<Arc<Stats>>,
) -> bool {
    if options.verbose_input {
        if let Ok(line) = serde_json::to_string(&record) {
            info!("input {line}");
        }
    }
    if let Some(stats) = stats {
        stats.record_in(&record);
    }
    tx.send(record).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn no_exit_options() -> ReadOptions {
        ReadOptions {
            channel: ChannelId::Named("test".to_string()),
            ..ReadOptions::default()
        }
    }

    #[tokio::test]
    async fn test_reads_records_until_eof() {
        let bytes = b"{\"data\":{\"a\":1}}\n{\"data\":{\"a\":2}}\n".to_vec();
        let mut stream = spawn_from(Cursor::new(bytes), no_exit_options(), None);

        let first = stream.recv().await.unwrap();
        assert_eq!(first.data.get("a"), Some(&json!(1)));
        let second = stream.recv().await.unwrap();
        assert_eq!(second.data.get("a"), Some(&json!(2)));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_trailing_line_is_delivered() {
        let bytes = b"{\"data\":{\"a\":1}}".to_vec();
        let mut stream = spawn_from(Cursor::new(bytes), no_exit_options(), None);
        let record = stream.recv().await.unwrap();
        assert_eq!(record.data.get("a"), Some(&json!(1)));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stats_count_inputs() {
        let stats = Stats::new();
        let bytes = b"{\"data\":{}}\n{\"data\":{}}\n".to_vec();
        let mut stream = spawn_from(Cursor::new(bytes), no_exit_options(), Some(stats.clone()));
        while stream.recv().await.is_some() {}
        assert!(stats.tick_line().contains("in=2/s"));
    }
}
