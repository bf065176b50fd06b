use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer::Buffer;
use crate::config::{CollectorConfig, ShutdownPolicy};
use crate::error::{CollectorError, FeedError};
use crate::feed::{Connector, FeedReader};
use crate::record::Record;
use crate::retry::RetryPolicy;
use crate::sink::RecordSink;

/// Lifecycle of a [`Collector`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Uninitialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    pub records_received: u64,
    pub decode_errors: u64,
    pub read_errors: u64,
    pub reconnects: u64,
    /// Batches handed to the writer.
    pub batches_flushed: u64,
    pub artifacts_written: u64,
    pub records_written: u64,
    /// Records left out of an artifact because they failed to serialize.
    pub records_skipped: u64,
    /// Records lost to sink failures or discarded at shutdown.
    pub records_dropped: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Collector
// ═══════════════════════════════════════════════════════════════

/// Feed reader → buffer → sink.
///
/// A single task owns the buffer and the connection. Full batches go
/// through a bounded queue to one writer task, so artifacts are written in
/// the order their records arrived and a slow disk pushes back on reads.
pub struct Collector {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn RecordSink>,
    retry: RetryPolicy,
    shutdown_policy: ShutdownPolicy,
    shutdown_grace: Duration,
    flush_queue: usize,
    buffer: Buffer,
    reader: Option<Box<dyn FeedReader>>,
    /// Reconnects since the last record arrived.
    reconnect_streak: u32,
    /// Records handed to the writer.
    records_enqueued: u64,
    state: CollectorState,
    stats: CollectorStats,
}

impl Collector {
    pub fn new(
        config: &CollectorConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            connector,
            sink,
            retry: config.retry_policy(),
            shutdown_policy: config.shutdown.policy,
            shutdown_grace: config.shutdown.grace(),
            flush_queue: config.buffer.flush_queue.max(1),
            buffer: Buffer::new(config.buffer.purge_after),
            reader: None,
            reconnect_streak: 0,
            records_enqueued: 0,
            state: CollectorState::Uninitialized,
            stats: CollectorStats::default(),
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Records currently held in memory.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Prepare the sink and open the feed connection.
    ///
    /// A connect failure here is not retried; the caller decides whether
    /// it is fatal.
    pub async fn initialize(&mut self) -> Result<(), CollectorError> {
        self.expect_state(CollectorState::Uninitialized)?;

        self.sink.init()?;

        let target = self.connector.target();
        tracing::info!(%target, purge_after = self.buffer.purge_after(), "connecting to feed");
        let reader = self.connector.connect().await.map_err(CollectorError::Connect)?;
        self.reader = Some(reader);

        self.state = CollectorState::Running;
        tracing::info!(%target, "collector running");
        Ok(())
    }

    /// Read, buffer and flush until `token` is cancelled or the feed cannot
    /// be reconnected. The shutdown sequence runs in both cases.
    pub async fn run(&mut self, token: CancellationToken) -> Result<CollectorStats, CollectorError> {
        self.expect_state(CollectorState::Running)?;

        let (tx, rx) = mpsc::channel::<Vec<Record>>(self.flush_queue);
        let progress = Arc::new(WriterProgress::default());
        let writer = spawn_writer(self.sink.clone(), rx, progress.clone());

        let outcome = self.collect(&tx, &token).await;
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "collector stopping on error");
        }

        self.state = CollectorState::ShuttingDown;
        tracing::info!(buffered = self.buffer.len(), policy = ?self.shutdown_policy, "shutting down collector");

        self.finish_buffer(&tx).await;
        drop(tx);
        let joined = self.join_writer(writer, &progress).await;
        self.close_reader().await;

        self.state = CollectorState::Stopped;
        tracing::info!(stats = ?self.stats, "collector stopped");

        outcome?;
        joined?;
        Ok(self.stats.clone())
    }

    async fn collect(
        &mut self,
        tx: &mpsc::Sender<Vec<Record>>,
        token: &CancellationToken,
    ) -> Result<(), CollectorError> {
        let mut failures: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Ok(());
            }

            let next = match self.reader.as_mut() {
                Some(reader) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(()),
                    next = reader.next_record() => next,
                },
                None => None,
            };

            match next {
                Some(Ok(record)) => {
                    failures = 0;
                    self.reconnect_streak = 0;
                    self.stats.records_received += 1;
                    if self.buffer.append(record) {
                        self.flush(tx).await;
                    }
                }
                Some(Err(FeedError::Decode(e))) => {
                    self.stats.decode_errors += 1;
                    tracing::warn!(error = %e, "could not decode message, skipping");
                }
                Some(Err(e)) => {
                    self.stats.read_errors += 1;
                    failures += 1;
                    tracing::error!(error = %e, consecutive = failures, "could not read message");

                    if failures >= self.retry.max_consecutive_failures {
                        tracing::warn!(failures, "too many consecutive read errors, reconnecting");
                        if !self.reconnect(token).await? {
                            return Ok(());
                        }
                        failures = 0;
                    } else if !sleep_or_cancel(self.retry.backoff(failures), token).await {
                        return Ok(());
                    }
                }
                None => {
                    tracing::warn!("feed ended, reconnecting");
                    if !self.reconnect(token).await? {
                        return Ok(());
                    }
                    failures = 0;
                }
            }
        }
    }

    /// Replace the connection. `Ok(false)` means cancelled while waiting.
    ///
    /// Attempts count across calls until a record arrives, so a feed that
    /// keeps accepting and then dropping connections still runs out.
    async fn reconnect(&mut self, token: &CancellationToken) -> Result<bool, CollectorError> {
        self.close_reader().await;

        let attempts = self.retry.max_reconnect_attempts;
        let mut last = None;
        while self.reconnect_streak < attempts {
            self.reconnect_streak += 1;
            let attempt = self.reconnect_streak;
            if !sleep_or_cancel(self.retry.backoff(attempt), token).await {
                return Ok(false);
            }
            let connected = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(false),
                connected = self.connector.connect() => connected,
            };
            match connected {
                Ok(reader) => {
                    self.reader = Some(reader);
                    self.stats.reconnects += 1;
                    tracing::info!(attempt, target = %self.connector.target(), "reconnected");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "reconnect failed");
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or_else(|| FeedError::Connect {
            url: self.connector.target(),
            detail: "connections kept ending before any record arrived".into(),
        });
        Err(CollectorError::ReconnectExhausted { attempts, last })
    }

    /// Drain the buffer into the writer queue, waiting for room if it is full.
    async fn flush(&mut self, tx: &mpsc::Sender<Vec<Record>>) {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return;
        }
        let size = batch.len() as u64;
        tracing::info!(records = size, "flushing batch");
        match tx.send(batch).await {
            Ok(()) => {
                self.stats.batches_flushed += 1;
                self.records_enqueued += size;
            }
            Err(mpsc::error::SendError(batch)) => {
                self.stats.records_dropped += batch.len() as u64;
                tracing::error!(records = batch.len(), "writer is gone, batch dropped");
            }
        }
    }

    async fn finish_buffer(&mut self, tx: &mpsc::Sender<Vec<Record>>) {
        if self.buffer.is_empty() {
            return;
        }
        match self.shutdown_policy {
            ShutdownPolicy::Flush => self.flush(tx).await,
            ShutdownPolicy::Discard => {
                let dropped = self.buffer.drain().len();
                self.stats.records_dropped += dropped as u64;
                tracing::warn!(records = dropped, "discarding partial buffer");
            }
        }
    }

    /// Wait for the writer, then settle the counters. Records handed to the
    /// writer that it never reported on are counted as dropped.
    async fn join_writer(
        &mut self,
        mut writer: JoinHandle<()>,
        progress: &WriterProgress,
    ) -> Result<(), CollectorError> {
        let joined = match tokio::time::timeout(self.shutdown_grace, &mut writer).await {
            Ok(result) => result.map_err(CollectorError::WriterTask),
            Err(_) => {
                tracing::error!(grace = ?self.shutdown_grace, "writer did not finish in time, aborting");
                writer.abort();
                // Counters are final once the aborted task is gone.
                let _ = writer.await;
                Ok(())
            }
        };

        let artifacts = progress.artifacts.load(Ordering::Relaxed);
        let written = progress.records_written.load(Ordering::Relaxed);
        let skipped = progress.records_skipped.load(Ordering::Relaxed);
        let dropped = progress.records_dropped.load(Ordering::Relaxed);

        self.stats.artifacts_written += artifacts;
        self.stats.records_written += written;
        self.stats.records_skipped += skipped;
        self.stats.records_dropped += dropped;

        let unsettled = self.records_enqueued.saturating_sub(written + skipped + dropped);
        if unsettled > 0 {
            self.stats.records_dropped += unsettled;
            tracing::error!(records = unsettled, "queued records were not written before shutdown, dropped");
        }
        joined
    }

    async fn close_reader(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            if let Err(e) = reader.close().await {
                tracing::error!(error = %e, "could not close feed connection");
            }
        }
    }

    fn expect_state(&self, expected: CollectorState) -> Result<(), CollectorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CollectorError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Writer task
// ═══════════════════════════════════════════════════════════════

/// Counters the writer publishes as each batch settles. Shared so they
/// survive the writer being aborted.
#[derive(Debug, Default)]
struct WriterProgress {
    artifacts: AtomicU64,
    records_written: AtomicU64,
    records_skipped: AtomicU64,
    records_dropped: AtomicU64,
}

/// Consume batches in queue order; each write runs on the blocking pool.
fn spawn_writer(
    sink: Arc<dyn RecordSink>,
    mut rx: mpsc::Receiver<Vec<Record>>,
    progress: Arc<WriterProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            let size = batch.len() as u64;
            let sink = sink.clone();
            match tokio::task::spawn_blocking(move || sink.write(batch)).await {
                Ok(Ok(artifact)) => {
                    tracing::info!(
                        path = %artifact.path.display(),
                        records = artifact.records,
                        skipped = artifact.skipped,
                        "artifact written"
                    );
                    progress.artifacts.fetch_add(1, Ordering::Relaxed);
                    progress.records_written.fetch_add(artifact.records as u64, Ordering::Relaxed);
                    progress.records_skipped.fetch_add(artifact.skipped as u64, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, records = size, "flush failed, batch dropped");
                    progress.records_dropped.fetch_add(size, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::error!(error = %e, records = size, "sink panicked, batch dropped");
                    progress.records_dropped.fetch_add(size, Ordering::Relaxed);
                }
            }
        }
        tracing::debug!("writer finished");
    })
}

async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
