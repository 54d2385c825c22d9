use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::domain::action::ModAction;
use crate::infra::queue::{ActionUnit, QueueClient};

/// Where finished units of work go. The queue client is the production sink;
/// tests substitute an in-memory recorder.
#[async_trait]
pub trait UnitSink: Send + Sync {
    async fn submit(&self, unit: ActionUnit) -> Result<()>;
}

#[async_trait]
impl UnitSink for QueueClient {
    async fn submit(&self, unit: ActionUnit) -> Result<()> {
        QueueClient::submit(self, &unit).await
    }
}

/// Buffers normalized, duplicate-filtered records for one live worker and
/// decides when to turn them into queued units. This is the pipeline's
/// throughput-vs-latency control point: ordinary records are batched up to a
/// threshold, admin records skip the buffer entirely so alerts stay fast.
pub struct BatchDispatcher<'a, S: UnitSink> {
    sink: &'a S,
    admin: bool,
    flush_threshold: usize,
    chunk_size: usize,
    buffer: Vec<ModAction>,
}

impl<'a, S: UnitSink> BatchDispatcher<'a, S> {
    pub fn new(sink: &'a S, admin: bool, flush_threshold: usize, chunk_size: usize) -> Self {
        Self {
            sink,
            admin,
            flush_threshold,
            chunk_size,
            buffer: Vec::new(),
        }
    }

    /// Accept one live record. Admin records dispatch immediately as a
    /// single-record unit at top priority; ordinary records buffer until the
    /// flush threshold.
    pub async fn push(&mut self, action: ModAction) -> Result<()> {
        if self.admin {
            self.sink
                .submit(ActionUnit::new(true, true, vec![action]))
                .await?;
            return Ok(());
        }

        self.buffer.push(action);
        if self.buffer.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// The reader saw nothing new for a whole poll interval; whatever is
    /// buffered goes out now.
    pub async fn idle_tick(&mut self) -> Result<()> {
        self.flush().await
    }

    /// Worker is shutting down; drain the buffer.
    pub async fn close(&mut self) -> Result<()> {
        self.flush().await
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let drained: Vec<ModAction> = self.buffer.drain(..).collect();
        debug!(records = drained.len(), admin = self.admin, "flushing live buffer");
        submit_chunked(self.sink, drained, self.admin, true, self.chunk_size).await
    }

    /// Backlog path: one already-filtered page of records, dispatched at low
    /// priority so history replays never starve live traffic.
    pub async fn dispatch_page(&self, records: Vec<ModAction>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!(records = records.len(), admin = self.admin, "dispatching backlog page");
        submit_chunked(self.sink, records, self.admin, false, self.chunk_size).await
    }
}

/// Split records into fixed-size sub-chunks, bounding the size of any single
/// persistence transaction, and submit one unit per sub-chunk.
async fn submit_chunked<S: UnitSink>(
    sink: &S,
    records: Vec<ModAction>,
    admin: bool,
    live: bool,
    chunk_size: usize,
) -> Result<()> {
    let mut remaining = records.into_iter();
    loop {
        let chunk: Vec<ModAction> = remaining.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            return Ok(());
        }
        sink.submit(ActionUnit::new(admin, live, chunk)).await?;
    }
}
