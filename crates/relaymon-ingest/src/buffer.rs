use async_trait::async_trait;
use relaymon_common::types::LogEntry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Minimum flush interval; shorter configured values are raised to this.
const MIN_FLUSH_INTERVAL_MS: u64 = 50;

/// Tuning for the ingestion buffer.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub flush_interval_ms: u64,
    pub max_batch_size: usize,
    pub max_buffer_size: usize,
}

impl BufferConfig {
    /// Buffer config with the default buffer bound of 4x the batch size.
    pub fn new(flush_interval_ms: u64, max_batch_size: usize) -> Self {
        Self {
            flush_interval_ms: flush_interval_ms.max(MIN_FLUSH_INTERVAL_MS),
            max_batch_size,
            max_buffer_size: max_batch_size * 4,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(1000, 250)
    }
}

/// Downstream consumer of flushed batches. Batches arrive sequentially,
/// in push order, never concurrently.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    async fn consume(&self, batch: Vec<LogEntry>);
}

/// Decouples a bursty line source from downstream processing.
///
/// Entries accumulate until either `max_batch_size` is reached (immediate
/// flush), `max_buffer_size` is reached (forced flush to bound memory),
/// or the idle timer fires after `flush_interval_ms`. A flush drains the
/// buffer in batch-sized chunks; a push arriving mid-flush extends the
/// buffer and is picked up by the same drain loop.
pub struct IngestionBuffer {
    inner: Arc<Inner>,
}

struct Inner {
    config: BufferConfig,
    consumer: Arc<dyn BatchConsumer>,
    queue: Mutex<VecDeque<LogEntry>>,
    flushing: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionBuffer {
    pub fn new(config: BufferConfig, consumer: Arc<dyn BatchConsumer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                consumer,
                queue: Mutex::new(VecDeque::new()),
                flushing: AtomicBool::new(false),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Append entries to the buffer, scheduling a flush when a size bound
    /// is crossed or arming the idle timer on the empty-to-non-empty
    /// transition.
    pub fn push(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        let (was_empty, len) = {
            let mut queue = self.inner.queue.lock().unwrap();
            let was_empty = queue.is_empty();
            queue.extend(entries);
            (was_empty, queue.len())
        };

        if len >= self.inner.config.max_buffer_size {
            tracing::warn!(buffered = len, "Ingestion buffer overflow, forcing flush");
            self.spawn_flush();
        } else if len >= self.inner.config.max_batch_size {
            self.spawn_flush();
        } else if was_empty {
            self.arm_timer();
        }
    }

    /// Drain the buffer now, delivering whatever is queued.
    pub async fn flush(&self) {
        Inner::flush(self.inner.clone()).await;
    }

    /// Discard buffered content and cancel the pending idle timer.
    /// Used on teardown or pause.
    pub fn clear(&self) {
        self.inner.queue.lock().unwrap().clear();
        if let Some(handle) = self.inner.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_flush(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            Inner::flush(inner).await;
        });
    }

    fn arm_timer(&self) {
        let mut timer = self.inner.timer.lock().unwrap();
        if timer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let inner = self.inner.clone();
        let delay = Duration::from_millis(inner.config.flush_interval_ms);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Inner::flush(inner).await;
        }));
    }
}

impl Inner {
    /// Drain in `max_batch_size` chunks, invoking the consumer
    /// sequentially per chunk. A compare-exchange guard keeps at most one
    /// flush running; a second logical invocation is dropped, its entries
    /// consumed by the drain loop already in flight.
    async fn flush(inner: Arc<Inner>) {
        if inner
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        loop {
            loop {
                let chunk: Vec<LogEntry> = {
                    let mut queue = inner.queue.lock().unwrap();
                    let take = queue.len().min(inner.config.max_batch_size);
                    queue.drain(..take).collect()
                };
                if chunk.is_empty() {
                    break;
                }
                inner.consumer.consume(chunk).await;
            }

            inner.flushing.store(false, Ordering::Release);

            // Buffer drained; the timer has nothing left to deliver. When
            // the timer task itself ran this flush, aborting is a no-op
            // since no suspension point remains.
            if let Some(handle) = inner.timer.lock().unwrap().take() {
                handle.abort();
            }

            // A push can land between the final empty observation and the
            // flag reset, and its freshly armed timer may be the handle
            // aborted above. Those entries would wait for a size trigger,
            // so re-take the guard and drain them instead.
            if inner.queue.lock().unwrap().is_empty() {
                break;
            }
            if inner
                .flushing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
        }
    }
}
