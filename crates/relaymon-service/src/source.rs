use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relaymon_ingest::buffer::IngestionBuffer;
use relaymon_ingest::dedupe::EntryDeduper;
use relaymon_ingest::parser;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Failed polls back off exponentially up to this ceiling.
const MAX_BACKOFF_SECS: u64 = 300;

/// Polls one raw-line log endpoint and feeds fresh entries into the
/// ingestion buffer.
///
/// Each poll fetches the full text body, parses it line by line, drops
/// lines already seen on earlier polls, and pushes the remainder. A
/// failed fetch flips the connectivity flag and widens the poll delay;
/// the first successful fetch restores both.
pub struct LineSource {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
    buffer: Arc<IngestionBuffer>,
    deduper: Mutex<EntryDeduper>,
    connected: AtomicBool,
}

impl LineSource {
    pub fn new(
        url: String,
        poll_interval: Duration,
        fetch_timeout: Duration,
        buffer: Arc<IngestionBuffer>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(fetch_timeout)
                .build()
                .unwrap_or_default(),
            url,
            poll_interval,
            buffer,
            deduper: Mutex::new(EntryDeduper::default()),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the most recent poll succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Poll until the shutdown signal flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(url = %self.url, "line source started");
        let mut delay = self.poll_interval;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    delay = match self.poll_once().await {
                        Ok(fresh) => {
                            debug!(url = %self.url, fresh, "poll complete");
                            self.poll_interval
                        }
                        Err(err) => {
                            let next = backoff(delay, self.poll_interval);
                            warn!(url = %self.url, error = %err, retry_in_secs = next.as_secs(), "source fetch failed");
                            next
                        }
                    };
                }
            }
        }
        info!(url = %self.url, "line source stopped");
    }

    /// One fetch-parse-dedupe-push cycle. Returns the number of fresh
    /// entries pushed.
    async fn poll_once(&self) -> Result<usize, reqwest::Error> {
        let body = match self.fetch().await {
            Ok(body) => body,
            Err(err) => {
                self.connected.store(false, Ordering::Release);
                return Err(err);
            }
        };
        self.connected.store(true, Ordering::Release);

        let lines: Vec<String> = body.lines().map(str::to_string).collect();
        let entries = parser::parse_many(&lines);
        let fresh = {
            let mut deduper = self.deduper.lock().unwrap_or_else(|p| p.into_inner());
            deduper.dedupe(entries)
        };
        let count = fresh.len();
        self.buffer.push(fresh);
        Ok(count)
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        let response = self.client.get(&self.url).send().await?;
        let response = response.error_for_status()?;
        response.text().await
    }
}

fn backoff(current: Duration, floor: Duration) -> Duration {
    let doubled = current.saturating_mul(2).max(floor);
    doubled.min(Duration::from_secs(MAX_BACKOFF_SECS))
}
