//! Alert Notifier
//!
//! Delivers alerts to the log synchronously and, optionally, to a paging sink
//! (SMS). Paging never blocks the caller: pages go through a bounded queue to a
//! detached dispatcher that runs each delivery on a small, bounded worker pool.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default capacity of the paging queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of deliveries allowed in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Default upper bound on a single delivery
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 10_000;

/// Errors a paging sink can report. They are logged and dropped.
#[derive(Error, Debug)]
pub enum PagingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Paging provider rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Paging delivery timed out after {0}ms")]
    Timeout(u64),
}

/// Alert produced for a payload that decoded to recognizable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    /// `sender -> recipient`
    pub header: String,
    /// Recognized words, each followed by a space
    pub body: String,
    /// Full decoded payload text
    pub debug_text: String,
}

impl AlertMessage {
    /// Text used for both the info log line and the page
    pub fn summary(&self) -> String {
        format!("{}\n{}", self.header, self.body)
    }
}

/// Destination for pages (SMS or equivalent)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PagingSink: Send + Sync {
    async fn send(&self, body: &str) -> Result<(), PagingError>;
}

/// Configuration for the paging worker pool
#[derive(Debug, Clone)]
pub struct PagerConfig {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub send_timeout_ms: u64,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
        }
    }
}

impl PagerConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Handle to the detached paging dispatcher
#[derive(Debug, Clone)]
pub struct Pager {
    queue: mpsc::Sender<String>,
}

impl Pager {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn PagingSink>, config: PagerConfig) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(dispatch_loop(rx, sink, config));
        Self { queue }
    }

    /// Enqueue a page without waiting
    ///
    /// # Returns
    /// `true` if the page was queued, `false` if it was dropped because the
    /// queue is full or the dispatcher is gone
    pub fn dispatch(&self, body: String) -> bool {
        match self.queue.try_send(body) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Paging queue full, dropping page");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Paging dispatcher stopped, dropping page");
                false
            }
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<String>,
    sink: Arc<dyn PagingSink>,
    config: PagerConfig,
) {
    let workers = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let timeout = config.send_timeout();

    while let Some(body) = rx.recv().await {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            break;
        };
        let sink = Arc::clone(&sink);
        tokio::spawn(async move {
            let _permit = permit;
            let _ = deliver(sink.as_ref(), &body, timeout).await;
        });
    }
}

/// Run one delivery with a timeout, logging any failure
pub async fn deliver(
    sink: &dyn PagingSink,
    body: &str,
    timeout: Duration,
) -> Result<(), PagingError> {
    let result = match tokio::time::timeout(timeout, sink.send(body)).await {
        Ok(result) => result,
        Err(_) => Err(PagingError::Timeout(timeout.as_millis() as u64)),
    };

    if let Err(e) = &result {
        warn!("Page delivery failed: {}", e);
    }
    result
}

/// Fans an alert out to the log and the optional pager
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    pager: Option<Pager>,
}

impl Notifier {
    /// Notifier that only writes to the log
    pub fn log_only() -> Self {
        Self { pager: None }
    }

    pub fn with_pager(pager: Pager) -> Self {
        Self { pager: Some(pager) }
    }

    pub fn is_paging(&self) -> bool {
        self.pager.is_some()
    }

    /// Log the alert, then hand it to the pager without waiting for delivery
    pub fn notify(&self, alert: &AlertMessage) {
        let summary = alert.summary();
        info!("{}", summary);
        debug!("{}", alert.debug_text);

        if let Some(pager) = &self.pager {
            pager.dispatch(summary);
        }
    }
}
