//! Subscription Supervisor
//!
//! Owns the feed connection lifecycle. Each notification runs through
//! decode → word filter → notify before the next one is awaited. Any error ends
//! the session; the supervisor logs it, waits a fixed delay and reconnects,
//! forever.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::context::MonitorContext;
use crate::decoder::decode_payload;
use crate::filter::build_alert;
use crate::notifier::{AlertMessage, Notifier};
use crate::stream::{
    FeedConnection, MempoolFeed, StreamError, SubscribeRequest, SubscriptionId, TransactionEvent,
};

/// Fixed delay between a disconnect and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// Connection lifecycle as seen by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { subscription_id: SubscriptionId },
}

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before reconnecting, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Subscription issued on every connection
    pub subscribe: SubscribeRequest,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            subscribe: SubscribeRequest::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Running counters, shared with whoever wants to watch them
#[derive(Debug, Default)]
pub struct SupervisorStats {
    notifications: AtomicU64,
    alerts: AtomicU64,
    disconnects: AtomicU64,
}

impl SupervisorStats {
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

/// Long-running subscription loop with unconditional reconnect
pub struct Supervisor<F: MempoolFeed> {
    feed: F,
    context: Arc<MonitorContext>,
    notifier: Notifier,
    config: SupervisorConfig,
    state: watch::Sender<ConnectionState>,
    stats: Arc<SupervisorStats>,
}

impl<F: MempoolFeed> Supervisor<F> {
    pub fn new(
        feed: F,
        context: Arc<MonitorContext>,
        notifier: Notifier,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            feed,
            context,
            notifier,
            config,
            state,
            stats: Arc::new(SupervisorStats::default()),
        }
    }

    /// Watch connection state transitions
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.stats)
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("Connection state -> {:?}", state);
        self.state.send_replace(state);
    }

    /// Run the decode → filter → notify pipeline for one transaction
    ///
    /// # Returns
    /// The alert that was emitted, if the payload qualified
    pub fn process_event(&self, event: &TransactionEvent) -> Option<AlertMessage> {
        self.stats.notifications.fetch_add(1, Ordering::Relaxed);

        let decoded = decode_payload(&event.payload_hex, &self.context.spam_markers);
        if decoded.is_spam {
            debug!("Suppressed spam payload from {}", event.sender);
        }

        let alert = build_alert(event, &decoded, &self.context.lexicon)?;
        self.notifier.notify(&alert);
        self.stats.alerts.fetch_add(1, Ordering::Relaxed);
        Some(alert)
    }

    /// Connect, subscribe and consume notifications until something fails
    ///
    /// # Returns
    /// Only ever the error that ended the session
    pub async fn run_session(&mut self) -> Result<Infallible, StreamError> {
        self.set_state(ConnectionState::Connecting);

        let mut connection = self.feed.connect().await?;
        let subscription_id = connection.subscribe(&self.config.subscribe).await?;
        info!("feed started (subscription {})", subscription_id);
        self.set_state(ConnectionState::Connected {
            subscription_id: subscription_id.clone(),
        });

        loop {
            let event = connection.next_notification(&subscription_id).await?;
            self.process_event(&event);
        }
    }

    /// Record a failed session and move to `Disconnected`
    fn handle_disconnect(&self, error: &StreamError) {
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        error!(
            "Disconnection on {}: {} (notifications: {}, alerts: {}, disconnects: {})",
            chrono::Utc::now().to_rfc3339(),
            error,
            self.stats.notifications(),
            self.stats.alerts(),
            self.stats.disconnects(),
        );
        self.set_state(ConnectionState::Disconnected);
    }

    /// Supervise the feed until the process is terminated
    pub async fn run(mut self) -> Infallible {
        let delay = self.config.reconnect_delay();
        loop {
            match self.run_session().await {
                Ok(never) => match never {},
                Err(error) => self.handle_disconnect(&error),
            }
            sleep(delay).await;
        }
    }
}
