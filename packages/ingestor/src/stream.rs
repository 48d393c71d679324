//! Mempool Stream
//!
//! Connection to the pending-transaction feed. The supervisor only sees the
//! [`MempoolFeed`] / [`FeedConnection`] traits; [`BloxrouteFeed`] implements
//! them over a JSON-RPC websocket subscription.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// bloXroute cloud API websocket endpoint
pub const DEFAULT_STREAM_URI: &str = "wss://api.blxrbdn.com/ws";

/// Subscription stream carrying new pending transactions
pub const NEW_TXS_STREAM: &str = "newTxs";

/// Fields requested for each transaction
pub const DEFAULT_INCLUDE_FIELDS: &[&str] = &[
    "tx_hash",
    "tx_contents.from",
    "tx_contents.to",
    "tx_contents.input",
];

/// Errors surfaced by the feed. Every variant ends the current connection.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Connection closed by peer")]
    Closed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("No message received for {0}ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Identifier the server assigned to a subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to subscribe to and which fields to receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub stream: String,
    pub include: Vec<String>,
}

impl Default for SubscribeRequest {
    fn default() -> Self {
        Self {
            stream: NEW_TXS_STREAM.to_string(),
            include: DEFAULT_INCLUDE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (&'a str, IncludeFilter<'a>),
}

#[derive(Serialize)]
struct IncludeFilter<'a> {
    include: &'a [String],
}

impl SubscribeRequest {
    /// Encode as a JSON-RPC `subscribe` call
    pub fn to_rpc_json(&self, id: u64) -> Result<String, StreamError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "subscribe",
            params: (self.stream.as_str(), IncludeFilter { include: &self.include }),
        };
        serde_json::to_string(&request).map_err(|e| StreamError::InvalidRequest(e.to_string()))
    }
}

/// One pending transaction, reduced to the fields the monitor consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    pub tx_hash: Option<String>,
    pub sender: String,
    /// `None` for contract creation
    pub recipient: Option<String>,
    pub payload_hex: String,
}

/// Incoming JSON-RPC frame: a call reply or a subscription notification
#[derive(Debug, Deserialize)]
struct RpcMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
    #[serde(default)]
    params: Option<NotificationParams>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxNotification {
    #[serde(default)]
    tx_hash: Option<String>,
    tx_contents: Option<TxContents>,
}

#[derive(Debug, Deserialize)]
struct TxContents {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    input: Option<String>,
}

impl TransactionEvent {
    /// Build an event from the `result` object of a `newTxs` notification
    pub fn from_notification(result: Value) -> Result<Self, StreamError> {
        let notification: TxNotification = serde_json::from_value(result)
            .map_err(|e| StreamError::MalformedNotification(e.to_string()))?;
        let contents = notification
            .tx_contents
            .ok_or_else(|| StreamError::MalformedNotification("missing txContents".to_string()))?;
        let sender = contents
            .from
            .ok_or_else(|| StreamError::MalformedNotification("missing txContents.from".to_string()))?;
        let payload_hex = contents
            .input
            .ok_or_else(|| StreamError::MalformedNotification("missing txContents.input".to_string()))?;

        Ok(Self {
            tx_hash: notification.tx_hash,
            sender,
            recipient: contents.to,
            payload_hex,
        })
    }
}

/// Source of connections to the mempool feed
#[async_trait]
pub trait MempoolFeed: Send + Sync {
    type Connection: FeedConnection;

    async fn connect(&self) -> Result<Self::Connection, StreamError>;
}

/// A live connection to the feed
#[async_trait]
pub trait FeedConnection: Send {
    /// Issue a subscription and wait for the server to acknowledge it
    async fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionId, StreamError>;

    /// Wait for the next transaction on the given subscription
    async fn next_notification(
        &mut self,
        subscription: &SubscriptionId,
    ) -> Result<TransactionEvent, StreamError>;
}

/// Configuration for the websocket feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub uri: String,
    /// Sent verbatim as the `Authorization` header
    pub auth_header: Option<String>,
    /// Give up on a silent connection after this long
    pub idle_timeout: Option<Duration>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_STREAM_URI.to_string(),
            auth_header: None,
            idle_timeout: None,
        }
    }
}

impl FeedConfig {
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

/// bloXroute-style JSON-RPC websocket feed
#[derive(Debug, Clone)]
pub struct BloxrouteFeed {
    config: FeedConfig,
}

impl BloxrouteFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn uri(&self) -> &str {
        &self.config.uri
    }
}

#[async_trait]
impl MempoolFeed for BloxrouteFeed {
    type Connection = BloxrouteConnection;

    async fn connect(&self) -> Result<Self::Connection, StreamError> {
        let mut request = self
            .config
            .uri
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;

        if let Some(auth) = &self.config.auth_header {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| StreamError::InvalidRequest(format!("authorization header: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!("Connecting to feed at {}", self.config.uri);
        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

        Ok(BloxrouteConnection {
            socket,
            next_request_id: 1,
            idle_timeout: self.config.idle_timeout,
        })
    }
}

/// Open websocket to the feed
pub struct BloxrouteConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_request_id: u64,
    idle_timeout: Option<Duration>,
}

impl BloxrouteConnection {
    /// Read frames until a text frame arrives, answering pings on the way
    async fn next_text(&mut self) -> Result<String, StreamError> {
        loop {
            let frame = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, self.socket.next())
                    .await
                    .map_err(|_| StreamError::Timeout(limit.as_millis() as u64))?,
                None => self.socket.next().await,
            };

            match frame {
                None => return Err(StreamError::Closed),
                Some(Err(e)) => return Err(StreamError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Ping(data))) => {
                    self.socket
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| StreamError::Transport(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Feed sent close frame: {:?}", frame);
                    return Err(StreamError::Closed);
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

#[async_trait]
impl FeedConnection for BloxrouteConnection {
    async fn subscribe(&mut self, request: &SubscribeRequest) -> Result<SubscriptionId, StreamError> {
        let id = self.next_request_id;
        self.next_request_id += 1;

        let payload = request.to_rpc_json(id)?;
        self.socket
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| StreamError::SubscriptionFailed(e.to_string()))?;

        loop {
            let text = self.next_text().await?;
            let message: RpcMessage = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring unparseable frame while subscribing: {}", e);
                    continue;
                }
            };

            if !message.id.as_ref().is_some_and(|v| matches_request_id(v, id)) {
                continue;
            }
            if let Some(error) = message.error {
                return Err(StreamError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return match message.result {
                Some(Value::String(subscription)) => Ok(SubscriptionId(subscription)),
                other => Err(StreamError::SubscriptionFailed(format!(
                    "unexpected subscribe result: {:?}",
                    other
                ))),
            };
        }
    }

    async fn next_notification(
        &mut self,
        subscription: &SubscriptionId,
    ) -> Result<TransactionEvent, StreamError> {
        loop {
            let text = self.next_text().await?;
            let message: RpcMessage = serde_json::from_str(&text)
                .map_err(|e| StreamError::MalformedNotification(e.to_string()))?;

            if let Some(error) = message.error {
                return Err(StreamError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            let Some(params) = message.params else {
                continue;
            };
            if params.subscription != subscription.0 {
                continue;
            }
            return TransactionEvent::from_notification(params.result);
        }
    }
}

/// Servers echo the request id either as a number or as a string
fn matches_request_id(value: &Value, id: u64) -> bool {
    match value {
        Value::Number(n) => n.as_u64() == Some(id),
        Value::String(s) => s.parse::<u64>().ok() == Some(id),
        _ => false,
    }
}
