//! Websocket Feed Integration Tests
//!
//! Runs the feed client against a local websocket server that speaks the
//! bloXroute `subscribe` / `newTxs` protocol.
//!
//! The live test at the bottom needs real credentials:
//! `BLOXROUTE_AUTH_HEADER=... cargo test --test bloxroute_feed -- --ignored`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use txnprose_ingestor::decoder::SpamMarkers;
use txnprose_ingestor::lexicon::Lexicon;
use txnprose_ingestor::notifier::{Notifier, Pager, PagerConfig, PagingError, PagingSink};
use txnprose_ingestor::stream::{
    BloxrouteFeed, FeedConfig, FeedConnection, MempoolFeed, StreamError, SubscribeRequest,
    SubscriptionId, DEFAULT_STREAM_URI,
};
use txnprose_ingestor::supervisor::{Supervisor, SupervisorConfig};
use txnprose_ingestor::MonitorContext;

const TEST_AUTH: &str = "dGVzdDpzZWNyZXQ=";

/// How the server answers the subscribe call
enum Reply {
    Subscribed(&'static str),
    Error(i64, &'static str),
}

/// Behaviour of one accepted connection
struct ConnScript {
    reply: Reply,
    frames: Vec<Message>,
    close: bool,
}

impl ConnScript {
    fn subscribed(id: &'static str, frames: Vec<Message>) -> Self {
        Self {
            reply: Reply::Subscribed(id),
            frames,
            close: false,
        }
    }

    fn then_close(mut self) -> Self {
        self.close = true;
        self
    }
}

/// Local stand-in for the feed endpoint
struct MockFeedServer {
    uri: String,
    requests: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockFeedServer {
    async fn start(scripts: Vec<ConnScript>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("ws://{}/ws", listener.local_addr().unwrap());

        let server = Self {
            uri,
            requests: Arc::default(),
            auth_headers: Arc::default(),
            connections: Arc::default(),
        };

        let requests = Arc::clone(&server.requests);
        let auth_headers = Arc::clone(&server.auth_headers);
        let connections = Arc::clone(&server.connections);
        tokio::spawn(async move {
            for script in scripts {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    script,
                    Arc::clone(&requests),
                    Arc::clone(&auth_headers),
                ));
            }
        });

        server
    }

    fn feed(&self) -> BloxrouteFeed {
        BloxrouteFeed::new(FeedConfig {
            auth_header: Some(TEST_AUTH.to_string()),
            ..FeedConfig::with_uri(&self.uri)
        })
    }
}

async fn serve(
    stream: TcpStream,
    script: ConnScript,
    requests: Arc<Mutex<Vec<Value>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
) {
    let record_auth = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let auth = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        auth_headers.lock().unwrap().push(auth);
        Ok(response)
    };
    let mut ws = accept_hdr_async(stream, record_auth).await.unwrap();

    let Some(Ok(frame)) = ws.next().await else {
        return;
    };
    let request: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    let id = request["id"].clone();
    requests.lock().unwrap().push(request);

    let reply = match script.reply {
        Reply::Subscribed(subscription) => json!({"jsonrpc": "2.0", "id": id, "result": subscription}),
        Reply::Error(code, message) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    };
    if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
        return;
    }

    for frame in script.frames {
        if ws.send(frame).await.is_err() {
            return;
        }
    }

    if script.close {
        let _ = ws.close(None).await;
    } else {
        while let Some(Ok(_)) = ws.next().await {}
    }
}

fn notification(subscription: &str, sender: &str, text: &str) -> Message {
    let body = json!({
        "jsonrpc": "2.0",
        "method": "subscribe",
        "params": {
            "subscription": subscription,
            "result": {
                "txHash": "0x5f1e",
                "txContents": {
                    "from": sender,
                    "to": "0xBBB",
                    "input": format!("0x{}", hex::encode(text)),
                }
            }
        }
    });
    Message::Text(body.to_string().into())
}

#[derive(Default)]
struct RecordingSink {
    pages: Mutex<Vec<String>>,
}

#[async_trait]
impl PagingSink for RecordingSink {
    async fn send(&self, body: &str) -> Result<(), PagingError> {
        self.pages.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

// ==================== Subscription Tests ====================

#[tokio::test]
async fn test_subscribe_sends_new_txs_request_with_auth() {
    let server = MockFeedServer::start(vec![ConnScript::subscribed("sub-1", vec![])]).await;

    let mut connection = server.feed().connect().await.unwrap();
    let subscription = connection.subscribe(&SubscribeRequest::default()).await.unwrap();
    assert_eq!(subscription, SubscriptionId("sub-1".to_string()));

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["method"], "subscribe");
    assert_eq!(requests[0]["params"][0], "newTxs");
    let include = requests[0]["params"][1]["include"].as_array().unwrap();
    assert!(include.contains(&json!("tx_contents.input")));
    assert!(include.contains(&json!("tx_contents.from")));

    let auth = server.auth_headers.lock().unwrap().clone();
    assert_eq!(auth, vec![Some(TEST_AUTH.to_string())]);
}

#[tokio::test]
async fn test_subscribe_rpc_error() {
    let server = MockFeedServer::start(vec![ConnScript {
        reply: Reply::Error(-32600, "Invalid account"),
        frames: vec![],
        close: false,
    }])
    .await;

    let mut connection = server.feed().connect().await.unwrap();
    let result = connection.subscribe(&SubscribeRequest::default()).await;

    match result {
        Err(StreamError::Rpc { code, message }) => {
            assert_eq!(code, -32600);
            assert_eq!(message, "Invalid account");
        }
        other => panic!("expected RPC error, got {:?}", other),
    }
}

// ==================== Notification Tests ====================

#[tokio::test]
async fn test_notifications_for_other_subscriptions_are_skipped() {
    let server = MockFeedServer::start(vec![ConnScript::subscribed(
        "sub-1",
        vec![
            notification("sub-other", "0xCCC", "not for us"),
            Message::Ping(vec![1, 2, 3].into()),
            notification("sub-1", "0xAAA", "hello world"),
        ],
    )])
    .await;

    let mut connection = server.feed().connect().await.unwrap();
    let subscription = connection.subscribe(&SubscribeRequest::default()).await.unwrap();
    let event = connection.next_notification(&subscription).await.unwrap();

    assert_eq!(event.sender, "0xAAA");
    assert_eq!(event.recipient.as_deref(), Some("0xBBB"));
    assert_eq!(event.tx_hash.as_deref(), Some("0x5f1e"));
    assert_eq!(event.payload_hex, format!("0x{}", hex::encode("hello world")));
}

#[tokio::test]
async fn test_server_close_ends_session() {
    let server = MockFeedServer::start(vec![ConnScript::subscribed(
        "sub-1",
        vec![notification("sub-1", "0xAAA", "the quick fox")],
    )
    .then_close()])
    .await;

    let mut connection = server.feed().connect().await.unwrap();
    let subscription = connection.subscribe(&SubscribeRequest::default()).await.unwrap();

    assert!(connection.next_notification(&subscription).await.is_ok());
    let result = connection.next_notification(&subscription).await;
    assert!(matches!(result, Err(StreamError::Closed)), "got {:?}", result);
}

#[tokio::test]
async fn test_unparseable_frame_is_malformed() {
    let server = MockFeedServer::start(vec![ConnScript::subscribed(
        "sub-1",
        vec![Message::Text("{not json".into())],
    )])
    .await;

    let mut connection = server.feed().connect().await.unwrap();
    let subscription = connection.subscribe(&SubscribeRequest::default()).await.unwrap();
    let result = connection.next_notification(&subscription).await;

    assert!(matches!(result, Err(StreamError::MalformedNotification(_))));
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let server = MockFeedServer::start(vec![ConnScript::subscribed("sub-1", vec![])]).await;
    let feed = BloxrouteFeed::new(FeedConfig {
        auth_header: Some(TEST_AUTH.to_string()),
        idle_timeout: Some(Duration::from_millis(200)),
        ..FeedConfig::with_uri(&server.uri)
    });

    let mut connection = feed.connect().await.unwrap();
    let subscription = connection.subscribe(&SubscribeRequest::default()).await.unwrap();
    let result = connection.next_notification(&subscription).await;

    assert!(matches!(result, Err(StreamError::Timeout(200))), "got {:?}", result);
}

// ==================== Supervisor Tests ====================

#[tokio::test]
async fn test_supervisor_reconnects_after_server_close() {
    let server = MockFeedServer::start(vec![
        ConnScript::subscribed("sub-1", vec![notification("sub-1", "0xA1", "the quick fox")])
            .then_close(),
        ConnScript::subscribed("sub-2", vec![notification("sub-2", "0xA2", "hello world")]),
    ])
    .await;

    let context = MonitorContext::new(
        Lexicon::from_text("the quick fox hello world"),
        SpamMarkers::default(),
    );
    let sink = Arc::new(RecordingSink::default());
    let pager = Pager::spawn(
        sink.clone(),
        PagerConfig {
            max_in_flight: 1,
            ..Default::default()
        },
    );
    let config = SupervisorConfig {
        reconnect_delay_ms: 50,
        ..Default::default()
    };
    let supervisor = Supervisor::new(
        server.feed(),
        Arc::new(context),
        Notifier::with_pager(pager),
        config,
    );
    let stats = supervisor.stats();

    let handle = tokio::spawn(supervisor.run());
    for _ in 0..500 {
        if sink.pages.lock().unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        *sink.pages.lock().unwrap(),
        vec!["0xA1 -> 0xBBB\nthe quick fox ", "0xA2 -> 0xBBB\nhello world "]
    );
    assert_eq!(server.connections.load(Ordering::SeqCst), 2);
    assert_eq!(stats.disconnects(), 1);

    handle.abort();
}

// ==================== Live Feed Tests ====================

#[tokio::test]
#[ignore = "Requires BLOXROUTE_AUTH_HEADER and network access"]
async fn test_live_feed_delivers_transactions() {
    let Ok(auth) = std::env::var("BLOXROUTE_AUTH_HEADER") else {
        eprintln!("Skipping test: BLOXROUTE_AUTH_HEADER not set");
        return;
    };
    let uri = std::env::var("BLOXROUTE_WSS_URI").unwrap_or_else(|_| DEFAULT_STREAM_URI.to_string());
    let feed = BloxrouteFeed::new(FeedConfig {
        auth_header: Some(auth),
        ..FeedConfig::with_uri(uri)
    });

    let mut connection = feed.connect().await.expect("Failed to connect");
    let subscription = connection
        .subscribe(&SubscribeRequest::default())
        .await
        .expect("Failed to subscribe");

    let event = tokio::time::timeout(Duration::from_secs(30), connection.next_notification(&subscription))
        .await
        .expect("No transaction within 30s")
        .expect("Stream error");

    assert!(event.sender.starts_with("0x"));
    assert!(event.payload_hex.starts_with("0x"));
}
