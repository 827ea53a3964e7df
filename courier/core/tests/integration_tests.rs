//! Integration tests for the courier client core
//!
//! These tests verify that multiple components work together correctly in
//! realistic usage scenarios. Tests cover:
//! - WebSocket transport against a live in-process server (connect, send,
//!   receive, unexpected close, heartbeat starvation)
//! - Reconnect budget exhaustion with the terminal notification
//! - REST token refresh and forced logout against a scripted HTTP server
//! - The chat store applying a full stream over an injected transport

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use courier_core::api::{
    ApiError, AuthState, ChatApi, HttpApi, MessageRecord, SessionRecord, TokenPair,
};
use courier_core::notify::{NotificationKind, Notifier, NotifyLevel};
use courier_core::protocol::{Envelope, MessageId, MessageRole, SessionId};
use courier_core::session::DeliveryState;
use courier_core::store::ChatStore;
use courier_core::transport::{
    ChatTransport, ConnectionStatus, HeartbeatConfig, InProcessTransport, ReconnectConfig,
    WebSocketConfig, WebSocketTransport,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Poll `condition` until it holds or five seconds pass.
async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// One HTTP request as the scripted server saw it.
#[derive(Debug)]
struct RecordedRequest {
    method: String,
    path: String,
    bearer: Option<String>,
    body: String,
}

/// Read one HTTP/1.1 request (head plus content-length body) off a socket.
async fn read_http_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => head.push(byte[0]),
        }
    }

    let head = String::from_utf8_lossy(&head).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut bearer = None;
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "authorization" => bearer = value.strip_prefix("Bearer ").map(str::to_string),
                "content-length" => content_length = value.parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        stream.read_exact(&mut body).await.ok()?;
    }

    Some(RecordedRequest {
        method,
        path,
        bearer,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Serve one scripted response per connection, recording each request.
///
/// Every response carries `Connection: close`, so the client opens a fresh
/// connection per request and the script stays in lockstep.
fn spawn_http_server(
    listener: TcpListener,
    responses: Vec<(u16, &'static str)>,
) -> (
    Arc<StdMutex<Vec<RecordedRequest>>>,
    tokio::task::JoinHandle<()>,
) {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let seen = Arc::clone(&log);

    let handle = tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let Some(request) = read_http_request(&mut stream).await else {
                return;
            };
            seen.lock().unwrap().push(request);

            let reason = match status {
                200 => "OK",
                401 => "Unauthorized",
                _ => "Error",
            };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (log, handle)
}

// =============================================================================
// Test 1: WebSocket round trip against a live server
// =============================================================================

/// Connect to a real WebSocket server, send an envelope, and receive the
/// typed reply through a subscription. Also exercises the idempotent
/// double-disconnect at the end.
#[tokio::test]
async fn test_websocket_round_trip_against_live_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let envelope = Envelope::parse(&text).unwrap();
                if envelope.kind == "question" {
                    let reply =
                        Envelope::new("content", json!({ "message_id": "m1", "content": "42" }));
                    ws.send(Message::Text(reply.to_text().unwrap()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    let config = WebSocketConfig::new(format!("ws://{addr}"))
        .with_reconnect(ReconnectConfig::disabled())
        .with_heartbeat(HeartbeatConfig::disabled());
    let transport = WebSocketTransport::new(config);

    let (frames_tx, mut frames_rx) = mpsc::channel(8);
    let _frames = transport.on_message(
        "content",
        Box::new(move |envelope| {
            let _ = frames_tx.try_send(envelope.clone());
        }),
    );

    transport.connect();
    wait_until("connection", || {
        transport.status() == ConnectionStatus::Connected
    })
    .await;

    transport.send(Envelope::new("question", json!({ "text": "meaning of life" })));

    let envelope = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("no reply within deadline")
        .expect("subscription channel closed");
    assert_eq!(envelope.kind, "content");
    assert_eq!(envelope.data["content"], "42");

    transport.disconnect().await;
    assert_eq!(transport.status(), ConnectionStatus::Disconnected);
    transport.disconnect().await;
    assert_eq!(transport.status(), ConnectionStatus::Disconnected);

    server.abort();
}

// =============================================================================
// Test 2: Automatic reconnect after an unexpected close
// =============================================================================

/// A server that drops the connection right after the handshake triggers the
/// reconnect policy; the transport must come back on its own.
#[tokio::test]
async fn test_reconnects_after_unexpected_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // First connection: handshake, then drop without a close frame
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Second connection: stay open until the test finishes
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = WebSocketConfig::new(format!("ws://{addr}"))
        .with_reconnect(ReconnectConfig::for_testing())
        .with_heartbeat(HeartbeatConfig::disabled());
    let transport = WebSocketTransport::new(config);

    let connects = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&connects);
    let _connects = transport.on_connect(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    transport.connect();
    wait_until("second connection", || {
        connects.load(Ordering::SeqCst) >= 2
    })
    .await;
    wait_until("connected status", || {
        transport.status() == ConnectionStatus::Connected
    })
    .await;

    transport.disconnect().await;
    server.abort();
}

// =============================================================================
// Test 3: Reconnect budget exhaustion
// =============================================================================

/// With nothing listening, a 3-attempt budget yields the initial failure,
/// three retries, then the terminal error, the notification, and status
/// `Disconnected`.
#[tokio::test]
async fn test_reconnect_exhaustion_notifies_and_goes_disconnected() {
    // Bind and immediately drop to get a port that refuses connections
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (notifier, mut notifications) = Notifier::channel(8);
    let errors = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&errors);

    let config = WebSocketConfig::new(format!("ws://{addr}"))
        .with_reconnect(ReconnectConfig::for_testing())
        .with_heartbeat(HeartbeatConfig::disabled());
    let transport = WebSocketTransport::new(config).with_notifier(notifier);
    let _errors = transport.on_error(Box::new(move |error| {
        sink.lock().unwrap().push(error.to_string());
    }));

    transport.connect();

    let notification = timeout(Duration::from_secs(5), notifications.recv())
        .await
        .expect("no terminal notification within deadline")
        .expect("notifier channel closed");
    assert_eq!(notification.level, NotifyLevel::Error);
    assert_eq!(notification.kind, NotificationKind::Transport);
    assert_eq!(notification.title.as_deref(), Some("Connection"));
    assert!(notification.message.contains("after 3 attempts"));

    wait_until("disconnected status", || {
        transport.status() == ConnectionStatus::Disconnected
    })
    .await;

    let errors = errors.lock().unwrap();
    let dial_failures = errors
        .iter()
        .filter(|e| e.starts_with("Connection failed"))
        .count();
    assert_eq!(dial_failures, 4, "initial dial plus three budgeted retries");
    assert_eq!(
        errors.last().unwrap(),
        "Failed to reconnect after 3 attempts"
    );
}

// =============================================================================
// Test 4: Heartbeat starvation forces a reconnect
// =============================================================================

/// A server that accepts the socket but never answers protocol pings must be
/// declared dead by the heartbeat monitor, and the transport reconnects.
#[tokio::test]
async fn test_heartbeat_starvation_forces_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                // Read and discard everything; no pongs ever go back
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    let config = WebSocketConfig::new(format!("ws://{addr}"))
        .with_reconnect(ReconnectConfig::for_testing())
        .with_heartbeat(HeartbeatConfig::for_testing());
    let transport = WebSocketTransport::new(config);

    let connects = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&connects);
    let _connects = transport.on_connect(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let heartbeat_losses = Arc::new(AtomicU32::new(0));
    let sink = Arc::clone(&heartbeat_losses);
    let _errors = transport.on_error(Box::new(move |error| {
        if error.to_string().contains("heartbeat") {
            sink.fetch_add(1, Ordering::SeqCst);
        }
    }));

    transport.connect();
    wait_until("heartbeat-triggered reconnect", || {
        heartbeat_losses.load(Ordering::SeqCst) >= 1 && connects.load(Ordering::SeqCst) >= 2
    })
    .await;

    transport.disconnect().await;
    server.abort();
}

// =============================================================================
// Test 5: Token refresh and retry on 401
// =============================================================================

/// A 401 triggers exactly one refresh and one retry, and the retry carries
/// the fresh bearer.
#[tokio::test]
async fn test_401_refreshes_once_and_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (log, server) = spawn_http_server(
        listener,
        vec![
            (401, r#"{"detail":"token expired"}"#),
            (
                200,
                r#"{"access_token":"fresh-access","refresh_token":"fresh-refresh"}"#,
            ),
            (200, "[]"),
        ],
    );

    let auth = Arc::new(AuthState::in_memory());
    auth.store(TokenPair::new("stale-access", "stale-refresh"))
        .await
        .unwrap();

    let api = HttpApi::new(format!("http://{addr}"), Arc::clone(&auth));
    let sessions = api.list_sessions().await.unwrap();
    assert!(sessions.is_empty());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3, "original, refresh, retry; nothing more");
    assert_eq!(log[0].method, "GET");
    assert_eq!(log[0].path, "/api/sessions");
    assert_eq!(log[0].bearer.as_deref(), Some("stale-access"));
    assert_eq!(log[1].method, "POST");
    assert_eq!(log[1].path, "/api/auth/refresh");
    assert!(log[1].body.contains("stale-refresh"));
    assert_eq!(log[2].path, "/api/sessions");
    assert_eq!(log[2].bearer.as_deref(), Some("fresh-access"));

    assert_eq!(auth.bearer().as_deref(), Some("fresh-access"));
    server.abort();
}

// =============================================================================
// Test 6: Failed refresh forces logout
// =============================================================================

/// When the refresh itself is rejected, tokens are cleared, the call returns
/// `Unauthorized`, and surfaces get the signed-out notification.
#[tokio::test]
async fn test_failed_refresh_forces_logout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (log, server) = spawn_http_server(
        listener,
        vec![
            (401, r#"{"detail":"token expired"}"#),
            (401, r#"{"detail":"refresh expired"}"#),
        ],
    );

    let (notifier, mut notifications) = Notifier::channel(8);
    let auth = Arc::new(AuthState::in_memory());
    auth.store(TokenPair::new("stale-access", "stale-refresh"))
        .await
        .unwrap();

    let api = HttpApi::new(format!("http://{addr}"), Arc::clone(&auth)).with_notifier(notifier);
    let result = api.list_sessions().await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert!(!auth.is_authenticated());

    let notification = timeout(Duration::from_secs(1), notifications.recv())
        .await
        .expect("no signed-out notification")
        .expect("notifier channel closed");
    assert_eq!(notification.kind, NotificationKind::Auth);
    assert_eq!(notification.level, NotifyLevel::Error);
    assert_eq!(notification.title.as_deref(), Some("Signed out"));

    assert_eq!(log.lock().unwrap().len(), 2, "no retry after failed refresh");
    server.abort();
}

// =============================================================================
// Test 7: Chat store end to end over an injected transport
// =============================================================================

/// Scripted backend for driving the store without a server.
struct ScriptedApi {
    create_calls: AtomicU32,
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        Ok(Vec::new())
    }

    async fn create_session(&self, title: Option<String>) -> Result<SessionRecord, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SessionRecord {
            id: SessionId("s-live".to_string()),
            title: title.unwrap_or_else(|| "New chat".to_string()),
            created_at: 1,
            last_activity: 1,
            message_count: None,
        })
    }

    async fn rename_session(
        &self,
        session_id: &SessionId,
        title: String,
    ) -> Result<SessionRecord, ApiError> {
        Ok(SessionRecord {
            id: session_id.clone(),
            title,
            created_at: 1,
            last_activity: 1,
            message_count: None,
        })
    }

    async fn delete_session(&self, _session_id: &SessionId) -> Result<(), ApiError> {
        Ok(())
    }

    async fn list_messages(&self, _session_id: &SessionId) -> Result<Vec<MessageRecord>, ApiError> {
        Ok(Vec::new())
    }

    async fn post_message(
        &self,
        session_id: &SessionId,
        content: String,
    ) -> Result<MessageRecord, ApiError> {
        Ok(MessageRecord {
            id: MessageId("u-live".to_string()),
            session_id: session_id.clone(),
            role: MessageRole::User,
            content,
            created_at: 2,
            sources: Vec::new(),
            citations: Vec::new(),
        })
    }

    async fn regenerate(
        &self,
        _session_id: &SessionId,
        _message_id: &MessageId,
    ) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Send on a fresh account, then play a whole stream through the transport:
/// exactly one session is created, the placeholder rebinds to the server's
/// message id, and the final authoritative content wins.
#[tokio::test]
async fn test_store_applies_full_stream_over_injected_transport() {
    let (raw, _outbound) = InProcessTransport::new_pair();
    let transport = Arc::new(raw);
    let dyn_transport: Arc<dyn ChatTransport> = transport.clone();

    let api = Arc::new(ScriptedApi {
        create_calls: AtomicU32::new(0),
    });
    let mut store = ChatStore::new(Arc::clone(&api), dyn_transport);

    store.connect();
    assert_eq!(store.connection_status(), ConnectionStatus::Connected);

    let receipt = store.send_message("Hello", None).await.unwrap();
    assert!(receipt.created_session);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.messages().len(), 2, "confirmed user plus placeholder");
    assert!(store.is_streaming());

    // The server streams under its own message id
    transport.inject(Envelope::new(
        "start",
        json!({ "session_id": "s-live", "message_id": "a-live" }),
    ));
    transport.inject(Envelope::new(
        "content",
        json!({ "message_id": "a-live", "content": "The answer" }),
    ));
    transport.inject(Envelope::new(
        "content",
        json!({ "message_id": "a-live", "content": " is 42." }),
    ));
    transport.inject(Envelope::new(
        "end",
        json!({ "message_id": "a-live", "final_content": "The answer is 42!" }),
    ));

    assert_eq!(store.pump_events(), 4);

    let assistants: Vec<_> = store
        .messages()
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .collect();
    assert_eq!(assistants.len(), 1, "placeholder rebound, not duplicated");
    assert_eq!(assistants[0].id.0, "a-live");
    assert_eq!(assistants[0].content, "The answer is 42!");
    assert!(!assistants[0].streaming);
    assert!(!store.is_streaming());

    let users: Vec<_> = store
        .messages()
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .collect();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id.0, "u-live");
    assert_eq!(users[0].delivery, DeliveryState::Sent);
}
