//! End-to-end flows through the full stack on an ephemeral port

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parley_config::Config;
use parley_core::{handler_fn, ChatMessage, EventName};
use parley_gateway::GatewayError;
use parley_llm::{LLMError, LLMProvider, Result as LLMResult};
use parley_server::App;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Replies "reply to: <prompt>", fails on "fail", and holds "slow" prompts
/// until released
#[derive(Default)]
struct MockBackend {
    release: Notify,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl LLMProvider for MockBackend {
    fn provider_id(&self) -> &str {
        "mock"
    }

    async fn generate(&self, history: &[ChatMessage]) -> LLMResult<String> {
        self.prompts.lock().unwrap().push(history.to_vec());
        let last = history
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        match last.as_str() {
            "fail" => Err(LLMError::Network("model offline".to_string())),
            "slow" => {
                self.release.notified().await;
                Ok("finally".to_string())
            }
            _ => Ok(format!("reply to: {}", last)),
        }
    }

    async fn validate(&self) -> LLMResult<()> {
        Ok(())
    }
}

struct Server {
    app: App,
    addr: SocketAddr,
    backend: Arc<MockBackend>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<Result<(), GatewayError>>>,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start(config: Config) -> Server {
    let backend = Arc::new(MockBackend::default());
    let app = App::new(&config, backend.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = {
        let app = app.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { app.serve(listener, shutdown).await })
    };
    Server {
        app,
        addr,
        backend,
        shutdown,
        handle: Some(handle),
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

async fn next_frame(client: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let next = timeout(Duration::from_millis(200), client.next()).await;
    assert!(next.is_err(), "unexpected frame: {:?}", next);
}

#[tokio::test]
async fn test_ack_then_response_on_same_session() {
    let server = start(Config::default()).await;
    let mut client = connect(server.addr).await;

    send(&mut client, r#"{"message": "hello"}"#).await;

    let ack = next_frame(&mut client).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["message"], "Prompt received and being processed");

    let response = next_frame(&mut client).await;
    assert_eq!(response["type"], "response");
    assert_eq!(response["message"], "reply to: hello");
    assert_eq!(response["session_id"], ack["session_id"]);

    send(&mut client, r#"{"message": "again"}"#).await;
    next_frame(&mut client).await;
    let response = next_frame(&mut client).await;
    assert_eq!(response["message"], "reply to: again");

    let histories = server.backend.prompts.lock().unwrap().clone();
    assert_eq!(
        histories.last().unwrap(),
        &vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("reply to: hello"),
            ChatMessage::user("again"),
        ]
    );
}

#[tokio::test]
async fn test_files_are_formatted_into_the_prompt() {
    let server = start(Config::default()).await;
    let mut client = connect(server.addr).await;

    send(
        &mut client,
        r#"{"message": "review", "files": [{"filename": "lib.rs", "content": "fn main() {}"}, {"filename": "bad"}]}"#,
    )
    .await;
    next_frame(&mut client).await;
    next_frame(&mut client).await;

    let histories = server.backend.prompts.lock().unwrap().clone();
    let prompt = &histories[0][0].content;
    assert!(prompt.starts_with("review\n\nHere are the relevant files:\n\n"));
    assert!(prompt.contains("File: lib.rs\n```rust\nfn main() {}\n```"));
    assert!(!prompt.contains("bad"));
}

#[tokio::test]
async fn test_malformed_json_then_still_usable() {
    let server = start(Config::default()).await;
    let mut client = connect(server.addr).await;

    send(&mut client, "not json at all").await;
    let error = next_frame(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Invalid message format");

    send(&mut client, r#"{"message": "ok now"}"#).await;
    let ack = next_frame(&mut client).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["session_id"], error["session_id"]);
    let response = next_frame(&mut client).await;
    assert_eq!(response["message"], "reply to: ok now");
}

#[tokio::test]
async fn test_backend_error_yields_single_response() {
    let server = start(Config::default()).await;
    let mut client = connect(server.addr).await;

    send(&mut client, r#"{"message": "fail"}"#).await;
    assert_eq!(next_frame(&mut client).await["type"], "ack");

    let response = next_frame(&mut client).await;
    assert_eq!(response["type"], "response");
    let text = response["message"].as_str().unwrap();
    assert!(text.starts_with("Error generating response: "));
    assert!(text.contains("model offline"));

    assert_silent(&mut client).await;
}

#[tokio::test]
async fn test_second_request_rejected_while_busy() {
    let server = start(Config::default()).await;
    let mut client = connect(server.addr).await;

    send(&mut client, r#"{"message": "slow"}"#).await;
    assert_eq!(next_frame(&mut client).await["type"], "ack");

    send(&mut client, r#"{"message": "impatient"}"#).await;
    let busy = next_frame(&mut client).await;
    assert_eq!(busy["type"], "error");
    assert_eq!(busy["message"], parley_router::BUSY_MESSAGE);

    server.backend.release.notify_one();
    let response = next_frame(&mut client).await;
    assert_eq!(response["message"], "finally");

    // The rejected prompt never made it into history
    send(&mut client, r#"{"message": "next"}"#).await;
    next_frame(&mut client).await;
    next_frame(&mut client).await;
    let histories = server.backend.prompts.lock().unwrap().clone();
    assert_eq!(
        histories.last().unwrap(),
        &vec![
            ChatMessage::user("slow"),
            ChatMessage::assistant("finally"),
            ChatMessage::user("next"),
        ]
    );
}

#[tokio::test]
async fn test_response_after_disconnect_is_dropped() {
    let server = start(Config::default()).await;
    let (generated_tx, mut generated_rx) = mpsc::unbounded_channel();
    server.app.bus().subscribe(
        EventName::ResponseGenerated,
        handler_fn("test_generated", move |event| {
            let generated_tx = generated_tx.clone();
            async move {
                let _ = generated_tx.send(event.session_id().map(str::to_string));
                anyhow::Ok(())
            }
        }),
    );

    let mut client = connect(server.addr).await;
    send(&mut client, r#"{"message": "slow"}"#).await;
    let ack = next_frame(&mut client).await;
    client.close(None).await.unwrap();

    let sessions = server.app.sessions().clone();
    timeout(Duration::from_secs(5), async {
        while sessions.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session not closed");

    server.backend.release.notify_one();
    let generated = timeout(Duration::from_secs(5), generated_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(generated.as_deref(), ack["session_id"].as_str());
    assert!(server.app.gateway().deliveries().is_empty());
}

#[tokio::test]
async fn test_capacity_limit() {
    let mut config = Config::default();
    config.gateway.max_connections = 1;
    let server = start(config).await;

    let mut first = connect(server.addr).await;
    send(&mut first, r#"{"message": "hi"}"#).await;
    next_frame(&mut first).await;

    let mut second = connect(server.addr).await;
    let rejection = next_frame(&mut second).await;
    assert_eq!(rejection["type"], "error");
    assert_eq!(rejection["message"], "Server at capacity");
    assert_eq!(rejection["session_id"], "");
    assert_eq!(server.app.sessions().session_count(), 1);
}

#[tokio::test]
async fn test_ack_can_be_disabled() {
    let mut config = Config::default();
    config.router.send_ack = false;
    let server = start(config).await;
    let mut client = connect(server.addr).await;

    send(&mut client, r#"{"message": "quiet"}"#).await;
    let response = next_frame(&mut client).await;
    assert_eq!(response["type"], "response");
    assert_eq!(response["message"], "reply to: quiet");
}

#[tokio::test]
async fn test_shutdown_with_client_stuck_before_handshake() {
    let mut server = start(Config::default()).await;
    let _raw = TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.shutdown.cancel();
    let handle = server.handle.take().unwrap();
    timeout(Duration::from_secs(3), handle)
        .await
        .expect("server still waiting on the handshake")
        .unwrap()
        .unwrap();
}
