//! Ida y vuelta contra el servidor IPC con un bridge en memoria.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use taskflow_domain::{merge_context, ContextMap, LogLevel};
use taskflow_ipc::{ContextBridge, IpcReply, IpcRequest, IpcServer};

#[derive(Default)]
struct MapBridge {
    inner: RwLock<ContextMap>,
}

#[async_trait]
impl ContextBridge for MapBridge {
    async fn apply_update(&self, entries: ContextMap) {
        let mut guard = self.inner.write().await;
        *guard = merge_context(&guard, &entries);
    }

    async fn snapshot(&self) -> ContextMap {
        self.inner.read().await.clone()
    }
}

struct Client {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl Client {
    async fn connect(server: &IpcServer) -> Client {
        let stream = UnixStream::connect(server.socket_path()).await.expect("connect");
        let (read_half, writer) = stream.into_split();
        Client { reader: BufReader::new(read_half), writer }
    }

    async fn send_raw(&mut self, raw: &str) -> IpcReply {
        self.writer.write_all(raw.as_bytes()).await.expect("write");
        self.writer.write_all(b"\n").await.expect("write newline");
        let mut line = String::new();
        self.reader.read_line(&mut line).await.expect("read reply");
        serde_json::from_str(&line).expect("decode reply")
    }

    async fn send(&mut self, req: &IpcRequest) -> IpcReply {
        let raw = serde_json::to_string(req).expect("encode request");
        self.send_raw(&raw).await
    }
}

#[tokio::test]
async fn update_and_snapshot_round_trip() {
    let bridge = Arc::new(MapBridge::default());
    let server = IpcServer::bind(Uuid::new_v4(), bridge).expect("bind");
    let mut client = Client::connect(&server).await;

    let mut entries = ContextMap::new();
    entries.insert("answer".to_string(), json!(42));
    let reply = client.send(&IpcRequest::Update { entries }).await;
    assert!(reply.ok);

    let reply = client.send(&IpcRequest::Snapshot).await;
    assert!(reply.ok);
    let ctx = reply.context.expect("snapshot carries the context");
    assert_eq!(ctx.get("answer"), Some(&json!(42)));

    server.shutdown();
}

#[tokio::test]
async fn malformed_line_keeps_connection_alive() {
    let bridge = Arc::new(MapBridge::default());
    let server = IpcServer::bind(Uuid::new_v4(), bridge).expect("bind");
    let mut client = Client::connect(&server).await;

    let reply = client.send_raw("this is not json").await;
    assert!(!reply.ok);
    assert!(reply.error.is_some());

    // La misma conexión sigue sirviendo peticiones válidas.
    let reply = client.send(&IpcRequest::Snapshot).await;
    assert!(reply.ok);

    server.shutdown();
}

#[tokio::test]
async fn log_requests_follow_the_routing_window() {
    let bridge = Arc::new(MapBridge::default());
    let server = IpcServer::bind(Uuid::new_v4(), bridge).expect("bind");
    let mut client = Client::connect(&server).await;

    // Sin ventana abierta: se confirma y se descarta.
    let reply = client.send(&IpcRequest::Log { level: "INFO".to_string(),
                                               message: "lost".to_string() }).await;
    assert!(reply.ok);
    assert_eq!(server.unroute_logs().await, 0);

    let (tx, mut rx) = mpsc::channel(8);
    server.route_logs("step_a.sh", tx).await;
    let reply = client.send(&IpcRequest::Log { level: "warning".to_string(),
                                               message: "heads up".to_string() }).await;
    assert!(reply.ok);

    let line = rx.recv().await.expect("routed line");
    assert_eq!(line.level, LogLevel::Warning);
    assert_eq!(line.message, "heads up");
    assert_eq!(line.script, "step_a.sh");
    assert_eq!(server.unroute_logs().await, 1, "delivered count covers the window");

    server.shutdown();
}

#[tokio::test]
async fn client_disconnect_does_not_stop_the_server() {
    let bridge = Arc::new(MapBridge::default());
    let server = IpcServer::bind(Uuid::new_v4(), bridge).expect("bind");

    {
        let mut early = Client::connect(&server).await;
        let reply = early.send(&IpcRequest::Snapshot).await;
        assert!(reply.ok);
    }

    let mut late = Client::connect(&server).await;
    let reply = late.send(&IpcRequest::Snapshot).await;
    assert!(reply.ok);

    server.shutdown();
    assert!(!server.socket_path().exists(), "shutdown removes the socket file");
}
