//! End-to-end tests: real watcher, real server, WebSocket clients.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Once;
use std::time::{Duration, SystemTime};

use codestream_core::StreamConfig;
use codestream_server::Server;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(10);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("codestream_core=debug,codestream_server=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn write_at(path: &Path, content: &str, secs: u64) {
    std::fs::write(path, content).unwrap();
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Start a server watching `root` and return its address.
async fn start_server(root: &Path, cancel: &CancellationToken) -> (SocketAddr, JoinHandle<()>) {
    let config = StreamConfig::new(root)
        .with_listen("127.0.0.1:0".parse().unwrap())
        .with_debounce_ms(100)
        .with_drain_interval_ms(10);
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let cancel = cancel.clone();
    let task = tokio::spawn(async move {
        server.run(cancel).await.unwrap();
    });

    (addr, task)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

/// Read the next text frame as JSON.
async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read messages until an update for `filename` with `content` arrives.
async fn wait_for_update(client: &mut Client, filename: &str, content: &str) -> serde_json::Value {
    loop {
        let message = next_json(client).await;
        if message["action"] == "update"
            && message["filename"] == filename
            && message["content"] == content
        {
            return message;
        }
    }
}

#[tokio::test]
async fn test_subscriber_gets_initial_snapshot_newest_first() {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_at(&root.join("old.py"), "a=1\n", 1_000);
    write_at(&root.join("new.py"), "b=1\n", 2_000);
    write_at(&root.join("logo.png"), "png", 3_000);

    let cancel = CancellationToken::new();
    let (addr, task) = start_server(root, &cancel).await;
    let mut client = connect(addr).await;

    let first = next_json(&mut client).await;
    let second = next_json(&mut client).await;

    assert_eq!(first["action"], "initial");
    assert_eq!(first["filename"], "new.py");
    assert_eq!(first["content"], "b=1\n");
    assert_eq!(first["previous_content"], "");
    assert_eq!(first["language"], "py");
    assert_eq!(second["filename"], "old.py");

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_file_change_reaches_every_subscriber() {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_at(&root.join("a.py"), "x=1\n", 1_000);

    let cancel = CancellationToken::new();
    let (addr, task) = start_server(root, &cancel).await;

    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    assert_eq!(next_json(&mut first).await["action"], "initial");
    assert_eq!(next_json(&mut second).await["action"], "initial");

    std::fs::write(root.join("a.py"), "x=2\n").unwrap();

    let seen_by_first = wait_for_update(&mut first, "a.py", "x=2\n").await;
    let seen_by_second = wait_for_update(&mut second, "a.py", "x=2\n").await;

    let tags: BTreeSet<String> = seen_by_first["diff"]
        .as_array()
        .unwrap()
        .iter()
        .map(|line| line["tag"].as_str().unwrap().to_string())
        .collect();
    assert!(tags.contains("insert"));
    assert_eq!(seen_by_first, seen_by_second);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_closed_subscriber_does_not_stop_delivery() {
    init_tracing();
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_at(&root.join("a.py"), "x=1\n", 1_000);

    let cancel = CancellationToken::new();
    let (addr, task) = start_server(root, &cancel).await;

    let mut leaving = connect(addr).await;
    let mut staying = connect(addr).await;
    next_json(&mut leaving).await;
    next_json(&mut staying).await;
    leaving.close(None).await.unwrap();
    drop(leaving);

    std::fs::write(root.join("a.py"), "x=3\n").unwrap();
    let update = wait_for_update(&mut staying, "a.py", "x=3\n").await;
    assert_eq!(update["language"], "py");

    cancel.cancel();
    task.await.unwrap();
}
