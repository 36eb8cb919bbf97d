#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use lr_server::{DevServer, LiveReloadOptions, ServerConfig};
use tokio::net::{TcpSocket, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async, connect_async};

pub const DEBOUNCE: Duration = Duration::from_millis(100);
pub const WAIT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client over a plain socket with a caller-chosen receive buffer.
pub type RawClient = WebSocketStream<TcpStream>;

/// Temporary root with `index.html` and `main.wasm`.
pub fn fixture() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("index.html"), "<!doctype html><p>hello</p>").unwrap();
    std::fs::write(root.join("main.wasm"), [0x00, 0x61, 0x73, 0x6d, 0x01]).unwrap();
    (dir, root)
}

pub async fn start(root: &Path) -> DevServer {
    start_with(root, |_| {}).await
}

pub async fn start_with(root: &Path, configure: impl FnOnce(&mut LiveReloadOptions)) -> DevServer {
    let mut live_reload = LiveReloadOptions {
        host: "127.0.0.1".to_owned(),
        port: 0,
        debounce: DEBOUNCE,
        ..LiveReloadOptions::default()
    };
    configure(&mut live_reload);

    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        root_dir: root.to_path_buf(),
        live_reload: Some(live_reload),
    };
    DevServer::start(config).await.unwrap()
}

pub async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

/// Connect over a socket whose receive buffer is capped at `recv_buffer` bytes.
pub async fn connect_raw(addr: SocketAddr, recv_buffer: u32) -> RawClient {
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(recv_buffer).unwrap();
    let stream = socket.connect(addr).await.unwrap();
    let (client, _) = client_async(format!("ws://{addr}/ws"), stream).await.unwrap();
    client
}

pub async fn wait_for_clients(server: &DevServer, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while server.client_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} clients, have {}", server.client_count()));
}

/// Next text frame, skipping control frames.
pub async fn next_text(client: &mut Client) -> Option<String> {
    while let Some(message) = client.next().await {
        match message.ok()? {
            Message::Text(text) => return Some(text.as_str().to_owned()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Whether a text frame arrives within `within`.
pub async fn receives_within(client: &mut Client, within: Duration) -> bool {
    matches!(
        tokio::time::timeout(within, next_text(client)).await,
        Ok(Some(_))
    )
}

/// Give the watcher time to settle before the first write.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}
