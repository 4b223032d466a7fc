//! Minimal relay hub: every text frame a peer sends is forwarded to all
//! other connected peers. Viewers and frontends both connect here; routing
//! by `viewer_id` happens at the endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use panoview_core::RelayConfig;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

// ─── Origin validation ───────────────────────────────────────────────

/// Accept local browser origins, `null` (file:// pages) and clients that
/// send no Origin header at all. Everything else gets a 403.
fn validate_origin(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    let Some(origin) = req.headers().get("origin") else {
        return Ok(resp);
    };
    let origin = origin.to_str().unwrap_or("");
    if origin_allowed(origin) {
        return Ok(resp);
    }
    tracing::warn!(origin = %origin, "relay: rejected connection from disallowed origin");
    let mut err = http::Response::new(Some("Origin not allowed".to_owned()));
    *err.status_mut() = http::StatusCode::FORBIDDEN;
    Err(err)
}

fn origin_allowed(origin: &str) -> bool {
    if origin == "null" {
        return true;
    }
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"));
    let Some(rest) = rest else { return false };
    let host = rest.split([':', '/']).next().unwrap_or("");
    host == "localhost" || host == "127.0.0.1"
}

// ─── RelayServer ─────────────────────────────────────────────────────

type Peers = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Message>>>>;

pub struct RelayServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    max_connections: usize,
    peers: Peers,
    next_peer: AtomicU64,
}

impl RelayServer {
    pub fn new(addr: SocketAddr, cancel: CancellationToken) -> Self {
        Self {
            addr,
            cancel,
            max_connections: RelayConfig::default().max_connections,
            peers: Arc::new(Mutex::new(HashMap::new())),
            next_peer: AtomicU64::new(1),
        }
    }

    pub fn from_config(
        config: &RelayConfig,
        cancel: CancellationToken,
    ) -> Result<Self, std::net::AddrParseError> {
        let addr = config.addr.parse()?;
        Ok(Self::new(addr, cancel).with_max_connections(config.max_connections))
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Number of peers currently connected.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, max_connections = self.max_connections, "relay listening");
        self.serve(listener).await
    }

    /// Bind and return the actual local address (useful with port 0).
    pub async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, max_connections = self.max_connections, "relay bound");
        Ok((listener, local_addr))
    }

    /// Accept loop on a pre-bound listener, until the token fires.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::error!(error = %e, "relay: TCP accept failed");
                            continue;
                        }
                    };
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        tracing::warn!(peer = %peer, max = self.max_connections, "relay: connection limit reached, rejecting");
                        drop(stream);
                        continue;
                    };
                    let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
                    let peers = Arc::clone(&self.peers);
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        match tokio_tungstenite::accept_hdr_async(stream, validate_origin).await {
                            Ok(ws) => handle_peer(id, peer, ws, peers, cancel).await,
                            Err(e) => tracing::debug!(peer = %peer, error = %e, "relay: handshake failed"),
                        }
                    });
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("relay: cancellation requested, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

// ─── Per-peer handler ────────────────────────────────────────────────

async fn handle_peer(
    id: u64,
    addr: SocketAddr,
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    peers: Peers,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    peers.lock().insert(id, tx.clone());
    tracing::debug!(peer = %addr, id, "relay: peer connected");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => broadcast(&peers, id, &text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "relay: read error, dropping peer");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                let _ = tx.send(Message::Close(None));
                break;
            }
        }
    }

    peers.lock().remove(&id);
    drop(tx);
    let _ = writer.await;
    tracing::debug!(peer = %addr, id, "relay: peer disconnected");
}

fn broadcast(peers: &Peers, from: u64, text: &str) {
    let peers = peers.lock();
    for (id, tx) in peers.iter() {
        if *id != from {
            let _ = tx.send(Message::Text(text.to_owned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    struct TestRelay {
        addr: SocketAddr,
        cancel: CancellationToken,
        server: Arc<RelayServer>,
    }

    impl Drop for TestRelay {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn start_test_relay() -> TestRelay {
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let server = Arc::new(RelayServer::new(addr, cancel.clone()));
        let (listener, local_addr) = server.bind().await.expect("bind");
        let serving = Arc::clone(&server);
        tokio::spawn(async move { serving.serve(listener).await });
        TestRelay {
            addr: local_addr,
            cancel,
            server,
        }
    }

    impl TestRelay {
        fn url(&self) -> String {
            format!("ws://127.0.0.1:{}", self.addr.port())
        }

        async fn connect(&self) -> Client {
            let (ws, _) = tokio_tungstenite::connect_async(self.url())
                .await
                .expect("connect");
            ws
        }

        async fn connect_with_origin(
            &self,
            origin: &str,
        ) -> Result<Client, tokio_tungstenite::tungstenite::Error> {
            let mut req = self.url().into_client_request().expect("request");
            req.headers_mut()
                .insert("Origin", origin.parse().expect("header"));
            tokio_tungstenite::connect_async(req).await.map(|(ws, _)| ws)
        }

        async fn wait_for_peers(&self, n: usize) {
            for _ in 0..100 {
                if self.server.peer_count() == n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("expected {n} peers, have {}", self.server.peer_count());
        }
    }

    async fn next_text(ws: &mut Client) -> String {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => text,
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn origin_rules() {
        assert!(origin_allowed("null"));
        assert!(origin_allowed("http://localhost:5173"));
        assert!(origin_allowed("https://127.0.0.1"));
        assert!(!origin_allowed("http://localhost.evil.com"));
        assert!(!origin_allowed("https://example.com"));
        assert!(!origin_allowed("tauri://localhost"));
    }

    #[tokio::test]
    async fn text_frames_fan_out_to_other_peers() {
        let relay = start_test_relay().await;
        let mut a = relay.connect().await;
        let mut b = relay.connect().await;
        let mut c = relay.connect().await;
        relay.wait_for_peers(3).await;

        a.send(Message::Text("hello".into())).await.expect("send");
        assert_eq!(next_text(&mut b).await, "hello");
        assert_eq!(next_text(&mut c).await, "hello");

        b.send(Message::Text("reply".into())).await.expect("send");
        assert_eq!(next_text(&mut a).await, "reply");
        assert_eq!(next_text(&mut c).await, "reply");
    }

    #[tokio::test]
    async fn disconnected_peer_is_dropped() {
        let relay = start_test_relay().await;
        let mut a = relay.connect().await;
        let _b = relay.connect().await;
        relay.wait_for_peers(2).await;
        a.close(None).await.expect("close");
        relay.wait_for_peers(1).await;
    }

    #[tokio::test]
    async fn foreign_origin_rejected() {
        let relay = start_test_relay().await;
        assert!(relay.connect_with_origin("https://evil.example").await.is_err());
        assert!(relay.connect_with_origin("http://localhost:3000").await.is_ok());
    }

    #[tokio::test]
    async fn connection_limit_enforced() {
        let cancel = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let server = RelayServer::new(addr, cancel.clone()).with_max_connections(1);
        let (listener, local) = server.bind().await.expect("bind");
        tokio::spawn(async move { server.serve(listener).await });
        let url = format!("ws://127.0.0.1:{}", local.port());

        let _first = tokio_tungstenite::connect_async(url.as_str())
            .await
            .expect("first");
        let second = tokio::time::timeout(
            Duration::from_secs(2),
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .expect("timed out");
        assert!(second.is_err());
        cancel.cancel();
    }
}
