//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use forward_proxy::audit::{AuditRecord, MemoryAuditLog};
use forward_proxy::config::{ListenerConfig, ProxyConfig};
use forward_proxy::net::Listener;
use forward_proxy::policy::{BlockList, PolicyStore};
use forward_proxy::proxy::{ProxyContext, ProxyServer, SessionSettings};
use forward_proxy::Shutdown;

/// A proxy running on an ephemeral port with an in-memory audit log.
pub struct ProxyHarness {
    pub addr: SocketAddr,
    pub audit: Arc<MemoryAuditLog>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl ProxyHarness {
    /// Wait until at least `n` audit records exist, then return them.
    pub async fn wait_for_records(&self, n: usize) -> Vec<AuditRecord> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let records = self.audit.records();
            if records.len() >= n {
                return records;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {n} audit records, have {}",
                records.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop accepting and wait for the server task to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }

    /// Proxy URL for HTTP clients.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start a proxy blocking `blocked`, with short timeouts suited to tests.
pub async fn start_proxy(blocked: &[&str]) -> ProxyHarness {
    start_proxy_with(blocked, |_| {}).await
}

/// Start a proxy after letting the caller adjust the config.
pub async fn start_proxy_with<F>(blocked: &[&str], configure: F) -> ProxyHarness
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = ProxyConfig::default();
    config.timeouts.connect_secs = 2;
    config.timeouts.io_secs = 2;
    config.timeouts.header_read_secs = 2;
    config.shutdown.drain_secs = 2;
    configure(&mut config);

    let listener = Listener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        max_connections: config.listener.max_connections,
    })
    .await
    .unwrap();

    let audit = Arc::new(MemoryAuditLog::new());
    let ctx = ProxyContext::new(
        PolicyStore::new(BlockList::from_hosts(blocked.iter().copied())),
        audit.clone(),
        SessionSettings::from(&config),
    );
    let server = ProxyServer::new(
        listener,
        ctx,
        Duration::from_secs(config.shutdown.drain_secs),
    );
    let addr = server.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(shutdown.token()));

    ProxyHarness {
        addr,
        audit,
        shutdown,
        handle,
    }
}

/// Read from `socket` until the end of an HTTP head, returning what was read.
pub async fn read_head(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    buf
}

/// Start a mock origin that answers every request with `body`.
///
/// Returns its address and a count of accepted connections.
pub async fn start_fixed_origin(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let payload = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    start_origin(move |_| payload.clone().into_bytes()).await
}

/// Start a mock origin that sends a `size`-byte body of patterned bytes.
///
/// Returns its address and the exact response it writes.
pub async fn start_large_origin(size: usize) -> (SocketAddr, Vec<u8>) {
    let mut response =
        format!("HTTP/1.1 200 OK\r\nContent-Length: {size}\r\nConnection: close\r\n\r\n").into_bytes();
    response.extend((0..size).map(|i| (i % 251) as u8));
    let expected = response.clone();
    let (addr, _) = start_origin(move |_| response.clone()).await;
    (addr, expected)
}

/// Start a mock origin that records each request head it receives.
pub async fn start_recording_origin() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (addr, hits) = start_origin(move |head| {
        let _ = tx.send(head.to_vec());
        b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_vec()
    })
    .await;
    (addr, rx, hits)
}

async fn start_origin<F>(respond: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let respond = respond.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let _ = socket.write_all(&respond(&head)).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// Start a raw TCP origin that writes `greeting` and closes at once,
/// without reading anything.
pub async fn start_closing_origin(greeting: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.write_all(greeting).await;
            let _ = socket.shutdown().await;
        }
    });

    addr
}

/// Start an HTTP/1.1 origin that answers with `body` and a `Content-Length`,
/// then keeps the connection open instead of closing it.
pub async fn start_keepalive_origin(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let payload = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            read_head(&mut socket).await;
            let _ = socket.write_all(payload.as_bytes()).await;
            held.push(socket);
        }
    });

    addr
}

/// Start a raw TCP origin that echoes everything back until EOF.
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut read, mut write) = socket.split();
                let _ = tokio::io::copy(&mut read, &mut write).await;
                let _ = write.shutdown().await;
            });
        }
    });

    addr
}

/// Send raw bytes to the proxy and read the whole reply.
pub async fn raw_exchange(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
        .await
        .expect("proxy reply timed out")
        .unwrap();
    reply
}

/// Find a port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let vacant = TcpListener::bind("127.0.0.1:0").await.unwrap();
    vacant.local_addr().unwrap().port()
}
