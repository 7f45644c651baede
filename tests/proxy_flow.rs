//! End-to-end proxy behaviour: forwarding, blocking, tunneling, auditing.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

const FORBIDDEN: &[u8] = b"HTTP/1.1 403 Forbidden\r\n\r\nBlocked by proxy";
const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

#[tokio::test]
async fn allowed_request_reaches_origin() {
    let (origin, hits) = common::start_fixed_origin("hello from origin").await;
    let proxy = common::start_proxy(&[]).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(proxy.url()).unwrap())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let res = client
        .get(format!("http://{origin}/"))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hello from origin");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let lines = {
        proxy.wait_for_records(1).await;
        proxy.audit.lines()
    };
    assert!(
        lines[0].contains(&format!("ALLOWED {origin} GET / HTTP/1.1")),
        "unexpected audit line: {}",
        lines[0]
    );
    proxy.stop().await;
}

#[tokio::test]
async fn blocked_request_gets_403_and_origin_is_never_contacted() {
    let (origin, hits) = common::start_fixed_origin("secret").await;
    let proxy = common::start_proxy(&["127.0.0.1"]).await;

    let request = format!("GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = common::raw_exchange(proxy.addr, request.as_bytes()).await;

    assert_eq!(reply, FORBIDDEN);
    let records = proxy.wait_for_records(1).await;
    assert!(proxy.audit.lines()[0].ends_with("BLOCKED 127.0.0.1"));
    assert_eq!(records[0].action(), "BLOCKED");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn host_matching_ignores_case_and_trailing_dot() {
    let proxy = common::start_proxy(&["Blocked.Example"]).await;

    let reply = common::raw_exchange(
        proxy.addr,
        b"GET http://BLOCKED.example./page HTTP/1.1\r\nHost: blocked.example\r\n\r\n",
    )
    .await;

    assert_eq!(reply, FORBIDDEN);
    proxy.wait_for_records(1).await;
    assert!(proxy.audit.lines()[0].ends_with("BLOCKED blocked.example"));
    proxy.stop().await;
}

#[tokio::test]
async fn origin_form_request_uses_host_header() {
    let (origin, mut heads, _) = common::start_recording_origin().await;
    let proxy = common::start_proxy(&[]).await;

    let request = format!("GET /status?full=1 HTTP/1.1\r\nHost: {origin}\r\nX-Trace: 7\r\n\r\n");
    let reply = common::raw_exchange(proxy.addr, request.as_bytes()).await;
    assert!(reply.starts_with(b"HTTP/1.1 204 "));

    let head = String::from_utf8(heads.recv().await.unwrap()).unwrap();
    assert!(head.starts_with("GET /status?full=1 HTTP/1.1\r\n"));
    assert!(head.contains("X-Trace: 7\r\n"));
    proxy.stop().await;
}

#[tokio::test]
async fn absolute_target_is_rewritten_to_origin_form() {
    let (origin, mut heads, _) = common::start_recording_origin().await;
    let proxy = common::start_proxy(&[]).await;

    let request = format!(
        "GET http://{origin}/a/b?c=d HTTP/1.1\r\nHost: {origin}\r\nAccept: */*\r\n\r\n"
    );
    common::raw_exchange(proxy.addr, request.as_bytes()).await;

    let head = String::from_utf8(heads.recv().await.unwrap()).unwrap();
    assert_eq!(
        head,
        format!("GET /a/b?c=d HTTP/1.1\r\nHost: {origin}\r\nAccept: */*\r\n\r\n")
    );
    proxy.stop().await;
}

#[tokio::test]
async fn large_response_is_relayed_byte_for_byte() {
    let (origin, expected) = common::start_large_origin(3 * 1024 * 1024 + 17).await;
    let proxy = common::start_proxy(&[]).await;

    let request = format!("GET http://{origin}/big HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let reply = common::raw_exchange(proxy.addr, request.as_bytes()).await;

    assert_eq!(reply.len(), expected.len());
    assert!(reply == expected, "relayed bytes differ from origin response");
    proxy.stop().await;
}

#[tokio::test]
async fn request_body_is_forwarded() {
    let origin = common::start_echo_origin().await;
    let proxy = common::start_proxy(&[]).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let head = format!("POST http://{origin}/upload HTTP/1.1\r\nHost: {origin}\r\nContent-Length: 11\r\n\r\n");
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(b"hello world").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut echoed = Vec::new();
    stream.read_to_end(&mut echoed).await.unwrap();
    let echoed = String::from_utf8(echoed).unwrap();
    assert!(echoed.starts_with("POST /upload HTTP/1.1\r\n"));
    assert!(echoed.ends_with("\r\n\r\nhello world"));
    proxy.stop().await;
}

#[tokio::test]
async fn connect_tunnel_relays_both_directions() {
    let origin = common::start_echo_origin().await;
    let proxy = common::start_proxy(&[]).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {origin} HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut established = vec![0u8; ESTABLISHED.len()];
    stream.read_exact(&mut established).await.unwrap();
    assert_eq!(established, ESTABLISHED);

    // Opaque bytes, as a TLS handshake would be.
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    stream.write_all(&payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);

    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    let records = proxy.wait_for_records(1).await;
    assert_eq!(records[0].action(), "CONNECT");
    assert_eq!(records[0].bytes(), Some(2 * payload.len() as u64));
    let port = origin.port();
    assert!(proxy.audit.lines()[0].ends_with(&format!("CONNECT 127.0.0.1:{port}")));
    proxy.stop().await;
}

#[tokio::test]
async fn origin_close_ends_connect_tunnel() {
    let origin = common::start_closing_origin(b"SSH-2.0-test\r\n").await;
    let proxy = common::start_proxy_with(&[], |config| {
        config.timeouts.io_secs = 5;
    })
    .await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {origin} HTTP/1.1\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    // The client never closes its side and the idle timeout is far off, so
    // only the origin's close can end the tunnel in time.
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut received))
        .await
        .expect("tunnel stayed open after the origin closed")
        .unwrap();
    assert_eq!(received, [ESTABLISHED, b"SSH-2.0-test\r\n"].concat());

    let records = proxy.wait_for_records(1).await;
    assert_eq!(records[0].action(), "CONNECT");
    assert_eq!(records[0].bytes(), Some(b"SSH-2.0-test\r\n".len() as u64));
    assert!(records[0].failure().is_none());
    proxy.stop().await;
}

#[tokio::test]
async fn complete_response_ends_session_while_origin_stays_open() {
    let origin = common::start_keepalive_origin("kept alive").await;
    let proxy = common::start_proxy_with(&[], |config| {
        config.timeouts.io_secs = 5;
    })
    .await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    // Well under the idle timeout.
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut reply))
        .await
        .expect("session waited for the origin to close")
        .unwrap();
    assert_eq!(reply, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nkept alive");

    let records = proxy.wait_for_records(1).await;
    assert_eq!(records[0].action(), "ALLOWED");
    assert!(records[0].failure().is_none());
    assert!(proxy.audit.errors().is_empty());
    proxy.stop().await;
}

#[tokio::test]
async fn bytes_after_connect_head_reach_origin() {
    let origin = common::start_echo_origin().await;
    let proxy = common::start_proxy(&[]).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {origin} HTTP/1.1\r\n\r\nearly-bytes");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; ESTABLISHED.len() + b"early-bytes".len()];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..ESTABLISHED.len()], ESTABLISHED);
    assert_eq!(&reply[ESTABLISHED.len()..], b"early-bytes");
    proxy.stop().await;
}

#[tokio::test]
async fn blocked_connect_gets_403_without_tunnel() {
    let origin = common::start_echo_origin().await;
    let proxy = common::start_proxy(&["127.0.0.1"]).await;

    let request = format!("CONNECT {origin} HTTP/1.1\r\n\r\n");
    let reply = common::raw_exchange(proxy.addr, request.as_bytes()).await;

    assert_eq!(reply, FORBIDDEN);
    proxy.wait_for_records(1).await;
    assert!(proxy.audit.lines()[0].ends_with("BLOCKED 127.0.0.1"));
    proxy.stop().await;
}

#[tokio::test]
async fn every_session_is_audited_once() {
    let (origin, _) = common::start_fixed_origin("ok").await;
    let proxy = common::start_proxy(&["blocked.test"]).await;

    let allowed = format!("GET http://{origin}/ HTTP/1.1\r\nHost: {origin}\r\n\r\n");
    let requests: Vec<Vec<u8>> = vec![
        allowed.clone().into_bytes(),
        b"GET http://blocked.test/ HTTP/1.1\r\n\r\n".to_vec(),
        b"garbage\r\n\r\n".to_vec(),
        allowed.into_bytes(),
    ];

    let mut tasks = Vec::new();
    for request in requests {
        let addr = proxy.addr;
        tasks.push(tokio::spawn(async move {
            common::raw_exchange(addr, &request).await
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let records = proxy.wait_for_records(4).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.audit.records().len(), 4);

    let allowed = records.iter().filter(|r| r.action() == "ALLOWED").count();
    let blocked = records.iter().filter(|r| r.action() == "BLOCKED").count();
    assert_eq!((allowed, blocked), (2, 2));
    proxy.stop().await;
}
