//! CONNECT tunnel handler.
//!
//! Handles `CONNECT host:port HTTP/1.1` requests by:
//! 1. Establishing a TCP connection to the target
//! 2. Returning `200 Connection Established`
//! 3. Relaying bytes in both directions without inspecting them
//!
//! The proxy never terminates TLS. The tunnel lives as long as the shorter
//! of the two stream lifetimes.

use tokio::net::TcpStream;

use crate::error::Result;
use crate::http::{HttpRequestHead, ProxyResponse};
use crate::proxy::origin::connect_origin;
use crate::proxy::relay::{relay_bidirectional, write_all_timed};
use crate::proxy::SessionSettings;

/// Establish a tunnel for an allowed CONNECT request and relay until it
/// closes.
///
/// Bytes the client sent after the CONNECT head are delivered to the origin
/// first. Returns the bytes relayed in both directions.
pub async fn tunnel(
    client: &mut TcpStream,
    head: &HttpRequestHead,
    remainder: &[u8],
    settings: &SessionSettings,
) -> (u64, Result<()>) {
    let mut origin = match connect_origin(head.host(), head.port(), settings.connect_timeout).await {
        Ok(origin) => origin,
        Err(e) => return (0, Err(e)),
    };

    let idle = settings.relay.idle_timeout;
    if let Err(e) = write_all_timed(client, &ProxyResponse::ConnectionEstablished.to_bytes(), idle).await {
        return (0, Err(e));
    }
    tracing::debug!(host = head.host(), port = head.port(), "Tunnel established");

    if !remainder.is_empty() {
        if let Err(e) = write_all_timed(&mut origin, remainder, idle).await {
            return (0, Err(e));
        }
    }

    let (totals, result) = relay_bidirectional(client, &mut origin, settings.relay).await;
    tracing::debug!(
        host = head.host(),
        port = head.port(),
        client_to_origin = totals.client_to_origin + remainder.len() as u64,
        origin_to_client = totals.origin_to_client,
        "Tunnel closed"
    );

    (totals.total() + remainder.len() as u64, result)
}
