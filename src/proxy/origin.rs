//! Origin connection establishment.

use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};

/// Open a TCP connection to `host:port` within `timeout`.
///
/// Resolution and connection failures are `OriginUnreachable`; an expired
/// deadline is `OriginTimeout`. Never retried.
pub async fn connect_origin(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    // Bracketed IPv6 literals are resolved without their brackets.
    let address = host.trim_start_matches('[').trim_end_matches(']');

    match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
        Ok(Ok(stream)) => {
            tracing::debug!(host, port, "Origin connected");
            Ok(stream)
        }
        Ok(Err(source)) => Err(ProxyError::OriginUnreachable {
            host: host.to_string(),
            port,
            source,
        }),
        Err(_) => Err(ProxyError::OriginTimeout {
            host: host.to_string(),
            port,
            timeout,
        }),
    }
}
