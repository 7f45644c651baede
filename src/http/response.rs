//! Responses generated by the proxy itself.
//!
//! # Responsibilities
//! - Render the fixed status lines clients observe from the proxy
//! - Write them to the client in a single call
//!
//! # Design Decisions
//! - The 403 and 200 forms are literal byte strings clients depend on
//! - Other error responses carry a short body with `Content-Length`
//! - Relayed origin responses never pass through here

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Literal response for a blocked host.
pub const BLOCKED: &[u8] = b"HTTP/1.1 403 Forbidden\r\n\r\nBlocked by proxy";

/// Literal response acknowledging a CONNECT tunnel.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// A response the proxy emits on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyResponse {
    /// Tunnel is ready.
    ConnectionEstablished,
    /// Request head could not be parsed.
    BadRequest,
    /// Host is on the blocklist.
    Forbidden,
    /// Client did not finish the request head in time.
    RequestTimeout,
    /// Request head exceeded the configured limit.
    HeaderFieldsTooLarge,
    /// Origin refused the connection or could not be resolved.
    BadGateway,
    /// Origin did not accept the connection in time.
    GatewayTimeout,
}

impl ProxyResponse {
    /// Numeric status code.
    pub fn status(&self) -> u16 {
        match self {
            ProxyResponse::ConnectionEstablished => 200,
            ProxyResponse::BadRequest => 400,
            ProxyResponse::Forbidden => 403,
            ProxyResponse::RequestTimeout => 408,
            ProxyResponse::HeaderFieldsTooLarge => 431,
            ProxyResponse::BadGateway => 502,
            ProxyResponse::GatewayTimeout => 504,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ProxyResponse::ConnectionEstablished => "Connection Established",
            ProxyResponse::BadRequest => "Bad Request",
            ProxyResponse::Forbidden => "Forbidden",
            ProxyResponse::RequestTimeout => "Request Timeout",
            ProxyResponse::HeaderFieldsTooLarge => "Request Header Fields Too Large",
            ProxyResponse::BadGateway => "Bad Gateway",
            ProxyResponse::GatewayTimeout => "Gateway Timeout",
        }
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ProxyResponse::ConnectionEstablished => CONNECTION_ESTABLISHED.to_vec(),
            ProxyResponse::Forbidden => BLOCKED.to_vec(),
            other => {
                let body = other.reason();
                format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    other.status(),
                    other.reason(),
                    body.len(),
                    body
                )
                .into_bytes()
            }
        }
    }

    /// Write the response to the client and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}
