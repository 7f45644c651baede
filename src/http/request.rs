//! Request head parsing.
//!
//! # Responsibilities
//! - Read from the client until the end of the header section
//! - Parse the request line and headers into an immutable `HttpRequestHead`
//! - Resolve the destination host and port
//! - Hand back any bytes read past the head untouched
//!
//! # Design Decisions
//! - Header section is bounded in both size and time
//! - Bodies are never parsed here; they belong to the forwarder
//! - A head without a resolvable host is a parse failure

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::policy::canonical::canonicalize;

/// Maximum number of header lines accepted in a request head.
const MAX_HEADERS: usize = 64;

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_CONNECT_PORT: u16 = 443;

/// HTTP protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// A single header line, name casing preserved.
///
/// The value is kept as raw bytes: `obs-text` (0x80..=0xFF) is legal on the
/// wire and must reach the origin unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Vec<u8>,
}

impl Header {
    /// The value as text, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Request target forms the proxy accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// `/path?query` (or `*`), authority taken from the `Host` header.
    Origin(String),
    /// `http://host[:port]/path?query`.
    Absolute(String),
    /// `host:port`, only valid with CONNECT.
    Authority(String),
}

impl RequestTarget {
    /// The target exactly as received.
    pub fn as_str(&self) -> &str {
        match self {
            RequestTarget::Origin(s) | RequestTarget::Absolute(s) | RequestTarget::Authority(s) => s,
        }
    }
}

/// Parsed request line and headers.
#[derive(Debug, Clone)]
pub struct HttpRequestHead {
    method: String,
    target: RequestTarget,
    version: HttpVersion,
    headers: Vec<Header>,
    host: String,
    port: u16,
}

impl HttpRequestHead {
    /// Parse a request head from `buf`.
    ///
    /// Returns `Ok(None)` while the header section is incomplete, otherwise
    /// the parsed head and the length of the header section.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let status = req
            .parse(buf)
            .map_err(|e| ProxyError::MalformedRequest(format!("invalid request head: {}", e)))?;

        match status {
            httparse::Status::Partial => Ok(None),
            httparse::Status::Complete(len) => Self::from_parsed(&req).map(|head| Some((head, len))),
        }
    }

    fn from_parsed(req: &httparse::Request<'_, '_>) -> Result<Self> {
        let method = req
            .method
            .ok_or_else(|| ProxyError::MalformedRequest("missing method".into()))?
            .to_string();
        let raw_target = req
            .path
            .ok_or_else(|| ProxyError::MalformedRequest("missing request target".into()))?;
        let minor = req
            .version
            .ok_or_else(|| ProxyError::MalformedRequest("missing version".into()))?;
        let version = HttpVersion { major: 1, minor };

        let headers: Vec<Header> = req
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.to_string(),
                value: h.value.trim_ascii().to_vec(),
            })
            .collect();

        let is_connect = method.eq_ignore_ascii_case("CONNECT");
        let (target, (host, port)) = if is_connect {
            let authority = parse_authority(raw_target, DEFAULT_CONNECT_PORT)?;
            (RequestTarget::Authority(raw_target.to_string()), authority)
        } else if raw_target.starts_with('/') || raw_target == "*" {
            let host_header = find_header(&headers, "host")
                .ok_or_else(|| ProxyError::MalformedRequest("missing Host header".into()))?
                .value_str()
                .ok_or_else(|| ProxyError::MalformedRequest("Host header is not UTF-8".into()))?;
            let authority = parse_authority(host_header, DEFAULT_HTTP_PORT)?;
            (RequestTarget::Origin(raw_target.to_string()), authority)
        } else {
            let authority = parse_absolute(raw_target)?;
            (RequestTarget::Absolute(raw_target.to_string()), authority)
        };

        let head = Self {
            method,
            target,
            version,
            headers,
            host,
            port,
        };
        head.validate_body_framing()?;
        Ok(head)
    }

    fn validate_body_framing(&self) -> Result<()> {
        if let Some(header) = find_header(&self.headers, "content-length") {
            header
                .value_str()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| {
                    ProxyError::MalformedRequest(format!(
                        "invalid Content-Length: {}",
                        String::from_utf8_lossy(&header.value)
                    ))
                })?;
        }
        Ok(())
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Canonicalized destination host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First header value with the given name (case-insensitive), if it is
    /// valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name).and_then(Header::value_str)
    }

    /// First header value with the given name, as received.
    pub fn header_raw(&self, name: &str) -> Option<&[u8]> {
        find_header(&self.headers, name).map(|h| h.value.as_slice())
    }

    /// Declared request body length, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Whether a request body may follow the head.
    pub fn has_body(&self) -> bool {
        self.header_raw("transfer-encoding").is_some() || self.content_length().is_some_and(|n| n > 0)
    }

    /// Path and query to send to the origin.
    pub fn origin_form(&self) -> String {
        match &self.target {
            RequestTarget::Origin(path) => path.clone(),
            RequestTarget::Absolute(uri) => origin_form_of(uri),
            RequestTarget::Authority(_) => "/".to_string(),
        }
    }

    /// `Host` header value for the origin when the client did not send one.
    pub fn authority(&self) -> String {
        if self.port == DEFAULT_HTTP_PORT {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a Header> {
    headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
}

/// Split `host[:port]` (or `[v6][:port]`) into a canonical host and a port.
fn parse_authority(authority: &str, default_port: u16) -> Result<(String, u16)> {
    let authority = authority.trim();
    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ProxyError::MalformedRequest(format!("unterminated IPv6 literal: {}", authority)))?;
        let host = &authority[..end + 2];
        let port = rest[end + 1..].strip_prefix(':');
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| ProxyError::MalformedRequest(format!("invalid port in {}", authority)))?,
        None => default_port,
    };

    let host = canonicalize(host);
    if host.is_empty() {
        return Err(ProxyError::MalformedRequest("empty host".into()));
    }
    Ok((host, port))
}

fn parse_absolute(target: &str) -> Result<(String, u16)> {
    let url = Url::parse(target)
        .map_err(|e| ProxyError::MalformedRequest(format!("invalid request target {}: {}", target, e)))?;
    if url.scheme() != "http" {
        return Err(ProxyError::MalformedRequest(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .map(canonicalize)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProxyError::MalformedRequest(format!("no host in {}", target)))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
    Ok((host, port))
}

/// Path and query of an absolute URI, preserved byte for byte.
fn origin_form_of(uri: &str) -> String {
    let after_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let without_fragment = after_scheme.split('#').next().unwrap_or_default();
    match without_fragment.find(|c| c == '/' || c == '?') {
        Some(idx) if without_fragment[idx..].starts_with('?') => {
            format!("/{}", &without_fragment[idx..])
        }
        Some(idx) => without_fragment[idx..].to_string(),
        None => "/".to_string(),
    }
}

/// Bounds applied while reading a request head.
#[derive(Debug, Clone, Copy)]
pub struct HeadLimits {
    /// Maximum bytes buffered before the header terminator must appear.
    pub max_bytes: usize,
    /// Size of each read from the socket.
    pub chunk_size: usize,
    /// Deadline for the whole head.
    pub timeout: Duration,
}

/// Read and parse a request head from the client.
///
/// Returns `Ok(None)` when the client closes the connection before sending
/// anything. On success also returns the bytes read past the head.
pub async fn read_request_head<R>(
    reader: &mut R,
    limits: HeadLimits,
) -> Result<Option<(HttpRequestHead, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(limits.timeout, read_head_inner(reader, limits))
        .await
        .map_err(|_| ProxyError::HeadTimeout(limits.timeout))?
}

async fn read_head_inner<R>(
    reader: &mut R,
    limits: HeadLimits,
) -> Result<Option<(HttpRequestHead, Vec<u8>)>>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(limits.chunk_size);
    let mut chunk = vec![0u8; limits.chunk_size];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ProxyError::MalformedRequest(
                "connection closed before end of request head".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some((head, len)) = HttpRequestHead::parse(&buf)? {
            if len > limits.max_bytes {
                return Err(ProxyError::HeadTooLarge {
                    limit: limits.max_bytes,
                });
            }
            let remainder = buf.split_off(len);
            return Ok(Some((head, remainder)));
        }
        if buf.len() >= limits.max_bytes {
            return Err(ProxyError::HeadTooLarge {
                limit: limits.max_bytes,
            });
        }
    }
}
