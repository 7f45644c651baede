//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Connect to the origin named by the request
//! - Rewrite the request line to origin-form, keep headers as received
//! - Stream the request body and the origin response through fixed buffers
//!
//! # Design Decisions
//! - Bodies are never parsed; `Content-Length` bounds the upload, any other
//!   framing is relayed until the response ends
//! - The session ends once a response with a declared length has been
//!   relayed in full, or when the origin closes the stream. Chunked and
//!   close-delimited responses always wait for the close
//! - One request per connection; no keep-alive loop

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::http::HttpRequestHead;
use crate::proxy::origin::connect_origin;
use crate::proxy::relay::{copy_counted, copy_until, write_all_timed, RelayOptions};
use crate::proxy::SessionSettings;

/// Bytes of response head collected before giving up on finding its length.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;
const MAX_RESPONSE_HEADERS: usize = 64;

/// How much of the client stream belongs to the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    None,
    Length(u64),
    /// Chunked or otherwise delimited; relayed until the response ends.
    Streamed,
}

impl BodyFraming {
    fn of(head: &HttpRequestHead) -> Self {
        if head.header_raw("transfer-encoding").is_some() {
            BodyFraming::Streamed
        } else {
            match head.content_length() {
                Some(0) | None => BodyFraming::None,
                Some(n) => BodyFraming::Length(n),
            }
        }
    }
}

/// Where the origin response ends, learned from its head.
#[derive(Debug)]
enum ResponseEnd {
    /// Status line and headers not complete yet.
    Reading { head: Vec<u8>, head_request: bool },
    /// Total response size, head included.
    Length(u64),
    /// Chunked, close-delimited, or unreadable; wait for the origin to close.
    Close,
}

impl ResponseEnd {
    fn new(request: &HttpRequestHead) -> Self {
        ResponseEnd::Reading {
            head: Vec::new(),
            head_request: request.method().eq_ignore_ascii_case("HEAD"),
        }
    }

    /// Feed the next relayed chunk; true once `total` covers the response.
    fn observe(&mut self, chunk: &[u8], total: u64) -> bool {
        if let ResponseEnd::Reading { head, head_request } = self {
            head.extend_from_slice(chunk);
            if let Some(end) = measure_response(head, *head_request) {
                *self = end;
            }
        }
        matches!(self, ResponseEnd::Length(length) if total >= *length)
    }
}

/// Work out the response size from its head, `None` while it is incomplete.
fn measure_response(buf: &[u8], head_request: bool) -> Option<ResponseEnd> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    let head_len = match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len as u64,
        Ok(httparse::Status::Partial) if buf.len() < MAX_RESPONSE_HEAD => return None,
        _ => return Some(ResponseEnd::Close),
    };

    let status = response.code.unwrap_or_default();
    // An interim response is followed by the real one.
    if (100..200).contains(&status) {
        return Some(ResponseEnd::Close);
    }
    if head_request || status == 204 || status == 304 {
        return Some(ResponseEnd::Length(head_len));
    }

    let mut length = None;
    for header in response.headers.iter() {
        if header.name.eq_ignore_ascii_case("transfer-encoding") {
            return Some(ResponseEnd::Close);
        }
        if header.name.eq_ignore_ascii_case("content-length") {
            let parsed = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok());
            match parsed {
                Some(n) => length = Some(n),
                None => return Some(ResponseEnd::Close),
            }
        }
    }
    Some(length.map_or(ResponseEnd::Close, |n| ResponseEnd::Length(head_len + n)))
}

/// Serialize the request head the origin receives.
///
/// Header values are written back byte for byte.
pub fn render_origin_request(head: &HttpRequestHead) -> Vec<u8> {
    let mut out =
        format!("{} {} {}\r\n", head.method(), head.origin_form(), head.version()).into_bytes();
    if head.header_raw("host").is_none() {
        out.extend_from_slice(format!("Host: {}\r\n", head.authority()).as_bytes());
    }
    for header in head.headers() {
        out.extend_from_slice(header.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&header.value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Forward an allowed request and relay the response back to the client.
///
/// Returns the number of body and response bytes relayed, which is
/// meaningful even when the result is an error.
pub async fn forward(
    client: &mut TcpStream,
    head: &HttpRequestHead,
    remainder: &[u8],
    settings: &SessionSettings,
) -> (u64, Result<()>) {
    let mut origin = match connect_origin(head.host(), head.port(), settings.connect_timeout).await {
        Ok(origin) => origin,
        Err(e) => return (0, Err(e)),
    };

    let mut uploaded = 0u64;
    let mut downloaded = 0u64;
    let result = exchange(
        client,
        &mut origin,
        head,
        remainder,
        settings.relay,
        &mut uploaded,
        &mut downloaded,
    )
    .await;

    tracing::debug!(
        host = head.host(),
        port = head.port(),
        uploaded,
        downloaded,
        "Forwarding finished"
    );
    (uploaded + downloaded, result)
}

async fn exchange(
    client: &mut TcpStream,
    origin: &mut TcpStream,
    head: &HttpRequestHead,
    remainder: &[u8],
    relay: RelayOptions,
    uploaded: &mut u64,
    downloaded: &mut u64,
) -> Result<()> {
    write_all_timed(origin, &render_origin_request(head), relay.idle_timeout).await?;

    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();
    let framing = BodyFraming::of(head);

    let upload = async {
        match framing {
            BodyFraming::None => Ok::<(), ProxyError>(()),
            BodyFraming::Length(length) => {
                let buffered = remainder.len().min(length as usize);
                write_all_timed(&mut origin_write, &remainder[..buffered], relay.idle_timeout).await?;
                *uploaded += buffered as u64;

                let outstanding = length - buffered as u64;
                if outstanding == 0 {
                    return Ok(());
                }
                let mut body = (&mut client_read).take(outstanding);
                copy_counted(&mut body, &mut origin_write, relay, uploaded).await
            }
            BodyFraming::Streamed => {
                write_all_timed(&mut origin_write, remainder, relay.idle_timeout).await?;
                *uploaded += remainder.len() as u64;
                copy_counted(&mut client_read, &mut origin_write, relay, uploaded).await
            }
        }
    };
    let mut response = ResponseEnd::new(head);
    let download = copy_until(&mut origin_read, &mut client_write, relay, downloaded, |chunk, total| {
        response.observe(chunk, total)
    });

    tokio::pin!(upload);
    tokio::pin!(download);
    let mut upload_done = false;
    loop {
        tokio::select! {
            result = &mut upload, if !upload_done => {
                upload_done = true;
                match result {
                    Ok(()) => {}
                    // A client that stops sending does not cut the response short.
                    Err(ProxyError::IoTimeout(_)) => {
                        tracing::debug!("Request body idle, continuing with response");
                    }
                    Err(e) => return Err(e),
                }
            }
            result = &mut download => return result,
        }
    }
}
