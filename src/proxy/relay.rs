//! Byte relay through fixed-size buffers.
//!
//! # Responsibilities
//! - Copy raw bytes from one stream to another without inspecting them
//! - Enforce an idle timeout on every read and write
//! - Count bytes as they pass, so partial transfers are still accounted for
//!
//! # Design Decisions
//! - One buffer of `buffer_size` per direction; memory does not grow with
//!   payload size
//! - End-of-stream is success; an idle peer is `IoTimeout`
//! - Bidirectional relay ends when either direction ends

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};

/// Buffer size and idle timeout shared by every relay direction.
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    pub buffer_size: usize,
    pub idle_timeout: Duration,
}

/// Copy from `reader` to `writer` until end-of-stream.
///
/// `counter` is incremented after each chunk is written, so it stays
/// accurate if the future is dropped part way through.
pub async fn copy_counted<R, W>(
    reader: &mut R,
    writer: &mut W,
    options: RelayOptions,
    counter: &mut u64,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    copy_until(reader, writer, options, counter, |_, _| false).await
}

/// Copy like [`copy_counted`], but also stop once `done` returns true.
///
/// `done` sees each chunk after it is written, together with the running
/// total.
pub async fn copy_until<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    options: RelayOptions,
    counter: &mut u64,
    mut done: F,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(&[u8], u64) -> bool,
{
    let mut buf = vec![0u8; options.buffer_size];
    loop {
        let n = with_idle_timeout(options.idle_timeout, reader.read(&mut buf)).await?;
        if n == 0 {
            return Ok(());
        }
        with_idle_timeout(options.idle_timeout, writer.write_all(&buf[..n])).await?;
        *counter += n as u64;
        if done(&buf[..n], *counter) {
            return Ok(());
        }
    }
}

/// Write `data` with the idle timeout applied.
pub async fn write_all_timed<W>(writer: &mut W, data: &[u8], idle_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    with_idle_timeout(idle_timeout, writer.write_all(data)).await
}

async fn with_idle_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(ProxyError::from),
        Err(_) => Err(ProxyError::IoTimeout(timeout)),
    }
}

/// Byte counts of a finished bidirectional relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTotals {
    /// Bytes copied from the client to the origin.
    pub client_to_origin: u64,
    /// Bytes copied from the origin to the client.
    pub origin_to_client: u64,
}

impl RelayTotals {
    pub fn total(&self) -> u64 {
        self.client_to_origin + self.origin_to_client
    }
}

/// Relay in both directions until either side closes or fails.
///
/// The direction that is still running is dropped when the other ends;
/// the caller closes both sockets afterwards.
pub async fn relay_bidirectional(
    client: &mut TcpStream,
    origin: &mut TcpStream,
    options: RelayOptions,
) -> (RelayTotals, Result<()>) {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();

    let mut totals = RelayTotals::default();
    let result = {
        let upstream = copy_counted(
            &mut client_read,
            &mut origin_write,
            options,
            &mut totals.client_to_origin,
        );
        let downstream = copy_counted(
            &mut origin_read,
            &mut client_write,
            options,
            &mut totals.origin_to_client,
        );
        tokio::select! {
            r = upstream => r,
            r = downstream => r,
        }
    };

    (totals, result)
}
