//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): finished sessions by kind, decision
//! - `proxy_bytes_total` (counter): bytes relayed by kind
//! - `proxy_active_sessions` (gauge): sessions in flight
//! - `proxy_origin_failures_total` (counter): origin connect failures by kind
//!
//! Without an installed recorder every call is a no-op, so sessions record
//! unconditionally.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::audit::{AuditRecord, RequestKind};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn session_opened() {
    gauge!("proxy_active_sessions").increment(1.0);
}

pub fn session_closed() {
    gauge!("proxy_active_sessions").decrement(1.0);
}

/// Count a finished session.
pub fn record_session(record: &AuditRecord) {
    let kind = record.kind().as_str();
    counter!(
        "proxy_sessions_total",
        "kind" => kind,
        "decision" => record.decision().as_str()
    )
    .increment(1);

    if let Some(bytes) = record.bytes() {
        counter!("proxy_bytes_total", "kind" => kind).increment(bytes);
    }
}

pub fn origin_failure(kind: RequestKind) {
    counter!("proxy_origin_failures_total", "kind" => kind.as_str()).increment(1);
}
