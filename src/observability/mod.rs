//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions produce:
//!     → logging.rs (structured diagnostics, per-session spans)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stderr
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Diagnostics and the audit trail are separate sinks
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;
