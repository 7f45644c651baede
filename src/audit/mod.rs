//! Audit trail of proxy sessions.
//!
//! Every session produces exactly one [`AuditRecord`], whatever the outcome.
//! Records are written as single lines:
//!
//! ```text
//! 2026-01-01 12:00:00.000000 127.0.0.1:50000 ALLOWED example.com:80 GET / HTTP/1.1
//! 2026-01-01 12:00:00.000000 127.0.0.1:50001 BLOCKED example.com
//! 2026-01-01 12:00:00.000000 127.0.0.1:50002 CONNECT example.com:443
//! ```

pub mod log;
pub mod record;

pub use log::{AuditLog, FileAuditLog, MemoryAuditLog};
pub use record::{AuditRecord, RequestKind};
