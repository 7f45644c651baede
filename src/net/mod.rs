//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → concurrency.rs (admit: unbounded, or bounded by semaphore)
//!     → listener.rs (accept)
//!     → connection.rs (connection ID, live-session tracking)
//!     → Hand off to a proxy session
//!
//! Session States:
//!     ReadingHead → Blocked | Forwarding | Tunneling → Closed
//! ```
//!
//! # Design Decisions
//! - Admission sits behind a trait so a bounded pool can replace the
//!   default task-per-connection model without touching session logic
//! - Each session tracked for graceful shutdown

pub mod concurrency;
pub mod connection;
pub mod listener;

pub use concurrency::{Bounded, ConcurrencyManager, SessionSlot, Unbounded};
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, SessionState};
pub use listener::{Listener, ListenerError};
