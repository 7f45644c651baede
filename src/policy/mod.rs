//! Domain policy subsystem.
//!
//! # Data Flow
//! ```text
//! blocklist file
//!     → blocklist.rs (read, strip comments, canonicalize)
//!     → store.rs (PolicyStore, immutable)
//!     → shared via Arc with every session
//!
//! Per request:
//!     client host → canonical.rs → PolicyStore::decide → Allowed | Blocked
//! ```
//!
//! # Design Decisions
//! - Exact match only; no wildcard or suffix matching
//! - Loaded once; never mutated after startup, so reads need no lock

pub mod blocklist;
pub mod canonical;
pub mod store;

pub use blocklist::{BlockList, BlockListError};
pub use canonical::canonicalize;
pub use store::{PolicyDecision, PolicyStore};
