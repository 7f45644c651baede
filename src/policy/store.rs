//! Allow/deny decisions against the loaded blocklist.

use crate::policy::blocklist::BlockList;
use crate::policy::canonical::canonicalize;

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Blocked,
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::Allowed => "ALLOWED",
            PolicyDecision::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only policy shared by every session.
///
/// Constructed once at startup and passed to sessions behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    blocked: BlockList,
}

impl PolicyStore {
    pub fn new(blocked: BlockList) -> Self {
        Self { blocked }
    }

    /// Policy that allows every host.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Decide whether `host` may be reached. Exact match after
    /// canonicalization; no I/O.
    pub fn decide(&self, host: &str) -> PolicyDecision {
        if self.blocked.contains(&canonicalize(host)) {
            PolicyDecision::Blocked
        } else {
            PolicyDecision::Allowed
        }
    }

    /// Number of blocked hosts.
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}
