//! Hostname canonicalization.
//!
//! # Responsibilities
//! - Normalize client-supplied hosts and blocklist entries to one form
//!
//! # Design Decisions
//! - ASCII lowercase only; IDNA is not applied
//! - Steps repeat until the value stops changing, so the function is
//!   idempotent for every input including `host:80.` and `host.:80`
//! - Bracketed IPv6 literals keep their brackets; bare IPv6 is left intact

/// Canonicalize a hostname for policy comparison.
///
/// Lowercases, trims surrounding whitespace, strips trailing dots and strips
/// an embedded port.
pub fn canonicalize(host: &str) -> String {
    let mut current = host.to_string();
    loop {
        let next = canonicalize_step(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn canonicalize_step(host: &str) -> String {
    let host = host.trim().trim_end_matches('.');
    let host = strip_port(host).trim().trim_end_matches('.');
    host.to_ascii_lowercase()
}

/// Remove a `:port` suffix from `host`.
///
/// `[v6]:port` keeps `[v6]`. A single colon followed by digits (or nothing)
/// is treated as a port. More than one colon outside brackets is a bare IPv6
/// literal and is returned unchanged.
pub(crate) fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}
