//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! client socket
//!     → request.rs (read head, parse request line and headers, resolve host)
//!     → [policy decides]
//!     → response.rs (proxy-generated status lines: 403, 200, 4xx, 5xx)
//! ```
//!
//! Only the head is interpreted. Bodies and origin responses are relayed as
//! raw bytes by the proxy subsystem.

pub mod request;
pub mod response;

pub use request::{read_request_head, Header, HeadLimits, HttpRequestHead, HttpVersion, RequestTarget};
pub use response::ProxyResponse;
