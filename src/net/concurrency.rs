//! Admission control for new sessions.
//!
//! The listener asks a [`ConcurrencyManager`] for a slot before accepting
//! each connection. The default is unbounded: one task per connection, as
//! many as arrive. A bounded manager holds back accepts once its limit is
//! reached. Session logic never sees which one is in use.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A running session's claim on capacity. Released when dropped.
#[derive(Debug)]
pub struct SessionSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl SessionSlot {
    fn unbounded() -> Self {
        Self { _permit: None }
    }
}

/// Decides when another session may start.
pub trait ConcurrencyManager: Send + Sync + std::fmt::Debug {
    /// Wait until a new session may run.
    fn admit(&self) -> Pin<Box<dyn Future<Output = SessionSlot> + Send + '_>>;

    /// Configured ceiling, if any.
    fn limit(&self) -> Option<usize>;
}

/// No cap on concurrent sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl ConcurrencyManager for Unbounded {
    fn admit(&self) -> Pin<Box<dyn Future<Output = SessionSlot> + Send + '_>> {
        Box::pin(std::future::ready(SessionSlot::unbounded()))
    }

    fn limit(&self) -> Option<usize> {
        None
    }
}

/// At most `max` concurrent sessions, enforced with a semaphore.
#[derive(Debug, Clone)]
pub struct Bounded {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl Bounded {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl ConcurrencyManager for Bounded {
    fn admit(&self) -> Pin<Box<dyn Future<Output = SessionSlot> + Send + '_>> {
        let semaphore = Arc::clone(&self.semaphore);
        Box::pin(async move {
            // The semaphore is never closed, so acquisition only waits.
            let permit = semaphore.acquire_owned().await.ok();
            SessionSlot { _permit: permit }
        })
    }

    fn limit(&self) -> Option<usize> {
        Some(self.max)
    }
}

/// Build the manager selected by `listener.max_connections`.
pub fn from_limit(max_connections: Option<usize>) -> Box<dyn ConcurrencyManager> {
    match max_connections {
        Some(max) => Box::new(Bounded::new(max)),
        None => Box::new(Unbounded),
    }
}
