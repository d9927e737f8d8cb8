use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Fixed-capacity admission gate for in-flight write attempts.
///
/// `try_acquire` never blocks: when the ceiling is reached the caller gets
/// `None` and decides what to do with the refusal. The limiter itself carries
/// no backpressure policy.
///
/// The ceiling must be greater than zero; run configuration validation
/// enforces this before a limiter is constructed.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    ceiling: usize,
    slots: Arc<Semaphore>,
}

/// One unit of in-flight capacity.
///
/// Dropping the slot returns the capacity, also when the owning task panics
/// mid-attempt.
#[derive(Debug)]
pub struct InFlightSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            slots: Arc::new(Semaphore::new(ceiling)),
        }
    }

    /// Attempts to claim one slot without waiting.
    pub fn try_acquire(&self) -> Option<InFlightSlot> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Some(InFlightSlot { _permit: permit }),
            // The semaphore is never closed, so any refusal means no capacity.
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Number of attempts currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.ceiling - self.slots.available_permits()
    }
}
