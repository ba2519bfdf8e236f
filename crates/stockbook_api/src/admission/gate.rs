use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of requests in flight at any instant.
///
/// Models Stockbook's "max N parallel requests per account" constraint,
/// which is separate from the throughput ceiling: five slow requests can
/// occupy every slot while barely touching the token bucket. Waiters queue
/// fairly (the underlying semaphore is FIFO), so none starves while slots
/// keep turning over.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

/// One reserved slot. Dropping it frees the slot on every exit path —
/// success, error, panic, or a cancelled request future.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// # Panics
    ///
    /// Panics if `max_concurrent` is zero.
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "concurrency gate needs at least one slot");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Waits until fewer than `max_concurrent` requests are outstanding,
    /// then reserves a slot.
    pub async fn acquire(&self) -> GatePermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed");
        GatePermit { _permit: permit }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Requests currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }
}
