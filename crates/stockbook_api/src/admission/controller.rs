use tokio::time::Instant;

use super::{AdmissionSettings, ConcurrencyGate, GatePermit, TokenBucket};
use crate::internal_event;

/// Composes the concurrency gate and the token bucket into the single
/// before/after hook pair every outbound call goes through.
///
/// The gate is reserved *before* waiting on the bucket: an empty bucket then
/// queues at most `max_concurrent` half-admitted requests instead of an
/// unbounded crowd. The after-hook is the [`AdmissionPermit`] drop, which
/// runs on every exit path.
#[derive(Debug)]
pub struct AdmissionController {
    gate: ConcurrencyGate,
    bucket: TokenBucket,
}

/// Proof that a request was admitted. Holding it occupies one concurrency
/// slot; dropping it is the after-hook.
#[derive(Debug)]
pub struct AdmissionPermit {
    _slot: GatePermit,
}

impl AdmissionController {
    pub fn new(settings: AdmissionSettings) -> Self {
        Self {
            gate: ConcurrencyGate::new(settings.max_concurrent),
            bucket: TokenBucket::new(settings.queries_per_second, settings.burst),
        }
    }

    /// Before-hook: reserve a slot, then take a token. Suspends the caller
    /// (without busy-waiting) until both constraints admit the request.
    ///
    /// Cancellation-safe: dropping the future mid-wait releases the slot and
    /// leaves the bucket untouched.
    pub async fn admit(&self) -> AdmissionPermit {
        let waiting_since = Instant::now();
        let slot = self.gate.acquire().await;
        self.bucket.take().await;
        internal_event::admission_granted(self.gate.in_flight(), waiting_since.elapsed());
        AdmissionPermit { _slot: slot }
    }

    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }

    pub fn max_concurrent(&self) -> usize {
        self.gate.max_concurrent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(rate: f64, burst: u32, concurrent: usize) -> Arc<AdmissionController> {
        Arc::new(AdmissionController::new(
            AdmissionSettings::builder()
                .queries_per_second(rate)
                .burst(burst)
                .max_concurrent(concurrent)
                .build(),
        ))
    }

    #[tokio::test]
    async fn permit_drop_runs_the_after_hook() {
        let controller = controller(1000.0, 1000, 2);
        let permit = controller.admit().await;
        assert_eq!(controller.in_flight(), 1);
        drop(permit);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_is_reserved_before_waiting_on_the_bucket() {
        let controller = controller(1.0, 1, 1);
        // Drain the bucket so the next admit parks on the token wait.
        controller.admit().await;

        let waiting = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move {
                let _permit = controller.admit().await;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // Parked on the bucket, yet the slot is already held.
        assert_eq!(controller.in_flight(), 1);

        waiting.abort();
        let _ = waiting.await;
        assert_eq!(controller.in_flight(), 0, "cancelled admit must release its slot");
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_are_serialized_when_both_limits_are_one() {
        let controller = controller(2.0, 1, 1);
        let started = Instant::now();
        let mut completions = Vec::new();
        for _ in 0..3 {
            let _permit = controller.admit().await;
            completions.push(started.elapsed());
        }
        assert!(completions[0] < Duration::from_millis(20));
        assert!(completions[1] >= Duration::from_millis(500));
        assert!(completions[2] >= Duration::from_millis(1000));
    }
}
