use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Token bucket enforcing a hard ceiling on requests issued per unit time.
///
/// Tokens refill continuously at the configured rate up to the bucket
/// capacity, so an idle client may burst before the steady rate takes over.
/// [`TokenBucket::take`] never fails; it only delays. The bucket bounds
/// aggregate throughput and says nothing about instantaneous parallelism —
/// that is the gate's job.
///
/// Time is read from `tokio::time`, so tests driving the paused clock see
/// deterministic refills.
#[derive(Debug)]
pub struct TokenBucket {
    refill_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// # Panics
    ///
    /// Panics if `queries_per_second` is not a positive number.
    pub fn new(queries_per_second: f64, burst: u32) -> Self {
        assert!(
            queries_per_second > 0.0,
            "token bucket refill rate must be positive"
        );
        let capacity = f64::from(burst.max(1));
        Self {
            refill_per_sec: queries_per_second,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Waits until a token is available, then consumes it.
    ///
    /// Dropping the returned future before it resolves consumes nothing:
    /// tokens are only debited under the lock, in the same step that decides
    /// no waiting is needed.
    pub async fn take(&self) {
        loop {
            let ready_at = {
                let mut state = self.state.lock().expect("token bucket state poisoned");
                let now = Instant::now();
                state.refill(now, self.refill_per_sec, self.capacity);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - state.tokens;
                now + Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            // Lock is released while sleeping; another waiter waking first
            // simply sends us around the loop again.
            sleep_until(ready_at).await;
        }
    }
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, capacity: f64) {
        let elapsed = now.duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.refilled_at = now;
    }
}
