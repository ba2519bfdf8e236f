//! Internal telemetry, emitted as `metrics` series plus structured tracing
//! records. Series names are stable; dashboards key on them.

use std::time::Duration;

use metrics::{counter, histogram};

pub(crate) fn admission_granted(in_flight: usize, waited: Duration) {
    histogram!("stockbook_dispatch_in_flight").record(in_flight as f64);
    histogram!("stockbook_dispatch_admission_wait_seconds").record(waited.as_secs_f64());
    trace!(
        target: "stockbook_api::admission",
        in_flight,
        waited_ms = waited.as_millis() as u64,
        "request admitted"
    );
}

pub(crate) fn request_retried(delay: Duration) {
    counter!("stockbook_dispatch_retries_total").increment(1);
    histogram!("stockbook_dispatch_retry_delay_seconds").record(delay.as_secs_f64());
}
