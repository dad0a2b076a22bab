//! Metrics facade for dispatch and session activity
//!
//! Records through the `metrics` crate. No exporter is installed here; a
//! binary that wants one registers a recorder before calling `init_metrics`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

pub const MESSAGES_SENT: &str = "dispatch.messages.sent";
pub const MESSAGES_FAILED: &str = "dispatch.messages.failed";
pub const BATCH_DURATION_MS: &str = "dispatch.batch.duration_ms";
pub const INBOUND_RECEIVED: &str = "events.inbound.received";
pub const SESSION_READY: &str = "session.ready";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(MESSAGES_SENT, "Messages accepted by the protocol client");
    describe_counter!(MESSAGES_FAILED, "Messages the protocol client rejected");
    describe_histogram!(BATCH_DURATION_MS, "Wall time of one bulk dispatch, pacing included");
    describe_counter!(INBOUND_RECEIVED, "Inbound text messages appended to the log");
    describe_gauge!(SESSION_READY, "1 while the session is authenticated, else 0");
}

pub fn record_sent() {
    counter!(MESSAGES_SENT).increment(1);
}

pub fn record_failed() {
    counter!(MESSAGES_FAILED).increment(1);
}

pub fn record_inbound() {
    counter!(INBOUND_RECEIVED).increment(1);
}

pub fn record_ready(ready: bool) {
    gauge!(SESSION_READY).set(if ready { 1.0 } else { 0.0 });
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) {
        histogram!(self.name).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        init_metrics();
        record_sent();
        record_failed();
        record_inbound();
        record_ready(true);
        Timer::new(BATCH_DURATION_MS).stop();
    }
}
