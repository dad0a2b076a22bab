//! Analytics aggregator
//!
//! Running totals for dispatch outcomes plus the inbound message log.
//! Process-lifetime only; a restart resets everything.

use crate::core_engine::context::EngineContext;
use crate::core_engine::types::AnalyticsSnapshot;
use crate::metrics;
use std::sync::Arc;

#[derive(Clone)]
pub struct AnalyticsAggregator {
    ctx: Arc<EngineContext>,
}

impl AnalyticsAggregator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn record_sent(&self) {
        self.ctx.with_state(|s| s.analytics.total_sent += 1);
        metrics::record_sent();
    }

    pub fn record_failed(&self) {
        self.ctx.with_state(|s| s.analytics.total_failed += 1);
        metrics::record_failed();
    }

    /// Append one line to the inbound log
    pub fn record_inbound(&self, sender: &str, text: &str) {
        let line = format!("From {}: {}", sender, text);
        self.ctx.with_state(|s| s.analytics.incoming.push(line));
        metrics::record_inbound();
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.ctx.with_state(|s| s.analytics.clone())
    }

    pub fn incoming(&self) -> Vec<String> {
        self.ctx.with_state(|s| s.analytics.incoming.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_protocol::LoopbackClient;

    fn aggregator() -> AnalyticsAggregator {
        AnalyticsAggregator::new(EngineContext::new(Arc::new(LoopbackClient::paired())))
    }

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(aggregator().snapshot(), AnalyticsSnapshot::default());
    }

    #[test]
    fn test_record_outcomes() {
        let analytics = aggregator();
        analytics.record_sent();
        analytics.record_sent();
        analytics.record_failed();

        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.total_sent, 2);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.total_replied, 0);
        assert_eq!(snapshot.total_reacted, 0);
    }

    #[test]
    fn test_inbound_log_format_and_order() {
        let analytics = aggregator();
        analytics.record_inbound("111", "first");
        analytics.record_inbound("222", "second");

        assert_eq!(analytics.incoming(), vec!["From 111: first", "From 222: second"]);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let analytics = aggregator();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let analytics = analytics.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        analytics.record_sent();
                        analytics.record_inbound(&i.to_string(), "x");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.total_sent, 800);
        assert_eq!(snapshot.incoming.len(), 800);
    }
}
