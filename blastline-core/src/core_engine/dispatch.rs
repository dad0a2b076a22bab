//! Dispatch Engine
//!
//! Sends one body to many recipients, strictly in input order and one at a
//! time. A failed recipient is counted and skipped; the batch never aborts.
//! Every attempt, failed or not, is followed by the pacing delay.

use crate::config::DispatchConfig;
use crate::core_engine::analytics::AnalyticsAggregator;
use crate::core_engine::context::EngineContext;
use crate::core_engine::errors::SendError;
use crate::core_engine::types::{DispatchOutcome, RecipientOutcome, RecipientResult};
use crate::core_protocol::Jid;
use crate::metrics::{self, Timer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    ctx: Arc<EngineContext>,
    analytics: AnalyticsAggregator,
    domain: String,
    pacing: Duration,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<EngineContext>,
        analytics: AnalyticsAggregator,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            ctx,
            analytics,
            domain: config.recipient_domain.clone(),
            pacing: config.pacing_delay,
        }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Send `body` to every recipient.
    ///
    /// Readiness is not checked; on a session that is not connected every
    /// recipient fails at the client and is counted as failed.
    pub async fn send_bulk<S: AsRef<str>>(&self, recipients: &[S], body: &str) -> DispatchOutcome {
        if recipients.is_empty() {
            debug!("Empty recipient list, nothing to send");
            return DispatchOutcome::default();
        }

        info!(recipients = recipients.len(), "Starting bulk dispatch");
        let timer = Timer::new(metrics::BATCH_DURATION_MS);
        let mut results = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            let recipient = recipient.as_ref();
            let jid = Jid::for_recipient(recipient, &self.domain);

            let outcome = match self.ctx.client().send_text(&jid, body).await {
                Ok(id) => {
                    self.analytics.record_sent();
                    info!(to = %jid, delivery_id = %id, "Message sent");
                    RecipientOutcome::Delivered(id)
                }
                Err(source) => {
                    self.analytics.record_failed();
                    warn!(to = %jid, error = %source, "Message failed");
                    RecipientOutcome::Failed(SendError { recipient: recipient.to_string(), source })
                }
            };
            results.push(RecipientResult { recipient: recipient.to_string(), outcome });

            tokio::time::sleep(self.pacing).await;
        }

        timer.stop();
        let outcome = DispatchOutcome { results };
        info!(sent = outcome.sent(), failed = outcome.failed(), "Bulk dispatch finished");
        outcome
    }
}
