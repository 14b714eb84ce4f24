//! Logging infrastructure for metagate
//!
//! Subscriber setup for the binary and the structured per-operation
//! outcome event the engine emits when an operation completes.

use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::engine::AggregatedOutcome;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `metagate=<level>,info`.
pub fn init(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("metagate={},info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Completion record for one proxied operation
#[derive(Debug, Clone)]
pub struct OutcomeEvent<'a> {
    /// Operation kind (bind, compare, ...)
    pub operation: &'static str,
    /// Logical name the operation targeted
    pub dn: &'a str,
    pub outcome: &'a AggregatedOutcome,
    pub elapsed: Duration,
}

impl<'a> OutcomeEvent<'a> {
    pub fn new(
        operation: &'static str,
        dn: &'a str,
        outcome: &'a AggregatedOutcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            operation,
            dn,
            outcome,
            elapsed,
        }
    }

    /// Log the event; failed targets raise it to `info`
    pub fn emit(&self) {
        let outcome = self.outcome;
        let elapsed_ms = self.elapsed.as_millis() as u64;

        if outcome.failed_targets.is_empty() {
            debug!(
                op = self.operation,
                dn = %self.dn,
                code = %outcome.code,
                authoritative = ?outcome.authoritative_target,
                dispatched = outcome.dispatched,
                definitive = outcome.definitive,
                abandoned = outcome.abandoned,
                elapsed_ms,
                "Operation complete"
            );
        } else {
            info!(
                op = self.operation,
                dn = %self.dn,
                code = %outcome.code,
                authoritative = ?outcome.authoritative_target,
                dispatched = outcome.dispatched,
                definitive = outcome.definitive,
                failed_targets = ?outcome.failed_targets,
                elapsed_ms,
                "Operation complete with target failures"
            );
        }
    }
}
