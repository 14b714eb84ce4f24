//! Result finalization
//!
//! Collapses the accumulated replies into the one response the client
//! gets. Runs exactly once per operation, whichever way it ended.

use tracing::{debug, warn};

use super::dispatch::DispatchReport;
use super::poll::{Accumulator, PollEnd};
use super::strategy::OperationStrategy;
use super::AggregatedOutcome;
use crate::cache::ResultCache;
use crate::dn;
use crate::protocol::{LdapResult, ResultCode};
use crate::rewrite::{NamespaceMapper, RewriteContext, Unwilling};
use crate::target::TargetRegistry;
use crate::types::GatewayError;

/// How the operation terminated before finalization
#[derive(Debug)]
pub enum Termination {
    /// A candidate could not represent the name; nothing was sent
    Unwilling(Unwilling),
    /// Dispatch ran and polling ended
    Polled { report: DispatchReport, end: PollEnd },
}

/// Pick the failure reported when no target answered positively.
///
/// The last definitive failure to arrive wins. Kept separate so the tie
/// break can change (e.g. deepest matched name) without touching the loop.
pub fn select_failure(failures: &[(usize, LdapResult)]) -> Option<&(usize, LdapResult)> {
    failures.last()
}

/// Collaborators the finalizer needs
pub struct Finalizer<'a> {
    pub registry: &'a TargetRegistry,
    pub mapper: &'a dyn NamespaceMapper,
    pub cache: Option<&'a dyn ResultCache>,
}

impl Finalizer<'_> {
    pub fn finalize(
        &self,
        strategy: &dyn OperationStrategy,
        termination: Termination,
        acc: Accumulator,
    ) -> AggregatedOutcome {
        let (report, end) = match termination {
            Termination::Unwilling(unwilling) => {
                return AggregatedOutcome::from_error(&GatewayError::Unwilling(
                    unwilling.to_string(),
                ));
            }
            Termination::Polled { report, end } => (report, end),
        };

        let mut outcome = match end {
            PollEnd::Abandoned => {
                let mut outcome = AggregatedOutcome::new(ResultCode::Cancelled)
                    .with_diagnostic("operation abandoned");
                outcome.abandoned = true;
                outcome
            }
            PollEnd::Violation { first, second } => {
                AggregatedOutcome::from_error(&GatewayError::Internal(format!(
                    "internal consistency violation: targets {} and {} both answered authoritatively",
                    first, second
                )))
            }
            PollEnd::Completed => self.completed(strategy, &report, &acc),
        };

        outcome.definitive = acc.definitive;
        outcome.dispatched = report.dispatched;
        outcome.failed_targets = report
            .send_failed
            .iter()
            .chain(acc.transport_failed.iter())
            .copied()
            .collect();
        outcome
    }

    fn completed(
        &self,
        strategy: &dyn OperationStrategy,
        report: &DispatchReport,
        acc: &Accumulator,
    ) -> AggregatedOutcome {
        if let Some((index, ref result)) = acc.positive {
            if let Some(cache) = self.cache {
                cache.record_success(&dn::normalize(strategy.dn()), index);
            }
            let mut outcome = AggregatedOutcome::new(result.code)
                .with_diagnostic(result.diagnostic.clone());
            outcome.matched = self.logical_matched(index, &result.matched_dn);
            outcome.authoritative_target = Some(index);
            return outcome;
        }

        if let Some((index, result)) = select_failure(&acc.failures) {
            let mut outcome =
                AggregatedOutcome::new(result.code).with_diagnostic(result.diagnostic.clone());
            outcome.matched = self.logical_matched(*index, &result.matched_dn);
            return outcome;
        }

        if report.dispatched == 0 && report.unreachable == 0 && report.send_failed.is_empty() {
            debug!(
                op = strategy.kind(),
                candidates = report.candidates,
                excluded = report.excluded,
                "No target can hold the requested entry"
            );
            return AggregatedOutcome::new(strategy.no_candidate_code());
        }

        AggregatedOutcome::from_error(&GatewayError::Unavailable("no target answered".into()))
    }

    /// Rewrite a target-native matched name back into the logical namespace
    fn logical_matched(&self, index: usize, matched: &str) -> Option<String> {
        if matched.is_empty() {
            return None;
        }
        let target = self.registry.get(index)?;
        match self
            .mapper
            .rewrite_name(target, RewriteContext::MatchedDn, matched)
        {
            Ok(logical) => Some(logical),
            Err(e) => {
                warn!(target_idx = index, error = %e, "Dropping matched name that cannot be rewritten");
                None
            }
        }
    }
}
