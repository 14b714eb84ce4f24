//! Poll/correlate loop
//!
//! Cooperative polling over every outstanding handle: each pass makes
//! one zero-timeout check per target, so a slow target never holds up
//! the others. Replies are folded into an [`Accumulator`] owned by the
//! current operation.

use std::time::Duration;

use tracing::{debug, error, warn};

use super::dispatch::PendingTable;
use super::strategy::OperationStrategy;
use super::AbandonSignal;
use crate::conn::ConnectionSet;
use crate::protocol::{LdapResult, Reply};

/// Per-operation state built while polling
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    /// The authoritative answer, if any
    pub positive: Option<(usize, LdapResult)>,
    /// Definitive non-positive answers in arrival order
    pub failures: Vec<(usize, LdapResult)>,
    /// Definitive replies received
    pub definitive: usize,
    /// Targets whose handle failed at the transport or protocol level
    pub transport_failed: Vec<usize>,
}

/// How the polling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEnd {
    /// Every handle resolved
    Completed,
    /// The abandon signal fired; outstanding handles were abandoned
    Abandoned,
    /// A second positive answer arrived from `second`
    Violation { first: usize, second: usize },
}

/// Drive every pending handle to a terminal state.
pub async fn poll_all(
    strategy: &dyn OperationStrategy,
    conns: &ConnectionSet,
    pending: &mut PendingTable,
    acc: &mut Accumulator,
    abandon: &AbandonSignal,
    poll_interval: Duration,
) -> PollEnd {
    loop {
        if pending.is_empty() {
            return PollEnd::Completed;
        }

        if abandon.is_abandoned() {
            debug!(outstanding = pending.outstanding_count(), "Operation abandoned mid-flight");
            abandon_outstanding(conns, pending).await;
            return PollEnd::Abandoned;
        }

        for (index, msgid) in pending.outstanding() {
            let Some(conn) = conns.get(index) else {
                pending.resolve(index);
                acc.transport_failed.push(index);
                continue;
            };

            let reply = match conn.poll(msgid).await {
                Ok(Some(reply)) => reply,
                Ok(None) => continue,
                Err(e) => {
                    warn!(target_idx = index, msgid = %msgid, error = %e, "Target handle failed");
                    pending.resolve(index);
                    acc.transport_failed.push(index);
                    continue;
                }
            };

            let (op, result) = match reply {
                Reply::Intermediate { .. } => {
                    debug!(target_idx = index, msgid = %msgid, "Discarding intermediate reply");
                    continue;
                }
                Reply::Final { op, result } => (op, result),
            };

            pending.resolve(index);

            if op != strategy.response_op() {
                warn!(
                    target_idx = index,
                    msgid = %msgid,
                    expected = ?strategy.response_op(),
                    got = ?op,
                    "Final reply carries the wrong response tag"
                );
                acc.transport_failed.push(index);
                continue;
            }

            acc.definitive += 1;

            if !strategy.is_positive(result.code) {
                debug!(target_idx = index, code = %result.code, "Target answered negatively");
                acc.failures.push((index, result));
                continue;
            }

            if let Some((first, _)) = acc.positive {
                error!(
                    first_target = first,
                    second_target = index,
                    op = strategy.kind(),
                    dn = %strategy.dn(),
                    "Two targets answered authoritatively for the same entry; targets are inconsistent"
                );
                abandon_outstanding(conns, pending).await;
                return PollEnd::Violation {
                    first,
                    second: index,
                };
            }

            debug!(target_idx = index, code = %result.code, "Authoritative answer received");
            acc.positive = Some((index, result));
        }

        if !pending.is_empty() {
            if poll_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

/// Abandon every outstanding handle exactly once and clear the table
pub async fn abandon_outstanding(conns: &ConnectionSet, pending: &mut PendingTable) {
    for (index, msgid) in pending.outstanding() {
        pending.resolve(index);
        let Some(conn) = conns.get(index) else {
            continue;
        };
        if let Err(e) = conn.abandon(msgid).await {
            warn!(target_idx = index, msgid = %msgid, error = %e, "Failed to abandon request on target");
        }
    }
}
