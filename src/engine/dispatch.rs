//! Dispatcher: rewrite and send the operation to every candidate
//!
//! Runs in two passes over the candidates in increasing index order.
//! The first pass rewrites the operation for each reachable candidate;
//! a target that cannot represent the name aborts the operation before
//! anything has been sent. The second pass transmits and records one
//! correlation handle per target in the [`PendingTable`].

use tracing::{debug, warn};

use super::strategy::{OperationStrategy, Prepared};
use crate::conn::ConnectionSet;
use crate::protocol::{MsgId, Request};
use crate::rewrite::{NamespaceMapper, Unwilling};
use crate::target::{CandidateSet, TargetRegistry};

/// Correlation handle per target index; `None` = not dispatched or resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTable {
    slots: Vec<Option<MsgId>>,
}

impl PendingTable {
    pub fn new(n: usize) -> Self {
        Self {
            slots: vec![None; n],
        }
    }

    pub fn record(&mut self, target: usize, msgid: MsgId) {
        if target >= self.slots.len() {
            self.slots.resize(target + 1, None);
        }
        self.slots[target] = Some(msgid);
    }

    /// Clear a slot; returns the handle it held
    pub fn resolve(&mut self, target: usize) -> Option<MsgId> {
        self.slots.get_mut(target).and_then(Option::take)
    }

    pub fn get(&self, target: usize) -> Option<MsgId> {
        self.slots.get(target).copied().flatten()
    }

    /// Outstanding `(target, msgid)` pairs in target order
    pub fn outstanding(&self) -> Vec<(usize, MsgId)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|msgid| (i, msgid)))
            .collect()
    }

    pub fn outstanding_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding_count() == 0
    }
}

/// What the dispatcher did
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub pending: PendingTable,
    /// Candidates in the set
    pub candidates: usize,
    /// Requests successfully transmitted
    pub dispatched: usize,
    /// Candidates without an equivalent attribute/value
    pub excluded: usize,
    /// Candidates with no live connection
    pub unreachable: usize,
    /// Candidates whose send failed locally
    pub send_failed: Vec<usize>,
}

/// Rewrite and transmit `strategy` to every reachable candidate.
///
/// Returns `Err` only for a structural rewrite failure, in which case no
/// request has been sent to any target.
pub async fn dispatch(
    strategy: &dyn OperationStrategy,
    registry: &TargetRegistry,
    mapper: &dyn NamespaceMapper,
    candidates: &CandidateSet,
    conns: &ConnectionSet,
) -> std::result::Result<DispatchReport, Unwilling> {
    let mut report = DispatchReport {
        pending: PendingTable::new(registry.len()),
        candidates: candidates.count(),
        ..Default::default()
    };

    let mut prepared: Vec<(usize, Request)> = Vec::with_capacity(report.candidates);

    for index in candidates.indices() {
        let Some(target) = registry.get(index) else {
            warn!(target_idx = index, "Candidate index outside the target registry");
            continue;
        };

        if !conns.is_live(index) {
            debug!(target_idx = index, name = %target.name, "Candidate unreachable, skipping");
            report.unreachable += 1;
            continue;
        }

        match strategy.prepare(target, mapper)? {
            Prepared::Send(request) => prepared.push((index, request)),
            Prepared::Excluded => {
                debug!(
                    target_idx = index,
                    name = %target.name,
                    op = strategy.kind(),
                    "No equivalent attribute on target, excluded"
                );
                report.excluded += 1;
            }
        }
    }

    for (index, request) in prepared {
        let Some(conn) = conns.get(index) else {
            continue;
        };

        match conn.send(request).await {
            Ok(msgid) => {
                debug!(target_idx = index, msgid = %msgid, op = strategy.kind(), "Dispatched");
                report.pending.record(index, msgid);
                report.dispatched += 1;
            }
            Err(e) => {
                warn!(target_idx = index, op = strategy.kind(), error = %e, "Send to target failed");
                report.send_failed.push(index);
            }
        }
    }

    Ok(report)
}
