//! Dispatch-and-aggregate engine
//!
//! Takes one client operation plus its candidate set, fans it out to
//! every eligible target, polls the replies and collapses them into a
//! single [`AggregatedOutcome`].
//!
//! ## Flow
//!
//! 1. [`dispatch`](dispatch::dispatch) rewrites the operation per target
//!    and sends it, recording one correlation handle per target
//! 2. [`poll_all`](poll::poll_all) checks every handle without blocking
//!    until all resolve, the client abandons, or two targets answer
//!    authoritatively
//! 3. [`Finalizer`](finalize::Finalizer) builds the response and notifies
//!    the result cache
//!
//! The first positive answer wins. A second positive answer is reported
//! as an internal error, never resolved by picking one.
//!
//! All state for an operation lives in the call; the engine itself is
//! shared read-only across sessions.

pub mod dispatch;
pub mod finalize;
pub mod poll;
pub mod strategy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::ResultCache;
use crate::conn::ConnectionSet;
use crate::logging::OutcomeEvent;
use crate::protocol::{LdapResult, ResultCode};
use crate::rewrite::NamespaceMapper;
use crate::target::{CandidateSet, TargetRegistry};
use crate::types::GatewayError;

use finalize::{Finalizer, Termination};
use poll::Accumulator;

pub use finalize::select_failure;
pub use strategy::{
    AddOp, Ava, BindOp, CompareOp, DeleteOp, LogicalAttribute, LogicalModification, ModifyOp,
    Operation, OperationStrategy, Prepared, RenameOp,
};

/// Final result of one proxied operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedOutcome {
    pub code: ResultCode,
    /// Matched name, already in the logical namespace
    pub matched: Option<String>,
    pub diagnostic: Option<String>,
    /// Definitive replies received
    pub definitive: usize,
    /// Target whose answer was authoritative
    pub authoritative_target: Option<usize>,
    /// Requests transmitted
    pub dispatched: usize,
    /// Targets whose handle failed; callers may invalidate them
    pub failed_targets: Vec<usize>,
    /// The client abandoned the operation
    pub abandoned: bool,
}

impl AggregatedOutcome {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            matched: None,
            diagnostic: None,
            definitive: 0,
            authoritative_target: None,
            dispatched: 0,
            failed_targets: Vec::new(),
            abandoned: false,
        }
    }

    /// Outcome for an engine-level failure, coded by the error kind
    pub fn from_error(err: &GatewayError) -> Self {
        Self::new(err.result_code()).with_diagnostic(err.to_string())
    }

    /// Attach a diagnostic; empty text leaves it unset
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        self.diagnostic = (!diagnostic.is_empty()).then_some(diagnostic);
        self
    }

    /// Result to send back to the client
    pub fn to_ldap_result(&self) -> LdapResult {
        LdapResult {
            code: self.code,
            matched_dn: self.matched.clone().unwrap_or_default(),
            diagnostic: self.diagnostic.clone().unwrap_or_default(),
        }
    }
}

/// Client-side abandon request, checked between polling passes
#[derive(Debug, Clone, Default)]
pub struct AbandonSignal {
    flag: Arc<AtomicBool>,
}

impl AbandonSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abandon(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_abandoned(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause between polling passes; zero yields to the runtime instead
    pub poll_interval: Duration,
    /// Notify the result cache on authoritative answers
    pub cache_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            cache_enabled: true,
        }
    }
}

/// The scatter-gather engine
pub struct Engine {
    registry: Arc<TargetRegistry>,
    mapper: Arc<dyn NamespaceMapper>,
    cache: Option<Arc<dyn ResultCache>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Arc<TargetRegistry>, mapper: Arc<dyn NamespaceMapper>) -> Self {
        Self {
            registry,
            mapper,
            cache: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Execute a client operation across its candidate targets
    pub async fn execute(
        &self,
        op: &Operation,
        candidates: &CandidateSet,
        conns: &ConnectionSet,
        abandon: &AbandonSignal,
    ) -> AggregatedOutcome {
        self.execute_with(op.strategy(), candidates, conns, abandon)
            .await
    }

    /// Execute any operation kind described by a strategy object
    pub async fn execute_with(
        &self,
        strategy: &dyn OperationStrategy,
        candidates: &CandidateSet,
        conns: &ConnectionSet,
        abandon: &AbandonSignal,
    ) -> AggregatedOutcome {
        let started = Instant::now();
        let mut acc = Accumulator::default();

        let termination = match dispatch::dispatch(
            strategy,
            &self.registry,
            self.mapper.as_ref(),
            candidates,
            conns,
        )
        .await
        {
            Ok(mut report) => {
                let end = poll::poll_all(
                    strategy,
                    conns,
                    &mut report.pending,
                    &mut acc,
                    abandon,
                    self.config.poll_interval,
                )
                .await;
                Termination::Polled { report, end }
            }
            Err(unwilling) => Termination::Unwilling(unwilling),
        };

        let finalizer = Finalizer {
            registry: &self.registry,
            mapper: self.mapper.as_ref(),
            cache: if self.config.cache_enabled {
                self.cache.as_deref()
            } else {
                None
            },
        };
        let outcome = finalizer.finalize(strategy, termination, acc);

        OutcomeEvent::new(strategy.kind(), strategy.dn(), &outcome, started.elapsed()).emit();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DnCache;
    use crate::conn::{ChannelConnection, Envelope, TargetConnection};
    use crate::protocol::{MsgId, Reply, Request, ResponseOp};
    use crate::rewrite::MassageMapper;
    use crate::target::{RewriteMap, Target};
    use crate::test_support::{connection_set, fixture_registry, ScriptedTarget, Step};
    use tokio::sync::mpsc;

    fn engine(registry: TargetRegistry) -> Engine {
        Engine::new(Arc::new(registry), Arc::new(MassageMapper))
    }

    fn compare() -> Operation {
        Operation::compare("uid=alice,ou=people,dc=x", "mail", "alice@x")
    }

    fn failure(code: ResultCode, matched: &str, text: &str) -> LdapResult {
        LdapResult::new(code)
            .with_matched(matched)
            .with_diagnostic(text)
    }

    #[tokio::test]
    async fn test_single_positive_is_returned_verbatim() {
        let t0 = Arc::new(ScriptedTarget::new().then_final(
            ResponseOp::Compare,
            LdapResult::new(ResultCode::CompareTrue).with_diagnostic("matched"),
        ));
        let conns = connection_set(&[t0.clone()]);

        let outcome = engine(fixture_registry(1))
            .execute(&compare(), &CandidateSet::all(1), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::CompareTrue);
        assert_eq!(outcome.diagnostic.as_deref(), Some("matched"));
        assert_eq!(outcome.matched, None);
        assert_eq!(outcome.authoritative_target, Some(0));
        assert_eq!(outcome.definitive, 1);
        assert_eq!(t0.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_all_failures_last_to_arrive_wins() {
        // t0 resolves last even though it is dispatched first
        let t0 = Arc::new(ScriptedTarget::new().then_pending(3).then_final(
            ResponseOp::Compare,
            failure(ResultCode::NoSuchObject, "dc=x", "from t0"),
        ));
        let t1 = Arc::new(ScriptedTarget::new().then_final(
            ResponseOp::Compare,
            failure(ResultCode::NoSuchObject, "ou=people,dc=x", "from t1"),
        ));
        let conns = connection_set(&[t0, t1]);

        let outcome = engine(fixture_registry(2))
            .execute(&compare(), &CandidateSet::all(2), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::NoSuchObject);
        assert_eq!(outcome.diagnostic.as_deref(), Some("from t0"));
        assert_eq!(outcome.matched.as_deref(), Some("dc=x"));
        assert_eq!(outcome.definitive, 2);
        assert_eq!(outcome.authoritative_target, None);
    }

    #[tokio::test]
    async fn test_two_positives_is_internal_error() {
        let t0 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::CompareTrue));
        let t1 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::CompareFalse));
        let t2 = Arc::new(ScriptedTarget::new());
        let conns = connection_set(&[t0, t1, t2.clone()]);
        let cache = Arc::new(DnCache::with_defaults());

        let outcome = engine(fixture_registry(3))
            .with_cache(cache.clone())
            .execute(&compare(), &CandidateSet::all(3), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::Other);
        assert!(outcome
            .diagnostic
            .as_deref()
            .unwrap()
            .contains("internal consistency violation"));
        assert_eq!(outcome.authoritative_target, None);
        // The still-outstanding target is not left dangling
        assert_eq!(t2.abandoned().len(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_positive_wins_over_failures() {
        let t0 = Arc::new(ScriptedTarget::new().then_final(
            ResponseOp::Delete,
            failure(ResultCode::NoSuchObject, "dc=x", "not here"),
        ));
        let t1 = Arc::new(ScriptedTarget::new().then_pending(2).then_code(ResponseOp::Delete, ResultCode::Success));
        let conns = connection_set(&[t0, t1]);

        let outcome = engine(fixture_registry(2))
            .execute(
                &Operation::delete("uid=a,dc=x"),
                &CandidateSet::all(2),
                &conns,
                &AbandonSignal::new(),
            )
            .await;

        assert_eq!(outcome.code, ResultCode::Success);
        assert_eq!(outcome.matched, None);
        assert_eq!(outcome.diagnostic, None);
        assert_eq!(outcome.authoritative_target, Some(1));
    }

    #[tokio::test]
    async fn test_abandon_mid_poll_abandons_each_handle_once() {
        // t1 answers negatively before the abandon; it must not be abandoned
        let targets = vec![
            Arc::new(ScriptedTarget::new()),
            Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::Busy)),
            Arc::new(ScriptedTarget::new()),
        ];
        let conns = connection_set(&targets);
        let signal = AbandonSignal::new();

        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.abandon();
        });

        let outcome = engine(fixture_registry(3))
            .with_config(EngineConfig {
                poll_interval: Duration::from_millis(1),
                ..Default::default()
            })
            .execute(&compare(), &CandidateSet::all(3), &conns, &signal)
            .await;

        assert!(outcome.abandoned);
        assert_eq!(outcome.code, ResultCode::Cancelled);
        assert_eq!(targets[0].abandoned(), vec![targets[0].sent()[0].0]);
        assert!(targets[1].abandoned().is_empty());
        assert_eq!(targets[2].abandoned(), vec![targets[2].sent()[0].0]);
    }

    #[tokio::test]
    async fn test_unwilling_rewrite_aborts_before_any_dispatch() {
        let refusing = RewriteMap {
            unwilling_subtrees: vec!["ou=people,dc=x".into()],
            ..Default::default()
        };
        let registry = TargetRegistry::new(vec![
            Target::new(0, "t0", "ldap://t0", "dc=x"),
            Target::new(1, "t1", "ldap://t1", "dc=x"),
            Target::new(2, "t2", "ldap://t2", "dc=x").with_rewrite(refusing),
        ]);
        let targets: Vec<Arc<ScriptedTarget>> = (0..3).map(|_| Arc::new(ScriptedTarget::new())).collect();
        let conns = connection_set(&targets);

        let outcome = engine(registry)
            .execute(&compare(), &CandidateSet::all(3), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::UnwillingToPerform);
        assert!(outcome.diagnostic.as_deref().unwrap().starts_with("Unwilling to perform: target 2"));
        assert_eq!(outcome.dispatched, 0);
        for target in &targets {
            assert!(target.sent().is_empty());
        }
    }

    #[tokio::test]
    async fn test_mapping_miss_excludes_target_and_caches_answer() {
        let mut no_mail = RewriteMap::default();
        no_mail.attributes.insert("mail".into(), String::new());
        let registry = TargetRegistry::new(vec![
            Target::new(0, "t0", "ldap://t0", "dc=x").with_rewrite(no_mail),
            Target::new(1, "t1", "ldap://t1", "dc=x"),
            Target::new(2, "t2", "ldap://t2", "dc=x"),
        ]);
        let targets = vec![
            Arc::new(ScriptedTarget::new()),
            Arc::new(ScriptedTarget::new()),
            Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::CompareTrue)),
        ];
        let conns = connection_set(&targets);
        let cache = Arc::new(DnCache::with_defaults());

        let outcome = engine(registry)
            .with_cache(cache.clone())
            .execute(
                &Operation::compare("uid=Alice,ou=People,dc=x", "mail", "alice@x"),
                &CandidateSet::from_indices(3, &[0, 2]),
                &conns,
                &AbandonSignal::new(),
            )
            .await;

        assert!(targets[0].sent().is_empty());
        assert!(targets[1].sent().is_empty());
        assert_eq!(targets[2].sent().len(), 1);
        assert_eq!(outcome.code, ResultCode::CompareTrue);
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(cache.lookup("uid=alice,ou=people,dc=x"), Some(2));
    }

    #[tokio::test]
    async fn test_failing_matched_names_rewritten_to_logical_form() {
        let massaged = |suffix: &str| RewriteMap {
            massage_suffix: Some(suffix.into()),
            ..Default::default()
        };
        let registry = TargetRegistry::new(vec![
            Target::new(0, "a", "ldap://a", "dc=x").with_rewrite(massaged("o=a")),
            Target::new(1, "b", "ldap://b", "dc=x").with_rewrite(massaged("o=b")),
        ]);
        let t0 = Arc::new(ScriptedTarget::new().then_final(
            ResponseOp::Compare,
            failure(ResultCode::NoSuchObject, "ou=a,o=a", "first"),
        ));
        let t1 = Arc::new(ScriptedTarget::new().then_pending(1).then_final(
            ResponseOp::Compare,
            failure(ResultCode::NoSuchObject, "ou=b,o=b", "second"),
        ));
        let conns = connection_set(&[t0.clone(), t1]);

        let outcome = engine(registry)
            .execute(&compare(), &CandidateSet::all(2), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::NoSuchObject);
        assert_eq!(outcome.matched.as_deref(), Some("ou=b,dc=x"));
        assert_eq!(outcome.diagnostic.as_deref(), Some("second"));

        // Requests went out in each target's own namespace
        match &t0.sent()[0].1 {
            Request::Compare { dn, .. } => assert_eq!(dn, "uid=alice,ou=people,o=a"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_failure_is_local_to_target() {
        let t0 = Arc::new(ScriptedTarget::failing_send());
        let t1 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::CompareFalse));
        let conns = connection_set(&[t0, t1]);

        let outcome = engine(fixture_registry(2))
            .execute(&compare(), &CandidateSet::all(2), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::CompareFalse);
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(outcome.failed_targets, vec![0]);
    }

    #[tokio::test]
    async fn test_only_candidate_failing_is_unavailable() {
        let t0 = Arc::new(ScriptedTarget::new().then(Step::Fail));
        let conns = connection_set(&[t0]);

        let outcome = engine(fixture_registry(1))
            .execute(&compare(), &CandidateSet::all(1), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::Unavailable);
        assert_eq!(outcome.diagnostic.as_deref(), Some("Target unavailable: no target answered"));
        assert_eq!(outcome.failed_targets, vec![0]);

        let conns = connection_set(&[Arc::new(ScriptedTarget::failing_send())]);
        let outcome = engine(fixture_registry(1))
            .execute(&compare(), &CandidateSet::all(1), &conns, &AbandonSignal::new())
            .await;
        assert_eq!(outcome.code, ResultCode::Unavailable);
        assert_eq!(outcome.dispatched, 0);
    }

    #[tokio::test]
    async fn test_unreachable_candidate_is_skipped() {
        let t1 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Delete, ResultCode::Success));
        let mut conns = ConnectionSet::new(2);
        conns.set(1, t1.clone() as Arc<dyn TargetConnection>);

        let outcome = engine(fixture_registry(2))
            .execute(
                &Operation::delete("uid=a,dc=x"),
                &CandidateSet::all(2),
                &conns,
                &AbandonSignal::new(),
            )
            .await;

        assert_eq!(outcome.code, ResultCode::Success);
        assert_eq!(outcome.authoritative_target, Some(1));
    }

    #[tokio::test]
    async fn test_no_candidates_reports_no_such() {
        let conns = connection_set(&[Arc::new(ScriptedTarget::new())]);
        let engine = engine(fixture_registry(1));

        let outcome = engine
            .execute(&compare(), &CandidateSet::none(1), &conns, &AbandonSignal::new())
            .await;
        assert_eq!(outcome.code, ResultCode::NoSuchAttribute);

        let outcome = engine
            .execute(
                &Operation::delete("uid=a,dc=x"),
                &CandidateSet::none(1),
                &conns,
                &AbandonSignal::new(),
            )
            .await;
        assert_eq!(outcome.code, ResultCode::NoSuchObject);
    }

    #[tokio::test]
    async fn test_intermediate_replies_are_discarded() {
        let t0 = Arc::new(
            ScriptedTarget::new()
                .then(Step::Reply(Reply::Intermediate { name: Some("1.3.6.1.4.1.1".into()) }))
                .then(Step::Reply(Reply::Intermediate { name: None }))
                .then_code(ResponseOp::Compare, ResultCode::CompareTrue),
        );
        let conns = connection_set(&[t0.clone()]);

        let outcome = engine(fixture_registry(1))
            .execute(&compare(), &CandidateSet::all(1), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::CompareTrue);
        assert_eq!(outcome.definitive, 1);
        assert_eq!(t0.polls(), 3);
    }

    #[tokio::test]
    async fn test_wrong_response_tag_is_target_failure() {
        let t0 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Modify, ResultCode::Success));
        let t1 = Arc::new(ScriptedTarget::new().then_pending(1).then_code(ResponseOp::Compare, ResultCode::CompareTrue));
        let conns = connection_set(&[t0, t1]);

        let outcome = engine(fixture_registry(2))
            .execute(&compare(), &CandidateSet::all(2), &conns, &AbandonSignal::new())
            .await;

        assert_eq!(outcome.code, ResultCode::CompareTrue);
        assert_eq!(outcome.failed_targets, vec![0]);
        assert_eq!(outcome.definitive, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_by_config() {
        let t0 = Arc::new(ScriptedTarget::new().then_code(ResponseOp::Compare, ResultCode::CompareTrue));
        let conns = connection_set(&[t0]);
        let cache = Arc::new(DnCache::with_defaults());

        engine(fixture_registry(1))
            .with_cache(cache.clone())
            .with_config(EngineConfig {
                cache_enabled: false,
                ..Default::default()
            })
            .execute(&compare(), &CandidateSet::all(1), &conns, &AbandonSignal::new())
            .await;

        assert!(cache.is_empty());
    }

    /// Minimal target server: answers every request on the channel
    async fn serve(
        mut requests: mpsc::Receiver<Envelope>,
        replies: mpsc::Sender<(MsgId, Reply)>,
        code: ResultCode,
    ) {
        while let Some(envelope) = requests.recv().await {
            if let Envelope::Request { msgid, request } = envelope {
                let reply = Reply::final_result(request.response_op(), LdapResult::new(code));
                if replies.send((msgid, reply)).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_over_channel_connections() {
        let mut conns = ConnectionSet::new(2);
        for (i, code) in [ResultCode::NoSuchObject, ResultCode::Success].into_iter().enumerate() {
            let (out_tx, out_rx) = mpsc::channel(8);
            let (in_tx, in_rx) = mpsc::channel(8);
            tokio::spawn(serve(out_rx, in_tx, code));
            conns.set(i, Arc::new(ChannelConnection::new(out_tx, in_rx)) as Arc<dyn TargetConnection>);
        }

        let outcome = engine(fixture_registry(2))
            .execute(
                &Operation::delete("uid=a,dc=x"),
                &CandidateSet::all(2),
                &conns,
                &AbandonSignal::new(),
            )
            .await;

        assert_eq!(outcome.code, ResultCode::Success);
        assert_eq!(outcome.authoritative_target, Some(1));
        assert_eq!(outcome.definitive, 2);
    }

    #[test]
    fn test_outcome_to_ldap_result() {
        let mut outcome = AggregatedOutcome::new(ResultCode::NoSuchObject).with_diagnostic("gone");
        outcome.matched = Some("dc=x".into());
        let result = outcome.to_ldap_result();
        assert_eq!(result.matched_dn, "dc=x");
        assert_eq!(result.diagnostic, "gone");
        assert_eq!(AggregatedOutcome::new(ResultCode::Success).with_diagnostic("").diagnostic, None);
    }
}
