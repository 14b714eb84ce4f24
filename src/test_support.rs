//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::conn::{ConnectionSet, TargetConnection};
use crate::protocol::{LdapResult, MsgId, Reply, Request, ResponseOp, ResultCode};
use crate::target::{Target, TargetRegistry};
use crate::types::{GatewayError, Result};

/// What one poll of a [`ScriptedTarget`] yields
#[derive(Debug, Clone)]
pub enum Step {
    Pending,
    Reply(Reply),
    Fail,
}

#[derive(Debug, Default)]
struct ScriptState {
    next_id: i32,
    fail_send: bool,
    script: VecDeque<Step>,
    sent: Vec<(MsgId, Request)>,
    abandoned: Vec<MsgId>,
    polls: usize,
}

/// Target connection whose behaviour is scripted per test.
///
/// Polls consume the script front to back; an exhausted script keeps
/// answering "no reply yet".
#[derive(Debug, Default)]
pub struct ScriptedTarget {
    state: Mutex<ScriptState>,
}

impl ScriptedTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_send() -> Self {
        let target = Self::new();
        target.state.lock().unwrap().fail_send = true;
        target
    }

    pub fn then_pending(self, polls: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for _ in 0..polls {
                state.script.push_back(Step::Pending);
            }
        }
        self
    }

    pub fn then(self, step: Step) -> Self {
        self.state.lock().unwrap().script.push_back(step);
        self
    }

    pub fn then_final(self, op: ResponseOp, result: LdapResult) -> Self {
        self.then(Step::Reply(Reply::final_result(op, result)))
    }

    pub fn then_code(self, op: ResponseOp, code: ResultCode) -> Self {
        self.then_final(op, LdapResult::new(code))
    }

    pub fn sent(&self) -> Vec<(MsgId, Request)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn abandoned(&self) -> Vec<MsgId> {
        self.state.lock().unwrap().abandoned.clone()
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }
}

#[async_trait::async_trait]
impl TargetConnection for ScriptedTarget {
    async fn send(&self, request: Request) -> Result<MsgId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(GatewayError::Transport("scripted send failure".into()));
        }
        state.next_id += 1;
        let msgid = MsgId(state.next_id);
        state.sent.push((msgid, request));
        Ok(msgid)
    }

    async fn poll(&self, _msgid: MsgId) -> Result<Option<Reply>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        match state.script.pop_front() {
            None | Some(Step::Pending) => Ok(None),
            Some(Step::Reply(reply)) => Ok(Some(reply)),
            Some(Step::Fail) => Err(GatewayError::Transport("scripted poll failure".into())),
        }
    }

    async fn abandon(&self, msgid: MsgId) -> Result<()> {
        self.state.lock().unwrap().abandoned.push(msgid);
        Ok(())
    }
}

/// `n` pass-through targets all serving `dc=x`
pub fn fixture_registry(n: usize) -> TargetRegistry {
    TargetRegistry::new(
        (0..n)
            .map(|i| Target::new(i, format!("t{}", i), format!("ldap://t{}:389", i), "dc=x"))
            .collect(),
    )
}

/// Connection set over the given scripted targets, by index
pub fn connection_set(targets: &[Arc<ScriptedTarget>]) -> ConnectionSet {
    let mut set = ConnectionSet::new(targets.len());
    for (i, target) in targets.iter().enumerate() {
        set.set(i, Arc::clone(target) as Arc<dyn TargetConnection>);
    }
    set
}
