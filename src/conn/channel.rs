//! Channel-backed transport handle
//!
//! Sits directly above the wire codec: outbound requests are handed to
//! the codec task as [`Envelope`]s, decoded replies come back as
//! `(MsgId, Reply)` frames. A reader task files each frame under its
//! message id so that [`TargetConnection::poll`] is a plain map lookup
//! and never waits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::TargetConnection;
use crate::protocol::{MsgId, Reply, Request};
use crate::types::{GatewayError, Result};

/// Frame handed to the codec task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Request { msgid: MsgId, request: Request },
    Abandon { msgid: MsgId },
}

/// Transport handle over a pair of decoded message channels
pub struct ChannelConnection {
    /// Last message id handed out
    next_id: AtomicI32,
    /// Requests and abandons towards the codec task
    outbound: mpsc::Sender<Envelope>,
    /// Replies received per outstanding message id
    inbox: Arc<DashMap<MsgId, VecDeque<Reply>>>,
    /// Set once the inbound side is gone
    closed: Arc<AtomicBool>,
}

impl ChannelConnection {
    /// Wire a connection and start its reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        outbound: mpsc::Sender<Envelope>,
        inbound: mpsc::Receiver<(MsgId, Reply)>,
    ) -> Self {
        let inbox = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(reader_loop(inbound, Arc::clone(&inbox), Arc::clone(&closed)));

        Self {
            next_id: AtomicI32::new(0),
            outbound,
            inbox,
            closed,
        }
    }

    /// Whether the inbound side has shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests still awaiting a final reply
    pub fn outstanding(&self) -> usize {
        self.inbox.len()
    }

    fn allocate_id(&self) -> MsgId {
        let prev = self
            .next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| Some(next_msgid(id)))
            .unwrap_or_else(|id| id);
        MsgId(next_msgid(prev))
    }
}

/// Message ids are positive and wrap back to 1 after `i32::MAX`
fn next_msgid(id: i32) -> i32 {
    if id <= 0 || id == i32::MAX {
        1
    } else {
        id + 1
    }
}

/// File inbound frames under their message id until the channel closes
async fn reader_loop(
    mut inbound: mpsc::Receiver<(MsgId, Reply)>,
    inbox: Arc<DashMap<MsgId, VecDeque<Reply>>>,
    closed: Arc<AtomicBool>,
) {
    while let Some((msgid, reply)) = inbound.recv().await {
        match inbox.get_mut(&msgid) {
            Some(mut queue) => queue.push_back(reply),
            None => debug!(msgid = %msgid, "Dropping reply for unknown or abandoned request"),
        }
    }

    closed.store(true, Ordering::Release);
    info!("Target connection closed");
}

#[async_trait::async_trait]
impl TargetConnection for ChannelConnection {
    async fn send(&self, request: Request) -> Result<MsgId> {
        if self.is_closed() {
            return Err(GatewayError::Transport("connection closed".into()));
        }

        let msgid = self.allocate_id();
        self.inbox.insert(msgid, VecDeque::new());

        if let Err(e) = self.outbound.try_send(Envelope::Request { msgid, request }) {
            self.inbox.remove(&msgid);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => {
                    GatewayError::Transport("outbound queue full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    GatewayError::Transport("connection closed".into())
                }
            });
        }

        Ok(msgid)
    }

    async fn poll(&self, msgid: MsgId) -> Result<Option<Reply>> {
        // Read the flag first: once set, every reply has already been filed
        let closed = self.is_closed();

        let next = match self.inbox.get_mut(&msgid) {
            Some(mut queue) => queue.pop_front(),
            None => {
                return Err(GatewayError::Protocol(format!(
                    "no outstanding request with msgid {}",
                    msgid
                )))
            }
        };

        match next {
            Some(reply) => {
                if matches!(reply, Reply::Final { .. }) {
                    self.inbox.remove(&msgid);
                }
                Ok(Some(reply))
            }
            None if closed => {
                self.inbox.remove(&msgid);
                Err(GatewayError::Transport("connection closed".into()))
            }
            None => Ok(None),
        }
    }

    async fn abandon(&self, msgid: MsgId) -> Result<()> {
        self.inbox.remove(&msgid);
        self.outbound
            .try_send(Envelope::Abandon { msgid })
            .map_err(|e| GatewayError::Transport(format!("failed to send abandon: {}", e)))
    }
}
