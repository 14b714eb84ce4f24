//! Target connections
//!
//! A client session owns one live, authenticated transport handle per
//! target. The engine never connects or binds itself: it receives a
//! [`ConnectionSet`] and drives requests through [`TargetConnection`].
//!
//! ## Pool
//!
//! [`SessionPool`] keeps handles per `(session, target)`, connecting
//! lazily through a [`Connector`]. Handles that turned out unusable are
//! invalidated so the next operation on the session reconnects.

pub mod channel;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{MsgId, Reply, Request};
use crate::target::{Target, TargetRegistry};
use crate::types::Result;

pub use channel::{ChannelConnection, Envelope};

/// Client session identifier
pub type SessionId = Uuid;

/// One transport handle to one target
#[async_trait::async_trait]
pub trait TargetConnection: Send + Sync {
    /// Transmit a request without waiting for its reply.
    /// Returns the correlation handle for later polling.
    async fn send(&self, request: Request) -> Result<MsgId>;

    /// Zero-timeout check for a reply to `msgid`. `Ok(None)` means no reply yet.
    async fn poll(&self, msgid: MsgId) -> Result<Option<Reply>>;

    /// Abandon an outstanding request
    async fn abandon(&self, msgid: MsgId) -> Result<()>;
}

/// Establishes new handles to a target
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn TargetConnection>>;
}

/// Supplies the handle a session uses for a target
#[async_trait::async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn connection_for(
        &self,
        session: SessionId,
        target: &Target,
    ) -> Result<Arc<dyn TargetConnection>>;
}

// ============================================================================
// Connection Set
// ============================================================================

/// Per-session handles indexed by target; `None` means unavailable
#[derive(Clone, Default)]
pub struct ConnectionSet {
    conns: Vec<Option<Arc<dyn TargetConnection>>>,
}

impl ConnectionSet {
    /// A set of `n` slots, all unavailable
    pub fn new(n: usize) -> Self {
        Self {
            conns: vec![None; n],
        }
    }

    /// Install the handle for target `index`
    pub fn set(&mut self, index: usize, conn: Arc<dyn TargetConnection>) {
        if index >= self.conns.len() {
            self.conns.resize(index + 1, None);
        }
        self.conns[index] = Some(conn);
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn TargetConnection>> {
        self.conns.get(index).and_then(|c| c.as_ref())
    }

    pub fn is_live(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Ask the pool for a handle to every target of the registry.
    ///
    /// Targets the pool cannot reach are left unavailable; the
    /// dispatcher skips them.
    pub async fn assemble(
        pool: &dyn ConnectionPool,
        session: SessionId,
        registry: &TargetRegistry,
    ) -> Self {
        let mut set = Self::new(registry.len());
        for target in registry.iter() {
            match pool.connection_for(session, target).await {
                Ok(conn) => set.set(target.index, conn),
                Err(e) => {
                    warn!(
                        session = %session,
                        target_idx = target.index,
                        name = %target.name,
                        error = %e,
                        "Target unavailable for session"
                    );
                }
            }
        }
        set
    }
}

impl std::fmt::Debug for ConnectionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live: Vec<usize> = (0..self.conns.len()).filter(|i| self.is_live(*i)).collect();
        f.debug_struct("ConnectionSet")
            .field("slots", &self.conns.len())
            .field("live", &live)
            .finish()
    }
}

// ============================================================================
// Session Pool
// ============================================================================

/// Lazily connected handles keyed by `(session, target index)`
pub struct SessionPool<C: Connector> {
    connector: C,
    handles: DashMap<(SessionId, usize), Arc<dyn TargetConnection>>,
}

impl<C: Connector> SessionPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handles: DashMap::new(),
        }
    }

    /// Drop a handle that became unusable; the next use reconnects
    pub fn invalidate(&self, session: SessionId, target: usize) -> bool {
        let removed = self.handles.remove(&(session, target)).is_some();
        if removed {
            debug!(session = %session, target_idx = target, "Invalidated target handle");
        }
        removed
    }

    /// Drop every handle of a finished session. Returns how many were dropped.
    pub fn end_session(&self, session: SessionId) -> usize {
        let before = self.handles.len();
        self.handles.retain(|(s, _), _| *s != session);
        let dropped = before.saturating_sub(self.handles.len());
        if dropped > 0 {
            info!(session = %session, dropped, "Session ended, released target handles");
        }
        dropped
    }

    /// Number of live handles across all sessions
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}

#[async_trait::async_trait]
impl<C: Connector> ConnectionPool for SessionPool<C> {
    async fn connection_for(
        &self,
        session: SessionId,
        target: &Target,
    ) -> Result<Arc<dyn TargetConnection>> {
        let key = (session, target.index);
        let existing = self.handles.get(&key).map(|conn| Arc::clone(conn.value()));
        if let Some(conn) = existing {
            return Ok(conn);
        }

        let conn = self.connector.connect(target).await?;
        debug!(session = %session, target_idx = target.index, uri = %target.uri, "Connected to target");

        // Another operation on the session may have connected meanwhile
        let conn = self.handles.entry(key).or_insert(conn);
        Ok(Arc::clone(conn.value()))
    }
}
