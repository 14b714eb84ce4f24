//! metagate - scatter-gather proxy over several directory servers
//!
//! Presents N independent directory servers ("targets") as one logical
//! tree. A client operation is rewritten into each candidate target's
//! namespace, sent to all of them, and the replies are collapsed into a
//! single answer: the first authoritative reply wins, and if none
//! arrives the last failure is reported.
//!
//! ## Components
//!
//! - **Targets**: registry of configured servers and candidate selection
//! - **Rewrite**: logical ↔ target namespace mapping
//! - **Connections**: per-session connection sets over a transport seam
//! - **Engine**: dispatch, polling and result aggregation
//! - **Cache**: remembers which target answered for a name

pub mod cache;
pub mod config;
pub mod conn;
pub mod dn;
pub mod engine;
pub mod logging;
pub mod protocol;
pub mod rewrite;
pub mod target;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cache::{DnCache, DnCacheConfig, ResultCache};
pub use config::Args;
pub use conn::{ConnectionPool, ConnectionSet, Connector, SessionPool, TargetConnection};
pub use engine::{AbandonSignal, AggregatedOutcome, Engine, EngineConfig, Operation};
pub use protocol::{LdapResult, MsgId, Reply, Request, ResultCode};
pub use rewrite::{MassageMapper, NamespaceMapper};
pub use target::{CandidateSelector, CandidateSet, SuffixSelector, Target, TargetRegistry};
pub use types::{GatewayError, Result};
