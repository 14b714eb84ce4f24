//! Configuration for metagate
//!
//! CLI arguments and environment variables via clap; the target list
//! lives in a separate JSON file named by `--targets`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::DnCacheConfig;
use crate::engine::EngineConfig;
use crate::types::{GatewayError, Result};

/// metagate - scatter-gather proxy over several directory servers
#[derive(Parser, Debug, Clone)]
#[command(name = "metagate")]
#[command(about = "Present several directory servers as one logical tree")]
pub struct Args {
    /// Path to the targets file (JSON)
    #[arg(long, env = "METAGATE_TARGETS", default_value = "targets.json")]
    pub targets: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Lifetime of a cached routing decision in seconds (0 disables the cache)
    #[arg(long, env = "DNCACHE_TTL_SECS", default_value = "3600")]
    pub dncache_ttl_secs: u64,

    /// Maximum number of cached routing decisions
    #[arg(long, env = "DNCACHE_MAX_ENTRIES", default_value = "10000")]
    pub dncache_max_entries: usize,

    /// Pause between polling passes in microseconds (0 = yield only)
    #[arg(long, env = "POLL_INTERVAL_US", default_value = "0")]
    pub poll_interval_us: u64,

    /// Print the candidate targets and per-target name for a DN, then exit
    #[arg(long)]
    pub route: Option<String>,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dncache_ttl_secs > 0 && self.dncache_max_entries == 0 {
            return Err("DNCACHE_MAX_ENTRIES must be positive when the cache is enabled".to_string());
        }

        if let Some(ref dn) = self.route {
            if !crate::dn::is_valid(dn) {
                return Err(format!("--route is not a valid DN: {:?}", dn));
            }
        }

        Ok(())
    }

    pub fn cache_enabled(&self) -> bool {
        self.dncache_ttl_secs > 0
    }

    pub fn cache_config(&self) -> DnCacheConfig {
        DnCacheConfig {
            ttl: Duration::from_secs(self.dncache_ttl_secs),
            max_entries: self.dncache_max_entries,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_micros(self.poll_interval_us),
            cache_enabled: self.cache_enabled(),
        }
    }

    /// Read and parse the targets file
    pub fn load_targets(&self) -> Result<TargetsFile> {
        let raw = std::fs::read_to_string(&self.targets).map_err(|e| {
            GatewayError::Config(format!("cannot read {}: {}", self.targets.display(), e))
        })?;
        TargetsFile::parse(&raw)
    }
}

/// Contents of the targets file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsFile {
    pub targets: Vec<TargetConfig>,
}

impl TargetsFile {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One remote directory server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub uri: String,
    /// Logical suffix served by this target
    pub suffix: String,
    /// Suffix the target actually uses, when it differs from `suffix`
    #[serde(default)]
    pub massage_suffix: Option<String>,
    /// Logical attribute → target attribute; empty value = no equivalent
    #[serde(default)]
    pub attribute_map: HashMap<String, String>,
    /// Logical object class → target object class; empty value = no equivalent
    #[serde(default)]
    pub objectclass_map: HashMap<String, String>,
    #[serde(default)]
    pub drop_unmapped: bool,
    #[serde(default)]
    pub unwilling_subtrees: Vec<String>,
}
