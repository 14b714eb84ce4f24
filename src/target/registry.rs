//! Target registry: the static list of remote directory targets
//!
//! Built once at startup from the targets file and shared read-only.
//! Each target keeps the logical index it was configured at; candidate
//! sets, connection sets and pending tables are all indexed by it.

use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::config::TargetConfig;
use crate::dn;
use crate::types::{GatewayError, Result};

/// Per-target namespace rewrite map
#[derive(Debug, Clone, Default)]
pub struct RewriteMap {
    /// Target-native suffix replacing the logical suffix, if any
    pub massage_suffix: Option<String>,
    /// logical attribute (lowercase) → target attribute, empty = no equivalent
    pub attributes: HashMap<String, String>,
    /// logical object class (lowercase) → target object class, empty = no equivalent
    pub object_classes: HashMap<String, String>,
    /// Treat names absent from the maps as having no equivalent
    pub drop_unmapped: bool,
    /// Logical subtrees that cannot be represented on this target
    pub unwilling_subtrees: Vec<String>,
}

impl RewriteMap {
    fn lookup(map: &HashMap<String, String>, drop_unmapped: bool, name: &str) -> Option<String> {
        match map.get(&name.to_lowercase()) {
            Some(mapped) if mapped.is_empty() => None,
            Some(mapped) => Some(mapped.clone()),
            None if drop_unmapped => None,
            None => Some(name.to_string()),
        }
    }

    /// Map a logical attribute name; `None` means no equivalent on this target
    pub fn map_attribute(&self, name: &str) -> Option<String> {
        Self::lookup(&self.attributes, self.drop_unmapped, name)
    }

    /// Map a logical object class value; `None` means no equivalent on this target
    pub fn map_object_class(&self, value: &str) -> Option<String> {
        Self::lookup(&self.object_classes, self.drop_unmapped, value)
    }

    /// Whether a logical name falls in a subtree this target refuses
    pub fn is_unwilling(&self, logical_dn: &str) -> bool {
        self.unwilling_subtrees
            .iter()
            .any(|subtree| dn::is_within(logical_dn, subtree))
    }
}

/// A configured remote directory target
#[derive(Debug, Clone)]
pub struct Target {
    /// Logical index, `0..N-1`
    pub index: usize,
    /// Human-readable name used in logs
    pub name: String,
    /// Network address of the remote server
    pub uri: String,
    /// Logical suffix this target serves
    pub suffix: String,
    /// Namespace rewrite map
    pub rewrite: RewriteMap,
}

impl Target {
    /// Build a target with a plain pass-through rewrite map
    pub fn new(index: usize, name: impl Into<String>, uri: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            uri: uri.into(),
            suffix: suffix.into(),
            rewrite: RewriteMap::default(),
        }
    }

    pub fn with_rewrite(mut self, rewrite: RewriteMap) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Whether `dn` lies within this target's logical suffix
    pub fn serves(&self, dn: &str) -> bool {
        dn::is_within(dn, &self.suffix)
    }
}

/// Read-only registry of all targets
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    /// Create a registry from targets; indices are reassigned by position
    pub fn new(targets: Vec<Target>) -> Self {
        let targets = targets
            .into_iter()
            .enumerate()
            .map(|(index, mut target)| {
                target.index = index;
                target
            })
            .collect();
        Self { targets }
    }

    /// Build and validate the registry from the targets file entries
    pub fn from_config(configs: &[TargetConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Err(GatewayError::Config("at least one target is required".into()));
        }

        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(configs.len());

        for (index, cfg) in configs.iter().enumerate() {
            if !seen.insert(cfg.name.clone()) {
                return Err(GatewayError::Config(format!("duplicate target name: {}", cfg.name)));
            }
            if !dn::is_valid(&cfg.suffix) {
                return Err(GatewayError::Config(format!(
                    "target {} has invalid suffix: {:?}",
                    cfg.name, cfg.suffix
                )));
            }
            if let Some(ref massage) = cfg.massage_suffix {
                if !dn::is_valid(massage) {
                    return Err(GatewayError::Config(format!(
                        "target {} has invalid massage suffix: {:?}",
                        cfg.name, massage
                    )));
                }
            }

            let rewrite = RewriteMap {
                massage_suffix: cfg.massage_suffix.clone(),
                attributes: lowercase_keys(&cfg.attribute_map),
                object_classes: lowercase_keys(&cfg.objectclass_map),
                drop_unmapped: cfg.drop_unmapped,
                unwilling_subtrees: cfg.unwilling_subtrees.clone(),
            };

            info!(
                target_idx = index,
                name = %cfg.name,
                uri = %cfg.uri,
                suffix = %cfg.suffix,
                "Registered directory target"
            );

            targets.push(
                Target::new(index, cfg.name.clone(), cfg.uri.clone(), cfg.suffix.clone())
                    .with_rewrite(rewrite),
            );
        }

        Ok(Self { targets })
    }

    /// Number of configured targets (N)
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }
}

fn lowercase_keys(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
        .collect()
}
