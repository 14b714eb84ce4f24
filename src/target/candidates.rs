//! Candidate sets and suffix-based candidate selection
//!
//! A candidate set is a fixed-length bitmap over the registry: bit `i`
//! means target `i` may hold the requested entry. The engine only reads
//! it; selection happens before dispatch.

use std::sync::Arc;
use tracing::debug;

use super::registry::TargetRegistry;
use crate::cache::ResultCache;
use crate::dn;

/// Eligibility bitmap, one slot per target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    bits: Vec<bool>,
}

impl CandidateSet {
    /// Set of `n` targets with no candidates
    pub fn none(n: usize) -> Self {
        Self { bits: vec![false; n] }
    }

    /// Set of `n` targets, all candidates
    pub fn all(n: usize) -> Self {
        Self { bits: vec![true; n] }
    }

    /// Set of `n` targets with only the listed indices marked
    pub fn from_indices(n: usize, indices: &[usize]) -> Self {
        let mut set = Self::none(n);
        for &i in indices {
            set.mark(i);
        }
        set
    }

    /// Mark target `index` as a candidate; out-of-range indices are ignored
    pub fn mark(&mut self, index: usize) {
        if let Some(bit) = self.bits.get_mut(index) {
            *bit = true;
        }
    }

    pub fn is_candidate(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    /// Bitmap length (N)
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Candidate indices in increasing order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
    }
}

/// Computes the candidate set for a requested name
pub trait CandidateSelector: Send + Sync {
    fn candidates(&self, dn: &str) -> CandidateSet;
}

/// Selects targets whose logical suffix contains the name, narrowed to
/// the cached authoritative target when one is known.
pub struct SuffixSelector {
    registry: Arc<TargetRegistry>,
    cache: Option<Arc<dyn ResultCache>>,
}

impl SuffixSelector {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            cache: None,
        }
    }

    pub fn with_cache(registry: Arc<TargetRegistry>, cache: Arc<dyn ResultCache>) -> Self {
        Self {
            registry,
            cache: Some(cache),
        }
    }
}

impl CandidateSelector for SuffixSelector {
    fn candidates(&self, name: &str) -> CandidateSet {
        let n = self.registry.len();
        let mut set = CandidateSet::none(n);
        for target in self.registry.iter().filter(|t| t.serves(name)) {
            set.mark(target.index);
        }

        if let Some(ref cache) = self.cache {
            let ndn = dn::normalize(name);
            if let Some(cached) = cache.lookup(&ndn) {
                if set.is_candidate(cached) {
                    debug!(ndn = %ndn, target_idx = cached, "Candidate narrowed by result cache");
                    return CandidateSet::from_indices(n, &[cached]);
                }
            }
        }

        set
    }
}
