//! Prefetch policy: decides what happens to segments the server announced
//! ahead of confirming them in the main sequence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrefetchMode {
    /// Announced segments wait for a reload that confirms them.
    #[default]
    Standard,
    /// Announced segments are fetched speculatively right away.
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchDecision {
    Dispatch,
    Defer,
}

/// Tracks announced segments according to the session's [`PrefetchMode`].
pub struct PrefetchPolicy {
    mode: PrefetchMode,
    /// Announcements waiting for confirmation, keyed by sequence position.
    deferred: BTreeMap<u64, Url>,
}

impl PrefetchPolicy {
    pub fn new(mode: PrefetchMode) -> Self {
        Self {
            mode,
            deferred: BTreeMap::new(),
        }
    }

    /// Whether prefetch entries belong to the fetchable window used by the
    /// live-edge selector.
    pub fn counts_toward_live_edge(&self) -> bool {
        self.mode == PrefetchMode::LowLatency
    }

    /// Called for every unseen prefetch entry in document order.
    pub fn admit(&mut self, position: u64, url: &Url) -> PrefetchDecision {
        match self.mode {
            PrefetchMode::LowLatency => PrefetchDecision::Dispatch,
            PrefetchMode::Standard => {
                if self.deferred.insert(position, url.clone()).is_none() {
                    tracing::trace!("Deferring announced segment {position}: {url}");
                }
                PrefetchDecision::Defer
            }
        }
    }

    /// A confirmed segment arrived at `position`. Returns whether it had been
    /// announced earlier.
    pub fn confirm(&mut self, position: u64) -> bool {
        self.deferred.remove(&position).is_some()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Drops every announcement that was never confirmed, returning how many.
    pub fn discard_unconfirmed(&mut self) -> usize {
        let discarded = std::mem::take(&mut self.deferred);
        for (position, url) in &discarded {
            tracing::debug!("Discarding unconfirmed segment {position}: {url}");
        }
        discarded.len()
    }
}
