use std::collections::BTreeSet;

use crate::ad_break::AdBreakMachine;

/// The session's position in the live stream.
///
/// Owned by the classification task only; nothing else mutates it.
pub struct StreamCursor {
    /// Last sequence position queued or dropped.
    last: Option<u64>,
    /// Highest position at which cue markers have been evaluated.
    cue_mark: Option<u64>,
    pub(crate) ad_break: AdBreakMachine,
    /// Prefetch positions dispatched before any reload confirmed them.
    speculative: BTreeSet<u64>,
}

impl StreamCursor {
    pub fn new(skip_ads: bool) -> Self {
        Self {
            last: None,
            cue_mark: None,
            ad_break: AdBreakMachine::new(skip_ads),
            speculative: BTreeSet::new(),
        }
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn is_seen(&self, position: u64) -> bool {
        self.last.is_some_and(|last| position <= last)
    }

    pub fn advance(&mut self, position: u64) {
        self.last = Some(self.last.map_or(position, |last| last.max(position)));
    }

    pub fn cue_mark(&self) -> Option<u64> {
        self.cue_mark
    }

    pub fn raise_cue_mark(&mut self, position: u64) {
        self.cue_mark = Some(self.cue_mark.map_or(position, |mark| mark.max(position)));
    }

    pub fn mark_speculative(&mut self, position: u64) {
        self.speculative.insert(position);
    }

    /// Consumes the speculative record of `position` once a reload confirms it.
    pub fn take_speculative(&mut self, position: u64) -> bool {
        self.speculative.remove(&position)
    }

    /// Forgets speculative positions that slid out of the playlist window,
    /// returning them in order.
    pub fn prune_speculative(&mut self, before: u64) -> Vec<u64> {
        let kept = self.speculative.split_off(&before);
        std::mem::replace(&mut self.speculative, kept)
            .into_iter()
            .collect()
    }

    pub fn speculative_count(&self) -> usize {
        self.speculative.len()
    }
}
