//! Ad-break tracking driven by SCTE-35 cue markers.

/// Whether the stream is currently inside an advertisement break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdBreakState {
    #[default]
    Normal,
    Skipping,
}

/// The cue markers that can change [`AdBreakState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Start,
    /// The document opens in the middle of a break.
    StartContinued,
    End,
}

/// What to do with the bytes of a media segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Emit,
    /// Fetched but never written to the output.
    Discard,
}

/// An edge of the state machine, reported once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BeginSkip { position: u64 },
    EndSkip { position: u64 },
}

#[derive(Debug, Default)]
pub struct AdBreakMachine {
    state: AdBreakState,
    skip_ads: bool,
}

impl AdBreakMachine {
    pub fn new(skip_ads: bool) -> Self {
        Self {
            state: AdBreakState::Normal,
            skip_ads,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> AdBreakState {
        self.state
    }

    /// Feeds one cue attached to the segment at `position`.
    ///
    /// Returns the transition to report, if any. With ad skipping disabled the
    /// state still moves but nothing is reported.
    pub fn apply(&mut self, cue: Cue, position: u64) -> Option<Transition> {
        let (next, transition) = match (self.state, cue) {
            (AdBreakState::Normal, Cue::Start | Cue::StartContinued) => (
                AdBreakState::Skipping,
                Transition::BeginSkip { position },
            ),
            (AdBreakState::Skipping, Cue::End) => {
                (AdBreakState::Normal, Transition::EndSkip { position })
            }
            _ => return None,
        };

        self.state = next;
        self.skip_ads.then_some(transition)
    }

    pub fn disposition(&self) -> Disposition {
        match self.state {
            AdBreakState::Skipping if self.skip_ads => Disposition::Discard,
            _ => Disposition::Emit,
        }
    }
}
