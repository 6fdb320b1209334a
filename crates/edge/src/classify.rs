//! Turns parsed playlists into an ordered list of segment fetch jobs.
//!
//! Every playlist runs through the same passes, in document order:
//! live-edge cut (first playlist only), ad-break tracking, prefetch policy and
//! deduplication against the [`StreamCursor`].

use std::num::NonZeroUsize;

use url::Url;

use crate::{
    ad_break::{Cue, Disposition, Transition},
    config::LiveConfig,
    cursor::StreamCursor,
    events::{EventSink, StreamEvent},
    live_edge::live_edge_offset,
    playlist::{MediaPlaylist, PlaylistEntry},
    prefetch::{PrefetchDecision, PrefetchPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Confirmed,
    /// Announced but not yet confirmed by the server.
    Speculative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentJob {
    pub position: u64,
    pub url: Url,
    pub kind: JobKind,
    pub disposition: Disposition,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub jobs: Vec<SegmentJob>,
    /// Speculative positions this playlist confirmed, with the confirmed URL.
    pub confirmed: Vec<(u64, Url)>,
    /// Speculative positions that left the playlist without a confirmation.
    pub expired: Vec<u64>,
    /// The playlist carried `#EXT-X-ENDLIST`.
    pub ended: bool,
}

pub struct Classifier {
    cursor: StreamCursor,
    prefetch: PrefetchPolicy,
    live_edge: NonZeroUsize,
    first: bool,
    events: EventSink,
}

impl Classifier {
    pub(crate) fn new(config: &LiveConfig, events: EventSink) -> Self {
        Self {
            cursor: StreamCursor::new(config.ad_skip),
            prefetch: PrefetchPolicy::new(config.prefetch_mode()),
            live_edge: config.live_edge(),
            first: true,
            events,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    pub fn classify(&mut self, playlist: &MediaPlaylist) -> Classification {
        let offset = if std::mem::take(&mut self.first) {
            let candidates = playlist
                .entries
                .iter()
                .filter(|e| match e {
                    PlaylistEntry::Segment(_) => true,
                    PlaylistEntry::PrefetchSegment(_) => self.prefetch.counts_toward_live_edge(),
                    _ => false,
                })
                .count();
            let offset = live_edge_offset(candidates, self.live_edge);
            if offset > 0 {
                tracing::debug!(
                    "Starting at the live edge, dropping {offset} of {candidates} segment(s)"
                );
            }
            offset
        } else {
            0
        };

        let cue_mark = self.cursor.cue_mark();
        let mut highest_cue = None;
        let mut next_ordinal = 0;
        let mut candidates = 0;
        let mut result = Classification::default();

        for entry in &playlist.entries {
            let segment = match entry {
                PlaylistEntry::Segment(segment) | PlaylistEntry::PrefetchSegment(segment) => {
                    segment
                }
                PlaylistEntry::EndOfStream => {
                    result.ended = true;
                    continue;
                }
                PlaylistEntry::DiscontinuityAdStart => {
                    self.on_cue(Cue::Start, playlist, next_ordinal, cue_mark, &mut highest_cue);
                    continue;
                }
                PlaylistEntry::DiscontinuityAdStartContinued => {
                    self.on_cue(
                        Cue::StartContinued,
                        playlist,
                        next_ordinal,
                        cue_mark,
                        &mut highest_cue,
                    );
                    continue;
                }
                PlaylistEntry::DiscontinuityAdEnd => {
                    self.on_cue(Cue::End, playlist, next_ordinal, cue_mark, &mut highest_cue);
                    continue;
                }
            };

            next_ordinal = segment.ordinal + 1;
            let position = playlist.position(segment);
            let prefetch = entry.is_prefetch();

            if self.cursor.is_seen(position) {
                if !prefetch && self.cursor.take_speculative(position) {
                    tracing::trace!("Segment {position} already fetched ahead of confirmation");
                    result.confirmed.push((position, segment.url.clone()));
                }
                continue;
            }

            if prefetch {
                if self.prefetch.admit(position, &segment.url) == PrefetchDecision::Defer {
                    continue;
                }
            } else if self.prefetch.confirm(position) {
                tracing::trace!("Announced segment {position} confirmed");
            }

            candidates += 1;
            if candidates <= offset {
                self.cursor.advance(position);
                continue;
            }

            let kind = if prefetch {
                self.cursor.mark_speculative(position);
                JobKind::Speculative
            } else {
                JobKind::Confirmed
            };

            result.jobs.push(SegmentJob {
                position,
                url: segment.url.clone(),
                kind,
                disposition: self.cursor.ad_break.disposition(),
            });
            self.cursor.advance(position);
        }

        if let Some(position) = highest_cue {
            self.cursor.raise_cue_mark(position);
        }
        result.expired = self.cursor.prune_speculative(playlist.media_sequence);
        tracing::trace!(
            last = ?self.cursor.last(),
            speculative = self.cursor.speculative_count(),
            deferred = self.prefetch.deferred_count(),
            "Playlist classified"
        );

        if result.ended {
            let count = self.prefetch.discard_unconfirmed();
            if count > 0 {
                self.events.emit(StreamEvent::PrefetchDiscarded { count });
            }
        }

        result
    }

    fn on_cue(
        &mut self,
        cue: Cue,
        playlist: &MediaPlaylist,
        next_ordinal: usize,
        cue_mark: Option<u64>,
        highest_cue: &mut Option<u64>,
    ) {
        // a cue applies from the segment that follows it, which may already
        // have been dispatched as a prefetch
        let position = playlist.media_sequence + next_ordinal as u64;
        if cue_mark.is_some_and(|mark| position <= mark) {
            tracing::trace!("Ignoring already evaluated {cue:?} cue at segment {position}");
            return;
        }
        *highest_cue = Some(highest_cue.map_or(position, |p: u64| p.max(position)));

        match self.cursor.ad_break.apply(cue, position) {
            Some(Transition::BeginSkip { position }) => {
                tracing::info!("Skipping ads beginning with segment {position}");
                self.events.emit(StreamEvent::AdBreakBegin { position });
            }
            Some(Transition::EndSkip { position }) => {
                tracing::info!("Ad break over, resuming with segment {position}");
                self.events.emit(StreamEvent::AdBreakEnd { position });
            }
            None => {}
        }
    }
}
