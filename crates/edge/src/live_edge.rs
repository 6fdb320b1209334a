//! Where playback starts on the first playlist of a session.

use std::num::NonZeroUsize;

/// Number of leading candidate entries to drop so that only the last `depth`
/// entries of the first playlist are played.
pub fn live_edge_offset(total_entries: usize, depth: NonZeroUsize) -> usize {
    total_entries.saturating_sub(depth.get())
}

/// Live-edge depth actually applied to a session.
///
/// Low-latency sessions keep half of the configured buffer, never less than
/// one segment.
pub fn effective_live_edge(depth: NonZeroUsize, low_latency: bool) -> NonZeroUsize {
    if low_latency {
        NonZeroUsize::new(depth.get() / 2).unwrap_or(NonZeroUsize::MIN)
    } else {
        depth
    }
}
