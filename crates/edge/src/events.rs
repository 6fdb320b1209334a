use tokio::sync::mpsc;

/// Why a stream ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// `#EXT-X-ENDLIST` was reached and every queued segment was written.
    EndOfStream,
    /// The playlist stopped changing for several reloads in a row.
    Stalled,
}

/// Notices published by a running stream, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    AdSkipEnabled,
    LowLatency {
        live_edge: usize,
    },
    AdBreakBegin {
        position: u64,
    },
    AdBreakEnd {
        position: u64,
    },
    /// A speculative fetch failed and no reload confirmed the segment in
    /// time; it is missing from the output.
    SpeculativeFetchDropped {
        position: u64,
    },
    /// Announced segments that were never confirmed before the stream ended.
    PrefetchDiscarded {
        count: usize,
    },
    Completed(CompletionReason),
}

#[derive(Clone)]
pub(crate) struct EventSink {
    sender: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    #[cfg(test)]
    pub(crate) fn disabled() -> Self {
        Self { sender: None }
    }

    pub(crate) fn emit(&self, event: StreamEvent) {
        if let Some(sender) = &self.sender {
            // nobody listening any more
            _ = sender.send(event);
        }
    }
}
