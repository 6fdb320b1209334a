use std::{
    io,
    num::NonZeroUsize,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tokio::{io::AsyncRead, sync::mpsc};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use url::Url;

use crate::{
    assembly::assemble,
    classify::Classifier,
    config::LiveConfig,
    error::EdgeResult,
    events::{EventSink, StreamEvent},
    fetch::LiveFetcher,
    pipeline::Dispatcher,
    poller::PlaylistPoller,
};

/// Chunks buffered between assembly and the consumer.
const OUTPUT_BUFFER: usize = 16;

/// The ordered byte output of a live session.
///
/// Dropping it (or calling [`LiveStream::close`]) stops polling and cancels
/// every in-flight fetch.
pub struct LiveStream {
    output: mpsc::Receiver<EdgeResult<Bytes>>,
    events: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    token: CancellationToken,
}

impl LiveStream {
    pub fn builder() -> LiveStreamBuilder {
        LiveStreamBuilder::new()
    }

    /// Loads the first playlist from `url` and starts the session.
    pub async fn open<F>(fetcher: F, url: Url, config: LiveConfig) -> EdgeResult<Self>
    where
        F: LiveFetcher,
    {
        config.validate()?;

        let token = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let events = EventSink::new(events_tx);

        if config.ad_skip {
            tracing::info!("Will skip ad segments");
            events.emit(StreamEvent::AdSkipEnabled);
        }
        if config.low_latency {
            let live_edge = config.live_edge().get();
            tracing::info!("Low latency streaming (HLS live edge: {live_edge})");
            events.emit(StreamEvent::LowLatency { live_edge });
        }

        let fetcher = Arc::new(fetcher);
        let mut poller =
            PlaylistPoller::new(fetcher.clone(), url, config.clone(), token.clone());
        let first = poller.first_load().await?;

        let (slots_tx, slots_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
        let classifier = Classifier::new(&config, events.clone());
        let dispatcher = Dispatcher::new(fetcher, &config, slots_tx, token.clone());

        tokio::spawn(poller.run(first, classifier, dispatcher));
        tokio::spawn(assemble(slots_rx, output_tx, events, token.clone()));

        Ok(Self {
            output: output_rx,
            events: Some(events_rx),
            token,
        })
    }

    /// Next chunk in stream order. `None` once the stream is over.
    pub async fn next_chunk(&mut self) -> Option<EdgeResult<Bytes>> {
        self.output.recv().await
    }

    /// Notices published by the session. Can be taken once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events.take()
    }

    /// Sequential reader over the output. Errors surface as [`io::Error`].
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.map_err(io::Error::other))
    }

    pub fn close(&mut self) {
        self.token.cancel();
        self.output.close();
    }
}

impl Stream for LiveStream {
    type Item = EdgeResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.output.poll_recv(cx)
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Default)]
pub struct LiveStreamBuilder {
    config: LiveConfig,
}

impl LiveStreamBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn config(mut self, config: LiveConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ad_skip(mut self, enabled: bool) -> Self {
        self.config.ad_skip = enabled;
        self
    }

    pub fn low_latency(mut self, enabled: bool) -> Self {
        self.config.low_latency = enabled;
        self
    }

    pub fn live_edge_depth(mut self, depth: NonZeroUsize) -> Self {
        self.config.live_edge_depth = depth;
        self
    }

    pub fn max_reload_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reload_attempts = attempts;
        self
    }

    pub fn reload_backoff(mut self, backoff: Duration) -> Self {
        self.config.reload_backoff = backoff;
        self
    }

    pub fn reload_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.reload_ceiling = ceiling;
        self
    }

    pub fn segment_attempts(mut self, attempts: u32) -> Self {
        self.config.segment_attempts = attempts;
        self
    }

    pub fn max_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.config.max_concurrency = Some(concurrency);
        self
    }

    pub fn stall_threshold(mut self, threshold: u32) -> Self {
        self.config.stall_threshold = threshold;
        self
    }

    pub async fn open<F>(self, fetcher: F, url: Url) -> EdgeResult<LiveStream>
    where
        F: LiveFetcher,
    {
        LiveStream::open(fetcher, url, self.config).await
    }
}
