use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    classify::Classifier,
    config::LiveConfig,
    error::{EdgeError, EdgeResult},
    events::CompletionReason,
    fetch::LiveFetcher,
    pipeline::Dispatcher,
    playlist::{parse_media_playlist, MediaPlaylist},
    retry::retry_with_backoff,
};

enum Reload {
    Updated(MediaPlaylist),
    /// Byte-identical to the previous document.
    Unchanged,
}

/// Fetches the media playlist over and over until it ends.
pub(crate) struct PlaylistPoller<F> {
    fetcher: Arc<F>,
    url: Url,
    config: LiveConfig,
    token: CancellationToken,
    last_text: Option<String>,
    unchanged: u32,
}

impl<F> PlaylistPoller<F>
where
    F: LiveFetcher,
{
    pub(crate) fn new(
        fetcher: Arc<F>,
        url: Url,
        config: LiveConfig,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            url,
            config,
            token,
            last_text: None,
            unchanged: 0,
        }
    }

    /// Loads the first playlist. Transport errors are retried, but a document
    /// that does not parse is not a media playlist and fails right away.
    pub(crate) async fn first_load(&mut self) -> EdgeResult<MediaPlaylist> {
        let fetcher = &*self.fetcher;
        let url = &self.url;
        let text = retry_with_backoff(
            &self.config.reload_retry_policy(),
            &self.token,
            |_| async move { fetcher.fetch_playlist(url).await },
        )
        .await?;

        let playlist = parse_media_playlist(&text, &self.url)?;
        tracing::debug!(
            "Loaded playlist {} (media sequence {}, {} entries)",
            self.url,
            playlist.media_sequence,
            playlist.entries.len()
        );
        self.last_text = Some(text);
        Ok(playlist)
    }

    async fn reload(&mut self) -> EdgeResult<Reload> {
        let fetcher = &*self.fetcher;
        let url = &self.url;
        let mut attempts = 0;
        let result = retry_with_backoff(
            &self.config.reload_retry_policy(),
            &self.token,
            |attempt| {
                attempts = attempt + 1;
                async move {
                    let text = fetcher.fetch_playlist(url).await?;
                    let playlist = parse_media_playlist(&text, url)?;
                    Ok((text, playlist))
                }
            },
        )
        .await;

        let (text, playlist) = match result {
            Ok(v) => v,
            Err(EdgeError::Cancelled) => return Err(EdgeError::Cancelled),
            Err(e) => {
                return Err(EdgeError::ReloadAttemptsExhausted {
                    attempts,
                    last: Box::new(e),
                })
            }
        };

        if self.last_text.as_deref() == Some(text.as_str()) {
            self.unchanged += 1;
            return Ok(Reload::Unchanged);
        }
        self.unchanged = 0;
        self.last_text = Some(text);
        Ok(Reload::Updated(playlist))
    }

    /// Classifies and dispatches until the playlist ends, stalls or fails.
    /// The outcome is queued behind every segment dispatched before it.
    pub(crate) async fn run(
        mut self,
        first: MediaPlaylist,
        mut classifier: Classifier,
        dispatcher: Dispatcher<F>,
    ) {
        match self.drive(first, &mut classifier, &dispatcher).await {
            Ok(reason) => dispatcher.finish(reason),
            Err(EdgeError::Cancelled) => tracing::debug!("Playlist polling cancelled"),
            Err(e) => {
                tracing::error!("Failed to reload playlist: {e}");
                dispatcher.fail(e);
            }
        }
    }

    async fn drive(
        &mut self,
        first: MediaPlaylist,
        classifier: &mut Classifier,
        dispatcher: &Dispatcher<F>,
    ) -> EdgeResult<CompletionReason> {
        let mut before_load = Instant::now();
        let mut target_duration = first.target_duration;
        let mut next = Some(first);

        loop {
            if let Some(playlist) = next.take() {
                target_duration = playlist.target_duration;
                let classification = classifier.classify(&playlist);
                if !classification.jobs.is_empty() {
                    tracing::debug!(
                        "{} new segment(s) were added to queue.",
                        classification.jobs.len()
                    );
                }
                // before dispatching, so a parked fetch can free its slot
                for (position, url) in classification.confirmed {
                    dispatcher.confirm(position, url).await;
                }
                for position in classification.expired {
                    dispatcher.expire(position).await;
                }
                for job in classification.jobs {
                    dispatcher.dispatch(job).await?;
                }
                if classification.ended {
                    tracing::info!("Reached the end of the playlist");
                    return Ok(CompletionReason::EndOfStream);
                }
            }

            // playlist does not end, wait for a while and fetch again
            let interval = self.config.reload_interval(target_duration);
            tokio::select! {
                _ = self.token.cancelled() => return Err(EdgeError::Cancelled),
                _ = tokio::time::sleep_until(before_load + interval) => {}
            }

            before_load = Instant::now();
            match self.reload().await? {
                Reload::Updated(playlist) => next = Some(playlist),
                Reload::Unchanged => {
                    let threshold = self.config.stall_threshold;
                    tracing::debug!("Playlist unchanged ({} in a row)", self.unchanged);
                    if threshold > 0 && self.unchanged >= threshold {
                        tracing::warn!(
                            "Playlist did not change for {} reloads, treating the stream as ended",
                            self.unchanged
                        );
                        return Ok(CompletionReason::Stalled);
                    }
                }
            }
        }
    }
}
