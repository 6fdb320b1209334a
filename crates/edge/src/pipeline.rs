//! Concurrent segment fetching.
//!
//! Every dispatched job gets a [`Slot`] in a FIFO shared with the assembly
//! task, pushed in position order before its fetch task is spawned. The fetch
//! task feeds the slot's private frame channel, so completion order never
//! leaks into output order.
//!
//! A speculative fetch gets a single attempt. If it fails before forwarding
//! anything, it keeps its slot and waits for a reload to confirm the segment,
//! then fetches the confirmed URL with the full retry policy.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use futures::TryStreamExt;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    ad_break::Disposition,
    classify::{JobKind, SegmentJob},
    config::LiveConfig,
    error::{EdgeError, EdgeResult},
    events::CompletionReason,
    fetch::LiveFetcher,
    retry::{retry_with_backoff, RetryPolicy},
};

pub(crate) enum Frame {
    Data(Bytes),
    /// The fetch is parked until a reload confirms the segment. It no longer
    /// needs its permit.
    Waiting,
    Done,
    Failed(EdgeError),
    /// A speculative fetch failed without output and was never confirmed.
    Dropped(EdgeError),
}

pub(crate) struct SegmentSlot {
    pub position: u64,
    pub disposition: Disposition,
    pub frames: mpsc::UnboundedReceiver<Frame>,
    /// Released once assembly has drained the slot, or earlier while the
    /// fetch waits for a confirmation.
    pub permit: OwnedSemaphorePermit,
}

pub(crate) enum Slot {
    Segment(SegmentSlot),
    /// The poller failed; everything queued before still gets written.
    Fatal(EdgeError),
    Finished(CompletionReason),
}

pub(crate) struct Dispatcher<F> {
    fetcher: Arc<F>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<u64>>>,
    slots: mpsc::UnboundedSender<Slot>,
    progressive: bool,
    retry: RetryPolicy,
    /// Confirmation channels of speculative fetches, by position.
    confirmations: Mutex<HashMap<u64, oneshot::Sender<Url>>>,
    confirmation_wait: Duration,
    token: CancellationToken,
}

impl<F> Dispatcher<F>
where
    F: LiveFetcher,
{
    pub(crate) fn new(
        fetcher: Arc<F>,
        config: &LiveConfig,
        slots: mpsc::UnboundedSender<Slot>,
        token: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            permits: Arc::new(Semaphore::new(config.concurrency().get())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            slots,
            progressive: config.low_latency,
            retry: config.segment_retry_policy(),
            confirmations: Mutex::new(HashMap::new()),
            confirmation_wait: config.confirmation_wait(),
            token,
        }
    }

    /// Queues `job`, waiting for a free fetch permit first.
    pub(crate) async fn dispatch(&self, job: SegmentJob) -> EdgeResult<()> {
        if !self.in_flight.lock().await.insert(job.position) {
            tracing::debug!("Segment {} is already in flight", job.position);
            return Ok(());
        }

        let permit = tokio::select! {
            _ = self.token.cancelled() => return Err(EdgeError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| EdgeError::Cancelled)?
            }
        };

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        self.slots
            .send(Slot::Segment(SegmentSlot {
                position: job.position,
                disposition: job.disposition,
                frames: frames_rx,
                permit,
            }))
            .map_err(|_| EdgeError::Cancelled)?;

        tracing::debug!(
            "Fetching segment {} ({:?}, {:?}): {}",
            job.position,
            job.kind,
            job.disposition,
            job.url
        );

        let confirmation = match job.kind {
            JobKind::Confirmed => None,
            JobKind::Speculative => {
                let (tx, rx) = oneshot::channel();
                self.confirmations.lock().await.insert(job.position, tx);
                Some(rx)
            }
        };

        let task = FetchTask {
            fetcher: self.fetcher.clone(),
            progressive: self.progressive,
            retry: self.retry.clone(),
            confirmation_wait: self.confirmation_wait,
            token: self.token.clone(),
        };
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let position = job.position;
            task.run(job, confirmation, frames_tx).await;
            in_flight.lock().await.remove(&position);
        });

        Ok(())
    }

    /// A reload listed the speculative segment at `position` as confirmed.
    pub(crate) async fn confirm(&self, position: u64, url: Url) {
        if let Some(confirmation) = self.confirmations.lock().await.remove(&position) {
            // a fetch that already succeeded is no longer listening
            _ = confirmation.send(url);
        }
    }

    /// The speculative segment at `position` left the playlist unconfirmed.
    pub(crate) async fn expire(&self, position: u64) {
        if self.confirmations.lock().await.remove(&position).is_some() {
            tracing::debug!("Announced segment {position} was never confirmed");
        }
    }

    pub(crate) fn fail(&self, error: EdgeError) {
        _ = self.slots.send(Slot::Fatal(error));
    }

    pub(crate) fn finish(&self, reason: CompletionReason) {
        _ = self.slots.send(Slot::Finished(reason));
    }
}

struct FetchTask<F> {
    fetcher: Arc<F>,
    progressive: bool,
    retry: RetryPolicy,
    confirmation_wait: Duration,
    token: CancellationToken,
}

impl<F> FetchTask<F>
where
    F: LiveFetcher,
{
    async fn run(
        self,
        job: SegmentJob,
        confirmation: Option<oneshot::Receiver<Url>>,
        frames: mpsc::UnboundedSender<Frame>,
    ) {
        let last = tokio::select! {
            _ = self.token.cancelled() => Frame::Failed(EdgeError::Cancelled),
            last = self.fetch_job(&job, confirmation, &frames) => last,
        };

        // assembly may already be gone
        _ = frames.send(last);
    }

    /// Fetches `job` and returns the frame that closes its slot.
    async fn fetch_job(
        &self,
        job: &SegmentJob,
        confirmation: Option<oneshot::Receiver<Url>>,
        frames: &mpsc::UnboundedSender<Frame>,
    ) -> Frame {
        let mut forwarded = false;
        let Some(confirmation) = confirmation else {
            return match self.fetch(&job.url, &self.retry, frames, &mut forwarded).await {
                Ok(()) => Frame::Done,
                Err(e) => Frame::Failed(e),
            };
        };

        let once = RetryPolicy {
            max_attempts: 1,
            ..self.retry.clone()
        };
        let error = match self.fetch(&job.url, &once, frames, &mut forwarded).await {
            Ok(()) => return Frame::Done,
            // part of it already reached the output
            Err(e) if forwarded => return Frame::Failed(e),
            Err(e) => e,
        };

        tracing::debug!(
            "Announced segment {} failed, waiting for a reload to confirm it: {error}",
            job.position
        );
        _ = frames.send(Frame::Waiting);

        let url = match tokio::time::timeout(self.confirmation_wait, confirmation).await {
            Ok(Ok(url)) => url,
            Ok(Err(_)) | Err(_) => return Frame::Dropped(error),
        };
        tracing::info!("Refetching confirmed segment {}", job.position);
        match self.fetch(&url, &self.retry, frames, &mut forwarded).await {
            Ok(()) => Frame::Done,
            Err(e) => Frame::Failed(e),
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        retry: &RetryPolicy,
        frames: &mpsc::UnboundedSender<Frame>,
        forwarded: &mut bool,
    ) -> EdgeResult<()> {
        let fetcher = &*self.fetcher;

        if self.progressive {
            // bytes already forwarded cannot be taken back, so only the
            // request itself is retried
            let mut body = retry_with_backoff(retry, &self.token, |_| async move {
                fetcher.fetch_segment(url).await
            })
            .await?;
            while let Some(chunk) = body.try_next().await? {
                _ = frames.send(Frame::Data(chunk));
                *forwarded = true;
            }
        } else {
            let chunks = retry_with_backoff(retry, &self.token, |_| async move {
                let body = fetcher.fetch_segment(url).await?;
                body.try_collect::<Vec<_>>().await
            })
            .await?;
            for chunk in chunks {
                _ = frames.send(Frame::Data(chunk));
            }
            *forwarded = true;
        }

        Ok(())
    }
}
