use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    ad_break::Disposition,
    error::{EdgeError, EdgeResult},
    events::{EventSink, StreamEvent},
    pipeline::{Frame, SegmentSlot, Slot},
};

/// Drains slots in queue order and writes emitted bytes to `output`.
///
/// Ends after a [`Slot::Finished`], the first fatal error, or when the
/// consumer goes away. Fatal errors cancel `token`.
pub(crate) async fn assemble(
    mut slots: mpsc::UnboundedReceiver<Slot>,
    output: mpsc::Sender<EdgeResult<Bytes>>,
    events: EventSink,
    token: CancellationToken,
) {
    let mut written = 0usize;
    while let Some(slot) = slots.recv().await {
        let result = match slot {
            Slot::Segment(segment) => drain(segment, &output, &events).await,
            Slot::Fatal(error) => Err(error),
            Slot::Finished(reason) => {
                tracing::info!("Stream finished after {written} segment(s): {reason:?}");
                events.emit(StreamEvent::Completed(reason));
                return;
            }
        };

        match result {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(EdgeError::Cancelled) => break,
            Err(error) => {
                tracing::error!("{error}");
                _ = output.send(Err(error)).await;
                token.cancel();
                return;
            }
        }
    }

    tracing::debug!("Stream closed after {written} segment(s)");
    token.cancel();
}

/// Returns whether bytes of this segment reached the output.
async fn drain(
    slot: SegmentSlot,
    output: &mpsc::Sender<EdgeResult<Bytes>>,
    events: &EventSink,
) -> EdgeResult<bool> {
    let SegmentSlot {
        position,
        disposition,
        mut frames,
        permit,
    } = slot;
    let emit = disposition == Disposition::Emit;
    let mut permit = Some(permit);

    let outcome = loop {
        match frames.recv().await {
            Some(Frame::Data(chunk)) => {
                if emit {
                    output
                        .send(Ok(chunk))
                        .await
                        .map_err(|_| EdgeError::Cancelled)?;
                }
            }
            Some(Frame::Waiting) => {
                tracing::debug!("Segment {position} is waiting for confirmation");
                permit.take();
            }
            Some(Frame::Done) => break Ok(()),
            Some(Frame::Failed(error)) => break Err(error),
            Some(Frame::Dropped(error)) => {
                let error = EdgeError::SpeculativeFetch {
                    position,
                    source: Box::new(error),
                };
                tracing::warn!("{error}, dropping it");
                events.emit(StreamEvent::SpeculativeFetchDropped { position });
                return Ok(false);
            }
            None => break Err(EdgeError::Cancelled),
        }
    };
    drop(permit);

    let error = match outcome {
        Ok(()) => {
            if !emit {
                tracing::debug!("Discarded ad segment {position}");
            }
            return Ok(emit);
        }
        Err(EdgeError::Cancelled) => return Err(EdgeError::Cancelled),
        Err(error) => error,
    };

    match disposition {
        Disposition::Discard => {
            tracing::warn!("Failed to fetch ad segment {position}, ignoring: {error}");
            Ok(false)
        }
        Disposition::Emit => Err(EdgeError::SegmentFetchFailed {
            position,
            source: Box::new(error),
        }),
    }
}
