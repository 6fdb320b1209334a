use std::num::NonZeroUsize;

use iori_edge::{CompletionReason, LiveStream, StreamEvent};

use crate::{
    common::{
        collect_events, expected, init_tracing, playlist_url, read_all, FakeFetcher, Playlist, SCTE35_IN,
        SCTE35_OUT, SCTE35_OUT_CONT,
    },
    AssertWrapper,
};

async fn run(fetcher: FakeFetcher, ad_skip: bool) -> anyhow::Result<(String, Vec<StreamEvent>)> {
    init_tracing();
    let mut stream = LiveStream::builder()
        .ad_skip(ad_skip)
        .live_edge_depth(NonZeroUsize::new(4).unwrap())
        .open(fetcher, playlist_url())
        .await?;
    let mut events = stream.take_events().assert_success();

    let (output, error) = read_all(&mut stream).await;
    assert!(error.is_none(), "unexpected error: {error:?}");
    Ok((output, collect_events(&mut events)))
}

#[tokio::test(start_paused = true)]
async fn test_skip_from_start_until_end_marker() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0).tag(SCTE35_OUT).segments(0..4).build(),
        Playlist::new(4).tag(SCTE35_IN).segments(4..8).build(),
        Playlist::new(8).segments(8..12).end().build(),
    ]);

    let (output, events) = run(fetcher.clone(), true).await?;

    assert_eq!(output, expected(4..12));
    // ad segments are still downloaded
    for n in 0..12 {
        assert_eq!(fetcher.segment_calls(n), 1, "segment {n}");
    }
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::AdBreakBegin { position: 0 },
            StreamEvent::AdBreakEnd { position: 4 },
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_end_marker_without_start() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0).segments(0..4).build(),
        Playlist::new(4).tag(SCTE35_IN).segments(4..8).end().build(),
    ]);

    let (output, events) = run(fetcher, true).await?;

    assert_eq!(output, expected(0..8));
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_continued_break_at_start() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0).tag(SCTE35_OUT_CONT).segments(0..4).build(),
        Playlist::new(4).tag(SCTE35_IN).segments(4..8).end().build(),
    ]);

    let (output, events) = run(fetcher.clone(), true).await?;

    assert_eq!(output, expected(4..8));
    assert!((0..8).all(|n| fetcher.fetched(n)));
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::AdBreakBegin { position: 0 },
            StreamEvent::AdBreakEnd { position: 4 },
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_break_without_end_marker() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0).segments(0..4).build(),
        Playlist::new(4).tag(SCTE35_OUT).segments(4..8).build(),
        Playlist::new(8).segments(8..12).end().build(),
    ]);

    let (output, events) = run(fetcher, true).await?;

    assert_eq!(output, expected(0..4));
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::AdBreakBegin { position: 4 },
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

fn break_in_between() -> FakeFetcher {
    FakeFetcher::new([
        Playlist::new(0).segments(0..4).build(),
        Playlist::new(4)
            .segments(4..6)
            .tag(SCTE35_OUT)
            .segments(6..8)
            .build(),
        Playlist::new(8).segments(8..12).build(),
        Playlist::new(12)
            .segments(12..14)
            .tag(SCTE35_IN)
            .segments(14..16)
            .build(),
        Playlist::new(16).segments(16..20).end().build(),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_break_in_between() -> anyhow::Result<()> {
    let (output, events) = run(break_in_between(), true).await?;

    assert_eq!(output, expected((0..6).chain(14..20)));
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::AdBreakBegin { position: 6 },
            StreamEvent::AdBreakEnd { position: 14 },
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_ads_kept_when_skipping_disabled() -> anyhow::Result<()> {
    let (output, events) = run(break_in_between(), false).await?;

    assert_eq!(output, expected(0..20));
    assert_eq!(
        events,
        [StreamEvent::Completed(CompletionReason::EndOfStream)]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_playlists_are_deduplicated() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0)
            .segments(0..2)
            .tag(SCTE35_OUT)
            .segments(2..4)
            .build(),
        Playlist::new(1)
            .segments(1..2)
            .tag(SCTE35_OUT)
            .segments(2..4)
            .build(),
        Playlist::new(2)
            .tag(SCTE35_OUT)
            .segments(2..4)
            .tag(SCTE35_IN)
            .segments(4..6)
            .end()
            .build(),
    ]);

    let (output, events) = run(fetcher.clone(), true).await?;

    assert_eq!(output, expected((0..2).chain(4..6)));
    assert!((0..6).all(|n| fetcher.segment_calls(n) == 1));
    assert_eq!(
        events,
        [
            StreamEvent::AdSkipEnabled,
            StreamEvent::AdBreakBegin { position: 2 },
            StreamEvent::AdBreakEnd { position: 4 },
            StreamEvent::Completed(CompletionReason::EndOfStream),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_ad_segment_is_ignored() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([
        Playlist::new(0).tag(SCTE35_OUT).segments(0..2).build(),
        Playlist::new(2).tag(SCTE35_IN).segments(2..4).end().build(),
    ]);
    fetcher.reject_segment(1, reqwest::StatusCode::NOT_FOUND);

    let (output, _) = run(fetcher, true).await?;

    assert_eq!(output, expected(2..4));
    Ok(())
}
