use std::{num::NonZeroUsize, time::Duration};

use iori_edge::{CompletionReason, EdgeError, LiveConfig, LiveStream, StreamEvent};
use tokio::io::AsyncReadExt;

use crate::{
    common::{collect_events, expected, init_tracing, playlist_url, read_all, FakeFetcher, Playlist},
    AssertWrapper,
};

#[tokio::test(start_paused = true)]
async fn test_starts_at_live_edge() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..10).end().build()]);
    let mut stream = LiveStream::open(fetcher.clone(), playlist_url(), LiveConfig::default()).await?;

    let (output, error) = read_all(&mut stream).await;
    assert!(error.is_none());
    assert_eq!(output, expected(7..10));
    assert!((0..7).all(|n| !fetcher.fetched(n)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_output_order_with_out_of_order_completion() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..4).end().build()]);
    fetcher
        .delay_segment(0, Duration::from_secs(3))
        .delay_segment(1, Duration::from_secs(2))
        .delay_segment(2, Duration::from_secs(1));

    let stream = LiveStream::builder()
        .live_edge_depth(NonZeroUsize::new(4).unwrap())
        .max_concurrency(NonZeroUsize::new(4).unwrap())
        .open(fetcher, playlist_url())
        .await?;

    let mut output = String::new();
    stream.into_reader().read_to_string(&mut output).await?;
    assert_eq!(output, expected(0..4));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_segment_failure_truncates_output() -> anyhow::Result<()> {
    init_tracing();
    let fetcher = FakeFetcher::new([
        Playlist::new(0).segments(0..4).build(),
        Playlist::new(4).segments(4..8).end().build(),
    ]);
    fetcher.fail_segment(5, usize::MAX);

    let mut stream = LiveStream::builder()
        .live_edge_depth(NonZeroUsize::new(4).unwrap())
        .segment_attempts(2)
        .open(fetcher.clone(), playlist_url())
        .await?;

    let (output, error) = read_all(&mut stream).await;
    assert_eq!(output, expected(0..5));
    assert!(matches!(
        error,
        Some(EdgeError::SegmentFetchFailed { position: 5, .. })
    ));
    assert_eq!(fetcher.segment_calls(5), 2);
    assert!(stream.next_chunk().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transient_segment_failure_is_retried() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..3).end().build()]);
    fetcher.fail_segment(1, 2);

    let mut stream = LiveStream::open(fetcher.clone(), playlist_url(), LiveConfig::default()).await?;

    let (output, error) = read_all(&mut stream).await;
    assert!(error.is_none());
    assert_eq!(output, expected(0..3));
    assert_eq!(fetcher.segment_calls(1), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reload_failures_end_the_stream() -> anyhow::Result<()> {
    init_tracing();
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..2).build()]);
    fetcher.push_playlist_failure();

    let mut stream = LiveStream::builder()
        .max_reload_attempts(2)
        .open(fetcher.clone(), playlist_url())
        .await?;

    let (output, error) = read_all(&mut stream).await;
    assert_eq!(output, expected(0..2));
    assert!(matches!(
        error,
        Some(EdgeError::ReloadAttemptsExhausted { attempts: 2, .. })
    ));
    assert_eq!(fetcher.playlist_calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reload_recovers_after_transient_failure() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..2).build()]);
    fetcher.push_playlist_failure();
    fetcher.push_playlist(Playlist::new(0).segments(0..4).end().build());

    let mut stream = LiveStream::open(fetcher, playlist_url(), LiveConfig::default()).await?;

    let (output, error) = read_all(&mut stream).await;
    assert!(error.is_none());
    assert_eq!(output, expected(0..4));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_first_playlist_is_fatal() {
    let fetcher = FakeFetcher::new(["<html>not a playlist</html>"]);

    let result = LiveStream::open(fetcher.clone(), playlist_url(), LiveConfig::default()).await;

    assert!(matches!(result, Err(EdgeError::MalformedPlaylist(_))));
    assert_eq!(fetcher.playlist_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_playlist_completes_as_stalled() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..3).build()]);

    let mut stream = LiveStream::open(fetcher.clone(), playlist_url(), LiveConfig::default()).await?;
    let mut events = stream.take_events().assert_success();

    let (output, error) = read_all(&mut stream).await;
    assert!(error.is_none());
    assert_eq!(output, expected(0..3));
    assert_eq!(fetcher.playlist_calls(), 4);
    assert_eq!(
        collect_events(&mut events).last(),
        Some(&StreamEvent::Completed(CompletionReason::Stalled))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_polling() -> anyhow::Result<()> {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..3).build()]);
    fetcher.delay_segment(0, Duration::from_secs(60));

    let mut stream = LiveStream::builder()
        .stall_threshold(0)
        .open(fetcher.clone(), playlist_url())
        .await?;

    tokio::time::sleep(Duration::from_secs(5)).await;
    stream.close();
    assert!(stream.next_chunk().await.is_none());

    let calls = fetcher.playlist_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fetcher.playlist_calls(), calls);
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let fetcher = FakeFetcher::new([Playlist::new(0).segments(0..3).end().build()]);

    let result = LiveStream::builder()
        .segment_attempts(0)
        .open(fetcher.clone(), playlist_url())
        .await;

    assert!(matches!(result, Err(EdgeError::InvalidConfig(_))));
    assert_eq!(fetcher.playlist_calls(), 0);
}

#[test]
fn test_config_from_toml() -> anyhow::Result<()> {
    let config: LiveConfig = toml::from_str(
        r#"
        ad-skip = false
        low-latency = true
        live-edge-depth = 6
        reload-backoff = 0.5
        max-concurrency = 2
        "#,
    )?;

    assert!(!config.ad_skip);
    assert!(config.low_latency);
    assert_eq!(config.live_edge().get(), 3);
    assert_eq!(config.reload_backoff, Duration::from_millis(500));
    assert_eq!(config.concurrency().get(), 2);
    assert_eq!(config.stall_threshold, LiveConfig::default().stall_threshold);
    Ok(())
}
