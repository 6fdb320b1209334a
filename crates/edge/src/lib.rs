pub mod ad_break;
mod assembly;
mod classify;
pub mod config;
mod cursor;
pub mod error;
pub mod events;
pub mod fetch;
pub mod http;
pub mod live_edge;
mod pipeline;
pub mod playlist;
mod poller;
pub mod prefetch;
pub mod retry;
mod stream;

pub use config::LiveConfig;
pub use error::{EdgeError, EdgeResult};
pub use events::{CompletionReason, StreamEvent};
pub use fetch::{ByteStream, LiveFetcher};
pub use http::HttpClient;
pub use stream::{LiveStream, LiveStreamBuilder};

/// ┌──────────────────┐  jobs   ┌──────────────┐  fetch_segment  ┌─────────┐
/// │                  ├─────────►              ├─────────────────►         │
/// │  PlaylistPoller  │         │  Dispatcher  │    (K permits)  │  Fetch  │
/// │        +         │         │              │                 │  tasks  │
/// │    Classifier    │         └──────┬───────┘                 │         │
/// │                  │                │ slots, in order         └────┬────┘
/// └────────▲─────────┘                │                              │
///          │ reload           ┌───────▼───────┐      frames          │
///          │ (timer)          │   Assembly    ◄──────────────────────┘
///          │                  └───────┬───────┘
///     m3u8 over HTTP                  │ ordered bytes
///                             ┌───────▼───────┐
///                             │  LiveStream   │
///                             └───────────────┘
///
/// Starts configuring a live session, see [`LiveConfig`] for the options.
pub fn builder() -> LiveStreamBuilder {
    LiveStreamBuilder::new()
}
