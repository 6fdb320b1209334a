use std::future::Future;

use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

use crate::error::EdgeResult;

/// Body of a segment response, chunk by chunk.
pub type ByteStream = BoxStream<'static, EdgeResult<Bytes>>;

/// Where playlists and segments come from.
///
/// Implemented by [`HttpClient`](crate::http::HttpClient); tests plug in an
/// in-memory source.
pub trait LiveFetcher: Send + Sync + 'static {
    fn fetch_playlist(&self, url: &Url) -> impl Future<Output = EdgeResult<String>> + Send;

    /// Starts a segment request. The future resolves once the response head
    /// was accepted; the body arrives through the returned stream.
    fn fetch_segment(&self, url: &Url) -> impl Future<Output = EdgeResult<ByteStream>> + Send;
}
