use std::{ops::Deref, sync::Arc};

use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, ClientBuilder, IntoUrl, Response};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use url::Url;

use crate::{
    error::{EdgeError, EdgeResult},
    fetch::{ByteStream, LiveFetcher},
};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> EdgeResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    /// Adds `Set-Cookie` style strings, scoped to `url`.
    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> EdgeResult<()> {
        let url = url.into_url()?;
        let mut lock = self
            .cookies_store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                tracing::warn!("Ignoring invalid cookie {cookie:?}: {e}");
            }
        }
        Ok(())
    }

    async fn get_ok(&self, url: &Url) -> EdgeResult<Response> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(EdgeError::HttpError(status));
        }
        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = Client::builder()
            .cookie_provider(cookies_store.clone())
            .build()
            // the same failure `Client::new` panics on
            .expect("failed to initialize the TLS backend");

        Self {
            client,
            cookies_store,
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl LiveFetcher for HttpClient {
    async fn fetch_playlist(&self, url: &Url) -> EdgeResult<String> {
        let text = self.get_ok(url).await?.text().await?;
        Ok(text)
    }

    async fn fetch_segment(&self, url: &Url) -> EdgeResult<ByteStream> {
        let response = self.get_ok(url).await?;
        Ok(response.bytes_stream().map_err(EdgeError::from).boxed())
    }
}
