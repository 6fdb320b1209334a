mod config;

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use clap::Parser;
use config::Config;
use fake_user_agent::get_chrome_rua;
use iori_edge::{HttpClient, LiveStream, StreamEvent};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Url,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Record a live m3u8 stream, skipping ad breaks.
#[derive(Parser, Debug, Clone)]
pub struct EdgePipeArgs {
    /// Configuration file in TOML format
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Keep ad segments in the output
    #[clap(long)]
    no_ad_skip: bool,

    /// Start closer to the live edge and fetch announced segments early
    #[clap(long)]
    low_latency: bool,

    /// Number of segments from the end of the playlist to start from
    #[clap(long)]
    live_edge: Option<NonZeroUsize>,

    /// Concurrent segment downloads
    #[clap(long)]
    threads: Option<NonZeroUsize>,

    /// Cookies used to download
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx". This option will override --cookies.
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Output file path. Writes to stdout when omitted.
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// m3u8 playlist url
    m3u8: Url,
}

impl EdgePipeArgs {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(file) => Config::load(file)
                .with_context(|| format!("failed to load {}", file.display()))?,
            None => Config::default(),
        };

        if self.no_ad_skip {
            config.stream.ad_skip = false;
        }
        if self.low_latency {
            config.stream.low_latency = true;
        }
        if let Some(depth) = self.live_edge {
            config.stream.live_edge_depth = depth;
        }
        if let Some(threads) = self.threads {
            config.stream.max_concurrency = Some(threads);
        }
        Ok(config)
    }

    fn client(&self, config: &Config) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(cookies) = &self.cookies {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(cookies).context("Invalid cookie")?,
            );
        }

        for header in &self.headers {
            let (key, value) = header.split_once(':').context("Invalid header")?;
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        let user_agent = match &config.http.user_agent {
            Some(user_agent) => user_agent.clone(),
            None => get_chrome_rua().to_string(),
        };
        let builder = ClientBuilder::new()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.http.timeout));
        Ok(HttpClient::new(builder)?)
    }

    async fn run(self) -> anyhow::Result<()> {
        let config = self.config()?;
        let client = self.client(&config)?;

        let mut stream = LiveStream::open(client, self.m3u8.clone(), config.stream).await?;
        if let Some(mut events) = stream.take_events() {
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if let StreamEvent::Completed(reason) = event {
                        tracing::info!("Recording completed: {reason:?}");
                    }
                }
            });
        }

        match &self.output {
            Some(path) => {
                let file = tokio::fs::File::create(path).await?;
                pipe(stream, file).await
            }
            None => pipe(stream, tokio::io::stdout()).await,
        }
    }
}

async fn pipe<W>(mut stream: LiveStream, mut writer: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            chunk = stream.next_chunk() => match chunk {
                Some(chunk) => writer.write_all(&chunk?).await?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, stopping.");
                stream.close();
                break;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    EdgePipeArgs::parse().run().await
}
