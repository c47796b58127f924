use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use sbapp_installer::{CancelToken, Downloader};
use sbapp_resolver::{HttpReply, ReleaseTransport};
use tracing::debug;

use crate::render::TerminalRenderer;

const USER_AGENT: &str = concat!("sbapp/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

// Archives can take far longer than the listing timeout, so only the
// connection phase is bounded.
pub(crate) fn download_client_builder(connect_timeout: Duration) -> ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect_timeout)
        .timeout(None::<Duration>)
}

pub(crate) struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub(crate) fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

impl ReleaseTransport for ReqwestTransport {
    fn get(&self, url: &str, bearer_token: Option<&str>) -> Result<HttpReply> {
        let mut request = self.client.get(url).header(ACCEPT, GITHUB_JSON);
        if let Some(token) = bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GitHub token contains characters not allowed in a header")?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }

        let response = request
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("failed to read response from {url}"))?;
        debug!(url, status, bytes = body.len(), "release listing response");
        Ok(HttpReply { status, body })
    }
}

pub(crate) struct HttpDownloader {
    client: Client,
    renderer: TerminalRenderer,
    cancel: CancelToken,
}

impl HttpDownloader {
    pub(crate) fn new(connect_timeout: Duration, renderer: TerminalRenderer) -> Result<Self> {
        let client = download_client_builder(connect_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(client, renderer))
    }

    pub(crate) fn with_client(client: Client, renderer: TerminalRenderer) -> Self {
        Self {
            client,
            renderer,
            cancel: CancelToken::new(),
        }
    }

    pub(crate) fn with_cancel(mut self, cancel: &CancelToken) -> Self {
        self.cancel = cancel.clone();
        self
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("download of {url} failed"))?;
        if !response.status().is_success() {
            return Err(anyhow!("download of {url} failed: HTTP {}", response.status()));
        }

        let file = File::create(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        let mut progress = self
            .renderer
            .start_progress("download", response.content_length());
        let mut buffer = vec![0_u8; 64 * 1024];
        let mut downloaded = 0_u64;
        loop {
            if self.cancel.is_cancelled() {
                progress.finish_abandon();
                return Err(anyhow!("download of {url}: cancelled"));
            }
            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) => {
                    progress.finish_abandon();
                    return Err(err).with_context(|| format!("download of {url} interrupted"));
                }
            };
            if let Err(err) = writer.write_all(&buffer[..read]) {
                progress.finish_abandon();
                return Err(err).with_context(|| format!("failed to write {}", dest.display()));
            }
            downloaded += read as u64;
            progress.set(downloaded);
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", dest.display()))?;
        progress.finish_success();
        Ok(())
    }
}
