use std::thread;
use std::time::Duration;

use rand::Rng;
use sbapp_core::{ApiToken, PrecompError};
use serde::Deserialize;
use tracing::{debug, warn};

const AUTH_REJECTED_MARKER: &str = "Bad credentials";
const RATE_LIMIT_MARKER: &str = "rate limit exceeded";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default)]
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

pub trait ReleaseTransport {
    fn get(&self, url: &str, bearer_token: Option<&str>) -> anyhow::Result<HttpReply>;
}

impl<T: ReleaseTransport + ?Sized> ReleaseTransport for &T {
    fn get(&self, url: &str, bearer_token: Option<&str>) -> anyhow::Result<HttpReply> {
        (**self).get(url, bearer_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_before(&self, next_attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let base = self.base_delay * next_attempt.saturating_sub(1);
        let jitter_cap = (self.base_delay.as_millis() / 2) as u64;
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_cap))
    }
}

/// Fetches and parses the release list, retrying transport failures and
/// empty replies. Credential and rate-limit rejections on error replies are
/// terminal; a successful listing is never classified by its text.
pub fn fetch_release_listing<T, F>(
    transport: &T,
    url: &str,
    token: Option<&ApiToken>,
    policy: RetryPolicy,
    mut on_retry: F,
) -> Result<Vec<Release>, PrecompError>
where
    T: ReleaseTransport + ?Sized,
    F: FnMut(u32, &str),
{
    let attempts = policy.attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            on_retry(attempt, &last_reason);
            thread::sleep(policy.delay_before(attempt));
        }

        let reply = match transport.get(url, token.map(|t| t.value.as_str())) {
            Ok(reply) => reply,
            Err(err) => {
                debug!(attempt, error = %err, "release listing request failed");
                last_reason = format!("{err:#}");
                continue;
            }
        };

        let success = (200..300).contains(&reply.status);
        if !success {
            if let Some(err) = classify_rejection(&reply.body, token) {
                return Err(err);
            }
        }
        if reply.status >= 500 {
            last_reason = format!("HTTP {}", reply.status);
            continue;
        }
        if reply.body.trim().is_empty() {
            last_reason = "empty response".to_string();
            continue;
        }
        if !success {
            return Err(PrecompError::Transport {
                url: url.to_string(),
                attempts: attempt,
                reason: format!("HTTP {}: {}", reply.status, first_line(&reply.body)),
            });
        }

        return parse_release_listing(&reply.body).map_err(|err| PrecompError::Transport {
            url: url.to_string(),
            attempts: attempt,
            reason: format!("unexpected release listing: {err}"),
        });
    }

    warn!(url, attempts, "giving up on release listing");
    Err(PrecompError::Transport {
        url: url.to_string(),
        attempts,
        reason: last_reason,
    })
}

pub fn parse_release_listing(body: &str) -> serde_json::Result<Vec<Release>> {
    let releases: Vec<Release> = serde_json::from_str(body)?;
    Ok(releases.into_iter().filter(|release| !release.draft).collect())
}

fn classify_rejection(body: &str, token: Option<&ApiToken>) -> Option<PrecompError> {
    if body.contains(AUTH_REJECTED_MARKER) {
        if let Some(token) = token {
            return Some(PrecompError::Auth {
                token_source: token.source.clone(),
            });
        }
    }
    if body.to_ascii_lowercase().contains(RATE_LIMIT_MARKER) {
        return Some(PrecompError::RateLimited {
            token_present: token.is_some(),
        });
    }
    None
}

fn first_line(body: &str) -> &str {
    body.lines().next().unwrap_or_default().trim()
}
