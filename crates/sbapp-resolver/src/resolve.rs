use sbapp_core::{archive_file_name, ApiToken, AppDescriptor, HostTarget, PrecompError};
use tracing::debug;

use crate::api::{api_root_from_repo_url, releases_url};
use crate::denylist::Denylist;
use crate::listing::{fetch_release_listing, Release, ReleaseTransport, RetryPolicy};
use crate::tags::{candidate_tags, semantic_version_from_tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub tag_name: String,
    pub semantic_version: String,
    pub download_url: String,
    pub digest: Option<String>,
    pub host: HostTarget,
}

pub fn select_release(
    descriptor: &AppDescriptor,
    host: HostTarget,
    releases: &[Release],
    denylist: &Denylist,
) -> Result<ResolvedRelease, PrecompError> {
    if let Some(force_tag) = &descriptor.force_tag {
        return match best_asset_for_tag(releases, force_tag, host) {
            Some(asset) => Ok(resolved(force_tag, asset, host)),
            None => Err(PrecompError::ForcedTagNotFound {
                tag: force_tag.clone(),
                config_source: descriptor.force_tag_source.clone(),
                platform: host.platform.to_string(),
                arch: host.arch.to_string(),
            }),
        };
    }

    let candidates = candidate_tags(
        releases.iter().map(|release| release.tag_name.as_str()),
        &descriptor.asset_name_filter,
        &descriptor.repo_branch,
    );
    debug!(app = %descriptor.config_name, ?candidates, "ranked release candidates");

    for tag in &candidates {
        let Some(asset) = best_asset_for_tag(releases, tag, host) else {
            continue;
        };
        if let Some(bad) = denylist.find(host, tag) {
            debug!(
                tag = %tag,
                host = %host,
                reason = bad.reason.as_deref().unwrap_or("listed as known bad"),
                "skipping known bad release"
            );
            continue;
        }
        return Ok(resolved(tag, asset, host));
    }

    Err(PrecompError::NotFound {
        assets_name: descriptor.assets_name.clone(),
        branch: descriptor.repo_branch.clone(),
        platform: host.platform.to_string(),
        arch: host.arch.to_string(),
    })
}

struct AssetChoice<'a> {
    url: &'a str,
    digest: Option<&'a str>,
}

/// Lexically last matching download URL among the tag's assets.
fn best_asset_for_tag<'a>(
    releases: &'a [Release],
    tag: &str,
    host: HostTarget,
) -> Option<AssetChoice<'a>> {
    releases
        .iter()
        .filter(|release| release.tag_name == tag)
        .flat_map(|release| release.assets.iter())
        .filter(|asset| {
            archive_file_name(&asset.browser_download_url)
                .is_some_and(|file| file.contains(tag) && host.matches_asset_name(file))
        })
        .max_by(|a, b| a.browser_download_url.cmp(&b.browser_download_url))
        .map(|asset| AssetChoice {
            url: asset.browser_download_url.as_str(),
            digest: asset.digest.as_deref(),
        })
}

fn resolved(tag: &str, asset: AssetChoice<'_>, host: HostTarget) -> ResolvedRelease {
    ResolvedRelease {
        tag_name: tag.to_string(),
        semantic_version: semantic_version_from_tag(tag),
        download_url: asset.url.to_string(),
        digest: asset.digest.map(str::to_string),
        host,
    }
}

pub struct ReleaseResolver<T> {
    transport: T,
    token: Option<ApiToken>,
    denylist: Denylist,
    retry: RetryPolicy,
    notice: Option<Box<dyn Fn(&str)>>,
}

impl<T: ReleaseTransport> ReleaseResolver<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            token: None,
            denylist: Denylist::default(),
            retry: RetryPolicy::default(),
            notice: None,
        }
    }

    pub fn with_token(mut self, token: Option<ApiToken>) -> Self {
        self.token = token;
        self
    }

    pub fn with_denylist(mut self, denylist: Denylist) -> Self {
        self.denylist = denylist;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notice(mut self, notice: impl Fn(&str) + 'static) -> Self {
        self.notice = Some(Box::new(notice));
        self
    }

    pub fn list_releases(&self, descriptor: &AppDescriptor) -> Result<Vec<Release>, PrecompError> {
        let api_root = api_root_from_repo_url(&descriptor.repo_url)?;
        let url = releases_url(&api_root);
        fetch_release_listing(
            &self.transport,
            &url,
            self.token.as_ref(),
            self.retry,
            |attempt, reason| {
                if let Some(notice) = &self.notice {
                    notice(&format!(
                        "retrying release query for {} (attempt {attempt}/{}): {reason}",
                        descriptor.config_name, self.retry.attempts
                    ));
                }
            },
        )
    }

    pub fn resolve(
        &self,
        descriptor: &AppDescriptor,
        host: HostTarget,
    ) -> Result<ResolvedRelease, PrecompError> {
        let releases = self.list_releases(descriptor)?;
        select_release(descriptor, host, &releases, &self.denylist)
    }
}
