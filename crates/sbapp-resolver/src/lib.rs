mod api;
mod denylist;
mod listing;
mod resolve;
mod tags;

pub use api::{api_root_from_repo_url, releases_url, FORGE_ORIGIN};
pub use denylist::{Denylist, KnownBadRelease};
pub use listing::{
    fetch_release_listing, parse_release_listing, HttpReply, Release, ReleaseAsset,
    ReleaseTransport, RetryPolicy,
};
pub use resolve::{select_release, ReleaseResolver, ResolvedRelease};
pub use tags::{candidate_tags, embedded_version, semantic_version_from_tag, version_cmp};
