use std::cmp::{Ordering, Reverse};
use std::sync::OnceLock;

use regex::Regex;
use sbapp_core::AssetNameFilter;
use semver::Prerelease;

pub fn candidate_tags<'a, I>(tags: I, filter: &AssetNameFilter, branch: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut selected: Vec<String> = Vec::new();
    for tag in tags {
        let keep = match filter {
            AssetNameFilter::All => true,
            AssetNameFilter::Branch => tag.contains(branch),
            AssetNameFilter::Substring(needle) => tag.contains(needle.as_str()),
        };
        if keep && !selected.iter().any(|existing| existing == tag) {
            selected.push(tag.to_string());
        }
    }

    match filter {
        AssetNameFilter::All | AssetNameFilter::Branch => {
            selected.sort_by_cached_key(|tag| Reverse(VersionKey::new(tag)));
        }
        AssetNameFilter::Substring(_) => {
            selected.sort_by_cached_key(|tag| {
                Reverse((embedded_version(tag), VersionKey::new(tag)))
            });
        }
    }
    selected
}

/// Orders tags the way `sort -V` does for the prefix and the numeric core
/// (digit runs numerically, text byte-wise), with a `-suffix` pre-release
/// ranking below the plain release.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    VersionKey::new(a).cmp(&VersionKey::new(b))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ChunkKey {
    Digits(usize, String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    Semver(Prerelease),
    Loose(Vec<ChunkKey>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct VersionKey {
    prefix: Vec<ChunkKey>,
    core: Vec<ChunkKey>,
    is_release: bool,
    pre: PreKey,
    raw: String,
}

impl VersionKey {
    fn new(tag: &str) -> Self {
        let version = sbapp_core::strip_version_prefix(tag);
        let prefix = &tag[..tag.len() - version.len()];
        let (core, pre) = match version.find(['-', '+']) {
            Some(index) => (&version[..index], &version[index + 1..]),
            None => (version, ""),
        };
        let pre_key = match Prerelease::new(pre) {
            Ok(parsed) => PreKey::Semver(parsed),
            Err(_) => PreKey::Loose(chunk_keys(pre)),
        };
        Self {
            prefix: chunk_keys(prefix),
            core: chunk_keys(core),
            is_release: pre.is_empty(),
            pre: pre_key,
            raw: tag.to_string(),
        }
    }
}

fn chunk_keys(input: &str) -> Vec<ChunkKey> {
    Chunks::new(input)
        .map(|chunk| match chunk {
            Chunk::Digits(digits) => {
                let trimmed = digits.trim_start_matches('0');
                ChunkKey::Digits(trimmed.len(), trimmed.to_string())
            }
            Chunk::Text(text) => ChunkKey::Text(text.to_string()),
        })
        .collect()
}

/// First version-like run in a tag. `x.y.z` is preferred over `x.y`, then `x`.
pub fn embedded_version(tag: &str) -> Option<Vec<u64>> {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("static regex"),
            Regex::new(r"(\d+)\.(\d+)").expect("static regex"),
            Regex::new(r"(\d+)").expect("static regex"),
        ]
    });

    patterns.iter().find_map(|pattern| {
        let captures = pattern.captures(tag)?;
        captures
            .iter()
            .skip(1)
            .map(|group| group.and_then(|m| m.as_str().parse::<u64>().ok()))
            .collect::<Option<Vec<u64>>>()
    })
}

/// Tag to bare version: everything through the first `-v` goes, then any
/// remaining non-digit prefix.
pub fn semantic_version_from_tag(tag: &str) -> String {
    let after = match tag.find("-v") {
        Some(index) => &tag[index + 2..],
        None => tag,
    };
    sbapp_core::strip_version_prefix(after).to_string()
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|ch: char| ch.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits {
            Chunk::Digits(chunk)
        } else {
            Chunk::Text(chunk)
        })
    }
}
