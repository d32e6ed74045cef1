#![forbid(unsafe_code)]

//! Turns a channel URL into the ordered list of its Shorts.

use crate::error::PipelineError;
use anyhow::Result;

/// Path marker that identifies short-form items.
pub const SHORTS_PATH_MARKER: &str = "/shorts/";

/// Default cap on the number of playlist entries fetched per listing.
pub const DEFAULT_PLAYLIST_END: usize = 1000;

/// Metadata-only listing of a channel or playlist.
pub trait ChannelLister: Send + Sync {
    /// Returns up to `limit` entry URLs in upstream order without fetching
    /// any media.
    fn list_entries(&self, channel_url: &str, limit: usize) -> Result<Vec<String>>;
}

pub fn is_short_url(url: &str) -> bool {
    url.contains(SHORTS_PATH_MARKER)
}

/// Accepts only absolute `http://` or `https://` URLs with a host.
pub fn validate_channel_url(channel_url: &str) -> Result<&str, PipelineError> {
    let lower = channel_url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    let has_host = rest
        .and_then(|rest| rest.split(['/', '?', '#']).next())
        .is_some_and(|host| !host.is_empty());
    if !has_host || channel_url.chars().any(char::is_whitespace) {
        return Err(PipelineError::Resolution(format!(
            "not an http(s) URL: {channel_url}"
        )));
    }
    Ok(channel_url)
}

/// Lists the channel and keeps only Shorts, preserving order.
///
/// An empty result is not an error here; see [`require_items`].
pub fn resolve_shorts(
    lister: &dyn ChannelLister,
    channel_url: &str,
    limit: usize,
) -> Result<Vec<String>, PipelineError> {
    let channel_url = validate_channel_url(channel_url)?;
    let entries = lister
        .list_entries(channel_url, limit)
        .map_err(|err| PipelineError::Resolution(format!("{err:#}")))?;
    Ok(entries.into_iter().filter(|url| is_short_url(url)).collect())
}

/// Rejects an empty listing with [`PipelineError::NotFound`].
pub fn require_items(items: Vec<String>) -> Result<Vec<String>, PipelineError> {
    if items.is_empty() {
        return Err(PipelineError::NotFound);
    }
    Ok(items)
}
