#![forbid(unsafe_code)]

//! `yt-dlp` backed implementations of the listing and download capabilities.

use crate::downloader::{DEFAULT_FORMAT, MediaDownloader, OUTPUT_TEMPLATE};
use crate::resolver::ChannelLister;
use crate::tools::run_captured;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Clone, Debug)]
pub struct YtDlp {
    program: PathBuf,
    format: String,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            format: DEFAULT_FORMAT.to_string(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("--quiet").arg("--no-warnings");
        command
    }
}

/// Subset of `yt-dlp --flat-playlist --dump-single-json` we rely on.
#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Option<Vec<Option<FlatEntry>>>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    url: Option<String>,
}

/// Extracts entry URLs in order. A payload without `entries` (a single
/// video rather than a playlist) yields nothing.
fn parse_flat_playlist(raw: &[u8]) -> Result<Vec<String>> {
    let playlist: FlatPlaylist =
        serde_json::from_slice(raw).context("parsing yt-dlp playlist metadata")?;
    Ok(playlist
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect())
}

impl ChannelLister for YtDlp {
    fn list_entries(&self, channel_url: &str, limit: usize) -> Result<Vec<String>> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg("--")
            .arg(channel_url);
        let stdout = run_captured(command, "yt-dlp")
            .with_context(|| format!("listing {channel_url}"))?;
        parse_flat_playlist(&stdout)
    }
}

impl MediaDownloader for YtDlp {
    fn download(&self, item_url: &str, output_dir: &Path) -> Result<()> {
        let template = output_dir.join(OUTPUT_TEMPLATE);
        let mut command = self.command();
        command
            .arg("--no-progress")
            .arg("--format")
            .arg(&self.format)
            .arg("--output")
            .arg(template)
            .arg("--")
            .arg(item_url);
        run_captured(command, "yt-dlp").with_context(|| format!("downloading {item_url}"))?;
        Ok(())
    }
}
