#![forbid(unsafe_code)]

//! Downloads a selected slice of item URLs into a working directory.

use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// yt-dlp format selector: best video and audio, muxed, or best single file.
pub const DEFAULT_FORMAT: &str = "bestvideo+bestaudio/best";

/// Output template: file named after the title with its native extension.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Fetches one item into a directory.
pub trait MediaDownloader: Send + Sync {
    fn download(&self, item_url: &str, output_dir: &Path) -> Result<()>;
}

/// Zero-based `[start, end)` slice of a resolved item list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Checks the range against a list of `available` items.
    ///
    /// `start` must point at an existing item, `end` may equal the length,
    /// and the slice must not be empty.
    pub fn validate(self, available: usize) -> Result<Self, PipelineError> {
        if self.start >= available || self.end > available || self.start >= self.end {
            return Err(PipelineError::Range {
                start: self.start,
                end: self.end,
                available,
            });
        }
        Ok(self)
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn select(self, items: &[String]) -> &[String] {
        &items[self.start..self.end]
    }
}

/// Downloads `range` of `items` sequentially into `output_dir`.
///
/// `on_item` runs after every successful download. The first failure stops
/// the batch; files already written stay in place and the error carries the
/// URLs that succeeded.
pub fn download_batch(
    downloader: &dyn MediaDownloader,
    items: &[String],
    range: SelectionRange,
    output_dir: &Path,
    mut on_item: impl FnMut(&str),
) -> Result<Vec<String>, PipelineError> {
    let range = range.validate(items.len())?;
    fs::create_dir_all(output_dir).map_err(|source| PipelineError::Workspace {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut downloaded = Vec::with_capacity(range.len());
    for item in range.select(items) {
        if let Err(err) = downloader.download(item, output_dir) {
            return Err(PipelineError::Download {
                item: item.clone(),
                reason: format!("{err:#}"),
                downloaded,
            });
        }
        downloaded.push(item.clone());
        on_item(item);
    }
    Ok(downloaded)
}
