#![forbid(unsafe_code)]

use std::path::PathBuf;

/// Everything that can stop a request or a background job.
///
/// The first three variants are raised synchronously while a request is
/// being validated. The remaining ones only happen inside a running job and
/// end up as the job's failure reason.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to fetch Shorts URLs: {0}")]
    Resolution(String),

    #[error("no Shorts URLs found")]
    NotFound,

    #[error(
        "invalid range {start}..{end}: the channel has only {available} Shorts available"
    )]
    Range {
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("failed to download {item}: {reason}")]
    Download {
        item: String,
        reason: String,
        /// Items that made it to disk before the failure.
        downloaded: Vec<String>,
    },

    #[error("failed to convert {file} to mp4: {reason}")]
    Transcode { file: String, reason: String },

    #[error("failed to write archive {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("working directory {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// True for errors caused by the request itself rather than by a job.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Resolution(_) | Self::NotFound | Self::Range { .. }
        )
    }
}
