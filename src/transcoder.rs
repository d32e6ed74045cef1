#![forbid(unsafe_code)]

//! Converts legacy containers in a working directory to MP4.

use crate::error::PipelineError;
use crate::progress::{ProgressCounter, Stage};
use crate::tools::run_captured;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Extensions that get converted. Anything else is left untouched.
pub const LEGACY_EXTENSIONS: &[&str] = &["mkv", "webm"];
pub const TARGET_EXTENSION: &str = "mp4";
pub const VIDEO_CODEC: &str = "libx264";
pub const AUDIO_CODEC: &str = "aac";

/// Converts one media file into another container.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// [`Transcoder`] backed by the `ffmpeg` executable.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Transcoder for Ffmpeg {
    fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-c:v")
            .arg(VIDEO_CODEC)
            .arg("-c:a")
            .arg(AUDIO_CODEC)
            .arg(output);
        run_captured(command, "ffmpeg")?;
        Ok(())
    }
}

fn is_legacy_media(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            LEGACY_EXTENSIONS
                .iter()
                .any(|legacy| ext.eq_ignore_ascii_case(legacy))
        })
        .unwrap_or(false)
}

/// Files directly inside `dir` that need converting, sorted by name.
pub fn pending_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let workspace_err = |source| PipelineError::Workspace {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(workspace_err)? {
        let entry = entry.map_err(workspace_err)?;
        let path = entry.path();
        if path.is_file() && is_legacy_media(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// MP4 path next to `input` that does not exist yet.
///
/// An item already delivered as `clip.mp4` stays untouched when `clip.webm`
/// is converted; the conversion lands in `clip-1.mp4` instead.
fn free_target(input: &Path) -> PathBuf {
    let target = input.with_extension(TARGET_EXTENSION);
    if !target.exists() {
        return target;
    }
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let candidate = input.with_file_name(format!("{stem}-{counter}.{TARGET_EXTENSION}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Converts every legacy file in `dir` to MP4 and removes the source.
///
/// `progress` is restarted with the number of pending files. The first
/// failure stops the pass.
pub fn transcode_directory(
    transcoder: &dyn Transcoder,
    dir: &Path,
    progress: &ProgressCounter,
) -> Result<Vec<PathBuf>, PipelineError> {
    let files = pending_files(dir)?;
    progress.start(Stage::Converting, files.len());

    let mut outputs = Vec::with_capacity(files.len());
    for input in files {
        let output = free_target(&input);
        let file = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());

        transcoder
            .transcode(&input, &output)
            .map_err(|err| PipelineError::Transcode {
                file: file.clone(),
                reason: format!("{err:#}"),
            })?;
        fs::remove_file(&input).map_err(|err| PipelineError::Transcode {
            file,
            reason: format!("removing source: {err}"),
        })?;

        progress.advance();
        outputs.push(output);
    }
    Ok(outputs)
}
