#![forbid(unsafe_code)]

//! Packs a working directory into a single ZIP and removes the directory.

use crate::error::PipelineError;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Writes every file below `dir` into `destination`, keyed by base name,
/// then deletes `dir`.
///
/// Subdirectories are flattened. When two files share a base name the later
/// one is stored as `name-1.ext`, `name-2.ext` and so on. The archive is
/// written next to `destination` and renamed into place once complete.
/// Returns the entry names in the order they were written.
pub fn archive_directory(dir: &Path, destination: &Path) -> Result<Vec<String>, PipelineError> {
    let entries = write_archive(dir, destination).map_err(|err| PipelineError::Archive {
        path: destination.to_path_buf(),
        reason: err.to_string(),
    })?;
    fs::remove_dir_all(dir).map_err(|source| PipelineError::Workspace {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(entries)
}

fn write_archive(dir: &Path, destination: &Path) -> io::Result<Vec<String>> {
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let partial = partial_path(destination);
    let result = write_entries(dir, &partial);
    match result {
        Ok(entries) => {
            fs::rename(&partial, destination)?;
            Ok(entries)
        }
        Err(err) => {
            let _ = fs::remove_file(&partial);
            Err(err)
        }
    }
}

fn write_entries(dir: &Path, target: &Path) -> io::Result<Vec<String>> {
    let mut writer = ZipWriter::new(File::create(target)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut taken = HashSet::new();
    let mut entries = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let base = entry.file_name().to_string_lossy().into_owned();
        let name = unique_entry_name(&base, &mut taken);

        writer.start_file(name.clone(), options).map_err(io::Error::other)?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut writer)?;
        entries.push(name);
    }

    writer.finish().map_err(io::Error::other)?;
    Ok(entries)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn unique_entry_name(base: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }
    let path = Path::new(base);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| base.to_string());
    let ext = path.extension().map(|ext| ext.to_string_lossy().into_owned());
    let mut counter = 1;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{stem}-{counter}.{ext}"),
            None => format!("{stem}-{counter}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
