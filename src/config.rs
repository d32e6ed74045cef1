#![forbid(unsafe_code)]

use crate::resolver::DEFAULT_PLAYLIST_END;
use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_WORK_ROOT: &str = "youtube";
pub const DEFAULT_ARCHIVE_DIR: &str = "archives";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_token: String,
    pub host: String,
    pub port: u16,
    /// Parent of the per-job working directories.
    pub work_root: PathBuf,
    /// Where finished archives are published for `/download/{filename}`.
    pub archive_dir: PathBuf,
    pub playlist_end: usize,
    pub cors_origins: Vec<String>,
    pub yt_dlp_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub work_root: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let api_token =
        lookup("SHORTS_API_TOKEN").ok_or_else(|| anyhow!("SHORTS_API_TOKEN not set"))?;
    let host = non_blank(overrides.host)
        .or_else(|| lookup("SHORTS_HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup("SHORTS_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let work_root = overrides
        .work_root
        .or_else(|| lookup("SHORTS_WORK_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_ROOT));
    let archive_dir = overrides
        .archive_dir
        .or_else(|| lookup("SHORTS_ARCHIVE_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR));
    let playlist_end = lookup("SHORTS_PLAYLIST_END")
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_PLAYLIST_END);
    let cors_origins = lookup("SHORTS_CORS_ORIGINS")
        .map(|value| parse_list(&value))
        .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]);
    let yt_dlp_bin = lookup("YT_DLP_BIN").unwrap_or_else(|| DEFAULT_YT_DLP.to_string());
    let ffmpeg_bin = lookup("FFMPEG_BIN").unwrap_or_else(|| DEFAULT_FFMPEG.to_string());

    Ok(Settings {
        api_token,
        host,
        port,
        work_root,
        archive_dir,
        playlist_end,
        cors_origins,
        yt_dlp_bin: PathBuf::from(yt_dlp_bin),
        ffmpeg_bin: PathBuf::from(ffmpeg_bin),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
