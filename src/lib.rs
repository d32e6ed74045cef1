#![forbid(unsafe_code)]

//! Building blocks for the Shorts bundling service.
//!
//! The pipeline is split leaf-first: [`resolver`] lists a channel's Shorts,
//! [`downloader`] fetches a selected range, [`transcoder`] normalizes the
//! containers to MP4 and [`archiver`] packs the result into a ZIP. [`jobs`]
//! strings those stages together as background jobs that the HTTP binary
//! exposes for polling.

pub mod archiver;
pub mod config;
pub mod downloader;
pub mod error;
pub mod jobs;
pub mod progress;
pub mod resolver;
pub mod security;
pub mod tools;
pub mod transcoder;
pub mod ytdlp;
