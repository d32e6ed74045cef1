#![forbid(unsafe_code)]

//! Background jobs: download → transcode → archive → cleanup.
//!
//! Each scheduled job gets its own id, working directory, archive name and
//! pair of progress counters. Jobs run one at a time behind a single-permit
//! semaphore; later ones wait in [`JobStatus::Queued`]. The counters of the
//! most recently started job are also exposed process-wide for the legacy
//! polling endpoints.

use crate::archiver::archive_directory;
use crate::downloader::{MediaDownloader, SelectionRange, download_batch};
use crate::error::PipelineError;
use crate::progress::{ProgressCounter, ProgressRecord, Stage};
use crate::transcoder::{Transcoder, transcode_directory};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub const ARCHIVE_SUFFIX: &str = "-shorts.zip";

/// Capabilities and locations a job needs to run.
pub struct Pipeline {
    pub downloader: Arc<dyn MediaDownloader>,
    pub transcoder: Arc<dyn Transcoder>,
    pub work_root: PathBuf,
    pub archive_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Returned to the caller right after scheduling.
#[derive(Clone, Debug, Serialize)]
pub struct JobTicket {
    pub id: String,
    pub archive_name: String,
    pub download_link: String,
}

/// Point-in-time view of a job served by `GET /jobs/{id}`.
#[derive(Clone, Debug, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub selection: SelectionRange,
    pub download: ProgressRecord,
    pub conversion: ProgressRecord,
    pub downloaded: Vec<String>,
    pub archive_entries: Vec<String>,
    pub error: Option<String>,
    pub download_link: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Unfinished,
    Missing,
}

pub fn download_link(archive_name: &str) -> String {
    format!("/download/{archive_name}")
}

struct Job {
    id: String,
    archive_name: String,
    items: Vec<String>,
    selection: SelectionRange,
    created_at: DateTime<Utc>,
    download: ProgressCounter,
    conversion: ProgressCounter,
    state: Mutex<JobState>,
}

struct JobState {
    status: JobStatus,
    stage: Stage,
    downloaded: Vec<String>,
    archive_entries: Vec<String>,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(id: String, items: Vec<String>, selection: SelectionRange) -> Self {
        let archive_name = format!("{id}{ARCHIVE_SUFFIX}");
        Self {
            id,
            archive_name,
            items,
            selection,
            created_at: Utc::now(),
            download: ProgressCounter::new(Stage::Queued),
            conversion: ProgressCounter::new(Stage::Queued),
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                stage: Stage::Queued,
                downloaded: Vec::new(),
                archive_entries: Vec::new(),
                error: None,
                finished_at: None,
            }),
        }
    }

    /// The download record mirrors the job stage throughout; the conversion
    /// record only from the conversion stage on.
    fn enter(&self, stage: Stage) {
        self.state.lock().stage = stage;
        self.download.set_stage(stage);
        if stage != Stage::Downloading {
            self.conversion.set_stage(stage);
        }
    }

    fn mark_running(&self) {
        self.state.lock().status = JobStatus::Running;
    }

    fn record_download(&self, item: &str) {
        self.state.lock().downloaded.push(item.to_string());
        self.download.advance();
    }

    fn succeed(&self, entries: Vec<String>) {
        self.enter(Stage::Completed);
        let mut state = self.state.lock();
        state.status = JobStatus::Succeeded;
        state.archive_entries = entries;
        state.finished_at = Some(Utc::now());
    }

    fn fail(&self, reason: String) {
        self.enter(Stage::Failed);
        let mut state = self.state.lock();
        state.status = JobStatus::Failed;
        state.error = Some(reason);
        state.finished_at = Some(Utc::now());
    }

    fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        JobSnapshot {
            id: self.id.clone(),
            status: state.status,
            stage: state.stage,
            selection: self.selection,
            download: self.download.snapshot(),
            conversion: self.conversion.snapshot(),
            downloaded: state.downloaded.clone(),
            archive_entries: state.archive_entries.clone(),
            error: state.error.clone(),
            download_link: download_link(&self.archive_name),
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }
}

#[derive(Clone)]
pub struct JobManager {
    inner: Arc<JobManagerInner>,
}

struct JobManagerInner {
    jobs: Mutex<HashMap<String, Arc<Job>>>,
    latest: RwLock<Option<Arc<Job>>>,
    counter: AtomicUsize,
    gate: Arc<Semaphore>,
    pipeline: Pipeline,
}

impl JobManager {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            inner: Arc::new(JobManagerInner {
                jobs: Mutex::new(HashMap::new()),
                latest: RwLock::new(None),
                counter: AtomicUsize::new(1),
                gate: Arc::new(Semaphore::new(1)),
                pipeline,
            }),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.inner.pipeline.archive_dir
    }

    /// Validates `range` against `items` and queues a detached job.
    ///
    /// Nothing is recorded when the range is rejected. Must be called from
    /// within a tokio runtime.
    pub fn schedule(
        &self,
        items: Vec<String>,
        range: SelectionRange,
    ) -> Result<JobTicket, PipelineError> {
        let range = range.validate(items.len())?;
        let id = self.next_job_id();
        let job = Arc::new(Job::new(id.clone(), items, range));
        let ticket = JobTicket {
            id,
            archive_name: job.archive_name.clone(),
            download_link: download_link(&job.archive_name),
        };

        self.inner
            .jobs
            .lock()
            .insert(job.id.clone(), job.clone());
        info!(
            job = %job.id,
            start = range.start,
            end = range.end,
            "queued shorts job"
        );

        let inner = self.inner.clone();
        tokio::spawn(run_job(inner, job));
        Ok(ticket)
    }

    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        let job = self.inner.jobs.lock().get(job_id).cloned()?;
        Some(job.snapshot())
    }

    /// Download counters of the most recently started job.
    pub fn latest_download_progress(&self) -> ProgressRecord {
        self.inner
            .latest
            .read()
            .as_ref()
            .map(|job| job.download.snapshot())
            .unwrap_or_default()
    }

    /// Conversion counters of the most recently started job.
    pub fn latest_conversion_progress(&self) -> ProgressRecord {
        self.inner
            .latest
            .read()
            .as_ref()
            .map(|job| job.conversion.snapshot())
            .unwrap_or_default()
    }

    /// Drops a finished job record together with its archive and any
    /// working directory a failure left behind.
    pub fn remove(&self, job_id: &str) -> RemoveOutcome {
        let job = {
            let mut jobs = self.inner.jobs.lock();
            let Some(job) = jobs.get(job_id) else {
                return RemoveOutcome::Missing;
            };
            if !job.state.lock().status.is_finished() {
                return RemoveOutcome::Unfinished;
            }
            jobs.remove(job_id)
        };
        if let Some(job) = job {
            let pipeline = &self.inner.pipeline;
            discard(&pipeline.archive_dir.join(&job.archive_name), |path| {
                fs::remove_file(path)
            });
            discard(&pipeline.work_root.join(&job.id), |path| fs::remove_dir_all(path));
            info!(job = %job.id, "cleared shorts job");
        }
        RemoveOutcome::Removed
    }

    fn next_job_id(&self) -> String {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        format!("job-{id}")
    }
}

fn discard(path: &Path, remove: impl FnOnce(&Path) -> io::Result<()>) {
    match remove(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove job output"),
    }
}

async fn run_job(inner: Arc<JobManagerInner>, job: Arc<Job>) {
    let _permit = match inner.gate.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => {
            job.fail(format!("job queue closed: {err}"));
            return;
        }
    };

    job.mark_running();
    *inner.latest.write() = Some(job.clone());
    info!(job = %job.id, items = job.selection.len(), "started shorts job");

    let inner_for_run = inner.clone();
    let job_for_run = job.clone();
    let result =
        tokio::task::spawn_blocking(move || execute(&inner_for_run.pipeline, &job_for_run)).await;

    match result {
        Ok(Ok(entries)) => {
            info!(job = %job.id, entries = entries.len(), archive = %job.archive_name, "finished shorts job");
            job.succeed(entries);
        }
        Ok(Err(err)) => {
            error!(job = %job.id, error = %err, "shorts job failed");
            let work_dir = inner.pipeline.work_root.join(&job.id);
            if work_dir.exists() {
                warn!(job = %job.id, path = %work_dir.display(), "working directory left in place");
            }
            job.fail(err.to_string());
        }
        Err(err) => {
            error!(job = %job.id, error = %err, "shorts job panicked");
            job.fail(format!("job aborted: {err}"));
        }
    }
}

/// Runs every stage of one job on the current (blocking) thread.
fn execute(pipeline: &Pipeline, job: &Job) -> Result<Vec<String>, PipelineError> {
    let work_dir = pipeline.work_root.join(&job.id);

    job.download.start(Stage::Downloading, job.selection.len());
    job.enter(Stage::Downloading);
    download_batch(
        pipeline.downloader.as_ref(),
        &job.items,
        job.selection,
        &work_dir,
        |item| job.record_download(item),
    )?;

    job.enter(Stage::Converting);
    transcode_directory(pipeline.transcoder.as_ref(), &work_dir, &job.conversion)?;

    job.enter(Stage::Archiving);
    let destination = pipeline.archive_dir.join(&job.archive_name);
    archive_directory(&work_dir, &destination)
}
