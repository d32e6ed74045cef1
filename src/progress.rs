#![forbid(unsafe_code)]

//! Progress bookkeeping shared between a running job and the pollers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One named step of the pipeline.
///
/// Resolution is not listed: it runs inside the triggering request before a
/// job exists, so pollers never see it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Idle,
    Queued,
    Downloading,
    Converting,
    Archiving,
    Completed,
    Failed,
}

impl Stage {
    /// Stage that follows once every item of `self` is done.
    pub fn next(self) -> Self {
        match self {
            Self::Queued => Self::Downloading,
            Self::Downloading => Self::Converting,
            Self::Converting => Self::Archiving,
            Self::Archiving => Self::Completed,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The `{stage, total, completed}` triple served to pollers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub stage: Stage,
    pub total: usize,
    pub completed: usize,
}

/// Cloneable handle around a [`ProgressRecord`].
///
/// All mutation happens under one lock so readers always observe a
/// consistent triple.
#[derive(Clone, Debug, Default)]
pub struct ProgressCounter {
    inner: Arc<Mutex<ProgressRecord>>,
}

impl ProgressCounter {
    pub fn new(stage: Stage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressRecord {
                stage,
                ..ProgressRecord::default()
            })),
        }
    }

    /// Resets the counter for a new stage with `total` items.
    pub fn start(&self, stage: Stage, total: usize) {
        *self.inner.lock() = ProgressRecord {
            stage,
            total,
            completed: 0,
        };
    }

    /// Marks one more item done.
    ///
    /// Finishing the last item moves the record to the following stage in
    /// the same critical section, so `completed == total` is never reported
    /// next to a stage that is still working.
    pub fn advance(&self) {
        let mut record = self.inner.lock();
        if record.completed < record.total {
            record.completed += 1;
            if record.completed == record.total {
                record.stage = record.stage.next();
            }
        }
    }

    /// Moves to `stage` without touching the counters.
    pub fn set_stage(&self, stage: Stage) {
        self.inner.lock().stage = stage;
    }

    pub fn snapshot(&self) -> ProgressRecord {
        *self.inner.lock()
    }
}
