//! Background scrape jobs with an observable completion channel.
//!
//! Every submitted scrape runs on its own tokio task. Its status is
//! published on a `watch` channel, so HTTP callers, the CLI and tests can
//! poll or await completion instead of the work vanishing after the
//! response has been sent.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::scrape::{CaptureMode, ScrapeReport};

/// Finished jobs kept for status queries before the oldest are dropped.
pub const DEFAULT_MAX_FINISHED: usize = 256;

/// Lifecycle of a scrape job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded { report: ScrapeReport },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Descriptive fields recorded when a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub target_url: String,
    pub capture: CaptureMode,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    #[serde(flatten)]
    pub info: JobInfo,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

/// Handle returned to the submitter.
pub struct JobHandle {
    pub id: Uuid,
    status: watch::Receiver<JobStatus>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Wait for the job to reach a terminal status.
    pub async fn finished(mut self) -> JobStatus {
        let waited = self
            .status
            .wait_for(JobStatus::is_terminal)
            .await
            .map(|status| status.clone());
        let status = waited.unwrap_or_else(|_| self.status.borrow().clone());
        let _ = (&mut self.task).await;
        status
    }
}

struct JobEntry {
    info: JobInfo,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: watch::Receiver<JobStatus>,
}

#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, JobEntry>,
    finished: VecDeque<Uuid>,
}

/// Registry of running and recently finished jobs.
#[derive(Clone)]
pub struct JobManager {
    table: Arc<RwLock<JobTable>>,
    max_finished: usize,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FINISHED)
    }
}

impl JobManager {
    pub fn new(max_finished: usize) -> Self {
        Self {
            table: Arc::new(RwLock::new(JobTable::default())),
            max_finished,
        }
    }

    /// Spawn `work` as a background job and register it.
    pub async fn submit<F>(&self, info: JobInfo, work: F) -> JobHandle
    where
        F: Future<Output = anyhow::Result<ScrapeReport>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(JobStatus::Running);

        self.table.write().await.jobs.insert(
            id,
            JobEntry {
                info: info.clone(),
                submitted_at: Utc::now(),
                finished_at: None,
                status: rx.clone(),
            },
        );
        tracing::info!(job = %id, url = %info.target_url, capture = ?info.capture, "scrape job submitted");

        let manager = self.clone();
        let task = tokio::spawn(async move {
            let status = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(report)) => {
                    tracing::info!(
                        job = %id,
                        key = %report.object.key,
                        assets = ?report.asset_count,
                        "scrape job succeeded"
                    );
                    JobStatus::Succeeded { report }
                }
                Ok(Err(e)) => {
                    let error = format!("{e:#}");
                    tracing::error!(job = %id, %error, "scrape job failed");
                    JobStatus::Failed { error }
                }
                Err(_) => {
                    tracing::error!(job = %id, "scrape job panicked");
                    JobStatus::Failed {
                        error: "scrape task panicked".to_string(),
                    }
                }
            };
            manager.finish(id, &tx, status).await;
        });

        JobHandle {
            id,
            status: rx,
            task,
        }
    }

    /// Record the finish time and publish the terminal status under one
    /// write lock, so readers see both or neither.
    async fn finish(&self, id: Uuid, tx: &watch::Sender<JobStatus>, status: JobStatus) {
        let mut table = self.table.write().await;
        if let Some(entry) = table.jobs.get_mut(&id) {
            entry.finished_at = Some(Utc::now());
        }
        let _ = tx.send(status);
        table.finished.push_back(id);
        while table.finished.len() > self.max_finished {
            if let Some(old) = table.finished.pop_front() {
                table.jobs.remove(&old);
            }
        }
    }

    /// Current view of a job, if it is still tracked.
    pub async fn get(&self, id: Uuid) -> Option<JobSnapshot> {
        let table = self.table.read().await;
        let entry = table.jobs.get(&id)?;
        let status = entry.status.borrow().clone();
        Some(JobSnapshot {
            id,
            info: entry.info.clone(),
            submitted_at: entry.submitted_at,
            finished_at: entry.finished_at,
            status,
        })
    }

    /// Wait for a tracked job to finish. `None` for unknown ids.
    pub async fn wait(&self, id: Uuid) -> Option<JobStatus> {
        let mut rx = self.table.read().await.jobs.get(&id)?.status.clone();
        let waited = rx
            .wait_for(JobStatus::is_terminal)
            .await
            .map(|status| status.clone());
        Some(waited.unwrap_or_else(|_| rx.borrow().clone()))
    }

    /// Number of jobs still running.
    pub async fn running(&self) -> usize {
        self.table
            .read()
            .await
            .jobs
            .values()
            .filter(|e| !e.status.borrow().is_terminal())
            .count()
    }
}
