use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info};
use uuid::Uuid;

use crate::adapter::{AdapterError, RenderAdapter};
use crate::harvest::parser::CardParser;
use crate::harvest::runner::{CompletionReason, Harvester, HarvestRequest, HarvestResult};
use crate::harvest::view::LocatorScheme;

/// Creates one render surface per harvest run.
///
/// Each run owns its adapter exclusively: its own session and, if assigned,
/// its own proxy. The factory is where that provisioning happens.
#[async_trait]
pub trait AdapterFactory: Send + Sync + 'static {
    type Adapter: RenderAdapter + 'static;

    /// Open a fresh surface already positioned at the feed to harvest.
    async fn create(&self) -> Result<Self::Adapter, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Externally visible status of one harvest job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub records: usize,
    pub reason: Option<CompletionReason>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct JobEntry {
    status: JobStatus,
    cancel: watch::Sender<bool>,
    result: Option<HarvestResult>,
}

/// Schedules independent harvest runs with bounded concurrency.
///
/// Runs never share state: each gets its own adapter from the factory and
/// its own cancellation channel. A run that aborts is reported failed with
/// its partial results preserved, never discarded.
pub struct JobManager<F: AdapterFactory> {
    factory: Arc<F>,
    scheme: LocatorScheme,
    parser: CardParser,
    semaphore: Arc<Semaphore>,
    jobs: Arc<Mutex<HashMap<Uuid, JobEntry>>>,
}

impl<F: AdapterFactory> JobManager<F> {
    pub fn new(factory: F, scheme: LocatorScheme, parser: CardParser, max_concurrent: usize) -> Self {
        Self {
            factory: Arc::new(factory),
            scheme,
            parser,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue a harvest run. Returns immediately with the job id.
    pub async fn submit(&self, request: HarvestRequest) -> Uuid {
        let job_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(
                job_id,
                JobEntry {
                    status: JobStatus {
                        job_id,
                        state: JobState::Queued,
                        records: 0,
                        reason: None,
                        error: None,
                        started_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                    cancel: cancel_tx,
                    result: None,
                },
            );
        }

        let factory = self.factory.clone();
        let scheme = self.scheme.clone();
        let parser = self.parser.clone();
        let semaphore = self.semaphore.clone();
        let jobs = self.jobs.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return, // manager dropped
            };

            Self::update(&jobs, job_id, |status| {
                status.state = JobState::Running;
            })
            .await;
            info!("Job {} started", job_id);

            let adapter = match factory.create().await {
                Ok(adapter) => adapter,
                Err(e) => {
                    error!("Job {} failed to open a surface: {}", job_id, e);
                    Self::update(&jobs, job_id, |status| {
                        status.state = JobState::Failed;
                        status.error = Some(e.to_string());
                    })
                    .await;
                    return;
                }
            };

            let result = Harvester::new(adapter, scheme, parser, request)
                .with_cancel(cancel_rx)
                .run()
                .await;

            let mut jobs = jobs.lock().await;
            if let Some(entry) = jobs.get_mut(&job_id) {
                entry.status.records = result.records.len();
                entry.status.reason = Some(result.reason);
                entry.status.updated_at = Utc::now();
                if result.reason == CompletionReason::Aborted {
                    entry.status.state = JobState::Failed;
                    entry.status.error = result.failure.clone();
                } else {
                    entry.status.state = JobState::Completed;
                }
                entry.result = Some(result);
            }
            info!("Job {} finished", job_id);
        });

        job_id
    }

    /// Request cooperative cancellation. The run stops at its next cycle.
    pub async fn cancel(&self, job_id: Uuid) -> bool {
        let jobs = self.jobs.lock().await;
        match jobs.get(&job_id) {
            Some(entry) => entry.cancel.send(true).is_ok(),
            None => false,
        }
    }

    pub async fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.get(&job_id).map(|entry| entry.status.clone())
    }

    pub async fn list(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.values().map(|entry| entry.status.clone()).collect()
    }

    /// Take a finished job's result, leaving its status behind.
    pub async fn take_result(&self, job_id: Uuid) -> Option<HarvestResult> {
        let mut jobs = self.jobs.lock().await;
        jobs.get_mut(&job_id).and_then(|entry| entry.result.take())
    }

    async fn update<G>(jobs: &Mutex<HashMap<Uuid, JobEntry>>, job_id: Uuid, apply: G)
    where
        G: FnOnce(&mut JobStatus),
    {
        let mut jobs = jobs.lock().await;
        if let Some(entry) = jobs.get_mut(&job_id) {
            apply(&mut entry.status);
            entry.status.updated_at = Utc::now();
        }
    }
}
