//! Per-resource FIFO job queue.
//!
//! Jobs submitted under the same key run one after another in submission
//! order; different keys run concurrently. Each attempt is bounded by the
//! configured timeout, and a fatal failure (or timeout) is retried once
//! when enabled. User errors are never retried.
//!
//! A lane is a task draining one key's channel. It exits once nothing has
//! been queued for `lane_idle_timeout`, removing itself from the lane map;
//! the next job on that key starts a fresh lane.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, JobResult};

type QueuedJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub job_timeout: Duration,
    pub retry_fatal: bool,
    pub lane_idle_timeout: Duration,
}

type Lanes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<QueuedJob>>>>;

pub struct JobQueue {
    config: QueueConfig,
    lanes: Lanes,
    cancel: CancellationToken,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Enqueue `job` behind everything already queued under `key` and wait
    /// for its result. `job` is called again for a retry.
    pub async fn run<T, F, Fut>(&self, key: &str, name: &'static str, job: F) -> JobResult<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let config = self.config;
        let lane_key = key.to_string();
        let task: QueuedJob = Box::new(move || {
            Box::pin(async move {
                let result = execute(&lane_key, name, &job, config).await;
                let _ = tx.send(result);
            })
        });

        self.enqueue(key, task).await?;

        rx.await
            .map_err(|_| JobError::fatal(format!("Job {name} on {key} was dropped")))?
    }

    /// Stop every lane after its running job finishes. Queued jobs are
    /// dropped and their callers get a fatal error.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Number of lanes currently alive.
    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }

    /// Send `task` to the lane of `key`, starting the lane if needed. The
    /// map lock is held across the send, so an idle lane cannot exit
    /// between being looked up and receiving the task.
    async fn enqueue(&self, key: &str, task: QueuedJob) -> JobResult<()> {
        if self.cancel.is_cancelled() {
            return Err(JobError::fatal(format!("Job queue for {key} is closed")));
        }
        let mut lanes = self.lanes.lock().await;
        let sender = match lanes.get(key).filter(|s| !s.is_closed()) {
            Some(sender) => sender.clone(),
            None => {
                let sender = self.spawn_lane(key);
                lanes.insert(key.to_string(), sender.clone());
                sender
            }
        };
        sender
            .send(task)
            .map_err(|_| JobError::fatal(format!("Job queue for {key} is closed")))
    }

    fn spawn_lane(&self, key: &str) -> mpsc::UnboundedSender<QueuedJob> {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedJob>();
        let cancel = self.cancel.clone();
        let lanes = self.lanes.clone();
        let idle = self.config.lane_idle_timeout;
        let lane = key.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(lane = %lane, "Job lane stopping");
                        break;
                    }
                    job = rx.recv() => match job {
                        Some(job) => job().await,
                        None => break,
                    },
                    _ = tokio::time::sleep(idle) => {
                        let mut map = lanes.lock().await;
                        match rx.try_recv() {
                            Ok(job) => {
                                drop(map);
                                job().await;
                            }
                            Err(_) => {
                                map.remove(&lane);
                                tracing::debug!(lane = %lane, "Job lane idle, closing");
                                break;
                            }
                        }
                    }
                }
            }
        });
        tx
    }
}

async fn execute<T, F, Fut>(key: &str, name: &'static str, job: &F, config: QueueConfig) -> JobResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = JobResult<T>>,
{
    let attempts = if config.retry_fatal { 2 } else { 1 };
    let mut attempt = 1;
    loop {
        let error = match tokio::time::timeout(config.job_timeout, job()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(JobError::User(e))) => {
                tracing::info!(job = name, key, message = %e.message, "Job rejected");
                return Err(JobError::User(e));
            }
            Ok(Err(JobError::Fatal(e))) => e,
            Err(_) => {
                // Dropping the timed-out future released any lock it held.
                tracing::warn!(
                    job = name,
                    key,
                    timeout_ms = config.job_timeout.as_millis() as u64,
                    "Job timed out, its locks were force-released"
                );
                anyhow::anyhow!("Job {name} timed out after {:?}", config.job_timeout)
            }
        };

        if attempt >= attempts {
            tracing::error!(job = name, key, attempt, error = %error, "Job failed");
            return Err(JobError::Fatal(error));
        }
        tracing::warn!(job = name, key, attempt, error = %error, "Job failed, retrying");
        attempt += 1;
    }
}
