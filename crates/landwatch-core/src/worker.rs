//! Worker pool pulling job ids from the queue.
//!
//! Each worker dequeues one id at a time (high lane first), awaits
//! [`JobPipeline::run`] for it and acknowledges it on the queue so the id can
//! be submitted again. Workers run as separate tokio tasks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use landwatch_state::{JobId, JobQueue};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::WorkerConfig;
use crate::metrics::METRICS;
use crate::pipeline::{JobPipeline, JobReport};

/// Reports gathered by one or more workers.
#[derive(Debug, Clone, Default)]
pub struct DrainSummary {
    pub reports: Vec<JobReport>,
    /// Runs that returned `Err`: job id and error text
    pub failures: Vec<(JobId, String)>,
}

impl DrainSummary {
    fn merge(&mut self, other: DrainSummary) {
        self.reports.extend(other.reports);
        self.failures.extend(other.failures);
    }

    pub fn processed(&self) -> usize {
        self.reports.len() + self.failures.len()
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    pipeline: JobPipeline,
    queue: Arc<dyn JobQueue>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(pipeline: JobPipeline, queue: Arc<dyn JobQueue>, config: WorkerConfig) -> Self {
        Self {
            pipeline,
            queue,
            config,
        }
    }

    fn worker_count(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Run workers until the queue is empty, then return every report.
    pub async fn drain(&self) -> DrainSummary {
        let handles: Vec<JoinHandle<DrainSummary>> = (0..self.worker_count())
            .map(|worker| {
                let pool = self.clone();
                tokio::spawn(
                    async move { pool.work(None).await }
                        .instrument(tracing::info_span!("landwatch.worker", worker)),
                )
            })
            .collect();

        let mut summary = DrainSummary::default();
        for joined in join_all(handles).await {
            match joined {
                Ok(part) => summary.merge(part),
                Err(e) => error!(error = %e, "worker task panicked"),
            }
        }
        info!(processed = summary.processed(), "queue drained");
        METRICS.flush();
        summary
    }

    /// Start long-running workers that poll the queue until `shutdown`
    /// becomes `true` or its sender is dropped.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<DrainSummary>> {
        (0..self.worker_count())
            .map(|worker| {
                let pool = self.clone();
                let rx = shutdown.clone();
                tokio::spawn(
                    async move { pool.work(Some(rx)).await }
                        .instrument(tracing::info_span!("landwatch.worker", worker)),
                )
            })
            .collect()
    }

    /// Worker loop. Without a shutdown channel it exits on the first empty
    /// dequeue.
    async fn work(&self, mut shutdown: Option<watch::Receiver<bool>>) -> DrainSummary {
        let mut summary = DrainSummary::default();
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
                break;
            }

            let next = match self.queue.dequeue().await {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "dequeue failed");
                    None
                }
            };

            let Some(job_id) = next else {
                let Some(rx) = shutdown.as_mut() else {
                    break;
                };
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            debug!(job_id = %job_id, "dequeued job");
            match self.pipeline.run(&job_id).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "job run aborted");
                    summary.failures.push((job_id.clone(), e.to_string()));
                }
            }
            if let Err(e) = self.queue.complete(&job_id).await {
                warn!(job_id = %job_id, error = %e, "failed to acknowledge job");
            }
        }
        summary
    }
}
