use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::{
        Semaphore,
        mpsc::{Receiver, Sender, channel},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{
    domain::Submission,
    pipeline::judging::{JudgeError, judge_submission},
    store::{StoreError, SubmissionStore},
    traits::sandbox::Sandbox,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    pub submission_id: Uuid,
    /// Consecutive infra failures so far.
    pub attempt: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("judge queue is closed")]
    Closed,
}

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub max_infra_retries: u32,
    pub max_output_bytes: usize,
    pub retry_backoff: Duration,
}

/// Producer side of the judge queue, plus the cancellation handles of the
/// submissions currently being judged.
#[derive(Clone, Debug)]
pub struct JudgeQueue {
    job_tx: Sender<Job>,
    in_flight: Arc<DashMap<Uuid, CancellationToken>>,
}

impl JudgeQueue {
    pub fn new(capacity: usize) -> (Self, Receiver<Job>) {
        let (job_tx, job_rx) = channel(capacity);
        let queue = Self {
            job_tx,
            in_flight: Arc::new(DashMap::new()),
        };
        (queue, job_rx)
    }

    pub async fn enqueue(&self, submission_id: Uuid) -> Result<(), QueueError> {
        self.send(Job {
            submission_id,
            attempt: 0,
        })
        .await
    }

    async fn send(&self, job: Job) -> Result<(), QueueError> {
        self.job_tx.send(job).await.map_err(|_| QueueError::Closed)
    }

    /// Stops the judge run of `submission_id` if one is active. The worker
    /// kills the running program and puts the submission back to PENDING.
    pub fn cancel(&self, submission_id: Uuid) -> bool {
        match self.in_flight.get(&submission_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_in_flight(&self, submission_id: Uuid) -> bool {
        self.in_flight.contains_key(&submission_id)
    }
}

#[derive(Clone, Debug)]
struct JudgingContext {
    queue: JudgeQueue,
    store: SubmissionStore,
    sandbox: Arc<dyn Sandbox>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
}

/// Pulls jobs and judges each on its own task, never more than
/// `settings.concurrency` at a time.
#[tracing::instrument(skip_all)]
pub fn handle_judging(
    queue: JudgeQueue,
    mut job_rx: Receiver<Job>,
    store: SubmissionStore,
    sandbox: Arc<dyn Sandbox>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let ctx = JudgingContext {
        queue,
        store,
        sandbox,
        settings,
        shutdown,
    };

    tokio::spawn(async move {
        loop {
            let job = tokio::select! {
                _ = ctx.shutdown.cancelled() => break,
                job = job_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = ctx.shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let ctx = ctx.clone();
            tokio::spawn(async move {
                process_job(job, &ctx).await;
                drop(permit);
            });
        }

        tracing::info!("Judge queue stopped");
    })
}

#[tracing::instrument(skip(ctx), fields(submission_id = %job.submission_id, attempt = job.attempt))]
async fn process_job(job: Job, ctx: &JudgingContext) {
    let id = job.submission_id;

    // Registered before the claim so a delete racing the claim still finds
    // something to cancel.
    let token = match ctx.queue.in_flight.entry(id) {
        Entry::Occupied(_) => {
            tracing::debug!("Skipping job: already being judged");
            return;
        }
        Entry::Vacant(slot) => {
            let token = ctx.shutdown.child_token();
            slot.insert(token.clone());
            token
        }
    };

    let submission = match ctx.store.claim(id) {
        Ok(submission) => submission,
        Err(e) => {
            ctx.queue.in_flight.remove(&id);
            tracing::debug!("Skipping job: {}", e);
            return;
        }
    };

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Err(JudgeError::Cancelled),
        outcomes = judge_submission(
            ctx.sandbox.as_ref(),
            &submission,
            ctx.settings.max_output_bytes,
        ) => outcomes.map_err(JudgeError::from),
    };

    ctx.queue.in_flight.remove(&id);

    match result {
        Ok(outcomes) => match ctx.store.update(id, |s| s.complete(outcomes)) {
            Ok(done) => tracing::info!(
                "Submission judged: {} ({}/{} passed)",
                done.status,
                done.test_cases_passed(),
                done.test_cases_total()
            ),
            Err(e) => log_store_error(e),
        },
        Err(JudgeError::Cancelled) => {
            tracing::warn!("Judging cancelled, returning submission to the queue");
            if let Err(e) = ctx.store.update(id, Submission::release) {
                log_store_error(e);
            }
        }
        Err(JudgeError::Sandbox(e)) => {
            let attempt = job.attempt + 1;
            if attempt < ctx.settings.max_infra_retries {
                tracing::error!("Infra failure, retrying ({}): {}", attempt, e);
                match ctx.store.update(id, Submission::release) {
                    Ok(_) => schedule_retry(ctx, Job { attempt, ..job }),
                    Err(e) => log_store_error(e),
                }
            } else {
                tracing::error!("Infra failure, giving up after {} attempts: {}", attempt, e);
                if let Err(e) = ctx.store.update(id, Submission::fail_system) {
                    log_store_error(e);
                }
            }
        }
    }
}

/// Re-enqueues from a detached task so the worker releases its permit before
/// waiting on a possibly full queue.
fn schedule_retry(ctx: &JudgingContext, job: Job) {
    let queue = ctx.queue.clone();
    let backoff = ctx.settings.retry_backoff * job.attempt;
    tokio::spawn(async move {
        tokio::time::sleep(backoff).await;
        if let Err(e) = queue.send(job).await {
            tracing::error!("Failed to requeue {}: {}", job.submission_id, e);
        }
    });
}

fn log_store_error(error: StoreError) {
    match error {
        // Deleted while being judged.
        StoreError::NotFound(id) => tracing::debug!("Submission {} is gone", id),
        e => tracing::error!("Failed to persist judge result: {}", e),
    }
}
