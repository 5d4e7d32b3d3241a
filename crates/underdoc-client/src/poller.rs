use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use underdoc_core::config::PollPolicy;
use underdoc_core::error::{Result, UnderdocError};
use underdoc_core::job::{Job, JobId, JobStatus};
use underdoc_core::transport::{RawResponse, Transport, TransportRequest};

use crate::backoff::Backoff;
use crate::envelope::Envelope;

pub fn status_path(job_id: &JobId) -> String {
    format!("jobs/{}", urlencoding::encode(job_id.as_str()))
}

/// Drives a [`Job`] to a terminal status by polling the status endpoint.
#[derive(Clone)]
pub struct CompletionWaiter {
    transport: Arc<dyn Transport>,
    policy: PollPolicy,
}

impl CompletionWaiter {
    pub fn new(transport: Arc<dyn Transport>, policy: PollPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// One status query. Updates `job` with the observed status, rejecting
    /// any backwards transition.
    pub async fn poll_once(&self, job: &mut Job) -> Result<RawResponse> {
        let raw = self
            .transport
            .send(TransportRequest::get(status_path(job.id())))
            .await?;
        let envelope = Envelope::read(&raw)?;

        if let Some(reported) = &envelope.job_id {
            if reported != job.id() {
                return Err(UnderdocError::Protocol(format!(
                    "status query for job {} answered for job {reported}",
                    job.id()
                )));
            }
        }

        let status = envelope.status.ok_or_else(|| {
            UnderdocError::Protocol(format!("status response for job {} has no status", job.id()))
        })?;

        let previous = job.status();
        if status == JobStatus::Succeeded {
            job.succeed(raw.clone())?;
        } else {
            job.observe(status)?;
        }
        if previous != status {
            debug!(job_id = %job.id(), from = %previous, to = %status, "Job status changed");
        }

        if status == JobStatus::Failed {
            return Err(UnderdocError::JobFailed {
                job_id: job.id().to_string(),
                reason: envelope.failure_reason(),
            });
        }

        Ok(raw)
    }

    /// Waits with the configured budget and starting interval.
    pub async fn wait_default(&self, job: &mut Job) -> Result<RawResponse> {
        self.wait(job, self.policy.max_wait, self.policy.initial_interval)
            .await
    }

    /// Polls until the job succeeds, fails, or `max_wait` elapses. The interval
    /// starts at `poll_interval` and grows by the policy multiplier up to its cap.
    /// Returns the terminal success payload.
    #[instrument(skip(self, job), fields(job_id = %job.id()))]
    pub async fn wait(
        &self,
        job: &mut Job,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<RawResponse> {
        if let Some(payload) = job.terminal_payload() {
            return Ok(payload.clone());
        }

        let started = Instant::now();
        // A budget too large to represent means no deadline at all.
        let deadline = started.checked_add(max_wait);
        let mut backoff = Backoff::for_polling(&self.policy, poll_interval);
        let mut polls = 0u32;

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|r| r.is_zero()) {
                return Err(self.timed_out(job, started, polls));
            }

            // The deadline also bounds an in-flight poll and its retries.
            let raw = match remaining {
                Some(remaining) => match tokio::time::timeout(remaining, self.poll_once(job)).await
                {
                    Ok(result) => result?,
                    Err(_) => return Err(self.timed_out(job, started, polls)),
                },
                None => self.poll_once(job).await?,
            };
            polls += 1;

            if job.status() == JobStatus::Succeeded {
                info!(
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job succeeded"
                );
                return Ok(raw);
            }

            let mut delay = backoff.next_delay();
            if let Some(deadline) = deadline {
                delay = delay.min(deadline.saturating_duration_since(Instant::now()));
            }
            debug!(
                polls,
                status = %job.status(),
                delay_ms = delay.as_millis() as u64,
                "Job not finished yet"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn timed_out(&self, job: &Job, started: Instant, polls: u32) -> UnderdocError {
        let waited = started.elapsed();
        warn!(
            job_id = %job.id(),
            polls,
            status = %job.status(),
            waited_ms = waited.as_millis() as u64,
            "Gave up waiting for job"
        );
        UnderdocError::Timeout {
            job_id: job.id().to_string(),
            waited,
        }
    }
}
