use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UnderdocError};
use crate::transport::RawResponse;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    /// Statuses only move forward; a terminal status never changes.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side view of a service job. The service owns the state; the client
/// only records what polling reports.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    submitted_at: DateTime<Utc>,
    terminal_payload: Option<RawResponse>,
}

impl Job {
    pub fn new(id: JobId, status: JobStatus) -> Self {
        Self {
            id,
            status,
            submitted_at: Utc::now(),
            terminal_payload: None,
        }
    }

    /// A job the service already finished during submission.
    pub fn completed(id: JobId, payload: RawResponse) -> Self {
        Self {
            id,
            status: JobStatus::Succeeded,
            submitted_at: Utc::now(),
            terminal_payload: Some(payload),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Terminal success payload already known without polling.
    pub fn terminal_payload(&self) -> Option<&RawResponse> {
        self.terminal_payload.as_ref()
    }

    /// Records a polled status, failing on any backwards transition.
    pub fn observe(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(UnderdocError::Protocol(format!(
                "job {} moved from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Records a polled success and keeps its payload so later reads need no
    /// further polling.
    pub fn succeed(&mut self, payload: RawResponse) -> Result<()> {
        self.observe(JobStatus::Succeeded)?;
        self.terminal_payload = Some(payload);
        Ok(())
    }
}
