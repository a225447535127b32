//! Job, priority and state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ConductorError;

/// Well-known job types
pub mod job_types {
    pub const WORKFLOW: &str = "workflow";
    pub const IMAGE_GENERATION: &str = "image-generation";
    pub const EXPORT: &str = "export";
    pub const MEMORY_INTENSIVE: &str = "memory-intensive";
}

/// Job priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Sort rank; lower ranks are taken from the queue first
    pub fn rank(&self) -> i64 {
        match self {
            JobPriority::Critical => 1,
            JobPriority::High => 2,
            JobPriority::Normal => 3,
            JobPriority::Low => 4,
        }
    }

    /// Inverse of [`rank`](Self::rank); unknown ranks become `Normal`
    pub fn from_rank(rank: i64) -> Self {
        match rank {
            i64::MIN..=1 => JobPriority::Critical,
            2 => JobPriority::High,
            3 => JobPriority::Normal,
            _ => JobPriority::Low,
        }
    }

    /// Whether routing should prefer high-priority workers
    pub fn is_elevated(&self) -> bool {
        matches!(self, JobPriority::Critical | JobPriority::High)
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPriority::Critical => write!(f, "critical"),
            JobPriority::High => write!(f, "high"),
            JobPriority::Normal => write!(f, "normal"),
            JobPriority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for JobPriority {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(JobPriority::Critical),
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(ConductorError::Validation(format!("Unknown priority: {}", other))),
        }
    }
}

/// Lifecycle state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
        JobState::Delayed,
    ];

    /// Whether a job may move from `self` to `next`.
    ///
    /// Transitions only move forward, except an explicit retry
    /// (failed -> waiting), explicit delays (waiting <-> delayed) and a
    /// requeue of a job a worker could not accept (active -> delayed).
    /// Completed is terminal.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Waiting, Active)
                | (Waiting, Delayed)
                | (Delayed, Waiting)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Delayed)
                | (Failed, Waiting)
        )
    }

    /// Whether the job has finished running
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Delayed => write!(f, "delayed"),
        }
    }
}

impl FromStr for JobState {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .copied()
            .find(|state| state.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| ConductorError::Validation(format!("Unknown job state: {}", s)))
    }
}

/// What a worker needs to run a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Execution this job drives
    #[serde(default)]
    pub execution_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Named references to the engines (providers) the nodes use
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub engines: BTreeMap<String, String>,

    /// Workflow graph (`{"nodes": [...], "edges": [...]}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<serde_json::Value>,

    /// Execution inputs
    #[serde(default)]
    pub inputs: serde_json::Value,

    /// Free-form execution options
    #[serde(default)]
    pub options: serde_json::Value,
}

/// A job in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub state: JobState,
    pub attempts_made: u32,
    pub delay_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    pub return_value: Option<serde_json::Value>,
    pub worker_id: Option<String>,
    pub repeat_key: Option<String>,
}

impl Job {
    /// Build a waiting job with a fresh id
    pub fn new(job_type: impl Into<String>, payload: JobPayload, priority: JobPriority) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            payload,
            priority,
            state: JobState::Waiting,
            attempts_made: 0,
            delay_until: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            failed_reason: None,
            return_value: None,
            worker_id: None,
            repeat_key: None,
        }
    }

    /// Owning user, if the payload names one
    pub fn user_id(&self) -> Option<&str> {
        self.payload.user_id.as_deref()
    }

    /// Move to `next`, rejecting transitions [`JobState::can_transition_to`] forbids
    pub fn transition(&mut self, next: JobState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ConductorError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Parameters for enqueueing a job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub delay: Option<std::time::Duration>,
    pub repeat_key: Option<String>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: JobPriority::Normal,
            delay: None,
            repeat_key: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Materialise the job, delayed if a positive delay was requested
    pub fn into_job(self) -> Job {
        let mut job = Job::new(self.job_type, self.payload, self.priority);
        job.repeat_key = self.repeat_key;
        if let Some(delay) = self.delay.filter(|d| !d.is_zero()) {
            job.state = JobState::Delayed;
            job.delay_until = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| job.created_at + d);
        }
        job
    }
}

/// A cron-scheduled job template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatableJob {
    /// `type:cron:hash`
    pub key: String,
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: JobPriority,
    pub cron: String,
    pub next_run: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Job counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

impl JobCounts {
    pub fn total(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }

    pub fn set(&mut self, state: JobState, count: u64) {
        match state {
            JobState::Waiting => self.waiting = count,
            JobState::Active => self.active = count,
            JobState::Completed => self.completed = count,
            JobState::Failed => self.failed = count,
            JobState::Delayed => self.delayed = count,
        }
    }
}
