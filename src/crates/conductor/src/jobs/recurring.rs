//! Cron-scheduled repeatable jobs

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::model::NewJob;
use super::queue::JobQueue;
use crate::{ConductorError, Result};

/// Parse a cron expression.
///
/// Accepts the classic five-field form (minute precision) as well as the
/// six/seven-field form with seconds.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ConductorError::Validation("Cron expression is empty".into()));
    }
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| ConductorError::Validation(format!("Invalid cron expression '{}': {}", expr, e)))
}

/// Next firing time of `expr` strictly after `after`
pub fn next_cron_run(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_cron(expr)?
        .after(&after)
        .next()
        .ok_or_else(|| ConductorError::Validation(format!("Cron expression '{}' never fires", expr)))
}

/// Enqueues repeatable jobs when they fall due
pub struct RecurringScheduler {
    queue: Arc<dyn JobQueue>,
    interval: Duration,
}

impl RecurringScheduler {
    pub fn new(queue: Arc<dyn JobQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Fire every repeatable due at `now` and promote elapsed delayed jobs.
    ///
    /// Each due repeatable enqueues exactly one job per tick, even when
    /// several firings were missed, then moves to its next firing after
    /// `now`. Each enqueued job gets its own execution id. Returns the
    /// number of jobs enqueued.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let promoted = self.queue.promote_due_delayed(now).await?;
        if promoted > 0 {
            tracing::debug!("Promoted {} delayed jobs", promoted);
        }

        let mut fired = 0;
        for repeatable in self.queue.repeatables().await? {
            if repeatable.next_run > now {
                continue;
            }

            let next_run = match next_cron_run(&repeatable.cron, now) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!("Repeatable job {} has a bad schedule: {}", repeatable.key, e);
                    continue;
                }
            };

            let mut payload = repeatable.payload.clone();
            payload.execution_id = uuid::Uuid::new_v4().to_string();
            let mut job = NewJob::new(repeatable.job_type.clone(), payload).with_priority(repeatable.priority);
            job.repeat_key = Some(repeatable.key.clone());
            let added = self.queue.add(job).await?;
            self.queue
                .set_repeatable_next_run(&repeatable.key, next_run)
                .await?;

            tracing::info!(
                "Repeatable {} enqueued job {}, next run at {}",
                repeatable.key,
                added.id,
                next_run
            );
            fired += 1;
        }
        Ok(fired)
    }

    /// Run [`tick`](Self::tick) on the configured interval
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.tick(Utc::now()).await {
                    tracing::warn!("Recurring job tick failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::{job_types, JobPayload, JobPriority, JobState, RepeatableJob};
    use crate::jobs::queue::InMemoryJobQueue;
    use chrono::TimeZone;

    #[test]
    fn test_parse_five_and_six_field() {
        assert!(parse_cron("*/5 * * * *").is_ok());
        assert!(parse_cron("0 */5 * * * *").is_ok());
        assert!(matches!(
            parse_cron("every five minutes"),
            Err(ConductorError::Validation(_))
        ));
        assert!(parse_cron("  ").is_err());
    }

    #[test]
    fn test_next_run_is_after() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 2, 30).unwrap();
        let next = next_cron_run("*/5 * * * *", base).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap());
    }

    #[tokio::test]
    async fn test_tick_fires_due_repeatable_once() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        queue
            .add_repeatable(RepeatableJob {
                key: "workflow:0 * * * *:abc".into(),
                job_type: job_types::WORKFLOW.into(),
                payload: JobPayload::default(),
                priority: JobPriority::Low,
                cron: "0 * * * *".into(),
                next_run: now - chrono::Duration::hours(3),
                created_at: now - chrono::Duration::days(1),
            })
            .await
            .unwrap();

        let scheduler = RecurringScheduler::new(queue.clone(), Duration::from_secs(30));
        assert_eq!(scheduler.tick(now).await.unwrap(), 1);
        assert_eq!(scheduler.tick(now).await.unwrap(), 0);

        let waiting = queue.list(JobState::Waiting, 0, 10).await.unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].priority, JobPriority::Low);
        assert_eq!(waiting[0].repeat_key.as_deref(), Some("workflow:0 * * * *:abc"));

        let repeatables = queue.repeatables().await.unwrap();
        assert_eq!(repeatables[0].next_run, now + chrono::Duration::hours(1));

        let later = now + chrono::Duration::hours(1);
        assert_eq!(scheduler.tick(later).await.unwrap(), 1);
        let fired = queue.list(JobState::Waiting, 0, 10).await.unwrap();
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|job| !job.payload.execution_id.is_empty()));
        assert_ne!(fired[0].payload.execution_id, fired[1].payload.execution_id);
    }
}
