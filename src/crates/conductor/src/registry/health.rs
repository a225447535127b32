//! Worker health scoring

use super::worker::WorkerMetrics;

/// Error rate only counts once a worker has finished this many jobs
const MIN_JOBS_FOR_ERROR_RATE: u64 = 10;

/// Score a worker's health from its latest metrics.
///
/// Starts at 100 and subtracts for memory pressure (30/15/5 above
/// 90/75/60 %), CPU load (20/10 above 90/75 %) and error rate (20/10 above
/// 50/20 %, once at least ten jobs have finished). Always within 0..=100.
pub fn calculate_health(metrics: &WorkerMetrics) -> u8 {
    let mut score: i32 = 100;

    let memory = metrics.memory_percent;
    if memory > 90.0 {
        score -= 30;
    } else if memory > 75.0 {
        score -= 15;
    } else if memory > 60.0 {
        score -= 5;
    }

    let cpu = metrics.cpu_percent;
    if cpu > 90.0 {
        score -= 20;
    } else if cpu > 75.0 {
        score -= 10;
    }

    if metrics.finished_jobs() >= MIN_JOBS_FOR_ERROR_RATE {
        if let Some(rate) = metrics.error_rate() {
            if rate > 0.5 {
                score -= 20;
            } else if rate > 0.2 {
                score -= 10;
            }
        }
    }

    score.clamp(0, 100) as u8
}
