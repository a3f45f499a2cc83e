//! Daily scheduling of the pipeline.

use crate::console::Console;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One unit of scheduled work.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// Time left until the next local midnight after `now`.
///
/// Falls back to a full day when that midnight does not exist locally.
pub fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest());

    match next {
        Some(next) => (next - now.clone()).to_std().unwrap_or(DAY),
        None => DAY,
    }
}

/// Runs a job once per day at local midnight until cancelled.
pub struct Scheduler {
    poll: Duration,
    console: Console,
}

impl Scheduler {
    /// `poll` is how often the cooldown status line is refreshed.
    pub fn new(poll: Duration, console: Console) -> Self {
        Self { poll, console }
    }

    /// Serves `job` until `cancel` fires. With `run_now` the first run
    /// starts immediately instead of at the next midnight.
    ///
    /// A run in progress is finished before cancellation is observed. A
    /// failed run is logged and the next one is still scheduled.
    pub async fn serve<J: Job + ?Sized>(&self, job: &J, run_now: bool, cancel: CancellationToken) {
        let mut wait = !run_now;

        loop {
            if wait && !self.cool_down(&cancel).await {
                break;
            }
            wait = true;

            if cancel.is_cancelled() {
                break;
            }

            info!("Starting scheduled run");
            match job.run().await {
                Ok(()) => info!("Scheduled run finished"),
                Err(e) => error!(error = ?e, "Scheduled run failed"),
            }
        }

        self.console.clear_line();
        info!("Scheduler stopped");
    }

    /// Waits until the next local midnight, refreshing the status line.
    ///
    /// Returns false if cancelled first.
    async fn cool_down(&self, cancel: &CancellationToken) -> bool {
        let target = tokio::time::Instant::now() + until_next_midnight(&chrono::Local::now());

        loop {
            let now = tokio::time::Instant::now();
            if now >= target {
                self.console.clear_line();
                return true;
            }
            let remaining = target - now;
            self.console.cooldown(remaining);

            tokio::select! {
                _ = tokio::time::sleep(remaining.min(self.poll)) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: AtomicUsize,
        cancel: CancellationToken,
        fail: bool,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            if self.fail {
                anyhow::bail!("ranking unavailable");
            }
            Ok(())
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Duration::from_millis(10), Console::with_colors(false))
    }

    #[test]
    fn test_until_next_midnight() {
        let now = Utc.with_ymd_and_hms(2019, 10, 24, 22, 30, 0).unwrap();
        assert_eq!(until_next_midnight(&now), Duration::from_secs(90 * 60));

        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2019, 12, 31, 0, 0, 1).unwrap();
        assert_eq!(until_next_midnight(&now), DAY - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_run_now_runs_before_waiting() {
        let cancel = CancellationToken::new();
        let job = CountingJob {
            runs: AtomicUsize::new(0),
            cancel: cancel.clone(),
            fail: false,
        };

        scheduler().serve(&job, true, cancel).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_escape() {
        let cancel = CancellationToken::new();
        let job = CountingJob {
            runs: AtomicUsize::new(0),
            cancel: cancel.clone(),
            fail: true,
        };

        scheduler().serve(&job, true, cancel).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let job = CountingJob {
            runs: AtomicUsize::new(0),
            cancel: cancel.clone(),
            fail: false,
        };

        scheduler().serve(&job, true, cancel.clone()).await;
        scheduler().serve(&job, false, cancel).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
