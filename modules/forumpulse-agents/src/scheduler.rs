//! Job scheduler: one repeating tokio task per worker, fixed intervals,
//! failure isolation, and exponential retry for the jobs that talk to
//! flaky upstreams.
//!
//! The next run of a job waits the full interval after the previous run
//! returns, so a job never overlaps itself. Distinct jobs run concurrently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::deps::Deps;
use crate::{
    author_integrity, backfill, metric_gardener, metric_mapper, moderator, normalizer,
    opinion_analyst, rollup_accountant, supervisor, thread_harvester, trend_scout,
};

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    TrendScout,
    ThreadHarvester,
    Backfill,
    Normalizer,
    AuthorIntegrity,
    OpinionAnalyst,
    Moderator,
    MetricMapper,
    MetricGardener,
    RollupAccountant,
    WatchlistSweep,
}

impl Job {
    pub const ALL: [Job; 11] = [
        Job::TrendScout,
        Job::ThreadHarvester,
        Job::Backfill,
        Job::Normalizer,
        Job::AuthorIntegrity,
        Job::OpinionAnalyst,
        Job::Moderator,
        Job::MetricMapper,
        Job::MetricGardener,
        Job::RollupAccountant,
        Job::WatchlistSweep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Job::TrendScout => "trend-scout",
            Job::ThreadHarvester => "thread-harvester",
            Job::Backfill => "backfill",
            Job::Normalizer => "normalizer",
            Job::AuthorIntegrity => "author-integrity",
            Job::OpinionAnalyst => "opinion-analyst",
            Job::Moderator => "moderator",
            Job::MetricMapper => "metric-mapper",
            Job::MetricGardener => "metric-gardener",
            Job::RollupAccountant => "rollup-accountant",
            Job::WatchlistSweep => "watchlist-sweep",
        }
    }

    pub fn parse(s: &str) -> Option<Job> {
        Job::ALL.iter().copied().find(|j| j.name() == s)
    }

    pub fn interval(&self) -> Duration {
        let secs = match self {
            Job::TrendScout => 90,
            Job::ThreadHarvester => 20,
            Job::Backfill => 300,
            Job::Normalizer => 15,
            Job::AuthorIntegrity => 60,
            Job::OpinionAnalyst => 20,
            Job::Moderator => 30,
            Job::MetricMapper => 20,
            Job::MetricGardener => 3_600,
            Job::RollupAccountant => 45,
            Job::WatchlistSweep => 300,
        };
        Duration::from_secs(secs)
    }

    /// Jobs whose failures are dominated by transient upstream errors opt
    /// into the retry policy; the pure store-side jobs just wait for their
    /// next interval.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Job::TrendScout
                | Job::ThreadHarvester
                | Job::Backfill
                | Job::OpinionAnalyst
                | Job::MetricMapper
                | Job::MetricGardener
        )
    }

    pub async fn run(&self, deps: &Deps, now: i64) -> Result<usize> {
        match self {
            Job::TrendScout => trend_scout::run(deps, now).await,
            Job::ThreadHarvester => thread_harvester::run(deps, now).await,
            Job::Backfill => backfill::run(deps, now).await,
            Job::Normalizer => normalizer::run(deps, now).await,
            Job::AuthorIntegrity => author_integrity::run(deps, now).await,
            Job::OpinionAnalyst => opinion_analyst::run(deps, now).await,
            Job::Moderator => moderator::run(deps, now).await,
            Job::MetricMapper => metric_mapper::run(deps, now).await,
            Job::MetricGardener => metric_gardener::run(deps, now).await,
            Job::RollupAccountant => rollup_accountant::run(deps, now).await,
            Job::WatchlistSweep => supervisor::run(deps, now).await,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff with a ceiling: 10s, 20s, 40s, ... capped at 120s,
/// at most 3 attempts total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(10),
            cap: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.cap)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    deps: Arc<Deps>,
    retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(deps: Arc<Deps>) -> Self {
        Self {
            deps,
            retry: RetryPolicy::default(),
        }
    }

    /// Spawn every job loop and run until the process is stopped.
    pub async fn run(self) {
        info!(jobs = Job::ALL.len(), "scheduler starting");
        let mut handles = Vec::new();
        for job in Job::ALL {
            let deps = Arc::clone(&self.deps);
            let retry = self.retry;
            handles.push(tokio::spawn(async move {
                job_loop(job, deps, retry).await;
            }));
        }
        for handle in handles {
            // Job loops never return; a join error means a panic escaped.
            if let Err(error) = handle.await {
                error!(%error, "job loop aborted");
            }
        }
    }
}

async fn job_loop(job: Job, deps: Arc<Deps>, retry: RetryPolicy) {
    loop {
        let now = chrono::Utc::now().timestamp();
        match run_with_retry(job, &deps, retry, now).await {
            Ok(processed) => {
                if processed > 0 {
                    info!(job = job.name(), processed, "job run complete");
                } else {
                    debug!(job = job.name(), "job run complete, nothing to do");
                }
            }
            Err(error) => {
                // Failure isolation: log and keep the schedule.
                error!(job = job.name(), %error, "job run failed");
            }
        }
        tokio::time::sleep(job.interval()).await;
    }
}

async fn run_with_retry(
    job: Job,
    deps: &Deps,
    retry: RetryPolicy,
    now: i64,
) -> Result<usize> {
    let attempts = if job.retryable() { retry.max_attempts } else { 1 };
    let mut attempt = 1;
    loop {
        match job.run(deps, now).await {
            Ok(processed) => return Ok(processed),
            Err(error) if attempt < attempts => {
                let delay = retry.delay(attempt);
                warn!(
                    job = job.name(),
                    attempt,
                    delay_secs = delay.as_secs(),
                    %error,
                    "job attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
