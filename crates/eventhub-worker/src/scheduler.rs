//! Fixed-interval scheduler for periodic background jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info, warn};

use eventhub_core::error::AppError;
use eventhub_service::license::LicenseService;

use crate::jobs::{LicenseReaperJob, PeriodicJob, REAP_INTERVAL};

/// What happened on one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous run was still in progress; this tick was dropped.
    Skipped,
    /// The job ran and processed this many items.
    Completed(u64),
    /// The job ran and returned an error.
    Failed,
}

/// Runs a job at most once at a time.
///
/// A tick that arrives while a run is in flight is skipped rather than
/// queued. Errors are logged and swallowed so the next tick still runs.
/// Once closed, every tick is skipped.
#[derive(Debug, Clone)]
pub struct JobRunner {
    job: Arc<dyn PeriodicJob>,
    /// Held for the duration of a run.
    gate: Arc<Mutex<()>>,
    closed: Arc<AtomicBool>,
}

impl JobRunner {
    /// Wrap a job.
    pub fn new(job: Arc<dyn PeriodicJob>) -> Self {
        Self {
            job,
            gate: Arc::new(Mutex::new(())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the wrapped job.
    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    /// Run the job once unless a run is already in progress.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_running) = self.gate.try_lock() else {
            debug!(job = self.job.name(), "Previous run still in progress, skipping tick");
            return TickOutcome::Skipped;
        };
        // Checked under the gate: a tick that wins the gate after `close`
        // must not start a run.
        if self.closed.load(Ordering::SeqCst) {
            debug!(job = self.job.name(), "Runner closed, skipping tick");
            return TickOutcome::Skipped;
        }

        let started = Instant::now();
        match self.job.run().await {
            Ok(processed) => TickOutcome::Completed(processed),
            Err(e) => {
                error!(
                    job = self.job.name(),
                    error = %e,
                    transient = e.is_transient(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scheduled job failed"
                );
                TickOutcome::Failed
            }
        }
    }

    /// Wait until any in-flight run has finished.
    pub async fn wait_idle(&self) {
        let _idle = self.gate.lock().await;
    }

    /// Refuse all further ticks, then wait for the in-flight run.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wait_idle().await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Owns the periodic trigger for background jobs.
///
/// Built once by the process composition root, started once at boot and
/// stopped once at shutdown. Jobs can be exercised without the timer by
/// calling [`JobRunner::tick`] directly.
pub struct BackgroundScheduler {
    /// The underlying job scheduler.
    scheduler: JobScheduler,
    /// Registered jobs.
    runners: Vec<JobRunner>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("jobs", &self.runners.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl BackgroundScheduler {
    /// Create a scheduler with no jobs.
    pub async fn new() -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            runners: Vec::new(),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    /// Register `job` to run every `interval`, first run one interval
    /// after [`start`](Self::start).
    pub async fn register(
        &mut self,
        job: Arc<dyn PeriodicJob>,
        interval: Duration,
    ) -> Result<JobRunner, AppError> {
        if *self.lifecycle.lock().await != Lifecycle::Created {
            return Err(AppError::conflict(
                "Jobs must be registered before the scheduler starts",
            ));
        }

        let runner = JobRunner::new(job);
        let name = runner.name();

        let tick_runner = runner.clone();
        let cron_job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let runner = tick_runner.clone();
            Box::pin(async move {
                // Own task, so scheduler shutdown cannot cancel a run midway.
                if let Err(e) = tokio::spawn(async move { runner.tick().await }).await {
                    error!(job = name, error = %e, "Scheduled job task panicked");
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create {} schedule: {}", name, e)))?;

        self.scheduler
            .add(cron_job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {} schedule: {}", name, e)))?;

        info!(job = name, interval_secs = interval.as_secs(), "Registered periodic job");
        self.runners.push(runner.clone());
        Ok(runner)
    }

    /// Register the expired-seat reaper at its fixed cadence.
    pub async fn register_license_reaper(
        &mut self,
        service: Arc<LicenseService>,
    ) -> Result<JobRunner, AppError> {
        self.register(Arc::new(LicenseReaperJob::new(service)), REAP_INTERVAL)
            .await
    }

    /// Start firing ticks. Fails if called more than once.
    pub async fn start(&self) -> Result<(), AppError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if *lifecycle != Lifecycle::Created {
            return Err(AppError::conflict("Scheduler has already been started"));
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        *lifecycle = Lifecycle::Running;
        info!(jobs = self.runners.len(), "Scheduler started");
        Ok(())
    }

    /// Cancel future ticks and wait for in-flight runs to finish.
    ///
    /// Stopping a scheduler that never started only marks it stopped.
    pub async fn stop(&self) -> Result<(), AppError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Stopped => {
                warn!("Scheduler already stopped");
                return Ok(());
            }
            Lifecycle::Created => {
                *lifecycle = Lifecycle::Stopped;
                return Ok(());
            }
            Lifecycle::Running => {}
        }

        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;
        *lifecycle = Lifecycle::Stopped;

        for runner in &self.runners {
            runner.close().await;
        }

        info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use eventhub_core::error::ErrorKind;

    #[derive(Debug, Default)]
    struct BlockingJob {
        entered: Notify,
        release: Notify,
        runs: AtomicU64,
    }

    #[async_trait]
    impl PeriodicJob for BlockingJob {
        fn name(&self) -> &'static str {
            "blocking"
        }

        async fn run(&self) -> Result<u64, AppError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(7)
        }
    }

    #[derive(Debug, Default)]
    struct FailingJob {
        runs: AtomicU64,
    }

    #[async_trait]
    impl PeriodicJob for FailingJob {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self) -> Result<u64, AppError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run == 0 {
                Err(AppError::store_unavailable("database is restarting"))
            } else {
                Ok(1)
            }
        }
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let job = Arc::new(BlockingJob::default());
        let runner = JobRunner::new(job.clone());

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.tick().await })
        };
        job.entered.notified().await;

        assert_eq!(runner.tick().await, TickOutcome::Skipped);

        job.release.notify_one();
        assert_eq!(first.await.unwrap(), TickOutcome::Completed(7));
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_future_ticks() {
        let job = Arc::new(FailingJob::default());
        let runner = JobRunner::new(job.clone());

        assert_eq!(runner.tick().await, TickOutcome::Failed);
        assert_eq!(runner.tick().await, TickOutcome::Completed(1));
        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_in_flight_run() {
        let job = Arc::new(BlockingJob::default());
        let runner = JobRunner::new(job.clone());

        let in_flight = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.tick().await })
        };
        job.entered.notified().await;

        let waiter = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        job.release.notify_one();
        waiter.await.unwrap();
        assert_eq!(in_flight.await.unwrap(), TickOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_closed_runner_skips_ticks() {
        let job = Arc::new(FailingJob::default());
        let runner = JobRunner::new(job.clone());

        runner.close().await;
        assert!(runner.is_closed());
        assert_eq!(runner.tick().await, TickOutcome::Skipped);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_scheduled_run() {
        let job = Arc::new(BlockingJob::default());
        let mut scheduler = BackgroundScheduler::new().await.unwrap();
        let runner = scheduler
            .register(job.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(10), job.entered.notified())
            .await
            .expect("scheduled run never started");

        let scheduler = Arc::new(scheduler);
        let stopping = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!stopping.is_finished());

        job.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("stop did not return after the run finished")
            .unwrap()
            .unwrap();

        assert!(runner.is_closed());
        assert_eq!(runner.tick().await, TickOutcome::Skipped);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_start_once() {
        let mut scheduler = BackgroundScheduler::new().await.unwrap();
        scheduler
            .register(Arc::new(FailingJob::default()), Duration::from_secs(60))
            .await
            .unwrap();

        scheduler.start().await.unwrap();
        let err = scheduler.start().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = scheduler
            .register(Arc::new(FailingJob::default()), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        scheduler.stop().await.unwrap();
        scheduler.stop().await.unwrap();
        assert!(scheduler.start().await.is_err());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let scheduler = BackgroundScheduler::new().await.unwrap();
        scheduler.stop().await.unwrap();
        assert!(scheduler.start().await.is_err());
    }
}
