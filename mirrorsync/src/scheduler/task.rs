use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use mirrorsync_config::shared::RetryConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::catalog::MetadataCatalog;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncResult};
use crate::scheduler::run_with_retry;
use crate::sync_error;
use crate::types::ExportMode;

/// The work a schedule entry triggers.
pub trait ScheduledRun: Send + Sync + 'static {
    fn run(&self, dataset: &str, mode: ExportMode) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Parses a cron expression. Five-field expressions are minute-precise and get a leading
/// seconds field.
pub fn parse_schedule(expression: &str) -> SyncResult<Schedule> {
    let expression = expression.trim();
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };

    Schedule::from_str(&normalized).map_err(|err| {
        sync_error!(
            ErrorKind::InvalidSchedule,
            "Schedule expression is not valid cron",
            expression,
            source: err
        )
    })
}

/// Converts a wall-clock time to a tokio [`Instant`], clamping past times to now.
fn instant_at<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> Instant {
    let delay = (at.with_timezone(&Utc) - Utc::now())
        .to_std()
        .unwrap_or_default();

    Instant::now() + delay
}

#[derive(Debug)]
struct ScheduleEntry {
    expression: String,
    mode: ExportMode,
    schedule: Schedule,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct TaskEntry {
    schedules: Vec<ScheduleEntry>,
    // Dropped when the task is removed, which stops its timers.
    cancel_tx: ShutdownTx,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<String, TaskEntry>,
    started: bool,
}

/// Fires dataset exports on cron schedules evaluated in a fixed UTC offset.
///
/// Each schedule entry owns a timer task. A fired run is retried according to the configured
/// [`RetryConfig`]; its final failure is logged and the timer keeps going. Shutdown and task
/// removal stop timers between runs, so a run in progress always completes.
#[derive(Debug)]
pub struct TaskScheduler<R> {
    runner: Arc<R>,
    offset: FixedOffset,
    retry: RetryConfig,
    inner: Mutex<Inner>,
    shutdown_tx: ShutdownTx,
}

impl<R> TaskScheduler<R>
where
    R: ScheduledRun,
{
    pub fn new(runner: Arc<R>, offset: FixedOffset, retry: RetryConfig) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            runner,
            offset,
            retry,
            inner: Mutex::new(Inner::default()),
            shutdown_tx,
        }
    }

    /// Registers `schedule` for `dataset`. Returns `false` when the pair was already registered.
    pub async fn add_task(
        &self,
        dataset: &str,
        mode: ExportMode,
        schedule: &str,
    ) -> SyncResult<bool> {
        let parsed = parse_schedule(schedule)?;
        let expression = schedule.trim().to_string();

        let mut inner = self.inner.lock().await;
        let started = inner.started;
        let task = inner
            .tasks
            .entry(dataset.to_string())
            .or_insert_with(|| TaskEntry {
                schedules: Vec::new(),
                cancel_tx: create_shutdown_channel().0,
            });

        if task
            .schedules
            .iter()
            .any(|entry| entry.expression == expression)
        {
            debug!(dataset, schedule = %expression, "schedule already registered");

            return Ok(false);
        }

        let mut entry = ScheduleEntry {
            expression,
            mode,
            schedule: parsed,
            handle: None,
        };
        if started {
            entry.handle = Some(self.spawn_timer(dataset, &entry, task.cancel_tx.subscribe()));
        }
        info!(dataset, %mode, schedule = %entry.expression, "schedule registered");
        task.schedules.push(entry);

        Ok(true)
    }

    /// Removes every schedule of `dataset`. Returns `false` when the dataset had none.
    pub async fn remove_task(&self, dataset: &str) -> bool {
        let removed = self.inner.lock().await.tasks.remove(dataset);

        match removed {
            Some(task) => {
                task.cancel_tx.send_replace(());
                info!(dataset, schedules = task.schedules.len(), "task removed");
                true
            }
            None => false,
        }
    }

    /// Number of registered (dataset, schedule) pairs.
    pub async fn task_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .tasks
            .values()
            .map(|task| task.schedules.len())
            .sum()
    }

    /// Starts the timers of every registered schedule. Schedules added later start right away.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.started {
            return;
        }
        inner.started = true;

        let mut timers = 0;
        for (dataset, task) in inner.tasks.iter_mut() {
            for entry in task.schedules.iter_mut() {
                let handle = self.spawn_timer(dataset, entry, task.cancel_tx.subscribe());
                entry.handle = Some(handle);
                timers += 1;
            }
        }

        info!(timers, "task scheduler started");
    }

    /// Stops every timer and waits for runs in progress to finish.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(());

        let handles = {
            let mut inner = self.inner.lock().await;
            inner.started = false;
            inner
                .tasks
                .values_mut()
                .flat_map(|task| task.schedules.iter_mut())
                .filter_map(|entry| entry.handle.take())
                .collect::<Vec<_>>()
        };

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "schedule timer ended abnormally");
            }
        }

        info!("task scheduler stopped");
    }

    /// Registers every schedule found in `catalog`, skipping tasks that cannot be resolved.
    pub async fn register_catalog_tasks<K: MetadataCatalog>(&self, catalog: &K) -> SyncResult<usize> {
        let mut registered = 0;

        for task in catalog.scheduled_tasks().await? {
            let dataset = match catalog.resolve_table(&task.table).await {
                Ok(dataset) => dataset,
                Err(err) => {
                    warn!(table = %task.table, error = %err, "skipping task of an unknown table");
                    continue;
                }
            };

            for schedule in &task.schedules {
                match self.add_task(&dataset.name, task.mode, schedule).await {
                    Ok(true) => registered += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(dataset = %dataset.name, schedule, error = %err, "skipping invalid schedule");
                    }
                }
            }
        }

        info!(tasks = registered, "scheduled tasks registered");

        Ok(registered)
    }

    fn spawn_timer(
        &self,
        dataset: &str,
        entry: &ScheduleEntry,
        cancel_rx: ShutdownRx,
    ) -> JoinHandle<()> {
        let timer = Timer {
            runner: self.runner.clone(),
            dataset: dataset.to_string(),
            mode: entry.mode,
            schedule: entry.schedule.clone(),
            offset: self.offset,
            retry: self.retry,
        };

        tokio::spawn(timer.run(self.shutdown_tx.subscribe(), cancel_rx))
    }
}

struct Timer<R> {
    runner: Arc<R>,
    dataset: String,
    mode: ExportMode,
    schedule: Schedule,
    offset: FixedOffset,
    retry: RetryConfig,
}

impl<R> Timer<R>
where
    R: ScheduledRun,
{
    async fn run(self, mut shutdown_rx: ShutdownRx, mut cancel_rx: ShutdownRx) {
        let mut last_fired: Option<DateTime<FixedOffset>> = None;

        loop {
            let now = Utc::now().with_timezone(&self.offset);
            // Never fire twice for the same instant, even if the clock has not moved past it.
            let after = match last_fired {
                Some(fired) if fired > now => fired,
                _ => now,
            };
            let Some(next) = self.schedule.after(&after).next() else {
                info!(dataset = %self.dataset, "schedule has no upcoming time");
                return;
            };

            debug!(dataset = %self.dataset, next = %next, "waiting for next scheduled run");
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    debug!(dataset = %self.dataset, "schedule timer stopped due to shutdown");
                    return;
                }

                _ = cancel_rx.changed() => {
                    debug!(dataset = %self.dataset, "schedule timer stopped due to task removal");
                    return;
                }

                _ = sleep_until(instant_at(&next)) => {}
            }

            last_fired = Some(next);
            info!(dataset = %self.dataset, mode = %self.mode, "running scheduled export");
            let _ = run_with_retry(self.retry, &self.dataset, || {
                self.runner.run(&self.dataset, self.mode)
            })
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingRun {
        runs: AtomicUsize,
    }

    impl ScheduledRun for CountingRun {
        async fn run(&self, _dataset: &str, _mode: ExportMode) -> SyncResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler(runner: Arc<CountingRun>) -> TaskScheduler<CountingRun> {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        TaskScheduler::new(runner, offset, RetryConfig::new(3, 10))
    }

    #[test]
    fn five_field_expressions_gain_a_seconds_field() {
        let schedule = parse_schedule("30 2 * * *").unwrap();
        let after = DateTime::parse_from_rfc3339("2024-03-05T00:00:00+08:00").unwrap();
        let next = schedule.after(&after).next().unwrap();
        assert_eq!(next.to_rfc3339(), "2024-03-05T02:30:00+08:00");

        assert_eq!(
            parse_schedule("not a schedule").unwrap_err().kind(),
            ErrorKind::InvalidSchedule
        );
    }

    #[tokio::test]
    async fn registering_the_same_schedule_twice_is_a_no_op() {
        let scheduler = scheduler(Arc::new(CountingRun::default()));

        assert!(scheduler.add_task("balance", ExportMode::Full, "0 3 * * *").await.unwrap());
        assert!(!scheduler.add_task("balance", ExportMode::Full, " 0 3 * * * ").await.unwrap());
        assert!(scheduler.add_task("balance", ExportMode::Full, "0 4 * * *").await.unwrap());
        assert!(scheduler.add_task("income", ExportMode::DateRange, "0 3 * * *").await.unwrap());
        assert_eq!(scheduler.task_count().await, 3);

        assert!(scheduler.remove_task("balance").await);
        assert!(!scheduler.remove_task("balance").await);
        assert_eq!(scheduler.task_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn started_schedules_fire_until_shutdown() {
        let runner = Arc::new(CountingRun::default());
        let scheduler = scheduler(runner.clone());
        scheduler
            .add_task("balance", ExportMode::Full, "* * * * * *")
            .await
            .unwrap();

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        scheduler.shutdown().await;

        let runs = runner.runs.load(Ordering::SeqCst);
        assert!(runs >= 1, "expected at least one run, got {runs}");

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(runner.runs.load(Ordering::SeqCst), runs);
    }
}
