//! Scheduler: owns the scheduled task list and the polling loop that runs
//! due tasks through the injected executor.
//!
//! Every read-modify-write of the persisted list happens under `tasks_lock`.
//! The lock is released while a task's executor runs, so `schedule` and
//! `cancel` stay responsive during long executions.
//!
//! A task found `Running` when a loop starts was interrupted by a previous
//! process and is settled as `Failed`. `stop()` gives an in-flight execution
//! `shutdown_grace_secs` to settle, then aborts the loop and fails the task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::executor::TaskExecutor;

use super::error::{ExecutionError, PersistenceError, SchedulerError};
use super::task::{parse_timestamp, ScheduledTask, TaskStatus};
use super::task_store::TaskStore;

const INTERRUPTED: &str = "interrupted before completion";
const ABORTED: &str = "aborted at scheduler shutdown";

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    poll_interval: Duration,
    execution_timeout: Option<Duration>,
    shutdown_grace: Duration,
    tasks_lock: Mutex<()>,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Outcome of one scan over the due tasks.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Tasks cancelled while their executor ran; the outcome was dropped.
    pub discarded: Vec<String>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty() && self.discarded.is_empty()
    }

    pub fn executed(&self) -> usize {
        self.completed.len() + self.failed.len() + self.discarded.len()
    }
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn TaskExecutor>,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            execution_timeout: config.execution_timeout_secs.map(Duration::from_secs),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            tasks_lock: Mutex::new(()),
            poller: Mutex::new(None),
        })
    }

    /// Schedule `target_id` to run at or after `scheduled_for`.
    ///
    /// Persists the new `Pending` task and makes sure the polling loop runs.
    pub async fn schedule(
        self: &Arc<Self>,
        target_id: &str,
        scheduled_for: &str,
        notes: Option<String>,
        created_by: &str,
    ) -> Result<ScheduledTask, SchedulerError> {
        let when = parse_timestamp(scheduled_for).map_err(|reason| SchedulerError::InvalidTime {
            input: scheduled_for.to_string(),
            reason,
        })?;

        let created_by = if created_by.trim().is_empty() {
            "unknown"
        } else {
            created_by
        };
        let task = ScheduledTask::new(target_id, when, notes, created_by);

        let new_task = task.clone();
        self.mutate(move |tasks| {
            tasks.push(new_task);
            ((), true)
        })
        .await?;

        info!(
            task_id = %task.id,
            target_id = %task.target_id,
            scheduled_for = %task.scheduled_for,
            created_by = %task.created_by,
            "intent scheduled"
        );

        self.start().await;
        Ok(task)
    }

    /// Tasks for operator review: everything except `Completed`.
    pub async fn list(&self) -> Result<Vec<ScheduledTask>, SchedulerError> {
        let tasks = self.store.load_tasks().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .collect())
    }

    /// Every persisted task, completed ones included.
    pub async fn list_all(&self) -> Result<Vec<ScheduledTask>, SchedulerError> {
        Ok(self.store.load_tasks().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScheduledTask>, SchedulerError> {
        let tasks = self.store.load_tasks().await?;
        Ok(tasks.into_iter().find(|t| t.id == id))
    }

    /// Cancel a `Pending` or `Running` task.
    ///
    /// Returns `false` without touching anything when the id is unknown or
    /// the task already reached a terminal state.
    pub async fn cancel(&self, id: &str) -> Result<bool, SchedulerError> {
        let now = Utc::now();
        let cancelled = self
            .mutate(|tasks| match tasks.iter_mut().find(|t| t.id == id) {
                Some(task) => {
                    let changed = task.transition(TaskStatus::Cancelled, now);
                    (changed, changed)
                }
                None => (false, false),
            })
            .await?;

        if cancelled {
            info!(task_id = %id, "scheduled intent cancelled");
        } else {
            debug!(task_id = %id, "cancel ignored: unknown or terminal task");
        }
        Ok(cancelled)
    }

    /// Start the polling loop. Returns `false` if one is already running.
    ///
    /// Tasks persisted as `Running` are failed first: no loop owns them.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut poller = self.poller.lock().await;
        if poller.as_ref().is_some_and(|p| !p.handle.is_finished()) {
            return false;
        }

        match self.fail_running(INTERRUPTED).await {
            Ok(ids) => {
                for id in ids {
                    warn!(task_id = %id, "task was interrupted before completion, marked failed");
                }
            }
            Err(e) => warn!(error = %e, "could not recover interrupted tasks"),
        }

        let (shutdown, rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.poll_loop(rx).await });
        *poller = Some(Poller { shutdown, handle });

        info!(
            interval_secs = self.poll_interval.as_secs(),
            "scheduler polling loop started"
        );
        true
    }

    /// Stop the polling loop and wait for it to exit.
    ///
    /// A task already handed to the executor gets the shutdown grace period
    /// to settle. Past it the loop is aborted and the task recorded `Failed`.
    pub async fn stop(&self) {
        let Some(mut poller) = self.poller.lock().await.take() else {
            return;
        };
        let _ = poller.shutdown.send(true);

        match tokio::time::timeout(self.shutdown_grace, &mut poller.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "scheduler polling loop ended abnormally"),
            Err(_) => {
                warn!(
                    grace_secs = self.shutdown_grace.as_secs(),
                    "in-flight execution did not settle, aborting polling loop"
                );
                poller.handle.abort();
                let _ = (&mut poller.handle).await;
                match self.fail_running(ABORTED).await {
                    Ok(ids) => {
                        for id in ids {
                            warn!(task_id = %id, "in-flight task failed at shutdown");
                        }
                    }
                    Err(e) => warn!(error = %e, "could not record aborted task"),
                }
            }
        }
        info!("scheduler polling loop stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }

    /// Run every task due at `now`, one after another.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<ScanReport, SchedulerError> {
        Ok(self.scan(now, None).await?)
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match self.scan(Utc::now(), Some(&shutdown)).await {
                Ok(report) if !report.is_empty() => {
                    info!(
                        executed = report.executed(),
                        completed = report.completed.len(),
                        failed = report.failed.len(),
                        discarded = report.discarded.len(),
                        "scheduled intents executed"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "scheduler scan aborted, retrying next interval");
                }
            }
        }
    }

    async fn scan(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<ScanReport, PersistenceError> {
        let mut due: Vec<ScheduledTask> = self
            .store
            .load_tasks()
            .await?
            .into_iter()
            .filter(|t| t.is_due(now))
            .collect();
        // Stable: ties keep their insertion order.
        due.sort_by_key(|t| t.scheduled_for);

        let mut report = ScanReport::default();
        for candidate in due {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                break;
            }

            let Some(task) = self.begin(&candidate.id).await? else {
                continue;
            };

            info!(task_id = %task.id, target_id = %task.target_id, "executing scheduled intent");
            let outcome = self.execute(&task).await;

            match self.finish(&task.id, outcome).await? {
                TaskStatus::Completed => report.completed.push(task.id),
                TaskStatus::Failed => report.failed.push(task.id),
                _ => report.discarded.push(task.id),
            }
        }
        Ok(report)
    }

    /// Mark a task `Running` if it is still `Pending`.
    async fn begin(&self, id: &str) -> Result<Option<ScheduledTask>, PersistenceError> {
        let now = Utc::now();
        self.mutate(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                return (None, false);
            };
            if task.transition(TaskStatus::Running, now) {
                (Some(task.clone()), true)
            } else {
                (None, false)
            }
        })
        .await
    }

    async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError> {
        match self.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, self.executor.execute(task))
                .await
                .unwrap_or(Err(ExecutionError::Timeout(limit))),
            None => self.executor.execute(task).await,
        }
    }

    /// Fail every task still marked `Running`, returning their ids.
    async fn fail_running(&self, reason: &str) -> Result<Vec<String>, PersistenceError> {
        let now = Utc::now();
        self.mutate(|tasks| {
            let ids: Vec<String> = tasks
                .iter_mut()
                .filter(|t| t.status == TaskStatus::Running)
                .filter_map(|t| t.fail(reason, now).then(|| t.id.clone()))
                .collect();
            let changed = !ids.is_empty();
            (ids, changed)
        })
        .await
    }

    /// Record the executor outcome and return the task's resulting status.
    async fn finish(
        &self,
        id: &str,
        outcome: Result<(), ExecutionError>,
    ) -> Result<TaskStatus, PersistenceError> {
        let now = Utc::now();
        let status = self
            .mutate(|tasks| {
                let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                    return (TaskStatus::Cancelled, false);
                };
                let changed = match &outcome {
                    Ok(()) => task.transition(TaskStatus::Completed, now),
                    Err(e) => task.fail(e.to_string(), now),
                };
                (task.status, changed)
            })
            .await?;

        match (&outcome, status) {
            (Ok(()), TaskStatus::Completed) => {
                info!(task_id = %id, "scheduled intent completed");
            }
            (Err(e), TaskStatus::Failed) => {
                warn!(task_id = %id, error = %e, "scheduled intent failed");
            }
            _ => {
                warn!(task_id = %id, status = %status, "task changed during execution, outcome discarded");
            }
        }
        Ok(status)
    }

    /// Load, edit and persist the task list as one step. `edit` returns its
    /// result and whether the list changed; unchanged lists are not written.
    async fn mutate<R>(
        &self,
        edit: impl FnOnce(&mut Vec<ScheduledTask>) -> (R, bool),
    ) -> Result<R, PersistenceError> {
        let _guard = self.tasks_lock.lock().await;
        let mut tasks = self.store.load_tasks().await?;
        let (result, changed) = edit(&mut tasks);
        if changed {
            self.store.save_tasks(&tasks).await?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task_store::{FileTaskStore, MemoryTaskStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    /// Records every execution; fails targets listed in `failing`.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        failing: HashSet<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl TaskExecutor for RecordingExecutor {
        async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError> {
            self.calls.lock().await.push(task.target_id.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&task.target_id) {
                return Err(ExecutionError::Callback(format!("{} exploded", task.target_id)));
            }
            Ok(())
        }
    }

    /// Signals when it starts, then waits until released.
    struct GatedExecutor {
        started: mpsc::UnboundedSender<String>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TaskExecutor for GatedExecutor {
        async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError> {
            let _ = self.started.send(task.id.clone());
            self.release.notified().await;
            Ok(())
        }
    }

    /// Fails the next `failing_loads` loads, and every save while
    /// `fail_saves` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryTaskStore,
        failing_loads: AtomicUsize,
        fail_saves: AtomicBool,
    }

    fn disk_unavailable() -> PersistenceError {
        PersistenceError::Io {
            path: "tasks.json".to_string(),
            source: std::io::Error::other("disk unavailable"),
        }
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        async fn load_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError> {
            let failing = self
                .failing_loads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(disk_unavailable());
            }
            self.inner.load_tasks().await
        }

        async fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), PersistenceError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(disk_unavailable());
            }
            self.inner.save_tasks(tasks).await
        }
    }

    fn scheduler_with(executor: Arc<dyn TaskExecutor>) -> Arc<Scheduler> {
        Scheduler::new(
            Arc::new(MemoryTaskStore::new()),
            executor,
            &SchedulerConfig::default(),
        )
    }

    /// A reference instant a day ahead of the wall clock. Tasks placed around
    /// it are never due for the background loop, only for explicit scans.
    fn base() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::days(1)
    }

    fn at(instant: DateTime<Utc>, offset_mins: i64) -> String {
        (instant + ChronoDuration::minutes(offset_mins)).to_rfc3339()
    }

    async fn status_of(scheduler: &Scheduler, id: &str) -> TaskStatus {
        scheduler.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn invalid_time_is_rejected_and_nothing_persisted() {
        let scheduler = scheduler_with(Arc::new(RecordingExecutor::default()));
        let err = scheduler
            .schedule("intent-1", "next tuesday", None, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTime { .. }));
        assert!(scheduler.list_all().await.unwrap().is_empty());
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn schedule_persists_pending_task_and_starts_one_loop() {
        let scheduler = scheduler_with(Arc::new(RecordingExecutor::default()));
        let when = at(base(), 0);

        let task = scheduler
            .schedule("intent-1", &when, Some("change window".into()), "alice")
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.notes.as_deref(), Some("change window"));
        assert!(scheduler.is_running().await);
        assert!(!scheduler.start().await, "second start must be a no-op");

        scheduler.schedule("intent-2", &when, None, "").await.unwrap();
        let tasks = scheduler.list().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].created_by, "unknown");

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn due_tasks_complete_and_failures_do_not_block_others() {
        let executor = Arc::new(RecordingExecutor {
            failing: HashSet::from(["intent-bad".to_string()]),
            ..Default::default()
        });
        let scheduler = scheduler_with(executor.clone());
        let now = base();

        let bad = scheduler.schedule("intent-bad", &at(now, -5), None, "ops").await.unwrap();
        let good = scheduler.schedule("intent-good", &at(now, -5), None, "ops").await.unwrap();
        let later = scheduler.schedule("intent-later", &at(now, 60), None, "ops").await.unwrap();

        let report = scheduler.run_due(now).await.unwrap();
        assert_eq!(report.failed, vec![bad.id.clone()]);
        assert_eq!(report.completed, vec![good.id.clone()]);
        assert_eq!(report.executed(), 2);

        let failed = scheduler.get(&bad.id).await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("intent-bad exploded"));
        assert_eq!(status_of(&scheduler, &later.id).await, TaskStatus::Pending);
        assert_eq!(*executor.calls.lock().await, vec!["intent-bad", "intent-good"]);

        // Completed tasks disappear from the default listing only.
        let visible: Vec<_> = scheduler.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert!(!visible.contains(&good.id));
        assert!(visible.contains(&bad.id));
        assert_eq!(scheduler.list_all().await.unwrap().len(), 3);

        // Failures are not retried.
        assert!(scheduler.run_due(now).await.unwrap().is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn earlier_task_settles_before_later_one_starts() {
        let executor = Arc::new(RecordingExecutor {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let scheduler = scheduler_with(executor.clone());
        let now = base();

        // Scheduled in reverse order of their due times.
        let second = scheduler.schedule("t2", &at(now, -1), None, "ops").await.unwrap();
        let first = scheduler.schedule("t1", &at(now, -2), None, "ops").await.unwrap();

        scheduler.run_due(now).await.unwrap();

        assert_eq!(*executor.calls.lock().await, vec!["t1", "t2"]);
        let first = scheduler.get(&first.id).await.unwrap().unwrap();
        let second = scheduler.get(&second.id).await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Completed);
        assert!(first.finished_at.unwrap() <= second.started_at.unwrap());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn cancel_is_a_noop_on_terminal_and_unknown_tasks() {
        let executor = Arc::new(RecordingExecutor {
            failing: HashSet::from(["boom".to_string()]),
            ..Default::default()
        });
        let scheduler = scheduler_with(executor);
        let now = base();

        let done = scheduler.schedule("ok", &at(now, -1), None, "ops").await.unwrap();
        let failed = scheduler.schedule("boom", &at(now, -1), None, "ops").await.unwrap();
        let pending = scheduler.schedule("later", &at(now, 60), None, "ops").await.unwrap();
        scheduler.run_due(now).await.unwrap();

        assert!(scheduler.cancel(&pending.id).await.unwrap());
        assert!(!scheduler.cancel(&pending.id).await.unwrap());
        assert!(!scheduler.cancel(&done.id).await.unwrap());
        assert!(!scheduler.cancel(&failed.id).await.unwrap());
        assert!(!scheduler.cancel("no-such-task").await.unwrap());

        assert_eq!(status_of(&scheduler, &done.id).await, TaskStatus::Completed);
        assert_eq!(status_of(&scheduler, &failed.id).await, TaskStatus::Failed);
        assert_eq!(status_of(&scheduler, &pending.id).await, TaskStatus::Cancelled);

        // A cancelled task is never picked up.
        assert!(scheduler
            .run_due(now + ChronoDuration::hours(2))
            .await
            .unwrap()
            .is_empty());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn cancel_while_running_discards_outcome() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let scheduler = scheduler_with(Arc::new(GatedExecutor {
            started: started_tx,
            release: release.clone(),
        }));
        let now = base();
        let task = scheduler.schedule("slow", &at(now, -1), None, "ops").await.unwrap();

        let scan = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_due(now).await })
        };

        assert_eq!(started_rx.recv().await.unwrap(), task.id);
        assert_eq!(status_of(&scheduler, &task.id).await, TaskStatus::Running);
        assert!(scheduler.cancel(&task.id).await.unwrap());
        release.notify_one();

        let report = scan.await.unwrap().unwrap();
        assert_eq!(report.discarded, vec![task.id.clone()]);
        assert_eq!(status_of(&scheduler, &task.id).await, TaskStatus::Cancelled);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn execution_timeout_fails_the_task() {
        let (started_tx, _started_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(GatedExecutor {
                started: started_tx,
                release: Arc::new(Notify::new()),
            }),
            &SchedulerConfig {
                execution_timeout_secs: Some(30),
                ..Default::default()
            },
        );
        let now = base();
        let task = scheduler.schedule("hung", &at(now, -1), None, "ops").await.unwrap();
        scheduler.stop().await;

        let report = scheduler.run_due(now).await.unwrap();
        assert_eq!(report.failed, vec![task.id.clone()]);
        let task = scheduler.get(&task.id).await.unwrap().unwrap();
        assert!(task.error.unwrap().contains("did not settle"));
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_task_runs_within_one_polling_interval() {
        let scheduler = scheduler_with(Arc::new(RecordingExecutor::default()));
        let task = scheduler
            .schedule("intent-overdue", &at(Utc::now(), -1), None, "ops")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        let status = status_of(&scheduler, &task.id).await;
        assert!(
            matches!(status, TaskStatus::Completed | TaskStatus::Failed),
            "task left {status}"
        );
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn loop_leaves_future_tasks_pending() {
        let executor = Arc::new(RecordingExecutor::default());
        let scheduler = scheduler_with(executor.clone());
        let task = scheduler.schedule("intent-tomorrow", &at(base(), 0), None, "ops").await.unwrap();

        tokio::time::sleep(Duration::from_secs(180)).await;

        assert!(executor.calls.lock().await.is_empty());
        assert_eq!(status_of(&scheduler, &task.id).await, TaskStatus::Pending);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_then_start_runs_a_fresh_loop() {
        let scheduler = scheduler_with(Arc::new(RecordingExecutor::default()));
        assert!(scheduler.start().await);
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        assert!(scheduler.start().await);
        assert!(scheduler.is_running().await);
        scheduler.stop().await;
        // Stopping twice is harmless.
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn task_left_running_by_a_previous_process_is_failed_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut crashed = ScheduledTask::new("intent-crashed", base(), None, "ops");
        assert!(crashed.transition(TaskStatus::Running, Utc::now()));
        let pending = ScheduledTask::new("intent-next", base(), None, "ops");
        FileTaskStore::new(&path)
            .save_tasks(&[crashed.clone(), pending.clone()])
            .await
            .unwrap();

        let scheduler = Scheduler::new(
            Arc::new(FileTaskStore::new(&path)),
            Arc::new(RecordingExecutor::default()),
            &SchedulerConfig::default(),
        );
        assert!(scheduler.start().await);
        scheduler.stop().await;

        let reloaded = FileTaskStore::new(&path).load_tasks().await.unwrap();
        let recovered = reloaded.iter().find(|t| t.id == crashed.id).unwrap();
        assert_eq!(recovered.status, TaskStatus::Failed);
        assert_eq!(recovered.error.as_deref(), Some("interrupted before completion"));
        assert!(recovered.finished_at.is_some());
        let untouched = reloaded.iter().find(|t| t.id == pending.id).unwrap();
        assert_eq!(untouched.status, TaskStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_aborts_a_hung_execution_after_the_grace_period() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(GatedExecutor {
                started: started_tx,
                release: Arc::new(Notify::new()),
            }),
            &SchedulerConfig {
                shutdown_grace_secs: 5,
                ..Default::default()
            },
        );
        let task = scheduler
            .schedule("intent-hung", &at(Utc::now(), -1), None, "ops")
            .await
            .unwrap();
        assert_eq!(started_rx.recv().await.unwrap(), task.id);

        scheduler.stop().await;

        assert!(!scheduler.is_running().await);
        let task = scheduler.get(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("aborted at scheduler shutdown"));
    }

    #[tokio::test]
    async fn persistence_failures_surface_as_typed_errors() {
        let store = Arc::new(FlakyStore::default());
        let pending = ScheduledTask::new("intent-1", base(), None, "ops");
        store.inner.save_tasks(&[pending.clone()]).await.unwrap();
        store.fail_saves.store(true, Ordering::SeqCst);
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(RecordingExecutor::default()),
            &SchedulerConfig::default(),
        );

        let err = scheduler
            .schedule("intent-2", &at(base(), 0), None, "ops")
            .await
            .unwrap_err();
        assert!(
            matches!(err, SchedulerError::Persistence(PersistenceError::Io { .. })),
            "{err}"
        );
        let err = scheduler.cancel(&pending.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Persistence(PersistenceError::Io { .. })));

        store.failing_loads.store(2, Ordering::SeqCst);
        assert!(matches!(
            scheduler.list().await.unwrap_err(),
            SchedulerError::Persistence(_)
        ));
        assert!(matches!(
            scheduler.list_all().await.unwrap_err(),
            SchedulerError::Persistence(_)
        ));

        // Nothing was written by the failed calls.
        assert_eq!(store.inner.load_tasks().await.unwrap(), vec![pending]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_a_failed_scan() {
        let store = Arc::new(FlakyStore::default());
        let overdue = ScheduledTask::new(
            "intent-overdue",
            Utc::now() - ChronoDuration::minutes(1),
            None,
            "ops",
        );
        store.inner.save_tasks(&[overdue.clone()]).await.unwrap();
        // Interrupted-task recovery and the first scan both fail.
        store.failing_loads.store(2, Ordering::SeqCst);

        let executor = Arc::new(RecordingExecutor::default());
        let scheduler = Scheduler::new(store.clone(), executor.clone(), &SchedulerConfig::default());
        assert!(scheduler.start().await);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(executor.calls.lock().await.is_empty());
        assert!(scheduler.is_running().await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(*executor.calls.lock().await, vec!["intent-overdue"]);
        assert_eq!(status_of(&scheduler, &overdue.id).await, TaskStatus::Completed);
        scheduler.stop().await;
    }
}
