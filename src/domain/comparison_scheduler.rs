//! Runs comparison schedules: every tick, each due schedule compares all of
//! its devices and records `Scheduled` results in the comparison history.
//!
//! Schedule edits and run bookkeeping go through `schedules_lock`; the lock
//! is not held while devices are compared.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::comparison::{ComparisonKind, ComparisonResult};
use super::comparison_schedule::{
    ComparisonSchedule, DeviceTarget, NewComparisonSchedule, CONFIG_SCHEDULE_ID,
};
use super::comparison_service::ComparisonService;
use super::error::{ComparisonScheduleError, PersistenceError};
use super::schedule_store::ScheduleStore;

pub struct ComparisonScheduler {
    store: Arc<dyn ScheduleStore>,
    comparisons: Arc<ComparisonService>,
    poll_interval: Duration,
    schedules_lock: Mutex<()>,
    runner: Mutex<Option<Runner>>,
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ComparisonScheduler {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        comparisons: Arc<ComparisonService>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            comparisons,
            poll_interval: poll_interval.max(Duration::from_secs(1)),
            schedules_lock: Mutex::new(()),
            runner: Mutex::new(None),
        })
    }

    pub async fn create(
        &self,
        request: NewComparisonSchedule,
    ) -> Result<ComparisonSchedule, ComparisonScheduleError> {
        let schedule = ComparisonSchedule::new(request, Utc::now())?;
        let stored = schedule.clone();
        self.mutate(move |schedules| {
            schedules.push(stored);
            ((), true)
        })
        .await?;

        info!(
            schedule_id = %schedule.id,
            devices = schedule.devices.len(),
            next_run_at = %schedule.next_run_at,
            "comparison schedule created"
        );
        Ok(schedule)
    }

    pub async fn list(&self) -> Result<Vec<ComparisonSchedule>, ComparisonScheduleError> {
        Ok(self.store.load_schedules().await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ComparisonSchedule>, ComparisonScheduleError> {
        let schedules = self.store.load_schedules().await?;
        Ok(schedules.into_iter().find(|s| s.id == id))
    }

    /// Returns `false` when no schedule has this id.
    pub async fn delete(&self, id: &str) -> Result<bool, ComparisonScheduleError> {
        let deleted = self
            .mutate(|schedules| {
                let before = schedules.len();
                schedules.retain(|s| s.id != id);
                let deleted = schedules.len() != before;
                (deleted, deleted)
            })
            .await?;
        if deleted {
            info!(schedule_id = %id, "comparison schedule deleted");
        }
        Ok(deleted)
    }

    /// Replace the schedule derived from the config file. No devices or a
    /// zero interval removes it.
    pub async fn sync_config(
        &self,
        devices: &[DeviceTarget],
        interval_secs: u64,
    ) -> Result<(), ComparisonScheduleError> {
        let configured = if devices.is_empty() || interval_secs == 0 {
            None
        } else {
            Some(ComparisonSchedule::from_config(
                devices.to_vec(),
                interval_secs,
                Utc::now(),
            )?)
        };
        self.mutate(|schedules| {
            let before = schedules.len();
            schedules.retain(|s| s.id != CONFIG_SCHEDULE_ID);
            let removed = schedules.len() != before;
            match configured {
                Some(schedule) => {
                    schedules.insert(0, schedule);
                    ((), true)
                }
                None => ((), removed),
            }
        })
        .await?;
        Ok(())
    }

    /// Run every schedule due at `now` and return the results, in order.
    pub async fn run_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ComparisonResult>, ComparisonScheduleError> {
        let due: Vec<ComparisonSchedule> = self
            .store
            .load_schedules()
            .await?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();

        let mut results = Vec::new();
        for schedule in due {
            debug!(schedule_id = %schedule.id, devices = schedule.devices.len(), "running comparison schedule");
            let mut ids = Vec::with_capacity(schedule.devices.len());
            for device in &schedule.devices {
                let result = self
                    .comparisons
                    .compare_device(&device.id, &device.address, ComparisonKind::Scheduled)
                    .await;
                if result.summary.critical > 0 {
                    warn!(
                        schedule_id = %schedule.id,
                        device_id = %device.id,
                        comparison_id = %result.id,
                        critical = result.summary.critical,
                        drift_percentage = result.drift_percentage,
                        "critical configuration drift detected"
                    );
                }
                ids.push(result.id.clone());
                results.push(result);
            }
            self.settle(&schedule.id, now, ids).await?;
        }
        Ok(results)
    }

    /// Start the runner loop. Returns `false` if one is already running.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut runner = self.runner.lock().await;
        if runner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }
        let (shutdown, rx) = watch::channel(false);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_loop(rx).await });
        *runner = Some(Runner { shutdown, handle });
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "comparison schedule runner started"
        );
        true
    }

    /// Stop the runner and wait for the comparison in flight to finish.
    pub async fn stop(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown.send(true);
        if let Err(e) = runner.handle.await {
            warn!(error = %e, "comparison schedule runner ended abnormally");
        }
        info!("comparison schedule runner stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runner
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
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

            match self.run_due(Utc::now()).await {
                Ok(results) if !results.is_empty() => {
                    info!(comparisons = results.len(), "scheduled comparisons completed");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "comparison schedule run aborted, retrying next interval"),
            }
        }
    }

    /// Record a run of `id` at `now`. A schedule with no future run is
    /// removed; one deleted meanwhile stays deleted.
    async fn settle(
        &self,
        id: &str,
        now: DateTime<Utc>,
        results: Vec<String>,
    ) -> Result<(), PersistenceError> {
        self.mutate(|schedules| {
            let Some(pos) = schedules.iter().position(|s| s.id == id) else {
                return ((), false);
            };
            if !schedules[pos].advance(now, results) {
                warn!(schedule_id = %id, "comparison schedule has no future run, removing it");
                schedules.remove(pos);
            }
            ((), true)
        })
        .await
    }

    async fn mutate<R>(
        &self,
        edit: impl FnOnce(&mut Vec<ComparisonSchedule>) -> (R, bool),
    ) -> Result<R, PersistenceError> {
        let _guard = self.schedules_lock.lock().await;
        let mut schedules = self.store.load_schedules().await?;
        let (result, changed) = edit(&mut schedules);
        if changed {
            self.store.save_schedules(&schedules).await?;
        }
        Ok(result)
    }
}
