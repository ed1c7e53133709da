use async_graphql::{Context, EmptySubscription, Object, Schema};
use std::sync::Arc;

use crate::domain::comparison::{ComparisonKind, ComparisonResult};
use crate::domain::comparison_schedule::{ComparisonSchedule, DeviceTarget, NewComparisonSchedule};
use crate::domain::comparison_scheduler::ComparisonScheduler;
use crate::domain::comparison_service::ComparisonService;
use crate::domain::scheduler::Scheduler;
use crate::domain::task::ScheduledTask;

pub type NetintentSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Scheduled tasks; completed ones only when `all` is set.
    async fn tasks(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = false)] all: bool,
    ) -> async_graphql::Result<Vec<ScheduledTask>> {
        let scheduler = ctx.data::<Arc<Scheduler>>()?;
        let tasks = if all {
            scheduler.list_all().await
        } else {
            scheduler.list().await
        };
        tasks.map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    async fn task(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<ScheduledTask>> {
        let scheduler = ctx.data::<Arc<Scheduler>>()?;
        scheduler
            .get(&id)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    /// Comparison history, newest first.
    async fn comparisons(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = 50)] limit: u32,
    ) -> async_graphql::Result<Vec<ComparisonResult>> {
        let svc = ctx.data::<Arc<ComparisonService>>()?;
        Ok(svc.history(limit as usize).await)
    }

    async fn comparison(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<ComparisonResult>> {
        let svc = ctx.data::<Arc<ComparisonService>>()?;
        Ok(svc.get(&id).await)
    }

    async fn comparison_schedules(
        &self,
        ctx: &Context<'_>,
    ) -> async_graphql::Result<Vec<ComparisonSchedule>> {
        let schedules = ctx.data::<Arc<ComparisonScheduler>>()?;
        schedules
            .list()
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    async fn comparison_schedule(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<Option<ComparisonSchedule>> {
        let schedules = ctx.data::<Arc<ComparisonScheduler>>()?;
        schedules
            .get(&id)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn schedule_task(
        &self,
        ctx: &Context<'_>,
        target_id: String,
        scheduled_for: String,
        notes: Option<String>,
        created_by: Option<String>,
    ) -> async_graphql::Result<ScheduledTask> {
        let scheduler = ctx.data::<Arc<Scheduler>>()?;
        scheduler
            .schedule(
                &target_id,
                &scheduled_for,
                notes,
                created_by.as_deref().unwrap_or("unknown"),
            )
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    /// Returns false when the task is unknown or already finished.
    async fn cancel_task(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<bool> {
        let scheduler = ctx.data::<Arc<Scheduler>>()?;
        scheduler
            .cancel(&id)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    async fn compare_device(
        &self,
        ctx: &Context<'_>,
        device_id: String,
        device_address: String,
    ) -> async_graphql::Result<ComparisonResult> {
        let svc = ctx.data::<Arc<ComparisonService>>()?;
        Ok(svc
            .compare_device(&device_id, &device_address, ComparisonKind::Instant)
            .await)
    }

    /// Re-compare `devices` every `intervalSecs` or on `cron` (UTC).
    async fn create_comparison_schedule(
        &self,
        ctx: &Context<'_>,
        devices: Vec<DeviceTarget>,
        interval_secs: Option<u64>,
        cron: Option<String>,
        name: Option<String>,
        created_by: Option<String>,
    ) -> async_graphql::Result<ComparisonSchedule> {
        let schedules = ctx.data::<Arc<ComparisonScheduler>>()?;
        schedules
            .create(NewComparisonSchedule {
                name,
                devices,
                interval_secs,
                cron,
                created_by,
            })
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }

    /// Returns false when no schedule has this id.
    async fn delete_comparison_schedule(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> async_graphql::Result<bool> {
        let schedules = ctx.data::<Arc<ComparisonScheduler>>()?;
        schedules
            .delete(&id)
            .await
            .map_err(|e| async_graphql::Error::new(e.to_string()))
    }
}

pub fn build_schema(
    scheduler: Arc<Scheduler>,
    comparisons: Arc<ComparisonService>,
    schedules: Arc<ComparisonScheduler>,
) -> NetintentSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(scheduler)
        .data(comparisons)
        .data(schedules)
        .finish()
}
