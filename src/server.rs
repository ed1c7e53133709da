use anyhow::{Context, Result};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::graphql::{self, NetintentSchema};
use crate::api::rest::{self, AppState};
use crate::config::{ComparisonConfig, Config, ExecutorConfig};
use crate::domain::comparison_scheduler::ComparisonScheduler;
use crate::domain::comparison_service::ComparisonService;
use crate::domain::schedule_store::FileScheduleStore;
use crate::domain::scheduler::Scheduler;
use crate::domain::task_store::FileTaskStore;
use crate::executor::{LogExecutor, TaskExecutor, WebhookExecutor};
use crate::sources::{ConfigSource, DirectorySource, HttpSource, UnconfiguredSource};

pub async fn run(config: Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.daemon.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "netintent daemon starting");

    let store = Arc::new(FileTaskStore::new(&config.scheduler.task_file));
    let executor = build_executor(&config.executor)?;
    let scheduler = Scheduler::new(store, executor, &config.scheduler);
    scheduler.start().await;
    info!(
        task_file = %config.scheduler.task_file.display(),
        poll_interval_secs = config.scheduler.poll_interval_secs,
        "scheduler started"
    );

    let comparisons = build_comparison_service(&config.comparison, &config.executor)?;

    let schedule_store = Arc::new(FileScheduleStore::new(&config.comparison.schedule_file));
    let schedules = ComparisonScheduler::new(
        schedule_store,
        comparisons.clone(),
        Duration::from_secs(config.comparison.schedule_poll_secs),
    );
    schedules
        .sync_config(&config.comparison.devices, config.comparison.interval_secs)
        .await
        .context("syncing configured comparison schedule")?;
    schedules.start().await;
    info!(
        schedule_file = %config.comparison.schedule_file.display(),
        "comparison schedules loaded"
    );

    let app_state = AppState {
        scheduler: scheduler.clone(),
        comparisons: comparisons.clone(),
        schedules: schedules.clone(),
        started_at: Instant::now(),
    };

    let schema = graphql::build_schema(scheduler.clone(), comparisons.clone(), schedules.clone());

    let graphql_router = Router::new()
        .route("/graphql", get(graphql_playground).post(graphql_handler))
        .with_state(schema);

    let app = rest::router(app_state)
        .merge(graphql_router)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let http_addr = &config.daemon.http_addr;
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding to {}", http_addr))?;

    info!(addr = %http_addr, "HTTP server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    schedules.stop().await;
    scheduler.stop().await;
    info!("netintent daemon stopped");
    Ok(())
}

fn build_executor(config: &ExecutorConfig) -> Result<Arc<dyn TaskExecutor>> {
    match &config.webhook_url {
        Some(url) => {
            let executor = WebhookExecutor::new(
                url,
                config.webhook_secret.clone(),
                Duration::from_secs(config.timeout_secs),
            )
            .context("building webhook executor")?;
            info!(
                url = %executor.url(),
                signed = config.webhook_secret.is_some(),
                "deployment webhook configured"
            );
            Ok(Arc::new(executor))
        }
        None => {
            warn!("no deployment webhook configured, due tasks will only be logged");
            Ok(Arc::new(LogExecutor))
        }
    }
}

fn build_comparison_service(
    config: &ComparisonConfig,
    executor: &ExecutorConfig,
) -> Result<Arc<ComparisonService>> {
    let timeout = Duration::from_secs(executor.timeout_secs);
    let source_of_truth = build_source(
        "source-of-truth",
        config.source_dir.as_deref(),
        config.source_url.as_deref(),
        timeout,
    )?;
    let observed = build_source(
        "device",
        config.device_dir.as_deref(),
        config.device_url.as_deref(),
        timeout,
    )?;
    Ok(ComparisonService::new(
        source_of_truth,
        observed,
        config.severity_rules.clone(),
        config.history_limit,
    ))
}

/// A directory wins over a URL when both are configured.
fn build_source(
    side: &'static str,
    dir: Option<&std::path::Path>,
    url: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn ConfigSource>> {
    if let Some(dir) = dir {
        info!(side, dir = %dir.display(), "configuration trees read from directory");
        return Ok(Arc::new(DirectorySource::new(dir)));
    }
    if let Some(url) = url {
        info!(side, url = %url, "configuration trees fetched over HTTP");
        let source = HttpSource::new(url, timeout)
            .with_context(|| format!("building {side} HTTP source"))?;
        return Ok(Arc::new(source));
    }
    warn!(side, "no configuration source configured, device comparisons will fail");
    Ok(Arc::new(UnconfiguredSource(side)))
}

async fn graphql_playground() -> Html<String> {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn graphql_handler(
    State(schema): State<NetintentSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
