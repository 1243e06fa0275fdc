//! Relaypool - Entry Point
//!
//! Runs the dispatch core against simulated adapters with graceful shutdown support.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relaypool::models::{Priority, Task};
use relaypool::services::{
    UpstreamCleanupConfig, UpstreamCleanupHandle, UpstreamCleanupService, WorkerScalingConfig,
    WorkerScalingHandle, WorkerScalingService,
};
use relaypool::{
    AdapterRegistry, Config, LoadBalancer, LogSink, StrategySelector, UpstreamPool, WorkerPool,
};

/// Success probability of the simulated adapters
const SIMULATED_SUCCESS: f64 = 0.85;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("invalid configuration")?;

    // Initialize tracing
    let json = config.log.format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("relaypool={}", config.log.level).into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!("Starting Relaypool");

    // Upstream pool, optionally seeded from disk
    let upstreams = Arc::new(UpstreamPool::new(config.upstream.strategy));
    if let Some(path) = &config.upstream.file {
        match upstreams.load_from_file(path) {
            Ok(count) => info!("Loaded {} upstreams from {}", count, path.display()),
            Err(e) => warn!("Could not load upstreams from {}: {}", path.display(), e),
        }
    }
    info!("Using upstream strategy: {}", config.upstream.strategy.as_str());

    let balancer = Arc::new(
        LoadBalancer::new(config.balancer.history_limit)
            .with_exploration(config.selector.exploration_rate),
    );
    let selector = Arc::new(StrategySelector::new(config.selector.exploration_rate));
    let registry = AdapterRegistry::simulated(SIMULATED_SUCCESS);

    let pool = Arc::new(
        WorkerPool::new(
            config.pool_config(),
            registry,
            balancer.clone(),
            upstreams.clone(),
            selector.clone(),
        )
        .with_sink(Arc::new(LogSink)),
    );
    pool.start(config.pool.workers)?;
    info!("Using distribution strategy: {}", config.balancer.strategy);

    // Start upstream cleanup service
    let (cleanup_handle, cleanup_shutdown) = UpstreamCleanupHandle::new();
    let cleanup_service = UpstreamCleanupService::new(
        upstreams.clone(),
        UpstreamCleanupConfig {
            check_interval_secs: config.upstream.cleanup_interval_secs,
            max_age_hours: config.upstream.max_age_hours,
            persist_path: config.upstream.file.clone(),
        },
    );
    let cleanup_task = tokio::spawn(async move {
        cleanup_service.run(cleanup_shutdown).await;
    });

    // Start worker scaling and health service
    let (scaling_handle, scaling_shutdown) = WorkerScalingHandle::new();
    let scaling_service = WorkerScalingService::new(
        pool.clone(),
        WorkerScalingConfig {
            check_interval_secs: config.pool.scale_interval_secs,
            health_interval_secs: config.pool.health_interval_secs,
            min_workers: config.pool.min_workers,
            max_workers: config.pool.max_workers,
            max_idle_secs: config.pool.max_idle_secs,
            ..WorkerScalingConfig::default()
        },
    );
    let scaling_task = tokio::spawn(async move {
        scaling_service.run(scaling_shutdown).await;
    });

    let ids = pool.add_batch_tasks(demo_batch()).await?;
    info!("Submitted {} demo tasks", ids.len());

    // Wait for the batch or a shutdown signal
    tokio::select! {
        _ = pool.join() => info!("All tasks finished"),
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    let stats = pool.stats();
    info!(
        "Pool stats: {} ordered, {} delivered, {} ok, {} failed, {} cancelled ({:.1}% success)",
        stats.total_ordered,
        stats.total_delivered,
        stats.successful,
        stats.failed,
        stats.cancelled,
        stats.success_rate
    );
    let analysis = balancer.analyze_distribution();
    info!(
        "Recommended distribution strategy: {}",
        analysis.recommended_strategy
    );
    for (channel, learned) in selector.snapshot().iter() {
        info!(
            "Channel {}: learned success rate {:.3} over {} samples",
            channel, learned.success_rate, learned.sample_count
        );
    }

    scaling_handle.shutdown();
    if let Err(e) = scaling_task.await {
        error!("Worker scaling task failed: {}", e);
    }
    pool.stop().await?;
    cleanup_handle.shutdown();
    if let Err(e) = cleanup_task.await {
        error!("Upstream cleanup task failed: {}", e);
    }

    info!("Relaypool stopped");
    Ok(())
}

fn demo_batch() -> Vec<Task> {
    let priorities = [Priority::Low, Priority::Normal, Priority::High];
    let volumes = [25, 80, 400, 900, 2500];
    (0..12)
        .map(|i| {
            let task = Task::new(format!("demo-target-{}", i), volumes[i % volumes.len()])
                .with_priority(priorities[i % priorities.len()]);
            if i % 4 == 0 {
                task.with_region("eu")
            } else {
                task
            }
        })
        .collect()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
