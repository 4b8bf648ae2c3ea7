use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Runtime;

use stockgate_pipeline::{BatchOrchestrator, TransitionService};
use stockgate_store::{AllocationStore, PostgresAllocationStore, PostgresStoreConfig};
use stockgate_worker::WorkerConfig;

fn main() -> anyhow::Result<()> {
    stockgate_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
    let pool = runtime
        .block_on(
            PgPoolOptions::new()
                .max_connections(8)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&database_url),
        )
        .context("failed to connect to postgres")?;

    let store_config = PostgresStoreConfig::default()
        .with_allocations_table(&config.allocations_table)
        .with_stock_table(&config.stock_table);
    let store = PostgresAllocationStore::new(pool, store_config)?;

    let service = TransitionService::new(store, config.outcome);
    let orchestrator = BatchOrchestrator::new(service).with_max_concurrent(config.max_concurrent);

    run(orchestrator, &runtime, &config)
}

#[cfg(feature = "redis")]
fn run<S>(
    orchestrator: BatchOrchestrator<S>,
    runtime: &Runtime,
    config: &WorkerConfig,
) -> anyhow::Result<()>
where
    S: AllocationStore + 'static,
{
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let source = stockgate_worker::RedisStreamSource::new(&redis_url, config)
        .context("failed to connect to the delivery stream")?;

    let handle = stockgate_worker::BatchWorker::spawn(
        orchestrator,
        source,
        runtime.handle().clone(),
        config.clone(),
    );

    tracing::info!(
        family = %config.outcome,
        stream = %config.stream_key,
        group = %config.consumer_group,
        "stockgate worker running"
    );

    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for the shutdown signal")?;
    tracing::info!("shutdown signal received");
    handle.shutdown();

    Ok(())
}

#[cfg(not(feature = "redis"))]
fn run<S>(
    _orchestrator: BatchOrchestrator<S>,
    _runtime: &Runtime,
    _config: &WorkerConfig,
) -> anyhow::Result<()>
where
    S: AllocationStore + 'static,
{
    anyhow::bail!("built without a delivery transport; rebuild with the 'redis' feature")
}
