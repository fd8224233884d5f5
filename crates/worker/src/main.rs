use rundown_worker::{Store, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rundown_worker=debug,rundown_core=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = WorkerConfig::from_env()?;
    tracing::info!(?config, "Worker starting");

    let worker = Worker::builder(Store::in_memory()).config(config).build();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    worker.shutdown().await;
    Ok(())
}
