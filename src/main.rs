use anyhow::Result;
use hoststats::history_repo::HostRegistry;
use hoststats::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let cancel = CancellationToken::new();

    let history_repo = Arc::new(
        history_repo::HistoryRepo::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.retention_days,
        )
        .await?,
    );
    history_repo.init().await?;

    let platform: Arc<dyn platform::PlatformStats> = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let host = collectors::HostCollector::new(platform.clone())
        .collect(&cancel)
        .await
        .map_err(|e| anyhow::anyhow!("host identity: {}", e))?;
    let host_id = history_repo.upsert_host(&host).await?;
    tracing::info!(host = %host.name, mac = %host.mac_address, ipv4 = %host.ipv4, host_id, "Host registered");

    let runtime: Arc<dyn docker_repo::ContainerRuntime> =
        Arc::new(docker_repo::DockerRepo::connect()?);
    let services = Arc::new(service::MetricServices::new(
        service::ServiceDeps {
            platform,
            runtime,
            store: history_repo.clone(),
            host_id,
        },
        &app_config,
    ));

    let mut modules = services.modules();
    modules.push(Arc::new(service::HostHeartbeat::new(
        history_repo.clone(),
        host_id,
    )));
    let scheduler = scheduler::CollectionScheduler::new(modules);
    scheduler
        .start(
            Duration::from_secs(app_config.monitoring.collection_interval_secs),
            cancel.child_token(),
        )
        .await?;
    let pruner = history_repo.clone().spawn_pruner(
        Duration::from_secs(app_config.monitoring.prune_interval_secs),
        cancel.child_token(),
    );

    let app = routes::app(
        services,
        history_repo.clone(),
        Arc::new(host),
        cancel.child_token(),
    );
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Received shutdown signal");
        })
        .await?;

    scheduler.stop().await;
    cancel.cancel();
    let _ = pruner.await;
    Ok(())
}
