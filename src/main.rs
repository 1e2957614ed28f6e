use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use unfilter_core::config::GlobalConfig;
use unfilter_core::ipc::{IPCServer, IpcState};
use unfilter_core::taskmgr::TaskManager;
use unfilter_core::updater::{AutoCheckScheduler, BackgroundTask, BackgroundWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Unfilter core starting");

    let cfg = GlobalConfig::load()?;

    // 업데이트 파이프라인
    let worker = Arc::new(BackgroundWorker::spawn(cfg.updater.build_services()));
    let mut scheduler = AutoCheckScheduler::new(
        worker.clone(),
        cfg.updater.check_interval_hours,
        cfg.updater.auto_check,
    );
    if cfg.updater.config_url.is_empty() {
        tracing::warn!("No update config URL configured, update checks will report unknown");
    } else {
        scheduler.start();
        if cfg.updater.auto_check {
            if let Err(e) = worker.submit(BackgroundTask::CheckUpdate { manual: false }).await {
                tracing::error!("Failed to queue startup update check: {}", e);
            }
        }
    }

    // 태스크 매니저
    let mut taskmgr = TaskManager::spawn_default(&cfg.taskmgr);

    let ipc_server = IPCServer::new(
        IpcState {
            worker: worker.clone(),
            taskmgr: taskmgr.subscribe(),
        },
        &cfg.ipc_addr,
    );

    tokio::select! {
        result = ipc_server.start() => {
            if let Err(e) = result {
                tracing::error!("IPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, cleaning up...");
        }
    }

    scheduler.stop();
    taskmgr.shutdown();
    if let Err(e) = worker.shutdown().await {
        tracing::warn!("Worker already stopped: {}", e);
    }

    tracing::info!("Unfilter core shutting down");
    Ok(())
}
