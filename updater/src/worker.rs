//! 백그라운드 워커: 업데이트 확인, 다운로드, 설치 트리거를 백그라운드에서 처리
//!
//! ## 아키텍처
//! - `BackgroundWorker`: 독립적인 tokio 태스크로 실행, 작업은 mpsc 큐로 순차 처리
//! - IPC/UI는 이벤트 구독(broadcast)으로 상태 변화를 수신
//! - 설치는 명시적 요청 시에만 실행

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};

use crate::checker::{UpdateCheckResult, UpdateChecker, UpdateStatus};
use crate::download::{DownloadController, DownloadState};
use crate::install::Installer;

/// 워커가 사용하는 업데이트 구성요소 묶음
#[derive(Clone)]
pub struct UpdateServices {
    pub checker: Arc<UpdateChecker>,
    pub downloads: Arc<DownloadController>,
    pub installer: Arc<Installer>,
}

/// 백그라운드 작업 타입
#[derive(Debug, Clone)]
pub enum BackgroundTask {
    /// 업데이트 확인 (자동/수동)
    CheckUpdate { manual: bool },
    /// APK 다운로드
    Download { url: String, version: String },
    /// 다운로드된 파일 설치
    Install { path: PathBuf },
    /// 워커 종료
    Shutdown,
}

/// 워커에서 발생하는 이벤트 (IPC 구독자에게 브로드캐스트)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WorkerEvent {
    CheckStarted,
    CheckCompleted(UpdateCheckResult),
    DownloadProgress(DownloadState),
    DownloadCompleted { path: PathBuf },
    DownloadFailed { error: String },
    InstallLaunched { path: PathBuf, exit_code: Option<i32> },
    InstallFailed { error: String },
    /// 업데이트 알림 (UI 표시용)
    UpdateNotification {
        title: String,
        message: String,
        force: bool,
    },
    WorkerShutdown,
}

/// 백그라운드 워커 상태
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStatus {
    /// 현재 작업 중인지
    pub busy: bool,
    /// 현재 태스크 설명
    pub current_task: Option<String>,
    /// 마지막 확인 시각
    pub last_check: Option<String>,
    /// 마지막 확인 결과
    pub last_result: Option<UpdateCheckResult>,
}

/// 백그라운드 워커
pub struct BackgroundWorker {
    services: UpdateServices,
    /// 태스크 전송 채널
    task_tx: mpsc::Sender<BackgroundTask>,
    /// 이벤트 브로드캐스트 송신자
    event_tx: broadcast::Sender<WorkerEvent>,
    status: Arc<RwLock<WorkerStatus>>,
}

impl BackgroundWorker {
    /// 새 백그라운드 워커 생성 및 시작
    pub fn spawn(services: UpdateServices) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<BackgroundTask>(32);
        let (event_tx, _) = broadcast::channel::<WorkerEvent>(64);
        let status = Arc::new(RwLock::new(WorkerStatus::default()));

        let worker = Self {
            services: services.clone(),
            task_tx,
            event_tx: event_tx.clone(),
            status: status.clone(),
        };

        tokio::spawn(async move {
            worker_loop(services, task_rx, event_tx, status).await;
        });

        worker
    }

    pub fn services(&self) -> &UpdateServices {
        &self.services
    }

    /// 태스크 제출
    pub async fn submit(&self, task: BackgroundTask) -> Result<(), String> {
        self.task_tx
            .send(task)
            .await
            .map_err(|e| format!("Failed to submit task: {}", e))
    }

    /// 수동 확인 요청 (큐에 넣고 즉시 반환)
    pub async fn check_now(&self) -> Result<(), String> {
        self.submit(BackgroundTask::CheckUpdate { manual: true }).await
    }

    /// 큐를 거치지 않고 바로 확인하고 결과를 반환
    pub async fn check_and_wait(&self) -> UpdateCheckResult {
        handle_check(&self.services, &self.event_tx, &self.status, true).await
    }

    pub async fn download(&self, url: String, version: String) -> Result<(), String> {
        self.submit(BackgroundTask::Download { url, version }).await
    }

    pub async fn install(&self, path: PathBuf) -> Result<(), String> {
        self.submit(BackgroundTask::Install { path }).await
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// 현재 상태 조회
    pub async fn get_status(&self) -> WorkerStatus {
        self.status.read().await.clone()
    }

    /// 마지막 확인에서 얻은 결과
    pub async fn last_result(&self) -> Option<UpdateCheckResult> {
        self.status.read().await.last_result.clone()
    }

    /// 워커 종료
    pub async fn shutdown(&self) -> Result<(), String> {
        self.submit(BackgroundTask::Shutdown).await
    }
}

/// 워커 메인 루프
async fn worker_loop(
    services: UpdateServices,
    mut task_rx: mpsc::Receiver<BackgroundTask>,
    event_tx: broadcast::Sender<WorkerEvent>,
    status: Arc<RwLock<WorkerStatus>>,
) {
    tracing::info!("[Worker] Background worker started");

    while let Some(task) = task_rx.recv().await {
        match task {
            BackgroundTask::Shutdown => {
                tracing::info!("[Worker] Shutdown requested");
                let _ = event_tx.send(WorkerEvent::WorkerShutdown);
                break;
            }
            BackgroundTask::CheckUpdate { manual } => {
                handle_check(&services, &event_tx, &status, manual).await;
            }
            BackgroundTask::Download { url, version } => {
                handle_download(&services, &event_tx, &status, &url, &version).await;
            }
            BackgroundTask::Install { path } => {
                handle_install(&services, &event_tx, &status, path).await;
            }
        }
    }

    tracing::info!("[Worker] Background worker stopped");
}

async fn set_busy(status: &RwLock<WorkerStatus>, task: Option<String>) {
    let mut s = status.write().await;
    s.busy = task.is_some();
    s.current_task = task;
}

/// 업데이트 확인 처리
async fn handle_check(
    services: &UpdateServices,
    event_tx: &broadcast::Sender<WorkerEvent>,
    status: &RwLock<WorkerStatus>,
    manual: bool,
) -> UpdateCheckResult {
    set_busy(status, Some("Checking for updates...".to_string())).await;
    let _ = event_tx.send(WorkerEvent::CheckStarted);
    tracing::info!("[Worker] Starting update check (manual={})", manual);

    let result = services.checker.check_current_with_connectivity().await;

    {
        let mut s = status.write().await;
        s.last_check = Some(result.checked_at.clone());
        s.last_result = Some(result.clone());
    }
    let _ = event_tx.send(WorkerEvent::CheckCompleted(result.clone()));

    if result.status.update_available() {
        if let Some(config) = &result.config {
            let force = result.status == UpdateStatus::ForceUpdate;
            let _ = event_tx.send(WorkerEvent::UpdateNotification {
                title: if force {
                    "Update required".to_string()
                } else {
                    "Update available".to_string()
                },
                message: format!("Version {} is available", config.latest_version),
                force,
            });
        }
    }

    match &result.error {
        Some(error) if result.status == UpdateStatus::Unknown => {
            tracing::error!("[Worker] Check failed: {}", error);
        }
        _ => tracing::info!("[Worker] Check completed: {:?}", result.status),
    }

    set_busy(status, None).await;
    result
}

/// 다운로드 처리: 진행 상태는 컨트롤러의 watch 채널을 이벤트로 중계
async fn handle_download(
    services: &UpdateServices,
    event_tx: &broadcast::Sender<WorkerEvent>,
    status: &RwLock<WorkerStatus>,
    url: &str,
    version: &str,
) {
    set_busy(status, Some(format!("Downloading {}...", version))).await;
    tracing::info!("[Worker] Starting download: {}", version);

    let mut state_rx = services.downloads.subscribe();
    let forward_tx = event_tx.clone();
    let forwarder = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            let _ = forward_tx.send(WorkerEvent::DownloadProgress(state));
        }
    });

    let outcome = services.downloads.start(url, version).await;
    forwarder.abort();

    match outcome {
        None => tracing::info!("[Worker] Download already in progress, request ignored"),
        Some(state) => match (&state.file_path, &state.error) {
            (Some(path), None) if state.is_done => {
                let _ = event_tx.send(WorkerEvent::DownloadCompleted { path: path.clone() });
                tracing::info!("[Worker] Download completed: {}", path.display());
            }
            (_, error) => {
                let error = error.clone().unwrap_or_else(|| "download did not complete".to_string());
                let _ = event_tx.send(WorkerEvent::DownloadFailed { error: error.clone() });
                tracing::error!("[Worker] Download failed for {}: {}", version, error);
            }
        },
    }

    set_busy(status, None).await;
}

/// 설치 처리
async fn handle_install(
    services: &UpdateServices,
    event_tx: &broadcast::Sender<WorkerEvent>,
    status: &RwLock<WorkerStatus>,
    path: PathBuf,
) {
    set_busy(status, Some(format!("Installing {}...", path.display()))).await;

    match services.installer.install(&path).await {
        Ok(outcome) => {
            let _ = event_tx.send(WorkerEvent::InstallLaunched {
                path: outcome.path,
                exit_code: outcome.exit_code,
            });
        }
        Err(e) => {
            tracing::error!("[Worker] Install failed: {}", e);
            let _ = event_tx.send(WorkerEvent::InstallFailed { error: e.user_message() });
        }
    }

    set_busy(status, None).await;
}

/// 자동 확인 스케줄러: 설정된 간격으로 백그라운드 확인 실행
pub struct AutoCheckScheduler {
    worker: Arc<BackgroundWorker>,
    interval: Duration,
    enabled: bool,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl AutoCheckScheduler {
    pub fn new(worker: Arc<BackgroundWorker>, interval_hours: u64, enabled: bool) -> Self {
        Self::with_interval(worker, Duration::from_secs(interval_hours * 3600), enabled)
    }

    pub fn with_interval(worker: Arc<BackgroundWorker>, interval: Duration, enabled: bool) -> Self {
        Self {
            worker,
            interval,
            enabled,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// 스케줄러 시작
    pub fn start(&mut self) {
        if !self.enabled || self.interval.is_zero() {
            tracing::info!("[Scheduler] Auto-check disabled");
            return;
        }
        self.stop();

        let worker = self.worker.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                tracing::info!("[Scheduler] Auto-check triggered");
                if let Err(e) = worker.submit(BackgroundTask::CheckUpdate { manual: false }).await {
                    tracing::error!("[Scheduler] Failed to submit auto-check: {}", e);
                    break;
                }
            }
        });

        self.handle = Some(handle);
        tracing::info!("[Scheduler] Auto-check started (every {:?})", self.interval);
    }

    /// 스케줄러 중지
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::info!("[Scheduler] Auto-check stopped");
        }
    }
}

impl Drop for AutoCheckScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
