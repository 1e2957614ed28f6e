//! 로컬 IPC HTTP 서버: 업데이트 파이프라인과 태스크 매니저 뷰를 노출
//!
//! ## 엔드포인트
//! - `GET    /api/connectivity`: 연결 상태 확인
//! - `POST   /api/updates/check`: 업데이트 확인
//! - `GET    /api/updates/status`: 워커 상태 (마지막 확인 결과 포함)
//! - `GET    /api/updates/config`: 캐시된 업데이트 설정
//! - `DELETE /api/updates/config`: 설정 캐시 삭제
//! - `GET    /api/updates/download`: 다운로드 상태
//! - `POST   /api/updates/download`: 마지막 확인 결과의 APK 다운로드 시작
//! - `POST   /api/updates/install`: 완료된 다운로드 설치 (파일이 사라졌으면 404)
//! - `GET    /api/taskmgr`: 태스크 매니저 뷰

pub mod error;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use unfilter_updater_lib::{BackgroundWorker, UpdaterError};

use crate::taskmgr::TaskManagerView;
pub use error::IpcError;

/// IPC 공유 상태
#[derive(Clone)]
pub struct IpcState {
    pub worker: Arc<BackgroundWorker>,
    pub taskmgr: watch::Receiver<Arc<TaskManagerView>>,
}

/// IPC Server
#[derive(Clone)]
pub struct IPCServer {
    pub state: IpcState,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(state: IpcState, listen_addr: &str) -> Self {
        Self {
            state,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub async fn start(self) -> Result<()> {
        let router = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("[IPC] Listening on http://{}", self.listen_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// 라우터 생성 (테스트에서 직접 호출)
pub fn router(state: IpcState) -> Router {
    Router::new()
        .route("/api/connectivity", get(get_connectivity))
        .route("/api/updates/check", post(check_updates))
        .route("/api/updates/status", get(get_status))
        .route("/api/updates/config", get(get_cached_config).delete(clear_cached_config))
        .route("/api/updates/download", get(get_download).post(start_download))
        .route("/api/updates/install", post(install_update))
        .route("/api/taskmgr", get(get_taskmgr))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ═══════════════════════════════════════════════════════
// 핸들러
// ═══════════════════════════════════════════════════════

/// GET /api/connectivity
async fn get_connectivity(State(state): State<IpcState>) -> impl IntoResponse {
    let status = state
        .worker
        .services()
        .checker
        .connectivity()
        .check_connectivity()
        .await;
    Json(json!({ "ok": true, "status": status }))
}

/// POST /api/updates/check: 큐를 거치지 않고 확인 후 결과 반환
async fn check_updates(State(state): State<IpcState>) -> impl IntoResponse {
    let result = state.worker.check_and_wait().await;
    Json(json!({ "ok": true, "result": result }))
}

/// GET /api/updates/status
async fn get_status(State(state): State<IpcState>) -> impl IntoResponse {
    let status = state.worker.get_status().await;
    Json(json!({ "ok": true, "status": status }))
}

/// GET /api/updates/config: 캐시된 설정 (없으면 404)
async fn get_cached_config(State(state): State<IpcState>) -> Result<impl IntoResponse, IpcError> {
    let cached = state
        .worker
        .services()
        .checker
        .remote()
        .get_cached_config()
        .ok_or_else(|| IpcError::NotFound("No cached update config".to_string()))?;
    Ok(Json(json!({
        "ok": true,
        "config": cached.config,
        "fetched_at": cached.fetched_at,
    })))
}

/// DELETE /api/updates/config
async fn clear_cached_config(State(state): State<IpcState>) -> impl IntoResponse {
    state.worker.services().checker.remote().clear_cache();
    tracing::info!("[IPC] Update config cache cleared");
    Json(json!({ "ok": true }))
}

/// GET /api/updates/download
async fn get_download(State(state): State<IpcState>) -> impl IntoResponse {
    let download = state.worker.services().downloads.state();
    Json(json!({ "ok": true, "download": download }))
}

/// POST /api/updates/download: 마지막 확인에서 받은 설정의 APK를 백그라운드로 다운로드
async fn start_download(State(state): State<IpcState>) -> Result<impl IntoResponse, IpcError> {
    let config = state
        .worker
        .last_result()
        .await
        .and_then(|r| r.config)
        .ok_or_else(|| IpcError::Conflict("No update config known; run a check first".to_string()))?;

    let downloads = &state.worker.services().downloads;
    if downloads.state().is_downloading {
        return Ok((
            StatusCode::OK,
            Json(json!({ "ok": true, "started": false, "download": downloads.state() })),
        ));
    }

    state
        .worker
        .download(config.download_url.clone(), config.latest_version.to_string())
        .await
        .map_err(IpcError::WorkerUnavailable)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "ok": true,
            "started": true,
            "version": config.latest_version,
            "download": downloads.state(),
        })),
    ))
}

/// POST /api/updates/install: 완료된 다운로드가 있어야 함
async fn install_update(State(state): State<IpcState>) -> Result<impl IntoResponse, IpcError> {
    let path = state
        .worker
        .services()
        .downloads
        .completed_path()
        .ok_or_else(|| IpcError::Conflict("No finished download to install".to_string()))?;

    // 다운로드 이후 파일이 지워졌으면 큐에 넣지 않음
    if tokio::fs::metadata(&path).await.is_err() {
        return Err(UpdaterError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        }
        .into());
    }

    state
        .worker
        .install(path.clone())
        .await
        .map_err(IpcError::WorkerUnavailable)?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true, "path": path }))))
}

/// GET /api/taskmgr
async fn get_taskmgr(State(state): State<IpcState>) -> impl IntoResponse {
    let view = state.taskmgr.borrow().clone();
    Json(json!({ "ok": true, "view": view.as_ref() }))
}
