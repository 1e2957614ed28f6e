//! APK 다운로드: 임시 파일 + 원자적 이름 변경
//!
//! ## 동작
//! - 파일명은 버전 태그로 결정됨: `<app>_update_<version>.apk`
//! - 같은 이름의 완전한 파일(크기 > 0)이 있으면 네트워크 없이 즉시 100% 보고
//! - `.tmp` 파일에 스트리밍으로 쓰고, 완료되면 flush 후 최종 이름으로 변경
//! - 전송 중 끊기면 `.tmp` 파일은 남겨두고 `DownloadInterrupted` 반환
//!
//! `DownloadController`는 컨트롤러당 하나의 다운로드만 허용하며,
//! 진행 중에 들어온 시작 요청은 조용히 무시합니다.

use std::error::Error as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::connectivity::{ConnectivityChecker, ConnectivityStatus};
use crate::error::{ErrorType, UpdaterError};

/// 다운로드 진행 상태
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadState {
    /// 0.0 ~ 1.0
    pub progress: f64,
    pub is_downloading: bool,
    pub is_done: bool,
    /// 사용자 메시지
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
    pub file_path: Option<PathBuf>,
    /// 진행 중이거나 마지막으로 받은 버전 태그
    pub version: Option<String>,
}

/// APK 다운로더
pub struct ApkDownloader {
    http: reqwest::Client,
    download_dir: PathBuf,
    app_name: String,
}

impl ApkDownloader {
    pub fn new(download_dir: impl Into<PathBuf>, app_name: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("unfilter-updater/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            download_dir: download_dir.into(),
            app_name: app_name.to_string(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 버전 태그로 결정되는 최종 파일명
    pub fn artifact_name(&self, version_tag: &str) -> String {
        let safe: String = version_tag
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+') { c } else { '_' })
            .collect();
        format!("{}_update_{}.apk", self.app_name, safe)
    }

    pub fn artifact_path(&self, version_tag: &str) -> PathBuf {
        self.download_dir.join(self.artifact_name(version_tag))
    }

    /// 이미 받아 둔 완전한 파일 (길이 > 0)
    pub async fn complete_artifact(&self, version_tag: &str) -> Option<PathBuf> {
        let path = self.artifact_path(version_tag);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// 다운로드 실행
    ///
    /// `on_progress`는 청크마다 `받은 바이트 / 전체 길이`로 호출됩니다.
    /// 전체 길이를 모르면(0 또는 없음) 호출되지 않습니다.
    pub async fn download<F>(&self, url: &str, version_tag: &str, mut on_progress: F) -> Result<PathBuf, UpdaterError>
    where
        F: FnMut(f64) + Send,
    {
        let final_path = self.artifact_path(version_tag);
        let tmp_path = Self::temp_path(&final_path);
        let final_display = final_path.to_string_lossy().to_string();
        let tmp_display = tmp_path.to_string_lossy().to_string();

        tokio::fs::create_dir_all(&self.download_dir).await.map_err(|e| {
            UpdaterError::from_io(&e, "create download directory", &self.download_dir.to_string_lossy())
        })?;

        // 이미 받은 완전한 파일이 있으면 네트워크 요청 없이 종료
        match tokio::fs::metadata(&final_path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                tracing::info!("[Downloader] {} already downloaded ({} bytes)", final_display, meta.len());
                on_progress(1.0);
                return Ok(final_path);
            }
            Ok(meta) if meta.is_file() => {
                tracing::warn!("[Downloader] Removing empty artifact {}", final_display);
                remove_if_exists(&final_path).await?;
            }
            _ => {}
        }

        // 이전에 중단된 임시 파일 정리
        remove_if_exists(&tmp_path).await?;

        tracing::info!("[Downloader] Downloading {} -> {}", url, final_display);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "download update", 0))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::ApiError {
                status_code: status.as_u16(),
                message: format!("download of {} failed", url),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "create", &tmp_display))?;

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::warn!("[Downloader] Stream error after {} bytes: {}", received, e);
                classify_stream_error(&e, &final_display, received, total)
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::from_io(&e, "write", &tmp_display))?;
            received += chunk.len() as u64;
            if total > 0 {
                on_progress((received as f64 / total as f64).min(1.0));
            }
        }

        if total > 0 && received < total {
            tracing::warn!("[Downloader] Body ended early: {}/{} bytes", received, total);
            return Err(UpdaterError::DownloadInterrupted {
                artifact: final_display,
                downloaded_bytes: received,
                total_bytes: total,
            });
        }

        file.flush()
            .await
            .map_err(|e| UpdaterError::from_io(&e, "flush", &tmp_display))?;
        file.sync_all()
            .await
            .map_err(|e| UpdaterError::from_io(&e, "sync", &tmp_display))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "rename", &tmp_display))?;

        tracing::info!("[Downloader] Downloaded {} ({} bytes)", final_display, received);
        Ok(final_path)
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), UpdaterError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdaterError::from_io(&e, "remove", &path.to_string_lossy())),
    }
}

/// 스트림 에러 분류: 원인 체인의 IO 에러 → 메시지 휴리스틱 → 다운로드 중단
fn classify_stream_error(err: &reqwest::Error, artifact: &str, received: u64, total: u64) -> UpdaterError {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_storage_error(io_err) {
                return UpdaterError::from_io(io_err, "download", artifact);
            }
            break;
        }
        source = cause.source();
    }

    match UpdaterError::classify_message(&err.to_string()) {
        fs @ UpdaterError::FileSystemError { .. } => fs,
        _ => UpdaterError::DownloadInterrupted {
            artifact: artifact.to_string(),
            downloaded_bytes: received,
            total_bytes: total,
        },
    }
}

/// 권한/공간 부족 계열 IO 에러 (ENOSPC=28, Windows ERROR_DISK_FULL=112)
fn is_storage_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied || matches!(err.raw_os_error(), Some(28) | Some(112))
}

/// 단일 다운로드 세션을 관리하는 컨트롤러
pub struct DownloadController {
    downloader: Arc<ApkDownloader>,
    connectivity: Option<Arc<ConnectivityChecker>>,
    state_tx: watch::Sender<DownloadState>,
}

impl DownloadController {
    pub fn new(downloader: Arc<ApkDownloader>, connectivity: Option<Arc<ConnectivityChecker>>) -> Self {
        let (state_tx, _) = watch::channel(DownloadState::default());
        Self { downloader, connectivity, state_tx }
    }

    pub fn downloader(&self) -> &Arc<ApkDownloader> {
        &self.downloader
    }

    /// 상태 변경 구독
    pub fn subscribe(&self) -> watch::Receiver<DownloadState> {
        self.state_tx.subscribe()
    }

    /// 현재 상태 스냅샷
    pub fn state(&self) -> DownloadState {
        self.state_tx.borrow().clone()
    }

    /// 완료된 다운로드 파일 경로
    pub fn completed_path(&self) -> Option<PathBuf> {
        let state = self.state_tx.borrow();
        if state.is_done { state.file_path.clone() } else { None }
    }

    /// 다운로드 시작: 이미 진행 중이면 `None` (무시됨)
    pub async fn start(&self, url: &str, version: &str) -> Option<DownloadState> {
        let claimed = self.state_tx.send_if_modified(|s| {
            if s.is_downloading {
                false
            } else {
                *s = DownloadState {
                    is_downloading: true,
                    version: Some(version.to_string()),
                    ..Default::default()
                };
                true
            }
        });
        if !claimed {
            tracing::debug!("[Downloader] Download already running, ignoring request for {}", version);
            return None;
        }

        let result = self.run(url, version).await;

        self.state_tx.send_modify(|s| {
            s.is_downloading = false;
            match &result {
                Ok(path) => {
                    s.progress = 1.0;
                    s.is_done = true;
                    s.file_path = Some(path.clone());
                }
                Err(e) => {
                    s.error = Some(e.user_message());
                    s.error_type = Some(e.error_type());
                }
            }
        });

        if let Err(e) = &result {
            tracing::error!("[Downloader] Download of {} failed: {}", version, e);
        }
        Some(self.state())
    }

    async fn run(&self, url: &str, version: &str) -> Result<PathBuf, UpdaterError> {
        // 완전한 파일이 있으면 연결 확인도 건너뜀
        let needs_network = self.downloader.complete_artifact(version).await.is_none();
        if let (true, Some(connectivity)) = (needs_network, &self.connectivity) {
            let status = connectivity.check_connectivity().await;
            if matches!(status, ConnectivityStatus::Offline | ConnectivityStatus::ServerUnreachable) {
                return Err(UpdaterError::Connectivity { status });
            }
        }

        let tx = &self.state_tx;
        self.downloader
            .download(url, version, |fraction| {
                tx.send_if_modified(|s| {
                    if fraction > s.progress {
                        s.progress = fraction;
                        true
                    } else {
                        false
                    }
                });
            })
            .await
    }

    /// 상태 초기화 (진행 중이면 무시하고 false)
    pub fn reset(&self) -> bool {
        self.state_tx.send_if_modified(|s| {
            if s.is_downloading {
                false
            } else {
                *s = DownloadState::default();
                true
            }
        })
    }
}
