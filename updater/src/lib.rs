//! # Unfilter 업데이터 라이브러리
//!
//! 원격 JSON 매니페스트를 기준으로 앱 업데이트 여부를 판정하고,
//! APK를 내려받아 플랫폼 설치 관리자에 넘깁니다.
//!
//! ## 동작 원리
//! - **연결 확인(connectivity.rs)**: DNS 조회로 오프라인/서버 불가 상태 구분
//! - **원격 설정(remote_config.rs)**: 매니페스트 조회, 실패 시 마지막 성공 응답 캐시 사용
//! - **판정(checker.rs)**: 현재 버전과 최신/최소 지원 버전 비교
//! - **다운로드(download.rs)**: 임시 파일 스트리밍 후 원자적 이름 변경
//! - **설치(install.rs)**: 설치 명령 실행
//! - **백그라운드 워커(worker.rs)**: 주기적 확인, 이벤트 브로드캐스트
//!
//! ## 매니페스트 예시
//! ```json
//! {
//!   "latest_native_version": "1.2.0+14",
//!   "min_supported_native_version": "1.0.0",
//!   "release_page_url": "https://example.com/releases",
//!   "apk_direct_download_url": "https://example.com/unfilter-1.2.0.apk"
//! }
//! ```

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod cache;
pub mod checker;
pub mod connectivity;
pub mod download;
pub mod error;
pub mod install;
pub mod remote_config;
pub mod version;
pub mod worker;


pub use cache::{FileStore, KeyValueStore, MemoryStore};
pub use checker::{decide, UpdateCheckResult, UpdateChecker, UpdateStatus};
pub use connectivity::{ConnectivityChecker, ConnectivityStatus, DnsResolver, HostResolver, StaticResolver};
pub use download::{ApkDownloader, DownloadController, DownloadState};
pub use error::{ErrorType, UpdaterError};
pub use install::{InstallOutcome, Installer};
pub use remote_config::{CachedConfig, ConfigSource, FetchedConfig, RemoteConfigClient, UpdateConfig};
pub use version::AppVersion;
pub use worker::{AutoCheckScheduler, BackgroundTask, BackgroundWorker, UpdateServices, WorkerEvent, WorkerStatus};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════
// 설정
// ══════════════════════════════════════════════════════

/// 업데이터 설정 (`[updater]` 섹션)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterSettings {
    /// 업데이트 매니페스트 URL
    pub config_url: String,
    /// 다운로드 파일명 접두사
    pub app_name: String,
    /// 현재 버전 오버라이드 (없으면 패키지 버전)
    pub current_version: Option<String>,
    /// 다운로드 디렉터리 (기본값: 임시 디렉터리 하위)
    pub download_dir: Option<PathBuf>,
    /// 설정 캐시 파일 (기본값: 다운로드 디렉터리의 `update_cache.json`)
    pub cache_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_hosts: Vec<String>,
    /// 설치 명령 (비어 있으면 플랫폼 기본값)
    pub installer_command: Vec<String>,
    /// 캐시 허용 기간 (0이면 만료 없음)
    pub cache_max_age_hours: u64,
    /// 자동 확인 주기 (시간, 0이면 비활성)
    pub check_interval_hours: u64,
    pub auto_check: bool,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            config_url: String::new(),
            app_name: "unfilter".to_string(),
            current_version: None,
            download_dir: None,
            cache_path: None,
            request_timeout_secs: remote_config::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            probe_timeout_secs: connectivity::DEFAULT_PROBE_TIMEOUT.as_secs(),
            probe_hosts: connectivity::DEFAULT_PROBE_HOSTS.iter().map(|h| h.to_string()).collect(),
            installer_command: Vec::new(),
            cache_max_age_hours: 0,
            check_interval_hours: 6,
            auto_check: true,
        }
    }
}

impl UpdaterSettings {
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("{}-updates", self.app_name)))
    }

    pub fn resolved_cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.resolved_download_dir().join("update_cache.json"))
    }

    pub fn cache_max_age(&self) -> Option<Duration> {
        match self.cache_max_age_hours {
            0 => None,
            hours => Some(Duration::from_secs(hours * 3600)),
        }
    }

    /// 설정으로 구성요소를 조립 (시스템 리졸버, 파일 캐시)
    pub fn build_services(&self) -> UpdateServices {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(self.resolved_cache_path()));
        let connectivity = ConnectivityChecker::for_config_url(
            &self.config_url,
            self.probe_hosts.clone(),
            Duration::from_secs(self.probe_timeout_secs),
        );
        self.build_services_with(store, connectivity)
    }

    /// 저장소와 연결 확인기를 주입하여 조립
    pub fn build_services_with(
        &self,
        store: Arc<dyn KeyValueStore>,
        connectivity: ConnectivityChecker,
    ) -> UpdateServices {
        let connectivity = Arc::new(connectivity);
        let remote = Arc::new(
            RemoteConfigClient::with_timeout(
                &self.config_url,
                store,
                Duration::from_secs(self.request_timeout_secs),
            )
            .with_cache_max_age(self.cache_max_age()),
        );
        let checker = Arc::new(
            UpdateChecker::new(remote, connectivity.clone())
                .with_current_version(self.current_version.clone()),
        );
        let downloads = Arc::new(DownloadController::new(
            Arc::new(ApkDownloader::new(self.resolved_download_dir(), &self.app_name)),
            Some(connectivity),
        ));
        let installer = Arc::new(Installer::with_command(self.installer_command.clone()));

        tracing::debug!(
            "[Updater] Services built for {} (download dir: {})",
            self.config_url,
            self.resolved_download_dir().display()
        );

        UpdateServices { checker, downloads, installer }
    }
}
