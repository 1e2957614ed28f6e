//! 업데이트 판정 엔진
//!
//! 현재 버전 + 원격 설정 (+ 연결 상태)을 조합하여
//! `UpToDate` / `SoftUpdate` / `ForceUpdate` / `Unknown` 중 하나로 판정합니다.
//!
//! ## 판정 순서
//! 1. 현재 < 최소 지원 버전 (빌드 번호 무시) → `ForceUpdate`
//! 2. 현재 < 최신 버전 → `force_update` 플래그면 `ForceUpdate`, 아니면 `SoftUpdate`
//! 3. 그 외 → `UpToDate`
//!
//! 최신 버전 비교는 양쪽 모두 빌드 번호가 있을 때 빌드 번호까지 봅니다.
//! (같은 1.0.0이라도 +1 → +2는 핫픽스 업데이트)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::connectivity::{ConnectivityChecker, ConnectivityStatus};
use crate::error::{ErrorType, UpdaterError};
use crate::remote_config::{ConfigSource, RemoteConfigClient, UpdateConfig};
use crate::version::AppVersion;

/// 업데이트 판정 결과 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    SoftUpdate,
    ForceUpdate,
    Unknown,
}

impl UpdateStatus {
    pub fn update_available(&self) -> bool {
        matches!(self, UpdateStatus::SoftUpdate | UpdateStatus::ForceUpdate)
    }
}

/// 한 번의 확인 결과 (생성 후 변경되지 않음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    pub status: UpdateStatus,
    pub config: Option<UpdateConfig>,
    pub current_version: Option<AppVersion>,
    /// 사용자에게 보여줄 메시지 (기술적인 내용은 로그에만 남음)
    pub error: Option<String>,
    pub error_type: Option<ErrorType>,
    /// 판정에 사용한 설정의 출처
    pub config_source: Option<ConfigSource>,
    pub checked_at: String,
}

impl UpdateCheckResult {
    fn decided(
        current: AppVersion,
        config: UpdateConfig,
        source: ConfigSource,
        error: Option<&UpdaterError>,
    ) -> Self {
        Self {
            status: decide(&current, &config),
            config: Some(config),
            current_version: Some(current),
            error: error.map(UpdaterError::user_message),
            error_type: error.map(UpdaterError::error_type),
            config_source: Some(source),
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn unknown(current: Option<AppVersion>, error: &UpdaterError) -> Self {
        Self {
            status: UpdateStatus::Unknown,
            config: None,
            current_version: current,
            error: Some(error.user_message()),
            error_type: Some(error.error_type()),
            config_source: None,
            checked_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 순수 판정 함수
pub fn decide(current: &AppVersion, config: &UpdateConfig) -> UpdateStatus {
    if current.is_lower_than(&config.min_supported_version, true) {
        return UpdateStatus::ForceUpdate;
    }
    if current.is_lower_than(&config.latest_version, false) {
        return if config.force_update {
            UpdateStatus::ForceUpdate
        } else {
            UpdateStatus::SoftUpdate
        };
    }
    UpdateStatus::UpToDate
}

/// 업데이트 확인기
pub struct UpdateChecker {
    remote: Arc<RemoteConfigClient>,
    connectivity: Arc<ConnectivityChecker>,
    /// 설정에서 지정한 현재 버전 (없으면 패키지 버전)
    current_version_override: Option<String>,
}

impl UpdateChecker {
    pub fn new(remote: Arc<RemoteConfigClient>, connectivity: Arc<ConnectivityChecker>) -> Self {
        Self {
            remote,
            connectivity,
            current_version_override: None,
        }
    }

    pub fn with_current_version(mut self, version: Option<String>) -> Self {
        self.current_version_override = version.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn remote(&self) -> &Arc<RemoteConfigClient> {
        &self.remote
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityChecker> {
        &self.connectivity
    }

    /// 현재 실행 중인 앱 버전
    pub fn current_version(&self) -> Result<AppVersion, UpdaterError> {
        let raw = self
            .current_version_override
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"));
        AppVersion::parse(raw)
    }

    /// 주어진 버전으로 업데이트 확인
    pub async fn check_update(&self, current: &AppVersion) -> UpdateCheckResult {
        match self.remote.fetch_config().await {
            Ok(fetched) => {
                let result = UpdateCheckResult::decided(
                    *current,
                    fetched.config,
                    fetched.source,
                    fetched.fetch_error.as_ref(),
                );
                tracing::info!(
                    "[Checker] {} -> {:?} (source: {:?})",
                    current,
                    result.status,
                    fetched.source
                );
                result
            }
            Err(e) => {
                tracing::warn!("[Checker] Update check failed: {}", e);
                UpdateCheckResult::unknown(Some(*current), &e)
            }
        }
    }

    /// 버전 문자열로 업데이트 확인
    pub async fn check_update_str(&self, current: &str) -> UpdateCheckResult {
        match AppVersion::parse(current) {
            Ok(version) => self.check_update(&version).await,
            Err(e) => {
                tracing::warn!("[Checker] Invalid current version '{}': {}", current, e);
                UpdateCheckResult::unknown(None, &e)
            }
        }
    }

    /// 현재 앱 버전으로 업데이트 확인
    pub async fn check_current(&self) -> UpdateCheckResult {
        match self.current_version() {
            Ok(version) => self.check_update(&version).await,
            Err(e) => UpdateCheckResult::unknown(None, &e),
        }
    }

    /// 연결 상태를 먼저 확인하는 경로
    ///
    /// 업데이트 서버에 닿지 않으면 네트워크 요청을 시도하지 않고,
    /// 캐시된 설정이 있으면 그것으로 판정, 없으면 `Unknown`을 반환합니다.
    pub async fn check_with_connectivity(&self, current: &AppVersion) -> UpdateCheckResult {
        let status = self.connectivity.check_update_server_connectivity().await;
        if status == ConnectivityStatus::Connected {
            return self.check_update(current).await;
        }

        let error = UpdaterError::Connectivity { status };
        tracing::info!("[Checker] Skipping remote fetch: {}", status);
        match self.remote.usable_cached_config() {
            Some(cached) => {
                UpdateCheckResult::decided(*current, cached.config, ConfigSource::Cache, Some(&error))
            }
            None => UpdateCheckResult::unknown(Some(*current), &error),
        }
    }

    /// 현재 앱 버전으로 연결 상태 우선 확인
    pub async fn check_current_with_connectivity(&self) -> UpdateCheckResult {
        match self.current_version() {
            Ok(version) => self.check_with_connectivity(&version).await,
            Err(e) => UpdateCheckResult::unknown(None, &e),
        }
    }
}
