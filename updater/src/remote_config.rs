//! 원격 업데이트 설정(JSON 매니페스트) 클라이언트
//!
//! 최신/최소 지원 버전과 다운로드 URL을 담은 작은 JSON을 가져오고,
//! 마지막으로 성공한 응답 원문을 키-값 저장소에 보관합니다.
//! 가져오기에 실패하면(네트워크, HTTP 상태, 파싱) 캐시로 대체합니다.
//!
//! ```json
//! {
//!   "latest_native_version": "1.2.0+14",
//!   "min_supported_native_version": "1.0.0",
//!   "release_page_url": "https://example.com/releases",
//!   "apk_direct_download_url": "https://example.com/unfilter-1.2.0.apk",
//!   "release_notes": "Bug fixes",
//!   "force_update": false,
//!   "features": ["Storage chart"],
//!   "fixes": ["Crash on launch"]
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::KeyValueStore;
use crate::error::UpdaterError;
use crate::version::AppVersion;

/// 설정 원문 캐시 키
pub const CACHE_KEY: &str = "update_config_cache";
/// 캐시 저장 시각(epoch ms) 키
pub const CACHE_TIMESTAMP_KEY: &str = "update_config_cache_timestamp";
/// 설정 요청 타임아웃
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 원격 업데이트 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(rename = "latest_native_version")]
    pub latest_version: AppVersion,
    #[serde(rename = "min_supported_native_version")]
    pub min_supported_version: AppVersion,
    pub release_page_url: String,
    #[serde(rename = "apk_direct_download_url")]
    pub download_url: String,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub fixes: Vec<String>,
}

impl UpdateConfig {
    /// JSON 원문 파싱 (필수 필드 누락, 잘못된 버전 문자열은 ParseError)
    pub fn from_json(raw: &str) -> Result<Self, UpdaterError> {
        serde_json::from_str(raw).map_err(|e| UpdaterError::parse("update config", e.to_string()))
    }
}

/// 설정을 어디서 얻었는지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Remote,
    Cache,
}

/// 캐시에서 읽은 설정
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedConfig {
    pub config: UpdateConfig,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// `fetch_config` 결과
#[derive(Debug, Clone, Serialize)]
pub struct FetchedConfig {
    pub config: UpdateConfig,
    pub source: ConfigSource,
    pub fetched_at: Option<DateTime<Utc>>,
    /// 캐시로 대체된 경우 원래 실패 원인
    pub fetch_error: Option<UpdaterError>,
}

/// 원격 설정 클라이언트
pub struct RemoteConfigClient {
    http: reqwest::Client,
    url: String,
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
    /// 캐시 대체 허용 기간 (None이면 만료 없음)
    cache_max_age: Option<Duration>,
}

impl RemoteConfigClient {
    pub fn new(url: &str, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_timeout(url, store, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: &str, store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("unfilter-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            http,
            url: url.trim().to_string(),
            store,
            timeout,
            cache_max_age: None,
        }
    }

    pub fn with_cache_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.cache_max_age = max_age;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 네트워크에서만 설정을 가져옴 (캐시 대체 없음, 성공 시 캐시 갱신)
    pub async fn fetch_remote(&self) -> Result<UpdateConfig, UpdaterError> {
        if self.url.is_empty() {
            return Err(UpdaterError::unknown("update config URL is not configured"));
        }

        let secs = self.timeout.as_secs();
        let response = self
            .http
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "fetch update config", secs))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdaterError::ApiError {
                status_code: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "read update config", secs))?;
        let config = UpdateConfig::from_json(&body)?;

        self.store_cache(&body);
        tracing::info!(
            "[RemoteConfig] Fetched config: latest={}, min={}, force={}",
            config.latest_version,
            config.min_supported_version,
            config.force_update
        );
        Ok(config)
    }

    /// 설정 가져오기: 실패 시 캐시로 대체
    ///
    /// 캐시도 없거나 손상되었으면 원래의 가져오기 에러를 반환합니다.
    pub async fn fetch_config(&self) -> Result<FetchedConfig, UpdaterError> {
        match self.fetch_remote().await {
            Ok(config) => Ok(FetchedConfig {
                config,
                source: ConfigSource::Remote,
                fetched_at: Some(Utc::now()),
                fetch_error: None,
            }),
            Err(err) => {
                tracing::warn!("[RemoteConfig] Fetch failed, trying cache: {}", err);
                match self.usable_cached_config() {
                    Some(cached) => {
                        tracing::info!(
                            "[RemoteConfig] Using cached config (fetched at {:?})",
                            cached.fetched_at
                        );
                        Ok(FetchedConfig {
                            config: cached.config,
                            source: ConfigSource::Cache,
                            fetched_at: cached.fetched_at,
                            fetch_error: Some(err),
                        })
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// 캐시된 설정 읽기 (손상된 항목은 삭제)
    pub fn get_cached_config(&self) -> Option<CachedConfig> {
        let raw = self.store.get(CACHE_KEY)?;
        match UpdateConfig::from_json(&raw) {
            Ok(config) => {
                let fetched_at = self
                    .store
                    .get(CACHE_TIMESTAMP_KEY)
                    .and_then(|ts| ts.parse::<i64>().ok())
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                Some(CachedConfig { config, fetched_at })
            }
            Err(e) => {
                tracing::warn!("[RemoteConfig] Cached config is corrupt, removing: {}", e);
                self.clear_cache();
                None
            }
        }
    }

    /// 캐시 기간 제한을 적용한 캐시 조회
    pub(crate) fn usable_cached_config(&self) -> Option<CachedConfig> {
        let cached = self.get_cached_config()?;
        let Some(max_age) = self.cache_max_age else {
            return Some(cached);
        };
        let max_age = chrono::Duration::from_std(max_age).ok()?;
        match cached.fetched_at {
            Some(at) if Utc::now() - at <= max_age => Some(cached),
            _ => {
                tracing::info!("[RemoteConfig] Cached config is older than {:?}, ignoring", self.cache_max_age);
                None
            }
        }
    }

    /// 캐시 삭제
    pub fn clear_cache(&self) {
        for key in [CACHE_KEY, CACHE_TIMESTAMP_KEY] {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!("[RemoteConfig] Failed to remove {}: {}", key, e);
            }
        }
    }

    fn store_cache(&self, raw: &str) {
        let now = Utc::now().timestamp_millis().to_string();
        if let Err(e) = self
            .store
            .set(CACHE_KEY, raw)
            .and_then(|_| self.store.set(CACHE_TIMESTAMP_KEY, &now))
        {
            tracing::warn!("[RemoteConfig] Failed to persist config cache: {}", e);
        }
    }
}
