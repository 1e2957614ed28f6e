//! 플랫폼 데이터 소스
//!
//! 프로세스 테이블, 최근 사용 앱, 시스템 정보를 가져오는 동기 인터페이스입니다.
//! sysinfo 호출은 OS 프로세스 테이블 전체를 스캔하므로 폴러가
//! `spawn_blocking`에서 호출합니다.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sysinfo::{System, Users};

use super::model::{ActiveApp, ProcessRecord, SystemStats};

/// 데이터 소스 에러
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Usage file '{path}' could not be read: {message}")]
    Io { path: String, message: String },

    #[error("Usage file '{path}' is malformed: {message}")]
    Parse { path: String, message: String },

    #[error("{0} source is unavailable")]
    Unavailable(String),

    #[error("Poll task failed: {0}")]
    Task(String),
}

pub trait ProcessSource: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessRecord>, SourceError>;
}

pub trait AppSource: Send + Sync {
    fn active_apps(&self) -> Result<Vec<ActiveApp>, SourceError>;
}

pub trait SystemSource: Send + Sync {
    fn system_stats(&self) -> Result<SystemStats, SourceError>;
}

// ═══════════════════════════════════════════════════════
// sysinfo
// ═══════════════════════════════════════════════════════

/// sysinfo 기반 프로세스/시스템 소스
///
/// CPU 사용률은 직전 갱신과의 차이로 계산되므로 `System`을 계속 유지합니다.
pub struct SysinfoSource {
    system: Mutex<System>,
    users: Users,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            users: Users::new_with_refreshed_list(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, System>, SourceError> {
        self.system
            .lock()
            .map_err(|_| SourceError::Unavailable("sysinfo".to_string()))
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SysinfoSource {
    fn processes(&self) -> Result<Vec<ProcessRecord>, SourceError> {
        let mut sys = self.lock()?;
        sys.refresh_memory();
        sys.refresh_processes();

        let total_memory = sys.total_memory();
        let mut records: Vec<ProcessRecord> = sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let user = process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|u| u.name().to_string())
                    .unwrap_or_default();
                ProcessRecord {
                    pid: pid.to_string(),
                    user,
                    name: process.name().to_string(),
                    cpu: process.cpu_usage() as f64,
                    mem: if total_memory > 0 {
                        process.memory() as f64 / total_memory as f64 * 100.0
                    } else {
                        0.0
                    },
                    res: process.memory(),
                    vsz: process.virtual_memory(),
                    status: process.status().to_string(),
                }
            })
            .collect();

        records.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(std::cmp::Ordering::Equal));
        tracing::debug!("[TaskManager] Found {} running processes", records.len());
        Ok(records)
    }
}

impl SystemSource for SysinfoSource {
    fn system_stats(&self) -> Result<SystemStats, SourceError> {
        let mut sys = self.lock()?;
        sys.refresh_memory();
        sys.refresh_cpu();

        Ok(SystemStats {
            total_memory: sys.total_memory(),
            used_memory: sys.used_memory(),
            available_memory: sys.available_memory(),
            cpu_usage: sys.global_cpu_info().cpu_usage() as f64,
            cpu_count: sys.cpus().len(),
            kernel_version: System::kernel_version(),
            os_name: System::name(),
        })
    }
}

// ═══════════════════════════════════════════════════════
// 사용 통계 파일
// ═══════════════════════════════════════════════════════

/// 플랫폼 브리지가 기록한 `ActiveApp` JSON 배열 파일
#[derive(Debug, Clone)]
pub struct UsageFileSource {
    path: PathBuf,
}

impl UsageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppSource for UsageFileSource {
    fn active_apps(&self) -> Result<Vec<ActiveApp>, SourceError> {
        let path_str = self.path.display().to_string();
        let content = std::fs::read_to_string(&self.path).map_err(|e| SourceError::Io {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let mut apps: Vec<ActiveApp> = serde_json::from_str(&content).map_err(|e| SourceError::Parse {
            path: path_str,
            message: e.to_string(),
        })?;
        apps.sort_by(|a, b| b.last_time_used.cmp(&a.last_time_used));
        Ok(apps)
    }
}

/// 사용 통계 파일이 설정되지 않은 경우
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAppSource;

impl AppSource for NoAppSource {
    fn active_apps(&self) -> Result<Vec<ActiveApp>, SourceError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_file_is_sorted_by_last_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(
            &path,
            r#"[
                {"packageName":"com.old","appName":"Old","lastTimeUsed":1},
                {"packageName":"com.new","appName":"New","lastTimeUsed":5,"icon":"AAE="}
            ]"#,
        )
        .unwrap();

        let apps = UsageFileSource::new(&path).active_apps().unwrap();
        assert_eq!(apps[0].package_name, "com.new");
        assert_eq!(apps[0].icon.as_deref(), Some(&[0u8, 1][..]));
        assert_eq!(apps[1].package_name, "com.old");
    }

    #[test]
    fn usage_file_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = UsageFileSource::new(dir.path().join("none.json"));
        assert!(matches!(missing.active_apps(), Err(SourceError::Io { .. })));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[{").unwrap();
        assert!(matches!(UsageFileSource::new(&path).active_apps(), Err(SourceError::Parse { .. })));
    }

    #[test]
    fn sysinfo_lists_current_process() {
        let source = SysinfoSource::new();
        let own = std::process::id().to_string();
        let processes = source.processes().unwrap();
        assert!(processes.iter().any(|p| p.pid == own));

        let stats = source.system_stats().unwrap();
        assert!(stats.total_memory > 0);
        assert!(stats.cpu_count > 0);
    }
}
