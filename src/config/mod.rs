use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use unfilter_updater_lib::UpdaterSettings;

use crate::taskmgr::TaskManagerSettings;

/// 설정 파일 경로를 지정하는 환경 변수
pub const CONFIG_ENV: &str = "UNFILTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/unfilter.toml";
pub const DEFAULT_IPC_ADDR: &str = "127.0.0.1:57480";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    pub ipc_addr: String,
    pub updater: UpdaterSettings,
    pub taskmgr: TaskManagerSettings,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            ipc_addr: DEFAULT_IPC_ADDR.to_string(),
            updater: UpdaterSettings::default(),
            taskmgr: TaskManagerSettings::default(),
        }
    }
}

impl GlobalConfig {
    /// `UNFILTER_CONFIG` 또는 기본 경로에서 로드
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// 파일이 없으면 기본값, 형식이 잘못되었으면 에러
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg = Self::from_toml_str(&content)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read config {}", path.display())),
        }
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GlobalConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, GlobalConfig::default());
        assert_eq!(cfg.ipc_addr, DEFAULT_IPC_ADDR);
        assert_eq!(cfg.taskmgr.process_interval_secs, 5);
        assert_eq!(cfg.updater.request_timeout_secs, 10);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let cfg = GlobalConfig::from_toml_str(
            r#"
            [updater]
            config_url = "https://updates.example.com/update_config.json"
            current_version = "1.0.0+1"
            installer_command = ["pm", "install", "-r"]
            cache_max_age_hours = 48

            [taskmgr]
            app_interval_secs = 30
            usage_file = "/data/local/tmp/usage.json"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.ipc_addr, DEFAULT_IPC_ADDR);
        assert_eq!(cfg.updater.app_name, "unfilter");
        assert_eq!(cfg.updater.installer_command, vec!["pm", "install", "-r"]);
        assert_eq!(cfg.updater.cache_max_age().map(|d| d.as_secs()), Some(48 * 3600));
        assert_eq!(cfg.updater.probe_hosts, vec!["dns.google", "one.one.one.one"]);
        assert_eq!(cfg.taskmgr.app_interval_secs, 30);
        assert_eq!(cfg.taskmgr.history_capacity, 15);
        assert!(cfg.taskmgr.usage_file.is_some());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[updater\nconfig_url = 1").unwrap();
        assert!(GlobalConfig::load_from(&path).is_err());
    }
}
