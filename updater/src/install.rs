//! 설치 트리거: 다운로드된 APK를 플랫폼 설치 관리자에 넘김
//!
//! 설치 관리자 프로세스가 성공 이외의 종료 코드를 반환해도 에러로 바꾸지 않고
//! 로그만 남깁니다. 설치 대화상자가 뜬 이후는 이 계층의 관심사가 아닙니다.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::UpdaterError;

/// 설치 관리자 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub path: PathBuf,
    /// 프로세스 종료 코드 (시그널로 종료되면 None)
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// 설치 트리거
#[derive(Debug, Clone)]
pub struct Installer {
    /// 프로그램 + 인자. 파일 경로는 마지막 인자로 붙음
    command: Vec<String>,
}

impl Installer {
    /// 플랫폼 기본 설치 명령 사용
    pub fn platform_default() -> Self {
        Self { command: default_command() }
    }

    /// 명령 지정 (비어 있으면 플랫폼 기본값)
    pub fn with_command(command: Vec<String>) -> Self {
        if command.is_empty() || command[0].trim().is_empty() {
            Self::platform_default()
        } else {
            Self { command }
        }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// 설치 실행
    ///
    /// 파일이 없으면 `FileNotFound`, 명령을 실행하지 못하면 `InstallationError`.
    pub async fn install(&self, path: &Path) -> Result<InstallOutcome, UpdaterError> {
        let path_str = path.to_string_lossy().to_string();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                tracing::error!("[Installer] Artifact missing: {}", path_str);
                return Err(UpdaterError::FileNotFound { path: path_str });
            }
        }

        let (program, args) = match self.command.split_first() {
            Some(parts) => parts,
            None => {
                return Err(UpdaterError::InstallationError {
                    message: "no installer command configured".to_string(),
                })
            }
        };

        let mut cmd = Command::new(program);
        cmd.args(args).arg(path);
        apply_creation_flags(&mut cmd);

        tracing::info!("[Installer] Launching {} for {}", program, path_str);
        let status = cmd.status().await.map_err(|e| {
            tracing::error!("[Installer] Failed to launch {}: {}", program, e);
            UpdaterError::InstallationError {
                message: format!("failed to launch '{}': {}", program, e),
            }
        })?;

        if !status.success() {
            tracing::warn!("[Installer] {} exited with {:?} for {}", program, status.code(), path_str);
        } else {
            tracing::info!("[Installer] Installer handed off: {}", path_str);
        }

        Ok(InstallOutcome {
            path: path.to_path_buf(),
            exit_code: status.code(),
            success: status.success(),
        })
    }
}

impl Default for Installer {
    fn default() -> Self {
        Self::platform_default()
    }
}

fn default_command() -> Vec<String> {
    #[cfg(target_os = "windows")]
    {
        vec!["cmd".into(), "/C".into(), "start".into(), "\"\"".into()]
    }
    #[cfg(target_os = "macos")]
    {
        vec!["open".into()]
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec!["xdg-open".into()]
    }
}

/// Windows에서 콘솔 창을 띄우지 않도록 플래그 적용
#[cfg(target_os = "windows")]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_reported() {
        let installer = Installer::with_command(vec!["true".into()]);
        let err = installer.install(Path::new("/definitely/not/here.apk")).await.unwrap_err();
        assert!(matches!(err, UpdaterError::FileNotFound { .. }));
    }

    #[test]
    fn empty_command_falls_back_to_platform_default() {
        assert_eq!(Installer::with_command(vec![]).command(), default_command().as_slice());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        std::fs::write(&apk, b"apk").unwrap();

        let outcome = Installer::with_command(vec!["false".into()]).install(&apk).await.unwrap();
        assert!(!outcome.success);

        let outcome = Installer::with_command(vec!["true".into()]).install(&apk).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn unlaunchable_command_is_installation_error() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        std::fs::write(&apk, b"apk").unwrap();

        let err = Installer::with_command(vec!["unfilter-no-such-installer-binary".into()])
            .install(&apk)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::InstallationError { .. }));
    }
}
