//! 에러 분류 및 사용자 메시지
//!
//! ## 지원하는 에러 상황
//! - 네트워크 끊김 / 타임아웃
//! - 설정/버전 파싱 실패
//! - 다운로드 중단
//! - 파일 시스템 오류 (공간 부족, 권한)
//! - 설치 관리자 실패
//!
//! 모든 공개 진입점은 내부 실패를 `UpdaterError`로 변환하여 값으로 반환합니다.

use std::fmt;
use std::io;
use serde::{Deserialize, Serialize};

use crate::connectivity::ConnectivityStatus;

/// 업데이터 에러 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// 네트워크 연결 실패
    NetworkError {
        message: String,
        recoverable: bool,
    },
    /// HTTP 요청 타임아웃
    Timeout {
        operation: String,
        duration_secs: u64,
    },
    /// 200이 아닌 HTTP 응답
    ApiError {
        status_code: u16,
        message: String,
    },
    /// 버전 문자열/설정 JSON 파싱 실패
    ParseError {
        subject: String,
        message: String,
    },
    /// 다운로드 중단됨 (임시 파일은 남아 있음)
    DownloadInterrupted {
        artifact: String,
        downloaded_bytes: u64,
        total_bytes: u64,
    },
    /// 파일 시스템 오류
    FileSystemError {
        operation: String,
        path: String,
        message: String,
    },
    /// 설치할 파일이 없음
    FileNotFound {
        path: String,
    },
    /// 설치 관리자를 실행하지 못함
    InstallationError {
        message: String,
    },
    /// 연결 상태 때문에 작업을 시작하지 않음
    Connectivity {
        status: ConnectivityStatus,
    },
    /// 알 수 없는 오류
    Unknown {
        message: String,
    },
}

/// 호출 측(UI)이 분기하기 위한 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Network,
    Server,
    Parse,
    Download,
    FileSystem,
    Installation,
    Connectivity,
    Unknown,
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::NetworkError { message, .. } => {
                write!(f, "Network error: {}", message)
            }
            UpdaterError::Timeout { operation, duration_secs } => {
                write!(f, "Timeout after {}s: {}", duration_secs, operation)
            }
            UpdaterError::ApiError { status_code, message } => {
                write!(f, "HTTP error ({}): {}", status_code, message)
            }
            UpdaterError::ParseError { subject, message } => {
                write!(f, "Failed to parse {}: {}", subject, message)
            }
            UpdaterError::DownloadInterrupted { artifact, downloaded_bytes, total_bytes } => {
                write!(
                    f,
                    "Download interrupted for {}: {}/{} bytes",
                    artifact, downloaded_bytes, total_bytes
                )
            }
            UpdaterError::FileSystemError { operation, path, message } => {
                write!(f, "File system error during {} on '{}': {}", operation, path, message)
            }
            UpdaterError::FileNotFound { path } => {
                write!(f, "File not found: {}", path)
            }
            UpdaterError::InstallationError { message } => {
                write!(f, "Installation failed: {}", message)
            }
            UpdaterError::Connectivity { status } => {
                write!(f, "Connectivity check failed: {}", status)
            }
            UpdaterError::Unknown { message } => {
                write!(f, "Unknown error: {}", message)
            }
        }
    }
}

impl std::error::Error for UpdaterError {}

impl UpdaterError {
    pub fn parse(subject: &str, message: impl Into<String>) -> Self {
        UpdaterError::ParseError {
            subject: subject.to_string(),
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        UpdaterError::Unknown { message: message.into() }
    }

    /// 에러 분류
    pub fn error_type(&self) -> ErrorType {
        match self {
            UpdaterError::NetworkError { .. } | UpdaterError::Timeout { .. } => ErrorType::Network,
            UpdaterError::ApiError { .. } => ErrorType::Server,
            UpdaterError::ParseError { .. } => ErrorType::Parse,
            UpdaterError::DownloadInterrupted { .. } => ErrorType::Download,
            UpdaterError::FileSystemError { .. } | UpdaterError::FileNotFound { .. } => ErrorType::FileSystem,
            UpdaterError::InstallationError { .. } => ErrorType::Installation,
            UpdaterError::Connectivity { .. } => ErrorType::Connectivity,
            UpdaterError::Unknown { .. } => ErrorType::Unknown,
        }
    }

    /// 호출 측 재시도로 복구 가능한 에러인지 확인
    pub fn is_recoverable(&self) -> bool {
        match self {
            UpdaterError::NetworkError { recoverable, .. } => *recoverable,
            UpdaterError::Timeout { .. } => true,
            UpdaterError::ApiError { status_code, .. } => {
                // 5xx 에러는 재시도 가능, 4xx는 불가능
                *status_code >= 500
            }
            UpdaterError::DownloadInterrupted { .. } => true,
            UpdaterError::Connectivity { .. } => true,
            UpdaterError::ParseError { .. }
            | UpdaterError::FileSystemError { .. }
            | UpdaterError::FileNotFound { .. }
            | UpdaterError::InstallationError { .. }
            | UpdaterError::Unknown { .. } => false,
        }
    }

    /// 사용자에게 표시할 메시지
    pub fn user_message(&self) -> String {
        match self {
            UpdaterError::NetworkError { .. } => {
                "Please check your internet connection.".to_string()
            }
            UpdaterError::Timeout { .. } => {
                "The update server is taking too long to respond. Try again later.".to_string()
            }
            UpdaterError::ApiError { status_code, .. } => {
                if *status_code == 404 {
                    "Update information could not be found.".to_string()
                } else if *status_code >= 500 {
                    "The update server has a temporary problem. Try again later.".to_string()
                } else {
                    format!("Server error ({})", status_code)
                }
            }
            UpdaterError::ParseError { .. } => {
                "Update information is malformed.".to_string()
            }
            UpdaterError::DownloadInterrupted { .. } => {
                "The download was interrupted. Please try again.".to_string()
            }
            UpdaterError::FileSystemError { .. } => {
                "Could not save the update. Check free storage and permissions.".to_string()
            }
            UpdaterError::FileNotFound { .. } => {
                "The downloaded update file is missing. Download it again.".to_string()
            }
            UpdaterError::InstallationError { .. } => {
                "The installer could not be started.".to_string()
            }
            UpdaterError::Connectivity { status } => match status {
                ConnectivityStatus::Offline => "You are offline.".to_string(),
                ConnectivityStatus::ServerUnreachable => {
                    "The update server is unreachable.".to_string()
                }
                _ => "Network status is unknown.".to_string(),
            },
            UpdaterError::Unknown { message } => {
                format!("Something went wrong: {}", message)
            }
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            UpdaterError::Timeout {
                operation: operation.to_string(),
                duration_secs: timeout_secs,
            }
        } else if err.is_connect() {
            UpdaterError::NetworkError {
                message: format!("connection failed: {}", err),
                recoverable: true,
            }
        } else if let Some(status) = err.status() {
            UpdaterError::ApiError {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            UpdaterError::parse(operation, err.to_string())
        } else {
            UpdaterError::NetworkError {
                message: err.to_string(),
                recoverable: err.is_request() || err.is_body(),
            }
        }
    }

    /// IO 에러를 UpdaterError로 변환
    pub fn from_io(err: &io::Error, operation: &str, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => UpdaterError::NetworkError {
                message: err.to_string(),
                recoverable: true,
            },
            _ => UpdaterError::FileSystemError {
                operation: operation.to_string(),
                path: path.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// 타입 정보가 없는 에러 메시지를 휴리스틱으로 분류
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["no space", "disk full", "enospc", "not enough space", "quota"]) {
            UpdaterError::FileSystemError {
                operation: "write".to_string(),
                path: String::new(),
                message: message.to_string(),
            }
        } else if has(&["permission denied", "access is denied", "read-only", "eacces", "operation not permitted"]) {
            UpdaterError::FileSystemError {
                operation: "open".to_string(),
                path: String::new(),
                message: message.to_string(),
            }
        } else if has(&["timed out", "timeout"]) {
            UpdaterError::Timeout {
                operation: message.to_string(),
                duration_secs: 0,
            }
        } else if has(&["connection reset", "connection closed", "broken pipe", "socket", "unexpected eof", "connection refused", "dns", "network"]) {
            UpdaterError::NetworkError {
                message: message.to_string(),
                recoverable: true,
            }
        } else {
            UpdaterError::unknown(message)
        }
    }
}

impl From<io::Error> for UpdaterError {
    fn from(err: io::Error) -> Self {
        UpdaterError::from_io(&err, "io", "")
    }
}

impl From<anyhow::Error> for UpdaterError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(updater) = err.downcast_ref::<UpdaterError>() {
            return updater.clone();
        }
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return UpdaterError::from_io(io_err, "io", "");
        }
        UpdaterError::classify_message(&format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_types() {
        assert_eq!(UpdaterError::parse("x", "y").error_type(), ErrorType::Parse);
        assert_eq!(
            UpdaterError::ApiError { status_code: 503, message: String::new() }.error_type(),
            ErrorType::Server
        );
        assert_eq!(
            UpdaterError::FileNotFound { path: "a".into() }.error_type(),
            ErrorType::FileSystem
        );
        assert_eq!(
            UpdaterError::Connectivity { status: ConnectivityStatus::Offline }.error_type(),
            ErrorType::Connectivity
        );
    }

    #[test]
    fn recoverable_by_status_code() {
        let server = UpdaterError::ApiError { status_code: 502, message: String::new() };
        let client = UpdaterError::ApiError { status_code: 404, message: String::new() };
        assert!(server.is_recoverable());
        assert!(!client.is_recoverable());
        assert!(!UpdaterError::parse("config", "bad").is_recoverable());
    }

    #[test]
    fn io_errors_split_by_kind() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(UpdaterError::from_io(&denied, "write", "/x").error_type(), ErrorType::FileSystem);

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(UpdaterError::from_io(&reset, "read", "/x").error_type(), ErrorType::Network);
    }

    #[test]
    fn message_heuristics() {
        assert_eq!(
            UpdaterError::classify_message("No space left on device (os error 28)").error_type(),
            ErrorType::FileSystem
        );
        assert_eq!(
            UpdaterError::classify_message("Permission denied (os error 13)").error_type(),
            ErrorType::FileSystem
        );
        assert_eq!(
            UpdaterError::classify_message("connection reset by peer").error_type(),
            ErrorType::Network
        );
        assert_eq!(
            UpdaterError::classify_message("operation timed out").error_type(),
            ErrorType::Network
        );
        assert_eq!(
            UpdaterError::classify_message("something odd").error_type(),
            ErrorType::Unknown
        );
    }

    #[test]
    fn anyhow_preserves_typed_errors() {
        let original = UpdaterError::FileNotFound { path: "/tmp/a.apk".into() };
        let wrapped = anyhow::Error::new(original.clone());
        assert_eq!(UpdaterError::from(wrapped), original);
    }

    #[test]
    fn serializes_tagged() {
        let err = UpdaterError::Timeout { operation: "fetch".into(), duration_secs: 10 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Timeout");
        assert_eq!(json["details"]["duration_secs"], 10);
    }
}
