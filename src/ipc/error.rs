//! IPC 전용 에러 타입: 에러 종류에 맞는 HTTP 상태 코드와 JSON 본문을 만듭니다.

use axum::http::StatusCode;
use unfilter_updater_lib::UpdaterError;

#[derive(thiserror::Error, Debug)]
pub enum IpcError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Background worker is unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("{0}")]
    Updater(#[from] UpdaterError),
}

impl IpcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::WorkerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Updater(e) => match e {
                UpdaterError::FileNotFound { .. } => StatusCode::NOT_FOUND,
                UpdaterError::Connectivity { .. } | UpdaterError::NetworkError { .. } | UpdaterError::Timeout { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                UpdaterError::ApiError { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// 머신 리더블 에러 분류
    pub fn error_type(&self) -> String {
        match self {
            Self::NotFound(_) => "not_found".to_string(),
            Self::Conflict(_) => "conflict".to_string(),
            Self::WorkerUnavailable(_) => "unavailable".to_string(),
            Self::Updater(e) => serde_json::to_value(e.error_type())
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ok": false,
            "error": self.to_string(),
            "error_type": self.error_type(),
        })
    }
}

impl axum::response::IntoResponse for IpcError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        tracing::debug!("[IPC] {} -> {}", self, status);
        (status, axum::Json(self.to_json())).into_response()
    }
}
