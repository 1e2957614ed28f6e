//! 태스크 매니저 데이터 모델

use serde::{Deserialize, Serialize};

/// 프로세스 테이블의 한 행 (폴링마다 전체 교체)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: String,
    pub user: String,
    pub name: String,
    /// CPU 사용률 (%)
    pub cpu: f64,
    /// 메모리 사용률 (%)
    pub mem: f64,
    /// 상주 메모리 (bytes)
    pub res: u64,
    /// 가상 메모리 (bytes)
    pub vsz: u64,
    pub status: String,
}

/// 최근 사용된 앱 (플랫폼 브리지가 기록한 사용 통계)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveApp {
    pub package_name: String,
    pub app_name: String,
    /// 아이콘 PNG 바이트 (파일/JSON에서는 base64 문자열)
    #[serde(default, with = "icon_base64")]
    pub icon: Option<Vec<u8>>,
    /// 마지막 사용 시각 (epoch ms)
    #[serde(default)]
    pub last_time_used: i64,
    /// 누적 포그라운드 시간 (ms)
    #[serde(default)]
    pub total_time_in_foreground: i64,
}

/// 시스템 전체 메모리/CPU 정보
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_memory: u64,
    pub used_memory: u64,
    pub available_memory: u64,
    /// 전체 CPU 사용률 (%)
    pub cpu_usage: f64,
    pub cpu_count: usize,
    pub kernel_version: Option<String>,
    pub os_name: Option<String>,
}

/// 히스토리 한 칸
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub cpu: f64,
    pub memory: f64,
    pub timestamp_ms: i64,
}

/// 최근 3개 샘플 기준 추세
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub delta: f64,
}

impl Trend {
    pub const STABLE: Trend = Trend { direction: TrendDirection::Stable, delta: 0.0 };
}

impl Default for Trend {
    fn default() -> Self {
        Self::STABLE
    }
}

mod icon_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(icon: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match icon {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => STANDARD.decode(s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_app_icon_is_base64() {
        let app = ActiveApp {
            package_name: "com.example.chat".into(),
            app_name: "Chat".into(),
            icon: Some(vec![0x89, b'P', b'N', b'G']),
            last_time_used: 1_700_000_000_000,
            total_time_in_foreground: 60_000,
        };
        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["packageName"], "com.example.chat");
        assert_eq!(json["icon"], "iVBORw==");

        let back: ActiveApp = serde_json::from_value(json).unwrap();
        assert_eq!(back, app);
    }

    #[test]
    fn missing_or_empty_icon_is_none() {
        let app: ActiveApp =
            serde_json::from_str(r#"{"packageName":"a.b","appName":"B","icon":""}"#).unwrap();
        assert_eq!(app.icon, None);
        assert_eq!(app.last_time_used, 0);

        let app: ActiveApp = serde_json::from_str(r#"{"packageName":"a.b","appName":"B"}"#).unwrap();
        assert_eq!(app.icon, None);
    }
}
