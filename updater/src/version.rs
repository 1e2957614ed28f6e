//! 앱 버전 파싱/비교 (major.minor.patch[+build])
//!
//! 빌드 번호는 같은 major.minor.patch를 공유하는 핫픽스 릴리스를 구분합니다.
//! 양쪽 모두 빌드 번호가 있을 때만 빌드 번호를 비교하며,
//! 한쪽에만 있으면 "비교 불가"로 취급하여 어느 쪽도 낮다고 판정하지 않습니다.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UpdaterError;

/// 앱 버전
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: Option<u64>,
}

impl AppVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch, build: None }
    }

    pub const fn with_build(mut self, build: u64) -> Self {
        self.build = Some(build);
        self
    }

    /// "1.0.0+2", "v1.2.3", "1.2" 형식을 파싱
    pub fn parse(s: &str) -> Result<Self, UpdaterError> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let (core, build) = match body.split_once('+') {
            Some((core, build_part)) => {
                if build_part.is_empty() || build_part.contains('+') {
                    return Err(UpdaterError::parse("version", format!("malformed build suffix in '{}'", s)));
                }
                let build = build_part.parse::<u64>().map_err(|_| {
                    UpdaterError::parse("version", format!("non-numeric build number in '{}'", s))
                })?;
                (core, Some(build))
            }
            None => (body, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(UpdaterError::parse("version", format!("expected major.minor.patch, got '{}'", s)));
        }

        let number = |part: &str, label: &str| -> Result<u64, UpdaterError> {
            part.parse::<u64>().map_err(|_| {
                UpdaterError::parse("version", format!("non-numeric {} in '{}'", label, s))
            })
        };

        let major = number(parts[0], "major")?;
        let minor = number(parts[1], "minor")?;
        let patch = match parts.get(2) {
            Some(p) => number(p, "patch")?,
            None => 0,
        };

        Ok(Self { major, minor, patch, build })
    }

    fn core(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// 버전 비교
    ///
    /// `ignore_build`가 false이고 코어 버전이 같으면 빌드 번호로 결정합니다.
    /// 한쪽에만 빌드 번호가 있으면 `None`을 반환합니다.
    pub fn compare(&self, other: &AppVersion, ignore_build: bool) -> Option<Ordering> {
        match self.core().cmp(&other.core()) {
            Ordering::Equal => {}
            ord => return Some(ord),
        }
        if ignore_build {
            return Some(Ordering::Equal);
        }
        match (self.build, other.build) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            (None, None) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// `other`보다 확실히 낮은 버전인지 (비교 불가는 false)
    pub fn is_lower_than(&self, other: &AppVersion, ignore_build: bool) -> bool {
        self.compare(other, ignore_build) == Some(Ordering::Less)
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other, false)
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for AppVersion {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// 버전은 문자열 형태로 직렬화 (IPC/캐시에서 그대로 읽을 수 있도록)
impl Serialize for AppVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AppVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}
