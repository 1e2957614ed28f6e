//! 네트워크 연결 상태 확인
//!
//! 호스트 목록(업데이트 설정 서버 → 일반 인터넷 호스트)을 순서대로 DNS 조회하여
//! 연결 상태를 판정합니다. 호스트마다 고정 타임아웃이 적용되며,
//! 목록 순회 외에 재시도는 하지 않습니다.

use std::fmt;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

/// 기본 일반 인터넷 확인용 호스트
pub const DEFAULT_PROBE_HOSTS: [&str; 2] = ["dns.google", "one.one.one.one"];

/// 호스트별 DNS 조회 타임아웃
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    Connected,
    Offline,
    ServerUnreachable,
    Unknown,
}

impl ConnectivityStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityStatus::Connected)
    }
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityStatus::Connected => "connected",
            ConnectivityStatus::Offline => "offline",
            ConnectivityStatus::ServerUnreachable => "server unreachable",
            ConnectivityStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// 호스트 조회 실패 유형
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// 이름 해석 실패 (오프라인, NXDOMAIN 등)
    Failed(String),
    /// 해석과 무관한 예외 (리졸버 태스크 실패 등)
    Unexpected(String),
}

/// DNS 조회 추상화: 테스트에서 결정적인 리졸버를 주입하기 위한 경계
pub trait HostResolver: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>>;
}

/// 시스템 리졸버 (블로킹 getaddrinfo를 spawn_blocking에서 실행)
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl HostResolver for DnsResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
        let host = host.to_string();
        async move {
            let joined = tokio::task::spawn_blocking(move || {
                (host.as_str(), 0u16)
                    .to_socket_addrs()
                    .map(|addrs| addrs.map(|a| a.ip()).collect::<Vec<_>>())
            })
            .await;

            match joined {
                Ok(Ok(addrs)) => Ok(addrs),
                Ok(Err(e)) => Err(ResolveError::Failed(e.to_string())),
                Err(e) => Err(ResolveError::Unexpected(e.to_string())),
            }
        }
        .boxed()
    }
}

/// 고정 응답 리졸버: 목록에 있는 호스트만 루프백으로 해석됨
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    reachable: Vec<String>,
}

impl StaticResolver {
    pub fn new<I, S>(reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { reachable: reachable.into_iter().map(Into::into).collect() }
    }
}

impl HostResolver for StaticResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
        let found = self.reachable.iter().any(|h| h == host);
        async move {
            if found {
                Ok(vec![IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)])
            } else {
                Err(ResolveError::Failed(format!("{} is not resolvable", host)))
            }
        }
        .boxed()
    }
}

enum ProbeOutcome {
    Resolved,
    Failed,
    Unexpected,
}

/// 연결 상태 확인기
#[derive(Clone)]
pub struct ConnectivityChecker {
    resolver: Arc<dyn HostResolver>,
    /// 업데이트 설정 서버 호스트
    server_host: Option<String>,
    /// 일반 인터넷 확인용 호스트
    general_hosts: Vec<String>,
    timeout: Duration,
}

impl ConnectivityChecker {
    pub fn new(server_host: Option<String>, general_hosts: Vec<String>, timeout: Duration) -> Self {
        Self::with_resolver(Arc::new(DnsResolver), server_host, general_hosts, timeout)
    }

    pub fn with_resolver(
        resolver: Arc<dyn HostResolver>,
        server_host: Option<String>,
        general_hosts: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            server_host: server_host.filter(|h| !h.trim().is_empty()),
            general_hosts,
            timeout,
        }
    }

    /// 설정 URL의 호스트를 서버 호스트로 사용하는 생성자
    pub fn for_config_url(config_url: &str, general_hosts: Vec<String>, timeout: Duration) -> Self {
        Self::new(host_of(config_url), general_hosts, timeout)
    }

    pub fn server_host(&self) -> Option<&str> {
        self.server_host.as_deref()
    }

    async fn probe(&self, host: &str) -> ProbeOutcome {
        match tokio::time::timeout(self.timeout, self.resolver.resolve(host)).await {
            Ok(Ok(addrs)) if !addrs.is_empty() => ProbeOutcome::Resolved,
            Ok(Ok(_)) => {
                tracing::debug!("[Connectivity] {} resolved to no addresses", host);
                ProbeOutcome::Failed
            }
            Ok(Err(ResolveError::Failed(e))) => {
                tracing::debug!("[Connectivity] {} did not resolve: {}", host, e);
                ProbeOutcome::Failed
            }
            Ok(Err(ResolveError::Unexpected(e))) => {
                tracing::warn!("[Connectivity] Unexpected resolver error for {}: {}", host, e);
                ProbeOutcome::Unexpected
            }
            Err(_) => {
                tracing::debug!("[Connectivity] {} timed out after {:?}", host, self.timeout);
                ProbeOutcome::Failed
            }
        }
    }

    async fn probe_hosts(&self, hosts: &[String]) -> ConnectivityStatus {
        let mut unexpected = false;
        for host in hosts {
            match self.probe(host).await {
                ProbeOutcome::Resolved => return ConnectivityStatus::Connected,
                ProbeOutcome::Failed => {}
                ProbeOutcome::Unexpected => unexpected = true,
            }
        }
        if unexpected {
            ConnectivityStatus::Unknown
        } else {
            ConnectivityStatus::Offline
        }
    }

    /// 전체 호스트 목록으로 연결 상태 확인
    pub async fn check_connectivity(&self) -> ConnectivityStatus {
        let hosts: Vec<String> = self
            .server_host
            .iter()
            .chain(self.general_hosts.iter())
            .cloned()
            .collect();
        let status = self.probe_hosts(&hosts).await;
        tracing::debug!("[Connectivity] General connectivity: {}", status);
        status
    }

    /// 업데이트 서버만 확인하고, 실패하면 일반 연결을 다시 확인하여
    /// `ServerUnreachable`과 `Offline`을 구분
    pub async fn check_update_server_connectivity(&self) -> ConnectivityStatus {
        let Some(server) = self.server_host.as_deref() else {
            return self.check_connectivity().await;
        };

        if let ProbeOutcome::Resolved = self.probe(server).await {
            return ConnectivityStatus::Connected;
        }

        let general = self.probe_hosts(&self.general_hosts).await;
        let status = match general {
            ConnectivityStatus::Connected => ConnectivityStatus::ServerUnreachable,
            other => other,
        };
        tracing::info!("[Connectivity] Update server {} not reachable: {}", server, status);
        status
    }
}

/// URL에서 호스트 추출
pub fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    enum Answer {
        Ok,
        Empty,
        Fail,
        Panic,
        Hang,
    }

    struct FakeResolver(HashMap<&'static str, Answer>);

    impl HostResolver for FakeResolver {
        fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
            async move {
                match self.0.get(host) {
                    Some(Answer::Ok) => Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]),
                    Some(Answer::Empty) => Ok(vec![]),
                    Some(Answer::Panic) => Err(ResolveError::Unexpected("boom".into())),
                    Some(Answer::Hang) => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
                    }
                    Some(Answer::Fail) | None => Err(ResolveError::Failed("nxdomain".into())),
                }
            }
            .boxed()
        }
    }

    fn checker(answers: Vec<(&'static str, Answer)>) -> ConnectivityChecker {
        ConnectivityChecker::with_resolver(
            Arc::new(FakeResolver(answers.into_iter().collect())),
            Some("config.example".into()),
            vec!["a.example".into(), "b.example".into()],
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn connected_on_first_resolving_host() {
        let c = checker(vec![("config.example", Answer::Fail), ("b.example", Answer::Ok)]);
        assert_eq!(c.check_connectivity().await, ConnectivityStatus::Connected);
    }

    #[tokio::test]
    async fn offline_when_nothing_resolves() {
        let c = checker(vec![("a.example", Answer::Empty), ("b.example", Answer::Hang)]);
        assert_eq!(c.check_connectivity().await, ConnectivityStatus::Offline);
    }

    #[tokio::test]
    async fn unknown_only_on_unexpected_errors() {
        let c = checker(vec![("a.example", Answer::Panic)]);
        assert_eq!(c.check_connectivity().await, ConnectivityStatus::Unknown);
    }

    #[tokio::test]
    async fn server_unreachable_when_general_internet_works() {
        let c = checker(vec![("config.example", Answer::Fail), ("a.example", Answer::Ok)]);
        assert_eq!(
            c.check_update_server_connectivity().await,
            ConnectivityStatus::ServerUnreachable
        );
    }

    #[tokio::test]
    async fn server_probe_distinguishes_offline() {
        let c = checker(vec![]);
        assert_eq!(c.check_update_server_connectivity().await, ConnectivityStatus::Offline);

        let c = checker(vec![("config.example", Answer::Ok)]);
        assert_eq!(c.check_update_server_connectivity().await, ConnectivityStatus::Connected);
    }

    #[tokio::test]
    async fn system_resolver_handles_localhost() {
        let c = ConnectivityChecker::new(None, vec!["localhost".into()], Duration::from_secs(5));
        assert_eq!(c.check_connectivity().await, ConnectivityStatus::Connected);
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://example.com/a/b.json").as_deref(), Some("example.com"));
        assert_eq!(host_of("not a url"), None);
    }
}
