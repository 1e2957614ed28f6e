//! 주기 폴러: 동기 소스를 `spawn_blocking`으로 호출하고 결과를 watch 채널로 발행
//!
//! 한 소스의 틱은 같은 태스크 안에서 순서대로 실행되므로 겹치지 않습니다.
//! 느린 틱 뒤에 밀린 틱은 건너뜁니다 (`MissedTickBehavior::Skip`).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::source::SourceError;

/// 소스 하나의 로딩/데이터/에러 상태
#[derive(Debug, Clone, Serialize)]
pub struct SourceState<T> {
    /// 첫 결과가 나오기 전까지 true
    pub loading: bool,
    /// 마지막으로 성공한 데이터 (실패해도 유지)
    pub data: Option<T>,
    /// 마지막 틱의 에러
    pub error: Option<String>,
    /// 마지막 성공 시각 (epoch ms)
    pub updated_at_ms: Option<i64>,
    /// 성공한 틱마다 1씩 증가
    pub generation: u64,
}

impl<T> Default for SourceState<T> {
    fn default() -> Self {
        Self {
            loading: true,
            data: None,
            error: None,
            updated_at_ms: None,
            generation: 0,
        }
    }
}

impl<T> SourceState<T> {
    /// 이전 데이터는 있지만 마지막 틱이 실패한 상태
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 폴러 시작
///
/// 첫 틱은 즉시 실행됩니다. 모든 수신자가 사라지면 종료합니다.
pub fn spawn_poller<T, F>(
    name: &'static str,
    period: Duration,
    fetch: F,
) -> (watch::Receiver<SourceState<T>>, JoinHandle<()>)
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Result<T, SourceError> + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(SourceState::<T>::default());
    let fetch = Arc::new(fetch);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("[Poller] {} poller started (every {:?})", name, period);

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let job = fetch.clone();
            let result = match tokio::task::spawn_blocking(move || (*job)()).await {
                Ok(result) => result,
                Err(e) => Err(SourceError::Task(e.to_string())),
            };

            tx.send_modify(|state| {
                state.loading = false;
                match result {
                    Ok(data) => {
                        state.data = Some(data);
                        state.error = None;
                        state.updated_at_ms = Some(now_ms());
                        state.generation += 1;
                    }
                    Err(e) => {
                        tracing::warn!("[Poller] {} poll failed: {}", name, e);
                        state.error = Some(e.to_string());
                    }
                }
            });
        }

        tracing::info!("[Poller] {} poller stopped", name);
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn failure_keeps_previous_data() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let (mut rx, handle) = spawn_poller("test", Duration::from_millis(100), move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(vec![1u32]),
                _ => Err(SourceError::Unavailable("test".into())),
            }
        });

        rx.changed().await.unwrap();
        {
            let state = rx.borrow_and_update();
            assert!(!state.loading);
            assert_eq!(state.data, Some(vec![1]));
            assert_eq!(state.generation, 1);
            assert!(!state.is_stale());
        }

        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.data, Some(vec![1]));
        assert_eq!(state.generation, 1);
        assert!(state.is_stale());

        handle.abort();
    }

    #[tokio::test]
    async fn panicking_source_is_reported_as_error() {
        let (mut rx, handle) = spawn_poller::<u32, _>("panic", Duration::from_millis(10), || {
            panic!("source exploded")
        });

        rx.changed().await.unwrap();
        let state = rx.borrow_and_update().clone();
        assert!(!state.loading);
        assert!(state.data.is_none());
        assert!(state.error.unwrap().contains("Poll task failed"));

        handle.abort();
    }
}
