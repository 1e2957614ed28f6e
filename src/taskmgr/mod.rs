//! 태스크 매니저: 프로세스/앱/시스템 정보를 독립적으로 폴링하고 하나의 뷰로 합침
//!
//! ## 구성
//! - `poller`: 소스별 주기 폴링, `SourceState`를 watch 채널로 발행
//! - `history`: pid별 롤링 히스토리와 추세
//! - `reconcile`: 앱-프로세스 병합, loading/error 통합 규칙
//!
//! 어느 소스든 새 값을 내면 뷰를 다시 계산해 `Arc<TaskManagerView>`로 발행합니다.
//! 히스토리는 새 프로세스 스냅샷(generation 증가)일 때만 샘플을 추가합니다.

pub mod history;
pub mod model;
pub mod poller;
pub mod reconcile;
pub mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use history::{HistoryStore, ProcessHistory, DEFAULT_HISTORY_CAPACITY};
pub use model::{ActiveApp, ProcessRecord, ProcessSample, SystemStats, Trend, TrendDirection};
pub use poller::SourceState;
pub use reconcile::{MergedApp, ProcessEntry, SourceStatus, TaskManagerView};
pub use source::{AppSource, NoAppSource, ProcessSource, SourceError, SysinfoSource, SystemSource, UsageFileSource};

/// 태스크 매니저 설정 (`[taskmgr]` 섹션)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerSettings {
    pub process_interval_secs: u64,
    pub app_interval_secs: u64,
    pub history_capacity: usize,
    /// 최근 사용 앱 JSON 파일 (없으면 앱 목록은 비어 있음)
    pub usage_file: Option<PathBuf>,
}

impl Default for TaskManagerSettings {
    fn default() -> Self {
        Self {
            process_interval_secs: 5,
            app_interval_secs: 10,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            usage_file: None,
        }
    }
}

impl TaskManagerSettings {
    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs.max(1))
    }

    pub fn app_interval(&self) -> Duration {
        Duration::from_secs(self.app_interval_secs.max(1))
    }
}

/// 폴링 주기 (테스트에서 초 단위 미만으로 줄이기 위해 설정과 분리)
#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub processes: Duration,
    pub apps: Duration,
    pub system: Duration,
}

impl From<&TaskManagerSettings> for PollIntervals {
    fn from(settings: &TaskManagerSettings) -> Self {
        Self {
            processes: settings.process_interval(),
            apps: settings.app_interval(),
            system: settings.process_interval(),
        }
    }
}

/// 실행 중인 태스크 매니저
pub struct TaskManager {
    view_rx: watch::Receiver<Arc<TaskManagerView>>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    /// 설정대로 sysinfo + 사용 통계 파일 소스를 사용해 시작
    pub fn spawn_default(settings: &TaskManagerSettings) -> Self {
        let sysinfo = Arc::new(SysinfoSource::new());
        let apps: Arc<dyn AppSource> = match &settings.usage_file {
            Some(path) => Arc::new(UsageFileSource::new(path)),
            None => Arc::new(NoAppSource),
        };
        Self::spawn(
            sysinfo.clone(),
            apps,
            sysinfo,
            PollIntervals::from(settings),
            settings.history_capacity,
        )
    }

    pub fn spawn(
        processes: Arc<dyn ProcessSource>,
        apps: Arc<dyn AppSource>,
        system: Arc<dyn SystemSource>,
        intervals: PollIntervals,
        history_capacity: usize,
    ) -> Self {
        let (proc_rx, proc_handle) =
            poller::spawn_poller("processes", intervals.processes, move || processes.processes());
        let (app_rx, app_handle) = poller::spawn_poller("apps", intervals.apps, move || apps.active_apps());
        let (sys_rx, sys_handle) =
            poller::spawn_poller("system", intervals.system, move || system.system_stats());

        let history = HistoryStore::new(history_capacity);
        let (view_tx, view_rx) = watch::channel(Arc::new(initial_view(&history)));

        let reconcile_handle = tokio::spawn(reconcile_loop(proc_rx, app_rx, sys_rx, view_tx, history));

        tracing::info!("[TaskManager] Started (processes every {:?}, apps every {:?})", intervals.processes, intervals.apps);

        Self {
            view_rx,
            handles: vec![proc_handle, app_handle, sys_handle, reconcile_handle],
        }
    }

    /// 뷰 변경 구독
    pub fn subscribe(&self) -> watch::Receiver<Arc<TaskManagerView>> {
        self.view_rx.clone()
    }

    /// 최신 뷰
    pub fn view(&self) -> Arc<TaskManagerView> {
        self.view_rx.borrow().clone()
    }

    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        tracing::info!("[TaskManager] Stopped");
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// 첫 폴링 전의 뷰 (모든 소스가 loading)
fn initial_view(history: &HistoryStore) -> TaskManagerView {
    reconcile::combine(
        &SourceState::<Vec<ProcessRecord>>::default(),
        &SourceState::<Vec<ActiveApp>>::default(),
        &SourceState::<SystemStats>::default(),
        history,
        poller::now_ms(),
    )
}

async fn reconcile_loop(
    mut proc_rx: watch::Receiver<SourceState<Vec<ProcessRecord>>>,
    mut app_rx: watch::Receiver<SourceState<Vec<ActiveApp>>>,
    mut sys_rx: watch::Receiver<SourceState<SystemStats>>,
    view_tx: watch::Sender<Arc<TaskManagerView>>,
    mut history: HistoryStore,
) {
    let mut seen_generation = 0u64;

    loop {
        tokio::select! {
            changed = proc_rx.changed() => if changed.is_err() { break },
            changed = app_rx.changed() => if changed.is_err() { break },
            changed = sys_rx.changed() => if changed.is_err() { break },
        }

        let processes = proc_rx.borrow_and_update().clone();
        let apps = app_rx.borrow_and_update().clone();
        let system = sys_rx.borrow_and_update().clone();
        let now = poller::now_ms();

        if processes.generation != seen_generation {
            seen_generation = processes.generation;
            if let Some(list) = &processes.data {
                history.record_snapshot(list, now);
            }
        }

        let view = reconcile::combine(&processes, &apps, &system, &history, now);
        tracing::debug!(
            "[TaskManager] View updated: {} processes, {} apps, {} tracked",
            view.processes.len(),
            view.apps.len(),
            history.len()
        );

        if view_tx.send(Arc::new(view)).is_err() {
            break;
        }
    }

    tracing::debug!("[TaskManager] Reconcile loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource;

    impl ProcessSource for SlowSource {
        fn processes(&self) -> Result<Vec<ProcessRecord>, SourceError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    impl AppSource for SlowSource {
        fn active_apps(&self) -> Result<Vec<ActiveApp>, SourceError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    impl SystemSource for SlowSource {
        fn system_stats(&self) -> Result<SystemStats, SourceError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(SystemStats::default())
        }
    }

    #[test]
    fn initial_view_marks_every_source_loading() {
        let view = initial_view(&HistoryStore::new(DEFAULT_HISTORY_CAPACITY));
        assert!(view.loading);
        assert!(view.error.is_none());
        assert!(view.process_status.loading);
        assert!(view.app_status.loading);
        assert!(view.system_status.loading);
    }

    #[tokio::test]
    async fn view_before_first_poll_is_consistent() {
        let source = Arc::new(SlowSource);
        let intervals = PollIntervals {
            processes: Duration::from_secs(5),
            apps: Duration::from_secs(5),
            system: Duration::from_secs(5),
        };
        let mut manager = TaskManager::spawn(source.clone(), source.clone(), source, intervals, 15);

        let view = manager.view();
        assert!(view.loading);
        assert!(view.process_status.loading);
        assert!(view.app_status.loading);
        manager.shutdown();
    }
}
