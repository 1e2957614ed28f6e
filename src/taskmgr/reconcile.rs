//! 프로세스/앱 병합과 통합 뷰 계산
//!
//! 앱과 프로세스는 이름 부분 문자열로만 연결됩니다. 앱마다 목록 순서상
//! 첫 번째로 맞는 프로세스를 씁니다 (대소문자 구분, 빈 이름은 매칭 안 함).

use serde::Serialize;

use super::history::HistoryStore;
use super::model::{ActiveApp, ProcessRecord, ProcessSample, SystemStats, Trend};
use super::poller::SourceState;

/// 히스토리가 붙은 프로세스
#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    #[serde(flatten)]
    pub process: ProcessRecord,
    pub cpu_trend: Trend,
    pub memory_trend: Trend,
    pub history: Vec<ProcessSample>,
}

/// 프로세스와 연결된 앱
#[derive(Debug, Clone, Serialize)]
pub struct MergedApp {
    #[serde(flatten)]
    pub app: ActiveApp,
    pub process: Option<ProcessRecord>,
    pub cpu_trend: Trend,
}

/// 소스별 상태 요약
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub stale: bool,
    pub updated_at_ms: Option<i64>,
}

impl SourceStatus {
    fn of<T>(state: &SourceState<T>) -> Self {
        Self {
            loading: state.loading,
            error: state.error.clone(),
            stale: state.is_stale(),
            updated_at_ms: state.updated_at_ms,
        }
    }
}

/// 태스크 매니저 통합 뷰 (발행 후 변경되지 않음)
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskManagerView {
    /// 두 소스 모두 첫 데이터를 기다리는 중
    pub loading: bool,
    /// 두 소스 모두 실패했고 보여줄 데이터가 없음
    pub error: Option<String>,
    pub processes: Vec<ProcessEntry>,
    pub apps: Vec<MergedApp>,
    pub system: Option<SystemStats>,
    pub process_status: SourceStatus,
    pub app_status: SourceStatus,
    pub system_status: SourceStatus,
    pub updated_at_ms: i64,
}

/// 앱에 해당하는 프로세스 찾기
pub fn match_process<'a>(app: &ActiveApp, processes: &'a [ProcessRecord]) -> Option<&'a ProcessRecord> {
    let package = app.package_name.as_str();
    if package.is_empty() {
        return None;
    }
    processes
        .iter()
        .find(|p| !p.name.is_empty() && (package.contains(p.name.as_str()) || p.name.contains(package)))
}

/// 앱 목록에 프로세스와 추세를 붙임
pub fn merge_apps(apps: &[ActiveApp], processes: &[ProcessRecord], history: &HistoryStore) -> Vec<MergedApp> {
    apps.iter()
        .map(|app| {
            let process = match_process(app, processes).cloned();
            let cpu_trend = process
                .as_ref()
                .and_then(|p| history.get(&p.pid))
                .map(|h| h.cpu_trend())
                .unwrap_or_default();
            MergedApp {
                app: app.clone(),
                process,
                cpu_trend,
            }
        })
        .collect()
}

fn process_entries(processes: &[ProcessRecord], history: &HistoryStore) -> Vec<ProcessEntry> {
    processes
        .iter()
        .map(|p| {
            let h = history.get(&p.pid);
            ProcessEntry {
                process: p.clone(),
                cpu_trend: h.map(|h| h.cpu_trend()).unwrap_or_default(),
                memory_trend: h.map(|h| h.memory_trend()).unwrap_or_default(),
                history: h.map(|h| h.to_vec()).unwrap_or_default(),
            }
        })
        .collect()
}

/// 세 소스 상태를 하나의 뷰로 합침
///
/// - loading: 프로세스/앱 모두 로딩 중이고 어느 쪽도 데이터가 없을 때만
/// - error: 프로세스/앱 모두 에러이고 어느 쪽도 데이터가 없을 때만
/// - 그 외에는 있는 데이터를 그대로 보여주고 소스별 에러/stale 플래그를 채움
pub fn combine(
    processes: &SourceState<Vec<ProcessRecord>>,
    apps: &SourceState<Vec<ActiveApp>>,
    system: &SourceState<SystemStats>,
    history: &HistoryStore,
    now_ms: i64,
) -> TaskManagerView {
    let any_data = processes.has_data() || apps.has_data();
    let loading = processes.loading && apps.loading && !any_data;

    let error = match (&processes.error, &apps.error) {
        (Some(p), Some(a)) if !any_data => Some(format!("processes: {}; apps: {}", p, a)),
        _ => None,
    };

    let process_list: &[ProcessRecord] = processes.data.as_deref().unwrap_or(&[]);
    let app_list: &[ActiveApp] = apps.data.as_deref().unwrap_or(&[]);

    TaskManagerView {
        loading,
        error,
        processes: process_entries(process_list, history),
        apps: merge_apps(app_list, process_list, history),
        system: system.data.clone(),
        process_status: SourceStatus::of(processes),
        app_status: SourceStatus::of(apps),
        system_status: SourceStatus::of(system),
        updated_at_ms: now_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taskmgr::model::TrendDirection;

    fn process(pid: &str, name: &str) -> ProcessRecord {
        ProcessRecord {
            pid: pid.into(),
            user: "u0_a10".into(),
            name: name.into(),
            cpu: 3.0,
            mem: 1.5,
            res: 1024,
            vsz: 4096,
            status: "S".into(),
        }
    }

    fn app(package: &str) -> ActiveApp {
        ActiveApp {
            package_name: package.into(),
            app_name: package.rsplit('.').next().unwrap_or_default().into(),
            icon: None,
            last_time_used: 0,
            total_time_in_foreground: 0,
        }
    }

    fn loaded<T>(data: T) -> SourceState<T> {
        SourceState {
            loading: false,
            data: Some(data),
            error: None,
            updated_at_ms: Some(1),
            generation: 1,
        }
    }

    fn failed<T>(message: &str) -> SourceState<T> {
        SourceState {
            loading: false,
            data: None,
            error: Some(message.into()),
            updated_at_ms: None,
            generation: 0,
        }
    }

    #[test]
    fn first_match_wins_in_list_order() {
        let processes = vec![
            process("10", "com.example.chat:push"),
            process("11", "com.example.chat"),
        ];
        // 패키지명이 프로세스 이름에 포함되는 경우
        let found = match_process(&app("com.example.chat"), &processes).unwrap();
        assert_eq!(found.pid, "10");

        // 프로세스 이름이 패키지명에 포함되는 경우
        let processes = vec![process("20", "chat"), process("21", "com.example.chat")];
        assert_eq!(match_process(&app("com.example.chat"), &processes).unwrap().pid, "20");
    }

    #[test]
    fn matching_is_case_sensitive_and_skips_empty_names() {
        let processes = vec![process("1", ""), process("2", "Chat")];
        assert!(match_process(&app("com.example.chat"), &processes).is_none());
        assert!(match_process(&app(""), &[process("3", "x")]).is_none());
    }

    #[test]
    fn loading_only_while_both_sources_wait() {
        let history = HistoryStore::new(15);
        let view = combine(
            &SourceState::default(),
            &SourceState::default(),
            &SourceState::default(),
            &history,
            0,
        );
        assert!(view.loading);
        assert!(view.error.is_none());

        let view = combine(
            &loaded(vec![process("1", "init")]),
            &SourceState::default(),
            &SourceState::default(),
            &history,
            0,
        );
        assert!(!view.loading);
        assert_eq!(view.processes.len(), 1);
        assert!(view.app_status.loading);
    }

    #[test]
    fn error_only_when_both_fail_without_data() {
        let history = HistoryStore::new(15);
        let view = combine(&failed("ps"), &failed("usage"), &SourceState::default(), &history, 0);
        assert!(!view.loading);
        assert_eq!(view.error.as_deref(), Some("processes: ps; apps: usage"));

        // 한쪽만 실패하면 부분 데이터 + 소스별 에러
        let view = combine(
            &failed("ps"),
            &loaded(vec![app("com.example.chat")]),
            &SourceState::default(),
            &history,
            0,
        );
        assert!(view.error.is_none());
        assert_eq!(view.process_status.error.as_deref(), Some("ps"));
        assert_eq!(view.apps.len(), 1);
        assert!(view.apps[0].process.is_none());
    }

    #[test]
    fn stale_data_is_still_shown() {
        let history = HistoryStore::new(15);
        let mut processes = loaded(vec![process("1", "init")]);
        processes.error = Some("timeout".into());
        let mut apps = loaded(Vec::<ActiveApp>::new());
        apps.error = Some("io".into());

        let view = combine(&processes, &apps, &SourceState::default(), &history, 0);
        assert!(view.error.is_none());
        assert!(view.process_status.stale);
        assert!(view.app_status.stale);
        assert_eq!(view.processes.len(), 1);
    }

    #[test]
    fn merged_app_carries_trend_of_matched_process() {
        let mut history = HistoryStore::new(15);
        for (i, cpu) in [5.0, 25.0, 25.0].into_iter().enumerate() {
            let mut p = process("42", "com.example.chat");
            p.cpu = cpu;
            history.record_snapshot(&[p], i as i64);
        }
        let merged = merge_apps(
            &[app("com.example.chat")],
            &[process("42", "com.example.chat")],
            &history,
        );
        assert_eq!(merged[0].cpu_trend.direction, TrendDirection::Rising);
    }
}
