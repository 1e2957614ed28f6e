//! 프로세스별 롤링 히스토리 (스파크라인/추세 계산용)
//!
//! pid마다 최근 샘플을 고정 용량 FIFO로 보관합니다.
//! 연속 두 번의 스냅샷에서 보이지 않은 pid는 히스토리를 폐기합니다.

use std::collections::{HashMap, VecDeque};

use super::model::{ProcessRecord, ProcessSample, Trend, TrendDirection};

pub const DEFAULT_HISTORY_CAPACITY: usize = 15;
/// 추세 계산에 쓰는 샘플 수
pub const TREND_WINDOW: usize = 3;
/// 상승/하락 판정 임계값 (퍼센트 포인트)
pub const TREND_THRESHOLD: f64 = 5.0;
/// 이 횟수만큼 연속으로 보이지 않으면 폐기
pub const ABSENT_POLLS_BEFORE_EVICTION: u32 = 2;

#[derive(Debug, Clone)]
pub struct ProcessHistory {
    samples: VecDeque<ProcessSample>,
    capacity: usize,
}

impl ProcessHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: ProcessSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &ProcessSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<ProcessSample> {
        self.samples.iter().copied().collect()
    }

    pub fn cpu_trend(&self) -> Trend {
        trend_of(self.samples.iter().map(|s| s.cpu))
    }

    pub fn memory_trend(&self) -> Trend {
        trend_of(self.samples.iter().map(|s| s.memory))
    }
}

/// 마지막 3개 값의 평균 - 그중 가장 오래된 값
pub fn trend_of<I>(values: I) -> Trend
where
    I: DoubleEndedIterator<Item = f64>,
{
    let mut window: Vec<f64> = values.rev().take(TREND_WINDOW).collect();
    if window.len() < TREND_WINDOW {
        return Trend::STABLE;
    }
    window.reverse();

    let oldest = window[0];
    let avg = window.iter().sum::<f64>() / TREND_WINDOW as f64;
    let delta = avg - oldest;
    let direction = if delta > TREND_THRESHOLD {
        TrendDirection::Rising
    } else if delta < -TREND_THRESHOLD {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };
    Trend { direction, delta }
}

#[derive(Debug)]
struct Tracked {
    history: ProcessHistory,
    absent_polls: u32,
}

/// pid → 히스토리 저장소
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    entries: HashMap<String, Tracked>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    /// 새 프로세스 스냅샷 반영
    ///
    /// 스냅샷에 있는 pid에는 샘플을 추가하고, 없는 pid는 부재 횟수를 올려
    /// 임계값에 닿으면 제거합니다.
    pub fn record_snapshot(&mut self, processes: &[ProcessRecord], now_ms: i64) {
        for tracked in self.entries.values_mut() {
            tracked.absent_polls += 1;
        }

        for process in processes {
            let capacity = self.capacity;
            let tracked = self.entries.entry(process.pid.clone()).or_insert_with(|| Tracked {
                history: ProcessHistory::new(capacity),
                absent_polls: 0,
            });
            tracked.absent_polls = 0;
            tracked.history.push(ProcessSample {
                cpu: process.cpu,
                memory: process.mem,
                timestamp_ms: now_ms,
            });
        }

        let before = self.entries.len();
        self.entries
            .retain(|_, t| t.absent_polls < ABSENT_POLLS_BEFORE_EVICTION);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!("[TaskManager] Evicted history for {} exited process(es)", evicted);
        }
    }

    pub fn get(&self, pid: &str) -> Option<&ProcessHistory> {
        self.entries.get(pid).map(|t| &t.history)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f64) -> ProcessSample {
        ProcessSample { cpu, memory: 0.0, timestamp_ms: 0 }
    }

    fn record(pid: &str) -> ProcessRecord {
        ProcessRecord {
            pid: pid.into(),
            user: "u0_a1".into(),
            name: "proc".into(),
            cpu: 1.0,
            mem: 2.0,
            res: 0,
            vsz: 0,
            status: "S".into(),
        }
    }

    #[test]
    fn history_keeps_last_fifteen_in_order() {
        let mut history = ProcessHistory::new(DEFAULT_HISTORY_CAPACITY);
        for i in 0..20 {
            history.push(sample(i as f64));
        }
        assert_eq!(history.len(), 15);
        let cpus: Vec<f64> = history.samples().map(|s| s.cpu).collect();
        let expected: Vec<f64> = (5..20).map(|i| i as f64).collect();
        assert_eq!(cpus, expected);
    }

    #[test]
    fn flat_tail_is_stable() {
        let trend = trend_of([10.0, 10.0, 10.0, 20.0, 20.0, 20.0].into_iter());
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.delta, 0.0);
    }

    #[test]
    fn jump_after_oldest_is_rising() {
        let trend = trend_of([1.0, 5.0, 25.0, 25.0].into_iter());
        assert_eq!(trend.direction, TrendDirection::Rising);
        assert!((trend.delta - 13.333).abs() < 0.01);

        let trend = trend_of([30.0, 10.0, 10.0].into_iter());
        assert_eq!(trend.direction, TrendDirection::Falling);
    }

    #[test]
    fn short_history_is_stable_zero() {
        assert_eq!(trend_of([1.0, 100.0].into_iter()), Trend::STABLE);
        assert_eq!(ProcessHistory::new(15).cpu_trend(), Trend::STABLE);
    }

    #[test]
    fn absent_pid_is_evicted_after_two_polls() {
        let mut store = HistoryStore::new(15);
        store.record_snapshot(&[record("1"), record("2")], 0);
        store.record_snapshot(&[record("1")], 1);
        assert!(store.get("2").is_some());

        store.record_snapshot(&[record("1")], 2);
        assert!(store.get("2").is_none());
        assert_eq!(store.get("1").map(ProcessHistory::len), Some(3));
    }

    #[test]
    fn reappearing_pid_resets_absence() {
        let mut store = HistoryStore::new(15);
        store.record_snapshot(&[record("7")], 0);
        store.record_snapshot(&[], 1);
        store.record_snapshot(&[record("7")], 2);
        store.record_snapshot(&[], 3);
        assert_eq!(store.get("7").map(ProcessHistory::len), Some(2));
    }
}
